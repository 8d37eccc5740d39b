//! fleetest controller entry point

use std::path::PathBuf;

use anyhow::Result;
use clap::Parser;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use ft_controller::Orchestrator;
use ft_core::config;
use ft_core::error::ConfigError;

#[derive(Parser)]
#[command(name = "fleetest")]
#[command(about = "Run a test suite across a fleet of servers and track results live")]
#[command(version)]
struct Args {
    /// A test to run (relative to the test root); repeatable.
    /// Mutually exclusive with --group.
    #[arg(short, long)]
    test: Vec<String>,

    /// A test group to run; repeatable
    #[arg(short, long)]
    group: Vec<String>,

    /// A test server to run the tests on; repeatable
    #[arg(short, long, required = true)]
    server: Vec<String>,

    /// Path to configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Log level (error, warn, info, debug, trace)
    #[arg(long, default_value = "info")]
    log_level: String,
}

fn validate_args(args: &Args) -> Result<(), ConfigError> {
    if args.test.is_empty() && args.group.is_empty() {
        return Err(ConfigError::InvalidArguments(
            "No --test or --group was provided".to_string(),
        ));
    }
    if !args.test.is_empty() && !args.group.is_empty() {
        return Err(ConfigError::InvalidArguments(
            "--test and --group can't be used together".to_string(),
        ));
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| args.log_level.clone()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();

    validate_args(&args)?;

    let config_path = args
        .config
        .clone()
        .unwrap_or_else(config::default_config_path);
    let config = config::load_or_default(&config_path)?;

    let orchestrator = Orchestrator::new(config, args.server, args.test, args.group);
    let summary = orchestrator.run().await?;
    println!("{}", summary);

    Ok(())
}
