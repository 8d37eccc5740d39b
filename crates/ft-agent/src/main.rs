use std::path::PathBuf;

use anyhow::{bail, Context};
use clap::Parser;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

use ft_agent::{SyncClient, TestRunner};
use ft_core::config::DEFAULT_SYNC_PORT;

const AGENT_LOG_FILE: &str = "fleetest_agent.log";

#[derive(Parser, Debug)]
#[command(name = "ft-agent", about = "Remote test execution agent", version)]
struct Args {
    /// Directory holding the deployed test scripts
    #[arg(long)]
    testdir: PathBuf,

    /// Report progress back to the controller daemon
    #[arg(long)]
    sync: bool,

    /// Controller address to report to
    #[arg(long)]
    server: Option<String>,

    /// Controller sync daemon port
    #[arg(long, default_value_t = DEFAULT_SYNC_PORT)]
    port: u16,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "info", env = "FT_LOG")]
    log_level: String,
}

fn validate_args(args: &Args) -> anyhow::Result<()> {
    if args.sync != args.server.is_some() {
        bail!("--sync and --server must be used together");
    }
    if !args.testdir.is_dir() {
        bail!("Test directory {:?} does not exist", args.testdir);
    }
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    validate_args(&args)?;

    // The agent runs detached under nohup, so logs go to a file beside the
    // test directory rather than to a terminal.
    let log_path = args
        .testdir
        .parent()
        .unwrap_or(&args.testdir)
        .join(AGENT_LOG_FILE);
    let log_file = std::fs::File::create(&log_path)
        .with_context(|| format!("Failed to create log file {:?}", log_path))?;

    tracing_subscriber::registry()
        .with(EnvFilter::try_new(&args.log_level).unwrap_or_else(|_| EnvFilter::new("info")))
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(log_file)
                .with_ansi(false),
        )
        .init();

    let reporter = match &args.server {
        Some(server) => {
            tracing::info!("Connecting to controller at {}:{}", server, args.port);
            Some(SyncClient::connect(server, args.port).await?)
        }
        None => None,
    };

    let runner = TestRunner::new(args.testdir.clone(), reporter);
    runner.run().await?;
    tracing::info!("All tests completed");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(argv: &[&str]) -> Args {
        Args::parse_from(argv)
    }

    #[test]
    fn test_sync_requires_server() {
        let args = parse(&["ft-agent", "--testdir", "/tmp", "--sync"]);
        assert!(validate_args(&args).is_err());
    }

    #[test]
    fn test_server_requires_sync() {
        let args = parse(&["ft-agent", "--testdir", "/tmp", "--server", "ctl"]);
        assert!(validate_args(&args).is_err());
    }

    #[test]
    fn test_default_port() {
        let args = parse(&["ft-agent", "--testdir", "/tmp"]);
        assert_eq!(args.port, DEFAULT_SYNC_PORT);
    }
}
