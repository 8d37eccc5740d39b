//! Top-level run sequence
//!
//! Drives one whole run: connectivity check, catalog discovery, deployment,
//! daemon startup, agent launch, completion polling, teardown, summary.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use tokio::sync::oneshot;

use ft_core::config::ControllerConfig;
use ft_core::traits::{Deployer, StatusSink};
use ft_core::types::TestResult;

use crate::catalog;
use crate::daemon::SyncDaemon;
use crate::deploy::SshDeployer;
use crate::progress::ConsoleSink;
use crate::tracker::ResultTracker;

/// How often the completion flag is polled.
const DONE_POLL_INTERVAL: Duration = Duration::from_secs(2);
/// How long to wait for the daemon to confirm it is listening.
const DAEMON_READY_TIMEOUT: Duration = Duration::from_secs(5);

/// One fleetest run.
pub struct Orchestrator {
    config: ControllerConfig,
    servers: Vec<String>,
    tests: Vec<String>,
    groups: Vec<String>,
}

impl Orchestrator {
    pub fn new(
        config: ControllerConfig,
        servers: Vec<String>,
        tests: Vec<String>,
        groups: Vec<String>,
    ) -> Self {
        Self {
            config,
            servers,
            tests,
            groups,
        }
    }

    /// Run the suite across the fleet; returns the summary line.
    pub async fn run(&self) -> Result<String> {
        let deployer = Arc::new(SshDeployer::new(
            self.config.server.clone(),
            self.resolve_agent_binary(),
        ));

        // Fail fast on unreachable servers, naming each one.
        deployer.check_connectivity(&self.servers).await?;

        let cases = catalog::discover(
            &self.config.controller.test_root,
            &self.tests,
            &self.groups,
        )?;
        if cases.is_empty() {
            let notice = "No tests matched the requested tests/groups, nothing to run";
            tracing::info!("{}", notice);
            return Ok(notice.to_string());
        }
        tracing::info!(
            "Tests to be run: {:?}",
            cases.iter().map(|c| c.rel_path.as_str()).collect::<Vec<_>>()
        );

        let display: Arc<dyn StatusSink> = Arc::new(ConsoleSink::new(&cases));
        let tracker = Arc::new(ResultTracker::new(
            cases.clone(),
            Arc::clone(&deployer) as _,
            Arc::clone(&display),
            self.config.controller.artifact_dir.clone(),
        ));
        tracker.sync_skipped().await;

        let to_run: Vec<_> = cases
            .iter()
            .filter(|c| c.result != TestResult::Skipped)
            .cloned()
            .collect();

        let agent_dir = deployer.deploy_agent(&self.servers).await?;
        let test_dir = deployer.deploy_tests(&to_run, &self.servers).await?;

        // Daemon up and confirmed listening before any agent starts.
        let daemon = Arc::new(SyncDaemon::new(
            self.config.daemon.clone(),
            Arc::clone(&tracker) as _,
        ));
        let (ready_tx, ready_rx) = oneshot::channel();
        let daemon_task = tokio::spawn({
            let daemon = Arc::clone(&daemon);
            async move { daemon.run(ready_tx).await }
        });
        let sync_port = tokio::time::timeout(DAEMON_READY_TIMEOUT, ready_rx)
            .await
            .context("Sync daemon did not come up")?
            .context("Sync daemon exited before listening")?;

        let controller_addr = gethostname::gethostname().to_string_lossy().into_owned();
        let launch = async {
            for server in &self.servers {
                deployer
                    .launch_agent(server, &agent_dir, &test_dir, &controller_addr, sync_port)
                    .await
                    .with_context(|| format!("Failed to launch agent on {}", server))?;
            }
            Ok(())
        };
        supervise_run(&daemon, daemon_task, launch, || tracker.tests_done()).await?;

        let summary = tracker.info().await;
        display.prompt(&summary);
        tracing::info!("{}", summary);
        Ok(summary)
    }

    /// The agent binary to deploy: the configured path, falling back to a
    /// sibling of the controller executable.
    fn resolve_agent_binary(&self) -> PathBuf {
        let configured = &self.config.controller.agent_binary;
        if configured.is_file() {
            return configured.clone();
        }
        if let Ok(exe) = std::env::current_exe() {
            if let Some(dir) = exe.parent() {
                let sibling = dir.join(configured);
                if sibling.is_file() {
                    return sibling;
                }
            }
        }
        configured.clone()
    }
}

/// Drive the launch sequence and completion poll, then tear the daemon down.
///
/// The daemon is stopped and its task joined on every exit path, including a
/// failed launch; a daemon abort (e.g. an illegal result value) surfaces here
/// and ends the run.
async fn supervise_run(
    daemon: &SyncDaemon,
    mut daemon_task: tokio::task::JoinHandle<Result<()>>,
    launch: impl std::future::Future<Output = Result<()>>,
    tests_done: impl Fn() -> bool,
) -> Result<()> {
    let mut daemon_exited = false;

    let outcome = async {
        launch.await?;
        loop {
            if tests_done() {
                return Ok(());
            }
            tokio::select! {
                result = &mut daemon_task => {
                    daemon_exited = true;
                    result.context("Sync daemon task panicked")??;
                    anyhow::bail!("Sync daemon stopped before all tests were done");
                }
                _ = tokio::time::sleep(DONE_POLL_INTERVAL) => {}
            }
        }
    }
    .await;

    daemon.stop();
    if !daemon_exited {
        daemon_task.await.context("Sync daemon task panicked")??;
    }
    outcome
}

#[cfg(test)]
mod tests {
    use super::*;

    use async_trait::async_trait;
    use tokio::sync::oneshot;

    use ft_core::config::DaemonConfig;
    use ft_core::error::SyncError;
    use ft_core::traits::SyncSession;

    use crate::daemon::ReportHandler;

    struct IdleHandler;

    #[async_trait]
    impl ReportHandler for IdleHandler {
        async fn on_report(
            &self,
            _responder: &dyn SyncSession,
            _session: u64,
            _raw: &[u8],
        ) -> Result<(), SyncError> {
            Ok(())
        }
    }

    async fn running_daemon() -> (Arc<SyncDaemon>, tokio::task::JoinHandle<Result<()>>) {
        let config = DaemonConfig {
            username: "agent".to_string(),
            password: "pw".to_string(),
            port: 0,
        };
        let daemon = Arc::new(SyncDaemon::new(config, Arc::new(IdleHandler)));

        let (ready_tx, ready_rx) = oneshot::channel();
        let task = tokio::spawn({
            let daemon = Arc::clone(&daemon);
            async move { daemon.run(ready_tx).await }
        });
        ready_rx.await.unwrap();

        (daemon, task)
    }

    #[tokio::test]
    async fn test_failed_launch_still_tears_daemon_down() {
        let (daemon, task) = running_daemon().await;

        // supervise_run joins the daemon task internally, so returning at
        // all proves the daemon came down; the launch error is what surfaces.
        let result = tokio::time::timeout(
            Duration::from_secs(5),
            supervise_run(&daemon, task, async { anyhow::bail!("agent binary missing") }, || {
                false
            }),
        )
        .await
        .unwrap();

        let err = result.unwrap_err();
        assert!(err.to_string().contains("agent binary missing"));
    }

    #[tokio::test]
    async fn test_completion_tears_daemon_down() {
        let (daemon, task) = running_daemon().await;

        tokio::time::timeout(
            Duration::from_secs(5),
            supervise_run(&daemon, task, async { Ok(()) }, || true),
        )
        .await
        .unwrap()
        .unwrap();
    }
}
