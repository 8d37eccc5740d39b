//! Result state tracker
//!
//! The authoritative per-test state table. The daemon's dispatch loop feeds
//! decoded progress reports in here one at a time, so the table needs no
//! locking discipline beyond its own mutex; updates are strictly ordered.
//!
//! Ordering across sessions is arrival order, not program order. A `Running`
//! and a `Finished` for the same test may arrive in either order within one
//! poll pass; last-write-wins is fine because each agent's final status for a
//! test is the authoritative one. The only guarded transition is back to
//! `NotRun`, which no agent legitimately sends.

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::Mutex;

use ft_core::error::SyncError;
use ft_core::traits::{Deployer, StatusSink, SyncSession};
use ft_core::types::{TestCase, TestResult};
use ft_protocol::{AckMessage, SyncMessage};

use crate::daemon::ReportHandler;

/// Tracks every test of the run to a terminal state.
pub struct ResultTracker {
    results: Mutex<BTreeMap<String, TestCase>>,
    tests_done: AtomicBool,
    deployer: Arc<dyn Deployer>,
    display: Arc<dyn StatusSink>,
    artifact_dir: PathBuf,
}

impl ResultTracker {
    /// Build the tracker from the full initial catalog.
    pub fn new(
        testcases: Vec<TestCase>,
        deployer: Arc<dyn Deployer>,
        display: Arc<dyn StatusSink>,
        artifact_dir: PathBuf,
    ) -> Self {
        let results = testcases
            .into_iter()
            .map(|case| (case.rel_path.clone(), case))
            .collect();

        Self {
            results: Mutex::new(results),
            tests_done: AtomicBool::new(false),
            deployer,
            display,
            artifact_dir,
        }
    }

    /// Report every pre-assigned `Skipped` test to the display, so a live
    /// view reflects skips without waiting for any message.
    pub async fn sync_skipped(&self) {
        let results = self.results.lock().await;
        for case in results.values() {
            if case.result == TestResult::Skipped {
                self.display
                    .test_status(&case.rel_path, TestResult::Skipped, None);
            }
        }
    }

    /// Apply one progress update to the table.
    ///
    /// Unknown scripts are silently ignored (stray or stale reports are not
    /// an error); an unknown status text is a protocol-integrity violation
    /// and fatal to the run.
    pub async fn update(
        &self,
        script: &str,
        status: &str,
        bundle: Option<&str>,
    ) -> Result<(), SyncError> {
        let status: TestResult = status.parse().map_err(|_| SyncError::IllegalResult {
            script: script.to_string(),
            status: status.to_string(),
        })?;

        {
            let mut results = self.results.lock().await;
            let Some(case) = results.get_mut(script) else {
                tracing::debug!("Ignoring update for unknown script {:?}", script);
                return Ok(());
            };

            if status == TestResult::NotRun && case.result != TestResult::NotRun {
                tracing::debug!("Ignoring backward transition for {:?}", script);
                return Ok(());
            }

            case.result = status;
            if let Some(bundle) = bundle {
                case.remote_bundle = Some(bundle.to_string());
            }
        }

        let mut local_bundle = None;
        if status == TestResult::Failed {
            if let Some(bundle) = bundle {
                match self.deployer.download(bundle, &self.artifact_dir).await {
                    Ok(path) => local_bundle = Some(path),
                    Err(e) => {
                        // The failure itself is already recorded; only the
                        // local artifact is missing.
                        tracing::warn!("Failed to download bundle {}: {}", bundle, e);
                    }
                }
            }
        }

        if let Some(path) = &local_bundle {
            let mut results = self.results.lock().await;
            if let Some(case) = results.get_mut(script) {
                case.local_bundle = Some(path.clone());
            }
        }

        self.display
            .test_status(script, status, local_bundle.as_deref());
        Ok(())
    }

    /// Number of tests currently in `status`.
    pub async fn count(&self, status: TestResult) -> usize {
        let results = self.results.lock().await;
        results.values().filter(|c| c.result == status).count()
    }

    /// Total number of tests in the run.
    pub async fn total(&self) -> usize {
        self.results.lock().await.len()
    }

    pub async fn passed(&self) -> usize {
        self.count(TestResult::Finished).await
    }

    pub async fn failed(&self) -> usize {
        self.count(TestResult::Failed).await
    }

    pub async fn aborted(&self) -> usize {
        self.count(TestResult::Aborted).await
    }

    pub async fn skipped(&self) -> usize {
        self.count(TestResult::Skipped).await
    }

    pub async fn running(&self) -> usize {
        self.count(TestResult::Running).await
    }

    pub async fn not_run(&self) -> usize {
        self.count(TestResult::NotRun).await
    }

    /// Human-readable run summary.
    pub async fn info(&self) -> String {
        format!(
            "Total {}, passed {}, skipped {}, failed {}, aborted {}, not_run {}",
            self.total().await,
            self.passed().await,
            self.skipped().await,
            self.failed().await,
            self.aborted().await,
            self.not_run().await,
        )
    }

    /// The completion signal the orchestrator polls.
    pub fn tests_done(&self) -> bool {
        self.tests_done.load(Ordering::Acquire)
    }

    /// Current state of one test, if known.
    pub async fn result_of(&self, script: &str) -> Option<TestResult> {
        let results = self.results.lock().await;
        results.get(script).map(|c| c.result)
    }

    /// Local bundle path of one test, if downloaded.
    pub async fn local_bundle_of(&self, script: &str) -> Option<PathBuf> {
        let results = self.results.lock().await;
        results.get(script).and_then(|c| c.local_bundle.clone())
    }
}

#[async_trait]
impl ReportHandler for ResultTracker {
    async fn on_report(
        &self,
        responder: &dyn SyncSession,
        session: u64,
        raw: &[u8],
    ) -> Result<(), SyncError> {
        let sync = match SyncMessage::decode(raw) {
            Ok(sync) => sync,
            Err(e) => {
                // No id to ack; the agent's retry budget covers the loss.
                tracing::warn!(
                    "Invalid message from session {}, ignore: {} ({:?})",
                    session,
                    e,
                    String::from_utf8_lossy(raw)
                );
                return Ok(());
            }
        };

        tracing::debug!(
            "Sync update from session {}: {} -> {}",
            session,
            sync.script,
            sync.status
        );

        let done = if sync.is_final() {
            self.display
                .prompt(&format!("\n\t{}\n", self.info().await));
            true
        } else {
            self.update(&sync.script, &sync.status, sync.bundle.as_deref())
                .await?;
            false
        };

        let ack = AckMessage::new(sync.id).encode();
        if let Err(e) = responder.send(&ack).await {
            tracing::warn!("Failed to ack message {} on session {}: {}", sync.id, session, e);
        }

        if done && !self.tests_done.swap(true, Ordering::AcqRel) {
            tracing::info!("Fleet completion sentinel received from session {}", session);
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use std::path::Path;
    use std::sync::Mutex as StdMutex;

    use bytes::Bytes;
    use ft_core::error::DeployError;

    fn case(rel: &str) -> TestCase {
        TestCase::new(PathBuf::from("/t").join(rel), rel)
    }

    fn skipped_case(rel: &str) -> TestCase {
        let mut case = case(rel);
        case.result = TestResult::Skipped;
        case
    }

    /// Deployer double: optionally fails downloads, records requests.
    struct FakeDeployer {
        fail_downloads: bool,
        downloads: StdMutex<Vec<String>>,
    }

    impl FakeDeployer {
        fn new(fail_downloads: bool) -> Arc<Self> {
            Arc::new(Self {
                fail_downloads,
                downloads: StdMutex::new(Vec::new()),
            })
        }
    }

    #[async_trait]
    impl Deployer for FakeDeployer {
        async fn deploy_agent(&self, _servers: &[String]) -> Result<PathBuf, DeployError> {
            Ok(PathBuf::from("/remote/agent"))
        }

        async fn deploy_tests(
            &self,
            _tests: &[TestCase],
            _servers: &[String],
        ) -> Result<PathBuf, DeployError> {
            Ok(PathBuf::from("/remote/tests"))
        }

        async fn download(
            &self,
            remote_ref: &str,
            dest_dir: &Path,
        ) -> Result<PathBuf, DeployError> {
            self.downloads.lock().unwrap().push(remote_ref.to_string());
            if self.fail_downloads {
                Err(DeployError::BadRemoteRef(remote_ref.to_string()))
            } else {
                Ok(dest_dir.join("bundle.tar.gz"))
            }
        }
    }

    /// Display double recording every status change.
    #[derive(Default)]
    struct RecordingSink {
        seen: StdMutex<Vec<(String, TestResult)>>,
    }

    impl StatusSink for RecordingSink {
        fn test_status(&self, rel_path: &str, status: TestResult, _bundle: Option<&Path>) {
            self.seen.lock().unwrap().push((rel_path.to_string(), status));
        }
    }

    /// Session double recording acked bytes.
    #[derive(Default)]
    struct RecordingSession {
        sent: StdMutex<Vec<Bytes>>,
    }

    #[async_trait]
    impl SyncSession for RecordingSession {
        async fn send(&self, payload: &[u8]) -> Result<(), SyncError> {
            self.sent.lock().unwrap().push(Bytes::copy_from_slice(payload));
            Ok(())
        }

        async fn receive(&self) -> Result<Bytes, SyncError> {
            Err(SyncError::SessionClosed)
        }

        async fn try_receive(&self) -> Option<Bytes> {
            None
        }

        fn is_active(&self) -> bool {
            true
        }

        async fn close(&self) {}
    }

    fn tracker_with(cases: Vec<TestCase>, deployer: Arc<FakeDeployer>) -> ResultTracker {
        ResultTracker::new(
            cases,
            deployer,
            Arc::new(RecordingSink::default()),
            PathBuf::from("/tmp/artifacts"),
        )
    }

    #[tokio::test]
    async fn test_update_moves_through_lifecycle() {
        let tracker = tracker_with(vec![case("a.sh")], FakeDeployer::new(false));

        assert_eq!(tracker.result_of("a.sh").await, Some(TestResult::NotRun));

        tracker.update("a.sh", "Running", None).await.unwrap();
        assert_eq!(tracker.result_of("a.sh").await, Some(TestResult::Running));

        tracker.update("a.sh", "Finished", None).await.unwrap();
        assert_eq!(tracker.result_of("a.sh").await, Some(TestResult::Finished));

        // Idempotent under repeated identical updates.
        tracker.update("a.sh", "Finished", None).await.unwrap();
        assert_eq!(tracker.result_of("a.sh").await, Some(TestResult::Finished));
    }

    #[tokio::test]
    async fn test_update_never_returns_to_not_run() {
        let tracker = tracker_with(vec![case("a.sh")], FakeDeployer::new(false));
        tracker.update("a.sh", "Finished", None).await.unwrap();
        tracker.update("a.sh", "NotRun", None).await.unwrap();
        assert_eq!(tracker.result_of("a.sh").await, Some(TestResult::Finished));
    }

    #[tokio::test]
    async fn test_update_rejects_illegal_status() {
        let tracker = tracker_with(vec![case("a.sh")], FakeDeployer::new(false));
        let err = tracker.update("a.sh", "Exploded", None).await.unwrap_err();
        assert!(matches!(err, SyncError::IllegalResult { .. }));
    }

    #[tokio::test]
    async fn test_update_ignores_unknown_script() {
        let tracker = tracker_with(vec![case("a.sh")], FakeDeployer::new(false));
        tracker.update("ghost.sh", "Running", None).await.unwrap();
        assert_eq!(tracker.result_of("ghost.sh").await, None);
        assert_eq!(tracker.not_run().await, 1);
    }

    #[tokio::test]
    async fn test_failed_with_broken_download_still_records_failure() {
        // A failed bundle download must not fail the update itself.
        let deployer = FakeDeployer::new(true);
        let tracker = tracker_with(vec![case("a.sh")], Arc::clone(&deployer));

        tracker
            .update("a.sh", "Failed", Some("host1:/tmp/bundle.tar.gz"))
            .await
            .unwrap();

        assert_eq!(tracker.result_of("a.sh").await, Some(TestResult::Failed));
        assert_eq!(tracker.local_bundle_of("a.sh").await, None);
        assert_eq!(
            deployer.downloads.lock().unwrap().as_slice(),
            &["host1:/tmp/bundle.tar.gz".to_string()]
        );
    }

    #[tokio::test]
    async fn test_failed_with_bundle_downloads_artifact() {
        let deployer = FakeDeployer::new(false);
        let tracker = tracker_with(vec![case("a.sh")], Arc::clone(&deployer));

        tracker
            .update("a.sh", "Failed", Some("host1:/tmp/bundle.tar.gz"))
            .await
            .unwrap();

        assert_eq!(
            tracker.local_bundle_of("a.sh").await,
            Some(PathBuf::from("/tmp/artifacts/bundle.tar.gz"))
        );
    }

    #[tokio::test]
    async fn test_sync_skipped_reports_without_messages() {
        let sink = Arc::new(RecordingSink::default());
        let tracker = ResultTracker::new(
            vec![case("a.sh"), skipped_case("b.sh")],
            FakeDeployer::new(false),
            Arc::clone(&sink) as Arc<dyn StatusSink>,
            PathBuf::from("/tmp/artifacts"),
        );

        tracker.sync_skipped().await;

        let seen = sink.seen.lock().unwrap();
        assert_eq!(seen.as_slice(), &[("b.sh".to_string(), TestResult::Skipped)]);
    }

    #[tokio::test]
    async fn test_full_report_sequence_with_sentinel() {
        // Running, Finished, then the sentinel. Each message is acked with
        // its own id, and only the sentinel flips tests_done.
        let tracker = Arc::new(tracker_with(vec![case("a.sh")], FakeDeployer::new(false)));
        let session = RecordingSession::default();

        let msgs = [
            SyncMessage::new(101, "a.sh", "Running"),
            SyncMessage::new(102, "a.sh", "Finished"),
            SyncMessage::sentinel(103),
        ];

        for msg in &msgs {
            assert!(!tracker.tests_done());
            tracker
                .on_report(&session, 1, &msg.encode())
                .await
                .unwrap();
        }

        assert_eq!(tracker.result_of("a.sh").await, Some(TestResult::Finished));
        assert!(tracker.tests_done());

        let sent = session.sent.lock().unwrap();
        let acks: Vec<AckMessage> = sent
            .iter()
            .map(|b| AckMessage::decode(b).unwrap())
            .collect();
        assert_eq!(
            acks,
            vec![
                AckMessage::new(101),
                AckMessage::new(102),
                AckMessage::new(103)
            ]
        );
    }

    #[tokio::test]
    async fn test_undecodable_report_is_dropped_without_ack() {
        let tracker = tracker_with(vec![case("a.sh")], FakeDeployer::new(false));
        let session = RecordingSession::default();

        tracker.on_report(&session, 1, b"garbage").await.unwrap();

        assert!(session.sent.lock().unwrap().is_empty());
        assert_eq!(tracker.result_of("a.sh").await, Some(TestResult::NotRun));
    }

    #[tokio::test]
    async fn test_illegal_status_in_report_is_fatal() {
        let tracker = tracker_with(vec![case("a.sh")], FakeDeployer::new(false));
        let session = RecordingSession::default();
        let msg = SyncMessage::new(7, "a.sh", "Exploded");

        let err = tracker.on_report(&session, 1, &msg.encode()).await.unwrap_err();
        assert!(matches!(err, SyncError::IllegalResult { .. }));
        // No ack for a report we could not apply.
        assert!(session.sent.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_info_summary_format() {
        let tracker = tracker_with(
            vec![case("a.sh"), case("b.sh"), skipped_case("c.sh")],
            FakeDeployer::new(false),
        );
        tracker.update("a.sh", "Finished", None).await.unwrap();
        tracker.update("b.sh", "Failed", None).await.unwrap();

        assert_eq!(
            tracker.info().await,
            "Total 3, passed 1, skipped 1, failed 1, aborted 0, not_run 0"
        );
    }
}
