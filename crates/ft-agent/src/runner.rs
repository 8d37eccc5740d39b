//! Test runner
//!
//! Executes the deployed scripts one by one and reports each status change.
//! Execution is serial; reporting is what matters here, the controller owns
//! scheduling decisions.

use std::path::{Path, PathBuf};
use std::process::Output;

use ft_core::error::{FtError, SyncError};
use ft_core::types::TestResult;

use crate::sync::SyncClient;

/// Runs every script under one test directory.
pub struct TestRunner {
    test_dir: PathBuf,
    reporter: Option<SyncClient>,
    hostname: String,
}

impl TestRunner {
    pub fn new(test_dir: PathBuf, reporter: Option<SyncClient>) -> Self {
        let hostname = gethostname::gethostname().to_string_lossy().into_owned();
        Self {
            test_dir,
            reporter,
            hostname,
        }
    }

    /// Run all tests, then send the fleet-completion sentinel.
    ///
    /// A reporting failure is fatal: once acks stop arriving, this agent's
    /// status can no longer be trusted to reach the controller.
    pub async fn run(&self) -> Result<(), FtError> {
        let mut scripts = Vec::new();
        collect_scripts(&self.test_dir, &mut scripts)?;
        scripts.sort();
        tracing::info!("Found {} test scripts under {:?}", scripts.len(), self.test_dir);

        for script in &scripts {
            let rel = self.rel_path(script);
            self.report(&rel, TestResult::Running, None).await?;

            let (status, bundle) = match tokio::process::Command::new(script).output().await {
                Ok(output) if output.status.success() => {
                    tracing::info!("{} finished", rel);
                    (TestResult::Finished, None)
                }
                Ok(output) => {
                    tracing::warn!("{} failed with {}", rel, output.status);
                    (TestResult::Failed, self.archive_failure(&rel, &output))
                }
                Err(e) => {
                    tracing::error!("Failed to execute {}: {}", rel, e);
                    (TestResult::Aborted, None)
                }
            };

            self.report(&rel, status, bundle.as_deref()).await?;
        }

        if let Some(reporter) = &self.reporter {
            reporter.notify_all_done().await?;
        }
        Ok(())
    }

    async fn report(
        &self,
        script: &str,
        status: TestResult,
        bundle: Option<&str>,
    ) -> Result<(), SyncError> {
        match &self.reporter {
            Some(reporter) => reporter.report_progress(script, status, bundle).await,
            None => Ok(()),
        }
    }

    fn rel_path(&self, script: &Path) -> String {
        script
            .strip_prefix(&self.test_dir)
            .unwrap_or(script)
            .to_string_lossy()
            .into_owned()
    }

    /// Store the failed script's output next to the test dir and return its
    /// `host:path` reference. Best effort: a write failure just means no
    /// bundle accompanies the report.
    ///
    /// The bundle lives outside the test dir so a later walk of the scripts
    /// never picks it up.
    fn archive_failure(&self, rel: &str, output: &Output) -> Option<String> {
        let bundle_dir = self.test_dir.parent().unwrap_or(&self.test_dir);
        let bundle_path = bundle_dir.join(format!("{}.failure.log", rel.replace('/', "_")));

        let mut contents = Vec::new();
        contents.extend_from_slice(b"--- stdout ---\n");
        contents.extend_from_slice(&output.stdout);
        contents.extend_from_slice(b"\n--- stderr ---\n");
        contents.extend_from_slice(&output.stderr);

        match std::fs::write(&bundle_path, &contents) {
            Ok(()) => Some(format!("{}:{}", self.hostname, bundle_path.display())),
            Err(e) => {
                tracing::warn!("Failed to write failure bundle {:?}: {}", bundle_path, e);
                None
            }
        }
    }
}

fn collect_scripts(dir: &Path, out: &mut Vec<PathBuf>) -> Result<(), std::io::Error> {
    for entry in std::fs::read_dir(dir)? {
        let path = entry?.path();
        if path.is_dir() {
            collect_scripts(&path, out)?;
        } else if path.extension().map_or(true, |ext| ext != "log") {
            // Stray log files are not tests.
            out.push(path);
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    use std::fs;
    use tempfile::TempDir;

    #[cfg(unix)]
    fn make_executable(path: &Path) {
        use std::os::unix::fs::PermissionsExt;
        fs::set_permissions(path, fs::Permissions::from_mode(0o755)).unwrap();
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_runs_scripts_without_reporting() {
        let dir = TempDir::new().unwrap();
        let marker = dir.path().join("ran");
        let script = dir.path().join("a.sh");
        fs::write(&script, format!("#!/bin/sh\ntouch {}\n", marker.display())).unwrap();
        make_executable(&script);

        let runner = TestRunner::new(dir.path().to_path_buf(), None);
        runner.run().await.unwrap();

        assert!(marker.exists());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_failure_bundle_is_archived_outside_test_dir() {
        let dir = TempDir::new().unwrap();
        let test_dir = dir.path().join("tests");
        fs::create_dir(&test_dir).unwrap();
        let script = test_dir.join("bad.sh");
        fs::write(&script, "#!/bin/sh\necho boom >&2\nexit 1\n").unwrap();
        make_executable(&script);

        let runner = TestRunner::new(test_dir.clone(), None);
        let output = tokio::process::Command::new(&script).output().await.unwrap();
        let bundle = runner.archive_failure("bad.sh", &output).unwrap();

        let (host, path) = bundle.split_once(':').unwrap();
        assert!(!host.is_empty());
        let contents = fs::read_to_string(path).unwrap();
        assert!(contents.contains("boom"));

        // Beside the test dir, where no later walk of the scripts sees it.
        assert_eq!(Path::new(path).parent(), Some(dir.path()));
        let mut scripts = Vec::new();
        collect_scripts(&test_dir, &mut scripts).unwrap();
        assert_eq!(scripts, vec![script]);
    }

    #[test]
    fn test_collect_skips_log_files() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("a.sh"), "#!/bin/sh\n").unwrap();
        fs::write(dir.path().join("old.failure.log"), "stale").unwrap();

        let mut scripts = Vec::new();
        collect_scripts(dir.path(), &mut scripts).unwrap();
        assert_eq!(scripts.len(), 1);
        assert!(scripts[0].ends_with("a.sh"));
    }
}
