//! The deployment seam

use std::path::{Path, PathBuf};

use async_trait::async_trait;

use crate::error::DeployError;
use crate::types::TestCase;

/// Copies files to and from the test servers.
#[async_trait]
pub trait Deployer: Send + Sync {
    /// Stage the agent binary on every server; returns the remote agent
    /// directory. Idempotent: servers that already carry the agent are left
    /// alone.
    async fn deploy_agent(&self, servers: &[String]) -> Result<PathBuf, DeployError>;

    /// Copy the selected test scripts to a fresh directory on every server,
    /// preserving their root-relative paths (those are the keys agents report
    /// under); returns that remote test directory.
    async fn deploy_tests(
        &self,
        tests: &[TestCase],
        servers: &[String],
    ) -> Result<PathBuf, DeployError>;

    /// Fetch a remote file named by a `"host:path"` reference into the
    /// artifact directory; returns the local path.
    async fn download(&self, remote_ref: &str, dest_dir: &Path) -> Result<PathBuf, DeployError>;
}
