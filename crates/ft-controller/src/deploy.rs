//! Deployment collaborator
//!
//! Stages the agent binary and the selected test scripts on every target
//! server, fetches failure bundles back, and launches agents detached from
//! the controller's session.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use rand::Rng;

use ft_core::config::ServerAccess;
use ft_core::error::{ConfigError, DeployError};
use ft_core::traits::Deployer;
use ft_core::types::TestCase;

use crate::ssh::{quote, SshConn};

/// Remote directory name the agent is staged under.
const AGENT_DIR_NAME: &str = "fleetest_agent";
/// Name of the agent binary on the remote side.
const AGENT_BIN_NAME: &str = "ft-agent";

/// Deploys over SSH using the `[server]` credentials.
pub struct SshDeployer {
    access: ServerAccess,
    agent_binary: PathBuf,
}

impl SshDeployer {
    pub fn new(access: ServerAccess, agent_binary: PathBuf) -> Self {
        Self {
            access,
            agent_binary,
        }
    }

    async fn connect(&self, server: &str) -> Result<SshConn, DeployError> {
        SshConn::connect(
            server,
            self.access.port,
            &self.access.username,
            &self.access.password,
        )
        .await
    }

    /// Fail fast when any requested server is unreachable, naming each one.
    pub async fn check_connectivity(&self, servers: &[String]) -> Result<(), ConfigError> {
        tracing::info!("Check connectivity of test servers");
        let mut unreachable = Vec::new();

        for server in servers {
            match self.connect(server).await {
                Ok(conn) => conn.close().await,
                Err(e) => unreachable.push((server.clone(), e.to_string())),
            }
        }

        if unreachable.is_empty() {
            Ok(())
        } else {
            Err(ConfigError::UnreachableServers(unreachable))
        }
    }

    /// Launch the agent on `server`, detached, reporting back to
    /// `controller_addr:sync_port`.
    pub async fn launch_agent(
        &self,
        server: &str,
        agent_dir: &Path,
        test_dir: &Path,
        controller_addr: &str,
        sync_port: u16,
    ) -> Result<(), DeployError> {
        let cmd = format!(
            "cd {dir} && nohup ./{bin} --testdir {tests} --sync --server {addr} --port {port} >/dev/null 2>&1 &",
            dir = quote(&agent_dir.to_string_lossy()),
            bin = AGENT_BIN_NAME,
            tests = quote(&test_dir.to_string_lossy()),
            addr = controller_addr,
            port = sync_port,
        );

        tracing::info!("Launching agent on {}", server);
        let conn = self.connect(server).await?;
        let result = conn.run(&cmd).await;
        conn.close().await;
        result
    }
}

#[async_trait]
impl Deployer for SshDeployer {
    async fn deploy_agent(&self, servers: &[String]) -> Result<PathBuf, DeployError> {
        tracing::info!("Start to deploy agent binary");
        let agent_dir = self.access.base_dir.join(AGENT_DIR_NAME);
        let remote_bin = agent_dir.join(AGENT_BIN_NAME);
        let remote_bin = remote_bin.to_string_lossy();

        let data = std::fs::read(&self.agent_binary).map_err(|e| DeployError::Io {
            path: self.agent_binary.clone(),
            source: e,
        })?;

        for server in servers {
            let conn = self.connect(server).await?;
            let deployed = conn.run(&format!("test -x {}", quote(&remote_bin))).await;
            if deployed.is_ok() {
                tracing::info!("Agent already deployed on {}", server);
                conn.close().await;
                continue;
            }

            tracing::info!("Copy agent to {}:{}", server, remote_bin);
            let result = async {
                conn.run(&format!("mkdir -p {}", quote(&agent_dir.to_string_lossy())))
                    .await?;
                conn.push(&data, &remote_bin, "755").await
            }
            .await;
            conn.close().await;
            result?;
        }

        Ok(agent_dir)
    }

    async fn deploy_tests(
        &self,
        tests: &[TestCase],
        servers: &[String],
    ) -> Result<PathBuf, DeployError> {
        tracing::info!("Start to deploy test scripts");
        let remote_dir = self.access.base_dir.join(unique_name("test_"));

        for server in servers {
            let conn = self.connect(server).await?;
            let result: Result<(), DeployError> = async {
                for case in tests {
                    let remote_file = remote_dir.join(&case.rel_path);
                    let parent = remote_file
                        .parent()
                        .unwrap_or(&remote_dir)
                        .to_string_lossy()
                        .into_owned();
                    tracing::debug!(
                        "Copy {} to {}:{}",
                        case.rel_path,
                        server,
                        remote_file.display()
                    );

                    let data = std::fs::read(&case.abs_path).map_err(|e| DeployError::Io {
                        path: case.abs_path.clone(),
                        source: e,
                    })?;
                    conn.run(&format!("mkdir -p {}", quote(&parent))).await?;
                    conn.push(&data, &remote_file.to_string_lossy(), "755").await?;
                }
                Ok(())
            }
            .await;
            conn.close().await;
            result?;
        }

        Ok(remote_dir)
    }

    async fn download(&self, remote_ref: &str, dest_dir: &Path) -> Result<PathBuf, DeployError> {
        let (host, remote_path) = remote_ref
            .split_once(':')
            .ok_or_else(|| DeployError::BadRemoteRef(remote_ref.to_string()))?;
        if host.is_empty() || remote_path.is_empty() {
            return Err(DeployError::BadRemoteRef(remote_ref.to_string()));
        }

        let file_name = Path::new(remote_path)
            .file_name()
            .ok_or_else(|| DeployError::BadRemoteRef(remote_ref.to_string()))?;

        std::fs::create_dir_all(dest_dir).map_err(|e| DeployError::Io {
            path: dest_dir.to_path_buf(),
            source: e,
        })?;

        let conn = self.connect(host).await?;
        let result = conn.capture(&format!("cat {}", quote(remote_path))).await;
        conn.close().await;
        let data = result?;

        let local = dest_dir.join(file_name);
        std::fs::write(&local, data).map_err(|e| DeployError::Io {
            path: local.clone(),
            source: e,
        })?;

        tracing::info!("Downloaded {} to {}", remote_ref, local.display());
        Ok(local)
    }
}

/// `<prefix>` + 8 random lowercase letters + 4 digits, as the per-run remote
/// test directory name.
fn unique_name(prefix: &str) -> String {
    let mut rng = rand::thread_rng();
    let letters: String = (0..8).map(|_| rng.gen_range(b'a'..=b'z') as char).collect();
    let digits: String = (0..4).map(|_| rng.gen_range(0..10).to_string()).collect();
    format!("{}{}{}", prefix, letters, digits)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unique_name_shape() {
        let name = unique_name("test_");
        assert_eq!(name.len(), "test_".len() + 12);
        assert!(name.starts_with("test_"));
        let suffix = &name["test_".len()..];
        assert!(suffix[..8].chars().all(|c| c.is_ascii_lowercase()));
        assert!(suffix[8..].chars().all(|c| c.is_ascii_digit()));
    }

    #[test]
    fn test_unique_names_differ() {
        assert_ne!(unique_name("test_"), unique_name("test_"));
    }
}
