//! Configuration management for fleetest
//!
//! The controller reads a TOML file with three sections: `[server]` holds the
//! SSH credentials used for deployment and remote execution on the test
//! servers, `[daemon]` the sync-channel identity and port, and `[controller]`
//! local paths. Every field has a default so a missing file still yields a
//! working local setup.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// Default identity agents authenticate with on the sync channel.
pub const DEFAULT_SYNC_USER: &str = "fleetest-agent";
/// Default credential paired with [`DEFAULT_SYNC_USER`].
pub const DEFAULT_SYNC_PASSWORD: &str = "syncme";
/// Default port the sync daemon listens on.
pub const DEFAULT_SYNC_PORT: u16 = 17258;

/// Controller configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ControllerConfig {
    /// SSH access to the test servers
    #[serde(default)]
    pub server: ServerAccess,
    /// Sync daemon identity and port
    #[serde(default)]
    pub daemon: DaemonConfig,
    /// Local paths
    #[serde(default)]
    pub controller: LocalPaths,
}

/// SSH credentials and the staging directory on the test servers.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerAccess {
    /// SSH user on every test server
    pub username: String,
    /// SSH password for that user
    pub password: String,
    /// Directory on the servers under which agent and tests are staged
    pub base_dir: PathBuf,
    /// SSH port of the test servers
    #[serde(default = "default_ssh_port")]
    pub port: u16,
}

impl Default for ServerAccess {
    fn default() -> Self {
        Self {
            username: "root".to_string(),
            password: String::new(),
            base_dir: PathBuf::from("/local"),
            port: 22,
        }
    }
}

/// The single identity/credential pair the sync daemon accepts.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DaemonConfig {
    /// Allowed sync username
    pub username: String,
    /// Allowed sync password
    pub password: String,
    /// Listen port of the sync daemon
    pub port: u16,
}

impl Default for DaemonConfig {
    fn default() -> Self {
        Self {
            username: DEFAULT_SYNC_USER.to_string(),
            password: DEFAULT_SYNC_PASSWORD.to_string(),
            port: DEFAULT_SYNC_PORT,
        }
    }
}

/// Local controller paths.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LocalPaths {
    /// Root directory of the local test catalog
    pub test_root: PathBuf,
    /// Where downloaded failure bundles are stored
    pub artifact_dir: PathBuf,
    /// The agent binary deployed to the test servers
    pub agent_binary: PathBuf,
}

impl Default for LocalPaths {
    fn default() -> Self {
        Self {
            test_root: PathBuf::from("tests"),
            artifact_dir: PathBuf::from("artifacts"),
            agent_binary: PathBuf::from("ft-agent"),
        }
    }
}

fn default_ssh_port() -> u16 {
    22
}

/// Get the default configuration directory.
pub fn default_config_dir() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("fleetest")
}

/// Get the default configuration file path.
pub fn default_config_path() -> PathBuf {
    default_config_dir().join("config.toml")
}

/// Load configuration from a file.
pub fn load_config<T: serde::de::DeserializeOwned>(path: &Path) -> Result<T, ConfigError> {
    if !path.exists() {
        return Err(ConfigError::NotFound(path.to_path_buf()));
    }

    let content = std::fs::read_to_string(path)
        .map_err(|e| ConfigError::Invalid(format!("Failed to read config: {}", e)))?;

    let config: T = toml::from_str(&content)?;
    Ok(config)
}

/// Load the controller config from `path`, or defaults when `path` is absent.
pub fn load_or_default(path: &Path) -> Result<ControllerConfig, ConfigError> {
    if path.exists() {
        load_config(path)
    } else {
        tracing::debug!("No config at {:?}, using defaults", path);
        Ok(ControllerConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_carry_sync_identity() {
        let config = ControllerConfig::default();
        assert_eq!(config.daemon.username, DEFAULT_SYNC_USER);
        assert_eq!(config.daemon.password, DEFAULT_SYNC_PASSWORD);
        assert_eq!(config.daemon.port, DEFAULT_SYNC_PORT);
    }

    #[test]
    fn test_parse_partial_config() {
        let config: ControllerConfig = toml::from_str(
            r#"
            [server]
            username = "qa"
            password = "secret"
            base_dir = "/scratch"

            [daemon]
            username = "agent"
            password = "pw"
            port = 9000
            "#,
        )
        .unwrap();

        assert_eq!(config.server.username, "qa");
        assert_eq!(config.server.port, 22);
        assert_eq!(config.daemon.port, 9000);
        assert_eq!(config.controller.test_root, PathBuf::from("tests"));
    }

    #[test]
    fn test_load_config_missing_file() {
        let err = load_config::<ControllerConfig>(Path::new("/nonexistent/fleetest.toml"))
            .unwrap_err();
        assert!(matches!(err, ConfigError::NotFound(_)));
    }
}
