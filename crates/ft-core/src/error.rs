//! Core error types for fleetest

use std::path::PathBuf;

use ft_protocol::ProtocolError;
use thiserror::Error;

/// Top-level error type for the fleetest ecosystem
#[derive(Error, Debug)]
pub enum FtError {
    /// Protocol error
    #[error("Protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    /// Sync channel error
    #[error("Sync error: {0}")]
    Sync(#[from] SyncError),

    /// Configuration or argument error
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Test catalog error
    #[error("Catalog error: {0}")]
    Catalog(#[from] CatalogError),

    /// Deployment error
    #[error("Deployment error: {0}")]
    Deploy(#[from] DeployError),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Errors on the sync channel between agents and the daemon
#[derive(Error, Debug)]
pub enum SyncError {
    /// Lost the ability to report progress reliably; fatal to the agent
    #[error("Can't sync up with server after {attempts} attempts: {request:?}")]
    SessionBroken { attempts: u32, request: String },

    /// The sync identity was rejected by the daemon
    #[error("Sync authentication rejected for user {0}")]
    AuthRejected(String),

    /// Could not reach the daemon
    #[error("Failed to connect to {addr}: {reason}")]
    ConnectionFailed { addr: String, reason: String },

    /// The peer closed the session
    #[error("Session closed by peer")]
    SessionClosed,

    /// An update named a status outside the known result set.
    /// Indicates an incompatible agent/controller pair; fatal to the run.
    #[error("Illegal result for {script}: {status:?}")]
    IllegalResult { script: String, status: String },

    /// Underlying transport failure
    #[error("Transport error: {0}")]
    Transport(String),
}

/// Configuration and argument errors
#[derive(Error, Debug)]
pub enum ConfigError {
    /// Config file not found
    #[error("Config file not found: {0:?}")]
    NotFound(PathBuf),

    /// Invalid configuration contents
    #[error("Invalid config: {0}")]
    Invalid(String),

    /// TOML parse error
    #[error("TOML parse error: {0}")]
    Parse(#[from] toml::de::Error),

    /// Conflicting or missing test selection arguments
    #[error("Invalid arguments: {0}")]
    InvalidArguments(String),

    /// One or more target servers could not be reached
    #[error("Servers can't be connected: {}", format_unreachable(.0))]
    UnreachableServers(Vec<(String, String)>),
}

/// Errors raised during test discovery
#[derive(Error, Debug)]
pub enum CatalogError {
    /// A group or parallel directive that does not parse
    #[error("Malformed directive {line:?} in {script:?}")]
    MalformedScript { script: PathBuf, line: String },

    /// More than one `#parallel` line in one script
    #[error("More than one \"#parallel : ...\" line in {0:?}")]
    DuplicateParallel(PathBuf),

    /// The test root or an explicitly requested script is missing
    #[error("Test script not found: {0:?}")]
    ScriptNotFound(PathBuf),

    /// Failed to read a script while parsing directives
    #[error("Failed to read {script:?}: {source}")]
    Unreadable {
        script: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Errors raised by the deployment collaborator
#[derive(Error, Debug)]
pub enum DeployError {
    /// SSH connection or authentication failure
    #[error("Failed to connect to {server}: {reason}")]
    Connect { server: String, reason: String },

    /// A remote command exited non-zero
    #[error("Remote command failed on {server} (exit {code}): {cmd}")]
    CommandFailed {
        server: String,
        cmd: String,
        code: u32,
    },

    /// A `host:path` reference that does not split
    #[error("Invalid remote file reference {0:?}, expected \"host:path\"")]
    BadRemoteRef(String),

    /// Local filesystem failure while staging or downloading
    #[error("I/O error for {path:?}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

fn format_unreachable(servers: &[(String, String)]) -> String {
    servers
        .iter()
        .map(|(server, reason)| format!("{server} ({reason})"))
        .collect::<Vec<_>>()
        .join(", ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unreachable_servers_names_each_server() {
        let err = ConfigError::UnreachableServers(vec![
            ("host1".into(), "timed out".into()),
            ("host2".into(), "refused".into()),
        ]);
        let text = err.to_string();
        assert!(text.contains("host1 (timed out)"));
        assert!(text.contains("host2 (refused)"));
    }
}
