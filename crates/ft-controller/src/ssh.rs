//! SSH client helper
//!
//! A thin russh client used for everything the controller does *to* the test
//! servers: connectivity checks, staging files, launching agents, and
//! fetching failure bundles. File transfer rides on `exec` channels
//! (`cat > path` with the payload on stdin; `cat path` for downloads), which
//! keeps the remote side free of any requirement beyond a POSIX shell.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use russh::client::{self, Handle};
use russh::{ChannelMsg, Disconnect};
use russh_keys::key::PublicKey;

use ft_core::error::DeployError;

const CONNECT_TIMEOUT: Duration = Duration::from_secs(5);

/// Accepts any server host key, matching the original auto-add trust model
/// for in-lab test servers.
struct TrustingClient;

#[async_trait]
impl client::Handler for TrustingClient {
    type Error = anyhow::Error;

    async fn check_server_key(&mut self, _server_public_key: &PublicKey) -> Result<bool, Self::Error> {
        Ok(true)
    }
}

/// One authenticated connection to a test server.
pub struct SshConn {
    session: Handle<TrustingClient>,
    server: String,
}

impl SshConn {
    /// Connect and authenticate with a password.
    pub async fn connect(
        server: &str,
        port: u16,
        username: &str,
        password: &str,
    ) -> Result<Self, DeployError> {
        let config = Arc::new(client::Config::default());

        let connect = client::connect(config, (server, port), TrustingClient);
        let mut session = tokio::time::timeout(CONNECT_TIMEOUT, connect)
            .await
            .map_err(|_| DeployError::Connect {
                server: server.to_string(),
                reason: "connection timed out".to_string(),
            })?
            .map_err(|e| DeployError::Connect {
                server: server.to_string(),
                reason: e.to_string(),
            })?;

        let authenticated = session
            .authenticate_password(username, password)
            .await
            .map_err(|e| DeployError::Connect {
                server: server.to_string(),
                reason: e.to_string(),
            })?;
        if !authenticated {
            return Err(DeployError::Connect {
                server: server.to_string(),
                reason: format!("authentication rejected for user {:?}", username),
            });
        }

        tracing::debug!("Connected to {}:{}", server, port);
        Ok(Self {
            session,
            server: server.to_string(),
        })
    }

    /// Run a command, discarding output; error on non-zero exit.
    pub async fn run(&self, cmd: &str) -> Result<(), DeployError> {
        let (_, code) = self.exec(cmd, None).await?;
        if code != 0 {
            return Err(DeployError::CommandFailed {
                server: self.server.clone(),
                cmd: cmd.to_string(),
                code,
            });
        }
        Ok(())
    }

    /// Run a command and collect its stdout; error on non-zero exit.
    pub async fn capture(&self, cmd: &str) -> Result<Vec<u8>, DeployError> {
        let (output, code) = self.exec(cmd, None).await?;
        if code != 0 {
            return Err(DeployError::CommandFailed {
                server: self.server.clone(),
                cmd: cmd.to_string(),
                code,
            });
        }
        Ok(output)
    }

    /// Write `data` to `remote_path` and set its mode.
    pub async fn push(&self, data: &[u8], remote_path: &str, mode: &str) -> Result<(), DeployError> {
        let cmd = format!(
            "cat > {path} && chmod {mode} {path}",
            path = quote(remote_path),
            mode = mode
        );
        let (_, code) = self.exec(&cmd, Some(data)).await?;
        if code != 0 {
            return Err(DeployError::CommandFailed {
                server: self.server.clone(),
                cmd,
                code,
            });
        }
        Ok(())
    }

    async fn exec(&self, cmd: &str, stdin: Option<&[u8]>) -> Result<(Vec<u8>, u32), DeployError> {
        let transport = |e: russh::Error| DeployError::Connect {
            server: self.server.clone(),
            reason: e.to_string(),
        };

        let mut channel = self
            .session
            .channel_open_session()
            .await
            .map_err(transport)?;
        channel.exec(true, cmd).await.map_err(transport)?;

        if let Some(data) = stdin {
            channel.data(data).await.map_err(transport)?;
            channel.eof().await.map_err(transport)?;
        }

        let mut output = Vec::new();
        let mut code = 0;
        while let Some(msg) = channel.wait().await {
            match msg {
                ChannelMsg::Data { data } => output.extend_from_slice(&data),
                ChannelMsg::ExitStatus { exit_status } => code = exit_status,
                _ => {}
            }
        }

        Ok((output, code))
    }

    /// Close the connection.
    pub async fn close(&self) {
        let _ = self
            .session
            .disconnect(Disconnect::ByApplication, "closing", "en")
            .await;
        tracing::debug!("Disconnected from {}", self.server);
    }
}

/// Single-quote a string for a POSIX shell.
pub fn quote(s: &str) -> String {
    format!("'{}'", s.replace('\'', r"'\''"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_quote_plain_path() {
        assert_eq!(quote("/local/test_abc"), "'/local/test_abc'");
    }

    #[test]
    fn test_quote_embedded_quote() {
        assert_eq!(quote("a'b"), r"'a'\''b'");
    }
}
