//! Sync daemon acceptor
//!
//! Accepts inbound agent connections on the sync port and runs a russh
//! handler for each. Authentication is a single allowed identity/credential
//! pair; authenticated session channels are wrapped in [`DaemonSession`]s and
//! registered for the dispatch loop.

use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use bytes::Bytes;
use russh::server::{Auth, Handler, Msg, Session};
use russh::{Channel, ChannelId};
use russh_keys::key::KeyPair;
use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use ft_core::config::DaemonConfig;
use ft_protocol::MAX_FRAME_SIZE;

use super::registry::SessionRegistry;
use super::session::DaemonSession;

/// Queued inbound frames per session. Agents stop-and-wait on acks, so this
/// only needs to absorb a short burst.
const INBOUND_QUEUE: usize = 64;

/// Accept connections until cancelled.
pub(super) async fn accept_loop(
    listener: TcpListener,
    config: DaemonConfig,
    registry: Arc<SessionRegistry>,
    cancel: CancellationToken,
) -> Result<()> {
    let ssh_config = server_config()?;

    loop {
        tokio::select! {
            _ = cancel.cancelled() => {
                tracing::debug!("Acceptor shutting down");
                break;
            }

            result = listener.accept() => {
                match result {
                    Ok((socket, peer_addr)) => {
                        tracing::info!("New sync connection from {}", peer_addr);
                        let handler = AgentHandler::new(config.clone(), Arc::clone(&registry));
                        let ssh_config = Arc::clone(&ssh_config);
                        let cancel = cancel.clone();

                        tokio::spawn(async move {
                            let result = tokio::select! {
                                _ = cancel.cancelled() => return,
                                result = russh::server::run_stream(ssh_config, socket, handler) => result,
                            };
                            match result {
                                Ok(_) => tracing::debug!("Connection from {} closed", peer_addr),
                                Err(e) => {
                                    tracing::warn!("Connection from {} closed with error: {}", peer_addr, e)
                                }
                            }
                        });
                    }
                    Err(e) => {
                        tracing::error!("Failed to accept connection: {}", e);
                    }
                }
            }
        }
    }

    Ok(())
}

/// Build the russh server configuration with a per-run host key.
///
/// The key is held in memory only: agents do not pin the daemon's host key,
/// the channel is authenticated by the shared sync credential instead.
fn server_config() -> Result<Arc<russh::server::Config>> {
    let host_key = KeyPair::generate_ed25519()
        .ok_or_else(|| anyhow::anyhow!("Failed to generate Ed25519 host key"))?;

    let mut config = russh::server::Config::default();
    config.keys.push(host_key);
    config.auth_rejection_time = std::time::Duration::from_secs(1);
    config.auth_rejection_time_initial = Some(std::time::Duration::from_secs(0));

    Ok(Arc::new(config))
}

/// Handler for one agent connection.
struct AgentHandler {
    config: DaemonConfig,
    registry: Arc<SessionRegistry>,
    /// Filled once the session channel opens
    inbound_tx: Option<mpsc::Sender<Bytes>>,
    session: Option<Arc<DaemonSession>>,
}

impl AgentHandler {
    fn new(config: DaemonConfig, registry: Arc<SessionRegistry>) -> Self {
        Self {
            config,
            registry,
            inbound_tx: None,
            session: None,
        }
    }
}

impl Drop for AgentHandler {
    fn drop(&mut self) {
        // The connection task is gone; the dispatch loop deregisters the
        // session on its next pass.
        if let Some(session) = &self.session {
            session.mark_inactive();
        }
    }
}

#[async_trait]
impl Handler for AgentHandler {
    type Error = anyhow::Error;

    async fn auth_password(&mut self, user: &str, password: &str) -> Result<Auth, Self::Error> {
        if user == self.config.username && password == self.config.password {
            tracing::debug!("Sync auth accepted for {}", user);
            Ok(Auth::Accept)
        } else {
            tracing::warn!("Sync auth REJECTED for user {:?}", user);
            Ok(Auth::Reject {
                proceed_with_methods: None,
            })
        }
    }

    async fn channel_open_session(
        &mut self,
        channel: Channel<Msg>,
        session: &mut Session,
    ) -> Result<bool, Self::Error> {
        let channel_id = channel.id();
        tracing::debug!("Sync channel opened: {:?}", channel_id);

        let (tx, rx) = mpsc::channel(INBOUND_QUEUE);
        let daemon_session = Arc::new(DaemonSession::new(session.handle(), channel_id, rx));

        self.inbound_tx = Some(tx);
        self.session = Some(Arc::clone(&daemon_session));
        self.registry.register(daemon_session).await;

        Ok(true)
    }

    async fn data(
        &mut self,
        channel: ChannelId,
        data: &[u8],
        _session: &mut Session,
    ) -> Result<(), Self::Error> {
        tracing::trace!("Received {} bytes on channel {:?}", data.len(), channel);

        if data.len() > MAX_FRAME_SIZE {
            tracing::warn!(
                "Dropping oversized frame on {:?}: {} bytes > {}",
                channel,
                data.len(),
                MAX_FRAME_SIZE
            );
            return Ok(());
        }

        if let Some(tx) = &self.inbound_tx {
            if tx.send(Bytes::copy_from_slice(data)).await.is_err() {
                tracing::debug!("Inbound queue gone for {:?}", channel);
            }
        }

        Ok(())
    }

    async fn channel_close(
        &mut self,
        channel: ChannelId,
        _session: &mut Session,
    ) -> Result<(), Self::Error> {
        tracing::debug!("Sync channel closed: {:?}", channel);
        if let Some(session) = &self.session {
            session.mark_inactive();
        }
        Ok(())
    }

    async fn channel_eof(
        &mut self,
        channel: ChannelId,
        _session: &mut Session,
    ) -> Result<(), Self::Error> {
        tracing::debug!("Sync channel EOF: {:?}", channel);
        if let Some(session) = &self.session {
            session.mark_inactive();
        }
        Ok(())
    }
}
