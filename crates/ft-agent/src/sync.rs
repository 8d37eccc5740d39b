//! Sync client
//!
//! Reports one status change at a time to the controller daemon with
//! retry-until-acknowledged semantics: send, wait for the ack, and resend up
//! to the retry budget when what comes back is not byte-equal to the expected
//! ack. Byte equality, not structural comparison, is the deliberate matching
//! rule and must be preserved for compatibility.
//!
//! A run that exhausts the budget has lost reliable reporting; that is fatal
//! to this agent (other agents are unaffected, each reports independently).

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use russh::client::{self, Handle, Msg};
use russh::{Channel, Disconnect};
use russh_keys::key::PublicKey;
use tokio::sync::{mpsc, Mutex};

use ft_core::config::{DEFAULT_SYNC_PASSWORD, DEFAULT_SYNC_USER};
use ft_core::error::SyncError;
use ft_core::traits::SyncSession;
use ft_core::types::TestResult;
use ft_protocol::{AckMessage, MessageIdGen, SyncMessage};

/// Resends after the initial attempt before giving up.
const MAX_RETRIES: u32 = 3;
/// Upper bound on one ack wait; a timeout counts against the retry budget.
const ACK_TIMEOUT: Duration = Duration::from_secs(5);
const CONNECT_TIMEOUT: Duration = Duration::from_secs(5);

/// Reports progress for one agent process.
pub struct SyncClient {
    session: Arc<dyn SyncSession>,
    ids: MessageIdGen,
}

impl SyncClient {
    /// Connect to the controller's sync daemon.
    pub async fn connect(server: &str, port: u16) -> Result<Self, SyncError> {
        let session = AgentSession::connect(server, port).await?;
        Ok(Self::new(Arc::new(session)))
    }

    /// Build a client over an existing session (used by tests).
    pub fn new(session: Arc<dyn SyncSession>) -> Self {
        Self {
            session,
            ids: MessageIdGen::new(),
        }
    }

    /// Report one test's status change.
    pub async fn report_progress(
        &self,
        script: &str,
        status: TestResult,
        bundle: Option<&str>,
    ) -> Result<(), SyncError> {
        let mut msg = SyncMessage::new(self.ids.next_id(), script, status.as_str());
        if let Some(bundle) = bundle {
            msg = msg.with_bundle(bundle);
        }
        let expected_ack = AckMessage::new(msg.id).encode();
        self.notify(msg.encode(), expected_ack).await
    }

    /// Tell the controller this agent has no more tests.
    pub async fn notify_all_done(&self) -> Result<(), SyncError> {
        let msg = SyncMessage::sentinel(self.ids.next_id());
        let expected_ack = AckMessage::new(msg.id).encode();
        self.notify(msg.encode(), expected_ack).await
    }

    /// Deliver `request` until the response byte-equals `expected_ack`.
    async fn notify(&self, request: Bytes, expected_ack: Bytes) -> Result<(), SyncError> {
        let mut retries = 0;

        self.session.send(&request).await?;
        let mut reply = self.receive_reply().await?;

        loop {
            if reply.as_deref() == Some(&expected_ack[..]) {
                return Ok(());
            }
            if retries == MAX_RETRIES {
                return Err(SyncError::SessionBroken {
                    attempts: 1 + retries,
                    request: String::from_utf8_lossy(&request).into_owned(),
                });
            }

            retries += 1;
            tracing::warn!(
                "No matching ack, resend (retry {}/{})",
                retries,
                MAX_RETRIES
            );
            self.session.send(&request).await?;
            reply = self.receive_reply().await?;
        }
    }

    /// One bounded ack wait. `None` on timeout; a closed session is fatal
    /// immediately, there is nothing left to retry against.
    async fn receive_reply(&self) -> Result<Option<Bytes>, SyncError> {
        match tokio::time::timeout(ACK_TIMEOUT, self.session.receive()).await {
            Ok(Ok(reply)) => Ok(Some(reply)),
            Ok(Err(e)) => Err(e),
            Err(_) => Ok(None),
        }
    }

    /// Close the underlying session.
    pub async fn close(&self) {
        self.session.close().await;
    }
}

/// russh client handler: inbound channel data goes straight into the
/// session's queue. The daemon's host key is fresh per run and not pinned;
/// the channel is authenticated by the shared sync credential instead.
struct DaemonClientHandler {
    inbound_tx: mpsc::Sender<Bytes>,
}

#[async_trait]
impl client::Handler for DaemonClientHandler {
    type Error = anyhow::Error;

    async fn check_server_key(&mut self, _server_public_key: &PublicKey) -> Result<bool, Self::Error> {
        Ok(true)
    }

    async fn data(
        &mut self,
        _channel: russh::ChannelId,
        data: &[u8],
        _session: &mut client::Session,
    ) -> Result<(), Self::Error> {
        let _ = self.inbound_tx.send(Bytes::copy_from_slice(data)).await;
        Ok(())
    }
}

/// Agent-side implementation of the session seam over one SSH channel.
pub struct AgentSession {
    handle: Handle<DaemonClientHandler>,
    channel: Channel<Msg>,
    inbound: Mutex<mpsc::Receiver<Bytes>>,
    active: AtomicBool,
}

impl AgentSession {
    /// Connect and authenticate with the shared sync identity.
    pub async fn connect(server: &str, port: u16) -> Result<Self, SyncError> {
        let config = Arc::new(client::Config::default());
        let (inbound_tx, inbound_rx) = mpsc::channel(64);
        let handler = DaemonClientHandler { inbound_tx };

        tracing::info!("Connect to {}:{}", server, port);
        let connect = client::connect(config, (server, port), handler);
        let mut handle = tokio::time::timeout(CONNECT_TIMEOUT, connect)
            .await
            .map_err(|_| SyncError::ConnectionFailed {
                addr: format!("{}:{}", server, port),
                reason: "connection timed out".to_string(),
            })?
            .map_err(|e| SyncError::ConnectionFailed {
                addr: format!("{}:{}", server, port),
                reason: e.to_string(),
            })?;

        let authenticated = handle
            .authenticate_password(DEFAULT_SYNC_USER, DEFAULT_SYNC_PASSWORD)
            .await
            .map_err(|e| SyncError::Transport(e.to_string()))?;
        if !authenticated {
            return Err(SyncError::AuthRejected(DEFAULT_SYNC_USER.to_string()));
        }

        let channel = handle
            .channel_open_session()
            .await
            .map_err(|e| SyncError::Transport(e.to_string()))?;

        tracing::info!("Server is connected");
        Ok(Self {
            handle,
            channel,
            inbound: Mutex::new(inbound_rx),
            active: AtomicBool::new(true),
        })
    }
}

#[async_trait]
impl SyncSession for AgentSession {
    async fn send(&self, payload: &[u8]) -> Result<(), SyncError> {
        self.channel.data(payload).await.map_err(|e| {
            self.active.store(false, Ordering::Release);
            SyncError::Transport(e.to_string())
        })
    }

    async fn receive(&self) -> Result<Bytes, SyncError> {
        self.inbound
            .lock()
            .await
            .recv()
            .await
            .ok_or(SyncError::SessionClosed)
    }

    async fn try_receive(&self) -> Option<Bytes> {
        self.inbound.lock().await.try_recv().ok()
    }

    fn is_active(&self) -> bool {
        self.active.load(Ordering::Acquire) && !self.handle.is_closed()
    }

    async fn close(&self) {
        self.active.store(false, Ordering::Release);
        let _ = self
            .handle
            .disconnect(Disconnect::ByApplication, "closing", "en")
            .await;
    }
}
