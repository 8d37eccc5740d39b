//! The sync daemon
//!
//! A connection-multiplexing server on the controller: an acceptor task takes
//! inbound agent sessions on the sync port, and a dispatch task polls every
//! registered session for frames and hands them to the registered
//! [`ReportHandler`]. Dispatch is single-threaded and serialized under the
//! registry lock, so the handler never observes concurrent invocations.

mod dispatch;
mod listener;
mod registry;
mod session;

pub use registry::SessionRegistry;
pub use session::DaemonSession;

use std::sync::Arc;

use anyhow::{Context, Result};
use async_trait::async_trait;
use tokio::net::TcpListener;
use tokio::sync::oneshot;
use tokio_util::sync::CancellationToken;

use ft_core::config::DaemonConfig;
use ft_core::error::SyncError;
use ft_core::traits::SyncSession;

/// Capability invoked once per inbound frame.
///
/// The daemon depends only on this seam, never on a concrete tracker type.
/// The handler is expected to reply through `responder` with an ack; an error
/// is a protocol-integrity violation and aborts the daemon.
#[async_trait]
pub trait ReportHandler: Send + Sync {
    async fn on_report(
        &self,
        responder: &dyn SyncSession,
        session: u64,
        raw: &[u8],
    ) -> Result<(), SyncError>;
}

/// The controller-side sync server.
pub struct SyncDaemon {
    config: DaemonConfig,
    registry: Arc<SessionRegistry>,
    handler: Arc<dyn ReportHandler>,
    cancel: CancellationToken,
}

impl SyncDaemon {
    /// Create a daemon that dispatches frames to `handler`.
    pub fn new(config: DaemonConfig, handler: Arc<dyn ReportHandler>) -> Self {
        Self {
            config,
            registry: Arc::new(SessionRegistry::new()),
            handler,
            cancel: CancellationToken::new(),
        }
    }

    /// Request cooperative shutdown. The dispatch loop notices within one
    /// backoff interval and closes every remaining session.
    pub fn stop(&self) {
        self.cancel.cancel();
    }

    /// The session registry (exposed for tests).
    pub fn registry(&self) -> &Arc<SessionRegistry> {
        &self.registry
    }

    /// Run acceptor and dispatcher until stopped or until the handler fails.
    ///
    /// Sends the bound port through `ready` once the listener is up, so the
    /// caller can confirm the daemon is listening before launching agents.
    pub async fn run(&self, ready: oneshot::Sender<u16>) -> Result<()> {
        let listener = TcpListener::bind(("0.0.0.0", self.config.port))
            .await
            .with_context(|| format!("Failed to bind sync port {}", self.config.port))?;
        let port = listener.local_addr()?.port();
        tracing::info!("Sync daemon listening on *:{}", port);
        let _ = ready.send(port);

        let accept = tokio::spawn(listener::accept_loop(
            listener,
            self.config.clone(),
            Arc::clone(&self.registry),
            self.cancel.clone(),
        ));

        let result = dispatch::dispatch_loop(
            Arc::clone(&self.registry),
            Arc::clone(&self.handler),
            self.cancel.clone(),
        )
        .await;

        // Dispatch is done (stop or handler failure); take the acceptor down
        // with it either way.
        self.cancel.cancel();
        let _ = accept.await;

        tracing::info!("Sync daemon stopped");
        result.map_err(Into::into)
    }
}
