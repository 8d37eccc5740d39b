//! The session seam

use async_trait::async_trait;
use bytes::Bytes;

use crate::error::SyncError;

/// A reliable, ordered, bidirectional byte channel between one agent and the
/// daemon.
///
/// The transport collaborator supplies implementations on both sides; the
/// protocol core never sees anything wider than this. Payloads are whole
/// frames of at most [`ft_protocol::MAX_FRAME_SIZE`] bytes.
#[async_trait]
pub trait SyncSession: Send + Sync {
    /// Send one frame to the peer.
    async fn send(&self, payload: &[u8]) -> Result<(), SyncError>;

    /// Wait for the next inbound frame.
    async fn receive(&self) -> Result<Bytes, SyncError>;

    /// Take one inbound frame if one is already buffered. Used by the
    /// daemon's dispatch loop to poll many sessions without blocking on any.
    async fn try_receive(&self) -> Option<Bytes>;

    /// Whether the underlying connection is still usable.
    fn is_active(&self) -> bool;

    /// Close the session. Idempotent.
    async fn close(&self);
}
