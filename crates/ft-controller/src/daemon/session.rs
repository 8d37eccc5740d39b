//! Daemon-side session wrapper
//!
//! Wraps one accepted SSH channel behind the narrow [`SyncSession`] seam.
//! Inbound frames arrive through an mpsc queue filled by the connection
//! handler's `data` callback; outbound frames go through the russh session
//! handle.

use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use bytes::Bytes;
use russh::server::Handle;
use russh::{ChannelId, CryptoVec};
use tokio::sync::mpsc;
use tokio::sync::Mutex;

use ft_core::error::SyncError;
use ft_core::traits::SyncSession;

pub struct DaemonSession {
    handle: Handle,
    channel: ChannelId,
    inbound: Mutex<mpsc::Receiver<Bytes>>,
    active: AtomicBool,
}

impl DaemonSession {
    pub fn new(handle: Handle, channel: ChannelId, inbound: mpsc::Receiver<Bytes>) -> Self {
        Self {
            handle,
            channel,
            inbound: Mutex::new(inbound),
            active: AtomicBool::new(true),
        }
    }

    /// Called by the connection handler when the channel goes away.
    pub fn mark_inactive(&self) {
        self.active.store(false, Ordering::Release);
    }
}

#[async_trait]
impl SyncSession for DaemonSession {
    async fn send(&self, payload: &[u8]) -> Result<(), SyncError> {
        if self
            .handle
            .data(self.channel, CryptoVec::from_slice(payload))
            .await
            .is_err()
        {
            self.mark_inactive();
            return Err(SyncError::SessionClosed);
        }
        Ok(())
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
        match self.inbound.lock().await.try_recv() {
            Ok(frame) => Some(frame),
            Err(mpsc::error::TryRecvError::Empty) => None,
            Err(mpsc::error::TryRecvError::Disconnected) => {
                self.mark_inactive();
                None
            }
        }
    }

    fn is_active(&self) -> bool {
        self.active.load(Ordering::Acquire)
    }

    async fn close(&self) {
        self.mark_inactive();
        let _ = self.handle.close(self.channel).await;
    }
}
