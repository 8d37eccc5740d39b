//! Session registry
//!
//! Maps opaque session handles to accepted sync sessions. Mutated by both
//! the acceptor (insert) and the dispatch loop (remove), so every access goes
//! through the one lock. Dispatch holds the lock for a whole poll pass; that
//! serialization is what lets the result tracker go without locking of its
//! own.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use tokio::sync::{Mutex, MutexGuard};

use ft_core::traits::SyncSession;

/// Registry of live agent sessions.
pub struct SessionRegistry {
    sessions: Mutex<HashMap<u64, Arc<dyn SyncSession>>>,
    next_handle: AtomicU64,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self {
            sessions: Mutex::new(HashMap::new()),
            next_handle: AtomicU64::new(1),
        }
    }

    /// Register an accepted session; returns its opaque handle.
    pub async fn register(&self, session: Arc<dyn SyncSession>) -> u64 {
        let handle = self.next_handle.fetch_add(1, Ordering::Relaxed);
        self.sessions.lock().await.insert(handle, session);
        tracing::debug!("Registered sync session {}", handle);
        handle
    }

    /// Acquire the registry lock for a dispatch pass.
    pub async fn lock(&self) -> MutexGuard<'_, HashMap<u64, Arc<dyn SyncSession>>> {
        self.sessions.lock().await
    }

    /// Number of registered sessions.
    pub async fn len(&self) -> usize {
        self.sessions.lock().await.len()
    }

    /// Close and drop every remaining session.
    pub async fn close_all(&self) {
        let mut sessions = self.sessions.lock().await;
        for (handle, session) in sessions.drain() {
            tracing::debug!("Closing sync session {}", handle);
            session.close().await;
        }
    }
}

impl Default for SessionRegistry {
    fn default() -> Self {
        Self::new()
    }
}
