//! Dispatch loop
//!
//! Polls every registered session for one frame per pass and hands frames to
//! the report handler, all under the registry lock. A pass that reads nothing
//! is followed by a fixed one-second backoff, which bounds idle CPU while
//! keeping response latency within the backoff interval.

use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;

use ft_core::error::SyncError;

use super::registry::SessionRegistry;
use super::ReportHandler;

/// Idle backoff between empty poll passes.
const POLL_BACKOFF: Duration = Duration::from_secs(1);

pub(super) async fn dispatch_loop(
    registry: Arc<SessionRegistry>,
    handler: Arc<dyn ReportHandler>,
    cancel: CancellationToken,
) -> Result<(), SyncError> {
    let result = poll_until_stopped(&registry, handler.as_ref(), &cancel).await;

    // Stop or handler failure: close whatever is still connected.
    registry.close_all().await;
    result
}

async fn poll_until_stopped(
    registry: &SessionRegistry,
    handler: &dyn ReportHandler,
    cancel: &CancellationToken,
) -> Result<(), SyncError> {
    loop {
        let mut read_any = false;

        {
            let mut sessions = registry.lock().await;
            sessions.retain(|handle, session| {
                if session.is_active() {
                    true
                } else {
                    tracing::debug!("Dropping inactive sync session {}", handle);
                    false
                }
            });

            for (&handle, session) in sessions.iter() {
                if let Some(frame) = session.try_receive().await {
                    handler.on_report(session.as_ref(), handle, &frame).await?;
                    read_any = true;
                }
            }
        }

        if cancel.is_cancelled() {
            tracing::debug!("Dispatcher shutting down");
            return Ok(());
        }

        if !read_any {
            tokio::select! {
                _ = cancel.cancelled() => return Ok(()),
                _ = tokio::time::sleep(POLL_BACKOFF) => {}
            }
        }
    }
}
