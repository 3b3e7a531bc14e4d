use std::future::Future;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::debug;
use tracing::error;

use crate::Result;

/// Spawns a named long-running task, logging how it ended.
pub(crate) fn spawn_task<F, Fut>(
    name: &str,
    task_fn: F,
    handles: Option<&mut Vec<JoinHandle<()>>>,
) where
    F: FnOnce() -> Fut + Send + 'static,
    Fut: Future<Output = Result<()>> + Send + 'static,
{
    let name = name.to_string();
    let handle = tokio::spawn(async move {
        match task_fn().await {
            Ok(()) => debug!("spawned task: {name} stopped"),
            Err(e) => error!("spawned task: {name} stopped or encountered an error: {:?}", e),
        }
    });

    if let Some(h) = handles {
        h.push(handle);
    }
}

/// Sleeps for `duration` unless `shutdown` fires first.
///
/// Returns `false` when the caller should stop.
pub(crate) async fn sleep_or_cancelled(
    duration: Duration,
    shutdown: &CancellationToken,
) -> bool {
    tokio::select! {
        _ = shutdown.cancelled() => false,
        _ = tokio::time::sleep(duration) => true,
    }
}
