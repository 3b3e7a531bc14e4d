use tokio::sync::mpsc;
use tracing::error;
use tracing::warn;

use crate::Error;

/// Failure reported by a worker to its supervisor
#[derive(Debug)]
pub struct AbortSignal {
    pub reason: String,
    pub cause: Error,
}

/// Sending half of a supervisor's abort channel.
///
/// Connection loss is transient and never reaches the supervisor; every
/// other cause does.
#[derive(Debug, Clone)]
pub struct AbortHandle {
    tx: mpsc::UnboundedSender<AbortSignal>,
}

impl AbortHandle {
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<AbortSignal>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }

    /// Returns `true` if the signal was forwarded to the supervisor.
    pub fn abort(
        &self,
        reason: impl Into<String>,
        cause: Error,
    ) -> bool {
        let reason = reason.into();
        if cause.is_connection_loss() {
            warn!("{reason}: {cause}, treated as transient");
            return false;
        }
        error!("{reason}: {cause:?}");
        self.tx.send(AbortSignal { reason, cause }).is_ok()
    }
}
