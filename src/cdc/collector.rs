use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::debug;
use tracing::error;
use tracing::info;
use tracing::warn;

use super::CdcListener;
use super::HeartbeatStore;
use super::PostgresHeartbeat;
use super::QueueKind;
use crate::constants::QUEUE_START_MARKER;
use crate::coordination::ops::delete_children_recursively;
use crate::coordination::ops::ensure_path;
use crate::coordination::Connector;
use crate::watcher::AbortHandle;
use crate::watcher::AbortSignal;
use crate::watcher::WatcherHub;
use crate::CollectorConfig;
use crate::CoordinationConfig;
use crate::Result;

/// Levels below the topology root whose watches are armed at startup
const PRIME_DEPTH: usize = 2;

/// Change-data-capture producer for the topology subtree.
///
/// Owns its own session. Any failure escalated through its abort channel,
/// session expiry included, stops the collector; there is no recovery.
pub struct CdcCollector {
    hub: Arc<WatcherHub>,
    listener: Arc<CdcListener>,
    heartbeat: Option<Arc<dyn HeartbeatStore>>,
    heartbeat_interval: Duration,
    aborts: mpsc::UnboundedReceiver<AbortSignal>,
}

impl CdcCollector {
    /// Connects, resets both queues and arms the topology watches.
    ///
    /// Each queue is emptied and restarted with a single marker entry so
    /// consumers can tell a producer restart apart from a gap.
    pub async fn start(
        connector: Arc<dyn Connector>,
        coordination: &CoordinationConfig,
        heartbeat: Option<Arc<dyn HeartbeatStore>>,
        heartbeat_interval: Duration,
    ) -> Result<Self> {
        let (abort, aborts) = AbortHandle::channel();
        let hub = WatcherHub::connect(
            "collector",
            connector,
            abort,
            coordination.connect_timeout(),
        )
        .await?;
        let listener = Arc::new(CdcListener::new(hub.clone(), &coordination.root));

        let client = hub.client();
        ensure_path(client.as_ref(), listener.topology_root()).await?;
        for kind in [QueueKind::Liveness, QueueKind::Topology] {
            let queue = listener.queue_path(kind);
            ensure_path(client.as_ref(), queue).await?;
            delete_children_recursively(client.as_ref(), queue, &[]).await?;
            let entry = listener.append(kind, QUEUE_START_MARKER).await?;
            debug!("{kind} queue restarted at {entry}");
        }

        hub.register_listener(listener.clone());
        let primed = listener.prime(PRIME_DEPTH).await?;
        info!(
            "collector watching {} ({primed} nodes primed)",
            listener.topology_root()
        );

        Ok(Self {
            hub,
            listener,
            heartbeat,
            heartbeat_interval,
            aborts,
        })
    }

    pub fn hub(&self) -> &Arc<WatcherHub> {
        &self.hub
    }

    pub fn listener(&self) -> &Arc<CdcListener> {
        &self.listener
    }

    /// Beats until shutdown or the first escalated failure, then closes the session.
    pub async fn run(
        mut self,
        shutdown: CancellationToken,
    ) -> Result<()> {
        let mut ticker = tokio::time::interval(self.heartbeat_interval);
        loop {
            tokio::select! {
                biased;
                _ = shutdown.cancelled() => {
                    info!("collector shutting down");
                    break;
                }
                Some(signal) = self.aborts.recv() => {
                    error!("collector stopped: {}: {}", signal.reason, signal.cause);
                    break;
                }
                _ = ticker.tick() => self.beat().await,
            }
        }

        if let Err(e) = self.hub.close().await {
            debug!("closing collector session: {e}");
        }
        Ok(())
    }

    async fn beat(&self) {
        let Some(store) = &self.heartbeat else {
            return;
        };
        match store.beat().await {
            Ok(rows) => debug!("heartbeat ok, {rows} rows"),
            Err(e) => warn!("heartbeat failed: {e}"),
        }
    }
}

/// PostgreSQL heartbeat store, or `None` when no URL is configured.
pub fn heartbeat_store(config: &CollectorConfig) -> Result<Option<Arc<dyn HeartbeatStore>>> {
    match &config.heartbeat_url {
        Some(url) => {
            let store = PostgresHeartbeat::new(url, &config.heartbeat_statement)?;
            Ok(Some(Arc::new(store)))
        }
        None => Ok(None),
    }
}
