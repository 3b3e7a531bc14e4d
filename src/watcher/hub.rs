use std::sync::Arc;
use std::sync::Weak;
use std::time::Duration;

use arc_swap::ArcSwap;
use parking_lot::RwLock;
use tokio::sync::mpsc;
use tokio::sync::watch;
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::debug;
use tracing::info;
use tracing::warn;

use super::AbortHandle;
use super::NewChildTracker;
use super::NodeAndData;
use super::ZnodeListener;
use crate::coordination::Connector;
use crate::coordination::CoordinationClient;
use crate::coordination::NodeEventKind;
use crate::coordination::SessionState;
use crate::coordination::WatchedEvent;
use crate::CoordinationError;
use crate::Error;
use crate::Result;

struct HubSession {
    client: Arc<dyn CoordinationClient>,
    /// Stops this session's dispatch loop
    cancel: CancellationToken,
}

/// Owns one coordination session and fans its notifications out to listeners.
///
/// Each session gets its own event channel and dispatch task, so
/// notifications from a replaced session can never reach listeners. The
/// listener registry and the abort handle survive [`WatcherHub::reconnect`];
/// the tracked-node set does not.
pub struct WatcherHub {
    identifier: String,
    connector: Arc<dyn Connector>,
    session: ArcSwap<HubSession>,
    listeners: RwLock<Vec<Arc<dyn ZnodeListener>>>,
    tracker: NewChildTracker,
    abort: AbortHandle,
    state_tx: watch::Sender<(i64, SessionState)>,
    connect_timeout: Duration,
    shutdown: CancellationToken,
    recovery: Mutex<()>,
    weak_self: Weak<Self>,
}

impl WatcherHub {
    /// Opens the first session and waits until it reports `Connected`.
    ///
    /// # Errors
    /// Connector failures, or `ConnectTimeout` when the session does not
    /// connect within `connect_timeout`.
    pub async fn connect(
        identifier: &str,
        connector: Arc<dyn Connector>,
        abort: AbortHandle,
        connect_timeout: Duration,
    ) -> Result<Arc<Self>> {
        let shutdown = CancellationToken::new();
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let client = connector.connect(events_tx).await?;
        let session_id = client.session_id();
        let cancel = shutdown.child_token();
        let (state_tx, _) = watch::channel((0, SessionState::Disconnected));

        let hub = Arc::new_cyclic(|weak_self| Self {
            identifier: identifier.to_string(),
            connector,
            session: ArcSwap::from_pointee(HubSession {
                client,
                cancel: cancel.clone(),
            }),
            listeners: RwLock::new(Vec::new()),
            tracker: NewChildTracker::new(),
            abort,
            state_tx,
            connect_timeout,
            shutdown,
            recovery: Mutex::new(()),
            weak_self: weak_self.clone(),
        });
        tokio::spawn(Self::dispatch_loop(
            Arc::downgrade(&hub),
            session_id,
            events_rx,
            cancel,
        ));

        hub.wait_connected(session_id).await?;
        info!("[{}] connected, session {session_id}", hub.identifier);
        Ok(hub)
    }

    pub fn identifier(&self) -> &str {
        &self.identifier
    }

    /// Client of the current session
    pub fn client(&self) -> Arc<dyn CoordinationClient> {
        self.session.load().client.clone()
    }

    pub fn session_id(&self) -> i64 {
        self.session.load().client.session_id()
    }

    pub fn session_timeout(&self) -> Duration {
        self.session.load().client.session_timeout()
    }

    pub fn abort_handle(&self) -> AbortHandle {
        self.abort.clone()
    }

    /// Forwards a failure to the owning supervisor, subject to the abort policy.
    pub fn abort(
        &self,
        reason: impl Into<String>,
        cause: Error,
    ) -> bool {
        self.abort.abort(reason, cause)
    }

    pub fn register_listener(
        &self,
        listener: Arc<dyn ZnodeListener>,
    ) {
        self.listeners.write().push(listener);
    }

    /// See [`NewChildTracker::discover`].
    pub async fn discover_new_children(
        &self,
        parent: &str,
    ) -> Result<Vec<NodeAndData>> {
        let client = self.client();
        self.tracker.discover(client.as_ref(), parent).await
    }

    pub async fn release(
        &self,
        path: &str,
    ) -> bool {
        self.tracker.release(path).await
    }

    pub async fn is_tracked(
        &self,
        path: &str,
    ) -> bool {
        self.tracker.is_tracked(path).await
    }

    /// Cheap round trip proving the current session still works.
    pub async fn probe(&self) -> Result<()> {
        self.client().exists("/", false).await.map(|_| ())
    }

    /// Replaces the current session with a fresh one.
    ///
    /// The old client is closed and its dispatch loop stopped before the new
    /// session opens; listeners stay registered and the tracked-node set is
    /// cleared. Watches must be re-armed by the components themselves.
    pub async fn reconnect(&self) -> Result<()> {
        let _guard = self.recovery.lock().await;
        let old = self.session.load_full();
        let old_id = old.client.session_id();
        old.cancel.cancel();
        if let Err(e) = old.client.close().await {
            debug!("[{}] closing session {old_id}: {e}", self.identifier);
        }

        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let client = self.connector.connect(events_tx).await?;
        let session_id = client.session_id();
        let cancel = self.shutdown.child_token();
        self.session.store(Arc::new(HubSession {
            client,
            cancel: cancel.clone(),
        }));
        self.tracker.clear().await;
        tokio::spawn(Self::dispatch_loop(
            self.weak_self.clone(),
            session_id,
            events_rx,
            cancel,
        ));

        self.wait_connected(session_id).await?;
        info!(
            "[{}] reconnected, session {old_id} replaced by {session_id}",
            self.identifier
        );
        Ok(())
    }

    /// Stops every dispatch loop and closes the session.
    pub async fn close(&self) -> Result<()> {
        self.shutdown.cancel();
        self.client().close().await
    }

    async fn wait_connected(
        &self,
        session_id: i64,
    ) -> Result<()> {
        let mut rx = self.state_tx.subscribe();
        let connected =
            rx.wait_for(|(id, state)| *id == session_id && *state == SessionState::Connected);
        let outcome = match tokio::time::timeout(self.connect_timeout, connected).await {
            Ok(Ok(_)) => Ok(()),
            Ok(Err(_)) => Err(CoordinationError::Closed.into()),
            Err(_) => Err(CoordinationError::ConnectTimeout(self.connect_timeout).into()),
        };
        outcome
    }

    async fn dispatch_loop(
        hub: Weak<Self>,
        session_id: i64,
        mut events: mpsc::UnboundedReceiver<WatchedEvent>,
        cancel: CancellationToken,
    ) {
        loop {
            let event = tokio::select! {
                biased;
                _ = cancel.cancelled() => break,
                event = events.recv() => match event {
                    Some(event) => event,
                    None => break,
                },
            };
            let Some(hub) = hub.upgrade() else {
                break;
            };
            hub.dispatch(event).await;
        }
        debug!("dispatch loop for session {session_id} stopped");
    }

    async fn dispatch(
        &self,
        event: WatchedEvent,
    ) {
        match event {
            WatchedEvent::Session { session_id, state } => {
                self.state_tx.send_replace((session_id, state));
                match state {
                    SessionState::Connected => {
                        debug!("[{}] session {session_id} connected", self.identifier)
                    }
                    SessionState::Disconnected => {
                        warn!(
                            "[{}] session {session_id} disconnected, waiting for the client to reconnect",
                            self.identifier
                        )
                    }
                    SessionState::Expired => {
                        self.abort(
                            format!("[{}] session {session_id} expired", self.identifier),
                            CoordinationError::SessionExpired.into(),
                        );
                    }
                }
            }
            WatchedEvent::Node { kind, path, .. } => {
                debug!("[{}] {kind:?} {path}", self.identifier);
                let listeners = self.listeners.read().clone();
                for listener in listeners {
                    let result = match kind {
                        NodeEventKind::Created => listener.node_created(&path).await,
                        NodeEventKind::Deleted => listener.node_deleted(&path).await,
                        NodeEventKind::DataChanged => listener.node_data_changed(&path).await,
                        NodeEventKind::ChildrenChanged => {
                            listener.node_children_changed(&path).await
                        }
                    };
                    if let Err(e) = result {
                        self.abort(
                            format!("[{}] listener failed on {kind:?} {path}", self.identifier),
                            e,
                        );
                    }
                }
            }
        }
    }
}

impl Drop for WatcherHub {
    fn drop(&mut self) {
        self.shutdown.cancel();
    }
}
