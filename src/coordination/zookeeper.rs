//! ZooKeeper ensemble adapter.
//!
//! Each [`ZooKeeperSession`] wraps one `zookeeper_client::Client`. One-shot
//! watchers returned by the client are forwarded onto the session's event
//! channel by short-lived tasks, and session state changes by one task per
//! session.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::RwLock;
use tokio_util::sync::CancellationToken;
use tracing::debug;
use tracing::info;
use tracing::warn;
use zookeeper_client as zk;

use super::Connector;
use super::CoordinationClient;
use super::CreateMode;
use super::EventSender;
use super::NodeEventKind;
use super::SessionState;
use super::Stat;
use super::WatchedEvent;
use crate::CoordinationConfig;
use crate::CoordinationError;
use crate::Error;
use crate::Result;

/// Opens sessions against the ensemble listed in `coordination.servers`
#[derive(Debug, Clone)]
pub struct ZooKeeperConnector {
    servers: String,
    session_timeout: Duration,
    connect_timeout: Duration,
}

impl ZooKeeperConnector {
    pub fn new(config: &CoordinationConfig) -> Self {
        Self {
            servers: config.servers.replace(' ', ""),
            session_timeout: config.session_timeout(),
            connect_timeout: config.connect_timeout(),
        }
    }
}

#[async_trait]
impl Connector for ZooKeeperConnector {
    async fn connect(
        &self,
        events: EventSender,
    ) -> Result<Arc<dyn CoordinationClient>> {
        let mut connector = zk::Client::connector();
        connector
            .session_timeout(self.session_timeout)
            .connection_timeout(self.connect_timeout);
        let client = match tokio::time::timeout(self.connect_timeout, connector.connect(&self.servers)).await {
            Ok(Ok(client)) => client,
            Ok(Err(e)) => return Err(map_error(&self.servers, e)),
            Err(_) => return Err(CoordinationError::ConnectTimeout(self.connect_timeout).into()),
        };

        let session_id = client.session_id().0;
        info!("connected to {} with session {session_id:#x}", self.servers);
        let session = Arc::new(ZooKeeperSession {
            client: RwLock::new(Some(client.clone())),
            session_id,
            session_timeout: client.session_timeout(),
            events: events.clone(),
            closed: CancellationToken::new(),
        });
        let _ = events.send(WatchedEvent::Session {
            session_id,
            state: SessionState::Connected,
        });
        session.forward_states(client.state_watcher());
        Ok(session)
    }
}

/// Client handle bound to one ZooKeeper session
pub struct ZooKeeperSession {
    /// `None` once closed locally
    client: RwLock<Option<zk::Client>>,
    session_id: i64,
    session_timeout: Duration,
    events: EventSender,
    closed: CancellationToken,
}

impl ZooKeeperSession {
    fn client(&self) -> Result<zk::Client> {
        self.client
            .read()
            .clone()
            .ok_or_else(|| CoordinationError::Closed.into())
    }

    fn forward_states(
        &self,
        mut watcher: zk::StateWatcher,
    ) {
        let session_id = self.session_id;
        let events = self.events.clone();
        let closed = self.closed.clone();
        tokio::spawn(async move {
            loop {
                let state = tokio::select! {
                    _ = closed.cancelled() => break,
                    state = watcher.changed() => state,
                };
                let Some(state) = session_state(state) else {
                    debug!("session {session_id:#x} terminated");
                    break;
                };
                if events.send(WatchedEvent::Session { session_id, state }).is_err() {
                    break;
                }
                if state == SessionState::Expired {
                    break;
                }
            }
        });
    }

    fn forward_watch(
        &self,
        watcher: zk::OneshotWatcher,
    ) {
        let session_id = self.session_id;
        let events = self.events.clone();
        let closed = self.closed.clone();
        tokio::spawn(async move {
            let event = tokio::select! {
                _ = closed.cancelled() => return,
                event = watcher.changed() => event,
            };
            if let Some(kind) = node_event_kind(event.event_type) {
                let _ = events.send(WatchedEvent::Node {
                    session_id,
                    kind,
                    path: event.path,
                });
            }
        });
    }
}

#[async_trait]
impl CoordinationClient for ZooKeeperSession {
    fn session_id(&self) -> i64 {
        self.session_id
    }

    fn session_timeout(&self) -> Duration {
        self.session_timeout
    }

    async fn create(
        &self,
        path: &str,
        data: &[u8],
        mode: CreateMode,
    ) -> Result<String> {
        let options = create_options(mode);
        let (_, sequence) = self
            .client()?
            .create(path, data, &options)
            .await
            .map_err(|e| map_error(path, e))?;
        if mode.is_sequential() {
            Ok(format!("{path}{sequence}"))
        } else {
            Ok(path.to_string())
        }
    }

    async fn delete(
        &self,
        path: &str,
        version: Option<i32>,
    ) -> Result<()> {
        self.client()?
            .delete(path, version)
            .await
            .map_err(|e| map_error(path, e))
    }

    async fn get_data(
        &self,
        path: &str,
        watch: bool,
    ) -> Result<(Vec<u8>, Stat)> {
        let client = self.client()?;
        if !watch {
            let (data, stat) = client.get_data(path).await.map_err(|e| map_error(path, e))?;
            return Ok((data, stat_of(&stat)));
        }
        let (data, stat, watcher) = client
            .get_and_watch_data(path)
            .await
            .map_err(|e| map_error(path, e))?;
        self.forward_watch(watcher);
        Ok((data, stat_of(&stat)))
    }

    async fn set_data(
        &self,
        path: &str,
        data: &[u8],
        version: Option<i32>,
    ) -> Result<Stat> {
        let stat = self
            .client()?
            .set_data(path, data, version)
            .await
            .map_err(|e| map_error(path, e))?;
        Ok(stat_of(&stat))
    }

    async fn exists(
        &self,
        path: &str,
        watch: bool,
    ) -> Result<Option<Stat>> {
        let client = self.client()?;
        if !watch {
            let stat = client.check_stat(path).await.map_err(|e| map_error(path, e))?;
            return Ok(stat.as_ref().map(stat_of));
        }
        let (stat, watcher) = client
            .check_and_watch_stat(path)
            .await
            .map_err(|e| map_error(path, e))?;
        self.forward_watch(watcher);
        Ok(stat.as_ref().map(stat_of))
    }

    async fn get_children(
        &self,
        path: &str,
        watch: bool,
    ) -> Result<Vec<String>> {
        let client = self.client()?;
        if !watch {
            return client.list_children(path).await.map_err(|e| map_error(path, e));
        }
        let (children, watcher) = client
            .list_and_watch_children(path)
            .await
            .map_err(|e| map_error(path, e))?;
        self.forward_watch(watcher);
        Ok(children)
    }

    /// Dropping the last handle of a client closes its session.
    async fn close(&self) -> Result<()> {
        self.closed.cancel();
        if self.client.write().take().is_some() {
            debug!("session {:#x} closed", self.session_id);
        }
        Ok(())
    }
}

pub(crate) fn create_options(mode: CreateMode) -> zk::CreateOptions<'static> {
    let mode = match mode {
        CreateMode::Persistent => zk::CreateMode::Persistent,
        CreateMode::Ephemeral => zk::CreateMode::Ephemeral,
        CreateMode::PersistentSequential => zk::CreateMode::PersistentSequential,
        CreateMode::EphemeralSequential => zk::CreateMode::EphemeralSequential,
    };
    mode.with_acls(zk::Acls::anyone_all())
}

pub(crate) fn stat_of(stat: &zk::Stat) -> Stat {
    Stat {
        czxid: stat.czxid,
        mzxid: stat.mzxid,
        ctime: stat.ctime,
        mtime: stat.mtime,
        version: stat.version,
        ephemeral_owner: stat.ephemeral_owner,
        num_children: stat.num_children,
    }
}

/// `None` once the session is closed for good
pub(crate) fn session_state(state: zk::SessionState) -> Option<SessionState> {
    match state {
        zk::SessionState::SyncConnected | zk::SessionState::ConnectedReadOnly => Some(SessionState::Connected),
        zk::SessionState::Disconnected => Some(SessionState::Disconnected),
        zk::SessionState::Expired | zk::SessionState::AuthFailed => Some(SessionState::Expired),
        _ => None,
    }
}

/// Session notifications travel through the state watcher instead
pub(crate) fn node_event_kind(event_type: zk::EventType) -> Option<NodeEventKind> {
    match event_type {
        zk::EventType::NodeCreated => Some(NodeEventKind::Created),
        zk::EventType::NodeDeleted => Some(NodeEventKind::Deleted),
        zk::EventType::NodeDataChanged => Some(NodeEventKind::DataChanged),
        zk::EventType::NodeChildrenChanged => Some(NodeEventKind::ChildrenChanged),
        _ => None,
    }
}

pub(crate) fn map_error(
    path: &str,
    err: zk::Error,
) -> Error {
    let err = match err {
        zk::Error::NoNode => CoordinationError::NoNode(path.to_string()),
        zk::Error::NodeExists => CoordinationError::NodeExists(path.to_string()),
        zk::Error::NotEmpty => CoordinationError::NotEmpty(path.to_string()),
        zk::Error::NoChildrenForEphemerals => CoordinationError::NoChildrenForEphemerals(path.to_string()),
        zk::Error::ConnectionLoss => CoordinationError::ConnectionLoss,
        zk::Error::SessionExpired => CoordinationError::SessionExpired,
        zk::Error::ClientClosed => CoordinationError::Closed,
        // the expected version is not echoed back by the service
        zk::Error::BadVersion => CoordinationError::BadVersion {
            path: path.to_string(),
            expected: -1,
            actual: -1,
        },
        other => {
            warn!("{path}: {other}");
            CoordinationError::Service {
                path: path.to_string(),
                reason: other.to_string(),
            }
        }
    };
    err.into()
}
