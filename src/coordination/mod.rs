//! Coordination tree contract.
//!
//! Everything above this module talks to the coordination service through
//! [`CoordinationClient`] (one session) and [`Connector`] (opens sessions).
//! Watches are one-shot: a fired watch must be re-armed by the next read.

mod memory;
pub mod ops;
mod zookeeper;
pub use memory::*;
pub use zookeeper::*;


use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
#[cfg(test)]
use mockall::automock;
use tokio::sync::mpsc;

use crate::CoordinationConfig;
use crate::Result;

/// Node lifetime and naming at creation time
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CreateMode {
    Persistent,
    Ephemeral,
    PersistentSequential,
    EphemeralSequential,
}

impl CreateMode {
    pub fn is_ephemeral(&self) -> bool {
        matches!(self, CreateMode::Ephemeral | CreateMode::EphemeralSequential)
    }

    pub fn is_sequential(&self) -> bool {
        matches!(
            self,
            CreateMode::PersistentSequential | CreateMode::EphemeralSequential
        )
    }
}

/// Node metadata returned by reads
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Stat {
    /// Transaction id that created the node
    pub czxid: i64,
    /// Transaction id of the last data change
    pub mzxid: i64,
    /// Creation time, millis since epoch
    pub ctime: i64,
    /// Last modification time, millis since epoch
    pub mtime: i64,
    /// Data version, bumped by every `set_data`
    pub version: i32,
    /// Owning session of an ephemeral node, 0 otherwise
    pub ephemeral_owner: i64,
    pub num_children: i32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Connected,
    Disconnected,
    Expired,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeEventKind {
    Created,
    Deleted,
    DataChanged,
    ChildrenChanged,
}

/// Notification delivered on a session's event channel
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WatchedEvent {
    Session {
        session_id: i64,
        state: SessionState,
    },
    Node {
        session_id: i64,
        kind: NodeEventKind,
        path: String,
    },
}

impl WatchedEvent {
    pub fn session_id(&self) -> i64 {
        match self {
            WatchedEvent::Session { session_id, .. } | WatchedEvent::Node { session_id, .. } => {
                *session_id
            }
        }
    }
}

pub type EventSender = mpsc::UnboundedSender<WatchedEvent>;

/// One session against the coordination service.
///
/// `version: None` means "any version".
#[cfg_attr(test, automock)]
#[async_trait]
pub trait CoordinationClient: Send + Sync + 'static {
    fn session_id(&self) -> i64;

    fn session_timeout(&self) -> Duration;

    /// Returns the actual path, which differs from `path` for sequential modes.
    async fn create(
        &self,
        path: &str,
        data: &[u8],
        mode: CreateMode,
    ) -> Result<String>;

    async fn delete(
        &self,
        path: &str,
        version: Option<i32>,
    ) -> Result<()>;

    async fn get_data(
        &self,
        path: &str,
        watch: bool,
    ) -> Result<(Vec<u8>, Stat)>;

    async fn set_data(
        &self,
        path: &str,
        data: &[u8],
        version: Option<i32>,
    ) -> Result<Stat>;

    /// Arms an exists watch even when the node is absent.
    async fn exists(
        &self,
        path: &str,
        watch: bool,
    ) -> Result<Option<Stat>>;

    /// Child names, not full paths. Order is unspecified.
    async fn get_children(
        &self,
        path: &str,
        watch: bool,
    ) -> Result<Vec<String>>;

    async fn close(&self) -> Result<()>;
}

/// Opens sessions whose notifications are pushed into `events`.
#[cfg_attr(test, automock)]
#[async_trait]
pub trait Connector: Send + Sync + 'static {
    async fn connect(
        &self,
        events: EventSender,
    ) -> Result<Arc<dyn CoordinationClient>>;
}

/// The ZooKeeper ensemble from `coordination.servers`, or a private
/// in-process tree when `coordination.embedded` is set.
pub fn connector_for(config: &CoordinationConfig) -> Arc<dyn Connector> {
    if config.embedded {
        Arc::new(MemoryConnector::new(MemoryTree::new(config.session_timeout())))
    } else {
        Arc::new(ZooKeeperConnector::new(config))
    }
}
