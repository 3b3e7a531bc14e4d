use std::collections::BTreeSet;
use std::collections::HashMap;
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use tracing::debug;
use tracing::info;

use super::ops::node_name;
use super::ops::parent_path;
use super::ops::validate_path;
use super::Connector;
use super::CoordinationClient;
use super::CreateMode;
use super::EventSender;
use super::NodeEventKind;
use super::SessionState;
use super::Stat;
use super::WatchedEvent;
use crate::constants::SEQUENCE_WIDTH;
use crate::time::get_now_as_millis;
use crate::CoordinationError;
use crate::Error;
use crate::Result;

/// In-process coordination tree.
///
/// Implements the subset of the coordination service contract the agent
/// relies on: persistent/ephemeral and sequential nodes, versioned data,
/// one-shot watches delivered per session in mutation order, and session
/// close/expiry with ephemeral cleanup.
pub struct MemoryTree {
    state: Mutex<TreeState>,
    session_timeout: Duration,
}

#[derive(Debug)]
struct Node {
    data: Vec<u8>,
    stat: Stat,
    children: BTreeSet<String>,
    next_sequence: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SessionStatus {
    Live,
    Expired,
    Closed,
}

struct SessionEntry {
    events: EventSender,
    status: SessionStatus,
}

#[derive(Default)]
struct WatchTable {
    data: HashMap<String, HashSet<i64>>,
    exist: HashMap<String, HashSet<i64>>,
    child: HashMap<String, HashSet<i64>>,
}

impl WatchTable {
    fn purge_session(
        &mut self,
        session_id: i64,
    ) {
        for table in [&mut self.data, &mut self.exist, &mut self.child] {
            table.retain(|_, sessions| {
                sessions.remove(&session_id);
                !sessions.is_empty()
            });
        }
    }
}

struct TreeState {
    nodes: HashMap<String, Node>,
    zxid: i64,
    next_session_id: i64,
    sessions: HashMap<i64, SessionEntry>,
    watches: WatchTable,
    reachable: bool,
}

fn notify(
    sessions: &HashMap<i64, SessionEntry>,
    watchers: HashSet<i64>,
    kind: NodeEventKind,
    path: &str,
) {
    let mut ids: Vec<i64> = watchers.into_iter().collect();
    ids.sort_unstable();
    for session_id in ids {
        if let Some(entry) = sessions.get(&session_id) {
            if entry.status == SessionStatus::Live {
                let _ = entry.events.send(WatchedEvent::Node {
                    session_id,
                    kind,
                    path: path.to_string(),
                });
            }
        }
    }
}

impl TreeState {
    fn new() -> Self {
        let mut nodes = HashMap::new();
        nodes.insert(
            "/".to_string(),
            Node {
                data: Vec::new(),
                stat: Stat::default(),
                children: BTreeSet::new(),
                next_sequence: 0,
            },
        );
        Self {
            nodes,
            zxid: 0,
            next_session_id: 1,
            sessions: HashMap::new(),
            watches: WatchTable::default(),
            reachable: true,
        }
    }

    fn check_session(
        &self,
        session_id: i64,
    ) -> Result<()> {
        if !self.reachable {
            return Err(CoordinationError::ConnectionLoss.into());
        }
        match self.sessions.get(&session_id).map(|s| s.status) {
            Some(SessionStatus::Live) => Ok(()),
            Some(SessionStatus::Expired) => Err(CoordinationError::SessionExpired.into()),
            _ => Err(CoordinationError::Closed.into()),
        }
    }

    fn node(
        &self,
        path: &str,
    ) -> Result<&Node> {
        self.nodes
            .get(path)
            .ok_or_else(|| CoordinationError::NoNode(path.to_string()).into())
    }

    fn next_zxid(&mut self) -> i64 {
        self.zxid += 1;
        self.zxid
    }

    fn create(
        &mut self,
        session_id: i64,
        path: &str,
        data: &[u8],
        mode: CreateMode,
    ) -> Result<String> {
        self.check_session(session_id)?;
        validate_path(path)?;
        let parent = parent_path(path).ok_or_else(|| CoordinationError::NodeExists(path.to_string()))?;

        let parent_node = self
            .nodes
            .get_mut(parent)
            .ok_or_else(|| Error::from(CoordinationError::NoNode(parent.to_string())))?;
        if parent_node.stat.ephemeral_owner != 0 {
            return Err(CoordinationError::NoChildrenForEphemerals(parent.to_string()).into());
        }
        let actual = if mode.is_sequential() {
            let seq = parent_node.next_sequence;
            parent_node.next_sequence += 1;
            format!("{path}{seq:0width$}", width = SEQUENCE_WIDTH)
        } else {
            path.to_string()
        };
        if self.nodes.contains_key(&actual) {
            return Err(CoordinationError::NodeExists(actual).into());
        }

        let zxid = self.next_zxid();
        let now = get_now_as_millis();
        let stat = Stat {
            czxid: zxid,
            mzxid: zxid,
            ctime: now,
            mtime: now,
            version: 0,
            ephemeral_owner: if mode.is_ephemeral() { session_id } else { 0 },
            num_children: 0,
        };
        self.nodes.insert(
            actual.clone(),
            Node {
                data: data.to_vec(),
                stat,
                children: BTreeSet::new(),
                next_sequence: 0,
            },
        );
        if let Some(parent_node) = self.nodes.get_mut(parent) {
            parent_node.children.insert(node_name(&actual).to_string());
            parent_node.stat.num_children += 1;
        }

        if let Some(watchers) = self.watches.exist.remove(&actual) {
            notify(&self.sessions, watchers, NodeEventKind::Created, &actual);
        }
        if let Some(watchers) = self.watches.child.remove(parent) {
            notify(&self.sessions, watchers, NodeEventKind::ChildrenChanged, parent);
        }
        Ok(actual)
    }

    fn delete(
        &mut self,
        session_id: i64,
        path: &str,
        version: Option<i32>,
    ) -> Result<()> {
        self.check_session(session_id)?;
        validate_path(path)?;
        if path == "/" {
            return Err(CoordinationError::NotEmpty(path.to_string()).into());
        }
        let node = self.node(path)?;
        if let Some(expected) = version {
            if expected != node.stat.version {
                return Err(CoordinationError::BadVersion {
                    path: path.to_string(),
                    expected,
                    actual: node.stat.version,
                }
                .into());
            }
        }
        if !node.children.is_empty() {
            return Err(CoordinationError::NotEmpty(path.to_string()).into());
        }
        self.remove_node(path);
        Ok(())
    }

    /// Removes a childless node and fires its watches.
    fn remove_node(
        &mut self,
        path: &str,
    ) {
        if self.nodes.remove(path).is_none() {
            return;
        }
        self.next_zxid();
        let parent = parent_path(path).unwrap_or("/").to_string();
        if let Some(parent_node) = self.nodes.get_mut(&parent) {
            parent_node.children.remove(node_name(path));
            parent_node.stat.num_children -= 1;
        }

        let mut watchers = HashSet::new();
        for table in [
            &mut self.watches.data,
            &mut self.watches.exist,
            &mut self.watches.child,
        ] {
            if let Some(sessions) = table.remove(path) {
                watchers.extend(sessions);
            }
        }
        notify(&self.sessions, watchers, NodeEventKind::Deleted, path);
        if let Some(watchers) = self.watches.child.remove(&parent) {
            notify(&self.sessions, watchers, NodeEventKind::ChildrenChanged, &parent);
        }
    }

    fn get_data(
        &mut self,
        session_id: i64,
        path: &str,
        watch: bool,
    ) -> Result<(Vec<u8>, Stat)> {
        self.check_session(session_id)?;
        let node = self.node(path)?;
        let result = (node.data.clone(), node.stat);
        if watch {
            self.watches.data.entry(path.to_string()).or_default().insert(session_id);
        }
        Ok(result)
    }

    fn set_data(
        &mut self,
        session_id: i64,
        path: &str,
        data: &[u8],
        version: Option<i32>,
    ) -> Result<Stat> {
        self.check_session(session_id)?;
        let current = self.node(path)?.stat.version;
        if let Some(expected) = version {
            if expected != current {
                return Err(CoordinationError::BadVersion {
                    path: path.to_string(),
                    expected,
                    actual: current,
                }
                .into());
            }
        }
        let zxid = self.next_zxid();
        let now = get_now_as_millis();
        let stat = match self.nodes.get_mut(path) {
            Some(node) => {
                node.data = data.to_vec();
                node.stat.mzxid = zxid;
                node.stat.mtime = now;
                node.stat.version += 1;
                node.stat
            }
            None => return Err(CoordinationError::NoNode(path.to_string()).into()),
        };
        if let Some(watchers) = self.watches.data.remove(path) {
            notify(&self.sessions, watchers, NodeEventKind::DataChanged, path);
        }
        Ok(stat)
    }

    fn exists(
        &mut self,
        session_id: i64,
        path: &str,
        watch: bool,
    ) -> Result<Option<Stat>> {
        self.check_session(session_id)?;
        let stat = self.nodes.get(path).map(|n| n.stat);
        if watch {
            let table = if stat.is_some() {
                &mut self.watches.data
            } else {
                &mut self.watches.exist
            };
            table.entry(path.to_string()).or_default().insert(session_id);
        }
        Ok(stat)
    }

    fn get_children(
        &mut self,
        session_id: i64,
        path: &str,
        watch: bool,
    ) -> Result<Vec<String>> {
        self.check_session(session_id)?;
        let children = self.node(path)?.children.iter().cloned().collect();
        if watch {
            self.watches.child.entry(path.to_string()).or_default().insert(session_id);
        }
        Ok(children)
    }

    /// Ends a live session and removes its ephemeral nodes.
    fn end_session(
        &mut self,
        session_id: i64,
        status: SessionStatus,
    ) -> bool {
        match self.sessions.get_mut(&session_id) {
            Some(entry) if entry.status == SessionStatus::Live => {
                entry.status = status;
                if status == SessionStatus::Expired {
                    let _ = entry.events.send(WatchedEvent::Session {
                        session_id,
                        state: SessionState::Expired,
                    });
                }
            }
            _ => return false,
        }
        self.watches.purge_session(session_id);
        let mut owned: Vec<String> = self
            .nodes
            .iter()
            .filter(|(_, n)| n.stat.ephemeral_owner == session_id)
            .map(|(p, _)| p.clone())
            .collect();
        owned.sort();
        for path in owned {
            self.remove_node(&path);
        }
        true
    }

    fn broadcast(
        &self,
        state: SessionState,
    ) {
        for (session_id, entry) in &self.sessions {
            if entry.status == SessionStatus::Live {
                let _ = entry.events.send(WatchedEvent::Session {
                    session_id: *session_id,
                    state,
                });
            }
        }
    }
}

impl MemoryTree {
    pub fn new(session_timeout: Duration) -> Arc<Self> {
        Arc::new(Self {
            state: Mutex::new(TreeState::new()),
            session_timeout,
        })
    }

    /// Opens a session and reports it `Connected` on `events`.
    pub fn open_session(
        self: &Arc<Self>,
        events: EventSender,
    ) -> Arc<MemorySession> {
        let mut state = self.state.lock();
        let session_id = state.next_session_id;
        state.next_session_id += 1;
        let _ = events.send(WatchedEvent::Session {
            session_id,
            state: SessionState::Connected,
        });
        state.sessions.insert(
            session_id,
            SessionEntry {
                events,
                status: SessionStatus::Live,
            },
        );
        debug!("session {session_id} opened");
        Arc::new(MemorySession {
            tree: self.clone(),
            session_id,
        })
    }

    /// Expires `session_id` as the service would after missed heartbeats.
    pub fn expire_session(
        &self,
        session_id: i64,
    ) {
        if self.state.lock().end_session(session_id, SessionStatus::Expired) {
            info!("session {session_id} expired");
        }
    }

    /// Simulates a network partition between every session and the service.
    pub fn set_reachable(
        &self,
        reachable: bool,
    ) {
        let mut state = self.state.lock();
        if state.reachable == reachable {
            return;
        }
        state.reachable = reachable;
        state.broadcast(if reachable {
            SessionState::Connected
        } else {
            SessionState::Disconnected
        });
    }

    /// Transaction id of the most recent mutation
    pub fn last_zxid(&self) -> i64 {
        self.state.lock().zxid
    }

    pub fn session_timeout(&self) -> Duration {
        self.session_timeout
    }
}

/// Client handle bound to one [`MemoryTree`] session
pub struct MemorySession {
    tree: Arc<MemoryTree>,
    session_id: i64,
}

#[async_trait]
impl CoordinationClient for MemorySession {
    fn session_id(&self) -> i64 {
        self.session_id
    }

    fn session_timeout(&self) -> Duration {
        self.tree.session_timeout
    }

    async fn create(
        &self,
        path: &str,
        data: &[u8],
        mode: CreateMode,
    ) -> Result<String> {
        self.tree.state.lock().create(self.session_id, path, data, mode)
    }

    async fn delete(
        &self,
        path: &str,
        version: Option<i32>,
    ) -> Result<()> {
        self.tree.state.lock().delete(self.session_id, path, version)
    }

    async fn get_data(
        &self,
        path: &str,
        watch: bool,
    ) -> Result<(Vec<u8>, Stat)> {
        self.tree.state.lock().get_data(self.session_id, path, watch)
    }

    async fn set_data(
        &self,
        path: &str,
        data: &[u8],
        version: Option<i32>,
    ) -> Result<Stat> {
        self.tree.state.lock().set_data(self.session_id, path, data, version)
    }

    async fn exists(
        &self,
        path: &str,
        watch: bool,
    ) -> Result<Option<Stat>> {
        self.tree.state.lock().exists(self.session_id, path, watch)
    }

    async fn get_children(
        &self,
        path: &str,
        watch: bool,
    ) -> Result<Vec<String>> {
        self.tree.state.lock().get_children(self.session_id, path, watch)
    }

    async fn close(&self) -> Result<()> {
        if self.tree.state.lock().end_session(self.session_id, SessionStatus::Closed) {
            debug!("session {} closed", self.session_id);
        }
        Ok(())
    }
}

/// Opens [`MemorySession`]s on a shared tree
pub struct MemoryConnector {
    tree: Arc<MemoryTree>,
}

impl MemoryConnector {
    pub fn new(tree: Arc<MemoryTree>) -> Self {
        Self { tree }
    }
}

#[async_trait]
impl Connector for MemoryConnector {
    async fn connect(
        &self,
        events: EventSender,
    ) -> Result<Arc<dyn CoordinationClient>> {
        Ok(self.tree.open_session(events))
    }
}
