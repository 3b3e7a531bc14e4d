use std::collections::VecDeque;
use std::sync::Arc;

use async_trait::async_trait;
use tracing::debug;
use tracing::info;

use super::ChangeEvent;
use super::QueueKind;
use crate::constants::INSTANCES;
use crate::constants::QUEUE_ENTRY_PREFIX;
use crate::coordination::ops::create_sequential;
use crate::coordination::ops::join_path;
use crate::coordination::ops::parent_path;
use crate::time::get_now_as_millis;
use crate::watcher::WatcherHub;
use crate::watcher::ZnodeListener;
use crate::Result;

/// Converts watch notifications on the topology subtree into queue entries.
pub struct CdcListener {
    hub: Arc<WatcherHub>,
    topology_root: String,
    liveness_queue: String,
    topology_queue: String,
}

impl CdcListener {
    pub fn new(
        hub: Arc<WatcherHub>,
        root: &str,
    ) -> Self {
        Self {
            hub,
            topology_root: join_path(root, INSTANCES),
            liveness_queue: join_path(root, QueueKind::Liveness.segment()),
            topology_queue: join_path(root, QueueKind::Topology.segment()),
        }
    }

    pub fn topology_root(&self) -> &str {
        &self.topology_root
    }

    pub fn queue_path(
        &self,
        kind: QueueKind,
    ) -> &str {
        match kind {
            QueueKind::Liveness => &self.liveness_queue,
            QueueKind::Topology => &self.topology_queue,
        }
    }

    /// Appends `payload` to the queue and returns the entry path.
    pub async fn append(
        &self,
        kind: QueueKind,
        payload: &str,
    ) -> Result<String> {
        let prefix = join_path(self.queue_path(kind), QUEUE_ENTRY_PREFIX);
        create_sequential(self.hub.client().as_ref(), &prefix, payload.as_bytes()).await
    }

    async fn enqueue(
        &self,
        event: ChangeEvent,
    ) -> Result<()> {
        let kind = event.queue();
        let entry = self.append(kind, &event.encode()).await?;
        info!(
            "insert into {kind} queue as {entry}, {:?} {}",
            event.kind, event.path
        );
        Ok(())
    }

    /// Arms watches on the topology root and `depth` levels below it
    /// without emitting events.
    pub async fn prime(
        &self,
        depth: usize,
    ) -> Result<usize> {
        let mut level = vec![self.topology_root.clone()];
        let mut primed = 0;
        for _ in 0..=depth {
            let mut next = Vec::new();
            for parent in level {
                match self.hub.discover_new_children(&parent).await {
                    Ok(fresh) => {
                        primed += fresh.len();
                        next.extend(fresh.into_iter().map(|n| n.path));
                    }
                    Err(e) if e.is_no_node() => debug!("{parent} vanished while priming"),
                    Err(e) => return Err(e),
                }
            }
            level = next;
        }
        Ok(primed)
    }

    fn in_topology(
        &self,
        path: &str,
    ) -> bool {
        path == self.topology_root
            || path
                .strip_prefix(self.topology_root.as_str())
                .is_some_and(|rest| rest.starts_with('/'))
    }

    /// Creation txn id of `path`'s parent, 0 when it is gone.
    async fn parent_txn_id(
        &self,
        path: &str,
    ) -> Result<i64> {
        let Some(parent) = parent_path(path) else {
            return Ok(0);
        };
        Ok(self
            .hub
            .client()
            .exists(parent, false)
            .await?
            .map(|stat| stat.czxid)
            .unwrap_or(0))
    }
}

#[async_trait]
impl ZnodeListener for CdcListener {
    async fn node_deleted(
        &self,
        path: &str,
    ) -> Result<()> {
        self.hub.release(path).await;
        self.enqueue(ChangeEvent::deleted(path, get_now_as_millis())).await
    }

    async fn node_data_changed(
        &self,
        path: &str,
    ) -> Result<()> {
        let (data, stat) = match self.hub.client().get_data(path, true).await {
            Ok(read) => read,
            // The watch could not be re-armed, so no deletion will follow
            Err(e) if e.is_no_node() => {
                self.hub.release(path).await;
                return self.enqueue(ChangeEvent::deleted(path, get_now_as_millis())).await;
            }
            Err(e) => return Err(e),
        };
        let parent_txn_id = self.parent_txn_id(path).await?;
        let data = String::from_utf8_lossy(&data).into_owned();
        self.enqueue(ChangeEvent::updated(path, &stat, parent_txn_id, data))
            .await
    }

    /// New children are discovered breadth first; every discovered node is
    /// itself discovered so children created before its watch was armed are
    /// not missed.
    async fn node_children_changed(
        &self,
        path: &str,
    ) -> Result<()> {
        if !self.in_topology(path) {
            return Ok(());
        }
        let mut pending = VecDeque::from([path.to_string()]);
        while let Some(parent) = pending.pop_front() {
            loop {
                let fresh = match self.hub.discover_new_children(&parent).await {
                    Ok(fresh) => fresh,
                    Err(e) if e.is_no_node() => break,
                    Err(e) => return Err(e),
                };
                if fresh.is_empty() {
                    break;
                }
                let parent_txn_id = self
                    .hub
                    .client()
                    .exists(&parent, false)
                    .await?
                    .map(|stat| stat.czxid)
                    .unwrap_or(0);
                for node in fresh {
                    let data = node.data_str();
                    self.enqueue(ChangeEvent::created(&node.path, &node.stat, parent_txn_id, data))
                        .await?;
                    pending.push_back(node.path);
                }
            }
        }
        Ok(())
    }
}
