use std::collections::HashSet;

use tokio::sync::Mutex;
use tracing::debug;

use crate::coordination::ops::join_path;
use crate::coordination::CoordinationClient;
use crate::coordination::Stat;
use crate::Result;

/// A child returned by discovery, payload already fetched
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NodeAndData {
    pub path: String,
    pub data: Vec<u8>,
    pub stat: Stat,
}

impl NodeAndData {
    pub fn data_str(&self) -> String {
        String::from_utf8_lossy(&self.data).into_owned()
    }
}

/// Turns "children changed" notifications into at-most-once "child appeared" events.
///
/// Holds the set of paths that already carry an armed data watch. The set
/// lives as long as one coordination session.
#[derive(Debug, Default)]
pub struct NewChildTracker {
    tracked: Mutex<HashSet<String>>,
}

impl NewChildTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Re-arms the children watch on `parent` and returns the children not
    /// seen before, each with a data watch armed.
    ///
    /// The whole operation runs under the tracker lock so two concurrent
    /// discoveries never both claim the same child. Children that vanish
    /// between listing and reading are skipped and stay unclaimed.
    ///
    /// # Errors
    /// Any coordination error other than a vanished child, including
    /// `NoNode` for `parent` itself.
    pub async fn discover(
        &self,
        client: &dyn CoordinationClient,
        parent: &str,
    ) -> Result<Vec<NodeAndData>> {
        let mut tracked = self.tracked.lock().await;
        let mut children = client.get_children(parent, true).await?;
        children.sort();

        let mut fresh = Vec::new();
        for name in children {
            let path = join_path(parent, &name);
            if tracked.contains(&path) {
                continue;
            }
            match client.get_data(&path, true).await {
                Ok((data, stat)) => {
                    tracked.insert(path.clone());
                    fresh.push(NodeAndData { path, data, stat });
                }
                Err(e) if e.is_no_node() => debug!("{path} vanished before it could be read"),
                Err(e) => return Err(e),
            }
        }
        Ok(fresh)
    }

    /// Forgets `path` so that a re-created node is discovered again.
    pub async fn release(
        &self,
        path: &str,
    ) -> bool {
        self.tracked.lock().await.remove(path)
    }

    pub async fn clear(&self) {
        self.tracked.lock().await.clear();
    }

    pub async fn is_tracked(
        &self,
        path: &str,
    ) -> bool {
        self.tracked.lock().await.contains(path)
    }

    pub async fn len(&self) -> usize {
        self.tracked.lock().await.len()
    }
}
