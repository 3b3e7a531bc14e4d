use std::sync::Arc;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;
use tracing::info;
use tracing::warn;

use super::input_path;
use super::output_path;
use super::CommandRequest;
use super::ExecCmdTask;
use crate::exec::ScriptRunner;
use crate::watcher::NodeAndData;
use crate::watcher::WatcherHub;
use crate::watcher::ZnodeListener;
use crate::Result;

/// Agent side of the remote command protocol.
///
/// Watches this host's input path, claims each new request by deleting it
/// and starts one [`ExecCmdTask`] per request.
pub struct RemoteCommandHandle {
    hub: Arc<WatcherHub>,
    input_path: String,
    output_path: String,
    runner: Arc<dyn ScriptRunner>,
    cancel: CancellationToken,
}

impl RemoteCommandHandle {
    pub fn new(
        hub: Arc<WatcherHub>,
        root: &str,
        host: &str,
        runner: Arc<dyn ScriptRunner>,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            hub,
            input_path: input_path(root, host),
            output_path: output_path(root, host),
            runner,
            cancel,
        }
    }

    pub fn input_path(&self) -> &str {
        &self.input_path
    }

    pub fn output_path(&self) -> &str {
        &self.output_path
    }

    /// Arms the input watch and claims every pending request. Returns the
    /// number of requests claimed.
    ///
    /// Children watches coalesce bursts, so discovery repeats until a pass
    /// finds nothing new.
    pub async fn drain_requests(&self) -> Result<usize> {
        let mut claimed = 0;
        loop {
            let fresh = self.hub.discover_new_children(&self.input_path).await?;
            if fresh.is_empty() {
                return Ok(claimed);
            }
            for node in fresh {
                if self.claim(node).await? {
                    claimed += 1;
                }
            }
        }
    }

    async fn claim(
        &self,
        node: NodeAndData,
    ) -> Result<bool> {
        let deleted = match self.hub.client().delete(&node.path, None).await {
            Ok(()) => true,
            Err(e) if e.is_no_node() => false,
            Err(e) => return Err(e),
        };
        self.hub.release(&node.path).await;
        if !deleted {
            info!("{} already claimed", node.path);
            return Ok(false);
        }

        let request = match CommandRequest::parse(&node.path, &node.data) {
            Ok(request) => request,
            Err(e) => {
                warn!("dropping request: {e}");
                return Ok(false);
            }
        };
        info!("claimed command {} from {}", request.id, node.path);
        ExecCmdTask::new(
            self.hub.clone(),
            &self.output_path,
            request,
            self.runner.clone(),
        )
        .spawn(self.cancel.child_token());
        Ok(true)
    }
}

#[async_trait]
impl ZnodeListener for RemoteCommandHandle {
    async fn node_children_changed(
        &self,
        path: &str,
    ) -> Result<()> {
        if path == self.input_path {
            self.drain_requests().await?;
        }
        Ok(())
    }
}
