//! The host agent process: remote command execution plus topology mirroring
//! on one coordination session, watched over by a supervisory loop.
//!
//! ## Failure handling
//! Workers never stop the process themselves. They report through the
//! agent's [`AbortHandle`]; the supervisor then either recovers the session
//! (expiry) or shuts the agent down (anything else). Connection loss never
//! reaches the supervisor.
//!
//! ## Example
//! ```ignore
//! let agent = Agent::start(connector, &settings, Arc::new(ShellRunner::new())).await?;
//! agent.run(shutdown).await?;
//! ```

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::debug;
use tracing::error;
use tracing::info;
use tracing::warn;

use crate::coordination::ops::delete_children_recursively;
use crate::coordination::ops::ensure_path;
use crate::coordination::Connector;
use crate::exec::ScriptRunner;
use crate::net::local_ip_towards;
use crate::reconcile::ResetHandle;
use crate::reconcile::TopologyReconciler;
use crate::rpc::RemoteCommandHandle;
use crate::utils::async_task::spawn_task;
use crate::watcher::AbortHandle;
use crate::watcher::AbortSignal;
use crate::watcher::WatcherHub;
use crate::Error;
use crate::Result;
use crate::Settings;

pub struct Agent {
    host: String,
    hub: Arc<WatcherHub>,
    handle: Arc<RemoteCommandHandle>,
    reconciler: Option<TopologyReconciler>,
    reset: ResetHandle,
    aborts: mpsc::UnboundedReceiver<AbortSignal>,
    supervisor_interval: Duration,
    /// Parent of every task the agent spawns
    tasks: CancellationToken,
}

impl Agent {
    /// Connects, prepares `remotecontrol/{host}` and claims pending requests.
    ///
    /// Stale requests left in `input` by a previous run are discarded before
    /// the input watch is armed.
    pub async fn start(
        connector: Arc<dyn Connector>,
        settings: &Settings,
        runner: Arc<dyn ScriptRunner>,
    ) -> Result<Self> {
        let host = resolve_host(settings)?;
        let root = settings.coordination.root.as_str();
        let (abort, aborts) = AbortHandle::channel();
        let hub = WatcherHub::connect(
            &format!("agent-{host}"),
            connector,
            abort,
            settings.coordination.connect_timeout(),
        )
        .await?;

        let tasks = CancellationToken::new();
        let handle = Arc::new(RemoteCommandHandle::new(
            hub.clone(),
            root,
            &host,
            runner.clone(),
            tasks.child_token(),
        ));
        let client = hub.client();
        ensure_path(client.as_ref(), handle.input_path()).await?;
        ensure_path(client.as_ref(), handle.output_path()).await?;
        delete_children_recursively(client.as_ref(), handle.input_path(), &[]).await?;
        hub.register_listener(handle.clone());
        let claimed = handle.drain_requests().await?;
        info!("agent {host} listening on {} ({claimed} pending)", handle.input_path());

        let reconciler = TopologyReconciler::new(hub.clone(), runner, root, &settings.agent);
        let reset = reconciler.reset_handle();
        Ok(Self {
            host,
            hub,
            handle,
            reconciler: Some(reconciler),
            reset,
            aborts,
            supervisor_interval: settings.agent.supervisor_interval(),
            tasks,
        })
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    pub fn hub(&self) -> &Arc<WatcherHub> {
        &self.hub
    }

    /// Runs the reconciler and supervises until `shutdown` or a fatal abort.
    ///
    /// Always releases the session and stops every spawned task before
    /// returning.
    pub async fn run(
        mut self,
        shutdown: CancellationToken,
    ) -> Result<()> {
        let mut handles = Vec::new();
        if let Some(reconciler) = self.reconciler.take() {
            let token = self.tasks.child_token();
            spawn_task("reconciler", move || reconciler.run(token), Some(&mut handles));
        }

        let result = self.supervise(&shutdown).await;

        self.tasks.cancel();
        for handle in handles {
            if let Err(e) = handle.await {
                warn!("agent task failed: {e}");
            }
        }
        if let Err(e) = self.hub.close().await {
            debug!("closing agent session: {e}");
        }
        info!("agent {} stopped", self.host);
        result
    }

    async fn supervise(
        &mut self,
        shutdown: &CancellationToken,
    ) -> Result<()> {
        loop {
            let signal = tokio::select! {
                biased;
                _ = shutdown.cancelled() => return Ok(()),
                signal = self.aborts.recv() => match signal {
                    Some(signal) => signal,
                    None => return Err(Error::Fatal("abort channel closed".to_string())),
                },
            };

            if !signal.cause.is_session_expired() {
                error!("agent aborting: {}: {}", signal.reason, signal.cause);
                return Err(signal.cause);
            }
            self.recover().await;

            tokio::select! {
                _ = shutdown.cancelled() => return Ok(()),
                _ = tokio::time::sleep(self.supervisor_interval) => {}
            }
        }
    }

    /// Replaces an expired session. Failures are logged and the agent keeps
    /// running on whatever session it has until the next expiry.
    async fn recover(&self) {
        if self.hub.probe().await.is_ok() {
            info!("session {} still usable, nothing to recover", self.hub.session_id());
            return;
        }
        match self.rearm().await {
            Ok(claimed) => info!(
                "agent recovered on session {} ({claimed} pending requests claimed)",
                self.hub.session_id()
            ),
            Err(e) => warn!("session recovery failed, running degraded: {e}"),
        }
    }

    async fn rearm(&self) -> Result<usize> {
        self.hub.reconnect().await?;
        let client = self.hub.client();
        ensure_path(client.as_ref(), self.handle.input_path()).await?;
        ensure_path(client.as_ref(), self.handle.output_path()).await?;
        self.reset.reset();
        self.handle.drain_requests().await
    }
}

/// `agent.host_ip`, or the local address routed towards the first server.
pub fn resolve_host(settings: &Settings) -> Result<String> {
    if let Some(ip) = &settings.agent.host_ip {
        return Ok(ip.clone());
    }
    let server = settings
        .coordination
        .first_server()
        .ok_or_else(|| Error::Fatal("no coordination server configured".to_string()))?;
    let ip = local_ip_towards(server)?;
    debug!("host ip resolved to {ip} via {server}");
    Ok(ip.to_string())
}
