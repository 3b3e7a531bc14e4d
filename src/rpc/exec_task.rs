use std::sync::Arc;

use futures::StreamExt;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::info;
use tracing::warn;

use super::result_node_name;
use super::CommandRequest;
use crate::constants::EOF_SENTINEL;
use crate::coordination::ops::join_path;
use crate::coordination::CreateMode;
use crate::exec::ScriptRunner;
use crate::time::as_deadline;
use crate::watcher::WatcherHub;
use crate::Result;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExecOutcome {
    /// Process exited on its own; `EOF` written after `lines` results
    Completed { lines: u64 },
    /// Killed by the watchdog; no `EOF` written
    TimedOut { lines: u64 },
}

/// Runs one claimed command and streams its stdout into result nodes.
pub struct ExecCmdTask {
    hub: Arc<WatcherHub>,
    output_path: String,
    request: CommandRequest,
    runner: Arc<dyn ScriptRunner>,
}

impl ExecCmdTask {
    pub fn new(
        hub: Arc<WatcherHub>,
        output_path: &str,
        request: CommandRequest,
        runner: Arc<dyn ScriptRunner>,
    ) -> Self {
        Self {
            hub,
            output_path: output_path.to_string(),
            request,
            runner,
        }
    }

    /// Runs on its own task until completion, watchdog or `cancel`.
    /// Failures are reported through the hub's abort handle.
    pub fn spawn(
        self,
        cancel: CancellationToken,
    ) -> JoinHandle<()> {
        tokio::spawn(async move {
            let id = self.request.id;
            tokio::select! {
                _ = cancel.cancelled() => info!("command {id} interrupted by shutdown"),
                result = self.run() => match result {
                    Ok(outcome) => info!("command {id} finished: {outcome:?}"),
                    Err(e) => {
                        self.hub.abort(format!("executing command {id} failed"), e);
                    }
                },
            }
        })
    }

    pub async fn run(&self) -> Result<ExecOutcome> {
        let CommandRequest {
            id,
            command,
            timeout,
        } = &self.request;
        info!("run command {id}: {command} (timeout {timeout:?})");

        let mut lines = self.runner.stream_lines(command).await?;
        let deadline = as_deadline(*timeout);
        let mut seq = 0;
        loop {
            let next = match deadline {
                Some(deadline) => match tokio::time::timeout_at(deadline, lines.next()).await {
                    Ok(next) => next,
                    Err(_) => {
                        warn!("command {id} killed after {timeout:?}, {seq} lines written");
                        return Ok(ExecOutcome::TimedOut { lines: seq });
                    }
                },
                None => lines.next().await,
            };
            match next {
                Some(line) => {
                    self.write(seq, &line?).await?;
                    seq += 1;
                }
                None => break,
            }
        }
        self.write(seq, EOF_SENTINEL).await?;
        Ok(ExecOutcome::Completed { lines: seq })
    }

    async fn write(
        &self,
        seq: u64,
        line: &str,
    ) -> Result<()> {
        let path = join_path(&self.output_path, &result_node_name(self.request.id, seq));
        self.hub
            .client()
            .create(&path, line.as_bytes(), CreateMode::Ephemeral)
            .await?;
        Ok(())
    }
}
