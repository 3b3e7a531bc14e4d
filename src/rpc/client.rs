use std::collections::BTreeMap;
use std::net::Ipv4Addr;
use std::sync::Arc;
use std::time::Duration;

use tokio::time::Instant;
use tracing::debug;
use tracing::info;

use super::input_path;
use super::output_path;
use super::result_node_name;
use super::result_prefix;
use super::CommandRequest;
use crate::constants::COMMAND_PREFIX;
use crate::constants::EOF_SENTINEL;
use crate::coordination::ops::create_sequential;
use crate::coordination::ops::join_path;
use crate::coordination::ops::node_name;
use crate::coordination::CoordinationClient;
use crate::ClientConfig;
use crate::Error;
use crate::ProtocolError;
use crate::Result;

/// Submits commands to host agents.
///
/// # Example
/// ```ignore
/// let rc = RemoteCommand::new(client, "/fleet", &settings.client);
/// let mut result = rc.submit("10.0.0.1", "uptime", Duration::from_secs(5)).await?;
/// if result.poll().await? == ResultStatus::Ready {
///     while let Some(line) = result.next_line().await? {
///         println!("{line}");
///     }
/// }
/// ```
pub struct RemoteCommand {
    client: Arc<dyn CoordinationClient>,
    root: String,
    poll_interval: Duration,
    read_retry_delay: Duration,
}

impl RemoteCommand {
    pub fn new(
        client: Arc<dyn CoordinationClient>,
        root: &str,
        config: &ClientConfig,
    ) -> Self {
        Self {
            client,
            root: root.to_string(),
            poll_interval: config.poll_interval(),
            read_retry_delay: config.read_retry_delay(),
        }
    }

    /// Queues `command` for the agent on `host`.
    ///
    /// # Parameters
    /// - `host`: dotted IPv4 address the agent registered under
    /// - `timeout`: watchdog for the command, also bounds result polling; zero means unlimited
    ///
    /// # Errors
    /// - `ProtocolError::InvalidHost` / `ProtocolError::EmptyCommand` on bad input
    /// - `CoordinationError::NoNode` when no agent ever registered for `host`
    pub async fn submit(
        &self,
        host: &str,
        command: &str,
        timeout: Duration,
    ) -> Result<CommandResult> {
        if host.parse::<Ipv4Addr>().is_err() {
            return Err(ProtocolError::InvalidHost(host.to_string()).into());
        }
        if command.trim().is_empty() {
            return Err(ProtocolError::EmptyCommand.into());
        }

        let prefix = join_path(&input_path(&self.root, host), COMMAND_PREFIX);
        let payload = CommandRequest::encode_payload(command, timeout);
        let path = create_sequential(self.client.as_ref(), &prefix, payload.as_bytes()).await?;
        let command_id = node_name(&path)
            .trim_start_matches(COMMAND_PREFIX)
            .parse::<u64>()
            .map_err(|e| Error::Fatal(format!("unexpected sequential node {path}: {e}")))?;
        info!("Execute command on {host}: {payload} as {path}");

        Ok(CommandResult {
            client: self.client.clone(),
            output_path: output_path(&self.root, host),
            command_id,
            timeout,
            poll_interval: self.poll_interval,
            read_retry_delay: self.read_retry_delay,
            buffer: BTreeMap::new(),
            next_seq: 0,
            finished: false,
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResultStatus {
    Ready,
    NotReady,
}

/// Reads the result stream of one submitted command.
///
/// Result nodes are consumed: each is deleted right after it is read.
pub struct CommandResult {
    client: Arc<dyn CoordinationClient>,
    output_path: String,
    command_id: u64,
    timeout: Duration,
    poll_interval: Duration,
    read_retry_delay: Duration,
    buffer: BTreeMap<u64, String>,
    next_seq: u64,
    finished: bool,
}

impl CommandResult {
    pub fn command_id(&self) -> u64 {
        self.command_id
    }

    /// Waits, re-checking every poll interval, until the first result node
    /// exists or the command timeout elapses. A zero timeout waits forever.
    pub async fn poll(&self) -> Result<ResultStatus> {
        if self.next_seq > 0 || !self.buffer.is_empty() {
            return Ok(ResultStatus::Ready);
        }
        let first = join_path(&self.output_path, &result_node_name(self.command_id, 0));
        let started = Instant::now();
        loop {
            if self.client.exists(&first, false).await?.is_some() {
                return Ok(ResultStatus::Ready);
            }
            if !self.timeout.is_zero() && started.elapsed() >= self.timeout {
                debug!("command {} not ready after {:?}", self.command_id, self.timeout);
                return Ok(ResultStatus::NotReady);
            }
            tokio::time::sleep(self.poll_interval).await;
        }
    }

    /// Returns the next output line, or `None` once `EOF` was read.
    ///
    /// # Errors
    /// `ProtocolError::ResultTimeout` when no new result node shows up
    /// within the command timeout (never, for a zero timeout).
    pub async fn next_line(&mut self) -> Result<Option<String>> {
        if self.finished {
            return Ok(None);
        }
        let mut idle_since = Instant::now();
        loop {
            if let Some(line) = self.buffer.remove(&self.next_seq) {
                self.next_seq += 1;
                if line == EOF_SENTINEL {
                    self.finished = true;
                    return Ok(None);
                }
                return Ok(Some(line));
            }

            if self.fetch().await? > 0 {
                idle_since = Instant::now();
                continue;
            }
            if !self.timeout.is_zero() && idle_since.elapsed() >= self.timeout {
                return Err(ProtocolError::ResultTimeout {
                    command_id: self.command_id,
                    waited: self.timeout,
                }
                .into());
            }
            tokio::time::sleep(self.read_retry_delay).await;
        }
    }

    /// Reads lines until end of stream.
    pub async fn collect(mut self) -> Result<Vec<String>> {
        let mut lines = Vec::new();
        while let Some(line) = self.next_line().await? {
            lines.push(line);
        }
        Ok(lines)
    }

    /// Buffers and deletes every visible result node of this command.
    /// Listing order says nothing about sequence order.
    async fn fetch(&mut self) -> Result<usize> {
        let prefix = result_prefix(self.command_id);
        let children = self.client.get_children(&self.output_path, false).await?;
        let mut fetched = 0;
        for name in children {
            let Some(seq) = name.strip_prefix(&prefix).and_then(|s| s.parse::<u64>().ok()) else {
                continue;
            };
            if seq < self.next_seq || self.buffer.contains_key(&seq) {
                continue;
            }
            let path = join_path(&self.output_path, &name);
            let data = match self.client.get_data(&path, false).await {
                Ok((data, _)) => data,
                Err(e) if e.is_no_node() => continue,
                Err(e) => return Err(e),
            };
            match self.client.delete(&path, None).await {
                Ok(()) => {}
                Err(e) if e.is_no_node() => {}
                Err(e) => return Err(e),
            }
            self.buffer.insert(seq, String::from_utf8_lossy(&data).into_owned());
            fetched += 1;
        }
        Ok(fetched)
    }
}
