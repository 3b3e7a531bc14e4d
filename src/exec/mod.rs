//! Local process execution for discovery scripts and remote commands.

mod shell;
pub use shell::*;


use std::time::Duration;

use async_trait::async_trait;
use futures::stream::BoxStream;
#[cfg(test)]
use mockall::automock;

use crate::Result;

/// Stdout of a running process, one item per line.
///
/// Dropping the stream kills the process.
pub type OutputLines = BoxStream<'static, Result<String>>;

#[cfg_attr(test, automock)]
#[async_trait]
pub trait ScriptRunner: Send + Sync + 'static {
    /// Runs `command` to completion and returns its stdout.
    ///
    /// A zero `timeout` means no watchdog.
    ///
    /// # Errors
    /// `ExecError` when the process cannot start, exits non-zero or is
    /// killed by the watchdog.
    async fn run(
        &self,
        command: &str,
        timeout: Duration,
    ) -> Result<String>;

    /// Starts `command` and streams its stdout. The stream ends once the
    /// process has exited.
    async fn stream_lines(
        &self,
        command: &str,
    ) -> Result<OutputLines>;
}
