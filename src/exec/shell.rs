use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use futures::stream;
use futures::StreamExt;
use tokio::io::AsyncBufReadExt;
use tokio::io::BufReader;
use tokio::process::Command;
use tokio_stream::wrappers::LinesStream;
use tracing::debug;
use tracing::warn;

use super::OutputLines;
use super::ScriptRunner;
use crate::Error;
use crate::ExecError;
use crate::Result;

/// Runs commands through `sh -c`
#[derive(Debug, Clone)]
pub struct ShellRunner {
    shell: String,
}

impl Default for ShellRunner {
    fn default() -> Self {
        Self {
            shell: "sh".to_string(),
        }
    }
}

impl ShellRunner {
    pub fn new() -> Self {
        Self::default()
    }

    fn command(
        &self,
        command: &str,
    ) -> Command {
        let mut cmd = Command::new(&self.shell);
        cmd.arg("-c")
            .arg(command)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .kill_on_drop(true);
        cmd
    }

    fn spawn_error(
        command: &str,
        source: std::io::Error,
    ) -> Error {
        ExecError::Spawn {
            command: command.to_string(),
            source,
        }
        .into()
    }
}

#[async_trait]
impl ScriptRunner for ShellRunner {
    async fn run(
        &self,
        command: &str,
        timeout: Duration,
    ) -> Result<String> {
        debug!(%command, ?timeout, "ShellRunner::run");
        let child = self
            .command(command)
            .spawn()
            .map_err(|e| Self::spawn_error(command, e))?;
        let output = child.wait_with_output();

        let output = if timeout.is_zero() {
            output.await?
        } else {
            match tokio::time::timeout(timeout, output).await {
                Ok(result) => result?,
                Err(_) => {
                    warn!(%command, "killed by watchdog after {:?}", timeout);
                    return Err(ExecError::Timeout {
                        command: command.to_string(),
                        timeout,
                    }
                    .into());
                }
            }
        };

        if !output.status.success() {
            return Err(ExecError::NonZeroExit {
                command: command.to_string(),
                code: output.status.code(),
            }
            .into());
        }
        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }

    async fn stream_lines(
        &self,
        command: &str,
    ) -> Result<OutputLines> {
        debug!(%command, "ShellRunner::stream_lines");
        let mut child = self
            .command(command)
            .spawn()
            .map_err(|e| Self::spawn_error(command, e))?;
        let stdout = child.stdout.take().ok_or_else(|| ExecError::MissingStdout {
            command: command.to_string(),
        })?;

        let lines =
            LinesStream::new(BufReader::new(stdout).lines()).map(|line| line.map_err(Error::from));
        let command = command.to_string();
        // reaps the process after stdout closes; owning `child` here ties its
        // lifetime to the stream
        let exit = stream::once(async move {
            match child.wait().await {
                Ok(status) => {
                    debug!(%command, ?status, "process exited");
                    None::<Result<String>>
                }
                Err(e) => Some(Err(Error::from(e))),
            }
        })
        .filter_map(futures::future::ready);

        Ok(lines.chain(exit).boxed())
    }
}
