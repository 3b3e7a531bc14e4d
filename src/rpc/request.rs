use std::time::Duration;

use crate::constants::FIELD_SPLIT;
use crate::coordination::ops::node_name;
use crate::ProtocolError;
use crate::Result;

/// A claimed `cmd@{seq}` request node
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandRequest {
    pub id: u64,
    pub command: String,
    /// Zero means no watchdog
    pub timeout: Duration,
}

impl CommandRequest {
    /// `command<FIELD_SPLIT>timeoutMillis`, split at the last separator so
    /// the command text itself may contain it.
    pub fn encode_payload(
        command: &str,
        timeout: Duration,
    ) -> String {
        format!("{command}{FIELD_SPLIT}{}", timeout.as_millis())
    }

    pub fn parse(
        path: &str,
        data: &[u8],
    ) -> Result<Self> {
        let malformed = |reason: String| ProtocolError::MalformedRequest {
            path: path.to_string(),
            reason,
        };

        let name = node_name(path);
        let id = name
            .rsplit_once('@')
            .and_then(|(_, seq)| seq.parse::<u64>().ok())
            .ok_or_else(|| malformed(format!("no sequence number in {name:?}")))?;

        let payload =
            std::str::from_utf8(data).map_err(|e| malformed(format!("payload is not UTF-8: {e}")))?;
        let (command, timeout) = payload
            .rsplit_once(FIELD_SPLIT)
            .ok_or_else(|| malformed(format!("missing {FIELD_SPLIT:?} separator")))?;
        let timeout_ms = timeout
            .trim()
            .parse::<u64>()
            .map_err(|e| malformed(format!("bad timeout {timeout:?}: {e}")))?;
        if command.trim().is_empty() {
            return Err(malformed("empty command".to_string()).into());
        }

        Ok(Self {
            id,
            command: command.to_string(),
            timeout: Duration::from_millis(timeout_ms),
        })
    }
}
