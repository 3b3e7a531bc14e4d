use std::time::Duration;

use serde::Deserialize;
use serde::Serialize;

use super::config_error;
use crate::Result;

/// Remote command client pacing
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct ClientConfig {
    /// Interval between checks for the first result node
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,

    /// Delay before re-listing when no new result node was found
    #[serde(default = "default_read_retry_delay_ms")]
    pub read_retry_delay_ms: u64,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: default_poll_interval_ms(),
            read_retry_delay_ms: default_read_retry_delay_ms(),
        }
    }
}

impl ClientConfig {
    pub fn validate(&self) -> Result<()> {
        if self.poll_interval_ms == 0 {
            return Err(config_error("client.poll_interval_ms must be > 0"));
        }
        Ok(())
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn read_retry_delay(&self) -> Duration {
        Duration::from_millis(self.read_retry_delay_ms)
    }
}

fn default_poll_interval_ms() -> u64 {
    1_000
}
fn default_read_retry_delay_ms() -> u64 {
    3
}
