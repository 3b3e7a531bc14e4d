use std::time::Duration;

use serde::Deserialize;
use serde::Serialize;

use super::config_error;
use crate::Result;

/// CDC collector settings
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct CollectorConfig {
    /// Run the collector inside this process. A deployment runs exactly one
    /// collector against the shared tree.
    #[serde(default)]
    pub enabled: bool,

    #[serde(default = "default_heartbeat_interval_ms")]
    pub heartbeat_interval_ms: u64,

    /// PostgreSQL URL of the heartbeat store; heartbeats are skipped when unset
    #[serde(default)]
    pub heartbeat_url: Option<String>,

    #[serde(default = "default_heartbeat_statement")]
    pub heartbeat_statement: String,
}

impl Default for CollectorConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            heartbeat_interval_ms: default_heartbeat_interval_ms(),
            heartbeat_url: None,
            heartbeat_statement: default_heartbeat_statement(),
        }
    }
}

impl CollectorConfig {
    pub fn validate(&self) -> Result<()> {
        if self.heartbeat_interval_ms == 0 {
            return Err(config_error("collector.heartbeat_interval_ms must be > 0"));
        }
        if self.heartbeat_url.is_some() && self.heartbeat_statement.trim().is_empty() {
            return Err(config_error(
                "collector.heartbeat_statement cannot be empty when heartbeat_url is set",
            ));
        }
        Ok(())
    }

    pub fn heartbeat_interval(&self) -> Duration {
        Duration::from_millis(self.heartbeat_interval_ms)
    }
}

fn default_heartbeat_interval_ms() -> u64 {
    60_000
}
fn default_heartbeat_statement() -> String {
    "UPDATE cloud_heartbeat SET enqueue_time = now()".to_string()
}
