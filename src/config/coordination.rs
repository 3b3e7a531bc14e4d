use std::time::Duration;

use serde::Deserialize;
use serde::Serialize;

use super::config_error;
use crate::Result;

/// Coordination service connection parameters
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct CoordinationConfig {
    /// Comma separated `host:port` list
    ///
    /// Default: `default_servers()` (127.0.0.1:2181)
    #[serde(default = "default_servers")]
    pub servers: String,

    /// Root of every path this process reads or writes
    ///
    /// Default: `default_root()` (/fleet)
    #[serde(default = "default_root")]
    pub root: String,

    /// Session timeout; also the pause applied after session recovery
    #[serde(default = "default_session_timeout_ms")]
    pub session_timeout_ms: u64,

    /// How long to wait for a new session to report `Connected`
    #[serde(default = "default_connect_timeout_ms")]
    pub connect_timeout_ms: u64,

    /// Run against a private in-process tree instead of `servers`.
    /// Only meaningful for demos and single-process setups.
    #[serde(default)]
    pub embedded: bool,
}

impl Default for CoordinationConfig {
    fn default() -> Self {
        Self {
            servers: default_servers(),
            root: default_root(),
            session_timeout_ms: default_session_timeout_ms(),
            connect_timeout_ms: default_connect_timeout_ms(),
            embedded: false,
        }
    }
}

impl CoordinationConfig {
    pub fn validate(&self) -> Result<()> {
        if self.first_server().is_none() {
            return Err(config_error("coordination.servers must list at least one server"));
        }
        if !self.root.starts_with('/') || self.root.len() < 2 || self.root.ends_with('/') {
            return Err(config_error(format!(
                "coordination.root must be an absolute path without trailing slash, got {:?}",
                self.root
            )));
        }
        if self.session_timeout_ms == 0 {
            return Err(config_error("coordination.session_timeout_ms must be > 0"));
        }
        if self.connect_timeout_ms == 0 {
            return Err(config_error("coordination.connect_timeout_ms must be > 0"));
        }
        Ok(())
    }

    pub fn first_server(&self) -> Option<&str> {
        self.servers.split(',').map(str::trim).find(|s| !s.is_empty())
    }

    pub fn session_timeout(&self) -> Duration {
        Duration::from_millis(self.session_timeout_ms)
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }
}

fn default_servers() -> String {
    "127.0.0.1:2181".to_string()
}
fn default_root() -> String {
    "/fleet".to_string()
}
fn default_session_timeout_ms() -> u64 {
    180_000
}
fn default_connect_timeout_ms() -> u64 {
    30_000
}
