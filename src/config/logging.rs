use std::path::PathBuf;

use serde::Deserialize;
use serde::Serialize;

use super::config_error;
use crate::Result;

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct LoggingConfig {
    /// Log files output directory
    ///
    /// Default: `default_log_dir()` (./logs)
    #[serde(default = "default_log_dir")]
    pub log_dir: PathBuf,

    /// Log file stem, `{log_dir}/{identifier}.log`
    #[serde(default = "default_identifier")]
    pub identifier: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            log_dir: default_log_dir(),
            identifier: default_identifier(),
        }
    }
}

impl LoggingConfig {
    pub fn validate(&self) -> Result<()> {
        if self.identifier.is_empty() || self.identifier.contains('/') {
            return Err(config_error(format!(
                "logging.identifier {:?} must be a plain file stem",
                self.identifier
            )));
        }
        Ok(())
    }

    pub fn log_file(&self) -> PathBuf {
        self.log_dir.join(format!("{}.log", self.identifier))
    }
}

fn default_log_dir() -> PathBuf {
    PathBuf::from("./logs")
}
fn default_identifier() -> String {
    "fleet-agent".to_string()
}
