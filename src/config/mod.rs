//! Configuration management for the fleet agent and collector.
//!
//! Provides hierarchical configuration loading and validation with:
//! - Default values as code base
//! - Configuration file support
//! - Environment variable overrides
//! - Component-wise validation
mod agent;
mod client;
mod collector;
mod coordination;
mod logging;
pub use agent::*;
pub use client::*;
pub use collector::*;
pub use coordination::*;
pub use logging::*;

use std::env;
use std::fmt::Debug;

use config::Config;
use config::Environment;
use config::File;
use serde::Deserialize;
use serde::Serialize;

use crate::Result;

/// Environment prefix, e.g. `FLEET__AGENT__HOST_IP`
pub const ENV_PREFIX: &str = "FLEET";

/// Main configuration container
///
/// Combines all subsystem configurations with hierarchical override support:
/// 1. Default values from code implementation
/// 2. Configuration file specified by `CONFIG_PATH`
/// 3. Environment variables (highest priority)
#[derive(Serialize, Deserialize, Clone, Default)]
pub struct Settings {
    /// Coordination service endpoint and tree root
    #[serde(default)]
    pub coordination: CoordinationConfig,
    /// Host agent: discovery scripts and reconciliation pacing
    #[serde(default)]
    pub agent: AgentConfig,
    /// CDC collector and its heartbeat
    #[serde(default)]
    pub collector: CollectorConfig,
    /// Remote command client pacing
    #[serde(default)]
    pub client: ClientConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl Debug for Settings {
    fn fmt(
        &self,
        f: &mut std::fmt::Formatter<'_>,
    ) -> std::fmt::Result {
        f.debug_struct("Settings")
            .field("coordination", &self.coordination)
            .field("agent", &self.agent)
            .finish()
    }
}

impl Settings {
    /// Loads configuration from hierarchical sources without validation.
    ///
    /// Sources are merged in the following order (later sources override earlier):
    /// 1. Type defaults (lowest priority)
    /// 2. Configuration file from `CONFIG_PATH` environment variable (if set)
    /// 3. Environment variables with `FLEET__` prefix (highest priority)
    ///
    /// # Note
    /// Validation is deferred so that `with_override_config()` can still be
    /// applied. Callers MUST call `validate()` before using the configuration.
    ///
    /// # Examples
    /// ```ignore
    /// std::env::set_var("CONFIG_PATH", "config/agent.toml");
    /// std::env::set_var("FLEET__AGENT__HOST_IP", "10.0.0.1");
    /// let settings = Settings::new()?.validate()?;
    /// ```
    pub fn new() -> Result<Self> {
        let mut builder = Config::builder().add_source(Config::try_from(&Self::default())?);

        if let Ok(config_path) = env::var("CONFIG_PATH") {
            builder = builder.add_source(File::with_name(&config_path).required(true));
        }

        builder = builder.add_source(env_source());

        let settings: Self = builder.build()?.try_deserialize()?;
        Ok(settings)
    }

    /// Applies additional configuration overrides from file without validation.
    ///
    /// Merging order (later sources override earlier):
    /// 1. Current configuration values
    /// 2. New configuration file
    /// 3. Latest environment variables (highest priority)
    pub fn with_override_config(
        &self,
        path: &str,
    ) -> Result<Self> {
        let settings: Self = Config::builder()
            .add_source(Config::try_from(self)?)
            .add_source(File::with_name(path))
            .add_source(env_source())
            .build()?
            .try_deserialize()?;
        Ok(settings)
    }

    /// Validates every section and returns the validated instance.
    ///
    /// # Errors
    /// Returns the first `Error::Config` raised by any section.
    pub fn validate(self) -> Result<Self> {
        if !self.agent.enabled && !self.collector.enabled {
            return Err(config_error("neither agent.enabled nor collector.enabled is set"));
        }
        self.coordination.validate()?;
        self.agent.validate()?;
        self.collector.validate()?;
        self.client.validate()?;
        self.logging.validate()?;
        Ok(self)
    }
}

fn env_source() -> Environment {
    Environment::with_prefix(ENV_PREFIX)
        .separator("__")
        .ignore_empty(true)
        .try_parsing(true)
}

pub(crate) fn config_error(msg: impl Into<String>) -> crate::Error {
    crate::Error::Config(config::ConfigError::Message(msg.into()))
}
