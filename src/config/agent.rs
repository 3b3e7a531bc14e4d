use std::net::Ipv4Addr;
use std::time::Duration;

use serde::Deserialize;
use serde::Serialize;

use super::config_error;
use crate::constants::DEFAULT_RESULT_PREFIX;
use crate::Result;

/// Host agent settings
///
/// Field-level defaults use helper functions prefixed with `default_`.
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct AgentConfig {
    /// Run the host agent inside this process
    #[serde(default = "default_enabled")]
    pub enabled: bool,

    /// IPv4 address naming this host under `remotecontrol/`
    ///
    /// When unset, the local address routed towards the first coordination
    /// server is used.
    #[serde(default)]
    pub host_ip: Option<String>,

    /// Prints one `ha:engine:group:subgroup:instance:payload` line per local instance
    #[serde(default = "default_discovery_script")]
    pub discovery_script: String,

    /// Prints `10` when keepalived runs behind a load balancer
    #[serde(default = "default_ha_conf_script")]
    pub ha_conf_script: String,

    /// Watchdog for both scripts
    #[serde(default = "default_script_timeout_ms")]
    pub script_timeout_ms: u64,

    /// Pause between reconciliation cycles
    #[serde(default = "default_monitor_interval_ms")]
    pub monitor_interval_ms: u64,

    /// Pause between supervisor checks
    #[serde(default = "default_supervisor_interval_ms")]
    pub supervisor_interval_ms: u64,

    /// Delay inserted between consecutive mirror mutations
    #[serde(default = "default_mutation_delay_ms")]
    pub mutation_delay_ms: u64,

    /// Forced full rebuild happens after a random delay in
    /// `[refresh_min_hours, refresh_max_hours]`
    #[serde(default = "default_refresh_min_hours")]
    pub refresh_min_hours: u64,
    #[serde(default = "default_refresh_max_hours")]
    pub refresh_max_hours: u64,

    /// Marker stripped from discovery output
    #[serde(default = "default_result_prefix")]
    pub discovery_result_prefix: String,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            enabled: default_enabled(),
            host_ip: None,
            discovery_script: default_discovery_script(),
            ha_conf_script: default_ha_conf_script(),
            script_timeout_ms: default_script_timeout_ms(),
            monitor_interval_ms: default_monitor_interval_ms(),
            supervisor_interval_ms: default_supervisor_interval_ms(),
            mutation_delay_ms: default_mutation_delay_ms(),
            refresh_min_hours: default_refresh_min_hours(),
            refresh_max_hours: default_refresh_max_hours(),
            discovery_result_prefix: default_result_prefix(),
        }
    }
}

impl AgentConfig {
    pub fn validate(&self) -> Result<()> {
        if let Some(ip) = &self.host_ip {
            if ip.parse::<Ipv4Addr>().is_err() {
                return Err(config_error(format!("agent.host_ip {ip:?} is not an IPv4 address")));
            }
        }
        if self.discovery_script.trim().is_empty() {
            return Err(config_error("agent.discovery_script cannot be empty"));
        }
        if self.monitor_interval_ms == 0 || self.supervisor_interval_ms == 0 {
            return Err(config_error("agent intervals must be > 0"));
        }
        if self.refresh_min_hours > self.refresh_max_hours {
            return Err(config_error(format!(
                "agent.refresh_min_hours ({}) exceeds refresh_max_hours ({})",
                self.refresh_min_hours, self.refresh_max_hours
            )));
        }
        Ok(())
    }

    pub fn script_timeout(&self) -> Duration {
        Duration::from_millis(self.script_timeout_ms)
    }

    pub fn monitor_interval(&self) -> Duration {
        Duration::from_millis(self.monitor_interval_ms)
    }

    pub fn supervisor_interval(&self) -> Duration {
        Duration::from_millis(self.supervisor_interval_ms)
    }

    pub fn mutation_delay(&self) -> Duration {
        Duration::from_millis(self.mutation_delay_ms)
    }

    pub fn refresh_window(&self) -> (Duration, Duration) {
        (
            Duration::from_secs(self.refresh_min_hours * 3600),
            Duration::from_secs(self.refresh_max_hours * 3600),
        )
    }
}

fn default_enabled() -> bool {
    true
}
fn default_discovery_script() -> String {
    "/opt/fleet/bin/check_db.sh".to_string()
}
fn default_ha_conf_script() -> String {
    "/opt/fleet/bin/check_haconf.sh".to_string()
}
fn default_script_timeout_ms() -> u64 {
    30_000
}
fn default_monitor_interval_ms() -> u64 {
    60_000
}
fn default_supervisor_interval_ms() -> u64 {
    1_000
}
fn default_mutation_delay_ms() -> u64 {
    200
}
fn default_refresh_min_hours() -> u64 {
    12
}
fn default_refresh_max_hours() -> u64 {
    24
}
fn default_result_prefix() -> String {
    DEFAULT_RESULT_PREFIX.to_string()
}
