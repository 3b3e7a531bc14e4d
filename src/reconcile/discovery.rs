use tracing::warn;

use crate::constants::DISCOVERY_FIELD_COUNT;
use crate::constants::GROUP_PREFIX;
use crate::constants::HA_LVS_STATUS;
use crate::constants::INSTANCE_PREFIX;
use crate::constants::NO_DATABASE_CODES;
use crate::constants::SCRIPT_ERROR_CODE;
use crate::coordination::ops::join_path;

/// Interpretation of one discovery script run
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DiscoveryOutcome {
    /// The script reported an internal error
    ScriptError,
    /// No database is running on this host right now
    NoDatabase,
    Instances(Vec<InstanceRecord>),
}

/// One `ha:engine:group:subgroup:instance:payload` line
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstanceRecord {
    pub ha_flag: String,
    pub engine: String,
    pub group: String,
    pub subgroup: String,
    pub instance: String,
    pub payload: String,
}

/// Strips every occurrence of `result_prefix`, then classifies the output.
/// Lines without exactly six fields are skipped.
pub fn parse_discovery_output(
    raw: &str,
    result_prefix: &str,
) -> DiscoveryOutcome {
    let stripped = if result_prefix.is_empty() {
        raw.to_string()
    } else {
        raw.replace(result_prefix, "")
    };
    let output = stripped.trim();
    if output == SCRIPT_ERROR_CODE {
        return DiscoveryOutcome::ScriptError;
    }
    if NO_DATABASE_CODES.contains(&output) {
        return DiscoveryOutcome::NoDatabase;
    }

    let records = output
        .lines()
        .map(str::trim_end)
        .filter(|line| !line.is_empty())
        .filter_map(|line| {
            let fields: Vec<&str> = line.split(':').collect();
            if fields.len() != DISCOVERY_FIELD_COUNT {
                warn!("skipping malformed discovery line {line:?}");
                return None;
            }
            Some(InstanceRecord {
                ha_flag: fields[0].to_string(),
                engine: fields[1].to_string(),
                group: fields[2].to_string(),
                subgroup: fields[3].to_string(),
                instance: fields[4].to_string(),
                payload: fields[5].to_string(),
            })
        })
        .collect();
    DiscoveryOutcome::Instances(records)
}

impl InstanceRecord {
    /// `{topology_root}/{group}`
    pub fn group_path(
        &self,
        topology_root: &str,
    ) -> String {
        join_path(topology_root, &self.group)
    }

    /// `{group_path}/grp@{subgroup}`
    pub fn subgroup_path(
        &self,
        topology_root: &str,
    ) -> String {
        join_path(
            &self.group_path(topology_root),
            &format!("{GROUP_PREFIX}{}", self.subgroup),
        )
    }

    /// `{subgroup_path}/inst@{instance}`
    pub fn instance_path(
        &self,
        topology_root: &str,
    ) -> String {
        join_path(
            &self.subgroup_path(topology_root),
            &format!("{INSTANCE_PREFIX}{}", self.instance),
        )
    }

    /// Payload of the subgroup container: `W` for read-write engines, `R`
    /// for load balancers and proxies, `None` for engines we do not mirror.
    pub fn group_role(&self) -> Option<&'static str> {
        const READ_WRITE: [&str; 4] = ["mysql", "oracle", "mongodb", "PXCW"];
        const READ_ONLY: [&str; 3] = ["lvs", "proxy", "PXCR"];
        let is = |kinds: &[&str]| kinds.iter().any(|k| k.eq_ignore_ascii_case(&self.engine));
        if is(&READ_WRITE) {
            Some("W")
        } else if is(&READ_ONLY) {
            Some("R")
        } else {
            None
        }
    }

    /// Whether enrichment needs the HA status check
    pub fn needs_ha_status(&self) -> bool {
        self.ha_flag == "Y" && self.engine.eq_ignore_ascii_case("mysql")
    }

    /// Mirror payload with HA metadata appended.
    ///
    /// `ha_status` is the trimmed output of the HA status check; it is only
    /// consulted when [`InstanceRecord::needs_ha_status`] holds.
    pub fn enriched_payload(
        &self,
        ha_status: Option<&str>,
    ) -> String {
        let mut data = self.payload.clone();
        if self.ha_flag != "C" {
            data.push_str(&format!(
                "@is_ha={flag}@is_keepalived={flag}",
                flag = self.ha_flag
            ));
        }
        if self.needs_ha_status() {
            if ha_status.map(str::trim) == Some(HA_LVS_STATUS) {
                data.push_str("@haVersion=keepalived+lvs");
            } else {
                data.push_str("@haVersion=keepalived");
            }
        }
        data
    }
}
