use std::collections::BTreeMap;
use std::collections::HashSet;
use std::sync::atomic::AtomicBool;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;

use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::debug;
use tracing::error;
use tracing::info;
use tracing::warn;

use super::parse_discovery_output;
use super::DiscoveryOutcome;
use super::InstanceRecord;
use crate::constants::GROUP_BOOTSTRAP_MARKER;
use crate::constants::INSTANCES;
use crate::coordination::ops::create_ephemeral_replacing_stale;
use crate::coordination::ops::create_if_absent;
use crate::coordination::ops::delete_recursively;
use crate::coordination::ops::ensure_path;
use crate::coordination::ops::join_path;
use crate::exec::ScriptRunner;
use crate::time::jittered;
use crate::utils::async_task::sleep_or_cancelled;
use crate::watcher::WatcherHub;
use crate::AgentConfig;
use crate::Result;

/// Requests a full rebuild from outside the reconciliation loop.
#[derive(Debug, Clone, Default)]
pub struct ResetHandle {
    requested: Arc<AtomicBool>,
}

impl ResetHandle {
    /// Drops the cached mirror and pauses one session timeout before the
    /// next cycle.
    pub fn reset(&self) {
        self.requested.store(true, Ordering::SeqCst);
    }

    fn take(&self) -> bool {
        self.requested.swap(false, Ordering::SeqCst)
    }
}

/// Tree writes issued by one cycle
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ApplyStats {
    pub created: usize,
    pub updated: usize,
    pub deleted: usize,
    /// Desired entries that could not be applied this cycle
    pub pending: usize,
}

impl ApplyStats {
    pub fn writes(&self) -> usize {
        self.created + self.updated + self.deleted
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CycleOutcome {
    /// Script output unchanged since the last converged cycle
    Unchanged,
    /// Script failed, timed out, printed nothing or reported an error
    ScriptFailed,
    NoDatabase { deleted: usize },
    Applied(ApplyStats),
}

/// Sleeps between consecutive tree mutations of one cycle.
struct Pacer {
    delay: Duration,
    first: bool,
}

impl Pacer {
    fn new(delay: Duration) -> Self {
        Self { delay, first: true }
    }

    async fn pace(&mut self) {
        if !self.first && !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        self.first = false;
    }
}

/// Mirrors the locally running database instances into
/// `{root}/instances/{group}/grp@{sub}/inst@{key}` as ephemeral nodes.
///
/// All cached state is owned by the loop; the only way in from outside is
/// the [`ResetHandle`].
pub struct TopologyReconciler {
    hub: Arc<WatcherHub>,
    runner: Arc<dyn ScriptRunner>,
    topology_root: String,
    discovery_script: String,
    ha_conf_script: String,
    script_timeout: Duration,
    monitor_interval: Duration,
    mutation_delay: Duration,
    refresh_window: (Duration, Duration),
    result_prefix: String,

    /// Instance path to the payload last written
    mirror: BTreeMap<String, String>,
    created_groups: HashSet<String>,
    /// Raw output of the last converged cycle
    last_raw: Option<String>,
    refresh_deadline: Instant,
    reset: ResetHandle,
}

impl TopologyReconciler {
    pub fn new(
        hub: Arc<WatcherHub>,
        runner: Arc<dyn ScriptRunner>,
        root: &str,
        config: &AgentConfig,
    ) -> Self {
        let refresh_window = config.refresh_window();
        Self {
            hub,
            runner,
            topology_root: join_path(root, INSTANCES),
            discovery_script: config.discovery_script.clone(),
            ha_conf_script: config.ha_conf_script.clone(),
            script_timeout: config.script_timeout(),
            monitor_interval: config.monitor_interval(),
            mutation_delay: config.mutation_delay(),
            refresh_window,
            result_prefix: config.discovery_result_prefix.clone(),
            mirror: BTreeMap::new(),
            created_groups: HashSet::new(),
            last_raw: None,
            refresh_deadline: Instant::now() + jittered(refresh_window.0, refresh_window.1),
            reset: ResetHandle::default(),
        }
    }

    pub fn reset_handle(&self) -> ResetHandle {
        self.reset.clone()
    }

    /// Instance path to mirrored payload
    pub fn mirror(&self) -> &BTreeMap<String, String> {
        &self.mirror
    }

    /// Cycles every monitor interval until `shutdown`.
    ///
    /// Failures other than connection loss are escalated through the hub's
    /// abort handle; the loop itself keeps going until told to stop.
    pub async fn run(
        mut self,
        shutdown: CancellationToken,
    ) -> Result<()> {
        info!("reconciling {} every {:?}", self.topology_root, self.monitor_interval);
        loop {
            if self.reset.take() {
                info!("reconciler reset, pausing one session timeout");
                self.clear();
                if !sleep_or_cancelled(self.hub.session_timeout(), &shutdown).await {
                    break;
                }
            }

            match self.run_cycle().await {
                Ok(outcome) => debug!("reconcile cycle: {outcome:?}"),
                Err(e) => {
                    self.last_raw = None;
                    self.hub.abort("topology reconciler", e);
                }
            }

            if !sleep_or_cancelled(self.monitor_interval, &shutdown).await {
                break;
            }
        }
        info!("reconciler stopped");
        Ok(())
    }

    /// One discovery, diff and apply pass.
    pub async fn run_cycle(&mut self) -> Result<CycleOutcome> {
        let raw = match self.runner.run(&self.discovery_script, self.script_timeout).await {
            Ok(raw) if !raw.trim().is_empty() => raw,
            Ok(_) => {
                warn!("{} printed nothing, retrying next cycle", self.discovery_script);
                self.last_raw = None;
                return Ok(CycleOutcome::ScriptFailed);
            }
            Err(e) => {
                warn!("{} failed: {e}", self.discovery_script);
                self.last_raw = None;
                return Ok(CycleOutcome::ScriptFailed);
            }
        };

        let now = Instant::now();
        if now >= self.refresh_deadline {
            info!("forced refresh of the topology mirror");
            self.clear();
            self.refresh_deadline = now + jittered(self.refresh_window.0, self.refresh_window.1);
        } else if self.last_raw.as_deref() == Some(raw.as_str()) {
            return Ok(CycleOutcome::Unchanged);
        }

        let records = match parse_discovery_output(&raw, &self.result_prefix) {
            DiscoveryOutcome::ScriptError => {
                error!("{} reported a script error", self.discovery_script);
                self.last_raw = None;
                return Ok(CycleOutcome::ScriptFailed);
            }
            DiscoveryOutcome::NoDatabase => {
                let deleted = self.remove_all().await?;
                info!("no database running now, try again later");
                self.last_raw = Some(raw);
                return Ok(CycleOutcome::NoDatabase { deleted });
            }
            DiscoveryOutcome::Instances(records) => records,
        };

        let stats = self.apply(&records).await?;
        if stats.writes() > 0 {
            info!(
                "topology applied: {} created, {} updated, {} deleted",
                stats.created, stats.updated, stats.deleted
            );
        }
        self.last_raw = (stats.pending == 0).then_some(raw);
        Ok(CycleOutcome::Applied(stats))
    }

    fn clear(&mut self) {
        self.mirror.clear();
        self.created_groups.clear();
        self.last_raw = None;
    }

    async fn remove_all(&mut self) -> Result<usize> {
        let client = self.hub.client();
        let mut pacer = Pacer::new(self.mutation_delay);
        let mut deleted = 0;
        while let Some((path, _)) = self.mirror.pop_first() {
            pacer.pace().await;
            delete_recursively(client.as_ref(), &path).await?;
            deleted += 1;
        }
        Ok(deleted)
    }

    async fn apply(
        &mut self,
        records: &[InstanceRecord],
    ) -> Result<ApplyStats> {
        let client = self.hub.client();
        let mut pacer = Pacer::new(self.mutation_delay);
        let mut stats = ApplyStats::default();
        ensure_path(client.as_ref(), &self.topology_root).await?;

        let mut ha_status: Option<String> = None;
        let mut desired = BTreeMap::new();
        for record in records {
            let Some(role) = record.group_role() else {
                warn!("skipping instance {} of unknown engine {:?}", record.instance, record.engine);
                continue;
            };
            if record.needs_ha_status() && ha_status.is_none() {
                ha_status = Some(self.ha_status().await);
            }
            let payload = record.enriched_payload(ha_status.as_deref());
            desired.insert(record.instance_path(&self.topology_root), payload);

            let group = record.group_path(&self.topology_root);
            if !self.created_groups.contains(&group) {
                pacer.pace().await;
                create_if_absent(client.as_ref(), &group, GROUP_BOOTSTRAP_MARKER.as_bytes()).await?;
                self.created_groups.insert(group);
            }
            let subgroup = record.subgroup_path(&self.topology_root);
            if !self.created_groups.contains(&subgroup) {
                pacer.pace().await;
                create_if_absent(client.as_ref(), &subgroup, role.as_bytes()).await?;
                self.created_groups.insert(subgroup);
            }
        }

        let stale: Vec<String> = self
            .mirror
            .keys()
            .filter(|path| !desired.contains_key(*path))
            .cloned()
            .collect();
        for path in stale {
            pacer.pace().await;
            delete_recursively(client.as_ref(), &path).await?;
            self.mirror.remove(&path);
            stats.deleted += 1;
        }

        for (path, payload) in &desired {
            let current = self.mirror.get(path).cloned();
            match current {
                None => {
                    pacer.pace().await;
                    match create_ephemeral_replacing_stale(client.as_ref(), path, payload.as_bytes())
                        .await
                    {
                        Ok(true) => {
                            self.mirror.insert(path.clone(), payload.clone());
                            stats.created += 1;
                        }
                        Ok(false) => {
                            warn!("{path} is held by another session");
                            stats.pending += 1;
                        }
                        Err(e) if e.is_no_node() => {
                            warn!("container of {path} vanished, recreating next cycle");
                            self.created_groups.clear();
                            stats.pending += 1;
                        }
                        Err(e) => return Err(e),
                    }
                }
                Some(current) if current != *payload => {
                    pacer.pace().await;
                    match client.set_data(path, payload.as_bytes(), None).await {
                        Ok(_) => {
                            self.mirror.insert(path.clone(), payload.clone());
                            stats.updated += 1;
                        }
                        Err(e) if e.is_no_node() => {
                            warn!("{path} vanished, recreating next cycle");
                            self.mirror.remove(path);
                            stats.pending += 1;
                        }
                        Err(e) => return Err(e),
                    }
                }
                Some(_) => {}
            }
        }
        Ok(stats)
    }

    async fn ha_status(&self) -> String {
        match self.runner.run(&self.ha_conf_script, self.script_timeout).await {
            Ok(out) => out.trim().to_string(),
            Err(e) => {
                warn!("{} failed: {e}", self.ha_conf_script);
                String::new()
            }
        }
    }
}
