use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, anyhow};
use rand::Rng;
use tokio::time::Instant;

use crate::application::dto::plugins::PluginStatusRequest;
use crate::application::ports::control_plane::ControlPlane;
use crate::application::ports::installed_plugin_store::InstalledPluginStore;
use crate::application::ports::process_supervisor::{
    CommandSpec, OutputMode, ProcessSupervisor, RunStatus,
};
use crate::application::services::health::state::SchedulerState;
use crate::domain::plugins::{PluginInfo, PluginStatus, PluginStatusKind, PluginType, platform};

/// Timeout for the batched `--status` run of the plugin manager.
pub const MANAGER_STATUS_TIMEOUT_SECS: u64 = 120;

/// Outcome of one scan round.
#[derive(Debug, Default)]
pub struct ScanReport {
    pub reported: Vec<PluginStatus>,
    /// Persistent plugins found not running and handed to a restart task.
    pub restarting: Vec<String>,
}

/// Active health scan: asks the plugin manager for the status of every
/// persistent plugin and reports the whole picture.
pub struct HealthScanner {
    registry: Arc<dyn InstalledPluginStore>,
    control_plane: Arc<dyn ControlPlane>,
    supervisor: Arc<dyn ProcessSupervisor>,
    manager_bin: PathBuf,
    state: SchedulerState,
    restart_jitter: Duration,
}

impl HealthScanner {
    pub fn new(
        registry: Arc<dyn InstalledPluginStore>,
        control_plane: Arc<dyn ControlPlane>,
        supervisor: Arc<dyn ProcessSupervisor>,
        manager_bin: PathBuf,
        state: SchedulerState,
        restart_jitter: Duration,
    ) -> Self {
        Self {
            registry,
            control_plane,
            supervisor,
            manager_bin,
            state,
            restart_jitter,
        }
    }

    pub async fn scan_once(&self) -> anyhow::Result<ScanReport> {
        self.state.mark_scan_started(Instant::now()).await;

        let plugins = self
            .registry
            .load()
            .await
            .context("load installed plugins")?;
        if plugins.find_all().is_empty() {
            tracing::info!("plugin_health_scan_no_plugins");
            return Ok(ScanReport::default());
        }

        let mut report = ScanReport::default();
        let mut has_persist = false;
        for plugin in plugins.find_all() {
            match plugin.plugin_type() {
                PluginType::Persist => has_persist = true,
                PluginType::Once => {
                    let kind = if plugin.is_removed {
                        PluginStatusKind::Removed
                    } else {
                        PluginStatusKind::OnceInstalled
                    };
                    report.reported.push(status_of(plugin, kind));
                }
                PluginType::Unknown => {
                    tracing::debug!(plugin = plugin.name.as_str(), "plugin_health_scan_unknown_type");
                }
            }
        }

        if has_persist {
            for status in self.query_persist_statuses().await? {
                let running = matches!(
                    status.status,
                    PluginStatusKind::PersistRunning | PluginStatusKind::Removed
                );
                let record = plugins
                    .find_one_by_name(&status.name)
                    .map(|(_, info)| info);
                if !running {
                    // The restart's own check-and-report covers this plugin.
                    let timeout_secs = record.map(PluginInfo::timeout_secs).unwrap_or_default();
                    self.spawn_restart(status.name.clone(), timeout_secs);
                    report.restarting.push(status.name);
                    continue;
                }
                let mut status = status;
                if status.plugin_id.is_empty() {
                    if let Some(info) = record {
                        status.plugin_id = info.plugin_id.clone();
                    }
                }
                report.reported.push(status);
            }
        }

        let request = PluginStatusRequest {
            os: platform::current_os_type().to_string(),
            arch: platform::current_arch().to_string(),
            plugin: report.reported.clone(),
        };
        let resp = self
            .control_plane
            .report_plugin_status(&request)
            .await
            .context("report plugin health")?;
        self.state.apply_response(&resp).await;
        tracing::info!(
            reported = report.reported.len(),
            restarting = report.restarting.len(),
            "plugin_health_scan_reported"
        );
        Ok(report)
    }

    async fn query_persist_statuses(&self) -> anyhow::Result<Vec<PluginStatus>> {
        let spec = CommandSpec::new(&self.manager_bin)
            .args(["--status"])
            .timeout_secs(MANAGER_STATUS_TIMEOUT_SECS)
            .output(OutputMode::Capture)
            .kill_tree_on_failure();
        let outcome = self.supervisor.run(spec).await;
        if outcome.status != RunStatus::Success {
            return Err(anyhow!(
                "plugin manager --status {:?}: {} output[{}]",
                outcome.status,
                outcome.error.unwrap_or_default(),
                String::from_utf8_lossy(&outcome.stdout)
            ));
        }
        match serde_json::from_slice::<Vec<PluginStatus>>(&outcome.stdout) {
            Ok(list) => {
                if list.is_empty() {
                    tracing::info!("plugin_health_scan_no_persist_status");
                }
                Ok(list)
            }
            Err(err) => {
                tracing::error!(
                    error = ?err,
                    content = %String::from_utf8_lossy(&outcome.stdout),
                    "plugin_status_output_unparsable"
                );
                Ok(Vec::new())
            }
        }
    }

    fn spawn_restart(&self, name: String, timeout_secs: u64) {
        let supervisor = self.supervisor.clone();
        let manager_bin = self.manager_bin.clone();
        let jitter = random_delay(self.restart_jitter);
        tracing::warn!(plugin = name.as_str(), "plugin_not_running_restarting");
        tokio::spawn(async move {
            tokio::time::sleep(jitter).await;
            let spec = CommandSpec::new(manager_bin)
                .args(["--exec", "--local", "--plugin", name.as_str(), "--params=--start"])
                .timeout_secs(timeout_secs.max(crate::domain::plugins::manifest::DEFAULT_TIMEOUT_SECS))
                .output(OutputMode::Null)
                .kill_tree_on_failure();
            let outcome = supervisor.run(spec).await;
            tracing::info!(
                plugin = name.as_str(),
                exit_code = outcome.exit_code,
                status = ?outcome.status,
                "plugin_restart_finished"
            );
        });
    }
}

fn status_of(plugin: &PluginInfo, kind: PluginStatusKind) -> PluginStatus {
    let mut status = PluginStatus::new(plugin.name.clone(), plugin.version.clone(), kind);
    status.plugin_id = plugin.plugin_id.clone();
    status
}

/// Uniform random delay in `[0, max)`.
pub fn random_delay(max: Duration) -> Duration {
    let millis = max.as_millis() as u64;
    if millis == 0 {
        return Duration::ZERO;
    }
    Duration::from_millis(rand::thread_rng().gen_range(0..millis))
}
