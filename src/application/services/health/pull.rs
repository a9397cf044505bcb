use std::collections::BTreeMap;
use std::sync::Arc;

use anyhow::Context;
use tokio::time::Instant;

use crate::application::dto::plugins::PluginStatusRequest;
use crate::application::ports::control_plane::ControlPlane;
use crate::application::ports::installed_plugin_store::InstalledPluginStore;
use crate::application::ports::plugin_package_store::PluginPackageStore;
use crate::application::services::health::state::{PullPlan, SchedulerState};
use crate::domain::plugins::manifest::DEFAULT_HEARTBEAT_INTERVAL_SECS;
use crate::domain::plugins::{PluginStatus, PluginStatusKind, platform};

/// Grace added to the heartbeat interval before a plugin counts as stale.
pub const HEARTBEAT_GRACE_SECS: i64 = 5;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PullOutcome {
    Skipped,
    NoPersistentPlugins,
    /// Lazy mode and nothing changed since the last report.
    Unchanged,
    Reported(Vec<PluginStatus>),
}

/// Judges one heartbeat file. `None` means the file does not exist.
pub fn evaluate_heartbeat(content: Option<&str>, interval_secs: i64, now_unix: i64) -> PluginStatusKind {
    let Some(content) = content else {
        return PluginStatusKind::PersistFail;
    };
    let Ok(beat) = content.trim().parse::<i64>() else {
        return PluginStatusKind::PersistUnknown;
    };
    let interval = if interval_secs <= 0 {
        DEFAULT_HEARTBEAT_INTERVAL_SECS
    } else {
        interval_secs
    };
    if now_unix - beat > interval + HEARTBEAT_GRACE_SECS {
        PluginStatusKind::PersistFail
    } else {
        PluginStatusKind::PersistRunning
    }
}

/// Passive health check: reads the heartbeat file of every persistent
/// plugin instead of invoking it.
pub struct HeartbeatPuller {
    registry: Arc<dyn InstalledPluginStore>,
    packages: Arc<dyn PluginPackageStore>,
    control_plane: Arc<dyn ControlPlane>,
    state: SchedulerState,
}

impl HeartbeatPuller {
    pub fn new(
        registry: Arc<dyn InstalledPluginStore>,
        packages: Arc<dyn PluginPackageStore>,
        control_plane: Arc<dyn ControlPlane>,
        state: SchedulerState,
    ) -> Self {
        Self {
            registry,
            packages,
            control_plane,
            state,
        }
    }

    pub async fn pull_once(&self) -> anyhow::Result<PullOutcome> {
        match self.state.pull_plan(Instant::now()).await {
            PullPlan::Skip => {
                tracing::info!("plugin_health_pull_skipped_scan_imminent");
                return Ok(PullOutcome::Skipped);
            }
            PullPlan::WaitThenRun(wait) => {
                tracing::debug!(wait_ms = wait.as_millis() as u64, "plugin_health_pull_waiting");
                tokio::time::sleep(wait).await;
            }
            PullPlan::Run => {}
        }

        let plugins = self
            .registry
            .load()
            .await
            .context("load installed plugins")?;
        let now_unix = chrono::Utc::now().timestamp();
        let mut statuses = Vec::new();
        let mut map = BTreeMap::new();
        for plugin in plugins.persistent().filter(|p| !p.is_removed) {
            let path = self.packages.heartbeat_path(&plugin.name, &plugin.version);
            let content = match tokio::fs::read_to_string(&path).await {
                Ok(content) => Some(content),
                Err(err) if err.kind() == std::io::ErrorKind::NotFound => None,
                Err(err) => {
                    tracing::warn!(path = %path.display(), error = ?err, "heartbeat_read_failed");
                    None
                }
            };
            let kind = evaluate_heartbeat(content.as_deref(), plugin.heartbeat_interval, now_unix);
            let mut status = PluginStatus::new(plugin.name.clone(), plugin.version.clone(), kind);
            status.plugin_id = plugin.plugin_id.clone();
            map.insert(plugin.name.clone(), kind);
            statuses.push(status);
        }
        if statuses.is_empty() {
            return Ok(PullOutcome::NoPersistentPlugins);
        }
        if !self.state.pull_needs_report(&map).await {
            tracing::info!(plugins = statuses.len(), "plugin_health_pull_unchanged");
            return Ok(PullOutcome::Unchanged);
        }

        let request = PluginStatusRequest {
            os: platform::current_os_type().to_string(),
            arch: platform::current_arch().to_string(),
            plugin: statuses.clone(),
        };
        let resp = self
            .control_plane
            .report_plugin_status(&request)
            .await
            .context("report plugin heartbeat status")?;
        self.state.record_pulled(map).await;
        self.state.apply_response(&resp).await;
        tracing::info!(plugins = statuses.len(), "plugin_health_pull_reported");
        Ok(PullOutcome::Reported(statuses))
    }
}
