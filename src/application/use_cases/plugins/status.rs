use crate::application::ports::installed_plugin_store::InstalledPluginStore;
use crate::application::ports::lock_manager::LockManager;
use crate::application::ports::plugin_package_store::PluginPackageStore;
use crate::application::ports::process_supervisor::{OutputMode, ProcessSupervisor};
use crate::application::use_cases::plugins::errors::PluginManagerError;
use crate::application::use_cases::plugins::runner::{ENV_PLUGIN_DIR, PluginRun, STATUS_ARG, run_plugin};
use crate::domain::plugins::{PluginStatus, PluginStatusKind};

/// Queries every persistent plugin with `--status`. Removed plugins are
/// listed as `REMOVED` without being run.
pub struct ShowPluginStatus<'a> {
    pub registry: &'a dyn InstalledPluginStore,
    pub packages: &'a dyn PluginPackageStore,
    pub locks: &'a dyn LockManager,
    pub supervisor: &'a dyn ProcessSupervisor,
}

impl<'a> ShowPluginStatus<'a> {
    pub async fn execute(&self) -> Result<Vec<PluginStatus>, PluginManagerError> {
        let plugins = self
            .registry
            .load()
            .await
            .map_err(PluginManagerError::LoadInstalledPlugins)?;
        tracing::info!(count = plugins.find_all().len(), "show_plugin_status");

        let root = self.packages.plugin_root();
        let mut statuses = Vec::new();
        for plugin in plugins.persistent() {
            let mut status = PluginStatus::new(
                plugin.name.clone(),
                plugin.version.clone(),
                PluginStatusKind::PersistFail,
            );
            if plugin.is_removed {
                status.status = PluginStatusKind::Removed;
                statuses.push(status);
                continue;
            }

            // A plugin being removed right now holds the exclusive lock.
            let _guard = match self.locks.try_lock_plugin_shared(&plugin.name).await {
                Ok(guard) => guard,
                Err(err) => {
                    tracing::warn!(plugin = plugin.name.as_str(), error = %err, "plugin_status_lock_busy");
                    status.status = PluginStatusKind::PersistUnknown;
                    statuses.push(status);
                    continue;
                }
            };

            let dir = plugin.install_dir(&root);
            let run = PluginRun {
                args: vec![STATUS_ARG.to_string()],
                timeout_secs: plugin.timeout_secs(),
                env: vec![(ENV_PLUGIN_DIR.to_string(), dir.to_string_lossy().into_owned())],
                output: OutputMode::Null,
                run_as: None,
            };
            match run_plugin(self.supervisor, &plugin.entrypoint(&root), run).await {
                Ok(0) => status.status = PluginStatusKind::PersistRunning,
                Ok(_) => {}
                Err(err) => tracing::error!(
                    plugin = plugin.name.as_str(),
                    version = plugin.version.as_str(),
                    error = %err,
                    "plugin_status_check_failed"
                ),
            }
            statuses.push(status);
        }
        Ok(statuses)
    }
}
