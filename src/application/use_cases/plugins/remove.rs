use crate::application::dto::plugins::Fetched;
use crate::application::ports::control_plane::ControlPlane;
use crate::application::ports::installed_plugin_store::InstalledPluginStore;
use crate::application::ports::lock_manager::LockManager;
use crate::application::ports::plugin_package_store::PluginPackageStore;
use crate::application::ports::process_supervisor::{OutputMode, ProcessSupervisor};
use crate::application::use_cases::plugins::errors::PluginManagerError;
use crate::application::use_cases::plugins::resolve::fetched_from_record;
use crate::application::use_cases::plugins::runner::{PluginRun, plugin_env, report_status, run_plugin};
use crate::domain::plugins::{PluginInfo, PluginStatusKind};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RemoveOutcome {
    Removed,
    /// `--uninstall` exited non-zero; nothing was changed.
    UninstallRefused(i32),
}

pub struct RemovePlugin<'a> {
    pub registry: &'a dyn InstalledPluginStore,
    pub packages: &'a dyn PluginPackageStore,
    pub locks: &'a dyn LockManager,
    pub control_plane: &'a dyn ControlPlane,
    pub supervisor: &'a dyn ProcessSupervisor,
}

impl<'a> RemovePlugin<'a> {
    /// Stops and uninstalls a persistent plugin, marks its record removed
    /// (or drops it when `purge` is set) and deletes `<root>/<name>`.
    pub async fn execute(
        &self,
        plugin_name: &str,
        purge: bool,
    ) -> Result<RemoveOutcome, PluginManagerError> {
        let record = self.find_installed(plugin_name).await?;

        let _lock = self.locks.try_lock_plugin_exclusive(plugin_name).await?;

        let root = self.packages.plugin_root();
        if record.is_persist() {
            let fetched = fetched_from_record(&root, &record);
            // --stop is best effort; --uninstall decides.
            if let Err(err) = self.run_lifecycle(&fetched, "--stop").await {
                tracing::warn!(plugin = plugin_name, error = %err, "plugin_stop_failed");
            }
            let code = self.run_lifecycle(&fetched, "--uninstall").await?;
            if code != 0 {
                tracing::warn!(plugin = plugin_name, exit_code = code, "plugin_uninstall_refused");
                return Ok(RemoveOutcome::UninstallRefused(code));
            }
        }

        self.commit_removal(plugin_name, purge).await?;

        if let Err(err) = report_status(
            self.control_plane,
            &record.name,
            &record.version,
            PluginStatusKind::Removed,
        )
        .await
        {
            tracing::error!(plugin = plugin_name, error = ?err, "report_removed_plugin_failed");
        }

        let plugin_dir = root.join(&record.name);
        self.packages
            .remove_path(&plugin_dir)
            .await
            .map_err(|source| PluginManagerError::RemoveFile {
                tip: format!(
                    "Remove plugin directory err, pluginDir[{}], err: {source:#}",
                    plugin_dir.display()
                ),
                source,
            })?;
        tracing::info!(plugin = plugin_name, purge, "plugin_removed");
        Ok(RemoveOutcome::Removed)
    }

    async fn find_installed(&self, plugin_name: &str) -> Result<PluginInfo, PluginManagerError> {
        let plugins = self
            .registry
            .load()
            .await
            .map_err(PluginManagerError::LoadInstalledPlugins)?;
        plugins
            .find_one_not_removed_by_name_and_optional_version(plugin_name, None)
            .map(|(_, info)| info.clone())
            .ok_or_else(|| {
                PluginManagerError::PackageNotFound(format!(
                    "Plugin {plugin_name} not found in installed_plugins"
                ))
            })
    }

    /// Reloads the registry after the lifecycle hooks ran, so records written
    /// meanwhile by other processes survive the save.
    async fn commit_removal(&self, plugin_name: &str, purge: bool) -> Result<(), PluginManagerError> {
        let mut plugins = self
            .registry
            .load()
            .await
            .map_err(PluginManagerError::LoadInstalledPlugins)?;
        let Some((index, current)) = plugins
            .find_one_not_removed_by_name_and_optional_version(plugin_name, None)
            .map(|(index, info)| (index, info.clone()))
        else {
            tracing::info!(plugin = plugin_name, "plugin_record_already_removed");
            return Ok(());
        };
        if purge {
            plugins
                .delete_by_key(index)
                .map_err(|err| PluginManagerError::DumpInstalledPlugins(err.into()))?;
        } else {
            let mut removed = current;
            removed.is_removed = true;
            plugins
                .update(index, removed)
                .map_err(|err| PluginManagerError::DumpInstalledPlugins(err.into()))?;
        }
        self.registry
            .save(&plugins)
            .await
            .map_err(PluginManagerError::DumpInstalledPlugins)
    }

    async fn run_lifecycle(&self, fetched: &Fetched, arg: &str) -> Result<i32, PluginManagerError> {
        let run = PluginRun {
            args: vec![arg.to_string()],
            timeout_secs: fetched.execution_timeout_secs,
            env: plugin_env(fetched),
            output: OutputMode::Inherit,
            run_as: None,
        };
        run_plugin(self.supervisor, &fetched.entrypoint, run).await
    }
}
