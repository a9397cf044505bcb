use std::path::PathBuf;
use std::time::Duration;

use crate::application::dto::plugins::{FetchResource, Fetched, PluginExecuteEvent};
use crate::application::ports::confirm_prompt::ConfirmPrompt;
use crate::application::ports::control_plane::ControlPlane;
use crate::application::ports::installed_plugin_store::InstalledPluginStore;
use crate::application::ports::lock_manager::LockManager;
use crate::application::ports::plugin_event_publisher::{PluginEvent, PluginEventPublisher};
use crate::application::ports::plugin_package_fetcher::PluginPackageFetcher;
use crate::application::ports::plugin_package_store::PluginPackageStore;
use crate::application::ports::process_supervisor::{OutputMode, ProcessSupervisor};
use crate::application::use_cases::plugins::errors::PluginManagerError;
use crate::application::use_cases::plugins::install::{InstallPlugin, previous_install_dir};
use crate::application::use_cases::plugins::params::{ExecuteParams, changes_plugin_state};
use crate::application::use_cases::plugins::resolve::{Resolution, ResolvePlugin, query_local_only};
use crate::application::use_cases::plugins::runner::{
    PluginRun, check_and_report, plugin_env, run_plugin,
};
use crate::domain::plugins::version::is_newer;
use crate::domain::plugins::{PluginType, platform};

/// Where to take the plugin from.
#[derive(Debug, Clone, Default)]
pub struct FetchOptions {
    /// Local archive; takes precedence over name-based resolution.
    pub file: Option<PathBuf>,
    pub plugin_name: String,
    pub plugin_id: Option<String>,
    pub version: Option<String>,
    /// Only consider the local registry.
    pub local: bool,
    pub fetch_timeout_secs: u64,
}

pub struct ExecutePlugin<'a> {
    pub registry: &'a dyn InstalledPluginStore,
    pub packages: &'a dyn PluginPackageStore,
    pub fetcher: &'a dyn PluginPackageFetcher,
    pub locks: &'a dyn LockManager,
    pub control_plane: &'a dyn ControlPlane,
    pub supervisor: &'a dyn ProcessSupervisor,
    pub events: &'a dyn PluginEventPublisher,
    pub prompt: &'a dyn ConfirmPrompt,
    /// Skip the reinstall confirmation.
    pub assume_yes: bool,
    pub download_retry_delay: Duration,
}

impl<'a> ExecutePlugin<'a> {
    /// Resolves, installs if needed, and runs the plugin. Returns the
    /// plugin's own exit code when it ran; an execute event is published in
    /// every case.
    pub async fn execute(
        &self,
        options: &FetchOptions,
        params: &ExecuteParams,
    ) -> Result<i32, PluginManagerError> {
        let mut event = PluginExecuteEvent {
            plugin_name: options.plugin_name.clone(),
            plugin_version: options.version.clone().unwrap_or_default(),
            plugin_type: PluginType::Once.as_str().to_string(),
            resource: None,
            exit_code: 0,
            error_code: String::new(),
            local_arch: platform::current_arch().to_string(),
            local_os_type: platform::current_os_type().to_string(),
        };

        let result = match &options.file {
            Some(file) => self.execute_from_file(file, options, params, &mut event).await,
            None => self.execute_online_or_local(options, params, &mut event).await,
        };
        match &result {
            Ok(code) => event.exit_code = *code,
            Err(err) => {
                tracing::error!(
                    plugin = event.plugin_name.as_str(),
                    version = event.plugin_version.as_str(),
                    error = %err,
                    "execute_plugin_failed"
                );
                event.exit_code = err.exit_code();
                event.error_code = err.code_name().to_string();
            }
        }
        if let Err(err) = self.events.publish(&PluginEvent::Executed(event)).await {
            tracing::warn!(error = ?err, "publish_execute_event_failed");
        }
        result
    }

    fn installer(&self, fetch_timeout_secs: u64) -> InstallPlugin<'_> {
        InstallPlugin {
            registry: self.registry,
            packages: self.packages,
            fetcher: self.fetcher,
            locks: self.locks,
            fetch_timeout: Duration::from_secs(fetch_timeout_secs),
            retry_delay: self.download_retry_delay,
        }
    }

    async fn execute_from_file(
        &self,
        file: &std::path::Path,
        options: &FetchOptions,
        params: &ExecuteParams,
        event: &mut PluginExecuteEvent,
    ) -> Result<i32, PluginManagerError> {
        event.resource = Some(FetchResource::File);
        let installer = self.installer(options.fetch_timeout_secs);
        let manifest = installer.inspect_package(file).await?;
        event.plugin_name = manifest.name.clone();
        event.plugin_version = manifest.version.clone();

        let plugins = self
            .registry
            .load()
            .await
            .map_err(PluginManagerError::LoadInstalledPlugins)?;
        let current = plugins
            .find_one_by_name(&manifest.name)
            .map(|(_, info)| info.clone())
            .filter(|info| !info.is_removed);

        let mut reinstall = false;
        if let Some(current) = &current {
            if !is_newer(&manifest.version, &current.version) {
                if !self.assume_yes {
                    let question = format!(
                        "[{} {}] has installed, this package version[{}] is not newer, still install ? [y/n]: ",
                        current.name, current.version, manifest.version
                    );
                    if !self.prompt.confirm(&question).await {
                        tracing::info!(plugin = manifest.name.as_str(), "execute_plugin_cancelled");
                        return Ok(0);
                    }
                }
                tracing::info!(
                    plugin = current.name.as_str(),
                    installed = current.version.as_str(),
                    package = manifest.version.as_str(),
                    "reinstalling_not_newer_version"
                );
                reinstall = true;
            }
        }

        let _plugin_lock = self.locks.try_lock_plugin_shared(&manifest.name).await?;
        let mut fetched = installer
            .install_from_file(file, &manifest, reinstall)
            .await?;
        if fetched.env_pre_plugin_dir.is_none() {
            fetched.env_pre_plugin_dir =
                previous_install_dir(&self.packages.plugin_root(), current.as_ref());
        }
        tracing::info!(plugin = fetched.plugin_name.as_str(), "plugin_installed");
        self.run_fetched(&fetched, params, event).await
    }

    async fn execute_online_or_local(
        &self,
        options: &FetchOptions,
        params: &ExecuteParams,
        event: &mut PluginExecuteEvent,
    ) -> Result<i32, PluginManagerError> {
        let root = self.packages.plugin_root();
        let resolution = if options.local {
            Resolution::Local(
                query_local_only(
                    self.registry,
                    &root,
                    &options.plugin_name,
                    options.version.as_deref(),
                )
                .await?,
            )
        } else {
            ResolvePlugin {
                registry: self.registry,
                packages: self.packages,
                control_plane: self.control_plane,
            }
            .online_or_local(
                &options.plugin_name,
                options.plugin_id.as_deref(),
                options.version.as_deref(),
            )
            .await?
        };

        let _plugin_lock = self
            .locks
            .try_lock_plugin_shared(&options.plugin_name)
            .await?;
        let fetched = match resolution {
            Resolution::Local(fetched) => {
                event.resource = Some(FetchResource::Local);
                fetched
            }
            Resolution::Online(info) => {
                event.resource = Some(FetchResource::Online);
                self.installer(options.fetch_timeout_secs)
                    .install_online(info)
                    .await?
            }
        };
        self.run_fetched(&fetched, params, event).await
    }

    async fn run_fetched(
        &self,
        fetched: &Fetched,
        params: &ExecuteParams,
        event: &mut PluginExecuteEvent,
    ) -> Result<i32, PluginManagerError> {
        event.plugin_name = fetched.plugin_name.clone();
        event.plugin_version = fetched.plugin_version.clone();
        event.plugin_type = fetched.plugin_type.as_str().to_string();

        let args = params.split_args()?;
        let timeout_secs = params.execution_timeout(fetched.execution_timeout_secs);
        let run = PluginRun {
            args: args.clone(),
            timeout_secs,
            env: plugin_env(fetched),
            output: OutputMode::Inherit,
            run_as: params.run_as.clone(),
        };
        let result = run_plugin(self.supervisor, &fetched.entrypoint, run).await;

        if fetched.plugin_type.is_persist() && changes_plugin_state(&args) {
            let (status, reported) =
                check_and_report(self.supervisor, self.control_plane, fetched, timeout_secs).await;
            match reported {
                Ok(()) => tracing::info!(
                    plugin = fetched.plugin_name.as_str(),
                    version = fetched.plugin_version.as_str(),
                    %status,
                    "check_and_report_plugin"
                ),
                Err(err) => tracing::warn!(
                    plugin = fetched.plugin_name.as_str(),
                    version = fetched.plugin_version.as_str(),
                    %status,
                    error = ?err,
                    "check_and_report_plugin_failed"
                ),
            }
        }
        result
    }
}
