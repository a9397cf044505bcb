use std::sync::Arc;
use std::time::Duration;

use tokio::sync::broadcast;

use crate::application::ports::control_plane::ControlPlane;
use crate::application::ports::installed_plugin_store::InstalledPluginStore;
use crate::application::ports::lock_manager::LockManager;
use crate::application::ports::plugin_event_publisher::{PluginEvent, PluginEventPublisher};
use crate::application::ports::plugin_package_fetcher::PluginPackageFetcher;
use crate::application::ports::plugin_package_store::PluginPackageStore;
use crate::application::ports::process_supervisor::ProcessSupervisor;
use crate::application::services::health::HealthMonitor;
use crate::application::services::health::pull::HeartbeatPuller;
use crate::application::services::health::scan::HealthScanner;
use crate::application::services::health::state::SchedulerState;
use crate::application::services::update_check::UpdateChecker;
use crate::bootstrap::config::Config;
use crate::infrastructure::locking::FileLockManager;
use crate::infrastructure::plugins::control_plane_reqwest::{
    ControlPlaneEndpoints, ReqwestControlPlane,
};
use crate::infrastructure::plugins::event_publisher_broadcast::BroadcastPluginEventPublisher;
use crate::infrastructure::plugins::filesystem_store::FilesystemPluginStore;
use crate::infrastructure::plugins::installed_store_json::JsonInstalledPluginStore;
use crate::infrastructure::plugins::package_fetcher_reqwest::ReqwestPluginPackageFetcher;
use crate::infrastructure::process::TokioProcessSupervisor;

/// Lock files live next to the registry, under `<root>/locks`.
pub const LOCK_DIR: &str = "locks";

#[derive(Clone)]
pub struct AppContext {
    pub cfg: Config,
    services: Arc<AppServices>,
}

#[derive(Clone)]
pub struct AppServices {
    registry: Arc<dyn InstalledPluginStore>,
    packages: Arc<dyn PluginPackageStore>,
    fetcher: Arc<dyn PluginPackageFetcher>,
    locks: Arc<dyn LockManager>,
    control_plane: Arc<dyn ControlPlane>,
    supervisor: Arc<dyn ProcessSupervisor>,
    plugin_events: broadcast::Sender<PluginEvent>,
    plugin_event_publisher: Arc<dyn PluginEventPublisher>,
}

impl AppServices {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        registry: Arc<dyn InstalledPluginStore>,
        packages: Arc<dyn PluginPackageStore>,
        fetcher: Arc<dyn PluginPackageFetcher>,
        locks: Arc<dyn LockManager>,
        control_plane: Arc<dyn ControlPlane>,
        supervisor: Arc<dyn ProcessSupervisor>,
        plugin_events: broadcast::Sender<PluginEvent>,
        plugin_event_publisher: Arc<dyn PluginEventPublisher>,
    ) -> Self {
        Self {
            registry,
            packages,
            fetcher,
            locks,
            control_plane,
            supervisor,
            plugin_events,
            plugin_event_publisher,
        }
    }

    /// Wires the production adapters for `cfg`.
    pub fn from_config(cfg: &Config) -> anyhow::Result<Self> {
        let packages = FilesystemPluginStore::new(&cfg.plugin_root)?;
        let root = packages.root().to_path_buf();
        let control_plane = ReqwestControlPlane::new(
            ControlPlaneEndpoints {
                base_url: cfg.control_plane_url.clone(),
                list_path: cfg.plugin_list_path.clone(),
                health_path: cfg.plugin_health_path.clone(),
                update_check_path: cfg.plugin_update_check_path.clone(),
            },
            Duration::from_secs(cfg.http_retry_delay_secs),
        )?;
        let (plugin_events, _) = broadcast::channel(64);
        let publisher = BroadcastPluginEventPublisher::new(plugin_events.clone());
        Ok(Self::new(
            Arc::new(JsonInstalledPluginStore::under_root(&root)),
            Arc::new(packages),
            Arc::new(ReqwestPluginPackageFetcher::new()),
            Arc::new(FileLockManager::new(root.join(LOCK_DIR))),
            Arc::new(control_plane),
            Arc::new(TokioProcessSupervisor::new()),
            plugin_events,
            Arc::new(publisher),
        ))
    }
}

impl AppContext {
    pub fn new(cfg: Config, services: AppServices) -> Self {
        Self {
            cfg,
            services: Arc::new(services),
        }
    }

    pub fn registry(&self) -> Arc<dyn InstalledPluginStore> {
        self.services.registry.clone()
    }

    pub fn packages(&self) -> Arc<dyn PluginPackageStore> {
        self.services.packages.clone()
    }

    pub fn fetcher(&self) -> Arc<dyn PluginPackageFetcher> {
        self.services.fetcher.clone()
    }

    pub fn locks(&self) -> Arc<dyn LockManager> {
        self.services.locks.clone()
    }

    pub fn control_plane(&self) -> Arc<dyn ControlPlane> {
        self.services.control_plane.clone()
    }

    pub fn supervisor(&self) -> Arc<dyn ProcessSupervisor> {
        self.services.supervisor.clone()
    }

    pub fn plugin_event_publisher(&self) -> Arc<dyn PluginEventPublisher> {
        self.services.plugin_event_publisher.clone()
    }

    pub fn subscribe_plugin_events(&self) -> broadcast::Receiver<PluginEvent> {
        self.services.plugin_events.subscribe()
    }

    pub fn health_monitor(&self) -> HealthMonitor {
        let state = SchedulerState::new(
            Duration::from_secs(self.cfg.health_scan_interval_secs),
            Duration::from_secs(self.cfg.health_pull_interval_secs),
            Duration::from_secs(self.cfg.health_avoid_secs),
        );
        let scanner = HealthScanner::new(
            self.registry(),
            self.control_plane(),
            self.supervisor(),
            self.cfg.manager_bin.clone(),
            state.clone(),
            Duration::from_secs(self.cfg.restart_jitter_secs),
        );
        let puller = HeartbeatPuller::new(
            self.registry(),
            self.packages(),
            self.control_plane(),
            state.clone(),
        );
        HealthMonitor::new(scanner, puller, state)
    }

    pub fn update_checker(&self) -> UpdateChecker {
        UpdateChecker::new(
            self.registry(),
            self.control_plane(),
            Duration::from_secs(self.cfg.update_check_interval_secs),
        )
    }
}
