use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio::time::sleep;

use crate::application::dto::plugins::{PluginUpdateTarget, UpdateCheckItem, UpdateCheckRequest};
use crate::application::ports::control_plane::ControlPlane;
use crate::application::ports::installed_plugin_store::InstalledPluginStore;
use crate::application::services::clamp_interval;
use crate::application::services::health::scan::random_delay;
use crate::domain::plugins::platform;
use crate::domain::plugins::version::is_newer;

/// Periodically asks the control plane whether newer versions of the
/// installed persistent plugins exist. Upgrades are only logged.
pub struct UpdateChecker {
    registry: Arc<dyn InstalledPluginStore>,
    control_plane: Arc<dyn ControlPlane>,
    interval: Arc<Mutex<Duration>>,
}

impl UpdateChecker {
    pub fn new(
        registry: Arc<dyn InstalledPluginStore>,
        control_plane: Arc<dyn ControlPlane>,
        interval: Duration,
    ) -> Self {
        Self {
            registry,
            control_plane,
            interval: Arc::new(Mutex::new(interval)),
        }
    }

    pub async fn interval(&self) -> Duration {
        *self.interval.lock().await
    }

    /// One round. Returns the recommended upgrades, empty when there is
    /// nothing persistent installed.
    pub async fn check_once(&self) -> anyhow::Result<Vec<PluginUpdateTarget>> {
        let plugins = self
            .registry
            .load()
            .await
            .context("load installed plugins")?;
        let items: Vec<UpdateCheckItem> = plugins
            .persistent()
            .filter(|p| !p.is_removed)
            .map(|p| UpdateCheckItem {
                plugin_id: p.plugin_id.clone(),
                name: p.name.clone(),
                version: p.version.clone(),
            })
            .collect();
        if items.is_empty() {
            tracing::debug!("plugin_update_check_no_persistent_plugins");
            return Ok(Vec::new());
        }

        let request = UpdateCheckRequest {
            os: platform::current_os_type().to_string(),
            arch: platform::current_arch().to_string(),
            plugin: items,
        };
        let resp = self
            .control_plane
            .check_update(&request)
            .await
            .context("plugin update check")?;
        if resp.next_interval > 0 {
            *self.interval.lock().await = Duration::from_secs(clamp_interval(resp.next_interval as u64));
        }

        let mut upgrades = Vec::new();
        for offer in resp.plugin {
            if offer.need_update != 1 {
                continue;
            }
            let installed = request.plugin.iter().find(|p| p.name == offer.info.name);
            let newer = installed.is_none_or(|p| is_newer(&offer.info.version, &p.version));
            if !newer {
                continue;
            }
            tracing::info!(
                plugin = offer.info.name.as_str(),
                installed = installed.map(|p| p.version.as_str()).unwrap_or_default(),
                offered = offer.info.version.as_str(),
                url = offer.info.url.as_str(),
                "plugin_upgrade_recommended"
            );
            upgrades.push(offer.info);
        }
        Ok(upgrades)
    }

    pub fn spawn(self: Arc<Self>) -> JoinHandle<()> {
        tokio::spawn(async move {
            sleep(random_delay(self.interval().await)).await;
            loop {
                if let Err(err) = self.check_once().await {
                    tracing::error!(error = ?err, "plugin_update_check_failed");
                }
                sleep(self.interval().await).await;
            }
        })
    }
}
