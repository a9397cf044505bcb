use async_trait::async_trait;

use crate::application::dto::plugins::{
    PluginListRequest, PluginStatusRequest, PluginStatusResponse, UpdateCheckRequest,
    UpdateCheckResponse,
};
use crate::domain::plugins::PluginInfo;

/// Remote catalog, health and update-check endpoints. Implementations own
/// the retry policy for transient failures.
#[async_trait]
pub trait ControlPlane: Send + Sync {
    async fn list_plugins(&self, request: &PluginListRequest) -> anyhow::Result<Vec<PluginInfo>>;

    async fn report_plugin_status(
        &self,
        request: &PluginStatusRequest,
    ) -> anyhow::Result<PluginStatusResponse>;

    async fn check_update(&self, request: &UpdateCheckRequest)
    -> anyhow::Result<UpdateCheckResponse>;
}
