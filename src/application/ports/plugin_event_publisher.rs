use async_trait::async_trait;

use crate::application::dto::plugins::PluginExecuteEvent;

#[derive(Debug, Clone)]
pub enum PluginEvent {
    Executed(PluginExecuteEvent),
}

#[async_trait]
pub trait PluginEventPublisher: Send + Sync {
    async fn publish(&self, event: &PluginEvent) -> anyhow::Result<()>;
}
