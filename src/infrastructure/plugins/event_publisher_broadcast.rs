use async_trait::async_trait;
use tokio::sync::broadcast;

use crate::application::ports::plugin_event_publisher::{PluginEvent, PluginEventPublisher};

#[derive(Clone)]
pub struct BroadcastPluginEventPublisher {
    sender: broadcast::Sender<PluginEvent>,
}

impl BroadcastPluginEventPublisher {
    pub fn new(sender: broadcast::Sender<PluginEvent>) -> Self {
        Self { sender }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<PluginEvent> {
        self.sender.subscribe()
    }
}

#[async_trait]
impl PluginEventPublisher for BroadcastPluginEventPublisher {
    async fn publish(&self, event: &PluginEvent) -> anyhow::Result<()> {
        match self.sender.send(event.clone()) {
            Ok(_) => Ok(()),
            // No subscriber outside daemon mode.
            Err(broadcast::error::SendError(_)) => Ok(()),
        }
    }
}

/// Logs every event until the channel closes.
pub fn spawn_event_logger(mut rx: broadcast::Receiver<PluginEvent>) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        loop {
            match rx.recv().await {
                Ok(PluginEvent::Executed(event)) => {
                    tracing::info!(
                        plugin = event.plugin_name.as_str(),
                        version = event.plugin_version.as_str(),
                        plugin_type = event.plugin_type.as_str(),
                        resource = ?event.resource,
                        exit_code = event.exit_code,
                        error_code = event.error_code.as_str(),
                        "plugin_execute_event"
                    );
                }
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    tracing::warn!(skipped, "plugin_event_logger_lagged");
                }
                Err(broadcast::error::RecvError::Closed) => return,
            }
        }
    })
}
