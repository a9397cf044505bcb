//! Plugin health monitoring: an active scan loop that asks the plugin
//! manager for statuses and a passive pull loop that reads heartbeat files.
//! Both loops share one [`SchedulerState`] and re-arm their own timer after
//! each round, so a slow round delays the next one instead of overlapping it.

pub mod pull;
pub mod scan;
pub mod state;

use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::{Instant, sleep};

use pull::HeartbeatPuller;
use scan::{HealthScanner, random_delay};
use state::SchedulerState;

pub struct HealthMonitor {
    scanner: Arc<HealthScanner>,
    puller: Arc<HeartbeatPuller>,
    state: SchedulerState,
}

impl HealthMonitor {
    pub fn new(scanner: HealthScanner, puller: HeartbeatPuller, state: SchedulerState) -> Self {
        Self {
            scanner: Arc::new(scanner),
            puller: Arc::new(puller),
            state,
        }
    }

    pub fn state(&self) -> &SchedulerState {
        &self.state
    }

    pub fn spawn(&self) -> (JoinHandle<()>, JoinHandle<()>) {
        (self.spawn_scan_loop(), self.spawn_pull_loop())
    }

    pub fn spawn_scan_loop(&self) -> JoinHandle<()> {
        let scanner = self.scanner.clone();
        let state = self.state.clone();
        tokio::spawn(async move {
            let first = random_delay(state.scan_interval().await);
            state.set_next_scan(Instant::now() + first).await;
            sleep(first).await;
            loop {
                if let Err(err) = scanner.scan_once().await {
                    tracing::error!(error = ?err, "plugin_health_scan_failed");
                }
                let interval = state.scan_interval().await;
                state.set_next_scan(Instant::now() + interval).await;
                sleep(interval).await;
            }
        })
    }

    pub fn spawn_pull_loop(&self) -> JoinHandle<()> {
        let puller = self.puller.clone();
        let state = self.state.clone();
        tokio::spawn(async move {
            sleep(random_delay(state.pull_interval().await)).await;
            loop {
                if let Err(err) = puller.pull_once().await {
                    tracing::error!(error = ?err, "plugin_health_pull_failed");
                }
                let interval: Duration = state.pull_interval().await;
                sleep(interval).await;
            }
        })
    }
}
