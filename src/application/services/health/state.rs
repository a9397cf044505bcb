use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Mutex;
use tokio::time::Instant;

use crate::application::dto::plugins::{PluginStatusResponse, REPORT_TYPE_LAZY};
use crate::application::services::clamp_interval;
use crate::domain::plugins::PluginStatusKind;

/// What the pull loop should do this round.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PullPlan {
    Run,
    /// A scan started less than the avoidance window ago.
    WaitThenRun(Duration),
    /// The next scan is due within the avoidance window.
    Skip,
}

#[derive(Debug)]
struct Inner {
    scan_interval: Duration,
    pull_interval: Duration,
    lazy_report: bool,
    last_scan_start: Option<Instant>,
    next_scan_at: Option<Instant>,
    last_pulled: Option<BTreeMap<String, PluginStatusKind>>,
}

/// Scheduling state shared by the scan and pull loops.
#[derive(Debug, Clone)]
pub struct SchedulerState {
    inner: Arc<Mutex<Inner>>,
    avoid: Duration,
}

impl SchedulerState {
    pub fn new(scan_interval: Duration, pull_interval: Duration, avoid: Duration) -> Self {
        Self {
            inner: Arc::new(Mutex::new(Inner {
                scan_interval,
                pull_interval,
                lazy_report: false,
                last_scan_start: None,
                next_scan_at: None,
                last_pulled: None,
            })),
            avoid,
        }
    }

    pub async fn scan_interval(&self) -> Duration {
        self.inner.lock().await.scan_interval
    }

    pub async fn pull_interval(&self) -> Duration {
        self.inner.lock().await.pull_interval
    }

    pub async fn lazy_report(&self) -> bool {
        self.inner.lock().await.lazy_report
    }

    pub async fn mark_scan_started(&self, now: Instant) {
        self.inner.lock().await.last_scan_start = Some(now);
    }

    pub async fn set_next_scan(&self, at: Instant) {
        self.inner.lock().await.next_scan_at = Some(at);
    }

    /// Applies server-tuned intervals and the report mode. Non-positive
    /// intervals leave the current value in place.
    pub async fn apply_response(&self, resp: &PluginStatusResponse) {
        let mut inner = self.inner.lock().await;
        if resp.scan_interval > 0 {
            inner.scan_interval = Duration::from_secs(clamp_interval(resp.scan_interval as u64));
        }
        if resp.pull_interval > 0 {
            inner.pull_interval = Duration::from_secs(clamp_interval(resp.pull_interval as u64));
        }
        let lazy = resp.report_type == REPORT_TYPE_LAZY;
        if lazy != inner.lazy_report {
            tracing::info!(lazy, "plugin_health_report_mode_changed");
        }
        inner.lazy_report = lazy;
    }

    pub async fn pull_plan(&self, now: Instant) -> PullPlan {
        let inner = self.inner.lock().await;
        let wait = inner
            .last_scan_start
            .map(|start| self.avoid.saturating_sub(now.saturating_duration_since(start)))
            .unwrap_or_default();
        let start_at = now + wait;
        if let Some(next) = inner.next_scan_at {
            if next >= start_at && next.duration_since(start_at) < self.avoid {
                return PullPlan::Skip;
            }
        }
        if wait.is_zero() {
            PullPlan::Run
        } else {
            PullPlan::WaitThenRun(wait)
        }
    }

    /// In lazy mode a pull round is only reported when the status map differs
    /// from the last one reported.
    pub async fn pull_needs_report(&self, statuses: &BTreeMap<String, PluginStatusKind>) -> bool {
        let inner = self.inner.lock().await;
        !inner.lazy_report || inner.last_pulled.as_ref() != Some(statuses)
    }

    pub async fn record_pulled(&self, statuses: BTreeMap<String, PluginStatusKind>) {
        self.inner.lock().await.last_pulled = Some(statuses);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn state() -> SchedulerState {
        SchedulerState::new(
            Duration::from_secs(900),
            Duration::from_secs(300),
            Duration::from_secs(60),
        )
    }

    #[tokio::test]
    async fn pull_waits_out_the_avoidance_window() {
        let s = state();
        let now = Instant::now();
        assert_eq!(s.pull_plan(now).await, PullPlan::Run);

        s.mark_scan_started(now).await;
        s.set_next_scan(now + Duration::from_secs(900)).await;
        let plan = s.pull_plan(now + Duration::from_secs(20)).await;
        assert_eq!(plan, PullPlan::WaitThenRun(Duration::from_secs(40)));
        assert_eq!(s.pull_plan(now + Duration::from_secs(61)).await, PullPlan::Run);
    }

    #[tokio::test]
    async fn pull_skips_when_scan_is_imminent() {
        let s = state();
        let now = Instant::now();
        s.set_next_scan(now + Duration::from_secs(30)).await;
        assert_eq!(s.pull_plan(now).await, PullPlan::Skip);
    }

    #[tokio::test]
    async fn response_tunes_intervals_and_mode() {
        let s = state();
        s.apply_response(&PluginStatusResponse {
            scan_interval: 120,
            pull_interval: 0,
            report_type: REPORT_TYPE_LAZY,
            ..Default::default()
        })
        .await;
        assert_eq!(s.scan_interval().await, Duration::from_secs(120));
        assert_eq!(s.pull_interval().await, Duration::from_secs(300));
        assert!(s.lazy_report().await);
    }

    #[tokio::test]
    async fn server_intervals_are_clamped() {
        let s = state();
        s.apply_response(&PluginStatusResponse {
            scan_interval: 5,
            pull_interval: 86_400,
            ..Default::default()
        })
        .await;
        assert_eq!(s.scan_interval().await, Duration::from_secs(60));
        assert_eq!(s.pull_interval().await, Duration::from_secs(7200));
    }

    #[tokio::test]
    async fn lazy_mode_suppresses_unchanged_maps() {
        let s = state();
        let mut map = BTreeMap::new();
        map.insert("a".to_string(), PluginStatusKind::PersistRunning);
        assert!(s.pull_needs_report(&map).await);
        s.record_pulled(map.clone()).await;
        // Normal mode always reports.
        assert!(s.pull_needs_report(&map).await);

        s.apply_response(&PluginStatusResponse {
            report_type: REPORT_TYPE_LAZY,
            ..Default::default()
        })
        .await;
        assert!(!s.pull_needs_report(&map).await);
        map.insert("a".to_string(), PluginStatusKind::PersistFail);
        assert!(s.pull_needs_report(&map).await);
    }
}
