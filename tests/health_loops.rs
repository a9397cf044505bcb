mod common;

use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;

use plugin_agent::application::dto::plugins::{PluginStatusResponse, REPORT_TYPE_LAZY};
use plugin_agent::application::ports::installed_plugin_store::InstalledPluginStore;
use plugin_agent::application::ports::plugin_package_store::PluginPackageStore;
use plugin_agent::application::ports::process_supervisor::{
    CommandSpec, ProcessOutcome, ProcessSupervisor, RunStatus,
};
use plugin_agent::application::services::health::pull::{HeartbeatPuller, PullOutcome};
use plugin_agent::application::services::health::scan::HealthScanner;
use plugin_agent::application::services::health::state::SchedulerState;
use plugin_agent::domain::plugins::{
    InstalledPlugins, PluginInfo, PluginStatusKind, PluginType,
};
use plugin_agent::infrastructure::plugins::filesystem_store::FilesystemPluginStore;
use plugin_agent::infrastructure::plugins::installed_store_json::JsonInstalledPluginStore;

use common::RecordingControlPlane;

fn record(name: &str, plugin_type: PluginType) -> PluginInfo {
    PluginInfo {
        plugin_id: format!("id-{name}"),
        name: name.into(),
        version: "1.0".into(),
        run_path: "main".into(),
        timeout: "30".into(),
        plugin_type,
        heartbeat_interval: 60,
        ..Default::default()
    }
}

fn state() -> SchedulerState {
    SchedulerState::new(
        Duration::from_secs(900),
        Duration::from_secs(300),
        Duration::from_secs(60),
    )
}

async fn seeded_registry(root: &std::path::Path, plugins: Vec<PluginInfo>) -> Arc<JsonInstalledPluginStore> {
    let registry = Arc::new(JsonInstalledPluginStore::under_root(root));
    let mut doc = InstalledPlugins::default();
    for plugin in plugins {
        doc.insert(plugin);
    }
    registry.save(&doc).await.unwrap();
    registry
}

#[tokio::test]
async fn lazy_pull_reports_only_changes() {
    let root_dir = tempfile::tempdir().unwrap();
    let packages = Arc::new(FilesystemPluginStore::new(root_dir.path().to_str().unwrap()).unwrap());
    let registry = seeded_registry(packages.root(), vec![record("svc", PluginType::Persist)]).await;
    let control_plane = Arc::new(RecordingControlPlane {
        status_response: PluginStatusResponse {
            report_type: REPORT_TYPE_LAZY,
            ..Default::default()
        },
        ..Default::default()
    });

    let heartbeat = packages.heartbeat_path("svc", "1.0");
    std::fs::create_dir_all(heartbeat.parent().unwrap()).unwrap();
    std::fs::write(&heartbeat, chrono::Utc::now().timestamp().to_string()).unwrap();

    let puller = HeartbeatPuller::new(registry, packages, control_plane.clone(), state());

    match puller.pull_once().await.unwrap() {
        PullOutcome::Reported(statuses) => {
            assert_eq!(statuses.len(), 1);
            assert_eq!(statuses[0].status, PluginStatusKind::PersistRunning);
            assert_eq!(statuses[0].plugin_id, "id-svc");
        }
        other => panic!("expected a report, got {other:?}"),
    }
    assert!(matches!(puller.pull_once().await.unwrap(), PullOutcome::Unchanged));
    assert_eq!(control_plane.report_count(), 1);

    std::fs::remove_file(&heartbeat).unwrap();
    match puller.pull_once().await.unwrap() {
        PullOutcome::Reported(statuses) => {
            assert_eq!(statuses[0].status, PluginStatusKind::PersistFail);
        }
        other => panic!("expected a report, got {other:?}"),
    }
    assert_eq!(control_plane.report_count(), 2);
}

#[tokio::test]
async fn pull_without_persistent_plugins_reports_nothing() {
    let root_dir = tempfile::tempdir().unwrap();
    let packages = Arc::new(FilesystemPluginStore::new(root_dir.path().to_str().unwrap()).unwrap());
    let registry = seeded_registry(packages.root(), vec![record("tool", PluginType::Once)]).await;
    let control_plane = Arc::new(RecordingControlPlane::default());

    let puller = HeartbeatPuller::new(registry, packages, control_plane.clone(), state());
    assert!(matches!(
        puller.pull_once().await.unwrap(),
        PullOutcome::NoPersistentPlugins
    ));
    assert_eq!(control_plane.report_count(), 0);
}

#[tokio::test]
async fn pull_is_skipped_when_a_scan_is_imminent() {
    let root_dir = tempfile::tempdir().unwrap();
    let packages = Arc::new(FilesystemPluginStore::new(root_dir.path().to_str().unwrap()).unwrap());
    let registry = seeded_registry(packages.root(), vec![record("svc", PluginType::Persist)]).await;
    let control_plane = Arc::new(RecordingControlPlane::default());

    let shared = state();
    shared
        .set_next_scan(tokio::time::Instant::now() + Duration::from_secs(10))
        .await;
    let puller = HeartbeatPuller::new(registry, packages, control_plane.clone(), shared);
    assert_eq!(puller.pull_once().await.unwrap(), PullOutcome::Skipped);
    assert_eq!(control_plane.report_count(), 0);
}

#[tokio::test]
async fn pull_waits_out_a_scan_that_just_started() {
    let root_dir = tempfile::tempdir().unwrap();
    let packages = Arc::new(FilesystemPluginStore::new(root_dir.path().to_str().unwrap()).unwrap());
    let registry = seeded_registry(packages.root(), vec![record("svc", PluginType::Persist)]).await;
    let control_plane = Arc::new(RecordingControlPlane::default());
    let heartbeat = packages.heartbeat_path("svc", "1.0");
    std::fs::create_dir_all(heartbeat.parent().unwrap()).unwrap();
    std::fs::write(&heartbeat, chrono::Utc::now().timestamp().to_string()).unwrap();

    let shared = SchedulerState::new(
        Duration::from_secs(900),
        Duration::from_secs(300),
        Duration::from_millis(300),
    );
    let started = tokio::time::Instant::now();
    shared.mark_scan_started(started).await;
    let puller = HeartbeatPuller::new(registry, packages, control_plane.clone(), shared);

    assert!(matches!(
        puller.pull_once().await.unwrap(),
        PullOutcome::Reported(_)
    ));
    assert!(started.elapsed() >= Duration::from_millis(250));
    assert_eq!(control_plane.report_count(), 1);
}

/// Answers `--status` with a fixed document and records every other call.
struct ScriptedManager {
    status_stdout: &'static str,
    calls: Mutex<Vec<Vec<String>>>,
}

#[async_trait]
impl ProcessSupervisor for ScriptedManager {
    async fn run(&self, spec: CommandSpec) -> ProcessOutcome {
        self.calls.lock().unwrap().push(spec.args.clone());
        let stdout = if spec.args == ["--status"] {
            self.status_stdout.as_bytes().to_vec()
        } else {
            Vec::new()
        };
        ProcessOutcome {
            exit_code: 0,
            status: RunStatus::Success,
            error: None,
            stdout,
            stderr: Vec::new(),
        }
    }
}

#[tokio::test]
async fn scan_restarts_failed_plugins_and_omits_them() {
    let root_dir = tempfile::tempdir().unwrap();
    let mut removed = record("gone", PluginType::Once);
    removed.is_removed = true;
    let registry = seeded_registry(
        root_dir.path(),
        vec![
            record("tool", PluginType::Once),
            removed,
            record("svc", PluginType::Persist),
            record("bad", PluginType::Persist),
        ],
    )
    .await;
    let control_plane = Arc::new(RecordingControlPlane::default());
    let manager = Arc::new(ScriptedManager {
        status_stdout: r#"[{"name":"svc","status":"PERSIST_RUNNING","version":"1.0"},
                           {"name":"bad","status":"PERSIST_FAIL","version":"1.0"}]"#,
        calls: Mutex::new(Vec::new()),
    });

    let scanner = HealthScanner::new(
        registry,
        control_plane.clone(),
        manager.clone(),
        PathBuf::from("/usr/local/bin/plugin-agent"),
        state(),
        Duration::ZERO,
    );
    let report = scanner.scan_once().await.unwrap();

    assert_eq!(report.restarting, ["bad"]);
    let reported: Vec<_> = report
        .reported
        .iter()
        .map(|s| (s.name.as_str(), s.status))
        .collect();
    assert_eq!(
        reported,
        [
            ("tool", PluginStatusKind::OnceInstalled),
            ("gone", PluginStatusKind::Removed),
            ("svc", PluginStatusKind::PersistRunning),
        ]
    );
    assert_eq!(report.reported[2].plugin_id, "id-svc");
    assert_eq!(control_plane.report_count(), 1);

    let restart = ["--exec", "--local", "--plugin", "bad", "--params=--start"];
    for _ in 0..50 {
        if manager.calls.lock().unwrap().iter().any(|args| args == &restart) {
            return;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    panic!("restart was not spawned: {:?}", manager.calls.lock().unwrap());
}

#[tokio::test]
async fn scan_with_empty_registry_skips_report() {
    let root_dir = tempfile::tempdir().unwrap();
    let registry = seeded_registry(root_dir.path(), Vec::new()).await;
    let control_plane = Arc::new(RecordingControlPlane::default());
    let manager = Arc::new(ScriptedManager {
        status_stdout: "[]",
        calls: Mutex::new(Vec::new()),
    });
    let scanner = HealthScanner::new(
        registry,
        control_plane.clone(),
        manager.clone(),
        PathBuf::from("plugin-agent"),
        state(),
        Duration::ZERO,
    );

    let report = scanner.scan_once().await.unwrap();
    assert!(report.reported.is_empty());
    assert_eq!(control_plane.report_count(), 0);
    assert!(manager.calls.lock().unwrap().is_empty());
}
