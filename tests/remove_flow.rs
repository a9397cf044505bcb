mod common;

use std::sync::{Arc, Mutex};

use async_trait::async_trait;

use plugin_agent::application::ports::installed_plugin_store::InstalledPluginStore;
use plugin_agent::application::ports::process_supervisor::{
    CommandSpec, ProcessOutcome, ProcessSupervisor, RunStatus,
};
use plugin_agent::application::use_cases::plugins::remove::{RemoveOutcome, RemovePlugin};
use plugin_agent::domain::plugins::{InstalledPlugins, PluginInfo, PluginType};
use plugin_agent::infrastructure::locking::in_process::InProcessLockManager;
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
        ..Default::default()
    }
}

/// Lets another installer register a plugin while `--uninstall` runs.
struct InstallDuringUninstall {
    registry: Arc<JsonInstalledPluginStore>,
    uninstall_code: i32,
    calls: Mutex<Vec<Vec<String>>>,
}

#[async_trait]
impl ProcessSupervisor for InstallDuringUninstall {
    async fn run(&self, spec: CommandSpec) -> ProcessOutcome {
        self.calls.lock().unwrap().push(spec.args.clone());
        let mut exit_code = 0;
        if spec.args == ["--uninstall"] {
            let mut plugins = self.registry.load().await.unwrap();
            plugins.insert(record("other", PluginType::Once));
            self.registry.save(&plugins).await.unwrap();
            exit_code = self.uninstall_code;
        }
        ProcessOutcome {
            exit_code,
            status: RunStatus::Success,
            error: None,
            stdout: Vec::new(),
            stderr: Vec::new(),
        }
    }
}

struct Fixture {
    _root_dir: tempfile::TempDir,
    packages: FilesystemPluginStore,
    registry: Arc<JsonInstalledPluginStore>,
    locks: InProcessLockManager,
    control_plane: RecordingControlPlane,
}

async fn fixture() -> Fixture {
    let root_dir = tempfile::tempdir().unwrap();
    let packages = FilesystemPluginStore::new(root_dir.path().to_str().unwrap()).unwrap();
    let registry = Arc::new(JsonInstalledPluginStore::under_root(packages.root()));
    let mut doc = InstalledPlugins::default();
    doc.insert(record("svc", PluginType::Persist));
    registry.save(&doc).await.unwrap();

    let dir = packages.root().join("svc").join("1.0");
    std::fs::create_dir_all(&dir).unwrap();
    std::fs::write(dir.join("main"), b"#!/bin/sh\nexit 0\n").unwrap();

    Fixture {
        _root_dir: root_dir,
        packages,
        registry,
        locks: InProcessLockManager::new(),
        control_plane: RecordingControlPlane::default(),
    }
}

fn names(plugins: &InstalledPlugins) -> Vec<(String, bool)> {
    plugins
        .find_all()
        .iter()
        .map(|p| (p.name.clone(), p.is_removed))
        .collect()
}

#[tokio::test]
async fn remove_keeps_records_written_during_uninstall() {
    let f = fixture().await;
    let supervisor = InstallDuringUninstall {
        registry: f.registry.clone(),
        uninstall_code: 0,
        calls: Mutex::new(Vec::new()),
    };

    let outcome = RemovePlugin {
        registry: f.registry.as_ref(),
        packages: &f.packages,
        locks: &f.locks,
        control_plane: &f.control_plane,
        supervisor: &supervisor,
    }
    .execute("svc", false)
    .await
    .unwrap();

    assert_eq!(outcome, RemoveOutcome::Removed);
    let plugins = f.registry.load().await.unwrap();
    assert_eq!(
        names(&plugins),
        [("svc".to_string(), true), ("other".to_string(), false)]
    );
    assert_eq!(
        *supervisor.calls.lock().unwrap(),
        [vec!["--stop".to_string()], vec!["--uninstall".to_string()]]
    );
    assert!(!f.packages.root().join("svc").exists());
    assert_eq!(f.control_plane.report_count(), 1);
}

#[tokio::test]
async fn purge_drops_only_the_removed_record() {
    let f = fixture().await;
    let supervisor = InstallDuringUninstall {
        registry: f.registry.clone(),
        uninstall_code: 0,
        calls: Mutex::new(Vec::new()),
    };

    RemovePlugin {
        registry: f.registry.as_ref(),
        packages: &f.packages,
        locks: &f.locks,
        control_plane: &f.control_plane,
        supervisor: &supervisor,
    }
    .execute("svc", true)
    .await
    .unwrap();

    let plugins = f.registry.load().await.unwrap();
    assert_eq!(names(&plugins), [("other".to_string(), false)]);
}

#[tokio::test]
async fn refused_uninstall_changes_nothing_of_ours() {
    let f = fixture().await;
    let supervisor = InstallDuringUninstall {
        registry: f.registry.clone(),
        uninstall_code: 3,
        calls: Mutex::new(Vec::new()),
    };

    let outcome = RemovePlugin {
        registry: f.registry.as_ref(),
        packages: &f.packages,
        locks: &f.locks,
        control_plane: &f.control_plane,
        supervisor: &supervisor,
    }
    .execute("svc", false)
    .await
    .unwrap();

    assert_eq!(outcome, RemoveOutcome::UninstallRefused(3));
    let plugins = f.registry.load().await.unwrap();
    assert_eq!(
        names(&plugins),
        [("svc".to_string(), false), ("other".to_string(), false)]
    );
    assert!(f.packages.root().join("svc").join("1.0").exists());
    assert_eq!(f.control_plane.report_count(), 0);
}
