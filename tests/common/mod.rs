#![allow(dead_code)]

use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;

use plugin_agent::application::dto::plugins::{
    PluginListRequest, PluginStatusRequest, PluginStatusResponse, UpdateCheckRequest,
    UpdateCheckResponse,
};
use plugin_agent::application::ports::control_plane::ControlPlane;
use plugin_agent::application::ports::plugin_package_fetcher::PluginPackageFetcher;
use plugin_agent::domain::plugins::PluginInfo;
use plugin_agent::domain::plugins::platform;

/// Writes a zip with one `config.json` and a shell entrypoint.
pub fn write_package(dest: &Path, name: &str, version: &str, plugin_type: &str) -> PathBuf {
    let manifest = serde_json::json!({
        "name": name,
        "osType": platform::current_os_type(),
        "arch": platform::current_arch(),
        "version": version,
        "runPath": "main",
        "timeout": "30",
        "pluginType": plugin_type,
    });
    let file = std::fs::File::create(dest).unwrap();
    let mut zip = zip::ZipWriter::new(file);
    let options = zip::write::FileOptions::default().unix_permissions(0o644);
    zip.start_file("config.json", options).unwrap();
    zip.write_all(manifest.to_string().as_bytes()).unwrap();
    zip.start_file("main", options).unwrap();
    zip.write_all(b"#!/bin/sh\nexit 0\n").unwrap();
    zip.finish().unwrap();
    dest.to_path_buf()
}

pub fn md5_of(path: &Path) -> String {
    format!("{:x}", md5::compute(std::fs::read(path).unwrap()))
}

/// Copies a local archive, counting calls and holding each for `delay`.
pub struct SlowCopyFetcher {
    pub calls: AtomicUsize,
    pub delay: Duration,
}

impl SlowCopyFetcher {
    pub fn new(delay: Duration) -> Self {
        Self {
            calls: AtomicUsize::new(0),
            delay,
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl PluginPackageFetcher for SlowCopyFetcher {
    async fn fetch(&self, url: &str, dest: &Path) -> anyhow::Result<()> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        tokio::time::sleep(self.delay).await;
        let src = url.strip_prefix("file://").unwrap_or(url);
        tokio::fs::copy(src, dest).await?;
        Ok(())
    }
}

/// Records health reports and answers with a fixed response.
#[derive(Default)]
pub struct RecordingControlPlane {
    pub catalog: Vec<PluginInfo>,
    pub status_response: PluginStatusResponse,
    pub reports: Mutex<Vec<PluginStatusRequest>>,
}

impl RecordingControlPlane {
    pub fn report_count(&self) -> usize {
        self.reports.lock().unwrap().len()
    }
}

#[async_trait]
impl ControlPlane for RecordingControlPlane {
    async fn list_plugins(&self, _request: &PluginListRequest) -> anyhow::Result<Vec<PluginInfo>> {
        Ok(self.catalog.clone())
    }

    async fn report_plugin_status(
        &self,
        request: &PluginStatusRequest,
    ) -> anyhow::Result<PluginStatusResponse> {
        self.reports.lock().unwrap().push(request.clone());
        Ok(self.status_response.clone())
    }

    async fn check_update(
        &self,
        _request: &UpdateCheckRequest,
    ) -> anyhow::Result<UpdateCheckResponse> {
        Ok(UpdateCheckResponse::default())
    }
}
