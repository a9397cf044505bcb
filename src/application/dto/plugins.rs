use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::domain::plugins::lenient;
use crate::domain::plugins::{PluginInfo, PluginStatus, PluginType};

#[derive(Debug, Serialize, Deserialize, Clone, Default)]
#[serde(rename_all = "camelCase")]
pub struct PluginListRequest {
    pub os_type: String,
    pub plugin_name: String,
    pub version: String,
    pub arch: String,
}

#[derive(Debug, Serialize, Deserialize, Clone, Default)]
#[serde(rename_all = "camelCase")]
pub struct PluginListResponse {
    #[serde(default)]
    pub plugin_list: Vec<PluginInfo>,
}

#[derive(Debug, Serialize, Deserialize, Clone, Default)]
pub struct PluginStatusRequest {
    pub os: String,
    pub arch: String,
    pub plugin: Vec<PluginStatus>,
}

/// Health report response. Interval fields are seconds; `reportType` 1
/// switches the pull loop to lazy reporting.
#[derive(Debug, Serialize, Deserialize, Clone, Default)]
#[serde(rename_all = "camelCase")]
pub struct PluginStatusResponse {
    #[serde(default, deserialize_with = "lenient::string")]
    pub instance_id: String,
    #[serde(default, deserialize_with = "lenient::int")]
    pub next_interval: i64,
    #[serde(default, deserialize_with = "lenient::int")]
    pub scan_interval: i64,
    #[serde(default, deserialize_with = "lenient::int")]
    pub pull_interval: i64,
    #[serde(default, deserialize_with = "lenient::int")]
    pub report_type: i64,
}

pub const REPORT_TYPE_LAZY: i64 = 1;

#[derive(Debug, Serialize, Deserialize, Clone, Default)]
#[serde(rename_all = "camelCase")]
pub struct UpdateCheckItem {
    pub plugin_id: String,
    pub name: String,
    pub version: String,
}

#[derive(Debug, Serialize, Deserialize, Clone, Default)]
pub struct UpdateCheckRequest {
    pub os: String,
    pub arch: String,
    pub plugin: Vec<UpdateCheckItem>,
}

#[derive(Debug, Serialize, Deserialize, Clone, Default)]
#[serde(rename_all = "camelCase")]
pub struct UpdateCheckResponse {
    #[serde(default, deserialize_with = "lenient::string")]
    pub instance_id: String,
    #[serde(default, deserialize_with = "lenient::int")]
    pub next_interval: i64,
    #[serde(default, deserialize_with = "lenient::int")]
    pub refresh_interval: i64,
    #[serde(default)]
    pub plugin: Vec<PluginUpdateInfo>,
}

#[derive(Debug, Serialize, Deserialize, Clone, Default)]
#[serde(rename_all = "camelCase")]
pub struct PluginUpdateInfo {
    #[serde(default, deserialize_with = "lenient::int")]
    pub need_update: i64,
    #[serde(default)]
    pub info: PluginUpdateTarget,
}

#[derive(Debug, Serialize, Deserialize, Clone, Default)]
#[serde(rename_all = "camelCase")]
pub struct PluginUpdateTarget {
    #[serde(default, deserialize_with = "lenient::string")]
    pub plugin_id: String,
    #[serde(default, deserialize_with = "lenient::string")]
    pub name: String,
    #[serde(default, deserialize_with = "lenient::string")]
    pub url: String,
    #[serde(default, deserialize_with = "lenient::string")]
    pub md5: String,
    #[serde(default, deserialize_with = "lenient::string")]
    pub run_path: String,
    #[serde(default, deserialize_with = "lenient::string")]
    pub timeout: String,
    #[serde(default, deserialize_with = "lenient::string")]
    pub version: String,
}

/// A plugin resolved to an installed, runnable entrypoint.
#[derive(Debug, Clone)]
pub struct Fetched {
    pub plugin_name: String,
    pub plugin_version: String,
    pub plugin_type: PluginType,
    pub entrypoint: PathBuf,
    pub execution_timeout_secs: u64,
    pub env_plugin_dir: PathBuf,
    pub env_pre_plugin_dir: Option<PathBuf>,
}

/// Where an executed plugin came from, as recorded in execute events.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FetchResource {
    File,
    Local,
    Online,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(rename_all = "camelCase")]
pub struct PluginExecuteEvent {
    pub plugin_name: String,
    pub plugin_version: String,
    pub plugin_type: String,
    pub resource: Option<FetchResource>,
    pub exit_code: i32,
    pub error_code: String,
    pub local_arch: String,
    pub local_os_type: String,
}
