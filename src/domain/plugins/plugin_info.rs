use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use super::lenient;
use super::manifest::{DEFAULT_TIMEOUT_SECS, PluginManifest};
use super::plugin_type::PluginType;

/// One record of the installed-plugin registry.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PluginInfo {
    #[serde(default, deserialize_with = "lenient::string")]
    pub plugin_id: String,
    #[serde(default, deserialize_with = "lenient::string")]
    pub name: String,
    #[serde(default, deserialize_with = "lenient::string")]
    pub arch: String,
    #[serde(default, deserialize_with = "lenient::string")]
    pub os_type: String,
    #[serde(default, deserialize_with = "lenient::string")]
    pub version: String,
    #[serde(default, deserialize_with = "lenient::string")]
    pub publisher: String,
    #[serde(default, deserialize_with = "lenient::string")]
    pub url: String,
    #[serde(default, deserialize_with = "lenient::string")]
    pub md5: String,
    #[serde(default, deserialize_with = "lenient::string")]
    pub run_path: String,
    #[serde(default, deserialize_with = "lenient::string")]
    pub timeout: String,
    #[serde(default, deserialize_with = "lenient::string")]
    pub is_pre_installed: String,
    #[serde(default)]
    pub plugin_type: PluginType,
    #[serde(default, deserialize_with = "lenient::int")]
    pub heartbeat_interval: i64,
    #[serde(default, deserialize_with = "lenient::boolean")]
    pub is_removed: bool,
    #[serde(default, deserialize_with = "lenient::boolean")]
    pub add_sys_tag: bool,
}

impl PluginInfo {
    pub fn plugin_type(&self) -> PluginType {
        self.plugin_type
    }

    pub fn is_persist(&self) -> bool {
        self.plugin_type.is_persist()
    }

    /// Execution timeout in seconds, falling back to the default when the
    /// stored string is empty or not a number.
    pub fn timeout_secs(&self) -> u64 {
        self.timeout
            .trim()
            .parse()
            .unwrap_or(DEFAULT_TIMEOUT_SECS)
    }

    pub fn install_dir(&self, plugin_root: &Path) -> PathBuf {
        plugin_root.join(&self.name).join(&self.version)
    }

    pub fn entrypoint(&self, plugin_root: &Path) -> PathBuf {
        self.install_dir(plugin_root).join(&self.run_path)
    }

    /// Copies the descriptive fields of a manifest onto this record.
    pub fn apply_manifest(&mut self, manifest: &PluginManifest) {
        self.name = manifest.name.clone();
        self.arch = manifest.arch.clone();
        self.os_type = manifest.os_type.clone();
        self.run_path = manifest.run_path.clone();
        if manifest.timeout_secs().is_some() {
            self.timeout = manifest.timeout.clone();
        } else if self.timeout.is_empty() {
            self.timeout = DEFAULT_TIMEOUT_SECS.to_string();
        }
        self.publisher = manifest.publisher.clone();
        self.version = manifest.version.clone();
        self.plugin_type = manifest.plugin_type;
        self.heartbeat_interval = manifest.effective_heartbeat_interval();
    }

    pub fn local_id(name: &str, version: &str) -> String {
        format!("local_{name}_{version}")
    }
}
