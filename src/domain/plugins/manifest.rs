use once_cell::sync::Lazy;
use regex::Regex;
use serde::Deserialize;

use super::lenient;
use super::plugin_type::PluginType;

pub const MANIFEST_FILE: &str = "config.json";
pub const DEFAULT_TIMEOUT_SECS: u64 = 60;
pub const DEFAULT_HEARTBEAT_INTERVAL_SECS: i64 = 60;

// Names and versions become directory names under the plugin root.
static PLUGIN_NAME_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[A-Za-z0-9_.-]+$").expect("valid regex"));
static PLUGIN_VERSION_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[A-Za-z0-9._-]+$").expect("valid regex"));

/// True when `name` and `version` are safe to use as path components.
pub fn is_valid_path_identity(name: &str, version: &str) -> bool {
    PLUGIN_NAME_RE.is_match(name)
        && PLUGIN_VERSION_RE.is_match(version)
        && !matches!(name, "." | "..")
        && !matches!(version, "." | "..")
}

/// Package manifest (`config.json`) shipped inside every plugin archive.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PluginManifest {
    #[serde(default, deserialize_with = "lenient::string")]
    pub name: String,
    #[serde(default, deserialize_with = "lenient::string")]
    pub arch: String,
    #[serde(default, deserialize_with = "lenient::string")]
    pub os_type: String,
    #[serde(default, deserialize_with = "lenient::string")]
    pub run_path: String,
    #[serde(default, deserialize_with = "lenient::string")]
    pub timeout: String,
    #[serde(default, deserialize_with = "lenient::string")]
    pub publisher: String,
    #[serde(default, deserialize_with = "lenient::string")]
    pub version: String,
    #[serde(default)]
    pub plugin_type: PluginType,
    #[serde(default, deserialize_with = "lenient::int")]
    pub heartbeat_interval: i64,
}

impl PluginManifest {
    pub fn from_slice(bytes: &[u8]) -> serde_json::Result<Self> {
        serde_json::from_slice(bytes)
    }

    pub fn timeout_secs(&self) -> Option<u64> {
        self.timeout.trim().parse().ok()
    }

    pub fn effective_heartbeat_interval(&self) -> i64 {
        if self.heartbeat_interval <= 0 {
            DEFAULT_HEARTBEAT_INTERVAL_SECS
        } else {
            self.heartbeat_interval
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_identities_that_escape_the_root() {
        assert!(is_valid_path_identity("demo-plugin", "1.0.2"));
        assert!(!is_valid_path_identity("../etc", "1.0"));
        assert!(!is_valid_path_identity("demo", ".."));
        assert!(!is_valid_path_identity("demo", ""));
        assert!(!is_valid_path_identity("a/b", "1.0"));
    }

    #[test]
    fn parses_manifest_with_loose_types() {
        let m = PluginManifest::from_slice(
            br#"{"name":"demo","osType":"linux","version":1.0,"runPath":"main",
                "timeout":30,"pluginType":"Persist","heartbeatInterval":0}"#,
        )
        .unwrap();
        assert_eq!(m.name, "demo");
        assert_eq!(m.version, "1.0");
        assert_eq!(m.timeout_secs(), Some(30));
        assert_eq!(m.plugin_type, PluginType::Persist);
        assert_eq!(m.effective_heartbeat_interval(), DEFAULT_HEARTBEAT_INTERVAL_SECS);
    }

    #[test]
    fn missing_plugin_type_is_once() {
        let m = PluginManifest::from_slice(br#"{"name":"x","version":"1"}"#).unwrap();
        assert_eq!(m.plugin_type, PluginType::Once);
        assert_eq!(m.timeout_secs(), None);
    }
}
