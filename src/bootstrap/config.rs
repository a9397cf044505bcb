use std::env;
use std::path::{Path, PathBuf};

use crate::application::services::clamp_interval;

pub const INTERVAL_OVERRIDE_FILE: &str = "PluginCheckInterval";

#[derive(Clone, Debug)]
pub struct Config {
    pub plugin_root: String,
    pub control_plane_url: String,
    pub plugin_list_path: String,
    pub plugin_health_path: String,
    pub plugin_update_check_path: String,
    pub manager_bin: PathBuf,
    pub health_scan_interval_secs: u64,
    pub health_pull_interval_secs: u64,
    pub update_check_interval_secs: u64,
    pub health_avoid_secs: u64,
    pub restart_jitter_secs: u64,
    pub fetch_timeout_secs: u64,
    pub http_retry_delay_secs: u64,
}

fn parse_secs(raw: Option<&str>, default: u64) -> u64 {
    raw.and_then(|s| s.trim().parse().ok()).unwrap_or(default)
}

fn env_secs(key: &str, default: u64) -> u64 {
    parse_secs(env::var(key).ok().as_deref(), default)
}

fn env_interval_secs(key: &str, default: u64) -> u64 {
    clamp_interval(env_secs(key, default))
}

impl Config {
    pub fn from_env() -> anyhow::Result<Self> {
        let plugin_root = env::var("PLUGIN_ROOT").unwrap_or_else(|_| "./plugin".into());
        let control_plane_url = env::var("CONTROL_PLANE_URL")
            .unwrap_or_else(|_| "http://127.0.0.1:8080".into())
            .trim_end_matches('/')
            .to_string();
        let plugin_list_path =
            env::var("PLUGIN_LIST_PATH").unwrap_or_else(|_| "/luban/api/v1/plugin/list".into());
        let plugin_health_path =
            env::var("PLUGIN_HEALTH_PATH").unwrap_or_else(|_| "/luban/api/v1/plugin/status".into());
        let plugin_update_check_path = env::var("PLUGIN_UPDATE_CHECK_PATH")
            .unwrap_or_else(|_| "/luban/api/v1/plugin/update_check".into());
        let manager_bin = match env::var("PLUGIN_MANAGER_BIN") {
            Ok(path) if !path.trim().is_empty() => PathBuf::from(path),
            _ => env::current_exe()?,
        };

        let mut cfg = Self {
            plugin_root,
            control_plane_url,
            plugin_list_path,
            plugin_health_path,
            plugin_update_check_path,
            manager_bin,
            health_scan_interval_secs: env_interval_secs("PLUGIN_HEALTH_SCAN_INTERVAL_SECS", 900),
            health_pull_interval_secs: env_interval_secs("PLUGIN_HEALTH_PULL_INTERVAL_SECS", 300),
            update_check_interval_secs: env_interval_secs("PLUGIN_UPDATE_CHECK_INTERVAL_SECS", 900),
            health_avoid_secs: env_secs("PLUGIN_HEALTH_AVOID_SECS", 60),
            restart_jitter_secs: env_secs("PLUGIN_RESTART_JITTER_SECS", 10),
            fetch_timeout_secs: env_secs("PLUGIN_FETCH_TIMEOUT_SECS", 600),
            http_retry_delay_secs: env_secs("HTTP_RETRY_DELAY_SECS", 2),
        };

        if let Some(path) = interval_override_path() {
            match std::fs::read_to_string(&path) {
                Ok(content) => {
                    tracing::info!(path = %path.display(), "plugin_interval_override_loaded");
                    cfg.apply_interval_overrides(&content);
                }
                Err(err) if err.kind() == std::io::ErrorKind::NotFound => {}
                Err(err) => {
                    tracing::warn!(path = %path.display(), error = ?err, "plugin_interval_override_unreadable");
                }
            }
        }
        Ok(cfg)
    }

    /// Applies `key=seconds` pairs separated by commas (or newlines).
    /// Values are clamped to [60, 7200]; anything malformed is ignored.
    pub fn apply_interval_overrides(&mut self, content: &str) {
        for pair in content.split([',', '\n']) {
            let Some((key, value)) = pair.split_once('=') else {
                continue;
            };
            let Ok(secs) = value.trim().parse::<u64>() else {
                tracing::warn!(pair = pair.trim(), "plugin_interval_override_invalid");
                continue;
            };
            let secs = clamp_interval(secs);
            match key.trim() {
                "pluginHealthScanInterval" => self.health_scan_interval_secs = secs,
                "pluginHealthPullInterval" => self.health_pull_interval_secs = secs,
                "pluginUpdateCheckInterval" => self.update_check_interval_secs = secs,
                _ => {}
            }
        }
    }

    pub fn plugin_root_path(&self) -> &Path {
        Path::new(&self.plugin_root)
    }
}

fn interval_override_path() -> Option<PathBuf> {
    let exe = env::current_exe().ok()?;
    Some(exe.parent()?.join("config").join(INTERVAL_OVERRIDE_FILE))
}
