use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PluginStatusKind {
    PersistRunning,
    PersistFail,
    PersistUnknown,
    OnceInstalled,
    Removed,
}

impl PluginStatusKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            PluginStatusKind::PersistRunning => "PERSIST_RUNNING",
            PluginStatusKind::PersistFail => "PERSIST_FAIL",
            PluginStatusKind::PersistUnknown => "PERSIST_UNKNOWN",
            PluginStatusKind::OnceInstalled => "ONCE_INSTALLED",
            PluginStatusKind::Removed => "REMOVED",
        }
    }
}

impl std::fmt::Display for PluginStatusKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One entry of a health report, also the element type printed by `--status`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PluginStatus {
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub plugin_id: String,
    pub name: String,
    pub status: PluginStatusKind,
    #[serde(default)]
    pub version: String,
}

impl PluginStatus {
    pub fn new(name: impl Into<String>, version: impl Into<String>, status: PluginStatusKind) -> Self {
        Self {
            plugin_id: String::new(),
            name: name.into(),
            status,
            version: version.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_array_parses_from_manager_output() {
        let out = r#"[{"name":"a","status":"PERSIST_RUNNING","version":"1.0"},
                      {"name":"b","status":"REMOVED","version":"2.0"}]"#;
        let parsed: Vec<PluginStatus> = serde_json::from_str(out).unwrap();
        assert_eq!(parsed[0].status, PluginStatusKind::PersistRunning);
        assert_eq!(parsed[1].status, PluginStatusKind::Removed);
        let back = serde_json::to_string(&parsed[0]).unwrap();
        assert!(back.contains("\"PERSIST_RUNNING\""));
        assert!(!back.contains("pluginId"));
    }
}
