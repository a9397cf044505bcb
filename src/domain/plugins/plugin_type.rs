use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::Value as JsonValue;

/// Normalized plugin kind.
///
/// Registry documents written by older agents store the kind as an integer
/// (`0` once, `1` persist); newer manifests use the strings `"Once"` and
/// `"Persist"`. The raw encoding is resolved exactly once, when the value is
/// deserialized, and everything downstream matches on this enum.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum PluginType {
    #[default]
    Once,
    Persist,
    Unknown,
}

impl PluginType {
    pub const ONCE: &'static str = "Once";
    pub const PERSIST: &'static str = "Persist";
    pub const UNKNOWN: &'static str = "Unknown";

    pub fn as_str(&self) -> &'static str {
        match self {
            PluginType::Once => Self::ONCE,
            PluginType::Persist => Self::PERSIST,
            PluginType::Unknown => Self::UNKNOWN,
        }
    }

    /// Legacy integer encoding, still written to the registry so that older
    /// readers of the document keep working.
    pub fn legacy_code(&self) -> i64 {
        match self {
            PluginType::Once => 0,
            PluginType::Persist => 1,
            PluginType::Unknown => -1,
        }
    }

    pub fn from_json(value: &JsonValue) -> Self {
        match value {
            JsonValue::Null => PluginType::Once,
            JsonValue::String(s) => match s.as_str() {
                "" | Self::ONCE => PluginType::Once,
                Self::PERSIST => PluginType::Persist,
                _ => PluginType::Unknown,
            },
            JsonValue::Number(n) => match n.as_f64() {
                Some(f) if f == 0.0 => PluginType::Once,
                Some(f) if f == 1.0 => PluginType::Persist,
                _ => PluginType::Unknown,
            },
            _ => PluginType::Unknown,
        }
    }

    pub fn is_persist(&self) -> bool {
        matches!(self, PluginType::Persist)
    }
}

impl std::fmt::Display for PluginType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Serialize for PluginType {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_i64(self.legacy_code())
    }
}

impl<'de> Deserialize<'de> for PluginType {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let value = Option::<JsonValue>::deserialize(deserializer)?;
        Ok(value
            .as_ref()
            .map(PluginType::from_json)
            .unwrap_or(PluginType::Once))
    }
}
