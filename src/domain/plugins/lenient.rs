//! Serde helpers for manifest and registry fields that older packages encode
//! with the wrong JSON type (numbers where strings are expected and so on).

use serde::{Deserialize, Deserializer};
use serde_json::Value as JsonValue;

/// Accepts a string, number, bool or null and yields a string.
pub fn string<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<JsonValue>::deserialize(deserializer)?;
    Ok(match value {
        None | Some(JsonValue::Null) => String::new(),
        Some(JsonValue::String(s)) => s,
        Some(JsonValue::Number(n)) => n.to_string(),
        Some(JsonValue::Bool(b)) => b.to_string(),
        Some(other) => other.to_string(),
    })
}

/// Accepts an integer, a float, a numeric string or null and yields an i64.
pub fn int<'de, D>(deserializer: D) -> Result<i64, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<JsonValue>::deserialize(deserializer)?;
    Ok(match value {
        Some(JsonValue::Number(n)) => n
            .as_i64()
            .or_else(|| n.as_f64().map(|f| f as i64))
            .unwrap_or_default(),
        Some(JsonValue::String(s)) => s.trim().parse().unwrap_or_default(),
        _ => 0,
    })
}

/// Accepts a bool, 0/1, "true"/"false" or null.
pub fn boolean<'de, D>(deserializer: D) -> Result<bool, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<JsonValue>::deserialize(deserializer)?;
    Ok(match value {
        Some(JsonValue::Bool(b)) => b,
        Some(JsonValue::Number(n)) => n.as_i64().map(|i| i != 0).unwrap_or(false),
        Some(JsonValue::String(s)) => matches!(s.trim(), "true" | "1"),
        _ => false,
    })
}
