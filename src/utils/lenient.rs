//! Field-level deserializers for structured model output.
//!
//! Models routinely emit `null` for empty lists or `1.0` where an integer is
//! expected. These helpers map such values to a per-field default so one odd
//! optional field does not reject the whole document. Use them with
//! `#[serde(deserialize_with = "...")]` next to a `default`.

use serde::{Deserialize, Deserializer};
use serde_json::Value;

/// Deserialize `T`, reading an explicit `null` as `T::default()`.
pub fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    let value: Option<T> = Option::deserialize(deserializer)?;
    Ok(value.unwrap_or_default())
}

/// Deserialize an integer from any JSON number or numeric string.
///
/// Floats are rounded; anything else reads as 0.
pub fn lenient_i64<'de, D>(deserializer: D) -> Result<i64, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Value::deserialize(deserializer)?;
    Ok(match value {
        Value::Number(n) => n
            .as_i64()
            .or_else(|| n.as_f64().map(|f| f.round() as i64))
            .unwrap_or_default(),
        Value::String(s) => s
            .trim()
            .parse::<f64>()
            .map(|f| f.round() as i64)
            .unwrap_or_default(),
        _ => 0,
    })
}

/// Deserialize a float from a JSON number or numeric string.
///
/// Unlike the other helpers this still fails on anything else, for fields
/// without a meaningful default.
pub fn number_or_numeric_string<'de, D>(deserializer: D) -> Result<f64, D::Error>
where
    D: Deserializer<'de>,
{
    match Value::deserialize(deserializer)? {
        Value::Number(n) => n
            .as_f64()
            .ok_or_else(|| serde::de::Error::custom("number out of range")),
        Value::String(s) => s
            .trim()
            .trim_end_matches('%')
            .parse::<f64>()
            .map_err(|_| serde::de::Error::custom(format!("expected a number, got \"{}\"", s))),
        other => Err(serde::de::Error::custom(format!("expected a number, got {}", other))),
    }
}

/// Deserialize a boolean, reading `null` and anything non-boolean as `false`.
pub fn lenient_bool<'de, D>(deserializer: D) -> Result<bool, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Value::deserialize(deserializer)?;
    Ok(match value {
        Value::Bool(b) => b,
        Value::String(s) => s.trim().eq_ignore_ascii_case("true"),
        _ => false,
    })
}
