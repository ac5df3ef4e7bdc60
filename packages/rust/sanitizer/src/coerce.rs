//! Field-level coercion of untyped JSON values.
//!
//! Every helper is total: bad input yields the supplied default, never an
//! error, and numeric helpers never return a non-finite value.

use serde_json::{Map, Value};
use tracing::warn;

/// Parse a JSON value as a finite number.
///
/// Accepts numbers and numeric strings (`"1,200"`, `" 35 "`).
pub fn finite(value: Option<&Value>) -> Option<f64> {
    let n = match value? {
        Value::Number(n) => n.as_f64()?,
        Value::String(s) => s.trim().replace(',', "").parse::<f64>().ok()?,
        _ => return None,
    };
    n.is_finite().then_some(n)
}

/// A finite number, or `default`.
pub fn number(value: Option<&Value>, default: f64) -> f64 {
    finite(value).unwrap_or(default)
}

/// A number clamped into `[min, max]`, or `default` when unusable.
pub fn number_in(value: Option<&Value>, default: f64, min: f64, max: f64) -> f64 {
    finite(value).map(|n| n.clamp(min, max)).unwrap_or(default)
}

/// A rounded integer clamped into `[min, max]`, or `default` when unusable.
pub fn int_in(value: Option<&Value>, default: u32, min: u32, max: u32) -> u32 {
    match finite(value) {
        Some(n) => n.round().clamp(min as f64, max as f64) as u32,
        None => default,
    }
}

/// A trimmed string. Scalars are stringified; everything else is empty.
pub fn string(value: Option<&Value>) -> String {
    match value {
        Some(Value::String(s)) => s.trim().to_string(),
        Some(Value::Number(n)) => n.to_string(),
        Some(Value::Bool(b)) => b.to_string(),
        _ => String::new(),
    }
}

/// A non-empty trimmed string, if any.
pub fn opt_string(value: Option<&Value>) -> Option<String> {
    let s = string(value);
    (!s.is_empty()).then_some(s)
}

/// The first non-empty string among `keys`.
pub fn first_string(map: &Map<String, Value>, keys: &[&str]) -> Option<String> {
    keys.iter().find_map(|k| opt_string(map.get(*k)))
}

/// The first key present among `keys`.
pub fn first_value<'a>(map: &'a Map<String, Value>, keys: &[&str]) -> Option<&'a Value> {
    keys.iter().find_map(|k| map.get(*k).filter(|v| !v.is_null()))
}

/// A list of non-empty strings. Non-arrays become an empty list.
pub fn string_list(value: Option<&Value>) -> Vec<String> {
    match value {
        Some(Value::Array(items)) => items
            .iter()
            .filter_map(|v| match v {
                Value::String(s) if !s.trim().is_empty() => Some(s.trim().to_string()),
                _ => None,
            })
            .collect(),
        _ => Vec::new(),
    }
}

/// The elements of an array. Non-arrays become an empty slice.
pub fn array(value: Option<&Value>) -> &[Value] {
    match value {
        Some(Value::Array(items)) => items,
        _ => &[],
    }
}

/// Normalize a free-form label for enum matching: `"Visa Procedures"` →
/// `"visa_procedures"`.
pub fn enum_key(raw: &str) -> String {
    raw.trim()
        .to_lowercase()
        .chars()
        .map(|c| if c == ' ' || c == '-' { '_' } else { c })
        .collect()
}

/// Parse an enum-valued field, substituting `default` for unknown values.
///
/// Unknown values are logged, never rejected.
pub fn enum_or_default<T: Copy + std::fmt::Debug>(
    value: Option<&Value>,
    field: &'static str,
    parse: impl Fn(&str) -> Option<T>,
    default: T,
) -> T {
    let raw = string(value);
    if let Some(parsed) = parse(&enum_key(&raw)) {
        return parsed;
    }
    warn!(field, value = %raw, ?default, "unknown enum value, using default");
    default
}
