//! JSON field extraction shared by the venue adapters.
//!
//! Venues are inconsistent about quoting numbers (Binance sends prices as
//! strings and times as numbers, Bybit sends everything as strings), so the
//! readers here accept either form.

use serde_json::Value;

use super::VenueError;
use crate::domain::Decimal;

pub(crate) fn str_field<'a>(value: &'a Value, name: &str) -> Result<&'a str, VenueError> {
    value
        .get(name)
        .and_then(|v| v.as_str())
        .ok_or_else(|| VenueError::Parse(format!("Missing {} field", name)))
}

pub(crate) fn opt_str_field<'a>(value: &'a Value, name: &str) -> Option<&'a str> {
    value
        .get(name)
        .and_then(|v| v.as_str())
        .filter(|s| !s.is_empty())
}

pub(crate) fn decimal_field(value: &Value, name: &str) -> Result<Decimal, VenueError> {
    match value.get(name) {
        Some(Value::String(s)) => Decimal::from_str_canonical(s)
            .map_err(|e| VenueError::Parse(format!("Invalid {}: {}", name, e))),
        Some(Value::Number(n)) => Decimal::from_str_canonical(&n.to_string())
            .map_err(|e| VenueError::Parse(format!("Invalid {}: {}", name, e))),
        _ => Err(VenueError::Parse(format!("Missing {} field", name))),
    }
}

/// Absent, empty and unparseable values all read as `None`.
pub(crate) fn opt_decimal_field(value: &Value, name: &str) -> Option<Decimal> {
    match value.get(name) {
        Some(Value::String(s)) if !s.is_empty() => Decimal::from_str_canonical(s).ok(),
        Some(Value::Number(n)) => Decimal::from_str_canonical(&n.to_string()).ok(),
        _ => None,
    }
}

pub(crate) fn i64_field(value: &Value, name: &str) -> Result<i64, VenueError> {
    match value.get(name) {
        Some(Value::Number(n)) => n
            .as_i64()
            .ok_or_else(|| VenueError::Parse(format!("Invalid {}: {}", name, n))),
        Some(Value::String(s)) => s
            .parse::<i64>()
            .map_err(|_| VenueError::Parse(format!("Invalid {}: {}", name, s))),
        _ => Err(VenueError::Parse(format!("Missing {} field", name))),
    }
}

/// Ids may be numbers or strings; both come back as text.
pub(crate) fn opt_id_field(value: &Value, name: &str) -> Option<String> {
    match value.get(name) {
        Some(Value::Number(n)) => Some(n.to_string()),
        Some(Value::String(s)) if !s.is_empty() => Some(s.clone()),
        _ => None,
    }
}

pub(crate) fn array<'a>(value: &'a Value, what: &str) -> Result<&'a Vec<Value>, VenueError> {
    value
        .as_array()
        .ok_or_else(|| VenueError::Parse(format!("Expected array of {}", what)))
}

/// Parse every element, skipping (and logging) the malformed ones.
pub(crate) fn parse_all<T>(
    items: &[Value],
    what: &str,
    parse: impl Fn(&Value) -> Result<T, VenueError>,
) -> Vec<T> {
    items
        .iter()
        .filter_map(|item| match parse(item) {
            Ok(parsed) => Some(parsed),
            Err(e) => {
                tracing::warn!("Failed to parse {}: {}", what, e);
                None
            }
        })
        .collect()
}
