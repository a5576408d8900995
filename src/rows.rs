//! Helpers for reading `row_to_json` rows fetched through the table service.

use chrono::NaiveDate;
use serde_json::{Map, Value};

pub fn value_str(row: &Value, key: &str) -> String {
    row.as_object()
        .and_then(|obj| obj.get(key))
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .map(ToOwned::to_owned)
        .unwrap_or_default()
}

pub fn value_i64(row: &Value, key: &str) -> i64 {
    match row.as_object().and_then(|obj| obj.get(key)) {
        Some(Value::Number(number)) => number.as_i64().unwrap_or(0),
        Some(Value::String(text)) => text.trim().parse::<i64>().unwrap_or(0),
        _ => 0,
    }
}

pub fn value_f64(row: &Value, key: &str) -> f64 {
    number_from_value(row.as_object().and_then(|obj| obj.get(key)))
}

pub fn number_from_value(value: Option<&Value>) -> f64 {
    match value {
        Some(Value::Number(number)) => number.as_f64().unwrap_or(0.0),
        Some(Value::String(text)) => text.trim().parse::<f64>().unwrap_or(0.0),
        _ => 0.0,
    }
}

pub fn value_bool(row: &Value, key: &str) -> bool {
    match row.as_object().and_then(|obj| obj.get(key)) {
        Some(Value::Bool(flag)) => *flag,
        Some(Value::String(text)) => {
            let lower = text.trim().to_ascii_lowercase();
            lower == "true" || lower == "1"
        }
        Some(Value::Number(number)) => number.as_i64().is_some_and(|value| value != 0),
        _ => false,
    }
}

pub fn value_array<'a>(row: &'a Value, key: &str) -> &'a [Value] {
    row.as_object()
        .and_then(|obj| obj.get(key))
        .and_then(Value::as_array)
        .map(Vec::as_slice)
        .unwrap_or(&[])
}

/// Accepts both plain dates and RFC 3339 timestamps; reports store either.
pub fn value_date(row: &Value, key: &str) -> Option<NaiveDate> {
    let text = value_str(row, key);
    if text.is_empty() {
        return None;
    }
    parse_date(&text)
}

pub fn parse_date(raw: &str) -> Option<NaiveDate> {
    let trimmed = raw.trim();
    NaiveDate::parse_from_str(trimmed, "%Y-%m-%d")
        .ok()
        .or_else(|| {
            chrono::DateTime::parse_from_rfc3339(trimmed)
                .ok()
                .map(|value| value.date_naive())
        })
}

pub fn json_map(entries: &[(&str, Value)]) -> Map<String, Value> {
    let mut map = Map::new();
    for (key, value) in entries {
        map.insert((*key).to_string(), value.clone());
    }
    map
}
