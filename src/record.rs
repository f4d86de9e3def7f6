// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Records: untyped field → value rows shared by both stores.
//!
//! A [`Record`] is a JSON object. The primary store holds the authoritative
//! row; the cache holds a serialized duplicate that is value-equal but has
//! no shared identity with it.
//!
//! Temporal attributes travel as RFC 3339 strings with millisecond precision
//! (`2024-05-01T10:00:00.000Z`). Comparisons normalise them to epoch
//! milliseconds first.

use chrono::{DateTime, NaiveDate, NaiveDateTime, SecondsFormat, TimeZone, Utc};
use serde_json::{Map, Value};
use std::cmp::Ordering;

/// One row / document.
pub type Record = Map<String, Value>;

/// Parse a timestamp string. Accepts RFC 3339, `YYYY-MM-DD HH:MM:SS[.fff]`
/// (read as UTC) and bare `YYYY-MM-DD`.
pub fn parse_timestamp(text: &str) -> Option<DateTime<Utc>> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(text) {
        return Some(dt.with_timezone(&Utc));
    }
    if let Ok(naive) = NaiveDateTime::parse_from_str(text, "%Y-%m-%d %H:%M:%S%.f") {
        return Some(Utc.from_utc_datetime(&naive));
    }
    NaiveDate::parse_from_str(text, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|naive| Utc.from_utc_datetime(&naive))
}

/// Temporal value (timestamp string or epoch millis) → epoch millis.
pub fn to_epoch_millis(value: &Value) -> Option<i64> {
    match value {
        Value::Number(n) => n.as_i64().or_else(|| n.as_f64().map(|f| f.round() as i64)),
        Value::String(s) => parse_timestamp(s).map(|dt| dt.timestamp_millis()),
        _ => None,
    }
}

/// Epoch millis → canonical RFC 3339 string value.
pub fn from_epoch_millis(millis: i64) -> Value {
    match Utc.timestamp_millis_opt(millis).single() {
        Some(dt) => Value::String(format_timestamp(&dt)),
        None => Value::Number(millis.into()),
    }
}

/// Canonical text form used for every date attribute.
pub fn format_timestamp(dt: &DateTime<Utc>) -> String {
    dt.to_rfc3339_opts(SecondsFormat::Millis, true)
}

/// A field counts as present only when it exists and is not null.
#[inline]
pub fn field<'a>(record: &'a Record, name: &str) -> Option<&'a Value> {
    record.get(name).filter(|v| !v.is_null())
}

/// Value equality where numbers compare by magnitude (`1 == 1.0`).
pub fn loose_eq(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::Number(x), Value::Number(y)) => match (x.as_f64(), y.as_f64()) {
            (Some(x), Some(y)) => x == y,
            _ => x == y,
        },
        (Value::Array(xs), Value::Array(ys)) => {
            xs.len() == ys.len() && xs.iter().zip(ys).all(|(x, y)| loose_eq(x, y))
        }
        (Value::Object(xs), Value::Object(ys)) => {
            xs.len() == ys.len()
                && xs.iter().all(|(k, x)| ys.get(k).is_some_and(|y| loose_eq(x, y)))
        }
        _ => a == b,
    }
}

/// Ordering for `$gt/$gte/$lt/$lte`. Numbers by magnitude, strings bytewise,
/// booleans `false < true`; a number against a timestamp string compares
/// against the string's epoch millis. Anything else is unordered.
pub fn compare_values(a: &Value, b: &Value) -> Option<Ordering> {
    match (a, b) {
        (Value::Number(x), Value::Number(y)) => x.as_f64()?.partial_cmp(&y.as_f64()?),
        (Value::String(x), Value::String(y)) => Some(x.as_bytes().cmp(y.as_bytes())),
        (Value::Bool(x), Value::Bool(y)) => Some(x.cmp(y)),
        (Value::Number(x), Value::String(s)) => {
            let y = parse_timestamp(s)?.timestamp_millis() as f64;
            x.as_f64()?.partial_cmp(&y)
        }
        (Value::String(s), Value::Number(y)) => {
            let x = parse_timestamp(s)?.timestamp_millis() as f64;
            x.partial_cmp(&y.as_f64()?)
        }
        _ => None,
    }
}

/// Compact JSON with object keys sorted at every depth, so value-equal
/// records always produce the same bytes.
///
/// Sorting comes from `serde_json::Map` being a `BTreeMap`; this breaks if
/// the `preserve_order` feature of serde_json is ever enabled.
pub fn canonical_json(value: &Value) -> String {
    value.to_string()
}

/// Keep only the requested attributes, plus every key `keep` accepts
/// (embedded relations).
pub fn project(record: &Record, attributes: &[String], keep: impl Fn(&str) -> bool) -> Record {
    record
        .iter()
        .filter(|(k, _)| attributes.iter().any(|a| a == *k) || keep(k))
        .map(|(k, v)| (k.clone(), v.clone()))
        .collect()
}
