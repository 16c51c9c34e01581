// Tolerant decoding of device status payloads into telemetry records
use crate::domain::error::ParseError;
use crate::domain::telemetry::TelemetryRecord;
use chrono::{DateTime, Utc};
use serde_json::{Map, Value};
use std::collections::BTreeSet;

const MODE_KEYS: &[&str] = &["mode", "st"];
const UPTIME_KEYS: &[&str] = &["uptime_s", "uptime", "uptimeSeconds"];
const TEMPERATURE_KEYS: &[&str] = &["temp_c", "temperature_c", "temperature", "tmp1"];
/// Key and divisor to volts, in precedence order.
const VOLTAGE_KEYS: &[(&str, f64)] = &[("voltage_v", 1.0), ("vin_mv", 1000.0), ("voltage", 1.0)];
const CURRENT_KEYS: &[&str] = &["current_a", "current"];

pub const UNKNOWN_MODE: &str = "UNKNOWN";

/// A decoded record plus the non-fatal problems found while decoding it.
#[derive(Debug, Clone, PartialEq)]
pub struct ParsedStatus {
    pub record: TelemetryRecord,
    pub warnings: Vec<String>,
}

/// Decode a status payload.
///
/// Only a payload that is not a JSON object fails. Missing numeric fields
/// become `0`, mistyped ones become `0` plus a warning, and a malformed
/// fault list becomes an empty set plus a warning. The record is stamped
/// with `polled_at`, never with a device-supplied time.
pub fn parse_status(
    raw: Value,
    latency_ms: f64,
    polled_at: DateTime<Utc>,
) -> Result<ParsedStatus, ParseError> {
    let Value::Object(fields) = &raw else {
        return Err(ParseError(format!("expected a JSON object, got {}", kind_of(&raw))));
    };

    let mut warnings = Vec::new();

    let mode = match lookup(fields, MODE_KEYS) {
        Some((_, Value::String(s))) if !s.trim().is_empty() => s.trim().to_string(),
        Some((_, Value::Null)) | None => UNKNOWN_MODE.to_string(),
        Some((_, Value::String(_))) => UNKNOWN_MODE.to_string(),
        Some((_, other)) => other.to_string(),
    };

    let temperature = number_field(fields, TEMPERATURE_KEYS, &mut warnings);
    let voltage = match VOLTAGE_KEYS.iter().find(|(key, _)| fields.contains_key(*key)) {
        Some(&(key, divisor)) => number_field(fields, &[key], &mut warnings) / divisor,
        None => 0.0,
    };
    let current = number_field(fields, CURRENT_KEYS, &mut warnings);
    let uptime_seconds = uptime_field(fields, &mut warnings);
    let faults = fault_field(fields, &mut warnings);

    let record = TelemetryRecord {
        timestamp_utc: polled_at,
        mode,
        temperature,
        voltage,
        current,
        uptime_seconds,
        latency_ms: latency_ms.max(0.0),
        faults,
        raw,
    };

    Ok(ParsedStatus { record, warnings })
}

/// First present key wins, even when its value turns out to be unusable.
fn lookup<'a>(fields: &'a Map<String, Value>, keys: &[&'static str]) -> Option<(&'static str, &'a Value)> {
    keys.iter()
        .find_map(|key| fields.get(*key).map(|value| (*key, value)))
}

fn as_number(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    }
    .filter(|n| n.is_finite())
}

fn number_field(fields: &Map<String, Value>, keys: &[&'static str], warnings: &mut Vec<String>) -> f64 {
    match lookup(fields, keys) {
        None | Some((_, Value::Null)) => 0.0,
        Some((key, value)) => as_number(value).unwrap_or_else(|| {
            warnings.push(format!("field '{}' is not numeric: {}", key, value));
            0.0
        }),
    }
}

fn uptime_field(fields: &Map<String, Value>, warnings: &mut Vec<String>) -> u64 {
    match lookup(fields, UPTIME_KEYS) {
        None | Some((_, Value::Null)) => 0,
        Some((key, value)) => match as_number(value) {
            Some(n) if n >= 0.0 => n.trunc() as u64,
            Some(n) => {
                warnings.push(format!("field '{}' is negative: {}", key, n));
                0
            }
            None => {
                warnings.push(format!("field '{}' is not numeric: {}", key, value));
                0
            }
        },
    }
}

fn fault_field(fields: &Map<String, Value>, warnings: &mut Vec<String>) -> BTreeSet<String> {
    match fields.get("faults") {
        None | Some(Value::Null) => BTreeSet::new(),
        Some(Value::Array(items)) => {
            let mut faults = BTreeSet::new();
            let mut dropped = 0;
            for item in items {
                match item {
                    Value::String(code) if !code.trim().is_empty() => {
                        faults.insert(code.trim().to_string());
                    }
                    _ => dropped += 1,
                }
            }
            if dropped > 0 {
                warnings.push(format!("ignored {} non-string fault code(s)", dropped));
            }
            faults
        }
        Some(other) => {
            warnings.push(format!("field 'faults' is not a list: {}", other));
            BTreeSet::new()
        }
    }
}

fn kind_of(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}
