//! # Timestamps
//!
//! Conversion helpers for the `last_updated` field that drives
//! last-write-wins merging.
//!
//! ## Accepted Shapes
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  remote last_updated                        to_epoch(..)                │
//! │  ─────────────────────────────────────────  ───────────────────         │
//! │  absent / null                              0.0                         │
//! │  1718000000.5          (number)             1718000000.5                │
//! │  "1718000000.5"        (numeric string)     1718000000.5                │
//! │  "2024-06-10T06:13:20Z" (RFC 3339)          1718000000.0                │
//! │  "2024-06-10T07:13:20"  (naive, local)      local → epoch               │
//! │  "2024-06-10 07:13:20"  (naive, local)      local → epoch               │
//! │  anything else                              0.0                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! An unparseable timestamp is treated as "infinitely old", so it never
//! overwrites a local row that has a real timestamp.

use chrono::{DateTime, Local, NaiveDateTime, TimeZone, Utc};
use serde_json::Value;

/// Format used for migration log entries.
pub const LOG_TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

const NAIVE_FORMATS: [&str; 2] = ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f"];

/// Converts a remote `last_updated` value to epoch seconds.
pub fn to_epoch(value: Option<&Value>) -> f64 {
    match value {
        Some(Value::Number(n)) => n.as_f64().filter(|v| v.is_finite()).unwrap_or(0.0),
        Some(Value::String(s)) => str_to_epoch(s),
        _ => 0.0,
    }
}

/// Converts a string timestamp to epoch seconds, 0.0 when unparseable.
pub fn str_to_epoch(raw: &str) -> f64 {
    let raw = raw.trim();
    if raw.is_empty() {
        return 0.0;
    }

    if let Ok(v) = raw.parse::<f64>() {
        return if v.is_finite() { v } else { 0.0 };
    }

    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return datetime_to_epoch(&dt.with_timezone(&Utc));
    }

    for fmt in NAIVE_FORMATS {
        if let Ok(naive) = NaiveDateTime::parse_from_str(raw, fmt) {
            // Naive timestamps were written in the writer's local time.
            return match Local.from_local_datetime(&naive).earliest() {
                Some(local) => datetime_to_epoch(&local.with_timezone(&Utc)),
                None => datetime_to_epoch(&naive.and_utc()),
            };
        }
    }

    0.0
}

fn datetime_to_epoch(dt: &DateTime<Utc>) -> f64 {
    dt.timestamp() as f64 + f64::from(dt.timestamp_subsec_micros()) / 1_000_000.0
}

/// Current time as epoch seconds with sub-second precision.
pub fn now_epoch() -> f64 {
    datetime_to_epoch(&Utc::now())
}

/// Current local time as ISO-8601 text, used for sale and transaction rows.
pub fn now_iso() -> String {
    Local::now().format("%Y-%m-%dT%H:%M:%S%.6f").to_string()
}

/// Current local time for migration log entries.
pub fn log_timestamp() -> String {
    Local::now().format(LOG_TIMESTAMP_FORMAT).to_string()
}

// =============================================================================
// Unit Tests
// =============================================================================
