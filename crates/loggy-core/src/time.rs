//! Timestamp probing and normalization for extracted events.

use chrono::{DateTime, TimeZone, Utc};
use serde_json::Value;

/// Threshold below which a numeric timestamp is treated as Unix
/// seconds rather than milliseconds.
const SECONDS_MILLIS_THRESHOLD: i64 = 10_000_000_000;

/// Normalize a JSON value found at one of the timestamp probe keys
/// into a UTC timestamp. Returns `None` if the value can't be
/// interpreted, so the caller can substitute "now".
pub fn normalize(value: &Value) -> Option<DateTime<Utc>> {
    match value {
        Value::String(s) => parse_string(s),
        Value::Number(n) => {
            if let Some(i) = n.as_i64() {
                Some(from_epoch(i))
            } else {
                n.as_f64().map(|f| from_epoch(f as i64))
            }
        }
        _ => None,
    }
}

fn from_epoch(n: i64) -> DateTime<Utc> {
    if n.abs() < SECONDS_MILLIS_THRESHOLD {
        Utc.timestamp_opt(n, 0).single().unwrap_or_else(Utc::now)
    } else {
        Utc.timestamp_millis_opt(n).single().unwrap_or_else(Utc::now)
    }
}

fn parse_string(s: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .ok()
        .or_else(|| {
            DateTime::parse_from_rfc2822(s)
                .map(|dt| dt.with_timezone(&Utc))
                .ok()
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn unix_seconds_and_millis_agree() {
        let seconds = normalize(&json!(1_700_000_000)).unwrap();
        let millis = normalize(&json!(1_700_000_000_i64 * 1000)).unwrap();
        assert_eq!(seconds, millis);
    }

    #[test]
    fn iso8601_string_passes_through() {
        let dt = normalize(&json!("2024-01-01T00:00:00Z")).unwrap();
        assert_eq!(dt.to_rfc3339(), "2024-01-01T00:00:00+00:00");
    }

    #[test]
    fn unparsable_value_is_none() {
        assert!(normalize(&json!("not a date")).is_none());
        assert!(normalize(&json!(true)).is_none());
        assert!(normalize(&json!(null)).is_none());
    }
}
