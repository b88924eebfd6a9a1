//! Step 3 of the extractor pipeline: pull the normalized fields out of
//! one event object.

use loggy_core::path;
use loggy_core::source::Source;
use loggy_core::time;
use serde_json::{Map, Value};
use std::collections::HashMap;

const EVENT_NAME_KEYS: &[&str] = &[
    "event",
    "eventName",
    "event_name",
    "name",
    "action",
    "code",
    "en",
    "e",
    "a",
    "type",
    "t",
];

const TIMESTAMP_KEYS: &[&str] = &[
    "timestamp",
    "time",
    "ts",
    "sentAt",
    "sent_at",
    "created_at",
    "client_ts",
    "client_timestamp",
];

const USER_ID_KEYS: &[&str] = &["userId", "user_id", "uid"];
const ANONYMOUS_ID_KEYS: &[&str] = &["anonymousId", "anonymous_id", "anonId"];

const PROPERTY_CONTAINER_KEYS: &[&str] = &[
    "properties",
    "props",
    "event_data",
    "data",
    "payload",
    "params",
    "attributes",
];

/// Probe `value` for the first key in `keys` that resolves to
/// something. Returns the matched key alongside its value so callers
/// can exclude it from a properties fallback.
fn probe<'a>(value: &'a Value, keys: &[&'static str]) -> Option<(&'static str, &'a Value)> {
    let object = value.as_object()?;
    keys.iter().find_map(|key| object.get(*key).map(|v| (*key, v)))
}

/// Event name: the source's mapping if set, else the probe list,
/// falling back to `"unknown"`.
pub fn event_name(event: &Value, source: &Source) -> (String, Option<&'static str>) {
    if let Some(mapping_path) = source.event_name_path() {
        if let Some(value) = path::resolve(event, mapping_path) {
            if let Some(name) = value_as_name(value) {
                return (name, None);
            }
        }
    }

    match probe(event, EVENT_NAME_KEYS) {
        Some((key, value)) => (
            value_as_name(value).unwrap_or_else(|| "unknown".to_string()),
            Some(key),
        ),
        None => ("unknown".to_string(), None),
    }
}

fn value_as_name(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

/// Timestamp: the probe list normalized via `loggy_core::time`,
/// falling back to "now" if absent or unparsable.
pub fn timestamp(event: &Value) -> chrono::DateTime<chrono::Utc> {
    TIMESTAMP_KEYS
        .iter()
        .find_map(|key| event.get(*key).and_then(time::normalize))
        .unwrap_or_else(chrono::Utc::now)
}

/// User/anonymous id: probe the event, falling back to the same keys
/// on the outer payload (covers batch items that omit identity fields
/// carried once at the top level, e.g. Segment's `sentAt`/`userId`
/// siblings to `batch`).
pub fn user_id(event: &Value, outer: &Value) -> Option<String> {
    probe(event, USER_ID_KEYS)
        .or_else(|| probe(outer, USER_ID_KEYS))
        .and_then(|(_, v)| value_as_name(v))
}

pub fn anonymous_id(event: &Value, outer: &Value) -> Option<String> {
    probe(event, ANONYMOUS_ID_KEYS)
        .or_else(|| probe(outer, ANONYMOUS_ID_KEYS))
        .and_then(|(_, v)| value_as_name(v))
}

/// Properties container: the source's `property_container` path if it
/// resolves to an object, else the probe list, else the event's own
/// keys minus the metadata keys already consumed elsewhere.
pub fn properties(
    event: &Value,
    source: &Source,
    consumed_event_name_key: Option<&str>,
) -> HashMap<String, Value> {
    if let Some(container_path) = &source.field_mappings.property_container {
        if let Some(Value::Object(map)) = path::resolve(event, container_path) {
            return map.clone().into_iter().collect();
        }
    }

    if let Some((_, Value::Object(map))) = probe(event, PROPERTY_CONTAINER_KEYS) {
        return map.clone().into_iter().collect();
    }

    let Some(object) = event.as_object() else {
        return HashMap::new();
    };

    let mut excluded: Vec<&str> = vec!["id", "context"];
    excluded.extend(TIMESTAMP_KEYS);
    excluded.extend(USER_ID_KEYS);
    excluded.extend(ANONYMOUS_ID_KEYS);
    if let Some(key) = consumed_event_name_key {
        excluded.push(key);
    }

    object
        .iter()
        .filter(|(k, _)| !excluded.contains(&k.as_str()))
        .map(|(k, v)| (k.clone(), v.clone()))
        .collect()
}

/// Context: the event's own `context` if present, else the outer
/// payload's.
pub fn context(event: &Value, outer: &Value) -> Option<HashMap<String, Value>> {
    context_of(event).or_else(|| context_of(outer))
}

fn context_of(value: &Value) -> Option<HashMap<String, Value>> {
    match value.get("context") {
        Some(Value::Object(map)) => Some(map.clone().into_iter().collect()),
        _ => None,
    }
}

#[allow(dead_code)]
fn as_map(value: &Value) -> Option<Map<String, Value>> {
    value.as_object().cloned()
}

#[cfg(test)]
mod tests {
    use super::*;
    use loggy_core::source::{FieldMappings, SourceStats};
    use serde_json::json;

    fn plain_source() -> Source {
        Source {
            id: "s".into(),
            name: "s".into(),
            enabled: true,
            domain: "example.com".into(),
            url_pattern: None,
            field_mappings: FieldMappings::default(),
            event_name_path: None,
            batch_path: None,
            stats: SourceStats::default(),
            created_at: chrono::Utc::now(),
        }
    }

    #[test]
    fn event_name_probes_in_order() {
        let event = json!({"action": "Clicked", "name": "ignored"});
        let source = plain_source();
        let (name, _) = event_name(&event, &source);
        assert_eq!(name, "Clicked");
    }

    #[test]
    fn event_name_falls_back_to_unknown() {
        let event = json!({"nothing_recognized": 1});
        let source = plain_source();
        assert_eq!(event_name(&event, &source).0, "unknown");
    }

    #[test]
    fn source_mapping_wins_over_probes() {
        let mut source = plain_source();
        source.field_mappings.event_name = Some("custom.nm".into());
        let event = json!({"custom": {"nm": "Mapped"}, "event": "ignored"});
        assert_eq!(event_name(&event, &source).0, "Mapped");
    }

    #[test]
    fn user_id_falls_back_to_outer_payload() {
        let outer = json!({"userId": "u1", "batch": []});
        let event = json!({"event": "Clicked"});
        assert_eq!(user_id(&event, &outer), Some("u1".to_string()));
    }

    #[test]
    fn properties_container_probe_used_when_no_mapping() {
        let event = json!({"event": "x", "properties": {"a": 1}});
        let source = plain_source();
        let props = properties(&event, &source, Some("event"));
        assert_eq!(props.get("a"), Some(&json!(1)));
    }

    #[test]
    fn properties_fall_back_to_remaining_keys() {
        let event = json!({"event": "x", "page": "/home", "timestamp": "now"});
        let source = plain_source();
        let props = properties(&event, &source, Some("event"));
        assert_eq!(props.get("page"), Some(&json!("/home")));
        assert!(!props.contains_key("event"));
        assert!(!props.contains_key("timestamp"));
    }

    #[test]
    fn properties_exclude_the_event_s_own_id() {
        let event = json!({"event": "x", "id": "msg_123", "page": "/home"});
        let source = plain_source();
        let props = properties(&event, &source, Some("event"));
        assert_eq!(props.get("page"), Some(&json!("/home")));
        assert!(!props.contains_key("id"));
    }

    #[test]
    fn context_falls_back_to_outer() {
        let outer = json!({"context": {"ip": "1.2.3.4"}});
        let event = json!({"event": "x"});
        let ctx = context(&event, &outer).unwrap();
        assert_eq!(ctx.get("ip"), Some(&json!("1.2.3.4")));
    }
}
