//! Event Extractor (C4): turns `(decompressed_bytes, source, url)` into
//! zero or more normalized captured events.
//!
//! Pipeline: [`decode::decode_body`] (JSON, then form-encoded) ->
//! [`batch::locate_batch`] (the source's `batch_path`, then well-known
//! batch keys, then "payload is already an array", then "treat the
//! whole payload as one event") -> [`fields`] per-event extraction ->
//! assembly into [`loggy_core::event::CapturedEvent`].
//!
//! Every step is infallible from the caller's perspective: a decode
//! miss, an empty batch, or a per-event extraction gap yields an empty
//! `Vec`, never an error. Request-inspection failures must not disturb
//! the proxied connection, so this crate has no public
//! function that returns `Result` - failures are logged at debug and
//! folded into "no events".

mod batch;
mod decode;
mod fields;

use chrono::Utc;
use loggy_core::event::{CapturedEvent, EventMetadata};
use loggy_core::source::Source;
use serde_json::Value;
use tracing::debug;

/// Decode and extract all captured events from one request body.
///
/// `url` is the full reconstructed request URL, recorded in each
/// event's `metadata.url`. Decode always tries JSON before form
/// encoding regardless of the declared content type, since proxied
/// clients are not always honest about it.
pub fn extract(bytes: &[u8], source: &Source, url: &str) -> Vec<CapturedEvent> {
    let Some(payload) = decode::decode_body(bytes) else {
        debug!(url, "body could not be parsed as JSON or form data");
        return Vec::new();
    };

    let batch = batch::locate_batch(&payload, source);
    if batch.is_empty() {
        debug!(url, "no events found in payload");
        return Vec::new();
    }

    let captured_at = Utc::now();
    batch
        .into_iter()
        .map(|event| assemble(event, &payload, source, url, captured_at))
        .collect()
}

fn assemble(
    event: &Value,
    outer: &Value,
    source: &Source,
    url: &str,
    captured_at: chrono::DateTime<Utc>,
) -> CapturedEvent {
    let (name, consumed_key) = fields::event_name(event, source);

    CapturedEvent {
        id: CapturedEvent::new_id(),
        timestamp: fields::timestamp(event),
        event: name,
        properties: fields::properties(event, source, consumed_key),
        context: fields::context(event, outer),
        user_id: fields::user_id(event, outer),
        anonymous_id: fields::anonymous_id(event, outer),
        event_type: "track".to_string(),
        source_id: source.id.clone(),
        source_name: source.name.clone(),
        raw_payload: outer.clone(),
        metadata: EventMetadata {
            url: url.to_string(),
            captured_at,
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use loggy_core::source::{FieldMappings, SourceStats};
    use serde_json::json;

    fn source(id: &str, event_name: Option<&str>, batch_path: Option<&str>) -> Source {
        Source {
            id: id.to_string(),
            name: id.to_string(),
            enabled: true,
            domain: "example.com".into(),
            url_pattern: None,
            field_mappings: FieldMappings {
                event_name: event_name.map(str::to_string),
                timestamp: None,
                user_id: None,
                property_container: None,
            },
            event_name_path: None,
            batch_path: batch_path.map(str::to_string),
            stats: SourceStats::default(),
            created_at: Utc::now(),
        }
    }

    #[test]
    fn segment_batch_produces_two_named_events_with_shared_user_id() {
        let body = br#"{"batch":[{"event":"Viewed","userId":"u1"},{"event":"Clicked","userId":"u1"}],"sentAt":"2024-01-01T00:00:00Z"}"#;
        let src = source("segment", None, Some("batch"));
        let events = extract(body, &src, "https://api.segment.io/v1/batch");

        assert_eq!(events.len(), 2);
        assert_eq!(events[0].event, "Viewed");
        assert_eq!(events[1].event, "Clicked");
        assert!(events.iter().all(|e| e.user_id.as_deref() == Some("u1")));
        assert!(events.iter().all(|e| e.source_id == "segment"));
    }

    #[test]
    fn ga_measurement_protocol_single_event_with_params() {
        let body = br#"{"client_id":"c","events":[{"name":"page_view","params":{"page":"/x"}}]}"#;
        let src = source("google-analytics-mp", Some("events[0].name"), Some("events"));
        let events = extract(
            body,
            &src,
            "https://www.google-analytics.com/mp/collect?measurement_id=G-1",
        );

        assert_eq!(events.len(), 1);
        assert_eq!(events[0].event, "page_view");
        assert_eq!(events[0].properties.get("page"), Some(&json!("/x")));
    }

    #[test]
    fn mixpanel_payload_extracts_one_event() {
        let body = br#"{"event":"Login","properties":{"ok":true}}"#;
        let src = source("mixpanel", Some("event"), None);
        let events = extract(body, &src, "https://api.mixpanel.com/track");

        assert_eq!(events.len(), 1);
        assert_eq!(events[0].event, "Login");
        assert_eq!(events[0].properties.get("ok"), Some(&json!(true)));
    }

    #[test]
    fn form_encoded_body_extracts_userid_and_event() {
        let body = b"event=Signup&userId=u2";
        let src = source("generic", None, None);
        let events = extract(body, &src, "https://example.com/collect");

        assert_eq!(events.len(), 1);
        assert_eq!(events[0].event, "Signup");
        assert_eq!(events[0].user_id.as_deref(), Some("u2"));
    }

    #[test]
    fn unparseable_body_yields_no_events() {
        let src = source("generic", None, None);
        let events = extract(&[0xff, 0xfe], &src, "https://example.com/collect");
        assert!(events.is_empty());
    }

    #[test]
    fn raw_payload_is_the_whole_decoded_body() {
        let body = br#"{"batch":[{"event":"A"}],"sentAt":"now"}"#;
        let src = source("segment", None, Some("batch"));
        let events = extract(body, &src, "https://api.segment.io/v1/batch");
        assert_eq!(events[0].raw_payload["sentAt"], json!("now"));
    }
}
