//! The nine vendor sources the registry ships with by default.

use chrono::Utc;
use loggy_core::source::{FieldMappings, Source, SourceStats};

fn seed(
    id: &str,
    domain: &str,
    url_pattern: Option<&str>,
    event_name: Option<&str>,
    batch_path: Option<&str>,
) -> Source {
    Source {
        id: id.to_string(),
        name: id.to_string(),
        enabled: true,
        domain: domain.to_string(),
        url_pattern: url_pattern.map(str::to_string),
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

/// The built-in analytics vendor sources, shipped enabled by default.
pub fn seed_sources() -> Vec<Source> {
    vec![
        seed(
            "google-analytics",
            "google-analytics.com",
            Some("/*/collect*"),
            Some("en"),
            None,
        ),
        seed(
            "google-analytics-mp",
            "google-analytics.com",
            Some("/mp/collect*"),
            Some("events[0].name"),
            Some("events"),
        ),
        seed(
            "segment",
            "api.segment.io",
            Some("/v1/*"),
            None,
            Some("batch"),
        ),
        seed("amplitude", "api.amplitude.com", None, None, Some("events")),
        seed("mixpanel", "api.mixpanel.com", None, Some("event"), None),
        seed(
            "reddit-pixel",
            "alb.reddit.com",
            Some("/rp.gif*"),
            Some("event"),
            None,
        ),
        seed("heap", "heapanalytics.com", None, Some("a"), Some("b")),
        seed("posthog", "app.posthog.com", None, None, Some("batch")),
        seed("rudderstack", "rudderstack.com", None, None, Some("batch")),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn seed_list_has_nine_sources() {
        assert_eq!(seed_sources().len(), 9);
    }

    #[test]
    fn all_seed_sources_are_enabled() {
        assert!(seed_sources().iter().all(|s| s.enabled));
    }

    #[test]
    fn ga_measurement_protocol_has_event_array_batch_path() {
        let sources = seed_sources();
        let ga_mp = sources
            .iter()
            .find(|s| s.id == "google-analytics-mp")
            .unwrap();
        assert_eq!(ga_mp.batch_path(), Some("events"));
        assert_eq!(ga_mp.event_name_path(), Some("events[0].name"));
    }

    #[test]
    fn segment_has_batch_array() {
        let sources = seed_sources();
        let segment = sources.iter().find(|s| s.id == "segment").unwrap();
        assert_eq!(segment.batch_path(), Some("batch"));
    }
}
