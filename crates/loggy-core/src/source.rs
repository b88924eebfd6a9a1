//! Analytics source rule - the declarative matcher for a vendor's endpoints.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// One of the four well-known roles a field mapping can fill.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct FieldMappings {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub event_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub property_container: Option<String>,
}

/// Monotonic capture stats tracked per source.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct SourceStats {
    pub capture_count: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_captured_at: Option<DateTime<Utc>>,
}

impl SourceStats {
    pub fn record_capture(&mut self, at: DateTime<Utc>) {
        self.capture_count += 1;
        self.last_captured_at = Some(at);
    }
}

/// A declarative matcher for a family of analytics endpoints.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Source {
    pub id: String,
    pub name: String,
    #[serde(default = "default_true")]
    pub enabled: bool,
    /// Registrable base domain, lowercase.
    pub domain: String,
    /// Optional path glob; `*` matches one segment, `**` any.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub url_pattern: Option<String>,
    #[serde(default)]
    pub field_mappings: FieldMappings,
    /// Legacy synonym for `field_mappings.event_name`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub event_name_path: Option<String>,
    /// Legacy synonym for the batch container path.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub batch_path: Option<String>,
    #[serde(default)]
    pub stats: SourceStats,
    #[serde(default = "Utc::now")]
    pub created_at: DateTime<Utc>,
}

fn default_true() -> bool {
    true
}

impl Source {
    /// Resolve the effective event-name path, preferring the new-style
    /// mapping over the legacy alias.
    pub fn event_name_path(&self) -> Option<&str> {
        self.field_mappings
            .event_name
            .as_deref()
            .or(self.event_name_path.as_deref())
    }

    /// Resolve the effective batch-container path.
    pub fn batch_path(&self) -> Option<&str> {
        self.batch_path.as_deref()
    }
}

/// A domain that looked like analytics traffic but matched no source.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UnmatchedDomain {
    pub domain: String,
    pub example_url: String,
    pub last_payload: serde_json::Value,
    pub count: u64,
    pub first_seen: DateTime<Utc>,
    pub last_seen: DateTime<Utc>,
}

/// Map of base-domain to unmatched-domain entry, as returned by the
/// control API.
pub type UnmatchedDomains = HashMap<String, UnmatchedDomain>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn legacy_event_name_path_is_fallback() {
        let source = Source {
            id: "s1".into(),
            name: "Test".into(),
            enabled: true,
            domain: "example.com".into(),
            url_pattern: None,
            field_mappings: FieldMappings::default(),
            event_name_path: Some("en".into()),
            batch_path: None,
            stats: SourceStats::default(),
            created_at: Utc::now(),
        };
        assert_eq!(source.event_name_path(), Some("en"));
    }

    #[test]
    fn new_style_mapping_wins_over_legacy() {
        let mut source = Source {
            id: "s1".into(),
            name: "Test".into(),
            enabled: true,
            domain: "example.com".into(),
            url_pattern: None,
            field_mappings: FieldMappings::default(),
            event_name_path: Some("legacy".into()),
            batch_path: None,
            stats: SourceStats::default(),
            created_at: Utc::now(),
        };
        source.field_mappings.event_name = Some("events[0].name".into());
        assert_eq!(source.event_name_path(), Some("events[0].name"));
    }
}
