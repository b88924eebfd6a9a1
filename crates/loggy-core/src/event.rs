//! Captured event - the normalized record produced by the extractor.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;

/// Metadata attached to every captured event, independent of payload
/// shape.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventMetadata {
    pub url: String,
    pub captured_at: DateTime<Utc>,
}

/// The normalized record produced by the event extractor and stored in
/// the ring buffer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CapturedEvent {
    /// Opaque, globally unique within one proxy run.
    pub id: String,
    /// ISO-8601 UTC.
    pub timestamp: DateTime<Utc>,
    /// `"unknown"` if extraction fails to find a name.
    pub event: String,
    #[serde(default)]
    pub properties: HashMap<String, Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub context: Option<HashMap<String, Value>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub anonymous_id: Option<String>,
    #[serde(rename = "type", default = "default_event_type")]
    pub event_type: String,
    pub source_id: String,
    pub source_name: String,
    /// Decoded, decompressed request body as structured JSON, or the
    /// raw string if unparsable.
    pub raw_payload: Value,
    pub metadata: EventMetadata,
}

fn default_event_type() -> String {
    "track".to_string()
}

impl CapturedEvent {
    /// Allocate a fresh id for a new event. Callers assemble the rest
    /// of the record from extraction results.
    pub fn new_id() -> String {
        ulid::Ulid::new().to_string()
    }
}

/// A bounded, FIFO ring buffer of captured events (not thread-safe on
/// its own - callers guard it with a mutex, see `loggy-control`).
#[derive(Debug)]
pub struct EventRingBuffer {
    capacity: usize,
    events: std::collections::VecDeque<CapturedEvent>,
}

impl EventRingBuffer {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            events: std::collections::VecDeque::with_capacity(capacity),
        }
    }

    /// Append an event, evicting the oldest one if at capacity.
    pub fn push(&mut self, event: CapturedEvent) {
        if self.events.len() >= self.capacity {
            self.events.pop_front();
        }
        self.events.push_back(event);
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    pub fn clear(&mut self) {
        self.events.clear();
    }

    /// Snapshot the current contents, oldest first.
    pub fn snapshot(&self) -> Vec<CapturedEvent> {
        self.events.iter().cloned().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_event(id: &str) -> CapturedEvent {
        CapturedEvent {
            id: id.to_string(),
            timestamp: Utc::now(),
            event: "Test".to_string(),
            properties: HashMap::new(),
            context: None,
            user_id: None,
            anonymous_id: None,
            event_type: default_event_type(),
            source_id: "s1".to_string(),
            source_name: "Source".to_string(),
            raw_payload: Value::Null,
            metadata: EventMetadata {
                url: "https://example.com".to_string(),
                captured_at: Utc::now(),
            },
        }
    }

    #[test]
    fn ring_buffer_caps_and_evicts_oldest() {
        let mut buf = EventRingBuffer::new(2);
        buf.push(sample_event("1"));
        buf.push(sample_event("2"));
        buf.push(sample_event("3"));
        assert_eq!(buf.len(), 2);
        let snapshot = buf.snapshot();
        assert_eq!(snapshot[0].id, "2");
        assert_eq!(snapshot[1].id, "3");
    }

    #[test]
    fn snapshot_length_matches_len() {
        let mut buf = EventRingBuffer::new(10);
        for i in 0..5 {
            buf.push(sample_event(&i.to_string()));
        }
        assert_eq!(buf.snapshot().len(), buf.len());
    }

    #[test]
    fn clear_empties_buffer() {
        let mut buf = EventRingBuffer::new(10);
        buf.push(sample_event("1"));
        buf.clear();
        assert!(buf.is_empty());
    }
}
