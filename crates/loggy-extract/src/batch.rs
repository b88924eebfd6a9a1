//! Step 2 of the extractor pipeline: find the array of individual
//! events inside a decoded payload.

use loggy_core::path;
use loggy_core::source::Source;
use serde_json::Value;

/// Well-known batch-container keys, probed in order when a source has
/// no `batch_path` of its own.
const BATCH_KEYS: &[&str] = &["batch", "events", "data", "items", "records", "hits", "b"];

/// Locate the array of per-event objects in `payload`.
///
/// Precedence: the source's `batch_path` if it resolves to an array,
/// then the well-known batch keys in order, then the payload itself if
/// it is already an array. Failing all of those, the payload is
/// treated as a single event.
pub fn locate_batch<'a>(payload: &'a Value, source: &Source) -> Vec<&'a Value> {
    if let Some(batch_path) = source.batch_path() {
        if let Some(Value::Array(items)) = path::resolve(payload, batch_path) {
            return items.iter().collect();
        }
    }

    for key in BATCH_KEYS {
        if let Some(Value::Array(items)) = payload.get(*key) {
            return items.iter().collect();
        }
    }

    if let Value::Array(items) = payload {
        return items.iter().collect();
    }

    vec![payload]
}
