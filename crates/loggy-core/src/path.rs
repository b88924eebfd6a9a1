//! Dotted/bracket JSON path resolution.
//!
//! Paths look like `events[0].properties.name` or `batch`. Each step is
//! either a object-key segment or a `[N]` array index, in any mix. A
//! step that misses returns `None` rather than raising, so callers can
//! fall back to the next probe in a list.

use serde_json::Value;

/// Resolve a dotted/bracket path against a JSON value.
///
/// Returns `None` if any step in the path does not resolve - a missing
/// key, an out-of-range index, or indexing into a non-container.
pub fn resolve<'a>(value: &'a Value, path: &str) -> Option<&'a Value> {
    let mut current = value;
    for step in parse_steps(path) {
        current = match step {
            Step::Key(key) => current.as_object()?.get(key)?,
            Step::Index(i) => current.as_array()?.get(i)?,
        };
    }
    Some(current)
}

enum Step<'a> {
    Key(&'a str),
    Index(usize),
}

/// Split `a.b[0].c` into `[Key("a"), Key("b"), Index(0), Key("c")]`.
fn parse_steps(path: &str) -> Vec<Step<'_>> {
    let mut steps = Vec::new();
    for dotted in path.split('.') {
        if dotted.is_empty() {
            continue;
        }
        let mut rest = dotted;
        // A segment may be `name`, `name[0]`, `name[0][1]`, or bare `[0]`.
        if let Some(bracket_start) = rest.find('[') {
            let key = &rest[..bracket_start];
            if !key.is_empty() {
                steps.push(Step::Key(key));
            }
            rest = &rest[bracket_start..];
            while let Some(stripped) = rest.strip_prefix('[') {
                if let Some(end) = stripped.find(']') {
                    if let Ok(index) = stripped[..end].parse::<usize>() {
                        steps.push(Step::Index(index));
                    }
                    rest = &stripped[end + 1..];
                } else {
                    break;
                }
            }
        } else {
            steps.push(Step::Key(rest));
        }
    }
    steps
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn resolves_array_index_then_key() {
        let payload = json!({"events": [{"name": "x"}]});
        assert_eq!(resolve(&payload, "events[0].name").unwrap(), "x");
    }

    #[test]
    fn resolves_plain_key() {
        let payload = json!({"batch": [1, 2, 3]});
        assert_eq!(resolve(&payload, "batch").unwrap(), &json!([1, 2, 3]));
    }

    #[test]
    fn missing_intermediate_returns_none() {
        let payload = json!({"events": []});
        assert!(resolve(&payload, "events[0].name").is_none());
    }

    #[test]
    fn missing_key_returns_none() {
        let payload = json!({"a": {"b": 1}});
        assert!(resolve(&payload, "a.c").is_none());
    }

    #[test]
    fn indexing_into_non_array_returns_none() {
        let payload = json!({"a": 5});
        assert!(resolve(&payload, "a[0]").is_none());
    }

    #[test]
    fn empty_path_returns_root() {
        let payload = json!({"a": 1});
        assert_eq!(resolve(&payload, "").unwrap(), &payload);
    }
}
