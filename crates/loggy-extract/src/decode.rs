//! Step 1 of the extractor pipeline: turn raw bytes into a JSON value.
//!
//! Tries JSON first, then `application/x-www-form-urlencoded` - a
//! mapping from string to string-or-list, since form bodies may repeat
//! a key (`tag=a&tag=b`). Both failing yields `None`, never an error:
//! callers treat a decode miss as "no events", never an error.

use serde_json::{Map, Value};

/// Decode a request body into structured JSON, trying JSON then form
/// encoding. Returns `None` if neither scheme can make sense of the
/// bytes.
pub fn decode_body(bytes: &[u8]) -> Option<Value> {
    if let Ok(value) = serde_json::from_slice::<Value>(bytes) {
        return Some(value);
    }
    decode_form(bytes)
}

fn decode_form(bytes: &[u8]) -> Option<Value> {
    let text = std::str::from_utf8(bytes).ok()?;
    if text.is_empty() || !looks_like_form(text) {
        return None;
    }
    let pairs: Vec<(String, String)> = serde_urlencoded::from_bytes(bytes).ok()?;
    if pairs.is_empty() {
        return None;
    }

    let mut map = Map::new();
    for (key, value) in pairs {
        match map.get_mut(&key) {
            None => {
                map.insert(key, Value::String(value));
            }
            Some(Value::Array(existing)) => existing.push(Value::String(value)),
            Some(existing) => {
                let prior = existing.clone();
                map.insert(key, Value::Array(vec![prior, Value::String(value)]));
            }
        }
    }
    Some(Value::Object(map))
}

/// A crude shape check so binary garbage and bare numbers don't get
/// accepted as a one-key form body.
fn looks_like_form(text: &str) -> bool {
    text.contains('=') && text.chars().all(|c| !c.is_control() || c == '\t')
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn decodes_json_body() {
        let body = br#"{"event":"Login"}"#;
        assert_eq!(decode_body(body).unwrap(), json!({"event": "Login"}));
    }

    #[test]
    fn decodes_form_body() {
        let body = b"event=Signup&userId=u2";
        let decoded = decode_body(body).unwrap();
        assert_eq!(decoded["event"], "Signup");
        assert_eq!(decoded["userId"], "u2");
    }

    #[test]
    fn repeated_form_key_becomes_array() {
        let body = b"tag=a&tag=b";
        let decoded = decode_body(body).unwrap();
        assert_eq!(decoded["tag"], json!(["a", "b"]));
    }

    #[test]
    fn garbage_bytes_decode_to_none() {
        assert!(decode_body(&[0xff, 0xfe, 0x00, 0x01]).is_none());
    }

    #[test]
    fn empty_body_decodes_to_none() {
        assert!(decode_body(b"").is_none());
    }
}
