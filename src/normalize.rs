//! snake_case → camelCase key normalization for API payloads.
//!
//! The Web API answers with snake_case keys (`progress_ms`, `external_urls`).
//! [`normalize`] rewrites every mapping key of a payload, at any depth, to
//! camelCase and returns a new value; the input is left untouched.
//!
//! ```rust,ignore
//! let raw = json!({ "progress_ms": 1200, "item": { "duration_ms": 2000 } });
//! let camel = normalize(&raw);
//! assert_eq!(camel["item"]["durationMs"], 2000);
//! ```

use serde_json::{Map, Value};

/// Returns a copy of `payload` with every mapping key camelCased.
///
/// Mappings nested in mappings are rewritten recursively, as are mappings
/// that appear as elements of a sequence. Every other element of a sequence
/// (scalars, nested sequences) is copied as is. A payload that is not a
/// mapping at the top level is returned unchanged.
pub fn normalize(payload: &Value) -> Value {
    match payload {
        Value::Object(map) => Value::Object(normalize_map(map)),
        other => other.clone(),
    }
}

fn normalize_map(map: &Map<String, Value>) -> Map<String, Value> {
    map.iter()
        .map(|(key, value)| (camel_case_key(key), normalize_value(value)))
        .collect()
}

fn normalize_value(value: &Value) -> Value {
    match value {
        Value::Object(map) => Value::Object(normalize_map(map)),
        Value::Array(items) => Value::Array(
            items
                .iter()
                .map(|item| match item {
                    Value::Object(map) => Value::Object(normalize_map(map)),
                    other => other.clone(),
                })
                .collect(),
        ),
        scalar => scalar.clone(),
    }
}

/// Converts a single snake_case key to camelCase.
///
/// Each run of underscores between two word characters is dropped and the
/// character after it upper-cased. Leading and trailing underscores are kept,
/// so `_id` and `next_` survive unchanged.
pub fn camel_case_key(key: &str) -> String {
    let body = key.trim_start_matches('_');
    let leading = &key[..key.len() - body.len()];

    let mut out = String::with_capacity(key.len());
    out.push_str(leading);

    let mut pending = 0usize;
    for chr in body.chars() {
        if chr == '_' {
            pending += 1;
            continue;
        }

        if pending > 0 {
            out.extend(chr.to_uppercase());
            pending = 0;
        } else {
            out.push(chr);
        }
    }

    // Underscores with nothing after them stay as they were.
    out.extend(std::iter::repeat_n('_', pending));
    out
}
