//! Content-addressed cache keys.
//!
//! A request is reduced to a canonical JSON form before hashing:
//! - object members whose value is `null` or the empty string are dropped
//! - object keys are emitted in sorted order
//! - array order is preserved
//!
//! The canonical bytes are hashed with SHA-256 and hex encoded, so two
//! requests with the same semantic content always map to the same key.

use serde::Serialize;
use serde_json::Value;
use sha2::{Digest, Sha256};

use crate::error::CacheError;

/// Length of a hex-encoded cache key.
pub const KEY_LEN: usize = 64;

/// Hashes canonical bytes into a lowercase hex SHA-256 digest.
///
/// Pure function: every call starts from a fresh hasher.
pub fn digest(canonical: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(canonical);
    hex::encode(hasher.finalize())
}

/// Recursively strips empty members from objects.
///
/// Array elements are kept even when empty so positional meaning survives.
pub fn canonicalize(value: &Value) -> Value {
    match value {
        Value::Object(map) => Value::Object(
            map.iter()
                .filter(|(_, v)| !is_empty_member(v))
                .map(|(k, v)| (k.clone(), canonicalize(v)))
                .collect(),
        ),
        Value::Array(items) => Value::Array(items.iter().map(canonicalize).collect()),
        other => other.clone(),
    }
}

fn is_empty_member(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::String(s) => s.is_empty(),
        _ => false,
    }
}

/// Serializes a value with object keys in sorted order.
pub fn to_canonical_string(value: &Value) -> String {
    let mut out = String::new();
    write_canonical(value, &mut out);
    out
}

fn write_canonical(value: &Value, out: &mut String) {
    match value {
        Value::Object(map) => {
            let mut entries: Vec<(&String, &Value)> = map.iter().collect();
            entries.sort_by(|a, b| a.0.cmp(b.0));
            out.push('{');
            for (i, (k, v)) in entries.into_iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                out.push_str(&Value::String(k.clone()).to_string());
                out.push(':');
                write_canonical(v, out);
            }
            out.push('}');
        }
        Value::Array(items) => {
            out.push('[');
            for (i, item) in items.iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                write_canonical(item, out);
            }
            out.push(']');
        }
        scalar => out.push_str(&scalar.to_string()),
    }
}

/// Derives the cache key for any serializable request description.
pub fn cache_key<T: Serialize + ?Sized>(request: &T) -> Result<String, CacheError> {
    let value = serde_json::to_value(request)?;
    let canonical = to_canonical_string(&canonicalize(&value));
    Ok(digest(canonical.as_bytes()))
}
