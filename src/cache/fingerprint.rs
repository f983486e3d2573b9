//! Content-addressed cache keys

use crate::plugin::ResourceDescriptor;
use serde_json::{json, Map, Value};
use sha2::{Digest, Sha256};

/// Lowercase hex SHA-256 of the canonical JSON of
/// `{operation, resources sorted by id, params}`.
///
/// Resource order and object key order do not affect the fingerprint.
pub fn fingerprint(operation: &str, resources: &[ResourceDescriptor], params: &Value) -> String {
    let mut sorted: Vec<&ResourceDescriptor> = resources.iter().collect();
    sorted.sort_by(|a, b| a.id.cmp(&b.id));

    let document = json!({
        "operation": operation,
        "resources": sorted,
        "params": params,
    });
    let canonical = canonicalize(&document).to_string();

    hex::encode(Sha256::digest(canonical.as_bytes()))
}

/// Rebuild `value` with every object's keys in sorted order.
fn canonicalize(value: &Value) -> Value {
    match value {
        Value::Object(map) => {
            let mut keys: Vec<&String> = map.keys().collect();
            keys.sort();
            let mut sorted = Map::new();
            for key in keys {
                sorted.insert(key.clone(), canonicalize(&map[key]));
            }
            Value::Object(sorted)
        }
        Value::Array(items) => Value::Array(items.iter().map(canonicalize).collect()),
        other => other.clone(),
    }
}
