use std::collections::BTreeMap;

use serde_json::Value;

/// Recursively rewrites a JSON value so that every object's keys are sorted
/// alphabetically, giving two semantically identical values identical bytes
/// once serialized. Arrays keep their order; scalars pass through unchanged.
pub fn canonicalize(value: &Value) -> Value {
    match value {
        Value::Object(map) => {
            let sorted: BTreeMap<String, Value> = map
                .iter()
                .map(|(k, v)| (k.clone(), canonicalize(v)))
                .collect();
            let mut out = serde_json::Map::with_capacity(sorted.len());
            for (k, v) in sorted {
                out.insert(k, v);
            }
            Value::Object(out)
        }
        Value::Array(items) => Value::Array(items.iter().map(canonicalize).collect()),
        other => other.clone(),
    }
}

/// Serializes `value` to its canonical byte representation: sorted object
/// keys, compact (no whitespace) encoding.
pub fn canonical_bytes(value: &Value) -> Vec<u8> {
    serde_json::to_vec(&canonicalize(value)).expect("canonicalized JSON always serializes")
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn reordered_keys_produce_identical_bytes() {
        let a = json!({"b": 1, "a": 2, "c": {"z": 1, "y": 2}});
        let b = json!({"a": 2, "c": {"y": 2, "z": 1}, "b": 1});
        assert_eq!(canonical_bytes(&a), canonical_bytes(&b));
    }

    #[test]
    fn array_order_is_preserved() {
        let a = json!({"items": [3, 1, 2]});
        let b = json!({"items": [1, 2, 3]});
        assert_ne!(canonical_bytes(&a), canonical_bytes(&b));
    }
}
