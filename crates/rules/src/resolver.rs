//! Dotted-path resolution against observations and rule parameters.
//!
//! Paths address nested data: `vegetation.0.distance_to_window` walks into
//! the vegetation list, entry 0, then the distance field. Segments that
//! parse as non-negative integers index sequences; every other segment is a
//! mapping key. Missing data resolves to `None`, never an error: rules
//! routinely reference fields a given observation omits and expect a
//! non-match rather than a crash.

use serde_json::{Map, Value};

/// Resolve `path` against `root`. Returns `None` when any step is absent.
pub fn resolve<'a>(root: &'a Value, path: &str) -> Option<&'a Value> {
    let mut current = root;
    for segment in path.split('.') {
        current = step(current, segment)?;
    }
    Some(current)
}

/// Resolve `path` against a mapping root (an observation or a params map).
pub fn resolve_in<'a>(root: &'a Map<String, Value>, path: &str) -> Option<&'a Value> {
    match path.split_once('.') {
        Some((first, rest)) => resolve(root.get(first)?, rest),
        None => root.get(path),
    }
}

/// One path step: sequence index or mapping key lookup.
fn step<'a>(value: &'a Value, segment: &str) -> Option<&'a Value> {
    match value {
        Value::Array(items) => {
            let idx: usize = segment.parse().ok()?;
            items.get(idx)
        }
        Value::Object(map) => map.get(segment),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn vegetation() -> Value {
        json!({
            "vegetation": [
                {"Type": "Tree", "distance_to_window": 40}
            ]
        })
    }

    #[test]
    fn indexes_into_sequences() {
        let root = vegetation();
        assert_eq!(
            resolve(&root, "vegetation.0.distance_to_window"),
            Some(&json!(40))
        );
        assert_eq!(resolve(&root, "vegetation.0.Type"), Some(&json!("Tree")));
    }

    #[test]
    fn out_of_range_index_is_absent() {
        let root = vegetation();
        assert_eq!(resolve(&root, "vegetation.5.distance_to_window"), None);
    }

    #[test]
    fn missing_key_is_absent() {
        let root = vegetation();
        assert_eq!(resolve(&root, "roof_type"), None);
        assert_eq!(resolve(&root, "vegetation.0.height"), None);
    }

    #[test]
    fn non_integer_segment_on_sequence_is_absent() {
        let root = vegetation();
        assert_eq!(resolve(&root, "vegetation.first.Type"), None);
        assert_eq!(resolve(&root, "vegetation.-1.Type"), None);
    }

    #[test]
    fn descending_into_a_scalar_is_absent() {
        let root = json!({"roof_type": "Class B"});
        assert_eq!(resolve(&root, "roof_type.grade"), None);
    }

    #[test]
    fn numeric_segment_on_mapping_is_a_key_lookup() {
        let root = json!({"zones": {"0": "inner"}});
        assert_eq!(resolve(&root, "zones.0"), Some(&json!("inner")));
    }

    #[test]
    fn resolve_in_handles_single_and_nested_paths() {
        let root = vegetation();
        let map = root.as_object().unwrap();
        assert!(resolve_in(map, "vegetation").is_some());
        assert_eq!(
            resolve_in(map, "vegetation.0.distance_to_window"),
            Some(&json!(40))
        );
        assert_eq!(resolve_in(map, "missing.0"), None);
    }
}
