//! Property observations: the characteristics being assessed.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A property observation: field name → value.
///
/// Values are scalars, the domain's string booleans (`"True"` / `"False"`,
/// deliberately distinct from native booleans), or ordered sequences of
/// nested mappings such as a vegetation list. No conformance check happens
/// here; fields a rule references but the observation omits resolve to null
/// during evaluation.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(transparent)]
pub struct Observation(pub serde_json::Map<String, Value>);

impl Observation {
    pub fn new() -> Self {
        Self(serde_json::Map::new())
    }

    /// Look up a top-level field.
    pub fn get(&self, field: &str) -> Option<&Value> {
        self.0.get(field)
    }
}

impl From<serde_json::Map<String, Value>> for Observation {
    fn from(fields: serde_json::Map<String, Value>) -> Self {
        Self(fields)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn deserializes_from_plain_json_object() {
        let obs: Observation = serde_json::from_value(json!({
            "roof_type": "Class B",
            "vegetation": [{"Type": "Tree", "distance_to_window": 40}]
        }))
        .unwrap();
        assert_eq!(obs.get("roof_type"), Some(&json!("Class B")));
        assert!(obs.get("attic_vent_has_screens").is_none());
    }

    #[test]
    fn string_booleans_stay_strings() {
        let obs: Observation =
            serde_json::from_value(json!({"attic_vent_has_screens": "False"})).unwrap();
        assert_eq!(obs.get("attic_vent_has_screens"), Some(&json!("False")));
    }
}
