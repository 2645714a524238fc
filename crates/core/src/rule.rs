//! Rule records: versioned wildfire-safety checks with logic trees and
//! named parameters.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A versioned wildfire-safety rule.
///
/// `logic` is a JSON-Logic style expression tree evaluated against an
/// observation; `params` are the rule's own named values, addressable from
/// the logic via `params.`-prefixed paths. Rules are immutable records:
/// retiring one is final, and a changed check ships as a new version with a
/// fresh `effective_date`. Whether a rule is active is always derived from
/// the dates (see [`Rule::is_active_at`]), never stored as a flag.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct Rule {
    /// Unique within a version lineage; versions of the same check share it.
    pub name: String,
    #[serde(default)]
    pub category: Option<String>,
    /// Loose expression tree; see `firebreak-rules` for operator semantics.
    pub logic: Value,
    /// Named parameter values: scalars, sequences, or nested mappings
    /// (e.g. a cost table keyed by window type). Key order is preserved.
    #[serde(default)]
    pub params: serde_json::Map<String, Value>,
    /// Human-readable explanation template. Rendering happens downstream;
    /// this crate only carries the raw string.
    pub explanation: String,
    #[serde(default)]
    pub mitigations: Mitigations,
    /// Inclusive lower bound of the active window.
    pub effective_date: DateTime<Utc>,
    /// Exclusive upper bound; `None` means the rule never retires.
    #[serde(default)]
    pub retired_date: Option<DateTime<Utc>>,
}

impl Rule {
    /// Whether this rule is active at `ts`:
    /// `effective_date <= ts < retired_date` (unbounded when never retired).
    pub fn is_active_at(&self, ts: DateTime<Utc>) -> bool {
        self.effective_date <= ts && self.retired_date.map(|r| ts < r).unwrap_or(true)
    }
}

/// Remedies attached to a rule.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct Mitigations {
    /// Permanent remedies, in recommended order.
    #[serde(default)]
    pub full: Vec<String>,
    /// Interim remedies that bridge the gap until a full fix is in place.
    #[serde(default)]
    pub bridge: Vec<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn rule_with_window(
        effective: DateTime<Utc>,
        retired: Option<DateTime<Utc>>,
    ) -> Rule {
        Rule {
            name: "test".to_string(),
            category: None,
            logic: Value::Bool(true),
            params: serde_json::Map::new(),
            explanation: String::new(),
            mitigations: Mitigations::default(),
            effective_date: effective,
            retired_date: retired,
        }
    }

    #[test]
    fn active_window_is_inclusive_exclusive() {
        let effective = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        let retired = Utc.with_ymd_and_hms(2025, 1, 1, 0, 0, 0).unwrap();
        let rule = rule_with_window(effective, Some(retired));

        assert!(rule.is_active_at(effective), "effective_date is inclusive");
        assert!(rule.is_active_at(Utc.with_ymd_and_hms(2024, 6, 1, 0, 0, 0).unwrap()));
        assert!(!rule.is_active_at(retired), "retired_date is exclusive");
        assert!(!rule.is_active_at(Utc.with_ymd_and_hms(2023, 12, 31, 23, 59, 59).unwrap()));
    }

    #[test]
    fn unretired_rule_stays_active() {
        let effective = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        let rule = rule_with_window(effective, None);
        assert!(rule.is_active_at(Utc.with_ymd_and_hms(2099, 1, 1, 0, 0, 0).unwrap()));
    }

    #[test]
    fn deserializes_from_json_with_defaults() {
        let rule: Rule = serde_json::from_str(
            r#"{
                "name": "Ember-vulnerable vents",
                "logic": {"==": [{"var": "attic_vent_has_screens"}, "False"]},
                "explanation": "Unscreened vents admit embers.",
                "effective_date": "2024-01-01T00:00:00Z"
            }"#,
        )
        .unwrap();
        assert_eq!(rule.name, "Ember-vulnerable vents");
        assert!(rule.category.is_none());
        assert!(rule.params.is_empty());
        assert!(rule.mitigations.full.is_empty());
        assert!(rule.retired_date.is_none());
    }

    #[test]
    fn params_preserve_key_order() {
        let rule: Rule = serde_json::from_str(
            r#"{
                "name": "Window heat exposure",
                "logic": true,
                "params": {"window_mult": {"Single": 3, "Double": 2, "Tempered Glass": 1}},
                "explanation": "",
                "effective_date": "2024-01-01T00:00:00Z"
            }"#,
        )
        .unwrap();
        let table = rule.params["window_mult"].as_object().unwrap();
        let keys: Vec<&str> = table.keys().map(|k| k.as_str()).collect();
        assert_eq!(keys, vec!["Single", "Double", "Tempered Glass"]);
    }
}
