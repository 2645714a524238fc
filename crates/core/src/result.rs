//! Evaluation outcomes: matched rules and their remediation payloads.

use serde::{Deserialize, Serialize};

use crate::rule::{Mitigations, Rule};

/// Outcome of evaluating one observation against a rule set.
///
/// Constructed fresh per evaluation call; never persisted.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct EvaluationResult {
    /// Count of rules that evaluated truthy.
    pub matched: usize,
    /// One entry per matched rule, preserving input rule order.
    pub vulnerabilities: Vec<Vulnerability>,
}

/// A rule that matched an observation.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Vulnerability {
    pub name: String,
    #[serde(default)]
    pub category: Option<String>,
    /// Raw explanation template; rendering is a downstream concern.
    pub explanation: String,
    #[serde(default)]
    pub mitigations: Mitigations,
}

impl Vulnerability {
    /// Build the vulnerability payload for a matched rule.
    pub fn from_rule(rule: &Rule) -> Self {
        Self {
            name: rule.name.clone(),
            category: rule.category.clone(),
            explanation: rule.explanation.clone(),
            mitigations: rule.mitigations.clone(),
        }
    }
}

/// Outcome of a single-rule authoring check.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct RuleTestResult {
    pub hit: bool,
}
