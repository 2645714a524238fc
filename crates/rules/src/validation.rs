//! Rule validation with structured errors and suggestions.
//!
//! Validates a [`Rule`] record beyond what deserialization enforces: the
//! date-window invariant, the logic tree's structure, and the consistency
//! between the logic's `params.` references and the rule's actual params.
//! Returns a [`ValidationResult`] with errors (block save) and warnings
//! (advisory).

use serde::{Deserialize, Serialize};
use serde_json::Value;

use firebreak_core::Rule;

use crate::evaluator::EvalError;
use crate::expr::{Expr, KNOWN_KEYS};
use crate::resolver;

// ── Result types ────────────────────────────────────────────────────

/// Overall validation outcome.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ValidationResult {
    pub valid: bool,
    pub errors: Vec<ValidationError>,
    pub warnings: Vec<ValidationWarning>,
}

/// A blocking validation error.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ValidationError {
    /// JSON-path-like location, e.g. `"logic"` or `"retired_date"`.
    pub path: String,
    pub message: String,
    /// Optional "Did you mean …?" suggestion.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub suggestion: Option<String>,
}

/// A non-blocking advisory warning.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ValidationWarning {
    pub path: String,
    pub message: String,
}

impl ValidationResult {
    fn new() -> Self {
        Self {
            valid: true,
            errors: Vec::new(),
            warnings: Vec::new(),
        }
    }

    fn error(&mut self, path: impl Into<String>, message: impl Into<String>) {
        self.valid = false;
        self.errors.push(ValidationError {
            path: path.into(),
            message: message.into(),
            suggestion: None,
        });
    }

    fn error_with_suggestion(
        &mut self,
        path: impl Into<String>,
        message: impl Into<String>,
        suggestion: impl Into<String>,
    ) {
        self.valid = false;
        self.errors.push(ValidationError {
            path: path.into(),
            message: message.into(),
            suggestion: Some(suggestion.into()),
        });
    }

    fn warn(&mut self, path: impl Into<String>, message: impl Into<String>) {
        self.warnings.push(ValidationWarning {
            path: path.into(),
            message: message.into(),
        });
    }
}

// ── Public API ──────────────────────────────────────────────────────

/// Validate a parsed [`Rule`].
pub fn validate_rule(rule: &Rule) -> ValidationResult {
    let mut result = ValidationResult::new();
    validate_record(rule, &mut result);
    validate_logic(rule, &mut result);
    validate_advisories(rule, &mut result);
    result
}

// ── 1. Record-level checks ──────────────────────────────────────────

fn validate_record(rule: &Rule, result: &mut ValidationResult) {
    if rule.name.trim().is_empty() {
        result.error("name", "rule name must not be empty");
    }

    if let Some(retired) = rule.retired_date {
        if retired <= rule.effective_date {
            result.error(
                "retired_date",
                format!(
                    "retired_date ({}) must be after effective_date ({})",
                    retired, rule.effective_date
                ),
            );
        }
    }
}

// ── 2. Logic checks ─────────────────────────────────────────────────

fn validate_logic(rule: &Rule, result: &mut ValidationResult) {
    let expr = match Expr::parse(&rule.logic) {
        Ok(expr) => expr,
        Err(EvalError::UnknownOperator { operator }) => {
            match fuzzy_match(&operator, KNOWN_KEYS) {
                Some(candidate) => result.error_with_suggestion(
                    "logic",
                    format!("unknown operator '{}'", operator),
                    format!("did you mean '{}'?", candidate),
                ),
                None => result.error("logic", format!("unknown operator '{}'", operator)),
            }
            return;
        }
        Err(e) => {
            result.error("logic", e.to_string());
            return;
        }
    };

    // Every `params.` reference should point at an actual params entry;
    // a dangling one silently evaluates to null, which usually means a typo.
    let mut paths = Vec::new();
    collect_param_paths(&expr, &mut paths);
    for path in paths {
        let key = path.trim_start_matches("params.");
        if resolver::resolve_in(&rule.params, key).is_none() {
            result.warn(
                "logic",
                format!("'{}' does not match any entry in params", path),
            );
        }
    }
}

fn collect_param_paths(expr: &Expr, acc: &mut Vec<String>) {
    match expr {
        Expr::Literal(_) => {}
        Expr::Var { path, .. } => {
            if path.starts_with("params.") {
                acc.push(path.clone());
            }
        }
        Expr::Op { args, .. } => {
            for arg in args {
                collect_param_paths(arg, acc);
            }
        }
    }
}

// ── 3. Advisory checks ──────────────────────────────────────────────

fn validate_advisories(rule: &Rule, result: &mut ValidationResult) {
    if rule.explanation.trim().is_empty() {
        result.warn("explanation", "explanation is empty");
    }
    if rule.mitigations.full.is_empty() {
        result.warn("mitigations.full", "no permanent remediation listed");
    }
    if matches!(&rule.logic, Value::Bool(_) | Value::Null) {
        result.warn("logic", "logic is a constant; the rule can never discriminate");
    }
}

// ── Fuzzy matching ──────────────────────────────────────────────────

/// Find the closest match using Levenshtein distance. Returns None if the
/// best distance exceeds half the longer string (too dissimilar).
fn fuzzy_match<'a>(input: &str, candidates: &[&'a str]) -> Option<&'a str> {
    let input_lower = input.to_lowercase();
    let mut best: Option<(&str, usize)> = None;

    for &candidate in candidates {
        let dist = levenshtein(&input_lower, &candidate.to_lowercase());
        match best {
            None => best = Some((candidate, dist)),
            Some((_, best_dist)) if dist < best_dist => best = Some((candidate, dist)),
            _ => {}
        }
    }

    best.and_then(|(name, dist)| {
        let max_len = input.len().max(name.len());
        if dist <= max_len / 2 {
            Some(name)
        } else {
            None
        }
    })
}

/// Levenshtein edit distance between two strings.
fn levenshtein(a: &str, b: &str) -> usize {
    let a: Vec<char> = a.chars().collect();
    let b: Vec<char> = b.chars().collect();
    let m = a.len();
    let n = b.len();

    let mut prev = (0..=n).collect::<Vec<_>>();
    let mut curr = vec![0; n + 1];

    for i in 1..=m {
        curr[0] = i;
        for j in 1..=n {
            let cost = if a[i - 1] == b[j - 1] { 0 } else { 1 };
            curr[j] = (prev[j] + 1)
                .min(curr[j - 1] + 1)
                .min(prev[j - 1] + cost);
        }
        std::mem::swap(&mut prev, &mut curr);
    }

    prev[n]
}
