//! Expression evaluation and rule orchestration.
//!
//! The interpreter is pure: no I/O, no shared state, identical inputs always
//! yield identical outputs, so concurrent callers can share a rule snapshot
//! without locking. Missing observation data resolves to null and flows
//! through the operators as a non-match; structural defects in a rule's own
//! definition (unknown operator, malformed tree) abort the evaluation call
//! instead — a safety assessment must never silently degrade into a wrong
//! answer.

use serde_json::{Map, Value};
use thiserror::Error;

use firebreak_core::{EvaluationResult, Observation, Rule, RuleTestResult, Vulnerability};

use crate::expr::{Expr, Operator};
use crate::resolver;

// ── Errors ──────────────────────────────────────────────────────────

/// Fatal problems with a rule's own definition.
///
/// Missing observation data is never an error (it resolves to null), and
/// division by zero fails soft to null; only defects the rule author must
/// fix land here.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum EvalError {
    /// The logic tree uses an operator key the evaluator does not know.
    #[error("unknown operator '{operator}'")]
    UnknownOperator { operator: String },

    /// The logic tree is not a literal, a one-key operator object, or a
    /// `var` node, or an operator received an unusable argument list.
    #[error("malformed logic: {reason}")]
    MalformedRule { reason: String },

    /// A non-numeric operand reached an arithmetic operator.
    #[error("type mismatch: '{operator}' requires numeric operands, got {operand}")]
    TypeMismatch {
        operator: &'static str,
        operand: String,
    },
}

/// An evaluation failure tied to the rule that caused it.
#[derive(Debug, Clone, Error, PartialEq)]
#[error("rule '{rule}': {source}")]
pub struct EngineError {
    pub rule: String,
    #[source]
    pub source: EvalError,
}

// ── Value semantics ─────────────────────────────────────────────────

/// Falsy values: null, false, 0, the empty string, the empty sequence.
/// Everything else, including the string `"False"`, is truthy.
pub fn is_truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().map(|f| f != 0.0).unwrap_or(true),
        Value::String(s) => !s.is_empty(),
        Value::Array(items) => !items.is_empty(),
        Value::Object(_) => true,
    }
}

/// Domain equality: numbers compare numerically across integer and float
/// representations; strings (the `"True"`/`"False"` booleans included)
/// compare as plain strings; no cross-type coercion.
pub fn values_equal(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::Number(x), Value::Number(y)) => match (x.as_f64(), y.as_f64()) {
            (Some(x), Some(y)) => x == y,
            _ => x == y,
        },
        (Value::Array(xs), Value::Array(ys)) => {
            xs.len() == ys.len() && xs.iter().zip(ys).all(|(x, y)| values_equal(x, y))
        }
        (Value::Object(xs), Value::Object(ys)) => {
            xs.len() == ys.len()
                && xs
                    .iter()
                    .all(|(k, v)| ys.get(k).map(|w| values_equal(v, w)).unwrap_or(false))
        }
        _ => a == b,
    }
}

// ── Expression evaluation ───────────────────────────────────────────

const PARAMS_PREFIX: &str = "params.";

/// Evaluate a loose logic tree against an observation and the rule's params.
pub fn evaluate(
    logic: &Value,
    observation: &Observation,
    params: &Map<String, Value>,
) -> Result<Value, EvalError> {
    let expr = Expr::parse(logic)?;
    evaluate_expr(&expr, observation, params)
}

/// Evaluate an already-parsed expression.
pub fn evaluate_expr(
    expr: &Expr,
    observation: &Observation,
    params: &Map<String, Value>,
) -> Result<Value, EvalError> {
    match expr {
        Expr::Literal(value) => Ok(value.clone()),
        Expr::Var { path, default } => Ok(lookup(path, observation, params, default.as_ref())),
        Expr::Op { op, args } => apply(*op, args, observation, params),
    }
}

/// Resolve a `var` path: `params.`-prefixed paths read the rule's own
/// params with the prefix consumed, everything else reads the observation.
/// Absent ⇒ the declared default, or null.
fn lookup(
    path: &str,
    observation: &Observation,
    params: &Map<String, Value>,
    default: Option<&Value>,
) -> Value {
    if path == "params" {
        return Value::Object(params.clone());
    }
    let resolved = match path.strip_prefix(PARAMS_PREFIX) {
        Some(rest) => resolver::resolve_in(params, rest),
        None => resolver::resolve_in(&observation.0, path),
    };
    match resolved {
        Some(value) => value.clone(),
        None => default.cloned().unwrap_or(Value::Null),
    }
}

fn apply(
    op: Operator,
    args: &[Expr],
    observation: &Observation,
    params: &Map<String, Value>,
) -> Result<Value, EvalError> {
    match op {
        // `and`/`or` return the deciding argument's value ("last truthy
        // wins"), not a synthesized boolean, and never evaluate past the
        // short-circuit point.
        Operator::And => {
            let mut last = Value::Bool(true);
            for arg in args {
                let value = evaluate_expr(arg, observation, params)?;
                if !is_truthy(&value) {
                    return Ok(value);
                }
                last = value;
            }
            Ok(last)
        }
        Operator::Or => {
            let mut last = Value::Bool(false);
            for arg in args {
                let value = evaluate_expr(arg, observation, params)?;
                if is_truthy(&value) {
                    return Ok(value);
                }
                last = value;
            }
            Ok(last)
        }
        Operator::Eq => {
            let (a, b) = binary("==", args, observation, params)?;
            Ok(Value::Bool(values_equal(&a, &b)))
        }
        Operator::Ne => {
            let (a, b) = binary("!=", args, observation, params)?;
            Ok(Value::Bool(!values_equal(&a, &b)))
        }
        Operator::Lt => ordering("<", args, observation, params, |a, b| a < b),
        Operator::Le => ordering("<=", args, observation, params, |a, b| a <= b),
        Operator::Gt => ordering(">", args, observation, params, |a, b| a > b),
        Operator::Ge => ordering(">=", args, observation, params, |a, b| a >= b),
        Operator::In => {
            let (needle, haystack) = binary("in", args, observation, params)?;
            Ok(Value::Bool(contains(&needle, &haystack)))
        }
        Operator::Add => {
            let mut sum = 0.0;
            for arg in args {
                sum += numeric_operand("+", &evaluate_expr(arg, observation, params)?)?;
            }
            Ok(Value::from(sum))
        }
        Operator::Mul => {
            let mut product = 1.0;
            for arg in args {
                product *= numeric_operand("*", &evaluate_expr(arg, observation, params)?)?;
            }
            Ok(Value::from(product))
        }
        Operator::Sub => match args {
            [single] => {
                let n = numeric_operand("-", &evaluate_expr(single, observation, params)?)?;
                Ok(Value::from(-n))
            }
            [lhs, rhs] => {
                let a = numeric_operand("-", &evaluate_expr(lhs, observation, params)?)?;
                let b = numeric_operand("-", &evaluate_expr(rhs, observation, params)?)?;
                Ok(Value::from(a - b))
            }
            _ => Err(EvalError::MalformedRule {
                reason: "'-' takes one or two arguments".to_string(),
            }),
        },
        Operator::Div => {
            let (lhs, rhs) = binary("/", args, observation, params)?;
            let a = numeric_operand("/", &lhs)?;
            let b = numeric_operand("/", &rhs)?;
            if b == 0.0 {
                // An incomputable threshold, not a crash: the comparison
                // built on top of this null evaluates to false.
                Ok(Value::Null)
            } else {
                Ok(Value::from(a / b))
            }
        }
    }
}

/// Evaluate an exactly-two-argument operator's operands.
fn binary(
    op: &'static str,
    args: &[Expr],
    observation: &Observation,
    params: &Map<String, Value>,
) -> Result<(Value, Value), EvalError> {
    match args {
        [lhs, rhs] => Ok((
            evaluate_expr(lhs, observation, params)?,
            evaluate_expr(rhs, observation, params)?,
        )),
        _ => Err(EvalError::MalformedRule {
            reason: format!("'{}' takes exactly two arguments, got {}", op, args.len()),
        }),
    }
}

/// Chained ordering comparison over all arguments. Any non-numeric operand
/// makes the whole comparison false rather than an error: rules commonly
/// compare an unset numeric field against a threshold and expect a
/// non-match.
fn ordering(
    op: &'static str,
    args: &[Expr],
    observation: &Observation,
    params: &Map<String, Value>,
    holds: fn(f64, f64) -> bool,
) -> Result<Value, EvalError> {
    if args.len() < 2 {
        return Err(EvalError::MalformedRule {
            reason: format!("'{}' takes at least two arguments, got {}", op, args.len()),
        });
    }
    let mut operands = Vec::with_capacity(args.len());
    for arg in args {
        match evaluate_expr(arg, observation, params)?.as_f64() {
            Some(n) => operands.push(n),
            None => return Ok(Value::Bool(false)),
        }
    }
    Ok(Value::Bool(
        operands.windows(2).all(|pair| holds(pair[0], pair[1])),
    ))
}

/// `in` membership: array haystacks by domain equality, string haystacks by
/// substring containment (the JSON-Logic behavior rule authors expect).
/// Anything else holds nothing.
fn contains(needle: &Value, haystack: &Value) -> bool {
    match haystack {
        Value::Array(items) => items.iter().any(|item| values_equal(needle, item)),
        Value::String(text) => match needle {
            Value::String(sub) => text.contains(sub.as_str()),
            _ => false,
        },
        _ => false,
    }
}

fn numeric_operand(op: &'static str, value: &Value) -> Result<f64, EvalError> {
    value.as_f64().ok_or_else(|| EvalError::TypeMismatch {
        operator: op,
        operand: value.to_string(),
    })
}

// ── Rule orchestration ──────────────────────────────────────────────

/// Evaluates observations against rule sets.
pub struct RuleEvaluator;

impl RuleEvaluator {
    /// Evaluate one observation against every rule, in order.
    ///
    /// Rules are independent of each other; each is evaluated with its own
    /// params. A single rule failing to evaluate is a hard error for the
    /// whole call: there is no partial result, and the rule must be fixed
    /// before any assessment is produced.
    pub fn evaluate_observation(
        observation: &Observation,
        rules: &[Rule],
    ) -> Result<EvaluationResult, EngineError> {
        let mut vulnerabilities = Vec::new();
        for rule in rules {
            let value =
                evaluate(&rule.logic, observation, &rule.params).map_err(|source| EngineError {
                    rule: rule.name.clone(),
                    source,
                })?;
            if is_truthy(&value) {
                vulnerabilities.push(Vulnerability::from_rule(rule));
            }
        }
        Ok(EvaluationResult {
            matched: vulnerabilities.len(),
            vulnerabilities,
        })
    }

    /// Single-rule authoring check: does `rule` hit `observation`?
    ///
    /// Semantically the one-rule restriction of
    /// [`evaluate_observation`](Self::evaluate_observation), kept separate so
    /// rule authors can probe a draft without fetching the active rule set.
    pub fn test_rule(rule: &Rule, observation: &Observation) -> Result<RuleTestResult, EngineError> {
        let value =
            evaluate(&rule.logic, observation, &rule.params).map_err(|source| EngineError {
                rule: rule.name.clone(),
                source,
            })?;
        Ok(RuleTestResult {
            hit: is_truthy(&value),
        })
    }
}
