//! Typed expression trees parsed from JSON-Logic style rule documents.
//!
//! Rule logic arrives as loose JSON: a literal, or an object with exactly
//! one key naming an operator whose value is the argument list. [`Expr::parse`]
//! converts that shape into a closed sum type once; evaluation then pattern
//! matches instead of re-inspecting object shapes at every node.

use std::fmt;
use std::str::FromStr;

use serde_json::Value;

use crate::evaluator::EvalError;

// ── Operators ───────────────────────────────────────────────────────

/// Recognized operator keys. `var` is not an operator but a leaf node and
/// is handled separately during parsing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operator {
    And,
    Or,
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
    In,
    Add,
    Sub,
    Mul,
    Div,
}

/// Every key the parser accepts, including the `var` leaf.
/// Used for "did you mean …?" suggestions during validation.
pub const KNOWN_KEYS: &[&str] = &[
    "and", "or", "==", "!=", "<", "<=", ">", ">=", "in", "+", "-", "*", "/", "var",
];

impl fmt::Display for Operator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let key = match self {
            Operator::And => "and",
            Operator::Or => "or",
            Operator::Eq => "==",
            Operator::Ne => "!=",
            Operator::Lt => "<",
            Operator::Le => "<=",
            Operator::Gt => ">",
            Operator::Ge => ">=",
            Operator::In => "in",
            Operator::Add => "+",
            Operator::Sub => "-",
            Operator::Mul => "*",
            Operator::Div => "/",
        };
        write!(f, "{}", key)
    }
}

impl FromStr for Operator {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "and" => Ok(Operator::And),
            "or" => Ok(Operator::Or),
            "==" => Ok(Operator::Eq),
            "!=" => Ok(Operator::Ne),
            "<" => Ok(Operator::Lt),
            "<=" => Ok(Operator::Le),
            ">" => Ok(Operator::Gt),
            ">=" => Ok(Operator::Ge),
            "in" => Ok(Operator::In),
            "+" => Ok(Operator::Add),
            "-" => Ok(Operator::Sub),
            "*" => Ok(Operator::Mul),
            "/" => Ok(Operator::Div),
            other => Err(format!("unknown operator: '{}'", other)),
        }
    }
}

// ── Expression tree ─────────────────────────────────────────────────

/// A parsed expression node.
#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    /// A literal value: string, number, boolean, null, or array of literals.
    Literal(Value),
    /// A `var` reference: dotted path plus optional fallback value.
    Var {
        path: String,
        default: Option<Value>,
    },
    /// An operator applied to its arguments.
    Op { op: Operator, args: Vec<Expr> },
}

impl Expr {
    /// Parse a loose JSON logic tree into a typed expression.
    ///
    /// Fails with [`EvalError::UnknownOperator`] for an unrecognized operator
    /// key and [`EvalError::MalformedRule`] for shapes that are neither a
    /// literal, a one-key operator object, nor a `var` node.
    pub fn parse(node: &Value) -> Result<Expr, EvalError> {
        let obj = match node {
            Value::Object(map) => map,
            other => return Ok(Expr::Literal(other.clone())),
        };

        let mut entries = obj.iter();
        let (key, raw_args) = match (entries.next(), entries.next()) {
            (Some(entry), None) => entry,
            _ => {
                return Err(EvalError::MalformedRule {
                    reason: format!(
                        "an operator node must have exactly one key, found {}",
                        obj.len()
                    ),
                })
            }
        };

        if key == "var" {
            return parse_var(raw_args);
        }

        let op: Operator = key
            .parse()
            .map_err(|_| EvalError::UnknownOperator {
                operator: key.clone(),
            })?;

        // A bare (non-array) argument is treated as a one-element list,
        // matching the JSON-Logic normalization the original rules rely on.
        let args = match raw_args {
            Value::Array(items) => items
                .iter()
                .map(Expr::parse)
                .collect::<Result<Vec<_>, _>>()?,
            single => vec![Expr::parse(single)?],
        };

        Ok(Expr::Op { op, args })
    }
}

/// Parse the argument of a `var` node: a bare path string, `[path]`, or
/// `[path, default]`.
fn parse_var(arg: &Value) -> Result<Expr, EvalError> {
    match arg {
        Value::String(path) => Ok(Expr::Var {
            path: path.clone(),
            default: None,
        }),
        Value::Array(items) => match items.as_slice() {
            [Value::String(path)] => Ok(Expr::Var {
                path: path.clone(),
                default: None,
            }),
            [Value::String(path), default] => Ok(Expr::Var {
                path: path.clone(),
                default: Some(default.clone()),
            }),
            _ => Err(EvalError::MalformedRule {
                reason: "`var` takes a path string, [path], or [path, default]".to_string(),
            }),
        },
        _ => Err(EvalError::MalformedRule {
            reason: "`var` takes a path string, [path], or [path, default]".to_string(),
        }),
    }
}
