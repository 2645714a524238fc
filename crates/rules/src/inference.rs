//! Schema inference: derive the observation form shape from rules alone.
//!
//! No observation is consulted. Two passes over the rule set — field
//! discovery, then type and option inference — followed by option backfill
//! from each rule's parameter tables. Ordering is deterministic everywhere:
//! first textual appearance wins, scanning rules in list order and logic
//! trees in depth-first argument order, so identical rule sets always render
//! the same form.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use firebreak_core::Rule;

use crate::expr::{Expr, Operator};

// ── Schema types ────────────────────────────────────────────────────

/// Input widget type inferred for a field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FieldType {
    Text,
    Number,
    Boolean,
    Select,
    Array,
}

/// An inferred observation field.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldSchema {
    pub name: String,
    pub field_type: FieldType,
    /// Legal choices for select fields, in discovery order.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub options: Vec<String>,
    pub default_value: Value,
    /// Per-item fields for array types.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub item_schema: Option<Vec<FieldSchema>>,
}

// ── Discovery accumulator ───────────────────────────────────────────

/// Facts gathered about one candidate field while walking logic trees.
/// An explicit ordered accumulator (not a set) so first-seen order survives.
#[derive(Debug, Default)]
struct FieldFacts {
    /// Some var path had an integer second segment (array hint).
    indexed: bool,
    /// Item keys observed as third segments, first-seen order.
    item_keys: Vec<String>,
    /// Options from `in` nodes with a literal array haystack.
    select_options: Vec<String>,
}

fn push_unique(list: &mut Vec<String>, value: &str) {
    if !list.iter().any(|v| v == value) {
        list.push(value.to_string());
    }
}

// ── Public API ──────────────────────────────────────────────────────

/// Derive the observation field schema from a rule collection.
///
/// Idempotent: the same rules in the same order always produce the same
/// field order and option order.
pub fn infer_schema(rules: &[Rule]) -> Vec<FieldSchema> {
    // Pass 1 + 2 input: walk every parseable logic tree. A tree that fails
    // to parse contributes nothing; validation is where it gets reported.
    let mut discovered: IndexMap<String, FieldFacts> = IndexMap::new();
    for rule in rules {
        if let Ok(expr) = Expr::parse(&rule.logic) {
            walk(&expr, &mut discovered);
        }
    }

    let mut schemas: Vec<FieldSchema> = discovered
        .iter()
        .map(|(name, facts)| build_field(name, facts))
        .collect();

    // Pass 3: option backfill from mapping-valued params entries.
    for rule in rules {
        for (param_key, param_value) in &rule.params {
            let Value::Object(table) = param_value else {
                continue;
            };
            for schema in &mut schemas {
                backfill_field(schema, param_key, table);
            }
        }
    }

    for schema in &mut schemas {
        assign_default(schema);
    }
    schemas
}

// ── Pass 1: discovery walk ──────────────────────────────────────────

fn walk(expr: &Expr, acc: &mut IndexMap<String, FieldFacts>) {
    match expr {
        Expr::Literal(_) => {}
        Expr::Var { path, .. } => record_path(path, acc),
        Expr::Op { op, args } => {
            if *op == Operator::In {
                record_in_options(args, acc);
            }
            for arg in args {
                walk(arg, acc);
            }
        }
    }
}

/// Record a var path's top-level field and any array-shape facts.
/// Paths into the rule's own params are not observation fields.
fn record_path(path: &str, acc: &mut IndexMap<String, FieldFacts>) {
    if path == "params" || path.starts_with("params.") {
        return;
    }
    let mut segments = path.split('.');
    let Some(first) = segments.next() else {
        return;
    };
    if first.is_empty() {
        return;
    }
    let facts = acc.entry(first.to_string()).or_default();
    if let Some(second) = segments.next() {
        if second.parse::<usize>().is_ok() {
            facts.indexed = true;
            if let Some(item_key) = segments.next() {
                push_unique(&mut facts.item_keys, item_key);
            }
        }
    }
}

/// An `in` node whose first operand is a top-level field var and whose
/// second operand is a literal array declares select options for that field.
fn record_in_options(args: &[Expr], acc: &mut IndexMap<String, FieldFacts>) {
    let [Expr::Var { path, .. }, Expr::Literal(Value::Array(items))] = args else {
        return;
    };
    if path.contains('.') || path == "params" {
        return;
    }
    let facts = acc.entry(path.clone()).or_default();
    for item in items {
        if let Value::String(option) = item {
            push_unique(&mut facts.select_options, option);
        }
    }
}

// ── Pass 2: type inference ──────────────────────────────────────────

fn build_field(name: &str, facts: &FieldFacts) -> FieldSchema {
    let field_type = infer_type(name, facts);
    let options = if field_type == FieldType::Select {
        facts.select_options.clone()
    } else {
        Vec::new()
    };
    let item_schema = (field_type == FieldType::Array).then(|| build_items(&facts.item_keys));
    FieldSchema {
        name: name.to_string(),
        field_type,
        options,
        default_value: Value::Null,
        item_schema,
    }
}

/// The four type rules, in fixed precedence order.
fn infer_type(name: &str, facts: &FieldFacts) -> FieldType {
    let lower = name.to_lowercase();
    if lower.contains("has_") || lower.contains("is_") {
        FieldType::Boolean
    } else if lower.contains("distance") || lower.ends_with("_ft") {
        FieldType::Number
    } else if facts.indexed {
        FieldType::Array
    } else if !facts.select_options.is_empty() {
        FieldType::Select
    } else {
        FieldType::Text
    }
}

fn build_items(keys: &[String]) -> Vec<FieldSchema> {
    if keys.is_empty() {
        // No item structure was ever referenced; seed a single text field.
        return vec![FieldSchema {
            name: "value".to_string(),
            field_type: FieldType::Text,
            options: Vec::new(),
            default_value: Value::Null,
            item_schema: None,
        }];
    }
    keys.iter()
        .map(|key| FieldSchema {
            name: key.clone(),
            field_type: infer_item_type(key),
            options: Vec::new(),
            default_value: Value::Null,
            item_schema: None,
        })
        .collect()
}

/// Item keys reuse the name rules; a key containing `type` becomes a select
/// whose options arrive via backfill.
fn infer_item_type(name: &str) -> FieldType {
    let lower = name.to_lowercase();
    if lower.contains("has_") || lower.contains("is_") {
        FieldType::Boolean
    } else if lower.contains("distance") || lower.ends_with("_ft") {
        FieldType::Number
    } else if lower.contains("type") {
        FieldType::Select
    } else {
        FieldType::Text
    }
}

// ── Pass 3: option backfill ─────────────────────────────────────────

/// Domain tokens that tie a params table to a type-keyed field.
const DOMAIN_TOKENS: &[&str] = &["veg", "window"];

fn backfill_field(schema: &mut FieldSchema, param_key: &str, table: &Map<String, Value>) {
    let owner = schema.name.clone();
    apply_backfill(schema, &owner, param_key, table);
    if let Some(items) = &mut schema.item_schema {
        for item in items {
            apply_backfill(item, &owner, param_key, table);
        }
    }
}

fn apply_backfill(
    target: &mut FieldSchema,
    owner: &str,
    param_key: &str,
    table: &Map<String, Value>,
) {
    // Only choice-shaped targets take options.
    if !matches!(target.field_type, FieldType::Text | FieldType::Select) {
        return;
    }
    if !param_relates(param_key, &target.name, owner) {
        return;
    }
    for key in table.keys() {
        push_unique(&mut target.options, key);
    }
    if target.field_type == FieldType::Text && !target.options.is_empty() {
        target.field_type = FieldType::Select;
    }
}

/// Does a params entry textually relate to a field or item key?
///
/// (a) A type-keyed target whose params table shares a domain token with the
/// owning field: `window_mult` declares options for `Window Type`, and
/// `veg_heat_factor` for the vegetation item `Type` — but the owning-field
/// check keeps a window cost table from declaring options for a vegetation
/// key.
/// (b) The param key embeds the target key outright (`roof_type_scores`
/// relates to `roof_type`).
fn param_relates(param_key: &str, target_key: &str, owner: &str) -> bool {
    let param = param_key.to_lowercase();
    let target = target_key.to_lowercase();
    let owner = owner.to_lowercase();

    if target.contains("type") {
        for token in DOMAIN_TOKENS {
            if param.contains(token) && owner.contains(token) {
                return true;
            }
        }
    }
    !target.is_empty() && param.contains(target.as_str())
}

// ── Defaults ────────────────────────────────────────────────────────

fn assign_default(schema: &mut FieldSchema) {
    if let Some(items) = &mut schema.item_schema {
        for item in items {
            assign_default(item);
        }
    }
    schema.default_value = match schema.field_type {
        // Static known default: the domain's string boolean.
        FieldType::Boolean => Value::String("True".to_string()),
        FieldType::Select => schema
            .options
            .first()
            .map(|option| Value::String(option.clone()))
            .unwrap_or_else(|| Value::String(String::new())),
        FieldType::Number => Value::from(0),
        FieldType::Text => Value::String(String::new()),
        FieldType::Array => {
            let seed: Map<String, Value> = schema
                .item_schema
                .iter()
                .flatten()
                .map(|item| (item.name.clone(), item.default_value.clone()))
                .collect();
            Value::Array(vec![Value::Object(seed)])
        }
    };
}
