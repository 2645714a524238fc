//! Wildfire-safety rule engine.
//!
//! This crate provides:
//! - JSON-Logic style expression trees parsed into a typed representation
//! - Dotted-path resolution over observations and rule parameters
//! - A pure expression evaluator with domain string-boolean semantics
//! - Rule orchestration (full rule set, or single-rule authoring checks)
//! - Schema inference deriving the observation form from rules alone
//! - A filesystem rule loader with hot-reload via `notify` watcher
//! - Structured rule validation with fuzzy operator suggestions

pub mod evaluator;
pub mod expr;
pub mod inference;
pub mod loader;
pub mod resolver;
pub mod validation;
