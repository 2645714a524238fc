//! Shared domain types for the firebreak wildfire-safety rule engine.

pub mod observation;
pub mod result;
pub mod rule;

pub use observation::Observation;
pub use result::{EvaluationResult, RuleTestResult, Vulnerability};
pub use rule::{Mitigations, Rule};
