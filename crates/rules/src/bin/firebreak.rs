//! firebreak — wildfire-safety rule engine CLI.
//!
//! Subcommands:
//! - `evaluate` — assess an observation against the active rule set
//! - `test`     — single-rule authoring check
//! - `schema`   — print the inferred observation form schema
//! - `validate` — validate every rule document in a directory

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use chrono::{DateTime, Utc};
use clap::{Parser, Subcommand};
use serde::Serialize;
use tracing::info;

use firebreak_core::Observation;
use firebreak_rules::evaluator::RuleEvaluator;
use firebreak_rules::inference::infer_schema;
use firebreak_rules::loader::{read_rules_file, LoadStatus, RuleLoader};
use firebreak_rules::validation::{validate_rule, ValidationResult};

// ── CLI ─────────────────────────────────────────────────────────────

/// Wildfire-safety rule engine: evaluate property observations against
/// declarative rule documents.
#[derive(Parser, Debug)]
#[command(name = "firebreak", version, about)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Evaluate an observation against the active rule set.
    Evaluate {
        /// Directory containing rule documents.
        #[arg(long, env = "FIREBREAK_RULES_DIR", default_value = "data/rules")]
        rules_dir: PathBuf,
        /// Path to the observation JSON file.
        #[arg(long)]
        observation: PathBuf,
        /// Evaluate rules active at this instant (RFC 3339); defaults to now.
        #[arg(long)]
        as_of: Option<DateTime<Utc>>,
    },
    /// Check a single rule document against an observation.
    Test {
        /// Path to the rule document (one rule).
        #[arg(long)]
        rule: PathBuf,
        /// Path to the observation JSON file.
        #[arg(long)]
        observation: PathBuf,
    },
    /// Print the observation form schema inferred from the active rule set.
    Schema {
        /// Directory containing rule documents.
        #[arg(long, env = "FIREBREAK_RULES_DIR", default_value = "data/rules")]
        rules_dir: PathBuf,
        /// Infer from rules active at this instant (RFC 3339); defaults to now.
        #[arg(long)]
        as_of: Option<DateTime<Utc>>,
    },
    /// Validate every rule document in a directory.
    Validate {
        /// Directory containing rule documents.
        #[arg(long, env = "FIREBREAK_RULES_DIR", default_value = "data/rules")]
        rules_dir: PathBuf,
    },
}

// ── main ────────────────────────────────────────────────────────────

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .init();

    let cli = Cli::parse();

    match cli.command {
        Command::Evaluate {
            rules_dir,
            observation,
            as_of,
        } => evaluate(rules_dir, observation, as_of),
        Command::Test { rule, observation } => test(rule, observation),
        Command::Schema { rules_dir, as_of } => schema(rules_dir, as_of),
        Command::Validate { rules_dir } => validate(rules_dir),
    }
}

// ── Subcommands ─────────────────────────────────────────────────────

fn evaluate(rules_dir: PathBuf, observation: PathBuf, as_of: Option<DateTime<Utc>>) -> Result<()> {
    let loader = load_strict(rules_dir)?;
    let ts = as_of.unwrap_or_else(Utc::now);
    let active = loader.active_at(ts);
    info!(active = active.len(), as_of = %ts, "evaluating observation");

    let observation = read_observation(&observation)?;
    let result = RuleEvaluator::evaluate_observation(&observation, &active)?;
    print_json(&result)
}

fn test(rule: PathBuf, observation: PathBuf) -> Result<()> {
    let rules = read_rules_file(&rule)
        .with_context(|| format!("failed to read rule document {}", rule.display()))?;
    let rule = match rules.as_slice() {
        [rule] => rule,
        _ => bail!("`test` expects a document with exactly one rule, found {}", rules.len()),
    };

    let observation = read_observation(&observation)?;
    let result = RuleEvaluator::test_rule(rule, &observation)?;
    print_json(&result)
}

fn schema(rules_dir: PathBuf, as_of: Option<DateTime<Utc>>) -> Result<()> {
    let loader = load_strict(rules_dir)?;
    let active = loader.active_at(as_of.unwrap_or_else(Utc::now));
    print_json(&infer_schema(&active))
}

fn validate(rules_dir: PathBuf) -> Result<()> {
    let loader = RuleLoader::new(rules_dir);
    let results = loader.load_all()?;

    #[derive(Serialize)]
    struct FileReport {
        path: String,
        error: String,
    }
    #[derive(Serialize)]
    struct RuleReport {
        name: String,
        #[serde(flatten)]
        result: ValidationResult,
    }
    #[derive(Serialize)]
    struct Report {
        unreadable_files: Vec<FileReport>,
        rules: Vec<RuleReport>,
    }

    let unreadable_files: Vec<FileReport> = results
        .iter()
        .filter_map(|r| match &r.status {
            LoadStatus::Failed { error } => Some(FileReport {
                path: r.path.display().to_string(),
                error: error.clone(),
            }),
            _ => None,
        })
        .collect();

    let rules: Vec<RuleReport> = loader
        .snapshot()
        .iter()
        .map(|rule| RuleReport {
            name: rule.name.clone(),
            result: validate_rule(rule),
        })
        .collect();

    let invalid = rules.iter().filter(|r| !r.result.valid).count();
    let report = Report {
        unreadable_files,
        rules,
    };
    print_json(&report)?;

    if invalid > 0 || !report.unreadable_files.is_empty() {
        bail!(
            "{} invalid rule(s), {} unreadable file(s)",
            invalid,
            report.unreadable_files.len()
        );
    }
    Ok(())
}

// ── Helpers ─────────────────────────────────────────────────────────

/// Load a rules directory, refusing to proceed when any file is unreadable:
/// an assessment computed against a partial rule set is a silently wrong
/// assessment.
fn load_strict(rules_dir: PathBuf) -> Result<RuleLoader> {
    let loader = RuleLoader::new(rules_dir);
    let results = loader.load_all()?;
    let failed: Vec<String> = results
        .iter()
        .filter_map(|r| match &r.status {
            LoadStatus::Failed { error } => {
                Some(format!("{}: {}", r.path.display(), error))
            }
            _ => None,
        })
        .collect();
    if !failed.is_empty() {
        bail!(
            "refusing to evaluate with unreadable rule files:\n  {}",
            failed.join("\n  ")
        );
    }
    Ok(loader)
}

fn read_observation(path: &Path) -> Result<Observation> {
    let contents = fs::read_to_string(path)
        .with_context(|| format!("failed to read observation {}", path.display()))?;
    serde_json::from_str(&contents)
        .with_context(|| format!("invalid observation JSON in {}", path.display()))
}

fn print_json(value: &impl Serialize) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
