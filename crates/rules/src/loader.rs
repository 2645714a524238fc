//! Filesystem rule loader with hot-reload via `notify` watcher.
//!
//! Scans a directory for YAML and JSON rule documents, maintains an ordered
//! in-memory rule set, and answers the time-lock query (`active_at`) the
//! evaluation layer depends on. Files are scanned in sorted filename order
//! and in-file order is preserved, so the loaded rule order — and therefore
//! schema inference output — is reproducible across runs.

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, RwLock};

use chrono::{DateTime, Utc};
use indexmap::IndexMap;
use notify::{
    event::{CreateKind, ModifyKind, RemoveKind},
    Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher,
};
use tracing::{info, warn};

use firebreak_core::Rule;

// ── Error type ──────────────────────────────────────────────────────

/// Errors that can occur during rule loading.
#[derive(Debug, thiserror::Error)]
pub enum RuleError {
    /// Filesystem I/O error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// YAML parse/deserialization error.
    #[error("YAML parse error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// JSON parse/deserialization error.
    #[error("JSON parse error: {0}")]
    Json(#[from] serde_json::Error),

    /// Rule validation error (e.g. empty name, inverted date window).
    #[error("Validation error: {0}")]
    Validation(String),

    /// Filesystem watcher error.
    #[error("Notify watcher error: {0}")]
    Notify(#[from] notify::Error),
}

/// Result alias for rule loading operations.
pub type Result<T> = std::result::Result<T, RuleError>;

// ── Load result types ───────────────────────────────────────────────

/// Outcome of loading a single rule file.
#[derive(Debug)]
pub struct LoadResult {
    /// Path to the file that was loaded.
    pub path: PathBuf,
    /// Status of the load attempt.
    pub status: LoadStatus,
}

/// Status of a single file load attempt.
#[derive(Debug)]
pub enum LoadStatus {
    /// Every rule in the file was loaded.
    Loaded { names: Vec<String> },
    /// File was skipped (dotfile, unsupported extension, directory).
    Skipped { reason: String },
    /// Parse or validation error occurred.
    Failed { error: String },
}

// ── Rule identity ───────────────────────────────────────────────────

/// Versions of the same check share a name and differ by `effective_date`,
/// so the store keys on both: reloading a document upserts the matching
/// version while older versions of the lineage stay untouched.
type VersionKey = (String, DateTime<Utc>);

fn version_key(rule: &Rule) -> VersionKey {
    (rule.name.clone(), rule.effective_date)
}

type SharedRules = Arc<RwLock<IndexMap<VersionKey, Rule>>>;
type SharedSources = Arc<RwLock<HashMap<PathBuf, Vec<VersionKey>>>>;

// ── Rule loader ─────────────────────────────────────────────────────

/// Filesystem-backed rule loader with optional hot-reload.
///
/// Scans a directory for `*.yml` / `*.yaml` / `*.json` files, deserializes
/// each into one or more [`Rule`] records, and maintains an ordered
/// in-memory store. An optional `notify` watcher picks up changes.
pub struct RuleLoader {
    /// Directory containing rule documents.
    rules_dir: PathBuf,
    /// Ordered in-memory rule store.
    rules: SharedRules,
    /// Which versions each file contributed, for pruning on delete/reload.
    sources: SharedSources,
    /// Active filesystem watcher (held to keep it alive).
    _watcher: Option<RecommendedWatcher>,
}

impl RuleLoader {
    /// Create a new loader for the given directory.
    ///
    /// Creates the directory (and parents) if it does not exist.
    pub fn new(rules_dir: PathBuf) -> Self {
        if !rules_dir.exists() {
            if let Err(e) = fs::create_dir_all(&rules_dir) {
                warn!(path = %rules_dir.display(), error = %e, "failed to create rules directory");
            }
        }
        Self {
            rules_dir,
            rules: Arc::new(RwLock::new(IndexMap::new())),
            sources: Arc::new(RwLock::new(HashMap::new())),
            _watcher: None,
        }
    }

    /// Scan the rules directory and load every rule document.
    ///
    /// Dotfiles and unsupported extensions are skipped. Parse errors are
    /// reported per file but do not abort the scan. Files load in sorted
    /// filename order so the resulting rule order is reproducible.
    pub fn load_all(&self) -> Result<Vec<LoadResult>> {
        let mut paths: Vec<PathBuf> = fs::read_dir(&self.rules_dir)?
            .collect::<std::io::Result<Vec<_>>>()?
            .into_iter()
            .map(|entry| entry.path())
            .collect();
        paths.sort();

        let mut results = Vec::new();
        for path in paths {
            if path.is_dir() {
                continue;
            }

            if is_dotfile(&path) {
                results.push(LoadResult {
                    path,
                    status: LoadStatus::Skipped {
                        reason: "dotfile".to_string(),
                    },
                });
                continue;
            }

            if file_format(&path).is_none() {
                results.push(LoadResult {
                    path,
                    status: LoadStatus::Skipped {
                        reason: "not a YAML or JSON file".to_string(),
                    },
                });
                continue;
            }

            match read_rules_file(&path) {
                Ok(rules) => {
                    let names: Vec<String> = rules.iter().map(|r| r.name.clone()).collect();
                    info!(path = %path.display(), count = rules.len(), "loaded rule file");
                    self.replace_file_rules(&path, rules);
                    results.push(LoadResult {
                        path,
                        status: LoadStatus::Loaded { names },
                    });
                }
                Err(e) => {
                    warn!(path = %path.display(), error = %e, "failed to load rule file");
                    results.push(LoadResult {
                        path,
                        status: LoadStatus::Failed {
                            error: e.to_string(),
                        },
                    });
                }
            }
        }

        Ok(results)
    }

    /// Get a clone of the shared rules store.
    pub fn rules(&self) -> SharedRules {
        Arc::clone(&self.rules)
    }

    /// All loaded rules, in load order.
    pub fn snapshot(&self) -> Vec<Rule> {
        self.rules
            .read()
            .expect("rules lock poisoned")
            .values()
            .cloned()
            .collect()
    }

    /// The time-lock query: rules active at `ts`
    /// (`effective_date <= ts < retired_date`; no `retired_date` means
    /// unbounded). Load order is preserved.
    pub fn active_at(&self, ts: DateTime<Utc>) -> Vec<Rule> {
        self.rules
            .read()
            .expect("rules lock poisoned")
            .values()
            .filter(|rule| rule.is_active_at(ts))
            .cloned()
            .collect()
    }

    /// Start a filesystem watcher.
    ///
    /// On file create/modify the document is re-parsed and its rules
    /// upserted; rules the file no longer defines are pruned. On delete the
    /// file's rules are removed. Parse errors are logged as warnings and the
    /// previous versions are kept.
    pub fn watch(&mut self) -> Result<()> {
        let rules = Arc::clone(&self.rules);
        let sources = Arc::clone(&self.sources);

        let mut watcher = notify::recommended_watcher(
            move |res: std::result::Result<Event, notify::Error>| match res {
                Ok(event) => handle_fs_event(&event, &rules, &sources),
                Err(e) => warn!(error = %e, "filesystem watcher error"),
            },
        )?;

        watcher.watch(&self.rules_dir, RecursiveMode::NonRecursive)?;

        info!(path = %self.rules_dir.display(), "watching rules directory for changes");
        self._watcher = Some(watcher);
        Ok(())
    }

    /// Swap in a file's freshly parsed rules, pruning versions the file no
    /// longer defines.
    fn replace_file_rules(&self, path: &Path, rules: Vec<Rule>) {
        replace_file_rules(&self.rules, &self.sources, path, rules);
    }
}

// ── Parsing ─────────────────────────────────────────────────────────

/// Supported rule document formats.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum FileFormat {
    Yaml,
    Json,
}

fn file_format(path: &Path) -> Option<FileFormat> {
    match path.extension().and_then(|e| e.to_str()) {
        Some("yml") | Some("yaml") => Some(FileFormat::Yaml),
        Some("json") => Some(FileFormat::Json),
        _ => None,
    }
}

fn is_dotfile(path: &Path) -> bool {
    path.file_name()
        .and_then(|n| n.to_str())
        .map(|n| n.starts_with('.'))
        .unwrap_or(false)
}

/// Parse a rule document file. A file holds either a single rule or a
/// sequence of rules.
pub fn read_rules_file(path: &Path) -> Result<Vec<Rule>> {
    let contents = fs::read_to_string(path)?;
    let rules = match file_format(path) {
        Some(FileFormat::Json) => {
            let value: serde_json::Value = serde_json::from_str(&contents)?;
            match value {
                serde_json::Value::Array(items) => items
                    .into_iter()
                    .map(serde_json::from_value)
                    .collect::<std::result::Result<Vec<Rule>, _>>()?,
                other => vec![serde_json::from_value(other)?],
            }
        }
        _ => {
            let value: serde_yaml::Value = serde_yaml::from_str(&contents)?;
            match value {
                serde_yaml::Value::Sequence(items) => items
                    .into_iter()
                    .map(serde_yaml::from_value)
                    .collect::<std::result::Result<Vec<Rule>, _>>()?,
                other => vec![serde_yaml::from_value(other)?],
            }
        }
    };

    for rule in &rules {
        if rule.name.is_empty() {
            return Err(RuleError::Validation(
                "rule name must not be empty".to_string(),
            ));
        }
        if let Some(retired) = rule.retired_date {
            if retired <= rule.effective_date {
                return Err(RuleError::Validation(format!(
                    "rule '{}': retired_date must be after effective_date",
                    rule.name
                )));
            }
        }
    }

    Ok(rules)
}

// ── Shared-state mutation ───────────────────────────────────────────

fn replace_file_rules(
    rules: &SharedRules,
    sources: &SharedSources,
    path: &Path,
    parsed: Vec<Rule>,
) {
    let new_keys: Vec<VersionKey> = parsed.iter().map(version_key).collect();

    let mut store = rules.write().expect("rules lock poisoned");
    let mut sources = sources.write().expect("sources lock poisoned");

    // Prune versions this file used to define but no longer does.
    if let Some(old_keys) = sources.get(path) {
        for key in old_keys {
            if !new_keys.contains(key) {
                store.shift_remove(key);
            }
        }
    }

    for rule in parsed {
        store.insert(version_key(&rule), rule);
    }
    sources.insert(path.to_path_buf(), new_keys);
}

fn remove_file_rules(rules: &SharedRules, sources: &SharedSources, path: &Path) {
    let mut store = rules.write().expect("rules lock poisoned");
    let mut sources = sources.write().expect("sources lock poisoned");
    if let Some(keys) = sources.remove(path) {
        for key in &keys {
            store.shift_remove(key);
        }
        info!(path = %path.display(), count = keys.len(), "removed rules after file deletion");
    }
}

// ── Filesystem event handler ────────────────────────────────────────

/// Handle a single filesystem event from the notify watcher.
fn handle_fs_event(event: &Event, rules: &SharedRules, sources: &SharedSources) {
    for path in &event.paths {
        if file_format(path).is_none() || is_dotfile(path) {
            continue;
        }

        match &event.kind {
            EventKind::Create(CreateKind::File)
            | EventKind::Modify(ModifyKind::Data(_))
            | EventKind::Modify(ModifyKind::Name(_)) => match read_rules_file(path) {
                Ok(parsed) => {
                    info!(path = %path.display(), count = parsed.len(), "hot-reloaded rule file");
                    replace_file_rules(rules, sources, path, parsed);
                }
                Err(e) => {
                    warn!(
                        path = %path.display(),
                        error = %e,
                        "failed to parse rule file during hot-reload, keeping previous version"
                    );
                }
            },
            EventKind::Remove(RemoveKind::File) => {
                remove_file_rules(rules, sources, path);
            }
            _ => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    const VENTS_RULE_YAML: &str = r#"
name: Ember-vulnerable vents
category: Vents
logic:
  "==":
    - var: attic_vent_has_screens
    - "False"
explanation: Unscreened vents admit embers.
mitigations:
  full:
    - Install 1/8-inch metal mesh screening
  bridge: []
effective_date: 2024-01-01T00:00:00Z
"#;

    const TWO_RULES_YAML: &str = r#"
- name: Rule A
  logic: true
  explanation: ""
  effective_date: 2024-01-01T00:00:00Z
- name: Rule B
  logic: false
  explanation: ""
  effective_date: 2024-06-01T00:00:00Z
  retired_date: 2025-01-01T00:00:00Z
"#;

    fn temp_loader() -> (TempDir, RuleLoader) {
        let dir = TempDir::new().expect("create tempdir");
        let loader = RuleLoader::new(dir.path().to_path_buf());
        (dir, loader)
    }

    fn write(dir: &TempDir, name: &str, contents: &str) -> PathBuf {
        let path = dir.path().join(name);
        fs::write(&path, contents).unwrap();
        path
    }

    #[test]
    fn loads_single_rule_yaml() {
        let (dir, loader) = temp_loader();
        write(&dir, "vents.yml", VENTS_RULE_YAML);

        let results = loader.load_all().unwrap();
        assert_eq!(results.len(), 1);
        assert!(matches!(&results[0].status, LoadStatus::Loaded { names } if names == &["Ember-vulnerable vents"]));

        let rules = loader.snapshot();
        assert_eq!(rules.len(), 1);
        assert_eq!(rules[0].category.as_deref(), Some("Vents"));
    }

    #[test]
    fn loads_multi_rule_files_and_json() {
        let (dir, loader) = temp_loader();
        write(&dir, "a-pair.yml", TWO_RULES_YAML);
        write(
            &dir,
            "b-single.json",
            r#"{"name": "Rule C", "logic": true, "explanation": "", "effective_date": "2024-01-01T00:00:00Z"}"#,
        );

        loader.load_all().unwrap();
        let names: Vec<String> = loader.snapshot().iter().map(|r| r.name.clone()).collect();
        // Sorted filename order, in-file order preserved.
        assert_eq!(names, vec!["Rule A", "Rule B", "Rule C"]);
    }

    #[test]
    fn skips_dotfiles_and_unknown_extensions() {
        let (dir, loader) = temp_loader();
        write(&dir, ".hidden.yml", VENTS_RULE_YAML);
        write(&dir, "notes.txt", "not a rule");
        write(&dir, "vents.yml", VENTS_RULE_YAML);

        let results = loader.load_all().unwrap();
        let skipped = results
            .iter()
            .filter(|r| matches!(r.status, LoadStatus::Skipped { .. }))
            .count();
        assert_eq!(skipped, 2);
        assert_eq!(loader.snapshot().len(), 1);
    }

    #[test]
    fn parse_failure_does_not_abort_the_scan() {
        let (dir, loader) = temp_loader();
        write(&dir, "a-broken.yml", "name: [unclosed");
        write(&dir, "b-vents.yml", VENTS_RULE_YAML);

        let results = loader.load_all().unwrap();
        assert!(matches!(results[0].status, LoadStatus::Failed { .. }));
        assert!(matches!(results[1].status, LoadStatus::Loaded { .. }));
        assert_eq!(loader.snapshot().len(), 1);
    }

    #[test]
    fn inverted_date_window_fails_validation() {
        let (dir, loader) = temp_loader();
        write(
            &dir,
            "backwards.yml",
            r#"
name: Backwards
logic: true
explanation: ""
effective_date: 2025-01-01T00:00:00Z
retired_date: 2024-01-01T00:00:00Z
"#,
        );
        let results = loader.load_all().unwrap();
        assert!(
            matches!(&results[0].status, LoadStatus::Failed { error } if error.contains("retired_date"))
        );
    }

    #[test]
    fn active_at_applies_the_time_lock() {
        let (dir, loader) = temp_loader();
        write(&dir, "pair.yml", TWO_RULES_YAML);
        loader.load_all().unwrap();

        // Rule A active from 2024-01-01; Rule B active [2024-06-01, 2025-01-01).
        let at = |s: &str| s.parse::<DateTime<Utc>>().unwrap();

        let names = |ts| -> Vec<String> {
            loader.active_at(ts).iter().map(|r| r.name.clone()).collect()
        };
        assert_eq!(names(at("2024-03-01T00:00:00Z")), vec!["Rule A"]);
        assert_eq!(names(at("2024-07-01T00:00:00Z")), vec!["Rule A", "Rule B"]);
        // retired_date is exclusive.
        assert_eq!(names(at("2025-01-01T00:00:00Z")), vec!["Rule A"]);
    }

    #[test]
    fn reload_prunes_rules_a_file_no_longer_defines() {
        let (dir, loader) = temp_loader();
        let path = write(&dir, "pair.yml", TWO_RULES_YAML);
        loader.load_all().unwrap();
        assert_eq!(loader.snapshot().len(), 2);

        write(
            &dir,
            "pair.yml",
            r#"
- name: Rule A
  logic: true
  explanation: ""
  effective_date: 2024-01-01T00:00:00Z
"#,
        );
        let parsed = read_rules_file(&path).unwrap();
        replace_file_rules(&loader.rules, &loader.sources, &path, parsed);

        let names: Vec<String> = loader.snapshot().iter().map(|r| r.name.clone()).collect();
        assert_eq!(names, vec!["Rule A"]);
    }

    #[test]
    fn remove_prunes_all_rules_from_that_file() {
        let (dir, loader) = temp_loader();
        let path = write(&dir, "pair.yml", TWO_RULES_YAML);
        loader.load_all().unwrap();

        remove_file_rules(&loader.rules, &loader.sources, &path);
        assert!(loader.snapshot().is_empty());
    }

    #[test]
    fn versions_of_a_lineage_coexist() {
        let (dir, loader) = temp_loader();
        write(
            &dir,
            "lineage.yml",
            r#"
- name: Ember-vulnerable vents
  logic: true
  explanation: v1
  effective_date: 2023-01-01T00:00:00Z
  retired_date: 2024-01-01T00:00:00Z
- name: Ember-vulnerable vents
  logic: true
  explanation: v2
  effective_date: 2024-01-01T00:00:00Z
"#,
        );
        loader.load_all().unwrap();
        assert_eq!(loader.snapshot().len(), 2);

        let at = |s: &str| s.parse::<DateTime<Utc>>().unwrap();
        let active = loader.active_at(at("2023-06-01T00:00:00Z"));
        assert_eq!(active.len(), 1);
        assert_eq!(active[0].explanation, "v1");
        let active = loader.active_at(at("2024-06-01T00:00:00Z"));
        assert_eq!(active.len(), 1);
        assert_eq!(active[0].explanation, "v2");
    }
}
