//! Loading specs (YAML) and task suites (JSONL) from a data directory.
//!
//! Layout:
//!
//! ```text
//! <root>/specs/<spec_id>.yaml
//! <root>/suites/<suite>.jsonl
//! ```
//!
//! A malformed suite line does not fail the whole suite: it is kept as a
//! [`SuiteEntry::Invalid`] so the runner can still emit one record for it.

use std::path::{Path, PathBuf};

use tracing::debug;

use crate::domain::error::{Result, SpecGuardError};
use crate::domain::spec::Spec;
use crate::domain::task::{Protocol, Task};

/// Environment variable overriding the data root.
pub const DATA_DIR_ENV: &str = "SPECGUARD_DATA_DIR";

pub const DEFAULT_DATA_DIR: &str = "data";

const SPEC_EXTENSIONS: [&str; 2] = ["yaml", "yml"];
const SUITE_EXTENSION: &str = "jsonl";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CatalogPaths {
    pub specs_dir: PathBuf,
    pub suites_dir: PathBuf,
}

impl CatalogPaths {
    pub fn from_root(root: impl AsRef<Path>) -> Self {
        let root = root.as_ref();
        Self {
            specs_dir: root.join("specs"),
            suites_dir: root.join("suites"),
        }
    }

    /// Root from `SPECGUARD_DATA_DIR`, falling back to `./data`.
    pub fn from_env() -> Self {
        let root = std::env::var(DATA_DIR_ENV)
            .ok()
            .filter(|v| !v.trim().is_empty())
            .unwrap_or_else(|| DEFAULT_DATA_DIR.to_string());
        Self::from_root(root)
    }

    pub fn suite_path(&self, suite: &str) -> PathBuf {
        self.suites_dir.join(format!("{suite}.{SUITE_EXTENSION}"))
    }

    fn spec_path(&self, spec_id: &str) -> Option<PathBuf> {
        SPEC_EXTENSIONS
            .iter()
            .map(|ext| self.specs_dir.join(format!("{spec_id}.{ext}")))
            .find(|p| p.is_file())
    }
}

impl Default for CatalogPaths {
    fn default() -> Self {
        Self::from_root(DEFAULT_DATA_DIR)
    }
}

fn is_plain_name(name: &str) -> bool {
    !name.is_empty()
        && !name.contains(['/', '\\'])
        && name != "."
        && name != ".."
}

// ---------------------------------------------------------------------------
// Specs
// ---------------------------------------------------------------------------

/// Parse a spec document and check that it declares `expected_id`.
pub fn parse_spec(yaml: &str, expected_id: &str) -> Result<Spec> {
    let spec = Spec::from_yaml_str(yaml)?;
    if spec.id != expected_id {
        return Err(SpecGuardError::InvalidSpec {
            spec_id: expected_id.to_string(),
            reason: format!("file declares id '{}'", spec.id),
        });
    }
    Ok(spec)
}

pub fn load_spec(paths: &CatalogPaths, spec_id: &str) -> Result<Spec> {
    if !is_plain_name(spec_id) {
        return Err(SpecGuardError::SpecNotFound(spec_id.to_string()));
    }
    let path = paths
        .spec_path(spec_id)
        .ok_or_else(|| SpecGuardError::SpecNotFound(spec_id.to_string()))?;
    debug!(spec_id = %spec_id, path = %path.display(), "loading spec");
    let text = std::fs::read_to_string(&path)?;
    parse_spec(&text, spec_id)
}

pub fn list_specs(paths: &CatalogPaths) -> Result<Vec<String>> {
    list_stems(&paths.specs_dir, &SPEC_EXTENSIONS)
}

// ---------------------------------------------------------------------------
// Suites
// ---------------------------------------------------------------------------

/// One line of a suite file.
#[derive(Debug, Clone, PartialEq)]
pub enum SuiteEntry {
    Task(Task),
    /// A line that failed to parse or validate. `task_id` and `protocol` are
    /// whatever could be read from the raw JSON.
    Invalid {
        line: usize,
        task_id: Option<String>,
        protocol: Option<String>,
        reason: String,
    },
}

impl SuiteEntry {
    pub fn task_id(&self) -> Option<&str> {
        match self {
            SuiteEntry::Task(task) => Some(&task.task_id),
            SuiteEntry::Invalid { task_id, .. } => task_id.as_deref(),
        }
    }

    pub fn as_task(&self) -> Option<&Task> {
        match self {
            SuiteEntry::Task(task) => Some(task),
            SuiteEntry::Invalid { .. } => None,
        }
    }

    fn matches_protocol(&self, protocol: Protocol) -> bool {
        match self {
            SuiteEntry::Task(task) => task.protocol == protocol,
            SuiteEntry::Invalid { protocol: raw, .. } => raw
                .as_deref()
                .map_or(true, |p| p.parse::<Protocol>().map_or(true, |p| p == protocol)),
        }
    }
}

/// Parse JSONL suite text. Blank lines are skipped; line numbers are 1-based.
pub fn parse_suite(text: &str) -> Vec<SuiteEntry> {
    text.lines()
        .enumerate()
        .filter(|(_, line)| !line.trim().is_empty())
        .map(|(idx, line)| parse_suite_line(idx + 1, line))
        .collect()
}

fn parse_suite_line(line_no: usize, line: &str) -> SuiteEntry {
    let value: serde_json::Value = match serde_json::from_str(line) {
        Ok(v) => v,
        Err(e) => {
            return SuiteEntry::Invalid {
                line: line_no,
                task_id: None,
                protocol: None,
                reason: format!("malformed JSON: {e}"),
            }
        }
    };

    let raw_str = |key: &str| value.get(key).and_then(|v| v.as_str()).map(String::from);
    let task_id = raw_str("task_id");
    let protocol = raw_str("protocol");

    let invalid = |reason: String| SuiteEntry::Invalid {
        line: line_no,
        task_id: task_id.clone(),
        protocol: protocol.clone(),
        reason,
    };

    match serde_json::from_value::<Task>(value.clone()) {
        Ok(task) => match task.validate() {
            Ok(()) => SuiteEntry::Task(task),
            Err(e) => invalid(e.to_string()),
        },
        Err(e) => invalid(format!("invalid task: {e}")),
    }
}

pub fn load_suite(paths: &CatalogPaths, suite: &str) -> Result<Vec<SuiteEntry>> {
    if !is_plain_name(suite) {
        return Err(SpecGuardError::SuiteNotFound(suite.to_string()));
    }
    let path = paths.suite_path(suite);
    if !path.is_file() {
        return Err(SpecGuardError::SuiteNotFound(suite.to_string()));
    }
    let text = std::fs::read_to_string(&path)?;
    let entries = parse_suite(&text);
    debug!(suite = %suite, entries = entries.len(), "loaded suite");
    Ok(entries)
}

/// Filter entries to `protocol` (if given) and keep at most `limit`.
///
/// Invalid entries whose protocol cannot be determined are always kept so
/// that they still surface as records.
pub fn select_tasks(
    entries: Vec<SuiteEntry>,
    protocol: Option<Protocol>,
    limit: Option<usize>,
) -> Vec<SuiteEntry> {
    entries
        .into_iter()
        .filter(|e| protocol.map_or(true, |p| e.matches_protocol(p)))
        .take(limit.unwrap_or(usize::MAX))
        .collect()
}

pub fn list_suites(paths: &CatalogPaths) -> Result<Vec<String>> {
    list_stems(&paths.suites_dir, &[SUITE_EXTENSION])
}

fn list_stems(dir: &Path, extensions: &[&str]) -> Result<Vec<String>> {
    if !dir.is_dir() {
        return Ok(Vec::new());
    }
    let mut names = Vec::new();
    for entry in std::fs::read_dir(dir)? {
        let path = entry?.path();
        let matches_ext = path
            .extension()
            .and_then(|e| e.to_str())
            .is_some_and(|e| extensions.contains(&e));
        if !matches_ext {
            continue;
        }
        if let Some(stem) = path.file_stem().and_then(|s| s.to_str()) {
            names.push(stem.to_string());
        }
    }
    names.sort();
    names.dedup();
    Ok(names)
}
