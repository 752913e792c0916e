//! Problem catalogue
//!
//! The catalogue is the immutable table of baseline problems a batch run
//! evaluates repairs against: one row per catalogued defect, keyed by OID.
//! Loaded once per run; never mutated.

use crate::extract::unknown_line;
use anyhow::{anyhow, Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::Path;

/// One catalogued baseline problem.
///
/// `block_type` and `impacted_block_type` are stored split (the upstream
/// extraction keeps them separate); `block_identifiers` is the full identity
/// string used by the resolution matcher.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Problem {
    pub oid: String,
    pub filename: String,
    #[serde(default)]
    pub block_type: String,
    #[serde(default)]
    pub impacted_block_type: String,
    #[serde(default)]
    pub block_identifiers: String,
    pub summary: String,
    #[serde(default)]
    pub detail: String,
    #[serde(default = "unknown_line")]
    pub line_start: i64,
    #[serde(default = "unknown_line")]
    pub line_end: i64,
    #[serde(default = "unknown_line")]
    pub impacted_block_start_line: i64,
    #[serde(default = "unknown_line")]
    pub impacted_block_end_line: i64,
    #[serde(default)]
    pub impacted_block_content: String,
}

#[derive(Debug, Clone, Default)]
pub struct ProblemCatalogue {
    problems: Vec<Problem>,
}

impl ProblemCatalogue {
    /// Load a catalogue from a JSON array of problem rows.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read problem catalogue '{}'", path.display()))?;
        let problems: Vec<Problem> = serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse problem catalogue '{}'", path.display()))?;
        let catalogue = Self { problems };
        catalogue.validate()?;
        Ok(catalogue)
    }

    pub fn from_problems(problems: Vec<Problem>) -> Self {
        Self { problems }
    }

    fn validate(&self) -> Result<()> {
        let mut seen: HashSet<&str> = HashSet::new();
        for problem in &self.problems {
            if problem.oid.trim().is_empty() {
                return Err(anyhow!("Catalogue problem with empty oid"));
            }
            if problem.filename.trim().is_empty() {
                return Err(anyhow!("Catalogue problem '{}' has no filename", problem.oid));
            }
            if !seen.insert(problem.oid.as_str()) {
                return Err(anyhow!("Duplicate catalogue oid '{}'", problem.oid));
            }
        }
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.problems.len()
    }

    pub fn is_empty(&self) -> bool {
        self.problems.is_empty()
    }

    /// Look a problem up by OID (string-compared).
    pub fn by_oid(&self, oid: &str) -> Option<&Problem> {
        self.problems.iter().find(|problem| problem.oid == oid)
    }

    /// All problems whose stored filename contains the base filename of
    /// `file`. Substring containment is deliberate: the catalogue and the
    /// live tree often disagree on path prefixes.
    pub fn for_file(&self, file: &Path) -> Vec<&Problem> {
        let base = crate::util::base_filename(file);
        if base.is_empty() {
            return Vec::new();
        }
        self.problems
            .iter()
            .filter(|problem| problem.filename.contains(&base))
            .collect()
    }

    pub fn oids(&self) -> HashSet<String> {
        self.problems.iter().map(|p| p.oid.clone()).collect()
    }
}
