//! Baseline resolution
//!
//! Produces the set of error signatures that existed in a file before any
//! repair attempt, derived from the problem catalogue. Memoized per file for
//! the lifetime of a batch run; the cache is owned here and injected into the
//! categorizer by its caller, never ambient process state.

use crate::catalogue::{Problem, ProblemCatalogue};
use crate::signature;
use anyhow::Result;
use std::collections::{HashMap, HashSet};
use std::path::Path;
use tracing::debug;

/// Assemble the catalogue's split block fields into the single identity shape
/// signatures expect: both fields joined, the impacted type alone, or empty.
fn catalogue_block_identity(problem: &Problem) -> String {
    let block_type = problem.block_type.trim();
    let impacted = problem.impacted_block_type.trim();
    if !block_type.is_empty() && !impacted.is_empty() {
        format!("{} {}", block_type, impacted)
    } else if !impacted.is_empty() {
        impacted.to_string()
    } else {
        String::new()
    }
}

pub struct BaselineResolver {
    catalogue: Option<ProblemCatalogue>,
    cache: HashMap<String, HashSet<String>>,
}

impl BaselineResolver {
    pub fn new(catalogue: Option<ProblemCatalogue>) -> Self {
        Self {
            catalogue,
            cache: HashMap::new(),
        }
    }

    /// Whether a catalogue was supplied. Without one, every baseline lookup
    /// is empty and downstream verdicts must stay "unknown" rather than
    /// claiming novelty.
    pub fn has_catalogue(&self) -> bool {
        self.catalogue.is_some()
    }

    /// Baseline signatures for a file, computed once and cached for the run.
    pub fn baseline_signatures(&mut self, file: &Path) -> Result<HashSet<String>> {
        let key = file.to_string_lossy().to_string();
        if let Some(cached) = self.cache.get(&key) {
            debug!(file = %key, count = cached.len(), "baseline cache hit");
            return Ok(cached.clone());
        }

        let signatures = match &self.catalogue {
            None => {
                debug!(file = %key, "no problem catalogue supplied; baseline is empty");
                HashSet::new()
            }
            Some(catalogue) => {
                let mut signatures = HashSet::new();
                for problem in catalogue.for_file(file) {
                    let block_identity = catalogue_block_identity(problem);
                    let sig = signature::signature(
                        &problem.filename,
                        &block_identity,
                        problem.line_start,
                        &problem.summary,
                        &problem.detail,
                    )?;
                    signatures.insert(sig);
                }
                debug!(file = %key, count = signatures.len(), "baseline computed from catalogue");
                signatures
            }
        };

        self.cache.insert(key, signatures.clone());
        Ok(signatures)
    }
}
