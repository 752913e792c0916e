//! Cross-attempt error history
//!
//! Answers "has this signature been seen in some other repair attempt for
//! this file?" by scanning the persisted diagnostics ledger. Scoping by the
//! originating problem OID exists because without it, an error left behind by
//! an unrelated problem on the same file would count as "seen before" for
//! this one. Memoized per (file, excluded iteration, scope) for the run.

use crate::ledger::Ledger;
use crate::signature::diagnostic_signature;
use crate::util::base_filename;
use anyhow::Result;
use std::collections::HashMap;
use std::path::Path;
use tracing::debug;

/// Where and how often a signature has appeared in other iterations.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignatureHistory {
    /// First iteration observed in ledger scan order. Rows are appended
    /// newest-last, so scan order tracks when rows were written.
    pub first_iteration: String,
    pub iterations: Vec<String>,
}

pub struct HistoryTracker {
    ledger: Ledger,
    cache: HashMap<String, HashMap<String, SignatureHistory>>,
}

impl HistoryTracker {
    pub fn new(ledger: Ledger) -> Self {
        Self {
            ledger,
            cache: HashMap::new(),
        }
    }

    /// Signatures recorded for this file by iterations other than
    /// `excluding_iteration`, optionally restricted to records whose
    /// originating problem OID equals `scope_oid`.
    pub fn existing_errors(
        &mut self,
        file: &Path,
        excluding_iteration: &str,
        scope_oid: Option<&str>,
    ) -> Result<HashMap<String, SignatureHistory>> {
        let cache_key = format!(
            "{}|{}|{}",
            file.display(),
            excluding_iteration,
            scope_oid.unwrap_or("")
        );
        if let Some(cached) = self.cache.get(&cache_key) {
            debug!(key = %cache_key, signatures = cached.len(), "history cache hit");
            return Ok(cached.clone());
        }

        let base = base_filename(file);
        let mut errors: HashMap<String, SignatureHistory> = HashMap::new();

        for record in self.ledger.load_diagnostics()? {
            if !record.diagnostic.filename.contains(&base) {
                continue;
            }
            if record.iteration_id == excluding_iteration {
                continue;
            }
            if let Some(oid) = scope_oid {
                if record.original_problem_oid != oid {
                    continue;
                }
            }

            let sig = diagnostic_signature(&record.diagnostic)?;
            let iteration = if record.iteration_id.is_empty() {
                "unknown".to_string()
            } else {
                record.iteration_id.clone()
            };

            match errors.get_mut(&sig) {
                Some(history) => {
                    if !history.iterations.contains(&iteration) {
                        history.iterations.push(iteration);
                    }
                }
                None => {
                    errors.insert(
                        sig,
                        SignatureHistory {
                            first_iteration: iteration.clone(),
                            iterations: vec![iteration],
                        },
                    );
                }
            }
        }

        debug!(
            key = %cache_key,
            signatures = errors.len(),
            "history scanned from ledger"
        );
        self.cache.insert(cache_key, errors.clone());
        Ok(errors)
    }
}
