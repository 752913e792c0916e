//! Error categorization
//!
//! Classifies each post-repair diagnostic against the baseline and the
//! cross-attempt history. The priority order is strict: baseline dominates
//! history, history dominates novel. Baseline membership means "pre-existing
//! defect, not caused by any repair" and must never be reclassified as new
//! just because another attempt also failed to fix it.

use crate::baseline::BaselineResolver;
use crate::extract::Diagnostic;
use crate::history::HistoryTracker;
use crate::signature::diagnostic_signature;
use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Provenance annotations attached to one diagnostic after classification.
///
/// Exactly one of `is_baseline`, `is_in_other_iteration`, `is_truly_novel`
/// holds; `introduced_in_this_iteration` is true iff the diagnostic is truly
/// novel in the current attempt's run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CategoryAnnotation {
    pub is_baseline: bool,
    pub is_in_other_iteration: bool,
    pub is_truly_novel: bool,
    pub introduced_in_this_iteration: bool,
    /// "baseline", or the iteration id that first recorded the signature.
    #[serde(default)]
    pub first_seen_in: String,
    #[serde(default)]
    pub exists_in_iterations: Vec<String>,
}

#[derive(Debug, Clone)]
pub struct CategorizedDiagnostic {
    pub diagnostic: Diagnostic,
    pub category: CategoryAnnotation,
}

pub struct ErrorCategorizer {
    baseline: BaselineResolver,
    history: HistoryTracker,
}

impl ErrorCategorizer {
    pub fn new(baseline: BaselineResolver, history: HistoryTracker) -> Self {
        Self { baseline, history }
    }

    pub fn has_catalogue(&self) -> bool {
        self.baseline.has_catalogue()
    }

    /// Annotate diagnostics for one attempt.
    ///
    /// Idempotent for a fixed baseline/history snapshot: the same inputs
    /// always produce the same annotations.
    pub fn categorize(
        &mut self,
        diagnostics: Vec<Diagnostic>,
        original_file: &Path,
        iteration_id: &str,
        scope_oid: Option<&str>,
    ) -> Result<Vec<CategorizedDiagnostic>> {
        let baseline = self.baseline.baseline_signatures(original_file)?;
        let history = self
            .history
            .existing_errors(original_file, iteration_id, scope_oid)?;

        let mut rows = Vec::with_capacity(diagnostics.len());
        for diagnostic in diagnostics {
            let sig = diagnostic_signature(&diagnostic)?;

            let category = if baseline.contains(&sig) {
                CategoryAnnotation {
                    is_baseline: true,
                    is_in_other_iteration: false,
                    is_truly_novel: false,
                    introduced_in_this_iteration: false,
                    first_seen_in: "baseline".to_string(),
                    exists_in_iterations: Vec::new(),
                }
            } else if let Some(seen) = history.get(&sig) {
                CategoryAnnotation {
                    is_baseline: false,
                    is_in_other_iteration: true,
                    is_truly_novel: false,
                    introduced_in_this_iteration: false,
                    first_seen_in: seen.first_iteration.clone(),
                    exists_in_iterations: seen.iterations.clone(),
                }
            } else {
                CategoryAnnotation {
                    is_baseline: false,
                    is_in_other_iteration: false,
                    is_truly_novel: true,
                    introduced_in_this_iteration: true,
                    first_seen_in: if iteration_id.is_empty() {
                        "unknown".to_string()
                    } else {
                        iteration_id.to_string()
                    },
                    exists_in_iterations: Vec::new(),
                }
            };

            rows.push(CategorizedDiagnostic {
                diagnostic,
                category,
            });
        }

        Ok(rows)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalogue::{Problem, ProblemCatalogue};
    use crate::extract::UNKNOWN_LINE;
    use crate::ledger::{DiagnosticRecord, Ledger};
    use std::path::PathBuf;
    use tempfile::TempDir;

    fn diagnostic(block: &str, line: i64, summary: &str) -> Diagnostic {
        Diagnostic {
            severity: "error".to_string(),
            summary: summary.to_string(),
            detail: String::new(),
            filename: "clones/p/main.tf".to_string(),
            line_start: line,
            col_start: 1,
            line_end: line,
            col_end: 5,
            file_content: String::new(),
            block_type: String::new(),
            block_identifiers: block.to_string(),
            impacted_block_start_line: UNKNOWN_LINE,
            impacted_block_end_line: UNKNOWN_LINE,
            impacted_block_content: String::new(),
        }
    }

    fn problem(oid: &str, block_type: &str, impacted: &str, summary: &str) -> Problem {
        Problem {
            oid: oid.to_string(),
            filename: "clones/p/main.tf".to_string(),
            block_type: block_type.to_string(),
            impacted_block_type: impacted.to_string(),
            block_identifiers: format!("{} {}", block_type, impacted),
            summary: summary.to_string(),
            detail: String::new(),
            line_start: 10,
            line_end: 12,
            impacted_block_start_line: 10,
            impacted_block_end_line: 15,
            impacted_block_content: String::new(),
        }
    }

    fn categorizer(
        tmp: &TempDir,
        catalogue: Option<ProblemCatalogue>,
        seeded: Vec<DiagnosticRecord>,
    ) -> ErrorCategorizer {
        let ledger = Ledger::new(
            tmp.path().join("diagnostics.jsonl"),
            tmp.path().join("outcomes.jsonl"),
        );
        ledger.append_diagnostics(&seeded).unwrap();
        ErrorCategorizer::new(
            BaselineResolver::new(catalogue),
            HistoryTracker::new(ledger),
        )
    }

    #[test]
    fn baseline_dominates_history() {
        let tmp = TempDir::new().unwrap();
        let catalogue = ProblemCatalogue::from_problems(vec![problem(
            "oid-1",
            "resource",
            "aws_instance web",
            "X",
        )]);
        // The same signature also exists in another iteration's records.
        let seeded = vec![DiagnosticRecord::new(
            diagnostic("resource aws_instance web", 10, "X"),
            CategoryAnnotation::default(),
            "iter-1",
            "oid-1",
        )];
        let mut categorizer = categorizer(&tmp, Some(catalogue), seeded);

        let rows = categorizer
            .categorize(
                vec![diagnostic("resource aws_instance web", 10, "X")],
                &PathBuf::from("clones/p/main.tf"),
                "iter-2",
                Some("oid-1"),
            )
            .unwrap();

        assert!(rows[0].category.is_baseline);
        assert!(!rows[0].category.is_in_other_iteration);
        assert!(!rows[0].category.is_truly_novel);
        assert!(!rows[0].category.introduced_in_this_iteration);
        assert_eq!(rows[0].category.first_seen_in, "baseline");
    }

    #[test]
    fn three_way_split_matches_provenance() {
        // Baseline has X; attempt 1 (for another problem) introduced Y;
        // attempt 2 re-validates and produces X, Y and Z.
        let tmp = TempDir::new().unwrap();
        let catalogue = ProblemCatalogue::from_problems(vec![problem(
            "oid-1",
            "resource",
            "aws_instance web",
            "X",
        )]);
        let seeded = vec![DiagnosticRecord::new(
            diagnostic("resource aws_s3_bucket logs", 30, "Y"),
            CategoryAnnotation::default(),
            "attempt-1",
            "oid-a",
        )];
        let mut categorizer = categorizer(&tmp, Some(catalogue), seeded);

        let rows = categorizer
            .categorize(
                vec![
                    diagnostic("resource aws_instance web", 10, "X"),
                    diagnostic("resource aws_s3_bucket logs", 30, "Y"),
                    diagnostic("resource aws_db_instance db", 50, "Z"),
                ],
                &PathBuf::from("clones/p/main.tf"),
                "attempt-2",
                None,
            )
            .unwrap();

        assert!(rows[0].category.is_baseline);

        assert!(rows[1].category.is_in_other_iteration);
        assert!(!rows[1].category.introduced_in_this_iteration);
        assert_eq!(rows[1].category.first_seen_in, "attempt-1");
        assert_eq!(
            rows[1].category.exists_in_iterations,
            vec!["attempt-1".to_string()]
        );

        assert!(rows[2].category.is_truly_novel);
        assert!(rows[2].category.introduced_in_this_iteration);
        assert_eq!(rows[2].category.first_seen_in, "attempt-2");
    }

    #[test]
    fn categorize_is_idempotent_for_a_fixed_snapshot() {
        let tmp = TempDir::new().unwrap();
        let catalogue = ProblemCatalogue::from_problems(vec![problem(
            "oid-1",
            "resource",
            "aws_instance web",
            "X",
        )]);
        let mut categorizer = categorizer(&tmp, Some(catalogue), Vec::new());

        let input = vec![
            diagnostic("resource aws_instance web", 10, "X"),
            diagnostic("", 42, "Z"),
        ];
        let file = PathBuf::from("clones/p/main.tf");

        let first = categorizer
            .categorize(input.clone(), &file, "iter-1", None)
            .unwrap();
        let second = categorizer
            .categorize(input, &file, "iter-1", None)
            .unwrap();

        let first_categories: Vec<&CategoryAnnotation> =
            first.iter().map(|row| &row.category).collect();
        let second_categories: Vec<&CategoryAnnotation> =
            second.iter().map(|row| &row.category).collect();
        assert_eq!(first_categories, second_categories);
    }

    #[test]
    fn without_catalogue_nothing_is_baseline() {
        let tmp = TempDir::new().unwrap();
        let mut categorizer = categorizer(&tmp, None, Vec::new());
        assert!(!categorizer.has_catalogue());

        let rows = categorizer
            .categorize(
                vec![diagnostic("resource aws_instance web", 10, "X")],
                &PathBuf::from("clones/p/main.tf"),
                "iter-1",
                None,
            )
            .unwrap();
        assert!(!rows[0].category.is_baseline);
        assert!(rows[0].category.is_truly_novel);
    }
}
