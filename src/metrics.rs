//! Outcome metrics
//!
//! Pure reductions over categorized diagnostics: per-attempt error counters
//! and the flat outcome record persisted for each repair attempt. No I/O and
//! no branching beyond counting by annotation flags.

use crate::categorize::CategorizedDiagnostic;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorCounts {
    pub total: usize,
    pub in_file: usize,
    pub in_module: usize,
    /// Ghost errors: still carrying a baseline category after the repair.
    pub baseline_remaining: usize,
    pub truly_novel: usize,
    pub introduced_this_iteration: usize,
}

/// Count categorized diagnostics at file and module scope.
///
/// `target_filename` is the ledger-relative name of the repaired file; rows
/// are file-scoped when their recorded filename matches it exactly.
pub fn count_errors(rows: &[CategorizedDiagnostic], target_filename: &str) -> ErrorCounts {
    let target = normalize_name(target_filename);

    ErrorCounts {
        total: rows.len(),
        in_file: rows
            .iter()
            .filter(|row| normalize_name(&row.diagnostic.filename) == target)
            .count(),
        in_module: rows.len(),
        baseline_remaining: rows.iter().filter(|row| row.category.is_baseline).count(),
        truly_novel: rows.iter().filter(|row| row.category.is_truly_novel).count(),
        introduced_this_iteration: rows
            .iter()
            .filter(|row| row.category.introduced_in_this_iteration)
            .count(),
    }
}

fn normalize_name(name: &str) -> String {
    name.replace('\\', "/").trim_matches('/').to_string()
}

/// Resolution verdicts for the specific problem a repair targeted.
///
/// Both stay `None` when no catalogue row was available to judge against.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ResolutionVerdicts {
    pub line_is_clean: Option<bool>,
    pub specific_error_fixed: Option<bool>,
}

/// One row per repair attempt in the outcomes table.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutcomeRecord {
    pub oid: String,
    pub iteration_id: String,
    pub llm_name: String,
    pub filename: String,
    pub line_is_clean: Option<bool>,
    pub specific_error_fixed: Option<bool>,
    pub module_total_errors: usize,
    pub file_errors: usize,
    pub module_errors: usize,
    /// Ghost errors from before the fix.
    pub original_errors_remaining: usize,
    /// Errors first observed in this attempt.
    pub introduced_this_iteration: usize,
    #[serde(default)]
    pub run_id: String,
    pub timestamp: DateTime<Utc>,
}

#[allow(clippy::too_many_arguments)]
pub fn build_outcome(
    oid: &str,
    iteration_id: &str,
    llm_name: &str,
    filename: &str,
    verdicts: ResolutionVerdicts,
    counts: &ErrorCounts,
    run_id: &str,
) -> OutcomeRecord {
    OutcomeRecord {
        oid: oid.to_string(),
        iteration_id: iteration_id.to_string(),
        llm_name: llm_name.to_string(),
        filename: filename.to_string(),
        line_is_clean: verdicts.line_is_clean,
        specific_error_fixed: verdicts.specific_error_fixed,
        module_total_errors: counts.total,
        file_errors: counts.in_file,
        module_errors: counts.in_module,
        original_errors_remaining: counts.baseline_remaining,
        introduced_this_iteration: counts.introduced_this_iteration,
        run_id: run_id.to_string(),
        timestamp: Utc::now(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::categorize::CategoryAnnotation;
    use crate::extract::{Diagnostic, UNKNOWN_LINE};

    fn row(filename: &str, category: CategoryAnnotation) -> CategorizedDiagnostic {
        CategorizedDiagnostic {
            diagnostic: Diagnostic {
                severity: "error".to_string(),
                summary: "S".to_string(),
                detail: String::new(),
                filename: filename.to_string(),
                line_start: 1,
                col_start: 1,
                line_end: 1,
                col_end: 1,
                file_content: String::new(),
                block_type: String::new(),
                block_identifiers: String::new(),
                impacted_block_start_line: UNKNOWN_LINE,
                impacted_block_end_line: UNKNOWN_LINE,
                impacted_block_content: String::new(),
            },
            category,
        }
    }

    fn baseline_category() -> CategoryAnnotation {
        CategoryAnnotation {
            is_baseline: true,
            first_seen_in: "baseline".to_string(),
            ..CategoryAnnotation::default()
        }
    }

    fn novel_category(iteration: &str) -> CategoryAnnotation {
        CategoryAnnotation {
            is_truly_novel: true,
            introduced_in_this_iteration: true,
            first_seen_in: iteration.to_string(),
            ..CategoryAnnotation::default()
        }
    }

    #[test]
    fn counts_split_by_category_and_scope() {
        let rows = vec![
            row("clones/p/main.tf", baseline_category()),
            row("clones/p/main.tf", novel_category("iter-1")),
            row("clones/p/outputs.tf", novel_category("iter-1")),
        ];

        let counts = count_errors(&rows, "clones/p/main.tf");
        assert_eq!(counts.total, 3);
        assert_eq!(counts.in_file, 2);
        assert_eq!(counts.in_module, 3);
        assert_eq!(counts.baseline_remaining, 1);
        assert_eq!(counts.truly_novel, 2);
        assert_eq!(counts.introduced_this_iteration, 2);
    }

    #[test]
    fn count_errors_normalizes_path_separators() {
        let rows = vec![row("clones\\p\\main.tf", baseline_category())];
        let counts = count_errors(&rows, "clones/p/main.tf");
        assert_eq!(counts.in_file, 1);
    }

    #[test]
    fn empty_rows_count_zero_everywhere() {
        let counts = count_errors(&[], "clones/p/main.tf");
        assert_eq!(counts, ErrorCounts::default());
    }

    #[test]
    fn outcome_record_carries_verdicts_and_counts() {
        let counts = ErrorCounts {
            total: 4,
            in_file: 2,
            in_module: 4,
            baseline_remaining: 1,
            truly_novel: 1,
            introduced_this_iteration: 1,
        };
        let verdicts = ResolutionVerdicts {
            line_is_clean: Some(true),
            specific_error_fixed: Some(false),
        };

        let outcome = build_outcome(
            "oid-1",
            "iter-1",
            "model-a",
            "clones/p/main.tf",
            verdicts,
            &counts,
            "run-1",
        );
        assert_eq!(outcome.line_is_clean, Some(true));
        assert_eq!(outcome.specific_error_fixed, Some(false));
        assert_eq!(outcome.module_total_errors, 4);
        assert_eq!(outcome.original_errors_remaining, 1);
        assert_eq!(outcome.introduced_this_iteration, 1);
        assert_eq!(outcome.run_id, "run-1");
    }

    #[test]
    fn unknown_verdicts_serialize_as_null() {
        let outcome = build_outcome(
            "oid-1",
            "iter-1",
            "model-a",
            "clones/p/main.tf",
            ResolutionVerdicts::default(),
            &ErrorCounts::default(),
            "run-1",
        );
        let json = serde_json::to_string(&outcome).unwrap();
        assert!(json.contains("\"line_is_clean\":null"));
        assert!(json.contains("\"specific_error_fixed\":null"));
    }
}
