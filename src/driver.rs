//! Repair evaluation driver
//!
//! The sequential per-attempt loop: resolve the target file, apply the
//! candidate repair, re-validate the module, classify every resulting
//! diagnostic, judge whether the targeted problem is gone, persist the
//! evidence, and restore the original content. Attempts are processed one at
//! a time because each mutates the shared module directory; the validator
//! works on the directory, not a snapshot.

use crate::apply;
use crate::baseline::BaselineResolver;
use crate::catalogue::ProblemCatalogue;
use crate::categorize::ErrorCategorizer;
use crate::extract::{self, UNKNOWN_LINE};
use crate::history::HistoryTracker;
use crate::ledger::{DiagnosticRecord, Ledger};
use crate::matcher::{ErrorMatcher, FixContext, OriginalError, DEFAULT_LINE_TOLERANCE};
use crate::metrics::{self, OutcomeRecord, ResolutionVerdicts};
use crate::validate;
use anyhow::{anyhow, Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{info, warn};
use uuid::Uuid;

/// Directory name fixes tables and the catalogue address files under.
pub const CLONES_PREFIX: &str = "clones";

/// Which part of an attempt's payload is written into the target file.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RepairMode {
    /// Whole-file replacement only.
    File,
    /// Block-scoped replacement only.
    Block,
    /// Prefer whole-file, fall back to block.
    #[default]
    Auto,
}

impl RepairMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            RepairMode::File => "file",
            RepairMode::Block => "block",
            RepairMode::Auto => "auto",
        }
    }
}

/// One row of a fixes table: a candidate repair for one catalogued problem.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RepairAttempt {
    #[serde(default)]
    pub oid: String,
    #[serde(default)]
    pub iteration_id: String,
    #[serde(default)]
    pub llm_name: String,
    pub filename: String,
    #[serde(default)]
    pub project_name: Option<String>,
    /// Whole-file replacement content.
    #[serde(default)]
    pub fixed_file: Option<String>,
    /// Block-scoped replacement content.
    #[serde(default)]
    pub fixed_block_content: Option<String>,
    #[serde(default)]
    pub line_start: Option<i64>,
    #[serde(default)]
    pub line_end: Option<i64>,
}

/// Load a fixes table (JSONL, one attempt per line).
pub fn load_fixes(path: &Path) -> Result<Vec<RepairAttempt>> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read fixes table '{}'", path.display()))?;
    let mut attempts = Vec::new();
    for (idx, line) in content.lines().enumerate() {
        if line.trim().is_empty() {
            continue;
        }
        let attempt: RepairAttempt = serde_json::from_str(line).with_context(|| {
            format!("Failed to parse fixes row {} in '{}'", idx + 1, path.display())
        })?;
        attempts.push(attempt);
    }
    Ok(attempts)
}

#[derive(Debug, Clone)]
pub struct EvaluatorOptions {
    pub repair_mode: RepairMode,
    pub line_tolerance: i64,
    pub validate_timeout: Duration,
    pub init_modules: bool,
}

impl Default for EvaluatorOptions {
    fn default() -> Self {
        Self {
            repair_mode: RepairMode::Auto,
            line_tolerance: DEFAULT_LINE_TOLERANCE,
            validate_timeout: Duration::from_secs(300),
            init_modules: false,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, Serialize)]
pub struct BatchSummary {
    pub attempts: usize,
    pub evaluated: usize,
    pub skipped: usize,
    /// Attempts whose re-validation produced zero diagnostics.
    pub plausible: usize,
}

enum FixPlan {
    WholeFile(String),
    Block {
        content: String,
        start_line: i64,
        end_line: i64,
    },
}

pub struct RepairEvaluator {
    clones_root: PathBuf,
    ledger: Ledger,
    catalogue: Option<ProblemCatalogue>,
    categorizer: ErrorCategorizer,
    matcher: ErrorMatcher,
    options: EvaluatorOptions,
    run_id: String,
    initialized_modules: HashSet<PathBuf>,
}

impl RepairEvaluator {
    pub fn new(
        clones_root: PathBuf,
        ledger: Ledger,
        catalogue: Option<ProblemCatalogue>,
        options: EvaluatorOptions,
    ) -> Self {
        let categorizer = ErrorCategorizer::new(
            BaselineResolver::new(catalogue.clone()),
            HistoryTracker::new(ledger.clone()),
        );
        let matcher = ErrorMatcher::new(options.line_tolerance);
        Self {
            clones_root,
            ledger,
            catalogue,
            categorizer,
            matcher,
            options,
            run_id: Uuid::new_v4().to_string(),
            initialized_modules: HashSet::new(),
        }
    }

    pub fn run_id(&self) -> &str {
        &self.run_id
    }

    /// Evaluate every attempt in a fixes table, one at a time. Attempts that
    /// cannot be evaluated (missing file, no usable fix payload) are skipped
    /// with a warning; the batch keeps going.
    pub fn evaluate_fixes_file(&mut self, fixes_path: &Path) -> Result<BatchSummary> {
        let attempts = load_fixes(fixes_path)?;
        let mut summary = BatchSummary {
            attempts: attempts.len(),
            ..BatchSummary::default()
        };

        for attempt in &attempts {
            match self.evaluate_attempt(attempt) {
                Ok(outcome) => {
                    summary.evaluated += 1;
                    if outcome.module_total_errors == 0 {
                        summary.plausible += 1;
                    }
                }
                Err(error) => {
                    summary.skipped += 1;
                    warn!(
                        oid = %attempt.oid,
                        iteration = %attempt.iteration_id,
                        file = %attempt.filename,
                        %error,
                        "skipping attempt"
                    );
                }
            }
        }

        info!(
            fixes = %fixes_path.display(),
            attempts = summary.attempts,
            evaluated = summary.evaluated,
            skipped = summary.skipped,
            plausible = summary.plausible,
            "fixes table evaluated"
        );
        Ok(summary)
    }

    /// Evaluate one repair attempt: apply, validate, classify, judge,
    /// persist, restore. The restore handle guards the target file, so the
    /// original content comes back even when a step in between fails.
    pub fn evaluate_attempt(&mut self, attempt: &RepairAttempt) -> Result<OutcomeRecord> {
        let project = self
            .extract_project_name(attempt)
            .ok_or_else(|| anyhow!("cannot determine project name from '{}'", attempt.filename))?;
        let original_file = self.resolve_original_file(&attempt.filename);
        if !original_file.exists() {
            return Err(anyhow!("target file not found: {}", original_file.display()));
        }
        let module_dir = original_file
            .parent()
            .ok_or_else(|| anyhow!("target file has no parent module: {}", original_file.display()))?
            .to_path_buf();

        let plan = self
            .fix_plan(attempt)
            .ok_or_else(|| anyhow!("attempt carries no usable fix payload"))?;

        info!(
            oid = %attempt.oid,
            iteration = %attempt.iteration_id,
            repairer = %attempt.llm_name,
            file = %original_file.display(),
            mode = self.options.repair_mode.as_str(),
            "evaluating repair"
        );

        if self.options.init_modules && !self.initialized_modules.contains(&module_dir) {
            validate::init_module(&module_dir, self.options.validate_timeout)?;
            self.initialized_modules.insert(module_dir.clone());
        }

        let (applied, fix_context) = match &plan {
            FixPlan::WholeFile(content) => (
                apply::apply_whole_file(&original_file, content)?,
                FixContext {
                    start_line: 1,
                    replacement: content.clone(),
                },
            ),
            FixPlan::Block {
                content,
                start_line,
                end_line,
            } => (
                apply::apply_line_range(&original_file, *start_line, *end_line, content)?,
                FixContext {
                    start_line: *start_line,
                    replacement: content.clone(),
                },
            ),
        };

        let validation = validate::validate_module(&module_dir, self.options.validate_timeout)?;
        let project_root = self.clones_root.join(&project);
        let repo_prefix = format!("{}/{}", CLONES_PREFIX, project);
        let diagnostics = extract::extract_diagnostics(&validation, &project_root, &repo_prefix);

        let scope_oid = if attempt.oid.is_empty() {
            None
        } else {
            Some(attempt.oid.as_str())
        };
        let categorized = self.categorizer.categorize(
            diagnostics,
            &original_file,
            &attempt.iteration_id,
            scope_oid,
        )?;

        let raw_diagnostics: Vec<_> = categorized
            .iter()
            .map(|row| row.diagnostic.clone())
            .collect();
        let verdicts = self.resolution_verdicts(attempt, &raw_diagnostics, &fix_context);

        let counts = metrics::count_errors(&categorized, &attempt.filename);
        let outcome = metrics::build_outcome(
            &attempt.oid,
            &attempt.iteration_id,
            &attempt.llm_name,
            &attempt.filename,
            verdicts,
            &counts,
            &self.run_id,
        );

        let records: Vec<DiagnosticRecord> = categorized
            .into_iter()
            .map(|row| {
                DiagnosticRecord::new(
                    row.diagnostic,
                    row.category,
                    &attempt.iteration_id,
                    &attempt.oid,
                )
            })
            .collect();
        self.ledger.append_diagnostics(&records)?;
        self.ledger.append_outcome(&outcome)?;

        applied.restore()?;
        Ok(outcome)
    }

    /// Judge the targeted problem. Both verdicts stay unknown without a
    /// catalogue row to judge against.
    fn resolution_verdicts(
        &self,
        attempt: &RepairAttempt,
        diagnostics: &[crate::extract::Diagnostic],
        fix: &FixContext,
    ) -> ResolutionVerdicts {
        let Some(catalogue) = &self.catalogue else {
            return ResolutionVerdicts::default();
        };
        let Some(problem) = catalogue.by_oid(&attempt.oid) else {
            if !attempt.oid.is_empty() {
                warn!(oid = %attempt.oid, "no catalogue row for attempt oid");
            }
            return ResolutionVerdicts::default();
        };

        let original = OriginalError::from_problem(problem);
        ResolutionVerdicts {
            line_is_clean: self.matcher.line_is_clean(problem.line_start, diagnostics),
            specific_error_fixed: Some(
                self.matcher.specific_error_fixed(&original, diagnostics, fix),
            ),
        }
    }

    fn extract_project_name(&self, attempt: &RepairAttempt) -> Option<String> {
        if let Some(project) = &attempt.project_name {
            if !project.is_empty() {
                return Some(project.clone());
            }
        }
        let mut parts = attempt.filename.split('/');
        if parts.next()? == CLONES_PREFIX {
            let project = parts.next()?;
            if !project.is_empty() {
                return Some(project.to_string());
            }
        }
        None
    }

    fn resolve_original_file(&self, filename: &str) -> PathBuf {
        let relative = filename
            .strip_prefix(&format!("{}/", CLONES_PREFIX))
            .unwrap_or(filename);
        self.clones_root.join(relative)
    }

    /// Pick the fix payload per repair mode; auto prefers whole-file.
    fn fix_plan(&self, attempt: &RepairAttempt) -> Option<FixPlan> {
        let mode = self.options.repair_mode;

        if matches!(mode, RepairMode::File | RepairMode::Auto) {
            if let Some(content) = &attempt.fixed_file {
                return Some(FixPlan::WholeFile(content.clone()));
            }
        }

        if matches!(mode, RepairMode::Block | RepairMode::Auto) {
            let content = attempt.fixed_block_content.clone()?;
            let (start_line, end_line) = self.block_coordinates(attempt)?;
            return Some(FixPlan::Block {
                content,
                start_line,
                end_line,
            });
        }

        None
    }

    /// Block coordinates come from the catalogue when the attempt names a
    /// known problem, otherwise from the attempt row itself.
    fn block_coordinates(&self, attempt: &RepairAttempt) -> Option<(i64, i64)> {
        if !attempt.oid.is_empty() {
            if let Some(problem) = self
                .catalogue
                .as_ref()
                .and_then(|catalogue| catalogue.by_oid(&attempt.oid))
            {
                if problem.impacted_block_start_line != UNKNOWN_LINE
                    && problem.impacted_block_end_line != UNKNOWN_LINE
                {
                    return Some((
                        problem.impacted_block_start_line,
                        problem.impacted_block_end_line,
                    ));
                }
            }
        }

        match (attempt.line_start, attempt.line_end) {
            (Some(start), Some(end)) => Some((start, end)),
            _ => None,
        }
    }
}
