//! Resolution matching
//!
//! Decides whether the one specific problem a repair targeted still shows up
//! in the post-repair diagnostics. Three strategies run in priority order and
//! short-circuit on the first hit: identifier equality is the strongest
//! signal and must win over positional heuristics, otherwise a coincidental
//! line overlap would report a surviving error as fixed.

use crate::catalogue::Problem;
use crate::extract::{Diagnostic, UNKNOWN_LINE};
use crate::signature::{ExactText, TextEquality};

pub const DEFAULT_LINE_TOLERANCE: i64 = 3;

/// Extra lines around the fixed area considered "touched by the fix" in the
/// position fallback.
const FIX_AREA_BUFFER: i64 = 2;

/// The original problem, reduced to the fields matching needs.
#[derive(Debug, Clone)]
pub struct OriginalError {
    pub summary: String,
    pub block_identifiers: String,
    pub line_start: i64,
    pub impacted_block_start_line: i64,
    pub impacted_block_end_line: i64,
}

impl OriginalError {
    pub fn from_problem(problem: &Problem) -> Self {
        Self {
            summary: problem.summary.clone(),
            block_identifiers: problem.block_identifiers.trim().to_string(),
            line_start: problem.line_start,
            impacted_block_start_line: problem.impacted_block_start_line,
            impacted_block_end_line: problem.impacted_block_end_line,
        }
    }
}

/// Where the repair was written, for the position fallback.
#[derive(Debug, Clone)]
pub struct FixContext {
    /// First line the replacement landed on (1 for whole-file repairs).
    pub start_line: i64,
    /// The replacement content; its line count bounds the affected area.
    pub replacement: String,
}

pub struct ErrorMatcher {
    line_tolerance: i64,
    text: Box<dyn TextEquality>,
}

impl Default for ErrorMatcher {
    fn default() -> Self {
        Self::new(DEFAULT_LINE_TOLERANCE)
    }
}

impl ErrorMatcher {
    pub fn new(line_tolerance: i64) -> Self {
        Self {
            line_tolerance,
            text: Box::new(ExactText),
        }
    }

    pub fn with_text_equality(mut self, text: Box<dyn TextEquality>) -> Self {
        self.text = text;
        self
    }

    /// Whether the original error line is clean after the repair.
    ///
    /// `None` when the original line is unknown; otherwise true iff no
    /// diagnostic resolves within `line_tolerance` lines of it.
    pub fn line_is_clean(&self, original_line: i64, diagnostics: &[Diagnostic]) -> Option<bool> {
        if original_line == UNKNOWN_LINE {
            return None;
        }

        for diagnostic in diagnostics {
            if diagnostic.line_start != UNKNOWN_LINE
                && (diagnostic.line_start - original_line).abs() <= self.line_tolerance
            {
                return Some(false);
            }
        }

        Some(true)
    }

    /// Whether the specific targeted error no longer appears.
    ///
    /// Any diagnostic matching one of the strategies means the error
    /// persists; no match across all diagnostics means it is fixed.
    pub fn specific_error_fixed(
        &self,
        original: &OriginalError,
        diagnostics: &[Diagnostic],
        fix: &FixContext,
    ) -> bool {
        for diagnostic in diagnostics {
            if self.matches_by_identifier(diagnostic, original) {
                return false;
            }
            if self.matches_by_position(diagnostic, original, fix) {
                return false;
            }
        }
        true
    }

    /// Strongest signal: same block identity, same summary, nearby line.
    /// Differing identities hand off to the renamed-block check.
    fn matches_by_identifier(&self, diagnostic: &Diagnostic, original: &OriginalError) -> bool {
        let current = diagnostic.block_identifiers.trim();
        let original_id = original.block_identifiers.as_str();

        if current.is_empty() || original_id.is_empty() {
            return false;
        }

        if current != original_id {
            return self.is_renamed_block_match(diagnostic, original);
        }

        if !self.text.text_equals(&diagnostic.summary, &original.summary) {
            return false;
        }

        self.position_matches(diagnostic.line_start, original.line_start)
    }

    /// A repairer renaming a block (aws_namespace -> aws_namespace_v1) while
    /// leaving the defect produces a different opaque identity at the same
    /// position. Same span, same summary: treat as the same logical error.
    fn is_renamed_block_match(&self, diagnostic: &Diagnostic, original: &OriginalError) -> bool {
        let current = diagnostic.block_identifiers.trim();
        if current.is_empty()
            || original.block_identifiers.is_empty()
            || current == original.block_identifiers
        {
            return false;
        }

        let line = diagnostic.line_start;
        let span_start = original.impacted_block_start_line;
        let span_end = original.impacted_block_end_line;
        if line == UNKNOWN_LINE || span_start == UNKNOWN_LINE {
            return false;
        }

        if span_start - self.line_tolerance <= line && line <= span_end + self.line_tolerance {
            return self.text.text_equals(&diagnostic.summary, &original.summary);
        }

        false
    }

    /// Weakest tier, used only when the diagnostic carries no block identity
    /// at all (locator failure): a same-summary finding inside the area the
    /// fix rewrote counts as persisting.
    fn matches_by_position(
        &self,
        diagnostic: &Diagnostic,
        original: &OriginalError,
        fix: &FixContext,
    ) -> bool {
        if !diagnostic.block_identifiers.trim().is_empty() {
            return false;
        }

        let line = diagnostic.line_start;
        if line == UNKNOWN_LINE {
            return false;
        }

        let replacement_lines = fix.replacement.lines().count() as i64;
        let check_start = fix.start_line - FIX_AREA_BUFFER;
        let check_end = fix.start_line + replacement_lines + FIX_AREA_BUFFER;

        if check_start <= line && line <= check_end {
            return self.text.text_equals(&diagnostic.summary, &original.summary);
        }

        false
    }

    fn position_matches(&self, error_line: i64, original_line: i64) -> bool {
        if error_line == UNKNOWN_LINE || original_line == UNKNOWN_LINE {
            return false;
        }
        (error_line - original_line).abs() <= self.line_tolerance
    }
}
