//! Error signatures
//!
//! A signature is the identity key used to compare diagnostics across
//! validation runs. Block identity is preferred over line numbers because
//! line numbers shift whenever code is rewritten; the line form is only a
//! fallback for findings with no resolvable block. Every consumer (baseline,
//! history, categorizer) must build signatures through this module so there
//! is exactly one scheme in the system.

use crate::extract::Diagnostic;
use anyhow::{bail, Result};

/// Pluggable text comparison for summaries and details.
///
/// The default is exact string equality; normalization (whitespace or case
/// folding) can be introduced later without touching any matching algorithm.
pub trait TextEquality {
    fn text_equals(&self, a: &str, b: &str) -> bool;
}

/// Exact, byte-for-byte text comparison.
#[derive(Debug, Clone, Copy, Default)]
pub struct ExactText;

impl TextEquality for ExactText {
    fn text_equals(&self, a: &str, b: &str) -> bool {
        a == b
    }
}

/// Build a signature from raw parts.
///
/// Errors when `filename` is empty: a signature without a file path is
/// meaningless and indicates a caller bug, not noisy evidence.
pub fn signature(
    filename: &str,
    block_identifiers: &str,
    line_start: i64,
    summary: &str,
    detail: &str,
) -> Result<String> {
    if filename.trim().is_empty() {
        bail!("cannot build an error signature without a file path");
    }
    let block = block_identifiers.trim();
    if !block.is_empty() {
        Ok(format!("{}|{}|{}|{}", filename, block, summary, detail))
    } else {
        Ok(format!(
            "{}|line_{}|{}|{}",
            filename, line_start, summary, detail
        ))
    }
}

/// Signature of one extracted diagnostic.
pub fn diagnostic_signature(diagnostic: &Diagnostic) -> Result<String> {
    signature(
        &diagnostic.filename,
        &diagnostic.block_identifiers,
        diagnostic.line_start,
        &diagnostic.summary,
        &diagnostic.detail,
    )
}
