//! Terraform validation
//!
//! Thin wrapper around `terraform validate -json`: run the subprocess with a
//! timeout, parse the diagnostics payload, and degrade to zero diagnostics
//! when the output cannot be parsed. `init_module` is the one-shot
//! `terraform init` companion a module needs before its first validation.

use crate::util::{run_command_with_timeout, tail_chars};
use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::process::Command;
use std::time::Duration;
use tracing::{debug, warn};

const OUTPUT_TAIL_MAX_CHARS: usize = 2_000;

#[derive(Debug, Clone, Deserialize)]
pub struct RawPos {
    #[serde(default = "crate::extract::unknown_line")]
    pub line: i64,
    #[serde(default = "crate::extract::unknown_line")]
    pub column: i64,
}

impl Default for RawPos {
    fn default() -> Self {
        Self {
            line: crate::extract::UNKNOWN_LINE,
            column: crate::extract::UNKNOWN_LINE,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct RawRange {
    #[serde(default)]
    pub filename: String,
    #[serde(default)]
    pub start: RawPos,
    #[serde(default)]
    pub end: RawPos,
}

/// One diagnostic as emitted by `terraform validate -json`.
#[derive(Debug, Clone, Deserialize)]
pub struct RawDiagnostic {
    #[serde(default)]
    pub severity: String,
    #[serde(default)]
    pub summary: String,
    #[serde(default)]
    pub detail: String,
    #[serde(default)]
    pub range: Option<RawRange>,
}

#[derive(Debug, Clone, Deserialize)]
struct ValidateJson {
    #[serde(default)]
    diagnostics: Vec<RawDiagnostic>,
}

#[derive(Debug, Clone)]
pub struct ValidationResult {
    pub module_dir: PathBuf,
    pub success: bool,
    pub diagnostics: Vec<RawDiagnostic>,
}

/// Parse validator stdout. `None` means the payload was not JSON we know.
pub fn parse_validate_output(stdout: &str) -> Option<Vec<RawDiagnostic>> {
    serde_json::from_str::<ValidateJson>(stdout)
        .ok()
        .map(|parsed| parsed.diagnostics)
}

/// Run `terraform validate -no-color -json` in a module directory.
///
/// Safe to call repeatedly once the module is initialized. Unparsable output
/// is treated as zero diagnostics, not an error; only a failure to start or
/// wait on the subprocess propagates.
pub fn validate_module(module_dir: &Path, timeout: Duration) -> Result<ValidationResult> {
    debug!(module = %module_dir.display(), "validating module");

    let mut command = Command::new("terraform");
    command
        .current_dir(module_dir)
        .args(["validate", "-no-color", "-json"]);

    let run = run_command_with_timeout(&mut command, timeout)
        .map_err(anyhow::Error::msg)
        .with_context(|| format!("Failed to run terraform validate in '{}'", module_dir.display()))?;

    let success = !run.timed_out && run.status.map(|s| s.success()).unwrap_or(false);
    if run.timed_out {
        warn!(module = %module_dir.display(), "terraform validate timed out");
    }

    let diagnostics = match parse_validate_output(&run.stdout) {
        Some(diagnostics) => diagnostics,
        None => {
            warn!(
                module = %module_dir.display(),
                stderr = %tail_chars(&run.stderr, OUTPUT_TAIL_MAX_CHARS),
                "could not decode terraform validate JSON; assuming zero diagnostics"
            );
            Vec::new()
        }
    };

    Ok(ValidationResult {
        module_dir: module_dir.to_path_buf(),
        success,
        diagnostics,
    })
}

/// Run `terraform init` once for a module. Returns whether init succeeded.
pub fn init_module(module_dir: &Path, timeout: Duration) -> Result<bool> {
    debug!(module = %module_dir.display(), "initializing module");

    let mut command = Command::new("terraform");
    command
        .current_dir(module_dir)
        .args(["init", "-input=false", "-backend=false", "-no-color"]);

    let run = run_command_with_timeout(&mut command, timeout)
        .map_err(anyhow::Error::msg)
        .with_context(|| format!("Failed to run terraform init in '{}'", module_dir.display()))?;

    let success = !run.timed_out && run.status.map(|s| s.success()).unwrap_or(false);
    if !success {
        warn!(
            module = %module_dir.display(),
            stderr = %tail_chars(&run.stderr, OUTPUT_TAIL_MAX_CHARS),
            "terraform init failed"
        );
    }
    Ok(success)
}
