//! Diagnostic extraction
//!
//! Flattens a validator result into one row per finding, attaching the source
//! content of the referenced file and the enclosing block context so identity
//! checks downstream never have to touch the module directory again.

use crate::blocks;
use crate::validate::ValidationResult;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

/// Sentinel for an unknown line or column.
pub const UNKNOWN_LINE: i64 = -1;

pub(crate) fn unknown_line() -> i64 {
    UNKNOWN_LINE
}

/// One validator finding, re-created fresh on every validation run.
///
/// Carries no cross-run identity of its own; `signature::diagnostic_signature`
/// derives one from these fields.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Diagnostic {
    pub severity: String,
    pub summary: String,
    #[serde(default)]
    pub detail: String,
    pub filename: String,
    #[serde(default = "unknown_line")]
    pub line_start: i64,
    #[serde(default = "unknown_line")]
    pub col_start: i64,
    #[serde(default = "unknown_line")]
    pub line_end: i64,
    #[serde(default = "unknown_line")]
    pub col_end: i64,
    #[serde(default)]
    pub file_content: String,
    #[serde(default)]
    pub block_type: String,
    /// Full block identity, e.g. "resource aws_instance web". Empty when the
    /// locator could not resolve an enclosing block.
    #[serde(default)]
    pub block_identifiers: String,
    #[serde(default = "unknown_line")]
    pub impacted_block_start_line: i64,
    #[serde(default = "unknown_line")]
    pub impacted_block_end_line: i64,
    #[serde(default)]
    pub impacted_block_content: String,
}

impl Diagnostic {
    pub fn has_block_identity(&self) -> bool {
        !self.block_identifiers.trim().is_empty()
    }
}

/// Read every `.tf` file under the module directory into memory.
fn load_tf_files(module_dir: &Path) -> HashMap<PathBuf, String> {
    let mut cache = HashMap::new();
    for entry in WalkDir::new(module_dir)
        .into_iter()
        .filter_map(|entry| entry.ok())
    {
        if !entry.file_type().is_file() {
            continue;
        }
        let path = entry.path();
        if path.extension().map(|ext| ext == "tf").unwrap_or(false) {
            if let Ok(content) = std::fs::read_to_string(path) {
                cache.insert(path.to_path_buf(), content);
            }
        }
    }
    cache
}

/// Convert a validation result into flat diagnostic rows.
///
/// `repo_prefix` is the ledger-relative prefix for this project, e.g.
/// "clones/terraform-aws-vpc"; row filenames are always recorded relative to
/// it so the catalogue and the ledger agree on naming. Findings the validator
/// could not attach to a file are recorded against the module directory
/// itself, with the content of every `.tf` file concatenated for context.
pub fn extract_diagnostics(
    result: &ValidationResult,
    project_root: &Path,
    repo_prefix: &str,
) -> Vec<Diagnostic> {
    let module_dir = &result.module_dir;
    let working_dir = module_dir
        .strip_prefix(project_root)
        .map(|p| p.to_string_lossy().replace('\\', "/"))
        .unwrap_or_default();

    let tf_cache = load_tf_files(module_dir);
    let mut rows = Vec::new();

    for diag in &result.diagnostics {
        let (filename_raw, line_start, col_start, line_end, col_end) = match &diag.range {
            Some(range) => (
                range.filename.clone(),
                range.start.line,
                range.start.column,
                range.end.line,
                range.end.column,
            ),
            None => (
                String::new(),
                UNKNOWN_LINE,
                UNKNOWN_LINE,
                UNKNOWN_LINE,
                UNKNOWN_LINE,
            ),
        };

        let mut row = Diagnostic {
            severity: diag.severity.clone(),
            summary: diag.summary.clone(),
            detail: diag.detail.clone(),
            filename: String::new(),
            line_start,
            col_start,
            line_end,
            col_end,
            file_content: String::new(),
            block_type: String::new(),
            block_identifiers: String::new(),
            impacted_block_start_line: UNKNOWN_LINE,
            impacted_block_end_line: UNKNOWN_LINE,
            impacted_block_content: String::new(),
        };

        if !filename_raw.is_empty() {
            let system_path = module_dir.join(&filename_raw);
            let relative = if working_dir.is_empty() {
                filename_raw.clone()
            } else {
                format!("{}/{}", working_dir, filename_raw)
            };
            row.filename = format!("{}/{}", repo_prefix, relative);
            row.file_content = tf_cache
                .get(&system_path)
                .cloned()
                .unwrap_or_else(|| "[FILE NOT FOUND]".to_string());

            if let Some(block) = blocks::locate_enclosing_block(&row.file_content, row.line_start)
            {
                row.block_type = block.kind;
                row.block_identifiers = block.identity;
                row.impacted_block_start_line = block.start_line;
                row.impacted_block_end_line = block.end_line;
                row.impacted_block_content = block.content;
            }
        } else {
            // Module-wide finding: record it against the module directory so
            // every row carries a non-empty path, and include all source files.
            row.filename = if working_dir.is_empty() {
                repo_prefix.to_string()
            } else {
                format!("{}/{}", repo_prefix, working_dir)
            };
            let mut content = Vec::new();
            let mut paths: Vec<&PathBuf> = tf_cache.keys().collect();
            paths.sort();
            for path in paths {
                let posix = path.to_string_lossy().replace('\\', "/");
                content.push(format!("\n##### FILE: {}\n{}", posix, tf_cache[path]));
            }
            row.file_content = content.join("\n");
        }

        rows.push(row);
    }

    rows
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::validate::{RawDiagnostic, RawPos, RawRange};
    use std::fs;
    use tempfile::TempDir;

    fn write_module(dir: &Path) {
        fs::write(
            dir.join("main.tf"),
            "resource \"aws_instance\" \"web\" {\n  ami = \"abc\"\n}\n",
        )
        .unwrap();
    }

    fn raw_diag(filename: &str, line: i64) -> RawDiagnostic {
        RawDiagnostic {
            severity: "error".to_string(),
            summary: "Unsupported argument".to_string(),
            detail: "An argument named \"ami\" is not expected here.".to_string(),
            range: if filename.is_empty() {
                None
            } else {
                Some(RawRange {
                    filename: filename.to_string(),
                    start: RawPos { line, column: 3 },
                    end: RawPos { line, column: 6 },
                })
            },
        }
    }

    #[test]
    fn extract_attaches_file_content_and_block_context() {
        let tmp = TempDir::new().unwrap();
        write_module(tmp.path());

        let result = ValidationResult {
            module_dir: tmp.path().to_path_buf(),
            success: false,
            diagnostics: vec![raw_diag("main.tf", 2)],
        };

        let rows = extract_diagnostics(&result, tmp.path(), "clones/demo");
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].filename, "clones/demo/main.tf");
        assert_eq!(rows[0].line_start, 2);
        assert!(rows[0].file_content.contains("aws_instance"));
        assert_eq!(rows[0].block_type, "resource");
        assert_eq!(rows[0].block_identifiers, "resource aws_instance web");
        assert_eq!(rows[0].impacted_block_start_line, 1);
        assert_eq!(rows[0].impacted_block_end_line, 3);
    }

    #[test]
    fn extract_records_module_wide_findings_against_module_dir() {
        let tmp = TempDir::new().unwrap();
        write_module(tmp.path());

        let result = ValidationResult {
            module_dir: tmp.path().to_path_buf(),
            success: false,
            diagnostics: vec![raw_diag("", UNKNOWN_LINE)],
        };

        let rows = extract_diagnostics(&result, tmp.path(), "clones/demo");
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].filename, "clones/demo");
        assert_eq!(rows[0].line_start, UNKNOWN_LINE);
        assert!(rows[0].file_content.contains("##### FILE:"));
        assert!(!rows[0].has_block_identity());
    }

    #[test]
    fn extract_preserves_nested_module_working_dir() {
        let tmp = TempDir::new().unwrap();
        let module = tmp.path().join("modules").join("vpc");
        fs::create_dir_all(&module).unwrap();
        write_module(&module);

        let result = ValidationResult {
            module_dir: module,
            success: false,
            diagnostics: vec![raw_diag("main.tf", 1)],
        };

        let rows = extract_diagnostics(&result, tmp.path(), "clones/demo");
        assert_eq!(rows[0].filename, "clones/demo/modules/vpc/main.tf");
    }
}
