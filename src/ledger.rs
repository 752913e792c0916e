//! Persisted diagnostics and outcomes
//!
//! Two append-only JSONL tables: one diagnostic row per post-repair finding
//! (the evidence the history tracker scans on later attempts) and one outcome
//! row per repair attempt. The schema is fixed by the serde structs; rows are
//! appended newest-last and loaded tolerantly, skipping lines that no longer
//! parse. Advisory file locks keep concurrent batch runs on distinct modules
//! from interleaving partial writes.

use crate::categorize::CategoryAnnotation;
use crate::extract::Diagnostic;
use crate::metrics::OutcomeRecord;
use crate::util::hash_str;
use anyhow::{Context, Result};
use fs2::FileExt;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::fs::{self, File, OpenOptions};
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

const LOCK_TIMEOUT_SECS: u64 = 5;
const LOCK_RETRY_MS: u64 = 50;

/// One persisted post-repair diagnostic.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DiagnosticRecord {
    /// Row identity: stable hash of filename and line span.
    pub record_oid: String,
    pub iteration_id: String,
    /// OID of the problem this attempt targeted; empty when unscoped.
    #[serde(default)]
    pub original_problem_oid: String,
    #[serde(flatten)]
    pub diagnostic: Diagnostic,
    #[serde(flatten)]
    pub category: CategoryAnnotation,
}

impl DiagnosticRecord {
    pub fn new(
        diagnostic: Diagnostic,
        category: CategoryAnnotation,
        iteration_id: &str,
        original_problem_oid: &str,
    ) -> Self {
        let record_oid = hash_str(&format!(
            "{}|{}|{}",
            diagnostic.filename, diagnostic.line_start, diagnostic.line_end
        ));
        Self {
            record_oid,
            iteration_id: iteration_id.to_string(),
            original_problem_oid: original_problem_oid.to_string(),
            diagnostic,
            category,
        }
    }
}

struct LedgerLock {
    file: File,
}

impl Drop for LedgerLock {
    fn drop(&mut self) {
        let _ = FileExt::unlock(&self.file);
    }
}

fn lock_path_for(path: &Path) -> PathBuf {
    let mut name = path
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_else(|| "ledger".to_string());
    name.push_str(".lock");
    path.with_file_name(name)
}

fn acquire_lock(path: &Path, exclusive: bool) -> Result<LedgerLock> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent)?;
        }
    }

    let lock_path = lock_path_for(path);
    let file = OpenOptions::new()
        .read(true)
        .write(true)
        .create(true)
        .truncate(false)
        .open(&lock_path)?;

    let start = Instant::now();
    loop {
        let result = if exclusive {
            FileExt::try_lock_exclusive(&file)
        } else {
            FileExt::try_lock_shared(&file)
        };
        match result {
            Ok(()) => break,
            Err(err) => {
                if err.kind() != ErrorKind::WouldBlock {
                    return Err(err.into());
                }
                if start.elapsed() >= Duration::from_secs(LOCK_TIMEOUT_SECS) {
                    return Err(anyhow::anyhow!(
                        "Timed out waiting for ledger lock ({}s) on '{}'",
                        LOCK_TIMEOUT_SECS,
                        lock_path.display()
                    ));
                }
                std::thread::sleep(Duration::from_millis(LOCK_RETRY_MS));
            }
        }
    }

    Ok(LedgerLock { file })
}

/// Append one serialized record per line.
pub fn append_jsonl<T: Serialize>(path: &Path, records: &[T]) -> Result<()> {
    if records.is_empty() {
        return Ok(());
    }
    let _lock = acquire_lock(path, true)?;
    let mut file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .with_context(|| format!("Failed to open '{}' for append", path.display()))?;
    for record in records {
        let row = serde_json::to_string(record)?;
        writeln!(file, "{}", row)?;
    }
    Ok(())
}

/// Load every parsable record; a missing file is an empty table, and rows
/// from older schemas that no longer deserialize are skipped.
pub fn load_jsonl<T: DeserializeOwned>(path: &Path) -> Result<Vec<T>> {
    if !path.exists() {
        return Ok(Vec::new());
    }
    let _lock = acquire_lock(path, false)?;
    let content = fs::read_to_string(path)
        .with_context(|| format!("Failed to read '{}'", path.display()))?;
    Ok(content
        .lines()
        .filter_map(|line| serde_json::from_str::<T>(line).ok())
        .collect())
}

/// The pair of append-only tables one evaluation run writes.
#[derive(Debug, Clone)]
pub struct Ledger {
    diagnostics_path: PathBuf,
    outcomes_path: PathBuf,
}

impl Ledger {
    pub fn new(diagnostics_path: PathBuf, outcomes_path: PathBuf) -> Self {
        Self {
            diagnostics_path,
            outcomes_path,
        }
    }

    pub fn diagnostics_path(&self) -> &Path {
        &self.diagnostics_path
    }

    pub fn outcomes_path(&self) -> &Path {
        &self.outcomes_path
    }

    pub fn append_diagnostics(&self, records: &[DiagnosticRecord]) -> Result<()> {
        append_jsonl(&self.diagnostics_path, records)
    }

    pub fn load_diagnostics(&self) -> Result<Vec<DiagnosticRecord>> {
        load_jsonl(&self.diagnostics_path)
    }

    pub fn append_outcome(&self, record: &OutcomeRecord) -> Result<()> {
        append_jsonl(&self.outcomes_path, std::slice::from_ref(record))
    }

    pub fn load_outcomes(&self) -> Result<Vec<OutcomeRecord>> {
        load_jsonl(&self.outcomes_path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::extract::UNKNOWN_LINE;
    use tempfile::TempDir;

    fn diagnostic(filename: &str, line: i64) -> Diagnostic {
        Diagnostic {
            severity: "error".to_string(),
            summary: "Unsupported argument".to_string(),
            detail: "detail".to_string(),
            filename: filename.to_string(),
            line_start: line,
            col_start: 1,
            line_end: line,
            col_end: 5,
            file_content: String::new(),
            block_type: "resource".to_string(),
            block_identifiers: "resource aws_instance web".to_string(),
            impacted_block_start_line: line,
            impacted_block_end_line: line + 5,
            impacted_block_content: String::new(),
        }
    }

    fn ledger(tmp: &TempDir) -> Ledger {
        Ledger::new(
            tmp.path().join("diagnostics.jsonl"),
            tmp.path().join("outcomes.jsonl"),
        )
    }

    #[test]
    fn diagnostics_round_trip_through_the_ledger() {
        let tmp = TempDir::new().unwrap();
        let ledger = ledger(&tmp);

        let record = DiagnosticRecord::new(
            diagnostic("clones/p/main.tf", 10),
            CategoryAnnotation::default(),
            "iter-1",
            "oid-1",
        );
        ledger.append_diagnostics(&[record.clone()]).unwrap();
        ledger
            .append_diagnostics(&[DiagnosticRecord::new(
                diagnostic("clones/p/main.tf", 20),
                CategoryAnnotation::default(),
                "iter-2",
                "oid-1",
            )])
            .unwrap();

        let loaded = ledger.load_diagnostics().unwrap();
        assert_eq!(loaded.len(), 2);
        assert_eq!(loaded[0].iteration_id, "iter-1");
        assert_eq!(loaded[0].record_oid, record.record_oid);
        assert_eq!(loaded[1].iteration_id, "iter-2");
        assert_eq!(loaded[0].diagnostic.block_identifiers, "resource aws_instance web");
    }

    #[test]
    fn record_oid_is_stable_for_same_location() {
        let a = DiagnosticRecord::new(
            diagnostic("clones/p/main.tf", 10),
            CategoryAnnotation::default(),
            "iter-1",
            "",
        );
        let b = DiagnosticRecord::new(
            diagnostic("clones/p/main.tf", 10),
            CategoryAnnotation::default(),
            "iter-2",
            "",
        );
        assert_eq!(a.record_oid, b.record_oid);

        let moved = DiagnosticRecord::new(
            diagnostic("clones/p/main.tf", 11),
            CategoryAnnotation::default(),
            "iter-1",
            "",
        );
        assert_ne!(a.record_oid, moved.record_oid);
    }

    #[test]
    fn missing_files_load_as_empty_tables() {
        let tmp = TempDir::new().unwrap();
        let ledger = ledger(&tmp);
        assert!(ledger.load_diagnostics().unwrap().is_empty());
        assert!(ledger.load_outcomes().unwrap().is_empty());
    }

    #[test]
    fn unparsable_lines_are_skipped() {
        let tmp = TempDir::new().unwrap();
        let ledger = ledger(&tmp);
        ledger
            .append_diagnostics(&[DiagnosticRecord::new(
                diagnostic("clones/p/main.tf", 10),
                CategoryAnnotation::default(),
                "iter-1",
                "",
            )])
            .unwrap();
        fs::write(
            ledger.diagnostics_path(),
            format!(
                "{}\nnot json\n",
                fs::read_to_string(ledger.diagnostics_path()).unwrap().trim_end()
            ),
        )
        .unwrap();

        let loaded = ledger.load_diagnostics().unwrap();
        assert_eq!(loaded.len(), 1);
    }

    #[test]
    fn category_annotations_flatten_into_the_row() {
        let tmp = TempDir::new().unwrap();
        let ledger = ledger(&tmp);
        let category = CategoryAnnotation {
            is_baseline: true,
            first_seen_in: "baseline".to_string(),
            ..CategoryAnnotation::default()
        };
        ledger
            .append_diagnostics(&[DiagnosticRecord::new(
                diagnostic("clones/p/main.tf", 10),
                category,
                "iter-1",
                "oid-1",
            )])
            .unwrap();

        let raw = fs::read_to_string(ledger.diagnostics_path()).unwrap();
        assert!(raw.contains("\"is_baseline\":true"));
        assert!(raw.contains("\"first_seen_in\":\"baseline\""));
        assert!(raw.contains("\"summary\":\"Unsupported argument\""));
    }
}
