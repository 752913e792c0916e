//! Fix application
//!
//! Writes a candidate repair into the target file and hands back a restore
//! handle. The original content is always recoverable: a `.bak` sidecar is
//! written before the target is touched, restore moves it back, and an
//! unrestored handle restores on drop so an early error in the evaluation
//! loop cannot leave a module dirty. Terraform ignores `.bak` files, so the
//! sidecar never shows up in validation.

use anyhow::{anyhow, Context, Result};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Restore handle for one applied fix.
#[derive(Debug)]
pub struct AppliedFix {
    original: PathBuf,
    backup: PathBuf,
    restored: bool,
}

impl AppliedFix {
    pub fn backup_path(&self) -> &Path {
        &self.backup
    }

    /// Put the original content back.
    pub fn restore(mut self) -> Result<()> {
        self.restore_inner()
    }

    fn restore_inner(&mut self) -> Result<()> {
        if self.restored {
            return Ok(());
        }
        fs::rename(&self.backup, &self.original).with_context(|| {
            format!(
                "Failed to restore '{}' from '{}'",
                self.original.display(),
                self.backup.display()
            )
        })?;
        self.restored = true;
        debug!(file = %self.original.display(), "restored original content");
        Ok(())
    }
}

impl Drop for AppliedFix {
    fn drop(&mut self) {
        if !self.restored {
            let _ = fs::rename(&self.backup, &self.original);
        }
    }
}

fn backup_original(original: &Path) -> Result<PathBuf> {
    if !original.exists() {
        return Err(anyhow!("Original file missing: {}", original.display()));
    }
    let backup = PathBuf::from(format!("{}.bak", original.display()));
    fs::copy(original, &backup).with_context(|| {
        format!(
            "Failed to back up '{}' to '{}'",
            original.display(),
            backup.display()
        )
    })?;
    Ok(backup)
}

/// Replace the whole file with the candidate content.
pub fn apply_whole_file(original: &Path, content: &str) -> Result<AppliedFix> {
    let backup = backup_original(original)?;
    fs::write(original, content)
        .with_context(|| format!("Failed to write repair into '{}'", original.display()))?;
    debug!(file = %original.display(), "applied whole-file repair");
    Ok(AppliedFix {
        original: original.to_path_buf(),
        backup,
        restored: false,
    })
}

/// Replace lines `start_line..=end_line` (1-based, inclusive) with the
/// candidate content. Bounds are clamped to the file.
pub fn apply_line_range(
    original: &Path,
    start_line: i64,
    end_line: i64,
    replacement: &str,
) -> Result<AppliedFix> {
    if start_line < 1 || end_line < start_line {
        return Err(anyhow!(
            "Invalid replacement range {}..{} for '{}'",
            start_line,
            end_line,
            original.display()
        ));
    }

    let backup = backup_original(original)?;
    let content = fs::read_to_string(original)
        .with_context(|| format!("Failed to read '{}'", original.display()))?;
    let lines: Vec<&str> = content.lines().collect();

    let start = ((start_line - 1) as usize).min(lines.len());
    let end = (end_line as usize).min(lines.len());

    let mut patched: Vec<&str> = Vec::with_capacity(lines.len());
    patched.extend_from_slice(&lines[..start]);
    patched.extend(replacement.lines());
    patched.extend_from_slice(&lines[end..]);

    let mut output = patched.join("\n");
    if content.ends_with('\n') {
        output.push('\n');
    }

    fs::write(original, output)
        .with_context(|| format!("Failed to write repair into '{}'", original.display()))?;
    debug!(
        file = %original.display(),
        start_line,
        end_line,
        "applied block repair"
    );
    Ok(AppliedFix {
        original: original.to_path_buf(),
        backup,
        restored: false,
    })
}
