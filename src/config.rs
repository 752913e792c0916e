//! Batch configuration
//!
//! A batch run is driven by a TOML file (`repair_config.toml` by default)
//! naming the fixes tables to process and where results land. Keys unknown
//! to older configs default sensibly so configs survive schema additions.

use crate::driver::RepairMode;
use crate::matcher::DEFAULT_LINE_TOLERANCE;
use anyhow::{anyhow, Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

fn default_input_dir() -> PathBuf {
    PathBuf::from("llm_responses")
}

fn default_output_dir() -> PathBuf {
    PathBuf::from("llm_fix_results")
}

fn default_clones_dir() -> PathBuf {
    PathBuf::from("clones")
}

fn default_line_tolerance() -> i64 {
    DEFAULT_LINE_TOLERANCE
}

fn default_validate_timeout_secs() -> u64 {
    300
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchConfig {
    /// Directory of fixes tables (JSONL), one per model.
    #[serde(default = "default_input_dir")]
    pub input_dir: PathBuf,
    /// Only process fixes files whose name contains one of these; empty
    /// means all.
    #[serde(default)]
    pub models: Vec<String>,
    #[serde(default = "default_output_dir")]
    pub output_dir: PathBuf,
    #[serde(default = "default_clones_dir")]
    pub clones_dir: PathBuf,
    /// Problem catalogue path; optional, but without it baseline and
    /// resolution verdicts stay unknown.
    #[serde(default)]
    pub problems: Option<PathBuf>,
    #[serde(default)]
    pub repair_mode: RepairMode,
    #[serde(default = "default_line_tolerance")]
    pub line_tolerance: i64,
    #[serde(default = "default_validate_timeout_secs")]
    pub validate_timeout_secs: u64,
    /// Run `terraform init` once per module before its first validation.
    #[serde(default)]
    pub init_modules: bool,
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self {
            input_dir: default_input_dir(),
            models: Vec::new(),
            output_dir: default_output_dir(),
            clones_dir: default_clones_dir(),
            problems: None,
            repair_mode: RepairMode::default(),
            line_tolerance: default_line_tolerance(),
            validate_timeout_secs: default_validate_timeout_secs(),
            init_modules: false,
        }
    }
}

impl BatchConfig {
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read batch config '{}'", path.display()))?;
        let config: BatchConfig = toml::from_str(&content)
            .with_context(|| format!("Failed to parse batch config TOML '{}'", path.display()))?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        if self.line_tolerance < 0 {
            return Err(anyhow!(
                "line_tolerance must be non-negative (got {})",
                self.line_tolerance
            ));
        }
        if self.validate_timeout_secs == 0 {
            return Err(anyhow!("validate_timeout_secs must be positive"));
        }
        Ok(())
    }

    /// Whether a fixes filename passes the model filter.
    pub fn matches_model(&self, filename: &str) -> bool {
        if self.models.is_empty() {
            return true;
        }
        self.models.iter().any(|model| filename.contains(model))
    }
}
