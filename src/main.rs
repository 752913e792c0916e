use anyhow::{anyhow, Context, Result};
use clap::{Args, Parser, Subcommand, ValueEnum};
use repair_lab::catalogue::ProblemCatalogue;
use repair_lab::config::BatchConfig;
use repair_lab::driver::{EvaluatorOptions, RepairEvaluator, RepairMode};
use repair_lab::ledger::{load_jsonl, Ledger};
use repair_lab::matcher::DEFAULT_LINE_TOLERANCE;
use repair_lab::metrics::OutcomeRecord;
use repair_lab::passk;
use std::path::{Path, PathBuf};
use std::time::Duration;

#[derive(Parser, Debug)]
#[command(
    name = "repair-lab",
    about = "Batch evaluation of LLM-generated Terraform repairs"
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Evaluate one fixes table against a clones checkout
    Evaluate(EvaluateArgs),
    /// Evaluate every fixes table named by a batch config
    Batch(BatchArgs),
    /// Compute pass@k over an outcomes table
    PassAtK(PassAtKArgs),
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, ValueEnum)]
enum RepairModeArg {
    File,
    Block,
    Auto,
}

impl From<RepairModeArg> for RepairMode {
    fn from(mode: RepairModeArg) -> Self {
        match mode {
            RepairModeArg::File => RepairMode::File,
            RepairModeArg::Block => RepairMode::Block,
            RepairModeArg::Auto => RepairMode::Auto,
        }
    }
}

#[derive(Args, Debug)]
struct EvaluateArgs {
    /// Fixes table (JSONL) with one repair attempt per line
    #[arg(long)]
    fixes: PathBuf,
    /// Root directory of the cloned repositories
    #[arg(long, default_value = "clones")]
    clones_dir: PathBuf,
    /// Problem catalogue (JSON); without it verdicts stay unknown
    #[arg(long)]
    problems: Option<PathBuf>,
    /// Diagnostics ledger to append post-repair findings to
    #[arg(long, default_value = "repair_eval_diagnostics.jsonl")]
    diagnostics_out: PathBuf,
    /// Outcomes table to append one row per attempt to
    #[arg(long, default_value = "repair_outcomes.jsonl")]
    outcomes_out: PathBuf,
    #[arg(long, value_enum, default_value_t = RepairModeArg::Auto)]
    repair_mode: RepairModeArg,
    #[arg(long, default_value_t = DEFAULT_LINE_TOLERANCE)]
    line_tolerance: i64,
    #[arg(long, default_value_t = 300)]
    validate_timeout_secs: u64,
    /// Run `terraform init` once per module before its first validation
    #[arg(long)]
    init_modules: bool,
}

#[derive(Args, Debug)]
struct BatchArgs {
    #[arg(long, default_value = "repair_config.toml")]
    config: PathBuf,
}

#[derive(Args, Debug)]
struct PassAtKArgs {
    /// Outcomes table (JSONL) produced by evaluate/batch
    #[arg(long)]
    outcomes: PathBuf,
    /// Restrict scoring to problems present in this catalogue
    #[arg(long)]
    problems: Option<PathBuf>,
    #[arg(long = "k", default_values_t = vec![1, 5, 10])]
    k_values: Vec<usize>,
    /// Optional path to save the report as JSON
    #[arg(long)]
    save_to: Option<PathBuf>,
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("repair_lab=info")),
        )
        .init();

    let cli = Cli::parse();
    match cli.command {
        Commands::Evaluate(args) => run_evaluate(args),
        Commands::Batch(args) => run_batch(args),
        Commands::PassAtK(args) => run_pass_at_k(args),
    }
}

fn load_catalogue(path: Option<&Path>) -> Result<Option<ProblemCatalogue>> {
    match path {
        Some(path) => Ok(Some(ProblemCatalogue::load(path)?)),
        None => Ok(None),
    }
}

fn run_evaluate(args: EvaluateArgs) -> Result<()> {
    let catalogue = load_catalogue(args.problems.as_deref())?;
    let ledger = Ledger::new(args.diagnostics_out.clone(), args.outcomes_out.clone());
    let options = EvaluatorOptions {
        repair_mode: args.repair_mode.into(),
        line_tolerance: args.line_tolerance,
        validate_timeout: Duration::from_secs(args.validate_timeout_secs),
        init_modules: args.init_modules,
    };
    let mut evaluator = RepairEvaluator::new(args.clones_dir, ledger, catalogue, options);

    let summary = evaluator.evaluate_fixes_file(&args.fixes)?;

    println!("Run ID: {}", evaluator.run_id());
    println!(
        "Attempts: {} (evaluated {}, skipped {}, plausible {})",
        summary.attempts, summary.evaluated, summary.skipped, summary.plausible
    );
    println!("Diagnostics: {}", args.diagnostics_out.display());
    println!("Outcomes: {}", args.outcomes_out.display());
    Ok(())
}

fn run_batch(args: BatchArgs) -> Result<()> {
    let config = BatchConfig::load(&args.config)?;
    let catalogue = load_catalogue(config.problems.as_deref())?;

    std::fs::create_dir_all(&config.output_dir).with_context(|| {
        format!(
            "Failed to create output directory '{}'",
            config.output_dir.display()
        )
    })?;

    let mut fixes_files: Vec<PathBuf> = std::fs::read_dir(&config.input_dir)
        .with_context(|| {
            format!(
                "Failed to read input directory '{}'",
                config.input_dir.display()
            )
        })?
        .filter_map(|entry| entry.ok())
        .map(|entry| entry.path())
        .filter(|path| path.extension().map(|ext| ext == "jsonl").unwrap_or(false))
        .collect();
    fixes_files.sort();

    if fixes_files.is_empty() {
        return Err(anyhow!(
            "No fixes tables (*.jsonl) found in '{}'",
            config.input_dir.display()
        ));
    }

    let options = EvaluatorOptions {
        repair_mode: config.repair_mode,
        line_tolerance: config.line_tolerance,
        validate_timeout: Duration::from_secs(config.validate_timeout_secs),
        init_modules: config.init_modules,
    };

    let mut processed = 0usize;
    for fixes_path in &fixes_files {
        let file_name = fixes_path
            .file_name()
            .map(|name| name.to_string_lossy().to_string())
            .unwrap_or_default();
        if !config.matches_model(&file_name) {
            continue;
        }
        processed += 1;

        let stem = fixes_path
            .file_stem()
            .map(|stem| stem.to_string_lossy().to_string())
            .unwrap_or_else(|| "fixes".to_string());
        let outcomes_out = config.output_dir.join(format!("{}.jsonl", stem));
        let diagnostics_out = config
            .output_dir
            .join(format!("{}_diagnostics.jsonl", stem));

        let ledger = Ledger::new(diagnostics_out.clone(), outcomes_out.clone());
        let mut evaluator = RepairEvaluator::new(
            config.clones_dir.clone(),
            ledger,
            catalogue.clone(),
            options.clone(),
        );

        println!("Processing: {}", file_name);
        let summary = evaluator.evaluate_fixes_file(fixes_path)?;
        println!(
            "  run {} | attempts {} | evaluated {} | skipped {} | plausible {}",
            evaluator.run_id(),
            summary.attempts,
            summary.evaluated,
            summary.skipped,
            summary.plausible
        );
        println!("  outcomes -> {}", outcomes_out.display());
    }

    if processed == 0 {
        return Err(anyhow!(
            "No fixes tables in '{}' matched the configured models",
            config.input_dir.display()
        ));
    }
    Ok(())
}

fn run_pass_at_k(args: PassAtKArgs) -> Result<()> {
    let outcomes: Vec<OutcomeRecord> = load_jsonl(&args.outcomes)?;
    let valid_oids = match args.problems.as_deref() {
        Some(path) => Some(ProblemCatalogue::load(path)?.oids()),
        None => None,
    };

    let report = passk::evaluate_outcomes(&outcomes, &args.k_values, valid_oids.as_ref());

    let model = if report.llm_name.is_empty() {
        args.outcomes
            .file_stem()
            .map(|stem| stem.to_string_lossy().to_string())
            .unwrap_or_else(|| "unknown".to_string())
    } else {
        report.llm_name.clone()
    };
    println!(
        "Model: {} ({} problems, {} attempts)",
        model, report.problems, report.attempts
    );
    for score in &report.scores {
        println!("  pass@{}: {:.4}", score.k, score.score);
    }

    if let Some(path) = &args.save_to {
        let content = serde_json::to_string_pretty(&report)?;
        std::fs::write(path, content)
            .with_context(|| format!("Failed to write report '{}'", path.display()))?;
        println!("Report: {}", path.display());
    }
    Ok(())
}
