//! Apply command implementation
//!
//! The apply command executes the full consolidation pipeline:
//! 1. Planning and the validation gate
//! 2. History merging on a bounded worker pool
//! 3. Archival of merged sources (read-only, redirect document)
//! 4. Knowledge extraction over the touched targets
//! 5. A machine-readable execution report
//!
//! `--dry-run` stops at the validation gate, the last side-effect-free
//! step. A run with any failed operation exits non-zero and names every
//! failed operation identifier.

use anyhow::Result;
use clap::Args;
use indicatif::{ProgressBar, ProgressStyle};
use std::path::PathBuf;
use std::time::Instant;

use repo_consolidate::output::{emoji, OutputConfig};
use repo_consolidate::pipeline::executor::ExecutionSettings;
use repo_consolidate::pipeline::orchestrator::{self, RunOptions};
use repo_consolidate::pipeline::CancelFlag;
use repo_consolidate::{inventory, plan};

/// Arguments for the apply command
#[derive(Args, Debug)]
pub struct ApplyArgs {
    /// Path to the discovery inventory snapshot
    #[arg(
        short,
        long,
        value_name = "FILE",
        env = "REPO_CONSOLIDATE_INVENTORY",
        default_value = "inventory.json"
    )]
    pub inventory: PathBuf,

    /// Path to the merge plan document
    #[arg(
        short,
        long,
        value_name = "FILE",
        env = "REPO_CONSOLIDATE_PLAN",
        default_value = "consolidation-plan.yaml"
    )]
    pub plan: PathBuf,

    /// Workspace directory containing the repositories (defaults to the
    /// current directory)
    #[arg(short, long, value_name = "DIR", env = "REPO_CONSOLIDATE_WORKSPACE")]
    pub workspace: Option<PathBuf>,

    /// Show what would be done without making changes
    #[arg(short = 'n', long)]
    pub dry_run: bool,

    /// Stop launching new operations after the first failure
    #[arg(long)]
    pub fail_fast: bool,

    /// Worker-pool size for independent operations (overrides the plan)
    #[arg(long, value_name = "N")]
    pub parallelism: Option<usize>,

    /// Per-operation time budget in seconds, 0 disables (overrides the plan)
    #[arg(long, value_name = "SECS")]
    pub timeout_secs: Option<u64>,

    /// Skip the archival stage
    #[arg(long)]
    pub no_archive: bool,

    /// Skip the knowledge-extraction stage
    #[arg(long)]
    pub no_extract: bool,

    /// Write the execution report to this file as JSON
    #[arg(long, value_name = "FILE")]
    pub report: Option<PathBuf>,

    /// Show detailed progress information
    #[arg(short, long)]
    pub verbose: bool,

    /// Suppress all output except errors
    #[arg(short, long)]
    pub quiet: bool,
}

/// Execute the `apply` command.
pub fn execute(args: ApplyArgs, output: &OutputConfig) -> Result<()> {
    let start_time = Instant::now();

    let workspace = match args.workspace {
        Some(dir) => dir,
        None => std::env::current_dir()?,
    };

    let inventory = inventory::from_file(&args.inventory)?;
    let plan = plan::from_file(&args.plan)?;

    // CLI flags override the plan's own options.
    let settings = ExecutionSettings {
        parallelism: args.parallelism.unwrap_or(plan.options.parallelism),
        timeout_secs: args.timeout_secs.unwrap_or(plan.options.timeout_secs),
        fail_fast: args.fail_fast || plan.options.fail_fast,
    };

    if !args.quiet {
        println!("{} Repository Consolidation", emoji(output, "🔀", "[APPLY]"));
        println!();
        if args.dry_run {
            println!(
                "{} DRY RUN MODE - No changes will be made",
                emoji(output, "🔎", "[DRY-RUN]")
            );
            println!();
        }
    }

    let operations = orchestrator::plan_only(&inventory, &plan)?;

    if args.dry_run {
        if !args.quiet {
            for op in &operations {
                println!("  would merge {}", op.id);
            }
            println!();
            println!(
                "{} {} operation(s) validated, nothing touched",
                emoji(output, "✅", "[OK]"),
                operations.len()
            );
        }
        return Ok(());
    }

    let progress = if args.quiet {
        ProgressBar::hidden()
    } else {
        let bar = ProgressBar::new(operations.len() as u64);
        bar.set_style(
            ProgressStyle::with_template("{spinner} [{bar:30}] {pos}/{len} {msg}")
                .unwrap_or_else(|_| ProgressStyle::default_bar()),
        );
        bar
    };

    let mut options = RunOptions::from_settings(settings);
    options.no_archive = args.no_archive;
    options.no_extract = args.no_extract;

    let verbose = args.verbose;
    let run = orchestrator::execute_consolidation(
        &workspace,
        &inventory,
        &plan,
        &options,
        &CancelFlag::new(),
        |op| {
            if verbose {
                progress.set_message(op.id.clone());
            }
            progress.inc(1);
        },
    )?;
    progress.finish_and_clear();

    if let Some(report_path) = &args.report {
        run.report.write_to(report_path)?;
        if !args.quiet && args.verbose {
            println!("   Report written to: {}", report_path.display());
        }
    }

    if !args.quiet {
        let duration = start_time.elapsed();
        let summary = &run.report.summary;
        println!(
            "{} {} applied, {} failed, {} skipped in {:.2}s",
            if run.report.is_success() {
                emoji(output, "✅", "[OK]")
            } else {
                emoji(output, "❌", "[FAIL]")
            },
            summary.applied,
            summary.failed,
            summary.skipped,
            duration.as_secs_f64()
        );
        if !run.report.archives.is_empty() {
            println!("   {} source(s) archived", run.report.archives.len());
        }
        for failure in &run.report.archival_failures {
            println!(
                "{} archival failed for '{}': {}",
                emoji(output, "⚠️", "[WARN]"),
                failure.source,
                failure.error
            );
        }
        let documents: usize = run.knowledge.iter().map(|k| k.documents.len()).sum();
        if documents > 0 {
            println!("   {} document(s) indexed", documents);
        }
    }

    if !run.report.is_success() {
        for op in &run.report.operations {
            if let Some(error) = &op.error {
                eprintln!("  {} failed: {}", op.id, error);
            } else if let Some(skipped) = &op.skipped {
                eprintln!("  {} skipped: {}", op.id, skipped);
            }
        }
        anyhow::bail!(
            "consolidation incomplete: {}",
            if run.report.failed_ids().is_empty() {
                "operations were skipped".to_string()
            } else {
                format!("failed operations: {}", run.report.failed_ids().join(", "))
            }
        );
    }

    Ok(())
}
