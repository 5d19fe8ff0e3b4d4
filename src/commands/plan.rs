//! Plan command implementation
//!
//! Computes the ordered operation list for a merge plan and prints it.
//! This is the dry half of the plan/apply split: nothing on disk is
//! touched, and a conflicting plan exits non-zero with every conflict
//! named so the whole plan can be fixed in one pass.

use anyhow::Result;
use clap::{Args, ValueEnum};
use std::path::PathBuf;

use repo_consolidate::output::{emoji, OutputConfig};
use repo_consolidate::pipeline::orchestrator;
use repo_consolidate::{inventory, plan};

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum PlanFormat {
    /// Human-readable operation list.
    Text,
    /// Machine-readable JSON array of operations.
    Json,
}

/// Arguments for the plan command
#[derive(Args, Debug)]
pub struct PlanArgs {
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

    /// Output format
    #[arg(long, value_enum, default_value_t = PlanFormat::Text)]
    pub format: PlanFormat,
}

/// Execute the `plan` command.
pub fn execute(args: PlanArgs, output: &OutputConfig) -> Result<()> {
    let inventory = inventory::from_file(&args.inventory)?;
    let plan = plan::from_file(&args.plan)?;

    let operations = orchestrator::plan_only(&inventory, &plan)?;

    match args.format {
        PlanFormat::Json => {
            println!("{}", serde_json::to_string_pretty(&operations)?);
        }
        PlanFormat::Text => {
            println!(
                "{} Merge plan: {} operation(s) into '{}'",
                emoji(output, "📋", "[PLAN]"),
                operations.len(),
                plan.target
            );
            println!();
            for (idx, op) in operations.iter().enumerate() {
                if op.depends_on.is_empty() {
                    println!("  {}. {}", idx + 1, op.id);
                } else {
                    let deps: Vec<String> = op
                        .depends_on
                        .iter()
                        .map(|&d| operations[d].id.clone())
                        .collect();
                    println!("  {}. {} (after {})", idx + 1, op.id, deps.join(", "));
                }
            }
            println!();
            println!(
                "{} Plan is conflict-free. Run 'repo-consolidate apply' to execute.",
                emoji(output, "✅", "[OK]")
            );
        }
    }

    Ok(())
}
