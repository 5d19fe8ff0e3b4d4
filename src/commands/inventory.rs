//! Inventory command implementation
//!
//! Loads a discovery snapshot and prints a classification summary. A safe,
//! read-only operation useful for sanity-checking a snapshot before writing
//! a merge plan against it.

use anyhow::Result;
use clap::Args;
use std::path::PathBuf;

use repo_consolidate::inventory;
use repo_consolidate::output::{emoji, OutputConfig};

/// Arguments for the inventory command
#[derive(Args, Debug)]
pub struct InventoryArgs {
    /// Path to the discovery inventory snapshot
    #[arg(
        short,
        long,
        value_name = "FILE",
        env = "REPO_CONSOLIDATE_INVENTORY",
        default_value = "inventory.json"
    )]
    pub inventory: PathBuf,

    /// List every repository, not just the summary
    #[arg(short, long)]
    pub verbose: bool,
}

/// Execute the `inventory` command.
pub fn execute(args: InventoryArgs, output: &OutputConfig) -> Result<()> {
    let inventory = inventory::from_file(&args.inventory)?;

    println!(
        "{} Inventory: {} repositories",
        emoji(output, "📦", "[INVENTORY]"),
        inventory.len()
    );
    if let Some(timestamp) = &inventory.scan_timestamp {
        println!("   Scanned: {}", timestamp);
    }
    if let Some(version) = &inventory.scanner_version {
        println!("   Scanner: {}", version);
    }
    println!();

    for (classification, count) in inventory.classification_summary() {
        println!("   {:>12}: {}", classification.to_string(), count);
    }

    if args.verbose {
        println!();
        for record in inventory.repositories.values() {
            println!(
                "   {} [{}] {} branch(es), {} commit(s), last active {}",
                record.id,
                record.classification,
                record.branches.len(),
                record.commit_count,
                record.last_activity
            );
        }
    }

    Ok(())
}
