//! CLI argument parsing and command dispatch

use anyhow::Result;
use clap::{Parser, Subcommand};

use repo_consolidate::output::OutputConfig;

use crate::commands;

/// Repository Consolidation Engine - merge repositories without losing history
#[derive(Parser, Debug)]
#[command(name = "repo-consolidate")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Subcommand to execute
    #[command(subcommand)]
    command: Commands,

    /// Colorize output (always, never, auto)
    #[arg(long, global = true, value_name = "WHEN", default_value = "auto")]
    color: String,

    /// Set log level (error, warn, info, debug, trace)
    #[arg(long, global = true, value_name = "LEVEL", default_value = "warn")]
    log_level: String,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Compute and display the ordered merge plan without touching anything
    Plan(commands::plan::PlanArgs),

    /// Execute the consolidation pipeline: merge, archive, extract
    Apply(commands::apply::ApplyArgs),

    /// Summarize a discovery inventory snapshot
    Inventory(commands::inventory::InventoryArgs),

    /// Mine a consolidated repository for document-worthy content
    Extract(commands::extract::ExtractArgs),

    /// Generate shell completion scripts
    Completions(commands::completions::CompletionsArgs),
}

impl Cli {
    /// Execute the CLI command
    pub fn execute(self) -> Result<()> {
        init_logging(&self.log_level);
        let output = OutputConfig::from_env_and_flag(&self.color);

        match self.command {
            Commands::Plan(args) => commands::plan::execute(args, &output),
            Commands::Apply(args) => commands::apply::execute(args, &output),
            Commands::Inventory(args) => commands::inventory::execute(args, &output),
            Commands::Extract(args) => commands::extract::execute(args, &output),
            Commands::Completions(args) => commands::completions::execute(args),
        }
    }
}

/// Initialize the logger from the global `--log-level` flag. `RUST_LOG`
/// takes precedence when set so existing habits keep working.
fn init_logging(level: &str) {
    let mut builder = env_logger::Builder::new();
    match std::env::var("RUST_LOG") {
        Ok(spec) => {
            builder.parse_filters(&spec);
        }
        Err(_) => {
            builder.parse_filters(level);
        }
    }
    // try_init: tests may install a logger first.
    let _ = builder.format_timestamp(None).try_init();
}
