//! Extract command implementation
//!
//! Standalone entry point to the knowledge extractor: mines one repository
//! (typically a consolidation target, after an apply) for document-worthy
//! content across all of its branches and writes the derived index. Runs
//! read-only against the object store, no checkout required.

use anyhow::Result;
use clap::Args;
use std::path::PathBuf;

use repo_consolidate::output::{emoji, OutputConfig};
use repo_consolidate::pipeline::extract;

/// Arguments for the extract command
#[derive(Args, Debug)]
pub struct ExtractArgs {
    /// Repository to mine (defaults to the current directory)
    #[arg(short, long, value_name = "DIR")]
    pub repo: Option<PathBuf>,

    /// Glob patterns selecting documents; repeatable
    #[arg(long, value_name = "GLOB")]
    pub pattern: Vec<String>,

    /// Write the knowledge index to this file as JSON
    #[arg(short, long, value_name = "FILE")]
    pub output: Option<PathBuf>,

    /// Suppress all output except errors
    #[arg(short, long)]
    pub quiet: bool,
}

/// Execute the `extract` command.
pub fn execute(args: ExtractArgs, output: &OutputConfig) -> Result<()> {
    let repo_dir = match args.repo {
        Some(dir) => dir,
        None => std::env::current_dir()?,
    };

    let patterns = if args.pattern.is_empty() {
        extract::DEFAULT_PATTERNS
            .iter()
            .map(|s| s.to_string())
            .collect()
    } else {
        args.pattern
    };

    let index = extract::extract_repository(&repo_dir, &patterns)?;

    if let Some(out_path) = &args.output {
        index.write_to(out_path)?;
    }

    if !args.quiet {
        println!(
            "{} {} document(s) extracted from {}",
            emoji(output, "📚", "[EXTRACT]"),
            index.documents.len(),
            repo_dir.display()
        );
        for doc in &index.documents {
            println!("   {} ({}, {} words)", doc.title, doc.path, doc.word_count);
        }
        if let Some(out_path) = &args.output {
            println!("   Index written to: {}", out_path.display());
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use repo_consolidate::git;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn test_extract_writes_index() {
        let temp = TempDir::new().unwrap();
        git::run(temp.path(), &["init", "--initial-branch", "main"]).unwrap();
        fs::write(temp.path().join("README.md"), "# Docs\n\nhello\n").unwrap();
        git::commit_file(temp.path(), "README.md", "add readme").unwrap();
        let out = temp.path().join("index.json");

        let args = ExtractArgs {
            repo: Some(temp.path().to_path_buf()),
            pattern: Vec::new(),
            output: Some(out.clone()),
            quiet: true,
        };
        execute(args, &OutputConfig::from_env_and_flag("never")).unwrap();
        assert!(out.exists());
    }

    #[test]
    fn test_extract_rejects_non_repository() {
        let temp = TempDir::new().unwrap();
        let args = ExtractArgs {
            repo: Some(temp.path().to_path_buf()),
            pattern: Vec::new(),
            output: None,
            quiet: true,
        };
        assert!(execute(args, &OutputConfig::from_env_and_flag("never")).is_err());
    }
}
