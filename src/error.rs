//! # Error Handling
//!
//! Centralized error handling for the `repo-consolidate` engine, built on
//! `thiserror`. The `Error` enum covers every anticipated failure mode with
//! enough context (operation identifier, source/target, underlying cause)
//! for manual remediation; nothing is silently swallowed.
//!
//! The taxonomy follows the pipeline stages:
//!
//! - Planning-stage errors (`PlanConflict`, `CycleDetected`, `UnknownSource`,
//!   `InventoryParse`, `PlanParse`) abort before any mutation.
//! - Execution-stage errors (`HistoryDivergence`, `Timeout`, `GitCommand`,
//!   `MissingRepository`) are isolated per merge operation and surfaced in
//!   the final execution report.
//! - Archival errors (`ArchivalPermission`) are reported per repository and
//!   never roll back a merge.

use thiserror::Error;

/// A single unresolved target-path collision between two plan entries.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PathConflict {
    /// Source repository of the entry that claimed the path first.
    pub first_source: String,
    /// Source repository of the later, conflicting entry.
    pub second_source: String,
    /// Target repository both entries merge into.
    pub target_repo: String,
    /// The colliding target path.
    pub target_path: String,
}

impl std::fmt::Display for PathConflict {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{}:{} claimed by '{}' and '{}'",
            self.target_repo, self.target_path, self.first_source, self.second_source
        )
    }
}

fn format_conflicts(conflicts: &[PathConflict]) -> String {
    conflicts
        .iter()
        .map(|c| format!("  - {}", c))
        .collect::<Vec<_>>()
        .join("\n")
}

/// Main error type for repo-consolidate operations
#[derive(Error, Debug)]
pub enum Error {
    /// Two or more plan entries target overlapping paths with policy `fail`.
    ///
    /// Names every conflicting pair; planning aborts before any mutation.
    #[error("Merge plan conflict ({} unresolved):\n{}", conflicts.len(), format_conflicts(conflicts))]
    PlanConflict { conflicts: Vec<PathConflict> },

    /// A content-path conflict during history combination that path
    /// namespacing alone cannot resolve. Surfaced for manual resolution,
    /// never auto-resolved destructively.
    /// The field is named `source_repo` rather than `source`: thiserror
    /// reserves `source` for the underlying-error chain.
    #[error("History divergence merging '{source_repo}' into {target_repo}:{target_path}: {}", paths.join(", "))]
    HistoryDivergence {
        source_repo: String,
        target_repo: String,
        target_path: String,
        /// Paths in the target tree that already occupy the merge prefix.
        paths: Vec<String>,
    },

    /// The archival step could not lock or write to a source repository.
    #[error("Archival permission error for '{source_repo}': {message}")]
    ArchivalPermission {
        source_repo: String,
        message: String,
    },

    /// A merge operation exceeded its time budget.
    #[error("Operation '{operation}' timed out after {budget_secs}s")]
    Timeout { operation: String, budget_secs: u64 },

    /// A circular dependency was detected between merge operations.
    #[error("Cycle detected in merge plan dependencies: {cycle}")]
    CycleDetected { cycle: String },

    /// A plan entry references a source that is neither in the inventory
    /// nor produced as the target of an earlier operation.
    #[error("Unknown source repository '{source_repo}'{}", hint.as_ref().map(|h| format!("\n  hint: {}", h)).unwrap_or_default())]
    UnknownSource {
        source_repo: String,
        /// Optional hint, e.g. a close identifier match.
        hint: Option<String>,
    },

    /// An error occurred while parsing the inventory snapshot.
    #[error("Inventory parsing error: {message}{}", hint.as_ref().map(|h| format!("\n  hint: {}", h)).unwrap_or_default())]
    InventoryParse {
        message: String,
        /// Optional hint for how to fix the snapshot.
        hint: Option<String>,
    },

    /// An error occurred while parsing the merge-plan configuration.
    #[error("Merge plan parsing error: {message}{}", hint.as_ref().map(|h| format!("\n  hint: {}", h)).unwrap_or_default())]
    PlanParse {
        message: String,
        /// Optional hint for how to fix the plan.
        hint: Option<String>,
    },

    /// An error occurred while executing a git command.
    #[error("Git command failed in {repo}: git {command} - {stderr}")]
    GitCommand {
        command: String,
        repo: String,
        stderr: String,
    },

    /// A repository referenced by an operation does not exist on disk.
    #[error("Repository '{id}' not found at {path}")]
    MissingRepository { id: String, path: String },

    /// An operation status was asked to move backwards or skip a state.
    #[error("Invalid operation status transition: {from} -> {to}")]
    InvalidTransition { from: String, to: String },

    /// An error occurred during knowledge extraction.
    #[error("Knowledge extraction error: {message}")]
    Extraction { message: String },

    /// An error indicating that a mutex or other lock has been poisoned.
    #[error("Lock poisoned: {context}")]
    LockPoisoned { context: String },

    /// An I/O error, wrapped from `std::io::Error`.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// A JSON error, wrapped from `serde_json::Error`.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// A YAML parsing error, wrapped from `serde_yaml::Error`.
    #[error("YAML parsing error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// A glob pattern error, wrapped from `glob::PatternError`.
    #[error("Glob pattern error: {0}")]
    Glob(#[from] glob::PatternError),

    /// A regular expression error, wrapped from `regex::Error`.
    #[error("Regex error: {0}")]
    Regex(#[from] regex::Error),
}

/// A convenient type alias for `Result<T, Error>`.
pub type Result<T> = std::result::Result<T, Error>;
