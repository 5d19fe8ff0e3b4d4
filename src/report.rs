//! Machine-readable execution reporting.
//!
//! The execution report maps every merge operation to its final status (and
//! failure detail), alongside the archival record set. Downstream consumers
//! (the knowledge extractor, external tooling) read this instead of parsing
//! CLI output.

use std::path::Path;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::pipeline::executor::ExecutionOutcome;
use crate::pipeline::OpStatus;

/// Archival proof for one source repository. Created only after the
/// corresponding operation reached `applied`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ArchivalRecord {
    /// Source repository identifier.
    pub source: String,
    /// When the archival step ran.
    pub archived_at: DateTime<Utc>,
    /// Path of the generated redirect document.
    pub redirect_document: String,
}

/// Final state of one operation, flattened for serialization.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OperationReport {
    pub id: String,
    pub source: String,
    pub target_repo: String,
    pub target_path: String,
    pub status: OpStatus,
    /// Namespaced refs created by the graft.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub refs: Vec<String>,
    /// Failure detail, present only for `failed` operations.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Why the operation never started, if it was skipped.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub skipped: Option<String>,
}

/// Aggregate counts over all operations.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct ReportSummary {
    pub applied: usize,
    pub failed: usize,
    pub skipped: usize,
}

/// An archival step that failed for one repository. Reported, never rolled
/// back.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ArchivalFailure {
    pub source: String,
    pub error: String,
}

/// The full execution report.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionReport {
    pub generated_at: DateTime<Utc>,
    pub operations: Vec<OperationReport>,
    pub archives: Vec<ArchivalRecord>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub archival_failures: Vec<ArchivalFailure>,
    pub summary: ReportSummary,
}

impl ExecutionReport {
    /// Build a report from execution outcomes and archival records.
    pub fn new(outcomes: &[ExecutionOutcome], archives: Vec<ArchivalRecord>) -> Self {
        let mut summary = ReportSummary::default();
        let operations = outcomes
            .iter()
            .map(|outcome| {
                match outcome.operation.status {
                    OpStatus::Applied => summary.applied += 1,
                    OpStatus::Failed => summary.failed += 1,
                    _ => summary.skipped += 1,
                }
                OperationReport {
                    id: outcome.operation.id.clone(),
                    source: outcome.operation.source.clone(),
                    target_repo: outcome.operation.target_repo.clone(),
                    target_path: outcome.operation.target_path.clone(),
                    status: outcome.operation.status,
                    refs: outcome
                        .applied
                        .as_ref()
                        .map(|a| a.refs.clone())
                        .unwrap_or_default(),
                    error: outcome.error.clone(),
                    skipped: outcome.skipped.as_ref().map(|s| s.to_string()),
                }
            })
            .collect();

        Self {
            generated_at: Utc::now(),
            operations,
            archives,
            archival_failures: Vec::new(),
            summary,
        }
    }

    /// Attach per-repository archival failures.
    pub fn with_archival_failures(mut self, failures: Vec<ArchivalFailure>) -> Self {
        self.archival_failures = failures;
        self
    }

    /// Whether every operation applied.
    pub fn is_success(&self) -> bool {
        self.summary.failed == 0 && self.summary.skipped == 0
    }

    /// Identifiers of failed operations, for the CLI failure summary.
    pub fn failed_ids(&self) -> Vec<&str> {
        self.operations
            .iter()
            .filter(|op| op.status == OpStatus::Failed)
            .map(|op| op.id.as_str())
            .collect()
    }

    /// Serialize the report to pretty JSON.
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Write the report to a file.
    pub fn write_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, self.to_json()?)?;
        Ok(())
    }
}
