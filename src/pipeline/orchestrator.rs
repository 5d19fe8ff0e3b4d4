//! Orchestrator for the complete consolidation run.
//!
//! Coordinates all pipeline stages behind a single entry point: planning,
//! the validation gate, execution, archival, and knowledge extraction.
//! Planning alone is side-effect-free; the gate is the boundary after which
//! repositories may be mutated.

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

use log::warn;

use crate::error::Result;
use crate::inventory::Inventory;
use crate::plan::MergePlan;
use crate::report::ExecutionReport;

use super::executor::{self, ExecutionSettings};
use super::extract::{self, KnowledgeIndex};
use super::{archive, merger, planner, CancelFlag, MergeOperation};

/// Stage toggles for [`execute_consolidation`].
#[derive(Debug, Clone)]
pub struct RunOptions {
    pub settings: ExecutionSettings,
    /// Skip the archival stage.
    pub no_archive: bool,
    /// Skip the knowledge-extraction stage.
    pub no_extract: bool,
    /// Extraction patterns; defaults to markdown documents.
    pub extract_patterns: Vec<String>,
}

impl RunOptions {
    pub fn from_settings(settings: ExecutionSettings) -> Self {
        Self {
            settings,
            no_archive: false,
            no_extract: false,
            extract_patterns: extract::DEFAULT_PATTERNS
                .iter()
                .map(|s| s.to_string())
                .collect(),
        }
    }
}

/// Result of a full consolidation run.
#[derive(Debug)]
pub struct ConsolidationRun {
    pub report: ExecutionReport,
    /// One knowledge index per touched target repository, unless extraction
    /// was disabled or failed (extraction is never fatal).
    pub knowledge: Vec<KnowledgeIndex>,
}

/// Compute the ordered operation list without touching any repository.
pub fn plan_only(inventory: &Inventory, plan: &MergePlan) -> Result<Vec<MergeOperation>> {
    planner::build_operations(inventory, plan)
}

/// Execute the complete pipeline: plan, validate, merge, archive, extract.
pub fn execute_consolidation<F>(
    workspace: &Path,
    inventory: &Inventory,
    plan: &MergePlan,
    options: &RunOptions,
    cancel: &CancelFlag,
    progress: F,
) -> Result<ConsolidationRun>
where
    F: Fn(&MergeOperation) + Sync,
{
    let mut operations = planner::build_operations(inventory, plan)?;

    // Validation gate: the last side-effect-free step.
    planner::validate_operations(&mut operations)?;

    let outcomes = executor::execute(
        workspace,
        inventory,
        operations,
        options.settings,
        cancel,
        progress,
    )?;

    let mut archives = Vec::new();
    let mut archival_failures = Vec::new();
    if !options.no_archive {
        for outcome in archive::archive_applied(workspace, inventory, &outcomes) {
            match outcome.result {
                Ok(record) => archives.push(record),
                Err(e) => archival_failures.push(crate::report::ArchivalFailure {
                    source: outcome.source,
                    error: e.to_string(),
                }),
            }
        }
    }

    let report =
        ExecutionReport::new(&outcomes, archives).with_archival_failures(archival_failures);

    let knowledge = if options.no_extract {
        Vec::new()
    } else {
        extract_targets(workspace, inventory, &outcomes, &options.extract_patterns)
    };

    Ok(ConsolidationRun { report, knowledge })
}

/// Run the extractor over every target repository that received a merge.
/// Not in the critical path: failures are logged, never fatal.
fn extract_targets(
    workspace: &Path,
    inventory: &Inventory,
    outcomes: &[executor::ExecutionOutcome],
    patterns: &[String],
) -> Vec<KnowledgeIndex> {
    let targets: BTreeSet<PathBuf> = outcomes
        .iter()
        .filter(|o| o.applied.is_some())
        .map(|o| merger::repo_dir(workspace, inventory, &o.operation.target_repo))
        .collect();

    let mut indexes = Vec::new();
    for dir in targets {
        match extract::extract_repository(&dir, patterns) {
            Ok(index) => indexes.push(index),
            Err(e) => warn!("knowledge extraction skipped for {}: {}", dir.display(), e),
        }
    }
    indexes
}
