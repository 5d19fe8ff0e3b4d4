//! Implementation of the consolidation pipeline.
//!
//! ## Overview
//!
//! The pipeline runs in five stages:
//! 1. Planning - Validate plan entries against the inventory and compute an
//!    ordered operation list (`planner`)
//! 2. Execution - Graft source histories into target repositories on a
//!    bounded worker pool (`executor` + `merger`)
//! 3. Archival - Mark merged sources read-only and emit redirect documents
//!    (`archive`)
//! 4. Extraction - Mine the consolidated history for document-worthy content
//!    (`extract`)
//! 5. Reporting - Machine-readable execution report (`crate::report`)
//!
//! Planning is side-effect-free; nothing mutates before the validation gate
//! between planning and execution.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

pub mod archive;
pub mod executor;
pub mod extract;
pub mod merger;
pub mod orchestrator;
pub mod planner;

/// Lifecycle of a merge operation. Transitions are strictly forward:
/// `Pending -> Validated -> Applied | Failed`. `Applied` and `Failed` are
/// terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OpStatus {
    Pending,
    Validated,
    Applied,
    Failed,
}

impl OpStatus {
    fn allows(self, next: OpStatus) -> bool {
        matches!(
            (self, next),
            (OpStatus::Pending, OpStatus::Validated)
                | (OpStatus::Validated, OpStatus::Applied)
                | (OpStatus::Validated, OpStatus::Failed)
        )
    }
}

impl std::fmt::Display for OpStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            OpStatus::Pending => "pending",
            OpStatus::Validated => "validated",
            OpStatus::Applied => "applied",
            OpStatus::Failed => "failed",
        };
        write!(f, "{}", name)
    }
}

/// A single atomic unit of work: one source repository merged into one
/// target subtree. Produced by the planner; status is the only mutable
/// field and only moves through [`MergeOperation::advance`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MergeOperation {
    /// Stable identifier, `<source>-><target>:<path>`.
    pub id: String,
    /// Source repository identifier.
    pub source: String,
    /// Target repository identifier.
    pub target_repo: String,
    /// Resolved target path (after rename-policy suffixing).
    pub target_path: String,
    /// Current lifecycle status.
    pub status: OpStatus,
    /// Indices of operations that must be applied before this one.
    pub depends_on: Vec<usize>,
}

impl MergeOperation {
    pub fn new(source: &str, target_repo: &str, target_path: &str) -> Self {
        Self {
            id: format!("{}->{}:{}", source, target_repo, target_path),
            source: source.to_string(),
            target_repo: target_repo.to_string(),
            target_path: target_path.to_string(),
            status: OpStatus::Pending,
            depends_on: Vec::new(),
        }
    }

    /// Advance the status, enforcing the forward-only state machine.
    pub fn advance(&mut self, next: OpStatus) -> Result<()> {
        if !self.status.allows(next) {
            return Err(Error::InvalidTransition {
                from: self.status.to_string(),
                to: next.to_string(),
            });
        }
        self.status = next;
        Ok(())
    }
}

/// Result of applying one merge operation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppliedMerge {
    /// Tip commit of the source's default branch, as grafted.
    pub source_tip: String,
    /// Namespaced refs created (or found, on idempotent re-apply).
    pub refs: Vec<String>,
    /// True when a provenance marker showed the operation was already
    /// applied and the existing result was returned.
    pub already_applied: bool,
}

/// Per-operation time budget, checked between mutating steps.
///
/// A zero budget disables the deadline.
#[derive(Debug, Clone)]
pub struct Deadline {
    started: Instant,
    budget: Option<Duration>,
    budget_secs: u64,
}

impl Deadline {
    pub fn start(budget_secs: u64) -> Self {
        Self {
            started: Instant::now(),
            budget: (budget_secs > 0).then(|| Duration::from_secs(budget_secs)),
            budget_secs,
        }
    }

    /// Error with `Error::Timeout` once the budget is exhausted.
    pub fn check(&self, operation: &str) -> Result<()> {
        if let Some(budget) = self.budget {
            if self.started.elapsed() > budget {
                return Err(Error::Timeout {
                    operation: operation.to_string(),
                    budget_secs: self.budget_secs,
                });
            }
        }
        Ok(())
    }
}

/// Cooperative cancellation shared between the caller and the executor.
///
/// Honored before any operation transitions past `validated`; operations
/// already applied are never rolled back.
#[derive(Debug, Clone, Default)]
pub struct CancelFlag(Arc<AtomicBool>);

impl CancelFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}
