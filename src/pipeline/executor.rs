//! Execution of a validated plan on a bounded worker pool.
//!
//! Operations run in dependency waves: every operation in a wave has all of
//! its dependencies satisfied by earlier waves, so operations within a wave
//! are independent and may run concurrently. The pool is sized by the
//! configured parallelism; `parallelism <= 1` uses a plain sequential loop.
//!
//! Invariants enforced here:
//! - every operation holds the exclusive lock of its target repository while
//!   applying;
//! - fail-fast trips an atomic flag on the first failure, operations not yet
//!   started are left `validated`, in-flight ones finish;
//! - a timed-out operation is marked `failed` and does not block
//!   independent operations;
//! - cancellation is honored before any operation moves past `validated`;
//! - applied operations are never rolled back.

use std::collections::HashMap;
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;

use log::{error, info, warn};
use rayon::prelude::*;

use crate::error::{Error, Result};
use crate::inventory::Inventory;

use super::{merger, AppliedMerge, CancelFlag, Deadline, MergeOperation, OpStatus};

/// Execution knobs, usually derived from [`crate::plan::PlanOptions`].
#[derive(Debug, Clone, Copy)]
pub struct ExecutionSettings {
    pub parallelism: usize,
    pub timeout_secs: u64,
    pub fail_fast: bool,
}

/// Why an operation was never started.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SkipReason {
    Cancelled,
    FailFast,
    DependencyFailed(String),
}

impl std::fmt::Display for SkipReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SkipReason::Cancelled => write!(f, "not started: plan cancelled"),
            SkipReason::FailFast => write!(f, "not started: fail-fast after earlier failure"),
            SkipReason::DependencyFailed(id) => {
                write!(f, "not started: dependency '{}' did not apply", id)
            }
        }
    }
}

/// Final state of one operation after execution.
#[derive(Debug)]
pub struct ExecutionOutcome {
    pub operation: MergeOperation,
    /// Present when the operation applied (or was found already applied).
    pub applied: Option<AppliedMerge>,
    /// Failure detail for `failed` operations.
    pub error: Option<String>,
    /// Present when the operation was never started.
    pub skipped: Option<SkipReason>,
}

enum StepResult {
    Applied(AppliedMerge),
    Failed(Error),
    Skipped(SkipReason),
}

/// Execute all operations and return one outcome per operation, in plan
/// order. Operation failures are captured in the outcomes, not returned as
/// `Err`; `Err` is reserved for infrastructure faults (pool construction,
/// poisoned locks, invalid statuses).
pub fn execute<F>(
    workspace: &Path,
    inventory: &Inventory,
    operations: Vec<MergeOperation>,
    settings: ExecutionSettings,
    cancel: &CancelFlag,
    progress: F,
) -> Result<Vec<ExecutionOutcome>>
where
    F: Fn(&MergeOperation) + Sync,
{
    for op in &operations {
        if op.status != OpStatus::Validated {
            return Err(Error::InvalidTransition {
                from: op.status.to_string(),
                to: OpStatus::Applied.to_string(),
            });
        }
    }

    // One exclusive lock per target repository.
    let locks: HashMap<&str, Mutex<()>> = operations
        .iter()
        .map(|op| (op.target_repo.as_str(), Mutex::new(())))
        .collect();

    let waves = dependency_waves(&operations);
    let failed_any = AtomicBool::new(false);
    let mut applied_ok = vec![false; operations.len()];
    let mut step_results: Vec<Option<StepResult>> = Vec::new();
    step_results.resize_with(operations.len(), || None);

    let run_one = |idx: usize, applied_ok: &[bool]| -> StepResult {
        let op = &operations[idx];

        if cancel.is_cancelled() {
            return StepResult::Skipped(SkipReason::Cancelled);
        }
        if settings.fail_fast && failed_any.load(Ordering::SeqCst) {
            return StepResult::Skipped(SkipReason::FailFast);
        }
        if let Some(&dep) = op.depends_on.iter().find(|&&d| !applied_ok[d]) {
            return StepResult::Skipped(SkipReason::DependencyFailed(
                operations[dep].id.clone(),
            ));
        }

        let deadline = Deadline::start(settings.timeout_secs);
        let result = {
            let guard = locks
                .get(op.target_repo.as_str())
                .map(|m| m.lock())
                .transpose();
            match guard {
                Ok(_guard) => merger::apply(workspace, inventory, op, &deadline),
                Err(_) => Err(Error::LockPoisoned {
                    context: format!("target repository '{}'", op.target_repo),
                }),
            }
        };
        progress(op);

        match result {
            Ok(applied) => StepResult::Applied(applied),
            Err(e) => {
                failed_any.store(true, Ordering::SeqCst);
                StepResult::Failed(e)
            }
        }
    };

    if settings.parallelism <= 1 {
        for wave in &waves {
            for &idx in wave {
                let step = run_one(idx, &applied_ok);
                applied_ok[idx] = matches!(step, StepResult::Applied(_));
                step_results[idx] = Some(step);
            }
        }
    } else {
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(settings.parallelism)
            .build()
            .map_err(|e| Error::Io(std::io::Error::other(e.to_string())))?;

        for wave in &waves {
            let snapshot = applied_ok.clone();
            let wave_steps: Vec<(usize, StepResult)> = pool.install(|| {
                wave.par_iter()
                    .map(|&idx| (idx, run_one(idx, &snapshot)))
                    .collect()
            });
            for (idx, step) in wave_steps {
                applied_ok[idx] = matches!(step, StepResult::Applied(_));
                step_results[idx] = Some(step);
            }
        }
    }

    finalize(operations, step_results)
}

/// Group operation indices into waves by dependency depth. Operations are
/// already topologically ordered, so every dependency has a smaller index.
fn dependency_waves(operations: &[MergeOperation]) -> Vec<Vec<usize>> {
    let mut depth = vec![0usize; operations.len()];
    for (idx, op) in operations.iter().enumerate() {
        depth[idx] = op
            .depends_on
            .iter()
            .map(|&d| depth[d] + 1)
            .max()
            .unwrap_or(0);
    }

    let mut waves: Vec<Vec<usize>> = Vec::new();
    for (idx, &d) in depth.iter().enumerate() {
        if waves.len() <= d {
            waves.resize_with(d + 1, Vec::new);
        }
        waves[d].push(idx);
    }
    waves
}

fn finalize(
    operations: Vec<MergeOperation>,
    step_results: Vec<Option<StepResult>>,
) -> Result<Vec<ExecutionOutcome>> {
    let mut outcomes = Vec::with_capacity(operations.len());
    for (mut op, step) in operations.into_iter().zip(step_results) {
        let step = step.unwrap_or(StepResult::Skipped(SkipReason::Cancelled));
        let outcome = match step {
            StepResult::Applied(applied) => {
                op.advance(OpStatus::Applied)?;
                info!(
                    "applied '{}'{}",
                    op.id,
                    if applied.already_applied {
                        " (already applied, idempotent)"
                    } else {
                        ""
                    }
                );
                ExecutionOutcome {
                    operation: op,
                    applied: Some(applied),
                    error: None,
                    skipped: None,
                }
            }
            StepResult::Failed(e) => {
                op.advance(OpStatus::Failed)?;
                error!("operation '{}' failed: {}", op.id, e);
                ExecutionOutcome {
                    operation: op,
                    applied: None,
                    error: Some(e.to_string()),
                    skipped: None,
                }
            }
            StepResult::Skipped(reason) => {
                // Never started; status stays validated.
                warn!("operation '{}' {}", op.id, reason);
                ExecutionOutcome {
                    operation: op,
                    applied: None,
                    error: None,
                    skipped: Some(reason),
                }
            }
        };
        outcomes.push(outcome);
    }
    Ok(outcomes)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::git;
    use crate::inventory::Inventory;
    use crate::pipeline::planner;
    use std::fs;
    use std::path::Path;
    use tempfile::TempDir;

    fn settings(parallelism: usize, fail_fast: bool) -> ExecutionSettings {
        ExecutionSettings {
            parallelism,
            timeout_secs: 0,
            fail_fast,
        }
    }

    fn init_source(dir: &Path, files: &[(&str, &str)]) {
        fs::create_dir_all(dir).unwrap();
        git::run(dir, &["init", "--initial-branch", "main"]).unwrap();
        for (name, content) in files {
            fs::write(dir.join(name), content).unwrap();
            git::commit_file(dir, name, &format!("add {}", name)).unwrap();
        }
    }

    fn inventory_of(ids: &[&str]) -> Inventory {
        let repos = ids
            .iter()
            .map(|id| {
                format!(
                    r#""{id}": {{
                        "id": "{id}", "default_branch": "main", "branches": ["main"],
                        "commit_count": 1, "last_activity": "2026-01-01T00:00:00Z"
                    }}"#,
                    id = id
                )
            })
            .collect::<Vec<_>>()
            .join(",");
        crate::inventory::parse(&format!(r#"{{"repositories": {{{}}}}}"#, repos)).unwrap()
    }

    fn validated_op(source: &str, target: &str, path: &str) -> MergeOperation {
        let mut op = MergeOperation::new(source, target, path);
        op.advance(OpStatus::Validated).unwrap();
        op
    }

    #[test]
    fn test_execute_rejects_unvalidated_operations() {
        let temp = TempDir::new().unwrap();
        let inv = inventory_of(&[]);
        let ops = vec![MergeOperation::new("a", "t", "p")];

        let err = execute(
            temp.path(),
            &inv,
            ops,
            settings(1, false),
            &CancelFlag::new(),
            |_| {},
        )
        .unwrap_err();
        assert!(matches!(err, Error::InvalidTransition { .. }));
    }

    #[test]
    fn test_execute_applies_independent_operations() {
        let temp = TempDir::new().unwrap();
        init_source(&temp.path().join("a"), &[("a.txt", "a")]);
        init_source(&temp.path().join("b"), &[("b.txt", "b")]);
        let inv = inventory_of(&["a", "b"]);

        let ops = vec![
            validated_op("a", "one", "from/a"),
            validated_op("b", "two", "from/b"),
        ];

        let outcomes = execute(
            temp.path(),
            &inv,
            ops,
            settings(2, false),
            &CancelFlag::new(),
            |_| {},
        )
        .unwrap();

        assert_eq!(outcomes.len(), 2);
        assert!(outcomes
            .iter()
            .all(|o| o.operation.status == OpStatus::Applied));
    }

    #[test]
    fn test_failure_is_isolated_without_fail_fast() {
        let temp = TempDir::new().unwrap();
        init_source(&temp.path().join("a"), &[("a.txt", "a")]);
        // "ghost" has no repository on disk.
        let inv = inventory_of(&["a", "ghost"]);

        let ops = vec![
            validated_op("ghost", "one", "from/ghost"),
            validated_op("a", "two", "from/a"),
        ];

        let outcomes = execute(
            temp.path(),
            &inv,
            ops,
            settings(1, false),
            &CancelFlag::new(),
            |_| {},
        )
        .unwrap();

        assert_eq!(outcomes[0].operation.status, OpStatus::Failed);
        assert!(outcomes[0]
            .error
            .as_deref()
            .unwrap_or_default()
            .contains("not found"));
        assert_eq!(outcomes[1].operation.status, OpStatus::Applied);
    }

    #[test]
    fn test_fail_fast_skips_unstarted_operations() {
        let temp = TempDir::new().unwrap();
        init_source(&temp.path().join("a"), &[("a.txt", "a")]);
        init_source(&temp.path().join("c"), &[("c.txt", "c")]);
        let inv = inventory_of(&["a", "ghost", "c"]);

        let ops = vec![
            validated_op("a", "one", "from/a"),
            validated_op("ghost", "two", "from/ghost"),
            validated_op("c", "three", "from/c"),
        ];

        // Sequential execution makes start order deterministic.
        let outcomes = execute(
            temp.path(),
            &inv,
            ops,
            settings(1, true),
            &CancelFlag::new(),
            |_| {},
        )
        .unwrap();

        assert_eq!(outcomes[0].operation.status, OpStatus::Applied);
        assert_eq!(outcomes[1].operation.status, OpStatus::Failed);
        // Operation 3 was never started and stays validated.
        assert_eq!(outcomes[2].operation.status, OpStatus::Validated);
        assert_eq!(outcomes[2].skipped, Some(SkipReason::FailFast));
    }

    #[test]
    fn test_dependency_failure_skips_dependents() {
        let temp = TempDir::new().unwrap();
        let inv = inventory_of(&["ghost"]);

        let mut dependent = validated_op("one", "final", "merged/one");
        dependent.depends_on = vec![0];
        let ops = vec![validated_op("ghost", "one", "from/ghost"), dependent];

        let outcomes = execute(
            temp.path(),
            &inv,
            ops,
            settings(1, false),
            &CancelFlag::new(),
            |_| {},
        )
        .unwrap();

        assert_eq!(outcomes[0].operation.status, OpStatus::Failed);
        assert_eq!(outcomes[1].operation.status, OpStatus::Validated);
        assert!(matches!(
            outcomes[1].skipped,
            Some(SkipReason::DependencyFailed(_))
        ));
    }

    #[test]
    fn test_cancellation_before_start_leaves_operations_validated() {
        let temp = TempDir::new().unwrap();
        init_source(&temp.path().join("a"), &[("a.txt", "a")]);
        let inv = inventory_of(&["a"]);
        let cancel = CancelFlag::new();
        cancel.cancel();

        let ops = vec![validated_op("a", "one", "from/a")];
        let outcomes = execute(temp.path(), &inv, ops, settings(1, false), &cancel, |_| {}).unwrap();

        assert_eq!(outcomes[0].operation.status, OpStatus::Validated);
        assert_eq!(outcomes[0].skipped, Some(SkipReason::Cancelled));
        assert!(!temp.path().join("one").exists());
    }

    #[test]
    fn test_dependency_waves_grouping() {
        let mut ops = vec![
            MergeOperation::new("a", "t1", "p1"),
            MergeOperation::new("b", "t2", "p2"),
            MergeOperation::new("c", "t3", "p3"),
        ];
        ops[2].depends_on = vec![0, 1];

        let waves = dependency_waves(&ops);
        assert_eq!(waves, vec![vec![0, 1], vec![2]]);
    }

    #[test]
    fn test_planned_chain_executes_in_order() {
        let temp = TempDir::new().unwrap();
        init_source(&temp.path().join("a"), &[("a.txt", "a")]);
        init_source(&temp.path().join("b"), &[("b.txt", "b")]);
        let inv = inventory_of(&["a", "b"]);

        let plan = crate::plan::parse(
            r#"
target: consolidated
entries:
  - source: staging
    target_path: merged/staging
  - source: a
    target: staging
    target_path: parts/a
  - source: b
    target: staging
    target_path: parts/b
"#,
        )
        .unwrap();
        let mut ops = planner::build_operations(&inv, &plan).unwrap();
        planner::validate_operations(&mut ops).unwrap();

        let outcomes = execute(
            temp.path(),
            &inv,
            ops,
            settings(4, false),
            &CancelFlag::new(),
            |_| {},
        )
        .unwrap();

        assert!(outcomes
            .iter()
            .all(|o| o.operation.status == OpStatus::Applied));
        let consolidated = temp.path().join("consolidated");
        assert!(
            git::ref_exists(&consolidated, "refs/heads/merged/staging/parts/a/main").unwrap()
        );
    }
}
