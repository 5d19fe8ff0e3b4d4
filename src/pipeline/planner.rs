//! Merge planning: conflict detection and operation ordering.
//!
//! Given the inventory and a declarative merge plan, produce an ordered list
//! of merge operations, or fail with a conflict error naming every
//! conflicting path. Planning is side-effect-free; the validation gate
//! ([`validate_operations`]) is the last step before execution may start.
//!
//! ## Conflict semantics
//!
//! Two entries into the same target repository conflict when their target
//! paths are equal or nest within one another. The later entry's policy
//! decides the outcome:
//!
//! - `fail`: the pair is recorded; planning fails after all entries are
//!   examined so the error names every conflict at once.
//! - `rename`: a deterministic `-2`, `-3`, ... suffix is appended to the
//!   later entry's final path component.
//! - `skip-duplicate`: the later entry is dropped; the first claim wins.
//!
//! ## Ordering
//!
//! Operations form a dependency graph (arena of operations plus index-based
//! edges): an operation consuming a repository that is itself the target of
//! other operations runs after them, and operations into the same target
//! repository keep their plan order. Kahn's algorithm produces the
//! topological order and makes cycle detection explicit.

use std::collections::HashMap;

use log::{debug, info};

use crate::error::{Error, PathConflict, Result};
use crate::inventory::Inventory;
use crate::plan::{ConflictPolicy, MergePlan};

use super::{MergeOperation, OpStatus};

/// Compute the ordered operation list for a plan.
///
/// Pure function of its inputs; nothing on disk is read or written.
pub fn build_operations(inventory: &Inventory, plan: &MergePlan) -> Result<Vec<MergeOperation>> {
    plan.validate()?;

    // Every effective target repository in the plan. Sources may reference
    // these even when they are absent from the inventory (chained
    // consolidation).
    let target_ids: Vec<String> = plan
        .entries
        .iter()
        .map(|e| plan.target_of(e).to_string())
        .collect();

    let mut operations: Vec<MergeOperation> = Vec::new();
    // Per target repository: (claimed path, claiming source).
    let mut claimed: HashMap<String, Vec<(String, String)>> = HashMap::new();
    let mut conflicts: Vec<PathConflict> = Vec::new();

    for entry in &plan.entries {
        let target = plan.target_of(entry).to_string();

        if !inventory.contains(&entry.source) && !target_ids.contains(&entry.source) {
            return Err(Error::UnknownSource {
                source_repo: entry.source.clone(),
                hint: inventory
                    .closest_id(&entry.source)
                    .map(|id| format!("did you mean '{}'?", id)),
            });
        }

        let claims = claimed.entry(target.clone()).or_default();
        let clash = claims
            .iter()
            .find(|(path, _)| paths_overlap(path, &entry.target_path))
            .cloned();

        let resolved_path = match (clash, entry.on_conflict) {
            (None, _) => entry.target_path.clone(),
            (Some((path, first_source)), ConflictPolicy::Fail) => {
                conflicts.push(PathConflict {
                    first_source,
                    second_source: entry.source.clone(),
                    target_repo: target.clone(),
                    target_path: path,
                });
                continue;
            }
            (Some(_), ConflictPolicy::SkipDuplicate) => {
                info!(
                    "skipping '{}': target path {}:{} already claimed (skip-duplicate)",
                    entry.source, target, entry.target_path
                );
                continue;
            }
            (Some(_), ConflictPolicy::Rename) => {
                let renamed = rename_path(&entry.target_path, claims);
                info!(
                    "renaming target path for '{}': {} -> {} (rename)",
                    entry.source, entry.target_path, renamed
                );
                renamed
            }
        };

        claims.push((resolved_path.clone(), entry.source.clone()));
        operations.push(MergeOperation::new(&entry.source, &target, &resolved_path));
    }

    if !conflicts.is_empty() {
        return Err(Error::PlanConflict { conflicts });
    }

    link_dependencies(&mut operations);
    let ordered = topological_order(operations)?;
    debug!("planned {} operations", ordered.len());
    Ok(ordered)
}

/// Flip every planned operation through the validation gate
/// (`pending -> validated`). Execution refuses operations that have not
/// passed this gate.
pub fn validate_operations(operations: &mut [MergeOperation]) -> Result<()> {
    for op in operations.iter_mut() {
        op.advance(OpStatus::Validated)?;
    }
    Ok(())
}

/// Whether two target paths are equal or nest within one another,
/// at path-component granularity.
fn paths_overlap(a: &str, b: &str) -> bool {
    a == b || a.starts_with(&format!("{}/", b)) || b.starts_with(&format!("{}/", a))
}

/// Deterministic rename: append `-2`, `-3`, ... to the final component
/// until the path no longer overlaps any existing claim.
fn rename_path(requested: &str, claims: &[(String, String)]) -> String {
    for n in 2u32.. {
        let candidate = format!("{}-{}", requested, n);
        if !claims.iter().any(|(p, _)| paths_overlap(p, &candidate)) {
            return candidate;
        }
    }
    unreachable!("suffix space exhausted")
}

/// Populate `depends_on` edges:
/// - an operation depends on every operation whose target repository is its
///   source (that repository exists only as consolidation output), and
/// - operations into the same target repository depend on their predecessor,
///   keeping per-target application sequential and deterministic.
fn link_dependencies(operations: &mut [MergeOperation]) {
    let mut last_for_target: HashMap<String, usize> = HashMap::new();
    let producers: HashMap<String, Vec<usize>> = {
        let mut map: HashMap<String, Vec<usize>> = HashMap::new();
        for (idx, op) in operations.iter().enumerate() {
            map.entry(op.target_repo.clone()).or_default().push(idx);
        }
        map
    };

    for idx in 0..operations.len() {
        let mut deps = Vec::new();

        if let Some(prev) = last_for_target.get(&operations[idx].target_repo) {
            deps.push(*prev);
        }
        last_for_target.insert(operations[idx].target_repo.clone(), idx);

        if let Some(upstream) = producers.get(&operations[idx].source) {
            deps.extend(upstream.iter().copied().filter(|&j| j != idx));
        }

        deps.sort_unstable();
        deps.dedup();
        operations[idx].depends_on = deps;
    }
}

/// Kahn's algorithm over the operation arena. Picks the smallest ready
/// index first so the result is deterministic, and reports any cycle by
/// naming the operations stuck in it.
fn topological_order(operations: Vec<MergeOperation>) -> Result<Vec<MergeOperation>> {
    let n = operations.len();
    let mut indegree = vec![0usize; n];
    let mut dependents: Vec<Vec<usize>> = vec![Vec::new(); n];

    for (idx, op) in operations.iter().enumerate() {
        indegree[idx] = op.depends_on.len();
        for &dep in &op.depends_on {
            dependents[dep].push(idx);
        }
    }

    let mut order: Vec<usize> = Vec::with_capacity(n);
    let mut placed = vec![false; n];

    while order.len() < n {
        let next = (0..n).find(|&i| !placed[i] && indegree[i] == 0);
        let Some(next) = next else {
            let stuck: Vec<String> = (0..n)
                .filter(|&i| !placed[i])
                .map(|i| operations[i].id.clone())
                .collect();
            return Err(Error::CycleDetected {
                cycle: stuck.join(" -> "),
            });
        };
        placed[next] = true;
        for &dep in &dependents[next] {
            indegree[dep] -= 1;
        }
        order.push(next);
    }

    // Rebuild the arena in topological order, remapping dependency indices.
    let mut new_index = vec![0usize; n];
    for (new, &old) in order.iter().enumerate() {
        new_index[old] = new;
    }

    let mut by_old: Vec<Option<MergeOperation>> = operations.into_iter().map(Some).collect();
    let mut ordered = Vec::with_capacity(n);
    for &old in &order {
        let mut op = by_old[old].take().unwrap_or_else(|| unreachable!());
        op.depends_on = op.depends_on.iter().map(|&d| new_index[d]).collect();
        op.depends_on.sort_unstable();
        ordered.push(op);
    }
    Ok(ordered)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::inventory;
    use crate::plan;

    fn test_inventory(ids: &[&str]) -> Inventory {
        let repos = ids
            .iter()
            .map(|id| {
                format!(
                    r#""{id}": {{
                        "id": "{id}",
                        "default_branch": "main",
                        "branches": ["main"],
                        "commit_count": 2,
                        "last_activity": "2026-01-01T00:00:00Z"
                    }}"#,
                    id = id
                )
            })
            .collect::<Vec<_>>()
            .join(",");
        inventory::parse(&format!(r#"{{"repositories": {{{}}}}}"#, repos)).unwrap()
    }

    #[test]
    fn test_disjoint_paths_produce_plan_of_equal_length() {
        let inv = test_inventory(&["a", "b", "c"]);
        let plan = plan::parse(
            r#"
target: consolidated
entries:
  - source: a
    target_path: legacy/a
  - source: b
    target_path: legacy/b
  - source: c
    target_path: tools/c
"#,
        )
        .unwrap();

        let ops = build_operations(&inv, &plan).unwrap();
        assert_eq!(ops.len(), 3);
        assert!(ops.iter().all(|op| op.status == OpStatus::Pending));
    }

    #[test]
    fn test_shared_path_with_fail_policy_names_both_entries() {
        let inv = test_inventory(&["b", "c"]);
        let plan = plan::parse(
            r#"
target: consolidated
entries:
  - source: b
    target_path: shared/lib
  - source: c
    target_path: shared/lib
"#,
        )
        .unwrap();

        let err = build_operations(&inv, &plan).unwrap_err();
        match err {
            Error::PlanConflict { conflicts } => {
                assert_eq!(conflicts.len(), 1);
                assert_eq!(conflicts[0].first_source, "b");
                assert_eq!(conflicts[0].second_source, "c");
                assert_eq!(conflicts[0].target_path, "shared/lib");
            }
            other => panic!("expected PlanConflict, got {}", other),
        }
    }

    #[test]
    fn test_nested_paths_conflict() {
        let inv = test_inventory(&["b", "c"]);
        let plan = plan::parse(
            r#"
target: consolidated
entries:
  - source: b
    target_path: shared
  - source: c
    target_path: shared/lib
"#,
        )
        .unwrap();

        assert!(matches!(
            build_operations(&inv, &plan),
            Err(Error::PlanConflict { .. })
        ));
    }

    #[test]
    fn test_all_conflicts_collected_before_failing() {
        let inv = test_inventory(&["a", "b", "c", "d"]);
        let plan = plan::parse(
            r#"
target: consolidated
entries:
  - source: a
    target_path: one
  - source: b
    target_path: one
  - source: c
    target_path: two
  - source: d
    target_path: two
"#,
        )
        .unwrap();

        match build_operations(&inv, &plan).unwrap_err() {
            Error::PlanConflict { conflicts } => assert_eq!(conflicts.len(), 2),
            other => panic!("expected PlanConflict, got {}", other),
        }
    }

    #[test]
    fn test_rename_policy_appends_deterministic_suffix() {
        let inv = test_inventory(&["a", "b", "c"]);
        let plan = plan::parse(
            r#"
target: consolidated
entries:
  - source: a
    target_path: shared/lib
  - source: b
    target_path: shared/lib
    on_conflict: rename
  - source: c
    target_path: shared/lib
    on_conflict: rename
"#,
        )
        .unwrap();

        let ops = build_operations(&inv, &plan).unwrap();
        let paths: Vec<&str> = ops.iter().map(|op| op.target_path.as_str()).collect();
        assert_eq!(paths, vec!["shared/lib", "shared/lib-2", "shared/lib-3"]);
    }

    #[test]
    fn test_skip_duplicate_first_wins() {
        let inv = test_inventory(&["a", "b"]);
        let plan = plan::parse(
            r#"
target: consolidated
entries:
  - source: a
    target_path: shared/lib
  - source: b
    target_path: shared/lib
    on_conflict: skip-duplicate
"#,
        )
        .unwrap();

        let ops = build_operations(&inv, &plan).unwrap();
        assert_eq!(ops.len(), 1);
        assert_eq!(ops[0].source, "a");
    }

    #[test]
    fn test_unknown_source_rejected_with_hint() {
        let inv = test_inventory(&["repo-b"]);
        let plan = plan::parse(
            r#"
target: consolidated
entries:
  - source: repo-bb
    target_path: legacy/B
"#,
        )
        .unwrap();

        let err = build_operations(&inv, &plan).unwrap_err();
        let display = format!("{}", err);
        assert!(display.contains("repo-bb"));
        assert!(display.contains("repo-b"));
    }

    #[test]
    fn test_chained_target_usable_as_source() {
        let inv = test_inventory(&["a", "b"]);
        // 'staging' only exists as the output of the first two operations.
        let plan = plan::parse(
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

        let ops = build_operations(&inv, &plan).unwrap();
        assert_eq!(ops.len(), 3);
        // The staging-consuming operation must come after its producers.
        let consumer = ops
            .iter()
            .position(|op| op.source == "staging")
            .unwrap_or_else(|| unreachable!());
        assert_eq!(consumer, 2);
        assert_eq!(ops[consumer].depends_on, vec![0, 1]);
    }

    #[test]
    fn test_same_target_operations_stay_sequential() {
        let inv = test_inventory(&["a", "b", "c"]);
        let plan = plan::parse(
            r#"
target: consolidated
entries:
  - source: a
    target_path: one
  - source: b
    target_path: two
  - source: c
    target_path: three
"#,
        )
        .unwrap();

        let ops = build_operations(&inv, &plan).unwrap();
        assert_eq!(ops[0].depends_on, Vec::<usize>::new());
        assert_eq!(ops[1].depends_on, vec![0]);
        assert_eq!(ops[2].depends_on, vec![1]);
    }

    #[test]
    fn test_cycle_detected() {
        let inv = test_inventory(&[]);
        let plan = plan::parse(
            r#"
target: unused
entries:
  - source: x
    target: y
    target_path: from/x
  - source: y
    target: x
    target_path: from/y
"#,
        )
        .unwrap();

        let err = build_operations(&inv, &plan).unwrap_err();
        assert!(matches!(err, Error::CycleDetected { .. }));
    }

    #[test]
    fn test_validation_gate_flips_all_to_validated() {
        let inv = test_inventory(&["a"]);
        let plan = plan::parse(
            r#"
target: consolidated
entries:
  - source: a
    target_path: legacy/a
"#,
        )
        .unwrap();

        let mut ops = build_operations(&inv, &plan).unwrap();
        validate_operations(&mut ops).unwrap();
        assert!(ops.iter().all(|op| op.status == OpStatus::Validated));

        // Re-validating is a forward-only violation.
        assert!(validate_operations(&mut ops).is_err());
    }
}
