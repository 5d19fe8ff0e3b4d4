//! History merging: graft one repository's history into a target.
//!
//! A graft combines two independent commit histories under a shared target
//! repository without rewriting or squashing either side: the source's
//! objects are fetched into the target's object store and every source
//! branch and tag reappears under a namespaced ref,
//! `refs/heads/<target_path>/<name>` and `refs/tags/<target_path>/<name>`.
//! Original commit identities, authorship and timestamps are untouched, and
//! the target's own refs are never overwritten.
//!
//! A provenance marker, `refs/consolidated/<source>`, records the grafted
//! source tip. Re-applying an operation finds the marker and returns the
//! existing result instead of duplicating history.

use std::path::{Path, PathBuf};

use log::{debug, warn};

use crate::error::{Error, Result};
use crate::git;
use crate::inventory::Inventory;

use super::{AppliedMerge, Deadline, MergeOperation};

/// Namespace for the provenance markers.
const PROVENANCE_PREFIX: &str = "refs/consolidated/";
/// Scratch namespace used during a fetch; always cleaned up.
const TMP_PREFIX: &str = "refs/consolidated-tmp/";

/// Resolve a repository's on-disk location, preferring an inventory path
/// override.
pub fn repo_dir(workspace: &Path, inventory: &Inventory, id: &str) -> PathBuf {
    match inventory.get(id) {
        Some(record) => record.resolve_path(workspace),
        None => workspace.join(id),
    }
}

/// Apply one merge operation.
///
/// The target repository is created (with an empty root commit) when it
/// exists only as the output of the consolidation. The deadline is checked
/// between git steps; a timed-out operation leaves no partial refs behind
/// other than an interrupted scratch namespace, which the next attempt
/// clears.
pub fn apply(
    workspace: &Path,
    inventory: &Inventory,
    op: &MergeOperation,
    deadline: &Deadline,
) -> Result<AppliedMerge> {
    deadline.check(&op.id)?;

    let target_dir = repo_dir(workspace, inventory, &op.target_repo);
    if !git::is_repository(&target_dir) {
        debug!(
            "target '{}' does not exist yet, initializing {}",
            op.target_repo,
            target_dir.display()
        );
        git::init_repository(&target_dir, "main")?;
    }

    let provenance_ref = format!("{}{}", PROVENANCE_PREFIX, op.source);
    if git::ref_exists(&target_dir, &provenance_ref)? {
        let source_tip = git::rev_parse(&target_dir, &provenance_ref)?;
        let refs = existing_namespaced_refs(&target_dir, &op.target_path)?;
        debug!(
            "operation '{}' already applied (provenance marker found), returning existing result",
            op.id
        );
        return Ok(AppliedMerge {
            source_tip,
            refs,
            already_applied: true,
        });
    }

    let source_dir = repo_dir(workspace, inventory, &op.source);
    if !git::is_repository(&source_dir) {
        return Err(Error::MissingRepository {
            id: op.source.clone(),
            path: source_dir.display().to_string(),
        });
    }

    // Clear any scratch refs a previously interrupted attempt left behind.
    clear_tmp_refs(&target_dir, &op.source)?;

    let heads_spec = format!("+refs/heads/*:{}{}/heads/*", TMP_PREFIX, op.source);
    let tags_spec = format!("+refs/tags/*:{}{}/tags/*", TMP_PREFIX, op.source);
    git::fetch(&target_dir, &source_dir, &[&heads_spec, &tags_spec])?;
    deadline.check(&op.id)?;

    let tmp_heads = git::list_refs(&target_dir, &format!("{}{}/heads/", TMP_PREFIX, op.source))?;
    let tmp_tags = git::list_refs(&target_dir, &format!("{}{}/tags/", TMP_PREFIX, op.source))?;

    // Divergence gate: a namespaced ref that already exists and points
    // elsewhere is a content-path conflict namespacing cannot absorb.
    let mut diverged = Vec::new();
    for (kind, name, id) in tmp_heads
        .iter()
        .map(|(n, i)| ("heads", n, i))
        .chain(tmp_tags.iter().map(|(n, i)| ("tags", n, i)))
    {
        let dest = format!("refs/{}/{}/{}", kind, op.target_path, name);
        if git::ref_exists(&target_dir, &dest)? && git::ref_target(&target_dir, &dest)? != *id {
            diverged.push(dest);
        }
    }
    if !diverged.is_empty() {
        clear_tmp_refs(&target_dir, &op.source)?;
        return Err(Error::HistoryDivergence {
            source_repo: op.source.clone(),
            target_repo: op.target_repo.clone(),
            target_path: op.target_path.clone(),
            paths: diverged,
        });
    }
    deadline.check(&op.id)?;

    let mut refs = Vec::new();
    for (kind, name, id) in tmp_heads
        .iter()
        .map(|(n, i)| ("heads", n, i))
        .chain(tmp_tags.iter().map(|(n, i)| ("tags", n, i)))
    {
        let dest = format!("refs/{}/{}/{}", kind, op.target_path, name);
        if git::ref_exists(&target_dir, &dest)? {
            // Identical target, nothing to do. Never overwritten.
            warn!("ref {} already present with the same target", dest);
        } else {
            git::update_ref(&target_dir, &dest, id)?;
        }
        refs.push(dest);
    }

    let source_tip = source_tip_commit(&source_dir, inventory, op, &tmp_heads)?;
    git::update_ref(&target_dir, &provenance_ref, &source_tip)?;
    clear_tmp_refs(&target_dir, &op.source)?;
    deadline.check(&op.id)?;

    refs.sort();
    Ok(AppliedMerge {
        source_tip,
        refs,
        already_applied: false,
    })
}

/// The commit the provenance marker should record: the tip of the source's
/// default branch. Chained targets absent from the inventory use their
/// checked-out branch.
fn source_tip_commit(
    source_dir: &Path,
    inventory: &Inventory,
    op: &MergeOperation,
    tmp_heads: &[(String, String)],
) -> Result<String> {
    let default_branch = match inventory.get(&op.source) {
        Some(record) => record.default_branch.clone(),
        None => git::current_branch(source_dir)?,
    };

    tmp_heads
        .iter()
        .find(|(name, _)| name == &default_branch)
        .map(|(_, id)| id.clone())
        .ok_or_else(|| Error::MissingRepository {
            id: op.source.clone(),
            path: format!(
                "{} (default branch '{}' not found)",
                source_dir.display(),
                default_branch
            ),
        })
}

fn existing_namespaced_refs(target_dir: &Path, target_path: &str) -> Result<Vec<String>> {
    let mut refs = Vec::new();
    for kind in ["heads", "tags"] {
        let prefix = format!("refs/{}/{}/", kind, target_path);
        for (name, _) in git::list_refs(target_dir, &prefix)? {
            refs.push(format!("{}{}", prefix, name));
        }
    }
    refs.sort();
    Ok(refs)
}

fn clear_tmp_refs(target_dir: &Path, source: &str) -> Result<()> {
    let prefix = format!("{}{}/", TMP_PREFIX, source);
    for (name, _) in git::list_refs(target_dir, &prefix)? {
        git::delete_ref(target_dir, &format!("{}{}", prefix, name))?;
    }
    Ok(())
}
