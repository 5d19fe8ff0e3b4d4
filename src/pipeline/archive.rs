//! Archival of merged source repositories.
//!
//! Purely additive: a redirect document is committed into the source
//! repository and the working tree is then made read-only. Nothing is ever
//! deleted, and a failure here is reported per repository without rolling
//! back the merge that preceded it.

use std::path::Path;

use chrono::Utc;
use log::{info, warn};
use walkdir::WalkDir;

use crate::error::{Error, Result};
use crate::git;
use crate::inventory::Inventory;
use crate::report::ArchivalRecord;

use super::executor::ExecutionOutcome;
use super::{merger, OpStatus};

/// Name of the redirect document written into archived sources.
pub const REDIRECT_DOC: &str = "ARCHIVED.md";

/// Per-repository archival result.
#[derive(Debug)]
pub struct ArchiveOutcome {
    pub source: String,
    pub result: Result<ArchivalRecord>,
}

/// Archive every source whose operation reached `applied`.
///
/// Sources are deduplicated; a source merged by several operations is
/// archived once, pointing at its first target.
pub fn archive_applied(
    workspace: &Path,
    inventory: &Inventory,
    outcomes: &[ExecutionOutcome],
) -> Vec<ArchiveOutcome> {
    let mut archived: Vec<&str> = Vec::new();
    let mut results = Vec::new();

    for outcome in outcomes {
        let op = &outcome.operation;
        if op.status != OpStatus::Applied || archived.contains(&op.source.as_str()) {
            continue;
        }
        archived.push(&op.source);

        let result = archive_one(workspace, inventory, &op.source, &op.target_repo, &op.target_path);
        if let Err(e) = &result {
            warn!("archival of '{}' failed: {}", op.source, e);
        }
        results.push(ArchiveOutcome {
            source: op.source.clone(),
            result,
        });
    }
    results
}

/// Archive a single source repository: commit the redirect document, then
/// clear write bits on the working tree. Idempotent: a source already
/// carrying a redirect to the same target is left as is.
pub fn archive_one(
    workspace: &Path,
    inventory: &Inventory,
    source: &str,
    target_repo: &str,
    target_path: &str,
) -> Result<ArchivalRecord> {
    let dir = merger::repo_dir(workspace, inventory, source);
    if !git::is_repository(&dir) {
        return Err(Error::ArchivalPermission {
            source_repo: source.to_string(),
            message: format!("no repository at {}", dir.display()),
        });
    }

    let redirect_path = dir.join(REDIRECT_DOC);
    let redirect_line = format!(
        "Consolidated into `{}` under `{}`.",
        target_repo, target_path
    );

    let already = std::fs::read_to_string(&redirect_path)
        .map(|existing| existing.contains(&redirect_line))
        .unwrap_or(false);

    if !already {
        let mut content = match std::fs::read_to_string(&redirect_path) {
            Ok(existing) => existing,
            Err(_) => String::new(),
        };
        if content.is_empty() {
            content.push_str("# Repository archived\n\nThis repository is read-only.\n");
        }
        content.push_str(&format!(
            "\n## Redirect\n\n{}\nArchived at {}.\n",
            redirect_line,
            Utc::now().to_rfc3339()
        ));

        std::fs::write(&redirect_path, &content).map_err(|e| Error::ArchivalPermission {
            source_repo: source.to_string(),
            message: format!("cannot write {}: {}", redirect_path.display(), e),
        })?;

        git::commit_file(
            &dir,
            REDIRECT_DOC,
            &format!("Archive: redirect to {}:{}", target_repo, target_path),
        )
        .map_err(|e| Error::ArchivalPermission {
            source_repo: source.to_string(),
            message: format!("cannot commit redirect document: {}", e),
        })?;
    }

    make_worktree_readonly(&dir).map_err(|e| Error::ArchivalPermission {
        source_repo: source.to_string(),
        message: e.to_string(),
    })?;

    info!("archived '{}' (redirect at {})", source, redirect_path.display());
    Ok(ArchivalRecord {
        source: source.to_string(),
        archived_at: Utc::now(),
        redirect_document: redirect_path.display().to_string(),
    })
}

/// Clear write bits on every working-tree file. `.git` is left writable so
/// the repository remains fetchable and the archival itself stays
/// re-runnable.
fn make_worktree_readonly(dir: &Path) -> std::io::Result<()> {
    for entry in WalkDir::new(dir)
        .into_iter()
        .filter_entry(|e| e.file_name() != ".git")
    {
        let entry = entry.map_err(std::io::Error::other)?;
        if entry.file_type().is_file() {
            let mut perms = entry.metadata().map_err(std::io::Error::other)?.permissions();
            perms.set_readonly(true);
            std::fs::set_permissions(entry.path(), perms)?;
        }
    }
    Ok(())
}
