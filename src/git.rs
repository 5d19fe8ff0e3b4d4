//! Thin wrapper around the system `git` binary.
//!
//! The engine drives real git repositories rather than reimplementing the
//! object model. Using the system git command automatically handles
//! repository formats, hooks, and any authentication configured in the
//! environment. Every helper maps a non-zero exit status to
//! `Error::GitCommand` with the captured stderr.

use std::path::Path;
use std::process::Command;

use crate::error::{Error, Result};

/// Identity used for commits the engine itself creates (root commits of
/// fresh targets, redirect documents). Passed per-invocation so no global
/// git config is touched.
const COMMIT_IDENTITY: [&str; 4] = [
    "-c",
    "user.name=repo-consolidate",
    "-c",
    "user.email=repo-consolidate@localhost",
];

/// Run a git command in `repo` and return trimmed stdout.
pub fn run(repo: &Path, args: &[&str]) -> Result<String> {
    let output = Command::new("git")
        .arg("-C")
        .arg(repo)
        .args(COMMIT_IDENTITY)
        .args(args)
        .output()
        .map_err(|e| Error::GitCommand {
            command: args.join(" "),
            repo: repo.display().to_string(),
            stderr: e.to_string(),
        })?;

    if !output.status.success() {
        return Err(Error::GitCommand {
            command: args.join(" "),
            repo: repo.display().to_string(),
            stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
        });
    }

    Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
}

/// Check whether `path` is the root of a git repository.
pub fn is_repository(path: &Path) -> bool {
    path.join(".git").exists()
}

/// Initialize a repository with an empty root commit.
///
/// Used when a target repository exists only as the output of the
/// consolidation itself.
pub fn init_repository(path: &Path, default_branch: &str) -> Result<()> {
    std::fs::create_dir_all(path)?;
    run(path, &["init", "--initial-branch", default_branch])?;
    run(
        path,
        &[
            "commit",
            "--allow-empty",
            "-m",
            "Initialize consolidated repository",
        ],
    )?;
    Ok(())
}

/// Resolve a revision to a commit id.
pub fn rev_parse(repo: &Path, rev: &str) -> Result<String> {
    run(repo, &["rev-parse", "--verify", &format!("{}^{{commit}}", rev)])
}

/// The object a ref points at, without peeling tags.
pub fn ref_target(repo: &Path, name: &str) -> Result<String> {
    run(repo, &["rev-parse", "--verify", name])
}

/// Check whether a fully qualified ref exists.
pub fn ref_exists(repo: &Path, name: &str) -> Result<bool> {
    let output = Command::new("git")
        .arg("-C")
        .arg(repo)
        .args(["show-ref", "--verify", "--quiet", name])
        .status()
        .map_err(|e| Error::GitCommand {
            command: format!("show-ref --verify {}", name),
            repo: repo.display().to_string(),
            stderr: e.to_string(),
        })?;
    Ok(output.success())
}

/// Count commits reachable from a revision.
pub fn commit_count(repo: &Path, rev: &str) -> Result<u64> {
    let out = run(repo, &["rev-list", "--count", rev])?;
    out.parse().map_err(|_| Error::GitCommand {
        command: format!("rev-list --count {}", rev),
        repo: repo.display().to_string(),
        stderr: format!("unexpected rev-list output: {}", out),
    })
}

/// List refs under a prefix as `(short_name, commit_id)` pairs.
///
/// `short_name` is the ref name with `prefix` stripped, e.g. branch names
/// when called with `refs/heads/`.
pub fn list_refs(repo: &Path, prefix: &str) -> Result<Vec<(String, String)>> {
    let out = run(
        repo,
        &[
            "for-each-ref",
            "--format=%(refname) %(objectname)",
            prefix,
        ],
    )?;

    let mut refs = Vec::new();
    for line in out.lines() {
        if let Some((name, id)) = line.split_once(' ') {
            let short = name.strip_prefix(prefix).unwrap_or(name);
            refs.push((short.to_string(), id.to_string()));
        }
    }
    Ok(refs)
}

/// Create or move a ref to point at a commit.
pub fn update_ref(repo: &Path, name: &str, commit: &str) -> Result<()> {
    run(repo, &["update-ref", name, commit])?;
    Ok(())
}

/// Delete a ref. Only used for the temporary fetch namespace; never for
/// source history.
pub fn delete_ref(repo: &Path, name: &str) -> Result<()> {
    run(repo, &["update-ref", "-d", name])?;
    Ok(())
}

/// Fetch refs from a local repository path into a namespace of `repo`.
pub fn fetch(repo: &Path, from: &Path, refspecs: &[&str]) -> Result<()> {
    let from_str = from.display().to_string();
    let mut args = vec!["fetch", "--no-tags", from_str.as_str()];
    args.extend_from_slice(refspecs);
    run(repo, &args)?;
    Ok(())
}

/// The currently checked-out branch name.
pub fn current_branch(repo: &Path) -> Result<String> {
    run(repo, &["symbolic-ref", "--short", "HEAD"])
}

/// List all blobs in the tree of a revision as `(blob_id, path)` pairs.
pub fn ls_tree(repo: &Path, rev: &str) -> Result<Vec<(String, String)>> {
    let out = run(repo, &["ls-tree", "-r", rev])?;
    let mut blobs = Vec::new();
    for line in out.lines() {
        // Format: <mode> <type> <object>\t<path>
        let Some((meta, path)) = line.split_once('\t') else {
            continue;
        };
        let fields: Vec<&str> = meta.split_whitespace().collect();
        if fields.len() == 3 && fields[1] == "blob" {
            blobs.push((fields[2].to_string(), path.to_string()));
        }
    }
    Ok(blobs)
}

/// Read a blob's content as (lossy) UTF-8 text.
pub fn show_blob(repo: &Path, blob_id: &str) -> Result<String> {
    run(repo, &["cat-file", "-p", blob_id])
}

/// Stage a single file and commit it.
pub fn commit_file(repo: &Path, file: &str, message: &str) -> Result<String> {
    run(repo, &["add", "--", file])?;
    run(repo, &["commit", "-m", message])?;
    rev_parse(repo, "HEAD")
}
