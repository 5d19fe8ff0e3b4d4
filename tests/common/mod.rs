//! Shared test utilities for integration and E2E tests.
//!
//! This module provides common fixtures, helper functions, and plan
//! snippets to reduce duplication across test files.
//!
//! ## Usage
//!
//! Add `mod common;` to your test file, then use the helpers:
//!
//! ```rust,ignore
//! mod common;
//! use common::prelude::*;
//!
//! #[test]
//! fn test_example() {
//!     let fixture = ConsolidationFixture::new()
//!         .with_repo("repo-b", &[("b.txt", "b")])
//!         .with_inventory()
//!         .with_plan(plans::B_INTO_A);
//!     // ... test code
//! }
//! ```

use std::path::Path;
use std::process::Command;

/// Re-export commonly used test dependencies for convenience.
pub mod prelude {
    pub use assert_cmd::cargo::cargo_bin_cmd;
    pub use assert_fs::prelude::*;
    #[allow(unused_imports)]
    pub use assert_fs::TempDir;
    pub use predicates::prelude::*;

    #[allow(unused_imports)]
    pub use super::plans;
    pub use super::ConsolidationFixture;
}

/// Common merge-plan YAML snippets for testing.
#[allow(dead_code)]
pub mod plans {
    /// One entry: repo-b consolidated into repo-a under legacy/B.
    pub const B_INTO_A: &str = r#"
target: repo-a
entries:
  - source: repo-b
    target_path: legacy/B
"#;

    /// Two entries claiming the same target path, default `fail` policy.
    pub const CONFLICTING: &str = r#"
target: consolidated
entries:
  - source: repo-a
    target_path: shared/lib
  - source: repo-b
    target_path: shared/lib
"#;

    /// Same collision, resolved by renaming the later entry.
    pub const RENAMING: &str = r#"
target: consolidated
entries:
  - source: repo-a
    target_path: shared/lib
  - source: repo-b
    target_path: shared/lib
    on_conflict: rename
"#;

    /// Invalid YAML for error testing.
    pub const INVALID_YAML: &str = "entries: [unclosed";
}

/// A test fixture providing a temporary workspace with git repositories,
/// an inventory snapshot, and a merge plan.
///
/// Repositories are created with one commit per file so commit counts are
/// predictable. The inventory is generated from the repositories added so
/// far; add all repositories before calling [`with_inventory`].
///
/// [`with_inventory`]: ConsolidationFixture::with_inventory
pub struct ConsolidationFixture {
    temp_dir: assert_fs::TempDir,
    repos: Vec<(String, u64)>,
}

impl ConsolidationFixture {
    /// Create a new fixture with an empty temporary workspace.
    pub fn new() -> Self {
        Self {
            temp_dir: assert_fs::TempDir::new().expect("Failed to create temp directory"),
            repos: Vec::new(),
        }
    }

    /// Create a git repository named `id` with one commit per file.
    pub fn with_repo(mut self, id: &str, files: &[(&str, &str)]) -> Self {
        let dir = self.temp_dir.path().join(id);
        std::fs::create_dir_all(&dir).expect("Failed to create repo directory");
        git(&dir, &["init", "--initial-branch", "main"]);
        for (name, content) in files {
            let file = dir.join(name);
            if let Some(parent) = file.parent() {
                std::fs::create_dir_all(parent).expect("Failed to create parent directory");
            }
            std::fs::write(&file, content).expect("Failed to write file");
            git(&dir, &["add", name]);
            git(&dir, &["commit", "-m", &format!("add {}", name)]);
        }
        self.repos.push((id.to_string(), files.len() as u64));
        self
    }

    /// Write `inventory.json` covering every repository added so far.
    pub fn with_inventory(self) -> Self {
        let records: Vec<String> = self
            .repos
            .iter()
            .map(|(id, commits)| {
                format!(
                    r#""{id}": {{
                        "id": "{id}",
                        "default_branch": "main",
                        "branches": ["main"],
                        "commit_count": {commits},
                        "last_activity": "2026-08-01T00:00:00Z",
                        "classification": "consolidate"
                    }}"#,
                    id = id,
                    commits = commits
                )
            })
            .collect();
        let snapshot = format!(r#"{{"repositories": {{{}}}}}"#, records.join(","));
        std::fs::write(self.temp_dir.path().join("inventory.json"), snapshot)
            .expect("Failed to write inventory");
        self
    }

    /// Write `consolidation-plan.yaml` with the given content.
    pub fn with_plan(self, content: &str) -> Self {
        std::fs::write(self.temp_dir.path().join("consolidation-plan.yaml"), content)
            .expect("Failed to write plan");
        self
    }

    /// Get the path to the temporary workspace.
    pub fn path(&self) -> &Path {
        self.temp_dir.path()
    }

    /// Path of one repository inside the workspace.
    #[allow(dead_code)]
    pub fn repo_path(&self, id: &str) -> std::path::PathBuf {
        self.temp_dir.path().join(id)
    }

    /// Create a command configured to run in this fixture's workspace.
    ///
    /// The default `--inventory` and `--plan` values resolve relative to
    /// the working directory, so the fixture files are picked up as-is.
    pub fn command(&self) -> assert_cmd::Command {
        let mut cmd = assert_cmd::cargo::cargo_bin_cmd!("repo-consolidate");
        cmd.current_dir(self.path());
        cmd
    }

    /// Resolve a ref in one of the fixture's repositories, if it exists.
    #[allow(dead_code)]
    pub fn rev_parse(&self, id: &str, rev: &str) -> Option<String> {
        let output = Command::new("git")
            .current_dir(self.repo_path(id))
            .args(["rev-parse", "--verify", "--quiet", rev])
            .output()
            .expect("Failed to run git");
        output
            .status
            .success()
            .then(|| String::from_utf8_lossy(&output.stdout).trim().to_string())
    }

    /// Commit count reachable from a rev in one of the fixture's repos.
    #[allow(dead_code)]
    pub fn commit_count(&self, id: &str, rev: &str) -> u64 {
        let output = Command::new("git")
            .current_dir(self.repo_path(id))
            .args(["rev-list", "--count", rev])
            .output()
            .expect("Failed to run git");
        assert!(output.status.success(), "rev-list failed for {}", rev);
        String::from_utf8_lossy(&output.stdout)
            .trim()
            .parse()
            .expect("unparseable commit count")
    }
}

impl Default for ConsolidationFixture {
    fn default() -> Self {
        Self::new()
    }
}

/// Run git in a directory with a fixed test identity, panicking on failure.
fn git(dir: &Path, args: &[&str]) {
    let output = Command::new("git")
        .current_dir(dir)
        .args([
            "-c",
            "user.name=test",
            "-c",
            "user.email=test@example.com",
        ])
        .args(args)
        .output()
        .expect("Failed to run git");
    assert!(
        output.status.success(),
        "git {:?} failed: {}",
        args,
        String::from_utf8_lossy(&output.stderr)
    );
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fixture_creates_repos_and_inventory() {
        let fixture = ConsolidationFixture::new()
            .with_repo("repo-a", &[("a.txt", "a")])
            .with_inventory()
            .with_plan(plans::B_INTO_A);

        assert!(fixture.repo_path("repo-a").join(".git").exists());
        assert!(fixture.path().join("inventory.json").exists());
        assert!(fixture.path().join("consolidation-plan.yaml").exists());
        assert_eq!(fixture.commit_count("repo-a", "main"), 1);
    }

    #[test]
    fn test_plans_are_valid_yaml() {
        for plan in [plans::B_INTO_A, plans::CONFLICTING, plans::RENAMING] {
            serde_yaml::from_str::<serde_yaml::Value>(plan).expect("Plan should be valid YAML");
        }
    }

    #[test]
    fn test_invalid_yaml_is_actually_invalid() {
        assert!(serde_yaml::from_str::<serde_yaml::Value>(plans::INVALID_YAML).is_err());
    }
}
