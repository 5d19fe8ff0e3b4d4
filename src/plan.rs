//! # Merge Plan Configuration
//!
//! Defines the schema for the declarative merge plan, a YAML document that
//! enumerates which source repositories consolidate into which target
//! locations. The plan is pure configuration: nothing here touches a
//! repository.
//!
//! ```yaml
//! target: consolidated
//! options:
//!   fail_fast: false
//!   parallelism: 4
//!   timeout_secs: 300
//! entries:
//!   - source: repo-b
//!     target_path: legacy/B
//!     on_conflict: fail
//!   - source: old-tools
//!     target: toolbox
//!     target_path: tools/old
//!     on_conflict: rename
//! ```

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// What to do when two entries claim overlapping target paths.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ConflictPolicy {
    /// Abort planning, naming every conflicting pair.
    Fail,
    /// Append a deterministic numeric suffix to the later entry's path.
    Rename,
    /// Drop the later entry; the first claim wins.
    SkipDuplicate,
}

impl Default for ConflictPolicy {
    fn default() -> Self {
        ConflictPolicy::Fail
    }
}

/// One source repository consolidated into one target subtree.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MergePlanEntry {
    /// Source repository identifier.
    pub source: String,
    /// Target repository identifier; defaults to the plan-level target.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target: Option<String>,
    /// Subtree within the target repository to graft the source under.
    pub target_path: String,
    /// Conflict-resolution policy for this entry.
    #[serde(default)]
    pub on_conflict: ConflictPolicy,
}

/// Execution knobs; all optional in the document.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PlanOptions {
    /// Stop launching new operations once any failure is observed.
    pub fail_fast: bool,
    /// Worker-pool size for independent operations.
    pub parallelism: usize,
    /// Per-operation time budget in seconds. 0 disables the budget.
    pub timeout_secs: u64,
}

impl Default for PlanOptions {
    fn default() -> Self {
        Self {
            fail_fast: false,
            parallelism: 4,
            timeout_secs: 300,
        }
    }
}

/// The parsed merge plan.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MergePlan {
    /// Default target repository for entries without an explicit one.
    pub target: String,
    #[serde(default)]
    pub options: PlanOptions,
    pub entries: Vec<MergePlanEntry>,
}

impl MergePlan {
    /// The effective target repository of an entry.
    pub fn target_of<'a>(&'a self, entry: &'a MergePlanEntry) -> &'a str {
        entry.target.as_deref().unwrap_or(&self.target)
    }

    /// Structural validation that needs no inventory: non-empty fields,
    /// normalized relative target paths.
    pub fn validate(&self) -> Result<()> {
        if self.target.is_empty() {
            return Err(Error::PlanParse {
                message: "plan-level 'target' must not be empty".to_string(),
                hint: None,
            });
        }

        for (idx, entry) in self.entries.iter().enumerate() {
            if entry.source.is_empty() {
                return Err(Error::PlanParse {
                    message: format!("entry {}: 'source' must not be empty", idx),
                    hint: None,
                });
            }
            validate_target_path(idx, &entry.target_path)?;
            if self.target_of(entry) == entry.source {
                return Err(Error::PlanParse {
                    message: format!(
                        "entry {}: source '{}' cannot be its own target",
                        idx, entry.source
                    ),
                    hint: None,
                });
            }
        }

        Ok(())
    }
}

fn validate_target_path(idx: usize, path: &str) -> Result<()> {
    if path.is_empty() {
        return Err(Error::PlanParse {
            message: format!("entry {}: 'target_path' must not be empty", idx),
            hint: None,
        });
    }
    if path.starts_with('/') || path.ends_with('/') {
        return Err(Error::PlanParse {
            message: format!(
                "entry {}: 'target_path' must be relative without trailing slash: '{}'",
                idx, path
            ),
            hint: Some("use a path like 'legacy/B'".to_string()),
        });
    }
    if path.split('/').any(|c| c.is_empty() || c == "." || c == "..") {
        return Err(Error::PlanParse {
            message: format!(
                "entry {}: 'target_path' contains empty or dot components: '{}'",
                idx, path
            ),
            hint: None,
        });
    }
    Ok(())
}

/// Parse a merge plan from a YAML string.
pub fn parse(content: &str) -> Result<MergePlan> {
    let plan: MergePlan = serde_yaml::from_str(content).map_err(|e| Error::PlanParse {
        message: e.to_string(),
        hint: Some("the plan needs 'target' and an 'entries' list".to_string()),
    })?;
    plan.validate()?;
    Ok(plan)
}

/// Load and validate a merge plan from a file.
pub fn from_file(path: &Path) -> Result<MergePlan> {
    let content = std::fs::read_to_string(path).map_err(|e| Error::PlanParse {
        message: format!("cannot read {}: {}", path.display(), e),
        hint: None,
    })?;
    parse(&content)
}
