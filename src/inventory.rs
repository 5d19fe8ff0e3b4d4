//! # Inventory Loading
//!
//! Parses a discovery snapshot into an in-memory model. The snapshot is a
//! JSON document produced by an external discovery collaborator and maps
//! repository identifiers to their metadata (default branch, branches, tags,
//! commit count, last activity, classification).
//!
//! Records are immutable once loaded: the loader validates the snapshot up
//! front and hands out read-only views, so later pipeline stages never need
//! to lock the inventory.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Classification assigned by the discovery scanner.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Classification {
    /// Ecosystem-critical, stays standalone.
    Core,
    /// Regular activity, stays standalone.
    Active,
    /// Candidate for merging into a consolidated repository.
    Consolidate,
    /// No recent activity; preserve read-only.
    Archive,
    /// Obsolete; flagged, never deleted by this engine.
    Deprecate,
}

impl std::fmt::Display for Classification {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Classification::Core => "core",
            Classification::Active => "active",
            Classification::Consolidate => "consolidate",
            Classification::Archive => "archive",
            Classification::Deprecate => "deprecate",
        };
        write!(f, "{}", name)
    }
}

/// Metadata for a single repository, immutable once loaded.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RepositoryRecord {
    /// Repository identifier, unique within the inventory.
    pub id: String,
    /// Default branch name; must appear in `branches`.
    pub default_branch: String,
    /// Ordered list of branch names.
    pub branches: Vec<String>,
    /// Ordered list of tag names.
    #[serde(default)]
    pub tags: Vec<String>,
    /// Total commit count on the default branch at scan time.
    pub commit_count: u64,
    /// Last-activity timestamp as reported by the scanner (RFC 3339).
    pub last_activity: String,
    /// Scanner classification.
    #[serde(default = "default_classification")]
    pub classification: Classification,
    /// Optional local path override; defaults to `<workspace>/<id>`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<PathBuf>,
}

fn default_classification() -> Classification {
    Classification::Consolidate
}

impl RepositoryRecord {
    /// Resolve the on-disk location of this repository.
    pub fn resolve_path(&self, workspace: &Path) -> PathBuf {
        match &self.path {
            Some(p) if p.is_absolute() => p.clone(),
            Some(p) => workspace.join(p),
            None => workspace.join(&self.id),
        }
    }
}

/// The full discovery snapshot.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Inventory {
    /// When the external scan ran.
    #[serde(default)]
    pub scan_timestamp: Option<String>,
    /// Version of the external scanner.
    #[serde(default)]
    pub scanner_version: Option<String>,
    /// Identifier -> record map. BTreeMap keeps iteration deterministic.
    #[serde(deserialize_with = "repositories_without_duplicates")]
    pub repositories: BTreeMap<String, RepositoryRecord>,
}

/// Deserialize the repository map, rejecting duplicate identifiers.
///
/// Plain map deserialization keeps whichever record comes last, which would
/// let a snapshot silently carry two conflicting entries for one repository.
fn repositories_without_duplicates<'de, D>(
    deserializer: D,
) -> std::result::Result<BTreeMap<String, RepositoryRecord>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    struct MapVisitor;

    impl<'de> serde::de::Visitor<'de> for MapVisitor {
        type Value = BTreeMap<String, RepositoryRecord>;

        fn expecting(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
            f.write_str("a map of repository identifiers to records")
        }

        fn visit_map<M>(self, mut access: M) -> std::result::Result<Self::Value, M::Error>
        where
            M: serde::de::MapAccess<'de>,
        {
            let mut repositories = BTreeMap::new();
            while let Some((id, record)) = access.next_entry::<String, RepositoryRecord>()? {
                if repositories.insert(id.clone(), record).is_some() {
                    return Err(serde::de::Error::custom(format!(
                        "duplicate repository identifier '{}'",
                        id
                    )));
                }
            }
            Ok(repositories)
        }
    }

    deserializer.deserialize_map(MapVisitor)
}

impl Inventory {
    /// Look up a record by identifier.
    pub fn get(&self, id: &str) -> Option<&RepositoryRecord> {
        self.repositories.get(id)
    }

    /// Whether the inventory knows this identifier.
    pub fn contains(&self, id: &str) -> bool {
        self.repositories.contains_key(id)
    }

    pub fn len(&self) -> usize {
        self.repositories.len()
    }

    pub fn is_empty(&self) -> bool {
        self.repositories.is_empty()
    }

    /// Count of repositories per classification, in enum order.
    pub fn classification_summary(&self) -> BTreeMap<Classification, usize> {
        let mut summary = BTreeMap::new();
        for record in self.repositories.values() {
            *summary.entry(record.classification).or_insert(0) += 1;
        }
        summary
    }

    /// A close identifier match for error hints, if one exists.
    ///
    /// Cheap single-edit heuristic: an existing id that contains or is
    /// contained by the unknown one.
    pub fn closest_id(&self, unknown: &str) -> Option<&str> {
        self.repositories
            .keys()
            .find(|id| id.contains(unknown) || unknown.contains(id.as_str()))
            .map(|s| s.as_str())
    }
}

/// Parse an inventory snapshot from a JSON string.
pub fn parse(content: &str) -> Result<Inventory> {
    let inventory: Inventory =
        serde_json::from_str(content).map_err(|e| Error::InventoryParse {
            message: e.to_string(),
            hint: Some(
                "the snapshot must be a JSON object with a 'repositories' map".to_string(),
            ),
        })?;
    validate(&inventory)?;
    Ok(inventory)
}

/// Load and validate an inventory snapshot from a file.
pub fn from_file(path: &Path) -> Result<Inventory> {
    let content = std::fs::read_to_string(path).map_err(|e| Error::InventoryParse {
        message: format!("cannot read {}: {}", path.display(), e),
        hint: Some("run the discovery scanner to produce the snapshot first".to_string()),
    })?;
    parse(&content)
}

fn identifier_pattern() -> Regex {
    // Infallible: the pattern is a literal.
    Regex::new("^[A-Za-z0-9][A-Za-z0-9._-]*$").unwrap_or_else(|_| unreachable!())
}

fn validate(inventory: &Inventory) -> Result<()> {
    let pattern = identifier_pattern();

    for (key, record) in &inventory.repositories {
        if key != &record.id {
            return Err(Error::InventoryParse {
                message: format!(
                    "repository key '{}' does not match record id '{}'",
                    key, record.id
                ),
                hint: None,
            });
        }

        if !pattern.is_match(&record.id) {
            return Err(Error::InventoryParse {
                message: format!("invalid repository identifier '{}'", record.id),
                hint: Some(
                    "identifiers must start alphanumeric and use only [A-Za-z0-9._-]".to_string(),
                ),
            });
        }

        if !record.branches.contains(&record.default_branch) {
            return Err(Error::InventoryParse {
                message: format!(
                    "repository '{}': default branch '{}' is not in the branch list",
                    record.id, record.default_branch
                ),
                hint: None,
            });
        }
    }

    Ok(())
}
