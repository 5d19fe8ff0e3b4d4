//! Knowledge extraction from consolidated history.
//!
//! A post-merge pass that mines the merged refs for document-worthy content
//! (long-form markdown) and emits a derived index. Read-only with respect to
//! the repository: blobs are read straight from the object store so the
//! working tree never needs a checkout. Failures on individual documents are
//! logged and skipped, never fatal.

use std::collections::HashSet;
use std::path::Path;

use chrono::{DateTime, Utc};
use glob::Pattern;
use log::{debug, warn};
use pulldown_cmark::{Event, HeadingLevel, Parser, Tag, TagEnd};
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::git;

/// Default document selection when the caller gives no patterns.
pub const DEFAULT_PATTERNS: &[&str] = &["**/*.md"];

/// One heading in a document outline.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Heading {
    /// 1-6, as in markdown.
    pub level: u8,
    pub text: String,
}

/// A document found in the merged history.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DocumentRecord {
    /// Ref the document was found under.
    pub ref_name: String,
    /// Path within that ref's tree.
    pub path: String,
    /// First H1, or the file stem when the document has none.
    pub title: String,
    /// Heading outline in document order.
    pub headings: Vec<Heading>,
    pub word_count: usize,
}

/// The derived document set for one repository.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KnowledgeIndex {
    pub generated_at: DateTime<Utc>,
    pub repository: String,
    pub documents: Vec<DocumentRecord>,
}

impl KnowledgeIndex {
    pub fn write_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, serde_json::to_string_pretty(self)?)?;
        Ok(())
    }
}

/// Scan `HEAD` and every branch of a repository for documents matching the
/// glob patterns. Identical blobs reachable from several refs are indexed
/// once, under the first ref that reaches them.
pub fn extract_repository(repo_dir: &Path, patterns: &[String]) -> Result<KnowledgeIndex> {
    if !git::is_repository(repo_dir) {
        return Err(Error::Extraction {
            message: format!("no repository at {}", repo_dir.display()),
        });
    }

    let compiled: Vec<Pattern> = patterns
        .iter()
        .map(|p| Pattern::new(p))
        .collect::<std::result::Result<_, _>>()?;

    let mut refs = vec!["HEAD".to_string()];
    refs.extend(
        git::list_refs(repo_dir, "refs/heads/")?
            .into_iter()
            .map(|(name, _)| format!("refs/heads/{}", name)),
    );

    let mut seen: HashSet<(String, String)> = HashSet::new();
    let mut documents = Vec::new();

    for ref_name in &refs {
        let blobs = match git::ls_tree(repo_dir, ref_name) {
            Ok(blobs) => blobs,
            Err(e) => {
                warn!("skipping ref {} during extraction: {}", ref_name, e);
                continue;
            }
        };

        for (blob_id, path) in blobs {
            if !compiled.iter().any(|p| p.matches(&path)) {
                continue;
            }
            if !seen.insert((blob_id.clone(), path.clone())) {
                continue;
            }
            match git::show_blob(repo_dir, &blob_id) {
                Ok(content) => {
                    documents.push(analyze_document(ref_name, &path, &content));
                }
                Err(e) => {
                    warn!("cannot read {}:{} during extraction: {}", ref_name, path, e);
                }
            }
        }
    }

    debug!(
        "extracted {} documents from {}",
        documents.len(),
        repo_dir.display()
    );
    Ok(KnowledgeIndex {
        generated_at: Utc::now(),
        repository: repo_dir.display().to_string(),
        documents,
    })
}

fn heading_depth(level: HeadingLevel) -> u8 {
    match level {
        HeadingLevel::H1 => 1,
        HeadingLevel::H2 => 2,
        HeadingLevel::H3 => 3,
        HeadingLevel::H4 => 4,
        HeadingLevel::H5 => 5,
        HeadingLevel::H6 => 6,
    }
}

/// Parse one markdown document into its record.
fn analyze_document(ref_name: &str, path: &str, content: &str) -> DocumentRecord {
    let mut headings: Vec<Heading> = Vec::new();
    let mut current_heading: Option<Heading> = None;
    let mut word_count = 0usize;

    for event in Parser::new(content) {
        match event {
            Event::Start(Tag::Heading { level, .. }) => {
                current_heading = Some(Heading {
                    level: heading_depth(level),
                    text: String::new(),
                });
            }
            Event::End(TagEnd::Heading(_)) => {
                if let Some(heading) = current_heading.take() {
                    headings.push(heading);
                }
            }
            Event::Text(text) | Event::Code(text) => {
                word_count += text.split_whitespace().count();
                if let Some(heading) = current_heading.as_mut() {
                    heading.text.push_str(&text);
                }
            }
            _ => {}
        }
    }

    let title = headings
        .iter()
        .find(|h| h.level == 1)
        .map(|h| h.text.clone())
        .unwrap_or_else(|| {
            Path::new(path)
                .file_stem()
                .map(|s| s.to_string_lossy().into_owned())
                .unwrap_or_else(|| path.to_string())
        });

    DocumentRecord {
        ref_name: ref_name.to_string(),
        path: path.to_string(),
        title,
        headings,
        word_count,
    }
}
