//! # Repository Consolidation Library
//!
//! This library provides the core functionality for consolidating many
//! source repositories into shared target repositories without losing
//! history. It is designed to be used by the `repo-consolidate`
//! command-line tool but can also be integrated into other applications
//! that orchestrate repository lifecycles.
//!
//! ## Core Concepts
//!
//! - **Inventory (`inventory`)**: an immutable snapshot of all known
//!   repositories and their metadata, produced by an external discovery
//!   scanner.
//! - **Merge Plan (`plan`)**: a declarative YAML document stating which
//!   sources consolidate into which target locations, with a per-entry
//!   conflict policy.
//! - **Pipeline (`pipeline`)**: planning, a validation gate, history
//!   merging on a bounded worker pool, archival, and knowledge extraction.
//! - **Git driving (`git`)**: a thin wrapper over the system git binary;
//!   histories are grafted by fetching objects and creating namespaced
//!   refs, never by rewriting commits.
//! - **Reporting (`report`)**: machine-readable execution reports and
//!   archival records for downstream tooling.
//!
//! ## Execution Flow
//!
//! The main entry point is `pipeline::orchestrator`, which executes the
//! following high-level steps:
//!
//! 1.  **Planning**: validate plan entries against the inventory, resolve
//!     conflicts, and compute a topologically ordered operation list.
//! 2.  **Validation gate**: the last side-effect-free step; dry runs stop
//!     here.
//! 3.  **Execution**: graft source histories into targets, independent
//!     operations in parallel.
//! 4.  **Archival**: mark merged sources read-only with a redirect
//!     document; nothing is ever deleted.
//! 5.  **Extraction**: mine the merged refs for document-worthy content.

pub mod error;
pub mod git;
pub mod inventory;
pub mod output;
pub mod pipeline;
pub mod plan;
pub mod report;
