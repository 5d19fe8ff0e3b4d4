//! # Command Implementations
//!
//! Each submodule implements one subcommand of the `repo-consolidate`
//! CLI. A command module contains an `Args` struct describing its flags
//! and an `execute` function that runs it against the library crate.
//!
//! Commands are thin: argument resolution, user-facing output, and exit
//! semantics live here; all repository logic lives in the library.

pub mod apply;
pub mod completions;
pub mod extract;
pub mod inventory;
pub mod plan;
