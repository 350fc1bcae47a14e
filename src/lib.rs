//! subgraft - Migrate paths between Git repositories with full history
//!
//! subgraft extracts one or more source paths from a source repository,
//! rewrites their history so they land at new destination paths, merges the
//! results, and proposes them to the destination repository as a branch and
//! pull request. The destination branch itself is never written.
//!
//! # Architecture
//!
//! The codebase follows a strict layered architecture:
//!
//! - [`cli`] - Command-line interface layer (parses args, delegates to engine)
//! - [`engine`] - Orchestrates Preflight → Extract → Integrate → Publish
//! - [`core`] - Domain types, mappings, identity policy and configuration
//! - [`git`] - Single interface for all Git operations
//! - [`forge`] - Abstraction for the destination's hosting API (GitHub)
//! - [`ui`] - Output formatting
//!
//! # Correctness Invariants
//!
//! 1. No two mappings write to overlapping destination paths
//! 2. Commit order, timestamps and messages survive extraction unchanged,
//!    apart from the configured identity and trailer rewrites
//! 3. Nothing is pushed unless the destination still matches what was
//!    fetched
//! 4. Every run cleans up its workspace unless asked to keep it

pub mod cli;
pub mod core;
pub mod engine;
pub mod forge;
pub mod git;
pub mod ui;
