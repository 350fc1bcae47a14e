//! git
//!
//! Single interface for all Git operations.
//!
//! # Architecture
//!
//! This module is the **only doorway** to Git. No other module imports
//! `git2`; everything above works with the strong types from
//! [`crate::core::types`] and the typed results defined here.
//!
//! # Responsibilities
//!
//! - Cloning, fetching, remote ref listing and conditional push
//! - History rewriting with path relocation ([`rewrite`])
//! - Merging unrelated histories ([`merge`])
//! - Step-wise replay with typed per-step signals ([`replay`])
//!
//! # Invariants
//!
//! - Pushes never force and always re-check the lease first
//! - Rewrites write objects only; refs move through explicit calls
//! - Recovery decisions are made on [`ReplaySignal`] values, never on text

mod interface;
pub mod merge;
pub mod replay;
pub mod rewrite;

pub use interface::{find_branch, CommitInfo, Credentials, Git, GitError, Lease, RemoteRef};
pub use merge::{MergedTree, Side};
pub use replay::{GitReplay, ReplayBackend, ReplaySignal};
pub use rewrite::{PathFilter, RewriteOutcome};
