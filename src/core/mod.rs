//! core
//!
//! Core domain types, validation and configuration for subgraft.
//!
//! # Modules
//!
//! - [`types`] - Strong types: BranchName, Oid, RepoPath
//! - [`mapping`] - Path mappings and their overlap rules
//! - [`identity`] - Identity overrides and co-author trailer policy
//! - [`policy`] - Replay conflict policies
//! - [`naming`] - Names of the branches a run creates
//! - [`config`] - Configuration schema and loading
//!
//! # Design Principles
//!
//! - Strong typing prevents invalid states at compile time
//! - Everything is validated before a repository is touched

pub mod config;
pub mod identity;
pub mod mapping;
pub mod naming;
pub mod policy;
pub mod types;
