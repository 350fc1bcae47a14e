//! core::config::migration
//!
//! The immutable configuration of one migration run.
//!
//! Built once by the CLI from flags and file defaults, then passed by
//! reference into every component. Nothing downstream reads global state.

use crate::core::identity::Reattribution;
use crate::core::mapping::MappingSet;
use crate::core::policy::ConflictPolicy;
use crate::core::types::{BranchName, RepoPath};

use super::{Config, DEFAULT_API_BASE, DEFAULT_RETRY_BUDGET};

/// Source and destination repository locations (URLs or local paths).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Remotes {
    pub source: String,
    pub destination: String,
}

/// A hosting token. Never printed.
#[derive(Clone, PartialEq, Eq)]
pub struct Token(String);

impl Token {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Debug for Token {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("Token(***)")
    }
}

/// Everything one run needs.
#[derive(Debug, Clone)]
pub struct MigrationConfig {
    pub remotes: Remotes,
    pub mappings: MappingSet,
    /// Branch, tag or commit in the source.
    pub source_ref: String,
    /// Destination branch the proposal targets.
    pub dest_branch: BranchName,
    pub conflict_policy: ConflictPolicy,
    pub reattribution: Reattribution,
    /// Explicit file set (relative to each mapping's source). Empty means
    /// subtree mode.
    pub file_set: Vec<RepoPath>,
    pub dry_run: bool,
    pub interactive: bool,
    pub keep_workspace: bool,
    pub create_destination: bool,
    /// Team that must exist (and is granted access on creation).
    pub access_group: Option<String>,
    pub open_pr: bool,
    /// Continuation attempts allowed without progress.
    pub retry_budget: u32,
    pub api_base: String,
    pub token: Option<Token>,
}

impl MigrationConfig {
    /// A config with built-in defaults for everything but the inputs.
    pub fn new(remotes: Remotes, mappings: MappingSet, dest_branch: BranchName) -> Self {
        Self {
            remotes,
            mappings,
            source_ref: "HEAD".to_string(),
            dest_branch,
            conflict_policy: ConflictPolicy::default(),
            reattribution: Reattribution::default(),
            file_set: Vec::new(),
            dry_run: false,
            interactive: false,
            keep_workspace: false,
            create_destination: false,
            access_group: None,
            open_pr: false,
            retry_budget: DEFAULT_RETRY_BUDGET,
            api_base: DEFAULT_API_BASE.to_string(),
            token: None,
        }
    }

    /// Seed file-level defaults. Flags applied afterwards win.
    pub fn with_file_defaults(mut self, file: &Config) -> Self {
        self.conflict_policy = file.conflict_policy();
        self.reattribution.coauthors = file.coauthors();
        self.retry_budget = file.retry_budget();
        self.keep_workspace = file.keep_workspace();
        self.open_pr = file.open_pr();
        self.api_base = file.api_base().to_string();
        self
    }

    /// Whether any step needs the hosting API.
    pub fn needs_hosting(&self) -> bool {
        self.open_pr || self.create_destination || self.access_group.is_some()
    }

    /// Whether the run works from an explicit file set.
    pub fn file_set_mode(&self) -> bool {
        !self.file_set.is_empty()
    }
}
