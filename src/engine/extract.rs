//! engine::extract
//!
//! History extraction: one rewritten branch per mapping.
//!
//! Each mapping's history is rewritten so that only the mapping's content
//! survives, relocated to its destination path, with identities and
//! messages passed through the run's [`Reattribution`]. The result is
//! pointed to by `subgraft/mapping-<index>` in the workspace.
//!
//! [`Reattribution`]: crate::core::identity::Reattribution

use thiserror::Error;
use tracing::{info, instrument};

use crate::core::config::MigrationConfig;
use crate::core::identity::CommitRewriter;
use crate::core::mapping::Mapping;
use crate::core::naming::mapping_branch;
use crate::core::types::Oid;
use crate::git::{Git, GitError, PathFilter};

/// Errors from history extraction.
#[derive(Debug, Error)]
pub enum ExtractionError {
    /// The source path is missing at the source tip, or never carried any
    /// content.
    #[error("source path '{source_path}' has no content to extract")]
    EmptySource { source_path: String },

    /// Writing the rewritten history failed.
    #[error("failed to write history for mapping {mapping}: {source}")]
    Write {
        mapping: String,
        #[source]
        source: GitError,
    },

    #[error("extraction interrupted")]
    Interrupted,
}

/// A mapping's rewritten history.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtractedBranch {
    pub index: usize,
    pub mapping: Mapping,
    /// Local branch in the workspace.
    pub branch: String,
    pub tip: Oid,
    /// Commits in the rewritten history.
    pub commit_count: usize,
}

/// The path filter for `mapping` under `config`'s mode.
pub fn filter_for(mapping: &Mapping, config: &MigrationConfig) -> PathFilter {
    if config.file_set_mode() {
        PathFilter::FileSet {
            source: mapping.source().clone(),
            files: config.file_set.clone(),
            destination: mapping.destination().clone(),
        }
    } else {
        PathFilter::Subtree {
            source: mapping.source().clone(),
            destination: mapping.destination().clone(),
        }
    }
}

/// Rewrite the history reachable from `source_tip` for mapping `index` and
/// point `subgraft/mapping-<index>` at the result.
#[instrument(skip_all, fields(index = index, mapping = %mapping))]
pub fn extract(
    git: &Git,
    source_tip: &Oid,
    index: usize,
    mapping: &Mapping,
    config: &MigrationConfig,
    cancelled: &dyn Fn() -> bool,
) -> Result<ExtractedBranch, ExtractionError> {
    let write_error = |source: GitError| match source {
        GitError::Interrupted => ExtractionError::Interrupted,
        source => ExtractionError::Write {
            mapping: mapping.to_string(),
            source,
        },
    };
    let empty = || ExtractionError::EmptySource {
        source_path: mapping.source().to_string(),
    };

    if !git.path_exists(source_tip, mapping.source()).map_err(write_error)? {
        return Err(empty());
    }

    let rewriter = &config.reattribution;
    if !rewriter.is_identity() {
        info!(changes = ?rewriter.describe(), "rewriting identities and messages");
    }

    let filter = filter_for(mapping, config);
    let outcome = git
        .rewrite_history(source_tip, &filter, rewriter, cancelled)
        .map_err(write_error)?;
    let tip = outcome.tip.ok_or_else(empty)?;

    let branch = mapping_branch(index);
    git.set_branch(&branch, &tip).map_err(write_error)?;
    info!(
        branch = %branch,
        commits = outcome.commits_written,
        seen = outcome.commits_seen,
        "mapping extracted"
    );

    Ok(ExtractedBranch {
        index,
        mapping: mapping.clone(),
        branch,
        tip,
        commit_count: outcome.commits_written,
    })
}
