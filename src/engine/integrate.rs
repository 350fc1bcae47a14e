//! engine::integrate
//!
//! Folds the per-mapping histories into the integration branch.
//!
//! Mapping 0's branch becomes the integration branch as is. Every later
//! branch is merged in with the empty tree as the common ancestor, since
//! the rewritten histories share no commit. Disjoint destinations mean
//! those merges cannot conflict; if one does anyway, the incoming mapping's
//! entries win and the paths are reported.

use thiserror::Error;
use tracing::{info, instrument, warn};

use super::extract::ExtractedBranch;
use crate::core::naming::INTEGRATION_BRANCH;
use crate::core::types::Oid;
use crate::git::{Git, GitError};

/// Errors from integration.
#[derive(Debug, Error)]
pub enum IntegrationError {
    #[error("no extracted branches to integrate")]
    NothingToIntegrate,

    /// Merging a branch failed for a reason other than a content conflict.
    #[error("failed to merge {branch} into the integration branch: {source}")]
    Merge {
        branch: String,
        #[source]
        source: GitError,
    },
}

/// Result of integration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IntegrationOutcome {
    pub branch: String,
    pub tip: Oid,
    /// Non-merge commits on the integration branch.
    pub commit_count: usize,
    /// Paths where a merge conflicted and the incoming entry was kept.
    pub defensive_resolutions: Vec<String>,
}

/// Merge `branches` (in order) into `subgraft/integration`.
#[instrument(skip_all, fields(branches = branches.len()))]
pub fn integrate(git: &Git, branches: &[ExtractedBranch]) -> Result<IntegrationOutcome, IntegrationError> {
    let (first, rest) = branches
        .split_first()
        .ok_or(IntegrationError::NothingToIntegrate)?;

    let mut tip = first.tip.clone();
    let mut defensive_resolutions = Vec::new();

    for incoming in rest {
        let merge_error = |source| IntegrationError::Merge {
            branch: incoming.branch.clone(),
            source,
        };

        let merged = git.merge_unrelated(&tip, &incoming.tip).map_err(merge_error)?;
        if !merged.resolved.is_empty() {
            warn!(
                branch = %incoming.branch,
                paths = ?merged.resolved,
                "unexpected conflict between mappings; incoming mapping kept"
            );
            defensive_resolutions.extend(merged.resolved.iter().cloned());
        }

        let message = format!(
            "Merge mapping {}: {}\n",
            incoming.index, incoming.mapping
        );
        tip = git
            .commit_merge(&merged.tree, &[tip.clone(), incoming.tip.clone()], &message)
            .map_err(merge_error)?;
    }

    let branch_error = |source| IntegrationError::Merge {
        branch: INTEGRATION_BRANCH.to_string(),
        source,
    };
    git.set_branch(INTEGRATION_BRANCH, &tip).map_err(branch_error)?;
    let commit_count = git
        .log(&tip)
        .map_err(branch_error)?
        .iter()
        .filter(|c| c.parents.len() <= 1)
        .count();

    info!(tip = tip.short(7), commit_count, "integration branch ready");
    Ok(IntegrationOutcome {
        branch: INTEGRATION_BRANCH.to_string(),
        tip,
        commit_count,
        defensive_resolutions,
    })
}
