//! core::naming
//!
//! Names of the branches a migration creates.
//!
//! Working branches live only inside the workspace clone. The proposal
//! branch is the one pushed to the destination; its name is deterministic so
//! that re-running an unchanged migration targets the same branch.

use sha2::{Digest, Sha256};

use crate::core::mapping::MappingSet;
use crate::core::policy::ConflictPolicy;
use crate::core::types::{BranchName, Oid};

/// Branch accumulating every mapping's rewritten history.
pub const INTEGRATION_BRANCH: &str = "subgraft/integration";

/// Prefix of proposal branches pushed to the destination.
pub const PROPOSAL_PREFIX: &str = "migrate";

/// Working branch holding the rewritten history of mapping `index`.
pub fn mapping_branch(index: usize) -> String {
    format!("subgraft/mapping-{index}")
}

/// Generate a branch-name slug from a ref or free text.
///
/// Lowercases, turns separators into hyphens, drops everything else and
/// truncates to 40 characters.
///
/// # Example
///
/// ```
/// use subgraft::core::naming::slugify;
///
/// assert_eq!(slugify("refs/heads/feature/Login"), "refs-heads-feature-login");
/// assert_eq!(slugify("v1.2.0"), "v1-2-0");
/// ```
pub fn slugify(text: &str) -> String {
    let first_line = text.lines().next().unwrap_or("");

    let slug = first_line
        .chars()
        .filter_map(|c| {
            if c.is_ascii_alphanumeric() {
                Some(c.to_ascii_lowercase())
            } else if matches!(c, ' ' | '_' | '/' | '.' | '-') {
                Some('-')
            } else {
                None
            }
        })
        .collect::<String>()
        .split('-')
        .filter(|s| !s.is_empty())
        .collect::<Vec<_>>()
        .join("-");

    let truncated: String = slug.chars().take(40).collect();
    truncated.trim_end_matches('-').to_string()
}

/// Content hash identifying a migration result.
///
/// Covers the mappings, the source ref and the resulting tree, so the hash
/// only changes when the proposal would.
pub fn content_hash(mappings: &MappingSet, source_ref: &str, tree: &Oid) -> String {
    let mut hasher = Sha256::new();
    for mapping in mappings {
        hasher.update(mapping.source().as_str().as_bytes());
        hasher.update(b"\0");
        hasher.update(mapping.destination().as_str().as_bytes());
        hasher.update(b"\n");
    }
    hasher.update(source_ref.as_bytes());
    hasher.update(b"\n");
    hasher.update(tree.as_str().as_bytes());
    let hash = hasher.finalize();
    hex::encode(&hash[..4])
}

fn source_slug(source_ref: &str) -> String {
    let slug = slugify(source_ref);
    if slug.is_empty() {
        "source".to_string()
    } else {
        slug
    }
}

/// Branch suggested for a proposal finished by hand, whose tree (and so
/// hash) is not known yet.
pub fn manual_branch(source_ref: &str) -> String {
    format!("{PROPOSAL_PREFIX}/{}-manual", source_slug(source_ref))
}

/// Name of the proposal branch pushed to the destination:
/// `migrate/<source-ref-slug>-<hash8>[-<policy>]`.
pub fn proposal_branch(
    mappings: &MappingSet,
    source_ref: &str,
    tree: &Oid,
    policy: ConflictPolicy,
) -> BranchName {
    let mut name = format!(
        "{PROPOSAL_PREFIX}/{}-{}",
        source_slug(source_ref),
        content_hash(mappings, source_ref, tree)
    );
    if let Some(suffix) = policy.branch_suffix() {
        name.push('-');
        name.push_str(suffix);
    }

    // slug and hash are restricted to [a-z0-9-], which always forms a valid
    // ref component.
    BranchName::new(&name).unwrap_or_else(|_| {
        BranchName::new(PROPOSAL_PREFIX).unwrap_or_else(|_| unreachable!("static name"))
    })
}
