//! git::merge
//!
//! Merging histories that share no ancestor, and resolving index conflicts
//! wholesale in favor of one side.

use std::path::Path;

use tracing::{instrument, warn};

use super::interface::{to_git2, to_oid, Git, GitError};
use crate::core::types::Oid;

/// Stage bits of an index entry's flags.
const STAGE_MASK: u16 = 0x3000;

/// Which side wins a conflicted path.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Side {
    /// The history being brought in ("theirs").
    Incoming,
    /// The history already in place ("ours").
    Existing,
}

/// Tree produced by a merge, plus the paths that needed resolving.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MergedTree {
    pub tree: Oid,
    pub resolved: Vec<String>,
}

/// Paths with conflict entries in `index`, sorted and deduplicated.
pub(crate) fn conflicted_paths(index: &git2::Index) -> Result<Vec<String>, git2::Error> {
    if !index.has_conflicts() {
        return Ok(Vec::new());
    }
    let mut paths = Vec::new();
    for conflict in index.conflicts()? {
        let conflict = conflict?;
        if let Some(path) = conflict_path(&conflict) {
            paths.push(path);
        }
    }
    paths.sort();
    paths.dedup();
    Ok(paths)
}

fn conflict_path(conflict: &git2::IndexConflict) -> Option<String> {
    [&conflict.their, &conflict.our, &conflict.ancestor]
        .into_iter()
        .flatten()
        .next()
        .map(|entry| String::from_utf8_lossy(&entry.path).into_owned())
}

/// Replace every conflict in `index` with `side`'s entry. A path missing on
/// the winning side is removed. Returns the resolved paths and which of them
/// were removed.
pub(crate) fn resolve_conflicts(
    index: &mut git2::Index,
    side: Side,
) -> Result<(Vec<String>, Vec<String>), git2::Error> {
    let conflicts = index
        .conflicts()?
        .collect::<Result<Vec<git2::IndexConflict>, _>>()?;

    let mut resolved = Vec::new();
    let mut removed = Vec::new();
    for conflict in conflicts {
        let Some(path) = conflict_path(&conflict) else {
            continue;
        };
        let winner = match side {
            Side::Incoming => conflict.their,
            Side::Existing => conflict.our,
        };

        index.conflict_remove(Path::new(&path))?;
        match winner {
            Some(mut entry) => {
                entry.flags &= !STAGE_MASK;
                index.add(&entry)?;
            }
            None => removed.push(path.clone()),
        }
        resolved.push(path);
    }
    Ok((resolved, removed))
}

impl Git {
    /// Merge the trees of `existing` and `incoming` with the empty tree as
    /// their common ancestor.
    ///
    /// Any conflict is resolved by taking the incoming entry whole. Nothing
    /// is committed; see [`Git::commit_merge`].
    #[instrument(skip(self), fields(existing = existing.short(7), incoming = incoming.short(7)))]
    pub fn merge_unrelated(&self, existing: &Oid, incoming: &Oid) -> Result<MergedTree, GitError> {
        let repo = self.raw();
        let ours = repo.find_commit(to_git2(existing)?)?.tree()?;
        let theirs = repo.find_commit(to_git2(incoming)?)?.tree()?;
        let empty = repo.find_tree(repo.treebuilder(None)?.write()?)?;

        let mut index = repo.merge_trees(&empty, &ours, &theirs, None)?;
        let (resolved, _) = resolve_conflicts(&mut index, Side::Incoming)?;
        if !resolved.is_empty() {
            warn!(paths = ?resolved, "merge of unrelated histories conflicted; incoming side kept");
        }
        let tree = index.write_tree_to(repo)?;

        Ok(MergedTree {
            tree: to_oid(tree),
            resolved,
        })
    }

    /// Write a merge commit of `tree` with `parents`, without moving any ref.
    ///
    /// Identity and timestamp come from the last parent, so the same inputs
    /// always produce the same commit.
    pub fn commit_merge(&self, tree: &Oid, parents: &[Oid], message: &str) -> Result<Oid, GitError> {
        let repo = self.raw();
        let parent_commits = parents
            .iter()
            .map(|p| to_git2(p).and_then(|id| repo.find_commit(id).map_err(GitError::from)))
            .collect::<Result<Vec<_>, _>>()?;
        let last = parent_commits.last().ok_or_else(|| GitError::Internal {
            message: "merge needs at least one parent".to_string(),
        })?;

        let newest = parent_commits
            .iter()
            .map(|c| c.committer().when())
            .max_by_key(|t| t.seconds())
            .unwrap_or_else(|| last.committer().when());
        let committer = last.committer();
        let signature = git2::Signature::new(
            &String::from_utf8_lossy(committer.name_bytes()),
            &String::from_utf8_lossy(committer.email_bytes()),
            &newest,
        )?;

        let tree = repo.find_tree(to_git2(tree)?)?;
        let refs: Vec<&git2::Commit<'_>> = parent_commits.iter().collect();
        let id = repo.commit(None, &signature, &signature, message, &tree, &refs)?;
        Ok(to_oid(id))
    }
}
