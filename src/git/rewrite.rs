//! git::rewrite
//!
//! History rewriting: restrict every commit to a path filter, relocate the
//! result, and pass identity and message through a [`CommitRewriter`].
//!
//! # Relocation
//!
//! Each commit tree goes through two phases. The matched source content is
//! first *staged* into a detached tree that belongs to no path, then the
//! staged tree is *placed* at the destination. Because staging never looks
//! at the destination, a destination nested inside (or containing) the
//! source cannot pick up its own output.
//!
//! # Pruning
//!
//! A commit whose rewritten tree equals its single rewritten parent's tree
//! is dropped and its children are re-parented onto the nearest surviving
//! ancestor. Parents that are ancestors of another parent are dropped first,
//! so merges that collapse to one line of history are pruned the same way.
//!
//! Original timestamps are preserved, so rewriting the same history twice
//! yields the same commit ids.

use std::collections::HashMap;
use std::path::Path;

use tracing::{debug, instrument};

use super::interface::{to_git2, to_oid, Git, GitError};
use crate::core::identity::{CommitFields, CommitRewriter};
use crate::core::types::{Oid, RepoPath};

const TREE_MODE: i32 = 0o040000;

/// Which content of each commit survives the rewrite, and where it goes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PathFilter {
    /// Everything under `source` moves to `destination`.
    Subtree {
        source: RepoPath,
        destination: RepoPath,
    },
    /// Only `files` (relative to `source`) survive, keeping their relative
    /// layout under `destination`.
    FileSet {
        source: RepoPath,
        files: Vec<RepoPath>,
        destination: RepoPath,
    },
}

/// Result of a history rewrite.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RewriteOutcome {
    /// New tip, or `None` when no commit carried matching content.
    pub tip: Option<Oid>,
    /// Commits written to the new history.
    pub commits_written: usize,
    /// Commits visited in the original history.
    pub commits_seen: usize,
}

/// Content matched by phase one, not yet attached to any path.
enum Staged {
    Tree(git2::Oid),
    /// A single file mapped on its own. `name` is its original file name.
    Entry {
        oid: git2::Oid,
        mode: i32,
        name: String,
    },
}

impl PathFilter {
    fn source(&self) -> &RepoPath {
        match self {
            PathFilter::Subtree { source, .. } | PathFilter::FileSet { source, .. } => source,
        }
    }

    fn destination(&self) -> &RepoPath {
        match self {
            PathFilter::Subtree { destination, .. } | PathFilter::FileSet { destination, .. } => {
                destination
            }
        }
    }

    /// Phase one: collect the matched content of `tree` into a staging
    /// tree. `None` when nothing matches.
    fn stage(&self, repo: &git2::Repository, tree: &git2::Tree<'_>) -> Result<Option<Staged>, git2::Error> {
        let source = match lookup(tree, self.source())? {
            Some(found) => found,
            None => return Ok(None),
        };

        match self {
            PathFilter::Subtree { .. } => non_empty(repo, source),
            PathFilter::FileSet { files, .. } => {
                let Staged::Tree(source_tree) = source else {
                    // A file-set needs a directory to select from.
                    return Ok(None);
                };
                let source_tree = repo.find_tree(source_tree)?;

                let mut staging: Option<git2::Oid> = None;
                for file in files {
                    if file.is_root() {
                        return non_empty(repo, Staged::Tree(source_tree.id()));
                    }
                    let entry = match source_tree.get_path(Path::new(file.as_str())) {
                        Ok(entry) => entry,
                        Err(e) if e.code() == git2::ErrorCode::NotFound => continue,
                        Err(e) => return Err(e),
                    };
                    let components: Vec<&str> = file.components().collect();
                    staging = Some(insert_at(
                        repo,
                        staging,
                        &components,
                        entry.id(),
                        entry.filemode(),
                    )?);
                }
                match staging {
                    Some(id) => non_empty(repo, Staged::Tree(id)),
                    None => Ok(None),
                }
            }
        }
    }

    /// Phase two: attach staged content at the destination, returning the
    /// new root tree.
    fn place(&self, repo: &git2::Repository, staged: Staged) -> Result<git2::Oid, git2::Error> {
        let destination: Vec<&str> = self.destination().components().collect();
        match staged {
            Staged::Tree(id) if destination.is_empty() => Ok(id),
            Staged::Tree(id) => insert_at(repo, None, &destination, id, TREE_MODE),
            Staged::Entry { oid, mode, name } if destination.is_empty() => {
                insert_at(repo, None, &[name.as_str()], oid, mode)
            }
            Staged::Entry { oid, mode, .. } => insert_at(repo, None, &destination, oid, mode),
        }
    }

    /// Ids of the matched entries in `tree`, used to detect which commits
    /// touch the filter without writing anything.
    fn fingerprint(
        &self,
        repo: &git2::Repository,
        tree: &git2::Tree<'_>,
    ) -> Result<Vec<Option<git2::Oid>>, git2::Error> {
        match self {
            PathFilter::Subtree { source, .. } => Ok(vec![entry_id(tree, source)?]),
            PathFilter::FileSet { source, files, .. } => {
                let base = match lookup(tree, source)? {
                    Some(Staged::Tree(id)) => repo.find_tree(id)?,
                    _ => return Ok(vec![None; files.len()]),
                };
                files.iter().map(|file| entry_id(&base, file)).collect()
            }
        }
    }
}

/// Entry id at `path` in `tree`; the tree's own id for the root.
fn entry_id(tree: &git2::Tree<'_>, path: &RepoPath) -> Result<Option<git2::Oid>, git2::Error> {
    if path.is_root() {
        return Ok(Some(tree.id()));
    }
    match tree.get_path(Path::new(path.as_str())) {
        Ok(entry) => Ok(Some(entry.id())),
        Err(e) if e.code() == git2::ErrorCode::NotFound => Ok(None),
        Err(e) => Err(e),
    }
}

fn lookup(tree: &git2::Tree<'_>, path: &RepoPath) -> Result<Option<Staged>, git2::Error> {
    if path.is_root() {
        return Ok(Some(Staged::Tree(tree.id())));
    }
    let entry = match tree.get_path(Path::new(path.as_str())) {
        Ok(entry) => entry,
        Err(e) if e.code() == git2::ErrorCode::NotFound => return Ok(None),
        Err(e) => return Err(e),
    };
    let staged = if entry.kind() == Some(git2::ObjectType::Tree) {
        Staged::Tree(entry.id())
    } else {
        Staged::Entry {
            oid: entry.id(),
            mode: entry.filemode(),
            name: entry.name().unwrap_or("file").to_string(),
        }
    };
    Ok(Some(staged))
}

fn non_empty(repo: &git2::Repository, staged: Staged) -> Result<Option<Staged>, git2::Error> {
    match staged {
        Staged::Tree(id) if repo.find_tree(id)?.is_empty() => Ok(None),
        other => Ok(Some(other)),
    }
}

/// Insert `oid` at `components` below `base`, creating intermediate trees.
fn insert_at(
    repo: &git2::Repository,
    base: Option<git2::Oid>,
    components: &[&str],
    oid: git2::Oid,
    mode: i32,
) -> Result<git2::Oid, git2::Error> {
    let base_tree = base.map(|id| repo.find_tree(id)).transpose()?;
    let mut builder = repo.treebuilder(base_tree.as_ref())?;

    match components {
        [] => Ok(oid),
        [last] => {
            builder.insert(*last, oid, mode)?;
            builder.write()
        }
        [first, rest @ ..] => {
            let child = builder
                .get(*first)?
                .filter(|e| e.kind() == Some(git2::ObjectType::Tree))
                .map(|e| e.id());
            let subtree = insert_at(repo, child, rest, oid, mode)?;
            builder.insert(*first, subtree, TREE_MODE)?;
            builder.write()
        }
    }
}

/// Keep `original` unless the rewrite changed its name or email.
fn signature<'a>(
    original: git2::Signature<'a>,
    name: &str,
    email: &str,
) -> Result<git2::Signature<'a>, git2::Error> {
    if original.name_bytes() == name.as_bytes() && original.email_bytes() == email.as_bytes() {
        return Ok(original);
    }
    git2::Signature::new(name, email, &original.when())
}

/// Drop parents that are ancestors of another parent.
fn reduce_parents(
    repo: &git2::Repository,
    parents: Vec<git2::Oid>,
) -> Result<Vec<git2::Oid>, git2::Error> {
    if parents.len() < 2 {
        return Ok(parents);
    }
    let mut kept = Vec::with_capacity(parents.len());
    for &candidate in &parents {
        let mut redundant = false;
        for &other in &parents {
            if other != candidate && repo.graph_descendant_of(other, candidate)? {
                redundant = true;
                break;
            }
        }
        if !redundant {
            kept.push(candidate);
        }
    }
    Ok(kept)
}

/// Recommit `commit` on a new tree and parents with its headers and message
/// bytes unchanged, encoding included. Signatures and merge tags are dropped;
/// they covered the old tree.
fn copy_commit(
    repo: &git2::Repository,
    commit: &git2::Commit<'_>,
    tree: git2::Oid,
    parents: &[git2::Oid],
) -> Result<git2::Oid, git2::Error> {
    let mut buf = format!("tree {tree}\n").into_bytes();
    for parent in parents {
        buf.extend_from_slice(format!("parent {parent}\n").as_bytes());
    }

    let mut skipping = false;
    for line in commit.raw_header_bytes().split(|b| *b == b'\n') {
        if line.is_empty() {
            continue;
        }
        // Continuation lines belong to the previous header.
        if !line.starts_with(b" ") {
            skipping = [&b"tree "[..], b"parent ", b"gpgsig", b"mergetag "]
                .iter()
                .any(|name| line.starts_with(name));
        }
        if !skipping {
            buf.extend_from_slice(line);
            buf.push(b'\n');
        }
    }

    buf.push(b'\n');
    buf.extend_from_slice(commit.message_raw_bytes());
    repo.odb()?.write(git2::ObjectType::Commit, &buf)
}

/// Recommit `commit` with its identities and message passed through
/// `rewriter`. Timestamps are kept.
fn rewrite_commit(
    repo: &git2::Repository,
    commit: &git2::Commit<'_>,
    tree: git2::Oid,
    parents: &[git2::Oid],
    rewriter: &dyn CommitRewriter,
) -> Result<git2::Oid, GitError> {
    let author = commit.author();
    let committer = commit.committer();
    let mut fields = CommitFields {
        author_name: String::from_utf8_lossy(author.name_bytes()).into_owned(),
        author_email: String::from_utf8_lossy(author.email_bytes()).into_owned(),
        committer_name: String::from_utf8_lossy(committer.name_bytes()).into_owned(),
        committer_email: String::from_utf8_lossy(committer.email_bytes()).into_owned(),
        message: String::from_utf8_lossy(commit.message_bytes()).into_owned(),
    };
    rewriter.rewrite(&mut fields);

    let author = signature(author, &fields.author_name, &fields.author_email)?;
    let committer = signature(committer, &fields.committer_name, &fields.committer_email)?;
    let tree = repo.find_tree(tree)?;
    let parent_commits = parents
        .iter()
        .map(|p| repo.find_commit(*p))
        .collect::<Result<Vec<_>, _>>()?;
    let parent_refs: Vec<&git2::Commit<'_>> = parent_commits.iter().collect();

    Ok(repo.commit(None, &author, &committer, &fields.message, &tree, &parent_refs)?)
}

impl Git {
    /// Rewrite the history reachable from `tip` through `filter` and
    /// `rewriter`, returning the new tip.
    ///
    /// New commits are written to the object database only; no ref is
    /// touched. `cancelled` is polled before every commit.
    #[instrument(skip(self, rewriter, cancelled), fields(tip = tip.short(7)))]
    pub fn rewrite_history(
        &self,
        tip: &Oid,
        filter: &PathFilter,
        rewriter: &dyn CommitRewriter,
        cancelled: &dyn Fn() -> bool,
    ) -> Result<RewriteOutcome, GitError> {
        let repo = self.raw();
        let tip_id = to_git2(tip)?;

        let mut walk = repo.revwalk()?;
        walk.set_sorting(git2::Sort::TOPOLOGICAL | git2::Sort::REVERSE)?;
        walk.push(tip_id)?;

        let empty_tree = repo.treebuilder(None)?.write()?;
        let mut rewritten: HashMap<git2::Oid, Option<git2::Oid>> = HashMap::new();
        let mut commits_written = 0;
        let mut commits_seen = 0;

        for id in walk {
            if cancelled() {
                return Err(GitError::Interrupted);
            }
            let id = id?;
            commits_seen += 1;
            let commit = repo.find_commit(id)?;

            let new_tree = match filter.stage(repo, &commit.tree()?)? {
                Some(staged) => Some(filter.place(repo, staged)?),
                None => None,
            };

            let mut parents: Vec<git2::Oid> = Vec::new();
            for parent in commit.parent_ids() {
                if let Some(Some(mapped)) = rewritten.get(&parent) {
                    if !parents.contains(mapped) {
                        parents.push(*mapped);
                    }
                }
            }
            let parents = reduce_parents(repo, parents)?;
            let tree_id = new_tree.unwrap_or(empty_tree);

            let prune = match parents.as_slice() {
                [] => new_tree.is_none(),
                [only] => repo.find_commit(*only)?.tree_id() == tree_id,
                _ => false,
            };
            if prune {
                rewritten.insert(id, parents.first().copied());
                continue;
            }

            let new_id = if rewriter.is_identity() {
                copy_commit(repo, &commit, tree_id, &parents)?
            } else {
                rewrite_commit(repo, &commit, tree_id, &parents, rewriter)?
            };
            rewritten.insert(id, Some(new_id));
            commits_written += 1;
        }

        let new_tip = rewritten.get(&tip_id).copied().flatten().map(to_oid);
        debug!(commits_seen, commits_written, "history rewritten");

        Ok(RewriteOutcome {
            tip: new_tip,
            commits_written,
            commits_seen,
        })
    }

    /// Count non-merge commits reachable from `tip` that change content
    /// matched by `filter`. Read-only.
    pub fn count_affected(&self, tip: &Oid, filter: &PathFilter) -> Result<usize, GitError> {
        let repo = self.raw();
        let mut walk = repo.revwalk()?;
        walk.push(to_git2(tip)?)?;

        let mut count = 0;
        for id in walk {
            let commit = repo.find_commit(id?)?;
            if commit.parent_count() > 1 {
                continue;
            }
            let current = filter.fingerprint(repo, &commit.tree()?)?;
            let previous = match commit.parents().next() {
                Some(parent) => filter.fingerprint(repo, &parent.tree()?)?,
                None => vec![None; current.len()],
            };
            if current != previous {
                count += 1;
            }
        }
        Ok(count)
    }

    /// Whether `path` exists in `commit`'s tree.
    pub fn path_exists(&self, commit: &Oid, path: &RepoPath) -> Result<bool, GitError> {
        if path.is_root() {
            return Ok(true);
        }
        let commit = self.raw().find_commit(to_git2(commit)?)?;
        Ok(entry_id(&commit.tree()?, path)?.is_some())
    }
}
