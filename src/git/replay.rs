//! git::replay
//!
//! Step-wise replay (rebase) of a branch onto a new base, reporting a typed
//! [`ReplaySignal`] per step instead of tool output.
//!
//! The state machine that reacts to the signals lives in the engine and
//! only sees the [`ReplayBackend`] trait, so it can be driven by a scripted
//! backend in tests.

use std::path::Path;

use tracing::{debug, instrument};

use super::interface::{to_git2, to_oid, Git, GitError};
use super::merge::{conflicted_paths, resolve_conflicts, Side};
use crate::core::policy::ConflictPolicy;
use crate::core::types::Oid;

/// Outcome of applying (or re-committing) one replay step.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReplaySignal {
    /// The step was committed.
    Applied { commit: Oid },
    /// The step's changes are already present; nothing to commit.
    AlreadyApplied,
    /// The step left conflicts in the index.
    Unmerged { paths: Vec<String> },
    /// The backend cannot go on.
    Fatal { reason: String },
    /// No steps remain.
    Complete,
}

/// A replay in progress.
pub trait ReplayBackend {
    /// Number of steps the replay announced when it started.
    fn announced_steps(&self) -> usize;

    /// Apply the next step and try to commit it.
    fn advance(&mut self) -> ReplaySignal;

    /// Try again to commit the current step.
    fn continue_step(&mut self) -> ReplaySignal;

    /// Commit the current step with no changes, keeping its message and
    /// identities.
    fn commit_empty(&mut self) -> Result<Oid, GitError>;

    /// Resolve every conflicted path of the current step for `side`, stage
    /// the result and sync the working tree. Returns the resolved paths.
    fn resolve(&mut self, side: Side) -> Result<Vec<String>, GitError>;

    /// Abandon the replay and restore the original branch.
    fn abort(&mut self) -> Result<(), GitError>;

    /// Complete the replay, moving the branch to the replayed tip.
    fn finish(&mut self) -> Result<(), GitError>;
}

/// Merge options matching a conflict policy.
fn merge_options(policy: ConflictPolicy) -> git2::MergeOptions {
    let mut opts = git2::MergeOptions::new();
    match policy {
        ConflictPolicy::PreferIncoming => {
            opts.file_favor(git2::FileFavor::Theirs);
        }
        ConflictPolicy::PreferExisting => {
            opts.file_favor(git2::FileFavor::Ours);
        }
        ConflictPolicy::DiffAlign => {
            opts.file_favor(git2::FileFavor::Theirs)
                .patience(true)
                .find_renames(true)
                .rename_threshold(50);
        }
    }
    opts
}

/// libgit2-backed replay of a local branch.
pub struct GitReplay<'repo> {
    repo: &'repo git2::Repository,
    rebase: git2::Rebase<'repo>,
    announced: usize,
    /// Original commit of the step being applied.
    current: Option<git2::Oid>,
}

impl Git {
    /// Start replaying local `branch` onto `onto`.
    ///
    /// With a `policy`, content conflicts are settled inside each step where
    /// libgit2 can; without one every conflict surfaces as
    /// [`ReplaySignal::Unmerged`]. Merge commits on the branch are skipped;
    /// their content arrives through the commits they join.
    #[instrument(skip(self), fields(onto = onto.short(7)))]
    pub fn start_replay(
        &self,
        branch: &str,
        onto: &Oid,
        policy: Option<ConflictPolicy>,
    ) -> Result<GitReplay<'_>, GitError> {
        let repo = self.raw();
        let refname = format!("refs/heads/{branch}");
        let reference = repo
            .find_reference(&refname)
            .map_err(|e| GitError::from_git2(e, &refname))?;
        let branch_commit = repo.reference_to_annotated_commit(&reference)?;
        let upstream = repo.find_annotated_commit(to_git2(onto)?)?;

        let mut checkout = git2::build::CheckoutBuilder::new();
        checkout.force();
        let mut opts = git2::RebaseOptions::new();
        if let Some(policy) = policy {
            opts.merge_options(merge_options(policy));
        }
        opts.checkout_options(checkout);

        let rebase = repo.rebase(Some(&branch_commit), Some(&upstream), None, Some(&mut opts))?;
        let announced = rebase.len();
        debug!(announced, "replay started");

        Ok(GitReplay {
            repo,
            rebase,
            announced,
            current: None,
        })
    }
}

impl GitReplay<'_> {
    fn original(&self) -> Result<git2::Commit<'_>, GitError> {
        let id = self.current.ok_or_else(|| GitError::Internal {
            message: "no replay step in progress".to_string(),
        })?;
        Ok(self.repo.find_commit(id)?)
    }

    fn unmerged(&self) -> Result<Vec<String>, GitError> {
        let mut index = self.repo.index()?;
        index.read(false)?;
        Ok(conflicted_paths(&index)?)
    }

    fn commit_current(&mut self) -> ReplaySignal {
        match self.unmerged() {
            Ok(paths) if !paths.is_empty() => return ReplaySignal::Unmerged { paths },
            Ok(_) => {}
            Err(e) => {
                return ReplaySignal::Fatal {
                    reason: e.to_string(),
                }
            }
        }

        // Keep the committer recorded by the history rewrite.
        let committer = match self.original() {
            Ok(commit) => commit.committer().to_owned(),
            Err(e) => {
                return ReplaySignal::Fatal {
                    reason: e.to_string(),
                }
            }
        };

        match self.rebase.commit(None, &committer, None) {
            Ok(id) => ReplaySignal::Applied { commit: to_oid(id) },
            Err(e) if e.code() == git2::ErrorCode::Applied => ReplaySignal::AlreadyApplied,
            Err(e) if e.code() == git2::ErrorCode::Unmerged => ReplaySignal::Unmerged {
                paths: self.unmerged().unwrap_or_default(),
            },
            Err(e) => ReplaySignal::Fatal {
                reason: e.message().to_string(),
            },
        }
    }
}

impl ReplayBackend for GitReplay<'_> {
    fn announced_steps(&self) -> usize {
        self.announced
    }

    fn advance(&mut self) -> ReplaySignal {
        let next = match self.rebase.next() {
            None => return ReplaySignal::Complete,
            Some(Ok(op)) => Ok(op.id()),
            Some(Err(e)) => Err(e),
        };
        match next {
            Ok(id) => {
                self.current = Some(id);
                self.commit_current()
            }
            Err(e) if matches!(e.code(), git2::ErrorCode::Unmerged | git2::ErrorCode::Conflict) => {
                ReplaySignal::Unmerged {
                    paths: self.unmerged().unwrap_or_default(),
                }
            }
            Err(e) => ReplaySignal::Fatal {
                reason: e.message().to_string(),
            },
        }
    }

    fn continue_step(&mut self) -> ReplaySignal {
        self.commit_current()
    }

    fn commit_empty(&mut self) -> Result<Oid, GitError> {
        let original = self.original()?;
        let head = self.repo.head()?.peel_to_commit()?;
        let tree = head.tree()?;
        let message = String::from_utf8_lossy(original.message_bytes()).into_owned();

        let id = self.repo.commit(
            Some("HEAD"),
            &original.author(),
            &original.committer(),
            &message,
            &tree,
            &[&head],
        )?;
        Ok(to_oid(id))
    }

    fn resolve(&mut self, side: Side) -> Result<Vec<String>, GitError> {
        let mut index = self.repo.index()?;
        index.read(false)?;
        let (resolved, removed) = resolve_conflicts(&mut index, side)?;
        index.write()?;

        let mut checkout = git2::build::CheckoutBuilder::new();
        checkout.force();
        self.repo.checkout_index(Some(&mut index), Some(&mut checkout))?;

        if let Some(workdir) = self.repo.workdir() {
            for path in &removed {
                let _ = std::fs::remove_file(workdir.join(Path::new(path)));
            }
        }
        Ok(resolved)
    }

    fn abort(&mut self) -> Result<(), GitError> {
        self.rebase.abort()?;
        Ok(())
    }

    fn finish(&mut self) -> Result<(), GitError> {
        self.rebase.finish(None)?;
        Ok(())
    }
}
