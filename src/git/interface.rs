//! git::interface
//!
//! Git interface implementation using git2.
//!
//! # Architecture
//!
//! The `Git` struct is the only way to interact with a repository. No other
//! module imports `git2` directly; history rewriting and replay live in
//! sibling modules of this one and reach the repository through
//! [`Git::raw`], which is private to the `git` module.
//!
//! # Error Handling
//!
//! git2 errors are categorized into typed variants:
//! - [`GitError::RefNotFound`]: requested ref does not exist
//! - [`GitError::LeaseFailed`]: a conditional push found the remote moved
//! - [`GitError::PushRejected`]: the remote refused an update
//! - [`GitError::Network`]: clone, fetch or ls-remote failed
//!
//! # Example
//!
//! ```ignore
//! use subgraft::git::{Credentials, Git};
//!
//! let creds = Credentials::anonymous();
//! let git = Git::clone_from("https://github.com/org/repo.git", dir, &creds)?;
//! let tip = git.resolve("main")?;
//! println!("main is at {}", tip.short(7));
//! ```

use std::cell::RefCell;
use std::path::{Path, PathBuf};

use git2::{Cred, CredentialType, Direction, FetchOptions, PushOptions, RemoteCallbacks};
use thiserror::Error;
use tracing::{debug, info, instrument, warn};

use crate::core::types::{BranchName, Oid, RepoPath, TypeError};

/// Errors from Git operations.
#[derive(Debug, Error)]
pub enum GitError {
    /// Not a Git repository.
    #[error("not a git repository: {path}")]
    NotARepo { path: PathBuf },

    /// Repository has no working directory.
    #[error("bare repository not supported here")]
    BareRepo,

    /// Requested ref or revision does not exist.
    #[error("ref not found: {refname}")]
    RefNotFound { refname: String },

    /// Object not found in repository.
    #[error("object not found: {oid}")]
    ObjectNotFound { oid: String },

    /// Invalid object id format.
    #[error("invalid object id: {oid}")]
    InvalidOid { oid: String },

    /// Invalid ref name or path.
    #[error("invalid ref name: {message}")]
    InvalidRefName { message: String },

    /// Clone, fetch or ls-remote failed.
    #[error("cannot reach '{url}': {message}")]
    Network { url: String, message: String },

    /// The remote branch moved since it was read.
    #[error("{refname} moved on the remote: expected {expected}, found {actual}")]
    LeaseFailed {
        refname: String,
        expected: String,
        actual: String,
    },

    /// The remote refused a ref update.
    #[error("push of {refname} rejected: {message}")]
    PushRejected { refname: String, message: String },

    /// A long-running operation observed an interrupt.
    #[error("interrupted")]
    Interrupted,

    /// Internal git2 error.
    #[error("git error: {message}")]
    Internal { message: String },
}

impl GitError {
    /// Create a GitError from a git2::Error with richer context.
    pub(crate) fn from_git2(err: git2::Error, context: &str) -> Self {
        match err.code() {
            git2::ErrorCode::NotFound => {
                if context.starts_with("refs/") || context.contains("ref") {
                    GitError::RefNotFound {
                        refname: context.to_string(),
                    }
                } else {
                    GitError::ObjectNotFound {
                        oid: context.to_string(),
                    }
                }
            }
            git2::ErrorCode::InvalidSpec => GitError::InvalidOid {
                oid: context.to_string(),
            },
            _ => GitError::Internal {
                message: format!("{}: {}", context, err.message()),
            },
        }
    }

    fn network(url: &str, err: git2::Error) -> Self {
        GitError::Network {
            url: url.to_string(),
            message: err.message().to_string(),
        }
    }
}

impl From<git2::Error> for GitError {
    fn from(err: git2::Error) -> Self {
        match err.code() {
            git2::ErrorCode::NotFound => GitError::RefNotFound {
                refname: err.message().to_string(),
            },
            git2::ErrorCode::InvalidSpec => GitError::InvalidOid {
                oid: err.message().to_string(),
            },
            _ => GitError::Internal {
                message: err.message().to_string(),
            },
        }
    }
}

impl From<TypeError> for GitError {
    fn from(err: TypeError) -> Self {
        match err {
            TypeError::InvalidOid(msg) => GitError::InvalidOid { oid: msg },
            TypeError::InvalidBranchName(msg) | TypeError::InvalidPath(msg) => {
                GitError::InvalidRefName { message: msg }
            }
        }
    }
}

/// Convert a git2 id into the crate's [`Oid`].
pub(crate) fn to_oid(id: git2::Oid) -> Oid {
    // git2 always renders 40 or 64 lowercase hex characters.
    Oid::new(id.to_string()).unwrap_or_else(|_| unreachable!("git2 produced a malformed oid"))
}

/// Convert the crate's [`Oid`] into a git2 id.
pub(crate) fn to_git2(oid: &Oid) -> Result<git2::Oid, GitError> {
    git2::Oid::from_str(oid.as_str()).map_err(|e| GitError::from_git2(e, oid.as_str()))
}

/// Authentication for network operations.
///
/// HTTPS remotes get the token as an `x-access-token` password; SSH remotes
/// use the running ssh-agent.
#[derive(Clone, Default)]
pub struct Credentials {
    token: Option<String>,
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("token", &self.token.as_ref().map(|_| "***"))
            .finish()
    }
}

impl Credentials {
    pub fn anonymous() -> Self {
        Self::default()
    }

    pub fn with_token(token: impl Into<String>) -> Self {
        Self {
            token: Some(token.into()),
        }
    }

    fn callbacks<'a>(&self) -> RemoteCallbacks<'a> {
        let mut callbacks = RemoteCallbacks::new();
        let token = self.token.clone();
        let mut attempts = 0u8;
        callbacks.credentials(move |_url, username, allowed| {
            // libgit2 retries the callback on every auth failure.
            attempts += 1;
            if attempts > 3 {
                return Err(git2::Error::from_str("authentication failed"));
            }
            if allowed.contains(CredentialType::SSH_KEY) {
                return Cred::ssh_key_from_agent(username.unwrap_or("git"));
            }
            if allowed.contains(CredentialType::USER_PASS_PLAINTEXT) {
                if let Some(token) = &token {
                    return Cred::userpass_plaintext("x-access-token", token);
                }
            }
            Cred::default()
        });
        callbacks
    }

    fn fetch_options(&self) -> FetchOptions<'static> {
        let mut opts = FetchOptions::new();
        opts.remote_callbacks(self.callbacks());
        opts
    }
}

/// A ref advertised by a remote.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteRef {
    pub name: String,
    pub oid: Oid,
}

/// Find `refs/heads/<branch>` in an ls-remote listing.
pub fn find_branch<'a>(refs: &'a [RemoteRef], branch: &BranchName) -> Option<&'a RemoteRef> {
    let wanted = branch.local_ref();
    refs.iter().find(|r| r.name == wanted)
}

/// Commit identity and message, as read from the repository.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommitInfo {
    pub oid: Oid,
    pub parents: Vec<Oid>,
    pub tree: Oid,
    pub author_name: String,
    pub author_email: String,
    pub committer_name: String,
    pub committer_email: String,
    pub message: String,
}

/// Expected state of a remote branch for a conditional push.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Lease {
    pub branch: BranchName,
    /// `None` means the branch must not exist.
    pub expected: Option<Oid>,
}

/// The single interface to a Git repository.
pub struct Git {
    repo: git2::Repository,
}

impl std::fmt::Debug for Git {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Git")
            .field("path", &self.repo.path())
            .finish()
    }
}

impl Git {
    // =========================================================================
    // Opening and cloning
    // =========================================================================

    /// Open an existing repository.
    pub fn open(path: &Path) -> Result<Self, GitError> {
        let repo = git2::Repository::open(path).map_err(|_| GitError::NotARepo {
            path: path.to_path_buf(),
        })?;
        Ok(Self { repo })
    }

    /// Clone `url` (URL or local path) into `path` with a working directory.
    #[instrument(skip(creds), fields(path = %path.display()))]
    pub fn clone_from(url: &str, path: &Path, creds: &Credentials) -> Result<Self, GitError> {
        info!("cloning source repository");
        let mut builder = git2::build::RepoBuilder::new();
        builder.fetch_options(creds.fetch_options());
        let repo = builder
            .clone(url, path)
            .map_err(|e| GitError::network(url, e))?;
        debug!("clone completed");
        Ok(Self { repo })
    }

    /// Version of the linked libgit2.
    pub fn backend_version() -> String {
        let (major, minor, rev) = git2::Version::get().libgit2_version();
        format!("libgit2 {major}.{minor}.{rev}")
    }

    /// Working directory of the repository.
    pub fn workdir(&self) -> Result<&Path, GitError> {
        self.repo.workdir().ok_or(GitError::BareRepo)
    }

    pub(crate) fn raw(&self) -> &git2::Repository {
        &self.repo
    }

    // =========================================================================
    // Remotes
    // =========================================================================

    /// Add a named remote.
    pub fn add_remote(&self, name: &str, url: &str) -> Result<(), GitError> {
        self.repo
            .remote(name, url)
            .map_err(|e| GitError::from_git2(e, name))?;
        Ok(())
    }

    /// Fetch `refspecs` from a named remote.
    #[instrument(skip(self, creds))]
    pub fn fetch(&self, remote: &str, refspecs: &[&str], creds: &Credentials) -> Result<(), GitError> {
        let mut handle = self
            .repo
            .find_remote(remote)
            .map_err(|e| GitError::from_git2(e, remote))?;
        let url = handle.url().unwrap_or(remote).to_string();
        handle
            .fetch(refspecs, Some(&mut creds.fetch_options()), None)
            .map_err(|e| GitError::network(&url, e))?;
        debug!("fetch completed");
        Ok(())
    }

    /// List the refs a remote advertises, without a local repository.
    #[instrument(skip(creds))]
    pub fn ls_remote(url: &str, creds: &Credentials) -> Result<Vec<RemoteRef>, GitError> {
        let mut remote = git2::Remote::create_detached(url).map_err(|e| GitError::network(url, e))?;
        let connection = remote
            .connect_auth(Direction::Fetch, Some(creds.callbacks()), None)
            .map_err(|e| GitError::network(url, e))?;
        let heads = connection.list().map_err(|e| GitError::network(url, e))?;
        let refs = heads
            .iter()
            .map(|head| RemoteRef {
                name: head.name().to_string(),
                oid: to_oid(head.oid()),
            })
            .collect::<Vec<_>>();
        debug!(count = refs.len(), "listed remote refs");
        Ok(refs)
    }

    // =========================================================================
    // Ref resolution
    // =========================================================================

    /// Resolve a revision (branch, tag, remote ref or commit id) to a commit.
    pub fn resolve(&self, spec: &str) -> Result<Oid, GitError> {
        let object = self
            .repo
            .revparse_single(spec)
            .map_err(|_| GitError::RefNotFound {
                refname: spec.to_string(),
            })?;
        let commit = object
            .peel_to_commit()
            .map_err(|e| GitError::from_git2(e, spec))?;
        Ok(to_oid(commit.id()))
    }

    /// Resolve a revision, returning None if it doesn't exist.
    pub fn try_resolve(&self, spec: &str) -> Result<Option<Oid>, GitError> {
        match self.resolve(spec) {
            Ok(oid) => Ok(Some(oid)),
            Err(GitError::RefNotFound { .. }) => Ok(None),
            Err(e) => Err(e),
        }
    }

    /// Tree of a commit.
    pub fn tree_of(&self, commit: &Oid) -> Result<Oid, GitError> {
        let commit = self
            .repo
            .find_commit(to_git2(commit)?)
            .map_err(|e| GitError::from_git2(e, commit.as_str()))?;
        Ok(to_oid(commit.tree_id()))
    }

    /// Identity, parents and message of a commit.
    pub fn commit_info(&self, oid: &Oid) -> Result<CommitInfo, GitError> {
        let commit = self
            .repo
            .find_commit(to_git2(oid)?)
            .map_err(|e| GitError::from_git2(e, oid.as_str()))?;
        let author = commit.author();
        let committer = commit.committer();

        Ok(CommitInfo {
            oid: oid.clone(),
            parents: commit.parent_ids().map(to_oid).collect(),
            tree: to_oid(commit.tree_id()),
            author_name: String::from_utf8_lossy(author.name_bytes()).into_owned(),
            author_email: String::from_utf8_lossy(author.email_bytes()).into_owned(),
            committer_name: String::from_utf8_lossy(committer.name_bytes()).into_owned(),
            committer_email: String::from_utf8_lossy(committer.email_bytes()).into_owned(),
            message: String::from_utf8_lossy(commit.message_bytes()).into_owned(),
        })
    }

    /// Commits reachable from `tip`, newest first, following all parents.
    pub fn log(&self, tip: &Oid) -> Result<Vec<CommitInfo>, GitError> {
        let mut walk = self.repo.revwalk()?;
        walk.set_sorting(git2::Sort::TOPOLOGICAL)?;
        walk.push(to_git2(tip)?)?;
        walk.map(|id| self.commit_info(&to_oid(id?))).collect()
    }

    /// Number of commits reachable from `tip` but not from `base`.
    pub fn commit_count(&self, tip: &Oid, base: Option<&Oid>) -> Result<usize, GitError> {
        let mut walk = self.repo.revwalk()?;
        walk.push(to_git2(tip)?)?;
        if let Some(base) = base {
            walk.hide(to_git2(base)?)?;
        }
        let mut count = 0;
        for id in walk {
            id?;
            count += 1;
        }
        Ok(count)
    }

    /// Content of the file at `path` in `commit`, if it is a blob.
    pub fn read_file(&self, commit: &Oid, path: &RepoPath) -> Result<Option<Vec<u8>>, GitError> {
        let commit = self.repo.find_commit(to_git2(commit)?)?;
        let tree = commit.tree()?;
        let entry = match tree.get_path(Path::new(path.as_str())) {
            Ok(entry) => entry,
            Err(e) if e.code() == git2::ErrorCode::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        match entry.to_object(&self.repo)?.into_blob() {
            Ok(blob) => Ok(Some(blob.content().to_vec())),
            Err(_) => Ok(None),
        }
    }

    /// Every blob path in a commit's tree, sorted.
    pub fn list_files(&self, commit: &Oid) -> Result<Vec<String>, GitError> {
        let commit = self.repo.find_commit(to_git2(commit)?)?;
        let tree = commit.tree()?;
        let mut files = Vec::new();
        tree.walk(git2::TreeWalkMode::PreOrder, |dir, entry| {
            if entry.kind() == Some(git2::ObjectType::Blob) {
                files.push(format!("{}{}", dir, entry.name().unwrap_or("")));
            }
            git2::TreeWalkResult::Ok
        })?;
        files.sort();
        Ok(files)
    }

    // =========================================================================
    // Branches
    // =========================================================================

    /// Point local branch `name` at `target`, creating it if needed.
    pub fn set_branch(&self, name: &str, target: &Oid) -> Result<(), GitError> {
        let commit = self
            .repo
            .find_commit(to_git2(target)?)
            .map_err(|e| GitError::from_git2(e, target.as_str()))?;
        self.repo
            .branch(name, &commit, true)
            .map_err(|e| GitError::from_git2(e, name))?;
        debug!(branch = name, target = target.short(7), "branch set");
        Ok(())
    }

    /// Detach HEAD at `target` so branches can be rewritten freely.
    pub fn detach_head(&self, target: &Oid) -> Result<(), GitError> {
        self.repo.set_head_detached(to_git2(target)?)?;
        Ok(())
    }

    // =========================================================================
    // Publishing
    // =========================================================================

    /// Push local `branch` to `remote` as `remote_branch`, refusing if the
    /// lease no longer holds.
    ///
    /// The lease branch is re-read with ls-remote immediately before the
    /// push. The update itself is never forced.
    #[instrument(skip(self, creds, lease), fields(lease_branch = %lease.branch))]
    pub fn push_with_lease(
        &self,
        remote: &str,
        branch: &BranchName,
        remote_branch: &BranchName,
        lease: &Lease,
        creds: &Credentials,
    ) -> Result<(), GitError> {
        let mut handle = self
            .repo
            .find_remote(remote)
            .map_err(|e| GitError::from_git2(e, remote))?;
        let url = handle.url().unwrap_or(remote).to_string();

        let refs = Self::ls_remote(&url, creds)?;
        let actual = find_branch(&refs, &lease.branch).map(|r| r.oid.clone());
        if actual != lease.expected {
            let show = |oid: &Option<Oid>| {
                oid.as_ref()
                    .map(|o| o.to_string())
                    .unwrap_or_else(|| "<none>".to_string())
            };
            return Err(GitError::LeaseFailed {
                refname: lease.branch.local_ref(),
                expected: show(&lease.expected),
                actual: show(&actual),
            });
        }

        let rejection: RefCell<Option<String>> = RefCell::new(None);
        let mut callbacks = creds.callbacks();
        callbacks.push_update_reference(|refname, status| {
            if let Some(msg) = status {
                warn!(refname, msg, "push rejected");
                *rejection.borrow_mut() = Some(msg.to_string());
            }
            Ok(())
        });
        let mut opts = PushOptions::new();
        opts.remote_callbacks(callbacks);

        let refspec = format!("{}:{}", branch.local_ref(), remote_branch.local_ref());
        info!(refspec = %refspec, "pushing");
        handle
            .push(&[refspec.as_str()], Some(&mut opts))
            .map_err(|e| GitError::PushRejected {
                refname: remote_branch.local_ref(),
                message: e.message().to_string(),
            })?;

        let rejected = rejection.borrow().clone();
        if let Some(message) = rejected {
            return Err(GitError::PushRejected {
                refname: remote_branch.local_ref(),
                message,
            });
        }
        Ok(())
    }
}
