//! engine::workspace
//!
//! The ephemeral clone a migration works in.
//!
//! A workspace is a fresh clone of the source under a temporary directory,
//! with the destination attached as the `destination` remote. It is
//! exclusively owned by one run and removed when dropped, unless it has
//! been retained.

use std::path::{Path, PathBuf};

use tempfile::TempDir;
use tracing::{debug, info};

use crate::core::types::{BranchName, Oid};
use crate::git::{Credentials, Git, GitError};

/// Name of the remote pointing at the destination.
pub const DESTINATION_REMOTE: &str = "destination";

/// Ephemeral clone of the source.
pub struct Workspace {
    // Declared before `dir` so the repository handle is closed before the
    // directory is removed.
    git: Git,
    dir: Option<TempDir>,
    path: PathBuf,
}

impl std::fmt::Debug for Workspace {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Workspace")
            .field("path", &self.path)
            .field("retained", &self.dir.is_none())
            .finish()
    }
}

impl Workspace {
    /// Clone `source` and attach `destination` as a remote.
    pub fn create(source: &str, destination: &str, creds: &Credentials) -> Result<Self, GitError> {
        let dir = TempDir::with_prefix("subgraft-").map_err(|e| GitError::Internal {
            message: format!("cannot create workspace: {e}"),
        })?;
        let path = dir.path().join("work");
        let git = Git::clone_from(source, &path, creds)?;
        git.add_remote(DESTINATION_REMOTE, destination)?;
        debug!(path = %path.display(), "workspace ready");

        Ok(Self {
            git,
            dir: Some(dir),
            path,
        })
    }

    pub fn git(&self) -> &Git {
        &self.git
    }

    /// Working directory of the clone.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Keep the directory after drop. Returns its path.
    pub fn retain(&mut self) -> PathBuf {
        if let Some(dir) = self.dir.take() {
            let _ = dir.keep();
            info!(path = %self.path.display(), "workspace retained");
        }
        self.path.clone()
    }

    /// Resolve a source revision in the clone.
    ///
    /// Branch names are looked up among the source's remote-tracking refs
    /// first, so any source branch works, not only the checked-out one.
    pub fn resolve_source(&self, source_ref: &str) -> Result<Oid, GitError> {
        if let Some(oid) = self.git.try_resolve(&format!("refs/remotes/origin/{source_ref}"))? {
            return Ok(oid);
        }
        self.git.resolve(source_ref)
    }

    /// Fetch the destination branch. Returns its tip as seen by the fetch.
    pub fn fetch_destination(
        &self,
        branch: &BranchName,
        creds: &Credentials,
    ) -> Result<Oid, GitError> {
        let tracking = destination_ref(branch);
        let refspec = format!("+{}:{}", branch.local_ref(), tracking);
        self.git.fetch(DESTINATION_REMOTE, &[refspec.as_str()], creds)?;
        self.git.resolve(&tracking)
    }
}

/// Remote-tracking ref of a destination branch in the workspace.
pub fn destination_ref(branch: &BranchName) -> String {
    format!("refs/remotes/{DESTINATION_REMOTE}/{branch}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn destination_tracking_ref() {
        let branch = BranchName::new("main").unwrap();
        assert_eq!(destination_ref(&branch), "refs/remotes/destination/main");
    }
}
