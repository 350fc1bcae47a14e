//! Shared fixtures for integration tests.
//!
//! Repositories are built with the `git` CLI inside temp directories so the
//! tests exercise real on-disk repositories, including local "remotes".

#![allow(dead_code)]

use std::path::{Path, PathBuf};
use std::process::Command;

use tempfile::TempDir;

use subgraft::core::config::{MigrationConfig, Remotes};
use subgraft::core::mapping::MappingSet;
use subgraft::core::types::{BranchName, Oid};
use subgraft::git::Git;

/// A working repository with a fixed identity and deterministic dates.
pub struct TestRepo {
    dir: TempDir,
}

impl TestRepo {
    /// Create an empty repository on branch `main`.
    pub fn new() -> Self {
        let dir = TempDir::new().expect("failed to create temp dir");
        run_git(dir.path(), &["init", "-q", "-b", "main"]);
        run_git(dir.path(), &["config", "user.email", "test@example.com"]);
        run_git(dir.path(), &["config", "user.name", "Test User"]);
        run_git(dir.path(), &["config", "commit.gpgsign", "false"]);
        Self { dir }
    }

    pub fn path(&self) -> &Path {
        self.dir.path()
    }

    /// Path as a remote URL.
    pub fn url(&self) -> String {
        self.path().display().to_string()
    }

    pub fn git(&self) -> Git {
        Git::open(self.path()).expect("failed to open test repo")
    }

    /// Write files and commit them in one commit.
    pub fn commit(&self, files: &[(&str, &str)], message: &str) -> Oid {
        for (path, content) in files {
            let full = self.path().join(path);
            if let Some(parent) = full.parent() {
                std::fs::create_dir_all(parent).unwrap();
            }
            std::fs::write(&full, content).unwrap();
            run_git(self.path(), &["add", path]);
        }
        run_git(self.path(), &["commit", "-q", "-m", message]);
        self.head()
    }

    pub fn head(&self) -> Oid {
        Oid::new(git_output(self.path(), &["rev-parse", "HEAD"])).unwrap()
    }

    /// Bare clone of this repository, standing in for a hosted remote.
    pub fn bare_clone(&self) -> BareRemote {
        let dir = TempDir::new().expect("failed to create temp dir");
        let path = dir.path().join("remote.git");
        run_git(
            dir.path(),
            &["clone", "-q", "--bare", &self.url(), path.to_str().unwrap()],
        );
        BareRemote { _dir: dir, path }
    }
}

/// A bare repository used as a remote.
pub struct BareRemote {
    _dir: TempDir,
    path: PathBuf,
}

impl BareRemote {
    pub fn url(&self) -> String {
        self.path.display().to_string()
    }

    pub fn git(&self) -> Git {
        Git::open(&self.path).expect("failed to open bare remote")
    }

    /// Branch names under `refs/heads/`.
    pub fn branches(&self) -> Vec<String> {
        git_output(&self.path, &["for-each-ref", "--format=%(refname:short)", "refs/heads"])
            .lines()
            .map(str::to_string)
            .collect()
    }

    pub fn tip(&self, branch: &str) -> Oid {
        Oid::new(git_output(&self.path, &["rev-parse", &format!("refs/heads/{branch}")])).unwrap()
    }

    /// Move `branch` to `target`, as a merged pull request would.
    pub fn update_branch(&self, branch: &str, target: &Oid) {
        run_git(
            &self.path,
            &["update-ref", &format!("refs/heads/{branch}"), target.as_str()],
        );
    }
}

/// Source repository of the two-mapping scenario: `src/lib` changes twice,
/// `src/app` once, and a README commit touches neither.
pub fn scenario_source() -> TestRepo {
    let repo = TestRepo::new();
    repo.commit(&[("README.md", "# mono\n")], "Initial commit");
    repo.commit(&[("src/lib/lib.rs", "pub fn one() {}\n")], "Add lib");
    repo.commit(&[("src/app/main.rs", "fn main() {}\n")], "Add app");
    repo.commit(
        &[("src/lib/lib.rs", "pub fn one() {}\npub fn two() {}\n")],
        "Extend lib",
    );
    repo
}

/// Destination with a single README commit on `main`.
pub fn destination() -> (TestRepo, BareRemote) {
    let repo = TestRepo::new();
    repo.commit(&[("README.md", "# split\n")], "Initial destination commit");
    let bare = repo.bare_clone();
    (repo, bare)
}

/// Config for the scenario with hosting-dependent steps switched off.
pub fn config(source: &str, destination: &str, maps: &[&str]) -> MigrationConfig {
    let mut config = MigrationConfig::new(
        Remotes {
            source: source.to_string(),
            destination: destination.to_string(),
        },
        MappingSet::from_raw(maps).unwrap(),
        BranchName::new("main").unwrap(),
    );
    config.open_pr = false;
    config
}

/// Run a git command in the given directory.
pub fn run_git(dir: &Path, args: &[&str]) {
    let output = Command::new("git")
        .args(args)
        .current_dir(dir)
        .env("GIT_AUTHOR_DATE", "2024-01-01T00:00:00Z")
        .env("GIT_COMMITTER_DATE", "2024-01-01T00:00:00Z")
        .output()
        .expect("failed to run git");

    if !output.status.success() {
        panic!(
            "git {:?} failed: {}",
            args,
            String::from_utf8_lossy(&output.stderr)
        );
    }
}

/// Run a git command and return trimmed stdout.
pub fn git_output(dir: &Path, args: &[&str]) -> String {
    let output = Command::new("git")
        .args(args)
        .current_dir(dir)
        .output()
        .expect("failed to run git");
    assert!(
        output.status.success(),
        "git {:?} failed: {}",
        args,
        String::from_utf8_lossy(&output.stderr)
    );
    String::from_utf8(output.stdout).unwrap().trim().to_string()
}
