//! Integration tests for the Git interface.
//!
//! These tests use real git repositories created via tempfile to verify
//! that the Git interface works correctly with actual git operations.

mod common;

use common::{destination, TestRepo};
use tempfile::TempDir;

use subgraft::core::types::{BranchName, Oid};
use subgraft::git::{find_branch, Credentials, Git, GitError, Lease};

fn branch(name: &str) -> BranchName {
    BranchName::new(name).unwrap()
}

/// Clone `url` into a fresh temp dir and attach it as `destination`.
fn clone_with_destination(url: &str, dir: &TempDir) -> Git {
    let git = Git::clone_from(url, &dir.path().join("work"), &Credentials::anonymous()).unwrap();
    git.add_remote("destination", url).unwrap();
    git
}

mod remote_refs {
    use super::*;

    #[test]
    fn ls_remote_lists_branches() {
        let (_repo, remote) = destination();
        let refs = Git::ls_remote(&remote.url(), &Credentials::anonymous()).unwrap();
        let main = find_branch(&refs, &branch("main")).expect("main is advertised");
        assert_eq!(main.oid, remote.tip("main"));
        assert!(find_branch(&refs, &branch("develop")).is_none());
    }

    #[test]
    fn ls_remote_of_a_missing_repo_fails() {
        assert!(Git::ls_remote("/nonexistent/repo.git", &Credentials::anonymous()).is_err());
    }

    #[test]
    fn open_rejects_plain_directories() {
        let dir = TempDir::new().unwrap();
        assert!(matches!(Git::open(dir.path()), Err(GitError::NotARepo { .. })));
    }
}

mod push_with_lease {
    use super::*;

    fn new_commit(repo: &TestRepo) -> Oid {
        repo.commit(&[("NEW.md", "new\n")], "New commit")
    }

    #[test]
    fn pushes_when_the_lease_holds() {
        let (_repo, remote) = destination();
        let dir = TempDir::new().unwrap();
        let git = clone_with_destination(&remote.url(), &dir);
        let main = remote.tip("main");
        git.set_branch("proposal", &main).unwrap();

        let lease = Lease {
            branch: branch("main"),
            expected: Some(main.clone()),
        };
        git.push_with_lease(
            "destination",
            &branch("proposal"),
            &branch("proposal"),
            &lease,
            &Credentials::anonymous(),
        )
        .unwrap();
        assert_eq!(remote.tip("proposal"), main);
    }

    #[test]
    fn refuses_when_the_destination_moved() {
        let (repo, remote) = destination();
        let dir = TempDir::new().unwrap();
        let git = clone_with_destination(&remote.url(), &dir);
        let fetched = remote.tip("main");
        git.set_branch("proposal", &fetched).unwrap();

        // Someone else lands a commit on main after the fetch.
        let moved = new_commit(&repo);
        common::run_git(repo.path(), &["push", "-q", &remote.url(), "main"]);
        assert_eq!(remote.tip("main"), moved);

        let lease = Lease {
            branch: branch("main"),
            expected: Some(fetched),
        };
        let result = git.push_with_lease(
            "destination",
            &branch("proposal"),
            &branch("proposal"),
            &lease,
            &Credentials::anonymous(),
        );
        assert!(matches!(result, Err(GitError::LeaseFailed { .. })));
        assert!(!remote.branches().contains(&"proposal".to_string()));
    }

    #[test]
    fn missing_branch_lease_requires_absence() {
        let (_repo, remote) = destination();
        let dir = TempDir::new().unwrap();
        let git = clone_with_destination(&remote.url(), &dir);
        git.set_branch("proposal", &remote.tip("main")).unwrap();

        let lease = Lease {
            branch: branch("main"),
            expected: None,
        };
        let result = git.push_with_lease(
            "destination",
            &branch("proposal"),
            &branch("proposal"),
            &lease,
            &Credentials::anonymous(),
        );
        assert!(matches!(result, Err(GitError::LeaseFailed { .. })));
    }
}

mod replay {
    use super::*;
    use common::{git_output, run_git};
    use subgraft::core::types::RepoPath;
    use subgraft::git::{ReplayBackend, ReplaySignal, Side};

    #[test]
    fn incoming_deletion_removes_the_file() {
        let repo = TestRepo::new();
        repo.commit(&[("keep.txt", "keep\n"), ("notes.txt", "v1\n")], "Base");
        run_git(repo.path(), &["checkout", "-q", "-b", "cleanup"]);
        run_git(repo.path(), &["rm", "-q", "notes.txt"]);
        run_git(repo.path(), &["commit", "-q", "-m", "Drop notes"]);
        run_git(repo.path(), &["checkout", "-q", "main"]);
        let onto = repo.commit(&[("notes.txt", "v2\n")], "Edit notes");

        let git = repo.git();
        let mut replay = git.start_replay("cleanup", &onto, None).unwrap();
        assert_eq!(replay.announced_steps(), 1);
        match replay.advance() {
            ReplaySignal::Unmerged { paths } => assert_eq!(paths, vec!["notes.txt"]),
            other => panic!("expected a modify/delete conflict, got {other:?}"),
        }

        assert_eq!(replay.resolve(Side::Incoming).unwrap(), vec!["notes.txt"]);
        assert!(!repo.path().join("notes.txt").exists());
        assert!(matches!(replay.continue_step(), ReplaySignal::Applied { .. }));
        assert_eq!(replay.advance(), ReplaySignal::Complete);
        replay.finish().unwrap();
        drop(replay);

        let tip = Oid::new(git_output(repo.path(), &["rev-parse", "cleanup"])).unwrap();
        let notes = RepoPath::parse("notes.txt").unwrap();
        assert_eq!(git.read_file(&tip, &notes).unwrap(), None);
        assert!(git
            .read_file(&tip, &RepoPath::parse("keep.txt").unwrap())
            .unwrap()
            .is_some());
    }
}
