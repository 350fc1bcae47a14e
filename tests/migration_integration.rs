//! End-to-end migrations between local repositories.
//!
//! The destination is a bare repository reached by path, so the whole
//! pipeline runs (clone, extract, integrate, replay, conditional push)
//! without network access.

mod common;

use common::{destination, scenario_source};

use subgraft::core::policy::ConflictPolicy;
use subgraft::core::types::{BranchName, RepoPath};
use subgraft::engine::preflight::CheckStatus;
use subgraft::engine::{migrate, Hosting, Interrupt, MigrationError, MigrationOutcome};
use subgraft::forge::mock::{MockForge, MockOperation};
use subgraft::forge::RepoPermissions;

fn path(raw: &str) -> RepoPath {
    RepoPath::parse(raw).unwrap()
}

const MAPS: &[&str] = &["src/lib:pkg/lib", "src/app:pkg/app"];

mod publish {
    use super::*;

    #[test]
    fn proposal_is_pushed_next_to_an_untouched_destination() {
        let source = scenario_source();
        let (_dest, remote) = destination();
        let main_before = remote.tip("main");
        let config = common::config(&source.url(), &remote.url(), MAPS);

        let report = match migrate(&config, None, &Interrupt::new()).unwrap() {
            MigrationOutcome::Published(report) => report,
            other => panic!("expected a published proposal, got {other:?}"),
        };

        let proposal = &report.proposal;
        assert!(proposal.branch.as_str().starts_with("migrate/head-"));
        assert!(!proposal.up_to_date);
        assert!(proposal.pull_request.is_none());
        assert_eq!(report.integration.commit_count, 3);
        assert!(report.workspace.is_none());

        assert_eq!(remote.tip("main"), main_before);
        assert!(remote.branches().contains(&proposal.branch.to_string()));
        let pushed = remote.tip(proposal.branch.as_str());
        assert_eq!(pushed, proposal.tip);

        let git = remote.git();
        assert_eq!(
            git.list_files(&pushed).unwrap(),
            vec!["README.md", "pkg/app/main.rs", "pkg/lib/lib.rs"]
        );
        // Replayed on top of the destination, three commits ahead.
        assert_eq!(git.commit_count(&pushed, Some(&main_before)).unwrap(), 3);
    }

    #[test]
    fn rerun_after_merge_is_up_to_date() {
        let source = scenario_source();
        let (_dest, remote) = destination();
        let config = common::config(&source.url(), &remote.url(), MAPS);

        let first = match migrate(&config, None, &Interrupt::new()).unwrap() {
            MigrationOutcome::Published(report) => report.proposal,
            other => panic!("unexpected outcome {other:?}"),
        };
        remote.update_branch("main", &first.tip);

        let second = match migrate(&config, None, &Interrupt::new()).unwrap() {
            MigrationOutcome::Published(report) => report.proposal,
            other => panic!("unexpected outcome {other:?}"),
        };
        assert!(second.up_to_date);
        assert_eq!(second.tree, first.tree);
        assert_eq!(second.branch, first.branch);
        assert_eq!(remote.git().tree_of(&remote.tip("main")).unwrap(), second.tree);
    }

    #[test]
    fn kept_workspace_survives_the_run() {
        let source = scenario_source();
        let (_dest, remote) = destination();
        let mut config = common::config(&source.url(), &remote.url(), &["src/app:app"]);
        config.keep_workspace = true;

        let report = match migrate(&config, None, &Interrupt::new()).unwrap() {
            MigrationOutcome::Published(report) => report,
            other => panic!("unexpected outcome {other:?}"),
        };
        let kept = report.workspace.expect("workspace path");
        assert!(kept.join(".git").exists());
        std::fs::remove_dir_all(kept.parent().unwrap()).unwrap();
    }

    #[test]
    fn pull_request_is_opened_through_the_forge() {
        let source = scenario_source();
        let (_dest, remote) = destination();
        let mut config = common::config(&source.url(), &remote.url(), MAPS);
        config.open_pr = true;

        let runtime = tokio::runtime::Runtime::new().unwrap();
        let forge = MockForge::new("acme", "split")
            .with_permissions(RepoPermissions {
                pull: true,
                push: true,
                admin: false,
            })
            .with_branch("main");
        let hosting = Hosting::new(&forge, runtime.handle());

        let report = match migrate(&config, Some(&hosting), &Interrupt::new()).unwrap() {
            MigrationOutcome::Published(report) => report,
            other => panic!("unexpected outcome {other:?}"),
        };

        assert_eq!(
            report.preflight.get("hosting-auth").map(|c| c.status),
            Some(CheckStatus::Pass)
        );
        let pr = report.proposal.pull_request.expect("pull request");
        assert_eq!(pr.number, 1);
        assert_eq!(pr.head, report.proposal.branch.as_str());
        assert_eq!(pr.base, "main");
        assert!(forge
            .operations()
            .iter()
            .any(|op| matches!(op, MockOperation::CreatePr { .. })));
    }
}

mod conflicts {
    use super::*;

    fn conflicting_destination() -> (common::TestRepo, common::BareRemote) {
        let repo = common::TestRepo::new();
        repo.commit(&[("pkg/lib/lib.rs", "// destination version\n")], "Existing lib");
        let bare = repo.bare_clone();
        (repo, bare)
    }

    #[test]
    fn prefer_incoming_keeps_the_migrated_content() {
        let source = scenario_source();
        let (_dest, remote) = conflicting_destination();
        let mut config = common::config(&source.url(), &remote.url(), &["src/lib:pkg/lib"]);
        config.conflict_policy = ConflictPolicy::PreferIncoming;

        let proposal = match migrate(&config, None, &Interrupt::new()).unwrap() {
            MigrationOutcome::Published(report) => report.proposal,
            other => panic!("unexpected outcome {other:?}"),
        };
        assert!(proposal.replay.is_some());
        assert_eq!(
            remote
                .git()
                .read_file(&proposal.tip, &path("pkg/lib/lib.rs"))
                .unwrap()
                .unwrap(),
            b"pub fn one() {}\npub fn two() {}\n"
        );
    }

    fn read(remote: &common::BareRemote, tip: &subgraft::core::types::Oid, file: &str) -> Option<Vec<u8>> {
        remote.git().read_file(tip, &path(file)).unwrap()
    }

    #[test]
    fn prefer_existing_keeps_the_destination_content() {
        let source = scenario_source();
        let (_dest, remote) = conflicting_destination();
        let mut config = common::config(&source.url(), &remote.url(), &["src/lib:pkg/lib"]);
        config.conflict_policy = ConflictPolicy::PreferExisting;

        let proposal = match migrate(&config, None, &Interrupt::new()).unwrap() {
            MigrationOutcome::Published(report) => report.proposal,
            other => panic!("unexpected outcome {other:?}"),
        };
        assert!(proposal.branch.as_str().ends_with("-existing"));
        let content = read(&remote, &proposal.tip, "pkg/lib/lib.rs").unwrap();
        assert!(content.starts_with(b"// destination version\n"));
        assert!(!String::from_utf8_lossy(&content).contains("pub fn one"));
        assert_eq!(remote.branches().len(), 2);
    }

    #[test]
    fn diff_align_favors_the_migrated_content() {
        let source = scenario_source();
        let (_dest, remote) = conflicting_destination();
        let mut config = common::config(&source.url(), &remote.url(), &["src/lib:pkg/lib"]);
        config.conflict_policy = ConflictPolicy::DiffAlign;

        let proposal = match migrate(&config, None, &Interrupt::new()).unwrap() {
            MigrationOutcome::Published(report) => report.proposal,
            other => panic!("unexpected outcome {other:?}"),
        };
        assert!(proposal.branch.as_str().ends_with("-aligned"));
        assert!(!proposal.up_to_date);
        assert_eq!(
            read(&remote, &proposal.tip, "pkg/lib/lib.rs").unwrap(),
            b"pub fn one() {}\npub fn two() {}\n"
        );
    }

    /// The source adds then deletes a file the destination already holds.
    /// The deletion meets the destination's copy as a modify/delete conflict.
    fn deleting_source() -> common::TestRepo {
        let repo = common::TestRepo::new();
        repo.commit(
            &[("src/lib/lib.rs", "pub fn one() {}\n"), ("src/lib/old.rs", "// source draft\n")],
            "Add lib",
        );
        common::run_git(repo.path(), &["rm", "-q", "src/lib/old.rs"]);
        common::run_git(repo.path(), &["commit", "-q", "-m", "Drop draft"]);
        repo
    }

    #[test]
    fn prefer_existing_keeps_a_file_the_source_deleted() {
        let source = deleting_source();
        let dest = common::TestRepo::new();
        dest.commit(&[("pkg/lib/old.rs", "// destination copy\n")], "Existing old");
        let remote = dest.bare_clone();
        let mut config = common::config(&source.url(), &remote.url(), &["src/lib:pkg/lib"]);
        config.conflict_policy = ConflictPolicy::PreferExisting;

        let proposal = match migrate(&config, None, &Interrupt::new()).unwrap() {
            MigrationOutcome::Published(report) => report.proposal,
            other => panic!("unexpected outcome {other:?}"),
        };
        let replay = proposal.replay.as_ref().unwrap();
        assert!(replay.resolved_paths.contains(&"pkg/lib/old.rs".to_string()));
        assert_eq!(
            read(&remote, &proposal.tip, "pkg/lib/old.rs").unwrap(),
            b"// destination copy\n"
        );
        assert_eq!(
            read(&remote, &proposal.tip, "pkg/lib/lib.rs").unwrap(),
            b"pub fn one() {}\n"
        );
    }

    #[test]
    fn prefer_incoming_follows_the_source_deletion() {
        let source = deleting_source();
        let dest = common::TestRepo::new();
        dest.commit(&[("pkg/lib/old.rs", "// destination copy\n")], "Existing old");
        let remote = dest.bare_clone();
        let config = common::config(&source.url(), &remote.url(), &["src/lib:pkg/lib"]);

        let proposal = match migrate(&config, None, &Interrupt::new()).unwrap() {
            MigrationOutcome::Published(report) => report.proposal,
            other => panic!("unexpected outcome {other:?}"),
        };
        assert_eq!(read(&remote, &proposal.tip, "pkg/lib/old.rs"), None);
        assert!(read(&remote, &proposal.tip, "pkg/lib/lib.rs").is_some());
    }

    #[test]
    fn interactive_mode_hands_off() {
        let source = scenario_source();
        let (_dest, remote) = conflicting_destination();
        let main_before = remote.tip("main");
        let mut config = common::config(&source.url(), &remote.url(), &["src/lib:pkg/lib"]);
        config.interactive = true;

        let report = match migrate(&config, None, &Interrupt::new()).unwrap() {
            MigrationOutcome::ManualHandOff(report) => report,
            other => panic!("expected a hand-off, got {other:?}"),
        };

        assert_eq!(report.hand_off.conflicted_paths, vec!["pkg/lib/lib.rs"]);
        assert!(report.hand_off.commands[0].starts_with("cd "));
        assert!(report.workspace.exists());
        assert_eq!(remote.branches(), vec!["main"]);
        assert_eq!(remote.tip("main"), main_before);
        std::fs::remove_dir_all(report.workspace.parent().unwrap()).unwrap();
    }
}

mod dry_run {
    use super::*;

    #[test]
    fn reports_without_pushing() {
        let source = scenario_source();
        let (_dest, remote) = destination();
        let mut config = common::config(&source.url(), &remote.url(), MAPS);
        config.dry_run = true;

        let report = match migrate(&config, None, &Interrupt::new()).unwrap() {
            MigrationOutcome::DryRun(report) => report,
            other => panic!("expected a dry run, got {other:?}"),
        };

        let counts: Vec<_> = report
            .mappings
            .iter()
            .map(|m| (m.source_present, m.affected_commits))
            .collect();
        assert_eq!(counts, vec![(true, 2), (true, 1)]);
        assert!(report.transformations.is_empty());
        assert_eq!(remote.branches(), vec!["main"]);
    }

    #[test]
    fn preflight_failures_are_reported_not_fatal() {
        let source = scenario_source();
        let (_dest, remote) = destination();
        let mut config = common::config(&source.url(), &remote.url(), &["docs:handbook"]);
        config.dry_run = true;
        config.dest_branch = BranchName::new("develop").unwrap();

        let report = match migrate(&config, None, &Interrupt::new()).unwrap() {
            MigrationOutcome::DryRun(report) => report,
            other => panic!("expected a dry run, got {other:?}"),
        };
        assert!(report.preflight.has_failures());
        assert!(!report.mappings[0].source_present);
    }
}

mod preflight {
    use super::*;

    #[test]
    fn missing_destination_branch_fails() {
        let source = scenario_source();
        let (_dest, remote) = destination();
        let mut config = common::config(&source.url(), &remote.url(), MAPS);
        config.dest_branch = BranchName::new("develop").unwrap();

        match migrate(&config, None, &Interrupt::new()) {
            Err(MigrationError::Preflight(report)) => {
                assert_eq!(
                    report.get("destination-branch").map(|c| c.status),
                    Some(CheckStatus::Fail)
                );
                assert_eq!(
                    report.get("source-reachable").map(|c| c.status),
                    Some(CheckStatus::Pass)
                );
            }
            other => panic!("expected a preflight failure, got {other:?}"),
        }
    }

    #[test]
    fn unknown_team_fails() {
        let source = scenario_source();
        let (_dest, remote) = destination();
        let mut config = common::config(&source.url(), &remote.url(), MAPS);
        config.access_group = Some("platform".to_string());

        let runtime = tokio::runtime::Runtime::new().unwrap();
        let forge = MockForge::new("acme", "split")
            .with_permissions(RepoPermissions {
                pull: true,
                push: true,
                admin: false,
            })
            .with_branch("main");
        let hosting = Hosting::new(&forge, runtime.handle());

        match migrate(&config, Some(&hosting), &Interrupt::new()) {
            Err(MigrationError::Preflight(report)) => {
                assert_eq!(
                    report.get("access-group").map(|c| c.status),
                    Some(CheckStatus::Fail)
                );
                assert_eq!(report.failures().count(), 1);
            }
            other => panic!("expected a preflight failure, got {other:?}"),
        }
    }
}
