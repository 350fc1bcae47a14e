//! engine::runner
//!
//! The single entry point for a migration.
//!
//! # Lifecycle
//!
//! ```text
//! Validate -> Preflight -> Workspace -> Extract (per mapping) -> Integrate
//!          -> [Create destination] -> Replay -> Push -> [Pull request]
//! ```
//!
//! A dry run stops after the workspace is cloned and reports what each
//! mapping would carry, computed read-only.
//!
//! # Invariants
//!
//! - Nothing is mutated before preflight passes
//! - Nothing is ever written to the destination branch itself
//! - Every exit path drops the workspace, unless it is retained
//! - The interrupt flag is honored between steps and inside the long loops

use std::path::PathBuf;

use tracing::{info, instrument, warn};

use super::extract::{self, ExtractedBranch, ExtractionError};
use super::integrate::{self, IntegrationOutcome};
use super::interrupt::Interrupt;
use super::preflight::{self, DestinationState, PreflightReport};
use super::publish::{self, HandOff, Proposal, PublishError, PublishOutcome};
use super::workspace::Workspace;
use super::{Hosting, MigrationError, ValidationError};
use crate::core::config::MigrationConfig;
use crate::core::mapping::Mapping;
use crate::core::policy::ConflictPolicy;
use crate::forge::CreateRepoRequest;
use crate::git::{Credentials, GitError};

/// What a dry run found for one mapping.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MappingPreview {
    pub mapping: Mapping,
    /// Whether the source path exists at the source tip.
    pub source_present: bool,
    /// Non-merge commits that change the mapping's content.
    pub affected_commits: usize,
}

/// Result of a dry run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DryRunReport {
    pub preflight: PreflightReport,
    pub mappings: Vec<MappingPreview>,
    /// Identity and message transformations, one line each.
    pub transformations: Vec<String>,
    pub conflict_policy: ConflictPolicy,
}

/// Result of a completed migration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PublishedReport {
    pub preflight: PreflightReport,
    pub extracted: Vec<ExtractedBranch>,
    pub integration: IntegrationOutcome,
    pub proposal: Proposal,
    /// URL of the destination repository, when this run created it.
    pub created_repository: Option<String>,
    /// Path of the retained workspace.
    pub workspace: Option<PathBuf>,
}

/// Replay stopped for manual merging.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ManualHandOffReport {
    pub preflight: PreflightReport,
    pub integration: IntegrationOutcome,
    pub hand_off: HandOff,
    /// The workspace to finish the merge in. Always retained.
    pub workspace: PathBuf,
}

/// Outcome of [`migrate`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MigrationOutcome {
    DryRun(DryRunReport),
    Published(PublishedReport),
    ManualHandOff(ManualHandOffReport),
}

/// Check the parts of a config that types alone do not guarantee.
pub fn validate(config: &MigrationConfig) -> Result<(), ValidationError> {
    if config.file_set.iter().any(|f| f.is_root()) {
        return Err(ValidationError::RootInFileSet);
    }
    if config.retry_budget == 0 {
        return Err(ValidationError::ZeroRetryBudget);
    }
    Ok(())
}

/// Run a migration.
///
/// `hosting` is the destination's forge, when it has one. Without it, the
/// proposal branch is still pushed but no pull request is opened.
#[instrument(skip_all, fields(mappings = config.mappings.len(), dry_run = config.dry_run))]
pub fn migrate(
    config: &MigrationConfig,
    hosting: Option<&Hosting<'_>>,
    interrupt: &Interrupt,
) -> Result<MigrationOutcome, MigrationError> {
    validate(config)?;
    check(interrupt)?;

    let creds = match &config.token {
        Some(token) => Credentials::with_token(token.expose()),
        None => Credentials::anonymous(),
    };

    let (report, destination) = preflight::run(config, &creds, hosting);
    for warning in report.warnings() {
        warn!(check = warning.id, "{}", warning.message);
    }
    if report.has_failures() && !config.dry_run {
        return Err(MigrationError::Preflight(report));
    }
    check(interrupt)?;

    let mut workspace = Workspace::create(&config.remotes.source, &config.remotes.destination, &creds)
        .map_err(git_error)?;

    if config.dry_run {
        return dry_run(&workspace, config, report).map(MigrationOutcome::DryRun);
    }

    let result = run_in_workspace(&workspace, config, &creds, hosting, &destination, interrupt);
    match result {
        Ok(Stage::Published {
            extracted,
            integration,
            proposal,
            created_repository,
        }) => {
            let kept = config.keep_workspace.then(|| workspace.retain());
            Ok(MigrationOutcome::Published(PublishedReport {
                preflight: report,
                extracted,
                integration,
                proposal,
                created_repository,
                workspace: kept,
            }))
        }
        Ok(Stage::HandOff {
            integration,
            hand_off,
        }) => Ok(MigrationOutcome::ManualHandOff(ManualHandOffReport {
            preflight: report,
            integration,
            hand_off,
            workspace: workspace.retain(),
        })),
        Err(e) => {
            if config.keep_workspace {
                let path = workspace.retain();
                warn!(path = %path.display(), "migration failed; workspace kept for inspection");
            }
            Err(e)
        }
    }
}

/// Where the mutating part of a run ended.
enum Stage {
    Published {
        extracted: Vec<ExtractedBranch>,
        integration: IntegrationOutcome,
        proposal: Proposal,
        created_repository: Option<String>,
    },
    HandOff {
        integration: IntegrationOutcome,
        hand_off: HandOff,
    },
}

fn run_in_workspace(
    workspace: &Workspace,
    config: &MigrationConfig,
    creds: &Credentials,
    hosting: Option<&Hosting<'_>>,
    destination: &DestinationState,
    interrupt: &Interrupt,
) -> Result<Stage, MigrationError> {
    let git = workspace.git();
    let cancelled = || interrupt.is_set();

    let source_tip = workspace.resolve_source(&config.source_ref).map_err(git_error)?;
    // Branches are about to be rewritten; keep HEAD off all of them.
    git.detach_head(&source_tip).map_err(git_error)?;
    info!(source_ref = %config.source_ref, tip = source_tip.short(7), "source resolved");

    let mut extracted = Vec::with_capacity(config.mappings.len());
    for (index, mapping) in config.mappings.iter().enumerate() {
        check(interrupt)?;
        let branch = extract::extract(git, &source_tip, index, mapping, config, &cancelled)
            .map_err(|e| match e {
                ExtractionError::Interrupted => MigrationError::Interrupted,
                e => e.into(),
            })?;
        extracted.push(branch);
    }

    check(interrupt)?;
    let integration = integrate::integrate(git, &extracted)?;

    check(interrupt)?;
    let mut created_repository = None;
    let destination_tip = if destination.branch_exists {
        Some(
            workspace
                .fetch_destination(&config.dest_branch, creds)
                .map_err(git_error)?,
        )
    } else {
        if destination.will_create {
            if let Some(hosting) = hosting {
                let url = hosting.block_on(hosting.forge.create_repo(CreateRepoRequest {
                    private: true,
                    description: Some(format!("Migrated from {}", config.remotes.source)),
                }))?;
                info!(url = %url, "destination repository created");
                created_repository = Some(url);
            }
        }
        None
    };

    check(interrupt)?;
    let outcome = publish::publish(
        git,
        config,
        &integration,
        destination_tip.as_ref(),
        creds,
        hosting,
        workspace.path(),
        &cancelled,
    )
    .map_err(|e| match e {
        PublishError::Interrupted | PublishError::Git(GitError::Interrupted) => {
            MigrationError::Interrupted
        }
        e => e.into(),
    })?;

    Ok(match outcome {
        PublishOutcome::Published(proposal) => Stage::Published {
            extracted,
            integration,
            proposal,
            created_repository,
        },
        PublishOutcome::ManualHandOff(hand_off) => Stage::HandOff {
            integration,
            hand_off,
        },
    })
}

fn dry_run(
    workspace: &Workspace,
    config: &MigrationConfig,
    preflight: PreflightReport,
) -> Result<DryRunReport, MigrationError> {
    let git = workspace.git();
    let source_tip = workspace.resolve_source(&config.source_ref).map_err(git_error)?;

    let mut mappings = Vec::with_capacity(config.mappings.len());
    for mapping in &config.mappings {
        let source_present = git.path_exists(&source_tip, mapping.source()).map_err(git_error)?;
        let affected_commits = if source_present {
            git.count_affected(&source_tip, &extract::filter_for(mapping, config))
                .map_err(git_error)?
        } else {
            0
        };
        mappings.push(MappingPreview {
            mapping: mapping.clone(),
            source_present,
            affected_commits,
        });
    }

    Ok(DryRunReport {
        preflight,
        mappings,
        transformations: config.reattribution.describe(),
        conflict_policy: config.conflict_policy,
    })
}

fn check(interrupt: &Interrupt) -> Result<(), MigrationError> {
    if interrupt.is_set() {
        Err(MigrationError::Interrupted)
    } else {
        Ok(())
    }
}

fn git_error(e: GitError) -> MigrationError {
    match e {
        GitError::Interrupted => MigrationError::Interrupted,
        e => MigrationError::Git(e),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::config::Remotes;
    use crate::core::mapping::MappingSet;
    use crate::core::types::{BranchName, RepoPath};

    fn config() -> MigrationConfig {
        MigrationConfig::new(
            Remotes {
                source: "/nonexistent/src".to_string(),
                destination: "/nonexistent/dst".to_string(),
            },
            MappingSet::from_raw(["a:b"]).unwrap(),
            BranchName::new("main").unwrap(),
        )
    }

    mod validate {
        use super::*;

        #[test]
        fn accepts_defaults() {
            assert!(validate(&config()).is_ok());
        }

        #[test]
        fn rejects_root_in_file_set() {
            let mut config = config();
            config.file_set = vec![RepoPath::root()];
            assert!(matches!(validate(&config), Err(ValidationError::RootInFileSet)));
        }

        #[test]
        fn rejects_zero_budget() {
            let mut config = config();
            config.retry_budget = 0;
            assert!(matches!(validate(&config), Err(ValidationError::ZeroRetryBudget)));
        }
    }

    #[test]
    fn interrupt_before_start() {
        let interrupt = Interrupt::new();
        interrupt.trigger();
        assert!(matches!(
            migrate(&config(), None, &interrupt),
            Err(MigrationError::Interrupted)
        ));
    }

    #[test]
    fn unreachable_remotes_fail_preflight() {
        match migrate(&config(), None, &Interrupt::new()) {
            Err(MigrationError::Preflight(report)) => {
                assert_eq!(
                    report.get("source-reachable").map(|c| c.status),
                    Some(preflight::CheckStatus::Fail)
                );
                assert_eq!(
                    report.get("vcs-backend").map(|c| c.status),
                    Some(preflight::CheckStatus::Pass)
                );
            }
            other => panic!("expected preflight failure, got {other:?}"),
        }
    }
}
