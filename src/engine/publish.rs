//! engine::publish
//!
//! Replays the integration branch onto the destination and publishes it as
//! a proposal branch.
//!
//! # Replay state machine
//!
//! ```text
//! Running --AlreadyApplied--> NeedsContinuation --(commit empty)--> Running
//! Running --Unmerged--> ConflictedRecoverable --(resolve)--> NeedsContinuation
//! Running --Unmerged, interactive--> NeedsManualMerge
//! Running --Fatal--> ConflictedFatal --> Aborted
//! Running --Complete--> Succeeded
//! ```
//!
//! Recovery decisions are taken on [`ReplaySignal`] values only. The number
//! of resolution attempts that do not move the replay forward is bounded by
//! the run's retry budget.
//!
//! # Publishing
//!
//! The replayed tip is pushed under a deterministic proposal name with a
//! conditional push: the destination branch must still be where it was
//! fetched, and the proposal branch is never force-updated.

use std::path::Path;

use thiserror::Error;
use tracing::{debug, info, instrument, warn};

use super::integrate::IntegrationOutcome;
use super::workspace::DESTINATION_REMOTE;
use super::Hosting;
use crate::core::config::MigrationConfig;
use crate::core::naming::{manual_branch, proposal_branch, INTEGRATION_BRANCH};
use crate::core::policy::ConflictPolicy;
use crate::core::types::{BranchName, Oid};
use crate::forge::{CreatePrRequest, ForgeError, PullRequest};
use crate::git::{Credentials, Git, GitError, Lease, ReplayBackend, ReplaySignal, Side};

/// Errors from replay and publication.
#[derive(Debug, Error)]
pub enum PublishError {
    /// Too many resolution attempts without progress.
    #[error("replay made no progress after {attempts} resolution attempts; aborted")]
    RetryBudgetExhausted { attempts: u32 },

    /// The replay backend could not go on.
    #[error("replay failed: {reason}")]
    ReplayFailed { reason: String },

    /// The destination branch moved after it was fetched.
    #[error("destination branch {branch} moved since it was fetched (expected {expected}, found {actual}); re-run the migration")]
    DestinationMoved {
        branch: String,
        expected: String,
        actual: String,
    },

    #[error("push of {branch} was rejected: {message}")]
    PushRejected { branch: String, message: String },

    /// The pull request could not be opened. The proposal branch is pushed.
    #[error("proposal {branch} pushed, but opening the pull request failed: {source}")]
    PullRequest {
        branch: String,
        #[source]
        source: ForgeError,
    },

    #[error(transparent)]
    Git(#[from] GitError),

    #[error("publish interrupted")]
    Interrupted,
}

/// State of a replay.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RebaseState {
    Running,
    NeedsContinuation,
    ConflictedRecoverable,
    ConflictedFatal,
    NeedsManualMerge,
    Succeeded,
    Aborted,
}

impl RebaseState {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            RebaseState::Succeeded | RebaseState::Aborted | RebaseState::NeedsManualMerge
        )
    }
}

/// Why a replay was aborted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AbortReason {
    RetryBudget { attempts: u32 },
    Fatal { reason: String },
    /// The backend produced more steps than it announced.
    Overflow { announced: usize },
}

/// What a replay did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReplayReport {
    pub state: RebaseState,
    /// Steps committed, including empty ones.
    pub steps: usize,
    /// Steps whose changes were already present and were kept as empty
    /// commits.
    pub empty_steps: usize,
    /// Every path resolved by policy, in resolution order.
    pub resolved_paths: Vec<String>,
    /// Paths left conflicted when the replay stopped for a manual merge.
    pub conflicted_paths: Vec<String>,
    pub abort_reason: Option<AbortReason>,
}

impl ReplayReport {
    fn new() -> Self {
        Self {
            state: RebaseState::Running,
            steps: 0,
            empty_steps: 0,
            resolved_paths: Vec::new(),
            conflicted_paths: Vec::new(),
            abort_reason: None,
        }
    }
}

/// Side whose entry wins a conflict left after the policy's merge.
pub fn winning_side(policy: ConflictPolicy) -> Side {
    if policy.incoming_wins() {
        Side::Incoming
    } else {
        Side::Existing
    }
}

/// Drive `backend` to a terminal state.
///
/// `retry_budget` bounds consecutive resolution attempts that do not
/// complete a step. Errors are returned only for backend failures while
/// recovering and for interruption; every other outcome is a terminal
/// [`RebaseState`] in the report. An aborted replay has been rolled back.
pub fn drive_replay(
    backend: &mut dyn ReplayBackend,
    policy: ConflictPolicy,
    interactive: bool,
    retry_budget: u32,
    cancelled: &dyn Fn() -> bool,
) -> Result<ReplayReport, PublishError> {
    let announced = backend.announced_steps();
    let mut report = ReplayReport::new();
    let mut stalled: u32 = 0;
    let mut signal = backend.advance();

    while !report.state.is_terminal() {
        if cancelled() {
            backend.abort()?;
            return Err(PublishError::Interrupted);
        }
        debug!(?signal, state = ?report.state, "replay step");

        signal = match signal {
            ReplaySignal::Applied { .. } => {
                if !step_done(&mut report, &mut stalled, announced) {
                    abort(backend, &mut report, AbortReason::Overflow { announced })?;
                    break;
                }
                backend.advance()
            }
            ReplaySignal::AlreadyApplied => {
                report.state = RebaseState::NeedsContinuation;
                backend.commit_empty()?;
                report.empty_steps += 1;
                if !step_done(&mut report, &mut stalled, announced) {
                    abort(backend, &mut report, AbortReason::Overflow { announced })?;
                    break;
                }
                backend.advance()
            }
            ReplaySignal::Unmerged { paths } => {
                if interactive {
                    report.conflicted_paths = paths;
                    backend.abort()?;
                    report.state = RebaseState::NeedsManualMerge;
                    break;
                }
                report.state = RebaseState::ConflictedRecoverable;
                if stalled >= retry_budget {
                    abort(
                        backend,
                        &mut report,
                        AbortReason::RetryBudget { attempts: stalled },
                    )?;
                    break;
                }
                stalled += 1;
                let resolved = backend.resolve(winning_side(policy))?;
                debug!(?resolved, attempt = stalled, "conflicts resolved by policy");
                report.resolved_paths.extend(resolved);
                report.state = RebaseState::NeedsContinuation;
                backend.continue_step()
            }
            ReplaySignal::Fatal { reason } => {
                report.state = RebaseState::ConflictedFatal;
                abort(backend, &mut report, AbortReason::Fatal { reason })?;
                break;
            }
            ReplaySignal::Complete => {
                backend.finish()?;
                report.state = RebaseState::Succeeded;
                break;
            }
        };
    }

    info!(
        state = ?report.state,
        steps = report.steps,
        empty = report.empty_steps,
        resolved = report.resolved_paths.len(),
        "replay finished"
    );
    Ok(report)
}

/// Count a committed step. Returns false when the step exceeds the
/// announced count.
fn step_done(report: &mut ReplayReport, stalled: &mut u32, announced: usize) -> bool {
    report.steps += 1;
    report.state = RebaseState::Running;
    *stalled = 0;
    report.steps <= announced
}

fn abort(
    backend: &mut dyn ReplayBackend,
    report: &mut ReplayReport,
    reason: AbortReason,
) -> Result<(), PublishError> {
    warn!(?reason, "aborting replay");
    report.abort_reason = Some(reason);
    report.state = RebaseState::Aborted;
    backend.abort()?;
    Ok(())
}

/// A published proposal.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Proposal {
    pub branch: BranchName,
    pub tip: Oid,
    pub tree: Oid,
    /// `None` when there was no destination branch to replay onto.
    pub replay: Option<ReplayReport>,
    /// The proposal's tree equals the destination tip's tree.
    pub up_to_date: bool,
    pub pull_request: Option<PullRequest>,
}

/// Replay stopped for a manual merge. The workspace is kept.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HandOff {
    pub conflicted_paths: Vec<String>,
    /// Commands that finish the migration, to be run in the workspace.
    pub commands: Vec<String>,
}

/// Result of [`publish`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PublishOutcome {
    Published(Proposal),
    ManualHandOff(HandOff),
}

/// Commands that redo the replay by hand in the workspace at `workspace`.
pub fn manual_guidance(config: &MigrationConfig, workspace: &Path) -> Vec<String> {
    let strategy = match config.conflict_policy {
        ConflictPolicy::PreferIncoming => "-X theirs",
        ConflictPolicy::PreferExisting => "-X ours",
        ConflictPolicy::DiffAlign => "-X theirs -X patience -X find-renames",
    };
    vec![
        format!("cd {}", workspace.display()),
        format!(
            "git rebase {strategy} {DESTINATION_REMOTE}/{} {INTEGRATION_BRANCH}",
            config.dest_branch
        ),
        "git add -A && git rebase --continue   # after resolving each conflict".to_string(),
        format!(
            "git push {DESTINATION_REMOTE} {INTEGRATION_BRANCH}:refs/heads/{}",
            manual_branch(&config.source_ref)
        ),
    ]
}

/// Replay the integration branch onto `destination_tip` (when there is one)
/// and publish the proposal.
///
/// `workspace` is only used to build hand-off guidance.
#[instrument(skip_all, fields(dest = %config.dest_branch))]
#[allow(clippy::too_many_arguments)]
pub fn publish(
    git: &Git,
    config: &MigrationConfig,
    integration: &IntegrationOutcome,
    destination_tip: Option<&Oid>,
    creds: &Credentials,
    hosting: Option<&Hosting<'_>>,
    workspace: &Path,
    cancelled: &dyn Fn() -> bool,
) -> Result<PublishOutcome, PublishError> {
    let (tip, replay) = match destination_tip {
        Some(onto) => {
            let report = {
                // Interactive runs hand every conflict to the operator.
                let favor = (!config.interactive).then_some(config.conflict_policy);
                let mut backend = git.start_replay(INTEGRATION_BRANCH, onto, favor)?;
                drive_replay(
                    &mut backend,
                    config.conflict_policy,
                    config.interactive,
                    config.retry_budget,
                    cancelled,
                )?
            };
            match (&report.state, &report.abort_reason) {
                (RebaseState::Succeeded, _) => {}
                (RebaseState::NeedsManualMerge, _) => {
                    return Ok(PublishOutcome::ManualHandOff(HandOff {
                        conflicted_paths: report.conflicted_paths,
                        commands: manual_guidance(config, workspace),
                    }));
                }
                (_, Some(AbortReason::RetryBudget { attempts })) => {
                    return Err(PublishError::RetryBudgetExhausted {
                        attempts: *attempts,
                    });
                }
                (_, Some(AbortReason::Fatal { reason })) => {
                    return Err(PublishError::ReplayFailed {
                        reason: reason.clone(),
                    });
                }
                (_, Some(AbortReason::Overflow { announced })) => {
                    return Err(PublishError::ReplayFailed {
                        reason: format!("replay produced more than the {announced} announced steps"),
                    });
                }
                (state, None) => {
                    return Err(PublishError::ReplayFailed {
                        reason: format!("replay stopped in state {state:?}"),
                    });
                }
            }
            (git.resolve(&format!("refs/heads/{INTEGRATION_BRANCH}"))?, Some(report))
        }
        None => (integration.tip.clone(), None),
    };

    if cancelled() {
        return Err(PublishError::Interrupted);
    }

    let tree = git.tree_of(&tip)?;
    let up_to_date = match destination_tip {
        Some(onto) => git.tree_of(onto)? == tree,
        None => false,
    };
    let branch = proposal_branch(&config.mappings, &config.source_ref, &tree, config.conflict_policy);
    git.set_branch(branch.as_str(), &tip)?;

    let lease = Lease {
        branch: config.dest_branch.clone(),
        expected: destination_tip.cloned(),
    };
    git.push_with_lease(DESTINATION_REMOTE, &branch, &branch, &lease, creds)
        .map_err(|e| match e {
            GitError::LeaseFailed {
                expected, actual, ..
            } => PublishError::DestinationMoved {
                branch: config.dest_branch.to_string(),
                expected,
                actual,
            },
            GitError::PushRejected { message, .. } => PublishError::PushRejected {
                branch: branch.to_string(),
                message,
            },
            other => PublishError::Git(other),
        })?;
    info!(branch = %branch, tip = tip.short(7), up_to_date, "proposal pushed");

    let pull_request = match hosting {
        Some(hosting) if config.open_pr && destination_tip.is_some() && !up_to_date => {
            let request = pr_request(config, &branch, integration);
            let pr = hosting
                .block_on(hosting.forge.create_pr(request))
                .map_err(|source| PublishError::PullRequest {
                    branch: branch.to_string(),
                    source,
                })?;
            info!(number = pr.number, url = %pr.url, "pull request opened");
            Some(pr)
        }
        _ => None,
    };

    Ok(PublishOutcome::Published(Proposal {
        branch,
        tip,
        tree,
        replay,
        up_to_date,
        pull_request,
    }))
}

/// Title and body of the proposal's pull request.
fn pr_request(
    config: &MigrationConfig,
    branch: &BranchName,
    integration: &IntegrationOutcome,
) -> CreatePrRequest {
    let title = match config.mappings.len() {
        1 => format!(
            "Migrate {} from {}",
            config.mappings.first().destination().display_name(),
            config.source_ref
        ),
        n => format!("Migrate {n} paths from {}", config.source_ref),
    };

    let mut body = format!(
        "Migrated from `{}` at `{}` with full history ({} commits).\n\n",
        config.remotes.source, config.source_ref, integration.commit_count
    );
    for mapping in &config.mappings {
        body.push_str(&format!("- `{}` -> `{}`\n", mapping.source(), mapping.destination()));
    }
    body.push_str(&format!("\nConflict policy: {}\n", config.conflict_policy));
    for line in config.reattribution.describe() {
        body.push_str(&format!("Rewrite: {line}\n"));
    }

    CreatePrRequest {
        head: branch.to_string(),
        base: config.dest_branch.to_string(),
        title,
        body: Some(body),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::VecDeque;

    /// Backend replaying a fixed script of signals.
    struct Scripted {
        announced: usize,
        advance: VecDeque<ReplaySignal>,
        continue_with: ReplaySignal,
        log: Vec<&'static str>,
    }

    impl Scripted {
        fn new(announced: usize, advance: Vec<ReplaySignal>, continue_with: ReplaySignal) -> Self {
            Self {
                announced,
                advance: advance.into(),
                continue_with,
                log: Vec::new(),
            }
        }
    }

    impl ReplayBackend for Scripted {
        fn announced_steps(&self) -> usize {
            self.announced
        }
        fn advance(&mut self) -> ReplaySignal {
            self.log.push("advance");
            self.advance.pop_front().unwrap_or(ReplaySignal::Complete)
        }
        fn continue_step(&mut self) -> ReplaySignal {
            self.log.push("continue");
            self.continue_with.clone()
        }
        fn commit_empty(&mut self) -> Result<Oid, GitError> {
            self.log.push("commit_empty");
            Ok(Oid::new("0000000000000000000000000000000000000001").unwrap())
        }
        fn resolve(&mut self, _side: Side) -> Result<Vec<String>, GitError> {
            self.log.push("resolve");
            Ok(vec!["f.txt".to_string()])
        }
        fn abort(&mut self) -> Result<(), GitError> {
            self.log.push("abort");
            Ok(())
        }
        fn finish(&mut self) -> Result<(), GitError> {
            self.log.push("finish");
            Ok(())
        }
    }

    fn applied() -> ReplaySignal {
        ReplaySignal::Applied {
            commit: Oid::new("0000000000000000000000000000000000000002").unwrap(),
        }
    }

    fn unmerged() -> ReplaySignal {
        ReplaySignal::Unmerged {
            paths: vec!["f.txt".to_string()],
        }
    }

    fn never() -> bool {
        false
    }

    fn drive(backend: &mut Scripted, interactive: bool, budget: u32) -> ReplayReport {
        drive_replay(backend, ConflictPolicy::PreferIncoming, interactive, budget, &never).unwrap()
    }

    mod state_machine {
        use super::*;

        #[test]
        fn clean_replay_succeeds() {
            let mut backend = Scripted::new(2, vec![applied(), applied()], applied());
            let report = drive(&mut backend, false, 50);
            assert_eq!(report.state, RebaseState::Succeeded);
            assert_eq!(report.steps, 2);
            assert_eq!(backend.log.last(), Some(&"finish"));
        }

        #[test]
        fn already_applied_commits_empty() {
            let mut backend =
                Scripted::new(2, vec![ReplaySignal::AlreadyApplied, applied()], applied());
            let report = drive(&mut backend, false, 50);
            assert_eq!(report.state, RebaseState::Succeeded);
            assert_eq!(report.empty_steps, 1);
            assert!(backend.log.contains(&"commit_empty"));
        }

        #[test]
        fn conflicts_resolved_by_policy() {
            let mut backend = Scripted::new(1, vec![unmerged()], applied());
            let report = drive(&mut backend, false, 50);
            assert_eq!(report.state, RebaseState::Succeeded);
            assert_eq!(report.resolved_paths, vec!["f.txt".to_string()]);
            assert_eq!(
                backend.log,
                vec!["advance", "resolve", "continue", "advance", "finish"]
            );
        }

        #[test]
        fn resolution_to_nothing_commits_empty() {
            let mut backend = Scripted::new(1, vec![unmerged()], ReplaySignal::AlreadyApplied);
            let report = drive(&mut backend, false, 50);
            assert_eq!(report.state, RebaseState::Succeeded);
            assert_eq!(report.empty_steps, 1);
        }

        #[test]
        fn fatal_aborts() {
            let mut backend = Scripted::new(
                1,
                vec![ReplaySignal::Fatal {
                    reason: "corrupt".to_string(),
                }],
                applied(),
            );
            let report = drive(&mut backend, false, 50);
            assert_eq!(report.state, RebaseState::Aborted);
            assert_eq!(
                report.abort_reason,
                Some(AbortReason::Fatal {
                    reason: "corrupt".to_string()
                })
            );
            assert!(backend.log.contains(&"abort"));
        }

        #[test]
        fn interactive_conflict_hands_off() {
            let mut backend = Scripted::new(1, vec![unmerged()], applied());
            let report = drive(&mut backend, true, 50);
            assert_eq!(report.state, RebaseState::NeedsManualMerge);
            assert_eq!(report.conflicted_paths, vec!["f.txt".to_string()]);
            assert!(!backend.log.contains(&"resolve"));
        }

        #[test]
        fn more_steps_than_announced_is_fatal() {
            let mut backend = Scripted::new(1, vec![applied(), applied()], applied());
            let report = drive(&mut backend, false, 50);
            assert_eq!(report.state, RebaseState::Aborted);
            assert_eq!(report.abort_reason, Some(AbortReason::Overflow { announced: 1 }));
        }

        #[test]
        fn interrupt_aborts() {
            let mut backend = Scripted::new(1, vec![applied()], applied());
            let result = drive_replay(
                &mut backend,
                ConflictPolicy::PreferIncoming,
                false,
                50,
                &|| true,
            );
            assert!(matches!(result, Err(PublishError::Interrupted)));
            assert_eq!(backend.log, vec!["advance", "abort"]);
        }
    }

    mod retry_bound {
        use super::*;

        #[test]
        fn never_progressing_replay_is_aborted() {
            let mut backend = Scripted::new(1, vec![unmerged()], unmerged());
            let report = drive(&mut backend, false, 5);
            assert_eq!(report.state, RebaseState::Aborted);
            assert_eq!(report.abort_reason, Some(AbortReason::RetryBudget { attempts: 5 }));
            let resolves = backend.log.iter().filter(|s| **s == "resolve").count();
            assert_eq!(resolves, 5);
        }

        #[test]
        fn budget_resets_after_progress() {
            let mut backend = Scripted::new(
                3,
                vec![unmerged(), unmerged(), unmerged()],
                applied(),
            );
            let report = drive(&mut backend, false, 1);
            assert_eq!(report.state, RebaseState::Succeeded);
            assert_eq!(report.resolved_paths.len(), 3);
        }
    }

    #[test]
    fn winning_side_follows_policy() {
        assert_eq!(winning_side(ConflictPolicy::PreferIncoming), Side::Incoming);
        assert_eq!(winning_side(ConflictPolicy::DiffAlign), Side::Incoming);
        assert_eq!(winning_side(ConflictPolicy::PreferExisting), Side::Existing);
    }

    #[test]
    fn terminal_states() {
        assert!(RebaseState::Succeeded.is_terminal());
        assert!(RebaseState::NeedsManualMerge.is_terminal());
        assert!(!RebaseState::ConflictedRecoverable.is_terminal());
    }
}
