//! engine::preflight
//!
//! Read-only checks run once, after mapping resolution and before anything
//! is mutated.
//!
//! Every check runs, even after a failure, so the operator sees all
//! problems at once. Checks have stable ids that can be referenced in
//! output and tests.
//!
//! # Example
//!
//! ```
//! use subgraft::engine::preflight::{Check, CheckStatus, PreflightReport};
//!
//! let report = PreflightReport::new(vec![
//!     Check::pass("vcs-backend", "libgit2 1.9.0"),
//!     Check::fail("destination-branch", "branch 'main' not found"),
//! ]);
//! assert!(report.has_failures());
//! assert_eq!(report.failures().count(), 1);
//! ```

use tracing::{debug, instrument};

use super::Hosting;
use crate::core::config::MigrationConfig;
use crate::git::{find_branch, Credentials, Git, RemoteRef};

/// Outcome of one check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CheckStatus {
    Pass,
    /// Passes, with a caveat the operator should see.
    Warn,
    /// Blocks the run.
    Fail,
}

impl std::fmt::Display for CheckStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CheckStatus::Pass => write!(f, "ok"),
            CheckStatus::Warn => write!(f, "warning"),
            CheckStatus::Fail => write!(f, "error"),
        }
    }
}

/// One preflight check result.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Check {
    pub id: &'static str,
    pub status: CheckStatus,
    pub message: String,
}

impl Check {
    pub fn pass(id: &'static str, message: impl Into<String>) -> Self {
        Self::new(id, CheckStatus::Pass, message)
    }

    pub fn warn(id: &'static str, message: impl Into<String>) -> Self {
        Self::new(id, CheckStatus::Warn, message)
    }

    pub fn fail(id: &'static str, message: impl Into<String>) -> Self {
        Self::new(id, CheckStatus::Fail, message)
    }

    fn new(id: &'static str, status: CheckStatus, message: impl Into<String>) -> Self {
        Self {
            id,
            status,
            message: message.into(),
        }
    }
}

impl std::fmt::Display for Check {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[{}] {}: {}", self.status, self.id, self.message)
    }
}

/// All preflight results, in check order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PreflightReport {
    checks: Vec<Check>,
}

impl PreflightReport {
    pub fn new(checks: Vec<Check>) -> Self {
        Self { checks }
    }

    pub fn checks(&self) -> &[Check] {
        &self.checks
    }

    pub fn get(&self, id: &str) -> Option<&Check> {
        self.checks.iter().find(|c| c.id == id)
    }

    pub fn has_failures(&self) -> bool {
        self.failures().next().is_some()
    }

    pub fn failures(&self) -> impl Iterator<Item = &Check> {
        self.checks.iter().filter(|c| c.status == CheckStatus::Fail)
    }

    pub fn warnings(&self) -> impl Iterator<Item = &Check> {
        self.checks.iter().filter(|c| c.status == CheckStatus::Warn)
    }
}

impl std::fmt::Display for PreflightReport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        for check in &self.checks {
            writeln!(f, "{check}")?;
        }
        Ok(())
    }
}

/// What preflight learned about the destination.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DestinationState {
    /// The repository exists (or is reachable, without a forge).
    pub exists: bool,
    /// The destination branch exists.
    pub branch_exists: bool,
    /// The repository is missing and will be created.
    pub will_create: bool,
}

/// Run every check. Never mutates anything.
#[instrument(skip_all)]
pub fn run(
    config: &MigrationConfig,
    creds: &Credentials,
    hosting: Option<&Hosting<'_>>,
) -> (PreflightReport, DestinationState) {
    let mut checks = vec![Check::pass("vcs-backend", Git::backend_version())];

    let authenticated = if config.needs_hosting() {
        let check = hosting_auth(config, hosting);
        let ok = check.status == CheckStatus::Pass;
        checks.push(check);
        ok
    } else {
        // Permission checks still use the forge when its token works.
        hosting.is_some_and(|h| h.block_on(h.forge.authenticated_user()).is_ok())
    };

    checks.push(source_reachable(config, creds));

    let destination_refs = Git::ls_remote(&config.remotes.destination, creds);
    let (check, mut state) = destination_writable(
        config,
        hosting.filter(|_| authenticated),
        destination_refs.as_ref().ok(),
        destination_refs.as_ref().err().map(|e| e.to_string()),
    );
    checks.push(check);

    let check = destination_branch(
        config,
        &mut state,
        hosting.filter(|_| authenticated),
        destination_refs.as_ref().ok(),
    );
    checks.push(check);

    if let Some(team) = &config.access_group {
        checks.push(access_group(team, hosting.filter(|_| authenticated)));
    }

    let report = PreflightReport::new(checks);
    debug!(failures = report.failures().count(), "preflight complete");
    (report, state)
}

fn hosting_auth(config: &MigrationConfig, hosting: Option<&Hosting<'_>>) -> Check {
    const ID: &str = "hosting-auth";
    let Some(hosting) = hosting else {
        if config.create_destination || config.access_group.is_some() {
            return Check::fail(ID, "destination is not hosted on a supported forge");
        }
        return Check::warn(
            ID,
            "destination is not hosted on a supported forge; no pull request will be opened",
        );
    };
    match hosting.block_on(hosting.forge.authenticated_user()) {
        Ok(login) => Check::pass(ID, format!("authenticated to {} as {login}", hosting.forge.name())),
        Err(e) => Check::fail(ID, format!("{} authentication failed: {e}", hosting.forge.name())),
    }
}

fn source_reachable(config: &MigrationConfig, creds: &Credentials) -> Check {
    const ID: &str = "source-reachable";
    let refs = match Git::ls_remote(&config.remotes.source, creds) {
        Ok(refs) => refs,
        Err(e) => return Check::fail(ID, format!("cannot list source refs: {e}")),
    };
    if refs.is_empty() {
        return Check::fail(ID, "source repository has no refs");
    }
    if source_ref_known(&refs, &config.source_ref) {
        Check::pass(ID, format!("'{}' found", config.source_ref))
    } else {
        Check::fail(ID, format!("source ref '{}' not found", config.source_ref))
    }
}

/// Whether `source_ref` names an advertised ref. Commit ids and revision
/// expressions can't be checked remotely and are accepted.
fn source_ref_known(refs: &[RemoteRef], source_ref: &str) -> bool {
    let is_revision = source_ref == "HEAD"
        || source_ref.contains(['~', '^', '@', ':'])
        || (source_ref.len() >= 7 && source_ref.chars().all(|c| c.is_ascii_hexdigit()));
    if is_revision {
        return true;
    }
    let candidates = [
        source_ref.to_string(),
        format!("refs/heads/{source_ref}"),
        format!("refs/tags/{source_ref}"),
    ];
    refs.iter().any(|r| candidates.contains(&r.name))
}

fn destination_writable(
    config: &MigrationConfig,
    hosting: Option<&Hosting<'_>>,
    refs: Option<&Vec<RemoteRef>>,
    unreachable: Option<String>,
) -> (Check, DestinationState) {
    const ID: &str = "destination-writable";
    let mut state = DestinationState::default();

    let Some(hosting) = hosting else {
        return match unreachable {
            None => {
                state.exists = refs.is_some();
                (
                    Check::warn(ID, "destination reachable; push permission cannot be verified"),
                    state,
                )
            }
            Some(e) => (Check::fail(ID, format!("destination unreachable: {e}")), state),
        };
    };

    match hosting.block_on(hosting.forge.repo_permissions()) {
        Ok(Some(perms)) if perms.can_push() => {
            state.exists = true;
            (Check::pass(ID, format!("push access to {}", hosting.forge.repo())), state)
        }
        Ok(Some(_)) => {
            state.exists = true;
            (
                Check::fail(ID, format!("no push access to {}", hosting.forge.repo())),
                state,
            )
        }
        Ok(None) if config.create_destination => {
            state.will_create = true;
            (
                Check::pass(ID, format!("{} will be created", hosting.forge.repo())),
                state,
            )
        }
        Ok(None) => (
            Check::fail(
                ID,
                format!(
                    "{} does not exist (pass --create-destination to create it)",
                    hosting.forge.repo()
                ),
            ),
            state,
        ),
        Err(e) => (Check::fail(ID, format!("cannot read permissions: {e}")), state),
    }
}

/// Looks the branch up through the forge when it can answer, else in the
/// ls-remote listing.
fn destination_branch(
    config: &MigrationConfig,
    state: &mut DestinationState,
    hosting: Option<&Hosting<'_>>,
    refs: Option<&Vec<RemoteRef>>,
) -> Check {
    const ID: &str = "destination-branch";
    let branch = &config.dest_branch;
    if state.will_create {
        return Check::pass(ID, format!("'{branch}' will be proposed to the new repository"));
    }

    let found = match (hosting.filter(|_| state.exists), refs) {
        (Some(hosting), _) => match hosting.block_on(hosting.forge.branch_exists(branch.as_str())) {
            Ok(found) => found,
            Err(e) => return Check::fail(ID, format!("cannot look up branch '{branch}': {e}")),
        },
        (None, Some(refs)) => find_branch(refs, branch).is_some(),
        (None, None) => {
            return Check::fail(ID, "destination is unreachable; branch cannot be checked")
        }
    };

    state.branch_exists = found;
    if found {
        Check::pass(ID, format!("'{branch}' exists"))
    } else {
        Check::fail(ID, format!("branch '{branch}' not found on the destination"))
    }
}

fn access_group(team: &str, hosting: Option<&Hosting<'_>>) -> Check {
    const ID: &str = "access-group";
    let Some(hosting) = hosting else {
        return Check::fail(ID, format!("team '{team}' cannot be verified without the hosting API"));
    };
    match hosting.block_on(hosting.forge.team_exists(team)) {
        Ok(true) => Check::pass(ID, format!("team '{team}' exists")),
        Ok(false) => Check::fail(ID, format!("team '{team}' not found in {}", hosting.forge.repo().owner)),
        Err(e) => Check::fail(ID, format!("cannot look up team '{team}': {e}")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::types::Oid;

    fn remote_ref(name: &str) -> RemoteRef {
        RemoteRef {
            name: name.to_string(),
            oid: Oid::new("0000000000000000000000000000000000000001").unwrap(),
        }
    }

    mod report {
        use super::*;

        #[test]
        fn failures_and_warnings() {
            let report = PreflightReport::new(vec![
                Check::pass("a", "fine"),
                Check::warn("b", "hmm"),
                Check::fail("c", "broken"),
            ]);
            assert!(report.has_failures());
            assert_eq!(report.warnings().count(), 1);
            assert_eq!(report.get("c").unwrap().message, "broken");
        }

        #[test]
        fn display_lists_every_check() {
            let report = PreflightReport::new(vec![
                Check::pass("vcs-backend", "libgit2"),
                Check::fail("destination-branch", "missing"),
            ]);
            let shown = report.to_string();
            assert!(shown.contains("[ok] vcs-backend: libgit2"));
            assert!(shown.contains("[error] destination-branch: missing"));
        }
    }

    mod source_ref {
        use super::*;

        #[test]
        fn branches_and_tags() {
            let refs = vec![remote_ref("refs/heads/main"), remote_ref("refs/tags/v1.0")];
            assert!(source_ref_known(&refs, "main"));
            assert!(source_ref_known(&refs, "v1.0"));
            assert!(source_ref_known(&refs, "refs/heads/main"));
            assert!(!source_ref_known(&refs, "develop"));
        }

        #[test]
        fn revisions_are_accepted() {
            let refs = vec![remote_ref("refs/heads/main")];
            assert!(source_ref_known(&refs, "HEAD"));
            assert!(source_ref_known(&refs, "main~2"));
            assert!(source_ref_known(&refs, "1a2b3c4d"));
        }
    }

    mod destination_branch {
        use super::*;
        use crate::core::config::Remotes;
        use crate::core::mapping::MappingSet;
        use crate::core::types::BranchName;
        use crate::forge::mock::{FailOn, MockForge, MockOperation};
        use crate::forge::ForgeError;

        fn config() -> MigrationConfig {
            MigrationConfig::new(
                Remotes {
                    source: "src".to_string(),
                    destination: "https://github.com/octo/dest".to_string(),
                },
                MappingSet::from_raw(["a:b"]).unwrap(),
                BranchName::new("main").unwrap(),
            )
        }

        fn existing() -> DestinationState {
            DestinationState {
                exists: true,
                ..DestinationState::default()
            }
        }

        #[test]
        fn asks_the_forge_when_it_can() {
            let runtime = tokio::runtime::Runtime::new().unwrap();
            let forge = MockForge::new("octo", "dest").with_branch("main");
            let hosting = Hosting::new(&forge, runtime.handle());
            let mut state = existing();

            // The listing disagrees; the forge's answer wins.
            let refs = vec![remote_ref("refs/heads/develop")];
            let check = destination_branch(&config(), &mut state, Some(&hosting), Some(&refs));
            assert_eq!(check.status, CheckStatus::Pass);
            assert!(state.branch_exists);
            assert_eq!(
                forge.operations(),
                vec![MockOperation::BranchExists {
                    branch: "main".to_string()
                }]
            );
        }

        #[test]
        fn forge_errors_fail_the_check() {
            let runtime = tokio::runtime::Runtime::new().unwrap();
            let forge = MockForge::new("octo", "dest")
                .with_branch("main")
                .fail_on(FailOn::BranchExists(ForgeError::RateLimited));
            let hosting = Hosting::new(&forge, runtime.handle());
            let mut state = existing();

            let check = destination_branch(&config(), &mut state, Some(&hosting), None);
            assert_eq!(check.status, CheckStatus::Fail);
            assert!(!state.branch_exists);
        }

        #[test]
        fn falls_back_to_the_listing() {
            let mut state = existing();
            let refs = vec![remote_ref("refs/heads/main")];
            let check = destination_branch(&config(), &mut state, None, Some(&refs));
            assert_eq!(check.status, CheckStatus::Pass);
            assert!(state.branch_exists);

            let mut state = existing();
            let check = destination_branch(&config(), &mut state, None, None);
            assert_eq!(check.status, CheckStatus::Fail);
        }

        #[test]
        fn new_repository_skips_the_lookup() {
            let mut state = DestinationState {
                will_create: true,
                ..DestinationState::default()
            };
            let check = destination_branch(&config(), &mut state, None, None);
            assert_eq!(check.status, CheckStatus::Pass);
            assert!(!state.branch_exists);
        }
    }
}
