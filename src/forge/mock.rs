//! forge::mock
//!
//! Mock forge implementation for deterministic testing.
//!
//! # Design
//!
//! The mock keeps the hosted repository's state in memory: who is logged
//! in, whether the repository exists and with which permissions, its
//! branches, the owner's teams, and every pull request opened. Individual
//! operations can be configured to fail.
//!
//! # Example
//!
//! ```
//! use subgraft::forge::mock::MockForge;
//! use subgraft::forge::{CreatePrRequest, Forge, RepoPermissions};
//!
//! # tokio_test::block_on(async {
//! let forge = MockForge::new("octo", "dest")
//!     .with_permissions(RepoPermissions { pull: true, push: true, admin: false })
//!     .with_branch("main");
//!
//! assert!(forge.branch_exists("main").await.unwrap());
//!
//! let pr = forge.create_pr(CreatePrRequest {
//!     head: "migrate/main-1a2b3c4d".to_string(),
//!     base: "main".to_string(),
//!     title: "Migrate lib".to_string(),
//!     body: None,
//! }).await.unwrap();
//!
//! assert_eq!(pr.number, 1);
//! # });
//! ```

use async_trait::async_trait;
use std::collections::BTreeSet;
use std::sync::{Arc, Mutex};

use super::traits::{
    CreatePrRequest, CreateRepoRequest, Forge, ForgeError, PullRequest, RepoPermissions, RepoSlug,
};

/// Mock forge for testing.
///
/// Thread-safe via internal `Arc<Mutex<...>>` wrapping; clones share state.
#[derive(Debug, Clone)]
pub struct MockForge {
    slug: RepoSlug,
    inner: Arc<Mutex<MockForgeInner>>,
}

#[derive(Debug)]
struct MockForgeInner {
    /// `None` means no token: every call fails with `AuthRequired`.
    user: Option<String>,
    /// `None` means the repository does not exist.
    permissions: Option<RepoPermissions>,
    branches: BTreeSet<String>,
    teams: BTreeSet<String>,
    prs: Vec<PullRequest>,
    fail_on: Option<FailOn>,
    operations: Vec<MockOperation>,
}

/// Configuration for which operation should fail.
#[derive(Debug, Clone)]
pub enum FailOn {
    AuthenticatedUser(ForgeError),
    RepoPermissions(ForgeError),
    CreateRepo(ForgeError),
    BranchExists(ForgeError),
    TeamExists(ForgeError),
    CreatePr(ForgeError),
}

/// Recorded operation for test verification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MockOperation {
    AuthenticatedUser,
    RepoPermissions,
    CreateRepo { private: bool },
    BranchExists { branch: String },
    TeamExists { team: String },
    CreatePr { head: String, base: String, title: String },
}

impl MockForge {
    /// A forge bound to `owner/name`, logged in as `owner`, where the
    /// repository does not exist yet.
    pub fn new(owner: &str, name: &str) -> Self {
        Self {
            slug: RepoSlug::new(owner, name),
            inner: Arc::new(Mutex::new(MockForgeInner {
                user: Some(owner.to_string()),
                permissions: None,
                branches: BTreeSet::new(),
                teams: BTreeSet::new(),
                prs: Vec::new(),
                fail_on: None,
                operations: Vec::new(),
            })),
        }
    }

    /// The repository exists with `permissions`.
    pub fn with_permissions(self, permissions: RepoPermissions) -> Self {
        self.inner.lock().unwrap().permissions = Some(permissions);
        self
    }

    pub fn with_branch(self, branch: &str) -> Self {
        self.inner.lock().unwrap().branches.insert(branch.to_string());
        self
    }

    pub fn with_team(self, team: &str) -> Self {
        self.inner.lock().unwrap().teams.insert(team.to_string());
        self
    }

    /// Drop the login, as if no token were configured.
    pub fn unauthenticated(self) -> Self {
        self.inner.lock().unwrap().user = None;
        self
    }

    /// Configure the mock to fail on a specific operation.
    ///
    /// ```
    /// use subgraft::forge::mock::{FailOn, MockForge};
    /// use subgraft::forge::ForgeError;
    ///
    /// let forge = MockForge::new("octo", "dest")
    ///     .fail_on(FailOn::CreatePr(ForgeError::RateLimited));
    /// ```
    pub fn fail_on(self, fail_on: FailOn) -> Self {
        self.inner.lock().unwrap().fail_on = Some(fail_on);
        self
    }

    /// Get all recorded operations.
    pub fn operations(&self) -> Vec<MockOperation> {
        self.inner.lock().unwrap().operations.clone()
    }

    /// All pull requests opened so far.
    pub fn prs(&self) -> Vec<PullRequest> {
        self.inner.lock().unwrap().prs.clone()
    }

    /// Whether the repository exists (after `create_repo`, for instance).
    pub fn repo_exists(&self) -> bool {
        self.inner.lock().unwrap().permissions.is_some()
    }

    fn record(&self, op: MockOperation) {
        self.inner.lock().unwrap().operations.push(op);
    }

    /// Record `op`, then return the configured failure or the logged-in
    /// user.
    fn enter(&self, op: MockOperation) -> Result<String, ForgeError> {
        self.record(op.clone());
        let inner = self.inner.lock().unwrap();
        let failure = match (&inner.fail_on, &op) {
            (Some(FailOn::AuthenticatedUser(e)), MockOperation::AuthenticatedUser)
            | (Some(FailOn::RepoPermissions(e)), MockOperation::RepoPermissions)
            | (Some(FailOn::CreateRepo(e)), MockOperation::CreateRepo { .. })
            | (Some(FailOn::BranchExists(e)), MockOperation::BranchExists { .. })
            | (Some(FailOn::TeamExists(e)), MockOperation::TeamExists { .. })
            | (Some(FailOn::CreatePr(e)), MockOperation::CreatePr { .. }) => Some(e.clone()),
            _ => None,
        };
        if let Some(e) = failure {
            return Err(e);
        }
        inner.user.clone().ok_or(ForgeError::AuthRequired)
    }
}

#[async_trait]
impl Forge for MockForge {
    fn name(&self) -> &'static str {
        "mock"
    }

    fn repo(&self) -> &RepoSlug {
        &self.slug
    }

    async fn authenticated_user(&self) -> Result<String, ForgeError> {
        self.enter(MockOperation::AuthenticatedUser)
    }

    async fn repo_permissions(&self) -> Result<Option<RepoPermissions>, ForgeError> {
        self.enter(MockOperation::RepoPermissions)?;
        Ok(self.inner.lock().unwrap().permissions)
    }

    async fn create_repo(&self, request: CreateRepoRequest) -> Result<String, ForgeError> {
        self.enter(MockOperation::CreateRepo {
            private: request.private,
        })?;
        let mut inner = self.inner.lock().unwrap();
        if inner.permissions.is_some() {
            return Err(ForgeError::ApiError {
                status: 422,
                message: "name already exists on this account".to_string(),
            });
        }
        inner.permissions = Some(RepoPermissions {
            pull: true,
            push: true,
            admin: true,
        });
        Ok(format!("https://github.com/{}", self.slug))
    }

    async fn branch_exists(&self, branch: &str) -> Result<bool, ForgeError> {
        self.enter(MockOperation::BranchExists {
            branch: branch.to_string(),
        })?;
        Ok(self.inner.lock().unwrap().branches.contains(branch))
    }

    async fn team_exists(&self, team: &str) -> Result<bool, ForgeError> {
        self.enter(MockOperation::TeamExists {
            team: team.to_string(),
        })?;
        Ok(self.inner.lock().unwrap().teams.contains(team))
    }

    async fn create_pr(&self, request: CreatePrRequest) -> Result<PullRequest, ForgeError> {
        self.enter(MockOperation::CreatePr {
            head: request.head.clone(),
            base: request.base.clone(),
            title: request.title.clone(),
        })?;

        let mut inner = self.inner.lock().unwrap();
        if !inner.branches.contains(&request.base) {
            return Err(ForgeError::ApiError {
                status: 422,
                message: format!("base {} does not exist", request.base),
            });
        }
        let number = inner.prs.len() as u64 + 1;
        let pr = PullRequest {
            number,
            url: format!("https://github.com/{}/pull/{}", self.slug, number),
            head: request.head,
            base: request.base,
        };
        inner.prs.push(pr.clone());
        Ok(pr)
    }
}
