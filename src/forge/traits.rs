//! forge::traits
//!
//! Forge trait definition for interacting with the destination's hosting
//! service.
//!
//! # Design
//!
//! The `Forge` trait is async because forge operations involve network I/O.
//! A forge instance is bound to one repository, the migration destination.
//! The migration pipeline itself is synchronous and drives these calls to
//! completion on a runtime handle.
//!
//! # Example
//!
//! ```ignore
//! use subgraft::forge::{CreatePrRequest, Forge, ForgeError};
//!
//! async fn propose(forge: &dyn Forge) -> Result<(), ForgeError> {
//!     if forge.branch_exists("main").await? {
//!         let pr = forge.create_pr(CreatePrRequest {
//!             head: "migrate/main-1a2b3c4d".to_string(),
//!             base: "main".to_string(),
//!             title: "Migrate src/lib".to_string(),
//!             body: None,
//!         }).await?;
//!         println!("Opened #{}: {}", pr.number, pr.url);
//!     }
//!     Ok(())
//! }
//! ```

use async_trait::async_trait;
use thiserror::Error;

/// Errors from forge operations.
#[derive(Debug, Clone, Error)]
pub enum ForgeError {
    /// Authentication is required but not available.
    #[error("authentication required")]
    AuthRequired,

    /// Authentication failed (invalid token, expired, insufficient permissions).
    #[error("authentication failed: {0}")]
    AuthFailed(String),

    /// The requested resource was not found.
    #[error("not found: {0}")]
    NotFound(String),

    /// Rate limit exceeded.
    #[error("rate limited")]
    RateLimited,

    /// API returned an error.
    #[error("API error: {status} - {message}")]
    ApiError {
        /// HTTP status code
        status: u16,
        /// Error message from the API
        message: String,
    },

    /// Network or connection error.
    #[error("network error: {0}")]
    NetworkError(String),
}

/// `owner/name` of a hosted repository.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RepoSlug {
    pub owner: String,
    pub name: String,
}

impl RepoSlug {
    pub fn new(owner: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            owner: owner.into(),
            name: name.into(),
        }
    }
}

impl std::fmt::Display for RepoSlug {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.owner, self.name)
    }
}

/// What the authenticated user may do on the repository.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RepoPermissions {
    pub pull: bool,
    pub push: bool,
    pub admin: bool,
}

impl RepoPermissions {
    /// Whether branches can be pushed.
    pub fn can_push(&self) -> bool {
        self.push || self.admin
    }
}

/// Request to create the destination repository.
#[derive(Debug, Clone, Default)]
pub struct CreateRepoRequest {
    pub private: bool,
    pub description: Option<String>,
}

/// Request to create a pull request.
#[derive(Debug, Clone)]
pub struct CreatePrRequest {
    /// Head branch name (the branch with changes)
    pub head: String,
    /// Base branch name (the branch to merge into)
    pub base: String,
    /// PR title
    pub title: String,
    /// PR body/description
    pub body: Option<String>,
}

/// Pull request information returned from the forge.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PullRequest {
    /// PR number
    pub number: u64,
    /// PR URL (web URL for viewing)
    pub url: String,
    /// Head branch name
    pub head: String,
    /// Base branch name
    pub base: String,
}

/// The Forge trait for the destination repository's host.
///
/// # Thread Safety
///
/// Implementations must be `Send + Sync` so they can be shared with the
/// runtime that drives them.
///
/// # Error Handling
///
/// Existence queries return `Ok(false)` / `Ok(None)` for missing resources;
/// `NotFound` is reserved for calls whose target must exist.
#[async_trait]
pub trait Forge: Send + Sync {
    /// Get the forge name (e.g., "github").
    fn name(&self) -> &'static str;

    /// Repository this forge is bound to.
    fn repo(&self) -> &RepoSlug;

    /// Login of the authenticated user.
    ///
    /// # Errors
    ///
    /// - `AuthRequired` if no token is configured
    /// - `AuthFailed` if the token is rejected
    async fn authenticated_user(&self) -> Result<String, ForgeError>;

    /// Permissions on the repository, or `None` if it does not exist (or is
    /// invisible to the user).
    async fn repo_permissions(&self) -> Result<Option<RepoPermissions>, ForgeError>;

    /// Create the repository. Returns its web URL.
    async fn create_repo(&self, request: CreateRepoRequest) -> Result<String, ForgeError>;

    /// Whether `branch` exists on the repository.
    async fn branch_exists(&self, branch: &str) -> Result<bool, ForgeError>;

    /// Whether `team` (a slug) exists in the repository owner's organization.
    async fn team_exists(&self, team: &str) -> Result<bool, ForgeError>;

    /// Open a pull request.
    ///
    /// # Errors
    ///
    /// - `ApiError` with status 422 if validation fails (e.g., head doesn't exist)
    async fn create_pr(&self, request: CreatePrRequest) -> Result<PullRequest, ForgeError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn slug_display() {
        assert_eq!(RepoSlug::new("octo", "cat").to_string(), "octo/cat");
    }

    #[test]
    fn push_or_admin_can_push() {
        assert!(!RepoPermissions::default().can_push());
        assert!(RepoPermissions {
            push: true,
            ..Default::default()
        }
        .can_push());
        assert!(RepoPermissions {
            admin: true,
            ..Default::default()
        }
        .can_push());
    }

    #[test]
    fn forge_error_display() {
        assert_eq!(
            format!("{}", ForgeError::AuthRequired),
            "authentication required"
        );
        assert_eq!(
            format!("{}", ForgeError::NotFound("team core".into())),
            "not found: team core"
        );
        assert_eq!(
            format!(
                "{}",
                ForgeError::ApiError {
                    status: 422,
                    message: "Validation failed".into()
                }
            ),
            "API error: 422 - Validation failed"
        );
    }
}
