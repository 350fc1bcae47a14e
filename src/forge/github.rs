//! forge::github
//!
//! GitHub forge implementation using the REST API.
//!
//! # Authentication
//!
//! A static token (personal access token or installation token) is sent as
//! a bearer token. Calls made without one fail with
//! [`ForgeError::AuthRequired`] before touching the network.
//!
//! # Rate Limiting
//!
//! Rate limit responses map to [`ForgeError::RateLimited`]; there is no
//! automatic retry.
//!
//! # Example
//!
//! ```ignore
//! use subgraft::forge::github::GitHubForge;
//! use subgraft::forge::Forge;
//!
//! let forge = GitHubForge::from_remote_url("git@github.com:octo/dest.git", Some(token))
//!     .expect("github url");
//! let perms = forge.repo_permissions().await?;
//! ```

use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, AUTHORIZATION, USER_AGENT};
use reqwest::{Client, Response, StatusCode};
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::traits::{
    CreatePrRequest, CreateRepoRequest, Forge, ForgeError, PullRequest, RepoPermissions, RepoSlug,
};
use crate::core::config::DEFAULT_API_BASE;

/// User-Agent header value for API requests.
const USER_AGENT_VALUE: &str = "subgraft";

/// GitHub forge bound to one repository.
pub struct GitHubForge {
    /// HTTP client for making requests
    client: Client,
    token: Option<String>,
    slug: RepoSlug,
    /// API base URL (configurable for GitHub Enterprise)
    api_base: String,
}

// Custom Debug to avoid exposing the token
impl std::fmt::Debug for GitHubForge {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GitHubForge")
            .field("has_token", &self.token.is_some())
            .field("slug", &self.slug)
            .field("api_base", &self.api_base)
            .finish()
    }
}

impl GitHubForge {
    /// Create a forge for `slug` on the public API.
    pub fn new(token: Option<String>, slug: RepoSlug) -> Self {
        Self {
            client: Client::new(),
            token,
            slug,
            api_base: DEFAULT_API_BASE.to_string(),
        }
    }

    /// Use a different API base (GitHub Enterprise, or a test server).
    pub fn with_api_base(mut self, api_base: impl Into<String>) -> Self {
        self.api_base = api_base.into().trim_end_matches('/').to_string();
        self
    }

    /// Create a forge from a GitHub remote URL.
    ///
    /// Returns `None` if the URL is not a GitHub URL.
    pub fn from_remote_url(url: &str, token: Option<String>) -> Option<Self> {
        let (owner, name) = parse_github_url(url)?;
        Some(Self::new(token, RepoSlug::new(owner, name)))
    }

    fn headers(&self) -> Result<HeaderMap, ForgeError> {
        let token = self.token.as_deref().ok_or(ForgeError::AuthRequired)?;
        let mut headers = HeaderMap::new();
        headers.insert(
            AUTHORIZATION,
            HeaderValue::from_str(&format!("Bearer {}", token))
                .map_err(|_| ForgeError::AuthFailed("token contains invalid characters".into()))?,
        );
        headers.insert(
            ACCEPT,
            HeaderValue::from_static("application/vnd.github+json"),
        );
        headers.insert(USER_AGENT, HeaderValue::from_static(USER_AGENT_VALUE));
        headers.insert(
            "X-GitHub-Api-Version",
            HeaderValue::from_static("2022-11-28"),
        );
        Ok(headers)
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.api_base, path.trim_start_matches('/'))
    }

    fn repo_url(&self, path: &str) -> String {
        let base = format!("repos/{}/{}", self.slug.owner, self.slug.name);
        if path.is_empty() {
            self.url(&base)
        } else {
            self.url(&format!("{base}/{path}"))
        }
    }

    async fn get(&self, url: &str) -> Result<Response, ForgeError> {
        self.client
            .get(url)
            .headers(self.headers()?)
            .send()
            .await
            .map_err(|e| ForgeError::NetworkError(e.to_string()))
    }

    /// `true` for 2xx, `false` for 404, error otherwise.
    async fn exists(&self, url: &str) -> Result<bool, ForgeError> {
        let response = self.get(url).await?;
        let status = response.status();
        debug!(url, status = status.as_u16(), "existence check");
        if status.is_success() {
            Ok(true)
        } else if status == StatusCode::NOT_FOUND {
            Ok(false)
        } else {
            self.handle_error_response(response, status).await
        }
    }

    async fn handle_response<T: for<'de> Deserialize<'de>>(
        &self,
        response: Response,
    ) -> Result<T, ForgeError> {
        let status = response.status();

        if status.is_success() {
            response.json().await.map_err(|e| ForgeError::ApiError {
                status: status.as_u16(),
                message: format!("Failed to parse response: {}", e),
            })
        } else {
            self.handle_error_response(response, status).await
        }
    }

    /// Handle an error response from the API.
    async fn handle_error_response<T>(
        &self,
        response: Response,
        status: StatusCode,
    ) -> Result<T, ForgeError> {
        let rate_limited = response
            .headers()
            .get("X-RateLimit-Remaining")
            .and_then(|v| v.to_str().ok())
            == Some("0");

        let message = match response.json::<GitHubErrorResponse>().await {
            Ok(err) => err.message,
            Err(_) => "Unknown error".to_string(),
        };

        Err(match status {
            StatusCode::UNAUTHORIZED => ForgeError::AuthFailed("Invalid or expired token".into()),
            StatusCode::FORBIDDEN if rate_limited => ForgeError::RateLimited,
            StatusCode::FORBIDDEN => ForgeError::AuthFailed(format!("Permission denied: {}", message)),
            StatusCode::NOT_FOUND => ForgeError::NotFound(message),
            StatusCode::TOO_MANY_REQUESTS => ForgeError::RateLimited,
            _ if status.is_server_error() => ForgeError::ApiError {
                status: status.as_u16(),
                message: format!("GitHub server error: {}", message),
            },
            _ => ForgeError::ApiError {
                status: status.as_u16(),
                message,
            },
        })
    }
}

#[async_trait]
impl Forge for GitHubForge {
    fn name(&self) -> &'static str {
        "github"
    }

    fn repo(&self) -> &RepoSlug {
        &self.slug
    }

    async fn authenticated_user(&self) -> Result<String, ForgeError> {
        let response = self.get(&self.url("user")).await?;
        let user: GitHubUser = self.handle_response(response).await?;
        Ok(user.login)
    }

    async fn repo_permissions(&self) -> Result<Option<RepoPermissions>, ForgeError> {
        let response = self.get(&self.repo_url("")).await?;
        if response.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        let repo: GitHubRepo = self.handle_response(response).await?;
        let perms = repo.permissions.unwrap_or_default();
        Ok(Some(RepoPermissions {
            pull: perms.pull,
            push: perms.push,
            admin: perms.admin,
        }))
    }

    async fn create_repo(&self, request: CreateRepoRequest) -> Result<String, ForgeError> {
        let login = self.authenticated_user().await?;
        let url = if login.eq_ignore_ascii_case(&self.slug.owner) {
            self.url("user/repos")
        } else {
            self.url(&format!("orgs/{}/repos", self.slug.owner))
        };

        let body = CreateRepoBody {
            name: &self.slug.name,
            private: request.private,
            description: request.description.as_deref(),
        };
        let response = self
            .client
            .post(&url)
            .headers(self.headers()?)
            .json(&body)
            .send()
            .await
            .map_err(|e| ForgeError::NetworkError(e.to_string()))?;

        let repo: GitHubRepo = self.handle_response(response).await?;
        Ok(repo.html_url)
    }

    async fn branch_exists(&self, branch: &str) -> Result<bool, ForgeError> {
        self.exists(&self.repo_url(&format!("branches/{branch}")))
            .await
    }

    async fn team_exists(&self, team: &str) -> Result<bool, ForgeError> {
        self.exists(&self.url(&format!("orgs/{}/teams/{}", self.slug.owner, team)))
            .await
    }

    async fn create_pr(&self, request: CreatePrRequest) -> Result<PullRequest, ForgeError> {
        let body = CreatePrBody {
            head: &request.head,
            base: &request.base,
            title: &request.title,
            body: request.body.as_deref(),
        };

        let response = self
            .client
            .post(self.repo_url("pulls"))
            .headers(self.headers()?)
            .json(&body)
            .send()
            .await
            .map_err(|e| ForgeError::NetworkError(e.to_string()))?;

        let pr: GitHubPullRequest = self.handle_response(response).await?;
        Ok(pr.into())
    }
}

// =============================================================================
// GitHub API types
// =============================================================================

#[derive(Debug, Deserialize)]
struct GitHubErrorResponse {
    message: String,
}

#[derive(Debug, Deserialize)]
struct GitHubUser {
    login: String,
}

#[derive(Debug, Deserialize)]
struct GitHubRepo {
    html_url: String,
    #[serde(default)]
    permissions: Option<GitHubPermissions>,
}

#[derive(Debug, Default, Deserialize)]
struct GitHubPermissions {
    #[serde(default)]
    admin: bool,
    #[serde(default)]
    push: bool,
    #[serde(default)]
    pull: bool,
}

#[derive(Debug, Serialize)]
struct CreateRepoBody<'a> {
    name: &'a str,
    private: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    description: Option<&'a str>,
}

#[derive(Debug, Serialize)]
struct CreatePrBody<'a> {
    head: &'a str,
    base: &'a str,
    title: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    body: Option<&'a str>,
}

#[derive(Debug, Deserialize)]
struct GitHubPullRequest {
    number: u64,
    html_url: String,
    head: GitHubRef,
    base: GitHubRef,
}

#[derive(Debug, Deserialize)]
struct GitHubRef {
    #[serde(rename = "ref")]
    ref_name: String,
}

impl From<GitHubPullRequest> for PullRequest {
    fn from(pr: GitHubPullRequest) -> Self {
        PullRequest {
            number: pr.number,
            url: pr.html_url,
            head: pr.head.ref_name,
            base: pr.base.ref_name,
        }
    }
}

/// Parse a GitHub remote URL into (owner, repo).
///
/// # Example
///
/// ```
/// use subgraft::forge::github::parse_github_url;
///
/// let (owner, repo) = parse_github_url("git@github.com:octocat/hello-world.git").unwrap();
/// assert_eq!(owner, "octocat");
/// assert_eq!(repo, "hello-world");
/// ```
pub fn parse_github_url(url: &str) -> Option<(String, String)> {
    let rest = url
        .strip_prefix("git@github.com:")
        .or_else(|| url.strip_prefix("ssh://git@github.com/"))
        .or_else(|| url.strip_prefix("https://github.com/"))
        .or_else(|| url.strip_prefix("http://github.com/"))?;

    let rest = rest.trim_end_matches('/');
    let rest = rest.strip_suffix(".git").unwrap_or(rest);
    let (owner, repo) = rest.split_once('/')?;
    if owner.is_empty() || repo.is_empty() || repo.contains('/') {
        return None;
    }
    Some((owner.to_string(), repo.to_string()))
}
