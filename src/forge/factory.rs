//! forge::factory
//!
//! Forge selection and creation.
//!
//! # Provider Detection
//!
//! The destination remote URL decides the forge:
//! - GitHub URLs (`github.com`) → `GitHubForge` on the configured API base
//! - Any other `host/owner/name` URL → `GitHubForge` only when a non-default
//!   API base (GitHub Enterprise) is configured
//! - Local paths and `file://` URLs → no forge
//!
//! # Example
//!
//! ```ignore
//! use subgraft::forge::create_forge;
//!
//! let forge = create_forge("git@github.com:owner/repo.git", Some(token), DEFAULT_API_BASE);
//! ```

use super::github::{parse_github_url, GitHubForge};
use super::traits::Forge;
use crate::core::config::DEFAULT_API_BASE;

/// Supported forge providers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ForgeProvider {
    GitHub,
    /// GitHub Enterprise at a custom API base.
    GitHubEnterprise,
}

impl ForgeProvider {
    pub fn name(&self) -> &'static str {
        match self {
            ForgeProvider::GitHub => "github",
            ForgeProvider::GitHubEnterprise => "github-enterprise",
        }
    }
}

impl std::fmt::Display for ForgeProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name())
    }
}

/// Detect the provider of `remote_url`.
///
/// # Example
///
/// ```
/// use subgraft::forge::{detect_provider, ForgeProvider};
///
/// assert_eq!(
///     detect_provider("git@github.com:owner/repo.git", "https://api.github.com"),
///     Some(ForgeProvider::GitHub)
/// );
/// assert_eq!(detect_provider("/srv/git/repo.git", "https://api.github.com"), None);
/// ```
pub fn detect_provider(remote_url: &str, api_base: &str) -> Option<ForgeProvider> {
    if parse_github_url(remote_url).is_some() {
        return Some(ForgeProvider::GitHub);
    }
    if api_base.trim_end_matches('/') != DEFAULT_API_BASE && parse_hosted_url(remote_url).is_some()
    {
        return Some(ForgeProvider::GitHubEnterprise);
    }
    None
}

/// Create the forge for the destination remote, or `None` when the
/// destination is not hosted on a known forge.
pub fn create_forge(
    remote_url: &str,
    token: Option<String>,
    api_base: &str,
) -> Option<Box<dyn Forge>> {
    let (owner, name) = match detect_provider(remote_url, api_base)? {
        ForgeProvider::GitHub => parse_github_url(remote_url)?,
        ForgeProvider::GitHubEnterprise => parse_hosted_url(remote_url)?,
    };
    let forge = GitHubForge::new(token, super::RepoSlug::new(owner, name)).with_api_base(api_base);
    Some(Box::new(forge))
}

/// Parse `host/owner/name` out of an ssh (`git@host:o/n`) or http(s) URL.
fn parse_hosted_url(url: &str) -> Option<(String, String)> {
    let rest = if let Some(rest) = url
        .strip_prefix("https://")
        .or_else(|| url.strip_prefix("http://"))
        .or_else(|| url.strip_prefix("ssh://"))
    {
        let rest = rest.split_once('@').map_or(rest, |(_, r)| r);
        rest.split_once('/')?.1
    } else {
        let (user_host, path) = url.split_once(':')?;
        if !user_host.contains('@') {
            return None;
        }
        path
    };

    let rest = rest.trim_end_matches('/');
    let rest = rest.strip_suffix(".git").unwrap_or(rest);
    let (owner, name) = rest.split_once('/')?;
    if owner.is_empty() || name.is_empty() || name.contains('/') {
        return None;
    }
    Some((owner.to_string(), name.to_string()))
}
