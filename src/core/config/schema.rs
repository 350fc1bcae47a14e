//! core::config::schema
//!
//! Configuration file schema.
//!
//! # Location
//!
//! Searched in order:
//! 1. `$SUBGRAFT_CONFIG` if set
//! 2. `$XDG_CONFIG_HOME/subgraft/config.toml`
//! 3. `~/.subgraft/config.toml`
//!
//! # Validation
//!
//! Values are validated after parsing; unknown keys are rejected.

use serde::{Deserialize, Serialize};

use super::ConfigError;
use crate::core::identity::CoAuthorPolicy;
use crate::core::policy::ConflictPolicy;

/// Default budget of replay continuation attempts without progress.
pub const DEFAULT_RETRY_BUDGET: u32 = 50;

/// Default GitHub REST API base.
pub const DEFAULT_API_BASE: &str = "https://api.github.com";

/// User-level defaults.
///
/// # Example
///
/// ```toml
/// conflict_policy = "prefer-existing"
/// coauthors = "remove-assistant-only"
/// retry_budget = 50
///
/// [github]
/// api_base = "https://github.example.com/api/v3"
/// token_env = "MY_GH_TOKEN"
/// open_pr = true
/// ```
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct FileConfig {
    /// Default conflict policy for the replay
    pub conflict_policy: Option<ConflictPolicy>,

    /// Default co-author trailer handling
    pub coauthors: Option<CoAuthorPolicy>,

    /// Continuation attempts allowed without progress
    pub retry_budget: Option<u32>,

    /// Keep the workspace after every run
    pub keep_workspace: Option<bool>,

    /// Hosting settings
    pub github: Option<GitHubSection>,
}

impl FileConfig {
    /// Validate the configuration values.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::InvalidValue` if any value is invalid.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.retry_budget == Some(0) {
            return Err(ConfigError::InvalidValue(
                "retry_budget must be at least 1".to_string(),
            ));
        }
        if let Some(github) = &self.github {
            github.validate()?;
        }
        Ok(())
    }
}

/// `[github]` section.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct GitHubSection {
    /// REST API base URL (GitHub Enterprise)
    pub api_base: Option<String>,

    /// Environment variable checked first for the token
    pub token_env: Option<String>,

    /// Open a pull request after pushing
    pub open_pr: Option<bool>,
}

impl GitHubSection {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if let Some(base) = &self.api_base {
            if !(base.starts_with("https://") || base.starts_with("http://")) {
                return Err(ConfigError::InvalidValue(format!(
                    "github.api_base '{base}' must be an http(s) URL"
                )));
            }
        }
        if let Some(var) = &self.token_env {
            if var.is_empty() || var.contains('=') {
                return Err(ConfigError::InvalidValue(format!(
                    "github.token_env '{var}' is not a valid variable name"
                )));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    mod file_config {
        use super::*;

        #[test]
        fn defaults() {
            let config = FileConfig::default();
            assert!(config.conflict_policy.is_none());
            assert!(config.retry_budget.is_none());
            assert!(config.validate().is_ok());
        }

        #[test]
        fn parses_policies() {
            let config: FileConfig = toml::from_str(
                r#"
                conflict_policy = "diff-align"
                coauthors = "remove-all"
                "#,
            )
            .unwrap();
            assert_eq!(config.conflict_policy, Some(ConflictPolicy::DiffAlign));
            assert_eq!(config.coauthors, Some(CoAuthorPolicy::RemoveAll));
        }

        #[test]
        fn zero_budget_rejected() {
            let config = FileConfig {
                retry_budget: Some(0),
                ..Default::default()
            };
            assert!(config.validate().is_err());
        }

        #[test]
        fn unknown_policy_rejected() {
            let result: Result<FileConfig, _> = toml::from_str("conflict_policy = \"merge\"");
            assert!(result.is_err());
        }

        #[test]
        fn reject_unknown_fields() {
            let result: Result<FileConfig, _> = toml::from_str("trunk = \"main\"");
            assert!(result.is_err());
        }

        #[test]
        fn roundtrip() {
            let config = FileConfig {
                conflict_policy: Some(ConflictPolicy::PreferExisting),
                coauthors: Some(CoAuthorPolicy::RemoveAssistantOnly),
                retry_budget: Some(10),
                keep_workspace: Some(false),
                github: Some(GitHubSection {
                    api_base: Some("https://ghe.example.com/api/v3".to_string()),
                    token_env: Some("GHE_TOKEN".to_string()),
                    open_pr: Some(false),
                }),
            };

            let toml = toml::to_string_pretty(&config).unwrap();
            let parsed: FileConfig = toml::from_str(&toml).unwrap();
            assert_eq!(config, parsed);
        }
    }

    mod github_section {
        use super::*;

        #[test]
        fn non_http_base_rejected() {
            let section = GitHubSection {
                api_base: Some("ftp://example.com".to_string()),
                ..Default::default()
            };
            assert!(section.validate().is_err());
        }

        #[test]
        fn bad_token_env_rejected() {
            let section = GitHubSection {
                token_env: Some("A=B".to_string()),
                ..Default::default()
            };
            assert!(section.validate().is_err());
        }
    }
}
