//! core::config
//!
//! Configuration file loading and the per-run [`MigrationConfig`].
//!
//! # Precedence
//!
//! Values are resolved in this order (later overrides earlier):
//! 1. Built-in defaults
//! 2. Config file
//! 3. CLI flags (applied when the [`MigrationConfig`] is built)
//!
//! # Config Locations
//!
//! Searched in order:
//! 1. `$SUBGRAFT_CONFIG` if set
//! 2. `$XDG_CONFIG_HOME/subgraft/config.toml`
//! 3. `~/.subgraft/config.toml`
//!
//! # Example
//!
//! ```no_run
//! use subgraft::core::config::Config;
//!
//! let config = Config::load().unwrap();
//! println!("retry budget: {}", config.retry_budget());
//! println!("policy: {}", config.conflict_policy());
//! ```

pub mod migration;
pub mod schema;

pub use migration::{MigrationConfig, Remotes, Token};
pub use schema::{FileConfig, GitHubSection, DEFAULT_API_BASE, DEFAULT_RETRY_BUDGET};

use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

use crate::core::identity::CoAuthorPolicy;
use crate::core::policy::ConflictPolicy;

/// Environment variables checked for a hosting token, after the configured
/// one.
pub const TOKEN_ENV_VARS: &[&str] = &["SUBGRAFT_TOKEN", "GITHUB_TOKEN", "GH_TOKEN"];

/// Errors from configuration operations.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file '{path}': {source}")]
    ReadError {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("failed to parse config file '{path}': {message}")]
    ParseError { path: PathBuf, message: String },

    #[error("invalid config value: {0}")]
    InvalidValue(String),
}

/// Loaded configuration file with defaults applied through accessors.
#[derive(Debug, Clone, Default)]
pub struct Config {
    /// Parsed file contents (defaults when no file exists)
    pub file: FileConfig,
    /// Path the file was loaded from
    path: Option<PathBuf>,
}

impl Config {
    /// Load configuration from the default locations.
    ///
    /// # Errors
    ///
    /// Returns an error if a config file exists but cannot be parsed or
    /// holds invalid values. A missing file is not an error.
    pub fn load() -> Result<Self, ConfigError> {
        match Self::locate() {
            Some(path) => Self::load_from(&path),
            None => Ok(Self::default()),
        }
    }

    /// Load configuration from an explicit file.
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        let contents = fs::read_to_string(path).map_err(|e| ConfigError::ReadError {
            path: path.to_path_buf(),
            source: e,
        })?;

        let file: FileConfig = toml::from_str(&contents).map_err(|e| ConfigError::ParseError {
            path: path.to_path_buf(),
            message: e.to_string(),
        })?;
        file.validate()?;

        tracing::debug!(path = %path.display(), "loaded config file");
        Ok(Self {
            file,
            path: Some(path.to_path_buf()),
        })
    }

    /// First existing config file among the standard locations.
    fn locate() -> Option<PathBuf> {
        if let Ok(path) = std::env::var("SUBGRAFT_CONFIG") {
            let path = PathBuf::from(path);
            if path.exists() {
                return Some(path);
            }
        }

        if let Ok(xdg_home) = std::env::var("XDG_CONFIG_HOME") {
            let path = PathBuf::from(xdg_home).join("subgraft/config.toml");
            if path.exists() {
                return Some(path);
            }
        }

        dirs::home_dir()
            .map(|home| home.join(".subgraft/config.toml"))
            .filter(|path| path.exists())
    }

    /// Path of the loaded file, if any.
    pub fn loaded_from(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    pub fn conflict_policy(&self) -> ConflictPolicy {
        self.file.conflict_policy.unwrap_or_default()
    }

    pub fn coauthors(&self) -> CoAuthorPolicy {
        self.file.coauthors.unwrap_or_default()
    }

    /// Defaults to [`DEFAULT_RETRY_BUDGET`].
    pub fn retry_budget(&self) -> u32 {
        self.file.retry_budget.unwrap_or(DEFAULT_RETRY_BUDGET)
    }

    pub fn keep_workspace(&self) -> bool {
        self.file.keep_workspace.unwrap_or(false)
    }

    /// Defaults to the public GitHub API.
    pub fn api_base(&self) -> &str {
        self.file
            .github
            .as_ref()
            .and_then(|g| g.api_base.as_deref())
            .unwrap_or(DEFAULT_API_BASE)
    }

    /// Defaults to `true`.
    pub fn open_pr(&self) -> bool {
        self.file
            .github
            .as_ref()
            .and_then(|g| g.open_pr)
            .unwrap_or(true)
    }

    /// Find a hosting token using `lookup` to read the environment.
    ///
    /// The configured `token_env` is checked first, then
    /// [`TOKEN_ENV_VARS`]. Empty values are skipped.
    pub fn resolve_token(&self, lookup: impl Fn(&str) -> Option<String>) -> Option<String> {
        let configured = self
            .file
            .github
            .as_ref()
            .and_then(|g| g.token_env.as_deref());

        configured
            .into_iter()
            .chain(TOKEN_ENV_VARS.iter().copied())
            .filter_map(|var| lookup(var))
            .map(|value| value.trim().to_string())
            .find(|value| !value.is_empty())
    }
}
