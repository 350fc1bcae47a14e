//! cli
//!
//! Command-line interface layer for subgraft.
//!
//! # Responsibilities
//!
//! - Parse flags and merge them over the config file into one
//!   [`MigrationConfig`]
//! - Set up logging, the async runtime and the interrupt handler
//! - Render the engine's outcome
//!
//! # Architecture
//!
//! The CLI layer is thin. It never touches a repository itself; everything
//! flows through [`engine::migrate`].

pub mod args;

pub use args::Cli;

use std::process::ExitCode;

use anyhow::{Context as _, Result};
use tracing_subscriber::EnvFilter;

use crate::core::config::{Config, MigrationConfig, Remotes, Token};
use crate::core::identity::Identity;
use crate::core::mapping::MappingSet;
use crate::core::types::{BranchName, RepoPath};
use crate::engine::{self, Hosting, Interrupt, MigrationOutcome, ValidationError};
use crate::forge::create_forge;
use crate::ui::output::{self, Verbosity};

/// Environment variable overriding the log filter.
pub const LOG_ENV: &str = "SUBGRAFT_LOG";

/// Exit code of a run that stopped for a manual merge.
const HAND_OFF_EXIT: u8 = 2;

/// Run the CLI application.
///
/// This is the main entry point called from `main.rs`.
pub fn run() -> Result<ExitCode> {
    let cli = Cli::parse_args();
    init_logging(cli.log_level());
    let verbosity = Verbosity::from_flags(cli.quiet, cli.verbose > 0);

    let file = match &cli.config {
        Some(path) => Config::load_from(path),
        None => Config::load(),
    }
    .context("failed to load configuration")?;
    let token = file.resolve_token(|var| std::env::var(var).ok());
    let config = build_config(&cli, &file, token)?;

    let runtime = tokio::runtime::Runtime::new().context("failed to start async runtime")?;
    let interrupt = Interrupt::new();
    interrupt.listen(runtime.handle());

    let forge = create_forge(
        &config.remotes.destination,
        config.token.as_ref().map(|t| t.expose().to_string()),
        &config.api_base,
    );
    let hosting = forge
        .as_deref()
        .map(|forge| Hosting::new(forge, runtime.handle()));

    let outcome = engine::migrate(&config, hosting.as_ref(), &interrupt)?;
    Ok(match outcome {
        MigrationOutcome::DryRun(report) => {
            output::emit(&output::dry_run(&report), verbosity);
            ExitCode::SUCCESS
        }
        MigrationOutcome::Published(report) => {
            output::emit(&output::published(&report), verbosity);
            ExitCode::SUCCESS
        }
        MigrationOutcome::ManualHandOff(report) => {
            output::emit(&output::hand_off(&report), verbosity);
            ExitCode::from(HAND_OFF_EXIT)
        }
    })
}

fn init_logging(default_level: &str) {
    let filter = EnvFilter::try_from_env(LOG_ENV).unwrap_or_else(|_| EnvFilter::new(default_level));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .try_init();
}

/// Merge flags over file defaults into the run's configuration.
pub fn build_config(
    cli: &Cli,
    file: &Config,
    token: Option<String>,
) -> Result<MigrationConfig, ValidationError> {
    let mappings = match (&cli.source_path, &cli.dest_path) {
        (Some(source), Some(destination)) => MappingSet::from_legacy(source, destination)?,
        _ => MappingSet::from_raw(&cli.maps)?,
    };

    let remotes = Remotes {
        source: cli.source_repo.clone(),
        destination: cli.dest_repo.clone(),
    };
    let mut config = MigrationConfig::new(remotes, mappings, BranchName::new(&cli.dest_branch)?)
        .with_file_defaults(file);

    config.source_ref = cli.source_ref.clone();
    config.file_set = cli
        .files
        .iter()
        .map(|f| RepoPath::parse(f))
        .collect::<Result<_, _>>()?;
    if let Some(policy) = cli.conflict_policy {
        config.conflict_policy = policy;
    }
    if let Some(policy) = cli.coauthors {
        config.reattribution.coauthors = policy;
    }
    config.reattribution.author = Identity::from_parts(
        "author",
        cli.author_name.as_deref(),
        cli.author_email.as_deref(),
    )?;
    config.reattribution.committer = Identity::from_parts(
        "committer",
        cli.committer_name.as_deref(),
        cli.committer_email.as_deref(),
    )?;
    if let Some(budget) = cli.retry_budget {
        config.retry_budget = budget;
    }

    config.dry_run = cli.dry_run;
    config.interactive = cli.interactive;
    config.keep_workspace |= cli.keep_workspace;
    config.create_destination = cli.create_destination;
    config.access_group = cli.access_group.clone();
    if cli.no_pr {
        config.open_pr = false;
    }
    config.token = token.map(Token::new);

    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;

    fn cli(args: &[&str]) -> Cli {
        let mut argv = vec!["subgraft", "--source-repo", "src", "--dest-repo", "dst"];
        argv.extend_from_slice(args);
        Cli::try_parse_from(argv).unwrap()
    }

    mod build_config {
        use super::*;
        use crate::core::identity::CoAuthorPolicy;
        use crate::core::policy::ConflictPolicy;

        #[test]
        fn flags_override_file_defaults() {
            let mut file = Config::default();
            file.file.conflict_policy = Some(ConflictPolicy::PreferExisting);
            file.file.retry_budget = Some(7);

            let config = build_config(
                &cli(&["--map", "a:b", "--conflict-policy", "diff-align"]),
                &file,
                None,
            )
            .unwrap();
            assert_eq!(config.conflict_policy, ConflictPolicy::DiffAlign);
            assert_eq!(config.retry_budget, 7);
        }

        #[test]
        fn legacy_pair() {
            let config = build_config(
                &cli(&["--source-path", "docs", "--dest-path", "handbook"]),
                &Config::default(),
                None,
            )
            .unwrap();
            assert_eq!(config.mappings.len(), 1);
            assert_eq!(config.mappings.first().destination().as_str(), "handbook");
        }

        #[test]
        fn overlapping_maps_are_rejected() {
            let result = build_config(
                &cli(&["--map", "a:pkg", "--map", "b:pkg/sub"]),
                &Config::default(),
                None,
            );
            assert!(matches!(result, Err(ValidationError::Mapping(_))));
        }

        #[test]
        fn unsafe_identity_is_rejected() {
            let result = build_config(
                &cli(&["--map", "a:b", "--author-name", "Eve $(rm)", "--author-email", "e@x"]),
                &Config::default(),
                None,
            );
            assert!(matches!(result, Err(ValidationError::Identity(_))));
        }

        #[test]
        fn reattribution_and_switches() {
            let config = build_config(
                &cli(&[
                    "--map",
                    "a:b",
                    "--committer-name",
                    "Bot",
                    "--committer-email",
                    "bot@example.com",
                    "--coauthors",
                    "remove-assistant-only",
                    "--no-pr",
                    "--file",
                    "x.rs",
                ]),
                &Config::default(),
                Some("tok".to_string()),
            )
            .unwrap();
            assert_eq!(config.reattribution.committer.as_ref().unwrap().name(), "Bot");
            assert!(config.reattribution.author.is_none());
            assert_eq!(config.reattribution.coauthors, CoAuthorPolicy::RemoveAssistantOnly);
            assert!(!config.open_pr);
            assert!(config.file_set_mode());
            assert_eq!(config.token.as_ref().unwrap().expose(), "tok");
        }
    }
}
