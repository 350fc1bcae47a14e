//! cli::args
//!
//! Command-line argument definitions using clap derive.
//!
//! The CLI is a single command. Flags override the config file, which
//! overrides built-in defaults.

use clap::{ArgAction, Parser};
use std::path::PathBuf;

use crate::core::identity::CoAuthorPolicy;
use crate::core::policy::ConflictPolicy;

/// subgraft - Migrate paths between Git repositories with full history
#[derive(Parser, Debug)]
#[command(name = "subgraft")]
#[command(author, version, about, long_about = None)]
#[command(after_help = "\
EXAMPLES:
    # Move src/lib of one repository to pkg/lib of another
    subgraft --source-repo https://github.com/acme/mono.git \\
             --dest-repo https://github.com/acme/lib.git \\
             --map src/lib:pkg/lib

    # Several mappings at once, previewed first
    subgraft --source-repo ../mono --dest-repo ../split \\
             --map src/lib:pkg/lib --map src/app:pkg/app --dry-run

    # A single path pair (legacy form)
    subgraft --source-repo ../mono --dest-repo ../split \\
             --source-path docs --dest-path handbook

MAPPINGS:
    Each --map is SOURCE:DESTINATION. Use \\: for a literal colon. '.' or
    an empty side means the repository root. No
    destination may equal or contain another, and the root destination
    cannot be combined with any other.")]
pub struct Cli {
    /// Source repository (URL or local path)
    #[arg(long, value_name = "URL")]
    pub source_repo: String,

    /// Destination repository (URL or local path)
    #[arg(long, value_name = "URL")]
    pub dest_repo: String,

    /// Path mapping SOURCE:DESTINATION (repeatable)
    #[arg(long = "map", value_name = "SRC:DST", conflicts_with_all = ["source_path", "dest_path"])]
    pub maps: Vec<String>,

    /// Source path (legacy single mapping; requires --dest-path)
    #[arg(long, requires = "dest_path")]
    pub source_path: Option<String>,

    /// Destination path (legacy single mapping; requires --source-path)
    #[arg(long, requires = "source_path")]
    pub dest_path: Option<String>,

    /// Only migrate these files or directories, relative to each mapping's
    /// source (repeatable)
    #[arg(long = "file", value_name = "PATH")]
    pub files: Vec<String>,

    /// Branch, tag or commit of the source to migrate
    #[arg(long, default_value = "HEAD")]
    pub source_ref: String,

    /// Destination branch the proposal targets
    #[arg(long, default_value = "main")]
    pub dest_branch: String,

    /// How replay conflicts are resolved
    #[arg(long, value_name = "POLICY", value_parser = parse_conflict_policy)]
    pub conflict_policy: Option<ConflictPolicy>,

    /// Rewrite every author to this name (requires --author-email)
    #[arg(long, requires = "author_email")]
    pub author_name: Option<String>,

    /// Rewrite every author to this email (requires --author-name)
    #[arg(long, requires = "author_name")]
    pub author_email: Option<String>,

    /// Rewrite every committer to this name (requires --committer-email)
    #[arg(long, requires = "committer_email")]
    pub committer_name: Option<String>,

    /// Rewrite every committer to this email (requires --committer-name)
    #[arg(long, requires = "committer_name")]
    pub committer_email: Option<String>,

    /// Co-author trailer handling: keep, remove-assistant-only, remove-all
    #[arg(long, value_name = "POLICY", value_parser = parse_coauthor_policy)]
    pub coauthors: Option<CoAuthorPolicy>,

    /// Show what would be migrated without changing anything
    #[arg(long)]
    pub dry_run: bool,

    /// Stop at the first replay conflict and hand off for a manual merge
    #[arg(long)]
    pub interactive: bool,

    /// Keep the temporary workspace after the run
    #[arg(long)]
    pub keep_workspace: bool,

    /// Create the destination repository if it does not exist
    #[arg(long)]
    pub create_destination: bool,

    /// Team that must exist in the destination's organization
    #[arg(long, value_name = "TEAM")]
    pub access_group: Option<String>,

    /// Do not open a pull request
    #[arg(long)]
    pub no_pr: bool,

    /// Resolution attempts allowed without progress during replay
    #[arg(long, value_name = "N")]
    pub retry_budget: Option<u32>,

    /// Config file (default: $SUBGRAFT_CONFIG, then the user config dir)
    #[arg(long, value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// More logging (-v debug, -vv trace)
    #[arg(short, long, action = ArgAction::Count, conflicts_with = "quiet")]
    pub verbose: u8,

    /// Errors only
    #[arg(short, long)]
    pub quiet: bool,
}

impl Cli {
    /// Parse command-line arguments.
    pub fn parse_args() -> Self {
        Parser::parse()
    }

    /// Default log filter for the verbosity flags.
    pub fn log_level(&self) -> &'static str {
        match (self.quiet, self.verbose) {
            (true, _) => "error",
            (false, 0) => "warn",
            (false, 1) => "debug",
            (false, _) => "trace",
        }
    }
}

fn parse_conflict_policy(raw: &str) -> Result<ConflictPolicy, String> {
    raw.parse().map_err(|e| format!("{e}"))
}

fn parse_coauthor_policy(raw: &str) -> Result<CoAuthorPolicy, String> {
    raw.parse().map_err(|e| format!("{e}"))
}
