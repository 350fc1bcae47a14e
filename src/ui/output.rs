//! ui::output
//!
//! Rendering of migration outcomes.
//!
//! Each outcome is first laid out as a list of [`Line`]s tagged with the
//! stream they belong to, then written by [`emit`]. Layout is pure so the
//! wording can be tested without capturing stdout.

use std::fmt::Display;

use crate::engine::preflight::Check;
use crate::engine::runner::{DryRunReport, ManualHandOffReport, PublishedReport};

/// Output verbosity level.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verbosity {
    Quiet,
    Normal,
    Debug,
}

impl Verbosity {
    pub fn from_flags(quiet: bool, debug: bool) -> Self {
        if quiet {
            Verbosity::Quiet
        } else if debug {
            Verbosity::Debug
        } else {
            Verbosity::Normal
        }
    }
}

/// Where a line goes and when it is shown.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stream {
    /// stdout, hidden in quiet mode.
    Result,
    /// stdout, shown even in quiet mode. Used for hand-off instructions.
    Guidance,
    /// stderr, hidden in quiet mode.
    Warning,
    /// stderr, always shown.
    Error,
    /// stderr, debug mode only.
    Debug,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Line {
    pub stream: Stream,
    pub text: String,
}

impl Line {
    fn new(stream: Stream, text: impl Into<String>) -> Self {
        Self {
            stream,
            text: text.into(),
        }
    }

    fn result(text: impl Into<String>) -> Self {
        Self::new(Stream::Result, text)
    }

    fn warning(text: impl Into<String>) -> Self {
        Self::new(Stream::Warning, text)
    }

    fn visible(&self, verbosity: Verbosity) -> bool {
        match self.stream {
            Stream::Guidance | Stream::Error => true,
            Stream::Result | Stream::Warning => verbosity != Verbosity::Quiet,
            Stream::Debug => verbosity == Verbosity::Debug,
        }
    }
}

/// Write `lines` to stdout/stderr, filtered by `verbosity`.
pub fn emit(lines: &[Line], verbosity: Verbosity) {
    for line in lines.iter().filter(|l| l.visible(verbosity)) {
        match line.stream {
            Stream::Result | Stream::Guidance => println!("{}", line.text),
            Stream::Warning => eprintln!("warning: {}", line.text),
            Stream::Error => eprintln!("error: {}", line.text),
            Stream::Debug => eprintln!("[debug] {}", line.text),
        }
    }
}

/// Print a fatal error. Always shown.
pub fn error(message: impl Display) {
    eprintln!("error: {message}");
}

/// Preview of a dry run: per-mapping impact, rewrites and every preflight
/// check (failures included, since a dry run does not abort on them).
pub fn dry_run(report: &DryRunReport) -> Vec<Line> {
    let mut lines = vec![
        Line::result("Dry run: nothing was changed."),
        Line::result(format!("Conflict policy: {}", report.conflict_policy)),
    ];
    for preview in &report.mappings {
        lines.push(if preview.source_present {
            Line::result(format!(
                "  {}  ({} commits affected)",
                preview.mapping, preview.affected_commits
            ))
        } else {
            Line::warning(format!(
                "{}: source path not found at the source ref",
                preview.mapping
            ))
        });
    }
    if !report.transformations.is_empty() {
        lines.push(Line::result("Rewrites:"));
        lines.extend(report.transformations.iter().map(|t| Line::result(format!("  {t}"))));
    }
    lines.push(Line::result("Preflight:"));
    lines.extend(report.preflight.checks().iter().map(check_line));
    lines
}

fn check_line(check: &Check) -> Line {
    Line::result(format!("  {check}"))
}

/// Summary of a pushed proposal.
pub fn published(report: &PublishedReport) -> Vec<Line> {
    let proposal = &report.proposal;
    let mut lines: Vec<Line> = report
        .preflight
        .warnings()
        .map(|check| Line::warning(check.message.clone()))
        .collect();

    if let Some(url) = &report.created_repository {
        lines.push(Line::result(format!("Created destination repository {url}")));
    }
    let overlaps = &report.integration.defensive_resolutions;
    if !overlaps.is_empty() {
        lines.push(Line::warning(format!(
            "mappings overlapped at: {}",
            overlaps.join(", ")
        )));
    }
    if let Some(replay) = &proposal.replay {
        lines.push(Line::new(
            Stream::Debug,
            format!(
                "replayed {} commits ({} empty, {} paths resolved by policy)",
                replay.steps,
                replay.empty_steps,
                replay.resolved_paths.len()
            ),
        ));
    }
    if proposal.up_to_date {
        lines.push(Line::result(
            "The destination already contains this content; no pull request opened.",
        ));
    }
    lines.push(Line::result(format!(
        "Pushed '{}' ({} commits) at {}",
        proposal.branch,
        report.integration.commit_count,
        proposal.tip.short(7)
    )));
    if let Some(pr) = &proposal.pull_request {
        lines.push(Line::result(format!(
            "Opened pull request #{}: {}",
            pr.number, pr.url
        )));
    }
    if let Some(path) = &report.workspace {
        lines.push(Line::result(format!("Workspace kept at {}", path.display())));
    }
    lines
}

/// The conflict report and the commands that finish the run by hand.
pub fn hand_off(report: &ManualHandOffReport) -> Vec<Line> {
    let mut lines = vec![
        Line::new(
            Stream::Error,
            format!(
                "replay stopped on conflicts in: {}",
                report.hand_off.conflicted_paths.join(", ")
            ),
        ),
        Line::new(
            Stream::Guidance,
            format!("Finish the migration by hand in {}:", report.workspace.display()),
        ),
    ];
    lines.extend(
        report
            .hand_off
            .commands
            .iter()
            .map(|c| Line::new(Stream::Guidance, format!("  {c}"))),
    );
    lines
}
