//! core::identity
//!
//! Identity overrides and commit message trailer policy.
//!
//! # Design
//!
//! Both transformations are applied through the history rewrite's
//! [`CommitRewriter`] callback, which receives structured [`CommitFields`]
//! and edits them in place. Nothing is ever rendered into script text, but
//! override values are still validated: they end up in commit objects that
//! other tools will parse and display.
//!
//! # Example
//!
//! ```
//! use subgraft::core::identity::CoAuthorPolicy;
//!
//! let msg = "Fix parser\n\nCo-authored-by: Ada <ada@example.com>\n\
//!            Co-authored-by: Claude <noreply@anthropic.com>\n";
//!
//! let cleaned = CoAuthorPolicy::RemoveAssistantOnly.apply(msg);
//! assert_eq!(cleaned, "Fix parser\n\nCo-authored-by: Ada <ada@example.com>\n");
//! ```

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors from identity validation.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum IdentityError {
    #[error("{role} name cannot be empty")]
    EmptyName { role: &'static str },

    #[error("{role} email cannot be empty")]
    EmptyEmail { role: &'static str },

    #[error("{role} email '{email}' cannot contain whitespace")]
    EmailWhitespace { role: &'static str, email: String },

    #[error("{role} {field} contains a control character")]
    ControlCharacter {
        role: &'static str,
        field: &'static str,
    },

    #[error("{role} {field} contains the disallowed character '{found}'")]
    Metacharacter {
        role: &'static str,
        field: &'static str,
        found: char,
    },

    #[error("{role} override needs both a name and an email")]
    Incomplete { role: &'static str },
}

/// Characters rejected in identity values.
const METACHARACTERS: &[char] = &[
    '`', '$', '\\', '"', '\'', ';', '|', '&', '<', '>', '(', ')', '{', '}', '*', '?', '!', '#',
];

/// A replacement `{name, email}` identity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Identity {
    name: String,
    email: String,
}

impl Identity {
    /// Validate and build an identity. `role` ("author" or "committer")
    /// only feeds error messages.
    pub fn new(
        role: &'static str,
        name: impl Into<String>,
        email: impl Into<String>,
    ) -> Result<Self, IdentityError> {
        let name = name.into().trim().to_string();
        let email = email.into().trim().to_string();

        if name.is_empty() {
            return Err(IdentityError::EmptyName { role });
        }
        if email.is_empty() {
            return Err(IdentityError::EmptyEmail { role });
        }
        check_field(role, "name", &name)?;
        check_field(role, "email", &email)?;
        if email.chars().any(char::is_whitespace) {
            return Err(IdentityError::EmailWhitespace { role, email });
        }

        Ok(Self { name, email })
    }

    /// Build an optional identity from a pair of optional flags.
    ///
    /// Both absent is `Ok(None)`; exactly one present is an error.
    pub fn from_parts(
        role: &'static str,
        name: Option<&str>,
        email: Option<&str>,
    ) -> Result<Option<Self>, IdentityError> {
        match (name, email) {
            (None, None) => Ok(None),
            (Some(name), Some(email)) => Self::new(role, name, email).map(Some),
            _ => Err(IdentityError::Incomplete { role }),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn email(&self) -> &str {
        &self.email
    }
}

impl std::fmt::Display for Identity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} <{}>", self.name, self.email)
    }
}

fn check_field(role: &'static str, field: &'static str, value: &str) -> Result<(), IdentityError> {
    if value.chars().any(char::is_control) {
        return Err(IdentityError::ControlCharacter { role, field });
    }
    if let Some(found) = value.chars().find(|c| METACHARACTERS.contains(c)) {
        return Err(IdentityError::Metacharacter { role, field, found });
    }
    Ok(())
}

/// How co-author trailers are treated in rewritten messages.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum CoAuthorPolicy {
    /// Leave messages untouched.
    #[default]
    Keep,
    /// Drop trailer-block co-authors that are AI assistants or bots, and
    /// "Generated with" footers naming an assistant.
    RemoveAssistantOnly,
    /// Drop every co-author and "Generated with" line of the trailer block.
    RemoveAll,
}

/// Addresses used by AI assistants in co-author trailers.
const ASSISTANT_EMAILS: &[&str] = &[
    "noreply@anthropic.com",
    "copilot@github.com",
    "noreply@openai.com",
    "cursoragent@cursor.com",
    "aider@aider.chat",
];

/// Mail domains operated by assistant vendors.
const ASSISTANT_DOMAINS: &[&str] = &[
    "anthropic.com",
    "openai.com",
    "cursor.com",
    "aider.chat",
    "cognition.ai",
    "codeium.com",
];

/// Whole display names of AI assistants, lowercased.
const ASSISTANT_NAMES: &[&str] = &[
    "claude",
    "claude code",
    "copilot",
    "github copilot",
    "chatgpt",
    "codex",
    "openai codex",
    "gemini",
    "gemini code assist",
    "cursor",
    "cursor agent",
    "aider",
    "devin",
    "devin ai",
    "codeium",
    "windsurf",
];

/// Words naming an assistant in a `Generated with ...` footer.
const ASSISTANT_WORDS: &[&str] = &[
    "claude", "copilot", "chatgpt", "codex", "gemini", "cursor", "aider", "devin", "codeium",
    "windsurf",
];

const GITHUB_NOREPLY: &str = "@users.noreply.github.com";

impl CoAuthorPolicy {
    /// The name used on the command line and in config files.
    pub fn name(&self) -> &'static str {
        match self {
            CoAuthorPolicy::Keep => "keep",
            CoAuthorPolicy::RemoveAssistantOnly => "remove-assistant-only",
            CoAuthorPolicy::RemoveAll => "remove-all",
        }
    }

    /// Apply the policy to a full commit message.
    ///
    /// Only the trailer block is inspected: the trailing paragraphs made up
    /// entirely of `Key: value` trailers and `Generated with` footers. The
    /// subject and body are never touched. Paragraphs emptied by the policy
    /// are dropped and the original trailing newline (if any) is kept.
    pub fn apply(&self, message: &str) -> String {
        if *self == CoAuthorPolicy::Keep {
            return message.to_string();
        }

        let lines: Vec<&str> = message.lines().collect();
        let paragraphs = paragraphs(&lines);
        let region = paragraphs
            .iter()
            .enumerate()
            .skip(1)
            .rev()
            .take_while(|&(_, &(start, end))| lines[start..end].iter().all(|l| is_trailer_line(l)))
            .map(|(i, _)| i)
            .last();
        let Some(region) = region else {
            return message.to_string();
        };

        let mut removed = false;
        let kept: Vec<Vec<&str>> = paragraphs[region..]
            .iter()
            .map(|&(start, end)| {
                lines[start..end]
                    .iter()
                    .copied()
                    .filter(|line| {
                        let strip = self.strips(line);
                        removed |= strip;
                        !strip
                    })
                    .collect()
            })
            .collect();
        if !removed {
            return message.to_string();
        }

        let mut head = &lines[..paragraphs[region].0];
        while let Some((last, rest)) = head.split_last() {
            if !last.trim().is_empty() {
                break;
            }
            head = rest;
        }

        let mut out = head.join("\n");
        for paragraph in kept.iter().filter(|p| !p.is_empty()) {
            out.push_str("\n\n");
            out.push_str(&paragraph.join("\n"));
        }
        if message.ends_with('\n') && !out.is_empty() {
            out.push('\n');
        }
        out
    }

    fn strips(&self, line: &str) -> bool {
        let trimmed = line.trim();
        let lowered = trimmed.to_ascii_lowercase();
        let assistant = if lowered.starts_with("co-authored-by:") {
            let (name, email) = split_identity(&trimmed["co-authored-by:".len()..]);
            is_assistant_identity(&name, &email)
        } else if is_generated_with(&lowered) {
            names_assistant(&lowered)
        } else {
            return false;
        };

        match self {
            CoAuthorPolicy::Keep => false,
            CoAuthorPolicy::RemoveAll => true,
            CoAuthorPolicy::RemoveAssistantOnly => assistant,
        }
    }
}

impl std::fmt::Display for CoAuthorPolicy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

impl std::str::FromStr for CoAuthorPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "keep" => Ok(CoAuthorPolicy::Keep),
            "remove-assistant-only" => Ok(CoAuthorPolicy::RemoveAssistantOnly),
            "remove-all" => Ok(CoAuthorPolicy::RemoveAll),
            other => Err(format!(
                "unknown co-author policy '{other}' (expected keep, remove-assistant-only or remove-all)"
            )),
        }
    }
}

/// `(start, end)` line ranges of the non-blank paragraphs.
fn paragraphs(lines: &[&str]) -> Vec<(usize, usize)> {
    let mut out = Vec::new();
    let mut start = None;
    for (i, line) in lines.iter().enumerate() {
        match (line.trim().is_empty(), start) {
            (false, None) => start = Some(i),
            (true, Some(s)) => {
                out.push((s, i));
                start = None;
            }
            _ => {}
        }
    }
    if let Some(s) = start {
        out.push((s, lines.len()));
    }
    out
}

/// A git trailer (`Token: value`) or a `Generated with` footer.
fn is_trailer_line(line: &str) -> bool {
    let trimmed = line.trim();
    if is_generated_with(&trimmed.to_ascii_lowercase()) {
        return true;
    }
    match trimmed.split_once(": ") {
        Some((token, value)) => {
            !token.is_empty()
                && !value.trim().is_empty()
                && token.chars().all(|c| c.is_ascii_alphanumeric() || c == '-')
        }
        None => false,
    }
}

/// Matches lines like `Generated with X` including a leading emoji or
/// bullet.
fn is_generated_with(lowered: &str) -> bool {
    lowered
        .trim_start_matches(|c: char| !c.is_ascii_alphanumeric())
        .starts_with("generated with")
}

/// Split `Name <email>` into lowercased parts. The email is empty when
/// there are no angle brackets.
fn split_identity(value: &str) -> (String, String) {
    let value = value.trim();
    match value.split_once('<') {
        Some((name, rest)) => {
            let email = rest.split_once('>').map_or(rest, |(email, _)| email);
            (
                name.trim().to_ascii_lowercase(),
                email.trim().to_ascii_lowercase(),
            )
        }
        None => (value.to_ascii_lowercase(), String::new()),
    }
}

fn is_assistant_identity(name: &str, email: &str) -> bool {
    if ASSISTANT_EMAILS.contains(&email) || name.ends_with("[bot]") {
        return true;
    }
    if let Some(local) = email.strip_suffix(GITHUB_NOREPLY) {
        let login = local.split_once('+').map_or(local, |(_, login)| login);
        if login.ends_with("[bot]") || ASSISTANT_NAMES.contains(&login) {
            return true;
        }
    }
    if !ASSISTANT_NAMES.contains(&name) {
        return false;
    }
    let domain = email.rsplit_once('@').map_or("", |(_, domain)| domain);
    email.is_empty() || email.contains("noreply") || ASSISTANT_DOMAINS.contains(&domain)
}

fn names_assistant(lowered: &str) -> bool {
    lowered
        .split(|c: char| !c.is_ascii_alphanumeric())
        .any(|word| ASSISTANT_WORDS.contains(&word))
}

/// Author, committer and message of one commit, as seen by a rewrite.
///
/// Timestamps are carried through untouched.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommitFields {
    pub author_name: String,
    pub author_email: String,
    pub committer_name: String,
    pub committer_email: String,
    pub message: String,
}

/// A per-commit transformation invoked by the history rewrite.
pub trait CommitRewriter {
    /// Edit the commit's identity and message in place.
    fn rewrite(&self, fields: &mut CommitFields);

    /// Whether this rewriter can change anything at all.
    fn is_identity(&self) -> bool {
        false
    }
}

/// The rewriter built from a run's overrides and co-author policy.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Reattribution {
    pub author: Option<Identity>,
    pub committer: Option<Identity>,
    pub coauthors: CoAuthorPolicy,
}

impl Reattribution {
    /// Human-readable summary of what the rewrite will change, one line per
    /// transformation.
    pub fn describe(&self) -> Vec<String> {
        let mut lines = Vec::new();
        if let Some(author) = &self.author {
            lines.push(format!("author -> {author}"));
        }
        if let Some(committer) = &self.committer {
            lines.push(format!("committer -> {committer}"));
        }
        if self.coauthors != CoAuthorPolicy::Keep {
            lines.push(format!("co-author trailers: {}", self.coauthors));
        }
        lines
    }
}

impl CommitRewriter for Reattribution {
    fn rewrite(&self, fields: &mut CommitFields) {
        if let Some(author) = &self.author {
            fields.author_name = author.name.clone();
            fields.author_email = author.email.clone();
        }
        if let Some(committer) = &self.committer {
            fields.committer_name = committer.name.clone();
            fields.committer_email = committer.email.clone();
        }
        fields.message = self.coauthors.apply(&fields.message);
    }

    fn is_identity(&self) -> bool {
        self.author.is_none() && self.committer.is_none() && self.coauthors == CoAuthorPolicy::Keep
    }
}
