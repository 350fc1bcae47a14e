//! core::mapping
//!
//! Source→destination path mappings and their validation.
//!
//! # Syntax
//!
//! A raw mapping is `source:destination`, split on the first unescaped
//! colon. `\:` is a literal colon and the only escape. `.` or an empty
//! side means the repository root.
//!
//! # Invariants
//!
//! A [`MappingSet`] is non-empty, order-preserving, and its destinations
//! are pairwise disjoint: no destination equals or is a separator-aware
//! prefix of another, and a root destination stands alone. Sources may
//! overlap freely.
//!
//! # Example
//!
//! ```
//! use subgraft::core::mapping::MappingSet;
//!
//! let set = MappingSet::from_raw(["src/lib:pkg/lib", "src/app:pkg/app"]).unwrap();
//! assert_eq!(set.len(), 2);
//!
//! // Nested destinations are rejected before anything is touched.
//! assert!(MappingSet::from_raw(["a:pkg", "b:pkg/b"]).is_err());
//! ```

use serde::Serialize;
use thiserror::Error;

use super::types::{RepoPath, TypeError};

/// Errors from mapping parsing and validation.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum MappingError {
    /// The raw mapping has no unescaped `:` separator.
    #[error("malformed mapping '{raw}': expected 'source:destination'")]
    MissingSeparator { raw: String },

    /// A `\` not followed by `:`.
    #[error("malformed mapping '{raw}': invalid escape sequence '\\{found}'")]
    InvalidEscape { raw: String, found: char },

    /// One side of the mapping is not a valid repository path.
    #[error("malformed mapping '{raw}': {source}")]
    InvalidPath { raw: String, source: TypeError },

    /// No mappings were supplied.
    #[error("at least one mapping is required")]
    Empty,

    /// Two destinations are equal or nested.
    #[error("destination '{first_destination}' of mapping {first} overlaps destination '{second_destination}' of mapping {second}")]
    OverlappingDestinations {
        first: String,
        first_destination: RepoPath,
        second: String,
        second_destination: RepoPath,
    },

    /// A root destination appears alongside other mappings.
    #[error("mapping {root} targets the repository root, which cannot be combined with mapping {other}")]
    RootNotExclusive { root: String, other: String },
}

/// A validated source→destination pair.
///
/// Both sides are normalized. Immutable once constructed.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct Mapping {
    source: RepoPath,
    destination: RepoPath,
}

impl Mapping {
    /// Create a mapping from already-normalized paths.
    pub fn new(source: RepoPath, destination: RepoPath) -> Self {
        Self {
            source,
            destination,
        }
    }

    /// Parse a raw `source:destination` string.
    ///
    /// # Example
    ///
    /// ```
    /// use subgraft::core::mapping::Mapping;
    ///
    /// let m = Mapping::parse(r"docs/a\:b:vendor/docs").unwrap();
    /// assert_eq!(m.source().as_str(), "docs/a:b");
    /// assert_eq!(m.destination().as_str(), "vendor/docs");
    ///
    /// let root = Mapping::parse(".:third_party/tool").unwrap();
    /// assert!(root.source().is_root());
    /// ```
    pub fn parse(raw: &str) -> Result<Self, MappingError> {
        let (source, destination) = split_unescaped(raw)?;
        let source = RepoPath::parse(&source).map_err(|e| MappingError::InvalidPath {
            raw: raw.to_string(),
            source: e,
        })?;
        let destination =
            RepoPath::parse(&destination).map_err(|e| MappingError::InvalidPath {
                raw: raw.to_string(),
                source: e,
            })?;
        Ok(Self::new(source, destination))
    }

    /// The subtree in the source repository.
    pub fn source(&self) -> &RepoPath {
        &self.source
    }

    /// Where the subtree lands in the destination repository.
    pub fn destination(&self) -> &RepoPath {
        &self.destination
    }
}

impl std::fmt::Display for Mapping {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} -> {}", self.source, self.destination)
    }
}

/// Split on the first colon not written as `\:`, unescaping both halves.
fn split_unescaped(raw: &str) -> Result<(String, String), MappingError> {
    let mut left = String::new();
    let mut right = String::new();
    let mut seen_separator = false;
    let mut chars = raw.chars();

    while let Some(c) = chars.next() {
        let target = if seen_separator { &mut right } else { &mut left };
        match c {
            '\\' => match chars.next() {
                Some(':') => target.push(':'),
                Some(other) => {
                    return Err(MappingError::InvalidEscape {
                        raw: raw.to_string(),
                        found: other,
                    })
                }
                None => {
                    return Err(MappingError::InvalidEscape {
                        raw: raw.to_string(),
                        found: ' ',
                    })
                }
            },
            ':' if !seen_separator => seen_separator = true,
            other => target.push(other),
        }
    }

    if !seen_separator {
        return Err(MappingError::MissingSeparator {
            raw: raw.to_string(),
        });
    }

    Ok((left, right))
}

/// An ordered, validated, non-empty collection of mappings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct MappingSet(Vec<Mapping>);

impl MappingSet {
    /// Validate a list of mappings.
    ///
    /// Every destination is compared against every other. The first
    /// violation found (in input order) is reported.
    pub fn new(mappings: Vec<Mapping>) -> Result<Self, MappingError> {
        if mappings.is_empty() {
            return Err(MappingError::Empty);
        }

        for (i, a) in mappings.iter().enumerate() {
            for (j, b) in mappings.iter().enumerate().skip(i + 1) {
                if a.destination.is_root() || b.destination.is_root() {
                    let (root, other) = if a.destination.is_root() {
                        (i, j)
                    } else {
                        (j, i)
                    };
                    return Err(MappingError::RootNotExclusive {
                        root: label(root, &mappings[root]),
                        other: label(other, &mappings[other]),
                    });
                }
                if a.destination.is_prefix_of(&b.destination)
                    || b.destination.is_prefix_of(&a.destination)
                {
                    return Err(MappingError::OverlappingDestinations {
                        first: label(i, a),
                        first_destination: a.destination.clone(),
                        second: label(j, b),
                        second_destination: b.destination.clone(),
                    });
                }
            }
        }

        Ok(Self(mappings))
    }

    /// Parse and validate repeatable `source:destination` arguments.
    pub fn from_raw<I, S>(raw: I) -> Result<Self, MappingError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mappings = raw
            .into_iter()
            .map(|r| Mapping::parse(r.as_ref()))
            .collect::<Result<Vec<_>, _>>()?;
        Self::new(mappings)
    }

    /// Build a single-mapping set from the legacy source/destination pair.
    ///
    /// No escape processing applies here: the two values are plain paths.
    pub fn from_legacy(source: &str, destination: &str) -> Result<Self, MappingError> {
        let raw = format!("{source}:{destination}");
        let source = RepoPath::parse(source).map_err(|e| MappingError::InvalidPath {
            raw: raw.clone(),
            source: e,
        })?;
        let destination = RepoPath::parse(destination)
            .map_err(|e| MappingError::InvalidPath { raw, source: e })?;
        Self::new(vec![Mapping::new(source, destination)])
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Always false: a validated set has at least one mapping.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Mapping> {
        self.0.iter()
    }

    pub fn first(&self) -> &Mapping {
        &self.0[0]
    }

    pub fn as_slice(&self) -> &[Mapping] {
        &self.0
    }
}

impl<'a> IntoIterator for &'a MappingSet {
    type Item = &'a Mapping;
    type IntoIter = std::slice::Iter<'a, Mapping>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.iter()
    }
}

fn label(index: usize, mapping: &Mapping) -> String {
    format!("#{} ({})", index + 1, mapping)
}
