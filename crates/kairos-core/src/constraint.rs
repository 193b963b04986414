//! Version constraints applied to a registry's tag list.
//!
//! A [`VersionConstraint`] combines a [`SortMode`], a [`MatchPredicate`]
//! deciding which raw tags are considered at all, an optional semantic
//! version range and an ignore list.

use std::fmt;

use regex::Regex;
use semver::{Version, VersionReq};

use crate::error::{Error, Result};

/// Strategy used to order candidate tags.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum SortMode {
    /// Byte-wise ascending order of tag names.
    Lexical,

    /// Ascending semantic version precedence. Tags that are not valid
    /// semantic versions are dropped.
    #[default]
    SemVer,

    /// Ascending image creation time, recovered from registry manifests.
    Chronological,
}

impl SortMode {
    /// Parses a sort mode name.
    ///
    /// Accepts `name`/`alphabetical`/`lexical`, `semver`, and
    /// `latest`/`newest-build`/`chronological`.
    ///
    /// # Examples
    ///
    /// ```
    /// use kairos_core::SortMode;
    ///
    /// assert_eq!(SortMode::parse("semver").unwrap(), SortMode::SemVer);
    /// assert_eq!(SortMode::parse("newest-build").unwrap(), SortMode::Chronological);
    /// ```
    ///
    /// # Errors
    ///
    /// Returns an error for unknown names.
    pub fn parse(input: &str) -> Result<Self> {
        match input.trim().to_ascii_lowercase().as_str() {
            "name" | "alphabetical" | "lexical" => Ok(Self::Lexical),
            "semver" => Ok(Self::SemVer),
            "latest" | "newest-build" | "chronological" => Ok(Self::Chronological),
            _ => Err(Error::InvalidSortMode {
                value: input.to_string(),
            }),
        }
    }

    /// Returns the canonical name of this mode.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Lexical => "name",
            Self::SemVer => "semver",
            Self::Chronological => "latest",
        }
    }
}

impl fmt::Display for SortMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for SortMode {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

/// Predicate deciding whether a raw tag is a candidate.
#[derive(Debug, Clone, Default)]
pub enum MatchPredicate {
    /// Accept every tag.
    #[default]
    Any,

    /// Reject every tag.
    None,

    /// Accept tags matching the regular expression.
    Regex(Regex),
}

impl MatchPredicate {
    /// Parses a match expression: `any`, `none` or `regexp:<pattern>`.
    ///
    /// # Examples
    ///
    /// ```
    /// use kairos_core::MatchPredicate;
    ///
    /// let predicate = MatchPredicate::parse("regexp:^v1\\.").unwrap();
    /// assert!(predicate.matches("v1.2.0"));
    /// assert!(!predicate.matches("v2.0.0"));
    /// ```
    ///
    /// # Errors
    ///
    /// Returns an error for unknown matchers or invalid patterns.
    pub fn parse(input: &str) -> Result<Self> {
        let input = input.trim();

        if input.eq_ignore_ascii_case("any") || input.is_empty() {
            return Ok(Self::Any);
        }
        if input.eq_ignore_ascii_case("none") {
            return Ok(Self::None);
        }

        match input.split_once(':') {
            Some(("regexp", pattern)) => Self::regex(pattern),
            _ => Err(Error::InvalidMatch {
                value: input.to_string(),
                reason: "expected 'any', 'none' or 'regexp:<pattern>'".to_string(),
            }),
        }
    }

    /// Creates a regular expression predicate.
    ///
    /// # Errors
    ///
    /// Returns an error if the pattern does not compile.
    pub fn regex(pattern: &str) -> Result<Self> {
        Regex::new(pattern)
            .map(Self::Regex)
            .map_err(|source| Error::InvalidRegex {
                pattern: pattern.to_string(),
                source,
            })
    }

    /// Returns true if the tag is accepted.
    #[must_use]
    pub fn matches(&self, tag: &str) -> bool {
        match self {
            Self::Any => true,
            Self::None => false,
            Self::Regex(re) => re.is_match(tag),
        }
    }
}

impl fmt::Display for MatchPredicate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Any => write!(f, "any"),
            Self::None => write!(f, "none"),
            Self::Regex(re) => write!(f, "regexp:{}", re.as_str()),
        }
    }
}

/// Constraint describing which tags qualify and how they are ordered.
#[derive(Debug, Clone, Default)]
pub struct VersionConstraint {
    /// Sort strategy.
    pub sort_mode: SortMode,

    /// Predicate applied to raw tags before any sorting.
    pub match_predicate: MatchPredicate,

    /// Semantic version range; only consulted in [`SortMode::SemVer`].
    pub range: Option<VersionReq>,

    /// Tag names that never qualify.
    pub ignore: Vec<String>,
}

impl VersionConstraint {
    /// Creates a constraint with the given sort mode that accepts all tags.
    #[must_use]
    pub fn new(sort_mode: SortMode) -> Self {
        Self {
            sort_mode,
            ..Self::default()
        }
    }

    /// Sets the match predicate.
    #[must_use]
    pub fn with_match(mut self, predicate: MatchPredicate) -> Self {
        self.match_predicate = predicate;
        self
    }

    /// Sets the semantic version range from a string such as `~1.2` or `>=1.0, <2`.
    ///
    /// # Errors
    ///
    /// Returns an error if the range does not parse.
    pub fn with_range(mut self, range: &str) -> Result<Self> {
        let req = VersionReq::parse(range).map_err(|source| Error::InvalidConstraint {
            constraint: range.to_string(),
            source,
        })?;
        self.range = Some(req);
        Ok(self)
    }

    /// Adds tag names to the ignore list.
    #[must_use]
    pub fn with_ignore<I, S>(mut self, tags: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.ignore.extend(tags.into_iter().map(Into::into));
        self
    }

    /// Returns true if the raw tag passes the predicate and is not ignored.
    #[must_use]
    pub fn accepts(&self, tag: &str) -> bool {
        self.match_predicate.matches(tag) && !self.ignore.iter().any(|i| i == tag)
    }

    /// Returns true if the version satisfies the configured range, if any.
    #[must_use]
    pub fn in_range(&self, version: &Version) -> bool {
        self.range.as_ref().map_or(true, |req| req.matches(version))
    }
}

/// Parses a tag as a semantic version, tolerating a leading `v`.
///
/// # Examples
///
/// ```
/// use kairos_core::parse_version;
///
/// assert_eq!(parse_version("v1.2.3").unwrap().minor, 2);
/// assert!(parse_version("latest").is_none());
/// ```
#[must_use]
pub fn parse_version(tag: &str) -> Option<Version> {
    let version = tag.strip_prefix('v').unwrap_or(tag);
    Version::parse(version).ok()
}
