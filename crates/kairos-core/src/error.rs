//! Error types for Kairos core operations.
//!
//! This module defines the error types used throughout the `kairos-core` crate.

use thiserror::Error;

/// Result type alias using [`Error`] as the error type.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in Kairos core operations.
#[derive(Error, Debug)]
pub enum Error {
    /// Image reference could not be parsed.
    #[error("Invalid image reference '{reference}': {reason}")]
    InvalidReference {
        /// The offending reference string.
        reference: String,
        /// Reason the reference is invalid.
        reason: String,
    },

    /// Unknown tag sort mode.
    #[error("Unknown sort mode: {value}")]
    InvalidSortMode {
        /// The unrecognized value.
        value: String,
    },

    /// Match predicate expression is not understood.
    #[error("Invalid match expression '{value}': {reason}")]
    InvalidMatch {
        /// The offending expression.
        value: String,
        /// Reason the expression is invalid.
        reason: String,
    },

    /// Regular expression in a match predicate failed to compile.
    #[error("Invalid regular expression '{pattern}': {source}")]
    InvalidRegex {
        /// The pattern that failed to compile.
        pattern: String,
        /// Underlying regex error.
        #[source]
        source: regex::Error,
    },

    /// Semantic version range failed to parse.
    #[error("Invalid version constraint '{constraint}': {source}")]
    InvalidConstraint {
        /// The constraint string.
        constraint: String,
        /// Underlying semver error.
        #[source]
        source: semver::Error,
    },
}
