//! Error types for registry operations.

use std::path::PathBuf;
use thiserror::Error;

/// Result type alias using [`RegistryError`] as the error type.
pub type Result<T> = std::result::Result<T, RegistryError>;

/// Errors that can occur during registry operations.
#[derive(Debug, Error)]
pub enum RegistryError {
    /// Failed to connect to registry.
    #[error("Failed to connect to registry at {url}: {source}")]
    ConnectionFailed {
        /// Registry URL.
        url: String,
        /// Underlying error.
        #[source]
        source: reqwest::Error,
    },

    /// Authentication failed.
    #[error("Authentication failed: {message}")]
    AuthenticationFailed {
        /// Error message.
        message: String,
    },

    /// Repository or manifest not found in registry.
    #[error("Not found: {repository}:{reference}")]
    NotFound {
        /// Repository name.
        repository: String,
        /// Tag or digest.
        reference: String,
    },

    /// HTTP error from registry.
    #[error("HTTP error from registry: {status} - {message}")]
    HttpError {
        /// HTTP status code.
        status: u16,
        /// Error message.
        message: String,
    },

    /// Credential source could not be read.
    #[error("Could not read credentials from '{descriptor}': {message}")]
    CredentialSource {
        /// Credential descriptor.
        descriptor: String,
        /// Error message.
        message: String,
    },

    /// Credential secret is not a `username:password` pair.
    #[error("Invalid credentials from '{descriptor}': expected 'username:password'")]
    CredentialFormat {
        /// Credential descriptor.
        descriptor: String,
    },

    /// No resolver is registered for the credential scheme.
    #[error("Unsupported credential scheme: {scheme}")]
    UnsupportedCredentialScheme {
        /// Scheme name.
        scheme: String,
    },

    /// Registry configuration is invalid.
    #[error("Invalid registry configuration: {reason}")]
    InvalidConfig {
        /// Reason the configuration is invalid.
        reason: String,
    },

    /// Invalid URL.
    #[error("Invalid URL: {url}")]
    InvalidUrl {
        /// URL string.
        url: String,
    },

    /// File I/O error.
    #[error("File I/O error at {path}: {source}")]
    IoError {
        /// File path.
        path: PathBuf,
        /// Underlying error.
        #[source]
        source: std::io::Error,
    },

    /// JSON serialization/deserialization error.
    #[error("JSON error: {source}")]
    JsonError {
        /// Underlying error.
        #[source]
        source: serde_json::Error,
    },

    /// YAML deserialization error.
    #[error("YAML error: {source}")]
    YamlError {
        /// Underlying error.
        #[source]
        source: serde_yaml::Error,
    },
}

impl From<reqwest::Error> for RegistryError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_connect() {
            Self::ConnectionFailed {
                url: err
                    .url()
                    .map_or_else(|| "unknown".to_string(), ToString::to_string),
                source: err,
            }
        } else if err.is_status() {
            let status = err.status().map_or(0, |s| s.as_u16());
            Self::HttpError {
                status,
                message: err.to_string(),
            }
        } else {
            Self::HttpError {
                status: 0,
                message: err.to_string(),
            }
        }
    }
}

impl From<serde_json::Error> for RegistryError {
    fn from(err: serde_json::Error) -> Self {
        Self::JsonError { source: err }
    }
}

impl From<serde_yaml::Error> for RegistryError {
    fn from(err: serde_yaml::Error) -> Self {
        Self::YamlError { source: err }
    }
}
