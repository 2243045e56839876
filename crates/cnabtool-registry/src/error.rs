//! Error types for registry operations.

use std::path::PathBuf;
use thiserror::Error;

use crate::transport::RegistryResponse;

/// Errors that can occur during registry operations.
#[derive(Debug, Error)]
pub enum RegistryError {
    /// Reference string does not follow `registry/repository[:tag][@sha256:digest]`.
    #[error("Invalid reference format: {reference} ({reason})")]
    InvalidReference {
        /// Reference string as given.
        reference: String,
        /// What part of the grammar was violated.
        reason: &'static str,
    },

    /// Connection-level failure (DNS, TLS, timeout, broken body stream).
    #[error("Network error talking to {url}: {source}")]
    Network {
        /// Request URL.
        url: String,
        /// Underlying error.
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    /// Manifest request answered with a status outside `{200, 400, 401, 404}`.
    #[error("Unexpected HTTP status {status} from {url}")]
    UnexpectedStatus {
        /// Request URL.
        url: String,
        /// HTTP status code.
        status: u16,
    },

    /// Response body is not valid JSON.
    #[error("Response body from {url} is not valid JSON (status {status}): {source}")]
    InvalidJson {
        /// Request URL.
        url: String,
        /// HTTP status code.
        status: u16,
        /// Underlying error.
        #[source]
        source: serde_json::Error,
    },

    /// Every candidate media type was rejected by the registry.
    #[error("No acceptable manifest representation at {url} (last status {})", .last.status)]
    NoAcceptableRepresentation {
        /// Request URL.
        url: String,
        /// Last response received, kept for reporting.
        last: Box<RegistryResponse>,
    },

    /// Tag list response does not carry a `tags` array of strings.
    #[error("Tag list from {url} is malformed: {message}")]
    InvalidTagList {
        /// Request URL.
        url: String,
        /// Error message.
        message: String,
    },

    /// Credentials could not be turned into a request header.
    #[error("Authentication failed: {message}")]
    Authentication {
        /// Error message.
        message: String,
    },

    /// Client configuration is unusable.
    #[error("Invalid registry configuration: {message}")]
    InvalidConfig {
        /// Error message.
        message: String,
    },

    /// File I/O error.
    #[error("File I/O error at {path}: {source}")]
    Io {
        /// File path.
        path: PathBuf,
        /// Underlying error.
        #[source]
        source: std::io::Error,
    },
}

impl RegistryError {
    /// Returns true if the error must abort the whole command.
    ///
    /// Per-fetch failures (bad status, bad JSON, no acceptable representation)
    /// only terminate the single fetch and let the caller carry on.
    #[must_use]
    pub const fn is_fatal(&self) -> bool {
        matches!(
            self,
            Self::InvalidReference { .. }
                | Self::Network { .. }
                | Self::Authentication { .. }
                | Self::InvalidConfig { .. }
                | Self::Io { .. }
        )
    }

    /// Wraps a connection-level failure for `url`.
    pub fn network(
        url: &str,
        source: impl Into<Box<dyn std::error::Error + Send + Sync>>,
    ) -> Self {
        Self::Network {
            url: url.to_string(),
            source: source.into(),
        }
    }
}
