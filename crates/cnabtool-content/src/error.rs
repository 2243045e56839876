//! Error types for content operations.

use cnabtool_registry::RegistryError;
use thiserror::Error;

/// Result type alias using [`ContentError`].
pub type Result<T> = std::result::Result<T, ContentError>;

/// Errors that can occur while building or acting on the content graph.
#[derive(Error, Debug)]
pub enum ContentError {
    /// A CNAB index has no `manifests` array.
    #[error("CNAB index {digest} has no manifests array: {reason}")]
    MissingManifestsKey {
        /// Digest of the offending index.
        digest: String,
        /// What was found instead.
        reason: String,
    },

    /// The reference the command started from is not an OCI index.
    #[error("Unexpected media type {media} for {reference}, must be a CNAB index")]
    UnexpectedRootMediaType {
        /// Root reference.
        reference: String,
        /// Media type the registry returned.
        media: String,
        /// Body of the response, for diagnostics.
        content: String,
    },

    /// The deletion target is not in the graph.
    #[error("Tag {tag} was not found in the inspected content")]
    TargetNotFound {
        /// Requested tag.
        tag: String,
    },

    /// Registry operation failed.
    #[error(transparent)]
    Registry(#[from] RegistryError),
}

impl ContentError {
    /// Returns true if the command cannot continue after this error.
    ///
    /// Only per-fetch registry errors and malformed indexes are recoverable;
    /// a bad root or a missing target stops the command.
    #[must_use]
    pub const fn is_fatal(&self) -> bool {
        match self {
            Self::MissingManifestsKey { .. } => false,
            Self::UnexpectedRootMediaType { .. } | Self::TargetNotFound { .. } => true,
            Self::Registry(e) => e.is_fatal(),
        }
    }
}
