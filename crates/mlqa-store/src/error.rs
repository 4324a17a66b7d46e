//! Error types for mlqa-store

use thiserror::Error;

/// Result type alias
pub type Result<T> = std::result::Result<T, Error>;

/// Errors raised by artifact stores and the session context
#[derive(Debug, Error)]
pub enum Error {
    /// No artifact is stored under the requested key
    #[error("Not found: {kind} '{identifier}'")]
    NotFound {
        /// Artifact kind (or "model" / "version" for scopes)
        kind: String,
        /// Identifier that was looked up
        identifier: String,
    },

    /// Session context or store configuration is incomplete or invalid
    #[error("Configuration error: {0}")]
    Config(String),

    /// The remote store reported an internal failure (HTTP 500)
    #[error("Internal store error: {0}")]
    Internal(String),

    /// The remote store answered with an unexpected status
    #[error("HTTP error {status}: {message}")]
    Http {
        /// HTTP status code
        status: u16,
        /// Response body or reason phrase
        message: String,
    },

    /// The remote store could not be reached
    #[error("Transport error: {0}")]
    Transport(String),

    /// Identifier cannot be used as a storage key
    #[error("Invalid identifier: '{0}'")]
    InvalidIdentifier(String),

    /// IO error
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    /// Serialization error
    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),

    /// YAML error
    #[error("YAML error: {0}")]
    YamlError(#[from] serde_yaml::Error),
}

impl Error {
    /// Build a [`Error::NotFound`] for the given kind and identifier
    #[must_use]
    pub fn not_found(kind: impl Into<String>, identifier: impl Into<String>) -> Self {
        Self::NotFound {
            kind: kind.into(),
            identifier: identifier.into(),
        }
    }

    /// Whether this error means the key is absent
    #[must_use]
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }
}
