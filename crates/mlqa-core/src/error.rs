//! Error types for mlqa-core

use thiserror::Error;

use crate::units::UnitError;

/// Result type alias
pub type Result<T> = std::result::Result<T, Error>;

/// Errors raised by measurements, evidence, validators and artifacts
#[derive(Debug, Error)]
pub enum Error {
    /// Session context incomplete or invalid configuration
    #[error("Configuration error: {0}")]
    Config(String),

    /// Key absent in the artifact store
    #[error("Not found: {0}")]
    NotFound(String),

    /// Missing or mistyped field in canonical JSON
    #[error("Deserialization error: {0}")]
    Deserialization(String),

    /// Attempted to violate an immutability or structural invariant
    #[error("Invariant violated: {0}")]
    Invariant(String),

    /// Unknown unit or incompatible conversion
    #[error("Unit error: {0}")]
    Unit(#[from] UnitError),

    /// Store transport or persistence failure
    #[error("Store error: {0}")]
    Store(String),

    /// Measurement could not produce evidence
    #[error("Measurement error: {0}")]
    Measurement(String),

    /// IO error
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    /// Serialization error
    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),
}

impl Error {
    /// Stable name of the error kind, as reported in failure records
    #[must_use]
    pub const fn kind_name(&self) -> &'static str {
        match self {
            Self::Config(_) => "ConfigError",
            Self::NotFound(_) => "NotFoundError",
            Self::Deserialization(_) => "DeserializationError",
            Self::Invariant(_) => "InvariantError",
            Self::Unit(_) => "UnitError",
            Self::Store(_) => "StoreError",
            Self::Measurement(_) => "MeasurementError",
            Self::IoError(_) => "IOError",
            Self::SerializationError(_) => "SerializationError",
        }
    }

    /// Shorthand for a deserialization error about a missing field
    #[must_use]
    pub fn missing_field(field: &str) -> Self {
        Self::Deserialization(format!("missing field '{field}'"))
    }
}

impl From<mlqa_store::Error> for Error {
    fn from(err: mlqa_store::Error) -> Self {
        match err {
            mlqa_store::Error::NotFound { .. } => Self::NotFound(err.to_string()),
            mlqa_store::Error::Config(msg) => Self::Config(msg),
            other => Self::Store(other.to_string()),
        }
    }
}
