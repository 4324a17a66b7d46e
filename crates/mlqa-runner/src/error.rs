//! Error types for mlqa-runner

use thiserror::Error;

/// Result type alias
pub type Result<T> = std::result::Result<T, Error>;

/// Failure to read one sample from a probe
///
/// Captured per monitor; it never crosses a process group boundary.
#[derive(Debug, Error)]
pub enum SamplerError {
    /// Probe backend (tool or library) is not installed
    #[error("probe unavailable: {0}")]
    Unavailable(String),

    /// Probe output could not be parsed
    #[error("unparseable probe output: {0}")]
    Parse(String),

    /// IO error while running the probe
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Errors raised while running measurements and test suites
#[derive(Debug, Error)]
pub enum Error {
    /// Subprocess could not be created
    #[error("Spawn failed: {command} - {reason}")]
    Spawn {
        /// Command line
        command: String,
        /// Reason for failure
        reason: String,
    },

    /// Probe failure
    #[error("Sampler error: {0}")]
    Sampler(#[from] SamplerError),

    /// A monitor or measurement panicked
    #[error("Panicked: {0}")]
    MonitorPanic(String),

    /// Evidence, validator or artifact error
    #[error(transparent)]
    Core(#[from] mlqa_core::Error),

    /// Input or evidence keyed by an id the suite does not declare
    #[error("Unknown test case: {0}")]
    UnknownTestCase(String),

    /// Two test cases share an id
    #[error("Duplicate test case: {0}")]
    DuplicateTestCase(String),

    /// A measurement was run without the inputs it needs
    #[error("Missing input: {0}")]
    MissingInput(String),

    /// IO error
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
}

impl Error {
    /// Stable name of the error kind, as reported in failure records
    #[must_use]
    pub const fn kind_name(&self) -> &'static str {
        match self {
            Self::Spawn { .. } => "SpawnError",
            Self::Sampler(_) => "SamplerError",
            Self::MonitorPanic(_) => "PanicError",
            Self::Core(err) => err.kind_name(),
            Self::UnknownTestCase(_) | Self::DuplicateTestCase(_) => "InvariantError",
            Self::MissingInput(_) => "ConfigError",
            Self::IoError(_) => "IOError",
        }
    }
}

impl From<mlqa_store::Error> for Error {
    fn from(err: mlqa_store::Error) -> Self {
        Self::Core(err.into())
    }
}

impl From<Error> for mlqa_core::Error {
    fn from(err: Error) -> Self {
        match err {
            Error::Core(inner) => inner,
            other => Self::Measurement(other.to_string()),
        }
    }
}

/// Messages of an error and its sources, outermost first
#[must_use]
pub fn error_chain(err: &dyn std::error::Error) -> Vec<String> {
    std::iter::successors(Some(err), |e| e.source())
        .map(ToString::to_string)
        .collect()
}
