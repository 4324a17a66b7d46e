//! Validation results

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::evidence::{EvidenceMetadata, FieldValue};

/// Outcome category of a validation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ResultKind {
    /// Condition held
    Success,
    /// Condition did not hold, or evidence could not be checked
    Failure,
    /// Informational record
    Info,
}

impl fmt::Display for ResultKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Success => "Success",
            Self::Failure => "Failure",
            Self::Info => "Info",
        };
        f.write_str(s)
    }
}

/// One validator's verdict on one piece of evidence
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValidationResult {
    /// Outcome
    pub kind: ResultKind,
    /// Interpolated message
    pub message: String,
    /// Thresholds the validator compared against
    #[serde(default)]
    pub thresholds: Vec<FieldValue>,
    /// Source text of the validator's predicate
    #[serde(default)]
    pub validator: Option<String>,
    /// Provenance of the evidence that was validated
    #[serde(default)]
    pub metadata: Option<EvidenceMetadata>,
}

impl ValidationResult {
    fn with_kind(kind: ResultKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            thresholds: Vec::new(),
            validator: None,
            metadata: None,
        }
    }

    /// Success record
    #[must_use]
    pub fn success(message: impl Into<String>) -> Self {
        Self::with_kind(ResultKind::Success, message)
    }

    /// Failure record
    #[must_use]
    pub fn failure(message: impl Into<String>) -> Self {
        Self::with_kind(ResultKind::Failure, message)
    }

    /// Informational record
    #[must_use]
    pub fn info(message: impl Into<String>) -> Self {
        Self::with_kind(ResultKind::Info, message)
    }

    /// Attach evidence provenance
    #[must_use]
    pub fn with_evidence_metadata(mut self, metadata: EvidenceMetadata) -> Self {
        self.metadata = Some(metadata);
        self
    }

    /// Whether this is a success
    #[must_use]
    pub const fn is_success(&self) -> bool {
        matches!(self.kind, ResultKind::Success)
    }

    /// Whether this is a failure
    #[must_use]
    pub const fn is_failure(&self) -> bool {
        matches!(self.kind, ResultKind::Failure)
    }
}

impl fmt::Display for ValidationResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.kind, self.message)
    }
}
