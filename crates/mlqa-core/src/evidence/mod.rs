//! Evidence: typed, serializable measurement outputs with provenance
//!
//! Canonical JSON:
//!
//! ```json
//! {"type": "integer",
//!  "metadata": {"test_case_id": "...", "measurement": {...}, "additional_data": {}},
//!  "payload": {"magnitude": 42, "unit": "meter"}}
//! ```

mod metadata;
mod statistics;
mod value;

pub use metadata::{EvidenceMetadata, MeasurementMetadata};
pub use statistics::{Statistics, StatisticsKind};
pub use value::{EvidenceType, EvidenceValue, FieldValue, Scalar};

use mlqa_store::ArtifactKind;
use serde_json::{Map, Value};
use std::fmt;

use crate::artifact::Artifact;
use crate::error::{Error, Result};

const EVIDENCE_SUFFIX: &str = "evidence";
const DEFAULT_TEST_CASE: &str = "default";

/// Identifier under which evidence for a test case is stored
#[must_use]
pub fn evidence_identifier(test_case_id: &str) -> String {
    format!("{test_case_id}.{EVIDENCE_SUFFIX}")
}

/// A measurement output plus the provenance it was bound to
#[derive(Debug, Clone)]
pub struct Evidence {
    value: EvidenceValue,
    metadata: Option<EvidenceMetadata>,
}

impl Evidence {
    /// Wrap a value; metadata is bound later with [`Evidence::with_metadata`]
    #[must_use]
    pub const fn new(value: EvidenceValue) -> Self {
        Self {
            value,
            metadata: None,
        }
    }

    /// Failure placeholder for a test case whose evidence could not be collected
    #[must_use]
    pub fn failure(
        metadata: EvidenceMetadata,
        kind: impl Into<String>,
        message: impl Into<String>,
        trace: Vec<String>,
    ) -> Self {
        Self {
            value: EvidenceValue::Failure {
                kind: kind.into(),
                message: message.into(),
                trace,
            },
            metadata: Some(metadata),
        }
    }

    /// Bind provenance. Evidence is immutable afterwards.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Invariant`] if metadata is already bound.
    pub fn with_metadata(mut self, metadata: EvidenceMetadata) -> Result<Self> {
        self.bind_metadata(metadata)?;
        Ok(self)
    }

    /// In-place form of [`Evidence::with_metadata`]
    ///
    /// # Errors
    ///
    /// Returns [`Error::Invariant`] if metadata is already bound.
    pub fn bind_metadata(&mut self, metadata: EvidenceMetadata) -> Result<()> {
        if let Some(existing) = &self.metadata {
            return Err(Error::Invariant(format!(
                "evidence for '{}' already has metadata",
                existing.test_case_id
            )));
        }
        self.metadata = Some(metadata);
        Ok(())
    }

    /// Payload
    #[must_use]
    pub const fn value(&self) -> &EvidenceValue {
        &self.value
    }

    /// Consume into the payload
    #[must_use]
    pub fn into_value(self) -> EvidenceValue {
        self.value
    }

    /// Bound provenance, if any
    #[must_use]
    pub const fn metadata(&self) -> Option<&EvidenceMetadata> {
        self.metadata.as_ref()
    }

    /// Test case this evidence belongs to
    #[must_use]
    pub fn test_case_id(&self) -> Option<&str> {
        self.metadata.as_ref().map(|m| m.test_case_id.as_str())
    }

    /// Type tag of the payload
    #[must_use]
    pub fn evidence_type(&self) -> EvidenceType {
        self.value.evidence_type()
    }

    /// Whether this is a failure placeholder
    #[must_use]
    pub const fn is_failure(&self) -> bool {
        self.value.is_failure()
    }

    /// Read a named field (see [`EvidenceValue::field`])
    ///
    /// # Errors
    ///
    /// Returns [`Error::Deserialization`] if the field does not exist.
    pub fn field(&self, name: &str) -> Result<FieldValue> {
        self.value.field(name)
    }
}

impl PartialEq for Evidence {
    /// Payload and test case only; the rest of the provenance is ignored.
    fn eq(&self, other: &Self) -> bool {
        self.value == other.value && self.test_case_id() == other.test_case_id()
    }
}

impl fmt::Display for Evidence {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.value)
    }
}

impl Artifact for Evidence {
    const KIND: ArtifactKind = ArtifactKind::Evidence;

    fn identifier(&self) -> String {
        evidence_identifier(self.test_case_id().unwrap_or(DEFAULT_TEST_CASE))
    }

    fn to_model(&self) -> Result<Value> {
        let metadata = self.metadata.as_ref().ok_or_else(|| {
            Error::Invariant("evidence must carry metadata before it is persisted".to_string())
        })?;
        if !self.value.is_finite() {
            return Err(Error::Invariant(format!(
                "evidence '{}' holds a non-finite number and cannot be persisted",
                metadata.test_case_id
            )));
        }
        let mut model = Map::new();
        model.insert(
            "type".to_string(),
            Value::String(self.evidence_type().tag().to_string()),
        );
        model.insert("metadata".to_string(), serde_json::to_value(metadata)?);
        model.insert("payload".to_string(), self.value.to_payload());
        Ok(Value::Object(model))
    }

    fn from_model(model: &Value) -> Result<Self> {
        let tag = model
            .get("type")
            .and_then(Value::as_str)
            .ok_or_else(|| Error::missing_field("type"))?;
        let ty = EvidenceType::from_tag(tag)
            .ok_or_else(|| Error::Deserialization(format!("unknown evidence type '{tag}'")))?;
        let metadata = model
            .get("metadata")
            .ok_or_else(|| Error::missing_field("metadata"))?;
        let metadata: EvidenceMetadata = serde_json::from_value(metadata.clone())
            .map_err(|e| Error::Deserialization(format!("invalid evidence metadata: {e}")))?;
        let payload = model
            .get("payload")
            .ok_or_else(|| Error::missing_field("payload"))?;
        let value = EvidenceValue::from_payload(ty, payload)?;
        Ok(Self {
            value,
            metadata: Some(metadata),
        })
    }
}
