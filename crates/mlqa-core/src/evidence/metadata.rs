//! Provenance attached to every piece of evidence

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Which measurement produced the evidence, and what it declared to output
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MeasurementMetadata {
    /// Fully-qualified name of the measurement type
    pub measurement_class: String,
    /// Fully-qualified name of the evidence type it outputs
    pub output_class: String,
}

/// Provenance of one piece of evidence
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EvidenceMetadata {
    /// Test case that the evidence belongs to
    pub test_case_id: String,
    /// Producing measurement
    pub measurement: MeasurementMetadata,
    /// Free-form measurement settings (poll interval, function name, ...)
    #[serde(default)]
    pub additional_data: BTreeMap<String, String>,
}

impl EvidenceMetadata {
    /// Create metadata with no additional data
    #[must_use]
    pub fn new(
        test_case_id: impl Into<String>,
        measurement_class: impl Into<String>,
        output_class: impl Into<String>,
    ) -> Self {
        Self {
            test_case_id: test_case_id.into(),
            measurement: MeasurementMetadata {
                measurement_class: measurement_class.into(),
                output_class: output_class.into(),
            },
            additional_data: BTreeMap::new(),
        }
    }

    /// Add one additional-data entry
    #[must_use]
    pub fn with_data(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.additional_data.insert(key.into(), value.into());
        self
    }
}
