//! Test cases: one measurement bound to its validators

use mlqa_core::validator::ValidatorModel;
use mlqa_core::{
    Evidence, EvidenceMetadata, ExternalMeasurement, LocalObjectSize, Measurement,
    ValidationResult, Validator,
};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;

use crate::error::Result;
use crate::monitor::ProcessMonitor;

/// How a test case collects its evidence
#[derive(Debug, Clone)]
pub enum CaseMeasurement {
    /// Runs in-process and returns immediately
    Standard(Arc<dyn Measurement>),
    /// Spawns or attaches to a process and monitors it
    Process(Arc<ProcessMonitor>),
}

impl CaseMeasurement {
    /// The measurement behind either variant
    #[must_use]
    pub fn as_measurement(&self) -> &dyn Measurement {
        match self {
            Self::Standard(m) => m.as_ref(),
            Self::Process(m) => &**m,
        }
    }

    /// Process group the measurement belongs to
    #[must_use]
    pub fn group(&self) -> Option<&str> {
        match self {
            Self::Standard(_) => None,
            Self::Process(m) => m.group(),
        }
    }

    /// Run the measurement
    ///
    /// # Errors
    ///
    /// Returns the measurement's error.
    pub fn evaluate(&self, args: &[Value]) -> Result<Evidence> {
        Ok(self.as_measurement().evaluate(args)?)
    }
}

impl From<LocalObjectSize> for CaseMeasurement {
    fn from(measurement: LocalObjectSize) -> Self {
        Self::Standard(Arc::new(measurement))
    }
}

impl From<ExternalMeasurement> for CaseMeasurement {
    fn from(measurement: ExternalMeasurement) -> Self {
        Self::Standard(Arc::new(measurement))
    }
}

impl From<Arc<dyn Measurement>> for CaseMeasurement {
    fn from(measurement: Arc<dyn Measurement>) -> Self {
        Self::Standard(measurement)
    }
}

impl From<ProcessMonitor> for CaseMeasurement {
    fn from(monitor: ProcessMonitor) -> Self {
        Self::Process(Arc::new(monitor))
    }
}

/// Serialized form of a test case
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TestCaseModel {
    /// Test case id
    pub identifier: String,
    /// What the case checks
    #[serde(default)]
    pub goal: Option<String>,
    /// Quality attribute scenario ids the case addresses
    #[serde(default)]
    pub quality_scenarios: Vec<String>,
    /// Descriptor of the measurement, as recorded in evidence metadata
    #[serde(default)]
    pub measurement: Option<EvidenceMetadata>,
    /// Validators
    #[serde(default)]
    pub validators: Vec<ValidatorModel>,
}

/// A measurement paired with the validators that judge its evidence
#[derive(Debug, Clone)]
pub struct TestCase {
    identifier: String,
    goal: Option<String>,
    quality_scenarios: Vec<String>,
    measurement: Option<CaseMeasurement>,
    descriptor: Option<EvidenceMetadata>,
    validators: Vec<Validator>,
}

impl TestCase {
    /// Test case with validators and no measurement
    #[must_use]
    pub fn new(identifier: impl Into<String>, validators: Vec<Validator>) -> Self {
        Self {
            identifier: identifier.into(),
            goal: None,
            quality_scenarios: Vec::new(),
            measurement: None,
            descriptor: None,
            validators,
        }
    }

    /// Attach the measurement that feeds this case
    ///
    /// # Errors
    ///
    /// Returns an invariant error if the measurement is for another test
    /// case, or if some validator cannot accept its output type.
    pub fn with_measurement(mut self, measurement: impl Into<CaseMeasurement>) -> Result<Self> {
        let measurement = measurement.into();
        let inner = measurement.as_measurement();
        if inner.test_case_id() != self.identifier {
            return Err(mlqa_core::Error::Invariant(format!(
                "measurement for '{}' attached to test case '{}'",
                inner.test_case_id(),
                self.identifier
            ))
            .into());
        }
        let output = inner.output_type();
        if let Some(validator) = self.validators.iter().find(|v| !v.accepts(output)) {
            let expected: Vec<String> = validator
                .input_types()
                .iter()
                .map(ToString::to_string)
                .collect();
            return Err(mlqa_core::Error::Invariant(format!(
                "test case '{}' produces {output}, validator expects {}",
                self.identifier,
                expected.join(" | ")
            ))
            .into());
        }
        self.descriptor = Some(inner.generate_metadata());
        self.measurement = Some(measurement);
        Ok(self)
    }

    /// Describe what the case checks
    #[must_use]
    pub fn with_goal(mut self, goal: impl Into<String>) -> Self {
        self.goal = Some(goal.into());
        self
    }

    /// Link quality attribute scenarios
    #[must_use]
    pub fn with_quality_scenarios(
        mut self,
        ids: impl IntoIterator<Item = impl Into<String>>,
    ) -> Self {
        self.quality_scenarios = ids.into_iter().map(Into::into).collect();
        self
    }

    /// Test case id
    #[must_use]
    pub fn identifier(&self) -> &str {
        &self.identifier
    }

    /// Goal
    #[must_use]
    pub fn goal(&self) -> Option<&str> {
        self.goal.as_deref()
    }

    /// Linked quality attribute scenario ids
    #[must_use]
    pub fn quality_scenarios(&self) -> &[String] {
        &self.quality_scenarios
    }

    /// Measurement, if attached or rebuilt
    #[must_use]
    pub const fn measurement(&self) -> Option<&CaseMeasurement> {
        self.measurement.as_ref()
    }

    /// Recorded descriptor of the measurement
    #[must_use]
    pub const fn descriptor(&self) -> Option<&EvidenceMetadata> {
        self.descriptor.as_ref()
    }

    /// Validators
    #[must_use]
    pub fn validators(&self) -> &[Validator] {
        &self.validators
    }

    /// Run every validator against `evidence`
    #[must_use]
    pub fn validate(&self, evidence: &Evidence) -> Vec<ValidationResult> {
        if self.validators.is_empty() {
            let result = ValidationResult::info(format!("no validators for '{}'", self.identifier));
            return vec![match evidence.metadata() {
                Some(md) => result.with_evidence_metadata(md.clone()),
                None => result,
            }];
        }
        self.validators.iter().map(|v| v.validate(evidence)).collect()
    }

    /// Serialized form
    #[must_use]
    pub fn to_model(&self) -> TestCaseModel {
        TestCaseModel {
            identifier: self.identifier.clone(),
            goal: self.goal.clone(),
            quality_scenarios: self.quality_scenarios.clone(),
            measurement: self.descriptor.clone(),
            validators: self.validators.iter().map(Validator::to_model).collect(),
        }
    }

    /// Rebuild without a runnable measurement
    ///
    /// # Errors
    ///
    /// Returns a deserialization error if a validator cannot be rebuilt.
    pub fn from_model(model: &TestCaseModel) -> Result<Self> {
        let validators = model
            .validators
            .iter()
            .map(Validator::from_model)
            .collect::<mlqa_core::Result<Vec<_>>>()?;
        Ok(Self {
            identifier: model.identifier.clone(),
            goal: model.goal.clone(),
            quality_scenarios: model.quality_scenarios.clone(),
            measurement: None,
            descriptor: model.measurement.clone(),
            validators,
        })
    }

    /// Restore a measurement rebuilt from the descriptor
    pub(crate) fn restore_measurement(&mut self, measurement: CaseMeasurement) {
        self.measurement = Some(measurement);
    }
}

impl PartialEq for TestCase {
    fn eq(&self, other: &Self) -> bool {
        self.to_model() == other.to_model()
    }
}

/// Reject a test case id the store could not use as a key
pub(crate) fn check_identifier(identifier: &str) -> Result<()> {
    mlqa_store::validate_identifier(identifier)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use mlqa_core::validator::builtin::{image, integer};
    use mlqa_core::{EvidenceType, ResultKind};

    #[test]
    fn test_measurement_must_match_id() {
        let err = TestCase::new("size", vec![])
            .with_measurement(LocalObjectSize::new("other"))
            .unwrap_err();
        assert_eq!(err.kind_name(), "InvariantError");
    }

    #[test]
    fn test_validator_types_checked() {
        let err = TestCase::new("pic", vec![integer::less_than(3)])
            .with_measurement(ExternalMeasurement::new("pic", EvidenceType::Image))
            .unwrap_err();
        assert!(err.to_string().contains("validator expects"));
        assert!(
            TestCase::new("pic", vec![image::register_info("attached")])
                .with_measurement(ExternalMeasurement::new("pic", EvidenceType::Image))
                .is_ok()
        );
    }

    #[test]
    fn test_roundtrip_keeps_descriptor() {
        let case = TestCase::new("size", vec![integer::less_than(1_000)])
            .with_measurement(LocalObjectSize::new("size"))
            .expect("case")
            .with_goal("model fits on device")
            .with_quality_scenarios(["card-qas_001"]);
        let model = case.to_model();
        let loaded = TestCase::from_model(&model).expect("load");
        assert_eq!(loaded, case);
        assert!(loaded.measurement().is_none());
        assert_eq!(
            loaded.descriptor().map(|d| d.measurement.measurement_class.as_str()),
            Some("mlqa_core::measurement::LocalObjectSize")
        );
    }

    #[test]
    fn test_validate_without_validators_is_info() {
        let case = TestCase::new("x", vec![]);
        let evidence = Evidence::new(mlqa_core::EvidenceValue::integer(1));
        let results = case.validate(&evidence);
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].kind, ResultKind::Info);
    }
}
