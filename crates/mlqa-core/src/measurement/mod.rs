//! Synchronous measurements that produce evidence

mod external;
mod object_size;

pub use external::{ExternalFn, ExternalMeasurement, wrap_output};
pub use object_size::LocalObjectSize;

use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;

use crate::error::{Error, Result};
use crate::evidence::{Evidence, EvidenceMetadata, EvidenceType, EvidenceValue};

/// Module path prefix used for built-in measurement class names
pub const MEASUREMENT_MODULE: &str = "mlqa_core::measurement";

/// Something that produces evidence for one test case
///
/// Arguments are passed as JSON values so that suites can store and replay
/// them; process monitors take the command line as a list of strings.
pub trait Measurement: Send + Sync + fmt::Debug {
    /// Test case this measurement feeds
    fn test_case_id(&self) -> &str;

    /// Fully-qualified type name, recorded as `measurement_class`
    fn class_name(&self) -> String;

    /// Evidence type produced
    fn output_type(&self) -> EvidenceType;

    /// Settings recorded in every evidence's metadata
    fn additional_data(&self) -> BTreeMap<String, String> {
        BTreeMap::new()
    }

    /// Produce the raw value
    ///
    /// # Errors
    ///
    /// Returns an error if the value cannot be measured.
    fn measure(&self, args: &[Value]) -> Result<EvidenceValue>;

    /// Provenance bound to produced evidence
    fn generate_metadata(&self) -> EvidenceMetadata {
        EvidenceMetadata {
            test_case_id: self.test_case_id().to_string(),
            measurement: crate::evidence::MeasurementMetadata {
                measurement_class: self.class_name(),
                output_class: self.output_type().qualified_name(),
            },
            additional_data: self.additional_data(),
        }
    }

    /// Measure and bind metadata
    ///
    /// # Errors
    ///
    /// Returns an error if measuring fails or the value does not match
    /// [`Measurement::output_type`].
    fn evaluate(&self, args: &[Value]) -> Result<Evidence> {
        let value = self.measure(args)?;
        check_output(self, &value)?;
        Evidence::new(value).with_metadata(self.generate_metadata())
    }
}

/// Verify a produced value against the declared output type
///
/// # Errors
///
/// Returns [`Error::Measurement`] on mismatch.
pub fn check_output<M: Measurement + ?Sized>(measurement: &M, value: &EvidenceValue) -> Result<()> {
    let produced = value.evidence_type();
    if produced.satisfies(measurement.output_type()) {
        Ok(())
    } else {
        Err(Error::Measurement(format!(
            "{} produced {produced}, declared {}",
            measurement.class_name(),
            measurement.output_type()
        )))
    }
}

impl PartialEq for dyn Measurement {
    fn eq(&self, other: &Self) -> bool {
        self.class_name() == other.class_name()
            && self.generate_metadata() == other.generate_metadata()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::units::Unit;

    #[derive(Debug)]
    struct Constant {
        id: String,
        declared: EvidenceType,
    }

    impl Measurement for Constant {
        fn test_case_id(&self) -> &str {
            &self.id
        }

        fn class_name(&self) -> String {
            "tests::Constant".to_string()
        }

        fn output_type(&self) -> EvidenceType {
            self.declared
        }

        fn measure(&self, _args: &[Value]) -> Result<EvidenceValue> {
            Ok(EvidenceValue::Integer {
                value: 42,
                unit: Some(Unit::Meter),
            })
        }
    }

    #[test]
    fn test_evaluate_binds_metadata() {
        let m = Constant {
            id: "t".into(),
            declared: EvidenceType::Integer,
        };
        let e = m.evaluate(&[]).expect("evaluate");
        let md = e.metadata().expect("metadata");
        assert_eq!(md.measurement.measurement_class, m.class_name());
        assert_eq!(md.measurement.output_class, "mlqa_core::evidence::Integer");
        assert_eq!(md.test_case_id, "t");
    }

    #[test]
    fn test_evaluate_rejects_wrong_output() {
        let m = Constant {
            id: "t".into(),
            declared: EvidenceType::Real,
        };
        let err = m.evaluate(&[]).unwrap_err();
        assert!(matches!(err, Error::Measurement(_)));
    }

    #[test]
    fn test_equality_by_class_and_metadata() {
        let a: Box<dyn Measurement> = Box::new(Constant {
            id: "t".into(),
            declared: EvidenceType::Integer,
        });
        let b: Box<dyn Measurement> = Box::new(Constant {
            id: "t".into(),
            declared: EvidenceType::Integer,
        });
        let c: Box<dyn Measurement> = Box::new(Constant {
            id: "u".into(),
            declared: EvidenceType::Integer,
        });
        assert!(*a == *b);
        assert!(*a != *c);
    }
}
