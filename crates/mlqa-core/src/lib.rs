//! mlqa core
//!
//! Units and quantities, typed evidence, measurements and validators for ML
//! test and evaluation, plus the negotiation card and report artifacts.
//! Everything persistable implements [`Artifact`] and is written through an
//! [`mlqa_store::ArtifactStore`].

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![allow(clippy::missing_const_for_fn)]
#![allow(clippy::doc_markdown)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::cast_precision_loss)]
#![cfg_attr(test, allow(clippy::expect_used, clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::float_cmp))]

pub mod artifact;
pub mod error;
pub mod evidence;
pub mod measurement;
pub mod negotiation;
pub mod report;
pub mod result;
pub mod telemetry;
pub mod units;
pub mod validator;

pub use artifact::Artifact;
pub use error::{Error, Result};
pub use evidence::{
    Evidence, EvidenceMetadata, EvidenceType, EvidenceValue, FieldValue, MeasurementMetadata,
    Statistics, StatisticsKind,
};
pub use measurement::{ExternalMeasurement, LocalObjectSize, Measurement};
pub use negotiation::{NegotiationCard, QasDescriptor};
pub use report::Report;
pub use result::{ResultKind, ValidationResult};
pub use units::{Magnitude, Quantity, Unit, UnitError, quantity};
pub use validator::{BoolExp, Condition, Validator, Verdict, build_validator};
