//! mlqa
//!
//! Machine-learning test and evaluation. Declare a test suite of measurable
//! properties, collect evidence in-process or by monitoring an external
//! process, validate it against thresholds, and persist every artifact to a
//! model/version scoped store.
//!
//! This crate re-exports the workspace members:
//! - [`store`]: artifact stores and the session context
//! - [`core`]: units, evidence, validators, measurements and artifacts
//! - [`runner`]: process monitoring, test suites and test results

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub use mlqa_core as core;
pub use mlqa_runner as runner;
pub use mlqa_store as store;

pub use mlqa_core::{
    Artifact, Evidence, EvidenceMetadata, EvidenceType, EvidenceValue, Measurement,
    NegotiationCard, Quantity, Report, ResultKind, Unit, ValidationResult, Validator,
};
pub use mlqa_runner::{
    ProcessMeasurementGroup, ProcessMonitor, TestCase, TestResults, TestSuite, TestSuiteValidator,
};
pub use mlqa_store::{ArtifactKind, ArtifactStore, Context, open_store};
