//! mlqa runner
//!
//! Collects evidence and turns it into test results. Process monitors attach
//! to a spawned subprocess and sample CPU, memory and GPU usage on worker
//! threads; test suites bind measurements to validators and run them;
//! the suite validator produces the persisted test results.

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![allow(clippy::missing_const_for_fn)]
#![allow(clippy::cast_precision_loss)]
#![allow(clippy::doc_markdown)]
#![allow(clippy::needless_pass_by_value)]
#![allow(clippy::module_name_repetitions)]
#![cfg_attr(test, allow(clippy::expect_used, clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::float_cmp))]
#![cfg_attr(test, allow(clippy::uninlined_format_args))]

pub mod error;
pub mod group;
pub mod monitor;
pub mod probe;
pub mod process;
pub mod registry;
pub mod suite;
pub mod suite_validator;
pub mod test_case;
pub mod test_results;

pub use error::{Error, Result, SamplerError};
pub use group::{ProcessMeasurementGroup, evaluate_groups, failure_evidence};
pub use monitor::{MonitorKind, ProcessMonitor};
pub use probe::{GpuBackend, MockGpu, MockSampler, NvidiaSmi, Sample, Sampler};
pub use process::{ExitSignal, ProcessGuard, process_alive, start_process, start_script};
pub use registry::MeasurementRegistry;
pub use suite::{RunConfig, TestSuite};
pub use suite_validator::TestSuiteValidator;
pub use test_case::{CaseMeasurement, TestCase};
pub use test_results::{CaseResults, TestResults};
