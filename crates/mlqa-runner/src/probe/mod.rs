//! Resource probes
//!
//! A probe reads one instantaneous value for a pid (or a set of GPUs) in its
//! native unit. Monitors call it once per poll tick.

mod cpu;
mod gpu;
mod memory;

pub use cpu::CpuSampler;
pub use gpu::{GpuBackend, GpuMemorySampler, GpuPowerSampler, MockGpu, NvidiaSmi};
pub use memory::MemorySampler;

use mlqa_core::Unit;
use std::collections::VecDeque;
use std::fmt;
use std::process::Command;
use std::sync::{Mutex, PoisonError};

use crate::error::SamplerError;

/// One probe reading
#[derive(Debug, Clone, PartialEq)]
pub enum Sample {
    /// Single reading
    Value(f64),
    /// One reading per device, in request order
    PerDevice(Vec<f64>),
    /// The process is gone or the tool could not read it; stop sampling
    Invalid,
}

/// Reads resource usage of a live process
pub trait Sampler: Send + Sync + fmt::Debug {
    /// Unit of the values returned by [`Sampler::sample`]
    fn native_unit(&self) -> Unit;

    /// Take one reading
    ///
    /// # Errors
    ///
    /// Returns [`SamplerError::Unavailable`] when the backing library is
    /// missing; the monitor reports it as a failure.
    fn sample(&self, pid: u32) -> Result<Sample, SamplerError>;
}

/// Run a probe tool, mapping a missing or failing tool to `None`
pub(crate) fn run_tool(program: &str, args: &[&str]) -> Option<String> {
    match Command::new(program).args(args).output() {
        Ok(out) if out.status.success() => Some(String::from_utf8_lossy(&out.stdout).into_owned()),
        Ok(out) => {
            tracing::debug!(program, status = ?out.status, "probe tool failed");
            None
        }
        Err(e) => {
            tracing::warn!(program, error = %e, "probe tool unavailable");
            None
        }
    }
}

/// Scripted step of a [`MockSampler`]
#[derive(Debug, Clone, PartialEq)]
pub enum MockStep {
    /// Return this sample
    Sample(Sample),
    /// Fail with [`SamplerError::Unavailable`]
    Unavailable(String),
    /// Panic inside the monitor thread
    Panic(String),
}

/// Sampler that replays a script, repeating the last step once exhausted
#[derive(Debug)]
pub struct MockSampler {
    unit: Unit,
    steps: Mutex<VecDeque<MockStep>>,
    last: Mutex<Option<MockStep>>,
}

impl MockSampler {
    /// Empty script; every call returns [`Sample::Invalid`]
    #[must_use]
    pub fn new(unit: Unit) -> Self {
        Self {
            unit,
            steps: Mutex::new(VecDeque::new()),
            last: Mutex::new(None),
        }
    }

    /// Append single-value readings
    #[must_use]
    pub fn with_values(self, values: impl IntoIterator<Item = f64>) -> Self {
        values
            .into_iter()
            .fold(self, |mock, v| mock.with_step(MockStep::Sample(Sample::Value(v))))
    }

    /// Append one step
    #[must_use]
    pub fn with_step(self, step: MockStep) -> Self {
        self.steps
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push_back(step);
        self
    }

    /// Sampler that reports a missing backend on every call
    #[must_use]
    pub fn unavailable(unit: Unit, reason: impl Into<String>) -> Self {
        Self::new(unit).with_step(MockStep::Unavailable(reason.into()))
    }
}

impl Sampler for MockSampler {
    fn native_unit(&self) -> Unit {
        self.unit
    }

    fn sample(&self, _pid: u32) -> Result<Sample, SamplerError> {
        let next = self
            .steps
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .pop_front();
        let mut last = self.last.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(step) = next {
            *last = Some(step);
        }
        match last.clone() {
            None => Ok(Sample::Invalid),
            Some(MockStep::Sample(sample)) => Ok(sample),
            Some(MockStep::Unavailable(reason)) => Err(SamplerError::Unavailable(reason)),
            Some(MockStep::Panic(message)) => {
                drop(last);
                panic!("{message}")
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mock_sampler_replays_then_repeats() {
        let mock = MockSampler::new(Unit::Percent).with_values([1.0, 2.0]);
        assert_eq!(mock.sample(1).expect("sample"), Sample::Value(1.0));
        assert_eq!(mock.sample(1).expect("sample"), Sample::Value(2.0));
        assert_eq!(mock.sample(1).expect("sample"), Sample::Value(2.0));
    }

    #[test]
    fn test_mock_sampler_empty_is_invalid() {
        let mock = MockSampler::new(Unit::Kibibyte);
        assert_eq!(mock.sample(1).expect("sample"), Sample::Invalid);
        assert_eq!(mock.native_unit(), Unit::Kibibyte);
    }

    #[test]
    fn test_mock_sampler_unavailable() {
        let mock = MockSampler::unavailable(Unit::Mebibyte, "no GPU library");
        let err = mock.sample(1).unwrap_err();
        assert!(err.to_string().contains("no GPU library"));
    }

    #[test]
    fn test_run_tool_missing_program() {
        assert!(run_tool("/nonexistent/mlqa-probe", &[]).is_none());
    }
}
