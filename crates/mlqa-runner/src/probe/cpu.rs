//! CPU utilization from `ps`

use mlqa_core::Unit;

use super::{Sample, Sampler, run_tool};
use crate::error::SamplerError;

/// Reads `%cpu` of a process, in percent of one core
#[derive(Debug, Clone, Default)]
pub struct CpuSampler;

impl CpuSampler {
    /// Create a sampler
    #[must_use]
    pub const fn new() -> Self {
        Self
    }
}

/// Last non-empty line of `ps -o %cpu` output as a number
fn parse_ps_cpu(output: &str) -> Option<f64> {
    output
        .lines()
        .map(str::trim)
        .rfind(|line| !line.is_empty())
        .and_then(|line| line.parse().ok())
}

impl Sampler for CpuSampler {
    fn native_unit(&self) -> Unit {
        Unit::Percent
    }

    fn sample(&self, pid: u32) -> Result<Sample, SamplerError> {
        let Some(output) = run_tool("ps", &["-p", &pid.to_string(), "-o", "%cpu"]) else {
            return Ok(Sample::Invalid);
        };
        Ok(parse_ps_cpu(&output).map_or(Sample::Invalid, Sample::Value))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_ps_output() {
        assert_eq!(parse_ps_cpu("%CPU\n 97.5\n"), Some(97.5));
        assert_eq!(parse_ps_cpu("%CPU\n"), None);
        assert_eq!(parse_ps_cpu(""), None);
    }

    #[cfg(unix)]
    #[test]
    fn test_sample_own_process() {
        let sample = CpuSampler::new().sample(std::process::id()).expect("sample");
        assert!(matches!(sample, Sample::Value(v) if v >= 0.0) || sample == Sample::Invalid);
    }

    #[cfg(unix)]
    #[test]
    fn test_sample_missing_pid_is_invalid() {
        let sample = CpuSampler::new().sample(u32::MAX - 1).expect("sample");
        assert_eq!(sample, Sample::Invalid);
    }
}
