//! Resident memory of a process

use mlqa_core::Unit;
use std::path::PathBuf;

use super::{Sample, Sampler, run_tool};
use crate::error::SamplerError;

/// Reads resident memory in KiB from `/proc/<pid>/status`, falling back to
/// the total line of `pmap`
#[derive(Debug, Clone)]
pub struct MemorySampler {
    proc_root: PathBuf,
}

impl Default for MemorySampler {
    fn default() -> Self {
        Self {
            proc_root: PathBuf::from("/proc"),
        }
    }
}

impl MemorySampler {
    /// Create a sampler
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn from_proc(&self, pid: u32) -> Option<f64> {
        let path = self.proc_root.join(pid.to_string()).join("status");
        let status = std::fs::read_to_string(path).ok()?;
        parse_vm_rss(&status)
    }
}

/// `VmRSS:   1234 kB` from a status file
fn parse_vm_rss(status: &str) -> Option<f64> {
    status
        .lines()
        .find_map(|line| line.strip_prefix("VmRSS:"))
        .and_then(|rest| rest.split_whitespace().next())
        .and_then(|n| n.parse().ok())
}

/// Second column of the last `pmap` line, e.g. ` total    10268K`
fn parse_pmap_total(output: &str) -> Option<f64> {
    output
        .lines()
        .rfind(|line| !line.trim().is_empty())
        .and_then(|line| line.split_whitespace().nth(1))
        .map(|n| n.trim_end_matches(['K', 'k']))
        .and_then(|n| n.parse().ok())
}

impl Sampler for MemorySampler {
    fn native_unit(&self) -> Unit {
        Unit::Kibibyte
    }

    fn sample(&self, pid: u32) -> Result<Sample, SamplerError> {
        if self.proc_root.is_dir() {
            return Ok(self.from_proc(pid).map_or(Sample::Invalid, Sample::Value));
        }
        let pid = pid.to_string();
        let Some(output) = run_tool("pmap", &[pid.as_str()]) else {
            return Ok(Sample::Invalid);
        };
        Ok(parse_pmap_total(&output).map_or(Sample::Invalid, Sample::Value))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_vm_rss() {
        let status = "Name:\tcat\nVmPeak:\t  9000 kB\nVmRSS:\t  1844 kB\nThreads: 1\n";
        assert_eq!(parse_vm_rss(status), Some(1844.0));
        assert_eq!(parse_vm_rss("Name:\tzombie\n"), None);
    }

    #[test]
    fn test_parse_pmap_total() {
        let out = "1234:   sleep 10\n0000555 100K r-x-- sleep\n total    10268K\n";
        assert_eq!(parse_pmap_total(out), Some(10268.0));
        assert_eq!(parse_pmap_total(""), None);
    }

    #[test]
    fn test_fake_proc_root() {
        let dir = tempfile::tempdir().expect("tempdir");
        std::fs::create_dir(dir.path().join("7")).expect("mkdir");
        std::fs::write(dir.path().join("7/status"), "VmRSS:\t 512 kB\n").expect("write");
        let sampler = MemorySampler {
            proc_root: dir.path().to_path_buf(),
        };
        assert_eq!(sampler.sample(7).expect("sample"), Sample::Value(512.0));
        assert_eq!(sampler.sample(8).expect("sample"), Sample::Invalid);
    }
}
