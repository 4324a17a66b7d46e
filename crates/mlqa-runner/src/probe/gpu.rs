//! GPU memory and power probes

use mlqa_core::Unit;
use std::collections::BTreeMap;
use std::fmt;
use std::io::ErrorKind;
use std::process::Command;
use std::sync::Arc;

use super::{Sample, Sampler};
use crate::error::SamplerError;

/// Per-device readings from a GPU management backend
///
/// `Ok(None)` means the device has no reading right now; an error means the
/// backend itself is unusable.
pub trait GpuBackend: Send + Sync + fmt::Debug {
    /// Used device memory in MiB
    ///
    /// # Errors
    ///
    /// Returns [`SamplerError::Unavailable`] if the backend is missing.
    fn memory_used_mib(&self, gpu_id: u32) -> Result<Option<f64>, SamplerError>;

    /// Instantaneous power draw in milliwatts
    ///
    /// # Errors
    ///
    /// Returns [`SamplerError::Unavailable`] if the backend is missing.
    fn power_milliwatts(&self, gpu_id: u32) -> Result<Option<f64>, SamplerError>;
}

/// Backend that queries `nvidia-smi`
#[derive(Debug, Clone)]
pub struct NvidiaSmi {
    binary: String,
}

impl Default for NvidiaSmi {
    fn default() -> Self {
        Self {
            binary: "nvidia-smi".to_string(),
        }
    }
}

impl NvidiaSmi {
    /// Use `nvidia-smi` from `PATH`
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Use a specific binary
    #[must_use]
    pub fn with_binary(binary: impl Into<String>) -> Self {
        Self {
            binary: binary.into(),
        }
    }

    fn query(&self, gpu_id: u32, field: &str) -> Result<Option<f64>, SamplerError> {
        let output = Command::new(&self.binary)
            .arg(format!("--query-gpu={field}"))
            .args(["--format=csv,noheader,nounits", "-i"])
            .arg(gpu_id.to_string())
            .output()
            .map_err(|e| match e.kind() {
                ErrorKind::NotFound => SamplerError::Unavailable(format!(
                    "GPU management tool '{}' not found",
                    self.binary
                )),
                _ => SamplerError::Io(e),
            })?;
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            let stdout = String::from_utf8_lossy(&output.stdout);
            let reason = if stderr.trim().is_empty() { stdout } else { stderr };
            return Err(SamplerError::Unavailable(format!(
                "{} failed for GPU {gpu_id}: {}",
                self.binary,
                reason.trim()
            )));
        }
        Ok(parse_reading(&String::from_utf8_lossy(&output.stdout)))
    }
}

/// First line of a `nounits` CSV query; `[N/A]` and friends read as `None`
fn parse_reading(output: &str) -> Option<f64> {
    output.lines().next().and_then(|line| line.trim().parse().ok())
}

impl GpuBackend for NvidiaSmi {
    fn memory_used_mib(&self, gpu_id: u32) -> Result<Option<f64>, SamplerError> {
        self.query(gpu_id, "memory.used")
    }

    fn power_milliwatts(&self, gpu_id: u32) -> Result<Option<f64>, SamplerError> {
        Ok(self.query(gpu_id, "power.draw")?.map(|watts| watts * 1000.0))
    }
}

/// In-memory GPU backend for tests and machines without GPUs
#[derive(Debug, Clone, Default)]
pub struct MockGpu {
    /// Used memory per device, MiB
    pub memory_mib: BTreeMap<u32, f64>,
    /// Power draw per device, mW
    pub power_mw: BTreeMap<u32, f64>,
    /// When set, every call fails with this reason
    pub unavailable: Option<String>,
}

impl MockGpu {
    /// Backend with no devices
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a device
    #[must_use]
    pub fn with_device(mut self, gpu_id: u32, memory_mib: f64, power_mw: f64) -> Self {
        self.memory_mib.insert(gpu_id, memory_mib);
        self.power_mw.insert(gpu_id, power_mw);
        self
    }

    /// Backend whose library cannot be loaded
    #[must_use]
    pub fn missing_library(reason: impl Into<String>) -> Self {
        Self {
            unavailable: Some(reason.into()),
            ..Self::default()
        }
    }

    fn check(&self) -> Result<(), SamplerError> {
        self.unavailable
            .as_ref()
            .map_or(Ok(()), |reason| Err(SamplerError::Unavailable(reason.clone())))
    }
}

impl GpuBackend for MockGpu {
    fn memory_used_mib(&self, gpu_id: u32) -> Result<Option<f64>, SamplerError> {
        self.check()?;
        Ok(self.memory_mib.get(&gpu_id).copied())
    }

    fn power_milliwatts(&self, gpu_id: u32) -> Result<Option<f64>, SamplerError> {
        self.check()?;
        Ok(self.power_mw.get(&gpu_id).copied())
    }
}

/// Used memory summed across the requested GPUs, in MiB
#[derive(Debug, Clone)]
pub struct GpuMemorySampler {
    backend: Arc<dyn GpuBackend>,
    gpu_ids: Vec<u32>,
}

impl GpuMemorySampler {
    /// Sample `gpu_ids` through `backend`
    #[must_use]
    pub fn new(backend: Arc<dyn GpuBackend>, gpu_ids: Vec<u32>) -> Self {
        Self { backend, gpu_ids }
    }
}

impl Sampler for GpuMemorySampler {
    fn native_unit(&self) -> Unit {
        Unit::Mebibyte
    }

    fn sample(&self, _pid: u32) -> Result<Sample, SamplerError> {
        if self.gpu_ids.is_empty() {
            return Ok(Sample::Invalid);
        }
        let mut total = 0.0;
        for &id in &self.gpu_ids {
            match self.backend.memory_used_mib(id)? {
                Some(used) => total += used,
                None => return Ok(Sample::Invalid),
            }
        }
        Ok(Sample::Value(total))
    }
}

/// Power draw of each requested GPU, in watts
#[derive(Debug, Clone)]
pub struct GpuPowerSampler {
    backend: Arc<dyn GpuBackend>,
    gpu_ids: Vec<u32>,
}

impl GpuPowerSampler {
    /// Sample `gpu_ids` through `backend`
    #[must_use]
    pub fn new(backend: Arc<dyn GpuBackend>, gpu_ids: Vec<u32>) -> Self {
        Self { backend, gpu_ids }
    }
}

impl Sampler for GpuPowerSampler {
    fn native_unit(&self) -> Unit {
        Unit::Watt
    }

    fn sample(&self, _pid: u32) -> Result<Sample, SamplerError> {
        if self.gpu_ids.is_empty() {
            return Ok(Sample::Invalid);
        }
        let mut readings = Vec::with_capacity(self.gpu_ids.len());
        for &id in &self.gpu_ids {
            match self.backend.power_milliwatts(id)? {
                Some(mw) => readings.push(mw / 1000.0),
                None => return Ok(Sample::Invalid),
            }
        }
        Ok(Sample::PerDevice(readings))
    }
}
