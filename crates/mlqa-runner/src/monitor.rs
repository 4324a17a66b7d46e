//! Process monitors: poll a live pid and summarize its resource usage
//!
//! A monitor samples at a fixed interval until the process exits (or its
//! probe reports the pid as gone), then reduces the series to
//! [`Statistics`] in the requested unit.

use mlqa_core::{
    Evidence, EvidenceType, EvidenceValue, Measurement, Statistics, StatisticsKind, Unit,
};
use serde_json::Value;
use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, PoisonError};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use crate::error::{Error, Result};
use crate::group::supervise;
use crate::probe::{
    CpuSampler, GpuBackend, GpuMemorySampler, GpuPowerSampler, MemorySampler, Sample, Sampler,
};
use crate::process::{ExitSignal, process_alive};

/// Module path used for monitor class names
pub const MONITOR_MODULE: &str = "mlqa_runner::monitor";

/// Default time between samples
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(1);

/// Resource a monitor tracks
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MonitorKind {
    /// CPU utilization of the process
    Cpu,
    /// Resident memory of the process
    Memory,
    /// Used memory of a set of GPUs
    GpuMemory,
    /// Power draw of a set of GPUs
    GpuPower,
}

impl MonitorKind {
    /// Every monitor kind
    pub const ALL: [Self; 4] = [Self::Cpu, Self::Memory, Self::GpuMemory, Self::GpuPower];

    /// Unqualified class name
    #[must_use]
    pub const fn type_name(self) -> &'static str {
        match self {
            Self::Cpu => "LocalProcessCpuUtilization",
            Self::Memory => "LocalProcessMemoryConsumption",
            Self::GpuMemory => "NvidiaGpuMemoryConsumption",
            Self::GpuPower => "NvidiaGpuPowerUtilization",
        }
    }

    /// Fully-qualified class name, recorded as `measurement_class`
    #[must_use]
    pub fn class_name(self) -> String {
        format!("{MONITOR_MODULE}::{}", self.type_name())
    }

    /// Look up a kind by its class name
    #[must_use]
    pub fn from_class_name(name: &str) -> Option<Self> {
        let short = name.rsplit("::").next().unwrap_or(name);
        Self::ALL.into_iter().find(|k| k.type_name() == short)
    }

    /// Statistics flavour produced
    #[must_use]
    pub const fn statistics_kind(self) -> StatisticsKind {
        match self {
            Self::Cpu => StatisticsKind::Cpu,
            Self::Memory => StatisticsKind::Memory,
            Self::GpuMemory => StatisticsKind::GpuMemory,
            Self::GpuPower => StatisticsKind::GpuPower,
        }
    }

    /// Unit used when the caller does not request one
    #[must_use]
    pub const fn default_unit(self) -> Unit {
        match self {
            Self::Cpu => Unit::Percent,
            Self::Memory => Unit::Kilobyte,
            Self::GpuMemory => Unit::Mebibyte,
            Self::GpuPower => Unit::Watt,
        }
    }
}

fn device_ids(gpu_ids: Vec<u32>) -> Vec<u32> {
    if gpu_ids.is_empty() {
        vec![0]
    } else {
        gpu_ids
    }
}

/// A measurement that attaches to a running process
#[derive(Debug)]
pub struct ProcessMonitor {
    test_case_id: String,
    kind: MonitorKind,
    sampler: Arc<dyn Sampler>,
    poll_interval: Duration,
    unit: Unit,
    group: Option<String>,
    gpu_ids: Vec<u32>,
    pending: Mutex<Option<JoinHandle<Result<Evidence>>>>,
}

impl ProcessMonitor {
    fn with_kind(
        test_case_id: impl Into<String>,
        kind: MonitorKind,
        sampler: Arc<dyn Sampler>,
    ) -> Self {
        Self {
            test_case_id: test_case_id.into(),
            kind,
            sampler,
            poll_interval: DEFAULT_POLL_INTERVAL,
            unit: kind.default_unit(),
            group: None,
            gpu_ids: Vec::new(),
            pending: Mutex::new(None),
        }
    }

    /// CPU utilization via `ps`
    #[must_use]
    pub fn cpu(test_case_id: impl Into<String>) -> Self {
        Self::with_kind(test_case_id, MonitorKind::Cpu, Arc::new(CpuSampler::new()))
    }

    /// Resident memory via `/proc` or `pmap`
    #[must_use]
    pub fn memory(test_case_id: impl Into<String>) -> Self {
        Self::with_kind(test_case_id, MonitorKind::Memory, Arc::new(MemorySampler::new()))
    }

    /// Used memory summed over `gpu_ids`; an empty list means device 0
    #[must_use]
    pub fn gpu_memory(
        test_case_id: impl Into<String>,
        backend: Arc<dyn GpuBackend>,
        gpu_ids: Vec<u32>,
    ) -> Self {
        let gpu_ids = device_ids(gpu_ids);
        let sampler = Arc::new(GpuMemorySampler::new(backend, gpu_ids.clone()));
        let mut monitor = Self::with_kind(test_case_id, MonitorKind::GpuMemory, sampler);
        monitor.gpu_ids = gpu_ids;
        monitor
    }

    /// Power draw of each of `gpu_ids`; an empty list means device 0
    #[must_use]
    pub fn gpu_power(
        test_case_id: impl Into<String>,
        backend: Arc<dyn GpuBackend>,
        gpu_ids: Vec<u32>,
    ) -> Self {
        let gpu_ids = device_ids(gpu_ids);
        let sampler = Arc::new(GpuPowerSampler::new(backend, gpu_ids.clone()));
        let mut monitor = Self::with_kind(test_case_id, MonitorKind::GpuPower, sampler);
        monitor.gpu_ids = gpu_ids;
        monitor
    }

    /// Monitor of `kind` reading from a custom sampler
    #[must_use]
    pub fn with_sampler(
        test_case_id: impl Into<String>,
        kind: MonitorKind,
        sampler: Arc<dyn Sampler>,
    ) -> Self {
        Self::with_kind(test_case_id, kind, sampler)
    }

    /// Set the time between samples
    #[must_use]
    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    /// Set the unit of the produced statistics
    #[must_use]
    pub fn with_unit(mut self, unit: Unit) -> Self {
        self.unit = unit;
        self
    }

    /// Put the monitor in a process group
    #[must_use]
    pub fn in_group(mut self, group: impl Into<String>) -> Self {
        self.group = Some(group.into());
        self
    }

    /// Kind of resource tracked
    #[must_use]
    pub const fn kind(&self) -> MonitorKind {
        self.kind
    }

    /// Group name, if any
    #[must_use]
    pub fn group(&self) -> Option<&str> {
        self.group.as_deref()
    }

    /// Requested unit
    #[must_use]
    pub const fn unit(&self) -> Unit {
        self.unit
    }

    /// Time between samples
    #[must_use]
    pub const fn poll_interval(&self) -> Duration {
        self.poll_interval
    }

    /// Sample `pid` once per poll interval until it exits or `signal`
    /// fires, then summarize.
    ///
    /// Each sample is taken at the end of an interval. After the exit is
    /// observed one more sample is taken so that the last moments of the
    /// process are not lost; a process that is gone by then contributes
    /// nothing.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Sampler`] if the probe backend fails, or a unit
    /// error if the requested unit does not fit the probe.
    pub fn monitor_pid(&self, pid: u32, signal: &ExitSignal) -> Result<Statistics> {
        let start = Instant::now();
        let native = self.sampler.native_unit();
        let mut samples = Vec::new();
        loop {
            let exited = signal.wait_timeout(self.poll_interval) || !process_alive(pid);
            match self.sampler.sample(pid)? {
                Sample::Value(v) => samples.push(v),
                Sample::PerDevice(values) => samples.extend(values),
                Sample::Invalid => {
                    tracing::debug!(
                        test_case_id = %self.test_case_id,
                        pid,
                        "sampler reported no process"
                    );
                    break;
                }
            }
            tracing::debug!(
                test_case_id = %self.test_case_id,
                pid,
                count = samples.len(),
                "sampled"
            );
            if exited {
                break;
            }
        }
        let stats = Statistics::from_samples(&samples, native, self.unit)
            .map_err(mlqa_core::Error::from)?;
        tracing::debug!(
            test_case_id = %self.test_case_id,
            samples = samples.len(),
            elapsed_ms = start.elapsed().as_millis(),
            "monitor finished"
        );
        Ok(stats)
    }

    /// Wrap statistics into evidence carrying this monitor's metadata
    ///
    /// # Errors
    ///
    /// Returns an error if metadata cannot be bound.
    pub fn to_evidence(&self, stats: Statistics) -> Result<Evidence> {
        let value = EvidenceValue::statistics(self.kind.statistics_kind(), stats);
        Ok(Evidence::new(value).with_metadata(self.generate_metadata())?)
    }

    /// Start monitoring an already running pid in the background
    ///
    /// # Errors
    ///
    /// Returns [`Error::Core`] with an invariant error if a previous run
    /// has not been collected with [`ProcessMonitor::wait_for_output`].
    pub fn evaluate_async(self: &Arc<Self>, pid: u32) -> Result<()> {
        let mut pending = self.pending.lock().unwrap_or_else(PoisonError::into_inner);
        if pending.is_some() {
            return Err(mlqa_core::Error::Invariant(format!(
                "monitor '{}' is already running",
                self.test_case_id
            ))
            .into());
        }
        let monitor = Arc::clone(self);
        *pending = Some(thread::spawn(move || {
            let signal = ExitSignal::new();
            let stats = monitor.monitor_pid(pid, &signal)?;
            monitor.to_evidence(stats)
        }));
        Ok(())
    }

    /// Collect the evidence of a run started with [`ProcessMonitor::evaluate_async`]
    ///
    /// # Errors
    ///
    /// Returns an error if nothing is running, the monitor failed or its
    /// thread panicked.
    pub fn wait_for_output(&self) -> Result<Evidence> {
        let handle = self
            .pending
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
            .ok_or_else(|| {
                mlqa_core::Error::Invariant(format!(
                    "monitor '{}' has no running measurement",
                    self.test_case_id
                ))
            })?;
        handle
            .join()
            .map_err(|payload| Error::MonitorPanic(crate::group::panic_message(payload.as_ref())))?
    }
}

/// Command line from measurement arguments: either one array or a list of strings
///
/// # Errors
///
/// Returns [`Error::MissingInput`] if any element is not a string.
pub fn argv_from_args(args: &[Value]) -> Result<Vec<String>> {
    let items = match args {
        [Value::Array(items)] => items.as_slice(),
        _ => args,
    };
    items
        .iter()
        .map(|v| {
            v.as_str()
                .map(ToString::to_string)
                .ok_or_else(|| Error::MissingInput(format!("command argument {v} is not a string")))
        })
        .collect()
}

impl Measurement for ProcessMonitor {
    fn test_case_id(&self) -> &str {
        &self.test_case_id
    }

    fn class_name(&self) -> String {
        self.kind.class_name()
    }

    fn output_type(&self) -> EvidenceType {
        self.kind.statistics_kind().into()
    }

    fn additional_data(&self) -> BTreeMap<String, String> {
        let mut data = BTreeMap::new();
        data.insert(
            "poll_interval_ms".to_string(),
            self.poll_interval.as_millis().to_string(),
        );
        data.insert("unit".to_string(), self.unit.name().to_string());
        if let Some(group) = &self.group {
            data.insert("group".to_string(), group.clone());
        }
        if !self.gpu_ids.is_empty() {
            let ids: Vec<String> = self.gpu_ids.iter().map(ToString::to_string).collect();
            data.insert("gpu_ids".to_string(), ids.join(","));
        }
        data
    }

    fn measure(&self, args: &[Value]) -> mlqa_core::Result<EvidenceValue> {
        let argv = argv_from_args(args)?;
        let stats = supervise(&argv, &[self])?
            .pop()
            .ok_or_else(|| Error::MonitorPanic("monitor produced no result".to_string()))??;
        Ok(EvidenceValue::statistics(self.kind.statistics_kind(), stats))
    }
}
