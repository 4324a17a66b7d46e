//! Rebuild measurements from the descriptors stored with a test suite

use mlqa_core::measurement::ExternalFn;
use mlqa_core::{EvidenceMetadata, EvidenceType, ExternalMeasurement, LocalObjectSize, Measurement};
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use crate::error::Result;
use crate::monitor::{MonitorKind, ProcessMonitor};
use crate::probe::{GpuBackend, NvidiaSmi};
use crate::test_case::CaseMeasurement;

/// Builds a measurement from its recorded metadata
pub type MeasurementBuilder =
    Arc<dyn Fn(&MeasurementRegistry, &EvidenceMetadata) -> Result<CaseMeasurement> + Send + Sync>;

/// Class-name keyed constructors for measurements
#[derive(Clone)]
pub struct MeasurementRegistry {
    builders: BTreeMap<String, MeasurementBuilder>,
    functions: BTreeMap<String, ExternalFn>,
    gpu_backend: Arc<dyn GpuBackend>,
}

impl fmt::Debug for MeasurementRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MeasurementRegistry")
            .field("classes", &self.builders.keys().collect::<Vec<_>>())
            .field("functions", &self.functions.keys().collect::<Vec<_>>())
            .field("gpu_backend", &self.gpu_backend)
            .finish()
    }
}

impl Default for MeasurementRegistry {
    fn default() -> Self {
        let mut registry = Self {
            builders: BTreeMap::new(),
            functions: BTreeMap::new(),
            gpu_backend: Arc::new(NvidiaSmi::new()),
        };
        registry.register(LocalObjectSize::new("").class_name(), |_, md| {
            Ok(LocalObjectSize::new(&md.test_case_id).into())
        });
        let external = ExternalMeasurement::new("", EvidenceType::Opaque).class_name();
        registry.register(external, |reg, md| reg.build_external(md));
        for kind in MonitorKind::ALL {
            registry.register(kind.class_name(), move |reg, md| {
                Ok(reg.build_monitor(kind, md)?.into())
            });
        }
        registry
    }
}

fn malformed(md: &EvidenceMetadata, what: &str) -> mlqa_core::Error {
    mlqa_core::Error::Deserialization(format!(
        "measurement for '{}' has invalid {what}",
        md.test_case_id
    ))
}

impl MeasurementRegistry {
    /// Registry with the built-in measurements
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a constructor for `class_name`, replacing any previous one
    pub fn register<F>(&mut self, class_name: impl Into<String>, builder: F)
    where
        F: Fn(&Self, &EvidenceMetadata) -> Result<CaseMeasurement> + Send + Sync + 'static,
    {
        self.builders.insert(class_name.into(), Arc::new(builder));
    }

    /// Make a named function available to rebuilt external measurements
    pub fn register_function<F>(&mut self, name: impl Into<String>, function: F)
    where
        F: Fn(&[serde_json::Value]) -> mlqa_core::Result<serde_json::Value> + Send + Sync + 'static,
    {
        self.functions.insert(name.into(), Arc::new(function));
    }

    /// Use `backend` for rebuilt GPU monitors
    #[must_use]
    pub fn with_gpu_backend(mut self, backend: Arc<dyn GpuBackend>) -> Self {
        self.gpu_backend = backend;
        self
    }

    /// Whether `class_name` can be rebuilt
    #[must_use]
    pub fn contains(&self, class_name: &str) -> bool {
        self.builders.contains_key(class_name)
    }

    /// Rebuild a measurement; `None` for unregistered classes
    ///
    /// # Errors
    ///
    /// Returns a deserialization error if the recorded settings are invalid.
    pub fn build(&self, descriptor: &EvidenceMetadata) -> Result<Option<CaseMeasurement>> {
        let class = &descriptor.measurement.measurement_class;
        match self.builders.get(class) {
            Some(builder) => builder(self, descriptor).map(Some),
            None => {
                tracing::warn!(
                    test_case_id = %descriptor.test_case_id,
                    class = %class,
                    "no registered measurement for class"
                );
                Ok(None)
            }
        }
    }

    fn build_external(&self, md: &EvidenceMetadata) -> Result<CaseMeasurement> {
        let output = EvidenceType::from_name(&md.measurement.output_class)
            .ok_or_else(|| malformed(md, "output class"))?;
        let mut measurement = ExternalMeasurement::new(&md.test_case_id, output);
        if let Some(name) = md.additional_data.get("function") {
            match self.functions.get(name) {
                Some(function) => {
                    let function = Arc::clone(function);
                    measurement = measurement.with_function(name, move |args| function(args));
                }
                None => tracing::warn!(function = %name, "external function not registered"),
            }
        }
        Ok(measurement.into())
    }

    fn build_monitor(&self, kind: MonitorKind, md: &EvidenceMetadata) -> Result<ProcessMonitor> {
        let data = &md.additional_data;
        let gpu_ids = data
            .get("gpu_ids")
            .map(|ids| {
                ids.split(',')
                    .map(|id| id.trim().parse::<u32>())
                    .collect::<std::result::Result<Vec<_>, _>>()
            })
            .transpose()
            .map_err(|_| malformed(md, "gpu_ids"))?
            .unwrap_or_else(|| vec![0]);
        let mut monitor = match kind {
            MonitorKind::Cpu => ProcessMonitor::cpu(&md.test_case_id),
            MonitorKind::Memory => ProcessMonitor::memory(&md.test_case_id),
            MonitorKind::GpuMemory => {
                ProcessMonitor::gpu_memory(&md.test_case_id, Arc::clone(&self.gpu_backend), gpu_ids)
            }
            MonitorKind::GpuPower => {
                ProcessMonitor::gpu_power(&md.test_case_id, Arc::clone(&self.gpu_backend), gpu_ids)
            }
        };
        if let Some(ms) = data.get("poll_interval_ms") {
            let ms: u64 = ms.parse().map_err(|_| malformed(md, "poll_interval_ms"))?;
            monitor = monitor.with_poll_interval(Duration::from_millis(ms));
        }
        if let Some(unit) = data.get("unit") {
            let unit = mlqa_core::units::parse(unit).map_err(mlqa_core::Error::from)?;
            monitor = monitor.with_unit(unit);
        }
        if let Some(group) = data.get("group") {
            monitor = monitor.in_group(group);
        }
        Ok(monitor)
    }
}
