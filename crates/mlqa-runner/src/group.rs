//! Process measurement groups
//!
//! A group runs one subprocess and attaches all of its monitors to the same
//! pid, one thread per monitor. The dispatcher waits for the subprocess,
//! raises the exit signal and joins every monitor before assembling
//! evidence. A failing monitor yields a failure placeholder; the others
//! still deliver.

use mlqa_core::{Evidence, Measurement, Statistics};
use std::any::Any;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::thread;

use crate::error::{Error, Result, error_chain};
use crate::monitor::ProcessMonitor;
use crate::process::{ExitSignal, spawn};

/// Text of a panic payload
pub(crate) fn panic_message(payload: &(dyn Any + Send)) -> String {
    payload
        .downcast_ref::<&str>()
        .map(ToString::to_string)
        .or_else(|| payload.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "unknown panic".to_string())
}

/// Spawn `argv`, run every monitor against its pid and return one outcome
/// per monitor, in order
///
/// # Errors
///
/// Returns [`Error::Spawn`] if the subprocess cannot start.
pub(crate) fn supervise(
    argv: &[String],
    monitors: &[&ProcessMonitor],
) -> Result<Vec<Result<Statistics>>> {
    let mut guard = spawn(argv)?;
    let pid = guard.pid();
    let signal = ExitSignal::new();
    let outcomes = thread::scope(|scope| {
        let handles: Vec<_> = monitors
            .iter()
            .map(|monitor| {
                let signal = &signal;
                scope.spawn(move || monitor.monitor_pid(pid, signal))
            })
            .collect();
        match guard.wait() {
            Ok(status) => tracing::info!(pid, %status, "monitored process exited"),
            Err(e) => tracing::warn!(pid, error = %e, "failed to wait for monitored process"),
        }
        signal.notify();
        handles
            .into_iter()
            .map(|handle| {
                handle.join().unwrap_or_else(|payload| {
                    Err(Error::MonitorPanic(panic_message(payload.as_ref())))
                })
            })
            .collect()
    });
    Ok(outcomes)
}

/// Failure placeholder evidence for a measurement that could not produce a value
#[must_use]
pub fn failure_evidence(measurement: &dyn Measurement, err: &Error) -> Evidence {
    let trace = error_chain(err).into_iter().skip(1).collect();
    Evidence::failure(
        measurement.generate_metadata(),
        err.kind_name(),
        err.to_string(),
        trace,
    )
}

/// Monitors sharing one subprocess lifetime
#[derive(Debug, Clone)]
pub struct ProcessMeasurementGroup {
    name: String,
    monitors: Vec<Arc<ProcessMonitor>>,
}

impl ProcessMeasurementGroup {
    /// Empty group
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            monitors: Vec::new(),
        }
    }

    /// Add a monitor
    ///
    /// # Errors
    ///
    /// Returns [`Error::DuplicateTestCase`] if a monitor with the same test
    /// case id is already present.
    pub fn add(&mut self, monitor: Arc<ProcessMonitor>) -> Result<()> {
        if self
            .monitors
            .iter()
            .any(|m| m.test_case_id() == monitor.test_case_id())
        {
            return Err(Error::DuplicateTestCase(monitor.test_case_id().to_string()));
        }
        self.monitors.push(monitor);
        Ok(())
    }

    /// Builder form of [`ProcessMeasurementGroup::add`]
    ///
    /// # Errors
    ///
    /// Returns [`Error::DuplicateTestCase`] on a repeated test case id.
    pub fn with_monitor(mut self, monitor: ProcessMonitor) -> Result<Self> {
        self.add(Arc::new(monitor))?;
        Ok(self)
    }

    /// Group name
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Monitors in insertion order
    #[must_use]
    pub fn monitors(&self) -> &[Arc<ProcessMonitor>] {
        &self.monitors
    }

    /// Test case ids of the monitors
    #[must_use]
    pub fn test_case_ids(&self) -> Vec<&str> {
        self.monitors.iter().map(|m| m.test_case_id()).collect()
    }

    /// Number of monitors
    #[must_use]
    pub fn len(&self) -> usize {
        self.monitors.len()
    }

    /// Whether the group has no monitors
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.monitors.is_empty()
    }

    /// Run `argv` and monitor it. Returns exactly one evidence per monitor,
    /// each either statistics or a failure placeholder.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Spawn`] if the subprocess cannot start.
    pub fn evaluate(&self, argv: &[String]) -> Result<BTreeMap<String, Evidence>> {
        tracing::info!(
            group = %self.name,
            monitors = self.monitors.len(),
            "starting process group"
        );
        let monitors: Vec<&ProcessMonitor> = self.monitors.iter().map(Arc::as_ref).collect();
        let outcomes = supervise(argv, &monitors)?;
        let evidence: BTreeMap<String, Evidence> = self
            .monitors
            .iter()
            .zip(outcomes)
            .map(|(monitor, outcome)| {
                let evidence = outcome
                    .and_then(|stats| monitor.to_evidence(stats))
                    .unwrap_or_else(|err| {
                        tracing::warn!(
                            group = %self.name,
                            test_case_id = monitor.test_case_id(),
                            error = %err,
                            "monitor failed"
                        );
                        failure_evidence(&**monitor, &err)
                    });
                (monitor.test_case_id().to_string(), evidence)
            })
            .collect();
        let failed = evidence.values().filter(|e| e.is_failure()).count();
        tracing::info!(
            group = %self.name,
            collected = evidence.len(),
            failed,
            "process group finished"
        );
        Ok(evidence)
    }
}

/// Run several groups concurrently, each against its own subprocess.
///
/// `inputs` maps group name to command line.
///
/// # Errors
///
/// Returns [`Error::MissingInput`] if a group has no command line, or the
/// first group's spawn error after every group has finished.
pub fn evaluate_groups(
    groups: &[ProcessMeasurementGroup],
    inputs: &BTreeMap<String, Vec<String>>,
) -> Result<BTreeMap<String, Evidence>> {
    let runs = groups
        .iter()
        .map(|group| {
            inputs
                .get(group.name())
                .map(|argv| (group, argv.as_slice()))
                .ok_or_else(|| {
                    Error::MissingInput(format!("no command for group '{}'", group.name()))
                })
        })
        .collect::<Result<Vec<_>>>()?;

    let outcomes: Vec<Result<BTreeMap<String, Evidence>>> = thread::scope(|scope| {
        let handles: Vec<_> = runs
            .into_iter()
            .map(|(group, argv)| scope.spawn(move || group.evaluate(argv)))
            .collect();
        handles
            .into_iter()
            .map(|handle| {
                handle.join().unwrap_or_else(|payload| {
                    Err(Error::MonitorPanic(panic_message(payload.as_ref())))
                })
            })
            .collect()
    });

    let mut merged = BTreeMap::new();
    for outcome in outcomes {
        merged.extend(outcome?);
    }
    Ok(merged)
}
