//! Test suites: ordered, uniquely named test cases and their evidence run
//!
//! Process monitors that share a group run against one subprocess; every
//! other case runs on a rayon pool. A case whose measurement fails gets a
//! failure placeholder instead of aborting the run.

use mlqa_core::{Artifact, Evidence, Measurement, NegotiationCard};
use mlqa_store::{ArtifactKind, ArtifactStore, Context};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::{BTreeMap, BTreeSet};
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::thread;

use crate::error::{Error, Result};
use crate::group::{ProcessMeasurementGroup, failure_evidence, panic_message};
use crate::monitor::argv_from_args;
use crate::registry::MeasurementRegistry;
use crate::test_case::{CaseMeasurement, TestCase, TestCaseModel, check_identifier};

/// Parallelism of a suite run
#[derive(Debug, Clone)]
pub struct RunConfig {
    /// Worker threads for cases outside process groups
    pub num_workers: usize,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            num_workers: num_cpus::get().min(4),
        }
    }
}

/// Serialized form of a test suite
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TestSuiteModel {
    /// Suite id
    pub identifier: String,
    /// Test cases in order
    #[serde(default)]
    pub test_cases: Vec<TestCaseModel>,
}

/// Ordered collection of test cases with unique ids
#[derive(Debug, Clone, PartialEq)]
pub struct TestSuite {
    identifier: String,
    cases: Vec<TestCase>,
}

impl Default for TestSuite {
    fn default() -> Self {
        Self::new(ArtifactKind::TestSuite.default_identifier())
    }
}

impl TestSuite {
    /// Empty suite
    #[must_use]
    pub fn new(identifier: impl Into<String>) -> Self {
        Self {
            identifier: identifier.into(),
            cases: Vec::new(),
        }
    }

    /// Append a test case
    ///
    /// # Errors
    ///
    /// Returns [`Error::DuplicateTestCase`] if the id is taken, or a store
    /// error if the id cannot be used as a key.
    pub fn add(&mut self, case: TestCase) -> Result<()> {
        check_identifier(case.identifier())?;
        if self.test_case(case.identifier()).is_some() {
            return Err(Error::DuplicateTestCase(case.identifier().to_string()));
        }
        self.cases.push(case);
        Ok(())
    }

    /// Builder form of [`TestSuite::add`]
    ///
    /// # Errors
    ///
    /// Returns [`Error::DuplicateTestCase`] if the id is taken.
    pub fn with_test_case(mut self, case: TestCase) -> Result<Self> {
        self.add(case)?;
        Ok(self)
    }

    /// Test cases in order
    #[must_use]
    pub fn test_cases(&self) -> &[TestCase] {
        &self.cases
    }

    /// Look up a test case
    #[must_use]
    pub fn test_case(&self, identifier: &str) -> Option<&TestCase> {
        self.cases.iter().find(|c| c.identifier() == identifier)
    }

    /// Test case ids in order
    #[must_use]
    pub fn test_case_ids(&self) -> Vec<&str> {
        self.cases.iter().map(TestCase::identifier).collect()
    }

    /// Number of test cases
    #[must_use]
    pub fn len(&self) -> usize {
        self.cases.len()
    }

    /// Whether the suite has no test cases
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.cases.is_empty()
    }

    /// Serialized form
    #[must_use]
    pub fn model(&self) -> TestSuiteModel {
        TestSuiteModel {
            identifier: self.identifier.clone(),
            test_cases: self.cases.iter().map(TestCase::to_model).collect(),
        }
    }

    /// Process groups formed by grouped monitors, in first-seen order
    #[must_use]
    pub fn process_groups(&self) -> Vec<ProcessMeasurementGroup> {
        let mut groups: Vec<ProcessMeasurementGroup> = Vec::new();
        for case in &self.cases {
            let Some(CaseMeasurement::Process(monitor)) = case.measurement() else {
                continue;
            };
            let Some(name) = monitor.group() else {
                continue;
            };
            let position = groups.iter().position(|g| g.name() == name).unwrap_or_else(|| {
                groups.push(ProcessMeasurementGroup::new(name));
                groups.len() - 1
            });
            // Suite ids are unique, so this cannot collide.
            let _ = groups[position].add(Arc::clone(monitor));
        }
        groups
    }

    /// Rebuild measurements from their descriptors
    ///
    /// # Errors
    ///
    /// Returns an error if a descriptor holds invalid settings.
    pub fn with_registry(mut self, registry: &MeasurementRegistry) -> Result<Self> {
        for case in &mut self.cases {
            if case.measurement().is_some() {
                continue;
            }
            let Some(descriptor) = case.descriptor().cloned() else {
                continue;
            };
            if let Some(measurement) = registry.build(&descriptor)? {
                case.restore_measurement(measurement);
            }
        }
        Ok(self)
    }

    /// Run measurements with the default worker count
    ///
    /// # Errors
    ///
    /// See [`TestSuite::run_measurements_with`].
    pub fn run_measurements(
        &self,
        inputs: &BTreeMap<String, Vec<Value>>,
    ) -> Result<BTreeMap<String, Evidence>> {
        self.run_measurements_with(inputs, &RunConfig::default())
    }

    /// Evaluate every test case named in `inputs` with its arguments.
    ///
    /// Grouped monitors share one subprocess, started from the arguments of
    /// the first member in suite order that has any. Cases not named in
    /// `inputs` are not run.
    ///
    /// # Errors
    ///
    /// Returns [`Error::UnknownTestCase`] for inputs naming no case, and
    /// [`Error::MissingInput`] for a case that has no measurement.
    pub fn run_measurements_with(
        &self,
        inputs: &BTreeMap<String, Vec<Value>>,
        config: &RunConfig,
    ) -> Result<BTreeMap<String, Evidence>> {
        for id in inputs.keys() {
            let case = self
                .test_case(id)
                .ok_or_else(|| Error::UnknownTestCase(id.clone()))?;
            if case.measurement().is_none() {
                return Err(Error::MissingInput(format!("test case '{id}' has no measurement")));
            }
        }

        let groups = self.process_groups();
        let grouped: BTreeSet<&str> = groups
            .iter()
            .flat_map(ProcessMeasurementGroup::test_case_ids)
            .collect();
        let group_runs: Vec<(&ProcessMeasurementGroup, &[Value])> = groups
            .iter()
            .filter_map(|group| {
                group
                    .test_case_ids()
                    .into_iter()
                    .find_map(|id| inputs.get(id))
                    .map(|args| (group, args.as_slice()))
            })
            .collect();
        let standalone: Vec<(&TestCase, &[Value])> = self
            .cases
            .iter()
            .filter(|case| !grouped.contains(case.identifier()))
            .filter_map(|case| inputs.get(case.identifier()).map(|args| (case, args.as_slice())))
            .collect();

        tracing::info!(
            suite = %self.identifier,
            groups = group_runs.len(),
            standalone = standalone.len(),
            "running measurements"
        );

        let (grouped_evidence, standalone_evidence) = thread::scope(|scope| {
            let handles: Vec<_> = group_runs
                .iter()
                .map(|&(group, args)| scope.spawn(move || run_group(group, args)))
                .collect();
            let standalone_evidence = run_standalone(&standalone, config);
            let grouped_evidence: Vec<(String, Evidence)> = handles
                .into_iter()
                .zip(&group_runs)
                .flat_map(|(handle, &(group, _))| {
                    handle.join().unwrap_or_else(|payload| {
                        let err = Error::MonitorPanic(panic_message(payload.as_ref()));
                        group_failure(group, &err)
                    })
                })
                .collect();
            (grouped_evidence, standalone_evidence)
        });

        Ok(grouped_evidence.into_iter().chain(standalone_evidence).collect())
    }
}

fn group_failure(group: &ProcessMeasurementGroup, err: &Error) -> Vec<(String, Evidence)> {
    group
        .monitors()
        .iter()
        .map(|m| (m.test_case_id().to_string(), failure_evidence(&**m, err)))
        .collect()
}

fn run_group(group: &ProcessMeasurementGroup, args: &[Value]) -> Vec<(String, Evidence)> {
    let outcome = argv_from_args(args).and_then(|argv| group.evaluate(&argv));
    match outcome {
        Ok(evidence) => evidence.into_iter().collect(),
        Err(err) => {
            tracing::warn!(group = group.name(), error = %err, "process group failed");
            group_failure(group, &err)
        }
    }
}

fn run_standalone(cases: &[(&TestCase, &[Value])], config: &RunConfig) -> Vec<(String, Evidence)> {
    let evaluate = |&(case, args): &(&TestCase, &[Value])| {
        let id = case.identifier().to_string();
        let measurement = case.measurement()?;
        let outcome = panic::catch_unwind(AssertUnwindSafe(|| measurement.evaluate(args)))
            .unwrap_or_else(|payload| Err(Error::MonitorPanic(panic_message(payload.as_ref()))));
        let evidence = outcome.unwrap_or_else(|err| {
            tracing::warn!(test_case_id = %id, error = %err, "measurement failed");
            failure_evidence(measurement.as_measurement(), &err)
        });
        Some((id, evidence))
    };
    match rayon::ThreadPoolBuilder::new()
        .num_threads(config.num_workers.max(1))
        .build()
    {
        Ok(pool) => pool.install(|| cases.par_iter().filter_map(evaluate).collect()),
        Err(e) => {
            tracing::warn!(error = %e, "falling back to sequential measurement");
            cases.iter().filter_map(evaluate).collect()
        }
    }
}

impl Artifact for TestSuite {
    const KIND: ArtifactKind = ArtifactKind::TestSuite;

    fn identifier(&self) -> String {
        self.identifier.clone()
    }

    fn to_model(&self) -> mlqa_core::Result<Value> {
        Ok(serde_json::to_value(self.model())?)
    }

    fn from_model(model: &Value) -> mlqa_core::Result<Self> {
        let model: TestSuiteModel = serde_json::from_value(model.clone())
            .map_err(|e| mlqa_core::Error::Deserialization(format!("invalid test suite: {e}")))?;
        let mut suite = Self::new(model.identifier);
        for case in &model.test_cases {
            let case = TestCase::from_model(case).map_err(mlqa_core::Error::from)?;
            suite.add(case).map_err(mlqa_core::Error::from)?;
        }
        Ok(suite)
    }

    fn pre_save_hook(&self, context: &Context, store: &dyn ArtifactStore) -> mlqa_core::Result<()> {
        let referenced: Vec<(&str, &str)> = self
            .cases
            .iter()
            .flat_map(|c| c.quality_scenarios().iter().map(move |q| (c.identifier(), q.as_str())))
            .collect();
        if referenced.is_empty() {
            return Ok(());
        }
        let cards = NegotiationCard::load_all_with(context, store)?;
        let declared: BTreeSet<&str> = cards.iter().flat_map(NegotiationCard::qas_ids).collect();
        match referenced.iter().find(|(_, qas)| !declared.contains(qas)) {
            Some((case, qas)) => Err(mlqa_core::Error::Invariant(format!(
                "test case '{case}' references quality attribute scenario '{qas}' \
                 not declared by any negotiation card"
            ))),
            None => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::monitor::{MonitorKind, ProcessMonitor};
    use crate::probe::{MockGpu, MockSampler};
    use mlqa_core::negotiation::QasDescriptor;
    use mlqa_core::validator::builtin::{integer, memory, real};
    use mlqa_core::{EvidenceType, EvidenceValue, ExternalMeasurement, Unit};
    use mlqa_store::MemoryStore;
    use serde_json::json;
    use std::time::Duration;

    fn accuracy_case() -> TestCase {
        TestCase::new("accuracy", vec![real::greater_than(0.9)])
            .with_measurement(
                ExternalMeasurement::new("accuracy", EvidenceType::Real)
                    .with_function("score", |_| Ok(json!(0.95))),
            )
            .expect("case")
    }

    fn failing_case() -> TestCase {
        TestCase::new("broken", vec![integer::less_than(3)])
            .with_measurement(
                ExternalMeasurement::new("broken", EvidenceType::Integer)
                    .with_function("boom", |_| {
                        Err(mlqa_core::Error::Measurement("dataset missing".into()))
                    }),
            )
            .expect("case")
    }

    #[test]
    fn test_duplicate_ids_rejected() {
        let suite = TestSuite::default().with_test_case(accuracy_case()).expect("first");
        let err = suite.with_test_case(accuracy_case()).unwrap_err();
        assert!(matches!(err, Error::DuplicateTestCase(_)));
    }

    #[test]
    fn test_bad_identifier_rejected() {
        let err = TestSuite::default()
            .with_test_case(TestCase::new("../escape", vec![]))
            .unwrap_err();
        assert!(err.to_string().contains("escape"));
    }

    #[test]
    fn test_unknown_input_rejected() {
        let suite = TestSuite::default().with_test_case(accuracy_case()).expect("suite");
        let inputs = BTreeMap::from([("nope".to_string(), vec![])]);
        assert!(matches!(suite.run_measurements(&inputs), Err(Error::UnknownTestCase(_))));
    }

    #[test]
    fn test_failures_are_isolated() {
        let suite = TestSuite::default()
            .with_test_case(accuracy_case())
            .and_then(|s| s.with_test_case(failing_case()))
            .expect("suite");
        let inputs = BTreeMap::from([
            ("accuracy".to_string(), vec![]),
            ("broken".to_string(), vec![]),
        ]);
        let evidence = suite.run_measurements(&inputs).expect("run");
        assert_eq!(evidence.len(), 2);
        assert_eq!(evidence["accuracy"].value(), &EvidenceValue::real(0.95));
        assert!(evidence["broken"].is_failure());
        assert_eq!(evidence["broken"].test_case_id(), Some("broken"));
    }

    #[test]
    fn test_panicking_measurement_is_isolated() {
        let exploding = TestCase::new("exploding", vec![integer::less_than(3)])
            .with_measurement(
                ExternalMeasurement::new("exploding", EvidenceType::Integer)
                    .with_function("explode", |_| panic!("user function exploded")),
            )
            .expect("case");
        let suite = TestSuite::default()
            .with_test_case(accuracy_case())
            .and_then(|s| s.with_test_case(exploding))
            .and_then(|s| s.with_test_case(failing_case()))
            .expect("suite");
        let inputs = BTreeMap::from([
            ("accuracy".to_string(), vec![]),
            ("exploding".to_string(), vec![]),
            ("broken".to_string(), vec![]),
        ]);

        let evidence = suite.run_measurements(&inputs).expect("run");
        assert_eq!(evidence.len(), 3);
        assert_eq!(evidence["accuracy"].value(), &EvidenceValue::real(0.95));
        assert!(evidence["broken"].is_failure());
        match evidence["exploding"].value() {
            EvidenceValue::Failure { kind, message, .. } => {
                assert_eq!(kind, "PanicError");
                assert!(message.contains("user function exploded"), "{message}");
            }
            other => panic!("expected failure, got {other:?}"),
        }
    }

    #[cfg(unix)]
    #[test]
    fn test_grouped_monitors_share_process() {
        let fast = Duration::from_millis(20);
        let cpu = ProcessMonitor::with_sampler(
            "cpu",
            MonitorKind::Cpu,
            Arc::new(MockSampler::new(Unit::Percent).with_values([50.0])),
        )
        .with_poll_interval(fast)
        .in_group("train");
        let gpu = ProcessMonitor::gpu_memory(
            "gpu",
            Arc::new(MockGpu::missing_library("NVML not found")),
            vec![0],
        )
        .in_group("train");
        let mem = TestCase::new("mem", vec![memory::max_consumption_less_than(1, Unit::Gigabyte)])
            .with_measurement(
                ProcessMonitor::memory("mem")
                    .with_poll_interval(fast)
                    .in_group("train"),
            )
            .expect("mem");
        let suite = TestSuite::default()
            .with_test_case(TestCase::new("cpu", vec![]).with_measurement(cpu).expect("cpu"))
            .and_then(|s| {
                s.with_test_case(TestCase::new("gpu", vec![]).with_measurement(gpu).expect("gpu"))
            })
            .and_then(|s| s.with_test_case(mem))
            .expect("suite");

        let groups = suite.process_groups();
        assert_eq!(groups.len(), 1);
        assert_eq!(groups[0].test_case_ids(), vec!["cpu", "gpu", "mem"]);

        let inputs = BTreeMap::from([("cpu".to_string(), vec![json!(["sleep", "0.1"])])]);
        let evidence = suite.run_measurements(&inputs).expect("run");
        assert_eq!(evidence.len(), 3);
        assert_eq!(evidence["cpu"].evidence_type(), EvidenceType::CpuStatistics);
        assert_eq!(evidence["mem"].evidence_type(), EvidenceType::MemoryStatistics);
        assert!(evidence["gpu"].is_failure());
    }

    #[test]
    fn test_group_spawn_failure_gives_placeholders() {
        let cpu = ProcessMonitor::cpu("cpu").in_group("g");
        let suite = TestSuite::default()
            .with_test_case(TestCase::new("cpu", vec![]).with_measurement(cpu).expect("cpu"))
            .expect("suite");
        let inputs =
            BTreeMap::from([("cpu".to_string(), vec![json!(["/nonexistent/mlqa-binary"])])]);
        let evidence = suite.run_measurements(&inputs).expect("run");
        match evidence["cpu"].value() {
            EvidenceValue::Failure { kind, .. } => assert_eq!(kind, "SpawnError"),
            other => panic!("expected failure, got {other:?}"),
        }
    }

    #[test]
    fn test_store_roundtrip_with_registry() {
        let store = MemoryStore::new();
        let ctx = Context::new("m", "v");
        let suite = TestSuite::default()
            .with_test_case(
                TestCase::new("cpu", vec![])
                    .with_measurement(ProcessMonitor::cpu("cpu").in_group("train"))
                    .expect("cpu"),
            )
            .expect("suite");
        suite.save_with(&ctx, &store).expect("save");
        let loaded = TestSuite::load_with("default.test_suite", &ctx, &store).expect("load");
        assert_eq!(loaded, suite);
        assert!(loaded.test_cases()[0].measurement().is_none());
        let rebuilt = loaded.with_registry(&MeasurementRegistry::new()).expect("registry");
        let measurement = rebuilt.test_cases()[0].measurement().expect("rebuilt");
        assert_eq!(measurement.group(), Some("train"));
        assert_eq!(
            measurement.as_measurement().generate_metadata(),
            ProcessMonitor::cpu("cpu").in_group("train").generate_metadata()
        );
    }

    #[test]
    fn test_qas_references_checked_on_save() {
        let store = MemoryStore::new();
        let ctx = Context::new("m", "v");
        let suite = TestSuite::default()
            .with_test_case(accuracy_case().with_quality_scenarios(["card-qas_001"]))
            .expect("suite");
        let err = suite.save_with(&ctx, &store).unwrap_err();
        assert_eq!(err.kind_name(), "InvariantError");

        let mut card = NegotiationCard::new("card");
        card.system_requirements.push(QasDescriptor::default());
        card.save_with(&ctx, &store).expect("card");
        suite.save_with(&ctx, &store).expect("save");
    }
}
