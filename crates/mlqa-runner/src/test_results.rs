//! Test results: per-test-case validation outcomes of one suite run

use chrono::{DateTime, Utc};
use mlqa_core::{Artifact, NegotiationCard, Report, ResultKind, ValidationResult};
use mlqa_store::ArtifactKind;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt::Write as _;

use crate::error::Result;
use crate::suite::{TestSuite, TestSuiteModel};

/// Outcomes for one test case
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CaseResults {
    /// Test case id
    pub test_case_id: String,
    /// One entry per validator
    pub results: Vec<ValidationResult>,
}

/// Test results artifact
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TestResults {
    /// Store identifier
    pub identifier: String,
    /// When validation ran
    pub created_at: DateTime<Utc>,
    /// The suite the results were produced from
    pub test_suite: TestSuiteModel,
    /// Outcomes in suite order
    pub results: Vec<CaseResults>,
}

impl TestResults {
    /// Assemble results for `suite`
    ///
    /// # Errors
    ///
    /// Returns an invariant error unless every test case of the suite has
    /// at least one result, in suite order, and no others are present.
    pub fn new(
        identifier: impl Into<String>,
        suite: &TestSuite,
        results: Vec<CaseResults>,
    ) -> Result<Self> {
        let results = Self {
            identifier: identifier.into(),
            created_at: Utc::now(),
            test_suite: suite.model(),
            results,
        };
        results.check()?;
        Ok(results)
    }

    fn check(&self) -> mlqa_core::Result<()> {
        let expected: Vec<&str> = self
            .test_suite
            .test_cases
            .iter()
            .map(|c| c.identifier.as_str())
            .collect();
        if self.test_case_ids() != expected {
            return Err(mlqa_core::Error::Invariant(format!(
                "results cover {:?}, suite '{}' declares {expected:?}",
                self.test_case_ids(),
                self.test_suite.identifier
            )));
        }
        if let Some(empty) = self.results.iter().find(|c| c.results.is_empty()) {
            return Err(mlqa_core::Error::Invariant(format!(
                "test case '{}' has no results",
                empty.test_case_id
            )));
        }
        Ok(())
    }

    /// Test case ids in order
    #[must_use]
    pub fn test_case_ids(&self) -> Vec<&str> {
        self.results.iter().map(|c| c.test_case_id.as_str()).collect()
    }

    /// Outcomes of one test case
    #[must_use]
    pub fn results_for(&self, test_case_id: &str) -> Option<&[ValidationResult]> {
        self.results
            .iter()
            .find(|c| c.test_case_id == test_case_id)
            .map(|c| c.results.as_slice())
    }

    /// Every outcome with its test case id
    pub fn iter(&self) -> impl Iterator<Item = (&str, &ValidationResult)> {
        self.results
            .iter()
            .flat_map(|c| c.results.iter().map(move |r| (c.test_case_id.as_str(), r)))
    }

    /// No outcome is a failure
    #[must_use]
    pub fn all_passed(&self) -> bool {
        self.iter().all(|(_, r)| !r.is_failure())
    }

    /// Number of outcomes of `kind`
    #[must_use]
    pub fn count(&self, kind: ResultKind) -> usize {
        self.iter().filter(|(_, r)| r.kind == kind).count()
    }

    /// Failed outcomes with their test case ids
    #[must_use]
    pub fn failures(&self) -> Vec<(&str, &ValidationResult)> {
        self.iter().filter(|(_, r)| r.is_failure()).collect()
    }

    /// Printable summary, optionally restricted to one kind
    #[must_use]
    pub fn summary(&self, only: Option<ResultKind>) -> String {
        let mut out = format!(
            "Test results '{}' for suite '{}': {} success, {} failure, {} info\n",
            self.identifier,
            self.test_suite.identifier,
            self.count(ResultKind::Success),
            self.count(ResultKind::Failure),
            self.count(ResultKind::Info)
        );
        for (id, result) in self.iter().filter(|(_, r)| only.is_none_or(|k| r.kind == k)) {
            let _ = writeln!(out, "  {id}: {result}");
        }
        out
    }

    /// Report combining `card` with these results
    #[must_use]
    pub fn report(&self, identifier: impl Into<String>, card: &NegotiationCard) -> Report {
        Report::from_card_and_results(
            identifier,
            card,
            self.identifier.clone(),
            self.results
                .iter()
                .map(|c| (c.test_case_id.as_str(), c.results.as_slice())),
        )
    }
}

impl Artifact for TestResults {
    const KIND: ArtifactKind = ArtifactKind::TestResults;

    fn identifier(&self) -> String {
        self.identifier.clone()
    }

    fn to_model(&self) -> mlqa_core::Result<Value> {
        Ok(serde_json::to_value(self)?)
    }

    fn from_model(model: &Value) -> mlqa_core::Result<Self> {
        let results: Self = serde_json::from_value(model.clone())
            .map_err(|e| mlqa_core::Error::Deserialization(format!("invalid test results: {e}")))?;
        results.check()?;
        Ok(results)
    }
}
