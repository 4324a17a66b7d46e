//! Collects evidence for a suite and validates it into test results

use mlqa_core::evidence::evidence_identifier;
use mlqa_core::{Artifact, Evidence, ValidationResult};
use mlqa_store::{ArtifactKind, ArtifactStore, Context};
use std::collections::BTreeMap;

use crate::error::{Error, Result};
use crate::suite::TestSuite;
use crate::test_results::{CaseResults, TestResults};

/// Message of the failure recorded for a test case without evidence
pub const NO_EVIDENCE: &str = "no evidence collected";

/// Indexes evidence by test case and runs every validator over it
#[derive(Debug)]
pub struct TestSuiteValidator<'a> {
    suite: &'a TestSuite,
    evidence: BTreeMap<String, Evidence>,
}

impl<'a> TestSuiteValidator<'a> {
    /// Validator for `suite` with no evidence yet
    #[must_use]
    pub const fn new(suite: &'a TestSuite) -> Self {
        Self {
            suite,
            evidence: BTreeMap::new(),
        }
    }

    /// Index one piece of evidence by its test case id
    ///
    /// # Errors
    ///
    /// Returns an invariant error if the evidence has no metadata,
    /// [`Error::UnknownTestCase`] if the suite does not declare its id, and
    /// [`Error::DuplicateTestCase`] if evidence for the id was already added.
    pub fn add_evidence(&mut self, evidence: Evidence) -> Result<()> {
        let id = evidence
            .test_case_id()
            .ok_or_else(|| mlqa_core::Error::Invariant("evidence has no metadata".to_string()))?
            .to_string();
        if self.suite.test_case(&id).is_none() {
            return Err(Error::UnknownTestCase(id));
        }
        if self.evidence.contains_key(&id) {
            return Err(Error::DuplicateTestCase(id));
        }
        self.evidence.insert(id, evidence);
        Ok(())
    }

    /// Add every piece of evidence
    ///
    /// # Errors
    ///
    /// Returns the first [`TestSuiteValidator::add_evidence`] error.
    pub fn add_all(&mut self, evidence: impl IntoIterator<Item = Evidence>) -> Result<()> {
        evidence.into_iter().try_for_each(|e| self.add_evidence(e))
    }

    /// Load stored evidence for every test case that has none yet.
    /// Returns how many were found.
    ///
    /// # Errors
    ///
    /// Returns store errors other than not-found.
    pub fn load_evidence(&mut self, context: &Context, store: &dyn ArtifactStore) -> Result<usize> {
        let suite = self.suite;
        let mut loaded = 0;
        for id in suite.test_case_ids() {
            if self.evidence.contains_key(id) {
                continue;
            }
            match Evidence::load_with(&evidence_identifier(id), context, store) {
                Ok(evidence) => {
                    self.add_evidence(evidence)?;
                    loaded += 1;
                }
                Err(mlqa_core::Error::NotFound(_)) => {
                    tracing::debug!(test_case_id = id, "no stored evidence");
                }
                Err(e) => return Err(e.into()),
            }
        }
        Ok(loaded)
    }

    /// Evidence indexed so far
    #[must_use]
    pub fn evidence(&self, test_case_id: &str) -> Option<&Evidence> {
        self.evidence.get(test_case_id)
    }

    /// Validate under the default test results id
    ///
    /// # Errors
    ///
    /// See [`TestSuiteValidator::validate_as`].
    pub fn validate(&self) -> Result<TestResults> {
        self.validate_as(ArtifactKind::TestResults.default_identifier())
    }

    /// Run every validator of every test case, in suite order. A case
    /// without evidence gets a single failure result.
    ///
    /// # Errors
    ///
    /// Returns an invariant error if the assembled results do not cover the suite.
    pub fn validate_as(&self, identifier: impl Into<String>) -> Result<TestResults> {
        let results = self
            .suite
            .test_cases()
            .iter()
            .map(|case| {
                let results = match self.evidence.get(case.identifier()) {
                    Some(evidence) => case.validate(evidence),
                    None => vec![ValidationResult::failure(NO_EVIDENCE)],
                };
                CaseResults {
                    test_case_id: case.identifier().to_string(),
                    results,
                }
            })
            .collect();
        let results = TestResults::new(identifier, self.suite, results)?;
        tracing::info!(
            suite = %self.suite.identifier(),
            failures = results.failures().len(),
            "validated test suite"
        );
        Ok(results)
    }
}
