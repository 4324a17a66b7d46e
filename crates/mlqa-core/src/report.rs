//! Report artifact: a negotiation card summary plus findings from test results

use mlqa_store::ArtifactKind;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::artifact::Artifact;
use crate::error::{Error, Result};
use crate::negotiation::{
    DataDescriptor, GoalDescriptor, ModelResourcesDescriptor, NegotiationCard, ProblemType,
    RiskDescriptor,
};
use crate::result::ValidationResult;

/// Headline of the report
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SummaryDescriptor {
    /// Problem type
    pub problem_type: Option<ProblemType>,
    /// Task
    pub task: Option<String>,
}

/// Goals and what the tests found about them
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PerformanceDescriptor {
    /// Goals copied from the card
    #[serde(default)]
    pub goals: Vec<GoalDescriptor>,
    /// One line per validation outcome
    #[serde(default)]
    pub findings: Vec<String>,
}

/// Intended use of the system
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct IntendedUseDescriptor {
    /// Usage context
    pub usage_context: Option<String>,
    /// Production requirements
    #[serde(default)]
    pub production_requirements: ModelResourcesDescriptor,
}

/// Free-form reviewer comment
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommentDescriptor {
    /// Comment text
    pub content: String,
}

/// Free-form quantitative analysis
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuantitativeAnalysisDescriptor {
    /// Analysis text
    pub content: Option<String>,
}

/// Report artifact
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Report {
    /// Store identifier
    pub identifier: String,
    /// Summary
    #[serde(default)]
    pub summary: SummaryDescriptor,
    /// Performance
    #[serde(default)]
    pub performance: PerformanceDescriptor,
    /// Intended use
    #[serde(default)]
    pub intended_use: IntendedUseDescriptor,
    /// Risks
    #[serde(default)]
    pub risks: RiskDescriptor,
    /// Datasets
    #[serde(default)]
    pub data: Vec<DataDescriptor>,
    /// Comments
    #[serde(default)]
    pub comments: Vec<CommentDescriptor>,
    /// Quantitative analysis
    #[serde(default)]
    pub quantitative_analysis: QuantitativeAnalysisDescriptor,
    /// Test results this report was built from
    #[serde(default)]
    pub test_results_id: Option<String>,
}

impl Default for Report {
    fn default() -> Self {
        Self::new(ArtifactKind::Report.default_identifier())
    }
}

impl Report {
    /// Empty report
    #[must_use]
    pub fn new(identifier: impl Into<String>) -> Self {
        Self {
            identifier: identifier.into(),
            summary: SummaryDescriptor::default(),
            performance: PerformanceDescriptor::default(),
            intended_use: IntendedUseDescriptor::default(),
            risks: RiskDescriptor::default(),
            data: Vec::new(),
            comments: Vec::new(),
            quantitative_analysis: QuantitativeAnalysisDescriptor::default(),
            test_results_id: None,
        }
    }

    /// Populate from a negotiation card
    #[must_use]
    pub fn from_card(identifier: impl Into<String>, card: &NegotiationCard) -> Self {
        let mut report = Self::new(identifier);
        report.summary = SummaryDescriptor {
            problem_type: card.system.problem_type,
            task: card.system.task.clone(),
        };
        report.performance.goals = card.system.goals.clone();
        report.intended_use = IntendedUseDescriptor {
            usage_context: card.system.usage_context.clone(),
            production_requirements: card.model.production_compute_resources.clone(),
        };
        report.risks = card.system.risks.clone();
        report.data = card.data.clone();
        report
    }

    /// Record the test results this report summarizes
    #[must_use]
    pub fn with_findings(
        mut self,
        test_results_id: impl Into<String>,
        findings: impl IntoIterator<Item = String>,
    ) -> Self {
        self.test_results_id = Some(test_results_id.into());
        self.performance.findings = findings.into_iter().collect();
        self
    }

    /// Populate from a negotiation card and per-test-case validation results
    #[must_use]
    pub fn from_card_and_results<'a>(
        identifier: impl Into<String>,
        card: &NegotiationCard,
        test_results_id: impl Into<String>,
        results: impl IntoIterator<Item = (&'a str, &'a [ValidationResult])>,
    ) -> Self {
        let findings = results.into_iter().flat_map(|(test_case_id, results)| {
            results
                .iter()
                .map(move |result| format!("{test_case_id}: {result}"))
        });
        Self::from_card(identifier, card)
            .with_findings(test_results_id, findings.collect::<Vec<_>>())
    }

    /// Append a reviewer comment
    pub fn add_comment(&mut self, content: impl Into<String>) {
        self.comments.push(CommentDescriptor {
            content: content.into(),
        });
    }
}

impl Artifact for Report {
    const KIND: ArtifactKind = ArtifactKind::Report;

    fn identifier(&self) -> String {
        self.identifier.clone()
    }

    fn to_model(&self) -> Result<Value> {
        Ok(serde_json::to_value(self)?)
    }

    fn from_model(model: &Value) -> Result<Self> {
        serde_json::from_value(model.clone())
            .map_err(|e| Error::Deserialization(format!("invalid report: {e}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mlqa_store::{Context, MemoryStore};

    #[test]
    fn test_from_card_copies_context() {
        let mut card = NegotiationCard::new("card");
        card.system.task = Some("Spam detection".into());
        card.system.risks.fp = Some("Lost mail".into());
        card.model.production_compute_resources.memory = Some("512 MB".into());
        let report = Report::from_card("r", &card);
        assert_eq!(report.summary.task.as_deref(), Some("Spam detection"));
        assert_eq!(report.risks.fp.as_deref(), Some("Lost mail"));
        assert_eq!(
            report.intended_use.production_requirements.memory.as_deref(),
            Some("512 MB")
        );
    }

    #[test]
    fn test_from_card_and_results_lists_findings() {
        let card = NegotiationCard::new("card");
        let results = vec![
            ValidationResult::success("under budget"),
            ValidationResult::failure("too slow"),
        ];
        let report = Report::from_card_and_results(
            "r",
            &card,
            "default.test_results",
            [("latency", results.as_slice())],
        );
        assert_eq!(report.test_results_id.as_deref(), Some("default.test_results"));
        assert_eq!(
            report.performance.findings,
            vec!["latency: Success: under budget", "latency: Failure: too slow"]
        );
    }

    #[test]
    fn test_roundtrip_through_store() {
        let store = MemoryStore::new();
        let ctx = Context::new("m", "v");
        let mut report =
            Report::default().with_findings("results", vec!["Success: ok".to_string()]);
        report.add_comment("looks fine");
        report.save_with(&ctx, &store).expect("save");
        let loaded = Report::load_with("default.report", &ctx, &store).expect("load");
        assert_eq!(loaded, report);
    }
}
