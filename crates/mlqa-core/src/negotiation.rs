//! Negotiation card: the agreed system goals, data, model and requirements

use mlqa_store::ArtifactKind;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::artifact::Artifact;
use crate::error::{Error, Result};

/// Prefix of generated quality attribute scenario ids
pub const QAS_ID_PREFIX: &str = "qas_";

/// Kind of ML problem
#[allow(missing_docs)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProblemType {
    Classification,
    Clustering,
    Trend,
    Alert,
    Forecasting,
    ContentGeneration,
    Benchmarking,
    Goals,
    Detection,
    Other,
}

/// Sensitivity of a dataset
#[allow(missing_docs)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DataClassification {
    Unclassified,
    Cui,
    Pii,
    Phi,
    Classified,
    Other,
}

/// How a goal is measured
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MetricDescriptor {
    /// Metric description
    pub description: Option<String>,
    /// Baseline to compare against
    pub baseline: Option<String>,
}

/// A system goal
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GoalDescriptor {
    /// Goal description
    pub description: Option<String>,
    /// Metrics for the goal
    #[serde(default)]
    pub metrics: Vec<MetricDescriptor>,
}

/// Consequences of wrong outputs
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RiskDescriptor {
    /// False positive risk
    pub fp: Option<String>,
    /// False negative risk
    #[serde(rename = "fn")]
    pub fn_: Option<String>,
    /// Other risks
    pub other: Option<String>,
}

/// System-level context
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SystemDescriptor {
    /// Goals
    #[serde(default)]
    pub goals: Vec<GoalDescriptor>,
    /// Problem type
    pub problem_type: Option<ProblemType>,
    /// Task
    pub task: Option<String>,
    /// Usage context
    pub usage_context: Option<String>,
    /// Risks
    #[serde(default)]
    pub risks: RiskDescriptor,
}

/// A label in a dataset
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LabelDescriptor {
    /// Label name
    pub name: Option<String>,
    /// Description
    pub description: Option<String>,
    /// Share of samples with this label
    pub percentage: Option<f64>,
}

/// A field in a dataset
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FieldDescriptor {
    /// Field name
    pub name: Option<String>,
    /// Description
    pub description: Option<String>,
    /// Field type
    #[serde(rename = "type")]
    pub field_type: Option<String>,
    /// Expected values
    pub expected_values: Option<String>,
    /// Handling of missing values
    pub missing_values: Option<String>,
    /// Special values
    pub special_values: Option<String>,
}

/// A dataset
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DataDescriptor {
    /// Description
    pub description: Option<String>,
    /// Source
    pub source: Option<String>,
    /// Classification
    pub classification: Option<DataClassification>,
    /// Access
    pub access: Option<String>,
    /// Labeling method
    pub labeling_method: Option<String>,
    /// Labels
    #[serde(default)]
    pub labels: Vec<LabelDescriptor>,
    /// Fields
    #[serde(default)]
    pub fields: Vec<FieldDescriptor>,
    /// Rights
    pub rights: Option<String>,
    /// Policies
    pub policies: Option<String>,
}

/// Compute resources
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ModelResourcesDescriptor {
    /// CPU
    pub cpu: Option<String>,
    /// GPU
    pub gpu: Option<String>,
    /// Memory
    pub memory: Option<String>,
    /// Storage
    pub storage: Option<String>,
}

/// A model input or output
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ModelIoDescriptor {
    /// Name
    pub name: Option<String>,
    /// Description
    pub description: Option<String>,
    /// Type
    #[serde(rename = "type")]
    pub io_type: Option<String>,
    /// Expected values
    pub expected_values: Option<String>,
}

/// The model component
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ModelDescriptor {
    /// Resources used for development
    #[serde(default)]
    pub development_compute_resources: ModelResourcesDescriptor,
    /// Deployment platform
    pub deployment_platform: Option<String>,
    /// How the capability is deployed
    pub capability_deployment_mechanism: Option<String>,
    /// Inputs
    #[serde(default)]
    pub input_specification: Vec<ModelIoDescriptor>,
    /// Outputs
    #[serde(default)]
    pub output_specification: Vec<ModelIoDescriptor>,
    /// Resources used in production
    #[serde(default)]
    pub production_compute_resources: ModelResourcesDescriptor,
}

/// A quality attribute scenario
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct QasDescriptor {
    /// Unique id, assigned on save if missing
    pub identifier: Option<String>,
    /// Quality attribute under evaluation
    pub quality: Option<String>,
    /// Triggering condition
    pub stimulus: Option<String>,
    /// Where the stimulus comes from
    pub source: Option<String>,
    /// Circumstances of the scenario
    pub environment: Option<String>,
    /// Expected response
    pub response: Option<String>,
    /// How the response is judged
    pub measure: Option<String>,
}

/// Negotiation card artifact
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NegotiationCard {
    /// Store identifier
    pub identifier: String,
    /// System context
    #[serde(default)]
    pub system: SystemDescriptor,
    /// Datasets
    #[serde(default)]
    pub data: Vec<DataDescriptor>,
    /// Model component
    #[serde(default)]
    pub model: ModelDescriptor,
    /// Quality attribute scenarios
    #[serde(default)]
    pub system_requirements: Vec<QasDescriptor>,
}

impl Default for NegotiationCard {
    fn default() -> Self {
        Self::new(ArtifactKind::NegotiationCard.default_identifier())
    }
}

impl NegotiationCard {
    /// Empty card
    #[must_use]
    pub fn new(identifier: impl Into<String>) -> Self {
        Self {
            identifier: identifier.into(),
            system: SystemDescriptor::default(),
            data: Vec::new(),
            model: ModelDescriptor::default(),
            system_requirements: Vec::new(),
        }
    }

    /// Assign `<card>-qas_NNN` ids to scenarios that have none, continuing
    /// after the highest existing number
    pub fn assign_qas_ids(&mut self) {
        let mut highest = self
            .system_requirements
            .iter()
            .filter_map(|q| q.identifier.as_deref())
            .filter_map(|id| id.rsplit_once(QAS_ID_PREFIX))
            .filter_map(|(_, n)| n.parse::<u32>().ok())
            .max()
            .unwrap_or(0);
        for qas in &mut self.system_requirements {
            if qas.identifier.is_none() {
                highest += 1;
                qas.identifier = Some(format!("{}-{QAS_ID_PREFIX}{highest:03}", self.identifier));
            }
        }
    }

    /// Ids of all scenarios that have one
    #[must_use]
    pub fn qas_ids(&self) -> Vec<&str> {
        self.system_requirements
            .iter()
            .filter_map(|q| q.identifier.as_deref())
            .collect()
    }
}

impl Artifact for NegotiationCard {
    const KIND: ArtifactKind = ArtifactKind::NegotiationCard;

    fn identifier(&self) -> String {
        self.identifier.clone()
    }

    fn to_model(&self) -> Result<Value> {
        let mut card = self.clone();
        card.assign_qas_ids();
        Ok(serde_json::to_value(card)?)
    }

    fn from_model(model: &Value) -> Result<Self> {
        serde_json::from_value(model.clone())
            .map_err(|e| Error::Deserialization(format!("invalid negotiation card: {e}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mlqa_store::{Context, MemoryStore};

    fn card() -> NegotiationCard {
        let mut card = NegotiationCard::new("card");
        card.system.problem_type = Some(ProblemType::Classification);
        card.system.goals.push(GoalDescriptor {
            description: Some("Classify flowers".into()),
            metrics: vec![MetricDescriptor {
                description: Some("accuracy".into()),
                baseline: Some("0.9".into()),
            }],
        });
        card.system_requirements.push(QasDescriptor {
            identifier: Some("card-qas_002".into()),
            quality: Some("Resource consumption".into()),
            ..QasDescriptor::default()
        });
        card.system_requirements.push(QasDescriptor {
            quality: Some("Storage".into()),
            ..QasDescriptor::default()
        });
        card
    }

    #[test]
    fn test_assign_qas_ids_continues_numbering() {
        let mut c = card();
        c.assign_qas_ids();
        assert_eq!(c.qas_ids(), vec!["card-qas_002", "card-qas_003"]);
    }

    #[test]
    fn test_serialized_enums() {
        let json = serde_json::to_value(ProblemType::ContentGeneration).expect("serialize");
        assert_eq!(json, "content_generation");
        let json = serde_json::to_value(DataClassification::Pii).expect("serialize");
        assert_eq!(json, "pii");
    }

    #[test]
    fn test_store_roundtrip_assigns_ids() {
        let store = MemoryStore::new();
        let ctx = Context::new("m", "v");
        card().save_with(&ctx, &store).expect("save");
        let loaded = NegotiationCard::load_with("card", &ctx, &store).expect("load");
        assert_eq!(loaded.qas_ids().len(), 2);
        assert_eq!(loaded.system.goals.len(), 1);
    }

    #[test]
    fn test_default_identifier() {
        assert_eq!(NegotiationCard::default().identifier, "default.negotiation_card");
    }

    #[test]
    fn test_invalid_model() {
        let err = NegotiationCard::from_model(&serde_json::json!({"system": 3})).unwrap_err();
        assert!(matches!(err, Error::Deserialization(_)));
    }
}
