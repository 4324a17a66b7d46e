//! Validators: predicates over evidence that yield success, failure or info
//!
//! A validator keeps two forms of its predicate: something runnable and
//! the source text. Structured [`Condition`]s are both at once. Native
//! closures only survive a store round trip when their source text parses
//! as a condition; otherwise the loaded validator is frozen and reports that
//! it cannot be re-run.

pub mod builtin;
mod condition;

pub use condition::{CompareOp, Condition};

use serde::{Deserialize, Serialize};
use std::any::Any;
use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;

use crate::error::{Error, Result};
use crate::evidence::{Evidence, EvidenceType, FieldValue};
use crate::result::{ResultKind, ValidationResult};

/// Longest rendering of evidence quoted in a result message
pub const MAX_VALUE_CHARS: usize = 300;

/// Message of a validator whose predicate could not be rebuilt
pub const NOT_RECONSTRUCTIBLE: &str = "validator not reconstructible";

fn panic_text(payload: &(dyn Any + Send)) -> String {
    payload
        .downcast_ref::<&str>()
        .map(ToString::to_string)
        .or_else(|| payload.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "unknown panic".to_string())
}

/// Outcome of a predicate
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    /// Condition holds
    Pass,
    /// Condition does not hold
    Fail,
    /// No natural predicate; record for information
    Info,
}

impl From<bool> for Verdict {
    fn from(value: bool) -> Self {
        if value { Self::Pass } else { Self::Fail }
    }
}

/// Native predicate
pub type Closure = Arc<dyn Fn(&Evidence) -> Result<Verdict> + Send + Sync>;

/// The boolean expression handed to [`build_validator`]
#[derive(Clone)]
pub enum BoolExp {
    /// Structured, serializable condition
    Condition(Condition),
    /// Native closure plus its source text
    Closure {
        /// Source text of the closure
        source: String,
        /// Runnable predicate
        f: Closure,
    },
}

impl BoolExp {
    /// Wrap a closure returning `bool` together with its source text
    #[must_use]
    pub fn closure<F>(source: impl Into<String>, f: F) -> Self
    where
        F: Fn(&Evidence) -> Result<bool> + Send + Sync + 'static,
    {
        Self::Closure {
            source: source.into(),
            f: Arc::new(move |e: &Evidence| f(e).map(Verdict::from)),
        }
    }

    fn source(&self) -> String {
        match self {
            Self::Condition(c) => c.source(),
            Self::Closure { source, .. } => source.clone(),
        }
    }
}

impl From<Condition> for BoolExp {
    fn from(c: Condition) -> Self {
        Self::Condition(c)
    }
}

impl fmt::Debug for BoolExp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "BoolExp({})", self.source())
    }
}

#[derive(Clone)]
enum Predicate {
    Condition(Condition),
    Closure(Closure),
    Info,
    Frozen,
}

impl fmt::Debug for Predicate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Condition(c) => write!(f, "Condition({c})"),
            Self::Closure(_) => f.write_str("Closure"),
            Self::Info => f.write_str("Info"),
            Self::Frozen => f.write_str("Frozen"),
        }
    }
}

/// Who built a validator, kept for provenance
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Creator {
    /// Type the constructor belongs to
    pub entity: String,
    /// Constructor name
    pub function: String,
    /// Rendered arguments
    pub arguments: Vec<String>,
}

/// Serialized form of a validator
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValidatorModel {
    /// Source text of the predicate
    pub bool_exp: Option<String>,
    /// Structured predicate, when available
    #[serde(default)]
    pub condition: Option<Condition>,
    /// Success message template
    pub success: Option<String>,
    /// Failure message template
    pub failure: Option<String>,
    /// Informational message template
    pub info: Option<String>,
    /// Captured thresholds
    #[serde(default)]
    pub thresholds: Vec<FieldValue>,
    /// Accepted evidence types (fully-qualified names)
    #[serde(default)]
    pub input_types: Vec<String>,
    /// Provenance
    #[serde(default)]
    pub creator: Option<Creator>,
}

/// A predicate over evidence with outcome messages
#[derive(Debug, Clone)]
pub struct Validator {
    bool_exp_str: Option<String>,
    predicate: Predicate,
    success: Option<String>,
    failure: Option<String>,
    info: Option<String>,
    thresholds: Vec<FieldValue>,
    input_types: Vec<EvidenceType>,
    creator: Option<Creator>,
}

/// Build a validator from a predicate and its outcome messages.
///
/// Messages may reference thresholds as `{threshold}`, `{thresholds}` or
/// `{0}`, `{1}`, ...
///
/// # Errors
///
/// Returns [`Error::Invariant`] if the message is empty.
pub fn build_validator(
    bool_exp: impl Into<BoolExp>,
    thresholds: Vec<FieldValue>,
    success: impl Into<String>,
    failure: impl Into<String>,
    input_types: Vec<EvidenceType>,
) -> Result<Validator> {
    let (success, failure) = (success.into(), failure.into());
    if success.trim().is_empty() || failure.trim().is_empty() {
        return Err(Error::Invariant(
            "validator needs both a success and a failure message".to_string(),
        ));
    }
    Ok(Validator::assemble(
        bool_exp.into(),
        thresholds,
        success,
        failure,
        input_types,
    ))
}

impl Validator {
    pub(crate) fn assemble(
        bool_exp: BoolExp,
        thresholds: Vec<FieldValue>,
        success: String,
        failure: String,
        input_types: Vec<EvidenceType>,
    ) -> Self {
        let source = bool_exp.source();
        let predicate = match bool_exp {
            BoolExp::Condition(c) => Predicate::Condition(c),
            BoolExp::Closure { f, .. } => Predicate::Closure(f),
        };
        Self {
            bool_exp_str: Some(source),
            predicate,
            success: Some(success),
            failure: Some(failure),
            info: None,
            thresholds,
            input_types,
            creator: None,
        }
    }

    /// Validator that records evidence without judging it
    #[must_use]
    pub fn info(message: impl Into<String>, input_types: Vec<EvidenceType>) -> Self {
        Self {
            bool_exp_str: None,
            predicate: Predicate::Info,
            success: None,
            failure: None,
            info: Some(message.into()),
            thresholds: Vec::new(),
            input_types,
            creator: None,
        }
    }

    /// Record who built this validator
    #[must_use]
    pub fn with_creator(
        mut self,
        entity: impl Into<String>,
        function: impl Into<String>,
        arguments: Vec<String>,
    ) -> Self {
        self.creator = Some(Creator {
            entity: entity.into(),
            function: function.into(),
            arguments,
        });
        self
    }

    /// Message used when a predicate answers [`Verdict::Info`]
    #[must_use]
    pub fn with_info(mut self, message: impl Into<String>) -> Self {
        self.info = Some(message.into());
        self
    }

    /// Source text of the predicate
    #[must_use]
    pub fn bool_exp_str(&self) -> Option<&str> {
        self.bool_exp_str.as_deref()
    }

    /// Accepted evidence types
    #[must_use]
    pub fn input_types(&self) -> &[EvidenceType] {
        &self.input_types
    }

    /// Captured thresholds
    #[must_use]
    pub fn thresholds(&self) -> &[FieldValue] {
        &self.thresholds
    }

    /// Provenance
    #[must_use]
    pub fn creator(&self) -> Option<&Creator> {
        self.creator.as_ref()
    }

    /// Whether the predicate can be executed
    #[must_use]
    pub fn is_frozen(&self) -> bool {
        matches!(self.predicate, Predicate::Frozen)
    }

    /// Whether evidence of `ty` is accepted
    #[must_use]
    pub fn accepts(&self, ty: EvidenceType) -> bool {
        self.input_types.is_empty() || self.input_types.iter().any(|t| ty.satisfies(*t))
    }

    fn interpolate(&self, template: &str) -> String {
        let rendered: Vec<String> = self.thresholds.iter().map(ToString::to_string).collect();
        let mut out = template.replace("{thresholds}", &rendered.join(", "));
        if let Some(first) = rendered.first() {
            out = out.replace("{threshold}", first);
        }
        for (i, value) in rendered.iter().enumerate() {
            out = out.replace(&format!("{{{i}}}"), value);
        }
        out
    }

    fn with_values(message: &str, evidence: &Evidence) -> String {
        let rendered = evidence.to_string();
        let truncated: String = rendered.chars().take(MAX_VALUE_CHARS).collect();
        format!("{message} - values: [\"{truncated}\"]")
    }

    fn result(&self, kind: ResultKind, message: String, evidence: &Evidence) -> ValidationResult {
        ValidationResult {
            kind,
            message,
            thresholds: self.thresholds.clone(),
            validator: self.bool_exp_str.clone(),
            metadata: evidence.metadata().cloned(),
        }
    }

    /// Validate evidence.
    ///
    /// Order: failure placeholders and type mismatches fail without running
    /// the predicate; predicate errors and panics fail with the error kind;
    /// otherwise the verdict selects the message.
    #[must_use]
    pub fn validate(&self, evidence: &Evidence) -> ValidationResult {
        if let crate::evidence::EvidenceValue::Failure { kind, message, .. } = evidence.value() {
            return self.result(
                ResultKind::Failure,
                format!("evidence collection failed: {kind}: {message}"),
                evidence,
            );
        }

        let actual = evidence.evidence_type();
        if !self.accepts(actual) {
            let expected: Vec<&str> = self.input_types.iter().map(|t| t.name()).collect();
            return self.result(
                ResultKind::Failure,
                format!(
                    "type error: expected {}, got {}",
                    expected.join(" | "),
                    actual.name()
                ),
                evidence,
            );
        }

        let verdict = match &self.predicate {
            Predicate::Condition(c) => c.evaluate(evidence).map(Verdict::from),
            Predicate::Closure(f) => match panic::catch_unwind(AssertUnwindSafe(|| f(evidence))) {
                Ok(verdict) => verdict,
                Err(payload) => {
                    return self.result(
                        ResultKind::Failure,
                        format!("PanicError: {}", panic_text(payload.as_ref())),
                        evidence,
                    );
                }
            },
            Predicate::Info => Ok(Verdict::Info),
            Predicate::Frozen => {
                return self.result(
                    ResultKind::Failure,
                    NOT_RECONSTRUCTIBLE.to_string(),
                    evidence,
                );
            }
        };

        match verdict {
            Err(e) => self.result(
                ResultKind::Failure,
                format!("{}: {e}", e.kind_name()),
                evidence,
            ),
            Ok(verdict) => {
                let (kind, template) = match verdict {
                    Verdict::Pass => (ResultKind::Success, self.success.as_deref()),
                    Verdict::Fail => (ResultKind::Failure, self.failure.as_deref()),
                    Verdict::Info => (
                        ResultKind::Info,
                        self.info.as_deref().or(self.success.as_deref()),
                    ),
                };
                let message = self.interpolate(template.unwrap_or_default());
                self.result(kind, Self::with_values(&message, evidence), evidence)
            }
        }
    }

    /// Serialized form
    #[must_use]
    pub fn to_model(&self) -> ValidatorModel {
        ValidatorModel {
            bool_exp: self.bool_exp_str.clone(),
            condition: match &self.predicate {
                Predicate::Condition(c) => Some(c.clone()),
                _ => None,
            },
            success: self.success.clone(),
            failure: self.failure.clone(),
            info: self.info.clone(),
            thresholds: self.thresholds.clone(),
            input_types: self.input_types.iter().map(|t| t.qualified_name()).collect(),
            creator: self.creator.clone(),
        }
    }

    /// Rebuild from the serialized form.
    ///
    /// Prefers the structured condition, then the source text, and falls
    /// back to a frozen validator.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Deserialization`] for unknown input types.
    pub fn from_model(model: &ValidatorModel) -> Result<Self> {
        let input_types = model
            .input_types
            .iter()
            .map(|name| {
                EvidenceType::from_name(name).ok_or_else(|| {
                    Error::Deserialization(format!("unknown evidence type '{name}'"))
                })
            })
            .collect::<Result<Vec<_>>>()?;

        let predicate = if let Some(c) = &model.condition {
            Predicate::Condition(c.clone())
        } else if let Some(c) = model
            .bool_exp
            .as_deref()
            .and_then(|src| Condition::parse(src).ok())
        {
            Predicate::Condition(c)
        } else if model.bool_exp.is_none() && model.info.is_some() {
            Predicate::Info
        } else {
            tracing::warn!(bool_exp = ?model.bool_exp, "validator predicate cannot be rebuilt");
            Predicate::Frozen
        };

        Ok(Self {
            bool_exp_str: model.bool_exp.clone(),
            predicate,
            success: model.success.clone(),
            failure: model.failure.clone(),
            info: model.info.clone(),
            thresholds: model.thresholds.clone(),
            input_types,
            creator: model.creator.clone(),
        })
    }
}
