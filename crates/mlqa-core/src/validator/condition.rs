//! Structured threshold conditions
//!
//! A condition has the shape `evidence.<field> <op> <threshold>`. It is both
//! executable and serializable, so validators built from one survive a round
//! trip through the store.

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;

use crate::error::{Error, Result};
use crate::evidence::{Evidence, FieldValue};
use crate::units::Quantity;

static CONDITION_RE: Lazy<Option<Regex>> = Lazy::new(|| {
    Regex::new(r"^\s*(\w+)\.(\w+)\s*(<=|>=|==|!=|<|>|contains)\s*(.+?)\s*$").ok()
});

/// Comparison operator
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CompareOp {
    /// `<`
    #[serde(rename = "<")]
    Lt,
    /// `<=`
    #[serde(rename = "<=")]
    Le,
    /// `>`
    #[serde(rename = ">")]
    Gt,
    /// `>=`
    #[serde(rename = ">=")]
    Ge,
    /// `==`
    #[serde(rename = "==")]
    Eq,
    /// `!=`
    #[serde(rename = "!=")]
    Ne,
    /// Substring test, text only
    #[serde(rename = "contains")]
    Contains,
}

impl CompareOp {
    /// Source form
    #[must_use]
    pub const fn symbol(self) -> &'static str {
        match self {
            Self::Lt => "<",
            Self::Le => "<=",
            Self::Gt => ">",
            Self::Ge => ">=",
            Self::Eq => "==",
            Self::Ne => "!=",
            Self::Contains => "contains",
        }
    }

    fn parse(symbol: &str) -> Option<Self> {
        [
            Self::Lt,
            Self::Le,
            Self::Gt,
            Self::Ge,
            Self::Eq,
            Self::Ne,
            Self::Contains,
        ]
        .into_iter()
        .find(|op| op.symbol() == symbol)
    }

    fn holds(self, ordering: Ordering) -> Option<bool> {
        match self {
            Self::Lt => Some(ordering == Ordering::Less),
            Self::Le => Some(ordering != Ordering::Greater),
            Self::Gt => Some(ordering == Ordering::Greater),
            Self::Ge => Some(ordering != Ordering::Less),
            Self::Eq => Some(ordering == Ordering::Equal),
            Self::Ne => Some(ordering != Ordering::Equal),
            Self::Contains => None,
        }
    }
}

impl fmt::Display for CompareOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.symbol())
    }
}

/// `evidence.<field> <op> <threshold>`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Condition {
    /// Evidence field to read
    pub field: String,
    /// Operator
    pub op: CompareOp,
    /// Right-hand side
    pub threshold: FieldValue,
}

impl Condition {
    /// Create a condition
    #[must_use]
    pub fn new(field: impl Into<String>, op: CompareOp, threshold: impl Into<FieldValue>) -> Self {
        Self {
            field: field.into(),
            op,
            threshold: threshold.into(),
        }
    }

    /// Parse the source form, e.g. `evidence.max < 3000 byte` or
    /// `evidence.value contains "ok"`
    ///
    /// # Errors
    ///
    /// Returns [`Error::Deserialization`] if the text is not of that shape.
    pub fn parse(source: &str) -> Result<Self> {
        let malformed = || Error::Deserialization(format!("not a condition: '{source}'"));
        let re = CONDITION_RE.as_ref().ok_or_else(malformed)?;
        let caps = re.captures(source).ok_or_else(malformed)?;
        let op = CompareOp::parse(&caps[3]).ok_or_else(malformed)?;
        let raw = &caps[4];
        let threshold = if let Some(text) = raw
            .strip_prefix('"')
            .and_then(|r| r.strip_suffix('"'))
        {
            FieldValue::Text(text.to_string())
        } else {
            FieldValue::Quantity(raw.parse::<Quantity>().map_err(|_| malformed())?)
        };
        Ok(Self {
            field: caps[2].to_string(),
            op,
            threshold,
        })
    }

    /// Source form accepted by [`Condition::parse`]
    #[must_use]
    pub fn source(&self) -> String {
        let rhs = match &self.threshold {
            FieldValue::Quantity(q) => q.to_string(),
            FieldValue::Text(t) => format!("\"{t}\""),
        };
        format!("evidence.{} {} {rhs}", self.field, self.op)
    }

    /// Evaluate against evidence
    ///
    /// # Errors
    ///
    /// Returns an error if the field is missing, units are incompatible, or
    /// the operator does not apply to the operand types.
    pub fn evaluate(&self, evidence: &Evidence) -> Result<bool> {
        let lhs = evidence.field(&self.field)?;
        match (&lhs, &self.threshold) {
            (FieldValue::Quantity(a), FieldValue::Quantity(b)) => {
                let ordering = a.compare(b)?;
                self.op.holds(ordering).ok_or_else(|| {
                    Error::Invariant(format!("operator '{}' requires text operands", self.op))
                })
            }
            (FieldValue::Text(a), FieldValue::Text(b)) => Ok(match self.op {
                CompareOp::Contains => a.contains(b.as_str()),
                op => op.holds(a.as_str().cmp(b.as_str())).unwrap_or(false),
            }),
            _ => Err(Error::Invariant(format!(
                "cannot compare {lhs} with {}",
                self.threshold
            ))),
        }
    }
}

impl fmt::Display for Condition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.source())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::evidence::{EvidenceValue, Statistics, StatisticsKind};
    use crate::units::{Unit, quantity};

    fn memory(max_kb: f64) -> Evidence {
        Evidence::new(EvidenceValue::statistics(
            StatisticsKind::Memory,
            Statistics::new(max_kb / 2.0, 0.0, max_kb, Some(Unit::Kilobyte)),
        ))
    }

    #[test]
    fn test_parse_and_source_roundtrip() {
        let c = Condition::parse("evidence.max < 3000 byte").expect("parse");
        assert_eq!(c.field, "max");
        assert_eq!(c.op, CompareOp::Lt);
        assert_eq!(c.threshold, FieldValue::Quantity(quantity(3000, Unit::Byte)));
        assert_eq!(Condition::parse(&c.source()).expect("reparse"), c);

        let c = Condition::parse("e.value contains \"ok\"").expect("parse");
        assert_eq!(c.threshold, FieldValue::from("ok"));
        assert_eq!(c.source(), "evidence.value contains \"ok\"");
    }

    #[test]
    fn test_parse_rejects_other_shapes() {
        assert!(Condition::parse("lambda e: e.max < 3").is_err());
        assert!(Condition::parse("evidence.max ~ 3").is_err());
        assert!(Condition::parse("evidence.max < 3 parsecs").is_err());
    }

    #[test]
    fn test_evaluate_with_unit_conversion() {
        let c = Condition::new("max", CompareOp::Lt, quantity(3000, Unit::Byte));
        assert!(c.evaluate(&memory(2.0)).expect("eval"));
        assert!(!c.evaluate(&memory(4.0)).expect("eval"));
    }

    #[test]
    fn test_evaluate_text() {
        let e = Evidence::new(EvidenceValue::String("all checks ok".into()));
        assert!(Condition::new("value", CompareOp::Contains, "ok").evaluate(&e).expect("eval"));
        assert!(!Condition::new("value", CompareOp::Eq, "ok").evaluate(&e).expect("eval"));
    }

    #[test]
    fn test_evaluate_errors() {
        let c = Condition::new("max", CompareOp::Lt, quantity(1, Unit::Watt));
        let err = c.evaluate(&memory(1.0)).unwrap_err();
        assert_eq!(err.kind_name(), "UnitError");

        let c = Condition::new("max", CompareOp::Contains, quantity(1, Unit::Byte));
        assert!(c.evaluate(&memory(1.0)).is_err());

        let c = Condition::new("value", CompareOp::Lt, quantity(1, Unit::Byte));
        assert!(c.evaluate(&memory(1.0)).is_err());
    }

    #[test]
    fn test_op_serde() {
        let json = serde_json::to_value(CompareOp::Le).expect("serialize");
        assert_eq!(json, serde_json::json!("<="));
    }
}
