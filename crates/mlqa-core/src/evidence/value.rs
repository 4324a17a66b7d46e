//! Evidence payload variants and their canonical JSON

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value, json};
use std::fmt;

use super::statistics::{Statistics, StatisticsKind};
use crate::error::{Error, Result};
use crate::units::{Magnitude, Quantity, Unit};

const MODULE_PATH: &str = "mlqa_core::evidence";

/// Type tag of an evidence variant
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EvidenceType {
    /// Integer with optional unit
    Integer,
    /// Real with optional unit
    Real,
    /// Text
    String,
    /// List of scalars
    Array,
    /// Binary image
    Image,
    /// Arbitrary mapping
    Opaque,
    /// Generic statistics
    CommonStatistics,
    /// CPU utilization statistics
    CpuStatistics,
    /// Process memory statistics
    MemoryStatistics,
    /// GPU memory statistics
    GpuMemoryStatistics,
    /// GPU power statistics
    GpuPowerStatistics,
    /// Placeholder for evidence that could not be collected
    Failure,
}

impl EvidenceType {
    /// Every evidence type
    pub const ALL: [Self; 12] = [
        Self::Integer,
        Self::Real,
        Self::String,
        Self::Array,
        Self::Image,
        Self::Opaque,
        Self::CommonStatistics,
        Self::CpuStatistics,
        Self::MemoryStatistics,
        Self::GpuMemoryStatistics,
        Self::GpuPowerStatistics,
        Self::Failure,
    ];

    /// Discriminator used in canonical JSON
    #[must_use]
    pub const fn tag(self) -> &'static str {
        match self {
            Self::Integer => "integer",
            Self::Real => "real",
            Self::String => "string",
            Self::Array => "array",
            Self::Image => "image",
            Self::Opaque => "opaque",
            Self::CommonStatistics => "common_statistics",
            Self::CpuStatistics => "cpu_statistics",
            Self::MemoryStatistics => "memory_statistics",
            Self::GpuMemoryStatistics => "gpu_memory_statistics",
            Self::GpuPowerStatistics => "gpu_power_statistics",
            Self::Failure => "failure",
        }
    }

    /// Short type name
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::Integer => "Integer",
            Self::Real => "Real",
            Self::String => "String",
            Self::Array => "Array",
            Self::Image => "Image",
            Self::Opaque => "Opaque",
            Self::CommonStatistics => "CommonStatistics",
            Self::CpuStatistics => "CPUStatistics",
            Self::MemoryStatistics => "MemoryStatistics",
            Self::GpuMemoryStatistics => "GPUMemoryStatistics",
            Self::GpuPowerStatistics => "GPUPowerStatistics",
            Self::Failure => "Failure",
        }
    }

    /// Fully-qualified type name recorded as `output_class`
    #[must_use]
    pub fn qualified_name(self) -> String {
        format!("{MODULE_PATH}::{}", self.name())
    }

    /// Look up a type by tag
    #[must_use]
    pub fn from_tag(tag: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|t| t.tag() == tag)
    }

    /// Look up a type by short or fully-qualified name
    #[must_use]
    pub fn from_name(name: &str) -> Option<Self> {
        let short = name.rsplit("::").next().unwrap_or(name);
        Self::ALL
            .into_iter()
            .find(|t| t.name() == short)
            .or_else(|| Self::from_tag(short))
    }

    /// Statistics flavour, if this is a statistics type
    #[must_use]
    pub const fn statistics_kind(self) -> Option<StatisticsKind> {
        match self {
            Self::CommonStatistics => Some(StatisticsKind::Common),
            Self::CpuStatistics => Some(StatisticsKind::Cpu),
            Self::MemoryStatistics => Some(StatisticsKind::Memory),
            Self::GpuMemoryStatistics => Some(StatisticsKind::GpuMemory),
            Self::GpuPowerStatistics => Some(StatisticsKind::GpuPower),
            _ => None,
        }
    }

    /// Whether evidence of this type is accepted where `required` is expected.
    ///
    /// Every statistics flavour is accepted as `CommonStatistics`.
    #[must_use]
    pub fn satisfies(self, required: Self) -> bool {
        self == required
            || (required == Self::CommonStatistics && self.statistics_kind().is_some())
    }
}

impl From<StatisticsKind> for EvidenceType {
    fn from(kind: StatisticsKind) -> Self {
        match kind {
            StatisticsKind::Common => Self::CommonStatistics,
            StatisticsKind::Cpu => Self::CpuStatistics,
            StatisticsKind::Memory => Self::MemoryStatistics,
            StatisticsKind::GpuMemory => Self::GpuMemoryStatistics,
            StatisticsKind::GpuPower => Self::GpuPowerStatistics,
        }
    }
}

impl fmt::Display for EvidenceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Element of an [`EvidenceValue::Array`]
#[allow(missing_docs)]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Scalar {
    Integer(i64),
    Real(f64),
    Bool(bool),
    Text(String),
}

impl fmt::Display for Scalar {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Integer(i) => write!(f, "{i}"),
            Self::Real(r) => write!(f, "{r}"),
            Self::Bool(b) => write!(f, "{b}"),
            Self::Text(s) => write!(f, "{s}"),
        }
    }
}

/// A field read off evidence, or a threshold it is compared with
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FieldValue {
    /// Numeric value with optional unit
    Quantity(Quantity),
    /// Text value
    Text(String),
}

impl fmt::Display for FieldValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Quantity(q) => write!(f, "{q}"),
            Self::Text(s) => write!(f, "{s}"),
        }
    }
}

impl From<Quantity> for FieldValue {
    fn from(q: Quantity) -> Self {
        Self::Quantity(q)
    }
}

impl From<&str> for FieldValue {
    fn from(s: &str) -> Self {
        Self::Text(s.to_string())
    }
}

/// Typed output of a measurement
#[derive(Debug, Clone, PartialEq)]
pub enum EvidenceValue {
    /// Integer with optional unit
    Integer {
        /// Value
        value: i64,
        /// Unit
        unit: Option<Unit>,
    },
    /// Real with optional unit
    Real {
        /// Value
        value: f64,
        /// Unit
        unit: Option<Unit>,
    },
    /// Text
    String(String),
    /// List of scalars
    Array(Vec<Scalar>),
    /// Binary image
    Image {
        /// Raw image bytes
        bytes: Vec<u8>,
        /// MIME type, e.g. `image/png`
        mime: String,
    },
    /// Arbitrary mapping
    Opaque(Map<String, Value>),
    /// Aggregated samples
    Statistics {
        /// Domain flavour
        kind: StatisticsKind,
        /// Values
        stats: Statistics,
    },
    /// Evidence collection failed
    Failure {
        /// Error kind name
        kind: String,
        /// Error message
        message: String,
        /// Captured context lines
        trace: Vec<String>,
    },
}

#[derive(Deserialize)]
struct QuantityPayload {
    magnitude: Magnitude,
    #[serde(default)]
    unit: Option<Unit>,
}

#[derive(Serialize, Deserialize)]
struct StringPayload {
    value: String,
}

#[derive(Serialize, Deserialize)]
struct ArrayPayload {
    values: Vec<Scalar>,
}

#[derive(Serialize, Deserialize)]
struct ImagePayload {
    bytes: String,
    mime: String,
}

#[derive(Deserialize)]
struct StatisticsPayload {
    avg: f64,
    min: f64,
    max: f64,
    #[serde(default)]
    unit: Option<Unit>,
}

#[derive(Serialize, Deserialize)]
struct FailurePayload {
    kind: String,
    message: String,
    #[serde(default)]
    trace: Vec<String>,
}

fn decode<T: serde::de::DeserializeOwned>(ty: EvidenceType, payload: &Value) -> Result<T> {
    serde_json::from_value(payload.clone())
        .map_err(|e| Error::Deserialization(format!("invalid {} payload: {e}", ty.tag())))
}

impl EvidenceValue {
    /// Integer without unit
    #[must_use]
    pub const fn integer(value: i64) -> Self {
        Self::Integer { value, unit: None }
    }

    /// Real without unit
    #[must_use]
    pub const fn real(value: f64) -> Self {
        Self::Real { value, unit: None }
    }

    /// Statistics of the given flavour
    #[must_use]
    pub const fn statistics(kind: StatisticsKind, stats: Statistics) -> Self {
        Self::Statistics { kind, stats }
    }

    /// Failure placeholder
    #[must_use]
    pub fn failure(kind: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Failure {
            kind: kind.into(),
            message: message.into(),
            trace: Vec::new(),
        }
    }

    /// Type tag of this value
    #[must_use]
    pub fn evidence_type(&self) -> EvidenceType {
        match self {
            Self::Integer { .. } => EvidenceType::Integer,
            Self::Real { .. } => EvidenceType::Real,
            Self::String(_) => EvidenceType::String,
            Self::Array(_) => EvidenceType::Array,
            Self::Image { .. } => EvidenceType::Image,
            Self::Opaque(_) => EvidenceType::Opaque,
            Self::Statistics { kind, .. } => (*kind).into(),
            Self::Failure { .. } => EvidenceType::Failure,
        }
    }

    /// Whether this is a failure placeholder
    #[must_use]
    pub const fn is_failure(&self) -> bool {
        matches!(self, Self::Failure { .. })
    }

    /// Whether every real number in the value is finite.
    ///
    /// JSON has no encoding for NaN or infinity, so only finite values
    /// survive a store round trip.
    #[must_use]
    pub fn is_finite(&self) -> bool {
        match self {
            Self::Real { value, .. } => value.is_finite(),
            Self::Array(values) => values.iter().all(|v| match v {
                Scalar::Real(r) => r.is_finite(),
                _ => true,
            }),
            Self::Statistics { stats, .. } => {
                stats.avg.is_finite() && stats.min.is_finite() && stats.max.is_finite()
            }
            _ => true,
        }
    }

    /// Variant-specific payload of the canonical JSON
    #[must_use]
    pub fn to_payload(&self) -> Value {
        match self {
            Self::Integer { value, unit } => json!({"magnitude": value, "unit": unit}),
            Self::Real { value, unit } => json!({"magnitude": value, "unit": unit}),
            Self::String(value) => json!({"value": value}),
            Self::Array(values) => json!({"values": values}),
            Self::Image { bytes, mime } => json!({"bytes": STANDARD.encode(bytes), "mime": mime}),
            Self::Opaque(map) => Value::Object(map.clone()),
            Self::Statistics { stats, .. } => json!({
                "avg": stats.avg,
                "min": stats.min,
                "max": stats.max,
                "unit": stats.unit,
            }),
            Self::Failure {
                kind,
                message,
                trace,
            } => json!({"kind": kind, "message": message, "trace": trace}),
        }
    }

    /// Rebuild a value from its type tag and payload
    ///
    /// # Errors
    ///
    /// Returns [`Error::Deserialization`] if the payload does not match the tag.
    pub fn from_payload(ty: EvidenceType, payload: &Value) -> Result<Self> {
        match ty {
            EvidenceType::Integer => {
                let p: QuantityPayload = decode(ty, payload)?;
                match p.magnitude {
                    Magnitude::Integer(value) => Ok(Self::Integer {
                        value,
                        unit: p.unit,
                    }),
                    Magnitude::Real(r) => Err(Error::Deserialization(format!(
                        "integer payload has non-integral magnitude {r}"
                    ))),
                }
            }
            EvidenceType::Real => {
                let p: QuantityPayload = decode(ty, payload)?;
                Ok(Self::Real {
                    value: p.magnitude.as_f64(),
                    unit: p.unit,
                })
            }
            EvidenceType::String => {
                let p: StringPayload = decode(ty, payload)?;
                Ok(Self::String(p.value))
            }
            EvidenceType::Array => {
                let p: ArrayPayload = decode(ty, payload)?;
                Ok(Self::Array(p.values))
            }
            EvidenceType::Image => {
                let p: ImagePayload = decode(ty, payload)?;
                let bytes = STANDARD
                    .decode(p.bytes.as_bytes())
                    .map_err(|e| Error::Deserialization(format!("invalid image bytes: {e}")))?;
                Ok(Self::Image {
                    bytes,
                    mime: p.mime,
                })
            }
            EvidenceType::Opaque => match payload {
                Value::Object(map) => Ok(Self::Opaque(map.clone())),
                _ => Err(Error::Deserialization(
                    "opaque payload must be an object".to_string(),
                )),
            },
            EvidenceType::Failure => {
                let p: FailurePayload = decode(ty, payload)?;
                Ok(Self::Failure {
                    kind: p.kind,
                    message: p.message,
                    trace: p.trace,
                })
            }
            stats_type => {
                let kind = stats_type.statistics_kind().ok_or_else(|| {
                    Error::Deserialization(format!("unsupported type {stats_type}"))
                })?;
                let p: StatisticsPayload = decode(ty, payload)?;
                let unit = p.unit.or_else(|| kind.default_unit());
                Ok(Self::Statistics {
                    kind,
                    stats: Statistics::new(p.avg, p.min, p.max, unit),
                })
            }
        }
    }

    /// Read a named field for use in threshold comparisons.
    ///
    /// Fields: `value` (scalars), `avg`/`min`/`max` (statistics),
    /// `len` (strings, arrays, images), `mime` (images).
    ///
    /// # Errors
    ///
    /// Returns [`Error::Deserialization`] if the variant has no such field.
    pub fn field(&self, name: &str) -> Result<FieldValue> {
        let found = match (self, name) {
            (Self::Integer { value, unit }, "value") => {
                Some(FieldValue::Quantity(Quantity::new(*value, *unit)))
            }
            (Self::Real { value, unit }, "value") => {
                Some(FieldValue::Quantity(Quantity::new(*value, *unit)))
            }
            (Self::String(s), "value") => Some(FieldValue::Text(s.clone())),
            (Self::String(s), "len") => Some(len_field(s.chars().count())),
            (Self::Array(values), "len") => Some(len_field(values.len())),
            (Self::Image { bytes, .. }, "len") => Some(len_field(bytes.len())),
            (Self::Image { mime, .. }, "mime") => Some(FieldValue::Text(mime.clone())),
            (Self::Statistics { stats, .. }, "avg") => Some(stats.avg_quantity().into()),
            (Self::Statistics { stats, .. }, "min") => Some(stats.min_quantity().into()),
            (Self::Statistics { stats, .. }, "max") => Some(stats.max_quantity().into()),
            (Self::Opaque(map), key) => map.get(key).map(json_field),
            _ => None,
        };
        found.ok_or_else(|| {
            Error::Deserialization(format!(
                "{} evidence has no field '{name}'",
                self.evidence_type()
            ))
        })
    }
}

fn len_field(len: usize) -> FieldValue {
    FieldValue::Quantity(Quantity::unitless(i64::try_from(len).unwrap_or(i64::MAX)))
}

fn json_field(value: &Value) -> FieldValue {
    match value {
        Value::Number(n) => n.as_i64().map_or_else(
            || FieldValue::Quantity(Quantity::unitless(n.as_f64().unwrap_or(f64::NAN))),
            |i| FieldValue::Quantity(Quantity::unitless(i)),
        ),
        Value::String(s) => FieldValue::Text(s.clone()),
        other => FieldValue::Text(other.to_string()),
    }
}

impl fmt::Display for EvidenceValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Integer { value, unit } => write!(f, "{}", Quantity::new(*value, *unit)),
            Self::Real { value, unit } => write!(f, "{}", Quantity::new(*value, *unit)),
            Self::String(s) => f.write_str(s),
            Self::Array(values) => {
                let items: Vec<String> = values.iter().map(ToString::to_string).collect();
                write!(f, "[{}]", items.join(", "))
            }
            Self::Image { bytes, mime } => write!(f, "<{mime} image, {} bytes>", bytes.len()),
            Self::Opaque(map) => write!(f, "{}", Value::Object(map.clone())),
            Self::Statistics { stats, .. } => write!(f, "{stats}"),
            Self::Failure { kind, message, .. } => write!(f, "{kind}: {message}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_type_tags_roundtrip() {
        for ty in EvidenceType::ALL {
            assert_eq!(EvidenceType::from_tag(ty.tag()), Some(ty));
            assert_eq!(EvidenceType::from_name(&ty.qualified_name()), Some(ty));
        }
        assert_eq!(EvidenceType::from_tag("Unknown"), None);
    }

    #[test]
    fn test_statistics_subtypes_satisfy_common() {
        assert!(EvidenceType::MemoryStatistics.satisfies(EvidenceType::CommonStatistics));
        assert!(EvidenceType::CpuStatistics.satisfies(EvidenceType::CpuStatistics));
        assert!(!EvidenceType::CommonStatistics.satisfies(EvidenceType::MemoryStatistics));
        assert!(!EvidenceType::Integer.satisfies(EvidenceType::Real));
    }

    #[test]
    fn test_integer_payload() {
        let v = EvidenceValue::Integer {
            value: 42,
            unit: Some(Unit::Meter),
        };
        assert_eq!(v.to_payload(), json!({"magnitude": 42, "unit": "meter"}));
        let back =
            EvidenceValue::from_payload(EvidenceType::Integer, &v.to_payload()).expect("decode");
        assert_eq!(back, v);
    }

    #[test]
    fn test_integer_payload_rejects_real() {
        let err = EvidenceValue::from_payload(
            EvidenceType::Integer,
            &json!({"magnitude": 1.5, "unit": null}),
        )
        .unwrap_err();
        assert!(matches!(err, Error::Deserialization(_)));
    }

    #[test]
    fn test_image_payload_base64() {
        let v = EvidenceValue::Image {
            bytes: vec![0x89, b'P', b'N', b'G'],
            mime: "image/png".to_string(),
        };
        let payload = v.to_payload();
        assert_eq!(payload["bytes"], "iVBORw==");
        assert_eq!(
            EvidenceValue::from_payload(EvidenceType::Image, &payload).expect("decode"),
            v
        );
        assert!(
            EvidenceValue::from_payload(
                EvidenceType::Image,
                &json!({"bytes": "%%%", "mime": "image/png"})
            )
            .is_err()
        );
    }

    #[test]
    fn test_statistics_payload_default_unit() {
        let v = EvidenceValue::from_payload(
            EvidenceType::GpuMemoryStatistics,
            &json!({"avg": 1.0, "min": 0.5, "max": 2.0}),
        )
        .expect("decode");
        match v {
            EvidenceValue::Statistics { kind, stats } => {
                assert_eq!(kind, StatisticsKind::GpuMemory);
                assert_eq!(stats.unit, Some(Unit::Mebibyte));
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn test_missing_payload_field() {
        let err = EvidenceValue::from_payload(EvidenceType::String, &json!({})).unwrap_err();
        assert!(err.to_string().contains("invalid string payload"));
    }

    #[test]
    fn test_fields() {
        let stats = EvidenceValue::statistics(
            StatisticsKind::Memory,
            Statistics::new(1.0, 0.5, 2.0, Some(Unit::Kilobyte)),
        );
        assert_eq!(
            stats.field("max").expect("max"),
            FieldValue::Quantity(Quantity::new(2.0, Some(Unit::Kilobyte)))
        );
        assert!(stats.field("value").is_err());

        let s = EvidenceValue::String("hello".to_string());
        assert_eq!(s.field("value").expect("value"), FieldValue::from("hello"));
        assert_eq!(
            s.field("len").expect("len"),
            FieldValue::Quantity(Quantity::unitless(5))
        );

        let mut map = Map::new();
        map.insert("accuracy".to_string(), json!(0.93));
        let opaque = EvidenceValue::Opaque(map);
        assert_eq!(
            opaque.field("accuracy").expect("accuracy"),
            FieldValue::Quantity(Quantity::unitless(0.93))
        );
    }

    #[test]
    fn test_display() {
        let v = EvidenceValue::Array(vec![Scalar::Integer(1), Scalar::Text("a".into())]);
        assert_eq!(v.to_string(), "[1, a]");
        let v = EvidenceValue::failure("SamplerError", "no GPU");
        assert_eq!(v.to_string(), "SamplerError: no GPU");
        assert!(v.is_failure());
    }
}
