//! Measurements whose value is computed by user code

use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;
use std::path::Path;
use std::sync::Arc;

use super::{MEASUREMENT_MODULE, Measurement};
use crate::error::{Error, Result};
use crate::evidence::{EvidenceType, EvidenceValue, Scalar};

/// User function invoked by an [`ExternalMeasurement`]
pub type ExternalFn = Arc<dyn Fn(&[Value]) -> Result<Value> + Send + Sync>;

/// Wraps the output of an arbitrary function (or the raw arguments) into
/// evidence of a declared type
#[derive(Clone)]
pub struct ExternalMeasurement {
    test_case_id: String,
    output_type: EvidenceType,
    function: Option<(String, ExternalFn)>,
}

impl fmt::Debug for ExternalMeasurement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExternalMeasurement")
            .field("test_case_id", &self.test_case_id)
            .field("output_type", &self.output_type)
            .field("function", &self.function.as_ref().map(|(name, _)| name))
            .finish()
    }
}

impl ExternalMeasurement {
    /// Measurement that wraps its arguments as `output_type`
    #[must_use]
    pub fn new(test_case_id: impl Into<String>, output_type: EvidenceType) -> Self {
        Self {
            test_case_id: test_case_id.into(),
            output_type,
            function: None,
        }
    }

    /// Compute the value with `function`; `name` is recorded as provenance
    #[must_use]
    pub fn with_function<F>(mut self, name: impl Into<String>, function: F) -> Self
    where
        F: Fn(&[Value]) -> Result<Value> + Send + Sync + 'static,
    {
        self.function = Some((name.into(), Arc::new(function)));
        self
    }

    /// Name of the wrapped function
    #[must_use]
    pub fn function_name(&self) -> Option<&str> {
        self.function.as_ref().map(|(name, _)| name.as_str())
    }
}

impl Measurement for ExternalMeasurement {
    fn test_case_id(&self) -> &str {
        &self.test_case_id
    }

    fn class_name(&self) -> String {
        format!("{MEASUREMENT_MODULE}::ExternalMeasurement")
    }

    fn output_type(&self) -> EvidenceType {
        self.output_type
    }

    fn additional_data(&self) -> BTreeMap<String, String> {
        self.function_name()
            .map(|name| BTreeMap::from([("function".to_string(), name.to_string())]))
            .unwrap_or_default()
    }

    fn measure(&self, args: &[Value]) -> Result<EvidenceValue> {
        let raw = match &self.function {
            Some((_, f)) => f(args)?,
            None if args.len() == 1 => args[0].clone(),
            None => Value::Array(args.to_vec()),
        };
        wrap_output(self.output_type, &raw)
    }
}

fn mime_for(path: &Path) -> &'static str {
    match path
        .extension()
        .and_then(|e| e.to_str())
        .map(str::to_ascii_lowercase)
        .as_deref()
    {
        Some("png") => "image/png",
        Some("jpg" | "jpeg") => "image/jpeg",
        Some("gif") => "image/gif",
        Some("svg") => "image/svg+xml",
        _ => "application/octet-stream",
    }
}

/// Convert a JSON value into evidence of type `ty`.
///
/// Scalars accept bare JSON values or a `{"magnitude", "unit"}` object;
/// images accept a file path; statistics and other structured types accept
/// their canonical payload.
///
/// # Errors
///
/// Returns [`Error::Measurement`] if the value cannot represent `ty`.
pub fn wrap_output(ty: EvidenceType, raw: &Value) -> Result<EvidenceValue> {
    let mismatch = || Error::Measurement(format!("cannot wrap {raw} as {ty}"));
    match (ty, raw) {
        (EvidenceType::Failure, _) => Err(mismatch()),
        (_, Value::Object(_)) if ty != EvidenceType::Opaque => {
            EvidenceValue::from_payload(ty, raw).map_err(|_| mismatch())
        }
        (EvidenceType::Integer, _) => raw.as_i64().map(EvidenceValue::integer).ok_or_else(mismatch),
        (EvidenceType::Real, _) => raw.as_f64().map(EvidenceValue::real).ok_or_else(mismatch),
        (EvidenceType::String, Value::String(s)) => Ok(EvidenceValue::String(s.clone())),
        (EvidenceType::Array, Value::Array(items)) => {
            let values: Vec<Scalar> =
                serde_json::from_value(Value::Array(items.clone())).map_err(|_| mismatch())?;
            Ok(EvidenceValue::Array(values))
        }
        (EvidenceType::Image, Value::String(path)) => {
            let path = Path::new(path);
            let bytes = std::fs::read(path)?;
            Ok(EvidenceValue::Image {
                bytes,
                mime: mime_for(path).to_string(),
            })
        }
        (EvidenceType::Opaque, Value::Object(map)) => Ok(EvidenceValue::Opaque(map.clone())),
        _ => Err(mismatch()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::units::Unit;
    use serde_json::json;

    #[test]
    fn test_wraps_args_without_function() {
        let m = ExternalMeasurement::new("acc", EvidenceType::Real);
        let e = m.evaluate(&[json!(0.93)]).expect("evaluate");
        assert_eq!(e.value(), &EvidenceValue::real(0.93));
        assert!(e.metadata().expect("md").additional_data.is_empty());
    }

    #[test]
    fn test_function_recorded() {
        let m = ExternalMeasurement::new("count", EvidenceType::Integer)
            .with_function("count_rows", |args: &[Value]| Ok(json!(args.len() * 10)));
        let e = m.evaluate(&[json!("a"), json!("b")]).expect("evaluate");
        assert_eq!(e.value(), &EvidenceValue::integer(20));
        assert_eq!(
            e.metadata().expect("md").additional_data.get("function"),
            Some(&"count_rows".to_string())
        );
    }

    #[test]
    fn test_function_error_propagates() {
        let m = ExternalMeasurement::new("x", EvidenceType::Integer)
            .with_function("boom", |_: &[Value]| Err(Error::Measurement("boom".into())));
        assert!(m.evaluate(&[]).is_err());
    }

    #[test]
    fn test_wrap_structured_and_mismatch() {
        let v = wrap_output(EvidenceType::Integer, &json!({"magnitude": 5, "unit": "byte"}))
            .expect("wrap");
        assert_eq!(
            v,
            EvidenceValue::Integer {
                value: 5,
                unit: Some(Unit::Byte)
            }
        );
        let v = wrap_output(EvidenceType::Array, &json!([1, 2.5, "x", true])).expect("wrap");
        assert_eq!(v.to_string(), "[1, 2.5, x, true]");
        assert!(wrap_output(EvidenceType::Integer, &json!("seven")).is_err());
        assert!(wrap_output(EvidenceType::Failure, &json!(1)).is_err());
    }

    #[test]
    fn test_wrap_image_from_path() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("plot.PNG");
        std::fs::write(&path, [1u8, 2, 3]).expect("write");
        let v = wrap_output(EvidenceType::Image, &json!(path.to_string_lossy())).expect("wrap");
        assert_eq!(
            v,
            EvidenceValue::Image {
                bytes: vec![1, 2, 3],
                mime: "image/png".to_string()
            }
        );
    }
}
