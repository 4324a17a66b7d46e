//! On-disk size of a model file or directory

use serde_json::Value;
use std::path::Path;
use walkdir::WalkDir;

use super::{MEASUREMENT_MODULE, Measurement};
use crate::error::{Error, Result};
use crate::evidence::{EvidenceType, EvidenceValue};
use crate::units::Unit;

/// Measures the size in bytes of a file, or the total of all regular files
/// under a directory. Symlinks are not followed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LocalObjectSize {
    test_case_id: String,
}

impl LocalObjectSize {
    /// Create for a test case
    #[must_use]
    pub fn new(test_case_id: impl Into<String>) -> Self {
        Self {
            test_case_id: test_case_id.into(),
        }
    }

    /// Size of `path` in bytes
    ///
    /// # Errors
    ///
    /// Returns an IO error if the path does not exist or cannot be read.
    pub fn size_of(path: &Path) -> Result<u64> {
        let meta = std::fs::metadata(path)?;
        if meta.is_file() {
            return Ok(meta.len());
        }
        let mut total = 0u64;
        for entry in WalkDir::new(path) {
            let entry = entry.map_err(|e| Error::IoError(e.into()))?;
            if entry.file_type().is_file() {
                total += entry.metadata().map_err(|e| Error::IoError(e.into()))?.len();
            }
        }
        Ok(total)
    }
}

impl Measurement for LocalObjectSize {
    fn test_case_id(&self) -> &str {
        &self.test_case_id
    }

    fn class_name(&self) -> String {
        format!("{MEASUREMENT_MODULE}::LocalObjectSize")
    }

    fn output_type(&self) -> EvidenceType {
        EvidenceType::Integer
    }

    fn measure(&self, args: &[Value]) -> Result<EvidenceValue> {
        let path = args
            .first()
            .and_then(Value::as_str)
            .ok_or_else(|| {
                Error::Measurement("LocalObjectSize expects a path argument".to_string())
            })?;
        let size = Self::size_of(Path::new(path))?;
        let value = i64::try_from(size)
            .map_err(|_| Error::Measurement(format!("size {size} does not fit in an integer")))?;
        tracing::debug!(%path, size, "measured object size");
        Ok(EvidenceValue::Integer {
            value,
            unit: Some(Unit::Byte),
        })
    }
}
