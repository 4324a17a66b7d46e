//! Artifact store contract
//!
//! Every back-end maps `(model, version, kind, identifier)` to one canonical
//! JSON document. Writes to an existing key replace it.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::sync::Arc;

use crate::error::{Error, Result};
use crate::fs::LocalStore;
use crate::http::HttpStore;
use crate::kind::ArtifactKind;
use crate::memory::MemoryStore;
use crate::uri::StoreUri;

/// Model/version pair that scopes every artifact operation
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Scope {
    /// Model identifier
    pub model: String,
    /// Version identifier
    pub version: String,
}

impl Scope {
    /// Create a new scope
    #[must_use]
    pub fn new(model: impl Into<String>, version: impl Into<String>) -> Self {
        Self {
            model: model.into(),
            version: version.into(),
        }
    }
}

impl fmt::Display for Scope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.model, self.version)
    }
}

/// Uniform CRUD over persisted artifacts
///
/// Implementations are shared across threads behind an `Arc`; each call is
/// internally synchronized.
pub trait ArtifactStore: Send + Sync + fmt::Debug {
    /// Register a model. Idempotent for local back-ends.
    ///
    /// # Errors
    ///
    /// Returns an error if the identifier is invalid or persistence fails.
    fn create_model(&self, model: &str) -> Result<()>;

    /// Register a version under an existing (or implicitly created) model.
    ///
    /// # Errors
    ///
    /// Returns an error if an identifier is invalid or persistence fails.
    fn create_version(&self, model: &str, version: &str) -> Result<()>;

    /// List registered models in lexicographic order.
    ///
    /// # Errors
    ///
    /// Returns an error if the back-end cannot be read.
    fn list_models(&self) -> Result<Vec<String>>;

    /// List versions of a model in lexicographic order.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NotFound`] if the model does not exist.
    fn list_versions(&self, model: &str) -> Result<Vec<String>>;

    /// Insert or replace an artifact, creating its model and version if
    /// needed. Returns the persisted canonical form.
    ///
    /// # Errors
    ///
    /// Returns an error if the identifier is invalid or persistence fails.
    fn write(
        &self,
        scope: &Scope,
        kind: ArtifactKind,
        identifier: &str,
        model: &Value,
    ) -> Result<Value>;

    /// Read an artifact.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NotFound`] if no artifact is stored under the key.
    fn read(&self, scope: &Scope, kind: ArtifactKind, identifier: &str) -> Result<Value>;

    /// List artifact identifiers of one kind in lexicographic order.
    ///
    /// An unknown scope yields an empty list.
    ///
    /// # Errors
    ///
    /// Returns an error if the back-end cannot be read.
    fn list(&self, scope: &Scope, kind: ArtifactKind) -> Result<Vec<String>>;

    /// Delete an artifact.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NotFound`] if no artifact is stored under the key.
    fn delete(&self, scope: &Scope, kind: ArtifactKind, identifier: &str) -> Result<()>;
}

/// Open a store for the given URI.
///
/// # Errors
///
/// Returns [`Error::Config`] for malformed URIs, or an IO error if a local
/// root cannot be created.
pub fn open_store(uri: &str) -> Result<Arc<dyn ArtifactStore>> {
    let store: Arc<dyn ArtifactStore> = match StoreUri::parse(uri)? {
        StoreUri::Memory => Arc::new(MemoryStore::new()),
        StoreUri::Local(root) => Arc::new(LocalStore::open(root)?),
        StoreUri::Http(base) => Arc::new(HttpStore::new(base)),
    };
    tracing::debug!(%uri, "opened artifact store");
    Ok(store)
}

/// Reject identifiers that cannot be used as a single path segment.
///
/// # Errors
///
/// Returns [`Error::InvalidIdentifier`] for empty identifiers or ones that
/// contain path separators or parent references.
pub fn validate_identifier(identifier: &str) -> Result<()> {
    let bad = identifier.trim().is_empty()
        || identifier.contains('/')
        || identifier.contains('\\')
        || identifier == "."
        || identifier == "..";
    if bad {
        return Err(Error::InvalidIdentifier(identifier.to_string()));
    }
    Ok(())
}

pub(crate) fn validate_scope(scope: &Scope) -> Result<()> {
    validate_identifier(&scope.model)?;
    validate_identifier(&scope.version)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_identifier() {
        assert!(validate_identifier("t.evidence").is_ok());
        assert!(validate_identifier("default.test_suite").is_ok());
        assert!(validate_identifier("").is_err());
        assert!(validate_identifier("a/b").is_err());
        assert!(validate_identifier("a\\b").is_err());
        assert!(validate_identifier("..").is_err());
        assert!(validate_identifier("v1..2").is_ok());
        assert!(validate_identifier("..hidden").is_ok());
        assert!(validate_identifier(".").is_err());
    }

    #[test]
    fn test_scope_display() {
        assert_eq!(Scope::new("m", "v").to_string(), "m/v");
    }

    #[test]
    fn test_open_store_memory() {
        let store = open_store("memory://").expect("open");
        assert!(store.list_models().expect("list").is_empty());
    }

    #[test]
    fn test_open_store_local_creates_root() {
        let dir = tempfile::tempdir().expect("tempdir");
        let root = dir.path().join("nested").join("store");
        let store = open_store(&format!("local://{}", root.display())).expect("open");
        assert!(root.is_dir());
        assert!(store.list_models().expect("list").is_empty());
    }

    #[test]
    fn test_open_store_bad_uri() {
        let err = open_store("s3://bucket").unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }
}
