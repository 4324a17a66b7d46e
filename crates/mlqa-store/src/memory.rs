//! Process-local, ephemeral artifact store

use serde_json::Value;
use std::collections::BTreeMap;
use std::sync::{Mutex, MutexGuard, PoisonError};

use crate::error::{Error, Result};
use crate::kind::ArtifactKind;
use crate::store::{ArtifactStore, Scope, validate_identifier, validate_scope};

type Artifacts = BTreeMap<ArtifactKind, BTreeMap<String, Value>>;
type Versions = BTreeMap<String, Artifacts>;

/// In-memory store backed by nested ordered maps
#[derive(Debug, Default)]
pub struct MemoryStore {
    models: Mutex<BTreeMap<String, Versions>>,
}

impl MemoryStore {
    /// Create an empty store
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, BTreeMap<String, Versions>> {
        self.models.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl ArtifactStore for MemoryStore {
    fn create_model(&self, model: &str) -> Result<()> {
        validate_identifier(model)?;
        self.lock().entry(model.to_string()).or_default();
        Ok(())
    }

    fn create_version(&self, model: &str, version: &str) -> Result<()> {
        validate_identifier(model)?;
        validate_identifier(version)?;
        self.lock()
            .entry(model.to_string())
            .or_default()
            .entry(version.to_string())
            .or_default();
        Ok(())
    }

    fn list_models(&self) -> Result<Vec<String>> {
        Ok(self.lock().keys().cloned().collect())
    }

    fn list_versions(&self, model: &str) -> Result<Vec<String>> {
        self.lock()
            .get(model)
            .map(|versions| versions.keys().cloned().collect())
            .ok_or_else(|| Error::not_found("model", model))
    }

    fn write(
        &self,
        scope: &Scope,
        kind: ArtifactKind,
        identifier: &str,
        model: &Value,
    ) -> Result<Value> {
        validate_scope(scope)?;
        validate_identifier(identifier)?;
        self.lock()
            .entry(scope.model.clone())
            .or_default()
            .entry(scope.version.clone())
            .or_default()
            .entry(kind)
            .or_default()
            .insert(identifier.to_string(), model.clone());
        Ok(model.clone())
    }

    fn read(&self, scope: &Scope, kind: ArtifactKind, identifier: &str) -> Result<Value> {
        self.lock()
            .get(&scope.model)
            .and_then(|versions| versions.get(&scope.version))
            .and_then(|artifacts| artifacts.get(&kind))
            .and_then(|items| items.get(identifier))
            .cloned()
            .ok_or_else(|| Error::not_found(kind.as_str(), identifier))
    }

    fn list(&self, scope: &Scope, kind: ArtifactKind) -> Result<Vec<String>> {
        Ok(self
            .lock()
            .get(&scope.model)
            .and_then(|versions| versions.get(&scope.version))
            .and_then(|artifacts| artifacts.get(&kind))
            .map(|items| items.keys().cloned().collect())
            .unwrap_or_default())
    }

    fn delete(&self, scope: &Scope, kind: ArtifactKind, identifier: &str) -> Result<()> {
        self.lock()
            .get_mut(&scope.model)
            .and_then(|versions| versions.get_mut(&scope.version))
            .and_then(|artifacts| artifacts.get_mut(&kind))
            .and_then(|items| items.remove(identifier))
            .map(|_| ())
            .ok_or_else(|| Error::not_found(kind.as_str(), identifier))
    }
}
