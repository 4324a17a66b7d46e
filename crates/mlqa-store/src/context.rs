//! Session context
//!
//! Core operations take a [`Context`] and a store explicitly. The process-wide
//! session below exists for convenience layers that want to set both once at
//! program start and read them back anywhere.

use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};
use std::sync::{Arc, PoisonError, RwLock};

use crate::error::{Error, Result};
use crate::store::{ArtifactStore, Scope, open_store};

/// Namespace used when none is configured
pub const DEFAULT_NAMESPACE: &str = "default";

/// Namespace/model/version triple that scopes artifact operations
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Context {
    /// Namespace
    pub namespace: String,
    /// Model identifier
    pub model: String,
    /// Version identifier
    pub version: String,
}

impl Context {
    /// Create a context in the default namespace
    #[must_use]
    pub fn new(model: impl Into<String>, version: impl Into<String>) -> Self {
        Self {
            namespace: DEFAULT_NAMESPACE.to_string(),
            model: model.into(),
            version: version.into(),
        }
    }

    /// Set the namespace
    #[must_use]
    pub fn with_namespace(mut self, namespace: impl Into<String>) -> Self {
        self.namespace = namespace.into();
        self
    }

    /// Store scope for this context
    #[must_use]
    pub fn scope(&self) -> Scope {
        Scope::new(&self.model, &self.version)
    }
}

#[derive(Debug, Default)]
struct SessionState {
    namespace: Option<String>,
    model: Option<String>,
    version: Option<String>,
    store_uri: Option<String>,
    store: Option<Arc<dyn ArtifactStore>>,
}

static SESSION: Lazy<RwLock<SessionState>> = Lazy::new(|| RwLock::new(SessionState::default()));

fn non_empty(value: Option<&String>, field: &str) -> Result<String> {
    match value {
        Some(v) if !v.trim().is_empty() => Ok(v.clone()),
        _ => Err(Error::Config(format!("session {field} is not set"))),
    }
}

/// Set the session model and version
pub fn set_context(model: impl Into<String>, version: impl Into<String>) {
    let mut state = SESSION.write().unwrap_or_else(PoisonError::into_inner);
    state.model = Some(model.into());
    state.version = Some(version.into());
}

/// Set the session namespace
pub fn set_namespace(namespace: impl Into<String>) {
    let mut state = SESSION.write().unwrap_or_else(PoisonError::into_inner);
    state.namespace = Some(namespace.into());
}

/// Open the store at `uri` and make it the session store
///
/// # Errors
///
/// Returns [`Error::Config`] if the URI is malformed, or an IO error if a
/// local root cannot be created.
pub fn set_store(uri: &str) -> Result<()> {
    let store = open_store(uri)?;
    let mut state = SESSION.write().unwrap_or_else(PoisonError::into_inner);
    state.store_uri = Some(uri.to_string());
    state.store = Some(store);
    tracing::info!(%uri, "session store set");
    Ok(())
}

/// Current session context
///
/// # Errors
///
/// Returns [`Error::Config`] if model or version is unset or empty.
pub fn context() -> Result<Context> {
    let state = SESSION.read().unwrap_or_else(PoisonError::into_inner);
    let model = non_empty(state.model.as_ref(), "model")?;
    let version = non_empty(state.version.as_ref(), "version")?;
    let namespace = state
        .namespace
        .clone()
        .filter(|n| !n.trim().is_empty())
        .unwrap_or_else(|| DEFAULT_NAMESPACE.to_string());
    Ok(Context {
        namespace,
        model,
        version,
    })
}

/// Current session store
///
/// # Errors
///
/// Returns [`Error::Config`] if no store has been set.
pub fn session_store() -> Result<Arc<dyn ArtifactStore>> {
    let state = SESSION.read().unwrap_or_else(PoisonError::into_inner);
    state
        .store
        .clone()
        .ok_or_else(|| Error::Config("session store is not set".to_string()))
}

/// URI of the current session store
///
/// # Errors
///
/// Returns [`Error::Config`] if no store has been set.
pub fn store_uri() -> Result<String> {
    let state = SESSION.read().unwrap_or_else(PoisonError::into_inner);
    non_empty(state.store_uri.as_ref(), "store URI")
}

/// Reset the session to its initial, unset state
pub fn clear_session() {
    let mut state = SESSION.write().unwrap_or_else(PoisonError::into_inner);
    *state = SessionState::default();
}

/// Serializes tests that touch the process-wide session.
#[cfg(test)]
pub(crate) static SESSION_TEST_LOCK: std::sync::Mutex<()> = std::sync::Mutex::new(());
