//! YAML session configuration
//!
//! ```yaml
//! namespace: vision
//! model: resnet
//! version: "1.2"
//! store_uri: local://./store
//! ```

use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::context::{Context, DEFAULT_NAMESPACE, set_context, set_namespace, set_store};
use crate::error::{Error, Result};

/// Session settings loaded from a file
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionConfig {
    /// Namespace (defaults to `default`)
    #[serde(default = "default_namespace")]
    pub namespace: String,
    /// Model identifier
    pub model: String,
    /// Version identifier
    pub version: String,
    /// Artifact store URI
    #[serde(default = "default_store_uri")]
    pub store_uri: String,
}

fn default_namespace() -> String {
    DEFAULT_NAMESPACE.to_string()
}

fn default_store_uri() -> String {
    "memory://".to_string()
}

impl SessionConfig {
    /// Parse configuration from YAML
    ///
    /// # Errors
    ///
    /// Returns an error if the YAML is malformed or a required field is empty.
    pub fn from_yaml_str(yaml: &str) -> Result<Self> {
        let config: Self = serde_yaml::from_str(yaml)?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a YAML file
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_yaml_str(&content)
    }

    /// Check that required fields are non-empty
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] naming the first empty field.
    pub fn validate(&self) -> Result<()> {
        for (field, value) in [
            ("model", &self.model),
            ("version", &self.version),
            ("store_uri", &self.store_uri),
        ] {
            if value.trim().is_empty() {
                return Err(Error::Config(format!("{field} must not be empty")));
            }
        }
        Ok(())
    }

    /// Context described by this configuration
    #[must_use]
    pub fn context(&self) -> Context {
        Context::new(&self.model, &self.version).with_namespace(&self.namespace)
    }

    /// Install this configuration as the process-wide session
    ///
    /// # Errors
    ///
    /// Returns an error if the store cannot be opened.
    pub fn apply(&self) -> Result<()> {
        self.validate()?;
        set_store(&self.store_uri)?;
        set_namespace(&self.namespace);
        set_context(&self.model, &self.version);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::{SESSION_TEST_LOCK, clear_session, context, store_uri};

    #[test]
    fn test_parse_with_defaults() {
        let config = SessionConfig::from_yaml_str("model: m\nversion: v\n").expect("parse");
        assert_eq!(config.namespace, "default");
        assert_eq!(config.store_uri, "memory://");
    }

    #[test]
    fn test_parse_rejects_empty_model() {
        let err = SessionConfig::from_yaml_str("model: ''\nversion: v\n").unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }

    #[test]
    fn test_parse_rejects_malformed_yaml() {
        let err = SessionConfig::from_yaml_str("model: [unclosed").unwrap_err();
        assert!(matches!(err, Error::YamlError(_)));
    }

    #[test]
    fn test_from_file_and_apply() {
        let _guard = SESSION_TEST_LOCK
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("session.yaml");
        let store_root = dir.path().join("store");
        std::fs::write(
            &path,
            format!(
                "namespace: vision\nmodel: resnet\nversion: \"1.2\"\nstore_uri: local://{}\n",
                store_root.display()
            ),
        )
        .expect("write config");

        let config = SessionConfig::from_file(&path).expect("load");
        assert_eq!(config.context().namespace, "vision");

        clear_session();
        config.apply().expect("apply");
        let ctx = context().expect("context");
        assert_eq!(ctx.model, "resnet");
        assert_eq!(ctx.version, "1.2");
        assert!(store_uri().expect("uri").starts_with("local://"));
        assert!(store_root.is_dir());
        clear_session();
    }
}
