//! Persistable artifacts
//!
//! Core operations take the context and store explicitly (`*_with`). The
//! `save`/`load` shorthands read both from the process-wide session.

use mlqa_store::{ArtifactKind, ArtifactStore, Context};
use serde_json::Value;

use crate::error::Result;

/// Something with a canonical JSON form that lives in an artifact store
pub trait Artifact: Sized {
    /// Store kind
    const KIND: ArtifactKind;

    /// Store identifier
    fn identifier(&self) -> String;

    /// Canonical JSON representation
    ///
    /// # Errors
    ///
    /// Returns an error if the artifact is not in a persistable state.
    fn to_model(&self) -> Result<Value>;

    /// Rebuild from canonical JSON
    ///
    /// # Errors
    ///
    /// Returns a deserialization error for missing or mistyped fields.
    fn from_model(model: &Value) -> Result<Self>;

    /// Checks run before every write
    ///
    /// # Errors
    ///
    /// Returns an error to abort the write.
    fn pre_save_hook(&self, _context: &Context, _store: &dyn ArtifactStore) -> Result<()> {
        Ok(())
    }

    /// Write under `(context.model, context.version, KIND, identifier)`
    ///
    /// # Errors
    ///
    /// Returns an error if the pre-save hook, serialization or the store fails.
    fn save_with(&self, context: &Context, store: &dyn ArtifactStore) -> Result<Value> {
        self.pre_save_hook(context, store)?;
        let model = self.to_model()?;
        let persisted = store.write(&context.scope(), Self::KIND, &self.identifier(), &model)?;
        tracing::debug!(
            kind = %Self::KIND,
            identifier = %self.identifier(),
            scope = %context.scope(),
            "saved artifact"
        );
        Ok(persisted)
    }

    /// Read one artifact
    ///
    /// # Errors
    ///
    /// Returns a not-found error if the key is absent, or a deserialization
    /// error if the stored model is invalid.
    fn load_with(identifier: &str, context: &Context, store: &dyn ArtifactStore) -> Result<Self> {
        let model = store.read(&context.scope(), Self::KIND, identifier)?;
        Self::from_model(&model)
    }

    /// Read every artifact of this kind in the context's scope
    ///
    /// # Errors
    ///
    /// Returns the first store or deserialization error.
    fn load_all_with(context: &Context, store: &dyn ArtifactStore) -> Result<Vec<Self>> {
        store
            .list(&context.scope(), Self::KIND)?
            .iter()
            .map(|id| Self::load_with(id, context, store))
            .collect()
    }

    /// Save using the session context and store
    ///
    /// # Errors
    ///
    /// Returns a config error if the session is incomplete.
    fn save(&self) -> Result<Value> {
        let context = mlqa_store::context()?;
        let store = mlqa_store::session_store()?;
        self.save_with(&context, store.as_ref())
    }

    /// Load using the session context and store
    ///
    /// # Errors
    ///
    /// Returns a config error if the session is incomplete.
    fn load(identifier: &str) -> Result<Self> {
        let context = mlqa_store::context()?;
        let store = mlqa_store::session_store()?;
        Self::load_with(identifier, &context, store.as_ref())
    }
}

/// Read a required string field from a JSON object
pub(crate) fn str_field<'a>(model: &'a Value, field: &str) -> Result<&'a str> {
    model
        .get(field)
        .and_then(Value::as_str)
        .ok_or_else(|| crate::error::Error::missing_field(field))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;
    use mlqa_store::MemoryStore;
    use serde_json::json;

    #[derive(Debug, PartialEq)]
    struct Note {
        id: String,
        text: String,
    }

    impl Artifact for Note {
        const KIND: ArtifactKind = ArtifactKind::Report;

        fn identifier(&self) -> String {
            self.id.clone()
        }

        fn to_model(&self) -> Result<Value> {
            Ok(json!({"identifier": self.id, "text": self.text}))
        }

        fn from_model(model: &Value) -> Result<Self> {
            Ok(Self {
                id: str_field(model, "identifier")?.to_string(),
                text: str_field(model, "text")?.to_string(),
            })
        }

        fn pre_save_hook(&self, _context: &Context, _store: &dyn ArtifactStore) -> Result<()> {
            if self.text.is_empty() {
                return Err(Error::Invariant("empty note".to_string()));
            }
            Ok(())
        }
    }

    #[test]
    fn test_save_load_with() {
        let store = MemoryStore::new();
        let ctx = Context::new("m", "v");
        let note = Note {
            id: "n".to_string(),
            text: "hi".to_string(),
        };
        note.save_with(&ctx, &store).expect("save");
        assert_eq!(Note::load_with("n", &ctx, &store).expect("load"), note);
        assert_eq!(Note::load_all_with(&ctx, &store).expect("all").len(), 1);
    }

    #[test]
    fn test_pre_save_hook_blocks_write() {
        let store = MemoryStore::new();
        let ctx = Context::new("m", "v");
        let note = Note {
            id: "n".to_string(),
            text: String::new(),
        };
        assert!(note.save_with(&ctx, &store).is_err());
        assert!(store.list(&ctx.scope(), ArtifactKind::Report).expect("list").is_empty());
    }

    #[test]
    fn test_from_model_missing_field() {
        let err = Note::from_model(&json!({"identifier": "n"})).unwrap_err();
        assert!(matches!(err, Error::Deserialization(_)));
    }
}
