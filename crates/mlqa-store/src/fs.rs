//! Filesystem artifact store
//!
//! Layout: `root/<model>/<version>/<kind>/<identifier>.json`. Each write goes
//! to a temporary file in the target directory and is renamed into place.

use serde_json::Value;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use crate::error::{Error, Result};
use crate::kind::ArtifactKind;
use crate::store::{ArtifactStore, Scope, validate_identifier, validate_scope};

const EXTENSION: &str = "json";

/// Store that persists one JSON file per artifact
#[derive(Debug, Clone)]
pub struct LocalStore {
    root: PathBuf,
}

impl LocalStore {
    /// Open (and create if missing) a store rooted at `root`
    ///
    /// # Errors
    ///
    /// Returns an IO error if the root directory cannot be created.
    pub fn open(root: impl Into<PathBuf>) -> Result<Self> {
        let root = root.into();
        fs::create_dir_all(&root)?;
        Ok(Self { root })
    }

    /// Root directory of this store
    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    fn kind_dir(&self, scope: &Scope, kind: ArtifactKind) -> PathBuf {
        self.root
            .join(&scope.model)
            .join(&scope.version)
            .join(kind.as_str())
    }

    fn artifact_path(&self, scope: &Scope, kind: ArtifactKind, identifier: &str) -> PathBuf {
        self.kind_dir(scope, kind)
            .join(format!("{identifier}.{EXTENSION}"))
    }

    fn artifact_location(
        &self,
        scope: &Scope,
        kind: ArtifactKind,
        identifier: &str,
    ) -> Result<PathBuf> {
        validate_scope(scope)?;
        validate_identifier(identifier)?;
        Ok(self.artifact_path(scope, kind, identifier))
    }
}

fn sorted_subdirs(dir: &Path) -> Result<Vec<String>> {
    let mut names = Vec::new();
    for entry in fs::read_dir(dir)? {
        let entry = entry?;
        if entry.file_type()?.is_dir() {
            names.push(entry.file_name().to_string_lossy().into_owned());
        }
    }
    names.sort();
    Ok(names)
}

impl ArtifactStore for LocalStore {
    fn create_model(&self, model: &str) -> Result<()> {
        validate_identifier(model)?;
        fs::create_dir_all(self.root.join(model))?;
        Ok(())
    }

    fn create_version(&self, model: &str, version: &str) -> Result<()> {
        validate_identifier(model)?;
        validate_identifier(version)?;
        fs::create_dir_all(self.root.join(model).join(version))?;
        Ok(())
    }

    fn list_models(&self) -> Result<Vec<String>> {
        sorted_subdirs(&self.root)
    }

    fn list_versions(&self, model: &str) -> Result<Vec<String>> {
        validate_identifier(model)?;
        let dir = self.root.join(model);
        if !dir.is_dir() {
            return Err(Error::not_found("model", model));
        }
        sorted_subdirs(&dir)
    }

    fn write(
        &self,
        scope: &Scope,
        kind: ArtifactKind,
        identifier: &str,
        model: &Value,
    ) -> Result<Value> {
        let path = self.artifact_location(scope, kind, identifier)?;
        let dir = self.kind_dir(scope, kind);
        fs::create_dir_all(&dir)?;

        let mut tmp = tempfile::NamedTempFile::new_in(&dir)?;
        serde_json::to_writer_pretty(&mut tmp, model)?;
        tmp.write_all(b"\n")?;
        tmp.as_file().sync_all()?;
        tmp.persist(&path).map_err(|e| Error::IoError(e.error))?;

        tracing::debug!(path = %path.display(), "wrote artifact");
        Ok(model.clone())
    }

    fn read(&self, scope: &Scope, kind: ArtifactKind, identifier: &str) -> Result<Value> {
        let path = self.artifact_location(scope, kind, identifier)?;
        if !path.is_file() {
            return Err(Error::not_found(kind.as_str(), identifier));
        }
        let content = fs::read_to_string(&path)?;
        Ok(serde_json::from_str(&content)?)
    }

    fn list(&self, scope: &Scope, kind: ArtifactKind) -> Result<Vec<String>> {
        validate_scope(scope)?;
        let dir = self.kind_dir(scope, kind);
        if !dir.is_dir() {
            return Ok(Vec::new());
        }
        let mut ids = Vec::new();
        for entry in fs::read_dir(&dir)? {
            let path = entry?.path();
            if path.extension().and_then(|e| e.to_str()) != Some(EXTENSION) {
                continue;
            }
            if let Some(stem) = path.file_stem().and_then(|s| s.to_str()) {
                ids.push(stem.to_string());
            }
        }
        ids.sort();
        Ok(ids)
    }

    fn delete(&self, scope: &Scope, kind: ArtifactKind, identifier: &str) -> Result<()> {
        let path = self.artifact_location(scope, kind, identifier)?;
        if !path.is_file() {
            return Err(Error::not_found(kind.as_str(), identifier));
        }
        fs::remove_file(&path)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn setup() -> (tempfile::TempDir, LocalStore) {
        let dir = tempfile::tempdir().expect("tempdir");
        let store = LocalStore::open(dir.path()).expect("open");
        (dir, store)
    }

    #[test]
    fn test_layout_on_disk() {
        let (dir, store) = setup();
        let scope = Scope::new("m", "v");
        store
            .write(&scope, ArtifactKind::Evidence, "t.evidence", &json!({"a": 1}))
            .expect("write");
        let expected = dir
            .path()
            .join("m")
            .join("v")
            .join("evidence")
            .join("t.evidence.json");
        assert!(expected.is_file());
    }

    #[test]
    fn test_roundtrip_and_replace() {
        let (_dir, store) = setup();
        let scope = Scope::new("m", "v");
        let doc = json!({"type": "integer", "payload": {"magnitude": 42, "unit": "meter"}});
        store
            .write(&scope, ArtifactKind::Evidence, "t.evidence", &doc)
            .expect("write");
        assert_eq!(
            store
                .read(&scope, ArtifactKind::Evidence, "t.evidence")
                .expect("read"),
            doc
        );
        store
            .write(&scope, ArtifactKind::Evidence, "t.evidence", &json!({}))
            .expect("replace");
        assert_eq!(
            store
                .read(&scope, ArtifactKind::Evidence, "t.evidence")
                .expect("read"),
            json!({})
        );
        assert_eq!(
            store.list(&scope, ArtifactKind::Evidence).expect("list"),
            vec!["t.evidence"]
        );
    }

    #[test]
    fn test_list_ignores_non_json() {
        let (dir, store) = setup();
        let scope = Scope::new("m", "v");
        store
            .write(&scope, ArtifactKind::TestSuite, "suite", &json!({}))
            .expect("write");
        fs::write(
            dir.path().join("m/v/test_suite/notes.txt"),
            "not an artifact",
        )
        .expect("write stray file");
        assert_eq!(
            store.list(&scope, ArtifactKind::TestSuite).expect("list"),
            vec!["suite"]
        );
    }

    #[test]
    fn test_delete_missing_is_not_found() {
        let (_dir, store) = setup();
        let err = store
            .delete(&Scope::new("m", "v"), ArtifactKind::Report, "nope")
            .unwrap_err();
        assert!(err.is_not_found());
    }

    #[test]
    fn test_models_and_versions() {
        let (_dir, store) = setup();
        store.create_version("b", "2").expect("create");
        store.create_version("a", "1").expect("create");
        store.create_model("a").expect("idempotent");
        assert_eq!(store.list_models().expect("models"), vec!["a", "b"]);
        assert_eq!(store.list_versions("b").expect("versions"), vec!["2"]);
        assert!(store.list_versions("c").unwrap_err().is_not_found());
    }

    #[test]
    fn test_read_corrupt_file() {
        let (dir, store) = setup();
        let scope = Scope::new("m", "v");
        let kind_dir = dir.path().join("m/v/report");
        fs::create_dir_all(&kind_dir).expect("mkdir");
        fs::write(kind_dir.join("r.json"), "{not json").expect("write");
        let err = store.read(&scope, ArtifactKind::Report, "r").unwrap_err();
        assert!(matches!(err, Error::SerializationError(_)));
    }
}
