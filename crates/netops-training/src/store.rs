//! Storage backends for persisted model artifacts.

use crate::artifacts::ArtifactKind;
use crate::error::ModelResult;
use crate::layout::ModelLayout;
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::collections::HashMap;
use std::io::Write;
use std::sync::{Mutex, PoisonError};
use tracing::debug;

/// Keyed artifact storage. One payload per [`ArtifactKind`]; saving
/// replaces the previous payload.
pub trait ModelStore: Send + Sync {
    fn save(&self, kind: ArtifactKind, payload: &[u8]) -> ModelResult<()>;

    /// Returns `None` when nothing has been saved for `kind` yet.
    fn load(&self, kind: ArtifactKind) -> ModelResult<Option<Vec<u8>>>;
}

/// Serializes `value` as JSON and saves it, returning the bytes written.
pub fn save_artifact<T: Serialize>(store: &dyn ModelStore, kind: ArtifactKind, value: &T) -> ModelResult<Vec<u8>> {
    let payload = serde_json::to_vec(value)?;
    store.save(kind, &payload)?;
    Ok(payload)
}

/// Loads and deserializes an artifact. A fresh value is built on every call.
pub fn load_artifact<T: DeserializeOwned>(store: &dyn ModelStore, kind: ArtifactKind) -> ModelResult<Option<T>> {
    match store.load(kind)? {
        Some(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
        None => Ok(None),
    }
}

/// Files at fixed paths under a model directory.
///
/// Writes go to a temporary file in the same directory that is then renamed
/// over the target, so a reader sees either the old or the new artifact.
#[derive(Debug, Clone)]
pub struct FsModelStore {
    layout: ModelLayout,
}

impl FsModelStore {
    #[must_use]
    pub fn new(layout: ModelLayout) -> Self {
        Self { layout }
    }

    #[must_use]
    pub fn layout(&self) -> &ModelLayout {
        &self.layout
    }
}

impl ModelStore for FsModelStore {
    fn save(&self, kind: ArtifactKind, payload: &[u8]) -> ModelResult<()> {
        self.layout.ensure_root()?;
        let path = self.layout.artifact_path(kind);
        let mut tmp = tempfile::NamedTempFile::new_in(self.layout.root())?;
        tmp.write_all(payload)?;
        tmp.as_file().sync_all()?;
        tmp.persist(&path).map_err(|e| e.error)?;
        debug!(kind = %kind, path = %path.display(), bytes = payload.len(), "Saved artifact");
        Ok(())
    }

    fn load(&self, kind: ArtifactKind) -> ModelResult<Option<Vec<u8>>> {
        let path = self.layout.artifact_path(kind);
        match std::fs::read(&path) {
            Ok(bytes) => Ok(Some(bytes)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }
}

/// Process-local store for tests; counts saves per kind.
#[derive(Debug, Default)]
pub struct InMemoryModelStore {
    artifacts: Mutex<HashMap<ArtifactKind, Vec<u8>>>,
    saves: Mutex<HashMap<ArtifactKind, usize>>,
}

impl InMemoryModelStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of times `kind` has been saved.
    pub fn save_count(&self, kind: ArtifactKind) -> usize {
        self.saves.lock().unwrap_or_else(PoisonError::into_inner).get(&kind).copied().unwrap_or(0)
    }

    pub fn remove(&self, kind: ArtifactKind) {
        self.artifacts.lock().unwrap_or_else(PoisonError::into_inner).remove(&kind);
    }
}

impl ModelStore for InMemoryModelStore {
    fn save(&self, kind: ArtifactKind, payload: &[u8]) -> ModelResult<()> {
        self.artifacts.lock().unwrap_or_else(PoisonError::into_inner).insert(kind, payload.to_vec());
        *self.saves.lock().unwrap_or_else(PoisonError::into_inner).entry(kind).or_insert(0) += 1;
        Ok(())
    }

    fn load(&self, kind: ArtifactKind) -> ModelResult<Option<Vec<u8>>> {
        Ok(self.artifacts.lock().unwrap_or_else(PoisonError::into_inner).get(&kind).cloned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_fs_store_missing_is_none() {
        let temp = TempDir::new().unwrap();
        let store = FsModelStore::new(ModelLayout::new(temp.path().to_path_buf()));
        assert!(store.load(ArtifactKind::AnomalyModel).unwrap().is_none());
        assert!(store.load(ArtifactKind::Classifier).unwrap().is_none());
    }

    #[test]
    fn test_fs_store_overwrites_in_place() {
        let temp = TempDir::new().unwrap();
        let store = FsModelStore::new(ModelLayout::new(temp.path().join("models")));
        store.save(ArtifactKind::Regressor, b"first").unwrap();
        store.save(ArtifactKind::Regressor, b"second").unwrap();
        assert_eq!(store.load(ArtifactKind::Regressor).unwrap().unwrap(), b"second");

        // Only the artifact itself remains; no temp files or backups.
        let entries = std::fs::read_dir(temp.path().join("models")).unwrap().count();
        assert_eq!(entries, 1);
    }

    #[test]
    fn test_in_memory_store_counts_saves() {
        let store = InMemoryModelStore::new();
        save_artifact(&store, ArtifactKind::LabelEncoder, &vec![1, 2, 3]).unwrap();
        save_artifact(&store, ArtifactKind::LabelEncoder, &vec![4]).unwrap();
        assert_eq!(store.save_count(ArtifactKind::LabelEncoder), 2);
        assert_eq!(store.save_count(ArtifactKind::Classifier), 0);

        let loaded: Option<Vec<i32>> = load_artifact(&store, ArtifactKind::LabelEncoder).unwrap();
        assert_eq!(loaded, Some(vec![4]));

        store.remove(ArtifactKind::LabelEncoder);
        let loaded: Option<Vec<i32>> = load_artifact(&store, ArtifactKind::LabelEncoder).unwrap();
        assert_eq!(loaded, None);
    }
}
