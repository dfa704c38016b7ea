use crate::artifacts::ArtifactKind;
use crate::error::ModelResult;
use std::path::{Path, PathBuf};

/// Filesystem layout for persisted models.
///
/// Every artifact kind lives at a fixed file name directly under `root`;
/// retraining overwrites in place, there is no rotation.
#[derive(Debug, Clone)]
pub struct ModelLayout {
    root: PathBuf,
}

impl ModelLayout {
    #[must_use]
    pub fn new(root: PathBuf) -> Self {
        Self { root }
    }

    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    #[must_use]
    pub fn artifact_path(&self, kind: ArtifactKind) -> PathBuf {
        self.root.join(kind.file_name())
    }

    pub fn ensure_root(&self) -> ModelResult<()> {
        std::fs::create_dir_all(&self.root)?;
        Ok(())
    }
}
