use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tracing::info;

use super::ArtifactStore;
use crate::core::error::BuildError;
use crate::core::workspace::validate_name;

/// Keeps built firmware under `<root>/firmware/<uid>/built/`.
pub struct LocalArtifactStore {
    root: PathBuf,
}

impl LocalArtifactStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }
}

#[async_trait]
impl ArtifactStore for LocalArtifactStore {
    async fn upload(
        &self,
        uid: &str,
        file_name: &str,
        local_path: &Path,
    ) -> Result<String, BuildError> {
        validate_name(uid, "user ID").map_err(|e| BuildError::Upload(e.to_string()))?;
        validate_name(file_name, "firmware file name")
            .map_err(|e| BuildError::Upload(e.to_string()))?;

        let reference = format!("firmware/{}/built/{}", uid, file_name);
        let target = self.root.join(&reference);
        if let Some(parent) = target.parent() {
            tokio::fs::create_dir_all(parent).await.map_err(|e| {
                BuildError::Upload(format!("creating {}: {}", parent.display(), e))
            })?;
        }

        info!(
            "Uploading the firmware file {} to {}",
            local_path.display(),
            target.display()
        );
        tokio::fs::copy(local_path, &target).await.map_err(|e| {
            BuildError::Upload(format!("copying {}: {}", local_path.display(), e))
        })?;
        Ok(reference)
    }
}
