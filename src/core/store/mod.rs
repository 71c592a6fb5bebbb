//! Storage seams for the build pipeline.
//!
//! The orchestrator only talks to these traits. [`BuildDatabase`] backs the
//! document-style stores with SQLite and [`LocalArtifactStore`] keeps built
//! firmware on the local filesystem.

mod artifact;
mod sqlite;

pub use artifact::LocalArtifactStore;
pub use sqlite::BuildDatabase;

use std::path::Path;

use async_trait::async_trait;

use crate::core::error::BuildError;
use crate::core::task::{
    BuildRecord, BuildTarget, FileKind, SourceFile, Task, TaskStatus, TaskUpdate,
};

#[async_trait]
pub trait TaskStore: Send + Sync {
    async fn fetch_task(&self, task_id: &str) -> Result<Option<Task>, BuildError>;

    /// Apply `update` if the stored status may move to `update.status`.
    /// Refreshes the update timestamp.
    async fn update_task(&self, task_id: &str, update: &TaskUpdate) -> Result<(), BuildError>;

    /// Apply `update` only while the stored status is still `expected`, in a
    /// single compare-and-set. Returns `false`, writing nothing, when the
    /// task has already moved on.
    async fn transition_task(
        &self,
        task_id: &str,
        expected: TaskStatus,
        update: &TaskUpdate,
    ) -> Result<bool, BuildError>;
}

#[async_trait]
pub trait RecordStore: Send + Sync {
    async fn fetch_firmware(&self, firmware_id: &str) -> Result<Option<BuildRecord>, BuildError>;

    async fn fetch_project(&self, project_id: &str) -> Result<Option<BuildRecord>, BuildError>;

    /// Source files of one kind attached to `target`, in insertion order.
    async fn fetch_files(
        &self,
        target: &BuildTarget,
        kind: FileKind,
    ) -> Result<Vec<SourceFile>, BuildError>;
}

#[async_trait]
pub trait QuotaStore: Send + Sync {
    /// Builds the user may still run. Users without a quota row have none.
    async fn remaining_builds(&self, uid: &str) -> Result<i64, BuildError>;

    /// Atomically take one build from the user's quota. Returns `false`, and
    /// leaves the count untouched, when nothing is left.
    async fn decrement_if_positive(&self, uid: &str) -> Result<bool, BuildError>;
}

#[async_trait]
pub trait ArtifactStore: Send + Sync {
    /// Store the file at `local_path` for `uid` under `file_name` and return
    /// the reference recorded on the task.
    async fn upload(&self, uid: &str, file_name: &str, local_path: &Path)
    -> Result<String, BuildError>;
}
