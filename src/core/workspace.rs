//! Build workspaces inside a QMK firmware checkout.
//!
//! A workspace is `<qmk base>/<version>/keyboards/<build id>`: keyboard files
//! at its root and keymap files under `keymaps/<keymap name>`. Workspaces are
//! handed out as [`WorkspaceLease`]s which hold an exclusive lock on the
//! `(build id, version)` pair and delete the directory when dropped.

use std::collections::HashMap;
use std::io::ErrorKind;
use std::path::{Component, Path, PathBuf};
use std::sync::{Arc, Mutex};

use tokio::runtime::{Handle, RuntimeFlavor};
use tokio::sync::OwnedMutexGuard;
use tracing::{debug, info, warn};

use crate::core::error::BuildError;
use crate::core::task::SourceFile;

type LeaseKey = (String, String);
type LeaseTable = Arc<Mutex<HashMap<LeaseKey, Arc<tokio::sync::Mutex<()>>>>>;

#[derive(Clone)]
pub struct WorkspaceManager {
    qmk_base_dir: PathBuf,
    keymap_name: String,
    leases: LeaseTable,
}

impl WorkspaceManager {
    pub fn new(qmk_base_dir: impl Into<PathBuf>, keymap_name: impl Into<String>) -> Self {
        Self {
            qmk_base_dir: qmk_base_dir.into(),
            keymap_name: keymap_name.into(),
            leases: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// The QMK checkout for `version_tag`; the compiler runs from here.
    pub fn version_root(&self, version_tag: &str) -> PathBuf {
        self.qmk_base_dir.join(version_tag)
    }

    pub fn keyboard_dir(&self, build_id: &str, version_tag: &str) -> PathBuf {
        self.version_root(version_tag)
            .join("keyboards")
            .join(build_id)
    }

    /// Take the exclusive lease on `(build_id, version_tag)` and prepare a fresh
    /// directory for it. Waits while another build holds the same pair.
    pub async fn lease(
        &self,
        build_id: &str,
        version_tag: &str,
    ) -> Result<WorkspaceLease, BuildError> {
        validate_name(build_id, "keyboard directory name")?;
        validate_name(version_tag, "QMK firmware version")?;

        let key = (build_id.to_string(), version_tag.to_string());
        let lock = {
            let mut table = self.leases.lock().unwrap_or_else(|e| e.into_inner());
            table.entry(key.clone()).or_default().clone()
        };
        let guard = lock.lock_owned().await;

        let mut lease = WorkspaceLease {
            manager: self.clone(),
            key,
            path: self.keyboard_dir(build_id, version_tag),
            guard: Some(guard),
        };
        lease.path = self.prepare(build_id, version_tag).await?;
        Ok(lease)
    }

    /// Remove any existing directory for the build and recreate it empty.
    pub async fn prepare(&self, build_id: &str, version_tag: &str) -> Result<PathBuf, BuildError> {
        let dir = self.keyboard_dir(build_id, version_tag);
        info!("Preparing the keyboard directory {}", dir.display());

        match tokio::fs::remove_dir_all(&dir).await {
            Ok(()) => debug!("Removed the existing keyboard directory."),
            Err(e) if e.kind() == ErrorKind::NotFound => {}
            Err(e) => {
                return Err(BuildError::io(
                    format!("removing the keyboard directory {}", dir.display()),
                    e,
                ));
            }
        }

        tokio::fs::create_dir_all(&dir).await.map_err(|e| {
            BuildError::io(
                format!("creating the keyboard directory {}", dir.display()),
                e,
            )
        })?;
        Ok(dir)
    }

    /// Write `files` below `root`, creating intermediate directories. Stops at
    /// the first failure; whatever was written stays until teardown.
    pub async fn materialize(root: &Path, files: &[SourceFile]) -> Result<(), BuildError> {
        for file in files {
            validate_relative_path(&file.path)?;
            let target = root.join(&file.path);
            if let Some(parent) = target.parent() {
                tokio::fs::create_dir_all(parent).await.map_err(|e| {
                    BuildError::io(format!("creating the directory {}", parent.display()), e)
                })?;
            }
            debug!("Writing {}", target.display());
            tokio::fs::write(&target, &file.content)
                .await
                .map_err(|e| BuildError::io(format!("writing {}", target.display()), e))?;
        }
        Ok(())
    }

    /// Write keymap files under `<root>/keymaps/<keymap name>`.
    pub async fn materialize_keymaps(
        &self,
        root: &Path,
        files: &[SourceFile],
    ) -> Result<(), BuildError> {
        let keymap_dir = root.join("keymaps").join(&self.keymap_name);
        tokio::fs::create_dir_all(&keymap_dir).await.map_err(|e| {
            BuildError::io(
                format!("creating the keymap directory {}", keymap_dir.display()),
                e,
            )
        })?;
        Self::materialize(&keymap_dir, files).await
    }

    /// Delete the build directory. Failures are logged, never returned: a
    /// leftover directory must not change the outcome of the build.
    pub fn teardown(&self, build_id: &str, version_tag: &str) {
        let dir = self.keyboard_dir(build_id, version_tag);
        match std::fs::remove_dir_all(&dir) {
            Ok(()) => info!("Deleted the keyboard directory {}", dir.display()),
            Err(e) if e.kind() == ErrorKind::NotFound => {}
            Err(e) => warn!(
                "Failed to delete the keyboard directory {}: {}",
                dir.display(),
                e
            ),
        }
    }

    fn release(&self, key: &LeaseKey) {
        let mut table = self.leases.lock().unwrap_or_else(|e| e.into_inner());
        if table
            .get(key)
            .is_some_and(|lock| Arc::strong_count(lock) == 1)
        {
            table.remove(key);
        }
    }

    #[cfg(test)]
    fn lease_count(&self) -> usize {
        self.leases.lock().unwrap_or_else(|e| e.into_inner()).len()
    }
}

/// Exclusive use of one workspace directory. Dropping the lease tears the
/// directory down, on every exit path including unwinding.
pub struct WorkspaceLease {
    manager: WorkspaceManager,
    key: LeaseKey,
    path: PathBuf,
    guard: Option<OwnedMutexGuard<()>>,
}

impl WorkspaceLease {
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for WorkspaceLease {
    fn drop(&mut self) {
        // Keyboard trees can be large; keep the removal off the async workers
        // where the runtime allows it. The lock is only released afterwards.
        let teardown = || self.manager.teardown(&self.key.0, &self.key.1);
        match Handle::try_current() {
            Ok(handle) if handle.runtime_flavor() == RuntimeFlavor::MultiThread => {
                tokio::task::block_in_place(teardown)
            }
            _ => teardown(),
        }
        self.guard.take();
        self.manager.release(&self.key);
    }
}

/// A single path component: no separators, no `.` or `..`.
pub fn validate_name(name: &str, what: &str) -> Result<(), BuildError> {
    let mut components = Path::new(name).components();
    match (components.next(), components.next()) {
        (Some(Component::Normal(c)), None) if c == name => Ok(()),
        _ => Err(BuildError::Validation(format!(
            "the {} {:?} is not a valid directory name",
            what, name
        ))),
    }
}

/// A relative path that stays below the directory it is joined to.
pub fn validate_relative_path(path: &str) -> Result<(), BuildError> {
    let invalid = || BuildError::Validation(format!("the file path {:?} is not allowed", path));
    if path.is_empty() {
        return Err(invalid());
    }
    let mut has_file_name = false;
    for component in Path::new(path).components() {
        match component {
            Component::Normal(_) => has_file_name = true,
            Component::CurDir => {}
            Component::ParentDir | Component::RootDir | Component::Prefix(_) => {
                return Err(invalid());
            }
        }
    }
    if has_file_name { Ok(()) } else { Err(invalid()) }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use tempfile::TempDir;

    fn manager(base: &TempDir) -> WorkspaceManager {
        WorkspaceManager::new(base.path(), "remap")
    }

    #[tokio::test]
    async fn prepare_replaces_existing_directory() {
        let base = TempDir::new().unwrap();
        let mgr = manager(&base);
        let dir = mgr.keyboard_dir("kb1", "0.22.12");
        std::fs::create_dir_all(&dir).unwrap();
        std::fs::write(dir.join("stale.h"), "old").unwrap();

        let prepared = mgr.prepare("kb1", "0.22.12").await.unwrap();
        assert_eq!(prepared, dir);
        assert!(prepared.is_dir());
        assert_eq!(std::fs::read_dir(&prepared).unwrap().count(), 0);
    }

    #[tokio::test]
    async fn materialize_creates_nested_directories() {
        let base = TempDir::new().unwrap();
        let root = base.path().join("ws");
        std::fs::create_dir_all(&root).unwrap();
        let files = vec![
            SourceFile::new("a", "config.h", "#pragma once"),
            SourceFile::new("b", "lib/oled/font.c", "font"),
        ];

        WorkspaceManager::materialize(&root, &files).await.unwrap();
        assert_eq!(
            std::fs::read_to_string(root.join("config.h")).unwrap(),
            "#pragma once"
        );
        assert_eq!(
            std::fs::read_to_string(root.join("lib/oled/font.c")).unwrap(),
            "font"
        );
    }

    #[tokio::test]
    async fn materialize_rejects_escaping_paths() {
        let base = TempDir::new().unwrap();
        let files = vec![SourceFile::new("a", "../outside.h", "x")];
        let result = WorkspaceManager::materialize(base.path(), &files).await;
        assert!(matches!(result, Err(BuildError::Validation(_))));
        assert!(!base.path().parent().unwrap().join("outside.h").exists());
    }

    #[tokio::test]
    async fn keymaps_land_under_the_fixed_keymap_directory() {
        let base = TempDir::new().unwrap();
        let mgr = manager(&base);
        let root = mgr.prepare("kb1", "0.22.12").await.unwrap();
        mgr.materialize_keymaps(&root, &[SourceFile::new("k", "keymap.c", "km")])
            .await
            .unwrap();
        assert_eq!(
            std::fs::read_to_string(root.join("keymaps/remap/keymap.c")).unwrap(),
            "km"
        );
    }

    #[tokio::test]
    async fn dropping_the_lease_removes_the_directory() {
        let base = TempDir::new().unwrap();
        let mgr = manager(&base);
        let lease = mgr.lease("kb1", "0.22.12").await.unwrap();
        let path = lease.path().to_path_buf();
        WorkspaceManager::materialize(&path, &[SourceFile::new("a", "rules.mk", "")])
            .await
            .unwrap();
        assert!(path.exists());

        drop(lease);
        assert!(!path.exists());
        assert_eq!(mgr.lease_count(), 0);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn lease_drop_on_a_worker_thread_removes_the_directory() {
        let base = TempDir::new().unwrap();
        let mgr = manager(&base);
        let lease = mgr.lease("kb1", "0.22.12").await.unwrap();
        let path = lease.path().to_path_buf();
        WorkspaceManager::materialize(&path, &[SourceFile::new("a", "lib/big.c", "x")])
            .await
            .unwrap();

        tokio::spawn(async move { drop(lease) }).await.unwrap();
        assert!(!path.exists());
        assert_eq!(mgr.lease_count(), 0);
    }

    #[tokio::test]
    async fn teardown_of_missing_directory_is_quiet() {
        let base = TempDir::new().unwrap();
        manager(&base).teardown("never-created", "0.22.12");
    }

    #[tokio::test]
    async fn lease_rejects_path_like_names() {
        let base = TempDir::new().unwrap();
        let mgr = manager(&base);
        assert!(matches!(
            mgr.lease("../kb", "0.22.12").await,
            Err(BuildError::Validation(_))
        ));
        assert!(matches!(
            mgr.lease("kb1", "0.22/../../etc").await,
            Err(BuildError::Validation(_))
        ));
    }

    #[tokio::test]
    async fn same_build_id_is_serialised() {
        let base = TempDir::new().unwrap();
        let mgr = manager(&base);
        let first = mgr.lease("fixed", "0.22.12").await.unwrap();

        let contender = {
            let mgr = mgr.clone();
            tokio::spawn(async move { mgr.lease("fixed", "0.22.12").await.map(|_| ()) })
        };
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(!contender.is_finished());

        drop(first);
        contender.await.unwrap().unwrap();
    }

    #[test]
    fn relative_path_validation() {
        assert!(validate_relative_path("config.h").is_ok());
        assert!(validate_relative_path("./keymaps/default/keymap.c").is_ok());
        assert!(validate_relative_path("").is_err());
        assert!(validate_relative_path(".").is_err());
        assert!(validate_relative_path("/etc/passwd").is_err());
        assert!(validate_relative_path("a/../../b").is_err());
    }

    #[test]
    fn name_validation() {
        assert!(validate_name("0.22.12", "version").is_ok());
        assert!(validate_name("ckpr5gut7qls715olr70", "dir").is_ok());
        assert!(validate_name("", "dir").is_err());
        assert!(validate_name("..", "dir").is_err());
        assert!(validate_name("a/b", "dir").is_err());
        assert!(validate_name("a/", "dir").is_err());
    }
}
