
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tempfile::TempDir;

use crate::core::auth::{TokenVerifier, VerifiedClaims};
use crate::core::build::{BuildResult, FirmwareCompiler};
use crate::core::error::BuildError;
use crate::core::orchestrator::{BuildOrchestrator, BuildRequest, BuildServices};
use crate::core::store::{
    ArtifactStore, BuildDatabase, LocalArtifactStore, RecordStore, TaskStore,
};
use crate::core::task::{BuildRecord, BuildTarget, FileKind, SourceFile, Task};
use crate::core::workspace::WorkspaceManager;

pub(super) const VERSION: &str = "0.22.12";
pub(super) const VALID_TOKEN: &str = "signed-by-dispatcher";

struct StaticVerifier;

#[async_trait]
impl TokenVerifier for StaticVerifier {
    async fn verify(&self, token: &str) -> Result<VerifiedClaims, BuildError> {
        if token != VALID_TOKEN {
            return Err(BuildError::Auth("token signature is invalid".to_string()));
        }
        Ok(VerifiedClaims {
            iss: "https://accounts.google.com".to_string(),
            email: "dispatcher@example.com".to_string(),
            aud: "https://build.example.com/build?".to_string(),
            exp: u64::MAX,
        })
    }
}

/// What the compiler saw when it was invoked.
#[derive(Debug, Clone)]
pub(super) struct CompileCall {
    pub build_id: String,
    /// Workspace files by path relative to the keyboard directory.
    pub files: BTreeMap<String, String>,
}

/// Stands in for `qmk`: snapshots the workspace, optionally drops an artifact
/// into the version root and returns a canned result.
pub(super) struct ScriptedCompiler {
    result: BuildResult,
    artifact: Option<String>,
    calls: Mutex<Vec<CompileCall>>,
}

impl ScriptedCompiler {
    pub fn succeeding(artifact: &str) -> Self {
        Self {
            result: BuildResult {
                success: true,
                stdout: format!(
                    "Compiling keymap with gmake...\nCopying {} to qmk_firmware folder [OK]\n",
                    artifact
                ),
                stderr: String::new(),
            },
            artifact: Some(artifact.to_string()),
            calls: Mutex::new(Vec::new()),
        }
    }

    pub fn returning(result: BuildResult) -> Self {
        Self {
            result,
            artifact: None,
            calls: Mutex::new(Vec::new()),
        }
    }

    pub fn calls(&self) -> Vec<CompileCall> {
        self.calls.lock().unwrap().clone()
    }
}

fn snapshot(root: &Path, dir: &Path, out: &mut BTreeMap<String, String>) {
    for entry in std::fs::read_dir(dir).unwrap() {
        let path = entry.unwrap().path();
        if path.is_dir() {
            snapshot(root, &path, out);
        } else {
            let rel = path.strip_prefix(root).unwrap().to_string_lossy().replace('\\', "/");
            out.insert(rel, std::fs::read_to_string(&path).unwrap());
        }
    }
}

#[async_trait]
impl FirmwareCompiler for ScriptedCompiler {
    async fn compile(&self, build_id: &str, version_root: &Path) -> BuildResult {
        let keyboard_dir = version_root.join("keyboards").join(build_id);
        let mut files = BTreeMap::new();
        snapshot(&keyboard_dir, &keyboard_dir, &mut files);
        self.calls.lock().unwrap().push(CompileCall {
            build_id: build_id.to_string(),
            files,
        });

        if let Some(name) = &self.artifact {
            std::fs::write(version_root.join(name), b":00000001FF").unwrap();
        }
        self.result.clone()
    }
}

/// Record lookups that take a while, so concurrent requests interleave.
struct SlowRecords {
    inner: BuildDatabase,
    delay: Duration,
}

#[async_trait]
impl RecordStore for SlowRecords {
    async fn fetch_firmware(&self, firmware_id: &str) -> Result<Option<BuildRecord>, BuildError> {
        tokio::time::sleep(self.delay).await;
        self.inner.fetch_firmware(firmware_id).await
    }

    async fn fetch_project(&self, project_id: &str) -> Result<Option<BuildRecord>, BuildError> {
        tokio::time::sleep(self.delay).await;
        self.inner.fetch_project(project_id).await
    }

    async fn fetch_files(
        &self,
        target: &BuildTarget,
        kind: FileKind,
    ) -> Result<Vec<SourceFile>, BuildError> {
        tokio::time::sleep(self.delay).await;
        self.inner.fetch_files(target, kind).await
    }
}

pub(super) struct Harness {
    pub db: BuildDatabase,
    pub qmk_base: TempDir,
    pub artifact_root: TempDir,
    pub orchestrator: BuildOrchestrator,
}

impl Harness {
    pub fn new(compiler: Arc<dyn FirmwareCompiler>) -> Self {
        Self::assemble(compiler, None, None)
    }

    pub fn with_slow_records(compiler: Arc<dyn FirmwareCompiler>, delay: Duration) -> Self {
        Self::assemble(compiler, Some(delay), None)
    }

    pub fn with_artifacts(
        compiler: Arc<dyn FirmwareCompiler>,
        artifacts: Arc<dyn ArtifactStore>,
    ) -> Self {
        Self::assemble(compiler, None, Some(artifacts))
    }

    fn assemble(
        compiler: Arc<dyn FirmwareCompiler>,
        record_delay: Option<Duration>,
        artifacts: Option<Arc<dyn ArtifactStore>>,
    ) -> Self {
        let db = BuildDatabase::open_in_memory().unwrap();
        let qmk_base = TempDir::new().unwrap();
        std::fs::create_dir_all(qmk_base.path().join(VERSION)).unwrap();
        let artifact_root = TempDir::new().unwrap();

        let records: Arc<dyn RecordStore> = match record_delay {
            Some(delay) => Arc::new(SlowRecords {
                inner: db.clone(),
                delay,
            }),
            None => Arc::new(db.clone()),
        };
        let artifacts = artifacts
            .unwrap_or_else(|| Arc::new(LocalArtifactStore::new(artifact_root.path())));

        let services = BuildServices {
            tasks: Arc::new(db.clone()),
            records,
            quotas: Arc::new(db.clone()),
            artifacts,
            verifier: Arc::new(StaticVerifier),
            compiler,
            workspaces: WorkspaceManager::new(qmk_base.path(), "remap"),
        };

        Self {
            db,
            qmk_base,
            artifact_root,
            orchestrator: BuildOrchestrator::new(services),
        }
    }

    pub fn version_root(&self) -> PathBuf {
        self.qmk_base.path().join(VERSION)
    }

    pub fn keyboards_dir(&self) -> PathBuf {
        self.version_root().join("keyboards")
    }

    /// Number of build directories left behind under `keyboards/`.
    pub fn leftover_workspaces(&self) -> usize {
        std::fs::read_dir(self.keyboards_dir())
            .map(|entries| entries.count())
            .unwrap_or(0)
    }

    /// An enabled firmware `fw1` with one keyboard and one keymap file.
    pub async fn seed_firmware(&self, keyboard_source: &str) -> (BuildTarget, String) {
        let target = BuildTarget::Firmware("fw1".to_string());
        self.db.ensure_firmware("fw1", "author", VERSION).await.unwrap();
        self.db.set_firmware_enabled("fw1", true).await.unwrap();
        let file_id = self
            .db
            .insert_source_file(&target, FileKind::Keyboard, "config.h", keyboard_source)
            .await
            .unwrap();
        self.db
            .insert_source_file(&target, FileKind::Keymap, "keymap.c", "const int layers = 1;")
            .await
            .unwrap();
        (target, file_id)
    }

    pub async fn task(&self, task_id: &str) -> Task {
        self.db.fetch_task(task_id).await.unwrap().unwrap()
    }
}

pub(super) fn request(uid: &str, task_id: &str) -> BuildRequest {
    BuildRequest {
        uid: uid.to_string(),
        task_id: task_id.to_string(),
        bearer_token: Some(VALID_TOKEN.to_string()),
    }
}
