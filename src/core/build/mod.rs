pub mod log;

pub use log::{extract_artifact_name, timestamped_file_name};

use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use tokio::process::Command;
use tracing::{info, warn};

/// Captured result of one compiler run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BuildResult {
    pub success: bool,
    pub stdout: String,
    pub stderr: String,
}

impl BuildResult {
    pub fn failed(stderr: impl Into<String>) -> Self {
        Self {
            success: false,
            stdout: String::new(),
            stderr: stderr.into(),
        }
    }
}

#[async_trait]
pub trait FirmwareCompiler: Send + Sync {
    /// Compile the keyboard `build_id` from within `version_root`.
    ///
    /// Never fails outright: a process that cannot be started, times out or
    /// exits non-zero yields `success == false` with whatever output exists.
    async fn compile(&self, build_id: &str, version_root: &Path) -> BuildResult;
}

/// Runs `qmk compile -kb <build id> -km <keymap>`.
pub struct QmkCompiler {
    binary: PathBuf,
    keymap_name: String,
    timeout: Duration,
}

impl QmkCompiler {
    pub fn new(binary: impl Into<PathBuf>, keymap_name: impl Into<String>, timeout: Duration) -> Self {
        Self {
            binary: binary.into(),
            keymap_name: keymap_name.into(),
            timeout,
        }
    }

    fn command(&self, build_id: &str, version_root: &Path) -> Command {
        let mut cmd = Command::new(&self.binary);
        cmd.arg("compile")
            .arg("-kb")
            .arg(build_id)
            .arg("-km")
            .arg(&self.keymap_name)
            .current_dir(version_root)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        cmd
    }
}

#[async_trait]
impl FirmwareCompiler for QmkCompiler {
    async fn compile(&self, build_id: &str, version_root: &Path) -> BuildResult {
        info!(
            "Running {} compile -kb {} -km {} in {}",
            self.binary.display(),
            build_id,
            self.keymap_name,
            version_root.display()
        );

        let output = match tokio::time::timeout(
            self.timeout,
            self.command(build_id, version_root).output(),
        )
        .await
        {
            Ok(Ok(output)) => output,
            Ok(Err(e)) => {
                warn!("Failed to start the compiler: {}", e);
                return BuildResult::failed(format!(
                    "failed to start {}: {}",
                    self.binary.display(),
                    e
                ));
            }
            Err(_) => {
                warn!("The compiler timed out after {:?}", self.timeout);
                return BuildResult::failed(format!(
                    "the compiler did not finish within {} seconds",
                    self.timeout.as_secs()
                ));
            }
        };

        let result = BuildResult {
            success: output.status.success(),
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        };
        if result.success {
            info!("Compilation finished successfully.");
        } else {
            warn!("Compilation failed with {}", output.status);
        }
        result
    }
}
