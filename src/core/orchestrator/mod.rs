//! Drives one build task from `waiting` to a terminal status.
//!
//! A request passes three phases:
//!
//! 1. *Admission*: bearer token, request parameters, task lookup and the
//!    `waiting` check. Nothing is written when admission fails.
//! 2. *Checks*: ownership, parameters and the referenced record. Failures
//!    move the task straight from `waiting` to `failure`.
//! 3. *Build*: the request claims the task by moving it from `waiting` to
//!    `building` in one compare-and-set; a duplicate delivery that loses the
//!    claim is rejected without writing anything. Project builds then take
//!    one from the owner's quota, and files are staged, compiled and the
//!    artifact uploaded. The workspace is leased for the duration and torn
//!    down when the lease drops, whatever the result.

pub mod types;

pub use types::{BuildOutcome, BuildRequest, BuildServices};

use std::path::Path;
use std::time::{SystemTime, UNIX_EPOCH};

use tracing::{Instrument, error, info, info_span, warn};

use crate::core::build::{extract_artifact_name, timestamped_file_name};
use crate::core::error::BuildError;
use crate::core::parameter::{self, ParametersDocument};
use crate::core::task::{BuildRecord, BuildTarget, FileKind, Task, TaskStatus, TaskUpdate};
use crate::core::template;
use crate::core::workspace::WorkspaceManager;

use types::StepFailure;

/// A task that passed admission and checks.
struct AdmittedBuild {
    task: Task,
    target: BuildTarget,
    record: BuildRecord,
    parameters: ParametersDocument,
}

struct BuiltFirmware {
    stdout: String,
    stderr: String,
    firmware_file_path: String,
}

pub struct BuildOrchestrator {
    services: BuildServices,
}

impl BuildOrchestrator {
    pub fn new(services: BuildServices) -> Self {
        Self { services }
    }

    pub async fn run(&self, request: BuildRequest) -> BuildOutcome {
        let span = info_span!("build", task_id = %request.task_id, uid = %request.uid);
        self.run_request(request).instrument(span).await
    }

    async fn run_request(&self, request: BuildRequest) -> BuildOutcome {
        let task = match self.admit(&request).await {
            Ok(task) => task,
            Err(e) => {
                warn!("Rejected the build request: {}", e);
                return BuildOutcome::Rejected(e.to_string());
            }
        };
        info!("The task {} exists.", task.task_id);

        let admitted = match self.check(task, &request.uid).await {
            Ok(admitted) => admitted,
            Err(e) => return self.fail_waiting(&request.task_id, e).await,
        };

        match self
            .services
            .tasks
            .transition_task(&request.task_id, TaskStatus::Waiting, &TaskUpdate::building())
            .await
        {
            Ok(true) => {}
            Ok(false) => return superseded(&request.task_id),
            Err(e) => return self.fail(&request.task_id, StepFailure::from(e)).await,
        }
        info!("The task {} is building.", request.task_id);

        if let Err(e) = self.take_quota(&admitted).await {
            return self.fail(&request.task_id, StepFailure::from(e)).await;
        }

        match self.build(&admitted).await {
            Ok(built) => self.succeed(&request.task_id, built).await,
            Err(failure) => self.fail(&request.task_id, failure).await,
        }
    }

    async fn admit(&self, request: &BuildRequest) -> Result<Task, BuildError> {
        let token = request
            .bearer_token
            .as_deref()
            .filter(|t| !t.is_empty())
            .ok_or_else(|| BuildError::Auth("authorization header is empty".to_string()))?;
        self.services.verifier.verify(token).await?;

        if request.uid.is_empty() || request.task_id.is_empty() {
            return Err(BuildError::Validation("uid or taskId is empty".to_string()));
        }

        let task = self
            .services
            .tasks
            .fetch_task(&request.task_id)
            .await?
            .ok_or_else(|| BuildError::NotFound("task".to_string()))?;

        if task.status != TaskStatus::Waiting {
            return Err(BuildError::Validation(format!(
                "the task {} is already {}",
                task.task_id, task.status
            )));
        }
        Ok(task)
    }

    async fn check(&self, task: Task, uid: &str) -> Result<AdmittedBuild, BuildError> {
        if task.uid != uid {
            return Err(BuildError::Validation(
                "uid in the task information and passed uid are not the same".to_string(),
            ));
        }

        let target = task.target.clone().ok_or_else(|| {
            BuildError::Validation(
                "the task must reference exactly one firmware or project".to_string(),
            )
        })?;

        let parameters = parameter::resolve(&task.parameters_json)?;

        let record = match &target {
            BuildTarget::Firmware(id) => {
                let record = self
                    .services
                    .records
                    .fetch_firmware(id)
                    .await?
                    .ok_or_else(|| BuildError::NotFound("firmware".to_string()))?;
                if !record.enabled {
                    return Err(BuildError::Validation(format!(
                        "the firmware {} is disabled",
                        id
                    )));
                }
                record
            }
            BuildTarget::Project(id) => {
                let record = self
                    .services
                    .records
                    .fetch_project(id)
                    .await?
                    .ok_or_else(|| BuildError::NotFound("project".to_string()))?;
                if record.uid != uid {
                    return Err(BuildError::Validation(format!(
                        "the project {} does not belong to the user",
                        id
                    )));
                }
                record
            }
        };
        info!(
            "Building the {} {} with QMK firmware {} (parameters version {})",
            record.kind.as_str(),
            record.id,
            record.qmk_firmware_version,
            parameters.source_version
        );

        Ok(AdmittedBuild {
            task,
            target,
            record,
            parameters,
        })
    }

    /// Project builds spend one from the owner's quota. Only the request that
    /// moved the task to `building` gets here.
    async fn take_quota(&self, admitted: &AdmittedBuild) -> Result<(), BuildError> {
        if !matches!(admitted.target, BuildTarget::Project(_)) {
            return Ok(());
        }
        let uid = &admitted.task.uid;
        if !self.services.quotas.decrement_if_positive(uid).await? {
            return Err(BuildError::QuotaExceeded(uid.to_string()));
        }
        Ok(())
    }

    async fn build(&self, admitted: &AdmittedBuild) -> Result<BuiltFirmware, StepFailure> {
        let records = &self.services.records;
        let keyboard_files = records
            .fetch_files(&admitted.target, FileKind::Keyboard)
            .await?;
        let keymap_files = records
            .fetch_files(&admitted.target, FileKind::Keymap)
            .await?;
        info!(
            "Fetched {} keyboard files and {} keymap files.",
            keyboard_files.len(),
            keymap_files.len()
        );

        let keyboard_files = template::substitute(keyboard_files, &admitted.parameters.keyboard);
        let keymap_files = template::substitute(keymap_files, &admitted.parameters.keymap);

        let build_id = admitted
            .record
            .keyboard_directory_name
            .clone()
            .filter(|name| !name.is_empty())
            .unwrap_or_else(|| uuid::Uuid::new_v4().simple().to_string());
        let version = admitted.record.qmk_firmware_version.as_str();
        info!("Keyboard ID: {}", build_id);

        let workspaces: &WorkspaceManager = &self.services.workspaces;
        let lease = workspaces.lease(&build_id, version).await?;
        WorkspaceManager::materialize(lease.path(), &keyboard_files).await?;
        workspaces
            .materialize_keymaps(lease.path(), &keymap_files)
            .await?;

        let version_root = workspaces.version_root(version);
        let result = self
            .services
            .compiler
            .compile(&build_id, &version_root)
            .await;
        if !result.success {
            return Err(StepFailure {
                error: BuildError::BuildFailure,
                stdout: result.stdout,
                stderr: result.stderr,
            });
        }

        let with_output = |error: BuildError| StepFailure {
            error,
            stdout: result.stdout.clone(),
            stderr: result.stderr.clone(),
        };

        let artifact_name = extract_artifact_name(&result.stdout).map_err(with_output)?;
        let local_path = version_root.join(&artifact_name);
        let upload_name = timestamped_file_name(&artifact_name, unix_now());
        info!("Firmware file: {}", local_path.display());

        let uploaded = self
            .services
            .artifacts
            .upload(&admitted.task.uid, &upload_name, &local_path)
            .await;
        remove_local_artifact(&local_path).await;
        drop(lease);
        let firmware_file_path = uploaded.map_err(with_output)?;

        Ok(BuiltFirmware {
            stdout: result.stdout,
            stderr: result.stderr,
            firmware_file_path,
        })
    }

    async fn succeed(&self, task_id: &str, built: BuiltFirmware) -> BuildOutcome {
        let update = TaskUpdate::success(built.stdout, built.stderr, &built.firmware_file_path);
        if let Err(e) = self.services.tasks.update_task(task_id, &update).await {
            return self.fail(task_id, StepFailure::from(e)).await;
        }
        info!("Building succeeded: {}", built.firmware_file_path);
        BuildOutcome::Succeeded {
            firmware_file_path: built.firmware_file_path,
        }
    }

    /// A check failed before the task was claimed. The failure is only
    /// recorded while the task is still `waiting`.
    async fn fail_waiting(&self, task_id: &str, error: BuildError) -> BuildOutcome {
        error!("{}", error);
        let failure = StepFailure::from(error);
        let update = TaskUpdate::failure(String::new(), failure.persisted_stderr());
        match self
            .services
            .tasks
            .transition_task(task_id, TaskStatus::Waiting, &update)
            .await
        {
            Ok(true) => {}
            Ok(false) => return superseded(task_id),
            Err(e) => error!("Failed to record the failure of task {}: {}", task_id, e),
        }
        BuildOutcome::Failed(failure.error.to_string())
    }

    async fn fail(&self, task_id: &str, failure: StepFailure) -> BuildOutcome {
        error!("{}", failure.error);
        let update = TaskUpdate::failure(failure.stdout.clone(), failure.persisted_stderr());
        if let Err(e) = self.services.tasks.update_task(task_id, &update).await {
            error!("Failed to record the failure of task {}: {}", task_id, e);
        }
        BuildOutcome::Failed(failure.error.to_string())
    }
}

/// Another delivery of the same task got there first.
fn superseded(task_id: &str) -> BuildOutcome {
    warn!("The task {} was taken by another request.", task_id);
    BuildOutcome::Rejected(format!("the task {} is already being built", task_id))
}

fn unix_now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or_default()
}

async fn remove_local_artifact(path: &Path) {
    if let Err(e) = tokio::fs::remove_file(path).await {
        warn!(
            "Failed to remove the local firmware file {}: {}",
            path.display(),
            e
        );
    }
}

#[cfg(test)]
mod tests;
