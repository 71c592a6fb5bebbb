use std::sync::Arc;

use crate::core::auth::TokenVerifier;
use crate::core::build::FirmwareCompiler;
use crate::core::error::BuildError;
use crate::core::store::{ArtifactStore, QuotaStore, RecordStore, TaskStore};
use crate::core::workspace::WorkspaceManager;

/// A build request as delivered by the task dispatcher.
#[derive(Debug, Clone, Default)]
pub struct BuildRequest {
    pub uid: String,
    pub task_id: String,
    /// The bearer token from the `Authorization` header, if any.
    pub bearer_token: Option<String>,
}

/// How a request ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BuildOutcome {
    /// Refused before the task record was touched.
    Rejected(String),
    /// The task was moved to `failure`.
    Failed(String),
    /// The task was moved to `success`.
    Succeeded { firmware_file_path: String },
}

impl BuildOutcome {
    pub const SUCCESS_MESSAGE: &'static str = "Building succeeded";

    /// The text returned to the dispatcher.
    pub fn message(&self) -> &str {
        match self {
            BuildOutcome::Rejected(message) | BuildOutcome::Failed(message) => message,
            BuildOutcome::Succeeded { .. } => Self::SUCCESS_MESSAGE,
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, BuildOutcome::Succeeded { .. })
    }
}

/// Everything the orchestrator talks to.
#[derive(Clone)]
pub struct BuildServices {
    pub tasks: Arc<dyn TaskStore>,
    pub records: Arc<dyn RecordStore>,
    pub quotas: Arc<dyn QuotaStore>,
    pub artifacts: Arc<dyn ArtifactStore>,
    pub verifier: Arc<dyn TokenVerifier>,
    pub compiler: Arc<dyn FirmwareCompiler>,
    pub workspaces: WorkspaceManager,
}

/// A failure after the task entered `building`, with whatever compiler output
/// exists at that point.
#[derive(Debug)]
pub(super) struct StepFailure {
    pub error: BuildError,
    pub stdout: String,
    pub stderr: String,
}

impl StepFailure {
    /// Compiler stderr is kept verbatim when the compiler itself failed;
    /// otherwise the error message is appended so the task says what broke.
    pub fn persisted_stderr(&self) -> String {
        if matches!(self.error, BuildError::BuildFailure) {
            return self.stderr.clone();
        }
        if self.stderr.is_empty() {
            self.error.to_string()
        } else if self.stderr.ends_with('\n') {
            format!("{}{}", self.stderr, self.error)
        } else {
            format!("{}\n{}", self.stderr, self.error)
        }
    }
}

impl From<BuildError> for StepFailure {
    fn from(error: BuildError) -> Self {
        Self {
            error,
            stdout: String::new(),
            stderr: String::new(),
        }
    }
}
