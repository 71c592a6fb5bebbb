use thiserror::Error;

/// Every way a build request can fail.
///
/// The variants mirror the failure classes the orchestrator distinguishes when
/// deciding whether a task record may be touched at all.
#[derive(Debug, Error)]
pub enum BuildError {
    #[error("{0}")]
    Validation(String),

    #[error("authentication failed: {0}")]
    Auth(String),

    #[error("{0} not found")]
    NotFound(String),

    #[error("the remaining build count is exhausted for user {0}")]
    QuotaExceeded(String),

    #[error("invalid parameters JSON: {0}")]
    Parse(String),

    #[error("{context}: {source}")]
    Io {
        context: String,
        #[source]
        source: std::io::Error,
    },

    #[error("building failed")]
    BuildFailure,

    #[error("uploading the firmware file failed: {0}")]
    Upload(String),

    #[error("storage error: {0}")]
    Storage(String),
}

impl BuildError {
    pub fn io(context: impl Into<String>, source: std::io::Error) -> Self {
        BuildError::Io {
            context: context.into(),
            source,
        }
    }
}

impl From<rusqlite::Error> for BuildError {
    fn from(e: rusqlite::Error) -> Self {
        BuildError::Storage(e.to_string())
    }
}
