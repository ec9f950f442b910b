//! Domain error types.

/// Top-level error type for mtmcoach.
#[derive(Debug, thiserror::Error)]
pub enum CoachError {
    #[error("not authorized: {reason}")]
    Authorization { reason: String },

    #[error("no such model: {model_id}")]
    ModelNotFound { model_id: i64 },

    #[error("no such task: {task_id}")]
    TaskNotFound { task_id: i64 },

    #[error("invalid rule set for task {task_id}: {reason}")]
    RuleSetInvalid { task_id: i64, reason: String },

    #[error("progress storage unavailable: {reason}")]
    StorageUnavailable { reason: String },

    #[error("failed to persist outcome: {reason}")]
    Persistence { reason: String },

    #[error("database error: {reason}")]
    Database { reason: String },

    #[error("database query error: {reason}")]
    DatabaseQuery { reason: String },

    #[error("config parse error in {file}: {reason}")]
    ConfigParse { file: String, reason: String },

    #[error("missing config key [{section}] {key}")]
    ConfigMissing { section: String, key: String },

    #[error("invalid config value [{section}] {key}: {reason}")]
    ConfigInvalid {
        section: String,
        key: String,
        reason: String,
    },

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl From<&CoachError> for std::process::ExitCode {
    fn from(err: &CoachError) -> Self {
        let code: u8 = match err {
            CoachError::Io(_) => 1,
            CoachError::ConfigParse { .. }
            | CoachError::ConfigMissing { .. }
            | CoachError::ConfigInvalid { .. } => 2,
            CoachError::Database { .. }
            | CoachError::DatabaseQuery { .. }
            | CoachError::StorageUnavailable { .. }
            | CoachError::Persistence { .. } => 3,
            CoachError::RuleSetInvalid { .. } => 4,
            CoachError::ModelNotFound { .. } | CoachError::TaskNotFound { .. } => 5,
            CoachError::Authorization { .. } => 6,
        };
        std::process::ExitCode::from(code)
    }
}
