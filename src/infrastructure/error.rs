use thiserror::Error;

#[derive(Debug, Error)]
pub enum CoreError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
    #[error("Credential error: {0}")]
    Credential(String),
    #[error("Task store error: {0}")]
    Api(String),
    #[error("Invalid config: {0}")]
    InvalidConfig(String),
    #[error("no task selected")]
    NoTaskSelected,
    #[error("task is not in progress (status: {0})")]
    TaskNotInProgress(String),
    #[error("status update failed: {0}")]
    StatusUpdateFailed(String),
}
