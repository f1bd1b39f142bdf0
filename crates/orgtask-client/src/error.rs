//! Error types for the sync client.

use thiserror::Error;

/// Result type alias for sync operations.
pub type Result<T> = std::result::Result<T, SyncError>;

/// Errors that can occur while syncing with a remote.
#[derive(Debug, Error)]
pub enum SyncError {
    /// Core library error.
    #[error(transparent)]
    Core(#[from] orgtask_core::CoreError),

    /// Request could not be sent or its response not read.
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    /// Remote answered with an unexpected status.
    #[error("remote returned {status}: {body}")]
    Status { status: u16, body: String },

    /// A `full` fetch came back without entries.
    #[error("remote response carried no entries")]
    MissingEntries,

    /// No conflict is recorded for this task.
    #[error("no conflict recorded for task {0}")]
    NoConflict(String),

    /// IO error.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON parsing error.
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
}
