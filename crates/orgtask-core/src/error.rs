//! Error types for orgtask-core.

use thiserror::Error;

/// Result type alias for orgtask-core operations.
pub type Result<T> = std::result::Result<T, CoreError>;

/// Errors that can occur in orgtask-core operations.
#[derive(Debug, Error)]
pub enum CoreError {
    /// First line of a fragment is not a headline.
    #[error("headline '{0}' was malformed")]
    MalformedHeadline(String),

    /// Task id is missing from the collection.
    #[error("task not found: {0}")]
    NotFound(String),

    /// Date token could not be read.
    #[error("invalid date: {0}")]
    InvalidDate(String),

    /// Status keyword is not one of NONE, TODO or DONE.
    #[error("invalid status: {0}")]
    InvalidStatus(String),

    /// Update intent tag is not one of the known intents.
    #[error("unknown update type: {0}")]
    UnknownUpdateType(String),

    /// Priority operation name is not one of the known operations.
    #[error("unknown priority operation: {0}")]
    UnknownOperation(String),

    /// Task text names a different id than the record holding it.
    #[error("task text carries id '{found}', expected '{expected}'")]
    IdMismatch { expected: String, found: String },

    /// Moving past this priority would leave the integer range.
    #[error("priority {0} cannot move any further")]
    PriorityOverflow(i64),

    /// Line index outside the entry body.
    #[error("line {line} is outside the body of task {id}")]
    LineOutOfRange { id: String, line: usize },

    /// JSON serialization/deserialization error.
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
}
