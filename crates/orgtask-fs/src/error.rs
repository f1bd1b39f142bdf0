//! Error types for the filesystem backend.

use std::path::PathBuf;
use thiserror::Error;

/// Result type alias for store operations.
pub type Result<T> = std::result::Result<T, StoreError>;

/// Errors that can occur in store operations.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Store not found at the specified path.
    #[error("task store not found at '{0}'")]
    StoreNotFound(PathBuf),

    /// Store already exists.
    #[error("task store already exists at '{0}'")]
    StoreExists(PathBuf),

    /// Task not found.
    #[error("task not found: {0}")]
    TaskNotFound(String),

    /// IO error.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// YAML parsing error.
    #[error("yaml error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// JSON parsing error.
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    /// Core library error.
    #[error(transparent)]
    Core(orgtask_core::CoreError),
}

impl From<orgtask_core::CoreError> for StoreError {
    fn from(err: orgtask_core::CoreError) -> Self {
        match err {
            orgtask_core::CoreError::NotFound(id) => Self::TaskNotFound(id),
            other => Self::Core(other),
        }
    }
}
