//! Crate-wide error taxonomy. Every variant maps onto a wire-level error
//! `code`; `anyhow` is reserved for the binary boundary.

use thiserror::Error;

/// Coordinator-level errors. Validation and not-found are local-to-caller
/// and never broadcast; storage/cache failures are retried internally by
/// the flush queue and never surface past it.
#[derive(Debug, Error)]
pub enum CoordinatorError {
    #[error("validation error: {0}")]
    Validation(String),

    #[error("task not found: {0}")]
    NotFound(String),

    #[error("invalid order range: {0}")]
    InvalidRange(String),

    #[error("create failed: {0}")]
    CreateFailed(String),

    #[error("update failed: {0}")]
    UpdateFailed(String),

    #[error("move failed: {0}")]
    MoveFailed(String),

    #[error("delete failed: {0}")]
    DeleteFailed(String),

    #[error("connect failed: {0}")]
    ConnectFailed(String),

    #[error("storage error: {0}")]
    Storage(String),

    #[error("cache error: {0}")]
    Cache(String),
}

/// Wire-level error code, serialized as the `code` field of `ERROR` events
/// and of the HTTP fallback's `ApiError` body.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum ErrorCode {
    #[serde(rename = "VALIDATION_ERROR")]
    ValidationError,
    #[serde(rename = "NOT_FOUND")]
    NotFound,
    #[serde(rename = "VERSION_MISMATCH")]
    VersionMismatch,
    #[serde(rename = "CREATE_FAILED")]
    CreateFailed,
    #[serde(rename = "UPDATE_FAILED")]
    UpdateFailed,
    #[serde(rename = "MOVE_FAILED")]
    MoveFailed,
    #[serde(rename = "DELETE_FAILED")]
    DeleteFailed,
    #[serde(rename = "CONNECT_FAILED")]
    ConnectFailed,
}

impl CoordinatorError {
    /// Maps this error onto its wire-level code. `Storage`/`Cache` never
    /// reach the caller directly, but are classified here for
    /// the rare path where a mutation fails before the flush queue absorbs it.
    pub fn code(&self) -> ErrorCode {
        match self {
            CoordinatorError::Validation(_) | CoordinatorError::InvalidRange(_) => {
                ErrorCode::ValidationError
            }
            CoordinatorError::NotFound(_) => ErrorCode::NotFound,
            CoordinatorError::CreateFailed(_) | CoordinatorError::Storage(_) => {
                ErrorCode::CreateFailed
            }
            CoordinatorError::UpdateFailed(_) => ErrorCode::UpdateFailed,
            CoordinatorError::MoveFailed(_) | CoordinatorError::Cache(_) => ErrorCode::MoveFailed,
            CoordinatorError::DeleteFailed(_) => ErrorCode::DeleteFailed,
            CoordinatorError::ConnectFailed(_) => ErrorCode::ConnectFailed,
        }
    }

    pub fn message(&self) -> String {
        self.to_string()
    }
}

pub type Result<T> = std::result::Result<T, CoordinatorError>;
