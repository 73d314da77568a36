//! Model error types.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ModelError {
    #[error("Invalid topic path: {0}")]
    InvalidTopic(String),

    #[error("Invalid video status: {0}")]
    InvalidStatus(String),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}
