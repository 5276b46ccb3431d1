//! # AppError
//!
//! Centralized error handling for the solved service.
//! Maps domain-specific failures to actionable error types.

use thiserror::Error;

/// The primary error type for all sv-core operations.
#[derive(Error, Debug)]
pub enum AppError {
    /// Resource not found (e.g., Topic, Post, User)
    #[error("{0} not found with ID {1}")]
    NotFound(String, String),

    /// Validation failure (e.g., accepting the opening post, bad setting)
    #[error("validation error: {0}")]
    ValidationError(String),

    /// Permission failure (e.g., anonymous caller, not the topic author)
    #[error("unauthorized: {0}")]
    Unauthorized(String),

    /// Infrastructure failure (e.g., DB down)
    #[error("internal service error: {0}")]
    Internal(String),

    /// State already matches the request (e.g., post already accepted)
    #[error("conflict: {0}")]
    Conflict(String),
}

impl AppError {
    pub fn not_found(kind: &str, id: impl ToString) -> Self {
        AppError::NotFound(kind.to_string(), id.to_string())
    }
}

impl From<anyhow::Error> for AppError {
    fn from(err: anyhow::Error) -> Self {
        AppError::Internal(format!("{err:#}"))
    }
}

/// A specialized Result type for solved logic.
pub type Result<T> = std::result::Result<T, AppError>;
