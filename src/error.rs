//! Error types for the engine and its drivers
//!
//! Errors are classified by how the caller should react:
//! - Validation / NotFound / Conflict: reported to the user, never retried
//! - TransientDelivery: retried by the notification sender, then surfaced in
//!   the driver's run summary
//! - Configuration / Database: operator problems

use thiserror::Error;

use crate::db::DbError;

/// Error type shared by the core components, services, and drivers.
#[derive(Debug, Error)]
pub enum AppError {
    #[error("Validation error: {0}")]
    Validation(String),

    #[error("{entity} not found: {id}")]
    NotFound { entity: &'static str, id: String },

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Notification delivery failed after {attempts} attempt(s): {message}")]
    TransientDelivery { attempts: u32, message: String },

    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Database error: {0}")]
    Database(#[from] DbError),
}

impl AppError {
    pub fn validation(message: impl Into<String>) -> Self {
        AppError::Validation(message.into())
    }

    pub fn not_found(entity: &'static str, id: impl ToString) -> Self {
        AppError::NotFound {
            entity,
            id: id.to_string(),
        }
    }

    pub fn conflict(message: impl Into<String>) -> Self {
        AppError::Conflict(message.into())
    }

    /// Returns true if this error is retryable
    pub fn is_retryable(&self) -> bool {
        matches!(self, AppError::TransientDelivery { .. })
    }

    /// HTTP-equivalent status code an adapter should answer with.
    pub fn status_code(&self) -> u16 {
        match self {
            AppError::Validation(_) => 400,
            AppError::NotFound { .. } => 404,
            AppError::Conflict(_) => 409,
            AppError::TransientDelivery { .. } => 502,
            AppError::Configuration(_) | AppError::Database(_) => 500,
        }
    }

    fn error_type(&self) -> ErrorType {
        match self {
            AppError::Validation(_) => ErrorType::Validation,
            AppError::NotFound { .. } => ErrorType::NotFound,
            AppError::Conflict(_) => ErrorType::Conflict,
            AppError::TransientDelivery { .. } => ErrorType::TransientDelivery,
            AppError::Configuration(_) | AppError::Database(_) => ErrorType::Internal,
        }
    }
}

impl From<rusqlite::Error> for AppError {
    fn from(err: rusqlite::Error) -> Self {
        AppError::Database(DbError::Sqlite(err))
    }
}

/// Serializable error representation for adapters
#[derive(Debug, Clone, serde::Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorResponse {
    pub message: String,
    pub error_type: ErrorType,
    pub status: u16,
    pub can_retry: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorType {
    Validation,
    NotFound,
    Conflict,
    TransientDelivery,
    Internal,
}

impl From<&AppError> for ErrorResponse {
    fn from(err: &AppError) -> Self {
        ErrorResponse {
            message: err.to_string(),
            error_type: err.error_type(),
            status: err.status_code(),
            can_retry: err.is_retryable(),
        }
    }
}
