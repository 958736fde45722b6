//! Core error types for the Reelvault domain
//!
//! The variants form a stable taxonomy: every failure the core surfaces is
//! one of these kinds regardless of which subsystem produced it. Adapters
//! map their native errors into `Transient`/`Permanent`; the storage layer
//! maps driver errors into `NotFound`/`AlreadyExists`/`InvalidReference`.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum ReelvaultError {
    #[error("Validation error: {field} - {message}")]
    Validation { field: String, message: String },

    #[error("Not found: {resource}")]
    NotFound { resource: String },

    #[error("Already exists: {resource}")]
    AlreadyExists { resource: String },

    #[error("Conflict: {message}")]
    Conflict { message: String },

    #[error("Invalid reference: {field} - {message}")]
    InvalidReference { field: String, message: String },

    #[error("Permission denied: {path} - {message}")]
    PermissionDenied { path: String, message: String },

    #[error("Transient error from {service}: {message}")]
    Transient { service: String, message: String },

    #[error("Permanent error from {service}: {message}")]
    Permanent { service: String, message: String },

    #[error("Operation cancelled: {operation}")]
    Cancelled { operation: String },

    #[error("Retry budget exhausted for {operation} after {attempts} attempts: {last_error}")]
    RetryExhausted {
        operation: String,
        attempts: u32,
        last_error: Box<ReelvaultError>,
    },

    #[error("Internal error: {message}")]
    Internal { message: String },
}

impl ReelvaultError {
    /// Whether a retry with backoff may succeed.
    pub fn is_transient(&self) -> bool {
        matches!(self, ReelvaultError::Transient { .. })
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self, ReelvaultError::Cancelled { .. })
    }

    pub fn not_found(resource: impl Into<String>) -> Self {
        ReelvaultError::NotFound {
            resource: resource.into(),
        }
    }

    pub fn validation(field: impl Into<String>, message: impl Into<String>) -> Self {
        ReelvaultError::Validation {
            field: field.into(),
            message: message.into(),
        }
    }

    pub fn internal(message: impl Into<String>) -> Self {
        ReelvaultError::Internal {
            message: message.into(),
        }
    }
}

pub type Result<T> = std::result::Result<T, ReelvaultError>;

#[cfg(feature = "postgres")]
impl From<sqlx::Error> for ReelvaultError {
    fn from(err: sqlx::Error) -> Self {
        match &err {
            sqlx::Error::RowNotFound => ReelvaultError::NotFound {
                resource: "row".to_string(),
            },
            sqlx::Error::Database(db) if db.is_unique_violation() => {
                ReelvaultError::AlreadyExists {
                    resource: db.constraint().unwrap_or("unique constraint").to_string(),
                }
            }
            sqlx::Error::Database(db) if db.is_foreign_key_violation() => {
                ReelvaultError::InvalidReference {
                    field: db.constraint().unwrap_or("foreign key").to_string(),
                    message: db.message().to_string(),
                }
            }
            sqlx::Error::Io(_) | sqlx::Error::PoolTimedOut | sqlx::Error::PoolClosed => {
                ReelvaultError::Transient {
                    service: "database".to_string(),
                    message: err.to_string(),
                }
            }
            _ => ReelvaultError::Internal {
                message: format!("database: {}", err),
            },
        }
    }
}
