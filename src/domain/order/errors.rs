//! Order-specific error types.

use crate::domain::foundation::{DomainError, ErrorCode, ValidationError};

/// Errors surfaced by the order workflow.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OrderError {
    /// Input was rejected before any transaction opened.
    ValidationFailed { field: String, message: String },
    /// The entity or outbox write failed; nothing was committed.
    Persistence(String),
}

impl OrderError {
    pub fn validation(field: impl Into<String>, message: impl Into<String>) -> Self {
        OrderError::ValidationFailed {
            field: field.into(),
            message: message.into(),
        }
    }

    pub fn persistence(message: impl Into<String>) -> Self {
        OrderError::Persistence(message.into())
    }

    pub fn code(&self) -> ErrorCode {
        match self {
            OrderError::ValidationFailed { .. } => ErrorCode::ValidationFailed,
            OrderError::Persistence(_) => ErrorCode::DatabaseError,
        }
    }

    pub fn message(&self) -> String {
        match self {
            OrderError::ValidationFailed { field, message } => {
                format!("Validation failed for '{}': {}", field, message)
            }
            OrderError::Persistence(msg) => format!("Persistence failed: {}", msg),
        }
    }
}

impl std::fmt::Display for OrderError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.message())
    }
}

impl std::error::Error for OrderError {}

impl From<ValidationError> for OrderError {
    fn from(err: ValidationError) -> Self {
        OrderError::ValidationFailed {
            field: err.field().to_string(),
            message: err.to_string(),
        }
    }
}

impl From<DomainError> for OrderError {
    fn from(err: DomainError) -> Self {
        match err.code {
            ErrorCode::ValidationFailed => OrderError::ValidationFailed {
                field: err.details.get("field").cloned().unwrap_or_default(),
                message: err.message,
            },
            _ => OrderError::Persistence(err.to_string()),
        }
    }
}
