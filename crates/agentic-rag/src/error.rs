//! Error types for the RAG system

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use thiserror::Error;
use uuid::Uuid;

/// Result type alias for RAG operations
pub type Result<T> = std::result::Result<T, Error>;

/// Field name -> problem description
pub type FieldErrors = BTreeMap<String, String>;

/// Coarse error category shared by the core and the API boundary
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// Bad input shape or range. Never retried.
    InvalidArgument,
    /// Referenced conversation, chunk or document is absent
    NotFound,
    /// Store or generator timeout / connection failure. Eligible for retry.
    #[serde(rename = "transient_dependency_failure")]
    TransientDependency,
    /// Unexpected internal fault
    #[serde(rename = "service_error")]
    Service,
}

impl ErrorKind {
    /// Stable category label used in the error envelope
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::InvalidArgument => "invalid_argument",
            Self::NotFound => "not_found",
            Self::TransientDependency => "transient_dependency_failure",
            Self::Service => "service_error",
        }
    }

    /// HTTP status for the category
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::InvalidArgument => StatusCode::BAD_REQUEST,
            Self::NotFound => StatusCode::NOT_FOUND,
            Self::TransientDependency => StatusCode::SERVICE_UNAVAILABLE,
            Self::Service => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

/// RAG system errors
#[derive(Debug, Error)]
pub enum Error {
    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Input validation failed
    #[error("Invalid argument: {message}")]
    InvalidArgument {
        message: String,
        field_errors: FieldErrors,
    },

    /// Uniqueness constraint violated (e.g. duplicate embedding)
    #[error("Conflict: {0}")]
    Conflict(String),

    /// Resource not found
    #[error("{resource} with ID '{id}' not found")]
    NotFound { resource: &'static str, id: String },

    /// Operation exceeded its deadline
    #[error("Operation timed out: {0}")]
    Timeout(String),

    /// Dependency could not be reached
    #[error("Connection failed: {0}")]
    Connection(String),

    /// Generator failure that is not a transport problem
    #[error("Generation failed: {0}")]
    Generation(String),

    /// All retry attempts failed
    #[error("{operation} failed after {attempts} attempt(s): {source}")]
    RetriesExhausted {
        operation: String,
        attempts: u32,
        source: Box<Error>,
    },

    /// Caller cancelled the operation
    #[error("Operation cancelled: {0}")]
    Cancelled(String),

    /// SQLite error
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// HTTP request error
    #[error("HTTP request error: {0}")]
    Http(#[from] reqwest::Error),

    /// Internal error
    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Create a validation error without field detail
    pub fn invalid(message: impl Into<String>) -> Self {
        Self::InvalidArgument {
            message: message.into(),
            field_errors: FieldErrors::new(),
        }
    }

    /// Create a validation error for a single field
    pub fn invalid_field(field: impl Into<String>, message: impl Into<String>) -> Self {
        let message = message.into();
        let mut field_errors = FieldErrors::new();
        field_errors.insert(field.into(), message.clone());
        Self::InvalidArgument {
            message,
            field_errors,
        }
    }

    /// Create a validation error carrying several field problems
    pub fn invalid_fields(field_errors: FieldErrors) -> Self {
        Self::InvalidArgument {
            message: "Input validation failed. Please check the field errors.".to_string(),
            field_errors,
        }
    }

    /// Create a not-found error
    pub fn not_found(resource: &'static str, id: impl ToString) -> Self {
        Self::NotFound {
            resource,
            id: id.to_string(),
        }
    }

    /// Create a conflict error
    pub fn conflict(message: impl Into<String>) -> Self {
        Self::Conflict(message.into())
    }

    /// Create an internal error
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal(message.into())
    }

    /// Classify this error
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::InvalidArgument { .. } | Error::Conflict(_) | Error::Config(_) => {
                ErrorKind::InvalidArgument
            }
            Error::NotFound { .. } => ErrorKind::NotFound,
            Error::Timeout(_)
            | Error::Connection(_)
            | Error::RetriesExhausted { .. }
            | Error::Cancelled(_) => ErrorKind::TransientDependency,
            Error::Database(err) => {
                if is_busy(err) {
                    ErrorKind::TransientDependency
                } else {
                    ErrorKind::Service
                }
            }
            Error::Http(err) => {
                if err.is_timeout() || err.is_connect() {
                    ErrorKind::TransientDependency
                } else if err.status().is_some_and(|s| s.is_server_error()) {
                    ErrorKind::TransientDependency
                } else {
                    ErrorKind::Service
                }
            }
            Error::Generation(_)
            | Error::Io(_)
            | Error::Json(_)
            | Error::Internal(_) => ErrorKind::Service,
        }
    }

    /// Whether the resilient executor may try this operation again
    pub fn is_retryable(&self) -> bool {
        match self {
            Error::Cancelled(_) | Error::RetriesExhausted { .. } => false,
            other => other.kind() == ErrorKind::TransientDependency,
        }
    }

    /// Whether this failure ultimately came from a deadline
    fn is_timeout(&self) -> bool {
        match self {
            Error::Timeout(_) => true,
            Error::Http(err) => err.is_timeout(),
            Error::RetriesExhausted { source, .. } => source.is_timeout(),
            _ => false,
        }
    }

    /// HTTP status for the API boundary
    pub fn status_code(&self) -> StatusCode {
        match self {
            Error::Conflict(_) => StatusCode::CONFLICT,
            other => other.kind().status_code(),
        }
    }

    /// Message that is safe to show to end users.
    ///
    /// Transient and service failures never expose internal error text.
    pub fn user_message(&self) -> String {
        match self.kind() {
            ErrorKind::InvalidArgument => match self {
                Error::InvalidArgument { message, .. } => format!("Invalid input: {}", message),
                other => other.to_string(),
            },
            ErrorKind::NotFound => self.to_string(),
            ErrorKind::TransientDependency => {
                if self.is_timeout() {
                    "Request timed out. Please try again.".to_string()
                } else {
                    "Service temporarily unavailable. Please try again later.".to_string()
                }
            }
            ErrorKind::Service => {
                "An unexpected error occurred. Please contact support if the issue persists."
                    .to_string()
            }
        }
    }

    /// Field-level validation detail, if any
    pub fn field_errors(&self) -> Option<&FieldErrors> {
        match self {
            Error::InvalidArgument { field_errors, .. } if !field_errors.is_empty() => {
                Some(field_errors)
            }
            _ => None,
        }
    }

    /// Build the uniform error envelope
    pub fn to_envelope(&self, trace_id: Uuid) -> ErrorEnvelope {
        ErrorEnvelope {
            timestamp: Utc::now(),
            status: self.status_code().as_u16(),
            error: self.kind(),
            message: self.user_message(),
            field_errors: self.field_errors().cloned(),
            path: None,
            trace_id,
            details: None,
        }
    }
}

fn is_busy(err: &rusqlite::Error) -> bool {
    matches!(
        err.sqlite_error_code(),
        Some(rusqlite::ErrorCode::DatabaseBusy) | Some(rusqlite::ErrorCode::DatabaseLocked)
    )
}

impl From<toml::de::Error> for Error {
    fn from(err: toml::de::Error) -> Self {
        Error::Config(err.to_string())
    }
}

/// Uniform error body returned by every endpoint
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorEnvelope {
    /// When the error occurred
    pub timestamp: DateTime<Utc>,
    /// HTTP status code
    pub status: u16,
    /// Error category
    pub error: ErrorKind,
    /// User-safe message
    pub message: String,
    /// Field-level validation errors
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub field_errors: Option<FieldErrors>,
    /// Request path where the error occurred
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,
    /// Correlates the response with the server log line
    pub trace_id: Uuid,
    /// Extra context, e.g. the conversation a degraded turn belongs to
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
}

impl ErrorEnvelope {
    /// Attach the request path
    pub fn with_path(mut self, path: impl Into<String>) -> Self {
        self.path = Some(path.into());
        self
    }

    /// Attach extra context
    pub fn with_details(mut self, details: serde_json::Value) -> Self {
        self.details = Some(details);
        self
    }
}

impl IntoResponse for ErrorEnvelope {
    fn into_response(self) -> Response {
        let status =
            StatusCode::from_u16(self.status).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        (status, Json(self)).into_response()
    }
}

impl IntoResponse for Error {
    fn into_response(self) -> Response {
        let trace_id = Uuid::new_v4();
        match self.kind() {
            ErrorKind::Service => {
                tracing::error!("Request failed [trace_id={}]: {}", trace_id, self)
            }
            _ => tracing::warn!("Request rejected [trace_id={}]: {}", trace_id, self),
        }
        self.to_envelope(trace_id).into_response()
    }
}
