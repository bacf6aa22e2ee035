//! crates/socrates_core/src/error.rs
//!
//! The error taxonomy of the lifecycle engine. Every failure carries a stable
//! kind tag plus a human-readable detail.

use std::time::Duration;

use crate::ports::PortError;

/// Stable, machine-readable error kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Validation,
    Timeout,
    Service,
    ProtocolViolation,
    InsufficientContent,
    NotFound,
    Storage,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::Validation => "validation_error",
            ErrorKind::Timeout => "timeout",
            ErrorKind::Service => "service_error",
            ErrorKind::ProtocolViolation => "protocol_violation",
            ErrorKind::InsufficientContent => "insufficient_content",
            ErrorKind::NotFound => "not_found",
            ErrorKind::Storage => "storage_error",
        }
    }
}

/// The primary error type of the core crate.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum CoreError {
    /// Bad input, rejected before any state is created.
    #[error("Validation error: {0}")]
    Validation(String),

    /// An external call did not answer within its ceiling.
    #[error("Timed out after {0:?}")]
    Timeout(Duration),

    /// A recognition, classification or tutor backend failed or was unreachable.
    #[error("Service error: {0}")]
    Service(String),

    /// Tutoring turn order was broken.
    #[error("Protocol violation: {0}")]
    ProtocolViolation(String),

    /// Finalize was attempted before the student said anything.
    #[error("Insufficient content: {0}")]
    InsufficientContent(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Storage error: {0}")]
    Storage(String),
}

impl CoreError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            CoreError::Validation(_) => ErrorKind::Validation,
            CoreError::Timeout(_) => ErrorKind::Timeout,
            CoreError::Service(_) => ErrorKind::Service,
            CoreError::ProtocolViolation(_) => ErrorKind::ProtocolViolation,
            CoreError::InsufficientContent(_) => ErrorKind::InsufficientContent,
            CoreError::NotFound(_) => ErrorKind::NotFound,
            CoreError::Storage(_) => ErrorKind::Storage,
        }
    }

    /// Whether the caller may retry by re-submitting. The core never retries on its own.
    pub fn is_retryable(&self) -> bool {
        matches!(self, CoreError::Timeout(_) | CoreError::Service(_))
    }

    /// Maps a collaborator failure on one of the AI services.
    pub fn from_service(err: PortError) -> Self {
        match err {
            PortError::NotFound(msg) => CoreError::NotFound(msg),
            other => CoreError::Service(other.to_string()),
        }
    }
}

/// Port failures surfacing from the record store.
impl From<PortError> for CoreError {
    fn from(err: PortError) -> Self {
        match err {
            PortError::NotFound(msg) => CoreError::NotFound(msg),
            PortError::Unexpected(msg) => CoreError::Storage(msg),
            PortError::Unavailable(msg) => CoreError::Storage(msg),
        }
    }
}

/// A convenience type alias for `Result<T, CoreError>`.
pub type CoreResult<T> = Result<T, CoreError>;
