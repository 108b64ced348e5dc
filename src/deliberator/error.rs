use std::fmt;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BackendErrorKind {
    Unavailable,
    Timeout,
    RateLimited,
    CircuitOpen,
    Cancelled,
    ProtocolViolation,
    Authentication,
    Authorization,
    InvalidRequest,
    Internal,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BackendError {
    pub kind: BackendErrorKind,
    pub message: String,
    pub retryable: bool,
    pub backend: Option<String>,
    pub http_status: Option<u16>,
}

impl BackendError {
    pub fn new(kind: BackendErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            retryable: matches!(
                kind,
                BackendErrorKind::Unavailable
                    | BackendErrorKind::Timeout
                    | BackendErrorKind::RateLimited
            ),
            backend: None,
            http_status: None,
        }
    }

    pub fn with_retryable(mut self, retryable: bool) -> Self {
        self.retryable = retryable;
        self
    }

    pub fn with_backend(mut self, backend: impl Into<String>) -> Self {
        self.backend = Some(backend.into());
        self
    }

    pub fn with_http_status(mut self, status: u16) -> Self {
        self.http_status = Some(status);
        self
    }
}

impl fmt::Display for BackendError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (&self.backend, self.http_status) {
            (Some(backend), Some(status)) => {
                write!(f, "{} (backend={}, status={})", self.message, backend, status)
            }
            (Some(backend), None) => write!(f, "{} (backend={})", self.message, backend),
            (None, Some(status)) => write!(f, "{} (status={})", self.message, status),
            (None, None) => write!(f, "{}", self.message),
        }
    }
}

impl std::error::Error for BackendError {}

pub fn unavailable(message: impl Into<String>) -> BackendError {
    BackendError::new(BackendErrorKind::Unavailable, message)
}

pub fn timeout(message: impl Into<String>) -> BackendError {
    BackendError::new(BackendErrorKind::Timeout, message)
}

pub fn cancelled(message: impl Into<String>) -> BackendError {
    BackendError::new(BackendErrorKind::Cancelled, message)
}

pub fn protocol_violation(message: impl Into<String>) -> BackendError {
    BackendError::new(BackendErrorKind::ProtocolViolation, message)
}

pub fn invalid_request(message: impl Into<String>) -> BackendError {
    BackendError::new(BackendErrorKind::InvalidRequest, message)
}

pub fn internal_error(message: impl Into<String>) -> BackendError {
    BackendError::new(BackendErrorKind::Internal, message)
}
