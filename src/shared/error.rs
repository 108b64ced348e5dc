use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SharedStateErrorKind {
    Unavailable,
    InvalidRequest,
    Internal,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SharedStateError {
    pub kind: SharedStateErrorKind,
    pub message: String,
}

impl SharedStateError {
    pub fn new(kind: SharedStateErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }
}

impl fmt::Display for SharedStateError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::error::Error for SharedStateError {}

pub fn unavailable(message: impl Into<String>) -> SharedStateError {
    SharedStateError::new(SharedStateErrorKind::Unavailable, message)
}

pub fn invalid_request(message: impl Into<String>) -> SharedStateError {
    SharedStateError::new(SharedStateErrorKind::InvalidRequest, message)
}

pub fn internal_error(message: impl Into<String>) -> SharedStateError {
    SharedStateError::new(SharedStateErrorKind::Internal, message)
}
