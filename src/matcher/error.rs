use std::fmt;

use crate::shared::error::SharedStateError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MatcherErrorKind {
    InvalidPredicate,
    InvalidRequest,
    SharedStateUnavailable,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MatcherError {
    pub kind: MatcherErrorKind,
    pub message: String,
}

impl MatcherError {
    pub fn new(kind: MatcherErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }
}

impl fmt::Display for MatcherError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::error::Error for MatcherError {}

impl From<SharedStateError> for MatcherError {
    fn from(err: SharedStateError) -> Self {
        shared_state_unavailable(format!("shared state error: {err}"))
    }
}

pub fn invalid_predicate(message: impl Into<String>) -> MatcherError {
    MatcherError::new(MatcherErrorKind::InvalidPredicate, message)
}

pub fn invalid_request(message: impl Into<String>) -> MatcherError {
    MatcherError::new(MatcherErrorKind::InvalidRequest, message)
}

pub fn shared_state_unavailable(message: impl Into<String>) -> MatcherError {
    MatcherError::new(MatcherErrorKind::SharedStateUnavailable, message)
}
