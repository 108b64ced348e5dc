use std::fmt;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ValidatorErrorKind {
    Format,
    Blocked,
    Schema,
    Unauthorized,
    RateLimited,
    InvalidConfig,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidatorError {
    pub kind: ValidatorErrorKind,
    pub message: String,
}

impl ValidatorError {
    pub fn new(kind: ValidatorErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }
}

impl fmt::Display for ValidatorError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::error::Error for ValidatorError {}

pub fn format_violation(message: impl Into<String>) -> ValidatorError {
    ValidatorError::new(ValidatorErrorKind::Format, message)
}

pub fn blocked(message: impl Into<String>) -> ValidatorError {
    ValidatorError::new(ValidatorErrorKind::Blocked, message)
}

pub fn schema_violation(message: impl Into<String>) -> ValidatorError {
    ValidatorError::new(ValidatorErrorKind::Schema, message)
}

pub fn unauthorized(message: impl Into<String>) -> ValidatorError {
    ValidatorError::new(ValidatorErrorKind::Unauthorized, message)
}

pub fn rate_limited(message: impl Into<String>) -> ValidatorError {
    ValidatorError::new(ValidatorErrorKind::RateLimited, message)
}

pub fn invalid_config(message: impl Into<String>) -> ValidatorError {
    ValidatorError::new(ValidatorErrorKind::InvalidConfig, message)
}
