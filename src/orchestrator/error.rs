use std::fmt;

use crate::{
    deliberator::error::BackendError, matcher::error::MatcherError,
    shared::error::SharedStateError, validation::error::ValidatorError,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OrchestratorErrorKind {
    InvalidConfig,
    DuplicateAgent,
    UnknownAgent,
    SharedState,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrchestratorError {
    pub kind: OrchestratorErrorKind,
    pub message: String,
}

impl OrchestratorError {
    pub fn new(kind: OrchestratorErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }
}

impl fmt::Display for OrchestratorError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::error::Error for OrchestratorError {}

impl From<SharedStateError> for OrchestratorError {
    fn from(err: SharedStateError) -> Self {
        OrchestratorError::new(OrchestratorErrorKind::SharedState, err.message)
    }
}

impl From<ValidatorError> for OrchestratorError {
    fn from(err: ValidatorError) -> Self {
        invalid_config(format!("validator: {err}"))
    }
}

impl From<MatcherError> for OrchestratorError {
    fn from(err: MatcherError) -> Self {
        invalid_config(format!("pattern: {err}"))
    }
}

impl From<BackendError> for OrchestratorError {
    fn from(err: BackendError) -> Self {
        invalid_config(format!("backend: {err}"))
    }
}

pub fn invalid_config(message: impl Into<String>) -> OrchestratorError {
    OrchestratorError::new(OrchestratorErrorKind::InvalidConfig, message)
}

pub fn duplicate_agent(agent_id: &str) -> OrchestratorError {
    OrchestratorError::new(
        OrchestratorErrorKind::DuplicateAgent,
        format!("agent '{agent_id}' already exists"),
    )
}

pub fn unknown_agent(agent_id: &str) -> OrchestratorError {
    OrchestratorError::new(
        OrchestratorErrorKind::UnknownAgent,
        format!("agent '{agent_id}' does not exist"),
    )
}
