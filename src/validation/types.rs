use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use validator::{Validate, ValidationError};

use crate::types::RequesterId;

fn default_min_length() -> usize {
    5
}

fn default_max_length() -> usize {
    1000
}

fn default_window_ms() -> u64 {
    60_000
}

fn default_max_requests() -> u32 {
    100
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
#[validate(schema(function = "validate_length_bounds"))]
pub struct ValidatorConfig {
    #[serde(default = "default_min_length")]
    pub min_length: usize,
    #[serde(default = "default_max_length")]
    #[validate(range(min = 1))]
    pub max_length: usize,
    #[serde(default)]
    pub blocklist: Vec<String>,
    /// JSON schema applied to `{requester, content, context}`.
    #[serde(default)]
    pub envelope_schema: Option<Value>,
    #[serde(default)]
    pub authorization: AuthorizationConfig,
    #[serde(default)]
    #[validate(nested)]
    pub rate_limit: RateLimitConfig,
}

impl Default for ValidatorConfig {
    fn default() -> Self {
        Self {
            min_length: default_min_length(),
            max_length: default_max_length(),
            blocklist: Vec::new(),
            envelope_schema: None,
            authorization: AuthorizationConfig::default(),
            rate_limit: RateLimitConfig::default(),
        }
    }
}

fn validate_length_bounds(config: &ValidatorConfig) -> Result<(), ValidationError> {
    if config.min_length > config.max_length {
        let mut err = ValidationError::new("length_bounds");
        err.message = Some(
            format!(
                "min_length ({}) must not exceed max_length ({})",
                config.min_length, config.max_length
            )
            .into(),
        );
        return Err(err);
    }
    Ok(())
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct RateLimitConfig {
    #[serde(default = "default_window_ms")]
    #[validate(range(min = 1))]
    pub window_ms: u64,
    #[serde(default = "default_max_requests")]
    #[validate(range(min = 1))]
    pub max_requests: u32,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            window_ms: default_window_ms(),
            max_requests: default_max_requests(),
        }
    }
}

/// Capability grants keyed by requester identity. Grants under `*` apply to everyone.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AuthorizationConfig {
    #[serde(default)]
    pub required_capability: Option<String>,
    #[serde(default)]
    pub grants: BTreeMap<RequesterId, Vec<String>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidatorStats {
    pub validations: u64,
    pub rejections: u64,
    pub blocklist_size: usize,
    pub active_rate_limits: usize,
}
