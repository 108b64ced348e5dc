use std::sync::atomic::{AtomicU64, Ordering};

use validator::Validate;

use crate::{
    types::Request,
    validation::{
        authorization::Authorizer,
        error::{ValidatorError, invalid_config},
        rate_limit::FixedWindowLimiter,
        rules::FormatRules,
        types::{ValidatorConfig, ValidatorStats},
    },
};

/// Layer 0. Deterministic and free: format, then authorization, then rate limit.
///
/// Only requests that clear the first two checks consume rate quota.
pub struct Validator {
    rules: FormatRules,
    authorizer: Authorizer,
    limiter: FixedWindowLimiter,
    validations: AtomicU64,
    rejections: AtomicU64,
}

impl Validator {
    pub fn new(config: &ValidatorConfig) -> Result<Self, ValidatorError> {
        config
            .validate()
            .map_err(|err| invalid_config(format!("invalid validator config: {err}")))?;

        Ok(Self {
            rules: FormatRules::new(config)?,
            authorizer: Authorizer::new(&config.authorization),
            limiter: FixedWindowLimiter::new(&config.rate_limit),
            validations: AtomicU64::new(0),
            rejections: AtomicU64::new(0),
        })
    }

    pub fn validate(&self, request: &Request) -> Result<(), ValidatorError> {
        self.validations.fetch_add(1, Ordering::Relaxed);
        let result = self
            .rules
            .check(request)
            .and_then(|()| self.authorizer.check(&request.requester))
            .and_then(|()| self.limiter.admit(&request.requester));

        if let Err(err) = &result {
            self.rejections.fetch_add(1, Ordering::Relaxed);
            tracing::debug!(
                target: "validator",
                request_id = %request.request_id,
                requester = %request.requester,
                kind = ?err.kind,
                reason = %err,
                "request_rejected"
            );
        }
        result
    }

    pub fn add_to_blocklist(&self, term: &str) -> Result<bool, ValidatorError> {
        let added = self.rules.add_term(term)?;
        tracing::info!(target: "validator", term = %term, added, "blocklist_term_added");
        Ok(added)
    }

    pub fn remove_from_blocklist(&self, term: &str) -> bool {
        let removed = self.rules.remove_term(term);
        tracing::info!(target: "validator", term = %term, removed, "blocklist_term_removed");
        removed
    }

    pub fn reset_rate_limits(&self) {
        self.limiter.reset();
    }

    pub fn stats(&self) -> ValidatorStats {
        ValidatorStats {
            validations: self.validations.load(Ordering::Relaxed),
            rejections: self.rejections.load(Ordering::Relaxed),
            blocklist_size: self.rules.blocklist_size(),
            active_rate_limits: self.limiter.active_windows(),
        }
    }
}
