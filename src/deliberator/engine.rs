use std::{sync::Arc, time::Duration};

use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;
use validator::Validate;

use crate::{
    deliberator::{
        backend::{ReasoningBackend, ReasoningQuery, Resolution},
        error::{BackendError, cancelled, protocol_violation, timeout},
        learning::{PatternCandidate, derive_candidate},
        reliability::{BreakerStatus, Reliability, ReliabilityConfig},
    },
    types::{Confidence, Request},
};

fn default_request_timeout_ms() -> u64 {
    5_000
}

fn default_learning_threshold() -> Confidence {
    Confidence::constant(0.90)
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct DeliberatorConfig {
    #[serde(default = "default_request_timeout_ms")]
    #[validate(range(min = 1))]
    pub request_timeout_ms: u64,
    #[serde(default = "default_learning_threshold")]
    pub learning_threshold: Confidence,
    #[serde(default)]
    #[validate(nested)]
    pub reliability: ReliabilityConfig,
}

impl Default for DeliberatorConfig {
    fn default() -> Self {
        Self {
            request_timeout_ms: default_request_timeout_ms(),
            learning_threshold: default_learning_threshold(),
            reliability: ReliabilityConfig::default(),
        }
    }
}

/// A backend answer that passed protocol checks.
#[derive(Debug, Clone, PartialEq)]
pub struct Deliberation {
    pub category: String,
    pub confidence: Confidence,
    pub rationale: Option<String>,
    pub model: Option<String>,
    pub attempts: u32,
    pub candidate: Option<PatternCandidate>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct DeliberationFailure {
    pub error: BackendError,
    /// Number of backend calls made. Zero when the breaker or cancellation short-circuited.
    pub attempts: u32,
}

impl DeliberationFailure {
    pub fn backend_invoked(&self) -> bool {
        self.attempts > 0
    }
}

/// Layer 2: bounded, retried calls into the reasoning backend.
pub struct Deliberator {
    backend: Arc<dyn ReasoningBackend>,
    reliability: Reliability,
    request_timeout: Duration,
    learning_threshold: Confidence,
}

impl Deliberator {
    pub fn new(backend: Arc<dyn ReasoningBackend>, config: DeliberatorConfig) -> Self {
        Self {
            backend,
            request_timeout: Duration::from_millis(config.request_timeout_ms.max(1)),
            learning_threshold: config.learning_threshold,
            reliability: Reliability::new(config.reliability),
        }
    }

    pub fn backend_name(&self) -> &str {
        self.backend.name()
    }

    pub async fn breaker_status(&self) -> BreakerStatus {
        self.reliability.status().await
    }

    #[tracing::instrument(
        name = "deliberate",
        target = "deliberator",
        skip(self, request, cancel),
        fields(request_id = %request.request_id, backend = %self.backend.name())
    )]
    pub async fn deliberate(
        &self,
        request: &Request,
        cancel: &CancellationToken,
    ) -> Result<Deliberation, DeliberationFailure> {
        let backend_name = self.backend.name().to_string();
        let mut attempts: u32 = 0;

        loop {
            if cancel.is_cancelled() {
                return Err(DeliberationFailure {
                    error: cancelled("deliberation cancelled").with_backend(&backend_name),
                    attempts,
                });
            }
            if let Err(error) = self.reliability.ensure_allowed(&backend_name).await {
                return Err(DeliberationFailure { error, attempts });
            }

            let query = ReasoningQuery {
                request_id: request.request_id.clone(),
                content: request.content.clone(),
                context: request.context.clone(),
            };
            attempts += 1;
            let result = tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    Err(cancelled("deliberation cancelled").with_backend(&backend_name))
                }
                outcome = tokio::time::timeout(self.request_timeout, self.backend.resolve(query)) => {
                    match outcome {
                        Ok(result) => result,
                        Err(_) => Err(timeout(format!(
                            "backend did not answer within {} ms",
                            self.request_timeout.as_millis()
                        ))
                        .with_backend(&backend_name)),
                    }
                }
            };

            let error = match result.and_then(|resolution| self.check(resolution, &backend_name)) {
                Ok(mut deliberation) => {
                    self.reliability.record_success().await;
                    deliberation.attempts = attempts;
                    tracing::debug!(
                        target: "deliberator",
                        request_id = %request.request_id,
                        category = %deliberation.category,
                        confidence = deliberation.confidence.value(),
                        attempts,
                        "backend_resolved"
                    );
                    if deliberation.confidence >= self.learning_threshold {
                        deliberation.candidate = derive_candidate(
                            &request.content,
                            &deliberation.category,
                            deliberation.confidence,
                        );
                    }
                    return Ok(deliberation);
                }
                Err(error) => error,
            };

            self.reliability
                .record_failure(Reliability::counts_toward_breaker(&error))
                .await;
            if cancel.is_cancelled() || !self.reliability.can_retry(&error, attempts - 1) {
                tracing::warn!(
                    target: "deliberator",
                    request_id = %request.request_id,
                    kind = ?error.kind,
                    error = %error,
                    attempts,
                    "backend_failed"
                );
                return Err(DeliberationFailure { error, attempts });
            }

            let delay = self.reliability.backoff_delay(attempts - 1);
            tracing::warn!(
                target: "deliberator",
                request_id = %request.request_id,
                kind = ?error.kind,
                error = %error,
                attempt = attempts,
                delay_ms = delay.as_millis() as u64,
                "backend_retry_scheduled"
            );
            tokio::select! {
                _ = cancel.cancelled() => {}
                _ = tokio::time::sleep(delay) => {}
            }
        }
    }

    fn check(&self, resolution: Resolution, backend: &str) -> Result<Deliberation, BackendError> {
        let category = resolution.category.trim();
        if category.is_empty() {
            return Err(protocol_violation("backend returned an empty category").with_backend(backend));
        }
        let confidence = Confidence::new(resolution.confidence).ok_or_else(|| {
            protocol_violation(format!(
                "backend returned confidence {} outside [0, 1]",
                resolution.confidence
            ))
            .with_backend(backend)
        })?;

        Ok(Deliberation {
            category: category.to_string(),
            confidence,
            rationale: resolution.rationale,
            model: resolution.model,
            attempts: 0,
            candidate: None,
        })
    }
}
