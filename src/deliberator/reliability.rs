use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use validator::Validate;

use crate::deliberator::error::{BackendError, BackendErrorKind};

fn default_max_retries() -> u32 {
    2
}

fn default_backoff_base_ms() -> u64 {
    100
}

fn default_backoff_max_ms() -> u64 {
    2_000
}

fn default_breaker_failure_threshold() -> u32 {
    3
}

fn default_breaker_open_ms() -> u64 {
    30_000
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct ReliabilityConfig {
    #[serde(default = "default_max_retries")]
    #[validate(range(max = 10))]
    pub max_retries: u32,
    #[serde(default = "default_backoff_base_ms")]
    #[validate(range(min = 1))]
    pub backoff_base_ms: u64,
    #[serde(default = "default_backoff_max_ms")]
    #[validate(range(min = 1))]
    pub backoff_max_ms: u64,
    #[serde(default = "default_breaker_failure_threshold")]
    #[validate(range(min = 1))]
    pub breaker_failure_threshold: u32,
    #[serde(default = "default_breaker_open_ms")]
    #[validate(range(min = 1))]
    pub breaker_open_ms: u64,
}

impl Default for ReliabilityConfig {
    fn default() -> Self {
        Self {
            max_retries: default_max_retries(),
            backoff_base_ms: default_backoff_base_ms(),
            backoff_max_ms: default_backoff_max_ms(),
            breaker_failure_threshold: default_breaker_failure_threshold(),
            breaker_open_ms: default_breaker_open_ms(),
        }
    }
}

#[derive(Debug, Clone, Default)]
struct BreakerState {
    failure_streak: u32,
    open_until: Option<Instant>,
    probe_in_flight: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum BreakerStatus {
    Closed,
    Open,
    HalfOpen,
}

/// Retry policy and circuit breaker guarding one reasoning backend.
pub struct Reliability {
    config: ReliabilityConfig,
    breaker: Mutex<BreakerState>,
}

impl Reliability {
    pub fn new(config: ReliabilityConfig) -> Self {
        Self {
            config,
            breaker: Mutex::new(BreakerState::default()),
        }
    }

    pub fn config(&self) -> &ReliabilityConfig {
        &self.config
    }

    /// After the cool-down a single probe call is let through; the rest fail fast.
    pub async fn ensure_allowed(&self, backend: &str) -> Result<(), BackendError> {
        let now = Instant::now();
        let mut state = self.breaker.lock().await;

        if let Some(open_until) = state.open_until {
            if now < open_until {
                return Err(BackendError::new(
                    BackendErrorKind::CircuitOpen,
                    format!("circuit breaker is open for backend '{backend}'"),
                )
                .with_retryable(false)
                .with_backend(backend));
            }

            if state.probe_in_flight {
                return Err(BackendError::new(
                    BackendErrorKind::CircuitOpen,
                    format!("circuit probe is already in-flight for backend '{backend}'"),
                )
                .with_retryable(false)
                .with_backend(backend));
            }

            state.probe_in_flight = true;
        }

        Ok(())
    }

    pub async fn record_success(&self) {
        let mut state = self.breaker.lock().await;
        *state = BreakerState::default();
    }

    pub async fn record_failure(&self, count_toward_breaker: bool) {
        let mut state = self.breaker.lock().await;
        state.probe_in_flight = false;
        if !count_toward_breaker {
            return;
        }

        state.failure_streak = state.failure_streak.saturating_add(1);
        if state.failure_streak >= self.config.breaker_failure_threshold.max(1) {
            state.open_until =
                Some(Instant::now() + Duration::from_millis(self.config.breaker_open_ms.max(1)));
        }
    }

    pub async fn status(&self) -> BreakerStatus {
        let state = self.breaker.lock().await;
        match state.open_until {
            None => BreakerStatus::Closed,
            Some(open_until) if Instant::now() < open_until => BreakerStatus::Open,
            Some(_) => BreakerStatus::HalfOpen,
        }
    }

    pub fn backoff_delay(&self, attempt: u32) -> Duration {
        let base = self.config.backoff_base_ms.max(1) as f64;
        let max = self.config.backoff_max_ms.max(1) as f64;
        let exp = attempt.min(16) as i32;
        let without_jitter = (base * 2f64.powi(exp)).min(max);
        let jitter_factor = 0.9 + (attempt as f64 % 3.0) * 0.05;
        Duration::from_millis((without_jitter * jitter_factor) as u64)
    }

    /// `attempt` is zero-based: the first call is attempt 0.
    pub fn can_retry(&self, err: &BackendError, attempt: u32) -> bool {
        err.retryable && attempt < self.config.max_retries
    }

    pub fn counts_toward_breaker(err: &BackendError) -> bool {
        matches!(
            err.kind,
            BackendErrorKind::Unavailable | BackendErrorKind::Timeout | BackendErrorKind::RateLimited
        )
    }
}
