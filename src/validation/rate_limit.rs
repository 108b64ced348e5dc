use std::{
    collections::HashMap,
    sync::{Mutex, PoisonError},
    time::{Duration, Instant},
};

use crate::validation::{
    error::{ValidatorError, rate_limited},
    types::RateLimitConfig,
};

#[derive(Debug, Clone, Copy)]
struct Window {
    started_at: Instant,
    count: u32,
}

impl Window {
    fn expired(&self, now: Instant, length: Duration) -> bool {
        now.saturating_duration_since(self.started_at) > length
    }
}

#[derive(Debug, Default)]
struct LimiterState {
    windows: HashMap<String, Window>,
    last_sweep: Option<Instant>,
}

impl LimiterState {
    /// Drops expired windows at most once per window length, so requesters that went
    /// quiet do not accumulate.
    fn sweep(&mut self, now: Instant, length: Duration) {
        let due = self
            .last_sweep
            .is_none_or(|last| now.saturating_duration_since(last) > length);
        if !due {
            return;
        }
        self.windows.retain(|_, window| !window.expired(now, length));
        self.last_sweep = Some(now);
    }
}

/// Fixed-window request counter keyed by requester identity.
pub struct FixedWindowLimiter {
    window: Duration,
    max_requests: u32,
    state: Mutex<LimiterState>,
}

impl FixedWindowLimiter {
    pub fn new(config: &RateLimitConfig) -> Self {
        Self {
            window: Duration::from_millis(config.window_ms.max(1)),
            max_requests: config.max_requests.max(1),
            state: Mutex::new(LimiterState::default()),
        }
    }

    pub fn admit(&self, requester: &str) -> Result<(), ValidatorError> {
        self.admit_at(requester, Instant::now())
    }

    pub fn admit_at(&self, requester: &str, now: Instant) -> Result<(), ValidatorError> {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        state.sweep(now, self.window);

        let window = state.windows.entry(requester.to_string()).or_insert(Window {
            started_at: now,
            count: 0,
        });
        if window.expired(now, self.window) {
            *window = Window {
                started_at: now,
                count: 0,
            };
        }

        if window.count >= self.max_requests {
            return Err(rate_limited(format!(
                "rate limit exceeded ({} requests per {} ms)",
                self.max_requests,
                self.window.as_millis()
            )));
        }

        window.count += 1;
        Ok(())
    }

    pub fn reset(&self) {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        state.windows.clear();
        state.last_sweep = None;
    }

    pub fn active_windows(&self) -> usize {
        self.state
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .windows
            .len()
    }
}
