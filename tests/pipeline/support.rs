use std::{
    sync::{
        Arc,
        atomic::{AtomicUsize, Ordering},
    },
    time::Duration,
};

use async_trait::async_trait;
use spl::{
    deliberator::{
        Deliberator, DeliberatorConfig, ReasoningBackend, ReasoningQuery, Resolution,
        error::{BackendError, unavailable},
        reliability::ReliabilityConfig,
    },
    orchestrator::{Agent, AgentSettings},
    shared::{InMemorySharedState, SharedStateBackend},
    validation::{
        Validator,
        types::{RateLimitConfig, ValidatorConfig},
    },
};

pub enum Script {
    Answer { category: &'static str, confidence: f64 },
    Hang(Duration),
    Fail,
}

/// Backend that answers from a fixed script and counts its calls.
pub struct ScriptedBackend {
    script: Script,
    calls: AtomicUsize,
}

impl ScriptedBackend {
    pub fn answering(category: &'static str, confidence: f64) -> Arc<Self> {
        Arc::new(Self {
            script: Script::Answer {
                category,
                confidence,
            },
            calls: AtomicUsize::new(0),
        })
    }

    pub fn hanging(delay: Duration) -> Arc<Self> {
        Arc::new(Self {
            script: Script::Hang(delay),
            calls: AtomicUsize::new(0),
        })
    }

    pub fn failing() -> Arc<Self> {
        Arc::new(Self {
            script: Script::Fail,
            calls: AtomicUsize::new(0),
        })
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ReasoningBackend for ScriptedBackend {
    fn name(&self) -> &str {
        "scripted"
    }

    async fn resolve(&self, _query: ReasoningQuery) -> Result<Resolution, BackendError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        match &self.script {
            Script::Answer {
                category,
                confidence,
            } => Ok(Resolution {
                category: category.to_string(),
                confidence: *confidence,
                rationale: None,
                model: Some("scripted-v1".to_string()),
            }),
            Script::Hang(delay) => {
                tokio::time::sleep(*delay).await;
                Err(unavailable("woke up too late"))
            }
            Script::Fail => Err(unavailable("backend is down")),
        }
    }
}

pub fn validator_config() -> ValidatorConfig {
    ValidatorConfig {
        rate_limit: RateLimitConfig {
            window_ms: 60_000,
            max_requests: 100_000,
        },
        ..ValidatorConfig::default()
    }
}

/// Short timeout and no retries so failure paths stay fast.
pub fn deliberator_config() -> DeliberatorConfig {
    DeliberatorConfig {
        request_timeout_ms: 30,
        reliability: ReliabilityConfig {
            max_retries: 0,
            breaker_failure_threshold: 1_000,
            ..ReliabilityConfig::default()
        },
        ..DeliberatorConfig::default()
    }
}

pub fn agent_with(
    id: &str,
    backend: Arc<dyn ReasoningBackend>,
    settings: AgentSettings,
    shared: Arc<dyn SharedStateBackend>,
) -> Agent {
    let validator = Validator::new(&validator_config()).expect("validator config is valid");
    let deliberator = Deliberator::new(backend, deliberator_config());
    Agent::new(id, settings, validator, deliberator, shared)
}

pub fn agent(backend: Arc<dyn ReasoningBackend>) -> Agent {
    agent_with(
        "agent-1",
        backend,
        AgentSettings::default(),
        Arc::new(InMemorySharedState::new()),
    )
}
