use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;

use crate::{
    deliberator::{
        Deliberation, DeliberationFailure, Deliberator, learning::PatternCandidate,
        reliability::BreakerStatus,
    },
    matcher::{
        MatchOutcome, PatternMatcher, Registration, RegistrationStatus,
        cache::CachedResolution,
        engine::{MatcherStats, PatternListing},
        error::{MatcherError, invalid_request},
    },
    observability::metrics,
    orchestrator::tracker::{CostRecord, CostSummary, CostTracker},
    shared::{
        error::SharedStateError,
        ports::SharedStateBackend,
        types::{
            PatternDraft, Provenance, SuppressionFlag, UpsertPolicy, ViolationKind,
            ViolationRecord,
        },
    },
    types::{AgentId, Confidence, Cost, CostTable, Decision, Layer, Method, Outcome, Request},
    validation::{Validator, error::ValidatorError, types::ValidatorStats},
};

/// Answer used when Layer 2 cannot produce one.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FallbackPolicy {
    pub category: String,
    pub confidence: Confidence,
}

#[derive(Debug, Clone, PartialEq)]
pub struct AgentSettings {
    pub confidence_threshold: Confidence,
    pub costs: CostTable,
    pub cache_capacity: usize,
    pub fallback: Option<FallbackPolicy>,
    /// Layer 2 spend allowed before the agent suppresses its own backend calls.
    pub layer2_budget: Option<Cost>,
}

impl Default for AgentSettings {
    fn default() -> Self {
        Self {
            confidence_threshold: Confidence::constant(0.85),
            costs: CostTable::default(),
            cache_capacity: 1024,
            fallback: None,
            layer2_budget: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AgentReport {
    pub agent_id: AgentId,
    #[serde(flatten)]
    pub costs: CostSummary,
    pub pattern_count: usize,
    pub patterns_learned: u64,
    pub cache_size: usize,
    pub layer2_suppressed: bool,
    pub suppression: Option<SuppressionFlag>,
    pub layer2_spend: Cost,
    pub backend: String,
    pub breaker: BreakerStatus,
    pub validator: ValidatorStats,
    pub matcher: MatcherStats,
}

struct AgentState {
    tracker: CostTracker,
    patterns_learned: u64,
    layer2_spend: Cost,
    budget_tripped: bool,
}

/// One orchestrator instance. `process` calls are serialized; a request runs to
/// completion before the next one starts.
pub struct Agent {
    id: AgentId,
    settings: AgentSettings,
    validator: Validator,
    matcher: PatternMatcher,
    deliberator: Deliberator,
    shared: Arc<dyn SharedStateBackend>,
    state: Mutex<AgentState>,
    shutdown: CancellationToken,
}

impl Agent {
    pub fn new(
        id: impl Into<AgentId>,
        settings: AgentSettings,
        validator: Validator,
        deliberator: Deliberator,
        shared: Arc<dyn SharedStateBackend>,
    ) -> Self {
        let id = id.into();
        let matcher = PatternMatcher::new(
            id.clone(),
            settings.confidence_threshold,
            settings.cache_capacity,
            Arc::clone(&shared),
        );
        let state = AgentState {
            tracker: CostTracker::new(settings.costs.layer2),
            patterns_learned: 0,
            layer2_spend: Cost::ZERO,
            budget_tripped: false,
        };

        Self {
            id,
            settings,
            validator,
            matcher,
            deliberator,
            shared,
            state: Mutex::new(state),
            shutdown: CancellationToken::new(),
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn settings(&self) -> &AgentSettings {
        &self.settings
    }

    #[tracing::instrument(
        name = "agent_process",
        target = "orchestrator",
        skip(self, request),
        fields(agent_id = %self.id, request_id = %request.request_id)
    )]
    pub async fn process(&self, request: &Request) -> Decision {
        let mut state = self.state.lock().await;
        let decision = self.decide(request, &mut state).await;

        state.tracker.record(CostRecord::from_decision(&decision));
        metrics::record_decision(&self.id, &decision);
        tracing::info!(
            target: "orchestrator",
            agent_id = %self.id,
            request_id = %decision.request_id,
            layer = decision.layer.index(),
            method = %decision.method,
            cost_micros = decision.cost.micros(),
            confidence = decision.confidence.value(),
            category = decision.category().unwrap_or("-"),
            "request_decided"
        );
        decision
    }

    async fn decide(&self, request: &Request, state: &mut AgentState) -> Decision {
        if let Err(err) = self.validator.validate(request) {
            return self.decision(
                request,
                Outcome::Rejected {
                    reason: err.to_string(),
                },
                Method::ValidationFail,
                false,
                Confidence::ONE,
            );
        }

        match self.matcher.lookup(&request.content).await {
            MatchOutcome::Cache(resolution) => {
                let mut decision = self.decision(
                    request,
                    Outcome::Category {
                        category: resolution.category,
                    },
                    Method::Cache,
                    false,
                    resolution.confidence,
                );
                decision.pattern = resolution.pattern;
                return decision;
            }
            MatchOutcome::Pattern(pattern) => {
                let mut decision = self.decision(
                    request,
                    Outcome::Category {
                        category: pattern.category.clone(),
                    },
                    Method::Pattern,
                    false,
                    pattern.confidence,
                );
                decision.pattern = Some(pattern.name.clone());
                return decision;
            }
            MatchOutcome::NoMatch { best } => {
                if let Some(best) = best {
                    tracing::debug!(
                        target: "orchestrator",
                        agent_id = %self.id,
                        pattern = %best.name,
                        confidence = best.confidence.value(),
                        "pattern_below_threshold"
                    );
                }
            }
        }

        if let Some(flag) = self.current_suppression().await {
            return self.degrade(
                request,
                format!("layer 2 suppressed ({}): {}", flag.kind, flag.reason),
                false,
            );
        }

        let decision = match self.deliberator.deliberate(request, &self.shutdown).await {
            Ok(deliberation) => self.resolved(request, deliberation, state).await,
            Err(failure) => self.failed(request, failure),
        };

        if decision.layer == Layer::Deliberative && decision.cost > Cost::ZERO {
            state.layer2_spend = state.layer2_spend.saturating_add(decision.cost);
            self.enforce_budget(state).await;
        }
        decision
    }

    async fn resolved(
        &self,
        request: &Request,
        deliberation: Deliberation,
        state: &mut AgentState,
    ) -> Decision {
        if deliberation.confidence >= self.settings.confidence_threshold {
            self.matcher.remember(
                &request.content,
                CachedResolution {
                    category: deliberation.category.clone(),
                    confidence: deliberation.confidence,
                    pattern: None,
                },
            );
        }

        let learned_pattern = match deliberation.candidate {
            Some(candidate) => self.propose(candidate, state).await,
            None => None,
        };

        let mut decision = self.decision(
            request,
            Outcome::Category {
                category: deliberation.category,
            },
            Method::Reasoning,
            true,
            deliberation.confidence,
        );
        decision.learned_pattern = learned_pattern;
        decision
    }

    fn failed(&self, request: &Request, failure: DeliberationFailure) -> Decision {
        metrics::record_backend_failure(&self.id);
        tracing::warn!(
            target: "orchestrator",
            agent_id = %self.id,
            request_id = %request.request_id,
            kind = ?failure.error.kind,
            error = %failure.error,
            attempts = failure.attempts,
            "deliberation_failed"
        );
        let invoked = failure.backend_invoked();
        self.degrade(
            request,
            format!("backend failure: {}", failure.error),
            invoked,
        )
    }

    /// Fallback category when configured, otherwise an unresolved outcome. Never invents
    /// a category on its own.
    fn degrade(&self, request: &Request, reason: String, backend_invoked: bool) -> Decision {
        match &self.settings.fallback {
            Some(fallback) => self.decision(
                request,
                Outcome::Category {
                    category: fallback.category.clone(),
                },
                Method::Fallback,
                backend_invoked,
                fallback.confidence,
            ),
            None => self.decision(
                request,
                Outcome::Unresolved { reason },
                Method::Unresolved,
                backend_invoked,
                Confidence::ZERO,
            ),
        }
    }

    async fn propose(&self, candidate: PatternCandidate, state: &mut AgentState) -> Option<String> {
        let name = candidate.name.clone();
        match self
            .matcher
            .register(candidate.into_draft(self.id.clone()), UpsertPolicy::KeepHigherConfidence)
            .await
        {
            Ok(Registration { status, .. }) => {
                if status != RegistrationStatus::Kept {
                    state.patterns_learned += 1;
                    metrics::record_pattern_learned(&self.id);
                }
                tracing::info!(
                    target: "orchestrator",
                    agent_id = %self.id,
                    pattern = %name,
                    status = ?status,
                    "pattern_learned"
                );
                Some(name)
            }
            Err(err) => {
                tracing::warn!(
                    target: "orchestrator",
                    agent_id = %self.id,
                    pattern = %name,
                    error = %err,
                    "pattern_learning_rejected"
                );
                None
            }
        }
    }

    /// Suppression checks fail open when shared state cannot be read.
    async fn current_suppression(&self) -> Option<SuppressionFlag> {
        match self.shared.suppression(&self.id).await {
            Ok(flag) => flag,
            Err(err) => {
                tracing::warn!(
                    target: "orchestrator",
                    agent_id = %self.id,
                    error = %err,
                    "suppression_check_failed_open"
                );
                None
            }
        }
    }

    async fn enforce_budget(&self, state: &mut AgentState) {
        let Some(budget) = self.settings.layer2_budget else {
            return;
        };
        if state.budget_tripped || state.layer2_spend <= budget {
            return;
        }

        let detail = format!(
            "layer 2 spend {} exceeded budget {}",
            state.layer2_spend, budget
        );
        let flag = SuppressionFlag::new(ViolationKind::BudgetExceeded, detail.clone());
        let record = ViolationRecord::new(self.id.clone(), ViolationKind::BudgetExceeded, &detail);
        let result = async {
            self.shared.set_suppression(&self.id, Some(flag)).await?;
            self.shared.append_violation(record).await
        }
        .await;

        match result {
            Ok(()) => {
                state.budget_tripped = true;
                tracing::warn!(
                    target: "orchestrator",
                    agent_id = %self.id,
                    spend_micros = state.layer2_spend.micros(),
                    budget_micros = budget.micros(),
                    "layer2_budget_exceeded"
                );
            }
            Err(err) => {
                tracing::warn!(
                    target: "orchestrator",
                    agent_id = %self.id,
                    error = %err,
                    "budget_suppression_not_recorded"
                );
            }
        }
    }

    fn decision(
        &self,
        request: &Request,
        outcome: Outcome,
        method: Method,
        backend_invoked: bool,
        confidence: Confidence,
    ) -> Decision {
        Decision {
            request_id: request.request_id.clone(),
            outcome,
            layer: method.layer(),
            method,
            cost: self.settings.costs.cost_for(method, backend_invoked),
            confidence,
            pattern: None,
            learned_pattern: None,
        }
    }

    /// Idempotent by name: registering the same name again replaces the entry.
    pub async fn add_pattern(
        &self,
        name: &str,
        predicate: &str,
        category: &str,
        confidence: f64,
    ) -> Result<Registration, MatcherError> {
        let confidence = Confidence::new(confidence).ok_or_else(|| {
            invalid_request(format!("confidence {confidence} must be within [0, 1]"))
        })?;
        let draft = PatternDraft {
            name: name.trim().to_string(),
            predicate: predicate.to_string(),
            category: category.trim().to_string(),
            confidence,
            provenance: Provenance::registered_by(self.id.clone()),
        };
        self.matcher.register(draft, UpsertPolicy::Overwrite).await
    }

    pub async fn remove_pattern(&self, name: &str) -> Result<bool, MatcherError> {
        self.matcher.remove_pattern(name).await
    }

    pub async fn list_patterns(&self) -> Vec<PatternListing> {
        if let Err(err) = self.matcher.refresh().await {
            tracing::warn!(
                target: "orchestrator",
                agent_id = %self.id,
                error = %err,
                "pattern_refresh_failed"
            );
        }
        self.matcher.list_patterns()
    }

    pub fn add_to_blocklist(&self, term: &str) -> Result<bool, ValidatorError> {
        self.validator.add_to_blocklist(term)
    }

    pub fn remove_from_blocklist(&self, term: &str) -> bool {
        self.validator.remove_from_blocklist(term)
    }

    pub async fn report(&self) -> AgentReport {
        if let Err(err) = self.matcher.refresh().await {
            tracing::warn!(
                target: "orchestrator",
                agent_id = %self.id,
                error = %err,
                "pattern_refresh_failed"
            );
        }
        let suppression = self.current_suppression().await;
        let state = self.state.lock().await;
        let matcher = self.matcher.stats();

        AgentReport {
            agent_id: self.id.clone(),
            costs: state.tracker.summary(),
            pattern_count: matcher.patterns,
            patterns_learned: state.patterns_learned,
            cache_size: matcher.cache_size,
            layer2_suppressed: suppression.is_some(),
            suppression,
            layer2_spend: state.layer2_spend,
            backend: self.deliberator.backend_name().to_string(),
            breaker: self.deliberator.breaker_status().await,
            validator: self.validator.stats(),
            matcher,
        }
    }

    /// Clears cost records, the resolution cache and rate-limit counters.
    pub async fn reset(&self) {
        let mut state = self.state.lock().await;
        state.tracker.reset();
        state.patterns_learned = 0;
        self.matcher.clear_cache();
        self.validator.reset_rate_limits();
        tracing::info!(target: "orchestrator", agent_id = %self.id, "agent_reset");
    }

    pub async fn suppression(&self) -> Result<Option<SuppressionFlag>, SharedStateError> {
        self.shared.suppression(&self.id).await
    }

    /// Lifts suppression and starts a fresh budget window.
    pub async fn clear_suppression(&self) -> Result<(), SharedStateError> {
        let mut state = self.state.lock().await;
        self.shared.set_suppression(&self.id, None).await?;
        state.layer2_spend = Cost::ZERO;
        state.budget_tripped = false;
        tracing::info!(target: "orchestrator", agent_id = %self.id, "suppression_cleared");
        Ok(())
    }

    /// Cancels any in-flight backend call.
    pub fn shutdown(&self) {
        self.shutdown.cancel();
    }
}
