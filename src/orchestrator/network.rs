use std::{
    collections::BTreeMap,
    sync::{Arc, PoisonError, RwLock},
};

use serde::Serialize;

use crate::{
    deliberator::{Deliberator, DeliberatorConfig, ReasoningBackend},
    matcher::pattern::compile_predicate,
    orchestrator::{
        agent::{Agent, AgentReport, AgentSettings},
        error::{OrchestratorError, duplicate_agent, invalid_config, unknown_agent},
    },
    shared::{
        InMemorySharedState,
        ports::SharedStateBackend,
        types::{
            PatternDraft, Provenance, SuppressionFlag, UpsertOutcome, UpsertPolicy,
            ViolationKind, ViolationRecord,
        },
    },
    types::{AgentId, Confidence, Cost},
    validation::{Validator, types::ValidatorConfig},
};

/// Everything needed to build one agent.
#[derive(Clone)]
pub struct AgentBlueprint {
    pub settings: AgentSettings,
    pub validator: ValidatorConfig,
    pub deliberator: DeliberatorConfig,
    pub backend: Arc<dyn ReasoningBackend>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NetworkTotals {
    pub agents: usize,
    pub total_requests: u64,
    pub total_cost: Cost,
    pub baseline_cost: Cost,
    pub savings: Cost,
    pub suppression_rate: f64,
    pub shared_patterns: usize,
    pub violations: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NetworkReport {
    pub totals: NetworkTotals,
    pub agents: Vec<AgentReport>,
}

/// A set of agents sharing one pattern store, suppression flags and violation log.
pub struct AgentNetwork {
    shared: Arc<dyn SharedStateBackend>,
    agents: RwLock<BTreeMap<AgentId, Arc<Agent>>>,
}

impl AgentNetwork {
    pub fn new(shared: Arc<dyn SharedStateBackend>) -> Self {
        Self {
            shared,
            agents: RwLock::new(BTreeMap::new()),
        }
    }

    pub fn in_memory() -> Self {
        Self::new(Arc::new(InMemorySharedState::new()))
    }

    pub fn shared(&self) -> Arc<dyn SharedStateBackend> {
        Arc::clone(&self.shared)
    }

    pub fn spawn_agent(
        &self,
        agent_id: &str,
        blueprint: &AgentBlueprint,
    ) -> Result<Arc<Agent>, OrchestratorError> {
        if agent_id.trim().is_empty() {
            return Err(invalid_config("agent id cannot be empty"));
        }
        let validator = Validator::new(&blueprint.validator)?;
        let deliberator = Deliberator::new(
            Arc::clone(&blueprint.backend),
            blueprint.deliberator.clone(),
        );
        let agent = Agent::new(
            agent_id,
            blueprint.settings.clone(),
            validator,
            deliberator,
            Arc::clone(&self.shared),
        );
        self.insert(agent)
    }

    pub fn insert(&self, agent: Agent) -> Result<Arc<Agent>, OrchestratorError> {
        let mut agents = self.agents.write().unwrap_or_else(PoisonError::into_inner);
        if agents.contains_key(agent.id()) {
            return Err(duplicate_agent(agent.id()));
        }
        let agent = Arc::new(agent);
        agents.insert(agent.id().to_string(), Arc::clone(&agent));
        tracing::info!(target: "orchestrator", agent_id = %agent.id(), "agent_spawned");
        Ok(agent)
    }

    pub fn agent(&self, agent_id: &str) -> Option<Arc<Agent>> {
        self.agents
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(agent_id)
            .cloned()
    }

    pub fn agents(&self) -> Vec<Arc<Agent>> {
        self.agents
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .values()
            .cloned()
            .collect()
    }

    /// Writes a pattern straight into shared state, e.g. from configuration at startup.
    pub async fn seed_pattern(
        &self,
        name: &str,
        predicate: &str,
        category: &str,
        confidence: Confidence,
    ) -> Result<UpsertOutcome, OrchestratorError> {
        compile_predicate(predicate)?;
        if category.trim().is_empty() {
            return Err(invalid_config(format!(
                "pattern '{name}' has an empty category"
            )));
        }
        let draft = PatternDraft {
            name: name.trim().to_string(),
            predicate: predicate.to_string(),
            category: category.trim().to_string(),
            confidence,
            provenance: Provenance::registered_by("config"),
        };
        Ok(self.shared.upsert_pattern(draft, UpsertPolicy::Overwrite).await?)
    }

    /// Administratively disables an agent's Layer 2 until cleared.
    /// Administrative suppression of one agent's Layer 2.
    pub async fn suppress(&self, agent_id: &str, reason: &str) -> Result<(), OrchestratorError> {
        self.record_violation(agent_id, ViolationKind::Administrative, reason)
            .await
    }

    /// Flags the agent so it skips Layer 2 and appends the violation to the shared log.
    pub async fn record_violation(
        &self,
        agent_id: &str,
        kind: ViolationKind,
        detail: &str,
    ) -> Result<(), OrchestratorError> {
        if self.agent(agent_id).is_none() {
            return Err(unknown_agent(agent_id));
        }
        self.shared
            .set_suppression(agent_id, Some(SuppressionFlag::new(kind, detail)))
            .await?;
        self.shared
            .append_violation(ViolationRecord::new(agent_id, kind, detail))
            .await?;
        tracing::warn!(
            target: "orchestrator",
            agent_id = %agent_id,
            kind = %kind,
            detail = %detail,
            "agent_suppressed"
        );
        Ok(())
    }

    pub async fn clear_suppression(&self, agent_id: &str) -> Result<(), OrchestratorError> {
        let agent = self.agent(agent_id).ok_or_else(|| unknown_agent(agent_id))?;
        agent.clear_suppression().await?;
        Ok(())
    }

    pub async fn violations(&self) -> Result<Vec<ViolationRecord>, OrchestratorError> {
        Ok(self.shared.violations().await?)
    }

    pub async fn report(&self) -> Result<NetworkReport, OrchestratorError> {
        let mut agents = Vec::new();
        for agent in self.agents() {
            agents.push(agent.report().await);
        }
        let shared_patterns = self.shared.pattern_snapshot().await?.patterns.len();
        let violations = self.shared.violations().await?.len();

        let total_requests: u64 = agents.iter().map(|report| report.costs.total_requests).sum();
        let suppressions: u64 = agents.iter().map(|report| report.costs.suppressions).sum();
        let total_cost: Cost = agents.iter().map(|report| report.costs.total_cost).sum();
        let baseline_cost: Cost = agents.iter().map(|report| report.costs.baseline_cost).sum();
        let suppression_rate = if total_requests == 0 {
            0.0
        } else {
            suppressions as f64 / total_requests as f64
        };

        Ok(NetworkReport {
            totals: NetworkTotals {
                agents: agents.len(),
                total_requests,
                total_cost,
                baseline_cost,
                savings: baseline_cost.saturating_sub(total_cost),
                suppression_rate,
                shared_patterns,
                violations,
            },
            agents,
        })
    }

    /// Cancels in-flight backend calls on every agent.
    pub fn shutdown(&self) {
        for agent in self.agents() {
            agent.shutdown();
        }
    }
}
