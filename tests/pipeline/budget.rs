use std::sync::Arc;

use spl::{
    orchestrator::AgentSettings,
    shared::{InMemorySharedState, SharedStateBackend, types::ViolationKind},
    types::{Cost, Method, Request},
};

use crate::support::{ScriptedBackend, agent_with};

#[tokio::test]
async fn given_budget_exceeded_when_more_requests_arrive_then_backend_is_not_called_until_cleared()
{
    let backend = ScriptedBackend::answering("other", 0.7);
    let shared = Arc::new(InMemorySharedState::new());
    let settings = AgentSettings {
        layer2_budget: Some(Cost::from_micros(20_000)),
        ..AgentSettings::default()
    };
    let agent = agent_with("agent-1", backend.clone(), settings, shared.clone());

    for i in 0..3 {
        let decision = agent
            .process(&Request::new("u1", format!("routine note {i}")))
            .await;
        assert_eq!(decision.method, Method::Reasoning);
    }
    assert_eq!(backend.calls(), 3);

    let violations = shared.violations().await.expect("violations are readable");
    assert_eq!(violations.len(), 1);
    assert_eq!(violations[0].agent_id, "agent-1");
    assert_eq!(violations[0].kind, ViolationKind::BudgetExceeded);

    let suppressed = agent.process(&Request::new("u1", "routine note 4")).await;
    assert_eq!(suppressed.method, Method::Unresolved);
    assert_eq!(suppressed.cost, Cost::ZERO);
    assert_eq!(backend.calls(), 3, "suppressed agent must not reach the backend");

    let report = agent.report().await;
    assert!(report.layer2_suppressed);
    assert_eq!(report.layer2_spend, Cost::from_micros(30_000));

    agent.clear_suppression().await.expect("suppression clears");
    let restored = agent.process(&Request::new("u1", "routine note 5")).await;
    assert_eq!(restored.method, Method::Reasoning);
    assert_eq!(backend.calls(), 4);
    assert!(!agent.report().await.layer2_suppressed);
    assert_eq!(shared.violations().await.expect("readable").len(), 1);
}

#[tokio::test]
async fn given_suppressed_agent_when_pattern_matches_then_layer_one_still_answers() {
    let backend = ScriptedBackend::answering("other", 0.7);
    let shared = Arc::new(InMemorySharedState::new());
    let settings = AgentSettings {
        layer2_budget: Some(Cost::ZERO),
        ..AgentSettings::default()
    };
    let agent = agent_with("agent-1", backend.clone(), settings, shared);
    agent
        .add_pattern("urgent_keyword", r"\burgent\b", "urgent", 0.95)
        .await
        .expect("pattern should register");

    agent.process(&Request::new("u1", "first plain note")).await;
    assert!(agent.report().await.layer2_suppressed);

    let decision = agent.process(&Request::new("u1", "urgent: server down")).await;
    assert_eq!(decision.method, Method::Pattern);
    assert_eq!(backend.calls(), 1);
}
