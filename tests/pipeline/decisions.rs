use std::time::Duration;

use spl::{
    orchestrator::{AgentSettings, FallbackPolicy},
    shared::InMemorySharedState,
    types::{Confidence, Cost, Layer, Method, Outcome, Request},
};
use std::sync::Arc;

use crate::support::{ScriptedBackend, agent, agent_with};

#[tokio::test]
async fn given_matching_pattern_above_threshold_when_processed_then_layer_one_answers() {
    let backend = ScriptedBackend::answering("other", 0.99);
    let agent = agent(backend.clone());
    agent
        .add_pattern("urgent_keyword", r"\burgent\b", "urgent", 0.95)
        .await
        .expect("pattern should register");

    let decision = agent
        .process(&Request::new("u1", "URGENT: Meeting moved to 3pm"))
        .await;

    assert_eq!(decision.layer, Layer::Tactical);
    assert_eq!(decision.method, Method::Pattern);
    assert_eq!(decision.cost, Cost::from_micros(1_000));
    assert_eq!(decision.confidence, Confidence::constant(0.95));
    assert_eq!(decision.category(), Some("urgent"));
    assert_eq!(decision.pattern.as_deref(), Some("urgent_keyword"));
    assert_eq!(backend.calls(), 0, "layer 2 must be suppressed");
}

#[tokio::test]
async fn given_matching_pattern_below_threshold_when_processed_then_backend_is_consulted() {
    let backend = ScriptedBackend::answering("urgent", 0.8);
    let agent = agent(backend.clone());
    agent
        .add_pattern("weak_urgent", r"\burgent\b", "urgent", 0.6)
        .await
        .expect("pattern should register");

    let decision = agent.process(&Request::new("u1", "urgent-ish maybe")).await;

    assert_eq!(decision.method, Method::Reasoning);
    assert_eq!(backend.calls(), 1);
}

#[tokio::test]
async fn given_invalid_request_when_processed_then_nothing_downstream_is_touched() {
    let backend = ScriptedBackend::answering("billing", 0.99);
    let agent = agent(backend.clone());

    let decision = agent.process(&Request::new("u1", "hi")).await;

    assert_eq!(decision.layer, Layer::Reactive);
    assert_eq!(decision.method, Method::ValidationFail);
    assert_eq!(decision.cost, Cost::ZERO);
    assert!(matches!(decision.outcome, Outcome::Rejected { .. }));
    assert_eq!(backend.calls(), 0);

    let report = agent.report().await;
    assert_eq!(report.cache_size, 0);
    assert_eq!(report.matcher.lookups, 0);
    assert_eq!(report.costs.total_requests, 1);
}

#[tokio::test]
async fn given_confident_backend_answer_when_processed_then_candidate_is_learned_and_cached() {
    let backend = ScriptedBackend::answering("billing", 0.9);
    let agent = agent(backend.clone());

    let content = "Your invoice is overdue";
    let decision = agent.process(&Request::new("u1", content)).await;

    assert_eq!(decision.layer, Layer::Deliberative);
    assert_eq!(decision.method, Method::Reasoning);
    assert_eq!(decision.cost, Cost::from_micros(10_000));
    assert_eq!(decision.confidence, Confidence::constant(0.9));
    assert_eq!(decision.category(), Some("billing"));
    assert_eq!(decision.learned_pattern.as_deref(), Some("learned:billing:invoice"));

    let repeat = agent.process(&Request::new("u2", content)).await;
    assert_eq!(repeat.method, Method::Cache);
    assert_eq!(repeat.cost, Cost::from_micros(100));

    let related = agent.process(&Request::new("u3", "Second invoice reminder")).await;
    assert_eq!(related.method, Method::Pattern);
    assert_eq!(related.pattern.as_deref(), Some("learned:billing:invoice"));
    assert_eq!(backend.calls(), 1);

    let report = agent.report().await;
    assert_eq!(report.patterns_learned, 1);
    assert_eq!(report.pattern_count, 1);
    assert_eq!(report.cache_size, 1);
}

#[tokio::test]
async fn given_hesitant_backend_answer_when_processed_then_nothing_is_learned_or_cached() {
    let backend = ScriptedBackend::answering("other", 0.7);
    let agent = agent(backend.clone());

    let decision = agent.process(&Request::new("u1", "Quarterly newsletter")).await;
    assert_eq!(decision.method, Method::Reasoning);
    assert!(decision.learned_pattern.is_none());

    agent.process(&Request::new("u1", "Quarterly newsletter")).await;
    assert_eq!(backend.calls(), 2);
    assert_eq!(agent.report().await.cache_size, 0);
}

#[tokio::test]
async fn given_backend_timeout_without_fallback_when_processed_then_decision_is_unresolved() {
    let backend = ScriptedBackend::hanging(Duration::from_millis(500));
    let agent = agent(backend.clone());

    let decision = agent.process(&Request::new("u1", "Something unusual")).await;

    assert_eq!(decision.layer, Layer::Deliberative);
    assert_eq!(decision.method, Method::Unresolved);
    assert_eq!(decision.category(), None);
    assert_eq!(decision.confidence, Confidence::ZERO);
    assert_eq!(decision.cost, Cost::from_micros(10_000), "backend was invoked");
    match &decision.outcome {
        Outcome::Unresolved { reason } => assert!(reason.contains("backend failure"), "{reason}"),
        other => panic!("expected unresolved outcome, got {other:?}"),
    }
}

#[tokio::test]
async fn given_backend_timeout_with_fallback_when_processed_then_fallback_category_is_used() {
    let backend = ScriptedBackend::hanging(Duration::from_millis(500));
    let settings = AgentSettings {
        fallback: Some(FallbackPolicy {
            category: "general".to_string(),
            confidence: Confidence::constant(0.5),
        }),
        ..AgentSettings::default()
    };
    let agent = agent_with(
        "agent-1",
        backend.clone(),
        settings,
        Arc::new(InMemorySharedState::new()),
    );

    let decision = agent.process(&Request::new("u1", "Something unusual")).await;

    assert_eq!(decision.method, Method::Fallback);
    assert_eq!(decision.category(), Some("general"));
    assert_eq!(decision.confidence, Confidence::constant(0.5));
    assert_eq!(agent.report().await.cache_size, 0, "fallbacks are never cached");
}

#[tokio::test]
async fn given_same_name_registered_twice_when_reported_then_one_entry_remains() {
    let agent = agent(ScriptedBackend::failing());

    agent
        .add_pattern("alerts", r"\balert\b", "urgent", 0.9)
        .await
        .expect("first registration");
    let second = agent
        .add_pattern("alerts", r"\balarm\b", "urgent", 0.97)
        .await
        .expect("second registration");

    assert_eq!(second.pattern.predicate, r"\balarm\b");
    let report = agent.report().await;
    assert_eq!(report.pattern_count, 1);

    let patterns = agent.list_patterns().await;
    assert_eq!(patterns.len(), 1);
    assert_eq!(patterns[0].pattern.confidence, Confidence::constant(0.97));
}

#[tokio::test]
async fn given_malformed_predicate_when_added_then_nothing_is_stored() {
    let agent = agent(ScriptedBackend::failing());

    assert!(agent.add_pattern("broken", "(unclosed", "x", 0.9).await.is_err());
    assert!(agent.add_pattern("wide", r"\bok\b", "x", 1.5).await.is_err());
    assert!(agent.add_pattern(" ", r"\bok\b", "x", 0.9).await.is_err());
    assert_eq!(agent.report().await.pattern_count, 0);
}

#[tokio::test]
async fn given_removed_pattern_when_processed_then_backend_answers_again() {
    let backend = ScriptedBackend::answering("other", 0.5);
    let agent = agent(backend.clone());
    agent
        .add_pattern("urgent_keyword", r"\burgent\b", "urgent", 0.95)
        .await
        .expect("pattern should register");

    assert!(agent.remove_pattern("urgent_keyword").await.expect("removal"));
    assert!(!agent.remove_pattern("urgent_keyword").await.expect("second removal"));

    let decision = agent.process(&Request::new("u1", "urgent request")).await;
    assert_eq!(decision.method, Method::Reasoning);
    assert_eq!(backend.calls(), 1);
}

#[tokio::test]
async fn given_runtime_blocklist_term_when_processed_then_request_is_rejected() {
    let backend = ScriptedBackend::answering("other", 0.5);
    let agent = agent(backend.clone());

    assert!(agent.add_to_blocklist("Forbidden").expect("term is valid"));
    let decision = agent.process(&Request::new("u1", "this is forbidden text")).await;
    assert_eq!(decision.method, Method::ValidationFail);

    assert!(agent.remove_from_blocklist("forbidden"));
    let decision = agent.process(&Request::new("u1", "this is forbidden text")).await;
    assert_eq!(decision.method, Method::Reasoning);
}

#[tokio::test]
async fn given_reset_when_reported_then_costs_and_cache_are_cleared() {
    let backend = ScriptedBackend::answering("billing", 0.95);
    let agent = agent(backend.clone());
    agent.process(&Request::new("u1", "Payment received today")).await;

    agent.reset().await;

    let report = agent.report().await;
    assert_eq!(report.costs.total_requests, 0);
    assert_eq!(report.cache_size, 0);
    assert_eq!(report.patterns_learned, 0);
    assert_eq!(report.pattern_count, 1, "learned patterns survive a reset");
}
