use std::sync::Arc;

use spl::{
    matcher::{MatchOutcome, RegistrationStatus, cache::CachedResolution, error::MatcherErrorKind},
    shared::{InMemorySharedState, types::UpsertPolicy},
    types::Confidence,
};

use crate::support::{learned, matcher, registered};

#[tokio::test]
async fn given_overlapping_patterns_when_looked_up_then_highest_confidence_wins() {
    let matcher = matcher("m1", Arc::new(InMemorySharedState::new()));
    matcher
        .register(registered("meeting", r"\bmeeting\b", "calendar", 0.9), UpsertPolicy::Overwrite)
        .await
        .expect("register meeting");
    matcher
        .register(registered("urgent", r"\burgent\b", "urgent", 0.95), UpsertPolicy::Overwrite)
        .await
        .expect("register urgent");

    match matcher.lookup("URGENT:   Meeting moved").await {
        MatchOutcome::Pattern(pattern) => assert_eq!(pattern.name, "urgent"),
        other => panic!("expected a pattern match, got {other:?}"),
    }
}

#[tokio::test]
async fn given_cached_resolution_when_content_differs_only_in_case_and_spacing_then_cache_hits() {
    let matcher = matcher("m1", Arc::new(InMemorySharedState::new()));
    matcher.remember(
        "Invoice   overdue",
        CachedResolution {
            category: "billing".to_string(),
            confidence: Confidence::constant(0.9),
            pattern: None,
        },
    );

    match matcher.lookup("invoice overdue").await {
        MatchOutcome::Cache(resolution) => assert_eq!(resolution.category, "billing"),
        other => panic!("expected a cache hit, got {other:?}"),
    }
    assert_eq!(matcher.stats().cache_hits, 1);
}

#[tokio::test]
async fn given_explicit_registration_when_cache_is_warm_then_cache_is_invalidated() {
    let matcher = matcher("m1", Arc::new(InMemorySharedState::new()));
    let resolution = CachedResolution {
        category: "billing".to_string(),
        confidence: Confidence::constant(0.9),
        pattern: None,
    };
    matcher.remember("invoice overdue", resolution.clone());

    matcher
        .register(learned("learned:x:y", r"\by\b", "x", 0.95), UpsertPolicy::KeepHigherConfidence)
        .await
        .expect("learned registration");
    assert_eq!(matcher.stats().cache_size, 1, "learning leaves the cache alone");

    matcher
        .register(registered("invoice", r"\binvoice\b", "finance", 0.99), UpsertPolicy::Overwrite)
        .await
        .expect("explicit registration");
    assert_eq!(matcher.stats().cache_size, 0);
}

#[tokio::test]
async fn given_invalid_drafts_when_registered_then_errors_are_returned() {
    let matcher = matcher("m1", Arc::new(InMemorySharedState::new()));

    let err = matcher
        .register(registered("bad", "[unclosed", "x", 0.9), UpsertPolicy::Overwrite)
        .await
        .expect_err("bad regex");
    assert_eq!(err.kind, MatcherErrorKind::InvalidPredicate);

    let err = matcher
        .register(registered("nocat", r"\bok\b", " ", 0.9), UpsertPolicy::Overwrite)
        .await
        .expect_err("empty category");
    assert_eq!(err.kind, MatcherErrorKind::InvalidRequest);
    assert!(matcher.list_patterns().is_empty());
}

#[tokio::test]
async fn given_learned_proposal_with_lower_confidence_when_registered_then_existing_is_kept() {
    let matcher = matcher("m1", Arc::new(InMemorySharedState::new()));
    let name = "learned:billing:invoice";
    matcher
        .register(learned(name, r"\binvoice\b", "billing", 0.95), UpsertPolicy::KeepHigherConfidence)
        .await
        .expect("first proposal");

    let second = matcher
        .register(learned(name, r"\binvoice\b", "billing", 0.91), UpsertPolicy::KeepHigherConfidence)
        .await
        .expect("second proposal");
    assert_eq!(second.status, RegistrationStatus::Kept);
    assert_eq!(second.pattern.confidence, Confidence::constant(0.95));

    let third = matcher
        .register(learned(name, r"\binvoice\b", "billing", 0.99), UpsertPolicy::KeepHigherConfidence)
        .await
        .expect("third proposal");
    assert_eq!(third.status, RegistrationStatus::Replaced);
    assert_eq!(third.pattern.confidence, Confidence::constant(0.99));
}
