use spl::{
    matcher::{MatchOutcome, RegistrationStatus},
    shared::{SharedStateBackend, types::UpsertPolicy},
    types::Confidence,
};

use crate::support::{FlakyStore, matcher, registered};

#[tokio::test]
async fn given_stale_snapshot_when_looked_up_then_observed_revision_never_regresses() {
    let store = FlakyStore::new();
    let matcher = matcher("m1", store.clone());

    matcher
        .register(registered("alert", r"\balert\b", "urgent", 0.9), UpsertPolicy::Overwrite)
        .await
        .expect("first version");
    let stale = store.pattern_snapshot().await.expect("snapshot");

    let newer = matcher
        .register(registered("alert", r"\balert\b", "urgent", 0.97), UpsertPolicy::Overwrite)
        .await
        .expect("second version");
    store.serve_stale(Some(stale));

    match matcher.lookup("alert raised").await {
        MatchOutcome::Pattern(pattern) => {
            assert_eq!(pattern.revision, newer.pattern.revision);
            assert_eq!(pattern.confidence, Confidence::constant(0.97));
        }
        other => panic!("expected a pattern match, got {other:?}"),
    }
}

#[tokio::test]
async fn given_pattern_overwritten_elsewhere_when_refreshed_then_higher_revision_wins() {
    let store = FlakyStore::new();
    let local = matcher("m1", store.clone());
    let remote = matcher("m2", store.clone());

    local
        .register(registered("alert", r"\balert\b", "urgent", 0.9), UpsertPolicy::Overwrite)
        .await
        .expect("local registration");
    remote
        .register(registered("alert", r"\balert\b", "ops", 0.9), UpsertPolicy::Overwrite)
        .await
        .expect("remote overwrite");

    match local.lookup("alert raised").await {
        MatchOutcome::Pattern(pattern) => assert_eq!(pattern.category, "ops"),
        other => panic!("expected a pattern match, got {other:?}"),
    }
}

#[tokio::test]
async fn given_store_offline_when_registering_then_pattern_stays_local_until_republished() {
    let store = FlakyStore::new();
    let matcher = matcher("m1", store.clone());

    store.set_offline(true);
    let registration = matcher
        .register(registered("alert", r"\balert\b", "urgent", 0.9), UpsertPolicy::Overwrite)
        .await
        .expect("offline registration is staged");
    assert_eq!(registration.status, RegistrationStatus::PendingLocal);
    assert!(matches!(matcher.lookup("alert raised").await, MatchOutcome::Pattern(_)));
    assert_eq!(matcher.stats().pending_patterns, 1);

    store.set_offline(false);
    matcher.refresh().await.expect("refresh republishes");
    assert_eq!(matcher.stats().pending_patterns, 0);
    let stored = store.get_pattern("alert").await.expect("store is online");
    assert!(stored.is_some());
}

#[tokio::test]
async fn given_offline_registration_when_newer_one_lands_elsewhere_then_pending_is_dropped() {
    let store = FlakyStore::new();
    let local = matcher("m1", store.clone());
    let remote = matcher("m2", store.clone());

    store.set_offline(true);
    let staged = local
        .register(registered("alert", r"\balert\b", "urgent", 0.9), UpsertPolicy::Overwrite)
        .await
        .expect("offline registration is staged");
    assert_eq!(staged.status, RegistrationStatus::PendingLocal);

    store.set_offline(false);
    let newer = remote
        .register(registered("alert", r"\balert\b", "ops", 0.9), UpsertPolicy::Overwrite)
        .await
        .expect("remote registration");

    local.refresh().await.expect("refresh");
    assert_eq!(local.stats().pending_patterns, 0);

    let stored = store
        .get_pattern("alert")
        .await
        .expect("store is online")
        .expect("pattern stored");
    assert_eq!(stored.category, "ops");
    assert_eq!(stored.revision, newer.pattern.revision);

    match local.lookup("alert raised").await {
        MatchOutcome::Pattern(pattern) => assert_eq!(pattern.category, "ops"),
        other => panic!("expected a pattern match, got {other:?}"),
    }
}
