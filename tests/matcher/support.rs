use std::sync::{
    Arc, Mutex, PoisonError,
    atomic::{AtomicBool, Ordering},
};

use async_trait::async_trait;
use spl::{
    matcher::PatternMatcher,
    shared::{
        InMemorySharedState, SharedStateBackend,
        error::{SharedStateError, unavailable},
        types::{
            Pattern, PatternDraft, PatternSnapshot, Provenance, SuppressionFlag, UpsertOutcome,
            UpsertPolicy, ViolationRecord,
        },
    },
    types::Confidence,
};

/// Wraps the in-memory store so tests can take it offline or serve a stale snapshot.
#[derive(Default)]
pub struct FlakyStore {
    inner: InMemorySharedState,
    offline: AtomicBool,
    stale: Mutex<Option<Arc<PatternSnapshot>>>,
}

impl FlakyStore {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn set_offline(&self, offline: bool) {
        self.offline.store(offline, Ordering::SeqCst);
    }

    pub fn serve_stale(&self, snapshot: Option<Arc<PatternSnapshot>>) {
        *self.stale.lock().unwrap_or_else(PoisonError::into_inner) = snapshot;
    }

    fn check(&self) -> Result<(), SharedStateError> {
        if self.offline.load(Ordering::SeqCst) {
            return Err(unavailable("store is offline"));
        }
        Ok(())
    }
}

#[async_trait]
impl SharedStateBackend for FlakyStore {
    async fn pattern_snapshot(&self) -> Result<Arc<PatternSnapshot>, SharedStateError> {
        self.check()?;
        let stale = self.stale.lock().unwrap_or_else(PoisonError::into_inner).clone();
        match stale {
            Some(snapshot) => Ok(snapshot),
            None => self.inner.pattern_snapshot().await,
        }
    }

    async fn get_pattern(&self, name: &str) -> Result<Option<Arc<Pattern>>, SharedStateError> {
        self.check()?;
        self.inner.get_pattern(name).await
    }

    async fn upsert_pattern(
        &self,
        draft: PatternDraft,
        policy: UpsertPolicy,
    ) -> Result<UpsertOutcome, SharedStateError> {
        self.check()?;
        self.inner.upsert_pattern(draft, policy).await
    }

    async fn remove_pattern(&self, name: &str) -> Result<Option<Arc<Pattern>>, SharedStateError> {
        self.check()?;
        self.inner.remove_pattern(name).await
    }

    async fn suppression(
        &self,
        agent_id: &str,
    ) -> Result<Option<SuppressionFlag>, SharedStateError> {
        self.check()?;
        self.inner.suppression(agent_id).await
    }

    async fn set_suppression(
        &self,
        agent_id: &str,
        flag: Option<SuppressionFlag>,
    ) -> Result<(), SharedStateError> {
        self.check()?;
        self.inner.set_suppression(agent_id, flag).await
    }

    async fn append_violation(&self, record: ViolationRecord) -> Result<(), SharedStateError> {
        self.check()?;
        self.inner.append_violation(record).await
    }

    async fn violations(&self) -> Result<Vec<ViolationRecord>, SharedStateError> {
        self.check()?;
        self.inner.violations().await
    }
}

pub fn matcher(agent_id: &str, shared: Arc<dyn SharedStateBackend>) -> PatternMatcher {
    PatternMatcher::new(agent_id, Confidence::constant(0.85), 16, shared)
}

pub fn registered(name: &str, predicate: &str, category: &str, confidence: f64) -> PatternDraft {
    PatternDraft {
        name: name.to_string(),
        predicate: predicate.to_string(),
        category: category.to_string(),
        confidence: Confidence::new(confidence).expect("confidence in range"),
        provenance: Provenance::registered_by("tester"),
    }
}

pub fn learned(name: &str, predicate: &str, category: &str, confidence: f64) -> PatternDraft {
    PatternDraft {
        provenance: Provenance::learned_by("tester"),
        ..registered(name, predicate, category, confidence)
    }
}
