use std::{
    collections::HashMap,
    sync::{
        Arc, Mutex, PoisonError, RwLock,
        atomic::{AtomicU64, Ordering},
    },
};

use serde::Serialize;

use crate::{
    matcher::{
        cache::{CachedResolution, ResolutionCache},
        error::{MatcherError, invalid_request},
        normalize::{content_key_normalized, normalize_content},
        pattern::CompiledPattern,
        view::{LocalPatternView, PendingPattern, SnapshotChange},
    },
    shared::{
        error::SharedStateErrorKind,
        ports::SharedStateBackend,
        types::{Pattern, PatternDraft, PatternSource, UpsertOutcome, UpsertPolicy},
    },
    types::{AgentId, Confidence, PatternName},
};

#[derive(Debug, Clone, PartialEq)]
pub enum MatchOutcome {
    Cache(CachedResolution),
    Pattern(Arc<Pattern>),
    /// `best` is the strongest matching pattern that fell below the threshold.
    NoMatch { best: Option<Arc<Pattern>> },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RegistrationStatus {
    Inserted,
    Replaced,
    Kept,
    /// Shared state was unavailable; the pattern lives in this agent's view only.
    PendingLocal,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Registration {
    pub pattern: Arc<Pattern>,
    pub status: RegistrationStatus,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PatternListing {
    #[serde(flatten)]
    pub pattern: Pattern,
    pub hits: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct MatcherStats {
    pub lookups: u64,
    pub cache_hits: u64,
    pub pattern_hits: u64,
    pub patterns: usize,
    pub pending_patterns: usize,
    pub cache_size: usize,
    pub observed_version: u64,
}

/// Layer 1: named patterns plus a cache of resolved content.
pub struct PatternMatcher {
    agent_id: AgentId,
    threshold: Confidence,
    shared: Arc<dyn SharedStateBackend>,
    view: RwLock<LocalPatternView>,
    cache: Mutex<ResolutionCache>,
    hits: Mutex<HashMap<PatternName, u64>>,
    lookups: AtomicU64,
    cache_hits: AtomicU64,
    pattern_hits: AtomicU64,
}

impl PatternMatcher {
    pub fn new(
        agent_id: impl Into<AgentId>,
        threshold: Confidence,
        cache_capacity: usize,
        shared: Arc<dyn SharedStateBackend>,
    ) -> Self {
        Self {
            agent_id: agent_id.into(),
            threshold,
            shared,
            view: RwLock::new(LocalPatternView::new()),
            cache: Mutex::new(ResolutionCache::new(cache_capacity)),
            hits: Mutex::new(HashMap::new()),
            lookups: AtomicU64::new(0),
            cache_hits: AtomicU64::new(0),
            pattern_hits: AtomicU64::new(0),
        }
    }

    pub fn threshold(&self) -> Confidence {
        self.threshold
    }

    pub async fn lookup(&self, content: &str) -> MatchOutcome {
        self.lookups.fetch_add(1, Ordering::Relaxed);
        let normalized = normalize_content(content);
        let key = content_key_normalized(&normalized);

        if let Err(err) = self.refresh().await {
            tracing::warn!(
                target: "matcher",
                agent_id = %self.agent_id,
                error = %err,
                "shared_state_unavailable_using_local_view"
            );
        }

        let cached = self
            .cache
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&key)
            .filter(|resolution| resolution.confidence >= self.threshold)
            .cloned();
        if let Some(resolution) = cached {
            self.cache_hits.fetch_add(1, Ordering::Relaxed);
            return MatchOutcome::Cache(resolution);
        }

        let best = self
            .view
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .best_match(&normalized)
            .cloned();
        match best {
            Some(pattern) if pattern.confidence >= self.threshold => {
                self.pattern_hits.fetch_add(1, Ordering::Relaxed);
                *self
                    .hits
                    .lock()
                    .unwrap_or_else(PoisonError::into_inner)
                    .entry(pattern.name.clone())
                    .or_default() += 1;
                MatchOutcome::Pattern(pattern)
            }
            best => MatchOutcome::NoMatch { best },
        }
    }

    /// Pull the latest shared snapshot into the local view and retry pending publishes.
    ///
    /// A snapshot carrying a registration made elsewhere drops the resolution cache, so
    /// content resolved before that registration is matched again.
    pub async fn refresh(&self) -> Result<(), MatcherError> {
        let snapshot = self.shared.pattern_snapshot().await?;
        let change = self
            .view
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .apply_snapshot(&snapshot);
        if let SnapshotChange::Applied { registered_changed } = change {
            tracing::trace!(
                target: "matcher",
                agent_id = %self.agent_id,
                version = snapshot.version,
                patterns = snapshot.patterns.len(),
                registered_changed,
                "pattern_snapshot_applied"
            );
            if registered_changed {
                self.clear_cache();
                tracing::debug!(
                    target: "matcher",
                    agent_id = %self.agent_id,
                    version = snapshot.version,
                    "resolution_cache_invalidated"
                );
            }
        }

        self.publish_pending().await
    }

    async fn publish_pending(&self) -> Result<(), MatcherError> {
        let pending: Vec<(PatternDraft, UpsertPolicy, Option<u64>)> = self
            .view
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .pending()
            .map(|pending| (pending.draft.clone(), pending.policy, pending.seen_revision))
            .collect();

        for (draft, policy, seen_revision) in pending {
            let name = draft.name.clone();
            let superseded = {
                let mut view = self.view.write().unwrap_or_else(PoisonError::into_inner);
                let shared_revision = view.shared_revision(&name);
                let superseded = shared_revision > seen_revision;
                if superseded {
                    view.discard_pending(&name);
                }
                superseded.then_some(shared_revision)
            };
            if let Some(shared_revision) = superseded {
                tracing::info!(
                    target: "matcher",
                    agent_id = %self.agent_id,
                    pattern = %name,
                    seen_revision = ?seen_revision,
                    shared_revision = ?shared_revision,
                    "pending_pattern_superseded"
                );
                continue;
            }

            let outcome = self.shared.upsert_pattern(draft, policy).await?;
            let compiled = CompiledPattern::compile(Arc::clone(outcome.pattern()))?;
            self.view
                .write()
                .unwrap_or_else(PoisonError::into_inner)
                .observe(compiled);
            tracing::info!(
                target: "matcher",
                agent_id = %self.agent_id,
                pattern = %name,
                revision = outcome.pattern().revision,
                "pending_pattern_published"
            );
        }
        Ok(())
    }

    /// Validates before anything is stored. Learned proposals leave the cache intact.
    pub async fn register(
        &self,
        draft: PatternDraft,
        policy: UpsertPolicy,
    ) -> Result<Registration, MatcherError> {
        if draft.name.trim().is_empty() {
            return Err(invalid_request("pattern name cannot be empty"));
        }
        if draft.category.trim().is_empty() {
            return Err(invalid_request("pattern category cannot be empty"));
        }
        let provisional = CompiledPattern::compile(Arc::new(draft.clone().into_pattern(0)))?;
        let source = draft.provenance.source;

        let registration = match self.shared.upsert_pattern(draft.clone(), policy).await {
            Ok(outcome) => {
                let compiled = CompiledPattern::compile(Arc::clone(outcome.pattern()))?;
                self.view
                    .write()
                    .unwrap_or_else(PoisonError::into_inner)
                    .observe(compiled);
                let status = match &outcome {
                    UpsertOutcome::Inserted(_) => RegistrationStatus::Inserted,
                    UpsertOutcome::Replaced(_) => RegistrationStatus::Replaced,
                    UpsertOutcome::Kept(_) => RegistrationStatus::Kept,
                };
                Registration {
                    pattern: Arc::clone(outcome.pattern()),
                    status,
                }
            }
            Err(err) if err.kind == SharedStateErrorKind::InvalidRequest => {
                return Err(invalid_request(err.message));
            }
            Err(err) => {
                tracing::warn!(
                    target: "matcher",
                    agent_id = %self.agent_id,
                    pattern = %draft.name,
                    error = %err,
                    "pattern_kept_local_pending"
                );
                self.stage_local(draft, policy, provisional)
            }
        };

        if source == PatternSource::Registered && registration.status != RegistrationStatus::Kept
        {
            self.clear_cache();
        }

        tracing::info!(
            target: "matcher",
            agent_id = %self.agent_id,
            pattern = %registration.pattern.name,
            category = %registration.pattern.category,
            confidence = registration.pattern.confidence.value(),
            revision = registration.pattern.revision,
            status = ?registration.status,
            "pattern_registered"
        );
        Ok(registration)
    }

    fn stage_local(
        &self,
        draft: PatternDraft,
        policy: UpsertPolicy,
        provisional: CompiledPattern,
    ) -> Registration {
        let mut view = self.view.write().unwrap_or_else(PoisonError::into_inner);
        if policy == UpsertPolicy::KeepHigherConfidence
            && let Some(existing) = view.get(&draft.name)
            && existing.confidence >= draft.confidence
        {
            return Registration {
                pattern: Arc::clone(existing),
                status: RegistrationStatus::Kept,
            };
        }

        let pattern = Arc::clone(&provisional.pattern);
        let seen_revision = view.shared_revision(&draft.name);
        view.stage_pending(PendingPattern {
            draft,
            policy,
            compiled: provisional,
            seen_revision,
        });
        Registration {
            pattern,
            status: RegistrationStatus::PendingLocal,
        }
    }

    /// Returns `true` when a shared entry or a pending local registration was removed.
    pub async fn remove_pattern(&self, name: &str) -> Result<bool, MatcherError> {
        let removed = self.shared.remove_pattern(name).await?;
        let forgotten = self
            .view
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .forget(name);
        let removed = removed.is_some() || forgotten;
        if removed {
            self.clear_cache();
            self.hits
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .remove(name);
        }
        tracing::info!(
            target: "matcher",
            agent_id = %self.agent_id,
            pattern = %name,
            removed,
            "pattern_removed"
        );
        Ok(removed)
    }

    pub fn remember(&self, content: &str, resolution: CachedResolution) {
        let key = content_key_normalized(&normalize_content(content));
        self.cache
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(key, resolution);
    }

    pub fn clear_cache(&self) {
        self.cache
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
    }

    pub fn list_patterns(&self) -> Vec<PatternListing> {
        let hits = self.hits.lock().unwrap_or_else(PoisonError::into_inner);
        let mut listings: Vec<PatternListing> = self
            .view
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .patterns()
            .into_iter()
            .map(|pattern| PatternListing {
                hits: hits.get(&pattern.name).copied().unwrap_or(0),
                pattern: Pattern::clone(&pattern),
            })
            .collect();
        listings.sort_by(|lhs, rhs| lhs.pattern.name.cmp(&rhs.pattern.name));
        listings
    }

    pub fn stats(&self) -> MatcherStats {
        let view = self.view.read().unwrap_or_else(PoisonError::into_inner);
        MatcherStats {
            lookups: self.lookups.load(Ordering::Relaxed),
            cache_hits: self.cache_hits.load(Ordering::Relaxed),
            pattern_hits: self.pattern_hits.load(Ordering::Relaxed),
            patterns: view.len(),
            pending_patterns: view.pending_count(),
            cache_size: self.cache.lock().unwrap_or_else(PoisonError::into_inner).len(),
            observed_version: view.observed_version(),
        }
    }
}
