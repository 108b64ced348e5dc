use std::{
    collections::BTreeMap,
    sync::{Arc, Mutex, RwLock},
};

use async_trait::async_trait;

use crate::{
    shared::{
        error::{SharedStateError, invalid_request, unavailable},
        ports::SharedStateBackend,
        types::{
            Pattern, PatternDraft, PatternSnapshot, SuppressionFlag, UpsertOutcome, UpsertPolicy,
            ViolationRecord,
        },
    },
    types::AgentId,
};

/// Process-local shared state.
///
/// Pattern readers clone the current `Arc<PatternSnapshot>` under a short read lock.
/// Writers serialize on `writer`, build the next snapshot off to the side and only take
/// the write lock to swap the pointer.
#[derive(Default)]
pub struct InMemorySharedState {
    snapshot: RwLock<Arc<PatternSnapshot>>,
    writer: Mutex<WriterState>,
    suppression: RwLock<BTreeMap<AgentId, SuppressionFlag>>,
    violations: RwLock<Vec<ViolationRecord>>,
}

#[derive(Default)]
struct WriterState {
    last_revision: u64,
}

impl InMemorySharedState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn version(&self) -> Result<u64, SharedStateError> {
        Ok(self.current()?.version)
    }

    fn current(&self) -> Result<Arc<PatternSnapshot>, SharedStateError> {
        self.snapshot
            .read()
            .map(|guard| Arc::clone(&guard))
            .map_err(|_| unavailable("pattern snapshot lock poisoned"))
    }

    fn publish(
        &self,
        edit: impl FnOnce(&mut BTreeMap<String, Arc<Pattern>>, &mut WriterState) -> Option<UpsertOutcome>,
    ) -> Result<Option<UpsertOutcome>, SharedStateError> {
        let mut writer = self
            .writer
            .lock()
            .map_err(|_| unavailable("pattern writer lock poisoned"))?;
        let base = self.current()?;
        let mut patterns = base.patterns.clone();
        let outcome = edit(&mut patterns, &mut writer);

        let changed = outcome.as_ref().is_none_or(UpsertOutcome::changed);
        if changed {
            let next = Arc::new(PatternSnapshot {
                version: base.version + 1,
                patterns,
            });
            let mut guard = self
                .snapshot
                .write()
                .map_err(|_| unavailable("pattern snapshot lock poisoned"))?;
            *guard = next;
        }

        Ok(outcome)
    }
}

#[async_trait]
impl SharedStateBackend for InMemorySharedState {
    async fn pattern_snapshot(&self) -> Result<Arc<PatternSnapshot>, SharedStateError> {
        self.current()
    }

    async fn get_pattern(&self, name: &str) -> Result<Option<Arc<Pattern>>, SharedStateError> {
        Ok(self.current()?.patterns.get(name).cloned())
    }

    async fn upsert_pattern(
        &self,
        draft: PatternDraft,
        policy: UpsertPolicy,
    ) -> Result<UpsertOutcome, SharedStateError> {
        if draft.name.trim().is_empty() {
            return Err(invalid_request("pattern name cannot be empty"));
        }

        let outcome = self.publish(|patterns, writer| {
            let existing = patterns.get(&draft.name).cloned();
            if let (Some(existing), UpsertPolicy::KeepHigherConfidence) = (&existing, policy)
                && existing.confidence >= draft.confidence
            {
                return Some(UpsertOutcome::Kept(Arc::clone(existing)));
            }

            writer.last_revision += 1;
            let stored = Arc::new(draft.into_pattern(writer.last_revision));
            patterns.insert(stored.name.clone(), Arc::clone(&stored));
            Some(match existing {
                Some(_) => UpsertOutcome::Replaced(stored),
                None => UpsertOutcome::Inserted(stored),
            })
        })?;

        outcome.ok_or_else(|| invalid_request("pattern upsert produced no outcome"))
    }

    async fn remove_pattern(&self, name: &str) -> Result<Option<Arc<Pattern>>, SharedStateError> {
        if !self.current()?.patterns.contains_key(name) {
            return Ok(None);
        }

        let mut removed = None;
        self.publish(|patterns, _| {
            removed = patterns.remove(name);
            None
        })?;
        Ok(removed)
    }

    async fn suppression(
        &self,
        agent_id: &str,
    ) -> Result<Option<SuppressionFlag>, SharedStateError> {
        let guard = self
            .suppression
            .read()
            .map_err(|_| unavailable("suppression lock poisoned"))?;
        Ok(guard.get(agent_id).cloned())
    }

    async fn set_suppression(
        &self,
        agent_id: &str,
        flag: Option<SuppressionFlag>,
    ) -> Result<(), SharedStateError> {
        let mut guard = self
            .suppression
            .write()
            .map_err(|_| unavailable("suppression lock poisoned"))?;
        match flag {
            Some(flag) => {
                guard.insert(agent_id.to_string(), flag);
            }
            None => {
                guard.remove(agent_id);
            }
        }
        Ok(())
    }

    async fn append_violation(&self, record: ViolationRecord) -> Result<(), SharedStateError> {
        self.violations
            .write()
            .map_err(|_| unavailable("violation log lock poisoned"))?
            .push(record);
        Ok(())
    }

    async fn violations(&self) -> Result<Vec<ViolationRecord>, SharedStateError> {
        let guard = self
            .violations
            .read()
            .map_err(|_| unavailable("violation log lock poisoned"))?;
        Ok(guard.clone())
    }
}
