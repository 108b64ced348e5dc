use std::{cmp::Ordering, collections::BTreeMap, sync::Arc};

use crate::{
    matcher::pattern::CompiledPattern,
    shared::types::{Pattern, PatternDraft, PatternSnapshot, PatternSource, UpsertPolicy},
    types::PatternName,
};

/// A registration that could not be published yet. It shadows the shared entry of the
/// same name until a later refresh manages to publish it.
#[derive(Debug, Clone)]
pub struct PendingPattern {
    pub draft: PatternDraft,
    pub policy: UpsertPolicy,
    pub compiled: CompiledPattern,
    /// Shared revision of the same name when the registration was staged.
    pub seen_revision: Option<u64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SnapshotChange {
    /// Not newer than the last applied version.
    Stale,
    /// `registered_changed` is set when an explicitly registered entry appeared, moved to a
    /// higher revision or disappeared. Resolutions cached before that are no longer trusted.
    Applied { registered_changed: bool },
}

impl SnapshotChange {
    pub fn is_applied(self) -> bool {
        matches!(self, SnapshotChange::Applied { .. })
    }
}

/// An agent's local merge of shared snapshots.
///
/// Snapshots older than the last applied version are ignored, and an entry observed at
/// revision R is never replaced by an entry with a lower revision.
#[derive(Debug, Default)]
pub struct LocalPatternView {
    observed_version: u64,
    entries: BTreeMap<PatternName, CompiledPattern>,
    pending: BTreeMap<PatternName, PendingPattern>,
}

impl LocalPatternView {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn observed_version(&self) -> u64 {
        self.observed_version
    }

    pub fn apply_snapshot(&mut self, snapshot: &PatternSnapshot) -> SnapshotChange {
        if snapshot.version <= self.observed_version && self.observed_version != 0 {
            return SnapshotChange::Stale;
        }

        let mut registered_changed = false;
        let mut next = BTreeMap::new();
        for (name, pattern) in &snapshot.patterns {
            match self.entries.remove(name) {
                Some(current) if current.pattern.revision >= pattern.revision => {
                    next.insert(name.clone(), current);
                }
                _ => match CompiledPattern::compile(Arc::clone(pattern)) {
                    Ok(compiled) => {
                        registered_changed |= is_registered(pattern);
                        next.insert(name.clone(), compiled);
                    }
                    Err(err) => {
                        tracing::warn!(
                            target: "matcher",
                            pattern = %name,
                            error = %err,
                            "shared_pattern_skipped"
                        );
                    }
                },
            }
        }
        registered_changed |= self
            .entries
            .values()
            .any(|dropped| is_registered(&dropped.pattern));

        self.entries = next;
        self.observed_version = snapshot.version;
        SnapshotChange::Applied { registered_changed }
    }

    /// Record a pattern returned by a successful write before the next snapshot arrives.
    pub fn observe(&mut self, compiled: CompiledPattern) {
        let name = compiled.pattern.name.clone();
        self.pending.remove(&name);
        match self.entries.get(&name) {
            Some(current) if current.pattern.revision > compiled.pattern.revision => {}
            _ => {
                self.entries.insert(name, compiled);
            }
        }
    }

    /// Revision of the shared entry last seen under `name`, ignoring pending registrations.
    pub fn shared_revision(&self, name: &str) -> Option<u64> {
        self.entries.get(name).map(|compiled| compiled.pattern.revision)
    }

    pub fn stage_pending(&mut self, pending: PendingPattern) {
        self.pending.insert(pending.draft.name.clone(), pending);
    }

    /// Drops a pending registration without touching the shared entry of the same name.
    pub fn discard_pending(&mut self, name: &str) -> bool {
        self.pending.remove(name).is_some()
    }

    pub fn pending(&self) -> impl Iterator<Item = &PendingPattern> {
        self.pending.values()
    }

    pub fn pending_count(&self) -> usize {
        self.pending.len()
    }

    pub fn get(&self, name: &str) -> Option<&Arc<Pattern>> {
        self.pending
            .get(name)
            .map(|pending| &pending.compiled.pattern)
            .or_else(|| self.entries.get(name).map(|compiled| &compiled.pattern))
    }

    /// Returns `true` if a local entry or pending registration was dropped.
    pub fn forget(&mut self, name: &str) -> bool {
        let pending = self.pending.remove(name).is_some();
        let entry = self.entries.remove(name).is_some();
        pending || entry
    }

    /// Highest confidence wins; ties go to the most recent registration.
    pub fn best_match(&self, normalized: &str) -> Option<&Arc<Pattern>> {
        self.candidates()
            .filter(|(compiled, _)| compiled.is_match(normalized))
            .max_by(|(lhs, lhs_pending), (rhs, rhs_pending)| {
                compare_candidates(&lhs.pattern, *lhs_pending, &rhs.pattern, *rhs_pending)
            })
            .map(|(compiled, _)| &compiled.pattern)
    }

    pub fn patterns(&self) -> Vec<Arc<Pattern>> {
        self.candidates()
            .map(|(compiled, _)| Arc::clone(&compiled.pattern))
            .collect()
    }

    pub fn len(&self) -> usize {
        self.candidates().count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn candidates(&self) -> impl Iterator<Item = (&CompiledPattern, bool)> {
        let pending = self
            .pending
            .values()
            .map(|pending| (&pending.compiled, true));
        let shared = self
            .entries
            .iter()
            .filter(|(name, _)| !self.pending.contains_key(*name))
            .map(|(_, compiled)| (compiled, false));
        pending.chain(shared)
    }
}

fn is_registered(pattern: &Pattern) -> bool {
    pattern.provenance.source == PatternSource::Registered
}

fn compare_candidates(lhs: &Pattern, lhs_pending: bool, rhs: &Pattern, rhs_pending: bool) -> Ordering {
    lhs.confidence
        .value()
        .total_cmp(&rhs.confidence.value())
        .then(lhs_pending.cmp(&rhs_pending))
        .then(lhs.revision.cmp(&rhs.revision))
        .then_with(|| rhs.name.cmp(&lhs.name))
}
