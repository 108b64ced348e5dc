use std::{collections::BTreeMap, fmt, sync::Arc};

use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

use crate::types::{AgentId, Confidence, PatternName};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PatternSource {
    Registered,
    Learned,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Provenance {
    pub source: PatternSource,
    pub agent_id: AgentId,
    #[serde(with = "time::serde::rfc3339")]
    pub recorded_at: OffsetDateTime,
}

impl Provenance {
    pub fn registered_by(agent_id: impl Into<AgentId>) -> Self {
        Self {
            source: PatternSource::Registered,
            agent_id: agent_id.into(),
            recorded_at: OffsetDateTime::now_utc(),
        }
    }

    pub fn learned_by(agent_id: impl Into<AgentId>) -> Self {
        Self {
            source: PatternSource::Learned,
            agent_id: agent_id.into(),
            recorded_at: OffsetDateTime::now_utc(),
        }
    }
}

/// A pattern proposed for storage. The store assigns the revision.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PatternDraft {
    pub name: PatternName,
    pub predicate: String,
    pub category: String,
    pub confidence: Confidence,
    pub provenance: Provenance,
}

impl PatternDraft {
    pub fn into_pattern(self, revision: u64) -> Pattern {
        Pattern {
            name: self.name,
            predicate: self.predicate,
            category: self.category,
            confidence: self.confidence,
            provenance: self.provenance,
            revision,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Pattern {
    pub name: PatternName,
    pub predicate: String,
    pub category: String,
    pub confidence: Confidence,
    pub provenance: Provenance,
    pub revision: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpsertPolicy {
    /// Last write wins.
    Overwrite,
    /// Replace only when the draft is strictly more confident than the stored entry.
    KeepHigherConfidence,
}

#[derive(Debug, Clone, PartialEq)]
pub enum UpsertOutcome {
    Inserted(Arc<Pattern>),
    Replaced(Arc<Pattern>),
    Kept(Arc<Pattern>),
}

impl UpsertOutcome {
    pub fn pattern(&self) -> &Arc<Pattern> {
        match self {
            UpsertOutcome::Inserted(pattern)
            | UpsertOutcome::Replaced(pattern)
            | UpsertOutcome::Kept(pattern) => pattern,
        }
    }

    pub fn changed(&self) -> bool {
        !matches!(self, UpsertOutcome::Kept(_))
    }
}

/// Immutable view of every stored pattern at one store version.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PatternSnapshot {
    pub version: u64,
    pub patterns: BTreeMap<PatternName, Arc<Pattern>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ViolationKind {
    BudgetExceeded,
    Safety,
    Administrative,
}

impl fmt::Display for ViolationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            ViolationKind::BudgetExceeded => "budget-exceeded",
            ViolationKind::Safety => "safety",
            ViolationKind::Administrative => "administrative",
        };
        f.write_str(label)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ViolationRecord {
    pub agent_id: AgentId,
    pub kind: ViolationKind,
    pub detail: String,
    #[serde(with = "time::serde::rfc3339")]
    pub at: OffsetDateTime,
}

impl ViolationRecord {
    pub fn new(agent_id: impl Into<AgentId>, kind: ViolationKind, detail: impl Into<String>) -> Self {
        Self {
            agent_id: agent_id.into(),
            kind,
            detail: detail.into(),
            at: OffsetDateTime::now_utc(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SuppressionFlag {
    pub kind: ViolationKind,
    pub reason: String,
    #[serde(with = "time::serde::rfc3339")]
    pub since: OffsetDateTime,
}

impl SuppressionFlag {
    pub fn new(kind: ViolationKind, reason: impl Into<String>) -> Self {
        Self {
            kind,
            reason: reason.into(),
            since: OffsetDateTime::now_utc(),
        }
    }
}
