use std::sync::Arc;

use async_trait::async_trait;

use crate::shared::{
    error::SharedStateError,
    types::{
        Pattern, PatternDraft, PatternSnapshot, SuppressionFlag, UpsertOutcome, UpsertPolicy,
        ViolationRecord,
    },
};

/// Store shared by every agent of a network: patterns, suppression flags and the
/// violation log. Implementations must make each pattern upsert atomic per name.
#[async_trait]
pub trait SharedStateBackend: Send + Sync {
    async fn pattern_snapshot(&self) -> Result<Arc<PatternSnapshot>, SharedStateError>;

    async fn get_pattern(&self, name: &str) -> Result<Option<Arc<Pattern>>, SharedStateError>;

    async fn upsert_pattern(
        &self,
        draft: PatternDraft,
        policy: UpsertPolicy,
    ) -> Result<UpsertOutcome, SharedStateError>;

    async fn remove_pattern(&self, name: &str) -> Result<Option<Arc<Pattern>>, SharedStateError>;

    async fn suppression(&self, agent_id: &str)
    -> Result<Option<SuppressionFlag>, SharedStateError>;

    /// `None` clears the flag.
    async fn set_suppression(
        &self,
        agent_id: &str,
        flag: Option<SuppressionFlag>,
    ) -> Result<(), SharedStateError>;

    async fn append_violation(&self, record: ViolationRecord) -> Result<(), SharedStateError>;

    async fn violations(&self) -> Result<Vec<ViolationRecord>, SharedStateError>;
}
