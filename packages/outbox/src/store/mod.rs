mod memory;
mod postgres;

pub use memory::InMemoryMessageStore;
pub use postgres::{SeaOrmMessageStore, insert_messages};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use common::{DeadLetterPolicy, OutboxStatus};

use crate::error::StoreError;
use crate::message::{NewOutboxMessage, OutboxMessage};

/// Selection for one claim.
///
/// A row is claimable when its status is listed in `statuses` and
/// - it is `PENDING`, or
/// - it is `FAILED`, within the retry budget, and last attempted before `stale_before`, or
/// - it is `PROCESSING` and was claimed before `stale_before` (its claimer is gone).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClaimQuery {
    pub statuses: Vec<OutboxStatus>,
    pub limit: u64,
    pub max_retries: u32,
    pub stale_before: DateTime<Utc>,
}

impl ClaimQuery {
    /// Everything a dispatcher may deliver.
    pub fn deliverable(limit: u64, policy: DeadLetterPolicy, stale_before: DateTime<Utc>) -> Self {
        Self {
            statuses: OutboxStatus::CLAIMABLE.to_vec(),
            limit,
            max_retries: policy.max_retries,
            stale_before,
        }
    }

    /// Whether `message` satisfies this claim's predicate.
    pub fn matches(&self, message: &OutboxMessage) -> bool {
        if !self.statuses.contains(&message.status) {
            return false;
        }
        let stale = message
            .last_attempt_time
            .is_none_or(|at| at < self.stale_before);
        match message.status {
            OutboxStatus::Pending => true,
            OutboxStatus::Failed => message.retry_count <= self.max_retries && stale,
            OutboxStatus::Processing => stale,
            OutboxStatus::Sent | OutboxStatus::DeadLettered => false,
        }
    }
}

/// Persistence port for outbox rows.
///
/// Implementations must make `claim_batch` atomic: two concurrent claims
/// never return the same id.
#[async_trait]
pub trait MessageStore: Send + Sync {
    /// Insert new PENDING rows.
    async fn create(
        &self,
        messages: Vec<NewOutboxMessage>,
    ) -> Result<Vec<OutboxMessage>, StoreError>;

    /// Lock and take up to `query.limit` rows, oldest first, marking them PROCESSING.
    async fn claim_batch(&self, query: &ClaimQuery) -> Result<Vec<OutboxMessage>, StoreError>;

    /// PROCESSING -> SENT.
    async fn mark_sent(&self, id: i64) -> Result<(), StoreError>;

    /// PROCESSING -> FAILED. Returns the retry counter after the update.
    async fn mark_failed(&self, id: i64, increment_retry: bool) -> Result<u32, StoreError>;

    /// PROCESSING or FAILED -> DEAD_LETTERED.
    async fn mark_dead_lettered(&self, id: i64) -> Result<(), StoreError>;

    async fn count_by_status(&self, status: OutboxStatus) -> Result<u64, StoreError>;

    /// Number of PENDING rows created before `cutoff`.
    async fn count_pending_older_than(&self, cutoff: DateTime<Utc>) -> Result<u64, StoreError>;

    /// Park FAILED rows whose retry counter already exceeds `max_retries`.
    /// Returns how many rows were moved.
    async fn dead_letter_exhausted(&self, max_retries: u32) -> Result<u64, StoreError>;

    async fn find_by_id(&self, id: i64) -> Result<Option<OutboxMessage>, StoreError>;
}
