use std::collections::BTreeMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use common::OutboxStatus;
use tokio::sync::Mutex;

use super::{ClaimQuery, MessageStore};
use crate::error::StoreError;
use crate::message::{NewOutboxMessage, OutboxMessage};

#[derive(Debug, Default)]
struct State {
    rows: BTreeMap<i64, OutboxMessage>,
    next_id: i64,
}

impl State {
    fn row_mut(&mut self, id: i64) -> Result<&mut OutboxMessage, StoreError> {
        self.rows.get_mut(&id).ok_or(StoreError::NotFound(id))
    }
}

/// Message store kept in process memory.
///
/// Every operation holds one lock, which gives claims the same exclusivity
/// the database gets from `SKIP LOCKED`. Suits tests and embedders that keep
/// their aggregates in memory.
#[derive(Debug, Default)]
pub struct InMemoryMessageStore {
    state: Mutex<State>,
}

impl InMemoryMessageStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// All rows ordered by id.
    pub async fn messages(&self) -> Vec<OutboxMessage> {
        self.state.lock().await.rows.values().cloned().collect()
    }
}

fn transition(row: &mut OutboxMessage, to: OutboxStatus) -> Result<(), StoreError> {
    if !row.status.can_transition_to(to) {
        return Err(StoreError::InvalidTransition {
            id: row.id,
            from: row.status,
            to,
        });
    }
    let now = Utc::now();
    row.status = to;
    row.updated_at = now;
    if to == OutboxStatus::Processing {
        row.last_attempt_time = Some(now);
    }
    Ok(())
}

#[async_trait]
impl MessageStore for InMemoryMessageStore {
    async fn create(
        &self,
        messages: Vec<NewOutboxMessage>,
    ) -> Result<Vec<OutboxMessage>, StoreError> {
        let mut state = self.state.lock().await;
        let now = Utc::now();
        let mut created = Vec::with_capacity(messages.len());
        for message in messages {
            state.next_id += 1;
            let row = message.into_message(state.next_id, now);
            state.rows.insert(row.id, row.clone());
            created.push(row);
        }
        Ok(created)
    }

    async fn claim_batch(&self, query: &ClaimQuery) -> Result<Vec<OutboxMessage>, StoreError> {
        let mut state = self.state.lock().await;

        let mut candidates: Vec<(DateTime<Utc>, i64)> = state
            .rows
            .values()
            .filter(|row| query.matches(row))
            .map(|row| (row.created_at, row.id))
            .collect();
        candidates.sort();
        candidates.truncate(usize::try_from(query.limit).unwrap_or(usize::MAX));

        let mut claimed = Vec::with_capacity(candidates.len());
        for (_, id) in candidates {
            let row = state.row_mut(id)?;
            transition(row, OutboxStatus::Processing)?;
            claimed.push(row.clone());
        }
        Ok(claimed)
    }

    async fn mark_sent(&self, id: i64) -> Result<(), StoreError> {
        let mut state = self.state.lock().await;
        transition(state.row_mut(id)?, OutboxStatus::Sent)
    }

    async fn mark_failed(&self, id: i64, increment_retry: bool) -> Result<u32, StoreError> {
        let mut state = self.state.lock().await;
        let row = state.row_mut(id)?;
        transition(row, OutboxStatus::Failed)?;
        if increment_retry {
            row.retry_count += 1;
        }
        Ok(row.retry_count)
    }

    async fn mark_dead_lettered(&self, id: i64) -> Result<(), StoreError> {
        let mut state = self.state.lock().await;
        transition(state.row_mut(id)?, OutboxStatus::DeadLettered)
    }

    async fn count_by_status(&self, status: OutboxStatus) -> Result<u64, StoreError> {
        let state = self.state.lock().await;
        Ok(state.rows.values().filter(|r| r.status == status).count() as u64)
    }

    async fn count_pending_older_than(&self, cutoff: DateTime<Utc>) -> Result<u64, StoreError> {
        let state = self.state.lock().await;
        Ok(state
            .rows
            .values()
            .filter(|r| r.status == OutboxStatus::Pending && r.created_at < cutoff)
            .count() as u64)
    }

    async fn dead_letter_exhausted(&self, max_retries: u32) -> Result<u64, StoreError> {
        let mut state = self.state.lock().await;
        let mut moved = 0;
        for row in state.rows.values_mut() {
            if row.status == OutboxStatus::Failed && row.retry_count > max_retries {
                transition(row, OutboxStatus::DeadLettered)?;
                moved += 1;
            }
        }
        Ok(moved)
    }

    async fn find_by_id(&self, id: i64) -> Result<Option<OutboxMessage>, StoreError> {
        Ok(self.state.lock().await.rows.get(&id).cloned())
    }
}
