use async_trait::async_trait;
use chrono::{DateTime, Utc};
use common::OutboxStatus;
use sea_orm::sea_query::{Expr, LockBehavior, LockType};
use sea_orm::{
    ActiveModelTrait, ColumnTrait, Condition, ConnectionTrait, DatabaseConnection, EntityTrait,
    IntoActiveModel, PaginatorTrait, QueryFilter, QueryOrder, QuerySelect, Set,
    TransactionTrait,
};
use tracing::debug;

use super::{ClaimQuery, MessageStore};
use crate::entity::outbox_message;
use crate::error::StoreError;
use crate::message::{NewOutboxMessage, OutboxMessage};

/// Insert outbox rows on any connection, usually the caller's open transaction.
pub async fn insert_messages<C: ConnectionTrait>(
    conn: &C,
    messages: Vec<NewOutboxMessage>,
) -> Result<Vec<OutboxMessage>, StoreError> {
    let now = Utc::now();
    let mut created = Vec::with_capacity(messages.len());
    for message in messages {
        let inserted = message.into_active_model(now).insert(conn).await?;
        created.push(OutboxMessage::try_from(inserted)?);
    }
    Ok(created)
}

/// PostgreSQL-backed message store.
#[derive(Clone)]
pub struct SeaOrmMessageStore {
    db: DatabaseConnection,
}

impl SeaOrmMessageStore {
    pub fn new(db: DatabaseConnection) -> Self {
        Self { db }
    }

    /// Work out why a guarded update touched no row.
    async fn rejected_transition(&self, id: i64, to: OutboxStatus) -> StoreError {
        match outbox_message::Entity::find_by_id(id).one(&self.db).await {
            Ok(Some(row)) => StoreError::InvalidTransition {
                id,
                from: row.status,
                to,
            },
            Ok(None) => StoreError::NotFound(id),
            Err(e) => StoreError::Database(e),
        }
    }
}

fn stale_condition(stale_before: DateTime<Utc>) -> Condition {
    Condition::any()
        .add(outbox_message::Column::LastAttemptTime.is_null())
        .add(outbox_message::Column::LastAttemptTime.lt(stale_before))
}

fn claim_condition(query: &ClaimQuery) -> Option<Condition> {
    let mut condition = Condition::any();
    let mut any = false;

    for status in &query.statuses {
        let branch = match status {
            OutboxStatus::Pending => {
                Condition::all().add(outbox_message::Column::Status.eq(OutboxStatus::Pending))
            }
            OutboxStatus::Failed => Condition::all()
                .add(outbox_message::Column::Status.eq(OutboxStatus::Failed))
                .add(outbox_message::Column::RetryCount.lte(query.max_retries as i32))
                .add(stale_condition(query.stale_before)),
            OutboxStatus::Processing => Condition::all()
                .add(outbox_message::Column::Status.eq(OutboxStatus::Processing))
                .add(stale_condition(query.stale_before)),
            OutboxStatus::Sent | OutboxStatus::DeadLettered => continue,
        };
        condition = condition.add(branch);
        any = true;
    }

    any.then_some(condition)
}

#[async_trait]
impl MessageStore for SeaOrmMessageStore {
    async fn create(
        &self,
        messages: Vec<NewOutboxMessage>,
    ) -> Result<Vec<OutboxMessage>, StoreError> {
        let txn = self.db.begin().await?;
        let created = insert_messages(&txn, messages).await?;
        txn.commit().await?;
        Ok(created)
    }

    async fn claim_batch(&self, query: &ClaimQuery) -> Result<Vec<OutboxMessage>, StoreError> {
        let Some(condition) = claim_condition(query) else {
            return Ok(Vec::new());
        };

        let txn = self.db.begin().await?;

        // SELECT ... FOR UPDATE SKIP LOCKED: concurrent claimers pass over
        // each other's rows instead of waiting on them.
        let rows = outbox_message::Entity::find()
            .filter(condition)
            .order_by_asc(outbox_message::Column::CreatedAt)
            .order_by_asc(outbox_message::Column::Id)
            .limit(query.limit)
            .lock_with_behavior(LockType::Update, LockBehavior::SkipLocked)
            .all(&txn)
            .await?;

        if rows.is_empty() {
            txn.commit().await?;
            return Ok(Vec::new());
        }

        let now = Utc::now();
        let ids: Vec<i64> = rows.iter().map(|r| r.id).collect();

        outbox_message::Entity::update_many()
            .col_expr(
                outbox_message::Column::Status,
                Expr::value(OutboxStatus::Processing),
            )
            .col_expr(outbox_message::Column::LastAttemptTime, Expr::value(now))
            .col_expr(outbox_message::Column::UpdatedAt, Expr::value(now))
            .filter(outbox_message::Column::Id.is_in(ids))
            .exec(&txn)
            .await?;

        txn.commit().await?;

        debug!(count = rows.len(), "Claimed outbox messages");

        rows.into_iter()
            .map(|mut row| {
                row.status = OutboxStatus::Processing;
                row.last_attempt_time = Some(now);
                row.updated_at = now;
                OutboxMessage::try_from(row)
            })
            .collect()
    }

    async fn mark_sent(&self, id: i64) -> Result<(), StoreError> {
        let result = outbox_message::Entity::update_many()
            .col_expr(outbox_message::Column::Status, Expr::value(OutboxStatus::Sent))
            .col_expr(outbox_message::Column::UpdatedAt, Expr::value(Utc::now()))
            .filter(outbox_message::Column::Id.eq(id))
            .filter(outbox_message::Column::Status.eq(OutboxStatus::Processing))
            .exec(&self.db)
            .await?;

        if result.rows_affected > 0 {
            return Ok(());
        }
        Err(self.rejected_transition(id, OutboxStatus::Sent).await)
    }

    async fn mark_failed(&self, id: i64, increment_retry: bool) -> Result<u32, StoreError> {
        let txn = self.db.begin().await?;

        let row = outbox_message::Entity::find_by_id(id)
            .lock(LockType::Update)
            .one(&txn)
            .await?;

        let Some(row) = row else {
            txn.rollback().await?;
            return Err(StoreError::NotFound(id));
        };

        if row.status != OutboxStatus::Processing {
            txn.rollback().await?;
            return Err(StoreError::InvalidTransition {
                id,
                from: row.status,
                to: OutboxStatus::Failed,
            });
        }

        let retry_count = if increment_retry {
            row.retry_count + 1
        } else {
            row.retry_count
        };

        let mut active = row.into_active_model();
        active.status = Set(OutboxStatus::Failed);
        active.retry_count = Set(retry_count);
        active.updated_at = Set(Utc::now());
        active.update(&txn).await?;

        txn.commit().await?;

        Ok(u32::try_from(retry_count).unwrap_or(0))
    }

    async fn mark_dead_lettered(&self, id: i64) -> Result<(), StoreError> {
        let result = outbox_message::Entity::update_many()
            .col_expr(
                outbox_message::Column::Status,
                Expr::value(OutboxStatus::DeadLettered),
            )
            .col_expr(outbox_message::Column::UpdatedAt, Expr::value(Utc::now()))
            .filter(outbox_message::Column::Id.eq(id))
            .filter(
                outbox_message::Column::Status
                    .is_in([OutboxStatus::Processing, OutboxStatus::Failed]),
            )
            .exec(&self.db)
            .await?;

        if result.rows_affected > 0 {
            return Ok(());
        }
        Err(self.rejected_transition(id, OutboxStatus::DeadLettered).await)
    }

    async fn count_by_status(&self, status: OutboxStatus) -> Result<u64, StoreError> {
        let count = outbox_message::Entity::find()
            .filter(outbox_message::Column::Status.eq(status))
            .count(&self.db)
            .await?;
        Ok(count)
    }

    async fn count_pending_older_than(&self, cutoff: DateTime<Utc>) -> Result<u64, StoreError> {
        let count = outbox_message::Entity::find()
            .filter(outbox_message::Column::Status.eq(OutboxStatus::Pending))
            .filter(outbox_message::Column::CreatedAt.lt(cutoff))
            .count(&self.db)
            .await?;
        Ok(count)
    }

    async fn dead_letter_exhausted(&self, max_retries: u32) -> Result<u64, StoreError> {
        let result = outbox_message::Entity::update_many()
            .col_expr(
                outbox_message::Column::Status,
                Expr::value(OutboxStatus::DeadLettered),
            )
            .col_expr(outbox_message::Column::UpdatedAt, Expr::value(Utc::now()))
            .filter(outbox_message::Column::Status.eq(OutboxStatus::Failed))
            .filter(outbox_message::Column::RetryCount.gt(max_retries as i32))
            .exec(&self.db)
            .await?;
        Ok(result.rows_affected)
    }

    async fn find_by_id(&self, id: i64) -> Result<Option<OutboxMessage>, StoreError> {
        outbox_message::Entity::find_by_id(id)
            .one(&self.db)
            .await?
            .map(OutboxMessage::try_from)
            .transpose()
    }
}
