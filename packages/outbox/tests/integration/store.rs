use std::collections::HashSet;

use chrono::{TimeDelta, Utc};
use common::{DeadLetterPolicy, OutboxStatus};
use sea_orm::{ConnectionTrait, DatabaseConnection, TransactionTrait};

use outbox::{ClaimQuery, MessageStore, SeaOrmMessageStore, StoreError};

use crate::common::{OrderEvent, new_message, new_messages, order_appender, test_db};

fn claim(limit: u64) -> ClaimQuery {
    ClaimQuery::deliverable(
        limit,
        DeadLetterPolicy::default(),
        Utc::now() - TimeDelta::seconds(30),
    )
}

async fn create_orders_table(db: &DatabaseConnection) {
    db.execute_unprepared("CREATE TABLE orders (id TEXT PRIMARY KEY, total INTEGER NOT NULL)")
        .await
        .expect("Failed to create orders table");
}

async fn count_orders(db: &DatabaseConnection) -> i64 {
    let row = db
        .query_one_raw(sea_orm::Statement::from_string(
            sea_orm::DbBackend::Postgres,
            "SELECT COUNT(*) AS n FROM orders".to_string(),
        ))
        .await
        .expect("Failed to count orders")
        .expect("COUNT returned no row");
    row.try_get::<i64>("", "n").unwrap()
}

#[tokio::test]
async fn test_append_commits_with_aggregate() {
    let db = test_db().await;
    create_orders_table(&db).await;
    let store = SeaOrmMessageStore::new(db.clone());
    let appender = order_appender();

    let txn = db.begin().await.unwrap();
    txn.execute_unprepared("INSERT INTO orders (id, total) VALUES ('o-1', 42)")
        .await
        .unwrap();
    let created = appender
        .append(
            &txn,
            &[OrderEvent::Placed { total: 42 }, OrderEvent::Cancelled],
            "Order",
            "o-1",
        )
        .await
        .unwrap();
    txn.commit().await.unwrap();

    assert_eq!(created.len(), 2);
    assert_eq!(count_orders(&db).await, 1);
    assert_eq!(store.count_by_status(OutboxStatus::Pending).await.unwrap(), 2);

    let stored = store.find_by_id(created[0].id).await.unwrap().unwrap();
    assert_eq!(stored.topic, "dev.restaurant.order.event.placed.v1");
    assert_eq!(stored.headers.get("aggregateId").map(String::as_str), Some("o-1"));
    assert_eq!(stored.retry_count, 0);
    assert!(stored.last_attempt_time.is_none());
}

#[tokio::test]
async fn test_append_rolls_back_with_aggregate() {
    let db = test_db().await;
    create_orders_table(&db).await;
    let store = SeaOrmMessageStore::new(db.clone());

    let txn = db.begin().await.unwrap();
    txn.execute_unprepared("INSERT INTO orders (id, total) VALUES ('o-1', 42)")
        .await
        .unwrap();
    order_appender()
        .append(&txn, &[OrderEvent::Placed { total: 42 }], "Order", "o-1")
        .await
        .unwrap();
    txn.rollback().await.unwrap();

    assert_eq!(count_orders(&db).await, 0);
    assert_eq!(store.count_by_status(OutboxStatus::Pending).await.unwrap(), 0);
}

#[tokio::test]
async fn test_append_nothing_writes_nothing() {
    let db = test_db().await;
    let store = SeaOrmMessageStore::new(db.clone());

    let created = order_appender()
        .append::<_, OrderEvent>(&db, &[], "Order", "o-1")
        .await
        .unwrap();

    assert!(created.is_empty());
    assert_eq!(store.count_by_status(OutboxStatus::Pending).await.unwrap(), 0);
}

#[tokio::test]
async fn test_claim_orders_by_creation_and_marks_processing() {
    let store = SeaOrmMessageStore::new(test_db().await);
    store.create(new_messages(5)).await.unwrap();

    let claimed = store.claim_batch(&claim(3)).await.unwrap();

    let ids: Vec<_> = claimed.iter().map(|m| m.id).collect();
    assert_eq!(ids, vec![1, 2, 3]);
    assert!(claimed.iter().all(|m| m.status == OutboxStatus::Processing));
    assert!(claimed.iter().all(|m| m.last_attempt_time.is_some()));
    assert_eq!(store.count_by_status(OutboxStatus::Processing).await.unwrap(), 3);
    assert_eq!(store.count_by_status(OutboxStatus::Pending).await.unwrap(), 2);
}

#[tokio::test]
async fn test_concurrent_claims_are_disjoint() {
    let store = SeaOrmMessageStore::new(test_db().await);
    store.create(new_messages(150)).await.unwrap();
    let other = store.clone();

    let query = claim(100);
    let (a, b) = tokio::join!(store.claim_batch(&query), other.claim_batch(&query));
    let (a, b) = (a.unwrap(), b.unwrap());

    assert!(a.len() <= 100 && b.len() <= 100);
    assert!(a.len() + b.len() <= 150);
    let first: HashSet<i64> = a.iter().map(|m| m.id).collect();
    let second: HashSet<i64> = b.iter().map(|m| m.id).collect();
    assert!(first.is_disjoint(&second));

    let rest = store.claim_batch(&claim(150)).await.unwrap();
    let mut all: HashSet<i64> = first.union(&second).copied().collect();
    for message in &rest {
        assert!(all.insert(message.id), "message {} claimed twice", message.id);
    }
    assert_eq!(all.len(), 150);
}

#[tokio::test]
async fn test_stale_processing_is_reclaimed() {
    let store = SeaOrmMessageStore::new(test_db().await);
    store.create(vec![new_message("o-1")]).await.unwrap();

    assert_eq!(store.claim_batch(&claim(10)).await.unwrap().len(), 1);
    assert!(store.claim_batch(&claim(10)).await.unwrap().is_empty());

    let after_window = ClaimQuery::deliverable(
        10,
        DeadLetterPolicy::default(),
        Utc::now() + TimeDelta::seconds(1),
    );
    let reclaimed = store.claim_batch(&after_window).await.unwrap();
    assert_eq!(reclaimed.len(), 1);
    assert_eq!(reclaimed[0].status, OutboxStatus::Processing);
}

#[tokio::test]
async fn test_failed_rows_wait_for_window_and_budget() {
    let store = SeaOrmMessageStore::new(test_db().await);
    store.create(vec![new_message("o-1")]).await.unwrap();
    let policy = DeadLetterPolicy::new(1);
    let later = || ClaimQuery::deliverable(10, policy, Utc::now() + TimeDelta::seconds(1));

    store.claim_batch(&claim(10)).await.unwrap();
    assert_eq!(store.mark_failed(1, true).await.unwrap(), 1);
    assert!(store.claim_batch(&claim(10)).await.unwrap().is_empty());

    assert_eq!(store.claim_batch(&later()).await.unwrap().len(), 1);
    assert_eq!(store.mark_failed(1, true).await.unwrap(), 2);
    assert!(store.claim_batch(&later()).await.unwrap().is_empty());

    assert_eq!(store.dead_letter_exhausted(policy.max_retries).await.unwrap(), 1);
    let row = store.find_by_id(1).await.unwrap().unwrap();
    assert_eq!(row.status, OutboxStatus::DeadLettered);
    assert_eq!(row.retry_count, 2);
}

#[tokio::test]
async fn test_mark_operations_guard_transitions() {
    let store = SeaOrmMessageStore::new(test_db().await);
    store.create(new_messages(2)).await.unwrap();

    assert!(matches!(
        store.mark_sent(1).await,
        Err(StoreError::InvalidTransition {
            id: 1,
            from: OutboxStatus::Pending,
            to: OutboxStatus::Sent
        })
    ));

    store.claim_batch(&claim(10)).await.unwrap();
    store.mark_sent(1).await.unwrap();
    assert!(matches!(
        store.mark_failed(1, true).await,
        Err(StoreError::InvalidTransition { .. })
    ));
    assert!(matches!(
        store.mark_dead_lettered(1).await,
        Err(StoreError::InvalidTransition { .. })
    ));

    assert_eq!(store.mark_failed(2, false).await.unwrap(), 0);
    store.mark_dead_lettered(2).await.unwrap();

    assert!(matches!(
        store.mark_sent(999).await,
        Err(StoreError::NotFound(999))
    ));
    assert!(matches!(
        store.mark_failed(999, true).await,
        Err(StoreError::NotFound(999))
    ));
}

#[tokio::test]
async fn test_counts() {
    let store = SeaOrmMessageStore::new(test_db().await);
    store.create(new_messages(4)).await.unwrap();
    store.claim_batch(&claim(2)).await.unwrap();
    store.mark_sent(1).await.unwrap();

    assert_eq!(store.count_by_status(OutboxStatus::Pending).await.unwrap(), 2);
    assert_eq!(store.count_by_status(OutboxStatus::Processing).await.unwrap(), 1);
    assert_eq!(store.count_by_status(OutboxStatus::Sent).await.unwrap(), 1);
    assert_eq!(store.count_by_status(OutboxStatus::Failed).await.unwrap(), 0);

    let past = Utc::now() - TimeDelta::minutes(5);
    let future = Utc::now() + TimeDelta::seconds(1);
    assert_eq!(store.count_pending_older_than(past).await.unwrap(), 0);
    assert_eq!(store.count_pending_older_than(future).await.unwrap(), 2);
}
