use sea_orm::sea_query::{Index, PostgresQueryBuilder};
use sea_orm::{ConnectionTrait, DatabaseConnection, DbErr};
use tracing::{info, warn};

use crate::entity::outbox_message;

/// Ensure the composite indexes the dispatcher and monitor rely on exist.
///
/// SeaORM's schema-sync doesn't create composite non-unique indexes.
pub async fn ensure_indexes(db: &DatabaseConnection) -> Result<(), DbErr> {
    // Claims and PENDING counts:
    // WHERE status = ? ORDER BY created_at
    let stmt = Index::create()
        .if_not_exists()
        .name("idx_outbox_status_created")
        .table(outbox_message::Entity)
        .col(outbox_message::Column::Status)
        .col(outbox_message::Column::CreatedAt)
        .to_string(PostgresQueryBuilder);
    create_index(db, "idx_outbox_status_created", &stmt).await;

    // Stale reclaim of FAILED and PROCESSING rows:
    // WHERE status = ? AND last_attempt_time < ?
    let stmt = Index::create()
        .if_not_exists()
        .name("idx_outbox_status_last_attempt")
        .table(outbox_message::Entity)
        .col(outbox_message::Column::Status)
        .col(outbox_message::Column::LastAttemptTime)
        .to_string(PostgresQueryBuilder);
    create_index(db, "idx_outbox_status_last_attempt", &stmt).await;

    Ok(())
}

async fn create_index(db: &DatabaseConnection, name: &str, stmt: &str) {
    match db.execute_unprepared(stmt).await {
        Ok(_) => info!(index = name, "Ensured index exists"),
        Err(e) => warn!(index = name, error = %e, "Failed to create index"),
    }
}
