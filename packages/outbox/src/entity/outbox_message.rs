use common::OutboxStatus;
use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// Event waiting to be relayed to the broker.
#[sea_orm::model]
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "outbox_message")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i64,

    #[sea_orm(column_type = "Text")]
    pub payload: String,

    pub topic: String,

    /// String-to-string map stored as a JSON object.
    #[sea_orm(column_type = "JsonBinary")]
    pub headers: serde_json::Value,

    pub aggregate_type: String,

    #[sea_orm(indexed)]
    pub aggregate_id: String,

    pub event_type: String,

    pub status: OutboxStatus,

    #[sea_orm(default_value = 0)]
    pub retry_count: i32,

    pub last_attempt_time: Option<DateTimeUtc>,

    pub created_at: DateTimeUtc,

    pub updated_at: DateTimeUtc,
}

impl ActiveModelBehavior for ActiveModel {}
