use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use common::{BrokerEnvelope, OutboxStatus};
use sea_orm::Set;
use serde::Serialize;

use crate::entity::outbox_message;
use crate::error::StoreError;

/// Ordered string-to-string headers forwarded to the broker unchanged.
///
/// Iteration and serialization follow header name order, not insertion order.
pub type Headers = BTreeMap<String, String>;

/// A persisted outbox row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OutboxMessage {
    pub id: i64,
    pub payload: String,
    pub topic: String,
    pub headers: Headers,
    pub aggregate_type: String,
    pub aggregate_id: String,
    pub event_type: String,
    pub status: OutboxStatus,
    pub retry_count: u32,
    pub last_attempt_time: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl OutboxMessage {
    /// Build the record handed to the broker.
    pub fn to_envelope(&self) -> BrokerEnvelope {
        BrokerEnvelope {
            message_id: self.id.to_string(),
            topic: self.topic.clone(),
            key: self.aggregate_id.clone(),
            event_type: self.event_type.clone(),
            headers: self.headers.clone(),
            payload: self.payload.clone(),
        }
    }
}

impl TryFrom<outbox_message::Model> for OutboxMessage {
    type Error = StoreError;

    fn try_from(m: outbox_message::Model) -> Result<Self, Self::Error> {
        let headers: Headers =
            serde_json::from_value(m.headers).map_err(|source| StoreError::Decode {
                id: m.id,
                source,
            })?;

        Ok(Self {
            id: m.id,
            payload: m.payload,
            topic: m.topic,
            headers,
            aggregate_type: m.aggregate_type,
            aggregate_id: m.aggregate_id,
            event_type: m.event_type,
            status: m.status,
            retry_count: u32::try_from(m.retry_count).unwrap_or(0),
            last_attempt_time: m.last_attempt_time,
            created_at: m.created_at,
            updated_at: m.updated_at,
        })
    }
}

/// An outbox row before it has been assigned an id.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewOutboxMessage {
    pub payload: String,
    pub topic: String,
    pub headers: Headers,
    pub aggregate_type: String,
    pub aggregate_id: String,
    pub event_type: String,
}

impl NewOutboxMessage {
    /// Materialize as a PENDING row created at `now`.
    pub fn into_message(self, id: i64, now: DateTime<Utc>) -> OutboxMessage {
        OutboxMessage {
            id,
            payload: self.payload,
            topic: self.topic,
            headers: self.headers,
            aggregate_type: self.aggregate_type,
            aggregate_id: self.aggregate_id,
            event_type: self.event_type,
            status: OutboxStatus::Pending,
            retry_count: 0,
            last_attempt_time: None,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn into_active_model(self, now: DateTime<Utc>) -> outbox_message::ActiveModel {
        let headers = serde_json::Value::Object(
            self.headers
                .into_iter()
                .map(|(k, v)| (k, serde_json::Value::String(v)))
                .collect(),
        );

        outbox_message::ActiveModel {
            payload: Set(self.payload),
            topic: Set(self.topic),
            headers: Set(headers),
            aggregate_type: Set(self.aggregate_type),
            aggregate_id: Set(self.aggregate_id),
            event_type: Set(self.event_type),
            status: Set(OutboxStatus::Pending),
            retry_count: Set(0),
            last_attempt_time: Set(None),
            created_at: Set(now),
            updated_at: Set(now),
            ..Default::default()
        }
    }
}
