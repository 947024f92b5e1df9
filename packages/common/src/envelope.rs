use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Well-known header names written by the appender.
pub mod headers {
    pub const EVENT_ID: &str = "eventId";
    pub const EVENT_TYPE: &str = "eventType";
    pub const AGGREGATE_TYPE: &str = "aggregateType";
    pub const AGGREGATE_ID: &str = "aggregateId";
    pub const OCCURRED_AT: &str = "occurredAt";
    pub const CONTENT_TYPE: &str = "contentType";
    pub const SCHEMA_VERSION: &str = "schemaVersion";
    /// Only written when the event carries one.
    pub const CORRELATION_ID: &str = "correlationId";

    pub const APPLICATION_JSON: &str = "application/json";
}

/// Record published to the broker for one outbox message.
///
/// `key` carries the aggregate id so consumers can partition per aggregate.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BrokerEnvelope {
    /// Outbox row id, stable across redeliveries. Consumers deduplicate on it.
    pub message_id: String,
    pub topic: String,
    pub key: String,
    pub event_type: String,
    pub headers: BTreeMap<String, String>,
    /// Serialized event body, passed through untouched.
    pub payload: String,
}

impl BrokerEnvelope {
    /// Look up a header value.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).map(String::as_str)
    }

    /// Decode the payload as JSON.
    pub fn payload_json(&self) -> Result<serde_json::Value, serde_json::Error> {
        serde_json::from_str(&self.payload)
    }
}
