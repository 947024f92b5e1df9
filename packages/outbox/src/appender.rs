use std::collections::HashMap;

use chrono::{DateTime, Utc};
use common::envelope::headers;
use common::{OutboxErrorCode, TopicConfig};
use sea_orm::ConnectionTrait;
use serde::Serialize;
use tracing::{debug, error};
use uuid::Uuid;

use crate::error::AppendError;
use crate::message::{Headers, NewOutboxMessage, OutboxMessage};
use crate::registry::{EventRegistry, HeaderBuilder, HeaderContext};
use crate::store::{MessageStore, insert_messages};

/// An event emitted by an aggregate.
///
/// Events of several kinds usually share one enum; `event_type` returns the
/// tag of the variant and selects the registry route.
pub trait DomainEvent: Serialize + Send + Sync {
    fn event_type(&self) -> &str;
    fn event_id(&self) -> Uuid;
    fn occurred_at(&self) -> DateTime<Utc>;

    /// Id tying this event to the request or workflow that caused it.
    fn correlation_id(&self) -> Option<String> {
        None
    }
}

struct ResolvedRoute {
    topic: String,
    schema_version: String,
    version: u32,
    extra_headers: Option<HeaderBuilder>,
}

/// Writes events into the outbox as part of the caller's transaction.
pub struct OutboxAppender {
    routes: HashMap<String, ResolvedRoute>,
}

impl OutboxAppender {
    /// Render every registered route once.
    pub fn new(registry: EventRegistry, topics: &TopicConfig) -> Self {
        let routes = registry
            .into_routes()
            .map(|(event_type, route)| {
                let resolved = ResolvedRoute {
                    topic: route.topic(topics),
                    schema_version: route.schema_version(),
                    version: route.version_number(),
                    extra_headers: route.extra_headers().cloned(),
                };
                (event_type, resolved)
            })
            .collect();

        Self { routes }
    }

    /// Topic events of `event_type` are published to.
    pub fn topic_for(&self, event_type: &str) -> Option<&str> {
        self.routes.get(event_type).map(|r| r.topic.as_str())
    }

    /// Turn events into PENDING rows without writing them.
    pub fn build<E: DomainEvent>(
        &self,
        events: &[E],
        aggregate_type: &str,
        aggregate_id: &str,
    ) -> Result<Vec<NewOutboxMessage>, AppendError> {
        events
            .iter()
            .map(|event| self.build_one(event, aggregate_type, aggregate_id))
            .collect()
    }

    fn build_one<E: DomainEvent>(
        &self,
        event: &E,
        aggregate_type: &str,
        aggregate_id: &str,
    ) -> Result<NewOutboxMessage, AppendError> {
        let event_type = event.event_type();
        let route = self
            .routes
            .get(event_type)
            .ok_or_else(|| AppendError::UnregisteredEvent(event_type.to_string()))?;

        let payload =
            serde_json::to_string(event).map_err(|source| AppendError::Serialization {
                event_type: event_type.to_string(),
                source,
            })?;

        let ctx = HeaderContext {
            event_type,
            event_id: event.event_id(),
            occurred_at: event.occurred_at(),
            aggregate_type,
            aggregate_id,
            version: route.version,
        };

        let mut message_headers = Headers::from([
            (headers::EVENT_ID.to_string(), ctx.event_id.to_string()),
            (headers::EVENT_TYPE.to_string(), event_type.to_string()),
            (headers::AGGREGATE_TYPE.to_string(), aggregate_type.to_string()),
            (headers::AGGREGATE_ID.to_string(), aggregate_id.to_string()),
            (headers::OCCURRED_AT.to_string(), ctx.occurred_at.to_rfc3339()),
            (
                headers::CONTENT_TYPE.to_string(),
                headers::APPLICATION_JSON.to_string(),
            ),
            (
                headers::SCHEMA_VERSION.to_string(),
                route.schema_version.clone(),
            ),
        ]);
        if let Some(correlation_id) = event.correlation_id() {
            message_headers.insert(headers::CORRELATION_ID.to_string(), correlation_id);
        }
        if let Some(builder) = &route.extra_headers {
            for (name, value) in builder(&ctx) {
                message_headers.entry(name).or_insert(value);
            }
        }

        Ok(NewOutboxMessage {
            payload,
            topic: route.topic.clone(),
            headers: message_headers,
            aggregate_type: aggregate_type.to_string(),
            aggregate_id: aggregate_id.to_string(),
            event_type: event_type.to_string(),
        })
    }

    /// Append events on `conn`, normally the transaction that persists the aggregate.
    ///
    /// On error nothing has been committed by this call; the caller must roll
    /// back so the aggregate change is discarded with its events.
    pub async fn append<C, E>(
        &self,
        conn: &C,
        events: &[E],
        aggregate_type: &str,
        aggregate_id: &str,
    ) -> Result<Vec<OutboxMessage>, AppendError>
    where
        C: ConnectionTrait,
        E: DomainEvent,
    {
        if events.is_empty() {
            return Ok(Vec::new());
        }

        let messages = self
            .build(events, aggregate_type, aggregate_id)
            .inspect_err(|e| {
                error!(
                    code = %e.code(),
                    aggregate_type,
                    aggregate_id,
                    error = %e,
                    "Failed to build outbox messages"
                );
            })?;

        let created = insert_messages(conn, messages).await.inspect_err(|e| {
            error!(
                code = %OutboxErrorCode::SaveFailed,
                aggregate_type,
                aggregate_id,
                error = %e,
                "Failed to save outbox messages"
            );
        })?;

        debug!(
            count = created.len(),
            aggregate_type, aggregate_id, "Appended outbox messages"
        );
        Ok(created)
    }

    /// Append events through a [`MessageStore`] instead of a SeaORM connection.
    pub async fn append_to<S, E>(
        &self,
        store: &S,
        events: &[E],
        aggregate_type: &str,
        aggregate_id: &str,
    ) -> Result<Vec<OutboxMessage>, AppendError>
    where
        S: MessageStore + ?Sized,
        E: DomainEvent,
    {
        if events.is_empty() {
            return Ok(Vec::new());
        }

        let messages = self.build(events, aggregate_type, aggregate_id)?;
        Ok(store.create(messages).await?)
    }
}
