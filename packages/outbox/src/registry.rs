use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use common::TopicConfig;
use uuid::Uuid;

use crate::message::Headers;

/// Provenance of one event, handed to custom header builders.
#[derive(Debug, Clone)]
pub struct HeaderContext<'a> {
    pub event_type: &'a str,
    pub event_id: Uuid,
    pub occurred_at: DateTime<Utc>,
    pub aggregate_type: &'a str,
    pub aggregate_id: &'a str,
    pub version: u32,
}

/// Produces extra headers for an event type.
pub type HeaderBuilder = Arc<dyn Fn(&HeaderContext<'_>) -> Headers + Send + Sync>;

/// Where and how events of one type are published.
#[derive(Clone)]
pub struct EventRoute {
    domain: String,
    action: String,
    data_type: String,
    version: u32,
    extra_headers: Option<HeaderBuilder>,
}

impl EventRoute {
    /// Route to `{domain}.event.{action}.v1`.
    pub fn new(domain: impl Into<String>, action: impl Into<String>) -> Self {
        Self {
            domain: domain.into(),
            action: action.into(),
            data_type: "event".into(),
            version: 1,
            extra_headers: None,
        }
    }

    pub fn version(mut self, version: u32) -> Self {
        self.version = version;
        self
    }

    pub fn data_type(mut self, data_type: impl Into<String>) -> Self {
        self.data_type = data_type.into();
        self
    }

    /// Attach extra headers. They never replace the standard ones.
    pub fn with_headers<F>(mut self, builder: F) -> Self
    where
        F: Fn(&HeaderContext<'_>) -> Headers + Send + Sync + 'static,
    {
        self.extra_headers = Some(Arc::new(builder));
        self
    }

    /// `{environment}.{team}.{domain}.{data_type}.{action}.v{version}`
    pub fn topic(&self, config: &TopicConfig) -> String {
        format!(
            "{}.{}.{}.{}.{}.v{}",
            config.environment, config.team, self.domain, self.data_type, self.action, self.version
        )
    }

    pub fn schema_version(&self) -> String {
        format!("v{}", self.version)
    }

    pub(crate) fn version_number(&self) -> u32 {
        self.version
    }

    pub(crate) fn extra_headers(&self) -> Option<&HeaderBuilder> {
        self.extra_headers.as_ref()
    }
}

impl fmt::Debug for EventRoute {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventRoute")
            .field("domain", &self.domain)
            .field("action", &self.action)
            .field("data_type", &self.data_type)
            .field("version", &self.version)
            .field("extra_headers", &self.extra_headers.is_some())
            .finish()
    }
}

/// Event-type tag to route mapping.
#[derive(Debug, Clone, Default)]
pub struct EventRegistry {
    routes: HashMap<String, EventRoute>,
}

impl EventRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `event_type`. A later registration of the same tag wins.
    pub fn register(mut self, event_type: impl Into<String>, route: EventRoute) -> Self {
        self.routes.insert(event_type.into(), route);
        self
    }

    pub fn route(&self, event_type: &str) -> Option<&EventRoute> {
        self.routes.get(event_type)
    }

    pub fn len(&self) -> usize {
        self.routes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.routes.is_empty()
    }

    pub(crate) fn into_routes(self) -> impl Iterator<Item = (String, EventRoute)> {
        self.routes.into_iter()
    }
}
