pub mod appender;
pub mod config;
pub mod database;
pub mod dispatcher;
pub mod entity;
pub mod error;
pub mod handlers;
pub mod message;
pub mod metrics;
pub mod monitor;
pub mod registry;
pub mod routes;
pub mod schema;
pub mod sender;
pub mod state;
pub mod store;

use axum::routing::get;

pub use appender::{DomainEvent, OutboxAppender};
pub use dispatcher::{Dispatcher, DispatcherHandle, TickReport};
pub use error::{AppendError, DeliveryError, StoreError};
pub use message::{Headers, NewOutboxMessage, OutboxMessage};
pub use registry::{EventRegistry, EventRoute};
pub use sender::{LogSender, MessageSender, QueueSender};
pub use store::{ClaimQuery, InMemoryMessageStore, MessageStore, SeaOrmMessageStore};

use crate::state::AppState;

/// Build the HTTP router.
pub fn build_router(state: AppState) -> axum::Router {
    axum::Router::new()
        .route("/health", get(handlers::health))
        .nest("/api", routes::api_routes())
        .with_state(state)
}
