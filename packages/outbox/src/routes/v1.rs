use axum::{Router, routing::get};

use crate::handlers;
use crate::state::AppState;

pub fn routes() -> Router<AppState> {
    Router::new().nest("/outbox", outbox_routes())
}

fn outbox_routes() -> Router<AppState> {
    Router::new()
        .route("/stats", get(handlers::outbox::get_stats))
        .route("/messages/{id}", get(handlers::outbox::get_message))
}
