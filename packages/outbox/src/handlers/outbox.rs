use axum::{
    Json,
    extract::{Path, State},
};
use serde::Serialize;
use tracing::instrument;

use crate::error::AppError;
use crate::message::OutboxMessage;
use crate::metrics::DispatchStats;
use crate::monitor::{OutboxStats, collect_stats};
use crate::state::AppState;

#[derive(Debug, Serialize)]
pub struct OutboxStatsResponse {
    pub outbox: OutboxStats,
    /// Counters of the dispatchers running in this process.
    pub dispatch: DispatchStats,
}

/// Current row counts and dispatcher counters.
#[instrument(skip(state))]
pub async fn get_stats(
    State(state): State<AppState>,
) -> Result<Json<OutboxStatsResponse>, AppError> {
    let outbox = collect_stats(state.store.as_ref(), state.monitor.pending_age()).await?;

    Ok(Json(OutboxStatsResponse {
        outbox,
        dispatch: state.dispatch_stats(),
    }))
}

#[instrument(skip(state))]
pub async fn get_message(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<Json<OutboxMessage>, AppError> {
    let message = state
        .store
        .find_by_id(id)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("Outbox message {id} not found")))?;

    Ok(Json(message))
}
