use std::time::Duration;

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use common::{OutboxErrorCode, OutboxStatus};
use sea_orm::DbErr;
use serde::Serialize;
use thiserror::Error;

/// Failure of a Message Store operation.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Database error: {0}")]
    Database(#[from] DbErr),

    #[error("Outbox message {0} not found")]
    NotFound(i64),

    #[error("Outbox message {id} cannot move from {from} to {to}")]
    InvalidTransition {
        id: i64,
        from: OutboxStatus,
        to: OutboxStatus,
    },

    #[error("Outbox message {id} has malformed headers: {source}")]
    Decode {
        id: i64,
        #[source]
        source: serde_json::Error,
    },
}

/// Failure to hand a message to the broker.
#[derive(Debug, Error)]
pub enum DeliveryError {
    #[error("Broker error: {0}")]
    Broker(String),

    #[error("Send timed out after {0:?}")]
    Timeout(Duration),

    #[error("Message rejected: {0}")]
    Rejected(String),
}

/// Failure while writing events into the outbox.
///
/// Any of these must abort the caller's transaction.
#[derive(Debug, Error)]
pub enum AppendError {
    #[error("No route registered for event type '{0}'")]
    UnregisteredEvent(String),

    #[error("Failed to serialize event '{event_type}': {source}")]
    Serialization {
        event_type: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("Failed to save outbox messages: {0}")]
    Store(#[from] StoreError),
}

impl AppendError {
    pub fn code(&self) -> OutboxErrorCode {
        match self {
            Self::UnregisteredEvent(_) | Self::Serialization { .. } => {
                OutboxErrorCode::SerializationFailed
            }
            Self::Store(_) => OutboxErrorCode::SaveFailed,
        }
    }
}

/// Structured error response returned by the HTTP surface.
#[derive(Serialize)]
pub struct ErrorBody {
    /// Machine-readable error code: `NOT_FOUND` or `INTERNAL_ERROR`.
    pub code: &'static str,
    pub message: String,
}

#[derive(Debug)]
pub enum AppError {
    NotFound(String),
    Internal(String),
}

impl AppError {
    fn status_and_body(self) -> (StatusCode, ErrorBody) {
        match self {
            AppError::NotFound(msg) => (
                StatusCode::NOT_FOUND,
                ErrorBody {
                    code: "NOT_FOUND",
                    message: msg,
                },
            ),
            AppError::Internal(detail) => {
                tracing::error!("Internal error: {}", detail);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    ErrorBody {
                        code: "INTERNAL_ERROR",
                        message: "An unexpected error occurred".into(),
                    },
                )
            }
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, body) = self.status_and_body();
        (status, Json(body)).into_response()
    }
}

impl From<StoreError> for AppError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::NotFound(id) => AppError::NotFound(format!("Outbox message {id} not found")),
            other => AppError::Internal(other.to_string()),
        }
    }
}
