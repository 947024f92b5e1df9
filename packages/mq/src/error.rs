use thiserror::Error;

#[derive(Debug, Error)]
pub enum MqError {
    #[error("Failed to connect to broker: {0}")]
    Connection(String),

    #[error("{0}")]
    Internal(String),
}

impl From<broccoli_queue::error::BroccoliError> for MqError {
    fn from(e: broccoli_queue::error::BroccoliError) -> Self {
        MqError::Internal(e.to_string())
    }
}
