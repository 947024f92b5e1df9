use broccoli_queue::queue::BroccoliQueue;
use tracing::info;

use crate::error::MqError;

pub type MqQueue = BroccoliQueue;

pub struct MqConfig {
    pub url: String,
    pub pool_size: u8,
}

/// Connect to the broker backing outbox deliveries.
pub async fn init_mq(config: MqConfig) -> Result<MqQueue, MqError> {
    let queue = BroccoliQueue::builder(&config.url)
        .pool_connections(config.pool_size)
        .build()
        .await
        .map_err(|e| MqError::Connection(e.to_string()))?;

    info!(pool_size = config.pool_size, "Broker connection pool ready");
    Ok(queue)
}
