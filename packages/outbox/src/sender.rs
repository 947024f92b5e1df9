use std::sync::Arc;

use async_trait::async_trait;
use mq::{Mq, MqError};
use tracing::info;

use crate::error::DeliveryError;
use crate::message::OutboxMessage;

/// Broker port.
///
/// Implementations own the broker connection; an `Ok` means the broker
/// accepted the message.
#[async_trait]
pub trait MessageSender: Send + Sync {
    async fn send(&self, message: &OutboxMessage) -> Result<(), DeliveryError>;
}

/// Publishes each message to the queue named by its topic.
pub struct QueueSender {
    mq: Arc<Mq>,
}

impl QueueSender {
    pub fn new(mq: Arc<Mq>) -> Self {
        Self { mq }
    }

    async fn publish(&self, message: &OutboxMessage) -> Result<(), MqError> {
        let envelope = message.to_envelope();
        self.mq
            .publish(&message.topic, None, &envelope, None)
            .await
            .map_err(MqError::from)?;
        Ok(())
    }
}

#[async_trait]
impl MessageSender for QueueSender {
    async fn send(&self, message: &OutboxMessage) -> Result<(), DeliveryError> {
        self.publish(message)
            .await
            .map_err(|e| DeliveryError::Broker(e.to_string()))
    }
}

/// Logs messages instead of publishing them. Used when MQ is disabled.
#[derive(Debug, Default)]
pub struct LogSender;

#[async_trait]
impl MessageSender for LogSender {
    async fn send(&self, message: &OutboxMessage) -> Result<(), DeliveryError> {
        info!(
            message_id = message.id,
            topic = %message.topic,
            event_type = %message.event_type,
            aggregate_id = %message.aggregate_id,
            "Broker disabled, message logged only"
        );
        Ok(())
    }
}
