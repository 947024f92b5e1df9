pub mod config;
pub mod envelope;
pub mod error_code;
pub mod outbox_status;
pub mod retry;

pub use config::{
    MonitorConfig, MonitorConfigError, MqAppConfig, PollConfig, PollConfigError, TopicConfig,
};
pub use envelope::BrokerEnvelope;
pub use error_code::OutboxErrorCode;
pub use outbox_status::{OutboxStatus, ParseStatusError};
pub use retry::{DeadLetterPolicy, RetryDecision};
