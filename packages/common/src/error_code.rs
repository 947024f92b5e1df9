use serde::{Deserialize, Serialize};

/// Operational error codes attached to outbox log lines and alerts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OutboxErrorCode {
    /// Writing outbox rows inside the domain transaction failed.
    #[serde(rename = "OUTBOX-001")]
    SaveFailed,
    /// An event could not be serialized into a payload.
    #[serde(rename = "OUTBOX-002")]
    SerializationFailed,
    /// The broker rejected or timed out a send.
    #[serde(rename = "OUTBOX-003")]
    SendFailed,
    /// A message exhausted its retry budget.
    #[serde(rename = "OUTBOX-004")]
    MaxRetriesExceeded,
    /// Claiming a batch from the store failed.
    #[serde(rename = "OUTBOX-005")]
    PollingFailed,
    #[serde(rename = "OUTBOX-999")]
    Unexpected,
}

impl OutboxErrorCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::SaveFailed => "OUTBOX-001",
            Self::SerializationFailed => "OUTBOX-002",
            Self::SendFailed => "OUTBOX-003",
            Self::MaxRetriesExceeded => "OUTBOX-004",
            Self::PollingFailed => "OUTBOX-005",
            Self::Unexpected => "OUTBOX-999",
        }
    }
}

impl std::fmt::Display for OutboxErrorCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}
