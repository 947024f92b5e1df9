#[cfg(feature = "sea-orm")]
use sea_orm::prelude::StringLen;

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Delivery status of an outbox message.
///
/// When the `sea-orm` feature is enabled, this enum can be used directly in SeaORM entities.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[cfg_attr(
    feature = "sea-orm",
    derive(sea_orm::DeriveActiveEnum, sea_orm::EnumIter),
    sea_orm(rs_type = "String", db_type = "String(StringLen::None)")
)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OutboxStatus {
    /// Written by the appender, waiting for a dispatcher.
    #[cfg_attr(feature = "sea-orm", sea_orm(string_value = "PENDING"))]
    Pending,
    /// Claimed by a dispatcher, send in flight.
    #[cfg_attr(feature = "sea-orm", sea_orm(string_value = "PROCESSING"))]
    Processing,
    /// Delivered to the broker.
    #[cfg_attr(feature = "sea-orm", sea_orm(string_value = "SENT"))]
    Sent,
    /// Last send attempt failed; eligible for another claim while under the retry budget.
    #[cfg_attr(feature = "sea-orm", sea_orm(string_value = "FAILED"))]
    Failed,
    /// Retry budget exhausted. Needs manual remediation.
    #[cfg_attr(feature = "sea-orm", sea_orm(string_value = "DEAD_LETTERED"))]
    DeadLettered,
}

impl OutboxStatus {
    /// All possible status values.
    pub const ALL: &'static [OutboxStatus] = &[
        Self::Pending,
        Self::Processing,
        Self::Sent,
        Self::Failed,
        Self::DeadLettered,
    ];

    /// Statuses a dispatcher may claim from.
    pub const CLAIMABLE: &'static [OutboxStatus] =
        &[Self::Pending, Self::Failed, Self::Processing];

    /// Returns true once the message can no longer change.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Sent | Self::DeadLettered)
    }

    /// Whether the lifecycle allows moving from `self` to `next`.
    ///
    /// `Processing -> Processing` is the reclaim of a row whose claimer
    /// went away without resolving it.
    pub fn can_transition_to(&self, next: OutboxStatus) -> bool {
        use OutboxStatus::*;
        matches!(
            (self, next),
            (Pending, Processing)
                | (Processing, Processing)
                | (Processing, Sent)
                | (Processing, Failed)
                | (Processing, DeadLettered)
                | (Failed, Processing)
                | (Failed, DeadLettered)
        )
    }

    /// Returns the string representation (SCREAMING_SNAKE_CASE).
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "PENDING",
            Self::Processing => "PROCESSING",
            Self::Sent => "SENT",
            Self::Failed => "FAILED",
            Self::DeadLettered => "DEAD_LETTERED",
        }
    }
}

impl fmt::Display for OutboxStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Default for OutboxStatus {
    fn default() -> Self {
        Self::Pending
    }
}

/// Error when parsing an invalid status string.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParseStatusError {
    invalid: String,
}

impl fmt::Display for ParseStatusError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Invalid status '{}'. Valid values: {}",
            self.invalid,
            OutboxStatus::ALL
                .iter()
                .map(|s| s.as_str())
                .collect::<Vec<_>>()
                .join(", ")
        )
    }
}

impl std::error::Error for ParseStatusError {}

impl FromStr for OutboxStatus {
    type Err = ParseStatusError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "PENDING" => Ok(Self::Pending),
            "PROCESSING" => Ok(Self::Processing),
            "SENT" => Ok(Self::Sent),
            "FAILED" => Ok(Self::Failed),
            "DEAD_LETTERED" => Ok(Self::DeadLettered),
            _ => Err(ParseStatusError {
                invalid: s.to_string(),
            }),
        }
    }
}
