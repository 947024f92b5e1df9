use serde::{Deserialize, Serialize};

/// Outcome of recording a failed send attempt against the retry budget.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryDecision {
    /// The message stays `FAILED` and will be claimed again.
    Retry { attempt: u32 },
    /// Budget exhausted; the message must be dead-lettered.
    Exhausted { attempts: u32 },
}

/// Retry budget for outbox deliveries.
///
/// `max_retries` counts retries after the first attempt: with the default of
/// 3 a message is attempted at most 4 times before it is dead-lettered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeadLetterPolicy {
    pub max_retries: u32,
}

impl DeadLetterPolicy {
    pub fn new(max_retries: u32) -> Self {
        Self { max_retries }
    }

    /// Decide what happens to a message whose retry counter is now `retry_count`.
    ///
    /// The plain rule "reclaim while `retry_count < max_retries`" would
    /// dead-letter after 3 attempts at `max_retries = 3`, yet such a message
    /// must get 4. The comparison is therefore `<=`: it is exhausted only
    /// once `retry_count` exceeds `max_retries`.
    pub fn decide(&self, retry_count: u32) -> RetryDecision {
        if retry_count <= self.max_retries {
            RetryDecision::Retry {
                attempt: retry_count,
            }
        } else {
            RetryDecision::Exhausted {
                attempts: retry_count,
            }
        }
    }

    /// Whether a `FAILED` row with this retry counter may still be claimed.
    ///
    /// Uses `<=` rather than `<` for the same reason as [`Self::decide`];
    /// the two must agree or a retried row is never reclaimed.
    pub fn allows_claim(&self, retry_count: u32) -> bool {
        retry_count <= self.max_retries
    }
}

impl Default for DeadLetterPolicy {
    fn default() -> Self {
        Self { max_retries: 3 }
    }
}
