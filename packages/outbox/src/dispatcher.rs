use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, TimeDelta, Utc};
use common::{DeadLetterPolicy, OutboxErrorCode, PollConfig, PollConfigError, RetryDecision};
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::error::{DeliveryError, StoreError};
use crate::message::OutboxMessage;
use crate::metrics::{DispatchMetrics, DispatchStats};
use crate::sender::MessageSender;
use crate::store::{ClaimQuery, MessageStore};

/// What one tick did.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct TickReport {
    pub claimed: usize,
    pub sent: usize,
    pub failed: usize,
    pub dead_lettered: usize,
    /// Claimed messages whose outcome could not be recorded.
    pub unrecorded: usize,
    /// Claimed messages left untouched because of the batch deadline or shutdown.
    pub deferred: usize,
}

enum Outcome {
    Sent,
    Failed,
    DeadLettered,
    Unrecorded,
}

/// `now - window`, saturating at the earliest representable instant.
fn stale_cutoff(now: DateTime<Utc>, window: Duration) -> DateTime<Utc> {
    TimeDelta::from_std(window)
        .ok()
        .and_then(|delta| now.checked_sub_signed(delta))
        .unwrap_or(DateTime::<Utc>::MIN_UTC)
}

/// Moves outbox messages from PENDING to SENT or DEAD_LETTERED.
pub struct Dispatcher {
    id: String,
    store: Arc<dyn MessageStore>,
    sender: Arc<dyn MessageSender>,
    config: PollConfig,
    policy: DeadLetterPolicy,
    stale_window: Duration,
    metrics: Arc<DispatchMetrics>,
}

impl Dispatcher {
    /// Fails when `config` would let another claimer take rows this
    /// dispatcher still holds.
    pub fn new(
        id: impl Into<String>,
        store: Arc<dyn MessageStore>,
        sender: Arc<dyn MessageSender>,
        config: PollConfig,
    ) -> Result<Self, PollConfigError> {
        config.validate()?;
        Ok(Self {
            id: id.into(),
            store,
            sender,
            policy: config.policy(),
            stale_window: config.stale_window(),
            config,
            metrics: Arc::new(DispatchMetrics::default()),
        })
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn stats(&self) -> DispatchStats {
        self.metrics.snapshot()
    }

    /// Counters shared with whoever reports on this dispatcher.
    pub fn metrics(&self) -> Arc<DispatchMetrics> {
        Arc::clone(&self.metrics)
    }

    /// Claim and process one batch.
    pub async fn tick(&self) -> Result<TickReport, StoreError> {
        self.run_tick(&CancellationToken::new()).await
    }

    async fn run_tick(&self, shutdown: &CancellationToken) -> Result<TickReport, StoreError> {
        self.metrics.record_tick();
        let deadline = Instant::now() + self.config.batch_deadline();

        let query = ClaimQuery::deliverable(
            self.config.batch_size,
            self.policy,
            stale_cutoff(Utc::now(), self.stale_window),
        );
        let batch = self.store.claim_batch(&query).await.inspect_err(|_| {
            self.metrics.record_store_error();
        })?;

        let mut report = TickReport {
            claimed: batch.len(),
            ..Default::default()
        };
        if batch.is_empty() {
            return Ok(report);
        }
        self.metrics.record_claimed(batch.len());
        debug!(dispatcher = %self.id, count = batch.len(), "Claimed outbox batch");

        for (index, message) in batch.iter().enumerate() {
            if shutdown.is_cancelled() {
                report.deferred = batch.len() - index;
                info!(
                    dispatcher = %self.id,
                    deferred = report.deferred,
                    "Shutdown requested, leaving remaining messages for reclaim"
                );
                break;
            }
            if Instant::now() >= deadline {
                report.deferred = batch.len() - index;
                warn!(
                    dispatcher = %self.id,
                    deferred = report.deferred,
                    deadline_ms = self.config.batch_deadline_ms,
                    "Batch deadline reached, leaving remaining messages for reclaim"
                );
                break;
            }

            match self.dispatch(message).await {
                Outcome::Sent => report.sent += 1,
                Outcome::Failed => report.failed += 1,
                Outcome::DeadLettered => report.dead_lettered += 1,
                Outcome::Unrecorded => report.unrecorded += 1,
            }
        }

        Ok(report)
    }

    async fn dispatch(&self, message: &OutboxMessage) -> Outcome {
        let timeout = self.config.send_timeout();
        let result = match tokio::time::timeout(timeout, self.sender.send(message)).await {
            Ok(result) => result,
            Err(_) => Err(DeliveryError::Timeout(timeout)),
        };

        match result {
            Ok(()) => match self.store.mark_sent(message.id).await {
                Ok(()) => {
                    self.metrics.record_sent();
                    debug!(message_id = message.id, topic = %message.topic, "Outbox message sent");
                    Outcome::Sent
                }
                Err(e) => {
                    self.metrics.record_store_error();
                    error!(
                        message_id = message.id,
                        error = %e,
                        "Message delivered but could not be marked sent"
                    );
                    Outcome::Unrecorded
                }
            },
            Err(e) => {
                warn!(
                    code = %OutboxErrorCode::SendFailed,
                    message_id = message.id,
                    topic = %message.topic,
                    error = %e,
                    "Failed to send outbox message"
                );
                self.record_failure(message).await
            }
        }
    }

    async fn record_failure(&self, message: &OutboxMessage) -> Outcome {
        let retry_count = match self.store.mark_failed(message.id, true).await {
            Ok(count) => count,
            Err(e) => {
                self.metrics.record_store_error();
                error!(message_id = message.id, error = %e, "Failed to record send failure");
                return Outcome::Unrecorded;
            }
        };
        self.metrics.record_failed();

        match self.policy.decide(retry_count) {
            RetryDecision::Retry { attempt } => {
                debug!(
                    message_id = message.id,
                    attempt,
                    max_retries = self.policy.max_retries,
                    "Outbox message will be retried"
                );
                Outcome::Failed
            }
            RetryDecision::Exhausted { attempts } => {
                match self.store.mark_dead_lettered(message.id).await {
                    Ok(()) => {
                        self.metrics.record_dead_lettered();
                        error!(
                            code = %OutboxErrorCode::MaxRetriesExceeded,
                            message_id = message.id,
                            event_type = %message.event_type,
                            aggregate_id = %message.aggregate_id,
                            attempts,
                            "Max retries exhausted, message dead-lettered"
                        );
                        Outcome::DeadLettered
                    }
                    Err(e) => {
                        self.metrics.record_store_error();
                        error!(message_id = message.id, error = %e, "Failed to dead-letter message");
                        Outcome::Failed
                    }
                }
            }
        }
    }

    /// Tick on the configured interval until `shutdown` is cancelled.
    ///
    /// Cancellation is observed between messages, so an in-flight send
    /// always completes and gets recorded.
    pub async fn run(&self, shutdown: CancellationToken) {
        let mut interval = tokio::time::interval(self.config.interval());
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

        info!(
            dispatcher = %self.id,
            interval_ms = self.config.interval_ms,
            batch_size = self.config.batch_size,
            max_retries = self.config.max_retries,
            stale_window_secs = self.config.stale_window_secs,
            "Starting outbox dispatcher"
        );

        loop {
            tokio::select! {
                _ = shutdown.cancelled() => break,
                _ = interval.tick() => {}
            }

            if let Err(e) = self.run_tick(&shutdown).await {
                error!(
                    code = %OutboxErrorCode::PollingFailed,
                    dispatcher = %self.id,
                    error = %e,
                    "Outbox poll failed"
                );
            }
        }

        info!(dispatcher = %self.id, "Outbox dispatcher stopped");
    }

    /// Run in a background task. Cancelling `shutdown` stops it as well.
    pub fn spawn(self, shutdown: &CancellationToken) -> DispatcherHandle {
        let token = shutdown.child_token();
        let metrics = Arc::clone(&self.metrics);
        let id = self.id.clone();
        let run_token = token.clone();
        let handle = tokio::spawn(async move { self.run(run_token).await });

        DispatcherHandle {
            id,
            token,
            handle,
            metrics,
        }
    }
}

/// Control of a spawned [`Dispatcher`].
pub struct DispatcherHandle {
    id: String,
    token: CancellationToken,
    handle: JoinHandle<()>,
    metrics: Arc<DispatchMetrics>,
}

impl DispatcherHandle {
    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn stats(&self) -> DispatchStats {
        self.metrics.snapshot()
    }

    /// Request shutdown and wait for the current message to finish.
    pub async fn stop(self) -> DispatchStats {
        self.token.cancel();
        self.join().await
    }

    /// Wait for the dispatcher to exit after its token was cancelled.
    pub async fn join(self) -> DispatchStats {
        if let Err(e) = self.handle.await {
            error!(dispatcher = %self.id, error = %e, "Dispatcher task failed");
        }
        self.metrics.snapshot()
    }
}
