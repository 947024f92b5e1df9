use std::sync::Arc;
use std::time::Duration;

use chrono::{TimeDelta, Utc};
use common::{DeadLetterPolicy, MonitorConfig, OutboxErrorCode, OutboxStatus};
use serde::Serialize;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::error::StoreError;
use crate::store::MessageStore;

/// Row counts per status plus PENDING rows older than the configured age.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct OutboxStats {
    pub pending: u64,
    pub processing: u64,
    pub sent: u64,
    pub failed: u64,
    pub dead_lettered: u64,
    pub stale_pending: u64,
}

/// Threshold breaches found by a sweep.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MonitorAlert {
    DeadLettered { count: u64 },
    StalePending { count: u64 },
    PendingBacklog { count: u64, threshold: u64 },
    FailedBacklog { count: u64, threshold: u64 },
    SentAwaitingCleanup { count: u64, threshold: u64 },
}

impl OutboxStats {
    pub fn alerts(&self, config: &MonitorConfig) -> Vec<MonitorAlert> {
        let mut alerts = Vec::new();
        if self.dead_lettered > 0 {
            alerts.push(MonitorAlert::DeadLettered {
                count: self.dead_lettered,
            });
        }
        if self.stale_pending > 0 {
            alerts.push(MonitorAlert::StalePending {
                count: self.stale_pending,
            });
        }
        if self.pending > config.pending_warn_threshold {
            alerts.push(MonitorAlert::PendingBacklog {
                count: self.pending,
                threshold: config.pending_warn_threshold,
            });
        }
        if self.failed > config.failed_warn_threshold {
            alerts.push(MonitorAlert::FailedBacklog {
                count: self.failed,
                threshold: config.failed_warn_threshold,
            });
        }
        if self.sent > config.sent_cleanup_warn_threshold {
            alerts.push(MonitorAlert::SentAwaitingCleanup {
                count: self.sent,
                threshold: config.sent_cleanup_warn_threshold,
            });
        }
        alerts
    }
}

/// Count rows by status. PENDING rows created more than `pending_age` ago
/// are counted again as `stale_pending`.
pub async fn collect_stats<S: MessageStore + ?Sized>(
    store: &S,
    pending_age: Duration,
) -> Result<OutboxStats, StoreError> {
    let cutoff = TimeDelta::from_std(pending_age)
        .ok()
        .and_then(|age| Utc::now().checked_sub_signed(age))
        .unwrap_or(chrono::DateTime::<Utc>::MIN_UTC);

    Ok(OutboxStats {
        pending: store.count_by_status(OutboxStatus::Pending).await?,
        processing: store.count_by_status(OutboxStatus::Processing).await?,
        sent: store.count_by_status(OutboxStatus::Sent).await?,
        failed: store.count_by_status(OutboxStatus::Failed).await?,
        dead_lettered: store.count_by_status(OutboxStatus::DeadLettered).await?,
        stale_pending: store.count_pending_older_than(cutoff).await?,
    })
}

/// One monitor pass: park exhausted FAILED rows, then report counts and alerts.
pub async fn sweep<S: MessageStore + ?Sized>(
    store: &S,
    config: &MonitorConfig,
    policy: DeadLetterPolicy,
) -> Result<(OutboxStats, Vec<MonitorAlert>), StoreError> {
    let parked = store.dead_letter_exhausted(policy.max_retries).await?;
    if parked > 0 {
        error!(
            code = %OutboxErrorCode::MaxRetriesExceeded,
            count = parked,
            "Dead-lettered FAILED messages past the retry budget"
        );
    }

    let stats = collect_stats(store, config.pending_age()).await?;
    info!(
        pending = stats.pending,
        processing = stats.processing,
        sent = stats.sent,
        failed = stats.failed,
        dead_lettered = stats.dead_lettered,
        stale_pending = stats.stale_pending,
        "Outbox status"
    );

    let alerts = stats.alerts(config);
    for alert in &alerts {
        match *alert {
            MonitorAlert::DeadLettered { count } => {
                warn!(count, "Dead-lettered messages need manual attention")
            }
            MonitorAlert::StalePending { count } => warn!(
                count,
                pending_age_secs = config.pending_age_secs,
                "PENDING messages are not being dispatched"
            ),
            MonitorAlert::PendingBacklog { count, threshold } => {
                warn!(count, threshold, "PENDING backlog above threshold")
            }
            MonitorAlert::FailedBacklog { count, threshold } => {
                warn!(count, threshold, "FAILED messages above threshold")
            }
            MonitorAlert::SentAwaitingCleanup { count, threshold } => warn!(
                count,
                threshold,
                "SENT messages awaiting cleanup above threshold"
            ),
        }
    }

    Ok((stats, alerts))
}

/// Run the outbox monitor as a background task until `shutdown` is cancelled.
pub async fn run_outbox_monitor(
    store: Arc<dyn MessageStore>,
    config: MonitorConfig,
    policy: DeadLetterPolicy,
    shutdown: CancellationToken,
) {
    if let Err(e) = config.validate() {
        error!(code = %OutboxErrorCode::Unexpected, error = %e, "Outbox monitor not started");
        return;
    }

    info!(
        interval_secs = config.interval_secs,
        pending_age_secs = config.pending_age_secs,
        "Starting outbox monitor"
    );

    let mut interval = tokio::time::interval(config.interval());

    loop {
        tokio::select! {
            _ = shutdown.cancelled() => break,
            _ = interval.tick() => {}
        }

        if let Err(e) = sweep(store.as_ref(), &config, policy).await {
            error!(code = %OutboxErrorCode::Unexpected, error = %e, "Outbox monitor sweep failed");
        }
    }

    info!("Outbox monitor stopped");
}
