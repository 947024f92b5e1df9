use std::time::Duration;

use serde::Deserialize;
use thiserror::Error;

use crate::retry::DeadLetterPolicy;

/// App-level MQ configuration.
#[derive(Debug, Deserialize, Clone)]
pub struct MqAppConfig {
    /// Whether MQ is enabled. Default: true.
    /// When disabled the relay logs messages instead of publishing them.
    #[serde(default = "default_mq_enabled")]
    pub enabled: bool,
    /// Redis connection URL. Default: "redis://localhost:6379".
    #[serde(default = "default_mq_url")]
    pub url: String,
    /// Connection pool size. Default: 5.
    #[serde(default = "default_mq_pool_size")]
    pub pool_size: u8,
}

fn default_mq_enabled() -> bool {
    true
}
fn default_mq_url() -> String {
    "redis://localhost:6379".into()
}
fn default_mq_pool_size() -> u8 {
    5
}

impl Default for MqAppConfig {
    fn default() -> Self {
        Self {
            enabled: default_mq_enabled(),
            url: default_mq_url(),
            pool_size: default_mq_pool_size(),
        }
    }
}

/// Dispatcher polling configuration.
#[derive(Debug, Deserialize, Clone, PartialEq, Eq)]
pub struct PollConfig {
    /// Tick period in milliseconds. Default: 1000.
    #[serde(default = "default_interval_ms")]
    pub interval_ms: u64,
    /// Maximum messages claimed per tick. Default: 100.
    #[serde(default = "default_batch_size")]
    pub batch_size: u64,
    /// Retries allowed after the first failed attempt. Default: 3.
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    /// Age after which a claimed or failed row becomes claimable again. Default: 30.
    #[serde(default = "default_stale_window_secs")]
    pub stale_window_secs: u64,
    /// Upper bound for a single broker send. Default: 5000.
    #[serde(default = "default_send_timeout_ms")]
    pub send_timeout_ms: u64,
    /// Upper bound for processing one claimed batch. Default: 20000.
    #[serde(default = "default_batch_deadline_ms")]
    pub batch_deadline_ms: u64,
    /// Number of dispatcher tasks started by the relay. Default: 1.
    #[serde(default = "default_workers")]
    pub workers: usize,
}

fn default_interval_ms() -> u64 {
    1000
}
fn default_batch_size() -> u64 {
    100
}
fn default_max_retries() -> u32 {
    3
}
fn default_stale_window_secs() -> u64 {
    30
}
fn default_send_timeout_ms() -> u64 {
    5000
}
fn default_batch_deadline_ms() -> u64 {
    20_000
}
fn default_workers() -> usize {
    1
}

impl Default for PollConfig {
    fn default() -> Self {
        Self {
            interval_ms: default_interval_ms(),
            batch_size: default_batch_size(),
            max_retries: default_max_retries(),
            stale_window_secs: default_stale_window_secs(),
            send_timeout_ms: default_send_timeout_ms(),
            batch_deadline_ms: default_batch_deadline_ms(),
            workers: default_workers(),
        }
    }
}

/// Rejected poll configuration.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum PollConfigError {
    #[error("poll.{0} must be greater than zero")]
    Zero(&'static str),

    #[error(
        "poll.batch_deadline_ms ({batch_deadline_ms}) plus poll.send_timeout_ms ({send_timeout_ms}) must be shorter than poll.stale_window_secs ({stale_window_secs}s)"
    )]
    ClaimOutlivesStaleWindow {
        batch_deadline_ms: u64,
        send_timeout_ms: u64,
        stale_window_secs: u64,
    },
}

impl PollConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_millis(self.interval_ms)
    }

    pub fn stale_window(&self) -> Duration {
        Duration::from_secs(self.stale_window_secs)
    }

    pub fn send_timeout(&self) -> Duration {
        Duration::from_millis(self.send_timeout_ms)
    }

    pub fn batch_deadline(&self) -> Duration {
        Duration::from_millis(self.batch_deadline_ms)
    }

    pub fn policy(&self) -> DeadLetterPolicy {
        DeadLetterPolicy::new(self.max_retries)
    }

    /// Reject settings the dispatcher cannot run with.
    ///
    /// A claim is held for at most `batch_deadline + send_timeout` (the last
    /// send may start just before the deadline). That must end before the
    /// stale window lets another dispatcher take the same rows.
    pub fn validate(&self) -> Result<(), PollConfigError> {
        if self.interval_ms == 0 {
            return Err(PollConfigError::Zero("interval_ms"));
        }
        if self.batch_size == 0 {
            return Err(PollConfigError::Zero("batch_size"));
        }
        if self.send_timeout_ms == 0 {
            return Err(PollConfigError::Zero("send_timeout_ms"));
        }
        if self.batch_deadline_ms == 0 {
            return Err(PollConfigError::Zero("batch_deadline_ms"));
        }
        if self.stale_window_secs == 0 {
            return Err(PollConfigError::Zero("stale_window_secs"));
        }
        if self.workers == 0 {
            return Err(PollConfigError::Zero("workers"));
        }
        if self.batch_deadline() + self.send_timeout() >= self.stale_window() {
            return Err(PollConfigError::ClaimOutlivesStaleWindow {
                batch_deadline_ms: self.batch_deadline_ms,
                send_timeout_ms: self.send_timeout_ms,
                stale_window_secs: self.stale_window_secs,
            });
        }
        Ok(())
    }
}

/// Inputs of the topic naming rule `{environment}.{team}.{domain}.{data_type}.{action}.v{version}`.
#[derive(Debug, Deserialize, Clone, PartialEq, Eq)]
pub struct TopicConfig {
    /// Deployment environment. Default: "dev".
    #[serde(default = "default_environment")]
    pub environment: String,
    /// Owning team. Default: "restaurant".
    #[serde(default = "default_team")]
    pub team: String,
}

fn default_environment() -> String {
    "dev".into()
}
fn default_team() -> String {
    "restaurant".into()
}

impl Default for TopicConfig {
    fn default() -> Self {
        Self {
            environment: default_environment(),
            team: default_team(),
        }
    }
}

/// Outbox monitor configuration.
#[derive(Debug, Deserialize, Clone, PartialEq, Eq)]
pub struct MonitorConfig {
    /// Seconds between sweeps. Default: 60.
    #[serde(default = "default_monitor_interval_secs")]
    pub interval_secs: u64,
    /// A PENDING message older than this is reported as stale. Default: 300.
    #[serde(default = "default_pending_age_secs")]
    pub pending_age_secs: u64,
    /// Warn when FAILED rows exceed this count. Default: 100.
    #[serde(default = "default_failed_warn_threshold")]
    pub failed_warn_threshold: u64,
    /// Warn when PENDING rows exceed this count. Default: 1000.
    #[serde(default = "default_pending_warn_threshold")]
    pub pending_warn_threshold: u64,
    /// Warn when SENT rows awaiting external cleanup exceed this count. Default: 10000.
    #[serde(default = "default_sent_cleanup_warn_threshold")]
    pub sent_cleanup_warn_threshold: u64,
}

fn default_monitor_interval_secs() -> u64 {
    60
}
fn default_pending_age_secs() -> u64 {
    300
}
fn default_failed_warn_threshold() -> u64 {
    100
}
fn default_pending_warn_threshold() -> u64 {
    1000
}
fn default_sent_cleanup_warn_threshold() -> u64 {
    10_000
}

/// Rejected monitor configuration.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum MonitorConfigError {
    #[error("monitor.{0} must be greater than zero")]
    Zero(&'static str),
}

impl MonitorConfig {
    pub fn validate(&self) -> Result<(), MonitorConfigError> {
        if self.interval_secs == 0 {
            return Err(MonitorConfigError::Zero("interval_secs"));
        }
        Ok(())
    }

    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs)
    }

    pub fn pending_age(&self) -> Duration {
        Duration::from_secs(self.pending_age_secs)
    }
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            interval_secs: default_monitor_interval_secs(),
            pending_age_secs: default_pending_age_secs(),
            failed_warn_threshold: default_failed_warn_threshold(),
            pending_warn_threshold: default_pending_warn_threshold(),
            sent_cleanup_warn_threshold: default_sent_cleanup_warn_threshold(),
        }
    }
}
