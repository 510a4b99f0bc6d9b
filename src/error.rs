//! Error types for the queue, the acceptor seam and the drain loop
use std::time::Duration;

/// Unified error type for enqueueing, quota fetching and batch submission.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DrainError {
    /// The caller tried to enqueue zero items.
    #[error("no items provided")]
    EmptyBatch,
    /// The acceptor's quota could not be obtained or was malformed.
    #[error("quota unavailable: {reason}")]
    QuotaUnavailable { reason: String },
    /// Network failure while talking to the acceptor.
    #[error("transport error: {reason}")]
    Transport { reason: String },
    /// The acceptor explicitly declined the batch.
    #[error("batch rejected by acceptor: {reason}")]
    Rejected { reason: String },
    /// The submission did not complete within the configured bound.
    #[error("submission timed out after {timeout:?}")]
    Timeout { timeout: Duration },
    /// Too many consecutive submissions failed; the drain loop stopped.
    #[error("drain loop stopped after {failures} consecutive failed submissions")]
    StreakExhausted { failures: usize },
}

impl DrainError {
    pub fn quota_unavailable(reason: impl Into<String>) -> Self {
        Self::QuotaUnavailable { reason: reason.into() }
    }

    pub fn transport(reason: impl Into<String>) -> Self {
        Self::Transport { reason: reason.into() }
    }

    pub fn rejected(reason: impl Into<String>) -> Self {
        Self::Rejected { reason: reason.into() }
    }

    pub fn is_empty_batch(&self) -> bool {
        matches!(self, Self::EmptyBatch)
    }

    /// Transport failures and timeouts.
    pub fn is_transport(&self) -> bool {
        matches!(self, Self::Transport { .. } | Self::Timeout { .. })
    }

    pub fn is_rejected(&self) -> bool {
        matches!(self, Self::Rejected { .. })
    }

    pub fn is_streak_exhausted(&self) -> bool {
        matches!(self, Self::StreakExhausted { .. })
    }

    /// Short label used in logs and telemetry.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::EmptyBatch => "empty_batch",
            Self::QuotaUnavailable { .. } => "quota_unavailable",
            Self::Transport { .. } => "transport",
            Self::Rejected { .. } => "rejected",
            Self::Timeout { .. } => "timeout",
            Self::StreakExhausted { .. } => "streak_exhausted",
        }
    }
}

/// Errors produced while validating drain configuration or quotas.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConfigError {
    /// `max_error_streak` must be > 0.
    #[error("max_error_streak must be > 0 (got {0})")]
    InvalidErrorStreak(usize),
    /// `submit_timeout` must be non-zero.
    #[error("submit_timeout must be > 0 (got {0:?})")]
    InvalidSubmitTimeout(Duration),
    /// A quota must admit at least one item.
    #[error("quota max_items must be > 0 (got {0})")]
    InvalidQuotaCount(u64),
    /// A quota window must be non-zero.
    #[error("quota window must be > 0 (got {0:?})")]
    InvalidQuotaWindow(Duration),
}

impl From<ConfigError> for DrainError {
    fn from(err: ConfigError) -> Self {
        DrainError::quota_unavailable(err.to_string())
    }
}
