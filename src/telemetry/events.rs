use crate::drain::StopReason;
use std::fmt;
use std::time::Duration;

/// Events emitted by the drain loop.
///
/// Events describe what the loop did, not why; they can be logged, collected in
/// tests, or forwarded to external systems through a [`super::TelemetrySink`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DrainEvent {
    /// The loop started with the quota fetched from the acceptor.
    Started {
        /// Items admitted per window
        max_items: u64,
        /// Rolling window length
        window: Duration,
    },
    /// A batch was confirmed and removed from the queue.
    Drained {
        /// Items in the batch
        items: usize,
        /// Running total after this batch
        total_processed: u64,
    },
    /// A submission failed; the items remain queued.
    SubmitFailed {
        /// Consecutive failures including this one
        streak: usize,
        /// Failure class (`transport`, `rejected`, `timeout`)
        kind: &'static str,
        /// Transport error text or the acceptor's rejection reason
        reason: String,
    },
    /// Items are waiting but the quota is spent.
    QuotaExhausted {
        /// Time until capacity is released
        wait: Duration,
    },
    /// The loop reached its terminal state.
    Stopped {
        /// Why it stopped
        reason: StopReason,
    },
}

impl fmt::Display for DrainEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DrainEvent::Started { max_items, window } => {
                write!(f, "Started(quota={}/{:?})", max_items, window)
            }
            DrainEvent::Drained { items, total_processed } => {
                write!(f, "Drained(items={}, total={})", items, total_processed)
            }
            DrainEvent::SubmitFailed { streak, kind, reason } => {
                write!(f, "SubmitFailed(#{}, {}: {})", streak, kind, reason)
            }
            DrainEvent::QuotaExhausted { wait } => write!(f, "QuotaExhausted(wait={:?})", wait),
            DrainEvent::Stopped { reason } => write!(f, "Stopped({})", reason),
        }
    }
}
