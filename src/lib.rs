#![forbid(unsafe_code)]
#![deny(warnings)]
#![cfg_attr(not(test), deny(clippy::all))]

//! # quotadrain
//!
//! Quota-aware batch draining for async Rust: producers append items to a shared
//! FIFO queue, and a single background loop ships them, in capped batches, to a
//! remote acceptor that advertises "at most N items per rolling duration D".
//!
//! ## Features
//!
//! - **Batch queue** shared between many producers and one drain loop
//! - **Sliding-window quota tracking** that never admits more than the acceptor
//!   would accept
//! - **No loss on failure**: items leave the queue only after a confirmed submission
//! - **Bounded error tolerance**: the loop stops after a streak of failures
//! - **Idle without spinning**: wakes on enqueue, on quota release, or on stop
//! - **Telemetry** via `tower::Service` sinks and `tracing` logs
//!
//! ## Quick Start
//!
//! ```rust
//! use async_trait::async_trait;
//! use quotadrain::{Acceptor, BatchQueue, DrainConfig, DrainError, DrainLoop, Quota};
//! use std::time::Duration;
//!
//! struct Remote;
//!
//! #[async_trait]
//! impl Acceptor<u64> for Remote {
//!     async fn fetch_quota(&self) -> Result<Quota, DrainError> {
//!         Ok(Quota::new(10, Duration::from_secs(15))?)
//!     }
//!     async fn submit(&self, _batch: Vec<u64>) -> Result<(), DrainError> {
//!         Ok(())
//!     }
//! }
//!
//! #[tokio::main]
//! async fn main() -> Result<(), DrainError> {
//!     let queue = BatchQueue::<u64>::new();
//!     let (handle, task) =
//!         DrainLoop::start(Remote, queue, DrainConfig::default()).await?.spawn();
//!
//!     handle.enqueue(vec![1, 2, 3])?;
//!     handle.stop();
//!     task.await.expect("drain task panicked")?;
//!     Ok(())
//! }
//! ```

pub mod acceptor;
pub mod clock;
pub mod drain;
pub mod error;
pub mod prelude;
pub mod queue;
pub mod quota;
pub mod telemetry;

// Re-exports
pub use acceptor::{submit_within, Acceptor};
pub use clock::{Clock, ManualClock, MonotonicClock};
pub use drain::{
    DrainConfig, DrainConfigBuilder, DrainHandle, DrainLoop, DrainState, StopReason, StopSignal,
    Tick, DEFAULT_MAX_ERROR_STREAK, DEFAULT_SUBMIT_TIMEOUT,
};
pub use error::{ConfigError, DrainError};
pub use queue::BatchQueue;
pub use quota::{Quota, QuotaTracker, WindowEntry};
pub use telemetry::{DrainEvent, LogSink, MemorySink, NullSink, TelemetrySink};
