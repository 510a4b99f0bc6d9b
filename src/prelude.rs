//! Convenient re-exports for common quotadrain types.
pub use crate::{
    acceptor::Acceptor,
    clock::{Clock, MonotonicClock},
    drain::{DrainConfig, DrainHandle, DrainLoop, DrainState, StopReason},
    error::{ConfigError, DrainError},
    queue::BatchQueue,
    quota::Quota,
    telemetry::{DrainEvent, LogSink, MemorySink, TelemetrySink},
};
