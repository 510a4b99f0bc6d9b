//! Telemetry for the drain loop.
//!
//! The loop reports what it does as [`DrainEvent`]s. Events flow through
//! `TelemetrySink` implementations, which are `tower::Service<DrainEvent>`s, so
//! sinks can log, aggregate, or forward events to external systems.
//!
//! Emission is best effort: a sink that is not ready or fails simply loses the
//! event.

pub mod events;
pub mod sinks;

pub use events::DrainEvent;
pub use sinks::{emit_best_effort, LogSink, MemorySink, NullSink, TelemetrySink};
