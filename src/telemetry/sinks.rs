use super::events::DrainEvent;
use crate::drain::StopReason;
use std::collections::VecDeque;
use std::convert::Infallible;
use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::task::{Context, Poll};
use tower::Service;

/// Where the drain loop reports [`DrainEvent`]s.
///
/// Any cloneable `tower::Service<DrainEvent>` qualifies once it names its error.
pub trait TelemetrySink:
    Service<DrainEvent, Response = (), Error = Self::SinkError> + Clone + Send + 'static
{
    type SinkError: std::error::Error + Send + 'static;
}

/// Deliver `event` to `sink`, dropping it if the sink is not ready or fails.
///
/// A slow or failing sink must never stall the drain loop.
pub async fn emit_best_effort<S>(sink: S, event: DrainEvent)
where
    S: Service<DrainEvent, Response = ()> + Send + Clone + 'static,
    S::Error: std::error::Error + Send + 'static,
    S::Future: Send + 'static,
{
    use tower::ServiceExt;

    let Ok(mut sink) = sink.ready_oneshot().await else {
        return;
    };
    if let Err(e) = sink.call(event).await {
        tracing::trace!(target: "quotadrain::telemetry", error = %e, "telemetry sink failed");
    }
}

type Done = Pin<Box<dyn Future<Output = Result<(), Infallible>> + Send>>;

fn done() -> Done {
    Box::pin(async { Ok(()) })
}

/// Discards every event. The default sink of a [`DrainLoop`](crate::DrainLoop).
#[derive(Clone, Debug, Default)]
pub struct NullSink;

impl Service<DrainEvent> for NullSink {
    type Response = ();
    type Error = Infallible;
    type Future = Done;

    fn poll_ready(&mut self, _cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        Poll::Ready(Ok(()))
    }

    fn call(&mut self, _event: DrainEvent) -> Self::Future {
        done()
    }
}

impl TelemetrySink for NullSink {
    type SinkError = Infallible;
}

/// Logs each event through `tracing`, at a level matching how much an operator
/// should care: drained batches and quota waits at debug, failed submissions
/// at warn, and a loop that gave up at error.
#[derive(Clone, Debug, Default)]
pub struct LogSink;

impl Service<DrainEvent> for LogSink {
    type Response = ();
    type Error = Infallible;
    type Future = Done;

    fn poll_ready(&mut self, _cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        Poll::Ready(Ok(()))
    }

    fn call(&mut self, event: DrainEvent) -> Self::Future {
        const TARGET: &str = "quotadrain::telemetry";
        match &event {
            DrainEvent::Started { max_items, window } => {
                tracing::info!(target: TARGET, max_items, ?window, "drain started");
            }
            DrainEvent::Drained { items, total_processed } => {
                tracing::debug!(target: TARGET, items, total_processed, "batch drained");
            }
            DrainEvent::SubmitFailed { streak, kind, reason } => {
                tracing::warn!(target: TARGET, streak, kind, reason = %reason, "submission failed");
            }
            DrainEvent::QuotaExhausted { wait } => {
                tracing::debug!(target: TARGET, ?wait, "waiting for quota");
            }
            DrainEvent::Stopped { reason: reason @ StopReason::Requested } => {
                tracing::info!(target: TARGET, reason = %reason, "drain stopped");
            }
            DrainEvent::Stopped { reason } => {
                tracing::error!(target: TARGET, reason = %reason, "drain gave up");
            }
        }
        done()
    }
}

impl TelemetrySink for LogSink {
    type SinkError = Infallible;
}

/// Keeps events in memory, mostly for tests.
///
/// Holds at most `capacity` events; older ones are evicted and counted.
#[derive(Clone, Debug)]
pub struct MemorySink {
    events: Arc<Mutex<VecDeque<DrainEvent>>>,
    capacity: usize,
    evicted: Arc<AtomicU64>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::with_capacity(10_000)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            events: Arc::new(Mutex::new(VecDeque::new())),
            capacity: capacity.max(1),
            evicted: Arc::new(AtomicU64::new(0)),
        }
    }

    pub fn events(&self) -> Vec<DrainEvent> {
        self.lock().iter().cloned().collect()
    }

    /// Items reported as drained across the retained events.
    pub fn drained_items(&self) -> u64 {
        self.lock()
            .iter()
            .filter_map(|e| match e {
                DrainEvent::Drained { items, .. } => Some(*items as u64),
                _ => None,
            })
            .fold(0, u64::saturating_add)
    }

    /// The reason carried by the last `Stopped` event, if one was seen.
    pub fn stop_reason(&self) -> Option<StopReason> {
        self.lock().iter().rev().find_map(|e| match e {
            DrainEvent::Stopped { reason } => Some(*reason),
            _ => None,
        })
    }

    pub fn clear(&self) {
        self.lock().clear();
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    pub fn evicted(&self) -> u64 {
        self.evicted.load(Ordering::Relaxed)
    }

    fn lock(&self) -> MutexGuard<'_, VecDeque<DrainEvent>> {
        self.events.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Default for MemorySink {
    fn default() -> Self {
        Self::new()
    }
}

impl Service<DrainEvent> for MemorySink {
    type Response = ();
    type Error = Infallible;
    type Future = Done;

    fn poll_ready(&mut self, _cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        Poll::Ready(Ok(()))
    }

    fn call(&mut self, event: DrainEvent) -> Self::Future {
        let mut events = self.lock();
        if events.len() >= self.capacity {
            events.pop_front();
            self.evicted.fetch_add(1, Ordering::Relaxed);
        }
        events.push_back(event);
        done()
    }
}

impl TelemetrySink for MemorySink {
    type SinkError = Infallible;
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn null_sink_accepts_events() {
        let mut sink = NullSink;
        sink.call(DrainEvent::QuotaExhausted { wait: Duration::from_secs(1) }).await.unwrap();
    }

    #[tokio::test]
    async fn memory_sink_evicts_oldest() {
        let mut sink = MemorySink::with_capacity(2);
        assert!(sink.is_empty());

        let e1 = DrainEvent::Drained { items: 1, total_processed: 1 };
        let e2 = DrainEvent::Drained { items: 2, total_processed: 3 };
        let e3 = DrainEvent::QuotaExhausted { wait: Duration::from_millis(5) };

        sink.call(e1).await.unwrap();
        sink.call(e2.clone()).await.unwrap();
        sink.call(e3.clone()).await.unwrap();

        assert_eq!(sink.len(), 2);
        assert_eq!(sink.evicted(), 1);
        assert_eq!(sink.events(), vec![e2, e3]);

        sink.clear();
        assert!(sink.is_empty());
    }

    #[tokio::test]
    async fn memory_sink_summarizes_the_run() {
        let mut sink = MemorySink::new();
        assert_eq!(sink.stop_reason(), None);

        sink.call(DrainEvent::Drained { items: 10, total_processed: 10 }).await.unwrap();
        sink.call(DrainEvent::QuotaExhausted { wait: Duration::from_secs(15) }).await.unwrap();
        sink.call(DrainEvent::Drained { items: 4, total_processed: 14 }).await.unwrap();
        let reason = StopReason::StreakExhausted { failures: 10 };
        sink.call(DrainEvent::Stopped { reason }).await.unwrap();

        assert_eq!(sink.drained_items(), 14);
        assert_eq!(sink.stop_reason(), Some(reason));
    }

    #[tokio::test]
    async fn emit_best_effort_swallows_errors() {
        #[derive(Clone)]
        struct Fails;
        impl TelemetrySink for Fails {
            type SinkError = std::io::Error;
        }
        impl tower::Service<DrainEvent> for Fails {
            type Response = ();
            type Error = std::io::Error;
            type Future = Pin<Box<dyn Future<Output = Result<(), Self::Error>> + Send>>;
            fn poll_ready(&mut self, _cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
                Poll::Ready(Ok(()))
            }
            fn call(&mut self, _req: DrainEvent) -> Self::Future {
                Box::pin(async { Err(std::io::Error::new(std::io::ErrorKind::Other, "fail")) })
            }
        }

        emit_best_effort(Fails, DrainEvent::Drained { items: 1, total_processed: 1 }).await;
    }

    #[tokio::test]
    async fn log_sink_accepts_every_event() {
        let mut sink = LogSink;
        let events = [
            DrainEvent::Started { max_items: 10, window: Duration::from_secs(15) },
            DrainEvent::Drained { items: 3, total_processed: 3 },
            DrainEvent::SubmitFailed { streak: 1, kind: "timeout", reason: "10s".into() },
            DrainEvent::QuotaExhausted { wait: Duration::from_secs(2) },
            DrainEvent::Stopped { reason: StopReason::Requested },
            DrainEvent::Stopped { reason: StopReason::Aborted },
        ];
        for event in events {
            sink.call(event).await.unwrap();
        }
    }
}
