//! The drain loop: moves queued items to the acceptor under the quota.
//!
//! One pass ([`DrainLoop::tick`]) walks `Checking → Submitting → Recording`:
//! - **Checking**: if the queue is empty or the quota is spent, go back to `Idle`.
//! - **Submitting**: peek `n = min(remaining, len)` items and submit them. The
//!   items are *not* removed, so a failed submission loses nothing.
//! - **Recording**: only after the acceptor confirmed. Remove exactly `n` items
//!   from the head, record `n` in the quota window, bump the processed counter and
//!   reset the error streak.
//!
//! [`DrainLoop::run`] repeats passes and parks while idle, waking on enqueue, on
//! the instant the oldest window entry expires, or on the stop signal. It never
//! busy-waits.
//!
//! Invariants:
//! - Items leave the queue only in `Recording`, once per confirmed submission.
//! - Items reach the acceptor in enqueue order.
//! - `max_error_streak` consecutive failures move the loop to `Stopped`; nothing
//!   leaves `Stopped`, and queued items stay where they are.
//!
//! Example
//! ```rust
//! use async_trait::async_trait;
//! use quotadrain::{Acceptor, BatchQueue, DrainConfig, DrainError, DrainLoop, Quota};
//! use std::time::Duration;
//!
//! struct Printer;
//!
//! #[async_trait]
//! impl Acceptor<String> for Printer {
//!     async fn fetch_quota(&self) -> Result<Quota, DrainError> {
//!         Ok(Quota::new(10, Duration::from_secs(15))?)
//!     }
//!     async fn submit(&self, batch: Vec<String>) -> Result<(), DrainError> {
//!         println!("{:?}", batch);
//!         Ok(())
//!     }
//! }
//!
//! # tokio::runtime::Runtime::new().unwrap().block_on(async {
//! let queue = BatchQueue::new();
//! let drain = DrainLoop::start(Printer, queue.clone(), DrainConfig::default()).await.unwrap();
//! let (handle, task) = drain.spawn();
//! handle.enqueue(vec!["a".to_string(), "b".to_string()]).unwrap();
//! handle.stop();
//! assert!(task.await.unwrap().is_ok());
//! # });
//! ```

use crate::acceptor::{submit_within, Acceptor};
use crate::clock::{Clock, MonotonicClock};
use crate::error::{ConfigError, DrainError};
use crate::queue::BatchQueue;
use crate::quota::{Quota, QuotaTracker};
use crate::telemetry::{emit_best_effort, DrainEvent, NullSink, TelemetrySink};
use std::fmt;
use std::future::Future;
use std::sync::atomic::{AtomicU64, AtomicU8, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;

/// Consecutive failed submissions tolerated before the loop stops.
pub const DEFAULT_MAX_ERROR_STREAK: usize = 10;
/// Upper bound on a single submission.
pub const DEFAULT_SUBMIT_TIMEOUT: Duration = Duration::from_secs(10);

const STATE_IDLE: u8 = 0;
const STATE_CHECKING: u8 = 1;
const STATE_SUBMITTING: u8 = 2;
const STATE_RECORDING: u8 = 3;
const STATE_STOPPED: u8 = 4;

/// Where the drain loop currently is.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DrainState {
    /// Nothing to do, or the quota is spent.
    Idle,
    /// Computing remaining capacity.
    Checking,
    /// A batch is in flight.
    Submitting,
    /// Committing a confirmed batch.
    Recording,
    /// Terminal.
    Stopped,
}

impl DrainState {
    fn to_u8(self) -> u8 {
        match self {
            DrainState::Idle => STATE_IDLE,
            DrainState::Checking => STATE_CHECKING,
            DrainState::Submitting => STATE_SUBMITTING,
            DrainState::Recording => STATE_RECORDING,
            DrainState::Stopped => STATE_STOPPED,
        }
    }

    fn from_u8(v: u8) -> Option<Self> {
        match v {
            STATE_IDLE => Some(DrainState::Idle),
            STATE_CHECKING => Some(DrainState::Checking),
            STATE_SUBMITTING => Some(DrainState::Submitting),
            STATE_RECORDING => Some(DrainState::Recording),
            STATE_STOPPED => Some(DrainState::Stopped),
            _ => None,
        }
    }

    /// Lowercase name, as reported over the status API.
    pub fn as_str(self) -> &'static str {
        match self {
            DrainState::Idle => "idle",
            DrainState::Checking => "checking",
            DrainState::Submitting => "submitting",
            DrainState::Recording => "recording",
            DrainState::Stopped => "stopped",
        }
    }
}

impl fmt::Display for DrainState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Why a drain loop reached `Stopped`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    /// Someone called [`DrainHandle::stop`].
    Requested,
    /// `failures` consecutive submissions failed.
    StreakExhausted { failures: usize },
    /// The loop was dropped before reaching `Stopped`, e.g. its task was
    /// aborted or the acceptor panicked.
    Aborted,
}

impl fmt::Display for StopReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StopReason::Requested => write!(f, "requested"),
            StopReason::StreakExhausted { failures } => {
                write!(f, "streak_exhausted(failures={})", failures)
            }
            StopReason::Aborted => write!(f, "aborted"),
        }
    }
}

/// Validated drain loop settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DrainConfig {
    max_error_streak: usize,
    submit_timeout: Duration,
    failure_pause: Duration,
}

impl Default for DrainConfig {
    fn default() -> Self {
        Self {
            max_error_streak: DEFAULT_MAX_ERROR_STREAK,
            submit_timeout: DEFAULT_SUBMIT_TIMEOUT,
            failure_pause: Duration::ZERO,
        }
    }
}

impl DrainConfig {
    pub fn builder() -> DrainConfigBuilder {
        DrainConfigBuilder::new()
    }

    pub fn max_error_streak(&self) -> usize {
        self.max_error_streak
    }

    pub fn submit_timeout(&self) -> Duration {
        self.submit_timeout
    }

    /// Pause after a failed submission before checking again (zero: none).
    pub fn failure_pause(&self) -> Duration {
        self.failure_pause
    }
}

/// Builder for [`DrainConfig`].
#[derive(Debug, Clone)]
pub struct DrainConfigBuilder {
    config: DrainConfig,
}

impl Default for DrainConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl DrainConfigBuilder {
    pub fn new() -> Self {
        Self { config: DrainConfig::default() }
    }

    /// Consecutive failures before the loop stops. Must be > 0.
    pub fn max_error_streak(mut self, streak: usize) -> Self {
        self.config.max_error_streak = streak;
        self
    }

    /// Bound on each submission. Must be > 0.
    pub fn submit_timeout(mut self, timeout: Duration) -> Self {
        self.config.submit_timeout = timeout;
        self
    }

    pub fn failure_pause(mut self, pause: Duration) -> Self {
        self.config.failure_pause = pause;
        self
    }

    pub fn build(self) -> Result<DrainConfig, ConfigError> {
        if self.config.max_error_streak == 0 {
            return Err(ConfigError::InvalidErrorStreak(0));
        }
        if self.config.submit_timeout.is_zero() {
            return Err(ConfigError::InvalidSubmitTimeout(self.config.submit_timeout));
        }
        Ok(self.config)
    }
}

/// One-shot, latched stop request.
///
/// `stop` never blocks and may be called any number of times.
#[derive(Debug, Clone)]
pub struct StopSignal {
    tx: Arc<watch::Sender<bool>>,
}

impl Default for StopSignal {
    fn default() -> Self {
        Self::new()
    }
}

impl StopSignal {
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(false);
        Self { tx: Arc::new(tx) }
    }

    /// Latch the signal. Returns `true` only for the call that latched it.
    pub fn stop(&self) -> bool {
        self.tx.send_if_modified(|stopped| {
            if *stopped {
                false
            } else {
                *stopped = true;
                true
            }
        })
    }

    pub fn is_stopped(&self) -> bool {
        *self.tx.borrow()
    }

    /// Resolves once the signal is latched.
    pub async fn stopped(&self) {
        let mut rx = self.tx.subscribe();
        // The sender lives in `self`, so the channel cannot close while waiting.
        let _ = rx.wait_for(|stopped| *stopped).await;
    }
}

/// Counters shared between the loop and its handles.
#[derive(Debug)]
struct DrainStats {
    state: AtomicU8,
    total_processed: AtomicU64,
    error_streak: AtomicUsize,
    submissions: AtomicU64,
    failures: AtomicU64,
    finished: watch::Sender<Option<StopReason>>,
}

impl DrainStats {
    fn new() -> Self {
        let (finished, _rx) = watch::channel(None);
        Self {
            state: AtomicU8::new(DrainState::Idle.to_u8()),
            total_processed: AtomicU64::new(0),
            error_streak: AtomicUsize::new(0),
            submissions: AtomicU64::new(0),
            failures: AtomicU64::new(0),
            finished,
        }
    }

    fn state(&self) -> DrainState {
        DrainState::from_u8(self.state.load(Ordering::Acquire)).unwrap_or(DrainState::Stopped)
    }
}

/// Publishes [`StopReason::Aborted`] if the loop is dropped before it stops.
#[derive(Debug)]
struct AbortOnDrop {
    stats: Arc<DrainStats>,
}

impl Drop for AbortOnDrop {
    fn drop(&mut self) {
        let aborted = self.stats.finished.send_if_modified(|reason| {
            if reason.is_some() {
                return false;
            }
            *reason = Some(StopReason::Aborted);
            true
        });
        if aborted {
            self.stats.state.store(DrainState::Stopped.to_u8(), Ordering::Release);
            tracing::warn!(target: "quotadrain::drain", "drain loop dropped before stopping");
        }
    }
}

/// Producer- and operator-facing handle onto a queue and its drain loop.
///
/// Clones share everything. Reads are lock-free apart from the queue itself.
#[derive(Debug)]
pub struct DrainHandle<T> {
    queue: BatchQueue<T>,
    stats: Arc<DrainStats>,
    stop: StopSignal,
}

impl<T> Clone for DrainHandle<T> {
    fn clone(&self) -> Self {
        Self { queue: self.queue.clone(), stats: self.stats.clone(), stop: self.stop.clone() }
    }
}

impl<T: Clone> DrainHandle<T> {
    /// Copy of the queued items, head first. Removal is left to the drain loop.
    pub fn queued_items(&self) -> Vec<T> {
        self.queue.snapshot()
    }
}

impl<T> DrainHandle<T> {
    /// A handle with no loop behind it: items are accepted but never drained.
    pub fn detached(queue: BatchQueue<T>) -> Self {
        Self { queue, stats: Arc::new(DrainStats::new()), stop: StopSignal::new() }
    }

    /// Append items for draining.
    ///
    /// # Errors
    /// [`DrainError::EmptyBatch`] if `items` is empty.
    pub fn enqueue(&self, items: Vec<T>) -> Result<usize, DrainError> {
        self.queue.enqueue(items)
    }

    pub fn queue_len(&self) -> usize {
        self.queue.len()
    }

    /// Items confirmed by the acceptor and removed from the queue so far.
    pub fn total_processed(&self) -> u64 {
        self.stats.total_processed.load(Ordering::Acquire)
    }

    pub fn error_streak(&self) -> usize {
        self.stats.error_streak.load(Ordering::Acquire)
    }

    /// Submission attempts so far (successful or not).
    pub fn submissions(&self) -> u64 {
        self.stats.submissions.load(Ordering::Acquire)
    }

    /// Failed submission attempts so far.
    pub fn failures(&self) -> u64 {
        self.stats.failures.load(Ordering::Acquire)
    }

    pub fn state(&self) -> DrainState {
        self.stats.state()
    }

    /// Ask the loop to stop. Idempotent and non-blocking; an in-flight submission
    /// is allowed to finish.
    pub fn stop(&self) {
        if self.stop.stop() {
            tracing::info!(target: "quotadrain::drain", "stop requested");
        }
    }

    pub fn is_stop_requested(&self) -> bool {
        self.stop.is_stopped()
    }

    /// Why the loop stopped, once it has.
    pub fn stop_reason(&self) -> Option<StopReason> {
        *self.stats.finished.borrow()
    }

    /// Resolves once the loop reaches `Stopped`, including when it was dropped
    /// without getting there ([`StopReason::Aborted`]).
    pub async fn finished(&self) -> StopReason {
        let mut rx = self.stats.finished.subscribe();
        let reason = match rx.wait_for(Option::is_some).await {
            Ok(reason) => *reason,
            Err(_) => None,
        };
        reason.unwrap_or(StopReason::Requested)
    }
}

/// Result of a single drain pass.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Tick {
    /// Nothing was submitted. `wake_in` is set when items wait on the quota.
    Idle { wake_in: Option<Duration> },
    /// A batch of `items` was confirmed and removed.
    Drained { items: usize },
    /// The submission failed; the loop keeps going.
    Failed { error: DrainError, streak: usize },
    /// The submission failed and the streak hit the limit; the loop is stopped.
    Exhausted { failures: usize },
    /// The loop was already stopped; nothing happened.
    Stopped,
}

/// Single background loop draining a [`BatchQueue`] into an [`Acceptor`].
pub struct DrainLoop<T, A, S = NullSink> {
    acceptor: A,
    queue: BatchQueue<T>,
    tracker: QuotaTracker,
    config: DrainConfig,
    clock: Arc<dyn Clock>,
    sink: S,
    stats: Arc<DrainStats>,
    stop: StopSignal,
    streak: usize,
    abort_guard: AbortOnDrop,
}

impl<T, A, S> fmt::Debug for DrainLoop<T, A, S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DrainLoop")
            .field("quota", &self.tracker.quota())
            .field("config", &self.config)
            .field("clock", &self.clock)
            .field("streak", &self.streak)
            .field("acceptor", &"<acceptor>")
            .field("sink", &"<sink>")
            .finish()
    }
}

impl<T, A> DrainLoop<T, A, NullSink>
where
    T: Clone + Send + 'static,
    A: Acceptor<T>,
{
    /// Build a loop for an already-known quota.
    pub fn new(acceptor: A, queue: BatchQueue<T>, quota: Quota, config: DrainConfig) -> Self {
        let stats = Arc::new(DrainStats::new());
        Self {
            acceptor,
            queue,
            tracker: QuotaTracker::new(quota),
            config,
            clock: Arc::new(MonotonicClock::default()),
            sink: NullSink,
            abort_guard: AbortOnDrop { stats: stats.clone() },
            stats,
            stop: StopSignal::new(),
            streak: 0,
        }
    }

    /// Fetch the quota from the acceptor, then build the loop.
    ///
    /// # Errors
    /// [`DrainError::QuotaUnavailable`] if the quota cannot be obtained; the loop
    /// is never built.
    pub async fn start(
        acceptor: A,
        queue: BatchQueue<T>,
        config: DrainConfig,
    ) -> Result<Self, DrainError> {
        let quota = match acceptor.fetch_quota().await {
            Ok(quota) => quota,
            Err(DrainError::QuotaUnavailable { reason }) => {
                return Err(DrainError::QuotaUnavailable { reason })
            }
            Err(other) => return Err(DrainError::quota_unavailable(other.to_string())),
        };
        Ok(Self::new(acceptor, queue, quota, config))
    }
}

impl<T, A, S> DrainLoop<T, A, S>
where
    T: Clone + Send + 'static,
    A: Acceptor<T>,
    S: TelemetrySink,
    S::Future: Send + 'static,
{
    /// Override the clock used for window bookkeeping.
    pub fn with_clock<C: Clock + 'static>(mut self, clock: C) -> Self {
        self.clock = Arc::new(clock);
        self
    }

    /// Attach a telemetry sink.
    pub fn with_sink<S2>(self, sink: S2) -> DrainLoop<T, A, S2>
    where
        S2: TelemetrySink,
        S2::Future: Send + 'static,
    {
        DrainLoop {
            acceptor: self.acceptor,
            queue: self.queue,
            tracker: self.tracker,
            config: self.config,
            clock: self.clock,
            sink,
            stats: self.stats,
            stop: self.stop,
            streak: self.streak,
            abort_guard: self.abort_guard,
        }
    }

    pub fn handle(&self) -> DrainHandle<T> {
        DrainHandle { queue: self.queue.clone(), stats: self.stats.clone(), stop: self.stop.clone() }
    }

    pub fn quota(&self) -> Quota {
        self.tracker.quota()
    }

    pub fn state(&self) -> DrainState {
        self.stats.state()
    }

    /// Run one `Checking → Submitting → Recording` pass.
    pub async fn tick(&mut self) -> Tick {
        if self.state() == DrainState::Stopped {
            return Tick::Stopped;
        }

        self.set_state(DrainState::Checking);
        let len = self.queue.len();
        if len == 0 {
            self.set_state(DrainState::Idle);
            return Tick::Idle { wake_in: None };
        }

        let now = self.clock.now_nanos();
        let remaining = self.tracker.remaining_capacity(now);
        if remaining == 0 {
            let wait = self.tracker.next_release(now);
            self.set_state(DrainState::Idle);
            if let Some(wait) = wait {
                tracing::debug!(target: "quotadrain::drain", queued = len, ?wait, "quota exhausted");
                self.emit(DrainEvent::QuotaExhausted { wait }).await;
            }
            return Tick::Idle { wake_in: wait };
        }

        let n = usize::try_from(remaining).unwrap_or(usize::MAX).min(len);
        self.set_state(DrainState::Submitting);
        let batch = self.queue.peek(n);
        self.stats.submissions.fetch_add(1, Ordering::AcqRel);

        match submit_within(&self.acceptor, batch, self.config.submit_timeout).await {
            Ok(()) => self.record(n).await,
            Err(error) => self.on_failure(error).await,
        }
    }

    /// Drive the loop until stopped.
    ///
    /// # Errors
    /// [`DrainError::StreakExhausted`] when `max_error_streak` consecutive
    /// submissions failed, including when that happened in earlier
    /// [`tick`](Self::tick) calls. A requested stop returns `Ok(())`.
    pub async fn run(mut self) -> Result<(), DrainError> {
        let quota = self.tracker.quota();
        tracing::info!(
            target: "quotadrain::drain",
            max_items = quota.max_items(),
            window = ?quota.window(),
            "drain loop started"
        );
        self.emit(DrainEvent::Started { max_items: quota.max_items(), window: quota.window() })
            .await;

        loop {
            if self.stop.is_stopped() && self.state() != DrainState::Stopped {
                self.finish(StopReason::Requested).await;
                return Ok(());
            }

            match self.tick().await {
                Tick::Drained { .. } => tokio::task::yield_now().await,
                Tick::Failed { .. } => {
                    let pause = self.config.failure_pause;
                    if !pause.is_zero() {
                        self.park(Some(pause), false).await;
                    }
                }
                Tick::Idle { wake_in } => self.park(wake_in, true).await,
                Tick::Exhausted { failures } => return Err(DrainError::StreakExhausted { failures }),
                Tick::Stopped => return self.outcome(),
            }
        }
    }

    /// Spawn [`run`](Self::run) on the current tokio runtime.
    pub fn spawn(self) -> (DrainHandle<T>, JoinHandle<Result<(), DrainError>>)
    where
        A: 'static,
    {
        let handle = self.handle();
        let task = tokio::spawn(self.run());
        (handle, task)
    }

    fn outcome(&self) -> Result<(), DrainError> {
        match *self.stats.finished.borrow() {
            Some(StopReason::StreakExhausted { failures }) => {
                Err(DrainError::StreakExhausted { failures })
            }
            _ => Ok(()),
        }
    }

    async fn record(&mut self, n: usize) -> Tick {
        self.set_state(DrainState::Recording);
        let removed = self.queue.remove_prefix(n).len();
        debug_assert_eq!(removed, n, "only the drain loop removes items");
        self.tracker.record(self.clock.now_nanos(), n as u64);
        let total = self.stats.total_processed.fetch_add(removed as u64, Ordering::AcqRel)
            + removed as u64;
        self.streak = 0;
        self.stats.error_streak.store(0, Ordering::Release);
        self.set_state(DrainState::Idle);

        tracing::info!(target: "quotadrain::drain", items = removed, total, "batch drained");
        self.emit(DrainEvent::Drained { items: removed, total_processed: total }).await;
        Tick::Drained { items: removed }
    }

    async fn on_failure(&mut self, error: DrainError) -> Tick {
        self.streak += 1;
        let streak = self.streak;
        self.stats.error_streak.store(streak, Ordering::Release);
        self.stats.failures.fetch_add(1, Ordering::AcqRel);

        match &error {
            DrainError::Rejected { reason } => tracing::warn!(
                target: "quotadrain::drain",
                streak,
                reason = %reason,
                "batch rejected by acceptor"
            ),
            other => tracing::warn!(
                target: "quotadrain::drain",
                streak,
                kind = other.kind(),
                error = %other,
                "batch submission failed"
            ),
        }
        let reason = match &error {
            DrainError::Rejected { reason } | DrainError::Transport { reason } => reason.clone(),
            other => other.to_string(),
        };
        self.emit(DrainEvent::SubmitFailed { streak, kind: error.kind(), reason }).await;

        if streak >= self.config.max_error_streak {
            tracing::error!(
                target: "quotadrain::drain",
                failures = streak,
                queued = self.queue.len(),
                "drain loop stopped after consecutive failures"
            );
            self.finish(StopReason::StreakExhausted { failures: streak }).await;
            return Tick::Exhausted { failures: streak };
        }

        self.set_state(DrainState::Checking);
        Tick::Failed { error, streak }
    }

    async fn finish(&mut self, reason: StopReason) {
        self.set_state(DrainState::Stopped);
        self.stats.finished.send_replace(Some(reason));
        if reason == StopReason::Requested {
            tracing::info!(target: "quotadrain::drain", queued = self.queue.len(), "drain loop stopped");
        }
        self.emit(DrainEvent::Stopped { reason }).await;
    }

    /// Wait for the stop signal, the optional timer, and (if `on_enqueue`) the
    /// next enqueue, whichever comes first.
    async fn park(&mut self, wake_in: Option<Duration>, on_enqueue: bool) {
        let stop = self.stop.clone();
        let queue = self.queue.clone();
        let timer = async move {
            match wake_in {
                Some(wait) => tokio::time::sleep(wait).await,
                None => std::future::pending::<()>().await,
            }
        };
        let enqueued = async move {
            if on_enqueue {
                queue.wait_for_items().await
            } else {
                std::future::pending::<()>().await
            }
        };

        tokio::select! {
            _ = stop.stopped() => {}
            _ = timer => {}
            _ = enqueued => {}
        }
    }

    fn set_state(&self, state: DrainState) {
        self.stats.state.store(state.to_u8(), Ordering::Release);
    }

    fn emit(&self, event: DrainEvent) -> impl Future<Output = ()> + Send + 'static {
        emit_best_effort(self.sink.clone(), event)
    }
}
