use async_trait::async_trait;
use quotadrain::{Acceptor, DrainError, DrainHandle, Quota};
use std::collections::VecDeque;
use std::sync::Mutex;
use std::time::Duration;
use tokio::time::Instant;

/// Acceptor that records every batch with the (tokio) instant it arrived.
///
/// Outcomes are taken from `script` first; once it is empty every batch is
/// answered with `fallback`.
#[derive(Debug)]
pub struct RecordingAcceptor {
    quota: Quota,
    origin: Instant,
    script: Mutex<VecDeque<Result<(), DrainError>>>,
    fallback: Result<(), DrainError>,
    batches: Mutex<Vec<(Duration, Vec<u32>)>>,
}

impl RecordingAcceptor {
    pub fn accepting(max_items: u64, window: Duration) -> Self {
        Self::new(max_items, window, Vec::new(), Ok(()))
    }

    pub fn failing(error: DrainError) -> Self {
        Self::new(10, Duration::from_secs(15), Vec::new(), Err(error))
    }

    pub fn new(
        max_items: u64,
        window: Duration,
        script: Vec<Result<(), DrainError>>,
        fallback: Result<(), DrainError>,
    ) -> Self {
        Self {
            quota: Quota::new(max_items, window).expect("valid test quota"),
            origin: Instant::now(),
            script: Mutex::new(script.into()),
            fallback,
            batches: Mutex::new(Vec::new()),
        }
    }

    /// Every submitted batch with its offset from construction time.
    pub fn batches(&self) -> Vec<(Duration, Vec<u32>)> {
        self.batches.lock().unwrap().clone()
    }

    pub fn attempts(&self) -> usize {
        self.batches.lock().unwrap().len()
    }
}

#[async_trait]
impl Acceptor<u32> for RecordingAcceptor {
    async fn fetch_quota(&self) -> Result<Quota, DrainError> {
        Ok(self.quota)
    }

    async fn submit(&self, batch: Vec<u32>) -> Result<(), DrainError> {
        self.batches.lock().unwrap().push((self.origin.elapsed(), batch));
        let scripted = self.script.lock().unwrap().pop_front();
        scripted.unwrap_or_else(|| self.fallback.clone())
    }
}

/// Poll until `done` holds, sleeping on tokio's clock between checks.
pub async fn wait_until<T>(handle: &DrainHandle<T>, mut done: impl FnMut(&DrainHandle<T>) -> bool) {
    for _ in 0..20_000 {
        if done(handle) {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("condition not reached");
}
