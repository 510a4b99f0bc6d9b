//! In-memory acceptor and the HTTP server that exposes it.
//!
//! By default only the batch size is checked: a batch larger than the advertised
//! `max_items` is declined with `"blocked"`. In strict mode the mock also keeps a
//! sliding window of what it accepted and declines anything that would overrun it.

use crate::wire::{LimitsResponse, ProcessRequest, ProcessResponse, BLOCKED};
use crate::Item;
use async_trait::async_trait;
use axum::extract::rejection::JsonRejection;
use axum::extract::State;
use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::{Json, Router};
use quotadrain::{Acceptor, Clock, DrainError, MonotonicClock, Quota, QuotaTracker};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

/// Acceptor that advertises a fixed quota and checks incoming batches against it.
#[derive(Debug)]
pub struct MockAcceptor {
    quota: Quota,
    window: Option<Mutex<QuotaTracker>>,
    clock: MonotonicClock,
    accepted_items: AtomicU64,
    rejected_batches: AtomicU64,
}

impl MockAcceptor {
    /// Size-check only.
    pub fn new(quota: Quota) -> Self {
        Self {
            quota,
            window: None,
            clock: MonotonicClock::default(),
            accepted_items: AtomicU64::new(0),
            rejected_batches: AtomicU64::new(0),
        }
    }

    /// Size check plus sliding-window enforcement.
    pub fn strict(quota: Quota) -> Self {
        Self { window: Some(Mutex::new(QuotaTracker::new(quota))), ..Self::new(quota) }
    }

    pub fn quota(&self) -> Quota {
        self.quota
    }

    pub fn is_strict(&self) -> bool {
        self.window.is_some()
    }

    pub fn accepted_items(&self) -> u64 {
        self.accepted_items.load(Ordering::Acquire)
    }

    pub fn rejected_batches(&self) -> u64 {
        self.rejected_batches.load(Ordering::Acquire)
    }

    /// Accept or decline a batch of `len` items.
    ///
    /// # Errors
    /// [`DrainError::Rejected`] with reason `"blocked"`.
    pub fn process(&self, len: usize) -> Result<(), DrainError> {
        let len = len as u64;
        let admitted = len <= self.quota.max_items() && self.admit_in_window(len);
        if !admitted {
            self.rejected_batches.fetch_add(1, Ordering::AcqRel);
            tracing::warn!(target: "quotadrain::mock", items = len, "batch blocked");
            return Err(DrainError::rejected(BLOCKED));
        }
        self.accepted_items.fetch_add(len, Ordering::AcqRel);
        tracing::info!(target: "quotadrain::mock", items = len, "batch accepted");
        Ok(())
    }

    fn admit_in_window(&self, len: u64) -> bool {
        let Some(window) = &self.window else {
            return true;
        };
        let mut tracker = window.lock().unwrap_or_else(PoisonError::into_inner);
        let now = self.clock.now_nanos();
        if tracker.remaining_capacity(now) < len {
            return false;
        }
        tracker.record(now, len);
        true
    }
}

#[async_trait]
impl Acceptor<Item> for MockAcceptor {
    async fn fetch_quota(&self) -> Result<Quota, DrainError> {
        Ok(self.quota)
    }

    async fn submit(&self, batch: Vec<Item>) -> Result<(), DrainError> {
        self.process(batch.len())
    }
}

/// Router serving `GET /server/limits` and `POST /server/process`.
pub fn router(mock: Arc<MockAcceptor>) -> Router {
    Router::new()
        .route("/server/limits", get(limits))
        .route("/server/process", post(process))
        .with_state(mock)
}

async fn limits(State(mock): State<Arc<MockAcceptor>>) -> Json<LimitsResponse> {
    Json(LimitsResponse::from(mock.quota()))
}

async fn process(
    State(mock): State<Arc<MockAcceptor>>,
    body: Result<Json<ProcessRequest>, JsonRejection>,
) -> (StatusCode, Json<ProcessResponse>) {
    let request = match body {
        Ok(Json(request)) => request,
        Err(rejection) => {
            tracing::warn!(target: "quotadrain::mock", error = %rejection, "undecodable batch");
            let body = ProcessResponse::failed(rejection.body_text());
            return (StatusCode::BAD_REQUEST, Json(body));
        }
    };
    match mock.process(request.data.len()) {
        Ok(()) => (StatusCode::OK, Json(ProcessResponse::ok())),
        Err(DrainError::Rejected { reason }) => {
            (StatusCode::BAD_REQUEST, Json(ProcessResponse::failed(reason)))
        }
        Err(other) => (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(ProcessResponse::failed(other.to_string())),
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn quota() -> Quota {
        Quota::new(10, Duration::from_secs(15)).unwrap()
    }

    #[test]
    fn oversized_batch_is_blocked() {
        let mock = MockAcceptor::new(quota());
        assert_eq!(mock.process(11), Err(DrainError::rejected("blocked")));
        assert_eq!(mock.process(10), Ok(()));
        assert_eq!(mock.accepted_items(), 10);
        assert_eq!(mock.rejected_batches(), 1);
    }

    #[test]
    fn lenient_mock_ignores_the_window() {
        let mock = MockAcceptor::new(quota());
        for _ in 0..5 {
            mock.process(10).unwrap();
        }
        assert_eq!(mock.accepted_items(), 50);
    }

    #[tokio::test(start_paused = true)]
    async fn strict_mock_enforces_the_window() {
        let mock = MockAcceptor::strict(quota());
        assert!(mock.is_strict());
        mock.process(6).unwrap();
        assert!(mock.process(5).is_err());
        mock.process(4).unwrap();

        tokio::time::advance(Duration::from_secs(16)).await;
        mock.process(10).unwrap();
        assert_eq!(mock.accepted_items(), 20);
    }
}
