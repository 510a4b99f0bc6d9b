//! JSON bodies exchanged by the client API and the acceptor endpoints.
//!
//! Field names follow the deployed protocol, including the capitalised
//! `TotalProcessed` key.

use crate::Item;
use quotadrain::{DrainHandle, Quota};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Error string for a process request with no items.
pub const NO_ITEMS_PROVIDED: &str = "No items provided";
/// Error string for a process request whose body could not be decoded.
pub const INVALID_REQUEST: &str = "invalid request";
/// Error string the acceptor uses when it declines a batch.
pub const BLOCKED: &str = "blocked";

/// `POST /client/process` and `POST /server/process` body.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProcessRequest {
    pub data: Vec<Item>,
}

/// Answer to a process request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProcessResponse {
    pub success: bool,
    #[serde(default)]
    pub error: String,
}

impl ProcessResponse {
    pub fn ok() -> Self {
        Self { success: true, error: String::new() }
    }

    pub fn failed(error: impl Into<String>) -> Self {
        Self { success: false, error: error.into() }
    }
}

/// `GET /server/limits` body. `duration` is in nanoseconds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LimitsResponse {
    pub number: u64,
    pub duration: u64,
}

impl From<Quota> for LimitsResponse {
    fn from(quota: Quota) -> Self {
        Self {
            number: quota.max_items(),
            duration: u64::try_from(quota.window().as_nanos()).unwrap_or(u64::MAX),
        }
    }
}

impl LimitsResponse {
    pub fn window(&self) -> Duration {
        Duration::from_nanos(self.duration)
    }
}

/// `GET /client/total` body.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TotalProcessedResponse {
    #[serde(rename = "TotalProcessed")]
    pub total_processed: u64,
}

/// `POST /client/stop` body.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct StopResponse {
    pub success: bool,
}

/// `GET /client/status` body.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusResponse {
    pub state: String,
    pub queue_len: usize,
    pub total_processed: u64,
    pub error_streak: usize,
    pub submissions: u64,
    pub failures: u64,
    pub stop_requested: bool,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub stop_reason: Option<String>,
}

impl StatusResponse {
    pub fn from_handle<T>(handle: &DrainHandle<T>) -> Self {
        Self {
            state: handle.state().as_str().to_string(),
            queue_len: handle.queue_len(),
            total_processed: handle.total_processed(),
            error_streak: handle.error_streak(),
            submissions: handle.submissions(),
            failures: handle.failures(),
            stop_requested: handle.is_stop_requested(),
            stop_reason: handle.stop_reason().map(|r| r.to_string()),
        }
    }
}
