//! [`Acceptor`] over HTTP.
//!
//! `GET {base}/server/limits` yields the quota; `POST {base}/server/process`
//! takes a batch. An answer with `success: false` is a rejection whatever its
//! status code. Anything that is not a decodable answer is a transport failure.

use crate::wire::{LimitsResponse, ProcessRequest, ProcessResponse};
use crate::Item;
use async_trait::async_trait;
use quotadrain::{Acceptor, DrainError, Quota};
use std::time::Duration;

/// Default request timeout for the acceptor client.
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// Remote acceptor reached through `reqwest`.
#[derive(Debug, Clone)]
pub struct HttpAcceptor {
    client: reqwest::Client,
    base_url: String,
    timeout: Duration,
}

impl HttpAcceptor {
    /// Build a client for the acceptor at `base_url` (e.g. `http://127.0.0.1:8080`).
    ///
    /// # Errors
    /// [`DrainError::Transport`] if the HTTP client cannot be constructed.
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Result<Self, DrainError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| DrainError::transport(format!("building http client: {e}")))?;
        let base_url = base_url.into().trim_end_matches('/').to_string();
        Ok(Self { client, base_url, timeout })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    fn map_error(&self, err: reqwest::Error) -> DrainError {
        if err.is_timeout() {
            DrainError::Timeout { timeout: self.timeout }
        } else {
            DrainError::transport(err.to_string())
        }
    }
}

#[async_trait]
impl Acceptor<Item> for HttpAcceptor {
    async fn fetch_quota(&self) -> Result<Quota, DrainError> {
        let url = self.url("/server/limits");
        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| DrainError::quota_unavailable(format!("GET {url}: {e}")))?;
        let status = response.status();
        if !status.is_success() {
            return Err(DrainError::quota_unavailable(format!("GET {url}: status {status}")));
        }
        let limits: LimitsResponse = response
            .json()
            .await
            .map_err(|e| DrainError::quota_unavailable(format!("decoding limits: {e}")))?;
        let quota = Quota::new(limits.number, limits.window())?;
        tracing::debug!(
            target: "quotadrain::http",
            max_items = quota.max_items(),
            window = ?quota.window(),
            "fetched acceptor quota"
        );
        Ok(quota)
    }

    async fn submit(&self, batch: Vec<Item>) -> Result<(), DrainError> {
        let body = ProcessRequest { data: batch };
        let response = self
            .client
            .post(self.url("/server/process"))
            .json(&body)
            .send()
            .await
            .map_err(|e| self.map_error(e))?;
        let status = response.status();
        let answer: ProcessResponse = match response.json().await {
            Ok(answer) => answer,
            Err(e) if e.is_timeout() => return Err(self.map_error(e)),
            Err(e) => {
                return Err(DrainError::transport(format!("status {status}, undecodable body: {e}")))
            }
        };
        if answer.success {
            Ok(())
        } else {
            Err(DrainError::rejected(answer.error))
        }
    }
}
