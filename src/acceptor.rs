//! The remote side of the drain loop.
//!
//! An [`Acceptor`] advertises a quota once and then takes batches. The drain loop
//! never sees transport details; implementations map their failures onto
//! [`DrainError::Transport`] or [`DrainError::Rejected`].

use crate::error::DrainError;
use crate::quota::Quota;
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;

/// Remote acceptor of batches.
#[async_trait]
pub trait Acceptor<T: Send + 'static>: Send + Sync {
    /// Fetch the advertised quota. Called once, before draining starts.
    ///
    /// # Errors
    /// [`DrainError::QuotaUnavailable`] when the acceptor cannot be reached or
    /// answers with something unusable.
    async fn fetch_quota(&self) -> Result<Quota, DrainError>;

    /// Submit one batch, in order.
    ///
    /// # Errors
    /// [`DrainError::Transport`] for network failures, [`DrainError::Rejected`]
    /// when the acceptor declines the batch.
    async fn submit(&self, batch: Vec<T>) -> Result<(), DrainError>;
}

#[async_trait]
impl<T, A> Acceptor<T> for Arc<A>
where
    T: Send + 'static,
    A: Acceptor<T> + ?Sized,
{
    async fn fetch_quota(&self) -> Result<Quota, DrainError> {
        (**self).fetch_quota().await
    }

    async fn submit(&self, batch: Vec<T>) -> Result<(), DrainError> {
        (**self).submit(batch).await
    }
}

/// Submit `batch` but give up after `timeout`.
///
/// An expired submission is reported as [`DrainError::Timeout`]; the request
/// future is dropped, so whether the acceptor saw it is unknown. The items stay
/// queued either way.
pub async fn submit_within<T, A>(
    acceptor: &A,
    batch: Vec<T>,
    timeout: Duration,
) -> Result<(), DrainError>
where
    T: Send + 'static,
    A: Acceptor<T> + ?Sized,
{
    match tokio::time::timeout(timeout, acceptor.submit(batch)).await {
        Ok(result) => result,
        Err(_) => Err(DrainError::Timeout { timeout }),
    }
}
