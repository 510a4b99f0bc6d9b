//! HTTP plumbing for `quotadrain`.
//!
//! - [`api`]: producer-facing router (`/client/*`) over a [`DrainHandle`]
//! - [`client`]: [`HttpAcceptor`], an [`Acceptor`] speaking the `/server/*` protocol
//! - [`mock`]: an in-memory acceptor and its `/server/*` router
//!
//! Items are opaque JSON values; the drain engine never looks inside them.

#![forbid(unsafe_code)]

pub mod api;
pub mod client;
pub mod config;
pub mod logging;
pub mod mock;
pub mod wire;

pub use client::HttpAcceptor;
pub use config::{ClientOpts, MockOpts};
pub use mock::MockAcceptor;

use anyhow::Context;
use quotadrain::{Acceptor, BatchQueue, DrainConfig, DrainHandle, DrainLoop, LogSink};
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::task::JoinHandle;

/// A queued work item.
pub type Item = serde_json::Value;

/// Fetch the quota and spawn a drain loop over `queue`.
///
/// If the quota cannot be fetched the error is logged and a detached handle is
/// returned: items are still accepted but nothing drains them. The returned task
/// (when present) logs how the loop ended.
pub async fn start_drain<A>(
    acceptor: A,
    queue: BatchQueue<Item>,
    config: DrainConfig,
) -> (DrainHandle<Item>, Option<JoinHandle<()>>)
where
    A: Acceptor<Item> + 'static,
{
    let drain = match DrainLoop::start(acceptor, queue.clone(), config).await {
        Ok(drain) => drain,
        Err(e) => {
            tracing::error!(
                target: "quotadrain::http",
                error = %e,
                "acceptor quota unavailable; serving without a drain loop"
            );
            return (DrainHandle::detached(queue), None);
        }
    };

    let (handle, task) = drain.with_sink(LogSink).spawn();
    let watcher = tokio::spawn(async move {
        match task.await {
            Ok(Ok(())) => tracing::info!(target: "quotadrain::http", "drain loop finished"),
            Ok(Err(e)) => tracing::error!(target: "quotadrain::http", error = %e, "drain loop gave up"),
            Err(e) => tracing::error!(target: "quotadrain::http", error = %e, "drain task panicked"),
        }
    });
    (handle, Some(watcher))
}

/// Run the producer API until ctrl-c, draining to the configured acceptor.
pub async fn run_client(opts: ClientOpts) -> anyhow::Result<()> {
    let config = opts.drain_config().context("invalid drain settings")?;
    let acceptor = HttpAcceptor::new(opts.acceptor_url.clone(), opts.timeout())
        .context("building acceptor client")?;
    tracing::info!(target: "quotadrain::http", acceptor = %acceptor.base_url(), "client starting");

    let (handle, drain_task) = start_drain(acceptor, BatchQueue::new(), config).await;

    let listener = TcpListener::bind(opts.listen)
        .await
        .with_context(|| format!("binding client API to {}", opts.listen))?;
    tracing::info!(target: "quotadrain::http", addr = %listener.local_addr()?, "client API listening");

    axum::serve(listener, api::router(handle.clone()))
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("client API server")?;

    handle.stop();
    if let Some(task) = drain_task {
        let _ = task.await;
    }
    tracing::info!(
        target: "quotadrain::http",
        total_processed = handle.total_processed(),
        queued = handle.queue_len(),
        "client stopped"
    );
    Ok(())
}

/// Serve the mock acceptor until ctrl-c.
pub async fn run_mock_server(opts: MockOpts) -> anyhow::Result<()> {
    let quota = opts.quota().context("invalid mock quota")?;
    let mock = if opts.strict { MockAcceptor::strict(quota) } else { MockAcceptor::new(quota) };

    let listener = TcpListener::bind(opts.listen)
        .await
        .with_context(|| format!("binding mock acceptor to {}", opts.listen))?;
    tracing::info!(
        target: "quotadrain::mock",
        addr = %listener.local_addr()?,
        max_items = quota.max_items(),
        window = ?quota.window(),
        strict = opts.strict,
        "mock acceptor listening"
    );

    axum::serve(listener, mock::router(Arc::new(mock)))
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("mock acceptor server")
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::warn!(target: "quotadrain::http", error = %e, "ctrl-c handler unavailable");
        std::future::pending::<()>().await;
    }
}
