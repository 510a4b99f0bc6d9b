//! Producer API binary: queues items over HTTP and drains them to the acceptor.

use anyhow::{Context, Result};
use clap::Parser;
use quotadrain_http::{logging, run_client, ClientOpts};

#[tokio::main]
async fn main() -> Result<()> {
    let opts = ClientOpts::parse();
    logging::init(opts.json_logs).context("failed to initialize logging")?;
    run_client(opts).await
}
