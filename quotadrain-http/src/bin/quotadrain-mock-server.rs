//! Mock acceptor binary.

use anyhow::{Context, Result};
use clap::Parser;
use quotadrain_http::{logging, run_mock_server, MockOpts};

#[tokio::main]
async fn main() -> Result<()> {
    let opts = MockOpts::parse();
    logging::init(opts.json_logs).context("failed to initialize logging")?;
    run_mock_server(opts).await
}
