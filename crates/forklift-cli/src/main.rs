//! forklift-migrate
//!
//! Runs Forklift VM migrations described by request files.

use clap::Parser;

use forklift_cli::{Cli, Result};
use forklift_common::telemetry::{init_tracing, TelemetryConfig};

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    init_tracing(TelemetryConfig {
        json: cli.log_json,
        ..Default::default()
    })?;

    cli.run().await
}
