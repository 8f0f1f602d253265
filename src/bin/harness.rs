//! Run the full load harness with the default fixed parameters.
//!
//! Run with: cargo run --bin harness

use anyhow::Result;
use meshload::{Harness, HarnessConfig};
use tracing::debug;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("meshload=debug")),
        )
        .init();

    let config = HarnessConfig::default();
    debug!(config = %serde_json::to_string_pretty(&config)?, "harness configuration");

    Harness::new(config).run().await
}
