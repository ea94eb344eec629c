//! Gateway binary entry point.

use anyhow::Result;
use fieldgate_gateway::{Gateway, GatewayConfig};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    tracing::info!(
        version = env!("CARGO_PKG_VERSION"),
        "Starting fieldgate gateway"
    );

    let config = GatewayConfig::from_env()?;
    Gateway::new(config).run().await
}
