//! Gateway runtime orchestration.
//!
//! Startup order matters: the variables must exist before any client can write
//! them, and the endpoint must accept connections before the bridge starts
//! sampling. Shutdown runs the same chain backwards — bridge first, then the
//! broker link, then the endpoint — and every teardown step is best-effort.

use crate::bridge::BridgeLoop;
use crate::broker::{BrokerLink, ConnectionState};
use crate::config::GatewayConfig;
use crate::endpoint::VariableEndpoint;
use anyhow::{Context, Result};
use fieldgate_core::{VariableSpec, VariableStore, PRESSURE, TEMPERATURE};
use fieldgate_proto::TopicScheme;
use std::sync::Arc;
use tokio::sync::watch;

/// The gateway process.
pub struct Gateway {
    config: GatewayConfig,
}

impl Gateway {
    /// Create a gateway from its configuration.
    #[must_use]
    pub fn new(config: GatewayConfig) -> Self {
        Self { config }
    }

    /// Run until a termination signal arrives.
    ///
    /// # Errors
    ///
    /// Returns error only for unrecoverable startup failure (the endpoint cannot
    /// bind); everything after startup is recovered internally.
    pub async fn run(self) -> Result<()> {
        tracing::info!("starting gateway runtime");

        let store = Arc::new(VariableStore::new([
            VariableSpec::writable(TEMPERATURE, 0.0),
            VariableSpec::writable(PRESSURE, 0.0),
        ]));

        let endpoint = VariableEndpoint::bind(&self.config.endpoint, Arc::clone(&store))
            .await
            .context("failed to start variable endpoint")?;

        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let endpoint_task = endpoint.start(shutdown_rx.clone());

        let topic = TopicScheme::default().data();
        let (link, supervisor) = BrokerLink::open(&self.config.broker, topic)
            .await
            .context("failed to initialize broker link")?;
        let supervisor_task = tokio::spawn(supervisor.run());

        let bridge = BridgeLoop::new(store, &self.config.bridge);
        let bridge_task = tokio::spawn(bridge.run(link.clone(), shutdown_rx));

        if let Err(err) = tokio::signal::ctrl_c().await {
            tracing::warn!(error = %err, "failed to listen for termination signal");
        }
        tracing::info!("shutdown signal received");

        // The bridge stops first: it finishes its in-flight cycle and starts no
        // new one once the signal flips.
        let _ = shutdown_tx.send(true);
        if let Err(err) = bridge_task.await {
            tracing::warn!(error = %err, "bridge task ended abnormally");
        }

        if link.state() == ConnectionState::Connected {
            match link.disconnect().await {
                Ok(()) => tracing::info!("disconnected from MQTT broker"),
                Err(err) => tracing::warn!(error = %err, "broker disconnect failed"),
            }
        }
        supervisor_task.abort();

        if let Err(err) = endpoint_task.await {
            if !err.is_cancelled() {
                tracing::warn!(error = %err, "endpoint task ended abnormally");
            }
        }

        tracing::info!("gateway stopped");
        Ok(())
    }
}
