//! Gateway configuration.

use anyhow::{Context, Result};
use fieldgate_core::DEFAULT_THRESHOLD;
use std::time::Duration;

/// Gateway configuration.
#[derive(Debug, Clone)]
pub struct GatewayConfig {
    /// Variable endpoint configuration
    pub endpoint: EndpointConfig,

    /// Broker link configuration
    pub broker: BrokerConfig,

    /// Bridge loop configuration
    pub bridge: BridgeConfig,
}

/// Variable endpoint configuration.
#[derive(Debug, Clone)]
pub struct EndpointConfig {
    /// Address the endpoint listens on
    pub bind_addr: String,

    /// Namespace the variables are registered under
    pub namespace: String,
}

/// Broker link configuration.
#[derive(Debug, Clone)]
pub struct BrokerConfig {
    /// MQTT broker URL (e.g., `tcp://mqtt-broker:1883`)
    pub broker_url: String,

    /// Fixed client identifier; the session is non-persistent
    pub client_id: String,

    /// MQTT keepalive interval
    pub keep_alive: Duration,

    /// Supervisor poll period between connect attempts
    pub retry_interval: Duration,

    /// How long one connect attempt may take before it counts as failed
    pub connect_grace: Duration,
}

/// Bridge loop configuration.
#[derive(Debug, Clone)]
pub struct BridgeConfig {
    /// Sampling period of the bridge loop
    pub sample_interval: Duration,

    /// Absolute change threshold that makes a cycle publish-worthy
    pub threshold: f64,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            endpoint: EndpointConfig {
                bind_addr: "0.0.0.0:4840".to_string(),
                namespace: "SENSOR_DATA".to_string(),
            },
            broker: BrokerConfig {
                broker_url: "tcp://mqtt-broker:1883".to_string(),
                client_id: "fieldgate-gateway".to_string(),
                keep_alive: Duration::from_secs(60),
                retry_interval: Duration::from_secs(10),
                connect_grace: Duration::from_secs(5),
            },
            bridge: BridgeConfig {
                sample_interval: Duration::from_secs(10),
                threshold: DEFAULT_THRESHOLD,
            },
        }
    }
}

impl GatewayConfig {
    /// Load configuration from environment variables.
    ///
    /// # Environment Variables
    ///
    /// - `FIELDGATE_BIND_ADDR`: variable endpoint listen address
    /// - `FIELDGATE_NAMESPACE`: variable namespace
    /// - `FIELDGATE_MQTT_BROKER`: MQTT broker URL
    /// - `FIELDGATE_SAMPLE_INTERVAL_SECS`: bridge sampling period in seconds
    /// - `FIELDGATE_THRESHOLD`: absolute publish threshold
    ///
    /// # Errors
    ///
    /// Returns error if a numeric variable does not parse.
    pub fn from_env() -> Result<Self> {
        let mut config = Self::default();

        if let Ok(addr) = std::env::var("FIELDGATE_BIND_ADDR") {
            config.endpoint.bind_addr = addr;
        }

        if let Ok(namespace) = std::env::var("FIELDGATE_NAMESPACE") {
            config.endpoint.namespace = namespace;
        }

        if let Ok(broker) = std::env::var("FIELDGATE_MQTT_BROKER") {
            config.broker.broker_url = broker;
        }

        if let Ok(secs) = std::env::var("FIELDGATE_SAMPLE_INTERVAL_SECS") {
            let secs: u64 = secs
                .parse()
                .context("Invalid FIELDGATE_SAMPLE_INTERVAL_SECS")?;
            config.bridge.sample_interval = Duration::from_secs(secs);
        }

        if let Ok(threshold) = std::env::var("FIELDGATE_THRESHOLD") {
            config.bridge.threshold = threshold.parse().context("Invalid FIELDGATE_THRESHOLD")?;
        }

        Ok(config)
    }
}
