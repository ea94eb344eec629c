//! # Fieldgate Gateway
//!
//! Bridges a hosted variable endpoint to an MQTT broker.
//!
//! ## Architecture
//!
//! The gateway runs three concurrent units sharing process memory:
//! 1. **Variable endpoint**: accepts field-client connections and serves named
//!    variable reads/writes over a line protocol
//! 2. **Broker link supervisor**: owns the MQTT session and retries forever on a
//!    fixed cadence when disconnected
//! 3. **Bridge loop**: samples the variables on a fixed period and publishes a
//!    batched reading whenever any field moves outside tolerance

#![warn(clippy::all)]

pub mod bridge;
pub mod broker;
pub mod config;
pub mod endpoint;
pub mod runtime;

pub use config::GatewayConfig;
pub use runtime::Gateway;
