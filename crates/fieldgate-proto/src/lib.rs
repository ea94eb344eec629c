//! # Fieldgate Protocol
//!
//! Wire formats shared between the gateway, the broker, and field clients.
//!
//! ## Messages
//!
//! - `SensorReading`: the JSON payload published once per publish-worthy cycle
//! - `ClientRequest`/`ClientResponse`: the endpoint's newline-delimited JSON protocol
//!
//! ## MQTT Topics
//!
//! Topic scheme: `{prefix}/data`, default `sensor/data`.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod endpoint;
pub mod messages;
pub mod topics;

pub use endpoint::{ClientRequest, ClientResponse};
pub use messages::{MessageError, SensorReading};
pub use topics::TopicScheme;
