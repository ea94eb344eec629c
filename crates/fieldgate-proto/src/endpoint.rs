//! Line protocol of the variable endpoint.
//!
//! Field clients speak newline-delimited JSON: one [`ClientRequest`] per line, one
//! [`ClientResponse`] per line back. The protocol carries only the two operations
//! the gateway needs from its collaborators: read and write a named variable.

use serde::{Deserialize, Serialize};

/// A request from a field client.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "lowercase")]
pub enum ClientRequest {
    /// Read the current value of a variable.
    Read {
        /// Variable name.
        name: String,
    },
    /// Write a new value into a writable variable.
    Write {
        /// Variable name.
        name: String,
        /// New value.
        value: f64,
    },
}

/// The endpoint's reply to one request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClientResponse {
    /// Whether the operation succeeded.
    pub ok: bool,
    /// Value returned by a read.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub value: Option<f64>,
    /// Error description when `ok` is false.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ClientResponse {
    /// A plain success reply.
    #[must_use]
    pub fn ack() -> Self {
        Self {
            ok: true,
            value: None,
            error: None,
        }
    }

    /// A success reply carrying a read value.
    #[must_use]
    pub fn with_value(value: f64) -> Self {
        Self {
            ok: true,
            value: Some(value),
            error: None,
        }
    }

    /// A failure reply.
    #[must_use]
    pub fn rejected(error: impl Into<String>) -> Self {
        Self {
            ok: false,
            value: None,
            error: Some(error.into()),
        }
    }
}
