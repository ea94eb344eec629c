//! MQTT topic scheme.
//!
//! Topic structure: `{prefix}/data`. The gateway publishes every reading to the
//! single data topic; there is no per-field fan-out.

use serde::{Deserialize, Serialize};

/// Topic scheme configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TopicScheme {
    /// Topic prefix (default: "sensor")
    pub prefix: String,
}

impl Default for TopicScheme {
    fn default() -> Self {
        Self {
            prefix: "sensor".to_string(),
        }
    }
}

impl TopicScheme {
    /// Create a topic scheme with the given prefix.
    #[must_use]
    pub fn new(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
        }
    }

    /// Topic the gateway publishes sensor readings to.
    #[must_use]
    pub fn data(&self) -> String {
        format!("{}/data", self.prefix)
    }
}
