//! Change-detection bridge loop.
//!
//! Samples the variable store on a fixed period and asks the broker link to
//! transmit when the detector marks the cycle publish-worthy. The decision and the
//! transmission are decoupled: the snapshot advances with the decision, and a cycle
//! that cannot transmit is a silent drop, never queued for retry.

use crate::broker::{BrokerError, ConnectionState};
use crate::config::BridgeConfig;
use fieldgate_core::{ChangeDetector, Decision, VariableStore, PRESSURE, TEMPERATURE};
use fieldgate_proto::SensorReading;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;

/// Outbound side of the bridge.
///
/// Implemented by the broker link; tests substitute a recording fake.
#[allow(async_fn_in_trait)]
pub trait ReadingSink {
    /// Current connection state, read to gate publishing.
    fn state(&self) -> ConnectionState;

    /// Attempt to transmit one reading.
    async fn publish(&self, reading: &SensorReading) -> Result<(), BrokerError>;
}

/// The sampling loop.
pub struct BridgeLoop {
    store: Arc<VariableStore>,
    detector: ChangeDetector,
    sample_interval: Duration,
}

impl BridgeLoop {
    /// Create the loop over a shared variable store.
    #[must_use]
    pub fn new(store: Arc<VariableStore>, config: &BridgeConfig) -> Self {
        Self {
            store,
            detector: ChangeDetector::new(config.threshold),
            sample_interval: config.sample_interval,
        }
    }

    /// Run until the shutdown signal flips.
    ///
    /// The first sample happens immediately; afterwards one cycle per period. The
    /// loop never advances to the next sample before the current cycle's
    /// decision/transmit step completes, so publishes are strictly ordered.
    pub async fn run<S: ReadingSink>(mut self, sink: S, mut shutdown: watch::Receiver<bool>) {
        let mut ticker = tokio::time::interval(self.sample_interval);

        loop {
            tokio::select! {
                _ = ticker.tick() => self.cycle(&sink).await,
                _ = shutdown.changed() => {
                    tracing::info!("bridge loop stopping");
                    break;
                }
            }
        }
    }

    /// One sampling cycle: read, decide, and (connectivity permitting) transmit.
    async fn cycle<S: ReadingSink>(&mut self, sink: &S) {
        let fields = match self.store.read_all() {
            Ok(fields) => fields,
            Err(err) => {
                // Transient; the next cycle reads again.
                tracing::warn!(error = %err, "variable read failed, skipping cycle");
                return;
            }
        };

        tracing::debug!(?fields, "sampled variables");

        if self.detector.observe(&fields) == Decision::Hold {
            tracing::trace!("no significant change, not publishing");
            return;
        }

        let reading = match reading_from_fields(&fields) {
            Ok(reading) => reading,
            Err(err) => {
                tracing::warn!(error = %err, "cannot assemble payload, skipping cycle");
                return;
            }
        };

        if sink.state() != ConnectionState::Connected {
            tracing::info!("broker not connected, skipping publish");
            return;
        }

        match sink.publish(&reading).await {
            Ok(()) => tracing::info!(
                temperature = reading.temperature,
                pressure = reading.pressure,
                "published sensor reading"
            ),
            Err(err) => tracing::warn!(error = %err, "failed to publish reading"),
        }
    }
}

/// Assemble the published payload from the sampled fields.
fn reading_from_fields(fields: &[(String, f64)]) -> Result<SensorReading, BridgeError> {
    let lookup = |wanted: &'static str| {
        fields
            .iter()
            .find(|(name, _)| name == wanted)
            .map(|(_, value)| *value)
            .ok_or(BridgeError::MissingField(wanted))
    };

    Ok(SensorReading::new(lookup(TEMPERATURE)?, lookup(PRESSURE)?))
}

/// Errors internal to the bridge loop.
#[derive(Debug, Clone, thiserror::Error)]
pub enum BridgeError {
    /// A tracked field was absent from the sampled set
    #[error("tracked field '{0}' missing from the variable store")]
    MissingField(&'static str),
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::GatewayConfig;
    use fieldgate_core::VariableSpec;
    use std::sync::Mutex;

    struct RecordingSink {
        state: ConnectionState,
        fail: bool,
        published: Mutex<Vec<SensorReading>>,
    }

    impl RecordingSink {
        fn connected() -> Self {
            Self {
                state: ConnectionState::Connected,
                fail: false,
                published: Mutex::new(Vec::new()),
            }
        }

        fn disconnected() -> Self {
            Self {
                state: ConnectionState::Disconnected,
                ..Self::connected()
            }
        }

        fn failing() -> Self {
            Self {
                fail: true,
                ..Self::connected()
            }
        }

        fn published(&self) -> Vec<SensorReading> {
            self.published.lock().unwrap().clone()
        }
    }

    impl ReadingSink for RecordingSink {
        fn state(&self) -> ConnectionState {
            self.state
        }

        async fn publish(&self, reading: &SensorReading) -> Result<(), BrokerError> {
            if self.fail {
                return Err(BrokerError::Publish("broker said no".to_string()));
            }
            self.published.lock().unwrap().push(*reading);
            Ok(())
        }
    }

    fn bridge() -> (BridgeLoop, Arc<VariableStore>) {
        let store = Arc::new(VariableStore::new([
            VariableSpec::writable(TEMPERATURE, 0.0),
            VariableSpec::writable(PRESSURE, 0.0),
        ]));
        let bridge = BridgeLoop::new(Arc::clone(&store), &GatewayConfig::default().bridge);
        (bridge, store)
    }

    #[tokio::test]
    async fn first_cycle_publishes_current_values() {
        let (mut bridge, store) = bridge();
        store.write(TEMPERATURE, 25.0).unwrap();
        store.write(PRESSURE, 1010.0).unwrap();

        let sink = RecordingSink::connected();
        bridge.cycle(&sink).await;

        assert_eq!(sink.published(), vec![SensorReading::new(25.0, 1010.0)]);
    }

    #[tokio::test]
    async fn within_tolerance_cycle_publishes_nothing() {
        let (mut bridge, store) = bridge();
        store.write(TEMPERATURE, 25.0).unwrap();
        store.write(PRESSURE, 1010.0).unwrap();

        let sink = RecordingSink::connected();
        bridge.cycle(&sink).await;

        store.write(TEMPERATURE, 25.0005).unwrap();
        bridge.cycle(&sink).await;

        assert_eq!(sink.published().len(), 1);
    }

    #[tokio::test]
    async fn disconnected_cycle_updates_snapshot_without_broker_calls() {
        let (mut bridge, store) = bridge();
        store.write(TEMPERATURE, 25.0).unwrap();
        store.write(PRESSURE, 1010.0).unwrap();

        let connected = RecordingSink::connected();
        bridge.cycle(&connected).await;

        // Value moves while the broker is away: decision still happens.
        store.write(TEMPERATURE, 25.01).unwrap();
        let offline = RecordingSink::disconnected();
        bridge.cycle(&offline).await;
        assert!(offline.published().is_empty());

        // Connectivity returns with the same values: the snapshot already carried
        // them forward, so nothing is re-published.
        let back = RecordingSink::connected();
        bridge.cycle(&back).await;
        assert!(back.published().is_empty());
    }

    #[tokio::test]
    async fn failed_transmission_is_not_retried() {
        let (mut bridge, store) = bridge();
        store.write(TEMPERATURE, 25.0).unwrap();
        store.write(PRESSURE, 1010.0).unwrap();

        let broken = RecordingSink::failing();
        bridge.cycle(&broken).await;

        let sink = RecordingSink::connected();
        bridge.cycle(&sink).await;
        assert!(sink.published().is_empty());
    }

    #[tokio::test]
    async fn missing_tracked_field_skips_the_cycle() {
        let store = Arc::new(VariableStore::new([VariableSpec::writable(
            TEMPERATURE,
            25.0,
        )]));
        let mut bridge = BridgeLoop::new(Arc::clone(&store), &GatewayConfig::default().bridge);

        let sink = RecordingSink::connected();
        bridge.cycle(&sink).await;

        assert!(sink.published().is_empty());
    }

    #[tokio::test]
    async fn shutdown_signal_stops_the_loop() {
        let (bridge, _store) = bridge();
        let (tx, rx) = watch::channel(false);
        let sink = RecordingSink::disconnected();

        let handle = tokio::spawn(bridge.run(sink, rx));
        tx.send(true).unwrap();

        handle.await.unwrap();
    }
}
