//! Broker connection management.
//!
//! All broker I/O flows through this module: [`BrokerLink`] is the publish handle
//! handed to the bridge loop, [`LinkSupervisor`] owns the MQTT event loop and is
//! the only writer of the shared [`ConnectionState`]. The supervisor never gives
//! up; a long-lived infrastructure bridge has no maximum retry count.

use crate::bridge::ReadingSink;
use crate::config::BrokerConfig;
use fieldgate_proto::SensorReading;
use rumqttc::{AsyncClient, ConnectionError, Event, EventLoop, MqttOptions, Packet, QoS};
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;
use std::time::Duration;
use url::Url;

/// Connection state of the broker link.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    /// No session; the supervisor will attempt a connect on its next cycle.
    Disconnected,
    /// A connect attempt is in flight.
    Connecting,
    /// The broker acknowledged the session; publishing is allowed.
    Connected,
}

const STATE_DISCONNECTED: u8 = 0;
const STATE_CONNECTING: u8 = 1;
const STATE_CONNECTED: u8 = 2;

/// Atomic cell holding the connection state.
///
/// Written only from the supervisor task, read from the bridge loop. A reader
/// observes either the pre- or post-transition value; a stale read is handled as
/// a normal publish failure, not prevented by locking.
#[derive(Debug)]
pub struct ConnectionCell(AtomicU8);

impl ConnectionCell {
    fn new() -> Self {
        Self(AtomicU8::new(STATE_DISCONNECTED))
    }

    /// Current state.
    pub fn get(&self) -> ConnectionState {
        match self.0.load(Ordering::SeqCst) {
            STATE_CONNECTED => ConnectionState::Connected,
            STATE_CONNECTING => ConnectionState::Connecting,
            _ => ConnectionState::Disconnected,
        }
    }

    fn set(&self, state: ConnectionState) {
        let raw = match state {
            ConnectionState::Disconnected => STATE_DISCONNECTED,
            ConnectionState::Connecting => STATE_CONNECTING,
            ConnectionState::Connected => STATE_CONNECTED,
        };
        self.0.store(raw, Ordering::SeqCst);
    }
}

/// Publish handle for the broker connection.
///
/// Cheap to clone; all clones share one session and one state cell.
#[derive(Debug, Clone)]
pub struct BrokerLink {
    client: AsyncClient,
    state: Arc<ConnectionCell>,
    topic: String,
}

impl BrokerLink {
    /// Create the broker link and its supervisor.
    ///
    /// Resolves the broker hostname best-effort (falling back to the literal
    /// hostname) and prepares a non-persistent session with the fixed client id.
    /// Completion of the actual connect is observed by the supervisor.
    ///
    /// # Errors
    ///
    /// Returns error if the broker URL cannot be parsed.
    pub async fn open(
        config: &BrokerConfig,
        topic: String,
    ) -> Result<(Self, LinkSupervisor), BrokerError> {
        let (host, port) = parse_broker_url(&config.broker_url)?;
        let target = resolve(&host, port).await;

        let mut options = MqttOptions::new(&config.client_id, target, port);
        options.set_keep_alive(config.keep_alive);
        options.set_clean_session(true);

        let (client, eventloop) = AsyncClient::new(options, 100);
        let state = Arc::new(ConnectionCell::new());

        let link = Self {
            client,
            state: Arc::clone(&state),
            topic,
        };
        let supervisor = LinkSupervisor {
            eventloop,
            state,
            retry_interval: config.retry_interval,
            connect_grace: config.connect_grace,
        };

        Ok((link, supervisor))
    }

    /// Current connection state (read-only accessor for the bridge loop).
    #[must_use]
    pub fn state(&self) -> ConnectionState {
        self.state.get()
    }

    /// Publish one reading to the data topic.
    ///
    /// # Errors
    ///
    /// Returns error if serialization fails or the client rejects the publish.
    pub async fn publish(&self, reading: &SensorReading) -> Result<(), BrokerError> {
        let payload = reading
            .to_json()
            .map_err(|e| BrokerError::Serialize(e.to_string()))?;

        self.client
            .publish(&self.topic, QoS::AtMostOnce, false, payload)
            .await
            .map_err(|e| BrokerError::Publish(e.to_string()))
    }

    /// Request a graceful disconnect from the broker.
    ///
    /// The request is only queued here; the supervisor's event loop flushes it
    /// on its next poll. This waits, bounded, until the supervisor observes the
    /// session closing, so callers can tear the supervisor down afterwards
    /// without racing the DISCONNECT packet off the wire.
    ///
    /// # Errors
    ///
    /// Returns error if the request cannot be queued or the session close is
    /// not observed within the flush window.
    pub async fn disconnect(&self) -> Result<(), BrokerError> {
        self.client
            .disconnect()
            .await
            .map_err(|e| BrokerError::Disconnect(e.to_string()))?;

        let drained = tokio::time::timeout(DISCONNECT_FLUSH, async {
            while self.state.get() == ConnectionState::Connected {
                tokio::time::sleep(Duration::from_millis(50)).await;
            }
        })
        .await;

        drained.map_err(|_| {
            BrokerError::Disconnect("session close not confirmed before timeout".to_string())
        })
    }
}

/// How long a graceful disconnect may wait for the event loop to flush it.
const DISCONNECT_FLUSH: Duration = Duration::from_secs(2);

impl ReadingSink for BrokerLink {
    fn state(&self) -> ConnectionState {
        self.state.get()
    }

    async fn publish(&self, reading: &SensorReading) -> Result<(), BrokerError> {
        BrokerLink::publish(self, reading).await
    }
}

/// Retry supervisor driving the MQTT event loop.
///
/// Runs in its own task, forever. When disconnected it issues at most one connect
/// attempt per retry cycle, bounding each attempt by the connect grace; connect
/// completion and session drops arrive through the event loop, which takes the
/// place of the transport's connect/disconnect callbacks.
pub struct LinkSupervisor {
    eventloop: EventLoop,
    state: Arc<ConnectionCell>,
    retry_interval: Duration,
    connect_grace: Duration,
}

impl LinkSupervisor {
    /// Drive the connection until the task is torn down.
    pub async fn run(mut self) {
        loop {
            let polled = if self.state.get() == ConnectionState::Connected {
                self.eventloop.poll().await
            } else {
                self.state.set(ConnectionState::Connecting);
                match tokio::time::timeout(self.connect_grace, self.eventloop.poll()).await {
                    Ok(polled) => polled,
                    Err(_) => {
                        self.state.set(ConnectionState::Disconnected);
                        tracing::warn!(
                            grace = ?self.connect_grace,
                            "broker connect attempt did not complete in time"
                        );
                        tokio::time::sleep(self.retry_interval).await;
                        continue;
                    }
                }
            };

            match polled {
                Ok(Event::Incoming(Packet::ConnAck(_))) => {
                    // A refused CONNACK surfaces from poll() as
                    // ConnectionError::ConnectionRefused, so reaching here means
                    // the broker accepted the session.
                    self.state.set(ConnectionState::Connected);
                    tracing::info!("connected to MQTT broker");
                }
                Ok(Event::Incoming(Packet::Disconnect)) => {
                    // Clean shutdown initiated by one of the peers.
                    self.state.set(ConnectionState::Disconnected);
                    tracing::info!("broker session closed");
                }
                Ok(_) => {}
                Err(err) => {
                    let dropped = self.state.get() == ConnectionState::Connected;
                    self.state.set(ConnectionState::Disconnected);
                    match &err {
                        ConnectionError::ConnectionRefused(code) => {
                            tracing::warn!(code = ?code, "broker refused the connection");
                        }
                        _ if dropped => {
                            tracing::warn!(error = %err, "unexpected disconnect from MQTT broker");
                        }
                        _ => {
                            tracing::warn!(error = %err, "MQTT connect attempt failed");
                        }
                    }
                    tokio::time::sleep(self.retry_interval).await;
                }
            }
        }
    }
}

/// Best-effort name resolution; never fatal.
///
/// The resolved address is used only as the connect target and for logging; on
/// any failure the hostname is used verbatim.
async fn resolve(host: &str, port: u16) -> String {
    match tokio::net::lookup_host((host, port)).await {
        Ok(mut addrs) => match addrs.next() {
            Some(addr) => {
                tracing::info!(host, resolved = %addr.ip(), "resolved broker hostname");
                addr.ip().to_string()
            }
            None => {
                tracing::warn!(host, "broker hostname resolved to nothing, using it verbatim");
                host.to_string()
            }
        },
        Err(err) => {
            tracing::warn!(host, error = %err, "failed to resolve broker hostname, using it verbatim");
            host.to_string()
        }
    }
}

/// Parse a broker URL into host and port.
///
/// Accepts `tcp://host[:port]`, `mqtt://host[:port]`, and bare `host[:port]`;
/// the port defaults to 1883.
fn parse_broker_url(input: &str) -> Result<(String, u16), BrokerError> {
    if input.contains("://") {
        let url =
            Url::parse(input).map_err(|e| BrokerError::InvalidUrl(format!("{input}: {e}")))?;

        match url.scheme() {
            "tcp" | "mqtt" => {}
            scheme => {
                return Err(BrokerError::InvalidUrl(format!(
                    "{input}: unsupported scheme '{scheme}'"
                )));
            }
        }

        let host = url
            .host_str()
            .ok_or_else(|| BrokerError::InvalidUrl(format!("{input}: missing host")))?;
        return Ok((host.to_string(), url.port().unwrap_or(1883)));
    }

    let mut parts = input.split(':');
    let host = parts
        .next()
        .filter(|value| !value.is_empty())
        .ok_or_else(|| BrokerError::InvalidUrl(format!("{input}: missing host")))?;
    let port = match parts.next() {
        None => 1883,
        Some(port) => port
            .parse()
            .map_err(|_| BrokerError::InvalidUrl(format!("{input}: invalid port '{port}'")))?,
    };
    if parts.next().is_some() {
        return Err(BrokerError::InvalidUrl(format!(
            "{input}: too many ':' separators"
        )));
    }

    Ok((host.to_string(), port))
}

/// Errors for broker link operations.
#[derive(Debug, Clone, thiserror::Error)]
pub enum BrokerError {
    /// Invalid broker URL
    #[error("invalid broker URL: {0}")]
    InvalidUrl(String),
    /// Payload serialization failed
    #[error("serialize error: {0}")]
    Serialize(String),
    /// Publish failed
    #[error("publish error: {0}")]
    Publish(String),
    /// Disconnect failed
    #[error("disconnect error: {0}")]
    Disconnect(String),
}
