use fieldgate_core::{VariableSpec, VariableStore, PRESSURE, TEMPERATURE};
use fieldgate_gateway::bridge::{BridgeLoop, ReadingSink};
use fieldgate_gateway::broker::{BrokerError, BrokerLink, ConnectionState};
use fieldgate_gateway::config::{BridgeConfig, EndpointConfig, GatewayConfig};
use fieldgate_gateway::endpoint::VariableEndpoint;
use fieldgate_proto::{ClientResponse, SensorReading, TopicScheme};
use rumqttc::{AsyncClient, Event, MqttOptions, Packet, QoS};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::TcpStream;
use tokio::sync::watch;
use tokio::time::timeout;
use tokio_test::assert_ok;

fn tracked_store() -> Arc<VariableStore> {
    Arc::new(VariableStore::new([
        VariableSpec::writable(TEMPERATURE, 0.0),
        VariableSpec::writable(PRESSURE, 0.0),
    ]))
}

async fn local_endpoint(store: Arc<VariableStore>) -> (VariableEndpoint, std::net::SocketAddr) {
    let config = EndpointConfig {
        bind_addr: "127.0.0.1:0".to_string(),
        namespace: "SENSOR_DATA".to_string(),
    };
    let endpoint = VariableEndpoint::bind(&config, store).await.unwrap();
    let addr = endpoint.local_addr().unwrap();
    (endpoint, addr)
}

async fn roundtrip(
    lines: &mut tokio::io::Lines<BufReader<tokio::net::tcp::OwnedReadHalf>>,
    writer: &mut tokio::net::tcp::OwnedWriteHalf,
    request: &str,
) -> ClientResponse {
    writer.write_all(request.as_bytes()).await.unwrap();
    writer.write_all(b"\n").await.unwrap();
    let reply = timeout(Duration::from_secs(5), lines.next_line())
        .await
        .expect("timeout waiting for endpoint reply")
        .unwrap()
        .expect("endpoint closed the connection");
    serde_json::from_str(&reply).unwrap()
}

#[tokio::test]
async fn endpoint_serves_field_clients() {
    let store = tracked_store();
    let (endpoint, addr) = local_endpoint(Arc::clone(&store)).await;

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let endpoint_task = endpoint.start(shutdown_rx);

    let stream = TcpStream::connect(addr).await.unwrap();
    let (read_half, mut write_half) = stream.into_split();
    let mut lines = BufReader::new(read_half).lines();

    let write = roundtrip(
        &mut lines,
        &mut write_half,
        r#"{"op":"write","name":"Temperature","value":25.5}"#,
    )
    .await;
    assert_eq!(write, ClientResponse::ack());

    let read = roundtrip(
        &mut lines,
        &mut write_half,
        r#"{"op":"read","name":"Temperature"}"#,
    )
    .await;
    assert_eq!(read, ClientResponse::with_value(25.5));

    // The write landed in the store the bridge samples from.
    assert_eq!(store.read(TEMPERATURE).unwrap(), 25.5);

    let rejected = roundtrip(
        &mut lines,
        &mut write_half,
        r#"{"op":"write","name":"Humidity","value":1.0}"#,
    )
    .await;
    assert!(!rejected.ok);

    shutdown_tx.send(true).unwrap();
    tokio_test::assert_ok!(endpoint_task.await);
}

#[derive(Clone)]
struct RecordingSink {
    published: Arc<Mutex<Vec<SensorReading>>>,
}

impl RecordingSink {
    fn new() -> Self {
        Self {
            published: Arc::new(Mutex::new(Vec::new())),
        }
    }

    fn published(&self) -> Vec<SensorReading> {
        self.published.lock().unwrap().clone()
    }
}

impl ReadingSink for RecordingSink {
    fn state(&self) -> ConnectionState {
        ConnectionState::Connected
    }

    async fn publish(&self, reading: &SensorReading) -> Result<(), BrokerError> {
        self.published.lock().unwrap().push(*reading);
        Ok(())
    }
}

#[tokio::test]
async fn bridge_publishes_field_client_writes() {
    let store = tracked_store();
    let (endpoint, addr) = local_endpoint(Arc::clone(&store)).await;

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let _endpoint_task = endpoint.start(shutdown_rx.clone());

    let bridge = BridgeLoop::new(
        Arc::clone(&store),
        &BridgeConfig {
            sample_interval: Duration::from_millis(20),
            threshold: 0.001,
        },
    );
    let sink = RecordingSink::new();
    let bridge_task = tokio::spawn(bridge.run(sink.clone(), shutdown_rx));

    // Let the first cycle publish the initial zeros, then feed a reading.
    tokio::time::sleep(Duration::from_millis(60)).await;

    let stream = TcpStream::connect(addr).await.unwrap();
    let (read_half, mut write_half) = stream.into_split();
    let mut lines = BufReader::new(read_half).lines();
    roundtrip(
        &mut lines,
        &mut write_half,
        r#"{"op":"write","name":"Temperature","value":25.0}"#,
    )
    .await;
    roundtrip(
        &mut lines,
        &mut write_half,
        r#"{"op":"write","name":"Pressure","value":1010.0}"#,
    )
    .await;

    tokio::time::sleep(Duration::from_millis(200)).await;
    shutdown_tx.send(true).unwrap();
    bridge_task.await.unwrap();

    let published = sink.published();
    assert!(
        published.contains(&SensorReading::new(25.0, 1010.0)),
        "expected the written reading to be published, got {published:?}"
    );
    // Steady values publish once, not per cycle.
    let repeats = published
        .iter()
        .filter(|reading| **reading == SensorReading::new(25.0, 1010.0))
        .count();
    assert_eq!(repeats, 1);
}

/// End-to-end broker round-trip; needs a live broker, so it is opt-in.
#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn broker_link_roundtrip() {
    if std::env::var("FIELDGATE_INTEGRATION").is_err() {
        eprintln!("Skipping integration test; set FIELDGATE_INTEGRATION=1 to run");
        return;
    }

    let mut config = GatewayConfig::default().broker;
    config.broker_url = std::env::var("FIELDGATE_MQTT_BROKER")
        .unwrap_or_else(|_| "tcp://localhost:1883".to_string());
    config.retry_interval = Duration::from_secs(1);

    let topic = TopicScheme::default().data();

    let bare = config
        .broker_url
        .strip_prefix("tcp://")
        .or_else(|| config.broker_url.strip_prefix("mqtt://"))
        .unwrap_or(&config.broker_url);
    let (host, port) = match bare.split_once(':') {
        Some((host, port)) => (host.to_string(), port.parse().unwrap_or(1883)),
        None => (bare.to_string(), 1883),
    };

    // Independent subscriber watching the data topic.
    let mut sub_opts = MqttOptions::new("fieldgate-test-sub", host, port);
    sub_opts.set_keep_alive(Duration::from_secs(5));
    let (sub_client, mut sub_eventloop) = AsyncClient::new(sub_opts, 10);
    sub_client
        .subscribe(&topic, QoS::AtLeastOnce)
        .await
        .unwrap();

    let (tx, rx) = tokio::sync::oneshot::channel();
    tokio::spawn(async move {
        loop {
            match sub_eventloop.poll().await {
                Ok(Event::Incoming(Packet::Publish(publish))) => {
                    let _ = tx.send(publish.payload.to_vec());
                    break;
                }
                Ok(_) => {}
                Err(_) => break,
            }
        }
    });

    let (link, supervisor) = BrokerLink::open(&config, topic).await.unwrap();
    let supervisor_task = tokio::spawn(supervisor.run());

    let deadline = tokio::time::Instant::now() + Duration::from_secs(10);
    while link.state() != ConnectionState::Connected {
        assert!(
            tokio::time::Instant::now() < deadline,
            "broker link never connected"
        );
        tokio::time::sleep(Duration::from_millis(50)).await;
    }

    let reading = SensorReading::new(25.0, 1010.0);
    link.publish(&reading).await.unwrap();

    let received = timeout(Duration::from_secs(5), rx)
        .await
        .expect("timeout waiting for published reading")
        .expect("subscriber dropped");
    let decoded = SensorReading::from_json(std::str::from_utf8(&received).unwrap()).unwrap();
    assert_eq!(decoded, reading);

    supervisor_task.abort();
}
