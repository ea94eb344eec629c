//! # Fieldgate Sim
//!
//! Field-device simulator: connects to the gateway's variable endpoint and
//! periodically writes random temperature and pressure readings, the way a real
//! sensor head would. Connection loss is detected through the transport's own
//! error results and answered by re-entering the connect-retry loop.

use anyhow::{bail, Context, Result};
use fieldgate_core::{PRESSURE, TEMPERATURE};
use fieldgate_proto::{ClientRequest, ClientResponse};
use rand::Rng;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader, Lines};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpStream;
use tracing_subscriber::EnvFilter;

const TEMP_MIN: f64 = 20.0;
const TEMP_MAX: f64 = 35.0;
const PRESS_MIN: f64 = 995.0;
const PRESS_MAX: f64 = 1025.0;

const CONNECT_RETRY: Duration = Duration::from_secs(10);
const SESSION_BACKOFF: Duration = Duration::from_secs(5);

#[derive(Debug, Clone)]
struct SimConfig {
    /// Address of the gateway's variable endpoint
    endpoint_addr: String,
    /// Pause between readings
    interval: Duration,
}

impl Default for SimConfig {
    fn default() -> Self {
        Self {
            endpoint_addr: "127.0.0.1:4840".to_string(),
            interval: Duration::from_secs(30),
        }
    }
}

impl SimConfig {
    /// Load configuration from environment variables.
    ///
    /// # Environment Variables
    ///
    /// - `FIELDGATE_SIM_ENDPOINT`: gateway endpoint address
    /// - `FIELDGATE_SIM_INTERVAL_SECS`: seconds between readings
    fn from_env() -> Result<Self> {
        let mut config = Self::default();

        if let Ok(addr) = std::env::var("FIELDGATE_SIM_ENDPOINT") {
            config.endpoint_addr = addr;
        }

        if let Ok(secs) = std::env::var("FIELDGATE_SIM_INTERVAL_SECS") {
            let secs: u64 = secs
                .parse()
                .context("Invalid FIELDGATE_SIM_INTERVAL_SECS")?;
            config.interval = Duration::from_secs(secs);
        }

        Ok(config)
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    tracing::info!(
        version = env!("CARGO_PKG_VERSION"),
        "Starting fieldgate sensor simulator"
    );

    let config = SimConfig::from_env()?;

    loop {
        let stream = connect_with_retry(&config.endpoint_addr).await;
        if let Err(err) = feed_readings(stream, &config).await {
            tracing::warn!(error = %err, "endpoint session ended, reconnecting");
            tokio::time::sleep(SESSION_BACKOFF).await;
        }
    }
}

/// Connect to the endpoint, retrying forever on a fixed cadence.
async fn connect_with_retry(addr: &str) -> TcpStream {
    loop {
        match TcpStream::connect(addr).await {
            Ok(stream) => {
                tracing::info!(addr, "connected to variable endpoint");
                return stream;
            }
            Err(err) => {
                tracing::warn!(addr, error = %err, "endpoint connect failed, retrying");
                tokio::time::sleep(CONNECT_RETRY).await;
            }
        }
    }
}

/// Write random readings over one session until an I/O error ends it.
async fn feed_readings(stream: TcpStream, config: &SimConfig) -> Result<()> {
    let (read_half, mut write_half) = stream.into_split();
    let mut replies = BufReader::new(read_half).lines();

    loop {
        let (temperature, pressure) = next_reading();

        write_variable(&mut write_half, &mut replies, TEMPERATURE, temperature).await?;
        write_variable(&mut write_half, &mut replies, PRESSURE, pressure).await?;
        tracing::info!(temperature, pressure, "sent readings");

        tokio::time::sleep(config.interval).await;
    }
}

/// One write request and its reply.
async fn write_variable(
    write_half: &mut OwnedWriteHalf,
    replies: &mut Lines<BufReader<OwnedReadHalf>>,
    name: &str,
    value: f64,
) -> Result<()> {
    let request = ClientRequest::Write {
        name: name.to_string(),
        value,
    };
    let mut line = serde_json::to_string(&request).context("request serialization failed")?;
    line.push('\n');

    write_half
        .write_all(line.as_bytes())
        .await
        .context("endpoint write failed")?;

    let Some(reply) = replies.next_line().await.context("endpoint read failed")? else {
        bail!("endpoint closed the connection");
    };
    let response: ClientResponse =
        serde_json::from_str(&reply).context("malformed endpoint reply")?;

    if !response.ok {
        tracing::warn!(name, error = ?response.error, "endpoint rejected write");
    }

    Ok(())
}

/// Random sensor values, rounded to two decimals like a real sensor head reports.
fn next_reading() -> (f64, f64) {
    let mut rng = rand::thread_rng();
    let temperature = round2(rng.gen_range(TEMP_MIN..=TEMP_MAX));
    let pressure = round2(rng.gen_range(PRESS_MIN..=PRESS_MAX));
    (temperature, pressure)
}

fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}
