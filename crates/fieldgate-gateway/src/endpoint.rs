//! The hosted variable endpoint.
//!
//! Field clients connect over TCP and speak the newline-delimited JSON protocol
//! from `fieldgate-proto`. Every connection gets its own task; all of them share
//! the one variable store. Binding the listener is the gateway's only fatal
//! startup step.

use crate::config::EndpointConfig;
use fieldgate_core::VariableStore;
use fieldgate_proto::{ClientRequest, ClientResponse};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::watch;
use tokio::task::JoinHandle;

/// TCP endpoint serving variable reads and writes.
pub struct VariableEndpoint {
    listener: TcpListener,
    store: Arc<VariableStore>,
}

impl VariableEndpoint {
    /// Bind the endpoint listener.
    ///
    /// # Errors
    ///
    /// Returns error if the address cannot be bound; without the endpoint there
    /// is nothing to bridge, so the caller treats this as fatal.
    pub async fn bind(
        config: &EndpointConfig,
        store: Arc<VariableStore>,
    ) -> Result<Self, EndpointError> {
        let listener = TcpListener::bind(&config.bind_addr)
            .await
            .map_err(|source| EndpointError::Bind {
                addr: config.bind_addr.clone(),
                source,
            })?;

        match listener.local_addr() {
            Ok(addr) => tracing::info!(
                %addr,
                namespace = %config.namespace,
                "variable endpoint listening"
            ),
            Err(err) => tracing::warn!(error = %err, "endpoint local address unavailable"),
        }

        Ok(Self { listener, store })
    }

    /// Address the listener actually bound to.
    ///
    /// # Errors
    ///
    /// Returns error if the socket refuses to report its address.
    pub fn local_addr(&self) -> Result<SocketAddr, std::io::Error> {
        self.listener.local_addr()
    }

    /// Spawn the accept loop.
    ///
    /// The loop stops accepting when the shutdown signal flips; connections
    /// already open are dropped with it.
    pub fn start(self, mut shutdown: watch::Receiver<bool>) -> JoinHandle<()> {
        tokio::spawn(async move {
            loop {
                tokio::select! {
                    accepted = self.listener.accept() => match accepted {
                        Ok((socket, addr)) => {
                            tracing::debug!(%addr, "field client connected");
                            let store = Arc::clone(&self.store);
                            let shutdown = shutdown.clone();
                            tokio::spawn(serve_client(socket, addr, store, shutdown));
                        }
                        Err(err) => {
                            tracing::warn!(error = %err, "accept failed");
                        }
                    },
                    _ = shutdown.changed() => {
                        tracing::info!("variable endpoint stopped accepting connections");
                        break;
                    }
                }
            }
        })
    }
}

/// Serve one field-client connection until it closes or shutdown begins.
async fn serve_client(
    socket: TcpStream,
    addr: SocketAddr,
    store: Arc<VariableStore>,
    mut shutdown: watch::Receiver<bool>,
) {
    let (read_half, mut write_half) = socket.into_split();
    let mut lines = BufReader::new(read_half).lines();

    loop {
        tokio::select! {
            line = lines.next_line() => match line {
                Ok(Some(line)) => {
                    let response = dispatch(&store, &line);
                    let mut reply = match serde_json::to_string(&response) {
                        Ok(reply) => reply,
                        Err(err) => {
                            tracing::warn!(error = %err, "response serialization failed");
                            continue;
                        }
                    };
                    reply.push('\n');

                    if let Err(err) = write_half.write_all(reply.as_bytes()).await {
                        tracing::debug!(%addr, error = %err, "client write failed");
                        break;
                    }
                }
                Ok(None) => {
                    tracing::debug!(%addr, "field client disconnected");
                    break;
                }
                Err(err) => {
                    tracing::debug!(%addr, error = %err, "client read failed");
                    break;
                }
            },
            _ = shutdown.changed() => break,
        }
    }
}

/// Apply one request line against the store.
fn dispatch(store: &VariableStore, line: &str) -> ClientResponse {
    let request: ClientRequest = match serde_json::from_str(line) {
        Ok(request) => request,
        Err(err) => return ClientResponse::rejected(format!("malformed request: {err}")),
    };

    match request {
        ClientRequest::Read { name } => match store.read(&name) {
            Ok(value) => ClientResponse::with_value(value),
            Err(err) => ClientResponse::rejected(err.to_string()),
        },
        ClientRequest::Write { name, value } => match store.write(&name, value) {
            Ok(()) => ClientResponse::ack(),
            Err(err) => ClientResponse::rejected(err.to_string()),
        },
    }
}

/// Errors for the variable endpoint.
#[derive(Debug, thiserror::Error)]
pub enum EndpointError {
    /// The listener could not be bound
    #[error("failed to bind variable endpoint on {addr}")]
    Bind {
        /// Address that was requested
        addr: String,
        /// Underlying socket error
        #[source]
        source: std::io::Error,
    },
}
