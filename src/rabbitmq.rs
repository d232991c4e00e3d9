//! AMQP publisher for Sensu check results
//!
//! Every send walks the full connection lifecycle:
//!
//! ```text
//! Idle → Connecting → TopologyDeclared → Published → Closed
//! ```
//!
//! No connection is kept between sends, so concurrent dispatches never share
//! broker state. Both `keepalives` and `results` are declared because the Sensu
//! server expects the pair, even though only `results` is published to.

use std::{
    future::Future,
    io,
    net::{Shutdown, TcpStream as StdTcpStream, ToSocketAddrs},
    sync::{Arc, Mutex},
    time::Duration,
};

use async_trait::async_trait;
use lapin::{
    BasicProperties, Channel, Connection, ConnectionProperties, ExchangeKind,
    options::{BasicPublishOptions, ExchangeDeclareOptions, QueueBindOptions, QueueDeclareOptions},
    tcp::{HandshakeResult, TLSConfig, TcpStream},
    types::FieldTable,
    uri::{AMQPAuthority, AMQPScheme, AMQPUri, AMQPUserInfo},
};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

use crate::config::BrokerSettings;
use crate::error::TransportError;

pub const KEEPALIVES: &str = "keepalives";
pub const RESULTS: &str = "results";

/// Upper bound for a whole connect/declare/publish/close sequence.
pub const DEFAULT_SEND_TIMEOUT: Duration = Duration::from_secs(10);

/// How long an abandoned send waits for the broker to acknowledge the close.
const CLOSE_GRACE: Duration = Duration::from_secs(1);

const REPLY_SUCCESS: u16 = 200;

/// Delivers one encoded check result.
#[async_trait]
pub trait Publisher: Send + Sync {
    async fn send(&self, payload: &str) -> Result<(), TransportError>;
}

#[derive(Debug, Clone)]
pub struct RabbitMqClient {
    settings: BrokerSettings,
    timeout: Duration,
}

impl RabbitMqClient {
    pub fn new(settings: BrokerSettings) -> Self {
        Self {
            settings,
            timeout: DEFAULT_SEND_TIMEOUT,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn settings(&self) -> &BrokerSettings {
        &self.settings
    }

    pub fn uri(&self) -> AMQPUri {
        AMQPUri {
            scheme: if self.settings.use_tls {
                AMQPScheme::AMQPS
            } else {
                AMQPScheme::AMQP
            },
            authority: AMQPAuthority {
                userinfo: AMQPUserInfo {
                    username: self.settings.user.clone(),
                    password: self.settings.password.expose().to_string(),
                },
                host: self.settings.host.clone(),
                port: self.settings.port,
            },
            vhost: self.settings.virtual_host.clone(),
            query: Default::default(),
        }
    }

    /// Publish `payload`, giving up when `cancel` fires or the timeout expires.
    ///
    /// Whichever way the call ends, the broker socket is shut down before it
    /// returns.
    #[instrument(skip(self, payload, cancel), fields(host = %self.settings.host, port = self.settings.port))]
    pub async fn send_with_cancel(
        &self,
        payload: &str,
        cancel: &CancellationToken,
    ) -> Result<(), TransportError> {
        let deadline = deadline_after(self.timeout);
        let socket = BrokerSocket::default();

        debug!("connecting (tls: {})", self.settings.use_tls);
        let connection = self.bounded(cancel, deadline, self.connect(&socket)).await?;

        if let Err(e) = self
            .bounded(cancel, deadline, publish_on(&connection, payload))
            .await
        {
            // the original error is what the caller needs
            let close = connection.close(REPLY_SUCCESS, "aborted");
            let _ = tokio::time::timeout(CLOSE_GRACE, close).await;
            return Err(e);
        }

        let close = async {
            connection
                .close(REPLY_SUCCESS, "OK")
                .await
                .map_err(|e| TransportError::Connection(e.to_string()))
        };
        self.bounded(cancel, deadline, close).await?;
        debug!("connection closed");

        info!("published check result ({} bytes)", payload.len());
        Ok(())
    }

    /// Run one step of the send under the shared deadline and the cancel token.
    async fn bounded<T>(
        &self,
        cancel: &CancellationToken,
        deadline: Instant,
        step: impl Future<Output = Result<T, TransportError>>,
    ) -> Result<T, TransportError> {
        tokio::select! {
            biased;

            _ = cancel.cancelled() => {
                warn!("send cancelled before completion");
                Err(TransportError::Cancelled)
            }

            result = tokio::time::timeout_at(deadline, step) => {
                result.map_err(|_| {
                    warn!("send timed out after {:?}", self.timeout);
                    TransportError::Timeout(self.timeout)
                })?
            }
        }
    }

    /// Open the AMQP connection over a socket whose lifetime `socket` controls.
    async fn connect(&self, socket: &BrokerSocket) -> Result<Connection, TransportError> {
        let slot = socket.slot.clone();
        let timeout = self.timeout;
        let connect = move |uri: &AMQPUri| -> HandshakeResult {
            let stream = open_socket(&uri.authority.host, uri.authority.port, timeout)?;
            {
                let mut held = slot
                    .lock()
                    .map_err(|_| io::Error::other("socket slot poisoned"))?;
                if matches!(*held, Slot::Released) {
                    let _ = stream.shutdown(Shutdown::Both);
                    return Err(io::Error::from(io::ErrorKind::ConnectionAborted).into());
                }
                *held = Slot::Open(stream.try_clone()?);
            }

            let stream = TcpStream::try_from(stream)?;
            let stream = match uri.scheme {
                AMQPScheme::AMQP => stream,
                AMQPScheme::AMQPS => stream.into_tls(&uri.authority.host, TLSConfig::default())?,
            };
            stream.set_nonblocking(true)?;
            Ok(stream)
        };

        Connection::connector(self.uri(), Box::new(connect), ConnectionProperties::default())
            .await
            .map_err(|e| TransportError::Connection(e.to_string()))
    }
}

#[async_trait]
impl Publisher for RabbitMqClient {
    async fn send(&self, payload: &str) -> Result<(), TransportError> {
        self.send_with_cancel(payload, &CancellationToken::new()).await
    }
}

#[derive(Debug)]
enum Slot {
    Pending,
    Open(StdTcpStream),
    Released,
}

/// Handle on the TCP socket underneath one connection.
///
/// Dropping it shuts the socket down, which also stops the connection's I/O
/// loop when the handshake never completed and no `Connection` exists to close.
struct BrokerSocket {
    slot: Arc<Mutex<Slot>>,
}

impl Default for BrokerSocket {
    fn default() -> Self {
        Self {
            slot: Arc::new(Mutex::new(Slot::Pending)),
        }
    }
}

impl Drop for BrokerSocket {
    fn drop(&mut self) {
        let Ok(mut slot) = self.slot.lock() else {
            return;
        };
        if let Slot::Open(stream) = std::mem::replace(&mut *slot, Slot::Released) {
            let _ = stream.shutdown(Shutdown::Both);
            debug!("broker socket shut down");
        }
    }
}

fn deadline_after(timeout: Duration) -> Instant {
    let now = Instant::now();
    now.checked_add(timeout)
        .unwrap_or_else(|| now + Duration::from_secs(60 * 60 * 24 * 365))
}

fn open_socket(host: &str, port: u16, timeout: Duration) -> io::Result<StdTcpStream> {
    let mut last_error = None;
    for addr in (host, port).to_socket_addrs()? {
        match StdTcpStream::connect_timeout(&addr, timeout) {
            Ok(stream) => return Ok(stream),
            Err(e) => last_error = Some(e),
        }
    }
    Err(last_error.unwrap_or_else(|| {
        io::Error::new(io::ErrorKind::NotFound, format!("no address for {host}"))
    }))
}

async fn publish_on(connection: &Connection, payload: &str) -> Result<(), TransportError> {
    let channel = connection
        .create_channel()
        .await
        .map_err(|e| TransportError::Channel(e.to_string()))?;

    declare(&channel, KEEPALIVES).await?;
    declare(&channel, RESULTS).await?;
    debug!("topology declared");

    channel
        .basic_publish(
            RESULTS,
            "",
            BasicPublishOptions::default(),
            payload.as_bytes(),
            BasicProperties::default(),
        )
        .await
        .map_err(|e| TransportError::Publish(e.to_string()))?
        .await
        .map_err(|e| TransportError::Publish(e.to_string()))?;
    debug!("payload published");

    channel
        .close(REPLY_SUCCESS, "OK")
        .await
        .map_err(|e| TransportError::Channel(e.to_string()))
}

/// Declare a transient direct exchange with a same-named auto-delete queue bound to it.
async fn declare(channel: &Channel, name: &'static str) -> Result<(), TransportError> {
    let topology = |e: lapin::Error| TransportError::Topology {
        name,
        message: e.to_string(),
    };

    channel
        .exchange_declare(
            name,
            ExchangeKind::Direct,
            ExchangeDeclareOptions {
                durable: false,
                ..Default::default()
            },
            FieldTable::default(),
        )
        .await
        .map_err(topology)?;

    channel
        .queue_declare(
            name,
            QueueDeclareOptions {
                durable: false,
                exclusive: false,
                auto_delete: true,
                ..Default::default()
            },
            FieldTable::default(),
        )
        .await
        .map_err(topology)?;

    channel
        .queue_bind(
            name,
            name,
            "",
            QueueBindOptions::default(),
            FieldTable::default(),
        )
        .await
        .map_err(topology)
}
