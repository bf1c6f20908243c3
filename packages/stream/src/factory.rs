use crate::channel::Channel;
use crate::connector::{SocketConnector, WebSocketConnector};
use crate::error::ErrorKind;
use crate::stream::AdbStream;
use crate::Result;
use derive_more::Display;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

/// Transport-switch command sent ahead of the destination, redirecting the
/// connection from the host to one device.
#[derive(Debug, Display, Clone, PartialEq, Eq)]
#[display("{transport}")]
pub struct Target {
    pub transport: String,
}

impl Target {
    pub fn new(transport: impl Into<String>) -> Self {
        Self { transport: transport.into() }
    }

    pub fn serial(serial: &str) -> Self {
        Self::new(format!("host:transport:{serial}"))
    }

    pub fn usb() -> Self {
        Self::new("host:transport-usb")
    }

    pub fn local() -> Self {
        Self::new("host:transport-local")
    }

    pub fn any() -> Self {
        Self::new("host:transport-any")
    }
}

/// Opens streams, each on a fresh socket from its connector.
#[derive(Clone)]
pub struct StreamFactory {
    connector: Arc<dyn SocketConnector>,
    handshake_timeout: Option<Duration>,
}

impl Default for StreamFactory {
    fn default() -> Self {
        Self::new(Arc::new(WebSocketConnector::default()))
    }
}

impl StreamFactory {
    pub fn new(connector: Arc<dyn SocketConnector>) -> Self {
        Self { connector, handshake_timeout: None }
    }

    /// Bounds the wait for the server's handshake responses. Unbounded by
    /// default.
    pub fn with_handshake_timeout(mut self, limit: Duration) -> Self {
        self.handshake_timeout = Some(limit);
        self
    }

    /// Binds `stream` to a new channel and returns once it can exchange
    /// payloads. Without a `target` the stream is addressed to the host.
    pub async fn open(&self, stream: &AdbStream, target: Option<&Target>) -> Result<()> {
        if stream.is_bound() {
            Err(ErrorKind::StreamReuse)?;
        }

        let (channel, pending) = Channel::new(
            stream.handler(),
            stream.destination(),
            target.map(|t| t.transport.clone()),
        );
        stream.bind(channel)?;
        debug!(destination = stream.destination(), ?target, "open stream");

        pending.open(&*self.connector, self.handshake_timeout).await
    }
}
