use crate::Result;
use bytes::Bytes;
use futures::future::BoxFuture;
use futures::{Sink, Stream};
use std::pin::Pin;

pub mod memory;
pub mod tcp;
pub mod websocket;

pub use memory::{MemoryConnector, RemoteEnd};
pub use tcp::TcpConnector;
pub use websocket::WebSocketConnector;

pub type SocketSink = Pin<Box<dyn Sink<Bytes, Error = crate::Error> + Send>>;

/// Received chunks. The end of the stream is the socket's close event.
pub type SocketStream = Pin<Box<dyn Stream<Item = Result<Bytes>> + Send>>;

/// An established message-based socket, split into its two directions.
pub struct Socket {
    pub sink: SocketSink,
    pub stream: SocketStream,
}

/// Opens one fresh socket per call. Every stream owns its own socket.
pub trait SocketConnector: Send + Sync {
    fn connect(&self) -> BoxFuture<'_, Result<Socket>>;
}
