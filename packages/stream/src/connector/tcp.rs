use crate::connector::{Socket, SocketConnector};
use crate::error::{Error, ErrorKind};
use crate::Result;
use futures::future::BoxFuture;
use futures::{FutureExt, SinkExt, TryStreamExt};
use std::net::{Ipv4Addr, SocketAddr};
use tokio::net::TcpStream;
use tokio_util::codec::{BytesCodec, FramedWrite};
use tokio_util::io::ReaderStream;
use tracing::debug;

pub const ADB_SERVER_PORT: u16 = 5037;

/// Connects straight to an ADB server. Chunks are whatever each socket read
/// returns, so their boundaries carry no meaning.
#[derive(Debug, Clone)]
pub struct TcpConnector {
    addr: SocketAddr,
}

impl Default for TcpConnector {
    fn default() -> Self {
        Self::new((Ipv4Addr::LOCALHOST, ADB_SERVER_PORT).into())
    }
}

impl TcpConnector {
    pub fn new(addr: SocketAddr) -> Self {
        Self { addr }
    }

    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    async fn connect_socket(&self) -> Result<Socket> {
        let conn = TcpStream::connect(self.addr).await.map_err(|e| (ErrorKind::Connect, e))?;
        conn.set_nodelay(true)?;
        debug!(addr = %self.addr, "tcp connected");

        let (read, write) = conn.into_split();
        let sink = SinkExt::<bytes::Bytes>::sink_map_err(FramedWrite::new(write, BytesCodec::new()), Error::from);
        let stream = ReaderStream::new(read).map_err(Error::from);

        Ok(Socket { sink: Box::pin(sink), stream: Box::pin(stream) })
    }
}

impl SocketConnector for TcpConnector {
    fn connect(&self) -> BoxFuture<'_, Result<Socket>> {
        self.connect_socket().boxed()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;
    use futures::StreamExt;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    #[test]
    fn default_targets_local_server() {
        assert_eq!(TcpConnector::default().addr(), SocketAddr::from(([127, 0, 0, 1], 5037)));
    }

    #[tokio::test]
    async fn exchanges_bytes_and_reports_close() {
        let listener = TcpListener::bind((Ipv4Addr::LOCALHOST, 0)).await.unwrap();
        let connector = TcpConnector::new(listener.local_addr().unwrap());

        let server = tokio::spawn(async move {
            let (mut conn, _) = listener.accept().await.unwrap();
            let mut buf = [0; 16];
            conn.read_exact(&mut buf).await.unwrap();
            conn.write_all(b"OKAY").await.unwrap();
            buf
        });

        let mut socket = connector.connect().await.unwrap();
        socket.sink.send(Bytes::from_static(b"000Chost:version")).await.unwrap();

        assert_eq!(&server.await.unwrap(), b"000Chost:version");

        let mut received = Vec::new();
        while let Some(chunk) = socket.stream.next().await {
            received.extend_from_slice(&chunk.unwrap());
        }
        assert_eq!(received, b"OKAY");
    }

    #[tokio::test]
    async fn refused_connection_is_a_connect_error() {
        let listener = TcpListener::bind((Ipv4Addr::LOCALHOST, 0)).await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let err = TcpConnector::new(addr).connect().await.err().unwrap();
        assert_eq!(err.kind, ErrorKind::Connect);
    }
}
