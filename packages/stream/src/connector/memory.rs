//! In-memory socket whose far end is scripted by the caller. Used to drive
//! channels deterministically in tests.

use crate::connector::{Socket, SocketConnector};
use crate::error::{Error, ErrorKind};
use crate::protocol::{encode_fail, parse_length, Status, LENGTH_PREFIX};
use crate::Result;
use bytes::{Bytes, BytesMut};
use flume::{unbounded, Receiver, Sender};
use futures::future::{ready, BoxFuture};
use futures::{FutureExt, SinkExt};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};

/// Hands out its socket to the first `connect` call only.
pub struct MemoryConnector {
    socket: Mutex<Option<Socket>>,
    connects: AtomicUsize,
}

/// Server side of a [`MemoryConnector`] socket.
pub struct RemoteEnd {
    tx: Option<Sender<Result<Bytes>>>,
    rx: Receiver<Bytes>,
    pending: BytesMut,
}

impl MemoryConnector {
    pub fn pair() -> (Self, RemoteEnd) {
        let (client_tx, remote_rx) = unbounded::<Bytes>();
        let (remote_tx, client_rx) = unbounded::<Result<Bytes>>();

        let socket = Socket {
            sink: Box::pin(
                client_tx.into_sink().sink_map_err(|_| Error::from(ErrorKind::Closed)),
            ),
            stream: Box::pin(client_rx.into_stream()),
        };

        (
            Self { socket: Mutex::new(Some(socket)), connects: AtomicUsize::new(0) },
            RemoteEnd { tx: Some(remote_tx), rx: remote_rx, pending: BytesMut::new() },
        )
    }

    /// A connector whose every `connect` fails.
    pub fn refusing() -> Self {
        Self { socket: Mutex::new(None), connects: AtomicUsize::new(0) }
    }

    pub fn connect_count(&self) -> usize {
        self.connects.load(Ordering::SeqCst)
    }
}

impl SocketConnector for MemoryConnector {
    fn connect(&self) -> BoxFuture<'_, Result<Socket>> {
        self.connects.fetch_add(1, Ordering::SeqCst);
        let socket = self.socket.lock().take();
        ready(socket.ok_or_else(|| (ErrorKind::Io, "connection refused").into())).boxed()
    }
}

impl RemoteEnd {
    /// Delivers one chunk to the client. Returns `false` once closed.
    pub fn send(&self, data: impl Into<Bytes>) -> bool {
        self.tx.as_ref().is_some_and(|tx| tx.send(Ok(data.into())).is_ok())
    }

    pub fn okay(&self) -> bool {
        self.send(Bytes::from_static(Status::Okay.as_bytes()))
    }

    pub fn fail(&self, message: &str) -> bool {
        encode_fail(message).is_ok_and(|data| self.send(data))
    }

    /// Fails the client's receive side with a transport error.
    pub fn error(&self, error: Error) -> bool {
        self.tx.as_ref().is_some_and(|tx| tx.send(Err(error)).is_ok())
    }

    /// Fires the client's close event.
    pub fn close(&mut self) {
        self.tx.take();
    }

    pub fn is_closed(&self) -> bool {
        self.tx.is_none()
    }

    /// Next written chunk, or `None` once the client closed its side.
    pub async fn recv(&mut self) -> Option<Bytes> {
        if !self.pending.is_empty() {
            return Some(self.pending.split().freeze());
        }
        self.rx.recv_async().await.ok()
    }

    /// Collects exactly `size` written bytes regardless of how they were
    /// split, or `None` if the client closed first.
    pub async fn recv_exact(&mut self, size: usize) -> Option<Bytes> {
        while self.pending.len() < size {
            let chunk = self.rx.recv_async().await.ok()?;
            self.pending.extend_from_slice(&chunk);
        }
        Some(self.pending.split_to(size).freeze())
    }

    /// Reads one length-prefixed request.
    pub async fn recv_request(&mut self) -> Result<String> {
        let closed = || Error::from(ErrorKind::Closed);
        let len = parse_length(&self.recv_exact(LENGTH_PREFIX).await.ok_or_else(closed)?)?;
        let cmd = self.recv_exact(len).await.ok_or_else(closed)?;
        String::from_utf8(cmd.to_vec())
            .map_err(|e| (ErrorKind::protocol("request is not utf8"), e).into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::StreamExt;

    #[tokio::test]
    async fn connects_once() {
        let (connector, _remote) = MemoryConnector::pair();
        assert!(connector.connect().await.is_ok());
        assert!(connector.connect().await.is_err());
        assert_eq!(connector.connect_count(), 2);

        let refusing = MemoryConnector::refusing();
        assert_eq!(refusing.connect().await.err().unwrap().kind, ErrorKind::Io);
    }

    #[tokio::test]
    async fn remote_reads_requests_across_chunks() {
        let (connector, mut remote) = MemoryConnector::pair();
        let mut socket = connector.connect().await.unwrap();

        for chunk in ["000", "Chost:ver", "sion0004", "ab", "cdrest"] {
            socket.sink.send(Bytes::from_static(chunk.as_bytes())).await.unwrap();
        }

        assert_eq!(remote.recv_request().await.unwrap(), "host:version");
        assert_eq!(remote.recv_request().await.unwrap(), "abcd");
        assert_eq!(remote.recv().await.unwrap(), "rest");

        drop(socket);
        assert_eq!(remote.recv().await, None);
    }

    #[tokio::test]
    async fn close_ends_client_stream() {
        let (connector, mut remote) = MemoryConnector::pair();
        let mut socket = connector.connect().await.unwrap();

        assert!(remote.okay());
        assert!(remote.fail("nope"));
        remote.close();
        assert!(!remote.send("late"));

        assert_eq!(socket.stream.next().await.unwrap().unwrap(), "OKAY");
        assert_eq!(socket.stream.next().await.unwrap().unwrap(), "FAIL0004nope");
        assert!(socket.stream.next().await.is_none());
    }
}
