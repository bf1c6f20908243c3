use crate::buffer::{read_buffer, BufferReader, ReadBuffer};
use crate::connector::{SocketConnector, SocketSink, SocketStream};
use crate::error::ErrorKind;
use crate::protocol::{encode_request, parse_length, Status, LENGTH_PREFIX, STATUS_LENGTH};
use crate::stream::{StreamChannel, StreamHandler};
use crate::util::PayloadFmt;
use crate::{Error, Result};
use bstr::ByteSlice;
use bytes::Bytes;
use derive_more::Display;
use flume::{unbounded, Receiver, Sender};
use futures::{SinkExt, StreamExt};
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::select;
use tokio::sync::Notify;
use tokio::time::timeout;
use tracing::{debug, info, info_span, trace, warn, Instrument, Span};

#[derive(Debug, Display, Clone, Copy, PartialEq, Eq)]
pub enum ChannelState {
    Connecting,
    Handshaking,
    Flowing,
    Closed,
}

enum Outgoing {
    Data(Bytes),
    Close,
}

struct ChannelBackend {
    handler: Arc<dyn StreamHandler>,
    buffer: ReadBuffer,

    connected: AtomicBool,
    flowing: AtomicBool,
    flow: Notify,
    shutdown: Notify,

    span: Span,
}

impl ChannelBackend {
    fn state(&self) -> ChannelState {
        if self.buffer.is_closed() {
            ChannelState::Closed
        } else if self.flowing.load(Ordering::Acquire) {
            ChannelState::Flowing
        } else if self.connected.load(Ordering::Acquire) {
            ChannelState::Handshaking
        } else {
            ChannelState::Connecting
        }
    }

    fn deliver(&self, chunk: Bytes) {
        if self.buffer.is_closed() {
            debug!(len = chunk.len(), "dropping chunk after close");
        } else {
            self.handler.on_data(chunk);
        }
    }

    /// Hands everything queued during the handshake to the handler, once.
    fn flush_backlog(&self, flushed: &mut bool) {
        if std::mem::replace(flushed, true) {
            return;
        }

        let pending = self.buffer.drain();
        debug!(pending = pending.len(), "flowing");
        for chunk in pending {
            self.deliver(chunk);
        }
    }

    fn handle_chunk(&self, chunk: Bytes, flushed: &mut bool) {
        trace!(len = chunk.len(), data = ?PayloadFmt(&chunk), "received");

        if self.flowing.load(Ordering::Acquire) {
            self.flush_backlog(flushed);
            self.deliver(chunk);
        } else {
            self.buffer.push(chunk);
        }
    }

    /// Lets the pump deliver. Fails if the channel was closed locally, a remote
    /// close only ends the stream after the backlog.
    fn start_flowing(&self) -> Result<()> {
        if self.buffer.is_closed() {
            Err((ErrorKind::Closed, "socket closed before the stream opened"))?;
        }

        self.flowing.store(true, Ordering::Release);
        self.flow.notify_one();
        Ok(())
    }

    /// Reads the socket and is the only caller of the handler, so chunks reach
    /// it in arrival order without holding a lock across user code.
    async fn pump(self: Arc<Self>, mut stream: SocketStream) {
        let mut flushed = false;

        loop {
            select! {
                chunk = stream.next() => match chunk {
                    Some(Ok(chunk)) => self.handle_chunk(chunk, &mut flushed),
                    Some(Err(err)) => {
                        warn!(?err, "socket error");
                        break;
                    }
                    None => break,
                },
                _ = self.flow.notified(), if !flushed => self.flush_backlog(&mut flushed),
                _ = self.shutdown.notified() => {
                    debug!("socket finished");
                    return;
                }
            }
        }

        if !self.flowing.load(Ordering::Acquire) {
            // The handshake may still need what is queued
            self.buffer.finish();
            debug!("remote finished during handshake");
            select! {
                _ = self.flow.notified() => {}
                _ = self.shutdown.notified() => {
                    debug!("socket finished");
                    return;
                }
            }
        }

        self.flush_backlog(&mut flushed);
        if self.buffer.close() {
            info!("closed by remote");
            self.handler.on_close();
        }
    }
}

async fn writer_task(mut sink: SocketSink, outgoing: Receiver<Outgoing>) {
    while let Ok(cmd) = outgoing.recv_async().await {
        match cmd {
            Outgoing::Data(data) => {
                trace!(len = data.len(), data = ?PayloadFmt(&data), "send");
                if let Err(err) = sink.send(data).await {
                    warn!(?err, "failed to write to socket");
                    break;
                }
            }
            Outgoing::Close => break,
        }
    }

    if let Err(err) = sink.close().await {
        debug!(?err, "failed to close socket");
    }
}

/// Binding of one stream to one socket.
pub struct Channel {
    backend: Arc<ChannelBackend>,
    outgoing: Sender<Outgoing>,
}

impl Channel {
    pub(crate) fn new(
        handler: Arc<dyn StreamHandler>, destination: &str, transport: Option<String>,
    ) -> (Arc<Self>, PendingChannel) {
        static CHANNEL_ID: AtomicU32 = AtomicU32::new(0);
        let id = CHANNEL_ID.fetch_add(1, Ordering::SeqCst);

        let (buffer, reader) = read_buffer();
        let (outgoing, outgoing_rx) = unbounded();

        let channel = Arc::new(Channel {
            backend: Arc::new(ChannelBackend {
                handler,
                buffer,
                connected: AtomicBool::new(false),
                flowing: AtomicBool::new(false),
                flow: Notify::new(),
                shutdown: Notify::new(),
                span: info_span!("channel", id, destination, transport = transport.as_deref()),
            }),
            outgoing,
        });

        let pending = PendingChannel {
            channel: channel.clone(),
            outgoing_rx,
            reader,
            transport,
            destination: destination.into(),
        };

        (channel, pending)
    }

    fn send(&self, data: Bytes) -> Result<()> {
        self.outgoing.send(Outgoing::Data(data)).map_err(|_| ErrorKind::Closed.into())
    }
}

impl Drop for Channel {
    fn drop(&mut self) {
        if !self.backend.buffer.is_closed() {
            debug!(parent: &self.backend.span, "dropping open channel");
            let _ = self.close();
        }
    }
}

impl StreamChannel for Channel {
    fn state(&self) -> ChannelState {
        self.backend.state()
    }

    fn write(&self, data: Bytes) -> Result<()> {
        match self.state() {
            ChannelState::Flowing => self.send(data),
            ChannelState::Closed => Err(ErrorKind::Closed.into()),
            _ => Err(ErrorKind::StreamNotOpen.into()),
        }
    }

    fn close(&self) -> Result<()> {
        let backend = &self.backend;
        if backend.buffer.close() {
            info!(parent: &backend.span, "close");
            backend.shutdown.notify_one();
            let _ = self.outgoing.send(Outgoing::Close);
        }
        Ok(())
    }
}

/// A bound channel that still has to connect and run the handshake.
pub(crate) struct PendingChannel {
    channel: Arc<Channel>,
    outgoing_rx: Receiver<Outgoing>,
    reader: BufferReader,
    transport: Option<String>,
    destination: String,
}

impl PendingChannel {
    pub async fn open(
        self, connector: &dyn SocketConnector, handshake_timeout: Option<Duration>,
    ) -> Result<()> {
        let span = self.channel.backend.span.clone();
        self.open_inner(connector, handshake_timeout).instrument(span).await
    }

    async fn open_inner(
        mut self, connector: &dyn SocketConnector, handshake_timeout: Option<Duration>,
    ) -> Result<()> {
        let channel = self.channel.clone();
        let backend = channel.backend.clone();

        let socket = match connector.connect().await {
            Ok(socket) => socket,
            Err(err) => {
                let _ = channel.close();
                return Err(Error::new(ErrorKind::Connect, err));
            }
        };
        backend.connected.store(true, Ordering::Release);
        debug!("connected");

        let span = backend.span.clone();
        tokio::spawn(writer_task(socket.sink, self.outgoing_rx.clone()).instrument(span.clone()));
        tokio::spawn(backend.clone().pump(socket.stream).instrument(span));

        let result = match handshake_timeout {
            Some(limit) => timeout(limit, self.handshake())
                .await
                .unwrap_or_else(|_| Err(ErrorKind::HandshakeTimeout.into())),
            None => self.handshake().await,
        }
        .and_then(|_| backend.start_flowing());

        if let Err(err) = &result {
            warn!(?err, "open failed");
            let _ = channel.close();
        } else {
            info!("opened");
        }
        result
    }

    async fn handshake(&mut self) -> Result<()> {
        if let Some(transport) = self.transport.clone() {
            self.request(&transport).await?;
        }
        let destination = self.destination.clone();
        self.request(&destination).await
    }

    async fn request(&mut self, cmd: &str) -> Result<()> {
        debug!(cmd, "request");
        self.channel.send(encode_request(cmd)?)?;
        self.read_response().await
    }

    async fn read_response(&mut self) -> Result<()> {
        let status = self.reader.read_exact(STATUS_LENGTH).await;
        match Status::parse(&status)? {
            Status::Okay => Ok(()),
            Status::Fail => {
                let len = parse_length(&self.reader.read_exact(LENGTH_PREFIX).await)?;
                let message = self.reader.read_exact(len).await;
                if message.len() < len {
                    Err(ErrorKind::protocol("unexpected end of stream"))?;
                }

                let message = message.to_str_lossy().into_owned();
                debug!(%message, "request failed");
                Err(ErrorKind::Fail(message).into())
            }
        }
    }
}
