use crate::channel::ChannelState;
use crate::error::ErrorKind;
use crate::Result;
use bytes::Bytes;
use derive_more::Debug;
use std::sync::{Arc, OnceLock};

/// What a stream uses to talk back to the remote once it is bound.
pub trait StreamChannel: Send + Sync {
    fn state(&self) -> ChannelState;

    fn write(&self, data: Bytes) -> Result<()>;

    fn close(&self) -> Result<()>;
}

/// Consumer side of a stream, called by the bound channel.
///
/// Both callbacks run on the channel's socket task, one at a time. They may
/// write to or close the stream, but must not block: the socket is not read
/// while a callback runs.
pub trait StreamHandler: Send + Sync + 'static {
    /// A payload from the remote, in arrival order. Chunk boundaries carry no
    /// meaning.
    fn on_data(&self, data: Bytes);

    /// The remote closed the stream, called after every payload it sent. Never
    /// called for a local close or a failed open, and at most once.
    fn on_close(&self);
}

pub struct FnHandler<D, C> {
    on_data: D,
    on_close: C,
}

impl<D, C> StreamHandler for FnHandler<D, C>
where
    D: Fn(Bytes) + Send + Sync + 'static,
    C: Fn() + Send + Sync + 'static,
{
    fn on_data(&self, data: Bytes) {
        (self.on_data)(data)
    }

    fn on_close(&self) {
        (self.on_close)()
    }
}

/// One logical conversation with an ADB destination such as
/// `host:version` or `shell:ls`.
///
/// A stream is opened at most once, through
/// [`StreamFactory::open`](crate::StreamFactory::open), and can't be reused
/// after it terminates.
#[derive(Debug)]
pub struct AdbStream {
    destination: String,
    #[debug(skip)]
    handler: Arc<dyn StreamHandler>,
    #[debug("{:?}", channel.get().map(|c| c.state()))]
    channel: OnceLock<Arc<dyn StreamChannel>>,
}

impl AdbStream {
    pub fn new(destination: impl Into<String>, handler: impl StreamHandler) -> Self {
        Self { destination: destination.into(), handler: Arc::new(handler), channel: OnceLock::new() }
    }

    pub fn from_fn(
        destination: impl Into<String>,
        on_data: impl Fn(Bytes) + Send + Sync + 'static,
        on_close: impl Fn() + Send + Sync + 'static,
    ) -> Self {
        Self::new(destination, FnHandler { on_data, on_close })
    }

    pub fn destination(&self) -> &str {
        &self.destination
    }

    pub fn is_bound(&self) -> bool {
        self.channel.get().is_some()
    }

    /// State of the bound channel, `None` before the stream is opened.
    pub fn state(&self) -> Option<ChannelState> {
        self.channel.get().map(|channel| channel.state())
    }

    pub(crate) fn handler(&self) -> Arc<dyn StreamHandler> {
        self.handler.clone()
    }

    pub(crate) fn bind(&self, channel: Arc<dyn StreamChannel>) -> Result<()> {
        self.channel.set(channel).map_err(|_| ErrorKind::StreamReuse.into())
    }

    /// Sends raw bytes; text goes out as its UTF-8 encoding. Nothing is framed.
    pub fn write(&self, data: impl AsRef<[u8]>) -> Result<()> {
        let channel = self.channel.get().ok_or(ErrorKind::StreamNotOpen)?;
        channel.write(Bytes::copy_from_slice(data.as_ref()))
    }

    /// Closes the bound channel, if any.
    pub fn close(&self) -> Result<()> {
        match self.channel.get() {
            Some(channel) => channel.close(),
            None => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Default)]
    struct RecordingChannel {
        written: Mutex<Vec<Bytes>>,
        closes: AtomicUsize,
    }

    impl StreamChannel for RecordingChannel {
        fn state(&self) -> ChannelState {
            ChannelState::Flowing
        }

        fn write(&self, data: Bytes) -> Result<()> {
            self.written.lock().push(data);
            Ok(())
        }

        fn close(&self) -> Result<()> {
            self.closes.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    fn stream() -> AdbStream {
        AdbStream::from_fn("shell:ls", |_| {}, || {})
    }

    #[test]
    fn write_requires_channel() {
        let stream = stream();
        let err = stream.write("ls\n").unwrap_err();
        assert_eq!(err.kind, ErrorKind::StreamNotOpen);
        assert_eq!(err.to_string(), "stream is not open");
    }

    #[test]
    fn close_without_channel_is_noop() {
        let stream = stream();
        assert!(stream.close().is_ok());
        assert_eq!(stream.state(), None);
    }

    #[test]
    fn text_and_bytes_reach_channel_unframed() {
        let stream = stream();
        let channel = Arc::new(RecordingChannel::default());
        stream.bind(channel.clone()).unwrap();

        stream.write("ls -l\n").unwrap();
        stream.write([0u8, 1, 2]).unwrap();
        stream.write(Bytes::from_static(b"\xff")).unwrap();
        stream.close().unwrap();

        assert_eq!(
            *channel.written.lock(),
            [
                Bytes::from_static(b"ls -l\n"),
                Bytes::from_static(&[0, 1, 2]),
                Bytes::from_static(b"\xff"),
            ]
        );
        assert_eq!(channel.closes.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn second_bind_is_rejected() {
        let stream = stream();
        stream.bind(Arc::new(RecordingChannel::default())).unwrap();

        let err = stream.bind(Arc::new(RecordingChannel::default())).unwrap_err();
        assert_eq!(err.kind, ErrorKind::StreamReuse);
        assert!(stream.is_bound());
        assert_eq!(stream.state(), Some(ChannelState::Flowing));
    }

    #[test]
    fn callbacks_are_forwarded() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let closed = Arc::new(AtomicUsize::new(0));
        let stream = AdbStream::from_fn(
            "host:version",
            {
                let seen = seen.clone();
                move |data| seen.lock().push(data)
            },
            {
                let closed = closed.clone();
                move || {
                    closed.fetch_add(1, Ordering::SeqCst);
                }
            },
        );

        let handler = stream.handler();
        handler.on_data(Bytes::from_static(b"0004"));
        handler.on_close();

        assert_eq!(*seen.lock(), [Bytes::from_static(b"0004")]);
        assert_eq!(closed.load(Ordering::SeqCst), 1);
        assert_eq!(stream.destination(), "host:version");
    }
}
