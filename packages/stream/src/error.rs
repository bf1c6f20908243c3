use derive_more::Display;
use std::io;

#[derive(Debug, Display, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum ErrorKind {
    #[display("cannot reuse stream object")]
    StreamReuse,
    #[display("stream is not open")]
    StreamNotOpen,
    #[display("transport connect failed")]
    Connect,
    /// `FAIL` response, carries the server message as is.
    #[display("{_0}")]
    Fail(String),
    #[display("{_0}")]
    Protocol(String),
    #[display("handshake timed out")]
    HandshakeTimeout,
    #[display("stream is closed")]
    Closed,
    #[display("transport i/o error")]
    Io,
}

impl ErrorKind {
    pub(crate) fn protocol(msg: impl AsRef<str>) -> Self {
        ErrorKind::Protocol(msg.as_ref().into())
    }
}

#[derive(Debug, Display)]
#[display("{kind}")]
pub struct Error {
    pub kind: ErrorKind,
    source: Option<Box<dyn std::error::Error + Send + Sync + 'static>>,
}

impl Error {
    pub(crate) fn new(
        kind: impl Into<ErrorKind>,
        source: impl Into<Box<dyn std::error::Error + Send + Sync + 'static>>,
    ) -> Self {
        Self { kind: kind.into(), source: Some(source.into()) }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.source.as_ref().map(|s| s.as_ref() as &(dyn std::error::Error + 'static))
    }
}

impl From<ErrorKind> for Error {
    fn from(value: ErrorKind) -> Self {
        Self { kind: value, source: None }
    }
}

impl From<io::Error> for Error {
    fn from(value: io::Error) -> Self {
        Self::new(ErrorKind::Io, value)
    }
}

impl<K: Into<ErrorKind>, E: Into<Box<dyn std::error::Error + Send + Sync + 'static>>> From<(K, E)>
    for Error
{
    fn from(value: (K, E)) -> Self {
        Self::new(value.0, value.1)
    }
}

pub type Result<T> = std::result::Result<T, Error>;
