use crate::connector::{Socket, SocketConnector};
use crate::error::{Error, ErrorKind};
use crate::Result;
use bytes::Bytes;
use futures::future::{ready, BoxFuture};
use futures::{FutureExt, SinkExt, StreamExt};
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::http::HeaderValue;
use tokio_tungstenite::tungstenite::{self, Message};
use tracing::{debug, trace};

pub const WEBSOCKET_PROXY_PORT: u16 = 5038;

/// Connects through a WebSocket proxy that relays binary frames to the ADB
/// server, one frame per chunk.
#[derive(Debug, Clone)]
pub struct WebSocketConnector {
    url: String,
    subprotocol: Option<String>,
}

impl Default for WebSocketConnector {
    fn default() -> Self {
        Self::new(format!("ws://localhost:{WEBSOCKET_PROXY_PORT}"))
    }
}

impl WebSocketConnector {
    pub fn new(url: impl Into<String>) -> Self {
        Self { url: url.into(), subprotocol: Some("binary".into()) }
    }

    pub fn with_subprotocol(mut self, subprotocol: Option<String>) -> Self {
        self.subprotocol = subprotocol;
        self
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    async fn connect_socket(&self) -> Result<Socket> {
        let mut request = self
            .url
            .as_str()
            .into_client_request()
            .map_err(|e| (ErrorKind::Connect, e))?;

        if let Some(subprotocol) = &self.subprotocol {
            let value = HeaderValue::from_str(subprotocol).map_err(|e| (ErrorKind::Connect, e))?;
            request.headers_mut().insert("Sec-WebSocket-Protocol", value);
        }

        let (ws, _response) =
            tokio_tungstenite::connect_async(request).await.map_err(|e| (ErrorKind::Connect, e))?;
        debug!(url = %self.url, "websocket connected");

        let (sink, stream) = ws.split();

        let sink = sink
            .sink_map_err(|e| Error::new(ErrorKind::Io, e))
            .with(|data: Bytes| ready(Ok::<_, Error>(Message::Binary(data.to_vec()))));

        let stream = stream.filter_map(|msg| {
            ready(match msg {
                Ok(Message::Binary(data)) => Some(Ok(Bytes::from(data))),
                Ok(Message::Text(text)) => Some(Ok(Bytes::from(text.into_bytes()))),
                Ok(Message::Close(frame)) => {
                    debug!(?frame, "websocket close frame");
                    None
                }
                Ok(msg) => {
                    trace!(?msg, "ignored frame");
                    None
                }
                Err(tungstenite::Error::ConnectionClosed) => None,
                Err(e) => Some(Err(Error::new(ErrorKind::Io, e))),
            })
        });

        Ok(Socket { sink: Box::pin(sink), stream: Box::pin(stream) })
    }
}

impl SocketConnector for WebSocketConnector {
    fn connect(&self) -> BoxFuture<'_, Result<Socket>> {
        self.connect_socket().boxed()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_targets_local_proxy() {
        assert_eq!(WebSocketConnector::default().url(), "ws://localhost:5038");
    }

    #[tokio::test]
    async fn invalid_url_fails_to_connect() {
        let err = WebSocketConnector::new("not a url").connect().await.err().unwrap();
        assert_eq!(err.kind, ErrorKind::Connect);
    }

    #[tokio::test]
    async fn unreachable_proxy_fails_to_connect() {
        let err = WebSocketConnector::new("ws://127.0.0.1:1").connect().await.err().unwrap();
        assert_eq!(err.kind, ErrorKind::Connect);
    }
}
