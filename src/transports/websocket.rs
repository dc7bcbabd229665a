//! WebSocket transport using `tokio-tungstenite`.
//!
//! [`WebSocketConnector`] accepts the hub's HTTP(S) URL as configured and
//! dials the matching `ws://` / `wss://` endpoint. TLS is handled through
//! [`MaybeTlsStream`](tokio_tungstenite::MaybeTlsStream).
//!
//! ```rust,no_run
//! # async fn example() -> Result<(), truth_or_dare_client::TruthOrDareError> {
//! use truth_or_dare_client::{Connector, WebSocketConnector};
//!
//! let mut transport = WebSocketConnector::new()
//!     .connect("https://game.example.com/roomHub")
//!     .await?;
//! transport.send("{\"protocol\":\"json\",\"version\":1}\u{1e}".to_string()).await?;
//! # Ok(())
//! # }
//! ```

use std::time::Duration;

use async_trait::async_trait;
use futures_util::{SinkExt, StreamExt};
use tokio_tungstenite::tungstenite::protocol::Message;
use tracing::{debug, info, warn};

use crate::error::TruthOrDareError;
use crate::transport::{Connector, Transport};

/// The underlying WebSocket stream.
pub type WsStream =
    tokio_tungstenite::WebSocketStream<tokio_tungstenite::MaybeTlsStream<tokio::net::TcpStream>>;

/// Rewrite an `http(s)://` URL to the matching `ws(s)://` URL.
///
/// ```
/// use truth_or_dare_client::transports::websocket::to_websocket_url;
///
/// assert_eq!(to_websocket_url("https://h/roomHub"), "wss://h/roomHub");
/// assert_eq!(to_websocket_url("ws://h/roomHub"), "ws://h/roomHub");
/// ```
pub fn to_websocket_url(endpoint: &str) -> String {
    if let Some(rest) = endpoint.strip_prefix("https://") {
        format!("wss://{rest}")
    } else if let Some(rest) = endpoint.strip_prefix("http://") {
        format!("ws://{rest}")
    } else {
        endpoint.to_string()
    }
}

/// A [`Transport`] backed by one WebSocket connection.
///
/// [`recv`](Transport::recv) is cancel-safe: a dropped `recv` future does not
/// consume a frame.
#[derive(Debug)]
pub struct WebSocketTransport {
    stream: WsStream,
    closed: bool,
}

impl WebSocketTransport {
    /// Open a WebSocket connection to `url` (`ws://`, `wss://`, `http://` or `https://`).
    ///
    /// # Errors
    ///
    /// Returns [`TruthOrDareError::Io`] when the socket cannot be opened and
    /// [`TruthOrDareError::Connection`] when the URL or the upgrade is rejected.
    pub async fn connect(url: &str) -> Result<Self, TruthOrDareError> {
        let url = to_websocket_url(url);
        debug!(url = %url, "dialing hub");

        let (stream, _response) = tokio_tungstenite::connect_async(url.as_str())
            .await
            .map_err(|e| match e {
                tokio_tungstenite::tungstenite::Error::Io(io) => TruthOrDareError::Io(io),
                other => TruthOrDareError::Connection(other.to_string()),
            })?;

        info!(url = %url, "websocket open");
        Ok(Self::from_stream(stream))
    }

    /// Wrap an already-established stream (custom TLS, proxies, headers).
    pub fn from_stream(stream: WsStream) -> Self {
        Self {
            stream,
            closed: false,
        }
    }

    /// Like [`connect`](Self::connect), bounded by `timeout`.
    ///
    /// # Errors
    ///
    /// Returns [`TruthOrDareError::Timeout`] if the deadline elapses, or any
    /// error [`connect`](Self::connect) may return.
    pub async fn connect_with_timeout(
        url: &str,
        timeout: Duration,
    ) -> Result<Self, TruthOrDareError> {
        tokio::time::timeout(timeout, Self::connect(url))
            .await
            .map_err(|_| TruthOrDareError::Timeout)?
    }
}

#[async_trait]
impl Transport for WebSocketTransport {
    async fn send(&mut self, message: String) -> Result<(), TruthOrDareError> {
        if self.closed {
            return Err(TruthOrDareError::TransportClosed);
        }
        self.stream
            .send(Message::Text(message.into()))
            .await
            .map_err(|e| TruthOrDareError::TransportSend(e.to_string()))
    }

    async fn recv(&mut self) -> Option<Result<String, TruthOrDareError>> {
        loop {
            let msg = match self.stream.next().await? {
                Ok(msg) => msg,
                Err(e) => return Some(Err(TruthOrDareError::TransportReceive(e.to_string()))),
            };

            match msg {
                Message::Text(text) => return Some(Ok(text.to_string())),
                Message::Close(frame) => {
                    debug!(?frame, "hub sent websocket close");
                    return None;
                }
                // tungstenite queues the pong itself.
                Message::Ping(_) | Message::Pong(_) | Message::Frame(_) => {}
                Message::Binary(bytes) => {
                    warn!(len = bytes.len(), "skipping binary frame");
                }
            }
        }
    }

    async fn close(&mut self) -> Result<(), TruthOrDareError> {
        if self.closed {
            return Ok(());
        }
        self.closed = true;
        self.stream
            .close(None)
            .await
            .map_err(|e| TruthOrDareError::TransportSend(e.to_string()))
    }
}

/// Dials a fresh [`WebSocketTransport`] per connect attempt.
#[derive(Debug, Clone, Default)]
pub struct WebSocketConnector {
    connect_timeout: Option<Duration>,
}

impl WebSocketConnector {
    /// A connector without a dial timeout.
    pub fn new() -> Self {
        Self::default()
    }

    /// Bound each dial by `timeout`.
    #[must_use]
    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = Some(timeout);
        self
    }
}

#[async_trait]
impl Connector for WebSocketConnector {
    async fn connect(&self, endpoint: &str) -> Result<Box<dyn Transport>, TruthOrDareError> {
        let transport = match self.connect_timeout {
            Some(timeout) => WebSocketTransport::connect_with_timeout(endpoint, timeout).await?,
            None => WebSocketTransport::connect(endpoint).await?,
        };
        Ok(Box::new(transport))
    }
}

#[cfg(test)]
#[allow(
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::panic,
    clippy::todo,
    clippy::unimplemented,
    clippy::indexing_slicing
)]
mod tests {
    use super::*;
    use tokio::net::TcpListener;

    type ServerStream = tokio_tungstenite::WebSocketStream<tokio::net::TcpStream>;

    /// Accept one WebSocket connection on an ephemeral port and hand it to `handler`.
    async fn serve_once<F, Fut>(handler: F) -> String
    where
        F: FnOnce(ServerStream) -> Fut + Send + 'static,
        Fut: std::future::Future<Output = ()> + Send,
    {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            let (tcp, _) = listener.accept().await.unwrap();
            let ws = tokio_tungstenite::accept_async(tcp).await.unwrap();
            handler(ws).await;
        });
        format!("http://{addr}/roomHub")
    }

    #[test]
    fn url_rewriting() {
        assert_eq!(
            to_websocket_url("http://h:5000/roomHub"),
            "ws://h:5000/roomHub"
        );
        assert_eq!(to_websocket_url("https://h/roomHub"), "wss://h/roomHub");
        assert_eq!(to_websocket_url("wss://h/roomHub"), "wss://h/roomHub");
    }

    #[tokio::test]
    async fn unreachable_host_is_a_connection_error() {
        let err = WebSocketTransport::connect("ws://127.0.0.1:1")
            .await
            .unwrap_err();
        assert!(err.is_connection());
    }

    #[tokio::test]
    async fn connector_dials_http_endpoint_and_exchanges_handshake() {
        let url = serve_once(|mut ws| async move {
            if let Some(Ok(Message::Text(text))) = ws.next().await {
                assert!(text.as_str().contains("\"protocol\":\"json\""));
                ws.send(Message::Text("{}\u{1e}".into())).await.unwrap();
            }
            ws.close(None).await.unwrap();
        })
        .await;

        let mut transport = WebSocketConnector::new()
            .with_connect_timeout(Duration::from_secs(5))
            .connect(&url)
            .await
            .unwrap();
        transport
            .send(crate::protocol::handshake_request())
            .await
            .unwrap();
        assert_eq!(transport.recv().await.unwrap().unwrap(), "{}\u{1e}");
        assert!(transport.recv().await.is_none());
    }

    #[tokio::test]
    async fn binary_and_ping_frames_are_skipped() {
        let url = serve_once(|mut ws| async move {
            let noise = Message::Binary(vec![1, 2, 3].into());
            ws.send(noise).await.unwrap();
            ws.send(Message::Ping(vec![9].into())).await.unwrap();
            ws.send(Message::Text("{\"type\":6}\u{1e}".into()))
                .await
                .unwrap();
            ws.close(None).await.unwrap();
        })
        .await;

        let mut transport = WebSocketTransport::connect(&url).await.unwrap();
        let frame = transport.recv().await.unwrap().unwrap();
        assert_eq!(frame, "{\"type\":6}\u{1e}");
    }

    #[tokio::test]
    async fn send_after_close_is_rejected_and_close_is_idempotent() {
        let url = serve_once(|mut ws| async move { while let Some(Ok(_)) = ws.next().await {} })
            .await;

        let mut transport = WebSocketTransport::connect(&url).await.unwrap();
        transport.close().await.unwrap();
        transport.close().await.unwrap();
        let err = transport.send("late".into()).await.unwrap_err();
        assert!(matches!(err, TruthOrDareError::TransportClosed));
    }

    #[tokio::test]
    async fn dial_timeout() {
        let err = WebSocketTransport::connect_with_timeout(
            "ws://192.0.2.1:1",
            Duration::from_millis(50),
        )
        .await
        .unwrap_err();
        // Sandboxed hosts may refuse the route outright instead of dropping it.
        assert!(matches!(err, TruthOrDareError::Timeout) || err.is_connection());
    }
}
