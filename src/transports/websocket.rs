//! WebSocket transport for the realtime service, built on `tokio-tungstenite`.
//!
//! Hosted realtime endpoints authenticate the socket with an API key passed
//! in the query string; [`WebSocketTransport::connect_with_api_key`] builds
//! that URL. Both `ws://` and `wss://` are supported through
//! [`MaybeTlsStream`](tokio_tungstenite::MaybeTlsStream).
//!
//! # Example
//!
//! ```rust,no_run
//! # async fn example() -> Result<(), galinheiro_client::GalinheiroError> {
//! use galinheiro_client::{Transport, WebSocketTransport};
//!
//! let mut transport = WebSocketTransport::connect_with_api_key(
//!     "wss://project.example.co/realtime/v1/websocket",
//!     "public-anon-key",
//! )
//! .await?;
//! transport.send(r#"{"type":"Heartbeat"}"#.to_string()).await?;
//! transport.close().await?;
//! # Ok(())
//! # }
//! ```

use std::time::Duration;

use async_trait::async_trait;
use futures_util::{SinkExt, StreamExt};
use tokio_tungstenite::tungstenite::protocol::Message;
use tracing::{debug, info, warn};

use crate::error::GalinheiroError;
use crate::transport::Transport;

/// Protocol version advertised to the realtime service.
const REALTIME_VSN: &str = "1.0.0";

/// Type alias for the underlying WebSocket stream.
pub type WsStream =
    tokio_tungstenite::WebSocketStream<tokio_tungstenite::MaybeTlsStream<tokio::net::TcpStream>>;

/// A [`Transport`] backed by a WebSocket connection to the realtime service.
///
/// Non-text frames are skipped: the realtime protocol is JSON text only.
///
/// # Cancel Safety
///
/// [`recv`](Transport::recv) only awaits the next stream item, so dropping it
/// mid-await loses nothing.
#[derive(Debug)]
pub struct WebSocketTransport {
    stream: WsStream,
    closed: bool,
}

impl WebSocketTransport {
    /// Connect to a fully-formed WebSocket URL.
    ///
    /// # Errors
    ///
    /// Returns [`GalinheiroError::Io`] if the URL is invalid or the connection
    /// cannot be established. I/O error kinds are preserved.
    pub async fn connect(url: &str) -> Result<Self, GalinheiroError> {
        debug!(url = %redact(url), "connecting to realtime service");

        let (stream, _response) = tokio_tungstenite::connect_async(url).await.map_err(|e| {
            let kind = match &e {
                tokio_tungstenite::tungstenite::Error::Io(io) => io.kind(),
                _ => std::io::ErrorKind::Other,
            };
            GalinheiroError::Io(std::io::Error::new(kind, e))
        })?;

        info!(url = %redact(url), "realtime connection established");
        Ok(Self::from_stream(stream))
    }

    /// Connect to a realtime endpoint, authenticating with `api_key`.
    ///
    /// # Errors
    ///
    /// Same as [`connect`](Self::connect).
    pub async fn connect_with_api_key(endpoint: &str, api_key: &str) -> Result<Self, GalinheiroError> {
        Self::connect(&realtime_url(endpoint, api_key)).await
    }

    /// Connect, failing with [`GalinheiroError::Timeout`] after `timeout`.
    ///
    /// # Errors
    ///
    /// Returns [`GalinheiroError::Timeout`] if the deadline elapses, or any
    /// error [`connect`](Self::connect) may return.
    pub async fn connect_with_timeout(
        url: &str,
        timeout: Duration,
    ) -> Result<Self, GalinheiroError> {
        tokio::time::timeout(timeout, Self::connect(url))
            .await
            .map_err(|_| GalinheiroError::Timeout)?
    }

    /// Wrap an already-established stream (custom TLS, proxies, headers).
    pub fn from_stream(stream: WsStream) -> Self {
        Self {
            stream,
            closed: false,
        }
    }
}

#[async_trait]
impl Transport for WebSocketTransport {
    async fn send(&mut self, message: String) -> Result<(), GalinheiroError> {
        if self.closed {
            return Err(GalinheiroError::TransportClosed);
        }
        self.stream
            .send(Message::Text(message.into()))
            .await
            .map_err(|e| GalinheiroError::TransportSend(e.to_string()))
    }

    async fn recv(&mut self) -> Option<Result<String, GalinheiroError>> {
        loop {
            let msg = match self.stream.next().await? {
                Ok(msg) => msg,
                Err(e) => return Some(Err(GalinheiroError::TransportReceive(e.to_string()))),
            };

            match msg {
                Message::Text(text) => return Some(Ok(text.to_string())),
                Message::Close(frame) => {
                    debug!(?frame, "realtime service closed the socket");
                    return None;
                }
                // tungstenite queues the pong itself.
                Message::Ping(_) | Message::Pong(_) | Message::Frame(_) => {}
                Message::Binary(bytes) => {
                    warn!(len = bytes.len(), "skipping binary frame on realtime socket");
                }
            }
        }
    }

    async fn close(&mut self) -> Result<(), GalinheiroError> {
        if self.closed {
            return Ok(());
        }
        self.closed = true;
        self.stream
            .close(None)
            .await
            .map_err(|e| GalinheiroError::TransportSend(e.to_string()))
    }
}

/// Append the API key and protocol version to a realtime endpoint.
pub fn realtime_url(endpoint: &str, api_key: &str) -> String {
    let separator = if endpoint.contains('?') { '&' } else { '?' };
    format!("{endpoint}{separator}apikey={api_key}&vsn={REALTIME_VSN}")
}

/// Strip the query string so keys never reach the logs.
fn redact(url: &str) -> &str {
    url.split_once('?').map_or(url, |(base, _)| base)
}

#[cfg(test)]
#[allow(
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::panic,
    clippy::indexing_slicing
)]
mod tests {
    use super::*;
    use tokio::net::TcpListener;

    #[test]
    fn realtime_url_appends_key_and_version() {
        assert_eq!(
            realtime_url("ws://host/realtime/v1/websocket", "k"),
            "ws://host/realtime/v1/websocket?apikey=k&vsn=1.0.0"
        );
        assert_eq!(
            realtime_url("ws://host/ws?log_level=info", "k"),
            "ws://host/ws?log_level=info&apikey=k&vsn=1.0.0"
        );
    }

    #[test]
    fn redact_drops_query() {
        assert_eq!(redact("wss://h/ws?apikey=secret"), "wss://h/ws");
        assert_eq!(redact("wss://h/ws"), "wss://h/ws");
    }

    #[tokio::test]
    async fn connect_fails_with_invalid_url() {
        let err = WebSocketTransport::connect("not-a-valid-url").await.unwrap_err();
        assert!(matches!(err, GalinheiroError::Io(_)));
    }

    /// Accept one WebSocket connection and hand it to `handler`.
    async fn start_mock_service<F, Fut>(handler: F) -> String
    where
        F: FnOnce(tokio_tungstenite::WebSocketStream<tokio::net::TcpStream>) -> Fut
            + Send
            + 'static,
        Fut: std::future::Future<Output = ()> + Send,
    {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            let (tcp, _) = listener.accept().await.unwrap();
            let ws = tokio_tungstenite::accept_async(tcp).await.unwrap();
            handler(ws).await;
        });
        format!("ws://{addr}")
    }

    #[tokio::test]
    async fn recv_skips_binary_and_returns_text() {
        let url = start_mock_service(|mut ws| async move {
            ws.send(Message::Binary(vec![1, 2, 3].into())).await.unwrap();
            ws.send(Message::Text(r#"{"type":"HeartbeatAck"}"#.into()))
                .await
                .unwrap();
            ws.close(None).await.unwrap();
        })
        .await;

        let mut transport = WebSocketTransport::connect_with_api_key(&url, "anon").await.unwrap();
        let frame = transport.recv().await.unwrap().unwrap();
        assert_eq!(frame, r#"{"type":"HeartbeatAck"}"#);
        assert!(transport.recv().await.is_none());
    }

    #[tokio::test]
    async fn send_after_close_is_rejected_and_close_is_idempotent() {
        let url =
            start_mock_service(|mut ws| async move { while let Some(Ok(_)) = ws.next().await {} })
                .await;

        let mut transport = WebSocketTransport::connect(&url).await.unwrap();
        transport.close().await.unwrap();
        transport.close().await.unwrap();
        let err = transport.send("late".into()).await.unwrap_err();
        assert!(matches!(err, GalinheiroError::TransportClosed));
    }
}
