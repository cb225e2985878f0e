//! Transport abstraction for the realtime service.
//!
//! The [`Transport`] trait defines a bidirectional text message channel between
//! the client and the realtime service. Frames are JSON text, so every
//! transport implementation handles message framing internally (WebSocket
//! frames, length-prefixed TCP, in-process channels in tests).
//!
//! # Connection Setup
//!
//! Connection setup is NOT part of this trait. Construct a connected
//! transport externally (URL, API key headers, TLS), then pass it to
//! `RealtimeClient::start`.
//!
//! # Implementing a Custom Transport
//!
//! ```rust,no_run
//! use async_trait::async_trait;
//! use galinheiro_client::error::GalinheiroError;
//! use galinheiro_client::transport::Transport;
//!
//! struct MyTransport { /* ... */ }
//!
//! #[async_trait]
//! impl Transport for MyTransport {
//!     async fn send(&mut self, message: String) -> Result<(), GalinheiroError> {
//!         // Send the JSON frame over your transport
//!         # Ok(())
//!     }
//!
//!     async fn recv(&mut self) -> Option<Result<String, GalinheiroError>> {
//!         // Receive the next JSON frame; `None` when closed cleanly
//!         # None
//!     }
//!
//!     async fn close(&mut self) -> Result<(), GalinheiroError> {
//!         # Ok(())
//!     }
//! }
//! ```

use async_trait::async_trait;

use crate::error::GalinheiroError;

/// A bidirectional text message transport for realtime frames.
///
/// Each call to [`send`](Transport::send) transmits one complete JSON frame.
/// Each call to [`recv`](Transport::recv) returns one complete JSON frame.
///
/// # Cancel Safety
///
/// The [`recv`](Transport::recv) method **MUST** be cancel-safe because it is used
/// inside `tokio::select!`. If `recv` is cancelled before completion, calling it
/// again must not lose data. Channel-based implementations (e.g., wrapping
/// `mpsc::Receiver`) are naturally cancel-safe.
#[async_trait]
pub trait Transport: Send + 'static {
    /// Send a JSON text frame.
    ///
    /// # Errors
    ///
    /// Returns [`GalinheiroError::TransportSend`] if the frame could not be sent.
    async fn send(&mut self, message: String) -> Result<(), GalinheiroError>;

    /// Receive the next JSON text frame.
    ///
    /// Returns:
    /// - `Some(Ok(text))`: a complete frame was received
    /// - `Some(Err(e))`: a transport error occurred
    /// - `None`: the connection was closed cleanly
    async fn recv(&mut self) -> Option<Result<String, GalinheiroError>>;

    /// Close the transport connection gracefully.
    ///
    /// # Errors
    ///
    /// Returns an error if the graceful shutdown fails. Implementations should
    /// still release resources even if the close handshake fails.
    async fn close(&mut self) -> Result<(), GalinheiroError>;
}
