//! Transport abstraction for the room hub.
//!
//! A [`Transport`] is one open, bidirectional text channel. A [`Connector`]
//! dials a new one for a given endpoint; the session calls it once per start
//! and once per reconnect attempt, so the physical channel can be replaced
//! without the rest of the client noticing.
//!
//! # Plugging in another channel
//!
//! Anything that moves text frames both ways can back a session. This one
//! bridges a pair of channels, as an in-process hub would:
//!
//! ```rust
//! use async_trait::async_trait;
//! use tokio::sync::mpsc;
//! use truth_or_dare_client::error::TruthOrDareError;
//! use truth_or_dare_client::transport::Transport;
//!
//! struct ChannelLink {
//!     to_hub: mpsc::UnboundedSender<String>,
//!     from_hub: mpsc::UnboundedReceiver<String>,
//! }
//!
//! #[async_trait]
//! impl Transport for ChannelLink {
//!     async fn send(&mut self, message: String) -> Result<(), TruthOrDareError> {
//!         self.to_hub
//!             .send(message)
//!             .map_err(|_| TruthOrDareError::TransportClosed)
//!     }
//!
//!     async fn recv(&mut self) -> Option<Result<String, TruthOrDareError>> {
//!         self.from_hub.recv().await.map(Ok)
//!     }
//!
//!     async fn close(&mut self) -> Result<(), TruthOrDareError> {
//!         self.from_hub.close();
//!         Ok(())
//!     }
//! }
//! ```
//!
//! A [`Connector`] wrapping it returns `Box::new(ChannelLink { .. })` from
//! [`connect`](Connector::connect).

use async_trait::async_trait;

use crate::error::TruthOrDareError;

/// One open text channel to the hub.
///
/// A frame in either direction may carry several hub records; the session
/// splits them. [`recv`](Transport::recv) is polled inside `tokio::select!`
/// next to timers and outgoing commands, so dropping a pending `recv` future
/// must not lose a frame.
#[async_trait]
pub trait Transport: Send + 'static {
    /// Send one text frame.
    ///
    /// # Errors
    ///
    /// Returns [`TruthOrDareError::TransportSend`] if the frame could not be
    /// written, or [`TruthOrDareError::TransportClosed`] after [`close`](Transport::close).
    async fn send(&mut self, message: String) -> Result<(), TruthOrDareError>;

    /// Receive the next text frame.
    ///
    /// Returns `Some(Ok(text))` for a frame, `Some(Err(e))` on a transport
    /// error and `None` once the peer closed the channel.
    async fn recv(&mut self) -> Option<Result<String, TruthOrDareError>>;

    /// Close the channel. Resources are released even when the closing
    /// handshake fails; the session ignores the result.
    ///
    /// # Errors
    ///
    /// Whatever the underlying close reports.
    async fn close(&mut self) -> Result<(), TruthOrDareError>;
}

/// Dials new transports.
#[async_trait]
pub trait Connector: Send + Sync + 'static {
    /// Open a transport to `endpoint` (the hub URL).
    ///
    /// # Errors
    ///
    /// Returns an error when the endpoint is unreachable or the URL is invalid.
    async fn connect(&self, endpoint: &str) -> Result<Box<dyn Transport>, TruthOrDareError>;
}
