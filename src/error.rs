//! Error types for the Truth or Dare client.

use thiserror::Error;

use crate::protocol::ErrorEnvelope;

/// Errors that can occur when using the Truth or Dare client.
#[derive(Debug, Error)]
pub enum TruthOrDareError {
    /// Attempted an operation that requires a live connection, but the session is not connected.
    #[error("not connected to server")]
    NotConnected,

    /// Failed to send a message through the transport.
    #[error("transport send error: {0}")]
    TransportSend(String),

    /// Failed to receive a message from the transport.
    #[error("transport receive error: {0}")]
    TransportReceive(String),

    /// The transport connection was closed.
    #[error("transport connection closed")]
    TransportClosed,

    /// The physical connection could not be established.
    #[error("connection error: {0}")]
    Connection(String),

    /// The server rejected the hub handshake.
    #[error("handshake rejected: {0}")]
    Handshake(String),

    /// The server reported a failed operation through the generic failure event.
    #[error("operation failed: {}", .0.message())]
    OperationFailed(ErrorEnvelope),

    /// The link dropped, or the session closed, while a call was still waiting for its outcome.
    #[error("connection closed before the call settled")]
    ConnectionClosed,

    /// An operation timed out.
    #[error("operation timed out")]
    Timeout,

    /// Failed to serialize or deserialize a protocol message.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// The server pushed an event this client does not know.
    #[error("unknown event target: {0}")]
    UnknownEvent(String),

    /// A call settled with an event other than the one it waited for.
    #[error("expected {expected}, received {received}")]
    UnexpectedEvent {
        /// Event the call waited for.
        expected: &'static str,
        /// Event that settled it.
        received: &'static str,
    },

    /// A known event arrived with a payload that does not match its shape.
    #[error("invalid payload for {event}: {source}")]
    InvalidPayload {
        /// Wire name of the event.
        event: &'static str,
        /// Underlying decode error.
        #[source]
        source: serde_json::Error,
    },

    /// Invalid client configuration.
    #[error("configuration error: {0}")]
    Config(String),

    /// An I/O error occurred.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl TruthOrDareError {
    /// Returns `true` for locally detected transport failures (not connected, send/receive failed).
    pub fn is_transport(&self) -> bool {
        matches!(
            self,
            Self::NotConnected
                | Self::TransportSend(_)
                | Self::TransportReceive(_)
                | Self::TransportClosed
        )
    }

    /// Returns `true` when the failure happened while establishing or keeping the connection.
    pub fn is_connection(&self) -> bool {
        matches!(
            self,
            Self::Connection(_) | Self::Handshake(_) | Self::ConnectionClosed | Self::Io(_)
        )
    }

    /// The server-side error envelope, if this is an [`OperationFailed`](Self::OperationFailed).
    pub fn envelope(&self) -> Option<&ErrorEnvelope> {
        match self {
            Self::OperationFailed(envelope) => Some(envelope),
            _ => None,
        }
    }
}

/// A specialized [`Result`] type for Truth or Dare client operations.
pub type Result<T> = std::result::Result<T, TruthOrDareError>;

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
    use crate::error_codes::ErrorCode;

    #[test]
    fn classification_predicates() {
        assert!(TruthOrDareError::NotConnected.is_transport());
        assert!(TruthOrDareError::TransportSend("x".into()).is_transport());
        assert!(!TruthOrDareError::Timeout.is_transport());

        assert!(TruthOrDareError::Connection("refused".into()).is_connection());
        assert!(TruthOrDareError::ConnectionClosed.is_connection());
        assert!(!TruthOrDareError::NotConnected.is_connection());
    }

    #[test]
    fn operation_failed_displays_server_message() {
        let envelope = ErrorEnvelope::new(ErrorCode::RoomFull, "Room is full");
        let err = TruthOrDareError::OperationFailed(envelope);
        assert_eq!(err.to_string(), "operation failed: Room is full");
        assert_eq!(err.envelope().unwrap().code(), Some(ErrorCode::RoomFull));
    }

    #[test]
    fn unexpected_event_names_both_kinds() {
        let err = TruthOrDareError::UnexpectedEvent {
            expected: "CreateRoomSuccess",
            received: "EndGameSuccess",
        };
        assert_eq!(
            err.to_string(),
            "expected CreateRoomSuccess, received EndGameSuccess"
        );
        assert!(!err.is_connection());
    }
}
