//! # Truth or Dare Client
//!
//! Async realtime client for the Truth or Dare room hub.
//!
//! Players share a room and take turns; the server owns the game state and
//! pushes every change as an event over one long-lived connection. This crate
//! provides:
//!
//! - **Transport session** ([`HubSession`]): one physical link speaking the
//!   JSON hub protocol, with keep-alive and automatic reconnection with backoff
//! - **Connection lifecycle** ([`ConnectionManager`]): an idempotent
//!   `ensure_connection` sharing one connect attempt, and a published
//!   [`ConnectionState`]
//! - **Event-correlated calls** ([`call::invoke`]): request/response over
//!   fire-and-forget invocations and pushed success/failure events
//! - **Room projection** ([`RoomStore`]): a [`RoomSnapshot`] kept in sync
//!   with server events
//!
//! The transport is pluggable through the [`Transport`] and [`Connector`]
//! traits; the default `transport-websocket` feature provides
//! [`WebSocketConnector`].

pub mod call;
pub mod client;
pub mod config;
pub mod error;
pub mod error_codes;
pub mod event;
pub mod manager;
pub mod projection;
pub mod protocol;
pub mod session;
pub mod transport;
pub mod transports;

// Re-export primary types for ergonomic imports.
pub use client::{CreateRoomParams, JoinRoomParams, RoomHub};
pub use config::{ClientConfig, ReconnectPolicy};
pub use error::{Result, TruthOrDareError};
pub use error_codes::{ErrorCode, ErrorDomain};
pub use event::{EventKind, HandlerId, ServerEvent};
pub use manager::{ConnectionManager, ConnectionState, SessionSubscriber};
pub use projection::{Inconsistency, RoomSnapshot, RoomStore};
pub use protocol::{ClientOperation, ErrorEnvelope, Player, QuestionType, RoomStatus};
pub use session::{HubSession, LifecycleListener, LinkStatus};
pub use transport::{Connector, Transport};

#[cfg(feature = "transport-websocket")]
pub use transports::{WebSocketConnector, WebSocketTransport};
