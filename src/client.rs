//! High-level room client.
//!
//! [`RoomHub`] ties the pieces together: a [`ConnectionManager`] owning the
//! session, a [`RoomStore`] projecting room state from events, and typed
//! async operations built on [`invoke`]. Every operation first makes sure the
//! connection is up, then waits for its success event or the generic
//! `OperationFailed` event.
//!
//! # Example
//!
//! ```rust,no_run
//! # async fn example() -> truth_or_dare_client::Result<()> {
//! use truth_or_dare_client::{ClientConfig, CreateRoomParams, RoomHub};
//!
//! let hub = RoomHub::new(ClientConfig::from_env()?);
//! let created = hub
//!     .create_room(CreateRoomParams::new("Friday night", "p-1", "Alice").with_max_players(6))
//!     .await?;
//! hub.start_game(&created.room_id, "p-1").await?;
//!
//! let room = hub.room().snapshot();
//! println!("turn: {:?}", room.current_player_name);
//! hub.shutdown().await;
//! # Ok(())
//! # }
//! ```

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tracing::debug;

use crate::call::invoke;
use crate::config::ClientConfig;
use crate::error::{Result, TruthOrDareError};
use crate::event::{EventKind, ServerEvent};
use crate::manager::{ConnectionManager, ConnectionState, SessionSubscriber};
use crate::projection::RoomStore;
use crate::protocol::{
    Acknowledgement, AgeGroup, ClientOperation, CreateRoomResult, GameMode, Question,
    QuestionType, ReconnectResult,
};
use crate::transport::Connector;

const DEFAULT_MAX_PLAYERS: u32 = 2;

// ── Parameters ──────────────────────────────────────────────────────

/// Parameters for creating a room.
///
/// ```
/// use truth_or_dare_client::client::CreateRoomParams;
/// use truth_or_dare_client::protocol::{AgeGroup, GameMode};
///
/// let params = CreateRoomParams::new("Friday", "p-1", "Alice")
///     .with_mode(GameMode::Friends)
///     .with_age_group(AgeGroup::Teen);
/// assert_eq!(params.max_players, 2);
/// assert!(params.password.is_empty());
/// ```
#[derive(Debug, Clone)]
pub struct CreateRoomParams {
    pub room_name: String,
    pub player_id: String,
    pub host_name: String,
    /// Empty for an open room.
    pub password: String,
    pub age_group: AgeGroup,
    pub mode: GameMode,
    /// Defaults to **2**.
    pub max_players: u32,
}

impl CreateRoomParams {
    /// Parameters for an open party room for everyone.
    pub fn new(
        room_name: impl Into<String>,
        player_id: impl Into<String>,
        host_name: impl Into<String>,
    ) -> Self {
        Self {
            room_name: room_name.into(),
            player_id: player_id.into(),
            host_name: host_name.into(),
            password: String::new(),
            age_group: AgeGroup::default(),
            mode: GameMode::default(),
            max_players: DEFAULT_MAX_PLAYERS,
        }
    }

    #[must_use]
    pub fn with_password(mut self, password: impl Into<String>) -> Self {
        self.password = password.into();
        self
    }

    #[must_use]
    pub fn with_age_group(mut self, age_group: AgeGroup) -> Self {
        self.age_group = age_group;
        self
    }

    #[must_use]
    pub fn with_mode(mut self, mode: GameMode) -> Self {
        self.mode = mode;
        self
    }

    #[must_use]
    pub fn with_max_players(mut self, max_players: u32) -> Self {
        self.max_players = max_players;
        self
    }
}

impl From<CreateRoomParams> for ClientOperation {
    fn from(params: CreateRoomParams) -> Self {
        ClientOperation::CreateRoom {
            room_name: params.room_name,
            player_id: params.player_id,
            host_name: params.host_name,
            password: params.password,
            age_group: params.age_group,
            mode: params.mode,
            max_players: params.max_players,
        }
    }
}

/// Parameters for joining a room.
#[derive(Debug, Clone)]
pub struct JoinRoomParams {
    pub room_id: String,
    pub player_id: String,
    pub player_name: String,
    pub password: String,
}

impl JoinRoomParams {
    pub fn new(
        room_id: impl Into<String>,
        player_id: impl Into<String>,
        player_name: impl Into<String>,
    ) -> Self {
        Self {
            room_id: room_id.into(),
            player_id: player_id.into(),
            player_name: player_name.into(),
            password: String::new(),
        }
    }

    /// Password of a protected room.
    #[must_use]
    pub fn with_password(mut self, password: impl Into<String>) -> Self {
        self.password = password.into();
        self
    }
}

impl From<JoinRoomParams> for ClientOperation {
    fn from(params: JoinRoomParams) -> Self {
        ClientOperation::JoinRoom {
            room_id: params.room_id,
            player_id: params.player_id,
            player_name: params.player_name,
            password: params.password,
        }
    }
}

// ── Client ──────────────────────────────────────────────────────────

/// Typed client for one player's view of the room hub.
pub struct RoomHub {
    manager: Arc<ConnectionManager>,
    store: Arc<RoomStore>,
    call_timeout: Option<Duration>,
}

/// Unwrap the payload of the expected success event.
macro_rules! expect_event {
    ($event:expr, $variant:ident) => {
        match $event {
            ServerEvent::$variant(payload) => Ok(payload),
            other => Err(TruthOrDareError::UnexpectedEvent {
                expected: stringify!($variant),
                received: other.kind().as_str(),
            }),
        }
    };
}

impl RoomHub {
    /// A client dialing the hub over WebSocket.
    #[cfg(feature = "transport-websocket")]
    pub fn new(config: ClientConfig) -> Self {
        let connector = crate::transports::WebSocketConnector::new()
            .with_connect_timeout(config.handshake_timeout);
        Self::with_connector(config, Arc::new(connector))
    }

    /// A client dialing the hub through `connector`.
    pub fn with_connector(config: ClientConfig, connector: Arc<dyn Connector>) -> Self {
        let store = Arc::new(RoomStore::new(config.journal_capacity));
        let call_timeout = config.call_timeout;
        let manager = Arc::new(ConnectionManager::new(config, connector));
        manager.add_subscriber(Arc::clone(&store) as Arc<dyn SessionSubscriber>);
        Self {
            manager,
            store,
            call_timeout,
        }
    }

    /// Connect now instead of on the first operation.
    ///
    /// # Errors
    ///
    /// Returns [`TruthOrDareError::Connection`] if the hub cannot be reached.
    pub async fn connect(&self) -> Result<()> {
        self.manager.ensure_connection().await.map(|_| ())
    }

    async fn call(&self, op: ClientOperation, success: EventKind) -> Result<ServerEvent> {
        let session = self.manager.ensure_connection().await?;
        debug!(op = op.target(), "calling hub");
        invoke(
            &session,
            op,
            success,
            EventKind::OperationFailed,
            self.call_timeout,
        )
        .await
    }

    // ── Operations ──────────────────────────────────────────────────

    /// Create a room hosted by the caller.
    ///
    /// # Errors
    ///
    /// Connection errors from [`connect`](Self::connect), or any error
    /// [`invoke`] reports, including [`TruthOrDareError::OperationFailed`].
    pub async fn create_room(&self, params: CreateRoomParams) -> Result<CreateRoomResult> {
        let event = self
            .call(params.into(), EventKind::CreateRoomSuccess)
            .await?;
        expect_event!(event, CreateRoomSuccess)
    }

    /// Join an existing room.
    ///
    /// # Errors
    ///
    /// As for [`create_room`](Self::create_room).
    pub async fn join_room(&self, params: JoinRoomParams) -> Result<Acknowledgement> {
        let event = self.call(params.into(), EventKind::JoinRoomSuccess).await?;
        expect_event!(event, JoinRoomSuccess)
    }

    /// Rename the caller inside a room.
    ///
    /// # Errors
    ///
    /// As for [`create_room`](Self::create_room).
    pub async fn change_player_name(
        &self,
        room_id: &str,
        player_id: &str,
        new_name: &str,
    ) -> Result<Acknowledgement> {
        let op = ClientOperation::ChangePlayerName {
            room_id: room_id.into(),
            player_id: player_id.into(),
            new_name: new_name.into(),
        };
        let event = self.call(op, EventKind::ChangePlayerNameSuccess).await?;
        expect_event!(event, ChangePlayerNameSuccess)
    }

    /// Start the game (host only).
    ///
    /// # Errors
    ///
    /// As for [`create_room`](Self::create_room).
    pub async fn start_game(&self, room_id: &str, player_id: &str) -> Result<Acknowledgement> {
        let op = ClientOperation::StartGame {
            room_id: room_id.into(),
            player_id: player_id.into(),
        };
        let event = self.call(op, EventKind::StartGameSuccess).await?;
        expect_event!(event, StartGameSuccess)
    }

    /// Draw a question of `question_type` for the caller's turn.
    ///
    /// # Errors
    ///
    /// As for [`create_room`](Self::create_room).
    pub async fn get_random_question(
        &self,
        room_id: &str,
        player_id: &str,
        question_type: QuestionType,
    ) -> Result<Question> {
        let op = ClientOperation::GetRandomQuestionForRoom {
            room_id: room_id.into(),
            player_id: player_id.into(),
            question_type,
        };
        let event = self.call(op, EventKind::GetQuestionSuccess).await?;
        expect_event!(event, GetQuestionSuccess)
    }

    /// Mark the current question answered and pass the turn.
    ///
    /// # Errors
    ///
    /// As for [`create_room`](Self::create_room).
    pub async fn next_player(&self, room_id: &str, player_id: &str) -> Result<Acknowledgement> {
        let op = ClientOperation::NextPlayer {
            room_id: room_id.into(),
            player_id: player_id.into(),
        };
        let event = self.call(op, EventKind::NextPlayerSuccess).await?;
        expect_event!(event, NextPlayerSuccess)
    }

    /// End the game (host only).
    ///
    /// # Errors
    ///
    /// As for [`create_room`](Self::create_room).
    pub async fn end_game(&self, room_id: &str, player_id: &str) -> Result<Acknowledgement> {
        let op = ClientOperation::EndGame {
            room_id: room_id.into(),
            player_id: player_id.into(),
        };
        let event = self.call(op, EventKind::EndGameSuccess).await?;
        expect_event!(event, EndGameSuccess)
    }

    /// Return an ended game to the lobby (host only).
    ///
    /// # Errors
    ///
    /// As for [`create_room`](Self::create_room).
    pub async fn reset_game(&self, room_id: &str, player_id: &str) -> Result<Acknowledgement> {
        let op = ClientOperation::ResetGame {
            room_id: room_id.into(),
            player_id: player_id.into(),
        };
        let event = self.call(op, EventKind::ResetGameSuccess).await?;
        expect_event!(event, ResetGameSuccess)
    }

    /// Leave the room.
    ///
    /// # Errors
    ///
    /// As for [`create_room`](Self::create_room).
    pub async fn leave_room(&self, room_id: &str, player_id: &str) -> Result<Acknowledgement> {
        let op = ClientOperation::LeaveRoom {
            room_id: room_id.into(),
            player_id: player_id.into(),
        };
        let event = self.call(op, EventKind::LeaveRoomSuccess).await?;
        expect_event!(event, LeaveRoomSuccess)
    }

    /// Re-enter a room after the connection was re-established. The
    /// `ReconnectSuccess` event also re-seeds the room projection.
    ///
    /// # Errors
    ///
    /// As for [`create_room`](Self::create_room).
    pub async fn reconnect_player(
        &self,
        room_id: &str,
        player_id: &str,
        player_name: &str,
    ) -> Result<ReconnectResult> {
        let op = ClientOperation::ReconnectPlayer {
            room_id: room_id.into(),
            player_id: player_id.into(),
            player_name: player_name.into(),
        };
        let event = self.call(op, EventKind::ReconnectSuccess).await?;
        expect_event!(event, ReconnectSuccess)
    }

    /// Post a chat line. Fire-and-forget: returns once the line is queued.
    ///
    /// # Errors
    ///
    /// Connection errors, or [`TruthOrDareError::NotConnected`] if the link
    /// dropped before the line was queued.
    pub async fn send_message(&self, room_id: &str, message: &str) -> Result<()> {
        let session = self.manager.ensure_connection().await?;
        session.send(&ClientOperation::SendMessage {
            room_id: room_id.into(),
            message: message.into(),
        })
    }

    // ── State ───────────────────────────────────────────────────────

    /// Current connection state.
    pub fn connection_state(&self) -> ConnectionState {
        self.manager.state()
    }

    /// Watch the connection state.
    pub fn subscribe_connection(&self) -> watch::Receiver<ConnectionState> {
        self.manager.subscribe_state()
    }

    /// The room projection.
    pub fn room(&self) -> &Arc<RoomStore> {
        &self.store
    }

    /// The connection manager.
    pub fn manager(&self) -> &Arc<ConnectionManager> {
        &self.manager
    }

    /// Stop the connection. Pending calls reject with
    /// [`TruthOrDareError::ConnectionClosed`].
    pub async fn shutdown(&self) {
        debug!("RoomHub: shutdown requested");
        self.manager.stop().await;
    }
}

impl std::fmt::Debug for RoomHub {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RoomHub")
            .field("manager", &self.manager)
            .field("call_timeout", &self.call_timeout)
            .finish()
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

    #[test]
    fn create_params_map_to_operation() {
        let op: ClientOperation = CreateRoomParams::new("Friday", "p-1", "Alice")
            .with_password("secret")
            .with_max_players(5)
            .into();
        assert_eq!(op.target(), "CreateRoom");
        let args = op.arguments();
        assert_eq!(args[3], "secret");
        assert_eq!(args[4], "all");
        assert_eq!(args[5], "party");
        assert_eq!(args[6], 5);
    }

    #[test]
    fn join_params_map_to_operation() {
        let op: ClientOperation = JoinRoomParams::new("r-1", "p-2", "Bob").into();
        assert_eq!(
            op,
            ClientOperation::JoinRoom {
                room_id: "r-1".into(),
                player_id: "p-2".into(),
                player_name: "Bob".into(),
                password: String::new(),
            }
        );
    }

    #[test]
    fn unexpected_event_is_reported() {
        let event = ServerEvent::EndGameSuccess(Acknowledgement::default());
        let result: Result<CreateRoomResult> = expect_event!(event, CreateRoomSuccess);
        assert!(matches!(
            result,
            Err(TruthOrDareError::UnexpectedEvent {
                expected: "CreateRoomSuccess",
                received: "EndGameSuccess",
            })
        ));
    }
}
