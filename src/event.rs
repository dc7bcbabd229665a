//! Inbound server events and the fan-out bus that delivers them.
//!
//! Every hub invocation the server pushes is decoded into a [`ServerEvent`].
//! The [`EventBus`] lets any number of handlers subscribe per [`EventKind`];
//! a handler is identified by the [`HandlerId`] returned on registration so
//! it can be detached again.

use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use serde::de::DeserializeOwned;
use serde_json::Value;
use tracing::trace;

use crate::error::{Result, TruthOrDareError};
use crate::protocol::{
    Acknowledgement, ChatMessage, CreateRoomResult, ErrorEnvelope, GameResetPayload,
    GameStartedPayload, GameSummary, Player, PlayerArrival, PlayerDeparture, Question,
    QuestionAssignment, ReconnectResult, TurnChange,
};

// ── Event kinds ─────────────────────────────────────────────────────

macro_rules! event_kinds {
    ($($name:ident),+ $(,)?) => {
        /// Wire name of an inbound event, used as the subscription key.
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
        pub enum EventKind {
            $($name),+
        }

        impl EventKind {
            /// Every event kind the client understands.
            pub const ALL: &'static [EventKind] = &[$(EventKind::$name),+];

            /// Wire name of this event.
            pub fn as_str(self) -> &'static str {
                match self {
                    $(EventKind::$name => stringify!($name)),+
                }
            }

            /// Look up an event kind by its wire name.
            pub fn from_target(target: &str) -> Option<Self> {
                match target {
                    $(stringify!($name) => Some(EventKind::$name),)+
                    _ => None,
                }
            }
        }
    };
}

event_kinds!(
    CreateRoomSuccess,
    JoinRoomSuccess,
    PlayerJoined,
    PlayerLeft,
    PlayerListUpdated,
    ChangePlayerNameSuccess,
    StartGameSuccess,
    GameStarted,
    GetQuestionSuccess,
    QuestionAssigned,
    NextPlayerTurn,
    NextPlayerSuccess,
    EndGameSuccess,
    GameEnded,
    ResetGameSuccess,
    GameReset,
    LeaveRoomSuccess,
    ReconnectSuccess,
    PlayerReconnected,
    ReceiveMessage,
    OperationFailed,
);

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ── Events ──────────────────────────────────────────────────────────

/// A typed event pushed by the server.
#[derive(Debug, Clone, PartialEq)]
pub enum ServerEvent {
    /// The caller's room was created; the caller is its host.
    CreateRoomSuccess(CreateRoomResult),
    /// The caller joined a room.
    JoinRoomSuccess(Acknowledgement),
    /// Someone joined the room.
    PlayerJoined(PlayerArrival),
    /// Someone left the room. The server does not always say who.
    PlayerLeft(Option<PlayerDeparture>),
    /// Authoritative roster.
    PlayerListUpdated(Vec<Player>),
    /// The caller's rename went through.
    ChangePlayerNameSuccess(Acknowledgement),
    /// The caller's start request went through.
    StartGameSuccess(Acknowledgement),
    /// The room moved to playing; the first turn is set.
    GameStarted(GameStartedPayload),
    /// The question the caller drew.
    GetQuestionSuccess(Question),
    /// A question was assigned to the player whose turn it is.
    QuestionAssigned(QuestionAssignment),
    /// The turn passed to another player.
    NextPlayerTurn(TurnChange),
    /// The current question was answered and the turn was handed over.
    NextPlayerSuccess(Acknowledgement),
    /// The caller's end request went through.
    EndGameSuccess(Acknowledgement),
    /// The game ended for everybody.
    GameEnded(GameSummary),
    /// The caller's reset request went through.
    ResetGameSuccess(Acknowledgement),
    /// The room went back to waiting.
    GameReset(GameResetPayload),
    /// The caller left the room.
    LeaveRoomSuccess(Acknowledgement),
    /// The caller re-entered its room after a reconnect.
    ReconnectSuccess(ReconnectResult),
    /// Another player re-entered the room.
    PlayerReconnected(Acknowledgement),
    /// A chat line.
    ReceiveMessage(ChatMessage),
    /// Generic failure for whatever operation the server just rejected.
    OperationFailed(ErrorEnvelope),
}

impl ServerEvent {
    /// Decode a hub invocation into a typed event. The payload is the first argument.
    ///
    /// # Errors
    ///
    /// Returns [`TruthOrDareError::UnknownEvent`] for targets this client does
    /// not know and [`TruthOrDareError::InvalidPayload`] when the payload does
    /// not fit the event's shape.
    pub fn from_invocation(target: &str, arguments: Vec<Value>) -> Result<Self> {
        let kind = EventKind::from_target(target)
            .ok_or_else(|| TruthOrDareError::UnknownEvent(target.to_string()))?;
        let payload = arguments.into_iter().next().unwrap_or(Value::Null);

        let event = match kind {
            EventKind::CreateRoomSuccess => Self::CreateRoomSuccess(decode(kind, payload)?),
            EventKind::JoinRoomSuccess => Self::JoinRoomSuccess(decode(kind, payload)?),
            EventKind::PlayerJoined => Self::PlayerJoined(decode(kind, payload)?),
            EventKind::PlayerLeft => Self::PlayerLeft(decode(kind, payload)?),
            EventKind::PlayerListUpdated => Self::PlayerListUpdated(decode_roster(kind, payload)?),
            EventKind::ChangePlayerNameSuccess => {
                Self::ChangePlayerNameSuccess(decode(kind, payload)?)
            }
            EventKind::StartGameSuccess => Self::StartGameSuccess(decode(kind, payload)?),
            EventKind::GameStarted => Self::GameStarted(decode(kind, payload)?),
            EventKind::GetQuestionSuccess => Self::GetQuestionSuccess(decode(kind, payload)?),
            EventKind::QuestionAssigned => Self::QuestionAssigned(decode(kind, payload)?),
            EventKind::NextPlayerTurn => Self::NextPlayerTurn(decode(kind, payload)?),
            EventKind::NextPlayerSuccess => Self::NextPlayerSuccess(decode(kind, payload)?),
            EventKind::EndGameSuccess => Self::EndGameSuccess(decode(kind, payload)?),
            EventKind::GameEnded => Self::GameEnded(decode_or_default(kind, payload)?),
            EventKind::ResetGameSuccess => Self::ResetGameSuccess(decode(kind, payload)?),
            EventKind::GameReset => Self::GameReset(decode_or_default(kind, payload)?),
            EventKind::LeaveRoomSuccess => Self::LeaveRoomSuccess(decode(kind, payload)?),
            EventKind::ReconnectSuccess => {
                Self::ReconnectSuccess(decode_or_default(kind, payload)?)
            }
            EventKind::PlayerReconnected => Self::PlayerReconnected(decode(kind, payload)?),
            EventKind::ReceiveMessage => Self::ReceiveMessage(decode(kind, payload)?),
            EventKind::OperationFailed => Self::OperationFailed(decode_or_default(kind, payload)?),
        };
        Ok(event)
    }

    /// The kind of this event.
    pub fn kind(&self) -> EventKind {
        match self {
            Self::CreateRoomSuccess(_) => EventKind::CreateRoomSuccess,
            Self::JoinRoomSuccess(_) => EventKind::JoinRoomSuccess,
            Self::PlayerJoined(_) => EventKind::PlayerJoined,
            Self::PlayerLeft(_) => EventKind::PlayerLeft,
            Self::PlayerListUpdated(_) => EventKind::PlayerListUpdated,
            Self::ChangePlayerNameSuccess(_) => EventKind::ChangePlayerNameSuccess,
            Self::StartGameSuccess(_) => EventKind::StartGameSuccess,
            Self::GameStarted(_) => EventKind::GameStarted,
            Self::GetQuestionSuccess(_) => EventKind::GetQuestionSuccess,
            Self::QuestionAssigned(_) => EventKind::QuestionAssigned,
            Self::NextPlayerTurn(_) => EventKind::NextPlayerTurn,
            Self::NextPlayerSuccess(_) => EventKind::NextPlayerSuccess,
            Self::EndGameSuccess(_) => EventKind::EndGameSuccess,
            Self::GameEnded(_) => EventKind::GameEnded,
            Self::ResetGameSuccess(_) => EventKind::ResetGameSuccess,
            Self::GameReset(_) => EventKind::GameReset,
            Self::LeaveRoomSuccess(_) => EventKind::LeaveRoomSuccess,
            Self::ReconnectSuccess(_) => EventKind::ReconnectSuccess,
            Self::PlayerReconnected(_) => EventKind::PlayerReconnected,
            Self::ReceiveMessage(_) => EventKind::ReceiveMessage,
            Self::OperationFailed(_) => EventKind::OperationFailed,
        }
    }
}

fn decode<T: DeserializeOwned>(kind: EventKind, payload: Value) -> Result<T> {
    serde_json::from_value(payload).map_err(|source| TruthOrDareError::InvalidPayload {
        event: kind.as_str(),
        source,
    })
}

fn decode_or_default<T: DeserializeOwned + Default>(kind: EventKind, payload: Value) -> Result<T> {
    if payload.is_null() {
        return Ok(T::default());
    }
    decode(kind, payload)
}

/// Rosters arrive either as a bare array or wrapped in `{ "players": [...] }`.
fn decode_roster(kind: EventKind, payload: Value) -> Result<Vec<Player>> {
    match payload {
        Value::Object(mut map) if map.contains_key("players") => {
            decode(kind, map.remove("players").unwrap_or(Value::Null))
        }
        Value::Null => Ok(Vec::new()),
        other => decode(kind, other),
    }
}

// ── Event bus ───────────────────────────────────────────────────────

/// Identifies one registered handler.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct HandlerId(u64);

/// A callback invoked for every event of the kind it subscribed to.
pub type EventHandler = Arc<dyn Fn(&ServerEvent) + Send + Sync>;

/// Fan-out registry of event handlers.
///
/// Handlers run on the session task, in registration order, and must not
/// block. A handler may register or detach handlers (including itself) while
/// running; the change takes effect from the next event.
#[derive(Default)]
pub struct EventBus {
    next_id: AtomicU64,
    handlers: Mutex<HashMap<EventKind, Vec<(HandlerId, EventHandler)>>>,
}

impl EventBus {
    /// Create an empty bus.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `handler` for `kind`.
    pub fn on(&self, kind: EventKind, handler: EventHandler) -> HandlerId {
        let id = HandlerId(self.next_id.fetch_add(1, Ordering::Relaxed));
        self.handlers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .entry(kind)
            .or_default()
            .push((id, handler));
        trace!(event = %kind, handler = id.0, "handler registered");
        id
    }

    /// Detach a handler. Returns `false` if it was not registered.
    pub fn off(&self, kind: EventKind, id: HandlerId) -> bool {
        let mut handlers = self
            .handlers
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        let Some(list) = handlers.get_mut(&kind) else {
            return false;
        };
        let before = list.len();
        list.retain(|(existing, _)| *existing != id);
        let removed = list.len() != before;
        if list.is_empty() {
            handlers.remove(&kind);
        }
        if removed {
            trace!(event = %kind, handler = id.0, "handler detached");
        }
        removed
    }

    /// Number of handlers registered for `kind`.
    pub fn handler_count(&self, kind: EventKind) -> usize {
        self.handlers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&kind)
            .map_or(0, Vec::len)
    }

    /// Deliver `event` to every handler registered for its kind.
    pub fn dispatch(&self, event: &ServerEvent) {
        let kind = event.kind();
        let snapshot: Vec<EventHandler> = self
            .handlers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&kind)
            .map(|list| list.iter().map(|(_, handler)| Arc::clone(handler)).collect())
            .unwrap_or_default();
        trace!(event = %kind, handlers = snapshot.len(), "dispatching");
        for handler in snapshot {
            handler(event);
        }
    }
}

impl fmt::Debug for EventBus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let handlers = self
            .handlers
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        let total: usize = handlers.values().map(Vec::len).sum();
        f.debug_struct("EventBus")
            .field("kinds", &handlers.len())
            .field("handlers", &total)
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
    use crate::protocol::{QuestionType, RoomStatus};
    use serde_json::json;
    use std::sync::atomic::AtomicUsize;

    #[test]
    fn kinds_round_trip_through_wire_names() {
        for kind in EventKind::ALL {
            assert_eq!(EventKind::from_target(kind.as_str()), Some(*kind));
        }
        assert_eq!(EventKind::from_target("Nope"), None);
    }

    #[test]
    fn unknown_target_is_reported() {
        let err = ServerEvent::from_invocation("SomethingNew", vec![]).unwrap_err();
        assert!(matches!(err, TruthOrDareError::UnknownEvent(ref t) if t == "SomethingNew"));
    }

    #[test]
    fn invalid_payload_names_the_event() {
        let err = ServerEvent::from_invocation("NextPlayerTurn", vec![json!(17)]).unwrap_err();
        assert!(matches!(
            err,
            TruthOrDareError::InvalidPayload {
                event: "NextPlayerTurn",
                ..
            }
        ));
    }

    #[test]
    fn decodes_question_assigned() {
        let event = ServerEvent::from_invocation(
            "QuestionAssigned",
            vec![json!({
                "playerId": "p-2",
                "playerName": "Bob",
                "questionText": "Dance",
                "questionType": "dare",
                "isLastQuestion": true
            })],
        )
        .unwrap();
        let ServerEvent::QuestionAssigned(assignment) = event else {
            panic!("wrong event");
        };
        assert_eq!(assignment.player_id.as_deref(), Some("p-2"));
        assert_eq!(assignment.question.question_type, QuestionType::Dare);
        assert!(assignment.question.is_last_question);
    }

    #[test]
    fn decodes_roster_in_both_shapes() {
        let players = json!([{ "playerId": "p-1", "playerName": "Alice", "isHost": true }]);
        let bare =
            ServerEvent::from_invocation("PlayerListUpdated", vec![players.clone()]).unwrap();
        let wrapped =
            ServerEvent::from_invocation("PlayerListUpdated", vec![json!({ "players": players })])
                .unwrap();
        assert_eq!(bare, wrapped);
        let ServerEvent::PlayerListUpdated(list) = bare else {
            panic!("wrong event");
        };
        assert!(list[0].is_host);
        assert!(list[0].is_active);
    }

    #[test]
    fn missing_payloads_fall_back_to_defaults() {
        assert_eq!(
            ServerEvent::from_invocation("GameEnded", vec![]).unwrap(),
            ServerEvent::GameEnded(GameSummary::default())
        );
        assert_eq!(
            ServerEvent::from_invocation("PlayerLeft", vec![]).unwrap(),
            ServerEvent::PlayerLeft(None)
        );
        let reconnect =
            ServerEvent::from_invocation("ReconnectSuccess", vec![json!({"roomStatus": "Ended"})])
                .unwrap();
        assert!(matches!(
            reconnect,
            ServerEvent::ReconnectSuccess(ReconnectResult {
                room_status: Some(RoomStatus::Ended),
                ..
            })
        ));
    }

    #[test]
    fn bus_fans_out_and_detaches() {
        let bus = EventBus::new();
        let hits = Arc::new(AtomicUsize::new(0));

        let h1 = Arc::clone(&hits);
        let first = bus.on(
            EventKind::PlayerReconnected,
            Arc::new(move |_| {
                h1.fetch_add(1, Ordering::SeqCst);
            }),
        );
        let h2 = Arc::clone(&hits);
        bus.on(
            EventKind::PlayerReconnected,
            Arc::new(move |_| {
                h2.fetch_add(10, Ordering::SeqCst);
            }),
        );
        assert_eq!(bus.handler_count(EventKind::PlayerReconnected), 2);

        let event = ServerEvent::PlayerReconnected(Acknowledgement(json!("back")));
        bus.dispatch(&event);
        assert_eq!(hits.load(Ordering::SeqCst), 11);

        assert!(bus.off(EventKind::PlayerReconnected, first));
        assert!(!bus.off(EventKind::PlayerReconnected, first));
        bus.dispatch(&event);
        assert_eq!(hits.load(Ordering::SeqCst), 21);
    }

    #[test]
    fn handler_may_detach_itself_while_running() {
        let bus = Arc::new(EventBus::new());
        let slot: Arc<Mutex<Option<HandlerId>>> = Arc::new(Mutex::new(None));

        let bus_ref = Arc::clone(&bus);
        let slot_ref = Arc::clone(&slot);
        let id = bus.on(
            EventKind::GameEnded,
            Arc::new(move |_| {
                if let Some(id) = slot_ref.lock().unwrap().take() {
                    bus_ref.off(EventKind::GameEnded, id);
                }
            }),
        );
        *slot.lock().unwrap() = Some(id);

        bus.dispatch(&ServerEvent::GameEnded(GameSummary::default()));
        assert_eq!(bus.handler_count(EventKind::GameEnded), 0);
    }
}
