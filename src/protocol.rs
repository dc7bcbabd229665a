//! Wire-compatible protocol types for the Truth or Dare room hub.
//!
//! The hub speaks the JSON hub protocol: every record is a JSON object
//! terminated by the ASCII record separator (`0x1E`), and a single text frame
//! may carry several records. After the transport opens, the client sends a
//! handshake request and the server answers with `{}` (accepted) or
//! `{"error": "..."}` (rejected).
//!
//! Payload field names follow the server's camelCase JSON. A few payloads are
//! emitted in more than one shape by the server; aliases and untagged wire
//! enums absorb those differences here so the rest of the crate sees one
//! typed shape per event.

use serde::de::Error as _;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::error::Result;
use crate::error_codes::{ErrorCode, ErrorDomain};

/// Terminator appended to every JSON record on the wire.
pub const RECORD_SEPARATOR: char = '\u{1e}';

/// Hub protocol name announced in the handshake.
pub const HUB_PROTOCOL: &str = "json";

/// Hub protocol version announced in the handshake.
pub const HUB_PROTOCOL_VERSION: u32 = 1;

// ── Enums ───────────────────────────────────────────────────────────

/// Kind of question a player can draw.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, Default)]
#[serde(rename_all = "lowercase")]
pub enum QuestionType {
    #[default]
    #[serde(alias = "Truth")]
    Truth,
    #[serde(alias = "Dare")]
    Dare,
}

impl QuestionType {
    /// Wire value (`"truth"` / `"dare"`).
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Truth => "truth",
            Self::Dare => "dare",
        }
    }
}

/// Lifecycle status of a room.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, Default)]
#[serde(rename_all = "lowercase")]
pub enum RoomStatus {
    /// Players are gathering; the host has not started yet.
    #[default]
    #[serde(alias = "Waiting")]
    Waiting,
    /// Turns are being played.
    #[serde(alias = "Playing")]
    Playing,
    /// The game finished; the host may reset it.
    #[serde(alias = "Ended")]
    Ended,
}

/// Age group a room's questions are drawn for.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum AgeGroup {
    Kids,
    Teen,
    Adult,
    #[default]
    All,
}

/// Question pool a room plays with.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum GameMode {
    #[default]
    Party,
    Friends,
    Couples,
    Special,
}

// ── Structs ─────────────────────────────────────────────────────────

fn active_by_default() -> bool {
    true
}

/// A player as listed in a room roster.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Player {
    pub player_id: String,
    pub player_name: String,
    #[serde(default)]
    pub is_host: bool,
    #[serde(default = "active_by_default")]
    pub is_active: bool,
}

impl Player {
    /// Create an active, non-host player.
    pub fn new(player_id: impl Into<String>, player_name: impl Into<String>) -> Self {
        Self {
            player_id: player_id.into(),
            player_name: player_name.into(),
            is_host: false,
            is_active: true,
        }
    }

    /// Mark this player as the room host.
    #[must_use]
    pub fn as_host(mut self) -> Self {
        self.is_host = true;
        self
    }
}

/// A question presented to the player whose turn it is.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Question {
    #[serde(default, alias = "id", skip_serializing_if = "Option::is_none")]
    pub question_id: Option<String>,
    #[serde(alias = "text")]
    pub question_text: String,
    #[serde(default, alias = "type")]
    pub question_type: QuestionType,
    #[serde(default)]
    pub is_last_question: bool,
}

/// Payload of `CreateRoomSuccess`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateRoomResult {
    pub room_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

/// Payload of `GameStarted`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GameStartedPayload {
    pub current_player_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub current_player_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

/// Payload of `QuestionAssigned`: who must answer, and what.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QuestionAssignment {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub player_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub player_name: Option<String>,
    #[serde(flatten)]
    pub question: Question,
}

/// Payload of `NextPlayerTurn`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TurnChange {
    pub next_player_id: String,
    #[serde(default)]
    pub next_player_name: String,
}

/// Payload of `GameEnded`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GameSummary {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(default, alias = "TotalQuestions", skip_serializing_if = "Option::is_none")]
    pub total_questions: Option<u32>,
    #[serde(default, alias = "PlayerStats", skip_serializing_if = "Option::is_none")]
    pub player_stats: Option<Value>,
}

/// Payload of `GameReset`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GameResetPayload {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(default)]
    pub players: Vec<Player>,
}

/// Payload of `ReconnectSuccess`, used to re-seed the room after a reconnect.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", from = "ReconnectResultWire")]
pub struct ReconnectResult {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub room_status: Option<RoomStatus>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub current_player_id: Option<String>,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum ReconnectResultWire {
    Full {
        #[serde(default)]
        message: Option<String>,
        #[serde(default, rename = "roomStatus")]
        room_status: Option<RoomStatus>,
        #[serde(default, rename = "currentPlayerId")]
        current_player_id: Option<String>,
    },
    Message(String),
}

impl From<ReconnectResultWire> for ReconnectResult {
    fn from(wire: ReconnectResultWire) -> Self {
        match wire {
            ReconnectResultWire::Full {
                message,
                room_status,
                current_player_id,
            } => Self {
                message,
                room_status,
                current_player_id: current_player_id.filter(|id| !id.is_empty()),
            },
            ReconnectResultWire::Message(message) => Self {
                message: Some(message),
                ..Self::default()
            },
        }
    }
}

/// How the server announces a newly joined player: by name only, or in full.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum PlayerArrival {
    Player(Player),
    Name(String),
}

impl PlayerArrival {
    /// Display name of the arriving player.
    pub fn name(&self) -> &str {
        match self {
            Self::Player(player) => &player.player_name,
            Self::Name(name) => name,
        }
    }
}

/// How the server identifies a departed player, when it does at all.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum PlayerDeparture {
    Player(Player),
    Id {
        #[serde(rename = "playerId")]
        player_id: String,
    },
    Name(String),
}

/// A chat line broadcast to the room.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", from = "ChatMessageWire")]
pub struct ChatMessage {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub player_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub player_name: Option<String>,
    pub message: String,
    #[serde(default, rename = "messTime", skip_serializing_if = "Option::is_none")]
    pub sent_at: Option<String>,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum ChatMessageWire {
    Full {
        message: String,
        #[serde(default, rename = "playerId")]
        player_id: Option<String>,
        #[serde(default, rename = "playerName")]
        player_name: Option<String>,
        #[serde(default, rename = "messTime")]
        sent_at: Option<String>,
    },
    Text(String),
}

impl From<ChatMessageWire> for ChatMessage {
    fn from(wire: ChatMessageWire) -> Self {
        match wire {
            ChatMessageWire::Full {
                message,
                player_id,
                player_name,
                sent_at,
            } => Self {
                player_id,
                player_name,
                message,
                sent_at,
            },
            ChatMessageWire::Text(message) => Self {
                player_id: None,
                player_name: None,
                message,
                sent_at: None,
            },
        }
    }
}

/// Free-form acknowledgement carried by most `*Success` events.
///
/// The server sends either a bare string or an object with a `message` field.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Acknowledgement(pub Value);

impl Acknowledgement {
    /// Human-readable text of the acknowledgement, if it has one.
    pub fn message(&self) -> Option<&str> {
        match &self.0 {
            Value::String(text) => Some(text),
            Value::Object(map) => map.get("message").and_then(Value::as_str),
            _ => None,
        }
    }

    /// Raw payload.
    pub fn value(&self) -> &Value {
        &self.0
    }
}

// ── Error envelope ──────────────────────────────────────────────────

/// Inner `errors` object of an [`ErrorEnvelope`].
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorDetails {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_code: Option<ErrorCode>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    /// Any additional fields the server attached.
    #[serde(flatten)]
    pub extra: serde_json::Map<String, Value>,
}

/// A domain failure pushed by the server on the generic `OperationFailed` event.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorEnvelope {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status_code: Option<u16>,
    #[serde(default)]
    pub errors: ErrorDetails,
}

impl ErrorEnvelope {
    /// Build an envelope from a code and a message.
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            status_code: None,
            errors: ErrorDetails {
                error_code: Some(code),
                message: Some(message.into()),
                extra: serde_json::Map::new(),
            },
        }
    }

    /// The structured error code, if the server sent one.
    pub fn code(&self) -> Option<ErrorCode> {
        self.errors.error_code
    }

    /// Domain of the error code ([`ErrorDomain::Other`] when absent).
    pub fn domain(&self) -> ErrorDomain {
        self.code().map_or(ErrorDomain::Other, ErrorCode::domain)
    }

    /// The server's message, falling back to the code's description.
    pub fn message(&self) -> &str {
        match (&self.errors.message, self.code()) {
            (Some(message), _) => message,
            (None, Some(code)) => code.description(),
            (None, None) => "unknown server error",
        }
    }

    /// Message suitable for showing to a player, chosen by error code.
    pub fn user_message(&self) -> &'static str {
        self.code().unwrap_or(ErrorCode::Unknown(0)).description()
    }

    /// An extra field attached by the server.
    pub fn extra(&self, key: &str) -> Option<&Value> {
        self.errors.extra.get(key)
    }
}

// ── Outbound operations ─────────────────────────────────────────────

/// Operations the client invokes on the hub.
///
/// Each variant maps to a hub method name ([`target`](Self::target)) and an
/// ordered argument list ([`arguments`](Self::arguments)).
#[derive(Debug, Clone, PartialEq)]
pub enum ClientOperation {
    CreateRoom {
        room_name: String,
        player_id: String,
        host_name: String,
        password: String,
        age_group: AgeGroup,
        mode: GameMode,
        max_players: u32,
    },
    JoinRoom {
        room_id: String,
        player_id: String,
        player_name: String,
        password: String,
    },
    ChangePlayerName {
        room_id: String,
        player_id: String,
        new_name: String,
    },
    StartGame {
        room_id: String,
        player_id: String,
    },
    GetRandomQuestionForRoom {
        room_id: String,
        player_id: String,
        question_type: QuestionType,
    },
    NextPlayer {
        room_id: String,
        player_id: String,
    },
    EndGame {
        room_id: String,
        player_id: String,
    },
    ResetGame {
        room_id: String,
        player_id: String,
    },
    LeaveRoom {
        room_id: String,
        player_id: String,
    },
    ReconnectPlayer {
        room_id: String,
        player_id: String,
        player_name: String,
    },
    SendMessage {
        room_id: String,
        message: String,
    },
}

impl ClientOperation {
    /// Hub method name.
    pub fn target(&self) -> &'static str {
        match self {
            Self::CreateRoom { .. } => "CreateRoom",
            Self::JoinRoom { .. } => "JoinRoom",
            Self::ChangePlayerName { .. } => "ChangePlayerName",
            Self::StartGame { .. } => "StartGame",
            Self::GetRandomQuestionForRoom { .. } => "GetRandomQuestionForRoom",
            Self::NextPlayer { .. } => "NextPlayer",
            Self::EndGame { .. } => "EndGame",
            Self::ResetGame { .. } => "ResetGame",
            Self::LeaveRoom { .. } => "LeaveRoom",
            Self::ReconnectPlayer { .. } => "ReconnectPlayer",
            Self::SendMessage { .. } => "SendMessage",
        }
    }

    /// Positional arguments, in the order the hub method declares them.
    pub fn arguments(&self) -> Vec<Value> {
        match self {
            Self::CreateRoom {
                room_name,
                player_id,
                host_name,
                password,
                age_group,
                mode,
                max_players,
            } => vec![
                json!(room_name),
                json!(player_id),
                json!(host_name),
                json!(password),
                json!(age_group),
                json!(mode),
                json!(max_players),
            ],
            Self::JoinRoom {
                room_id,
                player_id,
                player_name,
                password,
            } => vec![
                json!(room_id),
                json!(player_id),
                json!(player_name),
                json!(password),
            ],
            Self::ChangePlayerName {
                room_id,
                player_id,
                new_name,
            } => vec![json!(room_id), json!(player_id), json!(new_name)],
            Self::GetRandomQuestionForRoom {
                room_id,
                player_id,
                question_type,
            } => vec![json!(room_id), json!(player_id), json!(question_type)],
            Self::StartGame { room_id, player_id }
            | Self::NextPlayer { room_id, player_id }
            | Self::EndGame { room_id, player_id }
            | Self::ResetGame { room_id, player_id }
            | Self::LeaveRoom { room_id, player_id } => vec![json!(room_id), json!(player_id)],
            Self::ReconnectPlayer {
                room_id,
                player_id,
                player_name,
            } => vec![json!(room_id), json!(player_id), json!(player_name)],
            Self::SendMessage { room_id, message } => vec![json!(room_id), json!(message)],
        }
    }

    /// Wrap this operation in a non-blocking hub invocation.
    pub fn to_hub_message(&self) -> HubMessage {
        HubMessage::Invocation {
            target: self.target().to_string(),
            arguments: self.arguments(),
        }
    }
}

// ── Hub framing ─────────────────────────────────────────────────────

const INVOCATION: u8 = 1;
const COMPLETION: u8 = 3;
const PING: u8 = 6;
const CLOSE: u8 = 7;

/// One record of the JSON hub protocol.
#[derive(Debug, Clone, PartialEq)]
pub enum HubMessage {
    /// A method call: client → server for operations, server → client for events.
    Invocation {
        target: String,
        arguments: Vec<Value>,
    },
    /// Result of a blocking invocation. This client never issues those, so
    /// completions are only logged.
    Completion {
        invocation_id: String,
        error: Option<String>,
    },
    /// Keep-alive.
    Ping,
    /// The peer is closing the connection.
    Close {
        error: Option<String>,
        allow_reconnect: bool,
    },
    /// A record type this client ignores (stream items, acks, ...).
    Other(u8),
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawHubMessage {
    #[serde(rename = "type")]
    kind: u8,
    #[serde(default)]
    target: Option<String>,
    #[serde(default)]
    arguments: Vec<Value>,
    #[serde(default)]
    invocation_id: Option<String>,
    #[serde(default)]
    error: Option<String>,
    #[serde(default)]
    allow_reconnect: Option<bool>,
}

impl HubMessage {
    /// Parse a single record (without its trailing separator).
    ///
    /// # Errors
    ///
    /// Returns [`TruthOrDareError::Serialization`](crate::TruthOrDareError::Serialization)
    /// if the record is not valid JSON or lacks a field its type requires.
    pub fn parse(record: &str) -> Result<Self> {
        let raw: RawHubMessage = serde_json::from_str(record)?;
        let message = match raw.kind {
            INVOCATION => Self::Invocation {
                target: raw
                    .target
                    .ok_or_else(|| serde_json::Error::missing_field("target"))?,
                arguments: raw.arguments,
            },
            COMPLETION => Self::Completion {
                invocation_id: raw.invocation_id.unwrap_or_default(),
                error: raw.error,
            },
            PING => Self::Ping,
            CLOSE => Self::Close {
                error: raw.error,
                allow_reconnect: raw.allow_reconnect.unwrap_or(false),
            },
            other => Self::Other(other),
        };
        Ok(message)
    }

    /// Serialize into a wire record, including the trailing separator.
    ///
    /// # Errors
    ///
    /// Returns [`TruthOrDareError::Serialization`](crate::TruthOrDareError::Serialization)
    /// if an argument cannot be serialized.
    pub fn to_frame(&self) -> Result<String> {
        let value = match self {
            Self::Invocation { target, arguments } => json!({
                "type": INVOCATION,
                "target": target,
                "arguments": arguments,
            }),
            Self::Completion {
                invocation_id,
                error,
            } => {
                let mut value = json!({ "type": COMPLETION, "invocationId": invocation_id });
                if let (Some(error), Some(map)) = (error, value.as_object_mut()) {
                    map.insert("error".into(), json!(error));
                }
                value
            }
            Self::Ping => json!({ "type": PING }),
            Self::Close {
                error,
                allow_reconnect,
            } => {
                let mut value = json!({ "type": CLOSE, "allowReconnect": allow_reconnect });
                if let (Some(error), Some(map)) = (error, value.as_object_mut()) {
                    map.insert("error".into(), json!(error));
                }
                value
            }
            Self::Other(kind) => json!({ "type": kind }),
        };
        let mut frame = serde_json::to_string(&value)?;
        frame.push(RECORD_SEPARATOR);
        Ok(frame)
    }
}

/// Split a text frame into its non-empty records.
pub fn split_records(text: &str) -> impl Iterator<Item = &str> {
    text.split(RECORD_SEPARATOR)
        .filter(|record| !record.trim().is_empty())
}

/// The handshake record the client sends right after the transport opens.
pub fn handshake_request() -> String {
    let handshake = json!({ "protocol": HUB_PROTOCOL, "version": HUB_PROTOCOL_VERSION });
    format!("{handshake}{RECORD_SEPARATOR}")
}

/// The server's answer to the handshake request.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct HandshakeResponse {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl HandshakeResponse {
    /// Parse the handshake record.
    ///
    /// # Errors
    ///
    /// Returns [`TruthOrDareError::Serialization`](crate::TruthOrDareError::Serialization)
    /// if the record is not a JSON object.
    pub fn parse(record: &str) -> Result<Self> {
        Ok(serde_json::from_str(record)?)
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
    fn create_room_arguments_are_positional() {
        let op = ClientOperation::CreateRoom {
            room_name: "Friday".into(),
            player_id: "p-1".into(),
            host_name: "Alice".into(),
            password: String::new(),
            age_group: AgeGroup::Adult,
            mode: GameMode::Couples,
            max_players: 6,
        };
        assert_eq!(op.target(), "CreateRoom");
        assert_eq!(
            op.arguments(),
            vec![
                json!("Friday"),
                json!("p-1"),
                json!("Alice"),
                json!(""),
                json!("adult"),
                json!("couples"),
                json!(6)
            ]
        );
    }

    #[test]
    fn invocation_frame_ends_with_separator() {
        let op = ClientOperation::StartGame {
            room_id: "r-1".into(),
            player_id: "p-1".into(),
        };
        let frame = op.to_hub_message().to_frame().unwrap();
        assert!(frame.ends_with(RECORD_SEPARATOR));
        let record = split_records(&frame).next().unwrap();
        let value: Value = serde_json::from_str(record).unwrap();
        assert_eq!(value["type"], 1);
        assert_eq!(value["target"], "StartGame");
        assert_eq!(value["arguments"], json!(["r-1", "p-1"]));
    }

    #[test]
    fn split_records_handles_batched_frames() {
        let text =
            "{\"type\":6}\u{1e}{\"type\":1,\"target\":\"PlayerLeft\",\"arguments\":[]}\u{1e}";
        let records: Vec<_> = split_records(text).collect();
        assert_eq!(records.len(), 2);
        assert_eq!(HubMessage::parse(records[0]).unwrap(), HubMessage::Ping);
        assert!(matches!(
            HubMessage::parse(records[1]).unwrap(),
            HubMessage::Invocation { ref target, .. } if target == "PlayerLeft"
        ));
    }

    #[test]
    fn invocation_without_target_is_rejected() {
        assert!(HubMessage::parse(r#"{"type":1,"arguments":[]}"#).is_err());
    }

    #[test]
    fn close_defaults_to_no_reconnect() {
        let msg = HubMessage::parse(r#"{"type":7,"error":"bye"}"#).unwrap();
        assert_eq!(
            msg,
            HubMessage::Close {
                error: Some("bye".into()),
                allow_reconnect: false
            }
        );
    }

    #[test]
    fn unknown_record_types_are_kept_as_other() {
        assert_eq!(
            HubMessage::parse(r#"{"type":2,"item":1}"#).unwrap(),
            HubMessage::Other(2)
        );
    }

    #[test]
    fn handshake_request_and_response() {
        let request = handshake_request();
        let record = split_records(&request).next().unwrap();
        let value: Value = serde_json::from_str(record).unwrap();
        assert_eq!(value, json!({ "protocol": "json", "version": 1 }));

        assert_eq!(HandshakeResponse::parse("{}").unwrap().error, None);
        assert_eq!(
            HandshakeResponse::parse(r#"{"error":"unsupported"}"#)
                .unwrap()
                .error
                .as_deref(),
            Some("unsupported")
        );
    }

    #[test]
    fn question_accepts_both_server_shapes() {
        let short: Question =
            serde_json::from_str(r#"{"id":"q1","text":"Sing","type":"dare"}"#).unwrap();
        let long: Question = serde_json::from_str(
            r#"{"questionId":"q1","questionText":"Sing","questionType":"dare"}"#,
        )
        .unwrap();
        assert_eq!(short, long);
        assert_eq!(short.question_type, QuestionType::Dare);

        let untyped: Question = serde_json::from_str(r#"{"questionText":"Why?"}"#).unwrap();
        assert_eq!(untyped.question_type, QuestionType::Truth);
    }

    #[test]
    fn reconnect_result_accepts_string_or_object() {
        let full: ReconnectResult = serde_json::from_value(
            json!({ "roomStatus": "Playing", "currentPlayerId": "p-2", "message": "ok" }),
        )
        .unwrap();
        assert_eq!(full.room_status, Some(RoomStatus::Playing));
        assert_eq!(full.current_player_id.as_deref(), Some("p-2"));

        let empty_turn: ReconnectResult =
            serde_json::from_value(json!({ "roomStatus": "Waiting", "currentPlayerId": "" }))
                .unwrap();
        assert_eq!(empty_turn.current_player_id, None);

        let bare: ReconnectResult = serde_json::from_value(json!("welcome back")).unwrap();
        assert_eq!(bare.message.as_deref(), Some("welcome back"));
        assert_eq!(bare.room_status, None);
    }

    #[test]
    fn error_envelope_keeps_extra_fields() {
        let envelope: ErrorEnvelope = serde_json::from_value(json!({
            "statusCode": 400,
            "errors": { "errorCode": 1016, "message": "Not your turn", "roomId": "r-1" }
        }))
        .unwrap();
        assert_eq!(envelope.status_code, Some(400));
        assert_eq!(envelope.code(), Some(ErrorCode::NotYourTurn));
        assert_eq!(envelope.domain(), ErrorDomain::Room);
        assert_eq!(envelope.message(), "Not your turn");
        assert_eq!(envelope.extra("roomId"), Some(&json!("r-1")));
        assert_eq!(
            envelope.user_message(),
            ErrorCode::NotYourTurn.description()
        );
    }

    #[test]
    fn error_envelope_message_falls_back_to_code() {
        let envelope: ErrorEnvelope =
            serde_json::from_value(json!({ "errors": { "errorCode": 2004 } })).unwrap();
        assert_eq!(
            envelope.message(),
            ErrorCode::PlayerNameExists.description()
        );
        assert_eq!(envelope.domain(), ErrorDomain::Player);
    }

    #[test]
    fn acknowledgement_message_from_string_or_object() {
        assert_eq!(Acknowledgement(json!("done")).message(), Some("done"));
        assert_eq!(
            Acknowledgement(json!({ "message": "joined" })).message(),
            Some("joined")
        );
        assert_eq!(Acknowledgement(json!(42)).message(), None);
    }

    #[test]
    fn chat_message_from_text_or_object() {
        let text: ChatMessage = serde_json::from_value(json!("hi all")).unwrap();
        assert_eq!(text.message, "hi all");
        assert!(text.player_name.is_none());

        let full: ChatMessage = serde_json::from_value(json!({
            "message": "hello", "playerId": "p-1", "playerName": "Alice", "messTime": "12:00"
        }))
        .unwrap();
        assert_eq!(full.player_name.as_deref(), Some("Alice"));
        assert_eq!(full.sent_at.as_deref(), Some("12:00"));
    }
}
