//! Room and turn state projected from server events.
//!
//! [`RoomStore`] holds the client's view of the current room as a
//! [`RoomSnapshot`] behind a `watch` channel. The snapshot changes only in
//! response to inbound events (plus explicit seeding from an initial room
//! fetch); outgoing operations never touch it optimistically.
//!
//! The current turn must always name a roster member. An event that would
//! point the turn at an unknown player is not applied to the turn; instead an
//! [`Inconsistency`] is recorded and logged.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex, PoisonError};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::watch;
use tracing::{debug, warn};

use crate::event::{EventKind, ServerEvent};
use crate::manager::SessionSubscriber;
use crate::protocol::{
    ErrorEnvelope, GameSummary, Player, PlayerArrival, PlayerDeparture, Question, QuestionType,
    RoomStatus,
};
use crate::session::HubSession;

const SYSTEM: &str = "System";
const ERROR: &str = "Error";
const LAST_QUESTION_NOTE: &str = "This is the last question. The host can end the game after it.";

/// The question currently on the table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InFlightQuestion {
    pub question_id: Option<String>,
    pub question_type: QuestionType,
    pub text: String,
    pub is_last_question: bool,
}

impl From<&Question> for InFlightQuestion {
    fn from(question: &Question) -> Self {
        Self {
            question_id: question.question_id.clone().filter(|id| !id.is_empty()),
            question_type: question.question_type,
            text: question.question_text.clone(),
            is_last_question: question.is_last_question,
        }
    }
}

/// The client's view of its room.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RoomSnapshot {
    pub room_id: Option<String>,
    pub room_name: Option<String>,
    /// Whether the local player hosts the room.
    pub is_host: bool,
    pub players: Vec<Player>,
    pub status: RoomStatus,
    /// Player id whose turn it is. Always a member of `players` when set.
    pub current_turn: Option<String>,
    pub current_player_name: Option<String>,
    pub question: Option<InFlightQuestion>,
    /// The last question of the game was assigned; the host may end the game.
    pub end_of_game_pending: bool,
    /// Summary of the finished game.
    pub summary: Option<GameSummary>,
}

impl RoomSnapshot {
    /// Roster entry for `player_id`.
    pub fn player(&self, player_id: &str) -> Option<&Player> {
        self.players.iter().find(|p| p.player_id == player_id)
    }

    /// Roster entry of the player whose turn it is.
    pub fn current_player(&self) -> Option<&Player> {
        self.current_turn.as_deref().and_then(|id| self.player(id))
    }

    /// Whether it is `player_id`'s turn.
    pub fn is_turn_of(&self, player_id: &str) -> bool {
        self.current_turn.as_deref() == Some(player_id)
    }

    /// The host, as listed in the roster.
    pub fn host(&self) -> Option<&Player> {
        self.players.iter().find(|p| p.is_host)
    }

    fn clear_turn(&mut self) {
        self.current_turn = None;
        self.current_player_name = None;
        self.question = None;
    }

    fn back_to_waiting(&mut self) {
        self.status = RoomStatus::Waiting;
        self.clear_turn();
        self.end_of_game_pending = false;
        self.summary = None;
    }
}

/// One line of the room journal.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JournalEntry {
    pub sender: String,
    pub text: String,
    pub at: DateTime<Utc>,
}

/// A projection rule that an event would have broken.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Inconsistency {
    /// An event named a turn player who is not in the roster. The turn was left unchanged.
    UnknownTurnPlayer { player_id: String, event: EventKind },
    /// A roster change removed the player whose turn it was. The turn was cleared.
    TurnPlayerLeft { player_id: String },
}

/// Side effects of reducing one event, applied after the snapshot is updated.
#[derive(Default)]
struct Effects {
    journal: Vec<(&'static str, String)>,
    inconsistencies: Vec<Inconsistency>,
    error: Option<ErrorEnvelope>,
}

impl Effects {
    fn note(&mut self, sender: &'static str, text: impl Into<String>) {
        self.journal.push((sender, text.into()));
    }
}

/// Point the turn at `player_id` if the roster knows them.
fn assign_turn(
    snap: &mut RoomSnapshot,
    effects: &mut Effects,
    player_id: &str,
    name: Option<&str>,
    event: EventKind,
) {
    let Some(player) = snap.player(player_id) else {
        effects.inconsistencies.push(Inconsistency::UnknownTurnPlayer {
            player_id: player_id.to_string(),
            event,
        });
        return;
    };
    let roster_name = player.player_name.clone();
    snap.current_turn = Some(player_id.to_string());
    snap.current_player_name = Some(
        name.filter(|n| !n.is_empty())
            .map_or(roster_name, str::to_string),
    );
}

/// Clear the turn if the roster no longer holds the turn player.
fn check_turn_after_roster_change(snap: &mut RoomSnapshot, effects: &mut Effects) {
    let Some(turn) = snap.current_turn.clone() else {
        return;
    };
    if snap.player(&turn).is_none() {
        snap.clear_turn();
        effects
            .inconsistencies
            .push(Inconsistency::TurnPlayerLeft { player_id: turn });
    }
}

fn replace_roster(snap: &mut RoomSnapshot, effects: &mut Effects, players: Vec<Player>) {
    snap.players = players;
    check_turn_after_roster_change(snap, effects);
}

fn ack_text(event: &ServerEvent) -> String {
    let message = match event {
        ServerEvent::JoinRoomSuccess(ack)
        | ServerEvent::ChangePlayerNameSuccess(ack)
        | ServerEvent::StartGameSuccess(ack)
        | ServerEvent::NextPlayerSuccess(ack)
        | ServerEvent::EndGameSuccess(ack)
        | ServerEvent::ResetGameSuccess(ack)
        | ServerEvent::LeaveRoomSuccess(ack)
        | ServerEvent::PlayerReconnected(ack) => ack.message().map(str::to_string),
        _ => None,
    };
    match message {
        Some(message) => format!("{}: {message}", event.kind()),
        None => event.kind().to_string(),
    }
}

/// Apply `event` to `snap`. Pure apart from the returned effects.
fn reduce(snap: &mut RoomSnapshot, event: &ServerEvent) -> Effects {
    let mut fx = Effects::default();
    match event {
        ServerEvent::CreateRoomSuccess(result) => {
            snap.room_id = Some(result.room_id.clone());
            snap.is_host = true;
            fx.note(SYSTEM, format!("Room created (id {})", result.room_id));
        }
        ServerEvent::PlayerJoined(arrival) => {
            if let PlayerArrival::Player(player) = arrival {
                match snap
                    .players
                    .iter_mut()
                    .find(|p| p.player_id == player.player_id)
                {
                    Some(existing) => *existing = player.clone(),
                    None => snap.players.push(player.clone()),
                }
            }
            fx.note(SYSTEM, format!("Player joined: {}", arrival.name()));
        }
        ServerEvent::PlayerLeft(departure) => {
            let name = match departure {
                Some(PlayerDeparture::Player(player)) => {
                    snap.players.retain(|p| p.player_id != player.player_id);
                    Some(player.player_name.clone())
                }
                Some(PlayerDeparture::Id { player_id }) => {
                    let name = snap.player(player_id).map(|p| p.player_name.clone());
                    snap.players.retain(|p| &p.player_id != player_id);
                    name.or_else(|| Some(player_id.clone()))
                }
                Some(PlayerDeparture::Name(name)) => {
                    snap.players.retain(|p| &p.player_name != name);
                    Some(name.clone())
                }
                None => None,
            };
            check_turn_after_roster_change(snap, &mut fx);
            let note = match name {
                Some(name) => format!("Player left: {name}"),
                None => "A player left".to_string(),
            };
            fx.note(SYSTEM, note);
        }
        ServerEvent::PlayerListUpdated(players) => {
            replace_roster(snap, &mut fx, players.clone());
            fx.note(SYSTEM, "Player list updated");
        }
        ServerEvent::GameStarted(started) => {
            snap.back_to_waiting();
            snap.status = RoomStatus::Playing;
            assign_turn(
                snap,
                &mut fx,
                &started.current_player_id,
                started.current_player_name.as_deref(),
                EventKind::GameStarted,
            );
            fx.note(
                SYSTEM,
                format!(
                    "Game started: {}",
                    started.message.as_deref().unwrap_or("good luck")
                ),
            );
        }
        ServerEvent::GetQuestionSuccess(question) => {
            snap.question = Some(InFlightQuestion::from(question));
            let text = &question.question_text;
            fx.note(SYSTEM, format!("Question received: {text}"));
        }
        ServerEvent::QuestionAssigned(assignment) => {
            snap.question = Some(InFlightQuestion::from(&assignment.question));
            if let Some(player_id) = assignment.player_id.as_deref().filter(|id| !id.is_empty()) {
                assign_turn(
                    snap,
                    &mut fx,
                    player_id,
                    assignment.player_name.as_deref(),
                    EventKind::QuestionAssigned,
                );
            }
            let who = assignment
                .player_name
                .as_deref()
                .or(snap.current_player_name.as_deref())
                .unwrap_or("the current player");
            let text = &assignment.question.question_text;
            fx.note(SYSTEM, format!("Question for {who}: {text}"));
            if assignment.question.is_last_question {
                snap.end_of_game_pending = true;
                fx.note(SYSTEM, LAST_QUESTION_NOTE);
            }
        }
        ServerEvent::NextPlayerTurn(turn) => {
            snap.question = None;
            assign_turn(
                snap,
                &mut fx,
                &turn.next_player_id,
                Some(turn.next_player_name.as_str()),
                EventKind::NextPlayerTurn,
            );
            let (name, id) = (&turn.next_player_name, &turn.next_player_id);
            fx.note(SYSTEM, format!("Next player turn: {name} ({id})"));
        }
        ServerEvent::NextPlayerSuccess(_) => {
            snap.question = None;
            fx.note(SYSTEM, ack_text(event));
        }
        ServerEvent::EndGameSuccess(_) => {
            snap.status = RoomStatus::Ended;
            snap.clear_turn();
            snap.end_of_game_pending = false;
            fx.note(SYSTEM, ack_text(event));
        }
        ServerEvent::GameEnded(summary) => {
            snap.status = RoomStatus::Ended;
            snap.clear_turn();
            snap.end_of_game_pending = false;
            snap.summary = Some(summary.clone());
            let message = summary.message.as_deref().unwrap_or("thanks for playing");
            fx.note(SYSTEM, format!("Game ended: {message}"));
            if summary.player_stats.is_some() {
                let total = summary
                    .total_questions
                    .map_or_else(|| "unknown".to_string(), |n| n.to_string());
                fx.note(SYSTEM, format!("Game summary: total questions {total}"));
            }
        }
        ServerEvent::ResetGameSuccess(_) => {
            snap.back_to_waiting();
            fx.note(SYSTEM, ack_text(event));
        }
        ServerEvent::GameReset(reset) => {
            snap.back_to_waiting();
            if !reset.players.is_empty() {
                snap.players = reset.players.clone();
            }
            let message = reset.message.as_deref().unwrap_or("back to the lobby");
            fx.note(SYSTEM, format!("Game reset: {message}"));
        }
        ServerEvent::LeaveRoomSuccess(_) => {
            *snap = RoomSnapshot::default();
            fx.note(SYSTEM, ack_text(event));
        }
        ServerEvent::ReconnectSuccess(result) => {
            snap.status = result.room_status.unwrap_or_default();
            snap.question = None;
            match result.current_player_id.as_deref() {
                Some(player_id) => {
                    assign_turn(snap, &mut fx, player_id, None, EventKind::ReconnectSuccess)
                }
                None => snap.clear_turn(),
            }
            let message = result.message.as_deref().unwrap_or("welcome back");
            fx.note(SYSTEM, format!("Reconnected: {message}"));
        }
        ServerEvent::ReceiveMessage(chat) => {
            let text = match &chat.player_name {
                Some(name) => format!("{name}: {}", chat.message),
                None => chat.message.clone(),
            };
            fx.note(SYSTEM, text);
        }
        ServerEvent::OperationFailed(envelope) => {
            let code = envelope
                .code()
                .map_or_else(|| "none".to_string(), |c| c.as_u16().to_string());
            let status = envelope
                .status_code
                .map_or_else(|| "none".to_string(), |s| s.to_string());
            fx.note(
                ERROR,
                format!(
                    "Operation failed: {} (code {code}, status {status})",
                    envelope.message()
                ),
            );
            fx.error = Some(envelope.clone());
        }
        ServerEvent::JoinRoomSuccess(_)
        | ServerEvent::ChangePlayerNameSuccess(_)
        | ServerEvent::StartGameSuccess(_)
        | ServerEvent::PlayerReconnected(_) => fx.note(SYSTEM, ack_text(event)),
    }
    fx
}

// ── Store ───────────────────────────────────────────────────────────

/// Projection of the current room, fed by session events.
pub struct RoomStore {
    snapshot: watch::Sender<RoomSnapshot>,
    last_error: watch::Sender<Option<ErrorEnvelope>>,
    journal: Mutex<VecDeque<JournalEntry>>,
    journal_capacity: usize,
    inconsistencies: Mutex<Vec<Inconsistency>>,
}

impl RoomStore {
    /// An empty store keeping at most `journal_capacity` journal lines.
    pub fn new(journal_capacity: usize) -> Self {
        let (snapshot, _) = watch::channel(RoomSnapshot::default());
        let (last_error, _) = watch::channel(None);
        Self {
            snapshot,
            last_error,
            journal: Mutex::new(VecDeque::new()),
            journal_capacity: journal_capacity.max(1),
            inconsistencies: Mutex::new(Vec::new()),
        }
    }

    /// Apply one inbound event.
    pub(crate) fn apply(&self, event: &ServerEvent) {
        let mut effects = Effects::default();
        self.snapshot.send_modify(|snap| effects = reduce(snap, event));
        debug!(event = %event.kind(), "room projection updated");
        self.record(effects);
    }

    fn record(&self, effects: Effects) {
        for inconsistency in &effects.inconsistencies {
            warn!(?inconsistency, "room projection inconsistency");
        }
        if !effects.inconsistencies.is_empty() {
            self.inconsistencies
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .extend(effects.inconsistencies);
        }
        if let Some(error) = effects.error {
            self.last_error.send_replace(Some(error));
        }
        if effects.journal.is_empty() {
            return;
        }
        let mut journal = self.journal.lock().unwrap_or_else(PoisonError::into_inner);
        for (sender, text) in effects.journal {
            if journal.len() == self.journal_capacity {
                journal.pop_front();
            }
            journal.push_back(JournalEntry {
                sender: sender.to_string(),
                text,
                at: Utc::now(),
            });
        }
    }

    /// Seed the roster from an initial room fetch.
    pub fn seed_roster(&self, players: Vec<Player>) {
        let mut effects = Effects::default();
        self.snapshot
            .send_modify(|snap| replace_roster(snap, &mut effects, players));
        self.record(effects);
    }

    /// Seed room identity and roster from an initial room fetch.
    pub fn enter_room(
        &self,
        room_id: impl Into<String>,
        room_name: impl Into<String>,
        is_host: bool,
        players: Vec<Player>,
    ) {
        let room_id = room_id.into();
        let room_name = room_name.into();
        let mut effects = Effects::default();
        self.snapshot.send_modify(|snap| {
            snap.room_id = Some(room_id);
            snap.room_name = Some(room_name);
            snap.is_host = is_host;
            replace_roster(snap, &mut effects, players);
        });
        self.record(effects);
    }

    /// Forget the room entirely.
    pub fn reset(&self) {
        self.snapshot.send_replace(RoomSnapshot::default());
        self.last_error.send_replace(None);
        self.journal
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
    }

    /// A copy of the current snapshot.
    pub fn snapshot(&self) -> RoomSnapshot {
        self.snapshot.borrow().clone()
    }

    /// Watch the snapshot.
    pub fn subscribe(&self) -> watch::Receiver<RoomSnapshot> {
        self.snapshot.subscribe()
    }

    /// Journal lines, oldest first.
    pub fn journal(&self) -> Vec<JournalEntry> {
        self.journal
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .cloned()
            .collect()
    }

    /// The latest server failure, if not yet taken.
    pub fn last_error(&self) -> Option<ErrorEnvelope> {
        self.last_error.borrow().clone()
    }

    /// Take the latest server failure, clearing it.
    pub fn take_error(&self) -> Option<ErrorEnvelope> {
        self.last_error.send_replace(None)
    }

    /// Watch server failures.
    pub fn subscribe_errors(&self) -> watch::Receiver<Option<ErrorEnvelope>> {
        self.last_error.subscribe()
    }

    /// Drain the recorded inconsistencies.
    pub fn take_inconsistencies(&self) -> Vec<Inconsistency> {
        std::mem::take(
            &mut *self
                .inconsistencies
                .lock()
                .unwrap_or_else(PoisonError::into_inner),
        )
    }
}

impl Default for RoomStore {
    fn default() -> Self {
        Self::new(200)
    }
}

impl std::fmt::Debug for RoomStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RoomStore")
            .field("snapshot", &*self.snapshot.borrow())
            .field("journal_capacity", &self.journal_capacity)
            .finish()
    }
}

impl SessionSubscriber for RoomStore {
    fn attach(self: Arc<Self>, session: &HubSession) {
        for &kind in EventKind::ALL {
            let store = Arc::clone(&self);
            session.on(kind, move |event| store.apply(event));
        }
        debug!(kinds = EventKind::ALL.len(), "room projection attached");
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
    use crate::error_codes::ErrorCode;
    use crate::protocol::{
        Acknowledgement, CreateRoomResult, GameResetPayload, GameStartedPayload,
        QuestionAssignment, ReconnectResult, TurnChange,
    };
    use serde_json::json;

    fn roster() -> Vec<Player> {
        vec![
            Player::new("p-1", "Alice").as_host(),
            Player::new("p-2", "Bob"),
            Player::new("p-3", "Cleo"),
        ]
    }

    fn seeded() -> RoomStore {
        let store = RoomStore::new(50);
        store.enter_room("r-1", "Friday", true, roster());
        store
    }

    fn started(store: &RoomStore, first: &str) {
        store.apply(&ServerEvent::GameStarted(GameStartedPayload {
            current_player_id: first.into(),
            current_player_name: None,
            message: None,
        }));
    }

    fn assignment(player_id: &str, text: &str, last: bool) -> ServerEvent {
        ServerEvent::QuestionAssigned(QuestionAssignment {
            player_id: Some(player_id.into()),
            player_name: None,
            question: Question {
                question_id: Some("q".into()),
                question_text: text.into(),
                question_type: QuestionType::Dare,
                is_last_question: last,
            },
        })
    }

    #[test]
    fn create_room_marks_host() {
        let store = RoomStore::default();
        store.apply(&ServerEvent::CreateRoomSuccess(CreateRoomResult {
            room_id: "r-9".into(),
            message: None,
        }));
        let snap = store.snapshot();
        assert_eq!(snap.room_id.as_deref(), Some("r-9"));
        assert!(snap.is_host);
    }

    #[test]
    fn game_flow_moves_turn_and_question() {
        let store = seeded();
        started(&store, "p-1");
        let snap = store.snapshot();
        assert_eq!(snap.status, RoomStatus::Playing);
        assert_eq!(snap.current_player_name.as_deref(), Some("Alice"));

        store.apply(&assignment("p-1", "Sing a song", false));
        assert_eq!(store.snapshot().question.unwrap().text, "Sing a song");

        store.apply(&ServerEvent::NextPlayerSuccess(Acknowledgement(json!("ok"))));
        assert!(store.snapshot().question.is_none());

        store.apply(&ServerEvent::NextPlayerTurn(TurnChange {
            next_player_id: "p-2".into(),
            next_player_name: "Bob".into(),
        }));
        let snap = store.snapshot();
        assert!(snap.is_turn_of("p-2"));
        assert_eq!(snap.current_player().unwrap().player_name, "Bob");
        assert!(store.take_inconsistencies().is_empty());
    }

    #[test]
    fn unknown_turn_player_is_flagged_not_applied() {
        let store = seeded();
        started(&store, "p-1");
        store.apply(&ServerEvent::NextPlayerTurn(TurnChange {
            next_player_id: "ghost".into(),
            next_player_name: "Ghost".into(),
        }));

        assert!(store.snapshot().is_turn_of("p-1"));
        assert_eq!(
            store.take_inconsistencies(),
            vec![Inconsistency::UnknownTurnPlayer {
                player_id: "ghost".into(),
                event: EventKind::NextPlayerTurn,
            }]
        );
        assert!(store.take_inconsistencies().is_empty());
    }

    #[test]
    fn roster_update_dropping_turn_player_clears_turn() {
        let store = seeded();
        started(&store, "p-2");
        store.apply(&ServerEvent::PlayerListUpdated(vec![
            Player::new("p-1", "Alice").as_host(),
            Player::new("p-3", "Cleo"),
        ]));
        let snap = store.snapshot();
        assert!(snap.current_turn.is_none());
        assert_eq!(snap.players.len(), 2);
        assert_eq!(
            store.take_inconsistencies(),
            vec![Inconsistency::TurnPlayerLeft {
                player_id: "p-2".into()
            }]
        );
    }

    #[test]
    fn player_left_by_id_removes_from_roster() {
        let store = seeded();
        store.apply(&ServerEvent::PlayerLeft(Some(PlayerDeparture::Id {
            player_id: "p-3".into(),
        })));
        assert!(store.snapshot().player("p-3").is_none());
        assert_eq!(store.journal().last().unwrap().text, "Player left: Cleo");
    }

    #[test]
    fn player_joined_is_idempotent() {
        let store = seeded();
        let dan = Player::new("p-4", "Dan");
        store.apply(&ServerEvent::PlayerJoined(PlayerArrival::Player(dan.clone())));
        store.apply(&ServerEvent::PlayerJoined(PlayerArrival::Player(dan)));
        store.apply(&ServerEvent::PlayerJoined(PlayerArrival::Name("Eve".into())));
        assert_eq!(store.snapshot().players.len(), 4);
    }

    #[test]
    fn last_question_then_game_end() {
        let store = seeded();
        started(&store, "p-1");
        store.apply(&assignment("p-1", "Final dare", true));
        assert!(store.snapshot().end_of_game_pending);

        store.apply(&ServerEvent::GameEnded(GameSummary {
            message: Some("done".into()),
            total_questions: Some(12),
            player_stats: Some(json!([])),
        }));
        let snap = store.snapshot();
        assert_eq!(snap.status, RoomStatus::Ended);
        assert!(snap.current_turn.is_none());
        assert!(snap.question.is_none());
        assert!(!snap.end_of_game_pending);
        assert_eq!(snap.summary.unwrap().total_questions, Some(12));
        assert!(store
            .journal()
            .iter()
            .any(|line| line.text.contains("total questions 12")));
    }

    #[test]
    fn game_reset_returns_to_waiting_and_replaces_roster() {
        let store = seeded();
        started(&store, "p-1");
        store.apply(&ServerEvent::GameReset(GameResetPayload {
            message: None,
            players: vec![Player::new("p-1", "Alice").as_host()],
        }));
        let snap = store.snapshot();
        assert_eq!(snap.status, RoomStatus::Waiting);
        assert!(snap.current_turn.is_none());
        assert_eq!(snap.players.len(), 1);
    }

    #[test]
    fn reconnect_reseeds_status_and_turn() {
        let store = seeded();
        store.apply(&ServerEvent::ReconnectSuccess(ReconnectResult {
            message: None,
            room_status: Some(RoomStatus::Playing),
            current_player_id: Some("p-3".into()),
        }));
        let snap = store.snapshot();
        assert_eq!(snap.status, RoomStatus::Playing);
        assert!(snap.is_turn_of("p-3"));

        store.apply(&ServerEvent::ReconnectSuccess(ReconnectResult::default()));
        let snap = store.snapshot();
        assert_eq!(snap.status, RoomStatus::Waiting);
        assert!(snap.current_turn.is_none());
    }

    #[test]
    fn operation_failed_sets_last_error() {
        let store = seeded();
        store.apply(&ServerEvent::OperationFailed(ErrorEnvelope::new(
            ErrorCode::NotYourTurn,
            "Not your turn",
        )));
        let line = store.journal().pop().unwrap();
        assert_eq!(line.sender, "Error");
        assert!(line.text.contains("1016"));

        let code = store.last_error().unwrap().code();
        assert_eq!(code, Some(ErrorCode::NotYourTurn));
        assert!(store.take_error().is_some());
        assert!(store.last_error().is_none());
    }

    #[test]
    fn journal_is_capped() {
        let store = RoomStore::new(3);
        for n in 0..5 {
            store.apply(&ServerEvent::ReceiveMessage(crate::protocol::ChatMessage {
                player_id: None,
                player_name: Some("Bob".into()),
                message: format!("line {n}"),
                sent_at: None,
            }));
        }
        let texts: Vec<_> = store.journal().into_iter().map(|e| e.text).collect();
        assert_eq!(texts, vec!["Bob: line 2", "Bob: line 3", "Bob: line 4"]);
    }

    #[test]
    fn leave_room_clears_snapshot() {
        let store = seeded();
        store.apply(&ServerEvent::LeaveRoomSuccess(Acknowledgement::default()));
        assert_eq!(store.snapshot(), RoomSnapshot::default());
    }
}
