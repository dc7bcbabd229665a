//! Numeric error codes carried by `OperationFailed` envelopes.
//!
//! The hub partitions its codes by domain: room errors live in the `10xx`
//! range and player errors in the `20xx` range. Codes this client does not
//! know are preserved as [`ErrorCode::Unknown`] so they survive a round trip.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Domain an [`ErrorCode`] belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorDomain {
    /// `10xx` codes: room lifecycle, turns and questions.
    Room,
    /// `20xx` codes: player naming and membership.
    Player,
    /// Anything outside the known ranges.
    Other,
}

impl ErrorDomain {
    /// Classify a raw numeric code by range.
    pub fn of(code: u16) -> Self {
        match code {
            1000..=1999 => Self::Room,
            2000..=2999 => Self::Player,
            _ => Self::Other,
        }
    }
}

/// Structured error codes returned by the hub.
///
/// Serialized as the bare number the server sends (e.g. `1003`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "u16", into = "u16")]
pub enum ErrorCode {
    // Room errors
    RoomPasswordIsWrong,
    RoomAlreadyExists,
    RoomIdIsRequired,
    RoomIdNotFound,
    RoomPasswordRequired,
    RoomRequiredHost,
    RoomModeInvalid,
    GameMustBePlaying,
    PlayerNotInRoom,
    QuestionTypeWrong,
    RoomEndStatusInvalid,
    RoomResetStatusInvalid,
    RoomAgeGroupInvalid,
    RoomNameRequired,
    RoomStartStatusInvalid,
    NotYourTurn,
    NextPlayerRejected,
    NoTurnTimestamp,
    TurnTooFast,
    RoomFull,
    RoomAlreadyStarted,

    // Player errors
    PlayerNameTooLong,
    PlayerLimitReached,
    PlayerIdNotFound,
    PlayerNameExists,
    PlayerNameRequired,

    /// A code this client has no entry for.
    Unknown(u16),
}

impl ErrorCode {
    /// Numeric wire value of this code.
    pub fn as_u16(self) -> u16 {
        match self {
            Self::RoomPasswordIsWrong => 1000,
            Self::RoomAlreadyExists => 1001,
            Self::RoomIdIsRequired => 1002,
            Self::RoomIdNotFound => 1003,
            Self::RoomPasswordRequired => 1004,
            Self::RoomRequiredHost => 1006,
            Self::RoomModeInvalid => 1007,
            Self::GameMustBePlaying => 1008,
            Self::PlayerNotInRoom => 1009,
            Self::QuestionTypeWrong => 1010,
            Self::RoomEndStatusInvalid => 1011,
            Self::RoomResetStatusInvalid => 1012,
            Self::RoomAgeGroupInvalid => 1013,
            Self::RoomNameRequired => 1014,
            Self::RoomStartStatusInvalid => 1015,
            Self::NotYourTurn => 1016,
            Self::NextPlayerRejected => 1017,
            Self::NoTurnTimestamp => 1018,
            Self::TurnTooFast => 1019,
            Self::RoomFull => 1022,
            Self::RoomAlreadyStarted => 1023,
            Self::PlayerNameTooLong => 2001,
            Self::PlayerLimitReached => 2002,
            Self::PlayerIdNotFound => 2003,
            Self::PlayerNameExists => 2004,
            Self::PlayerNameRequired => 2005,
            Self::Unknown(code) => code,
        }
    }

    /// Domain of this code, derived from its numeric range.
    pub fn domain(self) -> ErrorDomain {
        ErrorDomain::of(self.as_u16())
    }

    /// Returns a human-readable, user-facing description of this error code.
    pub fn description(&self) -> &'static str {
        match self {
            // Room errors
            Self::RoomPasswordIsWrong => "The room password is wrong.",
            Self::RoomAlreadyExists => "A room with this name already exists.",
            Self::RoomIdIsRequired => "A room id is required.",
            Self::RoomIdNotFound => "The room could not be found. It may have been closed.",
            Self::RoomPasswordRequired => "This room is protected; a password is required.",
            Self::RoomRequiredHost => "Only the host can do that.",
            Self::RoomModeInvalid => "Invalid room mode. Use party, friends or couples.",
            Self::GameMustBePlaying => "The game must be in progress for this action.",
            Self::PlayerNotInRoom => "This player is not in the room.",
            Self::QuestionTypeWrong => "Invalid question type. Choose truth or dare.",
            Self::RoomEndStatusInvalid => "The game can only be ended while it is playing.",
            Self::RoomResetStatusInvalid => "The game can only be reset after it has ended.",
            Self::RoomAgeGroupInvalid => "Invalid age group. Use kids, teen, adult or all.",
            Self::RoomNameRequired => "A room name is required.",
            Self::RoomStartStatusInvalid => "The game has already started.",
            Self::NotYourTurn => "It is not your turn.",
            Self::NextPlayerRejected => {
                "Cannot pass the turn: either it is not your turn or no question was drawn yet."
            }
            Self::NoTurnTimestamp => "The turn has no start time; the turn cannot be advanced.",
            Self::TurnTooFast => "Please wait a moment before passing the turn.",
            Self::RoomFull => "The room is full.",
            Self::RoomAlreadyStarted => "The game in this room has already started.",

            // Player errors
            Self::PlayerNameTooLong => "The player name is too long.",
            Self::PlayerLimitReached => "The room has reached its player limit.",
            Self::PlayerIdNotFound => "The player could not be found.",
            Self::PlayerNameExists => "That player name is already taken in this room.",
            Self::PlayerNameRequired => "A player name is required.",

            Self::Unknown(_) => "The server could not complete the operation.",
        }
    }
}

impl From<u16> for ErrorCode {
    fn from(code: u16) -> Self {
        match code {
            1000 => Self::RoomPasswordIsWrong,
            1001 => Self::RoomAlreadyExists,
            1002 => Self::RoomIdIsRequired,
            1003 => Self::RoomIdNotFound,
            1004 => Self::RoomPasswordRequired,
            1006 => Self::RoomRequiredHost,
            1007 => Self::RoomModeInvalid,
            1008 => Self::GameMustBePlaying,
            1009 => Self::PlayerNotInRoom,
            1010 => Self::QuestionTypeWrong,
            1011 => Self::RoomEndStatusInvalid,
            1012 => Self::RoomResetStatusInvalid,
            1013 => Self::RoomAgeGroupInvalid,
            1014 => Self::RoomNameRequired,
            1015 => Self::RoomStartStatusInvalid,
            1016 => Self::NotYourTurn,
            1017 => Self::NextPlayerRejected,
            1018 => Self::NoTurnTimestamp,
            1019 => Self::TurnTooFast,
            1022 => Self::RoomFull,
            1023 => Self::RoomAlreadyStarted,
            2001 => Self::PlayerNameTooLong,
            2002 => Self::PlayerLimitReached,
            2003 => Self::PlayerIdNotFound,
            2004 => Self::PlayerNameExists,
            2005 => Self::PlayerNameRequired,
            other => Self::Unknown(other),
        }
    }
}

impl From<ErrorCode> for u16 {
    fn from(code: ErrorCode) -> Self {
        code.as_u16()
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.description(), self.as_u16())
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
    fn every_known_code_maps_back_to_itself() {
        let known = (1000u16..=1030).chain(2000..=2010);
        for raw in known {
            let code = ErrorCode::from(raw);
            assert_eq!(code.as_u16(), raw, "code {raw} did not survive conversion");
        }
    }

    #[test]
    fn domains_follow_numeric_ranges() {
        assert_eq!(ErrorCode::RoomFull.domain(), ErrorDomain::Room);
        assert_eq!(ErrorCode::NotYourTurn.domain(), ErrorDomain::Room);
        assert_eq!(ErrorCode::PlayerNameExists.domain(), ErrorDomain::Player);
        assert_eq!(ErrorCode::Unknown(2999).domain(), ErrorDomain::Player);
        assert_eq!(ErrorCode::Unknown(500).domain(), ErrorDomain::Other);
    }

    #[test]
    fn serializes_as_bare_number() {
        let json = serde_json::to_string(&ErrorCode::RoomIdNotFound).unwrap();
        assert_eq!(json, "1003");
        let parsed: ErrorCode = serde_json::from_str("2004").unwrap();
        assert_eq!(parsed, ErrorCode::PlayerNameExists);
        let unknown: ErrorCode = serde_json::from_str("1005").unwrap();
        assert_eq!(unknown, ErrorCode::Unknown(1005));
        assert_eq!(serde_json::to_string(&unknown).unwrap(), "1005");
    }

    #[test]
    fn display_includes_code() {
        let text = ErrorCode::RoomFull.to_string();
        assert!(text.contains("1022"));
        assert!(text.contains("full"));
    }
}
