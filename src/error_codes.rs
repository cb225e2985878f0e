//! Error codes for structured error handling in the Galinheiro backend.
//!
//! These codes are wire-compatible with the codes raised by the stored
//! procedures (`join_room`, `start_game`, ...) and serialize using
//! `SCREAMING_SNAKE_CASE` (e.g. `"ROOM_NOT_IN_LOBBY"`).

use serde::{Deserialize, Serialize};
use std::fmt;

/// Structured error codes returned by the backend or by local guards.
///
/// Use [`description()`](ErrorCode::description) for a human-readable explanation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    // Room errors
    InvalidRoomCode,
    RoomNotFound,
    RoomNotInLobby,
    NotInRoom,
    NotHost,

    // Session errors
    SessionNotFound,
    SessionNotActive,
    RoundNotFound,

    // Answer errors
    AlreadyAnswered,
    SpectatorCannotAnswer,
    InvalidOption,
    RoundClosed,

    // Chat errors
    EmptyMessage,
    MessageTooLong,
    MessageNotFound,

    // Identity errors
    InvalidDisplayName,
    Unauthorized,

    // Server errors
    InternalError,
    StorageError,
    ServiceUnavailable,
}

impl ErrorCode {
    /// Returns a human-readable description of this error code.
    ///
    /// These strings are suitable for toasts shown to the active user.
    pub fn description(&self) -> &'static str {
        match self {
            Self::InvalidRoomCode => {
                "Room codes have exactly 6 letters or digits. Check the code and try again."
            }
            Self::RoomNotFound => {
                "The room could not be found. It may have been closed or the code is incorrect."
            }
            Self::RoomNotInLobby => {
                "The room is not accepting players right now."
            }
            Self::NotInRoom => "You are not a participant of this room.",
            Self::NotHost => "Only the host of the room can do this.",

            Self::SessionNotFound => "This game session does not exist.",
            Self::SessionNotActive => "This game session has already ended.",
            Self::RoundNotFound => "The requested round is not available.",

            Self::AlreadyAnswered => "You already answered this round.",
            Self::SpectatorCannotAnswer => {
                "You joined while a round was running. You may answer next round."
            }
            Self::InvalidOption => "That answer option does not exist.",
            Self::RoundClosed => "Time is up for this round.",

            Self::EmptyMessage => "Messages cannot be empty.",
            Self::MessageTooLong => "Messages are limited to 300 characters.",
            Self::MessageNotFound => "The message no longer exists.",

            Self::InvalidDisplayName => "Pick a display name before joining.",
            Self::Unauthorized => "You are not allowed to do this.",

            Self::InternalError => {
                "Something went wrong on our side. Please try again in a moment."
            }
            Self::StorageError => "Saving failed. Please try again later.",
            Self::ServiceUnavailable => {
                "The service is temporarily unavailable. Please try again in a few moments."
            }
        }
    }

    /// Whether this code should send the user back to the home screen.
    ///
    /// Room-level failures leave nothing to show on the current screen; the
    /// remaining codes keep the user where they are.
    pub fn redirects_home(&self) -> bool {
        matches!(
            self,
            Self::InvalidRoomCode | Self::RoomNotFound | Self::RoomNotInLobby | Self::NotInRoom
        )
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.description())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn serializes_screaming_snake_case() {
        let json = serde_json::to_string(&ErrorCode::RoomNotInLobby).unwrap();
        assert_eq!(json, "\"ROOM_NOT_IN_LOBBY\"");
        let code: ErrorCode = serde_json::from_str("\"NOT_HOST\"").unwrap();
        assert_eq!(code, ErrorCode::NotHost);
    }

    #[test]
    fn room_errors_redirect_home() {
        assert!(ErrorCode::RoomNotInLobby.redirects_home());
        assert!(!ErrorCode::NotHost.redirects_home());
        assert!(!ErrorCode::AlreadyAnswered.redirects_home());
    }
}
