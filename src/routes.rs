//! Navigation contract between the client flows and the UI shell.
//!
//! | Route          | Path                      |
//! |----------------|---------------------------|
//! | `Home`         | `/`                       |
//! | `Lobby`        | `/lobby/:code`            |
//! | `GameLobby`    | `/game/lobby/:code`       |
//! | `RoundLobby`   | `/round-lobby/:code`      |
//! | `Game`         | `/game/:code?sid=<uuid>`  |
//!
//! ```
//! use galinheiro_client::routes::Route;
//!
//! let route: Route = "/round-lobby/abc123".parse().unwrap();
//! assert_eq!(route.path(), "/round-lobby/ABC123");
//! ```

use std::fmt;
use std::str::FromStr;

use thiserror::Error;
use tracing::debug;

use crate::backend::Backend;
use crate::error::Result;
use crate::protocol::{GameSession, RoomCode, SessionId, SessionStatus};

/// A screen of the application.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Route {
    Home,
    Lobby(RoomCode),
    GameLobby(RoomCode),
    RoundLobby(RoomCode),
    Game {
        code: RoomCode,
        session_id: Option<SessionId>,
    },
}

impl Route {
    pub fn path(&self) -> String {
        match self {
            Self::Home => "/".into(),
            Self::Lobby(code) => format!("/lobby/{code}"),
            Self::GameLobby(code) => format!("/game/lobby/{code}"),
            Self::RoundLobby(code) => format!("/round-lobby/{code}"),
            Self::Game {
                code,
                session_id: Some(sid),
            } => format!("/game/{code}?sid={sid}"),
            Self::Game {
                code,
                session_id: None,
            } => format!("/game/{code}"),
        }
    }

    /// The room this route belongs to, if any.
    pub fn room_code(&self) -> Option<&RoomCode> {
        match self {
            Self::Home => None,
            Self::Lobby(code)
            | Self::GameLobby(code)
            | Self::RoundLobby(code)
            | Self::Game { code, .. } => Some(code),
        }
    }
}

impl fmt::Display for Route {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.path())
    }
}

/// A path that matches no [`Route`].
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ParseRouteError {
    #[error("unknown path: {0}")]
    UnknownPath(String),
    #[error("invalid room code in path: {0}")]
    InvalidRoomCode(String),
    #[error("invalid session id: {0}")]
    InvalidSessionId(String),
}

fn parse_code(raw: &str) -> std::result::Result<RoomCode, ParseRouteError> {
    raw.parse()
        .map_err(|_| ParseRouteError::InvalidRoomCode(raw.to_string()))
}

impl FromStr for Route {
    type Err = ParseRouteError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        let (path, query) = match s.split_once('?') {
            Some((path, query)) => (path, Some(query)),
            None => (s, None),
        };
        let segments: Vec<&str> = path.split('/').filter(|seg| !seg.is_empty()).collect();
        match segments.as_slice() {
            [] => Ok(Self::Home),
            ["lobby", code] => Ok(Self::Lobby(parse_code(code)?)),
            ["game", "lobby", code] => Ok(Self::GameLobby(parse_code(code)?)),
            ["round-lobby", code] => Ok(Self::RoundLobby(parse_code(code)?)),
            ["game", code] => {
                let session_id = query
                    .into_iter()
                    .flat_map(|q| q.split('&'))
                    .find_map(|pair| pair.strip_prefix("sid="))
                    .map(|sid| {
                        sid.parse()
                            .map_err(|_| ParseRouteError::InvalidSessionId(sid.to_string()))
                    })
                    .transpose()?;
                Ok(Self::Game {
                    code: parse_code(code)?,
                    session_id,
                })
            }
            _ => Err(ParseRouteError::UnknownPath(s.to_string())),
        }
    }
}

/// Outcome of the arena entry gate.
#[derive(Debug, Clone, PartialEq)]
pub enum ArenaEntry {
    /// The session exists, is active and belongs to the room.
    Enter(GameSession),
    /// Go elsewhere instead.
    Redirect(Route),
}

/// Decide whether `/game/:code?sid=...` may be entered.
///
/// An unknown room redirects home; a missing, unknown, inactive or foreign
/// session redirects to the room's lobby.
///
/// # Errors
///
/// Transient backend failures are returned as-is.
pub async fn check_arena_entry(
    backend: &dyn Backend,
    code: &RoomCode,
    session_id: Option<SessionId>,
) -> Result<ArenaEntry> {
    let Some(room) = backend.fetch_room(code).await? else {
        debug!(room_code = %code, "arena entry: unknown room");
        return Ok(ArenaEntry::Redirect(Route::Home));
    };
    let lobby = ArenaEntry::Redirect(Route::Lobby(code.clone()));
    let Some(session_id) = session_id else {
        return Ok(lobby);
    };
    match backend.fetch_session(session_id).await? {
        Some(session) if session.status == SessionStatus::Active && session.room_id == room.id => {
            Ok(ArenaEntry::Enter(session))
        }
        _ => {
            debug!(room_code = %code, session_id = %session_id, "arena entry: no active session");
            Ok(lobby)
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use uuid::Uuid;

    fn code() -> RoomCode {
        "ABC123".parse().unwrap()
    }

    #[test]
    fn paths_round_trip() {
        let sid = Uuid::new_v4();
        let routes = [
            Route::Home,
            Route::Lobby(code()),
            Route::GameLobby(code()),
            Route::RoundLobby(code()),
            Route::Game {
                code: code(),
                session_id: Some(sid),
            },
        ];
        for route in routes {
            assert_eq!(route.path().parse::<Route>().unwrap(), route);
        }
    }

    #[test]
    fn game_path_carries_session_query() {
        let sid = Uuid::new_v4();
        let route = Route::Game {
            code: code(),
            session_id: Some(sid),
        };
        assert_eq!(route.path(), format!("/game/ABC123?sid={sid}"));
    }

    #[test]
    fn rejects_unknown_and_malformed_paths() {
        assert!(matches!(
            "/settings".parse::<Route>(),
            Err(ParseRouteError::UnknownPath(_))
        ));
        assert!(matches!(
            "/lobby/AB".parse::<Route>(),
            Err(ParseRouteError::InvalidRoomCode(_))
        ));
        assert!(matches!(
            "/game/ABC123?sid=nope".parse::<Route>(),
            Err(ParseRouteError::InvalidSessionId(_))
        ));
    }
}
