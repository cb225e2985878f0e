//! Room lobby: joining, roster sync and host controls.
//!
//! The roster is never patched incrementally: any participant change
//! triggers a full reload ordered by `joined_at`. Room row updates replace
//! the cached room when they are newer than what was already applied.

use std::sync::Arc;

use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::backend::{Backend, JoinRequest, RoomPatch};
use crate::error::{GalinheiroError, Result};
use crate::error_codes::ErrorCode;
use crate::event::RealtimeEvent;
use crate::identity::Identity;
use crate::ingest::Ledger;
use crate::notice::Notice;
use crate::protocol::{
    room_topic, BroadcastEvent, Participant, ParticipantId, Room, RoomCode, RoomId, RoomStatus,
    RowChange, SessionId, Timestamp,
};
use crate::ranking::{rank, Standing};
use crate::routes::Route;

/// Why joining failed, and where to go instead.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JoinFailure {
    pub notice: Notice,
    pub redirect: Route,
}

impl From<GalinheiroError> for JoinFailure {
    fn from(err: GalinheiroError) -> Self {
        Self {
            notice: Notice::from(&err),
            redirect: Route::Home,
        }
    }
}

/// Music picked by the host, as announced over broadcast.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MusicChoice {
    pub genre: Option<(Uuid, String)>,
    pub album: Option<(Uuid, String)>,
    pub cover_url: Option<String>,
}

/// A joined room.
pub struct Lobby {
    backend: Arc<dyn Backend>,
    identity: Identity,
    participant_id: ParticipantId,
    room: Room,
    roster: Vec<Participant>,
    room_versions: Ledger<RoomId, Timestamp>,
    choice: MusicChoice,
}

impl std::fmt::Debug for Lobby {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Lobby")
            .field("room", &self.room.code)
            .field("status", &self.room.status)
            .field("participants", &self.roster.len())
            .finish()
    }
}

impl Lobby {
    /// Join the room named by `code` (case-insensitive).
    ///
    /// A player entering a room whose game is already running joins as a
    /// spectator; rejoining with the same client id reuses the existing row.
    ///
    /// # Errors
    ///
    /// Every failure comes back as a [`JoinFailure`] redirecting home.
    pub async fn join(
        backend: Arc<dyn Backend>,
        identity: Identity,
        code: &str,
    ) -> std::result::Result<Self, JoinFailure> {
        let code: RoomCode = code.parse()?;
        let room = backend
            .fetch_room(&code)
            .await?
            .ok_or_else(|| GalinheiroError::rejected(ErrorCode::RoomNotFound))?;
        if !room.status.is_joinable() {
            return Err(GalinheiroError::rejected(ErrorCode::RoomNotInLobby).into());
        }

        let existing = backend
            .fetch_participants(room.id)
            .await?
            .into_iter()
            .find(|p| p.client_id == identity.client_id);
        let is_spectator = match &existing {
            Some(row) => row.is_spectator,
            None => room.status.is_playing(),
        };

        let participant_id = backend
            .join_room(JoinRequest {
                room_code: code.clone(),
                display_name: identity.profile.display_name.clone(),
                avatar: identity.profile.avatar.clone(),
                client_id: identity.client_id,
                user_id: identity.user_id,
                is_spectator,
            })
            .await?;
        info!(room_code = %code, spectator = is_spectator, "joined room");

        let mut room_versions = Ledger::new();
        room_versions.offer(room.id, room.updated_at);
        let mut lobby = Self {
            backend,
            identity,
            participant_id,
            room,
            roster: Vec::new(),
            room_versions,
            choice: MusicChoice::default(),
        };
        lobby.reload().await?;
        Ok(lobby)
    }

    // ── Accessors ───────────────────────────────────────────────────

    pub fn room(&self) -> &Room {
        &self.room
    }

    pub fn code(&self) -> &RoomCode {
        &self.room.code
    }

    /// Realtime topic of this room.
    pub fn topic(&self) -> String {
        room_topic(&self.room.code)
    }

    pub fn identity(&self) -> &Identity {
        &self.identity
    }

    pub fn participant_id(&self) -> ParticipantId {
        self.participant_id
    }

    /// Participants ordered by `joined_at`.
    pub fn roster(&self) -> &[Participant] {
        &self.roster
    }

    /// The local player's row, once loaded.
    pub fn me(&self) -> Option<&Participant> {
        self.roster.iter().find(|p| p.id == self.participant_id)
    }

    pub fn is_host(&self) -> bool {
        self.identity.client_id == self.room.host_id
    }

    pub fn is_spectator(&self) -> bool {
        self.me().is_some_and(|p| p.is_spectator)
    }

    pub fn music_choice(&self) -> &MusicChoice {
        &self.choice
    }

    /// Round-lobby standings.
    pub fn standings(&self) -> Vec<Standing> {
        rank(&self.roster)
    }

    // ── Sync ────────────────────────────────────────────────────────

    /// Reload the roster from the backend.
    ///
    /// # Errors
    ///
    /// Backend failures; the cached roster is kept.
    pub async fn reload(&mut self) -> Result<()> {
        self.roster = self.backend.fetch_participants(self.room.id).await?;
        debug!(room_code = %self.room.code, participants = self.roster.len(), "roster reloaded");
        Ok(())
    }

    /// Re-read the room row as well as the roster.
    ///
    /// # Errors
    ///
    /// Backend failures, or `ROOM_NOT_FOUND` when the room is gone.
    pub async fn refresh(&mut self) -> Result<()> {
        let room = self
            .backend
            .fetch_room(&self.room.code)
            .await?
            .ok_or_else(|| GalinheiroError::rejected(ErrorCode::RoomNotFound))?;
        self.replace_room(room);
        self.reload().await
    }

    fn replace_room(&mut self, room: Room) -> bool {
        if room.id != self.room.id || !self.room_versions.offer(room.id, room.updated_at).is_fresh()
        {
            return false;
        }
        self.room = room;
        true
    }

    /// Apply a row change. Returns whether it concerned this room.
    ///
    /// # Errors
    ///
    /// Backend failures while reloading the roster.
    pub async fn apply_change(&mut self, change: &RowChange) -> Result<bool> {
        match change {
            RowChange::GameRooms { record, .. } if record.id == self.room.id => {
                self.replace_room(record.clone());
                Ok(true)
            }
            RowChange::RoomParticipants { record, .. } if record.room_id == self.room.id => {
                self.reload().await?;
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    /// Feed a realtime event; returns where to navigate, if anywhere.
    ///
    /// # Errors
    ///
    /// Backend failures while reloading the roster.
    pub async fn handle(&mut self, event: &RealtimeEvent) -> Result<Option<Route>> {
        if event.topic() != Some(self.topic().as_str()) {
            return Ok(None);
        }
        match event {
            RealtimeEvent::Change { change, .. } => {
                let before = self.room.status;
                self.apply_change(change).await?;
                if before == self.room.status {
                    return Ok(None);
                }
                Ok(self.route_for_status())
            }
            RealtimeEvent::Broadcast { event, .. } => self.apply_broadcast(event).await,
            _ => Ok(None),
        }
    }

    async fn apply_broadcast(&mut self, event: &BroadcastEvent) -> Result<Option<Route>> {
        match event {
            BroadcastEvent::GenreSelected {
                genre_id,
                genre_name,
            } => {
                self.choice.genre = Some((*genre_id, genre_name.clone()));
                self.choice.album = None;
                self.choice.cover_url = None;
            }
            BroadcastEvent::AlbumSelected {
                album_id,
                album_name,
                cover_url,
            } => {
                self.choice.album = Some((*album_id, album_name.clone()));
                self.choice.cover_url = cover_url.clone();
            }
            BroadcastEvent::PlayerLeft { display_name, .. } => {
                debug!(player = %display_name, "player left");
                self.reload().await?;
            }
            BroadcastEvent::NewRoundStarting {
                session_id,
                round_number: 1,
            } => {
                return Ok(Some(Route::Game {
                    code: self.room.code.clone(),
                    session_id: Some(*session_id),
                }));
            }
            BroadcastEvent::NewRoundStarting { .. }
            | BroadcastEvent::NewMessage(_)
            | BroadcastEvent::MessageReaction { .. } => {}
        }
        Ok(None)
    }

    fn route_for_status(&self) -> Option<Route> {
        let code = self.room.code.clone();
        match self.room.status {
            RoomStatus::InProgress => Some(Route::Game {
                code,
                session_id: self.room.session_id,
            }),
            RoomStatus::RoundLobby => Some(Route::RoundLobby(code)),
            RoomStatus::Completed => Some(Route::Home),
            RoomStatus::Lobby | RoomStatus::Waiting | RoomStatus::AlbumSelection => None,
        }
    }

    // ── Host controls ───────────────────────────────────────────────

    fn ensure_host(&self) -> Result<()> {
        if self.is_host() {
            Ok(())
        } else {
            Err(GalinheiroError::rejected(ErrorCode::NotHost))
        }
    }

    /// Pick a genre; returns the broadcast announcing it.
    ///
    /// # Errors
    ///
    /// `NOT_HOST`, or backend failures.
    pub async fn select_genre(&mut self, genre_id: Uuid, genre_name: &str) -> Result<BroadcastEvent> {
        self.ensure_host()?;
        let patch = RoomPatch {
            status: Some(RoomStatus::AlbumSelection),
            genre_id: Some(genre_id),
            album_id: None,
        };
        let room = self.backend.update_room(self.room.id, patch).await?;
        self.replace_room(room);
        self.choice.genre = Some((genre_id, genre_name.to_string()));
        Ok(BroadcastEvent::GenreSelected {
            genre_id,
            genre_name: genre_name.to_string(),
        })
    }

    /// Pick an album; returns the broadcast announcing it.
    ///
    /// # Errors
    ///
    /// `NOT_HOST`, or backend failures.
    pub async fn select_album(
        &mut self,
        album_id: Uuid,
        album_name: &str,
        cover_url: Option<String>,
    ) -> Result<BroadcastEvent> {
        self.ensure_host()?;
        let patch = RoomPatch {
            status: Some(RoomStatus::Waiting),
            genre_id: None,
            album_id: Some(album_id),
        };
        let room = self.backend.update_room(self.room.id, patch).await?;
        self.replace_room(room);
        self.choice.album = Some((album_id, album_name.to_string()));
        self.choice.cover_url = cover_url.clone();
        Ok(BroadcastEvent::AlbumSelected {
            album_id,
            album_name: album_name.to_string(),
            cover_url,
        })
    }

    /// Start a game session.
    ///
    /// # Errors
    ///
    /// `NOT_HOST` (checked locally and by the backend), or backend failures.
    pub async fn start_game(&mut self) -> Result<SessionId> {
        self.ensure_host()?;
        let session_id = self
            .backend
            .start_game(&self.room.code, self.identity.client_id)
            .await?;
        info!(room_code = %self.room.code, session_id = %session_id, "game started");
        if let Err(e) = self.refresh().await {
            warn!("failed to refresh room after start: {e}");
        }
        Ok(session_id)
    }

    /// Move to the round lobby after the last round.
    ///
    /// The host finishes the session and turns spectators into players;
    /// everyone reloads the room and the roster.
    ///
    /// # Errors
    ///
    /// Backend failures.
    pub async fn enter_round_lobby(&mut self) -> Result<()> {
        if self.is_host() {
            self.backend
                .reset_round_lobby(self.room.id, self.identity.client_id)
                .await?;
        }
        self.refresh().await
    }

    /// Start another game from the round lobby with every score at zero.
    ///
    /// # Errors
    ///
    /// `NOT_HOST`, or backend failures.
    pub async fn start_next_game(&mut self) -> Result<SessionId> {
        self.ensure_host()?;
        self.backend
            .reset_scores(self.room.id, self.identity.client_id)
            .await?;
        self.start_game().await
    }

    /// Leave the room; returns the broadcast announcing it.
    ///
    /// # Errors
    ///
    /// Backend failures.
    pub async fn leave(self) -> Result<BroadcastEvent> {
        self.backend
            .delete_participant(self.room.id, self.identity.client_id)
            .await?;
        info!(room_code = %self.room.code, "left room");
        Ok(BroadcastEvent::PlayerLeft {
            client_id: self.identity.client_id,
            display_name: self.identity.profile.display_name.clone(),
        })
    }
}
