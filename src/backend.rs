//! The room/session store the client runs against.
//!
//! [`Backend`] is the seam between the game client and the hosted
//! relational store: the two stored procedures (`join_room`,
//! `start_game`) plus the table reads and writes the lobby, arena, chat and
//! presence services need. Domain failures come back as
//! [`GalinheiroError::Rejected`](crate::GalinheiroError::Rejected) with the
//! procedure's [`ErrorCode`](crate::ErrorCode); anything else is
//! [`GalinheiroError::Backend`](crate::GalinheiroError::Backend).
//!
//! The trait is object-safe; services hold an `Arc<dyn Backend>`.
//! [`MemoryBackend`](crate::backends::MemoryBackend) is an in-process
//! implementation.

use async_trait::async_trait;
use uuid::Uuid;

use crate::error::Result;
use crate::protocol::{
    AnswerReceipt, AnswerSubmission, Avatar, ChatMessage, ClientId, GameSession, MessageId,
    Participant, ParticipantId, Reactions, Room, RoomCode, RoomId, RoomStatus, Round, SessionId,
    Timestamp,
};

/// Arguments of the `join_room` procedure.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JoinRequest {
    pub room_code: RoomCode,
    pub display_name: String,
    pub avatar: Avatar,
    pub client_id: ClientId,
    pub user_id: Option<Uuid>,
    pub is_spectator: bool,
}

/// Partial update of a room row. `None` fields are left untouched.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RoomPatch {
    pub status: Option<RoomStatus>,
    pub genre_id: Option<Uuid>,
    pub album_id: Option<Uuid>,
}

impl RoomPatch {
    pub fn status(status: RoomStatus) -> Self {
        Self {
            status: Some(status),
            ..Self::default()
        }
    }
}

/// The external room/session store.
#[async_trait]
pub trait Backend: Send + Sync + 'static {
    /// `join_room` procedure. Idempotent per (room, client id): rejoining
    /// updates the existing row and returns its id.
    ///
    /// Fails with `ROOM_NOT_FOUND` or `ROOM_NOT_IN_LOBBY`.
    async fn join_room(&self, request: JoinRequest) -> Result<ParticipantId>;

    /// `start_game` procedure. Fails with `NOT_HOST` when `client_id` is not
    /// the room's host.
    async fn start_game(&self, room_code: &RoomCode, client_id: ClientId) -> Result<SessionId>;

    async fn fetch_room(&self, room_code: &RoomCode) -> Result<Option<Room>>;

    /// Participants of a room, ordered by `joined_at`.
    async fn fetch_participants(&self, room_id: RoomId) -> Result<Vec<Participant>>;

    async fn fetch_session(&self, session_id: SessionId) -> Result<Option<GameSession>>;

    /// The question for `number` (1-based) in a session.
    async fn fetch_round(&self, session_id: SessionId, number: u32) -> Result<Option<Round>>;

    /// Record an answer. Accepts at most one answer per (round, participant);
    /// later submissions fail with `ALREADY_ANSWERED`, spectators with
    /// `SPECTATOR_CANNOT_ANSWER`. Scoring happens here.
    async fn submit_answer(&self, submission: &AnswerSubmission) -> Result<AnswerReceipt>;

    async fn update_room(&self, room_id: RoomId, patch: RoomPatch) -> Result<Room>;

    /// Host action when the last round ends: finish the session, clear
    /// spectator flags, and move the room to `round_lobby`. Fails with
    /// `NOT_HOST`.
    async fn reset_round_lobby(&self, room_id: RoomId, client_id: ClientId) -> Result<()>;

    /// Host action before a new game starts from the round lobby: every
    /// participant's eggs and answer statistics go back to zero. Fails with
    /// `NOT_HOST`.
    async fn reset_scores(&self, room_id: RoomId, client_id: ClientId) -> Result<()>;

    /// The most recent `limit` messages, oldest first.
    async fn fetch_messages(&self, room_id: RoomId, limit: usize) -> Result<Vec<ChatMessage>>;

    async fn insert_message(&self, message: &ChatMessage) -> Result<()>;

    async fn update_reactions(
        &self,
        message_id: MessageId,
        reactions: &Reactions,
        updated_at: Timestamp,
    ) -> Result<()>;

    /// Touch `last_seen` for the caller's participant row.
    async fn touch_participant(&self, room_id: RoomId, client_id: ClientId) -> Result<()>;

    async fn delete_participant(&self, room_id: RoomId, client_id: ClientId) -> Result<()>;

    /// Delete participants whose `last_seen` is older than `cutoff`; returns
    /// how many were removed. The host is never removed.
    async fn remove_stale_participants(&self, room_id: RoomId, cutoff: Timestamp) -> Result<usize>;
}
