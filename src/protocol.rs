//! Wire-compatible types for the Galinheiro backend and realtime service.
//!
//! Rows mirror the relational tables (`game_rooms`, `room_participants`,
//! `game_sessions`, `game_rounds`, `round_answers`, `chat_messages`), and
//! the realtime frames use the adjacently-tagged `{"type": …, "data": …}`
//! layout. Key adaptations from the database schema:
//!
//! - timestamps are `chrono::DateTime<Utc>` (RFC 3339 on the wire)
//! - the avatar column (emoji or URL) is a tagged [`Avatar`]
//! - reactions (`jsonb`) are a [`Reactions`] map with set semantics

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::GalinheiroError;
use crate::error_codes::ErrorCode;

// ── Type aliases ────────────────────────────────────────────────────

/// Stable per-device client identifier.
pub type ClientId = Uuid;

/// Unique identifier for participant rows.
pub type ParticipantId = Uuid;

/// Unique identifier for rooms.
pub type RoomId = Uuid;

/// Unique identifier for game sessions.
pub type SessionId = Uuid;

/// Unique identifier for rounds.
pub type RoundId = Uuid;

/// Unique identifier for chat messages.
pub type MessageId = Uuid;

/// Row timestamp.
pub type Timestamp = DateTime<Utc>;

/// Number of answer options every question carries.
pub const OPTION_COUNT: usize = 4;

/// Length of a room code.
pub const ROOM_CODE_LEN: usize = 6;

const ROOM_CODE_ALPHABET: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZ0123456789";

// ── Room code ───────────────────────────────────────────────────────

/// A validated 6-character, uppercase alphanumeric room code.
///
/// Parsing normalizes lowercase input, so `"abc123"` and `"ABC123"` name the
/// same room.
///
/// ```
/// use galinheiro_client::protocol::RoomCode;
///
/// let code: RoomCode = " abc123 ".parse().unwrap();
/// assert_eq!(code.as_str(), "ABC123");
/// assert!("ABC-12".parse::<RoomCode>().is_err());
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct RoomCode(String);

impl RoomCode {
    /// Generate a fresh random room code.
    pub fn generate() -> Self {
        let code = Uuid::new_v4()
            .as_bytes()
            .iter()
            .take(ROOM_CODE_LEN)
            .filter_map(|b| {
                ROOM_CODE_ALPHABET
                    .get(usize::from(*b) % ROOM_CODE_ALPHABET.len())
                    .copied()
                    .map(char::from)
            })
            .collect();
        Self(code)
    }

    /// The code as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl FromStr for RoomCode {
    type Err = GalinheiroError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let code = s.trim().to_ascii_uppercase();
        if code.len() == ROOM_CODE_LEN && code.bytes().all(|b| b.is_ascii_alphanumeric()) {
            Ok(Self(code))
        } else {
            Err(GalinheiroError::rejected(ErrorCode::InvalidRoomCode))
        }
    }
}

impl TryFrom<String> for RoomCode {
    type Error = GalinheiroError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<RoomCode> for String {
    fn from(code: RoomCode) -> Self {
        code.0
    }
}

impl fmt::Display for RoomCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Realtime topic carrying every event of one room.
pub fn room_topic(code: &RoomCode) -> String {
    format!("room:{code}")
}

// ── Enums ───────────────────────────────────────────────────────────

/// Lifecycle status of a room.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum RoomStatus {
    /// Created, gathering players.
    #[default]
    Lobby,
    /// Players gathered, host has not picked anything yet.
    Waiting,
    /// Host is choosing a genre and album.
    AlbumSelection,
    /// Between rounds: ranking screen.
    RoundLobby,
    /// A round is being played.
    InProgress,
    /// The game is over.
    Completed,
}

impl RoomStatus {
    /// Whether new players may join (possibly as spectators).
    pub fn is_joinable(self) -> bool {
        !matches!(self, Self::Completed)
    }

    /// Whether a round is currently running; late joiners become spectators.
    pub fn is_playing(self) -> bool {
        matches!(self, Self::InProgress)
    }

    /// Whether the host may start a new session from this status.
    pub fn can_start(self) -> bool {
        matches!(
            self,
            Self::Lobby | Self::Waiting | Self::AlbumSelection | Self::RoundLobby
        )
    }
}

/// Lifecycle status of a game session.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum SessionStatus {
    #[default]
    Active,
    Finished,
    Abandoned,
}

/// A participant's avatar: an emoji or an uploaded image.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum Avatar {
    Emoji(String),
    Image(String),
}

impl Default for Avatar {
    fn default() -> Self {
        Self::Emoji("🐔".into())
    }
}

/// Kind of row-level mutation carried by the change feed.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "UPPERCASE")]
pub enum ChangeKind {
    Insert,
    Update,
    Delete,
}

// ── Rows ────────────────────────────────────────────────────────────

/// A `game_rooms` row.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Room {
    pub id: RoomId,
    pub code: RoomCode,
    pub status: RoomStatus,
    pub host_id: ClientId,
    #[serde(default)]
    pub current_round: u32,
    pub total_rounds: u32,
    /// Per-round time budget in seconds.
    pub round_duration: u32,
    pub eggs_per_correct: u32,
    /// Percentage of the budget that must remain for the speed bonus.
    pub speed_bonus_threshold: u32,
    pub speed_bonus_eggs: u32,
    #[serde(default)]
    pub genre_id: Option<Uuid>,
    #[serde(default)]
    pub album_id: Option<Uuid>,
    #[serde(default)]
    pub session_id: Option<SessionId>,
    pub updated_at: Timestamp,
}

/// A `room_participants` row.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Participant {
    pub id: ParticipantId,
    pub room_id: RoomId,
    pub client_id: ClientId,
    #[serde(default)]
    pub user_id: Option<Uuid>,
    pub display_name: String,
    #[serde(default)]
    pub avatar: Avatar,
    #[serde(default)]
    pub is_host: bool,
    #[serde(default)]
    pub is_spectator: bool,
    #[serde(default)]
    pub eggs: u32,
    #[serde(default)]
    pub correct_answers: u32,
    #[serde(default)]
    pub answers_given: u32,
    #[serde(default)]
    pub total_response_ms: u64,
    pub joined_at: Timestamp,
    pub last_seen: Timestamp,
}

impl Participant {
    /// Mean response time over every answer given, if any.
    pub fn average_response_ms(&self) -> Option<u64> {
        (self.answers_given > 0).then(|| self.total_response_ms / u64::from(self.answers_given))
    }
}

/// A `game_sessions` row.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct GameSession {
    pub id: SessionId,
    pub room_id: RoomId,
    pub status: SessionStatus,
    #[serde(default)]
    pub current_round: u32,
    pub started_at: Timestamp,
}

/// One question of a session, as produced by the server.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Round {
    pub id: RoundId,
    pub session_id: SessionId,
    /// 1-based round number.
    pub number: u32,
    pub song_id: Uuid,
    #[serde(default)]
    pub audio_url: Option<String>,
    pub options: [String; OPTION_COUNT],
    pub correct_index: usize,
    /// Time budget in seconds.
    pub duration: u32,
    pub started_at: Timestamp,
}

/// The local player's answer, as sent to the backend.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct AnswerSubmission {
    pub round_id: RoundId,
    pub participant_id: ParticipantId,
    pub option_index: usize,
    pub response_ms: u64,
}

/// Backend verdict on an accepted answer.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct AnswerReceipt {
    pub correct: bool,
    pub eggs_awarded: u32,
}

/// A `round_answers` row, observed by peers through the change feed.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct AnswerRow {
    pub id: Uuid,
    pub round_id: RoundId,
    pub participant_id: ParticipantId,
    pub option_index: usize,
    pub response_ms: u64,
}

/// Denormalized preview of the message being replied to.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ReplySnapshot {
    pub message_id: MessageId,
    pub sender_name: String,
    pub text: String,
}

/// Emoji reactions on a chat message: emoji → reactors.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(transparent)]
pub struct Reactions(BTreeMap<String, BTreeSet<ClientId>>);

impl Reactions {
    /// Add the reaction if absent, remove it if the reactor already reacted
    /// with that emoji. Returns `true` when the reaction is now present.
    pub fn toggle(&mut self, emoji: &str, reactor: ClientId) -> bool {
        let added = {
            let reactors = self.0.entry(emoji.to_string()).or_default();
            if reactors.remove(&reactor) {
                false
            } else {
                reactors.insert(reactor)
            }
        };
        if !added && self.0.get(emoji).is_some_and(BTreeSet::is_empty) {
            self.0.remove(emoji);
        }
        added
    }

    /// Reactors for one emoji.
    pub fn reactors(&self, emoji: &str) -> impl Iterator<Item = &ClientId> {
        self.0.get(emoji).into_iter().flatten()
    }

    /// Number of reactions with the given emoji.
    pub fn count(&self, emoji: &str) -> usize {
        self.0.get(emoji).map_or(0, BTreeSet::len)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Iterate `(emoji, reactors)` pairs in emoji order.
    pub fn iter(&self) -> impl Iterator<Item = (&String, &BTreeSet<ClientId>)> {
        self.0.iter()
    }
}

/// A `chat_messages` row.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ChatMessage {
    pub id: MessageId,
    pub room_id: RoomId,
    pub sender_id: ClientId,
    pub sender_name: String,
    #[serde(default)]
    pub sender_avatar: Avatar,
    pub text: String,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reply_to: Option<ReplySnapshot>,
    #[serde(default, skip_serializing_if = "Reactions::is_empty")]
    pub reactions: Reactions,
}

// ── Realtime payloads ───────────────────────────────────────────────

/// Application-level broadcast events on a room topic.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "event", content = "payload", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum BroadcastEvent {
    /// A chat message was sent (optimistic; the change feed reconciles).
    NewMessage(ChatMessage),
    /// A message's reaction map changed.
    MessageReaction {
        message_id: MessageId,
        reactions: Reactions,
        updated_at: Timestamp,
    },
    /// Host picked a genre.
    GenreSelected { genre_id: Uuid, genre_name: String },
    /// Host picked an album.
    AlbumSelected {
        album_id: Uuid,
        album_name: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        cover_url: Option<String>,
    },
    /// Host advanced the session to the given round.
    NewRoundStarting {
        session_id: SessionId,
        round_number: u32,
    },
    /// A participant left the room.
    PlayerLeft {
        client_id: ClientId,
        display_name: String,
    },
}

/// A row-level change notification.
///
/// For `DELETE` changes `record` holds the last known row.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "table", rename_all = "snake_case")]
pub enum RowChange {
    GameRooms { kind: ChangeKind, record: Room },
    RoomParticipants { kind: ChangeKind, record: Participant },
    ChatMessages { kind: ChangeKind, record: ChatMessage },
    RoundAnswers { kind: ChangeKind, record: AnswerRow },
}

impl RowChange {
    /// The mutation kind, whatever the table.
    pub fn kind(&self) -> ChangeKind {
        match self {
            Self::GameRooms { kind, .. }
            | Self::RoomParticipants { kind, .. }
            | Self::ChatMessages { kind, .. }
            | Self::RoundAnswers { kind, .. } => *kind,
        }
    }
}

// ── Frames ──────────────────────────────────────────────────────────

/// Frames sent from the client to the realtime service.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", content = "data")]
pub enum ClientFrame {
    /// Start receiving broadcasts and row changes for a topic.
    Subscribe { topic: String },
    /// Stop receiving a topic.
    Unsubscribe { topic: String },
    /// Publish a broadcast to every subscriber of the topic.
    Broadcast {
        topic: String,
        event: BroadcastEvent,
        /// Ask the service to acknowledge delivery.
        #[serde(default)]
        ack: bool,
    },
    /// Keep-alive.
    Heartbeat,
}

/// Frames sent from the realtime service to the client.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", content = "data")]
pub enum ServerFrame {
    /// Subscription confirmed.
    Subscribed { topic: String },
    /// Subscription refused.
    SubscribeFailed {
        topic: String,
        reason: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        error_code: Option<ErrorCode>,
    },
    /// Unsubscription confirmed.
    Unsubscribed { topic: String },
    /// Broadcast from a peer.
    Broadcast { topic: String, event: BroadcastEvent },
    /// Row-level database change.
    Change { topic: String, change: RowChange },
    /// Delivery acknowledgment for a broadcast sent with `ack: true`.
    BroadcastAck { topic: String },
    /// Channel-level error.
    ChannelError {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        topic: Option<String>,
        message: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        error_code: Option<ErrorCode>,
    },
    /// Keep-alive reply.
    HeartbeatAck,
}
