//! In-process [`Backend`] implementation.
//!
//! `MemoryBackend` keeps every table in memory behind a `tokio::sync::Mutex`
//! and enforces the server-side rules the stored procedures own:
//!
//! - one participant row per (room, client id)
//! - one accepted answer per (round, participant), spectators rejected
//! - scoring with the room's [`ScoringRules`]
//!
//! Every mutation is also published as a [`RoomChange`] so a test or demo
//! can relay it as a realtime change feed.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::{broadcast, Mutex};
use tracing::debug;
use uuid::Uuid;

use crate::backend::{Backend, JoinRequest, RoomPatch};
use crate::config::{GameSettings, ScoringRules};
use crate::error::{GalinheiroError, Result};
use crate::error_codes::ErrorCode;
use crate::identity::Identity;
use crate::protocol::{
    room_topic, AnswerReceipt, AnswerRow, AnswerSubmission, ChangeKind, ChatMessage, ClientId,
    GameSession, MessageId, Participant, ParticipantId, Reactions, Room, RoomCode, RoomId,
    RoomStatus, Round, RoundId, RowChange, SessionId, SessionStatus, Timestamp, OPTION_COUNT,
};

/// Capacity of the change broadcast; slow subscribers lag rather than block.
const CHANGE_CHANNEL_CAPACITY: usize = 1024;

/// A question in a room's bank, turned into a [`Round`] when played.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Question {
    pub song_id: Uuid,
    pub audio_url: Option<String>,
    pub options: [String; OPTION_COUNT],
    pub correct_index: usize,
}

/// A row change tagged with the realtime topic it belongs to.
#[derive(Debug, Clone, PartialEq)]
pub struct RoomChange {
    pub topic: String,
    pub change: RowChange,
}

#[derive(Default)]
struct Tables {
    rooms: HashMap<RoomId, Room>,
    participants: Vec<Participant>,
    sessions: HashMap<SessionId, GameSession>,
    questions: HashMap<RoomId, Vec<Question>>,
    rounds: HashMap<(SessionId, u32), Round>,
    answers: HashMap<(RoundId, ParticipantId), AnswerRow>,
    messages: Vec<ChatMessage>,
}

impl Tables {
    fn room_by_code(&self, code: &RoomCode) -> Option<&Room> {
        self.rooms.values().find(|room| &room.code == code)
    }

    fn room_mut(&mut self, room_id: RoomId) -> Result<&mut Room> {
        self.rooms
            .get_mut(&room_id)
            .ok_or_else(|| GalinheiroError::rejected(ErrorCode::RoomNotFound))
    }

    fn topic_of(&self, room_id: RoomId) -> Option<String> {
        self.rooms.get(&room_id).map(|room| room_topic(&room.code))
    }

    fn ensure_host(&self, room_id: RoomId, client_id: ClientId) -> Result<()> {
        match self.rooms.get(&room_id) {
            None => Err(GalinheiroError::rejected(ErrorCode::RoomNotFound)),
            Some(room) if room.host_id != client_id => {
                Err(GalinheiroError::rejected(ErrorCode::NotHost))
            }
            Some(_) => Ok(()),
        }
    }
}

/// An in-memory room/session store.
pub struct MemoryBackend {
    tables: Mutex<Tables>,
    changes: broadcast::Sender<RoomChange>,
}

impl Default for MemoryBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for MemoryBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemoryBackend")
            .field("change_subscribers", &self.changes.receiver_count())
            .finish()
    }
}

impl MemoryBackend {
    pub fn new() -> Self {
        let (changes, _) = broadcast::channel(CHANGE_CHANNEL_CAPACITY);
        Self {
            tables: Mutex::new(Tables::default()),
            changes,
        }
    }

    /// Subscribe to every row change, across rooms.
    pub fn subscribe_changes(&self) -> broadcast::Receiver<RoomChange> {
        self.changes.subscribe()
    }

    /// Create a room hosted by `host`, with the host's participant row.
    pub async fn create_room(&self, host: &Identity, settings: &GameSettings) -> Room {
        let mut tables = self.tables.lock().await;
        let code = loop {
            let candidate = RoomCode::generate();
            if tables.room_by_code(&candidate).is_none() {
                break candidate;
            }
        };
        let now = Utc::now();
        let room = Room {
            id: Uuid::new_v4(),
            code,
            status: RoomStatus::Lobby,
            host_id: host.client_id,
            current_round: 0,
            total_rounds: settings.total_rounds,
            round_duration: settings.round_duration_secs,
            eggs_per_correct: settings.scoring.eggs_per_correct,
            speed_bonus_threshold: settings.scoring.speed_bonus_threshold,
            speed_bonus_eggs: settings.scoring.speed_bonus_eggs,
            genre_id: None,
            album_id: None,
            session_id: None,
            updated_at: now,
        };
        tables.participants.push(Participant {
            id: Uuid::new_v4(),
            room_id: room.id,
            client_id: host.client_id,
            user_id: host.user_id,
            display_name: host.profile.display_name.clone(),
            avatar: host.profile.avatar.clone(),
            is_host: true,
            is_spectator: false,
            eggs: 0,
            correct_answers: 0,
            answers_given: 0,
            total_response_ms: 0,
            joined_at: now,
            last_seen: now,
        });
        tables.rooms.insert(room.id, room.clone());
        debug!(room_code = %room.code, "created room");
        room
    }

    /// Replace the question bank of a room.
    pub async fn seed_questions(&self, room_id: RoomId, questions: Vec<Question>) {
        self.tables.lock().await.questions.insert(room_id, questions);
    }

    /// Force a room's status, as an out-of-band server action would.
    pub async fn set_room_status(&self, room_id: RoomId, status: RoomStatus) -> Result<()> {
        self.update_room(room_id, RoomPatch::status(status)).await.map(|_| ())
    }

    /// Override a participant's `last_seen`.
    pub async fn set_last_seen(&self, room_id: RoomId, client_id: ClientId, at: Timestamp) {
        let mut tables = self.tables.lock().await;
        if let Some(p) = tables
            .participants
            .iter_mut()
            .find(|p| p.room_id == room_id && p.client_id == client_id)
        {
            p.last_seen = at;
        }
    }

    fn publish(&self, topic: Option<String>, change: RowChange) {
        let Some(topic) = topic else { return };
        // No subscribers is fine: nobody is listening to the change feed.
        let _ = self.changes.send(RoomChange { topic, change });
    }
}

#[async_trait]
impl Backend for MemoryBackend {
    async fn join_room(&self, request: JoinRequest) -> Result<ParticipantId> {
        let mut tables = self.tables.lock().await;
        let room = tables
            .room_by_code(&request.room_code)
            .cloned()
            .ok_or_else(|| GalinheiroError::rejected(ErrorCode::RoomNotFound))?;
        if !room.status.is_joinable() {
            return Err(GalinheiroError::rejected(ErrorCode::RoomNotInLobby));
        }

        let now = Utc::now();
        if let Some(existing) = tables
            .participants
            .iter_mut()
            .find(|p| p.room_id == room.id && p.client_id == request.client_id)
        {
            existing.display_name = request.display_name;
            existing.avatar = request.avatar;
            existing.last_seen = now;
            let (id, record) = (existing.id, existing.clone());
            drop(tables);
            self.publish(
                Some(room_topic(&room.code)),
                RowChange::RoomParticipants {
                    kind: ChangeKind::Update,
                    record,
                },
            );
            return Ok(id);
        }

        if room.status.is_playing() && !request.is_spectator {
            return Err(GalinheiroError::rejected(ErrorCode::RoomNotInLobby));
        }

        let participant = Participant {
            id: Uuid::new_v4(),
            room_id: room.id,
            client_id: request.client_id,
            user_id: request.user_id,
            display_name: request.display_name,
            avatar: request.avatar,
            is_host: room.host_id == request.client_id,
            is_spectator: request.is_spectator,
            eggs: 0,
            correct_answers: 0,
            answers_given: 0,
            total_response_ms: 0,
            joined_at: now,
            last_seen: now,
        };
        let id = participant.id;
        tables.participants.push(participant.clone());
        drop(tables);
        self.publish(
            Some(room_topic(&room.code)),
            RowChange::RoomParticipants {
                kind: ChangeKind::Insert,
                record: participant,
            },
        );
        Ok(id)
    }

    async fn start_game(&self, room_code: &RoomCode, client_id: ClientId) -> Result<SessionId> {
        let mut tables = self.tables.lock().await;
        let (room_id, status) = tables
            .room_by_code(room_code)
            .map(|room| (room.id, room.status))
            .ok_or_else(|| GalinheiroError::rejected(ErrorCode::RoomNotFound))?;
        tables.ensure_host(room_id, client_id)?;
        if !status.can_start() {
            return Err(GalinheiroError::rejected(ErrorCode::RoomNotInLobby));
        }

        let now = Utc::now();
        let session = GameSession {
            id: Uuid::new_v4(),
            room_id,
            status: SessionStatus::Active,
            current_round: 0,
            started_at: now,
        };
        let session_id = session.id;
        tables.sessions.insert(session_id, session);

        let room = tables.room_mut(room_id)?;
        room.status = RoomStatus::InProgress;
        room.session_id = Some(session_id);
        room.current_round = 0;
        room.updated_at = now;
        let record = room.clone();
        drop(tables);

        debug!(room_code = %room_code, session_id = %session_id, "game started");
        self.publish(
            Some(room_topic(room_code)),
            RowChange::GameRooms {
                kind: ChangeKind::Update,
                record,
            },
        );
        Ok(session_id)
    }

    async fn fetch_room(&self, room_code: &RoomCode) -> Result<Option<Room>> {
        Ok(self.tables.lock().await.room_by_code(room_code).cloned())
    }

    async fn fetch_participants(&self, room_id: RoomId) -> Result<Vec<Participant>> {
        let tables = self.tables.lock().await;
        let mut roster: Vec<Participant> = tables
            .participants
            .iter()
            .filter(|p| p.room_id == room_id)
            .cloned()
            .collect();
        roster.sort_by_key(|p| p.joined_at);
        Ok(roster)
    }

    async fn fetch_session(&self, session_id: SessionId) -> Result<Option<GameSession>> {
        Ok(self.tables.lock().await.sessions.get(&session_id).cloned())
    }

    async fn fetch_round(&self, session_id: SessionId, number: u32) -> Result<Option<Round>> {
        let mut tables = self.tables.lock().await;
        if let Some(round) = tables.rounds.get(&(session_id, number)) {
            return Ok(Some(round.clone()));
        }
        let Some(session) = tables.sessions.get(&session_id).cloned() else {
            return Err(GalinheiroError::rejected(ErrorCode::SessionNotFound));
        };
        if session.status != SessionStatus::Active {
            return Err(GalinheiroError::rejected(ErrorCode::SessionNotActive));
        }
        let Some(room) = tables.rooms.get(&session.room_id).cloned() else {
            return Err(GalinheiroError::rejected(ErrorCode::RoomNotFound));
        };
        if number == 0 || number > room.total_rounds {
            return Ok(None);
        }
        let index = usize::try_from(number - 1).unwrap_or(usize::MAX);
        let Some(question) = tables
            .questions
            .get(&room.id)
            .and_then(|bank| bank.get(index))
            .cloned()
        else {
            return Ok(None);
        };

        let now = Utc::now();
        let round = Round {
            id: Uuid::new_v4(),
            session_id,
            number,
            song_id: question.song_id,
            audio_url: question.audio_url,
            options: question.options,
            correct_index: question.correct_index,
            duration: room.round_duration,
            started_at: now,
        };
        tables.rounds.insert((session_id, number), round.clone());
        if let Some(session) = tables.sessions.get_mut(&session_id) {
            session.current_round = session.current_round.max(number);
        }
        let room = tables.room_mut(room.id)?;
        room.current_round = room.current_round.max(number);
        room.updated_at = now;
        let record = room.clone();
        drop(tables);

        self.publish(
            Some(room_topic(&record.code)),
            RowChange::GameRooms {
                kind: ChangeKind::Update,
                record,
            },
        );
        Ok(Some(round))
    }

    async fn submit_answer(&self, submission: &AnswerSubmission) -> Result<AnswerReceipt> {
        let mut tables = self.tables.lock().await;
        let round = tables
            .rounds
            .values()
            .find(|round| round.id == submission.round_id)
            .cloned()
            .ok_or_else(|| GalinheiroError::rejected(ErrorCode::RoundNotFound))?;
        let participant = tables
            .participants
            .iter()
            .find(|p| p.id == submission.participant_id)
            .cloned()
            .ok_or_else(|| GalinheiroError::rejected(ErrorCode::NotInRoom))?;
        if participant.is_spectator {
            return Err(GalinheiroError::rejected(ErrorCode::SpectatorCannotAnswer));
        }
        if submission.option_index >= OPTION_COUNT {
            return Err(GalinheiroError::rejected(ErrorCode::InvalidOption));
        }
        let key = (submission.round_id, submission.participant_id);
        if tables.answers.contains_key(&key) {
            return Err(GalinheiroError::rejected(ErrorCode::AlreadyAnswered));
        }
        let budget = std::time::Duration::from_secs(u64::from(round.duration));
        let elapsed = std::time::Duration::from_millis(submission.response_ms);
        if elapsed > budget {
            return Err(GalinheiroError::rejected(ErrorCode::RoundClosed));
        }
        let rules = tables
            .rooms
            .get(&participant.room_id)
            .map(ScoringRules::from_room)
            .unwrap_or_default();

        let correct = submission.option_index == round.correct_index;
        let eggs_awarded = rules.award(correct, budget.saturating_sub(elapsed), budget);
        let row = AnswerRow {
            id: Uuid::new_v4(),
            round_id: submission.round_id,
            participant_id: submission.participant_id,
            option_index: submission.option_index,
            response_ms: submission.response_ms,
        };
        tables.answers.insert(key, row.clone());

        let Some(scored) = tables
            .participants
            .iter_mut()
            .find(|p| p.id == submission.participant_id)
        else {
            return Err(GalinheiroError::rejected(ErrorCode::NotInRoom));
        };
        scored.eggs += eggs_awarded;
        scored.answers_given += 1;
        scored.total_response_ms += submission.response_ms;
        if correct {
            scored.correct_answers += 1;
        }
        let record = scored.clone();
        let topic = tables.topic_of(record.room_id);
        drop(tables);

        self.publish(
            topic.clone(),
            RowChange::RoundAnswers {
                kind: ChangeKind::Insert,
                record: row,
            },
        );
        self.publish(
            topic,
            RowChange::RoomParticipants {
                kind: ChangeKind::Update,
                record,
            },
        );
        Ok(AnswerReceipt {
            correct,
            eggs_awarded,
        })
    }

    async fn update_room(&self, room_id: RoomId, patch: RoomPatch) -> Result<Room> {
        let mut tables = self.tables.lock().await;
        let room = tables.room_mut(room_id)?;
        if let Some(status) = patch.status {
            room.status = status;
        }
        if let Some(genre_id) = patch.genre_id {
            room.genre_id = Some(genre_id);
        }
        if let Some(album_id) = patch.album_id {
            room.album_id = Some(album_id);
        }
        room.updated_at = Utc::now();
        let record = room.clone();
        drop(tables);

        self.publish(
            Some(room_topic(&record.code)),
            RowChange::GameRooms {
                kind: ChangeKind::Update,
                record: record.clone(),
            },
        );
        Ok(record)
    }

    async fn reset_round_lobby(&self, room_id: RoomId, client_id: ClientId) -> Result<()> {
        let mut tables = self.tables.lock().await;
        tables.ensure_host(room_id, client_id)?;

        let room = tables.room_mut(room_id)?;
        room.status = RoomStatus::RoundLobby;
        room.updated_at = Utc::now();
        let session_id = room.session_id;
        let room_record = room.clone();
        if let Some(session) = session_id.and_then(|id| tables.sessions.get_mut(&id)) {
            session.status = SessionStatus::Finished;
        }

        let mut upgraded = Vec::new();
        for p in tables
            .participants
            .iter_mut()
            .filter(|p| p.room_id == room_id && p.is_spectator)
        {
            p.is_spectator = false;
            upgraded.push(p.clone());
        }
        drop(tables);

        let topic = Some(room_topic(&room_record.code));
        self.publish(
            topic.clone(),
            RowChange::GameRooms {
                kind: ChangeKind::Update,
                record: room_record,
            },
        );
        for record in upgraded {
            self.publish(
                topic.clone(),
                RowChange::RoomParticipants {
                    kind: ChangeKind::Update,
                    record,
                },
            );
        }
        Ok(())
    }

    async fn reset_scores(&self, room_id: RoomId, client_id: ClientId) -> Result<()> {
        let mut tables = self.tables.lock().await;
        tables.ensure_host(room_id, client_id)?;
        let mut reset = Vec::new();
        for p in tables.participants.iter_mut().filter(|p| p.room_id == room_id) {
            p.eggs = 0;
            p.correct_answers = 0;
            p.answers_given = 0;
            p.total_response_ms = 0;
            reset.push(p.clone());
        }
        let topic = tables.topic_of(room_id);
        drop(tables);

        for record in reset {
            self.publish(
                topic.clone(),
                RowChange::RoomParticipants {
                    kind: ChangeKind::Update,
                    record,
                },
            );
        }
        Ok(())
    }

    async fn fetch_messages(&self, room_id: RoomId, limit: usize) -> Result<Vec<ChatMessage>> {
        let tables = self.tables.lock().await;
        let mut messages: Vec<ChatMessage> = tables
            .messages
            .iter()
            .filter(|m| m.room_id == room_id)
            .cloned()
            .collect();
        messages.sort_by_key(|m| m.created_at);
        let skip = messages.len().saturating_sub(limit);
        Ok(messages.into_iter().skip(skip).collect())
    }

    async fn insert_message(&self, message: &ChatMessage) -> Result<()> {
        let mut tables = self.tables.lock().await;
        if tables.messages.iter().any(|m| m.id == message.id) {
            return Ok(());
        }
        tables.messages.push(message.clone());
        let topic = tables.topic_of(message.room_id);
        drop(tables);

        self.publish(
            topic,
            RowChange::ChatMessages {
                kind: ChangeKind::Insert,
                record: message.clone(),
            },
        );
        Ok(())
    }

    async fn update_reactions(
        &self,
        message_id: MessageId,
        reactions: &Reactions,
        updated_at: Timestamp,
    ) -> Result<()> {
        let mut tables = self.tables.lock().await;
        let Some(message) = tables.messages.iter_mut().find(|m| m.id == message_id) else {
            return Err(GalinheiroError::rejected(ErrorCode::MessageNotFound));
        };
        if message.updated_at > updated_at {
            debug!(message_id = %message_id, "ignoring stale reaction update");
            return Ok(());
        }
        message.reactions = reactions.clone();
        message.updated_at = updated_at;
        let record = message.clone();
        let topic = tables.topic_of(record.room_id);
        drop(tables);

        self.publish(
            topic,
            RowChange::ChatMessages {
                kind: ChangeKind::Update,
                record,
            },
        );
        Ok(())
    }

    async fn touch_participant(&self, room_id: RoomId, client_id: ClientId) -> Result<()> {
        let mut tables = self.tables.lock().await;
        let participant = tables
            .participants
            .iter_mut()
            .find(|p| p.room_id == room_id && p.client_id == client_id)
            .ok_or_else(|| GalinheiroError::rejected(ErrorCode::NotInRoom))?;
        participant.last_seen = Utc::now();
        Ok(())
    }

    async fn delete_participant(&self, room_id: RoomId, client_id: ClientId) -> Result<()> {
        let mut tables = self.tables.lock().await;
        let Some(position) = tables
            .participants
            .iter()
            .position(|p| p.room_id == room_id && p.client_id == client_id)
        else {
            return Ok(());
        };
        let record = tables.participants.remove(position);
        let topic = tables.topic_of(room_id);
        drop(tables);

        self.publish(
            topic,
            RowChange::RoomParticipants {
                kind: ChangeKind::Delete,
                record,
            },
        );
        Ok(())
    }

    async fn remove_stale_participants(&self, room_id: RoomId, cutoff: Timestamp) -> Result<usize> {
        let mut tables = self.tables.lock().await;
        let (stale, kept): (Vec<_>, Vec<_>) = std::mem::take(&mut tables.participants)
            .into_iter()
            .partition(|p| p.room_id == room_id && !p.is_host && p.last_seen < cutoff);
        tables.participants = kept;
        let topic = tables.topic_of(room_id);
        drop(tables);

        let removed = stale.len();
        for record in stale {
            self.publish(
                topic.clone(),
                RowChange::RoomParticipants {
                    kind: ChangeKind::Delete,
                    record,
                },
            );
        }
        if removed > 0 {
            debug!(room_id = %room_id, removed, "removed stale participants");
        }
        Ok(removed)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::indexing_slicing)]
mod tests {
    use super::*;
    use crate::identity::Profile;
    use crate::protocol::Avatar;

    fn identity(name: &str) -> Identity {
        Identity::generate(Profile::new(name, Avatar::default()).unwrap())
    }

    fn question(correct_index: usize) -> Question {
        Question {
            song_id: Uuid::new_v4(),
            audio_url: None,
            options: ["a".into(), "b".into(), "c".into(), "d".into()],
            correct_index,
        }
    }

    fn join(code: &RoomCode, who: &Identity, is_spectator: bool) -> JoinRequest {
        JoinRequest {
            room_code: code.clone(),
            display_name: who.profile.display_name.clone(),
            avatar: who.profile.avatar.clone(),
            client_id: who.client_id,
            user_id: None,
            is_spectator,
        }
    }

    #[tokio::test]
    async fn join_is_idempotent_per_client() {
        let backend = MemoryBackend::new();
        let host = identity("Host");
        let room = backend.create_room(&host, &GameSettings::default()).await;
        let guest = identity("Guest");

        let first = backend.join_room(join(&room.code, &guest, false)).await.unwrap();
        let second = backend.join_room(join(&room.code, &guest, false)).await.unwrap();
        assert_eq!(first, second);
        assert_eq!(backend.fetch_participants(room.id).await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn in_progress_room_requires_spectator_join() {
        let backend = MemoryBackend::new();
        let host = identity("Host");
        let room = backend.create_room(&host, &GameSettings::default()).await;
        backend.set_room_status(room.id, RoomStatus::InProgress).await.unwrap();

        let late = identity("Late");
        let err = backend.join_room(join(&room.code, &late, false)).await.unwrap_err();
        assert_eq!(err.code(), Some(&ErrorCode::RoomNotInLobby));
        backend.join_room(join(&room.code, &late, true)).await.unwrap();
    }

    #[tokio::test]
    async fn second_answer_for_a_round_is_rejected() {
        let backend = MemoryBackend::new();
        let host = identity("Host");
        let room = backend.create_room(&host, &GameSettings::default()).await;
        backend.seed_questions(room.id, vec![question(1)]).await;
        let session = backend.start_game(&room.code, host.client_id).await.unwrap();
        let round = backend.fetch_round(session, 1).await.unwrap().unwrap();
        let me = backend.fetch_participants(room.id).await.unwrap()[0].id;

        let submission = AnswerSubmission {
            round_id: round.id,
            participant_id: me,
            option_index: 1,
            response_ms: 2_000,
        };
        let receipt = backend.submit_answer(&submission).await.unwrap();
        assert!(receipt.correct);
        assert_eq!(receipt.eggs_awarded, 15);

        let again = AnswerSubmission {
            option_index: 2,
            ..submission
        };
        let err = backend.submit_answer(&again).await.unwrap_err();
        assert_eq!(err.code(), Some(&ErrorCode::AlreadyAnswered));
        assert_eq!(backend.fetch_participants(room.id).await.unwrap()[0].eggs, 15);
    }

    #[tokio::test]
    async fn start_game_requires_host() {
        let backend = MemoryBackend::new();
        let host = identity("Host");
        let room = backend.create_room(&host, &GameSettings::default()).await;
        let err = backend
            .start_game(&room.code, Uuid::new_v4())
            .await
            .unwrap_err();
        assert_eq!(err.code(), Some(&ErrorCode::NotHost));
    }

    #[tokio::test]
    async fn start_game_refuses_a_running_room() {
        let backend = MemoryBackend::new();
        let host = identity("Host");
        let room = backend.create_room(&host, &GameSettings::default()).await;
        let first = backend.start_game(&room.code, host.client_id).await.unwrap();

        let err = backend
            .start_game(&room.code, host.client_id)
            .await
            .unwrap_err();
        assert_eq!(err.code(), Some(&ErrorCode::RoomNotInLobby));
        let room = backend.fetch_room(&room.code).await.unwrap().unwrap();
        assert_eq!(room.session_id, Some(first));
        assert_eq!(
            backend.fetch_session(first).await.unwrap().unwrap().status,
            SessionStatus::Active
        );
    }

    #[tokio::test]
    async fn stale_sweep_spares_the_host() {
        let backend = MemoryBackend::new();
        let host = identity("Host");
        let room = backend.create_room(&host, &GameSettings::default()).await;
        let guest = identity("Guest");
        backend.join_room(join(&room.code, &guest, false)).await.unwrap();

        let long_ago = Utc::now() - chrono::Duration::seconds(120);
        backend.set_last_seen(room.id, host.client_id, long_ago).await;
        backend.set_last_seen(room.id, guest.client_id, long_ago).await;

        let removed = backend
            .remove_stale_participants(room.id, Utc::now() - chrono::Duration::seconds(30))
            .await
            .unwrap();
        assert_eq!(removed, 1);
        let roster = backend.fetch_participants(room.id).await.unwrap();
        assert_eq!(roster.len(), 1);
        assert!(roster[0].is_host);
    }

    #[tokio::test]
    async fn mutations_are_published_on_the_room_topic() {
        let backend = MemoryBackend::new();
        let mut changes = backend.subscribe_changes();
        let host = identity("Host");
        let room = backend.create_room(&host, &GameSettings::default()).await;
        let guest = identity("Guest");
        backend.join_room(join(&room.code, &guest, false)).await.unwrap();

        let change = changes.recv().await.unwrap();
        assert_eq!(change.topic, room_topic(&room.code));
        assert!(matches!(
            change.change,
            RowChange::RoomParticipants {
                kind: ChangeKind::Insert,
                ..
            }
        ));
    }
}
