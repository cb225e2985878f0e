//! Per-room chat.
//!
//! [`ChatLog`] is the local message list. Every delivery (optimistic local
//! insert, peer broadcast, change feed) goes through [`ChatLog::ingest`],
//! which deduplicates by message id and keeps the newest `updated_at`.
//! [`ChatClient`] adds the async side: sending, reacting, history.

use std::sync::Arc;

use chrono::Utc;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::backend::Backend;
use crate::client::Publisher;
use crate::error::{GalinheiroError, Result};
use crate::error_codes::ErrorCode;
use crate::event::RealtimeEvent;
use crate::identity::Identity;
use crate::ingest::{Freshness, Ledger};
use crate::protocol::{
    BroadcastEvent, ChangeKind, ChatMessage, ClientId, MessageId, Reactions, ReplySnapshot, RoomId,
    RowChange, Timestamp,
};

/// Longest accepted message, in characters, after trimming.
pub const MAX_MESSAGE_CHARS: usize = 300;

/// Longest quoted text kept in a reply preview, in characters.
pub const REPLY_PREVIEW_CHARS: usize = 100;

/// Default number of messages kept locally.
pub const DEFAULT_HISTORY: usize = 100;

/// What [`ChatLog::ingest`] did with a message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Ingested {
    Added,
    Updated,
    Ignored,
}

/// The local, chronologically ordered message list of one room.
#[derive(Debug, Clone)]
pub struct ChatLog {
    me: ClientId,
    capacity: usize,
    messages: Vec<ChatMessage>,
    versions: Ledger<MessageId, Timestamp>,
    open: bool,
    unread: usize,
}

impl ChatLog {
    pub fn new(me: ClientId) -> Self {
        Self::with_capacity(me, DEFAULT_HISTORY)
    }

    pub fn with_capacity(me: ClientId, capacity: usize) -> Self {
        Self {
            me,
            capacity: capacity.max(1),
            messages: Vec::new(),
            versions: Ledger::new(),
            open: false,
            unread: 0,
        }
    }

    /// Replace the log with loaded history, keeping the most recent
    /// messages.
    pub fn load(&mut self, mut messages: Vec<ChatMessage>) {
        messages.sort_by_key(|m| m.created_at);
        let skip = messages.len().saturating_sub(self.capacity);
        self.messages = messages.into_iter().skip(skip).collect();
        self.versions.clear();
        for message in &self.messages {
            self.versions.offer(message.id, message.updated_at);
        }
        self.unread = 0;
    }

    /// Apply a message from any source.
    pub fn ingest(&mut self, message: ChatMessage) -> Ingested {
        match self.versions.offer(message.id, message.updated_at) {
            Freshness::Stale => Ingested::Ignored,
            Freshness::Newer => {
                if let Some(slot) = self.messages.iter_mut().find(|m| m.id == message.id) {
                    *slot = message;
                }
                Ingested::Updated
            }
            Freshness::New => {
                let at = self
                    .messages
                    .partition_point(|m| m.created_at <= message.created_at);
                // Older than everything in a full log: it would be evicted at once.
                if at == 0 && self.messages.len() >= self.capacity {
                    self.versions.forget(&message.id);
                    return Ingested::Ignored;
                }
                if message.sender_id != self.me && !self.open {
                    self.unread += 1;
                }
                self.messages.insert(at, message);
                while self.messages.len() > self.capacity {
                    let evicted = self.messages.remove(0);
                    self.versions.forget(&evicted.id);
                }
                Ingested::Added
            }
        }
    }

    /// Apply a reaction map announced by a peer.
    pub fn apply_reactions(
        &mut self,
        message_id: MessageId,
        reactions: &Reactions,
        updated_at: Timestamp,
    ) -> bool {
        let Some(message) = self.messages.iter_mut().find(|m| m.id == message_id) else {
            return false;
        };
        if !self.versions.offer(message_id, updated_at).is_fresh() {
            return false;
        }
        message.reactions = reactions.clone();
        message.updated_at = updated_at;
        true
    }

    /// Toggle `reactor`'s `emoji` on a message. Returns the new reaction map
    /// and version, or `None` for an unknown message.
    pub fn toggle_reaction(
        &mut self,
        message_id: MessageId,
        emoji: &str,
        reactor: ClientId,
    ) -> Option<(Reactions, Timestamp)> {
        let message = self.messages.iter_mut().find(|m| m.id == message_id)?;
        message.reactions.toggle(emoji, reactor);
        // Versions must strictly increase even within one clock tick.
        let now = Utc::now().max(message.updated_at + chrono::Duration::milliseconds(1));
        message.updated_at = now;
        self.versions.offer(message_id, now);
        Some((message.reactions.clone(), now))
    }

    fn remove(&mut self, message_id: MessageId) -> bool {
        let before = self.messages.len();
        self.messages.retain(|m| m.id != message_id);
        self.messages.len() != before
    }

    /// Feed a realtime event. Returns `true` when the log changed.
    pub fn handle(&mut self, event: &RealtimeEvent) -> bool {
        match event {
            RealtimeEvent::Broadcast {
                event: BroadcastEvent::NewMessage(message),
                ..
            } => self.ingest(message.clone()) != Ingested::Ignored,
            RealtimeEvent::Broadcast {
                event:
                    BroadcastEvent::MessageReaction {
                        message_id,
                        reactions,
                        updated_at,
                    },
                ..
            } => self.apply_reactions(*message_id, reactions, *updated_at),
            RealtimeEvent::Change {
                change: RowChange::ChatMessages { kind, record },
                ..
            } => match kind {
                ChangeKind::Delete => self.remove(record.id),
                ChangeKind::Insert | ChangeKind::Update => {
                    self.ingest(record.clone()) != Ingested::Ignored
                }
            },
            _ => false,
        }
    }

    /// Open or close the chat panel. Opening marks everything read.
    pub fn set_open(&mut self, open: bool) {
        self.open = open;
        if open {
            self.unread = 0;
        }
    }

    pub fn is_open(&self) -> bool {
        self.open
    }

    pub fn unread(&self) -> usize {
        self.unread
    }

    pub fn messages(&self) -> &[ChatMessage] {
        &self.messages
    }

    pub fn get(&self, message_id: MessageId) -> Option<&ChatMessage> {
        self.messages.iter().find(|m| m.id == message_id)
    }
}

/// Build a message from user input.
///
/// # Errors
///
/// `EMPTY_MESSAGE` for blank text, `MESSAGE_TOO_LONG` beyond
/// [`MAX_MESSAGE_CHARS`].
pub fn compose(
    identity: &Identity,
    room_id: RoomId,
    text: &str,
    reply_to: Option<&ChatMessage>,
) -> Result<ChatMessage> {
    let text = text.trim();
    if text.is_empty() {
        return Err(GalinheiroError::rejected(ErrorCode::EmptyMessage));
    }
    if text.chars().count() > MAX_MESSAGE_CHARS {
        return Err(GalinheiroError::rejected(ErrorCode::MessageTooLong));
    }
    let now = Utc::now();
    Ok(ChatMessage {
        id: Uuid::new_v4(),
        room_id,
        sender_id: identity.client_id,
        sender_name: identity.profile.display_name.clone(),
        sender_avatar: identity.profile.avatar.clone(),
        text: text.to_string(),
        created_at: now,
        updated_at: now,
        reply_to: reply_to.map(|original| ReplySnapshot {
            message_id: original.id,
            sender_name: original.sender_name.clone(),
            text: original.text.chars().take(REPLY_PREVIEW_CHARS).collect(),
        }),
        reactions: Reactions::default(),
    })
}

/// Chat of one room: local log plus send/react against the backend and
/// the realtime service.
pub struct ChatClient {
    backend: Arc<dyn Backend>,
    publisher: Publisher,
    identity: Identity,
    room_id: RoomId,
    topic: String,
    log: ChatLog,
}

impl std::fmt::Debug for ChatClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChatClient")
            .field("topic", &self.topic)
            .field("messages", &self.log.messages().len())
            .field("unread", &self.log.unread())
            .finish()
    }
}

impl ChatClient {
    pub fn new(
        backend: Arc<dyn Backend>,
        publisher: Publisher,
        identity: Identity,
        room_id: RoomId,
        topic: impl Into<String>,
    ) -> Self {
        let log = ChatLog::new(identity.client_id);
        Self {
            backend,
            publisher,
            identity,
            room_id,
            topic: topic.into(),
            log,
        }
    }

    /// Keep at most `capacity` messages locally.
    #[must_use]
    pub fn with_history(mut self, capacity: usize) -> Self {
        self.log = ChatLog::with_capacity(self.identity.client_id, capacity);
        self
    }

    pub fn log(&self) -> &ChatLog {
        &self.log
    }

    pub fn log_mut(&mut self) -> &mut ChatLog {
        &mut self.log
    }

    /// Load the most recent messages.
    ///
    /// # Errors
    ///
    /// Backend failures; the log is left untouched.
    pub async fn load_history(&mut self) -> Result<()> {
        let limit = self.log.capacity;
        let messages = self.backend.fetch_messages(self.room_id, limit).await?;
        debug!(room_id = %self.room_id, count = messages.len(), "chat history loaded");
        self.log.load(messages);
        Ok(())
    }

    /// Send a message, optionally replying to `reply_to`.
    ///
    /// The message shows up locally right away; the broadcast to peers is
    /// queued before the insert is awaited.
    ///
    /// # Errors
    ///
    /// Validation errors (nothing is sent), or the insert failure (the
    /// message stays in the local log).
    pub async fn send(&mut self, text: &str, reply_to: Option<MessageId>) -> Result<ChatMessage> {
        let original = reply_to.and_then(|id| self.log.get(id));
        let message = compose(&self.identity, self.room_id, text, original)?;
        self.log.ingest(message.clone());

        // Queued for the client loop, which sends it while the insert runs.
        if let Err(e) = self
            .publisher
            .broadcast(self.topic.clone(), BroadcastEvent::NewMessage(message.clone()))
        {
            warn!("chat broadcast failed: {e}");
        }
        self.backend.insert_message(&message).await?;
        Ok(message)
    }

    /// Toggle the local player's `emoji` on a message.
    ///
    /// # Errors
    ///
    /// `MESSAGE_NOT_FOUND` for a message not in the log, or persistence
    /// failures.
    pub async fn react(&mut self, message_id: MessageId, emoji: &str) -> Result<()> {
        let (reactions, updated_at) = self
            .log
            .toggle_reaction(message_id, emoji, self.identity.client_id)
            .ok_or_else(|| GalinheiroError::rejected(ErrorCode::MessageNotFound))?;
        self.backend
            .update_reactions(message_id, &reactions, updated_at)
            .await?;
        let event = BroadcastEvent::MessageReaction {
            message_id,
            reactions,
            updated_at,
        };
        if let Err(e) = self.publisher.broadcast(self.topic.clone(), event) {
            warn!("reaction broadcast failed: {e}");
        }
        Ok(())
    }

    /// Feed a realtime event of this room.
    pub fn handle(&mut self, event: &RealtimeEvent) -> bool {
        if event.topic() != Some(self.topic.as_str()) {
            return false;
        }
        self.log.handle(event)
    }
}
