#![allow(
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::panic,
    clippy::todo,
    clippy::unimplemented,
    clippy::indexing_slicing,
    dead_code
)]
//! Shared test utilities for Galinheiro client integration tests.
//!
//! Provides a scripted [`MockTransport`], helpers for building server frame
//! JSON, and fixtures around [`MemoryBackend`].

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex as StdMutex};
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use galinheiro_client::backends::Question;
use galinheiro_client::identity::Profile;
use galinheiro_client::protocol::{
    Avatar, BroadcastEvent, ChangeKind, ChatMessage, Reactions, Room, RowChange, ServerFrame,
};
use galinheiro_client::{
    GalinheiroError, GameSettings, Identity, MemoryBackend, RealtimeEvent, Transport,
};
use tokio::sync::mpsc;
use uuid::Uuid;

// ── MockTransport ───────────────────────────────────────────────────

/// A scripted transport.
///
/// Scripted frames are consumed in order by `recv()`; once the script is
/// exhausted `recv()` pends forever. Every frame sent by the client is
/// recorded in `sent`.
pub struct MockTransport {
    incoming: VecDeque<Option<Result<String, GalinheiroError>>>,
    pub sent: Arc<StdMutex<Vec<String>>>,
    pub closed: Arc<AtomicBool>,
}

impl MockTransport {
    pub fn new(
        incoming: Vec<Option<Result<String, GalinheiroError>>>,
    ) -> (Self, Arc<StdMutex<Vec<String>>>, Arc<AtomicBool>) {
        let sent = Arc::new(StdMutex::new(Vec::new()));
        let closed = Arc::new(AtomicBool::new(false));
        let transport = Self {
            incoming: VecDeque::from(incoming),
            sent: Arc::clone(&sent),
            closed: Arc::clone(&closed),
        };
        (transport, sent, closed)
    }
}

#[async_trait]
impl Transport for MockTransport {
    async fn send(&mut self, message: String) -> Result<(), GalinheiroError> {
        self.sent.lock().unwrap().push(message);
        Ok(())
    }

    async fn recv(&mut self) -> Option<Result<String, GalinheiroError>> {
        if let Some(item) = self.incoming.pop_front() {
            item
        } else {
            std::future::pending().await
        }
    }

    async fn close(&mut self) -> Result<(), GalinheiroError> {
        self.closed.store(true, Ordering::Relaxed);
        Ok(())
    }
}

// ── Frame JSON helpers ──────────────────────────────────────────────

fn frame_json(frame: &ServerFrame) -> String {
    serde_json::to_string(frame).expect("server frame serialization")
}

pub fn subscribed_json(topic: &str) -> String {
    frame_json(&ServerFrame::Subscribed {
        topic: topic.into(),
    })
}

pub fn broadcast_json(topic: &str, event: BroadcastEvent) -> String {
    frame_json(&ServerFrame::Broadcast {
        topic: topic.into(),
        event,
    })
}

pub fn change_json(topic: &str, change: RowChange) -> String {
    frame_json(&ServerFrame::Change {
        topic: topic.into(),
        change,
    })
}

pub fn room_update_json(topic: &str, room: &Room) -> String {
    change_json(
        topic,
        RowChange::GameRooms {
            kind: ChangeKind::Update,
            record: room.clone(),
        },
    )
}

pub fn channel_error_json(message: &str) -> String {
    frame_json(&ServerFrame::ChannelError {
        topic: None,
        message: message.into(),
        error_code: None,
    })
}

pub fn heartbeat_ack_json() -> String {
    frame_json(&ServerFrame::HeartbeatAck)
}

// ── Domain fixtures ─────────────────────────────────────────────────

pub fn identity(name: &str) -> Identity {
    Identity::generate(Profile::new(name, Avatar::default()).expect("valid display name"))
}

pub fn chat_message(room_id: Uuid, sender: &Identity, text: &str) -> ChatMessage {
    let now = Utc::now();
    ChatMessage {
        id: Uuid::new_v4(),
        room_id,
        sender_id: sender.client_id,
        sender_name: sender.display_name().to_string(),
        sender_avatar: sender.profile.avatar.clone(),
        text: text.into(),
        created_at: now,
        updated_at: now,
        reply_to: None,
        reactions: Reactions::default(),
    }
}

/// A question bank whose correct answer is always the option at `correct`.
pub fn questions(count: usize, correct: usize) -> Vec<Question> {
    (0..count)
        .map(|n| Question {
            song_id: Uuid::new_v4(),
            audio_url: Some(format!("https://cdn.example.test/songs/{n}.mp3")),
            options: [
                format!("Song {n}A"),
                format!("Song {n}B"),
                format!("Song {n}C"),
                format!("Song {n}D"),
            ],
            correct_index: correct,
        })
        .collect()
}

/// A backend with one room hosted by `host`, with a seeded question bank.
pub async fn backend_with_room(
    host: &Identity,
    settings: &GameSettings,
) -> (Arc<MemoryBackend>, Room) {
    let backend = Arc::new(MemoryBackend::new());
    let room = backend.create_room(host, settings).await;
    let count = usize::try_from(settings.total_rounds).unwrap();
    backend.seed_questions(room.id, questions(count, 0)).await;
    (backend, room)
}

/// Receive events until `pred` matches, failing after `within`.
pub async fn wait_for<F>(
    events: &mut mpsc::Receiver<RealtimeEvent>,
    within: Duration,
    mut pred: F,
) -> RealtimeEvent
where
    F: FnMut(&RealtimeEvent) -> bool,
{
    tokio::time::timeout(within, async {
        loop {
            let event = events.recv().await.expect("event channel closed");
            if pred(&event) {
                return event;
            }
        }
    })
    .await
    .expect("timed out waiting for event")
}
