//! # Basic Lobby Example
//!
//! Listens to a room on the hosted realtime service:
//!
//! 1. Load (or create) the local identity
//! 2. Connect to the realtime service over WebSocket
//! 3. Subscribe to the room topic
//! 4. Log lobby traffic (music choice, players leaving, room changes) and
//!    keep a chat log, sending heartbeats on the configured period
//! 5. Shut down gracefully on Ctrl+C or disconnect
//!
//! ## Running
//!
//! ```sh
//! GALINHEIRO_REALTIME_URL=wss://project.example.co/realtime/v1/websocket \
//! GALINHEIRO_API_KEY=public-anon-key \
//! cargo run --example basic_lobby -- ABC123
//!
//! # Optional: settings file (TOML) and identity file
//! GALINHEIRO_SETTINGS=galinheiro.toml GALINHEIRO_IDENTITY=me.json cargo run --example basic_lobby -- ABC123
//! ```

use galinheiro_client::chat::ChatLog;
use galinheiro_client::identity::IdentityStore;
use galinheiro_client::protocol::{room_topic, BroadcastEvent, RoomCode, RowChange};
use galinheiro_client::{
    GameSettings, RealtimeClient, RealtimeConfig, RealtimeEvent, WebSocketTransport,
};

const DEFAULT_URL: &str = "ws://localhost:4000/realtime/v1/websocket";

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // ── Logging ─────────────────────────────────────────────────────
    // Set `RUST_LOG=debug` for verbose output.
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    // ── Configuration ───────────────────────────────────────────────
    let code: RoomCode = std::env::args()
        .nth(1)
        .unwrap_or_else(|| "ABC123".to_string())
        .parse()?;
    let settings = match std::env::var("GALINHEIRO_SETTINGS") {
        Ok(path) => GameSettings::from_toml_str(&std::fs::read_to_string(path)?)?,
        Err(_) => GameSettings::default(),
    };
    let identity_path =
        std::env::var("GALINHEIRO_IDENTITY").unwrap_or_else(|_| "galinheiro-identity.json".into());
    let identity = IdentityStore::new(identity_path).load_or_create()?;
    tracing::info!("Playing as {}", identity.display_name());

    let url = std::env::var("GALINHEIRO_REALTIME_URL").unwrap_or_else(|_| DEFAULT_URL.to_string());
    let api_key = std::env::var("GALINHEIRO_API_KEY").unwrap_or_default();

    // ── Connect ─────────────────────────────────────────────────────
    let transport = WebSocketTransport::connect_with_api_key(&url, &api_key).await?;
    let (mut client, mut event_rx) = RealtimeClient::start(transport, RealtimeConfig::default());
    let topic = room_topic(&code);
    client.subscribe(topic.clone())?;

    let mut chat = ChatLog::new(identity.client_id);
    let mut heartbeat = tokio::time::interval(settings.timings.heartbeat());

    // ── Event loop ──────────────────────────────────────────────────
    loop {
        tokio::select! {
            event = event_rx.recv() => {
                let Some(event) = event else {
                    tracing::info!("Event channel closed, exiting");
                    break;
                };
                if chat.handle(&event) {
                    if let Some(last) = chat.messages().last() {
                        tracing::info!("[chat] {}: {} ({} unread)", last.sender_name, last.text, chat.unread());
                    }
                    continue;
                }

                match event {
                    RealtimeEvent::Connected => tracing::info!("Connected, joining {topic}…"),
                    RealtimeEvent::Subscribed { topic } => tracing::info!("Listening on {topic}"),
                    RealtimeEvent::SubscribeFailed { reason, error_code, .. } => {
                        tracing::error!("Subscription refused [{error_code:?}]: {reason}");
                        break;
                    }
                    RealtimeEvent::Broadcast { event, .. } => match event {
                        BroadcastEvent::GenreSelected { genre_name, .. } => {
                            tracing::info!("Host picked the genre {genre_name}");
                        }
                        BroadcastEvent::AlbumSelected { album_name, cover_url, .. } => {
                            let cover = cover_url.map(|path| settings.storage.cover_url(&path));
                            tracing::info!("Host picked the album {album_name} (cover: {cover:?})");
                        }
                        BroadcastEvent::NewRoundStarting { round_number, .. } => {
                            tracing::info!("Round {round_number} is starting");
                        }
                        BroadcastEvent::PlayerLeft { display_name, .. } => {
                            tracing::info!("{display_name} left the room");
                        }
                        other => tracing::debug!("Broadcast: {other:?}"),
                    },
                    RealtimeEvent::Change { change: RowChange::GameRooms { record, .. }, .. } => {
                        tracing::info!("Room {} is now {:?}", record.code, record.status);
                    }
                    RealtimeEvent::Change { change: RowChange::RoomParticipants { kind, record }, .. } => {
                        tracing::info!("Participant {} ({kind:?})", record.display_name);
                    }
                    RealtimeEvent::Disconnected { reason } => {
                        tracing::warn!("Disconnected: {}", reason.as_deref().unwrap_or("unknown"));
                        break;
                    }
                    other => tracing::debug!("Event: {other:?}"),
                }
            }

            _ = heartbeat.tick() => {
                if let Err(e) = client.heartbeat() {
                    tracing::warn!("Heartbeat failed: {e}");
                }
            }

            _ = tokio::signal::ctrl_c() => {
                tracing::info!("Ctrl+C received, shutting down…");
                break;
            }
        }
    }

    // ── Cleanup ─────────────────────────────────────────────────────
    client.shutdown().await;
    tracing::info!("Client shut down. Tchau!");
    Ok(())
}
