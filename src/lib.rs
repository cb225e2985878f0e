//! # Galinheiro Client
//!
//! Client core for Galinheiro Musical, a multiplayer music-trivia game.
//!
//! Players join a room with a six-character code, the host picks a genre and
//! an album, and everyone guesses which song is playing out of four options.
//! Correct answers earn eggs, with a bonus for answering fast.
//!
//! The crate is split along the same seams as the game:
//!
//! - [`client`] keeps a realtime subscription per room over any [`Transport`]
//!   and turns server frames into [`RealtimeEvent`]s
//! - [`backend`] is the data service seam (rooms, participants, rounds,
//!   answers, chat); [`MemoryBackend`] implements it in process
//! - [`lobby`], [`arena`], [`chat`] and [`presence`] hold the per-screen
//!   logic, with [`round::RoundMachine`] as the pure round state machine
//!
//! ## Quick start
//!
//! ```no_run
//! use std::sync::Arc;
//!
//! use galinheiro_client::identity::Profile;
//! use galinheiro_client::protocol::Avatar;
//! use galinheiro_client::{
//!     Backend, GameSettings, Identity, Lobby, LoopbackHub, MemoryBackend, RealtimeClient,
//!     RealtimeConfig,
//! };
//!
//! # async fn run() -> galinheiro_client::Result<()> {
//! let backend = Arc::new(MemoryBackend::new());
//! let host = Identity::generate(Profile::new("Galo", Avatar::default())?);
//! let room = backend.create_room(&host, &GameSettings::default()).await;
//!
//! let hub = LoopbackHub::new();
//! let (client, mut events) = RealtimeClient::start(hub.connect(), RealtimeConfig::default());
//!
//! let shared: Arc<dyn Backend> = backend;
//! match Lobby::join(shared, host, room.code.as_str()).await {
//!     Ok(lobby) => client.subscribe(lobby.topic())?,
//!     Err(failure) => println!("{} -> {}", failure.notice.message, failure.redirect),
//! }
//! # let _ = events.recv().await;
//! # Ok(())
//! # }
//! ```

pub mod arena;
pub mod backend;
pub mod backends;
pub mod chat;
pub mod client;
pub mod config;
pub mod error;
pub mod error_codes;
pub mod event;
pub mod identity;
pub mod ingest;
pub mod lobby;
pub mod notice;
pub mod presence;
pub mod protocol;
pub mod ranking;
pub mod round;
pub mod routes;
pub mod transport;
pub mod transports;

// Re-export primary types for ergonomic imports.
pub use arena::{Arena, ArenaCommand, ArenaUpdate};
pub use backend::Backend;
pub use backends::MemoryBackend;
pub use chat::{ChatClient, ChatLog};
pub use client::{Publisher, RealtimeClient, RealtimeConfig};
pub use config::GameSettings;
pub use error::{GalinheiroError, Result};
pub use error_codes::ErrorCode;
pub use event::RealtimeEvent;
pub use identity::Identity;
pub use lobby::Lobby;
pub use notice::Notice;
pub use presence::Presence;
pub use protocol::{BroadcastEvent, ClientFrame, RoomCode, RowChange, ServerFrame};
pub use round::RoundMachine;
pub use routes::Route;
pub use transport::Transport;
pub use transports::{LoopbackHub, LoopbackTransport};

#[cfg(feature = "transport-websocket")]
pub use transports::WebSocketTransport;
