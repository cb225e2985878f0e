//! # Local Game Example
//!
//! Plays a whole game in one process, with no server at all:
//!
//! - [`MemoryBackend`] stands in for the data service
//! - [`LoopbackHub`] stands in for the realtime service, fed with the
//!   backend's row changes
//! - two players ("Galo" hosting, "Pintinho" joining) go through the lobby,
//!   chat a little, play every round and end up in the round lobby
//!
//! ## Running
//!
//! ```sh
//! cargo run --example local_game
//! RUST_LOG=galinheiro_client=debug cargo run --example local_game
//! ```

use std::sync::Arc;
use std::time::Duration;

use galinheiro_client::arena::ArenaUpdate;
use galinheiro_client::backends::Question;
use galinheiro_client::identity::Profile;
use galinheiro_client::protocol::{room_topic, Avatar};
use galinheiro_client::{
    Arena, Backend, ChatClient, GameSettings, Identity, Lobby, LoopbackHub, MemoryBackend,
    Presence, RealtimeClient, RealtimeConfig, RoundMachine, Route,
};
use tokio::sync::mpsc;
use uuid::Uuid;

const SETTINGS: &str = r#"
total_rounds = 3
round_duration_secs = 10

[scoring]
eggs_per_correct = 10
speed_bonus_threshold = 80
speed_bonus_eggs = 5
"#;

fn question_bank() -> Vec<Question> {
    let songs = [
        ("Águas de Março", ["Águas de Março", "Garota de Ipanema", "Corcovado", "Wave"]),
        ("Asa Branca", ["Xote das Meninas", "Asa Branca", "Baião", "Juazeiro"]),
        ("Trem das Onze", ["Saudosa Maloca", "Iracema", "Samba do Arnesto", "Trem das Onze"]),
    ];
    songs
        .into_iter()
        .map(|(answer, options)| Question {
            song_id: Uuid::new_v4(),
            audio_url: Some(format!("songs/{}.mp3", answer.to_lowercase().replace(' ', "-"))),
            correct_index: options.iter().position(|o| *o == answer).unwrap_or(0),
            options: options.map(str::to_string),
        })
        .collect()
}

/// Drive one arena: answer every question with `pick`, print what happens,
/// return where the arena sent us.
async fn play(
    name: &'static str,
    arena: Arena,
    mut updates: mpsc::Receiver<ArenaUpdate>,
    pick: impl Fn(u32) -> usize,
    delay: Duration,
) -> Option<Route> {
    while let Some(update) = updates.recv().await {
        match update {
            ArenaUpdate::Question(view) => {
                tracing::info!("[{name}] round {}/{}: {:?}", view.number, view.total_rounds, view.options);
                tokio::time::sleep(delay).await;
                if let Err(e) = arena.select(pick(view.number)) {
                    tracing::warn!("[{name}] could not answer: {e}");
                }
            }
            ArenaUpdate::Results(result) => {
                let verdict = if result.is_correct() { "right" } else { "wrong" };
                tracing::info!("[{name}] {verdict}! +{} eggs. {}", result.eggs, result.message);
            }
            ArenaUpdate::Notice(notice) => tracing::info!("[{name}] {}", notice.message),
            ArenaUpdate::Navigate(route) => return Some(route),
            _ => {}
        }
    }
    None
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    // ── Services ────────────────────────────────────────────────────
    let settings = GameSettings::from_toml_str(SETTINGS)?;
    let memory = Arc::new(MemoryBackend::new());
    let hub = LoopbackHub::new();
    let _relay = hub.relay(memory.subscribe_changes());

    let galo = Identity::generate(Profile::new("Galo", Avatar::Emoji("🐓".into()))?);
    let pintinho = Identity::generate(Profile::new("Pintinho", Avatar::Emoji("🐤".into()))?);

    let room = memory.create_room(&galo, &settings).await;
    memory.seed_questions(room.id, question_bank()).await;
    let backend: Arc<dyn Backend> = memory;
    let topic = room_topic(&room.code);
    tracing::info!("Room {} created", room.code);

    // ── Lobby ───────────────────────────────────────────────────────
    let join = |identity: Identity| Lobby::join(Arc::clone(&backend), identity, room.code.as_str());
    let mut host = join(galo.clone()).await.map_err(|f| f.notice.message)?;
    let guest = join(pintinho.clone()).await.map_err(|f| f.notice.message)?;

    let (mut host_client, host_events) = RealtimeClient::start(hub.connect(), RealtimeConfig::default());
    let (mut guest_client, guest_events) = RealtimeClient::start(hub.connect(), RealtimeConfig::default());
    host_client.subscribe(topic.clone())?;
    guest_client.subscribe(topic.clone())?;

    let mut host_presence = Presence::start(
        Arc::clone(&backend),
        room.id,
        galo.client_id,
        true,
        &settings.timings,
    );

    let mut chat = ChatClient::new(
        Arc::clone(&backend),
        guest_client.publisher(),
        pintinho,
        room.id,
        topic.clone(),
    );
    chat.send("bora! 🐣", None).await?;

    let genre = host.select_genre(Uuid::new_v4(), "MPB").await?;
    host_client.broadcast(topic.clone(), genre)?;
    let album = host.select_album(Uuid::new_v4(), "Clássicos", None).await?;
    host_client.broadcast(topic.clone(), album)?;
    let session_id = host.start_game().await?;
    tracing::info!("Game started with {} players", host.roster().len());

    // ── Arena ───────────────────────────────────────────────────────
    let machine = |lobby: &Lobby| {
        RoundMachine::new(lobby.code().clone(), session_id, lobby.participant_id(), &settings)
            .with_host(lobby.is_host())
            .with_spectator(lobby.is_spectator())
    };
    let (host_arena, host_updates) = Arena::start(
        Arc::clone(&backend),
        host_client.publisher(),
        room.id,
        machine(&host),
        host_events,
    );
    let (guest_arena, guest_updates) = Arena::start(
        Arc::clone(&backend),
        guest_client.publisher(),
        room.id,
        machine(&guest),
        guest_events,
    );

    let bank = question_bank();
    let correct: Vec<usize> = bank.iter().map(|q| q.correct_index).collect();
    let host_pick = move |round: u32| {
        let index = usize::try_from(round).unwrap_or(1).saturating_sub(1);
        correct.get(index).copied().unwrap_or(0)
    };
    let (host_route, guest_route) = tokio::join!(
        play("Galo", host_arena, host_updates, host_pick, Duration::from_millis(300)),
        play("Pintinho", guest_arena, guest_updates, |_| 1, Duration::from_millis(900)),
    );
    tracing::info!("Galo → {host_route:?}, Pintinho → {guest_route:?}");

    // ── Round lobby ─────────────────────────────────────────────────
    host.enter_round_lobby().await?;
    for standing in host.standings() {
        tracing::info!(
            "#{} {} {} eggs ({} correct)",
            standing.position,
            standing.participant.display_name,
            standing.participant.eggs,
            standing.participant.correct_answers
        );
    }

    host_presence.stop().await;
    host_client.shutdown().await;
    guest_client.shutdown().await;
    Ok(())
}
