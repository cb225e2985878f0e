#![allow(
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::panic,
    clippy::indexing_slicing
)]
//! End-to-end room flows over the in-memory backend and the loopback
//! realtime service: joining, host controls, spectators, chat and a full
//! two-player game.

mod common;

use std::sync::Arc;
use std::time::Duration;

use galinheiro_client::arena::ArenaUpdate;
use galinheiro_client::protocol::{room_topic, BroadcastEvent, RoomStatus, RowChange};
use galinheiro_client::routes::{check_arena_entry, ArenaEntry};
use galinheiro_client::{
    Arena, Backend, ChatClient, ErrorCode, GameSettings, Identity, Lobby, LoopbackHub,
    MemoryBackend, RealtimeClient, RealtimeConfig, RealtimeEvent, Route, RoundMachine,
};
use tokio::sync::mpsc;
use uuid::Uuid;

use common::{backend_with_room, identity, wait_for};

const WAIT: Duration = Duration::from_secs(5);

/// A connected player: realtime client plus its event receiver, already
/// subscribed to the room topic.
struct Player {
    client: RealtimeClient,
    events: mpsc::Receiver<RealtimeEvent>,
}

async fn connect(hub: &LoopbackHub, topic: &str) -> Player {
    let (client, mut events) = RealtimeClient::start(hub.connect(), RealtimeConfig::default());
    client.subscribe(topic).unwrap();
    wait_for(&mut events, WAIT, |e| {
        matches!(e, RealtimeEvent::Subscribed { .. })
    })
    .await;
    Player { client, events }
}

/// Feed events to `lobby` until it asks to navigate.
async fn next_route(lobby: &mut Lobby, events: &mut mpsc::Receiver<RealtimeEvent>) -> Route {
    tokio::time::timeout(WAIT, async {
        loop {
            let event = events.recv().await.expect("event channel closed");
            if let Some(route) = lobby.handle(&event).await.unwrap() {
                return route;
            }
        }
    })
    .await
    .expect("timed out waiting for navigation")
}

fn shared(backend: &Arc<MemoryBackend>) -> Arc<dyn Backend> {
    Arc::clone(backend) as Arc<dyn Backend>
}

// ════════════════════════════════════════════════════════════════════
// Joining
// ════════════════════════════════════════════════════════════════════

#[tokio::test]
async fn two_players_share_a_roster() {
    let host = identity("Galo");
    let (backend, room) = backend_with_room(&host, &GameSettings::default()).await;

    let lowercase = room.code.as_str().to_ascii_lowercase();
    let mut guest = Lobby::join(shared(&backend), identity("Pintinho"), &lowercase)
        .await
        .unwrap();
    let mut host_lobby = Lobby::join(shared(&backend), host, room.code.as_str())
        .await
        .unwrap();
    guest.reload().await.unwrap();
    host_lobby.reload().await.unwrap();

    assert_eq!(guest.code(), &room.code);
    assert_eq!(guest.roster().len(), 2);
    assert_eq!(host_lobby.roster().len(), 2);
    assert!(host_lobby.is_host());
    assert!(!guest.is_host());
    assert!(!guest.is_spectator());
    assert_eq!(guest.me().unwrap().display_name, "Pintinho");
}

#[tokio::test]
async fn rejoining_keeps_a_single_row() {
    let host = identity("Galo");
    let (backend, room) = backend_with_room(&host, &GameSettings::default()).await;
    let guest = identity("Pintinho");

    let first = Lobby::join(shared(&backend), guest.clone(), room.code.as_str())
        .await
        .unwrap();
    let second = Lobby::join(shared(&backend), guest, room.code.as_str())
        .await
        .unwrap();

    assert_eq!(first.participant_id(), second.participant_id());
    assert_eq!(second.roster().len(), 2);
}

#[tokio::test]
async fn unknown_room_redirects_home_with_notice() {
    let backend: Arc<dyn Backend> = Arc::new(MemoryBackend::new());
    let failure = Lobby::join(backend, identity("Galo"), "ZZZ999")
        .await
        .unwrap_err();
    assert_eq!(failure.redirect, Route::Home);
    assert_eq!(failure.notice.message, ErrorCode::RoomNotFound.description());
}

// ════════════════════════════════════════════════════════════════════
// Host controls over realtime
// ════════════════════════════════════════════════════════════════════

#[tokio::test]
async fn guest_follows_host_choices_into_the_game() {
    let host = identity("Galo");
    let (backend, room) = backend_with_room(&host, &GameSettings::default()).await;
    let hub = LoopbackHub::new();
    let _relay = hub.relay(backend.subscribe_changes());
    let topic = room_topic(&room.code);

    let mut host_lobby = Lobby::join(shared(&backend), host, room.code.as_str())
        .await
        .unwrap();
    let mut guest = Lobby::join(shared(&backend), identity("Pintinho"), room.code.as_str())
        .await
        .unwrap();
    let host_player = connect(&hub, &topic).await;
    let mut guest_player = connect(&hub, &topic).await;

    let genre_id = Uuid::new_v4();
    let announce = host_lobby.select_genre(genre_id, "Samba").await.unwrap();
    host_player.client.broadcast(&topic, announce).unwrap();
    let album_id = Uuid::new_v4();
    let announce = host_lobby
        .select_album(album_id, "Tropicália", Some("covers/tropicalia.jpg".into()))
        .await
        .unwrap();
    host_player.client.broadcast(&topic, announce).unwrap();
    assert_eq!(host_lobby.room().status, RoomStatus::Waiting);

    tokio::time::timeout(WAIT, async {
        while guest.music_choice().album.is_none() {
            let event = guest_player.events.recv().await.expect("event channel closed");
            assert_eq!(guest.handle(&event).await.unwrap(), None);
        }
    })
    .await
    .expect("album choice never arrived");

    let session_id = host_lobby.start_game().await.unwrap();
    let route = next_route(&mut guest, &mut guest_player.events).await;

    assert_eq!(
        route,
        Route::Game {
            code: room.code.clone(),
            session_id: Some(session_id),
        }
    );
    let choice = guest.music_choice();
    assert_eq!(choice.genre, Some((genre_id, "Samba".to_string())));
    assert_eq!(choice.album, Some((album_id, "Tropicália".to_string())));
    assert_eq!(guest.room().status, RoomStatus::InProgress);

    let entry = check_arena_entry(&*backend, &room.code, Some(session_id))
        .await
        .unwrap();
    assert!(matches!(entry, ArenaEntry::Enter(session) if session.id == session_id));
}

#[tokio::test]
async fn only_the_host_can_drive_the_room() {
    let host = identity("Galo");
    let (backend, room) = backend_with_room(&host, &GameSettings::default()).await;
    let mut guest = Lobby::join(shared(&backend), identity("Pintinho"), room.code.as_str())
        .await
        .unwrap();

    let err = guest.select_genre(Uuid::new_v4(), "Axé").await.unwrap_err();
    assert_eq!(err.code(), Some(&ErrorCode::NotHost));
    let err = guest.start_game().await.unwrap_err();
    assert_eq!(err.code(), Some(&ErrorCode::NotHost));
    assert_eq!(
        backend.fetch_room(&room.code).await.unwrap().unwrap().status,
        RoomStatus::Lobby
    );
}

#[tokio::test]
async fn player_left_broadcast_reloads_the_roster() {
    let host = identity("Galo");
    let (backend, room) = backend_with_room(&host, &GameSettings::default()).await;
    let hub = LoopbackHub::new();
    let topic = room_topic(&room.code);

    let mut host_lobby = Lobby::join(shared(&backend), host, room.code.as_str())
        .await
        .unwrap();
    let guest = Lobby::join(shared(&backend), identity("Pintinho"), room.code.as_str())
        .await
        .unwrap();
    host_lobby.reload().await.unwrap();
    assert_eq!(host_lobby.roster().len(), 2);

    let mut host_player = connect(&hub, &topic).await;
    let guest_player = connect(&hub, &topic).await;
    let announce = guest.leave().await.unwrap();
    guest_player.client.broadcast(&topic, announce).unwrap();

    let event = wait_for(&mut host_player.events, WAIT, |e| {
        matches!(
            e,
            RealtimeEvent::Broadcast {
                event: BroadcastEvent::PlayerLeft { .. },
                ..
            }
        )
    })
    .await;
    assert_eq!(host_lobby.handle(&event).await.unwrap(), None);
    assert_eq!(host_lobby.roster().len(), 1);
}

// ════════════════════════════════════════════════════════════════════
// Spectators and the round lobby
// ════════════════════════════════════════════════════════════════════

#[tokio::test]
async fn late_joiner_plays_the_next_game() {
    let host = identity("Galo");
    let settings = GameSettings::default().with_total_rounds(1);
    let (backend, room) = backend_with_room(&host, &settings).await;
    let mut host_lobby = Lobby::join(shared(&backend), host, room.code.as_str())
        .await
        .unwrap();
    let first_session = host_lobby.start_game().await.unwrap();

    let mut late = Lobby::join(shared(&backend), identity("Atrasado"), room.code.as_str())
        .await
        .unwrap();
    assert!(late.is_spectator());

    host_lobby.enter_round_lobby().await.unwrap();
    late.refresh().await.unwrap();
    assert_eq!(late.room().status, RoomStatus::RoundLobby);
    assert!(!late.is_spectator());
    assert_eq!(late.standings().len(), 2);

    let entry = check_arena_entry(&*backend, &room.code, Some(first_session))
        .await
        .unwrap();
    assert_eq!(entry, ArenaEntry::Redirect(Route::Lobby(room.code.clone())));

    let second_session = host_lobby.start_next_game().await.unwrap();
    assert_ne!(first_session, second_session);
    late.refresh().await.unwrap();
    assert_eq!(late.room().session_id, Some(second_session));
    assert!(!late.is_spectator());
}

#[tokio::test]
async fn completed_rooms_cannot_be_joined() {
    let host = identity("Galo");
    let (backend, room) = backend_with_room(&host, &GameSettings::default()).await;
    backend
        .set_room_status(room.id, RoomStatus::Completed)
        .await
        .unwrap();

    let failure = Lobby::join(shared(&backend), identity("Pintinho"), room.code.as_str())
        .await
        .unwrap_err();
    assert_eq!(failure.redirect, Route::Home);
    assert_eq!(failure.notice.message, ErrorCode::RoomNotInLobby.description());
}

// ════════════════════════════════════════════════════════════════════
// Chat
// ════════════════════════════════════════════════════════════════════

#[tokio::test]
async fn chat_message_arrives_once_through_both_paths() {
    let host = identity("Galo");
    let (backend, room) = backend_with_room(&host, &GameSettings::default()).await;
    let hub = LoopbackHub::new();
    let _relay = hub.relay(backend.subscribe_changes());
    let topic = room_topic(&room.code);

    let guest = identity("Pintinho");
    Lobby::join(shared(&backend), guest.clone(), room.code.as_str())
        .await
        .unwrap();
    let sender = connect(&hub, &topic).await;
    let mut receiver = connect(&hub, &topic).await;

    let mut host_chat = ChatClient::new(
        shared(&backend),
        sender.client.publisher(),
        host,
        room.id,
        topic.clone(),
    );
    let mut guest_chat = ChatClient::new(
        shared(&backend),
        receiver.client.publisher(),
        guest,
        room.id,
        topic.clone(),
    );

    let sent = host_chat.send("quem canta essa?", None).await.unwrap();
    assert_eq!(host_chat.log().messages().len(), 1);

    // The optimistic broadcast and the persisted row both arrive; only the
    // first one adds the message.
    let mut added = 0;
    let (mut seen_broadcast, mut seen_row) = (false, false);
    tokio::time::timeout(WAIT, async {
        while !(seen_broadcast && seen_row) {
            let event = receiver.events.recv().await.expect("event channel closed");
            match &event {
                RealtimeEvent::Broadcast {
                    event: BroadcastEvent::NewMessage(_),
                    ..
                } => seen_broadcast = true,
                RealtimeEvent::Change {
                    change: RowChange::ChatMessages { .. },
                    ..
                } => seen_row = true,
                _ => {}
            }
            if guest_chat.handle(&event) {
                added += 1;
            }
        }
    })
    .await
    .expect("timed out waiting for the message");
    assert_eq!(added, 1);

    assert_eq!(guest_chat.log().messages().len(), 1);
    assert_eq!(guest_chat.log().messages()[0].id, sent.id);
    assert_eq!(guest_chat.log().unread(), 1);

    guest_chat.log_mut().set_open(true);
    assert_eq!(guest_chat.log().unread(), 0);

    let mut late_reader = ChatClient::new(
        shared(&backend),
        receiver.client.publisher(),
        identity("Leitor"),
        room.id,
        topic,
    );
    late_reader.load_history().await.unwrap();
    assert_eq!(late_reader.log().messages().len(), 1);
}

#[tokio::test]
async fn reactions_converge_on_the_latest_version() {
    let host = identity("Galo");
    let (backend, room) = backend_with_room(&host, &GameSettings::default()).await;
    let hub = LoopbackHub::new();
    let topic = room_topic(&room.code);
    let sender = connect(&hub, &topic).await;
    let mut receiver = connect(&hub, &topic).await;

    let guest = identity("Pintinho");
    let mut host_chat = ChatClient::new(
        shared(&backend),
        sender.client.publisher(),
        host.clone(),
        room.id,
        topic.clone(),
    );
    let mut guest_chat = ChatClient::new(
        shared(&backend),
        receiver.client.publisher(),
        guest,
        room.id,
        topic,
    );

    let message = host_chat.send("que música!", None).await.unwrap();
    wait_for(&mut receiver.events, WAIT, |e| guest_chat.handle(e)).await;

    host_chat.react(message.id, "🔥").await.unwrap();
    wait_for(&mut receiver.events, WAIT, |e| guest_chat.handle(e)).await;

    let seen = guest_chat.log().get(message.id).unwrap();
    assert_eq!(seen.reactions.count("🔥"), 1);
    assert_eq!(
        seen.reactions.reactors("🔥").next(),
        Some(&host.client_id)
    );
}

// ════════════════════════════════════════════════════════════════════
// Full game
// ════════════════════════════════════════════════════════════════════

async fn until_question(updates: &mut mpsc::Receiver<ArenaUpdate>, number: u32) {
    loop {
        match updates.recv().await.expect("arena stopped") {
            ArenaUpdate::Question(view) if view.number == number => return,
            _ => {}
        }
    }
}

async fn until_results(updates: &mut mpsc::Receiver<ArenaUpdate>) -> u32 {
    loop {
        if let ArenaUpdate::Results(result) = updates.recv().await.expect("arena stopped") {
            return result.eggs;
        }
    }
}

async fn until_navigation(updates: &mut mpsc::Receiver<ArenaUpdate>) -> Route {
    loop {
        if let ArenaUpdate::Navigate(route) = updates.recv().await.expect("arena stopped") {
            return route;
        }
    }
}

fn machine_for(lobby: &Lobby, session_id: Uuid, settings: &GameSettings) -> RoundMachine {
    RoundMachine::new(
        lobby.code().clone(),
        session_id,
        lobby.participant_id(),
        settings,
    )
    .with_host(lobby.is_host())
    .with_spectator(lobby.is_spectator())
}

fn identity_pair() -> (Identity, Identity) {
    (identity("Galo"), identity("Pintinho"))
}

#[tokio::test(start_paused = true)]
async fn two_players_finish_a_two_round_game() {
    let (host, guest) = identity_pair();
    let settings = GameSettings::default().with_total_rounds(2);
    let (backend, room) = backend_with_room(&host, &settings).await;
    let hub = LoopbackHub::new();
    let _relay = hub.relay(backend.subscribe_changes());
    let topic = room_topic(&room.code);

    let mut host_lobby = Lobby::join(shared(&backend), host, room.code.as_str())
        .await
        .unwrap();
    let guest_lobby = Lobby::join(shared(&backend), guest, room.code.as_str())
        .await
        .unwrap();
    let host_player = connect(&hub, &topic).await;
    let guest_player = connect(&hub, &topic).await;
    let session_id = host_lobby.start_game().await.unwrap();

    let (host_arena, mut host_updates) = Arena::start(
        shared(&backend),
        host_player.client.publisher(),
        room.id,
        machine_for(&host_lobby, session_id, &settings),
        host_player.events,
    );
    let (guest_arena, mut guest_updates) = Arena::start(
        shared(&backend),
        guest_player.client.publisher(),
        room.id,
        machine_for(&guest_lobby, session_id, &settings),
        guest_player.events,
    );

    for round in 1..=2 {
        until_question(&mut host_updates, round).await;
        until_question(&mut guest_updates, round).await;
        host_arena.select(0).unwrap();
        guest_arena.select(0).unwrap();
        assert_eq!(until_results(&mut host_updates).await, 15);
        assert_eq!(until_results(&mut guest_updates).await, 15);
    }

    let lobby = Route::RoundLobby(room.code.clone());
    assert_eq!(until_navigation(&mut host_updates).await, lobby);
    assert_eq!(until_navigation(&mut guest_updates).await, lobby);

    let roster = backend.fetch_participants(room.id).await.unwrap();
    assert!(roster.iter().all(|p| p.eggs == 30 && p.correct_answers == 2));

    host_lobby.enter_round_lobby().await.unwrap();
    let standings = host_lobby.standings();
    assert_eq!(standings.len(), 2);
    assert_eq!(standings[0].position, 1);
}
