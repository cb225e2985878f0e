//! Async driver of the round state machine.
//!
//! [`Arena::start`] spawns a loop that multiplexes UI commands, realtime
//! events and a 1 Hz ticker with `tokio::select!`, executes the
//! [`Effect`]s the [`RoundMachine`] asks for, and reports [`ArenaUpdate`]s
//! on a bounded channel.
//!
//! The host drives round progression: after the results of a round it
//! fetches the next one and announces it with `NEW_ROUND_STARTING`. Other
//! players follow the announcement or the `game_rooms` change carrying the
//! new `current_round`, whichever arrives first.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, oneshot};
use tokio::time::{Instant, Interval, MissedTickBehavior};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::backend::Backend;
use crate::client::Publisher;
use crate::error::{GalinheiroError, Result};
use crate::event::RealtimeEvent;
use crate::ingest::Ledger;
use crate::notice::Notice;
use crate::protocol::{
    room_topic, BroadcastEvent, ParticipantId, RoomId, RoomStatus, Round, RowChange,
    OPTION_COUNT,
};
use crate::round::{AnswerPositions, Effect, RoundMachine, RoundPhase, RoundResult};
use crate::routes::Route;

/// Capacity of the bounded update channel.
const UPDATE_CHANNEL_CAPACITY: usize = 64;

/// Ticks the results stay on screen before moving on.
const RESULTS_TICKS: u8 = 3;

const TICK: Duration = Duration::from_secs(1);

const SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(1);

/// User input for the arena.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArenaCommand {
    /// Host start button.
    Start,
    /// User gesture that allows audio playback.
    UnlockAudio,
    /// Click on an option.
    Select(usize),
    /// Leave the results screen now.
    Advance,
    /// Leave the arena.
    Leave,
}

/// A question as shown to players (without the answer).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QuestionView {
    pub number: u32,
    pub total_rounds: u32,
    pub audio_url: Option<String>,
    pub options: [String; OPTION_COUNT],
    pub duration: Duration,
}

impl QuestionView {
    fn new(round: &Round, total_rounds: u32) -> Self {
        Self {
            number: round.number,
            total_rounds,
            audio_url: round.audio_url.clone(),
            options: round.options.clone(),
            duration: Duration::from_secs(u64::from(round.duration)),
        }
    }
}

/// State changes for the UI.
#[derive(Debug, Clone, PartialEq)]
pub enum ArenaUpdate {
    Phase(RoundPhase),
    Question(QuestionView),
    Timer { remaining: Duration },
    Positions(AnswerPositions),
    Results(RoundResult),
    PrimeAudio,
    Notice(Notice),
    Navigate(Route),
}

// ── Handle ──────────────────────────────────────────────────────────

/// Handle to a running arena loop.
pub struct Arena {
    cmd_tx: mpsc::UnboundedSender<ArenaCommand>,
    task: Option<tokio::task::JoinHandle<()>>,
    shutdown_tx: Option<oneshot::Sender<()>>,
}

impl Arena {
    /// Start the arena for `machine` in room `room_id`.
    ///
    /// The countdown starts right away: the machine carries a session id.
    #[must_use = "the update receiver must be used to receive updates"]
    pub fn start(
        backend: Arc<dyn Backend>,
        publisher: Publisher,
        room_id: RoomId,
        machine: RoundMachine,
        events: mpsc::Receiver<RealtimeEvent>,
    ) -> (Self, mpsc::Receiver<ArenaUpdate>) {
        let (cmd_tx, cmd_rx) = mpsc::unbounded_channel();
        let (update_tx, update_rx) = mpsc::channel(UPDATE_CHANNEL_CAPACITY);
        let (shutdown_tx, shutdown_rx) = oneshot::channel();

        let mut ticker = tokio::time::interval(TICK);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let driver = Driver {
            topic: room_topic(machine.room_code()),
            machine,
            backend,
            publisher,
            room_id,
            updates: update_tx,
            spectators: HashMap::new(),
            answers: Ledger::new(),
            ticker,
            results_ticks: 0,
        };
        let task = tokio::spawn(arena_loop(driver, cmd_rx, events, shutdown_rx));

        let arena = Self {
            cmd_tx,
            task: Some(task),
            shutdown_tx: Some(shutdown_tx),
        };
        (arena, update_rx)
    }

    /// Queue a command.
    ///
    /// # Errors
    ///
    /// [`GalinheiroError::NotConnected`] once the loop has stopped.
    pub fn send(&self, command: ArenaCommand) -> Result<()> {
        self.cmd_tx
            .send(command)
            .map_err(|_| GalinheiroError::NotConnected)
    }

    /// # Errors
    ///
    /// [`GalinheiroError::NotConnected`] once the loop has stopped.
    pub fn select(&self, option: usize) -> Result<()> {
        self.send(ArenaCommand::Select(option))
    }

    pub fn is_running(&self) -> bool {
        self.task.as_ref().is_some_and(|task| !task.is_finished())
    }

    /// Stop the loop, aborting it if it does not exit in time.
    pub async fn shutdown(&mut self) {
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(());
        }
        if let Some(mut task) = self.task.take() {
            match tokio::time::timeout(SHUTDOWN_TIMEOUT, &mut task).await {
                Ok(Ok(())) => {}
                Ok(Err(join_err)) => warn!("arena loop terminated with join error: {join_err}"),
                Err(_) => {
                    warn!("arena loop did not exit within timeout; aborting task");
                    task.abort();
                }
            }
        }
    }
}

impl std::fmt::Debug for Arena {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Arena")
            .field("running", &self.is_running())
            .finish()
    }
}

impl Drop for Arena {
    fn drop(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}

// ── Loop ────────────────────────────────────────────────────────────

async fn arena_loop(
    mut driver: Driver,
    mut cmd_rx: mpsc::UnboundedReceiver<ArenaCommand>,
    mut events: mpsc::Receiver<RealtimeEvent>,
    mut shutdown_rx: oneshot::Receiver<()>,
) {
    debug!(topic = %driver.topic, "arena loop started");
    if let Err(e) = driver.load_roster().await {
        warn!("arena: initial roster load failed: {e}");
    }
    driver.start().await;

    let mut events_open = true;
    loop {
        tokio::select! {
            _ = &mut shutdown_rx => break,

            cmd = cmd_rx.recv() => match cmd {
                Some(ArenaCommand::Leave) | None => {
                    let lobby = Route::Lobby(driver.machine.room_code().clone());
                    driver.emit_navigation(lobby).await;
                    break;
                }
                Some(cmd) => driver.command(cmd).await,
            },

            event = events.recv(), if events_open => match event {
                Some(event) => {
                    if driver.realtime(event).await {
                        break;
                    }
                }
                None => {
                    debug!("arena: realtime event channel closed");
                    events_open = false;
                }
            },

            _ = driver.ticker.tick() => {
                if driver.tick().await {
                    break;
                }
            }
        }
    }
    debug!("arena loop exited");
}

struct Driver {
    machine: RoundMachine,
    backend: Arc<dyn Backend>,
    publisher: Publisher,
    room_id: RoomId,
    topic: String,
    updates: mpsc::Sender<ArenaUpdate>,
    /// Spectator flag per participant, from the last roster load.
    spectators: HashMap<ParticipantId, bool>,
    /// Answer rows already applied.
    answers: Ledger<Uuid, ()>,
    ticker: Interval,
    results_ticks: u8,
}

impl Driver {
    async fn start(&mut self) {
        if self.machine.trigger_start() {
            self.ticker.reset();
            self.emit(ArenaUpdate::Phase(self.machine.phase())).await;
        }
    }

    async fn load_roster(&mut self) -> Result<()> {
        let roster = self.backend.fetch_participants(self.room_id).await?;
        self.spectators = roster.iter().map(|p| (p.id, p.is_spectator)).collect();
        if let Some(me) = self.spectators.get(&self.machine.participant_id()) {
            self.machine.set_spectator(*me);
        }
        Ok(())
    }

    fn active_players(&self) -> usize {
        self.spectators.values().filter(|spectator| !**spectator).count()
    }

    async fn command(&mut self, cmd: ArenaCommand) {
        match cmd {
            ArenaCommand::Start => self.start().await,
            ArenaCommand::UnlockAudio => {
                if let Some(effect) = self.machine.unlock_audio() {
                    self.execute(effect).await;
                }
            }
            ArenaCommand::Select(option) => {
                match self.machine.select_answer(option, Instant::now()) {
                    Ok(Some(effect)) => self.execute(effect).await,
                    Ok(None) => {}
                    Err(e) => self.emit(ArenaUpdate::Notice(Notice::from(&e))).await,
                }
            }
            ArenaCommand::Advance => {
                self.advance().await;
            }
            ArenaCommand::Leave => {}
        }
    }

    /// Returns `true` when the arena is done.
    async fn advance(&mut self) -> bool {
        self.results_ticks = 0;
        let effects = self.machine.advance();
        let mut done = false;
        for effect in effects {
            done |= matches!(effect, Effect::Navigate(_));
            self.execute(effect).await;
        }
        done
    }

    /// Returns `true` when the arena is done.
    async fn tick(&mut self) -> bool {
        match self.machine.phase() {
            RoundPhase::Countdown { .. } => {
                let effects = self.machine.tick_countdown();
                self.emit(ArenaUpdate::Phase(self.machine.phase())).await;
                for effect in effects {
                    self.execute(effect).await;
                }
                false
            }
            RoundPhase::QuestionActive => {
                let expired = self.machine.tick_timer(Instant::now());
                self.emit(ArenaUpdate::Timer {
                    remaining: self.machine.remaining(),
                })
                .await;
                if expired {
                    self.show_results().await;
                }
                false
            }
            RoundPhase::ResultsShown => {
                self.results_ticks = self.results_ticks.saturating_add(1);
                if self.results_ticks < RESULTS_TICKS {
                    return false;
                }
                let last = self.machine.round_number() >= self.machine.total_rounds();
                // Players other than the host wait for the announcement.
                if self.machine.is_host() || last {
                    self.advance().await
                } else {
                    false
                }
            }
            RoundPhase::Idle | RoundPhase::SessionComplete => false,
        }
    }

    /// Returns `true` when the arena is done.
    async fn realtime(&mut self, event: RealtimeEvent) -> bool {
        if let RealtimeEvent::Disconnected { reason } = &event {
            warn!(reason = ?reason, "arena: realtime connection lost");
            self.emit(ArenaUpdate::Notice(Notice::from(&GalinheiroError::TransportClosed)))
                .await;
            return false;
        }
        if event.topic() != Some(self.topic.as_str()) {
            return false;
        }
        match event {
            RealtimeEvent::Change { change, .. } => match change {
                RowChange::RoundAnswers { record, .. } => {
                    let current = self.machine.current_round().map(|round| round.id);
                    if current != Some(record.round_id)
                        || !self.answers.offer(record.id, ()).is_fresh()
                    {
                        return false;
                    }
                    let is_spectator = self
                        .spectators
                        .get(&record.participant_id)
                        .copied()
                        .unwrap_or(false);
                    if self.machine.record_peer_answer(
                        record.participant_id,
                        record.option_index,
                        is_spectator,
                    ) {
                        self.emit(ArenaUpdate::Positions(self.machine.positions().clone()))
                            .await;
                    }
                    self.resolve_if_everyone_answered().await;
                    false
                }
                RowChange::RoomParticipants { .. } => {
                    if let Err(e) = self.load_roster().await {
                        warn!("arena: roster reload failed: {e}");
                    }
                    false
                }
                RowChange::GameRooms { record, .. } => {
                    if record.status == RoomStatus::RoundLobby {
                        let route = Route::RoundLobby(record.code);
                        self.emit_navigation(route).await;
                        return true;
                    }
                    if record.session_id == Some(self.machine.session_id())
                        && record.current_round > self.machine.round_number()
                    {
                        self.load_round(record.current_round).await;
                    }
                    false
                }
                RowChange::ChatMessages { .. } => false,
            },
            RealtimeEvent::Broadcast {
                event:
                    BroadcastEvent::NewRoundStarting {
                        session_id,
                        round_number,
                    },
                ..
            } => {
                if session_id == self.machine.session_id()
                    && round_number > self.machine.round_number()
                {
                    self.load_round(round_number).await;
                }
                false
            }
            _ => false,
        }
    }

    async fn resolve_if_everyone_answered(&mut self) {
        if self.machine.positions().len() >= self.active_players() && self.machine.resolve() {
            self.show_results().await;
        }
    }

    async fn show_results(&mut self) {
        self.results_ticks = 0;
        self.emit(ArenaUpdate::Phase(self.machine.phase())).await;
        if let Some(result) = self.machine.result() {
            self.emit(ArenaUpdate::Results(result)).await;
        }
    }

    async fn execute(&mut self, effect: Effect) {
        match effect {
            Effect::PrimeAudio => self.emit(ArenaUpdate::PrimeAudio).await,
            Effect::RequestRound(number) => {
                if number == 1 || self.machine.is_host() {
                    if self.load_round(number).await && self.machine.is_host() && number > 1 {
                        let event = BroadcastEvent::NewRoundStarting {
                            session_id: self.machine.session_id(),
                            round_number: number,
                        };
                        if let Err(e) = self.publisher.broadcast(self.topic.clone(), event) {
                            warn!("arena: round announcement failed: {e}");
                        }
                    }
                }
            }
            Effect::SubmitAnswer(submission) => {
                self.emit(ArenaUpdate::Positions(self.machine.positions().clone()))
                    .await;
                match self.backend.submit_answer(&submission).await {
                    Ok(receipt) => {
                        debug!(correct = receipt.correct, eggs = receipt.eggs_awarded, "answer accepted");
                        self.machine.record_receipt(receipt);
                        self.resolve_if_everyone_answered().await;
                    }
                    Err(e) => {
                        warn!("answer submission failed: {e}");
                        let notice = self.machine.submission_failed(&e);
                        self.emit(ArenaUpdate::Notice(notice)).await;
                        self.emit(ArenaUpdate::Positions(self.machine.positions().clone()))
                            .await;
                    }
                }
            }
            Effect::Notice(notice) => self.emit(ArenaUpdate::Notice(notice)).await,
            Effect::Navigate(route) => self.emit_navigation(route).await,
        }
    }

    /// Fetch round `number` and show it. Returns `true` when it started.
    async fn load_round(&mut self, number: u32) -> bool {
        let round = match self
            .backend
            .fetch_round(self.machine.session_id(), number)
            .await
        {
            Ok(Some(round)) => round,
            Ok(None) => {
                warn!(round = number, "arena: round not available");
                return false;
            }
            Err(e) => {
                warn!(round = number, "arena: failed to fetch round: {e}");
                self.emit(ArenaUpdate::Notice(Notice::from(&e))).await;
                return false;
            }
        };
        let view = QuestionView::new(&round, self.machine.total_rounds());
        if !self.machine.begin_round(round, Instant::now()) {
            return false;
        }
        info!(round = number, "round started");
        self.answers.clear();
        self.results_ticks = 0;
        self.ticker.reset();
        self.emit(ArenaUpdate::Phase(self.machine.phase())).await;
        self.emit(ArenaUpdate::Question(view)).await;
        true
    }

    /// Drop the update when the UI lags behind; the next one supersedes it.
    async fn emit(&self, update: ArenaUpdate) {
        match self.updates.try_send(update) {
            Ok(()) => {}
            Err(mpsc::error::TrySendError::Full(dropped)) => {
                warn!(
                    "arena update channel full, dropping update: {:?}",
                    std::mem::discriminant(&dropped)
                );
            }
            Err(mpsc::error::TrySendError::Closed(_)) => {
                debug!("arena update channel closed");
            }
        }
    }

    /// Navigation is never dropped.
    async fn emit_navigation(&self, route: Route) {
        if self.updates.send(ArenaUpdate::Navigate(route)).await.is_err() {
            debug!("arena update channel closed");
        }
    }
}

#[cfg(test)]
#[allow(
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::panic,
    clippy::indexing_slicing
)]
mod tests {
    use super::*;
    use crate::backend::JoinRequest;
    use crate::backends::{MemoryBackend, Question};
    use crate::client::{RealtimeClient, RealtimeConfig};
    use crate::config::GameSettings;
    use crate::identity::{Identity, Profile};
    use crate::protocol::{AnswerRow, Avatar, ChangeKind, Room, SessionId};
    use crate::transports::LoopbackHub;

    struct Fixture {
        backend: Arc<MemoryBackend>,
        room: Room,
        session: SessionId,
        host_participant: ParticipantId,
        _client: RealtimeClient,
        publisher: Publisher,
    }

    async fn fixture(rounds: u32) -> Fixture {
        let backend = Arc::new(MemoryBackend::new());
        let host = Identity::generate(Profile::new("Host", Avatar::default()).unwrap());
        let settings = GameSettings::default().with_total_rounds(rounds);
        let room = backend.create_room(&host, &settings).await;
        let questions = (0..rounds)
            .map(|i| Question {
                song_id: Uuid::new_v4(),
                audio_url: Some(format!("song-{i}.mp3")),
                options: ["a".into(), "b".into(), "c".into(), "d".into()],
                correct_index: 0,
            })
            .collect();
        backend.seed_questions(room.id, questions).await;
        let session = backend.start_game(&room.code, host.client_id).await.unwrap();
        let host_participant = backend.fetch_participants(room.id).await.unwrap()[0].id;

        let hub = LoopbackHub::new();
        let (client, _events) = RealtimeClient::start(hub.connect(), RealtimeConfig::default());
        let publisher = client.publisher();
        Fixture {
            backend,
            room,
            session,
            host_participant,
            _client: client,
            publisher,
        }
    }

    async fn next_matching(
        updates: &mut mpsc::Receiver<ArenaUpdate>,
        mut pred: impl FnMut(&ArenaUpdate) -> bool,
    ) -> ArenaUpdate {
        loop {
            let update = updates.recv().await.expect("arena stopped");
            if pred(&update) {
                return update;
            }
        }
    }

    /// A two-player game where the test feeds the guest's realtime events.
    struct GuestGame {
        backend: Arc<MemoryBackend>,
        room: Room,
        session: SessionId,
        host_participant: ParticipantId,
        arena: Arena,
        updates: mpsc::Receiver<ArenaUpdate>,
        events: mpsc::Sender<RealtimeEvent>,
        _client: RealtimeClient,
    }

    async fn guest_game(rounds: u32) -> GuestGame {
        let backend = Arc::new(MemoryBackend::new());
        let host = Identity::generate(Profile::new("Host", Avatar::default()).unwrap());
        let guest = Identity::generate(Profile::new("Guest", Avatar::default()).unwrap());
        let settings = GameSettings::default().with_total_rounds(rounds);
        let room = backend.create_room(&host, &settings).await;
        let questions = (0..rounds)
            .map(|i| Question {
                song_id: Uuid::new_v4(),
                audio_url: Some(format!("song-{i}.mp3")),
                options: ["a".into(), "b".into(), "c".into(), "d".into()],
                correct_index: 0,
            })
            .collect();
        backend.seed_questions(room.id, questions).await;
        let guest_participant = backend
            .join_room(JoinRequest {
                room_code: room.code.clone(),
                display_name: "Guest".into(),
                avatar: Avatar::default(),
                client_id: guest.client_id,
                user_id: None,
                is_spectator: false,
            })
            .await
            .unwrap();
        let session = backend.start_game(&room.code, host.client_id).await.unwrap();
        let host_participant = backend
            .fetch_participants(room.id)
            .await
            .unwrap()
            .into_iter()
            .find(|p| p.is_host)
            .unwrap()
            .id;

        let hub = LoopbackHub::new();
        let (client, _events) = RealtimeClient::start(hub.connect(), RealtimeConfig::default());
        let machine = RoundMachine::new(room.code.clone(), session, guest_participant, &settings);
        let (events, events_rx) = mpsc::channel(8);
        let (arena, updates) =
            Arena::start(backend.clone(), client.publisher(), room.id, machine, events_rx);
        GuestGame {
            backend,
            room,
            session,
            host_participant,
            arena,
            updates,
            events,
            _client: client,
        }
    }

    impl GuestGame {
        /// The host fetches round `number`; only the room row reaches the guest.
        async fn host_fetches_round(&self, number: u32) {
            self.backend.fetch_round(self.session, number).await.unwrap().unwrap();
            let record = self.backend.fetch_room(&self.room.code).await.unwrap().unwrap();
            assert_eq!(record.current_round, number);
            self.events
                .send(RealtimeEvent::Change {
                    topic: room_topic(&self.room.code),
                    change: RowChange::GameRooms {
                        kind: ChangeKind::Update,
                        record,
                    },
                })
                .await
                .unwrap();
        }

        async fn question(&mut self) -> u32 {
            let update =
                next_matching(&mut self.updates, |u| matches!(u, ArenaUpdate::Question(_))).await;
            let ArenaUpdate::Question(view) = update else { unreachable!() };
            view.number
        }
    }

    #[tokio::test(start_paused = true)]
    async fn follower_advances_on_room_change_without_announcement() {
        let mut game = guest_game(2).await;
        assert_eq!(game.question().await, 1);
        game.arena.select(0).unwrap();
        next_matching(&mut game.updates, |u| matches!(u, ArenaUpdate::Results(_))).await;

        game.host_fetches_round(2).await;
        let next = tokio::time::timeout(Duration::from_secs(30), game.question())
            .await
            .expect("round 2 never shown");
        assert_eq!(next, 2);
    }

    #[tokio::test(start_paused = true)]
    async fn follower_waits_indefinitely_on_results() {
        let mut game = guest_game(2).await;
        assert_eq!(game.question().await, 1);
        next_matching(&mut game.updates, |u| matches!(u, ArenaUpdate::Results(_))).await;

        tokio::time::sleep(Duration::from_secs(300)).await;
        assert!(game.arena.is_running());

        game.host_fetches_round(2).await;
        assert_eq!(game.question().await, 2);
    }

    #[tokio::test(start_paused = true)]
    async fn repeated_answer_row_updates_positions_once() {
        let mut game = guest_game(2).await;
        assert_eq!(game.question().await, 1);
        let round = game.backend.fetch_round(game.session, 1).await.unwrap().unwrap();
        let change = RealtimeEvent::Change {
            topic: room_topic(&game.room.code),
            change: RowChange::RoundAnswers {
                kind: ChangeKind::Insert,
                record: AnswerRow {
                    id: Uuid::new_v4(),
                    round_id: round.id,
                    participant_id: game.host_participant,
                    option_index: 2,
                    response_ms: 1200,
                },
            },
        };
        game.events.send(change.clone()).await.unwrap();
        game.events.send(change).await.unwrap();
        tokio::time::sleep(Duration::from_millis(10)).await;

        let mut positions = Vec::new();
        while let Ok(update) = game.updates.try_recv() {
            if let ArenaUpdate::Positions(p) = update {
                positions.push(p);
            }
        }
        assert_eq!(positions.len(), 1);
        assert_eq!(positions[0].at(2), &[game.host_participant]);
    }

    #[tokio::test(start_paused = true)]
    async fn single_player_plays_through_to_round_lobby() {
        let f = fixture(1).await;
        let settings = GameSettings::default().with_total_rounds(1);
        let machine = RoundMachine::new(f.room.code.clone(), f.session, f.host_participant, &settings)
            .with_host(true);
        let (_events_tx, events_rx) = mpsc::channel(8);
        let (arena, mut updates) = Arena::start(
            f.backend.clone(),
            f.publisher.clone(),
            f.room.id,
            machine,
            events_rx,
        );

        let question = next_matching(&mut updates, |u| matches!(u, ArenaUpdate::Question(_))).await;
        let ArenaUpdate::Question(view) = question else { unreachable!() };
        assert_eq!(view.number, 1);

        arena.select(0).unwrap();
        let results = next_matching(&mut updates, |u| matches!(u, ArenaUpdate::Results(_))).await;
        let ArenaUpdate::Results(result) = results else { unreachable!() };
        assert!(result.is_correct());
        assert_eq!(result.eggs, 15);

        let nav = next_matching(&mut updates, |u| matches!(u, ArenaUpdate::Navigate(_))).await;
        assert_eq!(nav, ArenaUpdate::Navigate(Route::RoundLobby(f.room.code.clone())));
        assert_eq!(
            f.backend.fetch_participants(f.room.id).await.unwrap()[0].eggs,
            15
        );
    }

    #[tokio::test(start_paused = true)]
    async fn spectator_click_is_rejected_with_notice() {
        let f = fixture(2).await;
        let late = Identity::generate(Profile::new("Late", Avatar::default()).unwrap());
        let spectator = f
            .backend
            .join_room(JoinRequest {
                room_code: f.room.code.clone(),
                display_name: "Late".into(),
                avatar: Avatar::default(),
                client_id: late.client_id,
                user_id: None,
                is_spectator: true,
            })
            .await
            .unwrap();
        let settings = GameSettings::default().with_total_rounds(2);
        let machine = RoundMachine::new(f.room.code.clone(), f.session, spectator, &settings);
        let (_events_tx, events_rx) = mpsc::channel(8);
        let (arena, mut updates) =
            Arena::start(f.backend.clone(), f.publisher.clone(), f.room.id, machine, events_rx);

        next_matching(&mut updates, |u| matches!(u, ArenaUpdate::Question(_))).await;
        arena.select(1).unwrap();
        let notice = next_matching(&mut updates, |u| matches!(u, ArenaUpdate::Notice(_))).await;
        let ArenaUpdate::Notice(notice) = notice else { unreachable!() };
        assert!(notice.message.contains("next round"));
    }

    #[tokio::test(start_paused = true)]
    async fn leave_navigates_to_lobby_and_stops() {
        let f = fixture(1).await;
        let machine = RoundMachine::new(
            f.room.code.clone(),
            f.session,
            f.host_participant,
            &GameSettings::default(),
        );
        let (_events_tx, events_rx) = mpsc::channel(8);
        let (mut arena, mut updates) =
            Arena::start(f.backend.clone(), f.publisher.clone(), f.room.id, machine, events_rx);

        arena.send(ArenaCommand::Leave).unwrap();
        let nav = next_matching(&mut updates, |u| matches!(u, ArenaUpdate::Navigate(_))).await;
        assert_eq!(nav, ArenaUpdate::Navigate(Route::Lobby(f.room.code.clone())));
        arena.shutdown().await;
        assert!(!arena.is_running());
    }
}
