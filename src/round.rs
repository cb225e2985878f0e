//! The round/answer state machine.
//!
//! [`RoundMachine`] is pure: it owns no timers and performs no I/O. Callers
//! feed it ticks, rounds and clicks with an explicit clock value and execute
//! the [`Effect`]s it returns. [`Arena`](crate::arena::Arena) is the async
//! driver that does this against a backend and the realtime service.
//!
//! ```text
//! Idle ─trigger_start─▶ Countdown(5..1) ─tick─▶ (RequestRound(1))
//!      ─begin_round─▶ QuestionActive ─expiry/resolve─▶ ResultsShown
//!      ─advance─▶ QuestionActive (next round) | SessionComplete
//! ```

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::time::Duration;

use tokio::time::Instant;
use tracing::debug;

use crate::config::{GameSettings, ScoringRules};
use crate::error::{GalinheiroError, Result};
use crate::error_codes::ErrorCode;
use crate::notice::Notice;
use crate::protocol::{
    AnswerReceipt, AnswerSubmission, ParticipantId, RoomCode, Round, SessionId, OPTION_COUNT,
};
use crate::routes::Route;

/// Phase of the local round lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RoundPhase {
    /// Waiting for a start trigger.
    Idle,
    /// Pre-game countdown; `remaining` ticks left.
    Countdown { remaining: u8 },
    /// A question is on screen and its timer runs.
    QuestionActive,
    /// Correct option revealed for the current round.
    ResultsShown,
    /// Every configured round was played.
    SessionComplete,
}

/// Side effect requested by the machine.
#[derive(Debug, Clone, PartialEq)]
pub enum Effect {
    /// Play the silent audio primer.
    PrimeAudio,
    /// Fetch round `n` of the session and feed it to `begin_round`.
    RequestRound(u32),
    /// Persist the local answer.
    SubmitAnswer(AnswerSubmission),
    /// Show a toast.
    Notice(Notice),
    /// Leave the arena.
    Navigate(Route),
}

/// Who picked which option in the current round.
///
/// First recorded option per participant wins; spectators never appear.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AnswerPositions {
    by_option: BTreeMap<usize, Vec<ParticipantId>>,
    by_participant: HashMap<ParticipantId, usize>,
}

impl AnswerPositions {
    /// Returns `true` when the answer was recorded.
    pub fn record(&mut self, participant: ParticipantId, option: usize, is_spectator: bool) -> bool {
        if is_spectator || option >= OPTION_COUNT || self.by_participant.contains_key(&participant)
        {
            return false;
        }
        self.by_participant.insert(participant, option);
        self.by_option.entry(option).or_default().push(participant);
        true
    }

    /// Participants who picked `option`, in arrival order.
    pub fn at(&self, option: usize) -> &[ParticipantId] {
        self.by_option.get(&option).map_or(&[], Vec::as_slice)
    }

    pub fn option_of(&self, participant: &ParticipantId) -> Option<usize> {
        self.by_participant.get(participant).copied()
    }

    /// Number of participants who answered.
    pub fn len(&self) -> usize {
        self.by_participant.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_participant.is_empty()
    }

    pub fn clear(&mut self) {
        self.by_option.clear();
        self.by_participant.clear();
    }
}

/// How one option is highlighted in the results.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OptionMark {
    /// Correct option the player picked (green).
    Correct,
    /// Wrong option the player picked (red).
    Wrong,
    /// Correct option the player did not pick (green outline).
    MissedCorrect,
    Neutral,
}

/// The local player's answer in the current round.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Selection {
    pub option: usize,
    pub response: Duration,
    /// Time left on the round timer at submission.
    pub remaining: Duration,
}

/// What the results screen shows for one round.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoundResult {
    pub round_number: u32,
    pub total_rounds: u32,
    pub correct_index: usize,
    pub selection: Option<Selection>,
    pub marks: [OptionMark; OPTION_COUNT],
    /// Eggs for this round: the server's figure when known, otherwise the
    /// optimistic local one.
    pub eggs: u32,
    /// `true` while `eggs` is not confirmed by the server.
    pub provisional: bool,
    pub message: String,
}

impl RoundResult {
    pub fn is_correct(&self) -> bool {
        self.selection
            .is_some_and(|selection| selection.option == self.correct_index)
    }

    pub fn is_last(&self) -> bool {
        self.round_number >= self.total_rounds
    }
}

/// Round lifecycle for one player in one session.
#[derive(Debug, Clone)]
pub struct RoundMachine {
    code: RoomCode,
    session_id: SessionId,
    participant_id: ParticipantId,
    is_host: bool,
    is_spectator: bool,
    total_rounds: u32,
    countdown_ticks: u8,
    scoring: ScoringRules,
    phase: RoundPhase,
    started: bool,
    audio_unlocked: bool,
    round: Option<Round>,
    played: BTreeSet<u32>,
    round_started_at: Option<Instant>,
    budget: Duration,
    remaining: Duration,
    selection: Option<Selection>,
    positions: AnswerPositions,
    receipt: Option<AnswerReceipt>,
}

impl RoundMachine {
    pub fn new(
        code: RoomCode,
        session_id: SessionId,
        participant_id: ParticipantId,
        settings: &GameSettings,
    ) -> Self {
        Self {
            code,
            session_id,
            participant_id,
            is_host: false,
            is_spectator: false,
            total_rounds: settings.total_rounds.max(1),
            countdown_ticks: settings.timings.countdown_ticks.max(1),
            scoring: settings.scoring,
            phase: RoundPhase::Idle,
            started: false,
            audio_unlocked: false,
            round: None,
            played: BTreeSet::new(),
            round_started_at: None,
            budget: settings.round_duration(),
            remaining: settings.round_duration(),
            selection: None,
            positions: AnswerPositions::default(),
            receipt: None,
        }
    }

    #[must_use]
    pub fn with_host(mut self, is_host: bool) -> Self {
        self.is_host = is_host;
        self
    }

    #[must_use]
    pub fn with_spectator(mut self, is_spectator: bool) -> Self {
        self.is_spectator = is_spectator;
        self
    }

    // ── Accessors ───────────────────────────────────────────────────

    pub fn phase(&self) -> RoundPhase {
        self.phase
    }

    pub fn session_id(&self) -> SessionId {
        self.session_id
    }

    pub fn room_code(&self) -> &RoomCode {
        &self.code
    }

    pub fn participant_id(&self) -> ParticipantId {
        self.participant_id
    }

    pub fn is_host(&self) -> bool {
        self.is_host
    }

    pub fn is_spectator(&self) -> bool {
        self.is_spectator
    }

    pub fn audio_unlocked(&self) -> bool {
        self.audio_unlocked
    }

    pub fn current_round(&self) -> Option<&Round> {
        self.round.as_ref()
    }

    /// Number of the current round, 0 before the first one.
    pub fn round_number(&self) -> u32 {
        self.round.as_ref().map_or(0, |round| round.number)
    }

    pub fn total_rounds(&self) -> u32 {
        self.total_rounds
    }

    pub fn remaining(&self) -> Duration {
        self.remaining
    }

    pub fn selection(&self) -> Option<Selection> {
        self.selection
    }

    pub fn positions(&self) -> &AnswerPositions {
        &self.positions
    }

    pub fn receipt(&self) -> Option<AnswerReceipt> {
        self.receipt
    }

    /// Mark the local player as spectator or active participant.
    pub fn set_spectator(&mut self, is_spectator: bool) {
        self.is_spectator = is_spectator;
    }

    // ── Transitions ─────────────────────────────────────────────────

    /// Enter the countdown. Fires at most once; later calls return `false`.
    pub fn trigger_start(&mut self) -> bool {
        if self.started || self.phase != RoundPhase::Idle {
            return false;
        }
        self.started = true;
        self.phase = RoundPhase::Countdown {
            remaining: self.countdown_ticks,
        };
        debug!(session_id = %self.session_id, "countdown started");
        true
    }

    /// Record the user gesture that unlocks audio playback.
    pub fn unlock_audio(&mut self) -> Option<Effect> {
        if self.audio_unlocked {
            return None;
        }
        self.audio_unlocked = true;
        Some(Effect::PrimeAudio)
    }

    /// One countdown tick (1 Hz). Reaching zero primes audio and requests
    /// the first round. Ticks outside the countdown are ignored.
    pub fn tick_countdown(&mut self) -> Vec<Effect> {
        let RoundPhase::Countdown { remaining } = self.phase else {
            return Vec::new();
        };
        if remaining == 0 {
            return Vec::new();
        }
        let remaining = remaining.saturating_sub(1);
        self.phase = RoundPhase::Countdown { remaining };
        if remaining > 0 {
            return Vec::new();
        }
        self.audio_unlocked = true;
        vec![Effect::PrimeAudio, Effect::RequestRound(1)]
    }

    /// Show `round`. Returns `false` when the round was already played or
    /// belongs to another session.
    pub fn begin_round(&mut self, round: Round, now: Instant) -> bool {
        if round.session_id != self.session_id
            || self.played.contains(&round.number)
            || round.number > self.total_rounds
            || matches!(self.phase, RoundPhase::SessionComplete)
        {
            debug!(round = round.number, "ignoring round");
            return false;
        }
        self.budget = Duration::from_secs(u64::from(round.duration.max(1)));
        self.remaining = self.budget;
        self.round_started_at = Some(now);
        self.selection = None;
        self.receipt = None;
        self.positions.clear();
        self.played.insert(round.number);
        debug!(round = round.number, "round started");
        self.round = Some(round);
        self.started = true;
        self.phase = RoundPhase::QuestionActive;
        true
    }

    /// Handle a click on `option`.
    ///
    /// Returns the effect to execute: `SubmitAnswer` for the first accepted
    /// click, a `Notice` for spectators, nothing for clicks that change
    /// nothing.
    ///
    /// # Errors
    ///
    /// `INVALID_OPTION` for an index outside the four options.
    pub fn select_answer(&mut self, option: usize, now: Instant) -> Result<Option<Effect>> {
        if self.phase != RoundPhase::QuestionActive || self.selection.is_some() {
            return Ok(None);
        }
        if option >= OPTION_COUNT {
            return Err(GalinheiroError::rejected(ErrorCode::InvalidOption));
        }
        if self.is_spectator {
            return Ok(Some(Effect::Notice(Notice::for_code(
                &ErrorCode::SpectatorCannotAnswer,
            ))));
        }
        let (Some(round), Some(started_at)) = (self.round.as_ref(), self.round_started_at) else {
            return Ok(None);
        };
        let response = now.saturating_duration_since(started_at);
        if response >= self.budget {
            return Ok(Some(Effect::Notice(Notice::for_code(&ErrorCode::RoundClosed))));
        }
        let remaining = self.budget.saturating_sub(response);
        self.selection = Some(Selection {
            option,
            response,
            remaining,
        });
        self.positions.record(self.participant_id, option, false);
        let submission = AnswerSubmission {
            round_id: round.id,
            participant_id: self.participant_id,
            option_index: option,
            response_ms: u64::try_from(response.as_millis()).unwrap_or(u64::MAX),
        };
        Ok(Some(Effect::SubmitAnswer(submission)))
    }

    /// The backend refused or failed to store the local answer.
    ///
    /// A transient failure frees the selection so the player can click
    /// again while the timer runs; a domain rejection keeps it.
    pub fn submission_failed(&mut self, err: &GalinheiroError) -> Notice {
        if !err.is_domain() && self.phase == RoundPhase::QuestionActive {
            if let Some(selection) = self.selection.take() {
                let mut positions = AnswerPositions::default();
                for option in 0..OPTION_COUNT {
                    for participant in self.positions.at(option) {
                        if *participant != self.participant_id || option != selection.option {
                            positions.record(*participant, option, false);
                        }
                    }
                }
                self.positions = positions;
            }
        }
        Notice::from(err)
    }

    /// Store the server's verdict on the local answer.
    pub fn record_receipt(&mut self, receipt: AnswerReceipt) {
        self.receipt = Some(receipt);
    }

    /// Record a peer's answer for the option badges.
    pub fn record_peer_answer(
        &mut self,
        participant: ParticipantId,
        option: usize,
        is_spectator: bool,
    ) -> bool {
        if !matches!(
            self.phase,
            RoundPhase::QuestionActive | RoundPhase::ResultsShown
        ) {
            return false;
        }
        self.positions.record(participant, option, is_spectator)
    }

    /// Recompute the round timer. Returns `true` when this call expired it.
    pub fn tick_timer(&mut self, now: Instant) -> bool {
        if self.phase != RoundPhase::QuestionActive {
            return false;
        }
        let Some(started_at) = self.round_started_at else {
            return false;
        };
        let elapsed = now.saturating_duration_since(started_at);
        self.remaining = self.budget.saturating_sub(elapsed);
        if elapsed >= self.budget {
            self.phase = RoundPhase::ResultsShown;
            debug!(round = self.round_number(), "round timer expired");
            return true;
        }
        false
    }

    /// The server resolved the round (every active player answered).
    pub fn resolve(&mut self) -> bool {
        if self.phase != RoundPhase::QuestionActive {
            return false;
        }
        self.phase = RoundPhase::ResultsShown;
        true
    }

    /// Results of the current round, once shown.
    pub fn result(&self) -> Option<RoundResult> {
        if !matches!(
            self.phase,
            RoundPhase::ResultsShown | RoundPhase::SessionComplete
        ) {
            return None;
        }
        let round = self.round.as_ref()?;
        let correct_index = round.correct_index;
        let selected = self.selection.map(|selection| selection.option);
        let marks = std::array::from_fn(|option| {
            match (option == correct_index, selected == Some(option)) {
                (true, true) => OptionMark::Correct,
                (false, true) => OptionMark::Wrong,
                (true, false) => OptionMark::MissedCorrect,
                (false, false) => OptionMark::Neutral,
            }
        });
        let optimistic = self.selection.map_or(0, |selection| {
            self.scoring.award(
                selection.option == correct_index,
                selection.remaining,
                self.budget,
            )
        });
        let last = round.number >= self.total_rounds;
        Some(RoundResult {
            round_number: round.number,
            total_rounds: self.total_rounds,
            correct_index,
            selection: self.selection,
            marks,
            eggs: self.receipt.map_or(optimistic, |receipt| receipt.eggs_awarded),
            provisional: self.receipt.is_none(),
            message: if last {
                "Game complete!".into()
            } else {
                "Next round coming up…".into()
            },
        })
    }

    /// Leave the results screen: request the next round, or finish the
    /// session and head to the round lobby.
    pub fn advance(&mut self) -> Vec<Effect> {
        if self.phase != RoundPhase::ResultsShown {
            return Vec::new();
        }
        let current = self.round_number();
        if current < self.total_rounds {
            vec![Effect::RequestRound(current + 1)]
        } else {
            self.phase = RoundPhase::SessionComplete;
            debug!(session_id = %self.session_id, "session complete");
            vec![Effect::Navigate(Route::RoundLobby(self.code.clone()))]
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::panic, clippy::indexing_slicing)]
mod tests {
    use super::*;
    use chrono::Utc;
    use uuid::Uuid;

    fn machine(total_rounds: u32) -> RoundMachine {
        let settings = GameSettings::default().with_total_rounds(total_rounds);
        RoundMachine::new(
            "ABC123".parse().unwrap(),
            Uuid::from_u128(1),
            Uuid::from_u128(2),
            &settings,
        )
    }

    fn round(number: u32) -> Round {
        Round {
            id: Uuid::new_v4(),
            session_id: Uuid::from_u128(1),
            number,
            song_id: Uuid::new_v4(),
            audio_url: None,
            options: ["a".into(), "b".into(), "c".into(), "d".into()],
            correct_index: 2,
            duration: 15,
            started_at: Utc::now(),
        }
    }

    fn active(total_rounds: u32) -> (RoundMachine, Instant) {
        let mut m = machine(total_rounds);
        let now = Instant::now();
        m.trigger_start();
        assert!(m.begin_round(round(1), now));
        (m, now)
    }

    #[test]
    fn countdown_runs_five_ticks_and_start_is_idempotent() {
        let mut m = machine(3);
        assert!(m.trigger_start());
        assert!(!m.trigger_start());
        for expected in (1..5).rev() {
            assert!(m.tick_countdown().is_empty());
            assert_eq!(m.phase(), RoundPhase::Countdown { remaining: expected });
        }
        assert_eq!(
            m.tick_countdown(),
            vec![Effect::PrimeAudio, Effect::RequestRound(1)]
        );
        assert!(m.tick_countdown().is_empty());
    }

    #[test]
    fn only_first_click_is_submitted() {
        let (mut m, now) = active(3);
        let first = m.select_answer(1, now + Duration::from_secs(3)).unwrap();
        assert!(matches!(
            first,
            Some(Effect::SubmitAnswer(AnswerSubmission {
                option_index: 1,
                response_ms: 3_000,
                ..
            }))
        ));
        assert_eq!(m.select_answer(2, now + Duration::from_secs(4)).unwrap(), None);
        assert_eq!(m.selection().unwrap().option, 1);
    }

    #[test]
    fn spectator_click_gives_notice_and_no_submission() {
        let (mut m, now) = active(3);
        m.set_spectator(true);
        match m.select_answer(0, now).unwrap() {
            Some(Effect::Notice(notice)) => assert!(notice.message.contains("next round")),
            other => panic!("unexpected {other:?}"),
        }
        assert!(m.selection().is_none());
    }

    #[test]
    fn out_of_range_option_is_rejected() {
        let (mut m, now) = active(3);
        let err = m.select_answer(OPTION_COUNT, now).unwrap_err();
        assert_eq!(err.code(), Some(&ErrorCode::InvalidOption));
    }

    #[test]
    fn duplicate_round_delivery_is_ignored() {
        let (mut m, now) = active(3);
        m.select_answer(0, now).unwrap();
        assert!(!m.begin_round(round(1), now + Duration::from_secs(1)));
        assert!(m.selection().is_some());
    }

    #[test]
    fn peer_positions_exclude_spectators_and_keep_first_choice() {
        let (mut m, _) = active(3);
        let peer = Uuid::new_v4();
        let spectator = Uuid::new_v4();
        assert!(m.record_peer_answer(peer, 3, false));
        assert!(!m.record_peer_answer(peer, 1, false));
        assert!(!m.record_peer_answer(spectator, 3, true));
        assert!(!m.record_peer_answer(Uuid::new_v4(), 9, false));
        assert_eq!(m.positions().at(3), &[peer]);
        assert!(m.positions().at(1).is_empty());
    }

    #[test]
    fn speed_bonus_with_twelve_of_fifteen_seconds_left() {
        let (mut m, now) = active(3);
        m.select_answer(2, now + Duration::from_secs(3)).unwrap();
        assert!(m.tick_timer(now + Duration::from_secs(15)));

        let result = m.result().unwrap();
        assert!(result.is_correct());
        assert_eq!(result.eggs, 15);
        assert!(result.provisional);
        assert_eq!(result.marks[2], OptionMark::Correct);
        assert_eq!(result.marks[0], OptionMark::Neutral);
    }

    #[test]
    fn clock_keeps_running_after_answering() {
        let (mut m, now) = active(3);
        m.select_answer(2, now + Duration::from_secs(3)).unwrap();
        assert!(!m.tick_timer(now + Duration::from_secs(10)));
        assert_eq!(m.remaining(), Duration::from_secs(5));
        assert_eq!(m.selection().unwrap().remaining, Duration::from_secs(12));
    }

    #[test]
    fn wrong_answer_marks_red_and_correct_outline() {
        let (mut m, now) = active(3);
        m.select_answer(0, now + Duration::from_secs(1)).unwrap();
        m.resolve();
        let result = m.result().unwrap();
        assert_eq!(result.marks[0], OptionMark::Wrong);
        assert_eq!(result.marks[2], OptionMark::MissedCorrect);
        assert_eq!(result.eggs, 0);
    }

    #[test]
    fn server_receipt_overrides_optimistic_eggs() {
        let (mut m, now) = active(3);
        m.select_answer(2, now + Duration::from_secs(10)).unwrap();
        m.record_receipt(AnswerReceipt {
            correct: true,
            eggs_awarded: 12,
        });
        m.resolve();
        let result = m.result().unwrap();
        assert_eq!(result.eggs, 12);
        assert!(!result.provisional);
    }

    #[test]
    fn advance_requests_next_round_then_completes() {
        let (mut m, now) = active(2);
        m.resolve();
        assert_eq!(m.advance(), vec![Effect::RequestRound(2)]);
        assert!(m.begin_round(round(2), now + Duration::from_secs(20)));
        m.resolve();
        assert_eq!(m.result().unwrap().message, "Game complete!");
        assert_eq!(
            m.advance(),
            vec![Effect::Navigate(Route::RoundLobby("ABC123".parse().unwrap()))]
        );
        assert_eq!(m.phase(), RoundPhase::SessionComplete);
    }

    #[test]
    fn transient_submission_failure_allows_retry() {
        let (mut m, now) = active(3);
        m.select_answer(1, now).unwrap();
        m.submission_failed(&GalinheiroError::Backend("offline".into()));
        assert!(m.selection().is_none());
        assert!(m.positions().is_empty());
        assert!(m.select_answer(2, now + Duration::from_secs(1)).unwrap().is_some());

        m.submission_failed(&GalinheiroError::rejected(ErrorCode::AlreadyAnswered));
        assert_eq!(m.selection().unwrap().option, 2);
    }
}
