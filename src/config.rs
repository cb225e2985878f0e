//! Game settings: scoring, timings and storage locations.
//!
//! Every struct here has documented defaults, `with_*` builder methods, and
//! deserializes from TOML with missing keys falling back to the defaults.
//!
//! ```
//! use galinheiro_client::config::GameSettings;
//!
//! let settings = GameSettings::from_toml_str(
//!     r#"
//!     total_rounds = 5
//!     [scoring]
//!     eggs_per_correct = 20
//!     "#,
//! )
//! .unwrap();
//! assert_eq!(settings.total_rounds, 5);
//! assert_eq!(settings.scoring.eggs_per_correct, 20);
//! assert_eq!(settings.scoring.speed_bonus_threshold, 80);
//! ```

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::protocol::Room;

/// Default number of rounds per game.
pub const DEFAULT_TOTAL_ROUNDS: u32 = 10;

/// Default per-round time budget.
pub const DEFAULT_ROUND_DURATION: Duration = Duration::from_secs(15);

/// Scoring parameters. The backend is authoritative; the client uses these
/// only for optimistic display.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct ScoringRules {
    /// Eggs for a correct answer.
    pub eggs_per_correct: u32,
    /// Percentage of the budget that must still remain at submission.
    pub speed_bonus_threshold: u32,
    /// Extra eggs for a fast correct answer.
    pub speed_bonus_eggs: u32,
}

impl Default for ScoringRules {
    fn default() -> Self {
        Self {
            eggs_per_correct: 10,
            speed_bonus_threshold: 80,
            speed_bonus_eggs: 5,
        }
    }
}

impl ScoringRules {
    /// Eggs earned for one answer.
    ///
    /// The bonus applies when `remaining` is at least the threshold share of
    /// `budget` (12 s left of 15 s meets an 80% threshold).
    pub fn award(&self, correct: bool, remaining: Duration, budget: Duration) -> u32 {
        if !correct {
            return 0;
        }
        let fast = remaining.as_millis() * 100
            >= budget.as_millis() * u128::from(self.speed_bonus_threshold);
        if fast {
            self.eggs_per_correct + self.speed_bonus_eggs
        } else {
            self.eggs_per_correct
        }
    }

    /// Scoring parameters configured on a room row.
    pub fn from_room(room: &Room) -> Self {
        Self {
            eggs_per_correct: room.eggs_per_correct,
            speed_bonus_threshold: room.speed_bonus_threshold,
            speed_bonus_eggs: room.speed_bonus_eggs,
        }
    }
}

/// Client-side intervals and limits.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct Timings {
    /// Ticks of the pre-game countdown (1 Hz).
    pub countdown_ticks: u8,
    /// Seconds between `last_seen` heartbeats.
    pub heartbeat_secs: u64,
    /// Seconds between host stale-participant sweeps.
    pub sweep_secs: u64,
    /// Seconds without heartbeat after which a participant is stale.
    pub stale_after_secs: u64,
    /// Number of chat messages loaded initially.
    pub chat_history: usize,
}

impl Default for Timings {
    fn default() -> Self {
        Self {
            countdown_ticks: 5,
            heartbeat_secs: 10,
            sweep_secs: 15,
            stale_after_secs: 30,
            chat_history: 100,
        }
    }
}

impl Timings {
    pub fn heartbeat(&self) -> Duration {
        Duration::from_secs(self.heartbeat_secs)
    }

    pub fn sweep(&self) -> Duration {
        Duration::from_secs(self.sweep_secs)
    }

    pub fn stale_after(&self) -> Duration {
        Duration::from_secs(self.stale_after_secs)
    }
}

/// Object storage locations for song audio and album covers.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct StorageConfig {
    /// Base URL of the storage service, without trailing slash.
    pub base_url: String,
    pub audio_bucket: String,
    pub cover_bucket: String,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:54321/storage/v1".into(),
            audio_bucket: "songs".into(),
            cover_bucket: "covers".into(),
        }
    }
}

impl StorageConfig {
    /// Public URL of an object in `bucket`.
    pub fn public_url(&self, bucket: &str, path: &str) -> String {
        format!(
            "{}/object/public/{}/{}",
            self.base_url.trim_end_matches('/'),
            bucket,
            path.trim_start_matches('/')
        )
    }

    pub fn audio_url(&self, path: &str) -> String {
        self.public_url(&self.audio_bucket, path)
    }

    pub fn cover_url(&self, path: &str) -> String {
        self.public_url(&self.cover_bucket, path)
    }
}

/// Settings for one game client.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct GameSettings {
    /// Rounds per game. Defaults to **10**.
    pub total_rounds: u32,
    /// Per-round time budget in seconds. Defaults to **15**.
    pub round_duration_secs: u32,
    pub scoring: ScoringRules,
    pub timings: Timings,
    pub storage: StorageConfig,
}

impl Default for GameSettings {
    fn default() -> Self {
        Self {
            total_rounds: DEFAULT_TOTAL_ROUNDS,
            round_duration_secs: 15,
            scoring: ScoringRules::default(),
            timings: Timings::default(),
            storage: StorageConfig::default(),
        }
    }
}

impl GameSettings {
    /// Parse settings from a TOML document; absent keys keep their defaults.
    ///
    /// # Errors
    ///
    /// Returns [`GalinheiroError::Settings`](crate::GalinheiroError::Settings)
    /// for malformed TOML or mistyped values.
    pub fn from_toml_str(text: &str) -> Result<Self> {
        Ok(toml::from_str(text)?)
    }

    /// Settings matching a room row (rounds, budget, scoring).
    #[must_use]
    pub fn for_room(mut self, room: &Room) -> Self {
        self.total_rounds = room.total_rounds;
        self.round_duration_secs = room.round_duration;
        self.scoring = ScoringRules::from_room(room);
        self
    }

    #[must_use]
    pub fn with_total_rounds(mut self, rounds: u32) -> Self {
        self.total_rounds = rounds.max(1);
        self
    }

    #[must_use]
    pub fn with_round_duration(mut self, duration: Duration) -> Self {
        self.round_duration_secs = u32::try_from(duration.as_secs()).unwrap_or(u32::MAX).max(1);
        self
    }

    #[must_use]
    pub fn with_scoring(mut self, scoring: ScoringRules) -> Self {
        self.scoring = scoring;
        self
    }

    #[must_use]
    pub fn with_timings(mut self, timings: Timings) -> Self {
        self.timings = timings;
        self
    }

    pub fn round_duration(&self) -> Duration {
        Duration::from_secs(u64::from(self.round_duration_secs))
    }
}
