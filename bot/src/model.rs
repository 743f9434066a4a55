use std::time::{Duration, Instant};

use serde::Deserialize;

/// Own account identity, fetched once at startup from `GET profile`. Startup fails
/// (exit code 4) if `title != "BOT"`.
#[derive(Debug, Clone)]
pub struct BotIdentity {
    pub id: String,
    pub username: String,
    pub title: Option<String>,
}

impl BotIdentity {
    pub fn is_bot_account(&self) -> bool {
        self.title.as_deref() == Some("BOT")
    }
}

#[derive(Debug, Clone, Copy, Eq, PartialEq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Colour {
    White,
    Black,
}

impl Colour {
    pub fn opposite(self) -> Self {
        match self {
            Self::White => Self::Black,
            Self::Black => Self::White,
        }
    }
}

#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub enum TimeControlCategory {
    UltraBullet,
    Bullet,
    Blitz,
    Rapid,
    Classical,
    Correspondence,
}

impl TimeControlCategory {
    /// lichess.org's own classification boundaries by estimated game duration
    /// (initial + 40 * increment), in seconds.
    pub fn classify(initial_secs: u32, increment_secs: u32) -> Self {
        let estimate = initial_secs + 40 * increment_secs;
        match estimate {
            0..=29 => Self::UltraBullet,
            30..=179 => Self::Bullet,
            180..=479 => Self::Blitz,
            480..=1499 => Self::Rapid,
            _ => Self::Classical,
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub enum TimeControl {
    Clock {
        initial_secs: u32,
        increment_secs: u32,
    },
    Correspondence {
        days_per_turn: u32,
    },
    Unlimited,
}

impl TimeControl {
    pub fn category(&self) -> TimeControlCategory {
        match self {
            Self::Clock {
                initial_secs,
                increment_secs,
            } => TimeControlCategory::classify(*initial_secs, *increment_secs),
            Self::Correspondence { .. } => TimeControlCategory::Correspondence,
            Self::Unlimited => TimeControlCategory::Correspondence,
        }
    }
}

#[derive(Debug, Clone)]
pub struct ChallengerIdentity {
    pub name: String,
    pub rating: Option<u32>,
    pub title: Option<String>,
    pub is_bot: bool,
}

/// A pending request from one account to play another. Immutable once observed.
#[derive(Debug, Clone)]
pub struct Challenge {
    pub id: String,
    pub challenger: ChallengerIdentity,
    pub variant: String,
    pub time_control: TimeControl,
    pub rated: bool,
    pub requested_colour: Option<Colour>,
    pub source: ChallengeSource,
}

#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub enum ChallengeSource {
    Lobby,
    Friend,
    Tournament,
}

#[derive(Debug, Clone)]
pub struct GameDescriptor {
    pub id: String,
    pub our_colour: Colour,
    pub opponent: ChallengerIdentity,
    pub variant: String,
    pub time_control: TimeControl,
    pub initial_fen: Option<String>,
    pub rated: bool,
}

#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub enum GameStatus {
    Created,
    Started,
    Aborted,
    Mate,
    Resign,
    Stalemate,
    Timeout,
    Draw,
    OutOfTime,
    Cheat,
    NoStart,
    UnknownFinish,
    VariantEnd,
}

impl GameStatus {
    pub fn is_terminal(self) -> bool {
        !matches!(self, Self::Created | Self::Started)
    }
}

/// Mutable per-game state as streamed by `gameState` frames. The move list grows
/// monotonically except across a server-acknowledged takeback.
#[derive(Debug, Clone)]
pub struct GameState {
    pub moves: Vec<String>,
    pub white_time: Duration,
    pub black_time: Duration,
    pub increment: Duration,
    pub white_draw_offered: bool,
    pub black_draw_offered: bool,
    pub white_takeback_requested: bool,
    pub black_takeback_requested: bool,
    pub status: GameStatus,
    pub last_score_cp: Option<i32>,
    /// The winning side, when the service reports one directly on the terminal
    /// `gameState` frame. `None` on a draw, an unresolved abort, or a non-terminal state.
    pub winner: Option<Colour>,
}

impl GameState {
    pub fn whose_turn(&self, our_colour: Colour) -> bool {
        let white_to_move = self.moves.len() % 2 == 0;
        match our_colour {
            Colour::White => white_to_move,
            Colour::Black => !white_to_move,
        }
    }
}

#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub enum DeclineCode {
    Generic,
    Later,
    TooFast,
    TooSlow,
    TimeControl,
    Rated,
    Casual,
    Standard,
    Variant,
    NoBot,
    OnlyBot,
}

impl DeclineCode {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Generic => "generic",
            Self::Later => "later",
            Self::TooFast => "tooFast",
            Self::TooSlow => "tooSlow",
            Self::TimeControl => "timeControl",
            Self::Rated => "rated",
            Self::Casual => "casual",
            Self::Standard => "standard",
            Self::Variant => "variant",
            Self::NoBot => "noBot",
            Self::OnlyBot => "onlyBot",
        }
    }

    /// An unknown configured reason degrades to `generic` (§8 round-trip property).
    pub fn from_configured_str(s: &str) -> Self {
        match s {
            "later" => Self::Later,
            "tooFast" => Self::TooFast,
            "tooSlow" => Self::TooSlow,
            "timeControl" => Self::TimeControl,
            "rated" => Self::Rated,
            "casual" => Self::Casual,
            "standard" => Self::Standard,
            "variant" => Self::Variant,
            "noBot" => Self::NoBot,
            "onlyBot" => Self::OnlyBot,
            _ => Self::Generic,
        }
    }
}

#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub enum PolicyDecision {
    Accept,
    Decline(DeclineCode),
    Defer,
}

/// Per-endpoint-class rate limiting state, owned exclusively by the Remote Client.
#[derive(Debug, Clone)]
pub struct RateBudget {
    pub next_permitted: Instant,
    pub consecutive_failures: u32,
}

impl RateBudget {
    pub fn ready_now() -> Self {
        Self {
            next_permitted: Instant::now(),
            consecutive_failures: 0,
        }
    }
}

/// Opponent id -> earliest-retry instant, owned by the Matchmaker (§4.6's cooldown map).
#[derive(Debug, Clone, Default)]
pub struct CooldownMap {
    entries: std::collections::HashMap<String, Instant>,
}

impl CooldownMap {
    pub fn is_on_cooldown(&self, opponent_id: &str, now: Instant) -> bool {
        self.entries
            .get(opponent_id)
            .is_some_and(|until| now < *until)
    }

    pub fn record(&mut self, opponent_id: impl Into<String>, until: Instant) {
        self.entries.insert(opponent_id.into(), until);
    }

    /// Recency rank used by the matchmaker's bias function: opponents are ranked by how
    /// recently they were put on cooldown, rank 0 being the most recently challenged.
    pub fn recency_rank(&self, opponent_id: &str, now: Instant) -> usize {
        let Some(until) = self.entries.get(opponent_id) else {
            return usize::MAX;
        };
        let target_age = until.saturating_duration_since(now);
        self.entries
            .values()
            .filter(|other| other.saturating_duration_since(now) > target_age)
            .count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// §8: "Decline reasons round-trip to the documented enumeration; an unknown
    /// configured reason degrades to `generic`."
    #[test]
    fn decline_codes_round_trip_through_their_wire_string() {
        let all = [
            DeclineCode::Generic,
            DeclineCode::Later,
            DeclineCode::TooFast,
            DeclineCode::TooSlow,
            DeclineCode::TimeControl,
            DeclineCode::Rated,
            DeclineCode::Casual,
            DeclineCode::Standard,
            DeclineCode::Variant,
            DeclineCode::NoBot,
            DeclineCode::OnlyBot,
        ];
        for code in all {
            assert_eq!(DeclineCode::from_configured_str(code.as_str()), code);
        }
    }

    #[test]
    fn unknown_configured_reason_degrades_to_generic() {
        assert_eq!(
            DeclineCode::from_configured_str("not-a-real-reason"),
            DeclineCode::Generic
        );
    }
}
