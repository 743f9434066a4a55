//! Raw NDJSON frame shapes from the remote service (§6's event- and game-stream
//! surface), and their conversion into the domain types in [`crate::model`]. Kept
//! separate from `model` so a wire-format quirk (string move lists, millisecond
//! clocks, a `"type"` discriminator per variant) never leaks into the rest of the
//! bot.

use serde::Deserialize;
use std::time::Duration;

use crate::model::{
    Challenge, ChallengeSource, ChallengerIdentity, Colour, GameDescriptor, GameState, GameStatus,
    TimeControl,
};

#[derive(Debug, Deserialize)]
pub struct WireUser {
    pub id: String,
    pub username: String,
    pub title: Option<String>,
    pub rating: Option<u32>,
}

#[derive(Debug, Deserialize)]
pub struct WireVariant {
    pub key: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum WireTimeControl {
    Clock { limit: u32, increment: u32 },
    Correspondence { #[serde(rename = "daysPerTurn")] days_per_turn: u32 },
    Unlimited,
}

impl From<WireTimeControl> for TimeControl {
    fn from(tc: WireTimeControl) -> Self {
        match tc {
            WireTimeControl::Clock { limit, increment } => TimeControl::Clock {
                initial_secs: limit,
                increment_secs: increment,
            },
            WireTimeControl::Correspondence { days_per_turn } => {
                TimeControl::Correspondence { days_per_turn }
            }
            WireTimeControl::Unlimited => TimeControl::Unlimited,
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct WireChallenge {
    pub id: String,
    pub challenger: WireUser,
    pub variant: WireVariant,
    #[serde(rename = "timeControl")]
    pub time_control: WireTimeControl,
    pub rated: bool,
    pub color: Option<String>,
}

impl From<WireChallenge> for Challenge {
    fn from(c: WireChallenge) -> Self {
        let requested_colour = match c.color.as_deref() {
            Some("white") => Some(Colour::White),
            Some("black") => Some(Colour::Black),
            _ => None,
        };
        Challenge {
            id: c.id,
            challenger: ChallengerIdentity {
                name: c.challenger.username,
                rating: c.challenger.rating,
                is_bot: c.challenger.title.as_deref() == Some("BOT"),
                title: c.challenger.title,
            },
            variant: c.variant.key,
            time_control: c.time_control.into(),
            rated: c.rated,
            requested_colour,
            source: ChallengeSource::Lobby,
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct WireGameStartInfo {
    pub id: String,
    pub color: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type")]
#[allow(non_camel_case_types)]
pub enum AccountEvent {
    challenge { challenge: WireChallenge },
    challengeCanceled { challenge: WireChallenge },
    challengeDeclined { challenge: WireChallenge },
    gameStart { game: WireGameStartInfo },
    gameFinish { game: WireGameStartInfo },
}

#[derive(Debug, Deserialize, Default)]
pub struct WirePlayer {
    pub id: Option<String>,
    pub name: Option<String>,
    pub title: Option<String>,
    pub rating: Option<u32>,
}

#[derive(Debug, Deserialize)]
pub struct WireGameStateFrame {
    pub moves: String,
    pub wtime: u64,
    pub btime: u64,
    pub winc: u64,
    pub binc: u64,
    pub status: String,
    #[serde(rename = "wdraw", default)]
    pub white_draw_offered: bool,
    #[serde(rename = "bdraw", default)]
    pub black_draw_offered: bool,
    #[serde(rename = "wtakeback", default)]
    pub white_takeback_requested: bool,
    #[serde(rename = "btakeback", default)]
    pub black_takeback_requested: bool,
    #[serde(default)]
    pub winner: Option<String>,
}

fn parse_status(s: &str) -> GameStatus {
    match s {
        "created" => GameStatus::Created,
        "started" => GameStatus::Started,
        "aborted" => GameStatus::Aborted,
        "mate" => GameStatus::Mate,
        "resign" => GameStatus::Resign,
        "stalemate" => GameStatus::Stalemate,
        "timeout" => GameStatus::Timeout,
        "draw" => GameStatus::Draw,
        "outoftime" => GameStatus::OutOfTime,
        "cheat" => GameStatus::Cheat,
        "noStart" => GameStatus::NoStart,
        "variantEnd" => GameStatus::VariantEnd,
        _ => GameStatus::UnknownFinish,
    }
}

fn split_moves(moves: &str) -> Vec<String> {
    moves.split_whitespace().map(str::to_string).collect()
}

impl From<WireGameStateFrame> for GameState {
    fn from(f: WireGameStateFrame) -> Self {
        let winner = match f.winner.as_deref() {
            Some("white") => Some(Colour::White),
            Some("black") => Some(Colour::Black),
            _ => None,
        };
        GameState {
            moves: split_moves(&f.moves),
            white_time: Duration::from_millis(f.wtime),
            black_time: Duration::from_millis(f.btime),
            increment: Duration::from_millis(f.winc.max(f.binc)),
            white_draw_offered: f.white_draw_offered,
            black_draw_offered: f.black_draw_offered,
            white_takeback_requested: f.white_takeback_requested,
            black_takeback_requested: f.black_takeback_requested,
            status: parse_status(&f.status),
            // Populated by the Game Worker from the engine's own score once a move has
            // been searched; the wire never carries an evaluation.
            last_score_cp: None,
            winner,
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct WireGameFull {
    pub id: String,
    pub rated: bool,
    pub variant: WireVariant,
    #[serde(rename = "initialFen")]
    pub initial_fen: Option<String>,
    pub white: WirePlayer,
    pub black: WirePlayer,
    #[serde(rename = "timeControl", default)]
    pub time_control: Option<WireTimeControl>,
    pub state: WireGameStateFrame,
}

/// `our_id` identifies which side of `white`/`black` the running process is playing.
pub fn descriptor_from_full(full: &WireGameFull, our_id: &str) -> GameDescriptor {
    let we_are_white = full.white.id.as_deref() == Some(our_id);
    let (our_colour, opponent_player) = if we_are_white {
        (Colour::White, &full.black)
    } else {
        (Colour::White.opposite(), &full.white)
    };
    let opponent = ChallengerIdentity {
        name: opponent_player
            .name
            .clone()
            .unwrap_or_else(|| "Anonymous".to_string()),
        rating: opponent_player.rating,
        is_bot: opponent_player.title.as_deref() == Some("BOT"),
        title: opponent_player.title.clone(),
    };
    GameDescriptor {
        id: full.id.clone(),
        our_colour,
        opponent,
        variant: full.variant.key.clone(),
        time_control: full
            .time_control
            .clone()
            .map(TimeControl::from)
            .unwrap_or(TimeControl::Unlimited),
        initial_fen: full
            .initial_fen
            .clone()
            .filter(|fen| fen != "startpos"),
        rated: full.rated,
    }
}

#[derive(Debug, Deserialize)]
pub struct WireChatLine {
    pub username: String,
    pub text: String,
    pub room: String,
}

#[derive(Debug, Deserialize)]
pub struct WireOpponentGone {
    pub gone: bool,
    pub claimwintime: Option<u64>,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type")]
#[allow(non_camel_case_types)]
pub enum GameEvent {
    gameFull(WireGameFull),
    gameState(WireGameStateFrame),
    chatLine(WireChatLine),
    opponentGone(WireOpponentGone),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn splits_space_separated_move_list() {
        assert_eq!(split_moves("e2e4 e7e5 g1f3"), vec!["e2e4", "e7e5", "g1f3"]);
    }

    #[test]
    fn empty_move_list_parses_to_empty_vec() {
        assert!(split_moves("").is_empty());
    }

    #[test]
    fn unknown_status_degrades_to_unknown_finish() {
        assert_eq!(parse_status("somethingNew"), GameStatus::UnknownFinish);
    }

    #[test]
    fn takeback_flags_default_to_false_when_absent() {
        let frame = WireGameStateFrame {
            moves: "e2e4".to_string(),
            wtime: 1000,
            btime: 1000,
            winc: 0,
            binc: 0,
            status: "started".to_string(),
            white_draw_offered: false,
            black_draw_offered: false,
            white_takeback_requested: false,
            black_takeback_requested: false,
            winner: None,
        };
        let state: GameState = frame.into();
        assert!(!state.white_takeback_requested);
        assert!(!state.black_takeback_requested);
    }

    #[test]
    fn challenge_wire_frame_converts_bot_flag_from_title() {
        let wire = WireChallenge {
            id: "X1".to_string(),
            challenger: WireUser {
                id: "b1".to_string(),
                username: "B1".to_string(),
                title: Some("BOT".to_string()),
                rating: Some(2000),
            },
            variant: WireVariant {
                key: "standard".to_string(),
            },
            time_control: WireTimeControl::Clock {
                limit: 180,
                increment: 2,
            },
            rated: false,
            color: None,
        };
        let model: Challenge = wire.into();
        assert!(model.challenger.is_bot);
        assert_eq!(model.challenger.name, "B1");
    }
}
