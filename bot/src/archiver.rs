//! Serialises completed games to PGN and appends them to the configured sink (§4.7).
//! Runs as a single consumer behind an unbounded channel so a slow or failing sink
//! never blocks a Game Worker from finishing its own cleanup — failures are logged,
//! not propagated.

use std::path::PathBuf;
use std::time::Duration;

use log::{error, info};
use tokio::io::AsyncWriteExt;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::model::{Colour, GameDescriptor, GameStatus, TimeControl};

/// One completed game, handed from a closing Game Worker to the Archiver.
pub struct GameRecord {
    pub game_id: String,
    pub own_username: String,
    pub descriptor: GameDescriptor,
    pub uci_moves: Vec<String>,
    pub san_moves: Vec<String>,
    /// Remaining clock time for the side that just moved, one entry per ply, only as
    /// far as clock data was actually observed on the stream (§4.7's "where available").
    pub clocks: Vec<Duration>,
    pub status: GameStatus,
    pub winner: Option<Colour>,
}

/// Spawns the single-consumer archiver task. Returns the sender Game Workers use to
/// hand off completed records, and the task's join handle.
pub fn spawn(path: PathBuf) -> (mpsc::UnboundedSender<GameRecord>, JoinHandle<()>) {
    let (tx, rx) = mpsc::unbounded_channel();
    let handle = tokio::spawn(run(path, rx));
    (tx, handle)
}

async fn run(path: PathBuf, mut rx: mpsc::UnboundedReceiver<GameRecord>) {
    while let Some(record) = rx.recv().await {
        let game_id = record.game_id.clone();
        let pgn = format_pgn(&record);
        match append(&path, &pgn).await {
            Ok(()) => info!(target: "bot::archiver", "archived game {game_id} to {}", path.display()),
            Err(e) => error!(target: "bot::archiver", "failed to archive game {game_id}: {e}"),
        }
    }
    info!(target: "bot::archiver", "archiver channel closed, exiting");
}

async fn append(path: &PathBuf, pgn: &str) -> std::io::Result<()> {
    let mut file = tokio::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .await?;
    file.write_all(pgn.as_bytes()).await?;
    file.write_all(b"\n\n").await?;
    file.flush().await
}

fn result_tag(status: GameStatus, winner: Option<Colour>) -> &'static str {
    match winner {
        Some(Colour::White) => "1-0",
        Some(Colour::Black) => "0-1",
        None if matches!(status, GameStatus::Draw | GameStatus::Stalemate) => "1/2-1/2",
        _ => "*",
    }
}

fn termination_tag(status: GameStatus) -> &'static str {
    use GameStatus::*;
    match status {
        Mate => "Normal",
        Resign => "Normal",
        Stalemate => "Normal",
        Draw => "Normal",
        Timeout | OutOfTime => "Time forfeit",
        Aborted | NoStart => "Abandoned",
        Cheat => "Rules infraction",
        VariantEnd => "Normal",
        UnknownFinish | Created | Started => "Unterminated",
    }
}

/// Renders the `[TimeControl ...]` tag value per the PGN spec's `seconds[+increment]`
/// form, grounded on the teacher's own `TimeControl` tag in `gears::output::pgn`.
/// Correspondence and unlimited games have no per-move clock, so PGN's `"-"` stands in.
fn time_control_tag(tc: &TimeControl) -> String {
    match tc {
        TimeControl::Clock {
            initial_secs,
            increment_secs,
        } => format!("{initial_secs}+{increment_secs}"),
        TimeControl::Correspondence { .. } | TimeControl::Unlimited => "-".to_string(),
    }
}

fn escape_tag_value(s: &str) -> String {
    s.replace('\\', "\\\\").replace('"', "\\\"")
}

fn format_clock(remaining: Duration) -> String {
    let total_secs = remaining.as_secs();
    format!(
        "{}:{:02}:{:02}",
        total_secs / 3600,
        (total_secs % 3600) / 60,
        total_secs % 60
    )
}

fn players(record: &GameRecord) -> (String, String, Option<u32>, Option<u32>) {
    match record.descriptor.our_colour {
        Colour::White => (
            record.own_username.clone(),
            record.descriptor.opponent.name.clone(),
            None,
            record.descriptor.opponent.rating,
        ),
        Colour::Black => (
            record.descriptor.opponent.name.clone(),
            record.own_username.clone(),
            record.descriptor.opponent.rating,
            None,
        ),
    }
}

/// Builds one complete PGN game record: tag-pair header followed by a numbered
/// movetext section with a `{[%clk h:mm:ss]}` comment after every ply clock data was
/// available for, grounded on the teacher's own `gears::output::pgn` tag-pair set,
/// adapted to what the remote service actually reports (no FEN/SetUp tags unless the
/// game started from a non-standard position).
fn format_pgn(record: &GameRecord) -> String {
    let (white, black, white_elo, black_elo) = players(record);
    let result = result_tag(record.status, record.winner);
    let mut header = format!(
        "[Event \"Rated {variant} game\"]\n\
         [Site \"{site}\"]\n\
         [Date \"{date}\"]\n\
         [Round \"-\"]\n\
         [White \"{white}\"]\n\
         [Black \"{black}\"]\n\
         [Result \"{result}\"]\n",
        variant = if record.descriptor.rated { "rated" } else { "casual" },
        site = escape_tag_value(&format!("https://lichess.org/{}", record.game_id)),
        date = chrono::Utc::now().format("%Y.%m.%d"),
        white = escape_tag_value(&white),
        black = escape_tag_value(&black),
    );
    if let Some(elo) = white_elo {
        header += &format!("[WhiteElo \"{elo}\"]\n");
    }
    if let Some(elo) = black_elo {
        header += &format!("[BlackElo \"{elo}\"]\n");
    }
    header += &format!(
        "[TimeControl \"{time_control}\"]\n[Variant \"{variant}\"]\n[Termination \"{termination}\"]\n\n",
        time_control = time_control_tag(&record.descriptor.time_control),
        variant = record.descriptor.variant,
        termination = termination_tag(record.status),
    );

    let mut body = String::new();
    for (ply, mov) in record.san_moves.iter().enumerate() {
        if ply % 2 == 0 {
            body += &format!("{}. {mov}", ply / 2 + 1);
        } else {
            body += &format!(" {mov}");
        }
        if let Some(clk) = record.clocks.get(ply) {
            body += &format!(" {{[%clk {}]}}", format_clock(*clk));
        }
        if ply % 2 == 0 {
            body.push(' ');
        } else {
            body.push('\n');
        }
    }
    let mut pgn = header;
    pgn += body.trim_end();
    pgn.push(' ');
    pgn += result;
    pgn
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::ChallengerIdentity;

    fn record(status: GameStatus, winner: Option<Colour>) -> GameRecord {
        GameRecord {
            game_id: "G1".to_string(),
            own_username: "OurBot".to_string(),
            descriptor: GameDescriptor {
                id: "G1".to_string(),
                our_colour: Colour::White,
                opponent: ChallengerIdentity {
                    name: "Opponent".to_string(),
                    rating: Some(2100),
                    title: None,
                    is_bot: false,
                },
                variant: "standard".to_string(),
                time_control: crate::model::TimeControl::Clock {
                    initial_secs: 180,
                    increment_secs: 2,
                },
                initial_fen: None,
                rated: true,
            },
            uci_moves: vec!["e2e4".to_string(), "e7e5".to_string()],
            san_moves: vec!["e4".to_string(), "e5".to_string()],
            clocks: vec![Duration::from_secs(178), Duration::from_secs(179)],
            status,
            winner,
        }
    }

    #[test]
    fn white_win_produces_1_0_result() {
        let r = record(GameStatus::Mate, Some(Colour::White));
        let pgn = format_pgn(&r);
        assert!(pgn.contains("[Result \"1-0\"]"));
        assert!(pgn.trim_end().ends_with("1-0"));
    }

    #[test]
    fn draw_with_no_winner_produces_half_result() {
        let r = record(GameStatus::Draw, None);
        let pgn = format_pgn(&r);
        assert!(pgn.contains("[Result \"1/2-1/2\"]"));
    }

    #[test]
    fn movetext_includes_clock_comments() {
        let r = record(GameStatus::Mate, Some(Colour::White));
        let pgn = format_pgn(&r);
        assert!(pgn.contains("1. e4 {[%clk 0:02:58]}"));
        assert!(pgn.contains("e5 {[%clk 0:02:59]}"));
    }

    #[test]
    fn unterminated_game_gets_asterisk_result() {
        let r = record(GameStatus::Started, None);
        assert_eq!(result_tag(GameStatus::Started, None), "*");
    }

    #[test]
    fn header_includes_time_control_tag() {
        let r = record(GameStatus::Mate, Some(Colour::White));
        let pgn = format_pgn(&r);
        assert!(pgn.contains("[TimeControl \"180+2\"]"));
    }

    #[test]
    fn correspondence_time_control_tag_is_a_dash() {
        assert_eq!(
            time_control_tag(&crate::model::TimeControl::Correspondence { days_per_turn: 3 }),
            "-"
        );
        assert_eq!(time_control_tag(&crate::model::TimeControl::Unlimited), "-");
    }
}
