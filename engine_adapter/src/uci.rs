use std::time::Duration;

use anyhow::{bail, Context};
use log::{debug, warn};

use crate::limits::SearchLimits;
use crate::position::Position;
use crate::process::EngineProcess;
use crate::Res;

const HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(10);
const ISREADY_TIMEOUT: Duration = Duration::from_secs(10);
/// Per-line read timeout while a search is in progress. Bounds a single stalled read;
/// the overall search is bounded by the deadline passed to `go`, not by this constant.
const INFO_LINE_TIMEOUT: Duration = Duration::from_secs(30);
/// How long to wait for a `bestmove` line after sending `stop` once the deadline has
/// elapsed, before giving up on the engine entirely.
const STOP_GRACE_PERIOD: Duration = Duration::from_secs(5);

/// Drives a UCI engine subprocess through handshake, position setup and search.
///
/// Does not itself decide *when* to search or what the deadline is (that's
/// `SessionConfig`/`SearchLimits`); it only knows how to say these things in UCI.
pub struct UciDialect {
    proc: EngineProcess,
}

impl UciDialect {
    pub async fn handshake(mut proc: EngineProcess, options: &[(String, String)]) -> Res<Self> {
        proc.send_string("uci").await?;
        loop {
            let line = proc.read_string(HANDSHAKE_TIMEOUT).await?;
            if line.trim() == "uciok" {
                break;
            }
        }
        for (name, value) in options {
            proc.send_string(&format!("setoption name {name} value {value}"))
                .await?;
        }
        proc.send_string("isready").await?;
        loop {
            let line = proc.read_string(ISREADY_TIMEOUT).await?;
            if line.trim() == "readyok" {
                break;
            }
            debug!(target: "engine_adapter::uci", "ignoring pre-readyok line: {line}");
        }
        proc.send_string("ucinewgame").await?;
        Ok(Self { proc })
    }

    pub async fn set_position(&mut self, pos: &Position) -> Res<()> {
        let moves = pos.uci_moves();
        let mut cmd = format!("position fen {}", pos.start().as_fen());
        if !moves.is_empty() {
            cmd.push_str(" moves ");
            cmd.push_str(&moves.join(" "));
        }
        self.proc.send_string(&cmd).await
    }

    /// Returns the chosen move and, if the engine reported one via `info score ...`
    /// before its `bestmove` line, the last centipawn-equivalent score seen (mate
    /// scores are reported as a large constant rather than `None`, matching how a
    /// mate score manifests to the rest of the bot as "very much not a draw").
    pub async fn go(&mut self, limits: &SearchLimits, white_to_move: bool) -> Res<(String, Option<i32>)> {
        let cmd = build_go_command(limits, white_to_move);
        self.proc.send_string(&cmd).await?;
        let deadline = limits.deadline_for(white_to_move);
        match tokio::time::timeout(deadline, self.read_bestmove(INFO_LINE_TIMEOUT)).await {
            Ok(result) => result,
            Err(_elapsed) => {
                // Deadline expired without a `bestmove`: ask the engine to stop and
                // read the move it then emits, per §4.2 ("on deadline expiry the
                // adapter sends the stop command and reads the resulting best-move").
                warn!(target: "engine_adapter::uci", "search deadline elapsed, sending stop");
                self.proc.send_string("stop").await?;
                self.read_bestmove(STOP_GRACE_PERIOD).await
            }
        }
    }

    /// Reads lines until `bestmove`, tracking the most recent `info score ...` value.
    /// `per_read_timeout` bounds a single stalled read; the caller bounds the overall
    /// wait (via the outer `tokio::time::timeout` in `go`, or the grace period after
    /// `stop`).
    async fn read_bestmove(&mut self, per_read_timeout: Duration) -> Res<(String, Option<i32>)> {
        let mut last_score = None;
        loop {
            let line = self.proc.read_string(per_read_timeout).await?;
            let line = line.trim();
            if let Some(score) = parse_info_score(line) {
                last_score = Some(score);
            }
            if let Some(rest) = line.strip_prefix("bestmove") {
                let mov = rest
                    .split_whitespace()
                    .next()
                    .context("bestmove line had no move token")?;
                return Ok((mov.to_string(), last_score));
            }
        }
    }

    pub async fn stop(&mut self) -> Res<()> {
        self.proc.send_string("stop").await
    }

    pub async fn ponder_hit(&mut self) -> Res<()> {
        self.proc.send_string("ponderhit").await
    }

    pub async fn quit(mut self) {
        if self.proc.send_string("quit").await.is_err() {
            warn!(target: "engine_adapter::uci", "failed to send quit, killing process");
        }
        self.proc.kill().await;
    }

    pub fn is_dead(&mut self) -> bool {
        self.proc.has_exited()
    }
}

fn build_go_command(limits: &SearchLimits, white_to_move: bool) -> String {
    if limits.infinite {
        return "go infinite".to_string();
    }
    if let Some(depth) = limits.depth {
        return format!("go depth {}", depth.get());
    }
    if let Some(nodes) = limits.nodes {
        return format!("go nodes {}", nodes.get());
    }
    if let Some(fixed) = limits.max_move_time {
        return format!("go movetime {}", fixed.as_millis());
    }
    let mut cmd = format!(
        "go wtime {} btime {} winc {} binc {}",
        limits.white_time.as_millis(),
        limits.black_time.as_millis(),
        limits.white_inc.as_millis(),
        limits.black_inc.as_millis(),
    );
    if let Some(mtg) = limits.moves_to_go {
        cmd.push_str(&format!(" movestogo {mtg}"));
    }
    let _ = white_to_move; // UCI's go carries both clocks, the engine picks its own side
    cmd
}

/// Parses the score carried by a UCI `info ... score cp N ...` or `info ... score mate
/// N ...` line. Mate scores are folded into a large centipawn-equivalent magnitude
/// (signed by which side is mating) rather than `None`, so a forced mate still reads
/// as a decisive score to the draw-acceptance and `eval` logic upstream.
const MATE_SCORE_MAGNITUDE: i32 = 100_000;

fn parse_info_score(line: &str) -> Option<i32> {
    if !line.starts_with("info") {
        return None;
    }
    let tokens: Vec<&str> = line.split_whitespace().collect();
    let score_idx = tokens.iter().position(|&t| t == "score")?;
    match tokens.get(score_idx + 1..score_idx + 3) {
        Some([kind, value]) => {
            let value: i32 = value.parse().ok()?;
            match *kind {
                "cp" => Some(value),
                "mate" => Some(if value >= 0 {
                    MATE_SCORE_MAGNITUDE
                } else {
                    -MATE_SCORE_MAGNITUDE
                }),
                _ => None,
            }
        }
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn go_command_prefers_explicit_move_time() {
        let limits = SearchLimits::fixed_move_time(Duration::from_millis(500));
        assert_eq!(build_go_command(&limits, true), "go movetime 500");
    }

    #[test]
    fn go_command_falls_back_to_clocks() {
        let limits = SearchLimits {
            white_time: Duration::from_secs(60),
            black_time: Duration::from_secs(55),
            white_inc: Duration::from_secs(1),
            ..SearchLimits::default()
        };
        let cmd = build_go_command(&limits, true);
        assert!(cmd.starts_with("go wtime 60000 btime 55000 winc 1000 binc 0"));
    }

    #[test]
    fn infinite_search_uses_go_infinite() {
        assert_eq!(
            build_go_command(&SearchLimits::infinite(), true),
            "go infinite"
        );
    }

    #[test]
    fn parses_centipawn_score_from_info_line() {
        assert_eq!(
            parse_info_score("info depth 10 seldepth 14 score cp 37 nodes 12345 pv e2e4"),
            Some(37)
        );
    }

    #[test]
    fn parses_mate_score_as_a_large_signed_magnitude() {
        assert_eq!(
            parse_info_score("info depth 5 score mate 3 pv e2e4"),
            Some(MATE_SCORE_MAGNITUDE)
        );
        assert_eq!(
            parse_info_score("info depth 5 score mate -2 pv e2e4"),
            Some(-MATE_SCORE_MAGNITUDE)
        );
    }

    #[test]
    fn non_score_info_lines_yield_no_score() {
        assert_eq!(parse_info_score("info string hello"), None);
        assert_eq!(parse_info_score("bestmove e2e4"), None);
    }
}
