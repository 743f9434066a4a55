use std::time::Duration;

use log::debug;

use crate::limits::SearchLimits;
use crate::position::Position;
use crate::process::EngineProcess;
use crate::Res;

const HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(10);
/// Per-line read timeout while a search is in progress, mirroring the UCI dialect.
const THINKING_LINE_TIMEOUT: Duration = Duration::from_secs(30);
/// How long to wait for a move line after `?` once the deadline has elapsed.
const STOP_GRACE_PERIOD: Duration = Duration::from_secs(5);

/// Drives an XBoard (chess engine communication protocol v2) engine subprocess.
///
/// XBoard has no explicit "I'm ready" barrier comparable to UCI's `isready`/`readyok`;
/// `feature done=1` stands in for it during the handshake.
pub struct XBoardDialect {
    proc: EngineProcess,
}

impl XBoardDialect {
    pub async fn handshake(mut proc: EngineProcess) -> Res<Self> {
        proc.send_string("xboard").await?;
        proc.send_string("protover 2").await?;
        loop {
            let line = proc.read_string(HANDSHAKE_TIMEOUT).await?;
            if line.contains("done=1") {
                break;
            }
            debug!(target: "engine_adapter::xboard", "feature line: {line}");
        }
        proc.send_string("new").await?;
        proc.send_string("force").await?;
        // Enables "thinking output": ply/score/time/nodes/pv lines during a search,
        // the only way XBoard surfaces an evaluation.
        proc.send_string("post").await?;
        Ok(Self { proc })
    }

    /// Resets the engine's board to the start position and replays the full move list
    /// on every call. XBoard has no incremental "apply just this move" signal we can
    /// trust across calls (a takeback shrinks the list we'd be diffing against), so
    /// `setboard` is reissued every time rather than only when the start FEN changes;
    /// skipping it desyncs the engine's board against an already-advanced position.
    pub async fn set_position(&mut self, pos: &Position) -> Res<()> {
        self.proc.send_string("force").await?;
        self.proc
            .send_string(&format!("setboard {}", pos.start().as_fen()))
            .await?;
        for mov in pos.uci_moves() {
            self.proc.send_string(&format!("usermove {mov}")).await?;
        }
        Ok(())
    }

    /// Returns the chosen move and the last score seen in a "post" thinking line, if any.
    pub async fn go(&mut self, limits: &SearchLimits, white_to_move: bool) -> Res<(String, Option<i32>)> {
        self.send_time_controls(limits, white_to_move).await?;
        self.proc.send_string("go").await?;
        let deadline = limits.deadline_for(white_to_move);
        match tokio::time::timeout(deadline, self.read_move(THINKING_LINE_TIMEOUT)).await {
            Ok(result) => result,
            Err(_elapsed) => {
                // "?" asks the engine to move now, per §4.2's deadline-expiry handling.
                self.proc.send_string("?").await?;
                self.read_move(STOP_GRACE_PERIOD).await
            }
        }
    }

    async fn read_move(&mut self, per_read_timeout: Duration) -> Res<(String, Option<i32>)> {
        let mut last_score = None;
        loop {
            let line = self.proc.read_string(per_read_timeout).await?;
            let line = line.trim();
            if let Some(rest) = line.strip_prefix("move ") {
                return Ok((rest.trim().to_string(), last_score));
            }
            if line.starts_with('#') || line.starts_with("Illegal move") {
                continue;
            }
            if let Some(score) = parse_post_score(line) {
                last_score = Some(score);
            }
        }
    }

    async fn send_time_controls(&mut self, limits: &SearchLimits, white_to_move: bool) -> Res<()> {
        if limits.infinite {
            self.proc.send_string("analyze").await?;
            return Ok(());
        }
        if let Some(fixed) = limits.max_move_time {
            let centiseconds = (fixed.as_millis() / 10).max(1);
            self.proc.send_string(&format!("st {centiseconds}")).await?;
            return Ok(());
        }
        let (my_time, opp_time) = if white_to_move {
            (limits.white_time, limits.black_time)
        } else {
            (limits.black_time, limits.white_time)
        };
        self.proc
            .send_string(&format!("time {}", centiseconds(my_time)))
            .await?;
        self.proc
            .send_string(&format!("otim {}", centiseconds(opp_time)))
            .await?;
        Ok(())
    }

    pub async fn quit(mut self) {
        let _ = self.proc.send_string("quit").await;
        self.proc.kill().await;
    }

    pub fn is_dead(&mut self) -> bool {
        self.proc.has_exited()
    }
}

/// Parses a "post" thinking line's score field: `ply score time nodes pv...`, all of
/// `ply`/`score`/`time`/`nodes` numeric. Score is already in centipawns from the
/// engine's point of view (mate scores are reported by XBoard engines as large
/// centipawn values directly, so no separate mate-score handling is needed here).
fn parse_post_score(line: &str) -> Option<i32> {
    let mut tokens = line.split_whitespace();
    let ply = tokens.next()?;
    let score = tokens.next()?;
    let time = tokens.next()?;
    let nodes = tokens.next()?;
    ply.parse::<i32>().ok()?;
    time.parse::<i64>().ok()?;
    nodes.parse::<u64>().ok()?;
    score.parse::<i32>().ok()
}

fn centiseconds(d: Duration) -> u128 {
    if d >= Duration::MAX / 2 {
        u128::from(u32::MAX)
    } else {
        d.as_millis() / 10
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn centiseconds_converts_from_millis() {
        assert_eq!(centiseconds(Duration::from_millis(1234)), 123);
    }

    #[test]
    fn centiseconds_caps_infinite_clocks() {
        assert_eq!(centiseconds(Duration::MAX), u128::from(u32::MAX));
    }

    #[test]
    fn parses_score_from_post_thinking_line() {
        assert_eq!(
            parse_post_score("5 37 102 12345 e2e4 e7e5"),
            Some(37)
        );
    }

    #[test]
    fn non_post_lines_yield_no_score() {
        assert_eq!(parse_post_score("move e2e4"), None);
        assert_eq!(parse_post_score("# comment"), None);
    }
}
