use anyhow::{bail, Context};
use gears::games::chess::Chessboard;
use gears::general::board::Board;
use gears::general::moves::{ExtendedFormat, Move};

use crate::Res;

/// The embedded rules engine the adapter uses to validate and replay moves.
///
/// Every move a wire-protocol engine proposes is checked here before it is ever sent
/// to the remote service; the service's own legality is never trusted as the sole
/// source of truth.
#[derive(Debug, Clone)]
pub struct Position {
    start: Chessboard,
    played: Vec<<Chessboard as Board>::Move>,
    current: Chessboard,
}

impl Position {
    pub fn startpos() -> Self {
        let start = Chessboard::startpos();
        Self {
            start,
            played: Vec::new(),
            current: start,
        }
    }

    pub fn from_fen(fen: &str) -> Res<Self> {
        let start = Chessboard::from_fen(fen).with_context(|| format!("invalid FEN '{fen}'"))?;
        Ok(Self {
            start,
            played: Vec::new(),
            current: start,
        })
    }

    pub fn current(&self) -> &Chessboard {
        &self.current
    }

    pub fn start(&self) -> &Chessboard {
        &self.start
    }

    pub fn moves_played(&self) -> &[<Chessboard as Board>::Move] {
        &self.played
    }

    /// Reinitializes the game from `start`, replaying every move in `uci_moves` in order.
    /// Used by the Game Worker to rebuild a position after a takeback and by the Engine
    /// Adapter to replay history into a freshly (re)started engine.
    pub fn reset_with_moves(&mut self, start: Chessboard, uci_moves: &[String]) -> Res<()> {
        let mut cur = start;
        let mut played = Vec::with_capacity(uci_moves.len());
        for mov_str in uci_moves {
            let mov = <Chessboard as Board>::Move::from_compact_text(mov_str, &cur)
                .with_context(|| format!("illegal move '{mov_str}' in move list"))?;
            cur = cur
                .make_move(mov)
                .with_context(|| format!("move '{mov_str}' rejected by position model"))?;
            played.push(mov);
        }
        self.start = start;
        self.current = cur;
        self.played = played;
        Ok(())
    }

    /// Applies a single move given in compact (UCI) notation, checking legality against
    /// the current position. Returns an error rather than panicking on an illegal move.
    pub fn push_uci(&mut self, mov_str: &str) -> Res<()> {
        let mov = <Chessboard as Board>::Move::from_compact_text(mov_str, &self.current)
            .with_context(|| format!("illegal move '{mov_str}'"))?;
        self.push_move(mov)
    }

    pub fn push_move(&mut self, mov: <Chessboard as Board>::Move) -> Res<()> {
        if !self.current.is_move_pseudolegal(mov) {
            bail!(
                "move '{}' is not pseudolegal in position '{}'",
                mov.compact_formatter(&self.current),
                self.current.as_fen()
            );
        }
        let Some(next) = self.current.make_move(mov) else {
            bail!(
                "move '{}' was rejected by the position model",
                mov.compact_formatter(&self.current)
            );
        };
        self.current = next;
        self.played.push(mov);
        Ok(())
    }

    pub fn is_legal_uci(&self, mov_str: &str) -> bool {
        match <Chessboard as Board>::Move::from_compact_text(mov_str, &self.current) {
            Ok(mov) => self.current.is_move_legal(mov),
            Err(_) => false,
        }
    }

    pub fn uci_moves(&self) -> Vec<String> {
        let mut pos = self.start;
        let mut out = Vec::with_capacity(self.played.len());
        for mov in &self.played {
            out.push(mov.compact_formatter(&pos).to_string());
            pos = pos.make_move(*mov).expect("replayed move must stay legal");
        }
        out
    }

    /// SAN-quality move text for the whole game, used by the Archiver to write a PGN.
    pub fn san_moves(&self) -> Vec<String> {
        let mut pos = self.start;
        let mut out = Vec::with_capacity(self.played.len());
        for mov in &self.played {
            out.push(mov.to_extended_text(&pos, ExtendedFormat::Standard));
            pos = pos.make_move(*mov).expect("replayed move must stay legal");
        }
        out
    }

    pub fn fen(&self) -> String {
        self.current.as_fen()
    }

    pub fn active_player_is_white(&self) -> bool {
        self.current.active_player().is_first()
    }
}
