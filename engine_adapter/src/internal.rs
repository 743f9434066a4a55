//! The optional subprocess-free dialect: runs the teacher's own `Caps` search directly
//! against the adapter's position model. Useful for running the bot without an external
//! engine binary and for tests that need a deterministic, fast "engine".

use gears::general::moves::Move;
use motors::eval::chess::lite::LiTEval;
use motors::search::chess::caps::Caps;
use motors::search::Engine as MotorsEngine;

use crate::limits::SearchLimits;
use crate::position::Position;
use crate::Res;

pub struct InternalDialect {
    engine: Caps,
}

impl InternalDialect {
    pub fn new() -> Self {
        Self {
            engine: Caps::for_eval::<LiTEval>(),
        }
    }

    pub async fn go(&mut self, pos: &Position, limits: &SearchLimits) -> Res<(String, Option<i32>)> {
        let board = *pos.current();
        let white_to_move = pos.active_player_is_white();
        let gears_limit = limits.to_gears_limit(white_to_move);
        // Caps' search is synchronous and CPU-bound; run it on a blocking thread so it
        // doesn't stall the async runtime the rest of the bot shares.
        let (mov_text, score) = tokio::task::block_in_place(move || {
            let result = self.engine.search_with_new_tt(board, gears_limit);
            let mov_text = result.chosen_move.compact_formatter(&board).to_string();
            (mov_text, result.score.0)
        });
        Ok((mov_text, Some(score)))
    }

    pub fn is_dead(&mut self) -> bool {
        false
    }
}

impl Default for InternalDialect {
    fn default() -> Self {
        Self::new()
    }
}
