use std::time::Duration;

use gears::search::{Depth, NodesLimit, SearchLimit, TimeControl};

/// Minimum move time the adapter will ever hand to an engine, regardless of how little
/// clock time remains. Keeps a near-flagged engine from being handed a zero or negative
/// budget, which several UCI engines treat as "search forever".
pub const MIN_MOVE_TIME: Duration = Duration::from_millis(100);

/// The fraction of the remaining clock (after subtracting the configured safety margin)
/// that a single move is allowed to spend, absent a `movestogo` hint from the server.
const DEFAULT_TIME_FRACTION: u32 = 20;

/// Search limits as handed down from the Game Worker (C4) to the Engine Adapter (C2),
/// independent of wire dialect. Each dialect translates this into its own `go` syntax.
#[derive(Debug, Copy, Clone)]
pub struct SearchLimits {
    pub white_time: Duration,
    pub black_time: Duration,
    pub white_inc: Duration,
    pub black_inc: Duration,
    pub moves_to_go: Option<usize>,
    /// A hard engine-side move time cap taken from configuration, independent of the clock.
    pub move_overhead: Duration,
    pub max_move_time: Option<Duration>,
    pub depth: Option<Depth>,
    pub nodes: Option<NodesLimit>,
    pub infinite: bool,
}

impl Default for SearchLimits {
    fn default() -> Self {
        Self {
            white_time: Duration::MAX,
            black_time: Duration::MAX,
            white_inc: Duration::ZERO,
            black_inc: Duration::ZERO,
            moves_to_go: None,
            move_overhead: Duration::from_millis(0),
            max_move_time: None,
            depth: None,
            nodes: None,
            infinite: false,
        }
    }
}

impl SearchLimits {
    pub fn infinite() -> Self {
        Self {
            infinite: true,
            ..Self::default()
        }
    }

    pub fn fixed_move_time(time: Duration) -> Self {
        Self {
            max_move_time: Some(time),
            ..Self::default()
        }
    }

    /// The time remaining / increment for the side to move.
    fn clock_for(&self, white_to_move: bool) -> (Duration, Duration) {
        if white_to_move {
            (self.white_time, self.white_inc)
        } else {
            (self.black_time, self.black_inc)
        }
    }

    /// Computes the deadline for the upcoming move, applying the configured safety
    /// margin and flooring at `MIN_MOVE_TIME` so an almost-flagged clock never produces
    /// a non-positive or unusably small budget (the boundary case called out for the
    /// deadline computation).
    pub fn deadline_for(&self, white_to_move: bool) -> Duration {
        if self.infinite {
            return Duration::MAX;
        }
        if let Some(fixed) = self.max_move_time {
            return fixed.max(MIN_MOVE_TIME);
        }
        let (remaining, inc) = self.clock_for(white_to_move);
        if remaining >= Duration::MAX / 2 {
            return Duration::MAX;
        }
        let remaining = remaining.saturating_sub(self.move_overhead);
        let share = if let Some(moves_to_go) = self.moves_to_go.filter(|n| *n > 0) {
            remaining / moves_to_go as u32 + inc
        } else {
            remaining / DEFAULT_TIME_FRACTION + inc
        };
        share.max(MIN_MOVE_TIME)
    }

    /// Translates into the teacher's engine-side representation for driving the
    /// internal (subprocess-free) dialect.
    pub fn to_gears_limit(&self, white_to_move: bool) -> SearchLimit {
        if self.infinite {
            return SearchLimit::infinite();
        }
        if let Some(depth) = self.depth {
            return SearchLimit::depth(depth);
        }
        if let Some(nodes) = self.nodes {
            return SearchLimit::nodes(nodes);
        }
        if let Some(fixed) = self.max_move_time {
            return SearchLimit::per_move(fixed);
        }
        let (remaining, inc) = self.clock_for(white_to_move);
        SearchLimit::tc(TimeControl {
            remaining: remaining.saturating_sub(self.move_overhead),
            increment: inc,
            moves_to_go: self.moves_to_go,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn flags_near_zero_clock_floor_to_minimum() {
        let limits = SearchLimits {
            white_time: Duration::from_millis(50),
            ..SearchLimits::default()
        };
        assert_eq!(limits.deadline_for(true), MIN_MOVE_TIME);
    }

    #[test]
    fn fixed_move_time_is_respected() {
        let limits = SearchLimits::fixed_move_time(Duration::from_secs(2));
        assert_eq!(limits.deadline_for(true), Duration::from_secs(2));
        assert_eq!(limits.deadline_for(false), Duration::from_secs(2));
    }

    #[test]
    fn infinite_limits_never_time_out() {
        assert_eq!(SearchLimits::infinite().deadline_for(true), Duration::MAX);
    }

    #[test]
    fn moves_to_go_divides_remaining_time() {
        let limits = SearchLimits {
            white_time: Duration::from_secs(60),
            moves_to_go: Some(10),
            ..SearchLimits::default()
        };
        assert_eq!(limits.deadline_for(true), Duration::from_secs(6));
    }
}
