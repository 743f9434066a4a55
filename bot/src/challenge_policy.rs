use crate::config::Config;
use crate::model::{Challenge, DeclineCode, PolicyDecision, TimeControl, TimeControlCategory};

/// A snapshot of the state the policy needs, passed in by the Control Loop. Keeping
/// this separate from `Config` is what makes `evaluate` a pure function of its inputs
/// (§8: running it twice on identical inputs yields identical output).
#[derive(Debug, Clone, Copy)]
pub struct PolicyState<'a> {
    pub active_game_count: usize,
    pub currently_challenging_user: Option<&'a str>,
}

fn category_name(category: TimeControlCategory) -> &'static str {
    match category {
        TimeControlCategory::UltraBullet => "ultraBullet",
        TimeControlCategory::Bullet => "bullet",
        TimeControlCategory::Blitz => "blitz",
        TimeControlCategory::Rapid => "rapid",
        TimeControlCategory::Classical => "classical",
        TimeControlCategory::Correspondence => "correspondence",
    }
}

/// Pure function from (challenge, configuration, state) to a decision. No I/O, no
/// logging side effects — any logging of the outcome is the caller's business.
pub fn evaluate(challenge: &Challenge, config: &Config, state: PolicyState) -> PolicyDecision {
    if config.block_list.iter().any(|b| b == &challenge.challenger.name) {
        return PolicyDecision::Decline(DeclineCode::Generic);
    }
    if !config.allowed_variants.iter().any(|v| v == &challenge.variant) {
        return PolicyDecision::Decline(DeclineCode::Variant);
    }
    let category = category_name(challenge.time_control.category());
    if !config.allowed_time_controls.iter().any(|tc| tc == category) {
        return PolicyDecision::Decline(DeclineCode::TimeControl);
    }
    if let TimeControl::Clock {
        initial_secs,
        increment_secs,
    } = challenge.time_control
    {
        if initial_secs < config.min_initial_secs {
            return PolicyDecision::Decline(DeclineCode::TooFast);
        }
        if initial_secs > config.max_initial_secs {
            return PolicyDecision::Decline(DeclineCode::TooSlow);
        }
        if increment_secs < config.min_increment_secs {
            return PolicyDecision::Decline(DeclineCode::TooFast);
        }
        if increment_secs > config.max_increment_secs {
            return PolicyDecision::Decline(DeclineCode::TooSlow);
        }
    }
    if challenge.rated && !config.accept_rated {
        return PolicyDecision::Decline(DeclineCode::Rated);
    }
    if !challenge.rated && !config.accept_casual {
        return PolicyDecision::Decline(DeclineCode::Casual);
    }
    // Mode = standard start position if configured to refuse arbitrary positions.
    // The bot's config has no dedicated "refuse arbitrary fen" flag beyond the variant
    // allow-list, so a challenge whose variant isn't plain "standard" is only refused
    // here if "standard" is the sole allowed variant — anything else is already caught
    // by the variant check above.
    if config.allowed_variants == ["standard".to_string()] && challenge.variant != "standard" {
        return PolicyDecision::Decline(DeclineCode::Standard);
    }
    if config.only_bot && !challenge.challenger.is_bot {
        return PolicyDecision::Decline(DeclineCode::OnlyBot);
    }
    if !config.accept_bot && challenge.challenger.is_bot {
        return PolicyDecision::Decline(DeclineCode::NoBot);
    }
    if state.active_game_count >= config.max_games {
        return PolicyDecision::Defer;
    }
    PolicyDecision::Accept
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{EngineProtocolChoice, EngineTimeMode};
    use crate::model::ChallengerIdentity;
    use std::path::PathBuf;
    use std::time::Duration;

    fn base_config() -> Config {
        Config {
            token: "secret".to_string(),
            base_url: "https://lichess.org".to_string(),
            engine_path: PathBuf::from("/usr/bin/stockfish"),
            engine_args: vec![],
            engine_protocol: EngineProtocolChoice::Uci,
            engine_options: vec![],
            engine_time_mode: EngineTimeMode::Clock,
            move_overhead: Duration::from_millis(0),
            engine_max_restarts: 1,
            allowed_variants: vec!["standard".to_string()],
            allowed_time_controls: vec!["bullet".to_string(), "blitz".to_string(), "rapid".to_string()],
            min_initial_secs: 30,
            max_initial_secs: 600,
            min_increment_secs: 0,
            max_increment_secs: 10,
            accept_rated: true,
            accept_casual: true,
            accept_bot: true,
            only_bot: false,
            block_list: vec!["blocked-user".to_string()],
            max_games: 4,
            matchmaking_enabled: false,
            matchmaking_variant: "standard".to_string(),
            matchmaking_time_control: "180+2".to_string(),
            matchmaking_opponents: vec![],
            matchmaking_poll_interval: Duration::from_secs(60),
            matchmaking_cooldown: Duration::from_secs(3600),
            draw_enabled: false,
            draw_score_window_cp: 20,
            draw_min_moves: 0,
            takeback_enabled: false,
            chat_help: true,
            chat_name: true,
            chat_eval: true,
            chat_ping: true,
            archive_path: PathBuf::from("games.pgn"),
        }
    }

    fn challenger(name: &str, is_bot: bool) -> ChallengerIdentity {
        ChallengerIdentity {
            name: name.to_string(),
            rating: Some(1800),
            title: if is_bot { Some("BOT".to_string()) } else { None },
            is_bot,
        }
    }

    fn challenge(variant: &str, initial: u32, increment: u32, rated: bool, is_bot: bool) -> Challenge {
        Challenge {
            id: "X1".to_string(),
            challenger: challenger("opponent", is_bot),
            variant: variant.to_string(),
            time_control: TimeControl::Clock {
                initial_secs: initial,
                increment_secs: increment,
            },
            rated,
            requested_colour: None,
            source: crate::model::ChallengeSource::Lobby,
        }
    }

    fn state(active_games: usize) -> PolicyState<'static> {
        PolicyState {
            active_game_count: active_games,
            currently_challenging_user: None,
        }
    }

    #[test]
    fn accepts_a_matching_challenge() {
        let cfg = base_config();
        let c = challenge("standard", 180, 2, true, true);
        assert_eq!(evaluate(&c, &cfg, state(0)), PolicyDecision::Accept);
    }

    #[test]
    fn declines_blocked_challenger() {
        let cfg = base_config();
        let mut c = challenge("standard", 180, 2, true, true);
        c.challenger = challenger("blocked-user", true);
        assert_eq!(
            evaluate(&c, &cfg, state(0)),
            PolicyDecision::Decline(DeclineCode::Generic)
        );
    }

    #[test]
    fn declines_disallowed_variant() {
        let cfg = base_config();
        let c = challenge("horde", 180, 2, true, true);
        assert_eq!(
            evaluate(&c, &cfg, state(0)),
            PolicyDecision::Decline(DeclineCode::Variant)
        );
    }

    #[test]
    fn declines_too_fast_time_control() {
        let cfg = base_config();
        let c = challenge("standard", 15, 0, true, true);
        assert_eq!(
            evaluate(&c, &cfg, state(0)),
            PolicyDecision::Decline(DeclineCode::TooFast)
        );
    }

    #[test]
    fn boundary_initial_time_is_accepted() {
        let cfg = base_config();
        let at_min = challenge("standard", cfg.min_initial_secs, 0, true, true);
        let at_max = challenge("standard", cfg.max_initial_secs, 0, true, true);
        assert_eq!(evaluate(&at_min, &cfg, state(0)), PolicyDecision::Accept);
        assert_eq!(evaluate(&at_max, &cfg, state(0)), PolicyDecision::Accept);
    }

    #[test]
    fn declines_rated_when_only_casual_accepted() {
        let mut cfg = base_config();
        cfg.accept_rated = false;
        let c = challenge("standard", 180, 2, true, true);
        assert_eq!(
            evaluate(&c, &cfg, state(0)),
            PolicyDecision::Decline(DeclineCode::Rated)
        );
    }

    #[test]
    fn declines_humans_when_only_bot_configured() {
        let mut cfg = base_config();
        cfg.only_bot = true;
        let c = challenge("standard", 180, 2, true, false);
        assert_eq!(
            evaluate(&c, &cfg, state(0)),
            PolicyDecision::Decline(DeclineCode::OnlyBot)
        );
    }

    #[test]
    fn declines_bots_when_configured_to_refuse_them() {
        let mut cfg = base_config();
        cfg.accept_bot = false;
        let c = challenge("standard", 180, 2, true, true);
        assert_eq!(
            evaluate(&c, &cfg, state(0)),
            PolicyDecision::Decline(DeclineCode::NoBot)
        );
    }

    #[test]
    fn defers_when_at_concurrency_cap() {
        let cfg = base_config();
        let c = challenge("standard", 180, 2, true, true);
        assert_eq!(evaluate(&c, &cfg, state(cfg.max_games)), PolicyDecision::Defer);
    }

    #[test]
    fn evaluation_is_deterministic() {
        let cfg = base_config();
        let c = challenge("standard", 180, 2, true, true);
        let first = evaluate(&c, &cfg, state(0));
        let second = evaluate(&c, &cfg, state(0));
        assert_eq!(first, second);
    }
}
