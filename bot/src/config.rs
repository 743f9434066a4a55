use std::path::{Path, PathBuf};
use std::time::Duration;

use clap::Parser;
use engine_adapter::{Dialect, SessionConfig};
use gears::search::{Depth, NodesLimit};
use serde::Deserialize;

use crate::error::BotError;

#[derive(Debug, Parser)]
#[command(name = "bot", about = "Plays chess games on a remote bot account")]
pub struct Cli {
    /// Path to the TOML configuration file. Falls back to the BOT_CONFIG environment
    /// variable, then to `config.toml`.
    #[arg(long)]
    pub config: Option<PathBuf>,

    #[arg(long)]
    pub log_level: Option<String>,

    /// Parse and validate configuration, then exit without connecting to anything.
    #[arg(long)]
    pub dry_run: bool,
}

impl Cli {
    pub fn config_path(&self) -> PathBuf {
        self.config
            .clone()
            .or_else(|| std::env::var_os("BOT_CONFIG").map(PathBuf::from))
            .unwrap_or_else(|| PathBuf::from("config.toml"))
    }
}

#[derive(Debug, Deserialize)]
struct EngineFile {
    path: String,
    #[serde(default)]
    args: Vec<String>,
    protocol: String,
    #[serde(default)]
    options: std::collections::HashMap<String, String>,
    #[serde(default = "default_time_mode")]
    time_mode: String,
    #[serde(default)]
    move_overhead_ms: u64,
    #[serde(default = "default_max_restarts")]
    max_restarts: u32,
    /// Fixed search depth in plies, used when `time_mode = "depth"`.
    depth: Option<u32>,
    /// Fixed node budget, used when `time_mode = "nodes"`.
    nodes: Option<u64>,
    /// Fixed per-move search time in milliseconds, used when `time_mode = "movetime"`.
    movetime_ms: Option<u64>,
}

fn default_time_mode() -> String {
    "clock".to_string()
}

fn default_max_restarts() -> u32 {
    1
}

#[derive(Debug, Deserialize)]
#[serde(default)]
struct ChallengeFile {
    variants: Vec<String>,
    time_controls: Vec<String>,
    min_initial: u32,
    max_initial: u32,
    min_increment: u32,
    max_increment: u32,
    modes: Vec<String>,
    accept_bot: bool,
    only_bot: bool,
    block_list: Vec<String>,
}

impl Default for ChallengeFile {
    fn default() -> Self {
        Self {
            variants: vec!["standard".to_string()],
            time_controls: vec!["bullet".to_string(), "blitz".to_string(), "rapid".to_string()],
            min_initial: 0,
            max_initial: 10_800,
            min_increment: 0,
            max_increment: 60,
            modes: vec!["rated".to_string(), "casual".to_string()],
            accept_bot: true,
            only_bot: false,
            block_list: vec![],
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(default)]
struct MatchmakingFile {
    enabled: bool,
    variant: String,
    time_control: String,
    opponents: Vec<String>,
    poll_interval_secs: u64,
    cooldown_secs: u64,
}

impl Default for MatchmakingFile {
    fn default() -> Self {
        Self {
            enabled: false,
            variant: "standard".to_string(),
            time_control: "180+2".to_string(),
            opponents: vec![],
            poll_interval_secs: 60,
            cooldown_secs: 3600,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(default)]
struct DrawFile {
    enabled: bool,
    score_window_cp: i32,
    min_moves: u32,
}

impl Default for DrawFile {
    fn default() -> Self {
        Self {
            enabled: false,
            score_window_cp: 20,
            min_moves: 0,
        }
    }
}

#[derive(Debug, Deserialize, Default)]
#[serde(default)]
struct TakebackFile {
    enabled: bool,
}

#[derive(Debug, Deserialize)]
#[serde(default)]
struct ChatFile {
    help: bool,
    name: bool,
    eval: bool,
    ping: bool,
}

impl Default for ChatFile {
    fn default() -> Self {
        Self {
            help: true,
            name: true,
            eval: true,
            ping: true,
        }
    }
}

#[derive(Debug, Deserialize)]
struct ConfigFile {
    token: String,
    base_url: Option<String>,
    engine: EngineFile,
    #[serde(default)]
    challenge: ChallengeFile,
    #[serde(default = "default_max_games")]
    max_games: usize,
    #[serde(default)]
    matchmaking: MatchmakingFile,
    #[serde(default)]
    draw: DrawFile,
    #[serde(default)]
    takeback: TakebackFile,
    #[serde(default)]
    chat: ChatFile,
    archive_path: Option<PathBuf>,
}

fn default_max_games() -> usize {
    4
}

/// The fully validated, immutable configuration handed to every other component.
/// Parsed once at startup (§5: "Configuration is loaded once and treated as immutable").
#[derive(Debug, Clone)]
pub struct Config {
    pub token: String,
    pub base_url: String,
    pub engine_path: PathBuf,
    pub engine_args: Vec<String>,
    pub engine_protocol: EngineProtocolChoice,
    pub engine_options: Vec<(String, String)>,
    pub engine_time_mode: EngineTimeMode,
    pub move_overhead: Duration,
    pub engine_max_restarts: u32,
    /// Fixed search depth, set when `engine_time_mode == Depth`.
    pub engine_depth: Option<Depth>,
    /// Fixed node budget, set when `engine_time_mode == Nodes`.
    pub engine_nodes: Option<NodesLimit>,
    /// Fixed per-move search time, set when `engine_time_mode == MoveTime`.
    pub engine_fixed_move_time: Option<Duration>,
    pub allowed_variants: Vec<String>,
    pub allowed_time_controls: Vec<String>,
    pub min_initial_secs: u32,
    pub max_initial_secs: u32,
    pub min_increment_secs: u32,
    pub max_increment_secs: u32,
    pub accept_rated: bool,
    pub accept_casual: bool,
    pub accept_bot: bool,
    pub only_bot: bool,
    pub block_list: Vec<String>,
    pub max_games: usize,
    pub matchmaking_enabled: bool,
    pub matchmaking_variant: String,
    pub matchmaking_time_control: String,
    pub matchmaking_opponents: Vec<String>,
    pub matchmaking_poll_interval: Duration,
    pub matchmaking_cooldown: Duration,
    pub draw_enabled: bool,
    pub draw_score_window_cp: i32,
    pub draw_min_moves: u32,
    pub takeback_enabled: bool,
    pub chat_help: bool,
    pub chat_name: bool,
    pub chat_eval: bool,
    pub chat_ping: bool,
    pub archive_path: PathBuf,
}

#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub enum EngineProtocolChoice {
    Uci,
    XBoard,
    Internal,
}

#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub enum EngineTimeMode {
    Clock,
    MoveTime,
    Depth,
    Nodes,
}

impl Config {
    pub fn load(path: &Path) -> Result<Self, BotError> {
        let raw = std::fs::read_to_string(path)
            .map_err(|e| BotError::config(format!("cannot read config file '{}': {e}", path.display())))?;
        let file: ConfigFile = toml::from_str(&raw)
            .map_err(|e| BotError::config(format!("malformed config file '{}': {e}", path.display())))?;
        Self::from_file(file)
    }

    fn from_file(file: ConfigFile) -> Result<Self, BotError> {
        let challenge = file.challenge;
        let matchmaking = file.matchmaking;
        let draw = file.draw;

        if challenge.min_initial > challenge.max_initial {
            return Err(BotError::config(format!(
                "challenge.min-initial ({}) must be <= challenge.max-initial ({})",
                challenge.min_initial, challenge.max_initial
            )));
        }
        if challenge.min_increment > challenge.max_increment {
            return Err(BotError::config(format!(
                "challenge.min-increment ({}) must be <= challenge.max-increment ({})",
                challenge.min_increment, challenge.max_increment
            )));
        }
        if file.max_games == 0 {
            return Err(BotError::config("max-games must be at least 1"));
        }
        let engine_protocol = match file.engine.protocol.as_str() {
            "uci" => EngineProtocolChoice::Uci,
            "xboard" => EngineProtocolChoice::XBoard,
            "internal" => EngineProtocolChoice::Internal,
            other => {
                return Err(BotError::config(format!(
                    "unknown engine.protocol '{other}', expected uci, xboard or internal"
                )))
            }
        };
        let engine_time_mode = match file.engine.time_mode.as_str() {
            "clock" => EngineTimeMode::Clock,
            "movetime" => EngineTimeMode::MoveTime,
            "depth" => EngineTimeMode::Depth,
            "nodes" => EngineTimeMode::Nodes,
            other => {
                return Err(BotError::config(format!(
                    "unknown engine.time-mode '{other}', expected clock, movetime, depth or nodes"
                )))
            }
        };
        let engine_depth = match (engine_time_mode, file.engine.depth) {
            (EngineTimeMode::Depth, Some(depth)) => Some(
                Depth::try_new(depth as isize)
                    .map_err(|e| BotError::config(format!("engine.depth: {e}")))?,
            ),
            (EngineTimeMode::Depth, None) => {
                return Err(BotError::config(
                    "engine.time-mode is 'depth' but engine.depth is not set",
                ))
            }
            _ => None,
        };
        let engine_nodes = match (engine_time_mode, file.engine.nodes) {
            (EngineTimeMode::Nodes, Some(nodes)) => Some(
                NodesLimit::new(nodes)
                    .ok_or_else(|| BotError::config("engine.nodes must be at least 1"))?,
            ),
            (EngineTimeMode::Nodes, None) => {
                return Err(BotError::config(
                    "engine.time-mode is 'nodes' but engine.nodes is not set",
                ))
            }
            _ => None,
        };
        let engine_fixed_move_time = match (engine_time_mode, file.engine.movetime_ms) {
            (EngineTimeMode::MoveTime, Some(ms)) => Some(Duration::from_millis(ms)),
            (EngineTimeMode::MoveTime, None) => {
                return Err(BotError::config(
                    "engine.time-mode is 'movetime' but engine.movetime-ms is not set",
                ))
            }
            _ => None,
        };
        let accept_rated = challenge.modes.iter().any(|m| m == "rated");
        let accept_casual = challenge.modes.iter().any(|m| m == "casual");

        Ok(Self {
            token: file.token,
            base_url: file
                .base_url
                .unwrap_or_else(|| "https://lichess.org".to_string()),
            engine_path: PathBuf::from(file.engine.path),
            engine_args: file.engine.args,
            engine_protocol,
            engine_options: file.engine.options.into_iter().collect(),
            engine_time_mode,
            move_overhead: Duration::from_millis(file.engine.move_overhead_ms),
            engine_max_restarts: file.engine.max_restarts,
            engine_depth,
            engine_nodes,
            engine_fixed_move_time,
            allowed_variants: challenge.variants,
            allowed_time_controls: challenge.time_controls,
            min_initial_secs: challenge.min_initial,
            max_initial_secs: challenge.max_initial,
            min_increment_secs: challenge.min_increment,
            max_increment_secs: challenge.max_increment,
            accept_rated,
            accept_casual,
            accept_bot: challenge.accept_bot,
            only_bot: challenge.only_bot,
            block_list: challenge.block_list,
            max_games: file.max_games,
            matchmaking_enabled: matchmaking.enabled,
            matchmaking_variant: matchmaking.variant,
            matchmaking_time_control: matchmaking.time_control,
            matchmaking_opponents: matchmaking.opponents,
            matchmaking_poll_interval: Duration::from_secs(matchmaking.poll_interval_secs),
            matchmaking_cooldown: Duration::from_secs(matchmaking.cooldown_secs),
            draw_enabled: draw.enabled,
            draw_score_window_cp: draw.score_window_cp,
            draw_min_moves: draw.min_moves,
            takeback_enabled: file.takeback.enabled,
            chat_help: file.chat.help,
            chat_name: file.chat.name,
            chat_eval: file.chat.eval,
            chat_ping: file.chat.ping,
            archive_path: file.archive_path.unwrap_or_else(|| PathBuf::from("games.pgn")),
        })
    }

    /// Builds the `engine_adapter` session parameters for the configured engine. Shared
    /// by the Game Worker (one session per game) and the startup handshake probe (one
    /// throwaway session to fail fast per §6/§7 before any game is accepted).
    pub fn session_config(&self) -> SessionConfig {
        let dialect = match self.engine_protocol {
            EngineProtocolChoice::Uci => Dialect::Uci {
                path: self.engine_path.clone(),
                args: self.engine_args.clone(),
                options: self.engine_options.clone(),
            },
            EngineProtocolChoice::XBoard => Dialect::XBoard {
                path: self.engine_path.clone(),
                args: self.engine_args.clone(),
            },
            EngineProtocolChoice::Internal => Dialect::Internal,
        };
        SessionConfig {
            dialect,
            max_restarts: self.engine_max_restarts,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn minimal_toml() -> &'static str {
        r#"
        token = "secret"
        [engine]
        path = "/usr/bin/stockfish"
        protocol = "uci"
        "#
    }

    #[test]
    fn minimal_config_parses_with_defaults() {
        let file: ConfigFile = toml::from_str(minimal_toml()).unwrap();
        let cfg = Config::from_file(file).unwrap();
        assert_eq!(cfg.max_games, 4);
        assert_eq!(cfg.allowed_variants, vec!["standard".to_string()]);
        assert!(cfg.accept_rated && cfg.accept_casual);
    }

    #[test]
    fn inverted_initial_bounds_are_rejected() {
        let toml_str = r#"
        token = "secret"
        [engine]
        path = "/usr/bin/stockfish"
        protocol = "uci"
        [challenge]
        min_initial = 100
        max_initial = 10
        "#;
        let file: ConfigFile = toml::from_str(toml_str).unwrap();
        assert!(Config::from_file(file).is_err());
    }

    #[test]
    fn unknown_protocol_is_rejected() {
        let toml_str = r#"
        token = "secret"
        [engine]
        path = "/usr/bin/stockfish"
        protocol = "carrier-pigeon"
        "#;
        let file: ConfigFile = toml::from_str(toml_str).unwrap();
        assert!(Config::from_file(file).is_err());
    }

    #[test]
    fn depth_mode_without_depth_value_is_rejected() {
        let toml_str = r#"
        token = "secret"
        [engine]
        path = "/usr/bin/stockfish"
        protocol = "uci"
        time_mode = "depth"
        "#;
        let file: ConfigFile = toml::from_str(toml_str).unwrap();
        assert!(Config::from_file(file).is_err());
    }

    #[test]
    fn depth_mode_with_depth_value_is_accepted() {
        let toml_str = r#"
        token = "secret"
        [engine]
        path = "/usr/bin/stockfish"
        protocol = "uci"
        time_mode = "depth"
        depth = 12
        "#;
        let file: ConfigFile = toml::from_str(toml_str).unwrap();
        let cfg = Config::from_file(file).unwrap();
        assert_eq!(cfg.engine_time_mode, EngineTimeMode::Depth);
        assert_eq!(cfg.engine_depth.unwrap().get(), 12);
        assert!(cfg.engine_nodes.is_none());
        assert!(cfg.engine_fixed_move_time.is_none());
    }

    #[test]
    fn nodes_mode_without_nodes_value_is_rejected() {
        let toml_str = r#"
        token = "secret"
        [engine]
        path = "/usr/bin/stockfish"
        protocol = "uci"
        time_mode = "nodes"
        "#;
        let file: ConfigFile = toml::from_str(toml_str).unwrap();
        assert!(Config::from_file(file).is_err());
    }

    #[test]
    fn nodes_mode_with_nodes_value_is_accepted() {
        let toml_str = r#"
        token = "secret"
        [engine]
        path = "/usr/bin/stockfish"
        protocol = "uci"
        time_mode = "nodes"
        nodes = 500000
        "#;
        let file: ConfigFile = toml::from_str(toml_str).unwrap();
        let cfg = Config::from_file(file).unwrap();
        assert_eq!(cfg.engine_nodes.unwrap().get(), 500_000);
    }

    #[test]
    fn movetime_mode_without_movetime_value_is_rejected() {
        let toml_str = r#"
        token = "secret"
        [engine]
        path = "/usr/bin/stockfish"
        protocol = "uci"
        time_mode = "movetime"
        "#;
        let file: ConfigFile = toml::from_str(toml_str).unwrap();
        assert!(Config::from_file(file).is_err());
    }

    #[test]
    fn movetime_mode_with_movetime_value_is_accepted() {
        let toml_str = r#"
        token = "secret"
        [engine]
        path = "/usr/bin/stockfish"
        protocol = "uci"
        time_mode = "movetime"
        movetime_ms = 250
        "#;
        let file: ConfigFile = toml::from_str(toml_str).unwrap();
        let cfg = Config::from_file(file).unwrap();
        assert_eq!(cfg.engine_fixed_move_time, Some(Duration::from_millis(250)));
    }

    #[test]
    fn clock_mode_ignores_depth_nodes_movetime_fields() {
        let file: ConfigFile = toml::from_str(minimal_toml()).unwrap();
        let cfg = Config::from_file(file).unwrap();
        assert_eq!(cfg.engine_time_mode, EngineTimeMode::Clock);
        assert!(cfg.engine_depth.is_none());
        assert!(cfg.engine_nodes.is_none());
        assert!(cfg.engine_fixed_move_time.is_none());
    }
}
