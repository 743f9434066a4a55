use std::fmt;

use thiserror::Error;

/// The error taxonomy from the error-handling design: one shared set of kinds so
/// logging and propagation rules (§7 fatal-at-startup vs. absorbed-by-retry vs.
/// absorbed-by-restart) can be expressed uniformly across every component, instead
/// of each crate inventing its own error enum.
#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub enum ErrorKind {
    Config,
    Auth,
    Transport,
    RateLimit,
    Protocol,
    EngineSpawn,
    EngineProtocol,
    EngineBadMove,
    EngineDead,
    GameTerminated,
    Cancelled,
    Internal,
}

impl ErrorKind {
    /// Startup failures in these kinds are fatal to the process (§7, §6 exit codes).
    pub fn is_fatal_at_startup(self) -> bool {
        matches!(self, Self::Config | Self::Auth | Self::EngineSpawn)
    }

    pub fn exit_code(self) -> i32 {
        match self {
            Self::Config => 1,
            Self::Auth => 2,
            Self::EngineSpawn => 3,
            _ => 1,
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Config => "config",
            Self::Auth => "auth",
            Self::Transport => "transport",
            Self::RateLimit => "rate-limit",
            Self::Protocol => "protocol",
            Self::EngineSpawn => "engine-spawn",
            Self::EngineProtocol => "engine-protocol",
            Self::EngineBadMove => "engine-bad-move",
            Self::EngineDead => "engine-dead",
            Self::GameTerminated => "game-terminated",
            Self::Cancelled => "cancelled",
            Self::Internal => "internal",
        };
        write!(f, "{s}")
    }
}

/// A contextual identifier attached to a [`BotError`] — a game id or an endpoint class
/// string, per §7's "logs carry a kind tag and a contextual identifier".
#[derive(Debug, Clone, Eq, PartialEq)]
pub enum Context {
    Game(String),
    Endpoint(String),
    None,
}

impl fmt::Display for Context {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Game(id) => write!(f, "game={id}"),
            Self::Endpoint(class) => write!(f, "endpoint={class}"),
            Self::None => write!(f, "-"),
        }
    }
}

#[derive(Debug, Error)]
#[error("[{kind}] {context}: {message}")]
pub struct BotError {
    pub kind: ErrorKind,
    pub context: Context,
    pub message: String,
}

impl BotError {
    pub fn new(kind: ErrorKind, context: Context, message: impl Into<String>) -> Self {
        Self {
            kind,
            context,
            message: message.into(),
        }
    }

    pub fn config(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Config, Context::None, message)
    }

    pub fn transport(endpoint: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Transport, Context::Endpoint(endpoint.into()), message)
    }

    pub fn engine_dead(game_id: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(ErrorKind::EngineDead, Context::Game(game_id.into()), message)
    }
}
