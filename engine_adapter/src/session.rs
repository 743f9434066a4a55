use std::path::PathBuf;
use std::time::Duration;

use log::{error, info, warn};

use crate::internal::InternalDialect;
use crate::limits::SearchLimits;
use crate::position::Position;
use crate::process::EngineProcess;
use crate::uci::UciDialect;
use crate::xboard::XBoardDialect;
use crate::Res;

const QUIT_GRACE_PERIOD: Duration = Duration::from_secs(5);

/// Which wire dialect a configured engine speaks, or whether it's the bundled engine.
#[derive(Debug, Clone)]
pub enum Dialect {
    Uci {
        path: PathBuf,
        args: Vec<String>,
        options: Vec<(String, String)>,
    },
    XBoard {
        path: PathBuf,
        args: Vec<String>,
    },
    Internal,
}

#[derive(Debug, Clone)]
pub struct SessionConfig {
    pub dialect: Dialect,
    /// How many times a crashed engine is restarted before the session gives up and
    /// surfaces an error to the Game Worker. Defaults to 1 (see `engine.max-restarts`).
    pub max_restarts: u32,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            dialect: Dialect::Internal,
            max_restarts: 1,
        }
    }
}

enum Live {
    Uci(UciDialect),
    XBoard(XBoardDialect),
    Internal(InternalDialect),
}

/// One engine's whole lifecycle as seen by the Game Worker: position setup, asking for
/// a move, and a clean or forced shutdown. Hides which wire dialect (or no wire at all)
/// is actually in use, and hides engine-crash recovery behind `search`.
pub struct EngineSession {
    config: SessionConfig,
    live: Live,
    restarts_used: u32,
}

impl EngineSession {
    pub async fn start(config: SessionConfig) -> Res<Self> {
        let live = Self::spawn(&config.dialect).await?;
        Ok(Self {
            config,
            live,
            restarts_used: 0,
        })
    }

    async fn spawn(dialect: &Dialect) -> Res<Live> {
        match dialect {
            Dialect::Uci {
                path,
                args,
                options,
            } => {
                let proc = EngineProcess::new(path, args)?;
                Ok(Live::Uci(UciDialect::handshake(proc, options).await?))
            }
            Dialect::XBoard { path, args } => {
                let proc = EngineProcess::new(path, args)?;
                Ok(Live::XBoard(XBoardDialect::handshake(proc).await?))
            }
            Dialect::Internal => Ok(Live::Internal(InternalDialect::new())),
        }
    }

    pub async fn set_position(&mut self, pos: &Position) -> Res<()> {
        match &mut self.live {
            Live::Uci(d) => d.set_position(pos).await,
            Live::XBoard(d) => d.set_position(pos).await,
            Live::Internal(_) => Ok(()),
        }
    }

    /// Runs a search and returns the chosen move in compact (UCI) notation along with
    /// the engine's last reported score in centipawns, if it reported one.
    ///
    /// If the engine has silently died, performs exactly one restart attempt (bounded by
    /// `config.max_restarts`), replaying the position into the fresh process before
    /// retrying the search once. A second failure is surfaced to the caller.
    pub async fn search(&mut self, pos: &Position, limits: &SearchLimits) -> Res<(String, Option<i32>)> {
        let white_to_move = pos.active_player_is_white();
        match self.try_search(pos, limits, white_to_move).await {
            Ok(result) => Ok(result),
            Err(e) if self.restarts_used < self.config.max_restarts => {
                warn!(
                    target: "engine_adapter::session",
                    "engine search failed ({e}), attempting restart {}/{}",
                    self.restarts_used + 1,
                    self.config.max_restarts
                );
                self.restarts_used += 1;
                self.live = Self::spawn(&self.config.dialect).await?;
                self.set_position(pos).await?;
                self.try_search(pos, limits, white_to_move).await
            }
            Err(e) => {
                error!(target: "engine_adapter::session", "engine search failed permanently: {e}");
                Err(e)
            }
        }
    }

    async fn try_search(
        &mut self,
        pos: &Position,
        limits: &SearchLimits,
        white_to_move: bool,
    ) -> Res<(String, Option<i32>)> {
        match &mut self.live {
            Live::Uci(d) => d.go(limits, white_to_move).await,
            Live::XBoard(d) => d.go(limits, white_to_move).await,
            Live::Internal(d) => d.go(pos, limits).await,
        }
    }

    /// UCI-only: informs the engine its ponder guess was correct. No-op on other dialects.
    pub async fn ponder_hit(&mut self) -> Res<()> {
        match &mut self.live {
            Live::Uci(d) => d.ponder_hit().await,
            _ => Ok(()),
        }
    }

    /// UCI-only: asks the engine to stop searching early. No-op on other dialects, which
    /// have no equivalent mid-search interrupt in this adapter's supported subset.
    pub async fn stop_ponder(&mut self) -> Res<()> {
        match &mut self.live {
            Live::Uci(d) => d.stop().await,
            _ => Ok(()),
        }
    }

    pub fn is_dead(&mut self) -> bool {
        match &mut self.live {
            Live::Uci(d) => d.is_dead(),
            Live::XBoard(d) => d.is_dead(),
            Live::Internal(d) => d.is_dead(),
        }
    }

    /// Graceful shutdown: asks the engine to quit, with a bounded grace period before
    /// falling back to a forced kill, per the spec's quit() contract.
    pub async fn quit(self) {
        let fut = async {
            match self.live {
                Live::Uci(d) => d.quit().await,
                Live::XBoard(d) => d.quit().await,
                Live::Internal(_) => {}
            }
        };
        if tokio::time::timeout(QUIT_GRACE_PERIOD, fut).await.is_err() {
            info!(target: "engine_adapter::session", "engine did not quit within grace period");
        }
    }
}
