//! Per-game finite state machine (§4.4): consumes one game's NDJSON stream, keeps an
//! `EngineSession` in sync with the reported position, submits moves on our turn, and
//! answers chat/draw/takeback requests. One worker owns exactly one `EngineSession`
//! and is destroyed at game end; it never outlives its game.

use std::pin::Pin;
use std::time::Duration;

use engine_adapter::{EngineSession, Position, SearchLimits};
use futures_util::{Stream, StreamExt};
use log::{info, warn};
use reqwest::Method;
use tokio::sync::{mpsc, watch};

use crate::archiver::GameRecord;
use crate::config::Config;
use crate::error::{BotError, Context as ErrContext, ErrorKind};
use crate::model::{Colour, GameDescriptor, GameState, GameStatus};
use crate::remote_client::{Idempotent, RemoteClient};
use crate::wire::{descriptor_from_full, GameEvent};

const STREAM_WATCHDOG: Duration = Duration::from_secs(60);
const MAX_CONSECUTIVE_BAD_MOVES: u32 = 2;

enum Phase {
    Opening,
    Running,
    Recovering,
    Closing,
}

/// Runs one game to completion. Blocking call — spawned as its own task by the
/// Control Loop, one per active game.
pub struct GameWorker {
    client: RemoteClient,
    config: Config,
    own_id: String,
    archive_tx: mpsc::UnboundedSender<GameRecord>,
    descriptor: Option<GameDescriptor>,
    position: Position,
    state: Option<GameState>,
    engine: Option<EngineSession>,
    stream: Option<Pin<Box<dyn Stream<Item = Result<GameEvent, BotError>> + Send>>>,
    consecutive_bad_moves: u32,
    /// Remaining clock of the side that just moved, one entry per ply observed on the
    /// stream — fed to the Archiver for its `{[%clk ...]}` annotations.
    clock_history: Vec<Duration>,
}

impl GameWorker {
    pub fn new(
        client: RemoteClient,
        config: Config,
        own_id: String,
        archive_tx: mpsc::UnboundedSender<GameRecord>,
    ) -> Self {
        Self {
            client,
            config,
            own_id,
            archive_tx,
            descriptor: None,
            position: Position::startpos(),
            state: None,
            engine: None,
            stream: None,
            consecutive_bad_moves: 0,
            clock_history: Vec::new(),
        }
    }

    /// Runs the game to completion. `shutdown` carries the process-wide graceful
    /// shutdown signal (§5): once it fires the worker stops waiting on new stream
    /// frames, resigns, and closes, rather than leaving the game suspended.
    pub async fn run(mut self, game_id: String, shutdown: watch::Receiver<bool>) {
        let mut phase = Phase::Opening;
        loop {
            phase = match phase {
                Phase::Opening => match self.open(&game_id).await {
                    Ok(()) => Phase::Running,
                    Err(e) => {
                        warn!(target: "bot::game_worker", "game {game_id} failed to open: {e}");
                        return;
                    }
                },
                Phase::Running => self.run_until_done(&game_id, &shutdown).await,
                Phase::Recovering => self.recover(&game_id).await,
                Phase::Closing => {
                    self.close(&game_id).await;
                    return;
                }
            };
        }
    }

    async fn open(&mut self, game_id: &str) -> Result<(), BotError> {
        let mut stream = self
            .client
            .open_json_stream::<GameEvent>(&format!("/api/bot/game/stream/{game_id}"), "game-stream")
            .await?;
        let first = stream
            .next()
            .await
            .ok_or_else(|| BotError::new(ErrorKind::Protocol, ErrContext::Game(game_id.to_string()), "stream closed before gameFull"))??;
        let GameEvent::gameFull(full) = first else {
            return Err(BotError::new(
                ErrorKind::Protocol,
                ErrContext::Game(game_id.to_string()),
                "first frame was not gameFull",
            ));
        };
        let descriptor = descriptor_from_full(&full, &self.own_id);
        let uci_moves = full.state.moves.split_whitespace().map(str::to_string).collect::<Vec<_>>();
        self.position = match &descriptor.initial_fen {
            Some(fen) => Position::from_fen(fen)
                .map_err(|e| BotError::new(ErrorKind::Protocol, ErrContext::Game(game_id.to_string()), e.to_string()))?,
            None => Position::startpos(),
        };
        let start = *self.position.start();
        self.position
            .reset_with_moves(start, &uci_moves)
            .map_err(|e| BotError::new(ErrorKind::Protocol, ErrContext::Game(game_id.to_string()), e.to_string()))?;
        self.state = Some(full.state.into());
        self.engine = Some(
            EngineSession::start(self.config.session_config())
                .await
                .map_err(|e| BotError::new(ErrorKind::EngineSpawn, ErrContext::Game(game_id.to_string()), e.to_string()))?,
        );
        self.stream = Some(stream);
        self.descriptor = Some(descriptor);
        info!(target: "bot::game_worker", "game {game_id} opened as {:?}", self.descriptor.as_ref().unwrap().our_colour);
        Ok(())
    }

    async fn run_until_done(&mut self, game_id: &str, shutdown: &watch::Receiver<bool>) -> Phase {
        loop {
            if *shutdown.borrow() {
                warn!(target: "bot::game_worker", "game {game_id} shutting down, resigning");
                let _ = self.resign(game_id).await;
                return Phase::Closing;
            }
            let Some(stream) = self.stream.as_mut() else {
                return Phase::Closing;
            };
            let mut shutdown_wait = shutdown.clone();
            let frame = tokio::select! {
                biased;
                changed = shutdown_wait.changed() => {
                    if changed.is_err() || *shutdown_wait.borrow() {
                        warn!(target: "bot::game_worker", "game {game_id} shutting down, resigning");
                        let _ = self.resign(game_id).await;
                        return Phase::Closing;
                    }
                    continue;
                }
                timed = tokio::time::timeout(STREAM_WATCHDOG, stream.next()) => timed,
            };
            let frame = match frame {
                Ok(Some(Ok(frame))) => frame,
                Ok(Some(Err(e))) => {
                    warn!(target: "bot::game_worker", "game {game_id} stream error: {e}");
                    if self.reopen_stream(game_id).await.is_ok() {
                        continue;
                    }
                    let _ = self.resign(game_id).await;
                    return Phase::Closing;
                }
                Ok(None) | Err(_) => {
                    warn!(target: "bot::game_worker", "game {game_id} stream watchdog elapsed");
                    if self.reopen_stream(game_id).await.is_ok() {
                        continue;
                    }
                    let _ = self.resign(game_id).await;
                    return Phase::Closing;
                }
            };
            match frame {
                GameEvent::gameFull(_) => continue,
                GameEvent::gameState(raw) => {
                    let new_state: GameState = raw.into();
                    self.record_clock_for_last_mover(&new_state);
                    if let Err(e) = self.apply_takeback_if_any(game_id, &new_state).await {
                        warn!(target: "bot::game_worker", "game {game_id} takeback handling failed: {e}");
                    }
                    let terminal = new_state.status.is_terminal();
                    self.state = Some(new_state);
                    if terminal {
                        return Phase::Closing;
                    }
                    if self.should_offer_or_accept_draw() {
                        let _ = self.offer_or_accept_draw(game_id).await;
                    }
                    match self.maybe_take_turn(game_id).await {
                        Ok(()) => {}
                        Err(e) if e.kind == ErrorKind::EngineDead => return Phase::Recovering,
                        Err(e) => {
                            warn!(target: "bot::game_worker", "game {game_id} move failed: {e}");
                            self.consecutive_bad_moves += 1;
                            if self.consecutive_bad_moves >= MAX_CONSECUTIVE_BAD_MOVES {
                                let _ = self.resign(game_id).await;
                                return Phase::Closing;
                            }
                        }
                    }
                }
                GameEvent::chatLine(chat) => self.handle_chat(game_id, &chat).await,
                GameEvent::opponentGone(_) => {
                    info!(target: "bot::game_worker", "game {game_id}: opponent appears to have left, continuing");
                }
            }
        }
    }

    async fn reopen_stream(&mut self, game_id: &str) -> Result<(), BotError> {
        let stream = self
            .client
            .open_json_stream::<GameEvent>(&format!("/api/bot/game/stream/{game_id}"), "game-stream")
            .await?;
        self.stream = Some(stream);
        Ok(())
    }

    /// Appends the remaining clock of whichever side's move produced `new_state` to
    /// `clock_history`, so the Archiver can annotate that ply. Takebacks are not
    /// un-recorded here; `close` only ever hands the Archiver as many clock entries as
    /// there are final moves, via `Vec::truncate`-style zipping on the shorter list.
    fn record_clock_for_last_mover(&mut self, new_state: &GameState) {
        let Some(prev) = &self.state else { return };
        if new_state.moves.len() <= prev.moves.len() {
            return; // takeback or a repeated frame, not a new ply
        }
        let white_just_moved = new_state.moves.len() % 2 == 1;
        let remaining = if white_just_moved {
            new_state.white_time
        } else {
            new_state.black_time
        };
        self.clock_history.push(remaining);
    }

    /// Answers an opponent-initiated takeback request (§4.4: "accept iff configured")
    /// and keeps the position model in sync with the authoritative move list either
    /// way. A takeback we declined is never enacted server-side, so the move list
    /// only ever shrinks here when we accepted one.
    async fn apply_takeback_if_any(&mut self, game_id: &str, new_state: &GameState) -> Result<(), BotError> {
        let opponent_requested = match self.descriptor.as_ref().map(|d| d.our_colour) {
            Some(Colour::White) => new_state.black_takeback_requested,
            Some(Colour::Black) => new_state.white_takeback_requested,
            None => false,
        };
        if opponent_requested {
            let action = if self.config.takeback_enabled { "yes" } else { "no" };
            self.client
                .request(
                    Method::POST,
                    &format!("/api/bot/game/{game_id}/takeback/{action}"),
                    "game-action",
                    None,
                    Idempotent::No,
                )
                .await?;
        }
        let Some(prev) = &self.state else { return Ok(()) };
        let shrank = new_state.moves.len() < prev.moves.len();
        let server_ahead = new_state.moves.len() > self.position.uci_moves().len();
        if (shrank && self.config.takeback_enabled) || server_ahead {
            let start = *self.position.start();
            self.position
                .reset_with_moves(start, &new_state.moves)
                .map_err(|e| BotError::new(ErrorKind::Internal, ErrContext::Game(game_id.to_string()), e.to_string()))?;
        }
        Ok(())
    }

    fn should_offer_or_accept_draw(&self) -> bool {
        self.config.draw_enabled
    }

    async fn offer_or_accept_draw(&mut self, game_id: &str) -> Result<(), BotError> {
        let Some(descriptor) = &self.descriptor else { return Ok(()) };
        let Some(state) = &self.state else { return Ok(()) };
        let opponent_offered = match descriptor.our_colour {
            Colour::White => state.black_draw_offered,
            Colour::Black => state.white_draw_offered,
        };
        if !opponent_offered {
            return Ok(());
        }
        let within_window = state
            .last_score_cp
            .map(|cp| cp.abs() <= self.config.draw_score_window_cp)
            .unwrap_or(false);
        let enough_moves = state.moves.len() as u32 >= self.config.draw_min_moves;
        if within_window && enough_moves {
            self.client
                .request(
                    Method::POST,
                    &format!("/api/bot/game/{game_id}/draw/yes"),
                    "game-action",
                    None,
                    Idempotent::No,
                )
                .await?;
        }
        Ok(())
    }

    async fn maybe_take_turn(&mut self, game_id: &str) -> Result<(), BotError> {
        let Some(descriptor) = &self.descriptor else { return Ok(()) };
        let Some(state) = &self.state else { return Ok(()) };
        if !state.whose_turn(descriptor.our_colour) {
            return Ok(());
        }
        let limits = self.limits_from_state(state);
        let engine = self.engine.as_mut().expect("engine session exists once opened");
        engine
            .set_position(&self.position)
            .await
            .map_err(|e| BotError::new(ErrorKind::EngineProtocol, ErrContext::Game(game_id.to_string()), e.to_string()))?;
        let searched = engine.search(&self.position, &limits).await;
        let (chosen, score_cp) = match searched {
            Ok(result) => result,
            Err(e) => {
                return Err(BotError::engine_dead(game_id.to_string(), e.to_string()));
            }
        };
        if let Some(state) = self.state.as_mut() {
            state.last_score_cp = score_cp;
        }
        if !self.position.is_legal_uci(&chosen) {
            return Err(BotError::new(
                ErrorKind::EngineBadMove,
                ErrContext::Game(game_id.to_string()),
                format!("engine proposed illegal move '{chosen}'"),
            ));
        }
        let response = self
            .client
            .request(
                Method::POST,
                &format!("/api/bot/game/{game_id}/move/{chosen}"),
                "make-move",
                None,
                Idempotent::No,
            )
            .await;
        match response {
            Ok(_) => {
                self.position
                    .push_uci(&chosen)
                    .map_err(|e| BotError::new(ErrorKind::Internal, ErrContext::Game(game_id.to_string()), e.to_string()))?;
                self.consecutive_bad_moves = 0;
                Ok(())
            }
            Err(e) if e.kind == ErrorKind::Protocol => {
                // Treated as the service's "conflict" response: re-derive state from a
                // fresh read rather than trust our own idea of whose turn it is.
                self.reopen_stream(game_id).await?;
                Ok(())
            }
            Err(e) => Err(e),
        }
    }

    fn limits_from_state(&self, state: &GameState) -> SearchLimits {
        use crate::config::EngineTimeMode;
        SearchLimits {
            white_time: state.white_time,
            black_time: state.black_time,
            white_inc: state.increment,
            black_inc: state.increment,
            moves_to_go: None,
            move_overhead: self.config.move_overhead,
            max_move_time: match self.config.engine_time_mode {
                EngineTimeMode::MoveTime => self.config.engine_fixed_move_time,
                _ => None,
            },
            depth: match self.config.engine_time_mode {
                EngineTimeMode::Depth => self.config.engine_depth,
                _ => None,
            },
            nodes: match self.config.engine_time_mode {
                EngineTimeMode::Nodes => self.config.engine_nodes,
                _ => None,
            },
            infinite: false,
        }
    }

    /// Lists only the commands that are actually enabled (Open Question 2: the chat
    /// vocabulary is {help, name, eval, ping}, each individually toggleable).
    fn help_text(&self) -> String {
        let mut commands = Vec::new();
        if self.config.chat_help {
            commands.push("help");
        }
        if self.config.chat_name {
            commands.push("name");
        }
        if self.config.chat_eval {
            commands.push("eval");
        }
        if self.config.chat_ping {
            commands.push("ping");
        }
        format!("commands: {}", commands.join(", "))
    }

    async fn handle_chat(&mut self, game_id: &str, chat: &crate::wire::WireChatLine) {
        if chat.username == self.own_id {
            return;
        }
        let reply = match chat.text.trim() {
            "help" if self.config.chat_help => Some(self.help_text()),
            "name" if self.config.chat_name => {
                Some(format!("I'm {0}, see https://lichess.org/@/{0}", self.own_id))
            }
            "eval" if self.config.chat_eval => Some(
                self.state
                    .as_ref()
                    .and_then(|s| s.last_score_cp)
                    .map(|cp| format!("eval: {cp} cp"))
                    .unwrap_or_else(|| "no evaluation available".to_string()),
            ),
            "ping" if self.config.chat_ping => Some("pong".to_string()),
            _ => None,
        };
        if let Some(text) = reply {
            let body = serde_json::json!({ "room": chat.room, "text": text });
            let _ = self
                .client
                .request(
                    Method::POST,
                    &format!("/api/bot/game/{game_id}/chat"),
                    "chat",
                    Some(body),
                    Idempotent::No,
                )
                .await;
        }
    }

    async fn recover(&mut self, game_id: &str) -> Phase {
        warn!(target: "bot::game_worker", "game {game_id} recovering from a dead engine");
        match EngineSession::start(self.config.session_config()).await {
            Ok(mut session) => {
                if session.set_position(&self.position).await.is_ok() {
                    self.engine = Some(session);
                    Phase::Running
                } else {
                    let _ = self.resign(game_id).await;
                    Phase::Closing
                }
            }
            Err(e) => {
                warn!(target: "bot::game_worker", "game {game_id} engine restart failed: {e}");
                let _ = self.resign(game_id).await;
                Phase::Closing
            }
        }
    }

    async fn resign(&mut self, game_id: &str) -> Result<(), BotError> {
        self.client
            .request(
                Method::POST,
                &format!("/api/bot/game/{game_id}/resign"),
                "game-action",
                None,
                Idempotent::No,
            )
            .await
            .map(|_| ())
    }

    async fn close(mut self, game_id: &str) {
        if let Some(engine) = self.engine.take() {
            engine.quit().await;
        }
        let status = self
            .state
            .as_ref()
            .map(|s| s.status)
            .unwrap_or(GameStatus::UnknownFinish);
        let winner = self.state.as_ref().and_then(|s| s.winner);
        if let Some(descriptor) = self.descriptor.take() {
            let record = GameRecord {
                game_id: game_id.to_string(),
                own_username: self.own_id.clone(),
                descriptor,
                uci_moves: self.position.uci_moves(),
                san_moves: self.position.san_moves(),
                clocks: self.clock_history.clone(),
                status,
                winner,
            };
            if self.archive_tx.send(record).is_err() {
                warn!(target: "bot::game_worker", "game {game_id}: archiver queue is gone, record dropped");
            }
        }
        info!(target: "bot::game_worker", "game {game_id} closed");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::model::GameStatus;

    fn load_config(extra: &str) -> Config {
        let path = std::env::temp_dir().join(format!(
            "bot-game-worker-test-{}-{}.toml",
            std::process::id(),
            extra.len()
        ));
        std::fs::write(
            &path,
            format!(
                r#"
                token = "secret"
                [engine]
                path = "/usr/bin/stockfish"
                protocol = "uci"
                {extra}
                "#
            ),
        )
        .unwrap();
        let cfg = Config::load(&path).unwrap();
        let _ = std::fs::remove_file(&path);
        cfg
    }

    fn worker_with(config: Config) -> GameWorker {
        let (archive_tx, _archive_rx) = mpsc::unbounded_channel();
        GameWorker::new(
            RemoteClient::new("https://example.test", "secret"),
            config,
            "bot-account".to_string(),
            archive_tx,
        )
    }

    fn state_with_clocks() -> GameState {
        GameState {
            moves: vec![],
            white_time: Duration::from_secs(90),
            black_time: Duration::from_secs(80),
            increment: Duration::from_secs(2),
            white_draw_offered: false,
            black_draw_offered: false,
            white_takeback_requested: false,
            black_takeback_requested: false,
            status: GameStatus::Started,
            last_score_cp: None,
            winner: None,
        }
    }

    #[test]
    fn clock_mode_carries_no_depth_nodes_or_fixed_time() {
        let worker = worker_with(load_config(r#"time_mode = "clock""#));
        let limits = worker.limits_from_state(&state_with_clocks());
        assert!(limits.depth.is_none());
        assert!(limits.nodes.is_none());
        assert!(limits.max_move_time.is_none());
        assert_eq!(limits.white_time, Duration::from_secs(90));
    }

    #[test]
    fn depth_mode_carries_configured_depth_only() {
        let worker = worker_with(load_config("time_mode = \"depth\"\ndepth = 15"));
        let limits = worker.limits_from_state(&state_with_clocks());
        assert_eq!(limits.depth.unwrap().get(), 15);
        assert!(limits.nodes.is_none());
        assert!(limits.max_move_time.is_none());
    }

    #[test]
    fn nodes_mode_carries_configured_nodes_only() {
        let worker = worker_with(load_config("time_mode = \"nodes\"\nnodes = 250000"));
        let limits = worker.limits_from_state(&state_with_clocks());
        assert_eq!(limits.nodes.unwrap().get(), 250_000);
        assert!(limits.depth.is_none());
        assert!(limits.max_move_time.is_none());
    }

    #[test]
    fn movetime_mode_carries_configured_fixed_time_not_overhead() {
        let worker = worker_with(load_config(
            "time_mode = \"movetime\"\nmovetime_ms = 300\nmove_overhead_ms = 50",
        ));
        let limits = worker.limits_from_state(&state_with_clocks());
        assert_eq!(limits.max_move_time, Some(Duration::from_millis(300)));
        assert!(limits.depth.is_none());
        assert!(limits.nodes.is_none());
    }
}
