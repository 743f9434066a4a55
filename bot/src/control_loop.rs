//! Account-wide control loop (§4.5): consumes the event stream, evaluates incoming
//! challenges through the Challenge Policy, and spawns one Game Worker per accepted
//! game. Spawning is keyed by game id so a redelivered `gameStart` after a reconnect
//! never double-starts a worker (§8's idempotent-spawning property).

use std::collections::{HashSet, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use futures_util::StreamExt;
use log::{info, warn};
use reqwest::Method;
use tokio::sync::{mpsc, watch};
use tokio::time::sleep;

use crate::archiver::GameRecord;
use crate::challenge_policy::{self, PolicyState};
use crate::config::Config;
use crate::game_worker::GameWorker;
use crate::matchmaker::MatchmakerEvent;
use crate::model::{Challenge, PolicyDecision};
use crate::remote_client::{Idempotent, RemoteClient};
use crate::wire::AccountEvent;

const RECONNECT_BACKOFF_BASE: Duration = Duration::from_secs(1);
const RECONNECT_BACKOFF_CAP: Duration = Duration::from_secs(30);
/// Bounded pending list for deferred challenges (§4.5: "dropped from head when full").
const PENDING_CAP: usize = 16;
const DEFAULT_DRAIN_INTERVAL: Duration = Duration::from_secs(30);

pub struct ControlLoop {
    client: RemoteClient,
    config: Config,
    own_id: String,
    archive_tx: mpsc::UnboundedSender<GameRecord>,
    matchmaker_tx: mpsc::UnboundedSender<MatchmakerEvent>,
    active_count: Arc<AtomicUsize>,
    active_ids: HashSet<String>,
    pending_defers: VecDeque<Challenge>,
    reap_tx: mpsc::UnboundedSender<String>,
    reap_rx: mpsc::UnboundedReceiver<String>,
}

impl ControlLoop {
    pub fn new(
        client: RemoteClient,
        config: Config,
        own_id: String,
        archive_tx: mpsc::UnboundedSender<GameRecord>,
        matchmaker_tx: mpsc::UnboundedSender<MatchmakerEvent>,
    ) -> Self {
        let (reap_tx, reap_rx) = mpsc::unbounded_channel();
        Self {
            client,
            config,
            own_id,
            archive_tx,
            matchmaker_tx,
            active_count: Arc::new(AtomicUsize::new(0)),
            active_ids: HashSet::new(),
            pending_defers: VecDeque::new(),
            reap_tx,
            reap_rx,
        }
    }

    /// A read-only handle to the live worker count. Only this component ever mutates
    /// the underlying map (§5's "active-workers map ... owned by C5"); the Matchmaker
    /// and anything else that needs the count merely reads this atomic snapshot.
    pub fn active_count_handle(&self) -> Arc<AtomicUsize> {
        Arc::clone(&self.active_count)
    }

    pub async fn run(mut self, mut shutdown: watch::Receiver<bool>) {
        let mut attempt: u32 = 0;
        loop {
            if *shutdown.borrow() {
                return;
            }
            let mut stream = match self
                .client
                .open_json_stream::<AccountEvent>("/api/stream/event", "events-stream")
                .await
            {
                Ok(s) => {
                    attempt = 0;
                    s
                }
                Err(e) => {
                    warn!(target: "bot::control_loop", "failed to open event stream: {e}");
                    let delay = backoff(attempt);
                    attempt = attempt.saturating_add(1);
                    tokio::select! {
                        _ = sleep(delay) => continue,
                        _ = shutdown.changed() => { if *shutdown.borrow() { return } else { continue } },
                    }
                }
            };
            'stream: loop {
                tokio::select! {
                    biased;
                    changed = shutdown.changed() => {
                        if changed.is_err() || *shutdown.borrow() {
                            info!(target: "bot::control_loop", "shutdown requested, draining {} active game(s)", self.active_ids.len());
                            self.drain(DEFAULT_DRAIN_INTERVAL).await;
                            return;
                        }
                    }
                    Some(done_id) = self.reap_rx.recv() => {
                        self.on_worker_done(done_id);
                    }
                    frame = stream.next() => {
                        match frame {
                            Some(Ok(event)) => self.handle_event(event, shutdown.clone()).await,
                            Some(Err(e)) => {
                                warn!(target: "bot::control_loop", "event stream error: {e}");
                                break 'stream;
                            }
                            None => break 'stream,
                        }
                    }
                }
            }
        }
    }

    /// Graceful shutdown (§5): stop accepting new games, let existing workers reach a
    /// terminal state on their own (they react to the same `shutdown` signal by
    /// resigning), and force closure after `interval` regardless.
    async fn drain(&mut self, interval: Duration) {
        let deadline = tokio::time::Instant::now() + interval;
        while !self.active_ids.is_empty() {
            let remaining = deadline.saturating_duration_since(tokio::time::Instant::now());
            if remaining.is_zero() {
                warn!(target: "bot::control_loop", "drain interval elapsed with {} game(s) still active", self.active_ids.len());
                return;
            }
            tokio::select! {
                Some(done_id) = self.reap_rx.recv() => self.on_worker_done(done_id),
                _ = sleep(remaining) => return,
            }
        }
    }

    fn on_worker_done(&mut self, game_id: String) {
        self.active_ids.remove(&game_id);
        self.active_count.store(self.active_ids.len(), Ordering::SeqCst);
        let _ = self.matchmaker_tx.send(MatchmakerEvent::GameFinished);
        self.flush_one_pending();
    }

    async fn handle_event(&mut self, event: AccountEvent, shutdown: watch::Receiver<bool>) {
        match event {
            AccountEvent::challenge { challenge } => {
                let challenge: Challenge = challenge.into();
                let decision = self.evaluate(&challenge);
                self.respond(&challenge, decision).await;
            }
            AccountEvent::gameStart { game } => {
                if *shutdown.borrow() {
                    warn!(target: "bot::control_loop", "ignoring gameStart for {} during shutdown", game.id);
                    return;
                }
                if self.active_ids.contains(&game.id) {
                    info!(target: "bot::control_loop", "duplicate gameStart for {}, worker already running", game.id);
                    return;
                }
                if self.active_ids.len() >= self.config.max_games {
                    warn!(target: "bot::control_loop", "no worker slot for {}, aborting", game.id);
                    let _ = self
                        .client
                        .request(
                            Method::POST,
                            &format!("/api/bot/game/{}/abort", game.id),
                            "game-action",
                            None,
                            Idempotent::No,
                        )
                        .await;
                    return;
                }
                self.spawn_worker(game.id, shutdown);
            }
            AccountEvent::gameFinish { game } => {
                info!(target: "bot::control_loop", "gameFinish observed for {}", game.id);
                let _ = self.matchmaker_tx.send(MatchmakerEvent::GameFinished);
            }
            AccountEvent::challengeCanceled { challenge } => {
                let _ = self.matchmaker_tx.send(MatchmakerEvent::ChallengeResolved {
                    challenge_id: challenge.id,
                    accepted: false,
                });
            }
            AccountEvent::challengeDeclined { challenge } => {
                let _ = self.matchmaker_tx.send(MatchmakerEvent::ChallengeResolved {
                    challenge_id: challenge.id,
                    accepted: false,
                });
            }
        }
    }

    fn evaluate(&self, challenge: &Challenge) -> PolicyDecision {
        let state = PolicyState {
            active_game_count: self.active_ids.len(),
            currently_challenging_user: None,
        };
        challenge_policy::evaluate(challenge, &self.config, state)
    }

    async fn respond(&mut self, challenge: &Challenge, decision: PolicyDecision) {
        match decision {
            PolicyDecision::Accept => {
                info!(target: "bot::control_loop", "accepting challenge {}", challenge.id);
                let _ = self
                    .client
                    .request(
                        Method::POST,
                        &format!("/api/challenge/{}/accept", challenge.id),
                        "challenge-action",
                        None,
                        Idempotent::No,
                    )
                    .await;
            }
            PolicyDecision::Decline(code) => {
                info!(target: "bot::control_loop", "declining challenge {} ({})", challenge.id, code.as_str());
                let body = serde_json::json!({ "reason": code.as_str() });
                let _ = self
                    .client
                    .request(
                        Method::POST,
                        &format!("/api/challenge/{}/decline", challenge.id),
                        "challenge-action",
                        Some(body),
                        Idempotent::No,
                    )
                    .await;
            }
            PolicyDecision::Defer => {
                info!(target: "bot::control_loop", "deferring challenge {} (at concurrency cap)", challenge.id);
                if self.pending_defers.len() >= PENDING_CAP {
                    self.pending_defers.pop_front();
                }
                self.pending_defers.push_back(challenge.clone());
            }
        }
    }

    /// Re-evaluates the oldest deferred challenge once a worker slot frees up. Runs the
    /// follow-up request on its own task so releasing a slot (called from a `select!`
    /// arm) never has to await a network round-trip itself.
    fn flush_one_pending(&mut self) {
        if self.active_ids.len() >= self.config.max_games {
            return;
        }
        let Some(challenge) = self.pending_defers.pop_front() else {
            return;
        };
        let decision = self.evaluate(&challenge);
        let client = self.client.clone();
        tokio::spawn(async move {
            match decision {
                PolicyDecision::Accept => {
                    let _ = client
                        .request(
                            Method::POST,
                            &format!("/api/challenge/{}/accept", challenge.id),
                            "challenge-action",
                            None,
                            Idempotent::No,
                        )
                        .await;
                }
                PolicyDecision::Decline(code) => {
                    let body = serde_json::json!({ "reason": code.as_str() });
                    let _ = client
                        .request(
                            Method::POST,
                            &format!("/api/challenge/{}/decline", challenge.id),
                            "challenge-action",
                            Some(body),
                            Idempotent::No,
                        )
                        .await;
                }
                PolicyDecision::Defer => {}
            }
        });
    }

    fn spawn_worker(&mut self, game_id: String, shutdown: watch::Receiver<bool>) {
        self.active_ids.insert(game_id.clone());
        self.active_count.store(self.active_ids.len(), Ordering::SeqCst);
        info!(target: "bot::control_loop", "spawning worker for game {game_id}");
        let worker = GameWorker::new(
            self.client.clone(),
            self.config.clone(),
            self.own_id.clone(),
            self.archive_tx.clone(),
        );
        let reap_tx = self.reap_tx.clone();
        let gid = game_id.clone();
        tokio::spawn(async move {
            worker.run(gid.clone(), shutdown).await;
            let _ = reap_tx.send(gid);
        });
        let _ = self.matchmaker_tx.send(MatchmakerEvent::GameStarted);
    }
}

fn backoff(attempt: u32) -> Duration {
    let exp = RECONNECT_BACKOFF_BASE.saturating_mul(1u32 << attempt.min(6));
    exp.min(RECONNECT_BACKOFF_CAP)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn backoff_never_exceeds_cap() {
        for attempt in 0..20 {
            assert!(backoff(attempt) <= RECONNECT_BACKOFF_CAP);
        }
    }
}
