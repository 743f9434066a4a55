//! Periodic proactive matchmaking (§4.6): while worker slots are idle and no
//! self-issued challenge is outstanding, pick an opponent biased against recent
//! activity and issue one outbound challenge, then wait for the Control Loop to
//! report how it resolved.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use log::{info, warn};
use rand::Rng;
use reqwest::Method;
use serde::Deserialize;
use tokio::sync::{mpsc, watch};
use tokio::time::sleep;

use crate::config::Config;
use crate::error::{BotError, Context, ErrorKind};
use crate::model::CooldownMap;
use crate::remote_client::{Idempotent, RemoteClient};

/// How long the Matchmaker waits for its own outstanding challenge to resolve before
/// giving up on it and putting the opponent on cooldown (§4.6: "timeout (90 s with no
/// gameStart)").
const CHALLENGE_TIMEOUT: Duration = Duration::from_secs(90);

/// Events the Control Loop pushes so the Matchmaker can track its own outstanding
/// challenge and the current active-game count without mutating C5's state directly
/// (§5: "Other components query it via message passing").
#[derive(Debug, Clone)]
pub enum MatchmakerEvent {
    GameStarted,
    GameFinished,
    ChallengeResolved { challenge_id: String, accepted: bool },
}

pub struct Matchmaker {
    client: RemoteClient,
    config: Config,
    active_count: Arc<AtomicUsize>,
    rx: mpsc::UnboundedReceiver<MatchmakerEvent>,
    cooldowns: CooldownMap,
}

impl Matchmaker {
    pub fn new(
        client: RemoteClient,
        config: Config,
        active_count: Arc<AtomicUsize>,
        rx: mpsc::UnboundedReceiver<MatchmakerEvent>,
    ) -> Self {
        Self {
            client,
            config,
            active_count,
            rx,
            cooldowns: CooldownMap::default(),
        }
    }

    pub async fn run(mut self, mut shutdown: watch::Receiver<bool>) {
        if !self.config.matchmaking_enabled || self.config.matchmaking_opponents.is_empty() {
            info!(target: "bot::matchmaker", "matchmaking disabled or no opponent pool configured, idling");
            let _ = shutdown.changed().await;
            return;
        }
        loop {
            tokio::select! {
                _ = shutdown.changed() => return,
                _ = sleep(self.config.matchmaking_poll_interval) => {}
            }
            if *shutdown.borrow() {
                return;
            }
            self.drain_stale_events();
            if self.active_count.load(Ordering::SeqCst) >= self.config.max_games {
                continue;
            }
            let Some(opponent) = self.pick_opponent() else {
                continue;
            };
            match self.issue_challenge(&opponent).await {
                Ok(challenge_id) => {
                    let accepted = self
                        .await_resolution(&challenge_id, &mut shutdown)
                        .await;
                    if accepted {
                        info!(target: "bot::matchmaker", "challenge {challenge_id} to {opponent} resulted in a game");
                    } else {
                        info!(target: "bot::matchmaker", "challenge {challenge_id} to {opponent} did not start a game, cooling down");
                        self.cooldowns
                            .record(opponent, Instant::now() + self.config.matchmaking_cooldown);
                    }
                }
                Err(e) => {
                    warn!(target: "bot::matchmaker", "failed to challenge {opponent}: {e}");
                    self.cooldowns
                        .record(opponent, Instant::now() + self.config.matchmaking_cooldown);
                }
            }
        }
    }

    fn drain_stale_events(&mut self) {
        while self.rx.try_recv().is_ok() {
            // Events from a previous, already-resolved cycle; nothing to reconcile.
        }
    }

    /// Favours opponents who have gone the longest without being challenged (or were
    /// never challenged at all), without ever fully excluding a recently-played one —
    /// the Open Question 3 bias function, resolved as a recency-penalised uniform draw
    /// (see DESIGN.md).
    fn pick_opponent(&self) -> Option<String> {
        let now = Instant::now();
        let candidates: Vec<&String> = self
            .config
            .matchmaking_opponents
            .iter()
            .filter(|id| !self.cooldowns.is_on_cooldown(id, now))
            .collect();
        if candidates.is_empty() {
            return None;
        }
        let weights: Vec<f64> = candidates
            .iter()
            .map(|id| self.inactivity_weight(id, now))
            .collect();
        let total: f64 = weights.iter().sum();
        let mut pick = rand::rng().random_range(0.0..total.max(f64::MIN_POSITIVE));
        for (candidate, weight) in candidates.iter().zip(weights.iter()) {
            if pick < *weight {
                return Some((*candidate).clone());
            }
            pick -= weight;
        }
        candidates.last().map(|s| (*s).clone())
    }

    /// `CooldownMap::recency_rank` counts from the most-recently-cooled-down opponent
    /// (rank 0) and returns `usize::MAX` for one never recorded at all. We want the
    /// *opposite* ordering to drive selection weight — the longer (or never) an
    /// opponent has gone without a challenge, the more it should be favoured — so the
    /// rank is inverted here rather than used directly as `1 / (1 + rank)`.
    fn inactivity_weight(&self, opponent_id: &str, now: Instant) -> f64 {
        let rank = self.cooldowns.recency_rank(opponent_id, now);
        if rank == usize::MAX {
            self.config.matchmaking_opponents.len() as f64 + 1.0
        } else {
            rank as f64 + 1.0
        }
    }

    async fn issue_challenge(&self, opponent: &str) -> Result<String, BotError> {
        let (initial, increment) = parse_time_control(&self.config.matchmaking_time_control);
        let body = serde_json::json!({
            "variant": self.config.matchmaking_variant,
            "clock.limit": initial,
            "clock.increment": increment,
        });
        let resp = self
            .client
            .request(
                Method::POST,
                &format!("/api/challenge/{opponent}"),
                "challenge-action",
                Some(body),
                Idempotent::No,
            )
            .await?;
        #[derive(Deserialize)]
        struct ChallengeCreated {
            id: String,
        }
        let created: ChallengeCreated = resp.json().await.map_err(|e| {
            BotError::new(
                ErrorKind::Protocol,
                Context::Endpoint("challenge-action".to_string()),
                e.to_string(),
            )
        })?;
        Ok(created.id)
    }

    /// Waits for the Control Loop to report this challenge's resolution, up to
    /// `CHALLENGE_TIMEOUT`. Returns whether it resulted in a game starting.
    async fn await_resolution(
        &mut self,
        challenge_id: &str,
        shutdown: &mut watch::Receiver<bool>,
    ) -> bool {
        let deadline = sleep(CHALLENGE_TIMEOUT);
        tokio::pin!(deadline);
        loop {
            tokio::select! {
                _ = shutdown.changed() => return false,
                () = &mut deadline => return false,
                event = self.rx.recv() => {
                    match event {
                        Some(MatchmakerEvent::GameStarted) => return true,
                        Some(MatchmakerEvent::ChallengeResolved { challenge_id: id, accepted }) if id == challenge_id => {
                            return accepted;
                        }
                        Some(_) => continue,
                        None => return false,
                    }
                }
            }
        }
    }
}

/// Parses a `"initial+increment"` descriptor such as `"180+2"`. Falls back to a 3+0
/// blitz default on a missing or malformed increment, never panics on bad config.
fn parse_time_control(spec: &str) -> (u32, u32) {
    let mut parts = spec.splitn(2, '+');
    let initial = parts.next().and_then(|s| s.parse().ok()).unwrap_or(180);
    let increment = parts.next().and_then(|s| s.parse().ok()).unwrap_or(0);
    (initial, increment)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_initial_and_increment() {
        assert_eq!(parse_time_control("180+2"), (180, 2));
    }

    #[test]
    fn missing_increment_defaults_to_zero() {
        assert_eq!(parse_time_control("300"), (300, 0));
    }

    #[test]
    fn malformed_spec_falls_back_to_default() {
        assert_eq!(parse_time_control("bogus"), (180, 0));
    }
}
