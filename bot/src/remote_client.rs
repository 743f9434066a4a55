use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use futures_util::{Stream, StreamExt, TryStreamExt};
use log::{debug, warn};
use reqwest::{Method, StatusCode};
use serde::de::DeserializeOwned;
use tokio::sync::Mutex;
use tokio::time::sleep;
use tokio_util::io::StreamReader;

use crate::error::{BotError, Context, ErrorKind};
use crate::model::RateBudget;

const RETRY_BASE: Duration = Duration::from_secs(1);
const RETRY_CAP: Duration = Duration::from_secs(60);
const MAX_ATTEMPTS: u32 = 8;
const DEFAULT_RATE_LIMIT_PENALTY: Duration = Duration::from_secs(60);
const REQUEST_DEADLINE: Duration = Duration::from_secs(15);
const STREAM_IDLE_WATCHDOG: Duration = Duration::from_secs(60);

/// Whether a failed request may be retried automatically. Non-idempotent requests
/// (move submission, challenge accept/decline, chat) are retried only on transport
/// errors, never on 4xx — resending those could double-submit a move or a decision.
#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub enum Idempotent {
    Yes,
    No,
}

/// Issues HTTP requests and NDJSON streams against the remote service, respecting
/// per-endpoint-class rate limits and retrying idempotent failures with capped
/// exponential backoff plus jitter.
#[derive(Clone)]
pub struct RemoteClient {
    http: reqwest::Client,
    base_url: String,
    token: String,
    budgets: Arc<Mutex<HashMap<String, RateBudget>>>,
}

impl RemoteClient {
    pub fn new(base_url: impl Into<String>, token: impl Into<String>) -> Self {
        let http = reqwest::Client::builder()
            .pool_max_idle_per_host(0)
            .build()
            .expect("reqwest client builder should not fail with no custom TLS config");
        Self {
            http,
            base_url: base_url.into(),
            token: token.into(),
            budgets: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    async fn wait_for_budget(&self, endpoint_class: &str) {
        let wait = {
            let budgets = self.budgets.lock().await;
            budgets
                .get(endpoint_class)
                .map(|b| b.next_permitted.saturating_duration_since(tokio::time::Instant::now()))
                .unwrap_or_default()
        };
        if !wait.is_zero() {
            debug!(target: "bot::remote_client", "waiting {wait:?} for rate budget on {endpoint_class}");
            sleep(wait).await;
        }
    }

    async fn record_failure(&self, endpoint_class: &str) {
        let mut budgets = self.budgets.lock().await;
        let entry = budgets
            .entry(endpoint_class.to_string())
            .or_insert_with(RateBudget::ready_now);
        entry.consecutive_failures += 1;
    }

    async fn record_success(&self, endpoint_class: &str) {
        let mut budgets = self.budgets.lock().await;
        if let Some(entry) = budgets.get_mut(endpoint_class) {
            entry.consecutive_failures = 0;
        }
    }

    async fn apply_rate_limit(&self, endpoint_class: &str, retry_after: Option<Duration>) {
        let mut budgets = self.budgets.lock().await;
        let entry = budgets
            .entry(endpoint_class.to_string())
            .or_insert_with(RateBudget::ready_now);
        entry.next_permitted =
            tokio::time::Instant::now() + retry_after.unwrap_or(DEFAULT_RATE_LIMIT_PENALTY);
    }

    fn backoff_delay(attempt: u32) -> Duration {
        let exp = RETRY_BASE.saturating_mul(1u32 << attempt.min(10));
        let capped = exp.min(RETRY_CAP);
        let jitter_millis = rand_jitter_millis(capped.as_millis() as u64);
        Duration::from_millis(jitter_millis)
    }

    /// `request` covers §4.1's `request(method, path, body, idempotent)`.
    pub async fn request(
        &self,
        method: Method,
        path: &str,
        endpoint_class: &str,
        body: Option<serde_json::Value>,
        idempotent: Idempotent,
    ) -> Result<reqwest::Response, BotError> {
        let mut attempt = 0u32;
        loop {
            self.wait_for_budget(endpoint_class).await;
            let mut builder = self
                .http
                .request(method.clone(), self.url(path))
                .bearer_auth(&self.token)
                .timeout(REQUEST_DEADLINE);
            if let Some(ref body) = body {
                builder = builder.json(body);
            }
            debug!(target: "bot::remote_client", "{method} {path} (attempt {attempt})");
            let outcome = builder.send().await;
            match outcome {
                Ok(resp) if resp.status().is_success() => {
                    self.record_success(endpoint_class).await;
                    return Ok(resp);
                }
                Ok(resp) if resp.status() == StatusCode::TOO_MANY_REQUESTS => {
                    let retry_after = parse_retry_after(&resp);
                    self.apply_rate_limit(endpoint_class, retry_after).await;
                    return Err(BotError::new(
                        ErrorKind::RateLimit,
                        Context::Endpoint(endpoint_class.to_string()),
                        "rate limited",
                    ));
                }
                Ok(resp) if resp.status() == StatusCode::UNAUTHORIZED => {
                    return Err(BotError::new(
                        ErrorKind::Auth,
                        Context::Endpoint(endpoint_class.to_string()),
                        "unauthorized",
                    ));
                }
                Ok(resp) if resp.status() == StatusCode::NOT_FOUND => {
                    return Err(BotError::new(
                        ErrorKind::Protocol,
                        Context::Endpoint(endpoint_class.to_string()),
                        "not found",
                    ));
                }
                Ok(resp) if resp.status().is_client_error() => {
                    // Non-transport 4xx: retried only when the caller marked the
                    // request idempotent (e.g. re-reading state), never otherwise.
                    self.record_failure(endpoint_class).await;
                    if idempotent == Idempotent::No || attempt + 1 >= MAX_ATTEMPTS {
                        return Err(BotError::new(
                            ErrorKind::Protocol,
                            Context::Endpoint(endpoint_class.to_string()),
                            format!("client error {}", resp.status()),
                        ));
                    }
                }
                Ok(resp) => {
                    // 5xx: retried for idempotent requests.
                    self.record_failure(endpoint_class).await;
                    if idempotent == Idempotent::No || attempt + 1 >= MAX_ATTEMPTS {
                        return Err(BotError::new(
                            ErrorKind::Transport,
                            Context::Endpoint(endpoint_class.to_string()),
                            format!("server error {}", resp.status()),
                        ));
                    }
                }
                Err(e) => {
                    self.record_failure(endpoint_class).await;
                    if attempt + 1 >= MAX_ATTEMPTS {
                        return Err(BotError::transport(endpoint_class, e.to_string()));
                    }
                }
            }
            sleep(Self::backoff_delay(attempt)).await;
            attempt += 1;
        }
    }

    /// Opens an NDJSON stream and decodes each non-empty line as `T`. Empty lines are
    /// keepalives: no frame is emitted for them, but they reset the idle watchdog. If
    /// nothing (not even a keepalive) arrives within the watchdog interval, the stream
    /// ends with a `stalled` error.
    pub async fn open_json_stream<T: DeserializeOwned + Send + 'static>(
        &self,
        path: &str,
        endpoint_class: &str,
    ) -> Result<impl Stream<Item = Result<T, BotError>>, BotError> {
        let endpoint_class_owned = endpoint_class.to_string();
        let resp = self
            .http
            .get(self.url(path))
            .bearer_auth(&self.token)
            .send()
            .await
            .map_err(|e| BotError::transport(endpoint_class, e.to_string()))?;
        if !resp.status().is_success() {
            return Err(BotError::new(
                ErrorKind::Transport,
                Context::Endpoint(endpoint_class.to_string()),
                format!("stream open failed with status {}", resp.status()),
            ));
        }
        let byte_stream = resp.bytes_stream().map_err(std::io::Error::other);
        let reader = StreamReader::new(byte_stream);
        let lines = tokio_util::codec::FramedRead::new(reader, tokio_util::codec::LinesCodec::new());
        let stream = futures_util::stream::unfold(lines, move |mut lines| {
            let endpoint_class = endpoint_class_owned.clone();
            async move {
                loop {
                    let next = tokio::time::timeout(STREAM_IDLE_WATCHDOG, lines.next()).await;
                    let line = match next {
                        Ok(Some(Ok(line))) => line,
                        Ok(Some(Err(e))) => {
                            return Some((
                                Err(BotError::transport(endpoint_class, e.to_string())),
                                lines,
                            ))
                        }
                        Ok(None) => return None,
                        Err(_) => {
                            warn!(target: "bot::remote_client", "stream {endpoint_class} stalled, no data for {STREAM_IDLE_WATCHDOG:?}");
                            return Some((
                                Err(BotError::new(
                                    ErrorKind::Transport,
                                    Context::Endpoint(endpoint_class.clone()),
                                    "stalled",
                                )),
                                lines,
                            ));
                        }
                    };
                    if line.trim().is_empty() {
                        continue; // keepalive: watchdog already reset by awaiting next()
                    }
                    let parsed = serde_json::from_str::<T>(&line).map_err(|e| {
                        BotError::new(
                            ErrorKind::Protocol,
                            Context::Endpoint(endpoint_class.clone()),
                            format!("malformed frame: {e}"),
                        )
                    });
                    return Some((parsed, lines));
                }
            }
        });
        Ok(stream)
    }
}

fn parse_retry_after(resp: &reqwest::Response) -> Option<Duration> {
    resp.headers()
        .get(reqwest::header::RETRY_AFTER)
        .and_then(|v| v.to_str().ok())
        .and_then(|s| s.parse::<u64>().ok())
        .map(Duration::from_secs)
}

fn rand_jitter_millis(cap_millis: u64) -> u64 {
    use rand::Rng;
    rand::rng().random_range(0..=cap_millis.max(1))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn backoff_never_exceeds_cap() {
        for attempt in 0..20 {
            let delay = RemoteClient::backoff_delay(attempt);
            assert!(delay <= RETRY_CAP);
        }
    }

    #[test]
    fn backoff_grows_with_attempt_number_before_capping() {
        let early = RemoteClient::backoff_delay(0);
        assert!(early <= RETRY_BASE);
    }
}
