//! Entry point: loads configuration, verifies the account is a bot account, then
//! runs the Control Loop, Matchmaker and Archiver concurrently until shutdown.

mod archiver;
mod challenge_policy;
mod config;
mod control_loop;
mod error;
mod game_worker;
mod matchmaker;
mod model;
mod remote_client;
mod wire;

use clap::Parser;
use engine_adapter::EngineSession;
use log::{error, info};
use reqwest::Method;
use serde::Deserialize;
use tokio::sync::{mpsc, watch};

use config::{Cli, Config};
use control_loop::ControlLoop;
use error::{BotError, ErrorKind};
use matchmaker::Matchmaker;
use model::BotIdentity;
use remote_client::{Idempotent, RemoteClient};

#[derive(Debug, Deserialize)]
struct ProfileResponse {
    id: String,
    username: String,
    title: Option<String>,
}

/// `GET profile` (§6): fetches our own account identity. Startup fails with exit code
/// 4 if the account is not flagged as a bot account.
async fn fetch_identity(client: &RemoteClient) -> Result<BotIdentity, BotError> {
    let resp = client
        .request(Method::GET, "/api/account", "profile", None, Idempotent::Yes)
        .await?;
    let profile: ProfileResponse = resp.json().await.map_err(|e| {
        BotError::new(
            ErrorKind::Protocol,
            error::Context::Endpoint("profile".to_string()),
            e.to_string(),
        )
    })?;
    Ok(BotIdentity {
        id: profile.id,
        username: profile.username,
        title: profile.title,
    })
}

/// Verifies the configured engine actually speaks its configured dialect before any
/// challenge is ever accepted, rather than only discovering engine-spawn/handshake
/// failures once the first game starts (§6 exit code 3, §7 "engine-spawn at startup
/// is fatal"). The probe session is thrown away immediately; each game still gets its
/// own fresh `EngineSession`.
async fn probe_engine(config: &Config) -> Result<(), BotError> {
    let session = EngineSession::start(config.session_config())
        .await
        .map_err(|e| BotError::new(ErrorKind::EngineSpawn, error::Context::None, e.to_string()))?;
    session.quit().await;
    Ok(())
}

fn init_logging(level: Option<&str>) {
    let mut builder = env_logger::Builder::from_default_env();
    if let Some(level) = level {
        builder.parse_filters(level);
    }
    builder.init();
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    init_logging(cli.log_level.as_deref());

    let config = match Config::load(&cli.config_path()) {
        Ok(c) => c,
        Err(e) => {
            error!(target: "bot::main", "[{}] {}", e.kind, e.message);
            std::process::exit(e.kind.exit_code());
        }
    };

    if cli.dry_run {
        info!(target: "bot::main", "config OK ({} allowed variant(s), max-games {})", config.allowed_variants.len(), config.max_games);
        return;
    }

    if let Err(e) = probe_engine(&config).await {
        error!(target: "bot::main", "[{}] {}", e.kind, e.message);
        std::process::exit(e.kind.exit_code());
    }
    info!(target: "bot::main", "engine handshake OK");

    let client = RemoteClient::new(config.base_url.clone(), config.token.clone());

    let identity = match fetch_identity(&client).await {
        Ok(identity) => identity,
        Err(e) => {
            error!(target: "bot::main", "[{}] {}", e.kind, e.message);
            std::process::exit(e.kind.exit_code());
        }
    };
    if !identity.is_bot_account() {
        error!(target: "bot::main", "account '{}' is not a bot account (title={:?})", identity.username, identity.title);
        std::process::exit(4);
    }
    info!(target: "bot::main", "authenticated as {} ({})", identity.username, identity.id);

    let (archive_tx, archive_handle) = archiver::spawn(config.archive_path.clone());
    let (matchmaker_tx, matchmaker_rx) = mpsc::unbounded_channel();
    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    let control_loop = ControlLoop::new(
        client.clone(),
        config.clone(),
        identity.id.clone(),
        archive_tx.clone(),
        matchmaker_tx.clone(),
    );
    let active_count = control_loop.active_count_handle();
    let matchmaker = Matchmaker::new(client.clone(), config.clone(), active_count, matchmaker_rx);

    let control_task = tokio::spawn(control_loop.run(shutdown_rx.clone()));
    let matchmaker_task = tokio::spawn(matchmaker.run(shutdown_rx.clone()));

    tokio::select! {
        _ = tokio::signal::ctrl_c() => {
            info!(target: "bot::main", "ctrl-c received, shutting down gracefully");
        }
    }
    let _ = shutdown_tx.send(true);

    let _ = control_task.await;
    let _ = matchmaker_task.await;
    drop(archive_tx);
    let _ = archive_handle.await;
    info!(target: "bot::main", "shutdown complete");
}
