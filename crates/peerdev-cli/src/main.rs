//! The `peerdev` binary: loads configuration, wires the matchmaker and
//! collaboration services to the shared store, and serves the HTTP/WS
//! transport (`spec.md` §6, `SPEC_FULL.md` §4.7).
//!
//! Grounded on `crates/cli/src/main.rs`'s shape (parse args, init
//! telemetry, load config, start the server) trimmed to this system's
//! single deployable — there is no subcommand surface to speak of,
//! since `peerdev` is a coordination service rather than a personal
//! gateway with an operator CLI.

use clap::Parser;
use peerdev_collab::CollabService;
use peerdev_config::{Config, SandboxBackend};
use peerdev_gateway::{AppState, MessagingBus, RoomConnections};
use peerdev_matchmaker::MatchmakerService;
use peerdev_sandbox::{DockerSandbox, NoSandbox, Sandbox};
use peerdev_service_traits::{NoopHistoryPersistenceService, NoopQuestionBankService, NoopUserRatingService};
use peerdev_store::{RedisStore, Store};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

#[derive(Parser)]
#[command(name = "peerdev", about = "Peer-programming matchmaker and collaboration coordinator")]
struct Cli {
    /// Output logs as JSON instead of human-readable.
    #[arg(long, default_value_t = false)]
    json_logs: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    peerdev_common::logging::init(cli.json_logs);
    tracing::info!(version = env!("CARGO_PKG_VERSION"), "peerdev starting");

    let config = Config::from_env()?;
    let store: Arc<dyn Store> = Arc::new(RedisStore::connect(&config.store_url).await?);
    let sandbox: Arc<dyn Sandbox> = match config.sandbox_backend {
        SandboxBackend::Docker => Arc::new(DockerSandbox::new()),
        SandboxBackend::None => Arc::new(NoSandbox),
    };
    if let Err(error) = sandbox.ensure_ready().await {
        tracing::warn!(%error, backend = sandbox.backend_name(), "sandbox backend not ready at startup");
    }

    let instance_id = instance_id();
    let matchmaker = Arc::new(MatchmakerService::new(
        store.clone(),
        Arc::new(NoopUserRatingService),
        Arc::new(NoopHistoryPersistenceService),
        config.jwt_secret.as_bytes().to_vec(),
        config.handshake_timeout,
        config.stage_thresholds,
    ));
    let collab = CollabService::new(
        store.clone(),
        sandbox,
        Arc::new(NoopQuestionBankService),
        language_templates(),
        config.jwt_secret.as_bytes().to_vec(),
        instance_id.clone(),
        config.grace_period,
    );
    let bus = MessagingBus::new(store.clone());
    let room_conns = Arc::new(RoomConnections::new());

    spawn_background_tasks(matchmaker.clone(), collab.clone(), bus.clone(), room_conns.clone(), store.clone(), instance_id);

    let state = AppState {
        matchmaker,
        collab,
        bus,
        room_conns,
    };
    let router = peerdev_gateway::build_router(state);

    let listener = tokio::net::TcpListener::bind(config.bind_addr()).await?;
    tracing::info!(addr = %config.bind_addr(), "listening");
    axum::serve(listener, router).await?;
    Ok(())
}

/// Starter code seeded into a room's document on its first `init` frame,
/// one entry per supported sandbox language (`spec.md` §4.4 "Init
/// exchange"). Kept minimal since no question bank is configured by
/// default.
fn language_templates() -> HashMap<String, String> {
    HashMap::from([
        ("python".to_string(), String::new()),
        ("java".to_string(), String::new()),
        ("cpp".to_string(), String::new()),
    ])
}

fn instance_id() -> String {
    std::env::var("PEERDEV_INSTANCE_ID").unwrap_or_else(|_| uuid::Uuid::new_v4().to_string())
}

/// Every periodic/subscriber loop the matchmaker and collaboration
/// services need runs for the lifetime of the process (`spec.md` §4.3,
/// §4.4). A background task failing out never takes the HTTP server
/// down with it — each loop logs and the process keeps serving requests
/// on whatever state it already has.
fn spawn_background_tasks(
    matchmaker: Arc<MatchmakerService>,
    collab: Arc<CollabService>,
    bus: Arc<MessagingBus>,
    room_conns: Arc<RoomConnections>,
    store: Arc<dyn Store>,
    instance_id: String,
) {
    {
        let matchmaker = matchmaker.clone();
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(Duration::from_secs(5));
            loop {
                interval.tick().await;
                if let Err(error) = matchmaker.tick().await {
                    tracing::error!(%error, "matchmaker tick failed");
                }
            }
        });
    }
    {
        let matchmaker = matchmaker.clone();
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(Duration::from_secs(2));
            loop {
                interval.tick().await;
                if let Err(error) = matchmaker.expiry_sweep().await {
                    tracing::error!(%error, "matchmaker expiry sweep failed");
                }
            }
        });
    }
    {
        let collab = collab.clone();
        tokio::spawn(async move {
            if let Err(error) = collab.run_matches_subscriber().await {
                tracing::error!(%error, "matches subscriber exited");
            }
        });
    }
    {
        let bus = bus.clone();
        tokio::spawn(async move {
            if let Err(error) = bus.run_subscriber().await {
                tracing::error!(%error, "messaging bus subscriber exited");
            }
        });
    }
    tokio::spawn(run_session_ended_subscriber(matchmaker, store.clone()));
    tokio::spawn(run_room_updates_subscriber(store, room_conns, instance_id));
}

/// `spec.md` §4.3 "Session-end reactions": on `session_ended`, clears
/// the involved users' room state and publishes rating updates — both
/// inside `MatchmakerService::handle_session_ended`, which also drives
/// history persistence (`spec.md` §4.6).
async fn run_session_ended_subscriber(matchmaker: Arc<MatchmakerService>, store: Arc<dyn Store>) {
    let mut subscription = match store.subscribe(&[peerdev_matchmaker::keys::CHANNEL_SESSION_ENDED]).await {
        Ok(s) => s,
        Err(error) => {
            tracing::error!(%error, "session ended subscriber failed to start");
            return;
        }
    };
    while let Some((_, payload)) = subscription.recv().await {
        let event: peerdev_protocol::SessionEndedEvent = match serde_json::from_str(&payload) {
            Ok(e) => e,
            Err(error) => {
                tracing::warn!(%error, "failed to decode session_ended event");
                continue;
            }
        };
        if let Err(error) = matchmaker.handle_session_ended(&event).await {
            tracing::error!(%error, match_id = %event.match_id, "session ended handling failed");
        }
    }
}

/// Relays a `room_updated` event published by another instance
/// (`spec.md` §6) to this instance's locally connected participants.
/// Events this instance itself published are dropped by `instance_id`
/// to avoid double delivery.
async fn run_room_updates_subscriber(store: Arc<dyn Store>, room_conns: Arc<RoomConnections>, this_instance: String) {
    let mut subscription = match store.subscribe(&[peerdev_collab::keys::CHANNEL_ROOM_UPDATES]).await {
        Ok(s) => s,
        Err(error) => {
            tracing::error!(%error, "room updates subscriber failed to start");
            return;
        }
    };
    while let Some((_, payload)) = subscription.recv().await {
        let event: peerdev_protocol::RoomUpdatedEvent = match serde_json::from_str(&payload) {
            Ok(e) => e,
            Err(error) => {
                tracing::warn!(%error, "failed to decode room_updated event");
                continue;
            }
        };
        if event.instance_id == this_instance {
            continue;
        }
        let frame = peerdev_gateway::room_updated_frame(&event.room_info);
        room_conns.broadcast(&event.match_id, &frame).await;
    }
}
