//! gamewatch - game server status monitor
//!
//! Periodically queries the GameQuery API for a set of game servers and
//! keeps their online state, player counts and hourly history in SQLite.

mod address;
mod config;
mod db;
mod profiles;
mod query;
mod scheduler;
mod update;
mod web;

#[cfg(test)]
mod test_support;

use config::ServerConfig;
use db::Store;
use profiles::GameProfiles;
use query::{CredentialsProvider, GameCatalog, GameQueryClient, REQUEST_TIMEOUT};
use scheduler::{Reconciler, Scheduler};
use update::UpdateCheck;
use web::{AppState, Server};

use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(tracing_subscriber::EnvFilter::from_default_env()
            .add_directive("gamewatch=info".parse()?))
        .init();

    // Load configuration
    let cfg = ServerConfig::load();
    tracing::info!("Starting gamewatch on port {}...", cfg.http_port);
    tracing::info!("Using database at {}", cfg.db_path);

    if !cfg.credentials.has_credentials() {
        tracing::warn!("GameQuery credentials are not set; scheduled refreshes are paused");
    }

    // Initialize database
    let store = Arc::new(Store::new(&cfg.db_path)?);
    tracing::info!("Database initialized successfully");

    let credentials = Arc::new(cfg.credentials.clone());
    let client = GameQueryClient::new(cfg.status_endpoints.clone(), credentials.clone(), REQUEST_TIMEOUT)?;
    let reconciler = Reconciler::new(store.clone(), Arc::new(client)).with_history(store.clone());

    let scheduler = Arc::new(Scheduler::new(
        reconciler,
        store.clone(),
        credentials,
        cfg.refresh_minutes,
    ));
    scheduler.clone().start().await;

    let catalog = Arc::new(GameCatalog::new(&cfg.games_endpoint, store.clone(), REQUEST_TIMEOUT)?);
    let updates = Arc::new(UpdateCheck::new(&cfg.update_feed_url, store.clone())?);

    let profiles = GameProfiles::parse(&cfg.game_profiles);
    tracing::info!("Loaded {} game profile(s)", profiles.all().len());

    // Start web server
    let server = Server::new(AppState {
        config: cfg,
        store,
        scheduler: scheduler.clone(),
        catalog,
        updates,
        profiles: Arc::new(profiles),
    });
    server.start().await?;

    scheduler.stop().await;
    tracing::info!("Shut down");

    Ok(())
}
