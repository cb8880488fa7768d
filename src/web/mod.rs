//! Web server module.

mod handlers;

use crate::config::ServerConfig;
use crate::db::Store;
use crate::profiles::GameProfiles;
use crate::query::GameCatalog;
use crate::scheduler::Scheduler;
use crate::update::UpdateCheck;

use axum::{
    extract::DefaultBodyLimit,
    routing::{get, post, put},
    Router,
};
use std::net::SocketAddr;
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

/// Application state shared across handlers.
#[derive(Clone)]
pub struct AppState {
    pub config: ServerConfig,
    pub store: Arc<Store>,
    pub scheduler: Arc<Scheduler>,
    pub catalog: Arc<GameCatalog>,
    pub updates: Arc<UpdateCheck>,
    pub profiles: Arc<GameProfiles>,
}

/// JSON API server.
pub struct Server {
    state: AppState,
}

impl Server {
    pub fn new(state: AppState) -> Self {
        Self { state }
    }

    /// Build the router with all routes.
    pub fn routes(&self) -> Router {
        let cors = CorsLayer::new().allow_origin(Any).allow_methods(Any).allow_headers(Any);

        Router::new()
            .route(
                "/api/servers",
                get(handlers::handle_get_servers).post(handlers::handle_create_server),
            )
            .route(
                "/api/servers/{id}",
                put(handlers::handle_update_server).delete(handlers::handle_delete_server),
            )
            .route("/api/servers/{id}/history", get(handlers::handle_get_history))
            .route("/api/refresh", post(handlers::handle_refresh))
            .route("/api/games", get(handlers::handle_get_games))
            .route("/api/profiles", get(handlers::handle_get_profiles))
            .route("/api/update", get(handlers::handle_get_update))
            .layer(TraceLayer::new_for_http())
            .layer(cors)
            .layer(DefaultBodyLimit::max(1024 * 1024)) // 1MB
            .with_state(self.state.clone())
    }

    /// Serve on the configured port until Ctrl-C.
    pub async fn start(&self) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        let addr = SocketAddr::from(([0, 0, 0, 0], self.state.config.http_port));
        let router = self.routes();

        tracing::info!("Web server listening on {}", addr);

        let listener = tokio::net::TcpListener::bind(addr).await?;
        axum::serve(listener, router)
            .with_graceful_shutdown(async {
                if let Err(e) = tokio::signal::ctrl_c().await {
                    tracing::error!("Failed to listen for shutdown signal: {}", e);
                }
            })
            .await?;

        Ok(())
    }
}
