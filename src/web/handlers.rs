//! HTTP request handlers.

use super::AppState;
use crate::address::is_host_port;
use crate::db::{DbError, ServerRecord};
use crate::profiles::normalize_game_id;
use crate::scheduler::{chart_range, has_points, players_series, ChartPoint, CycleOutcome};
use crate::update::current_long_version;

use axum::{
    extract::{Path, Query, State},
    http::{header::CONTENT_TYPE, StatusCode},
    response::{IntoResponse, Json, Response},
};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::json;

fn db_error(e: DbError) -> Response {
    match e {
        DbError::NotFound => (StatusCode::NOT_FOUND, "Server not found").into_response(),
        e => (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()).into_response(),
    }
}

// ============================================================================
// API: Servers
// ============================================================================

/// A server with its derived display fields.
#[derive(Debug, Serialize)]
pub struct ServerView {
    #[serde(flatten)]
    pub server: ServerRecord,
    pub map: Option<String>,
    pub game_name: String,
}

pub async fn handle_get_servers(State(state): State<AppState>) -> impl IntoResponse {
    let servers = match state.store.get_servers() {
        Ok(servers) => servers,
        Err(e) => return db_error(e),
    };

    let catalog = state.catalog.cached();
    let views: Vec<ServerView> = servers
        .into_iter()
        .map(|server| ServerView {
            map: server.map_name(),
            game_name: state.profiles.display_name(&server.game_id, catalog.as_ref()),
            server,
        })
        .collect();

    Json(views).into_response()
}

#[derive(Debug, Deserialize)]
pub struct ServerRequest {
    pub name: String,
    pub game_id: String,
    pub address: String,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
}

fn default_enabled() -> bool {
    true
}

impl ServerRequest {
    /// Normalised identity fields, or the reason they are rejected.
    fn validate(&self) -> Result<(String, String, String), &'static str> {
        let name = self.name.trim();
        if name.is_empty() {
            return Err("Server name is required");
        }

        let game_id = normalize_game_id(&self.game_id);
        if game_id.is_empty() {
            return Err("Game id is required");
        }

        let address = self.address.trim();
        if !is_host_port(address) {
            return Err("Address must be host:port");
        }

        Ok((name.to_string(), game_id, address.to_string()))
    }
}

pub async fn handle_create_server(
    State(state): State<AppState>,
    Json(req): Json<ServerRequest>,
) -> impl IntoResponse {
    let (name, game_id, address) = match req.validate() {
        Ok(fields) => fields,
        Err(e) => return (StatusCode::BAD_REQUEST, e).into_response(),
    };

    let mut server = ServerRecord {
        name,
        game_id,
        address,
        enabled: req.enabled,
        ..Default::default()
    };

    match state.store.add_server(&mut server) {
        Ok(_) => {
            tracing::info!("Added server {} ({})", server.id, server.address);
            (StatusCode::CREATED, Json(server)).into_response()
        }
        Err(e) => db_error(e),
    }
}

pub async fn handle_update_server(
    State(state): State<AppState>,
    Path(id): Path<i64>,
    Json(req): Json<ServerRequest>,
) -> impl IntoResponse {
    let (name, game_id, address) = match req.validate() {
        Ok(fields) => fields,
        Err(e) => return (StatusCode::BAD_REQUEST, e).into_response(),
    };

    let existing = match state.store.get_server(id) {
        Ok(server) => server,
        Err(e) => return db_error(e),
    };

    // Runtime fields stay as the last cycle left them
    let updated = ServerRecord {
        name,
        game_id,
        address,
        enabled: req.enabled,
        ..existing
    };

    match state.store.update_server(&updated) {
        Ok(_) => Json(updated).into_response(),
        Err(e) => db_error(e),
    }
}

pub async fn handle_delete_server(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> impl IntoResponse {
    if let Err(e) = state.store.get_server(id) {
        return db_error(e);
    }

    match state.store.delete_server(id) {
        Ok(_) => StatusCode::NO_CONTENT.into_response(),
        Err(e) => db_error(e),
    }
}

// ============================================================================
// API: History
// ============================================================================

#[derive(Debug, Serialize)]
pub struct HistoryResponse {
    pub server_id: i64,
    pub has_points: bool,
    pub points: Vec<ChartPoint>,
}

pub async fn handle_get_history(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> impl IntoResponse {
    if let Err(e) = state.store.get_server(id) {
        return db_error(e);
    }

    let now = Utc::now();
    let (start, end) = chart_range(now);
    let points = match state.store.get_history(id, start, end) {
        Ok(points) => points,
        Err(e) => return db_error(e),
    };

    let series = players_series(&points, now);
    Json(HistoryResponse {
        server_id: id,
        has_points: has_points(&series),
        points: series,
    })
    .into_response()
}

// ============================================================================
// API: Refresh, games, profiles, update
// ============================================================================

pub async fn handle_refresh(State(state): State<AppState>) -> impl IntoResponse {
    match state.scheduler.run_cycle(true).await {
        Ok(CycleOutcome::Completed(updated)) => Json(json!({ "updated": updated })).into_response(),
        Ok(CycleOutcome::Skipped(_)) => {
            (StatusCode::CONFLICT, "A refresh is already running").into_response()
        }
        Err(e) => {
            tracing::warn!("Manual refresh failed: {}", e);
            (StatusCode::BAD_GATEWAY, e.to_string()).into_response()
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct GamesQuery {
    #[serde(default)]
    pub refresh: bool,
}

pub async fn handle_get_games(
    State(state): State<AppState>,
    Query(query): Query<GamesQuery>,
) -> impl IntoResponse {
    match state.catalog.game_labels(query.refresh).await {
        Ok(labels) => Json(labels).into_response(),
        Err(e) => (StatusCode::BAD_GATEWAY, e.to_string()).into_response(),
    }
}

pub async fn handle_get_profiles(State(state): State<AppState>) -> impl IntoResponse {
    ([(CONTENT_TYPE, "application/json")], state.profiles.encode())
}

pub async fn handle_get_update(State(state): State<AppState>) -> impl IntoResponse {
    Json(state.updates.latest_available(current_long_version()).await)
}

#[cfg(test)]
mod tests {
    use super::super::Server;
    use super::*;
    use crate::config::ServerConfig;
    use crate::db::{CacheStore, HistoryPoint, HistoryStore, ServerStore, ServerUpdate, Store};
    use crate::profiles::GameProfiles;
    use crate::query::{GameCatalog, GameQueryClient, GAMES_CACHE_KEY};
    use crate::scheduler::{hour_bucket, Reconciler, Scheduler};
    use crate::test_support::{credentials, spawn_server};
    use crate::update::UpdateCheck;
    use serde_json::Value;
    use std::sync::Arc;
    use std::time::Duration;
    use tempfile::NamedTempFile;

    const UNREACHABLE: &str = "http://127.0.0.1:1/unreachable";

    struct App {
        base: String,
        store: Arc<Store>,
        http: reqwest::Client,
        _tmp: NamedTempFile,
    }

    async fn spawn_app() -> App {
        let tmp = NamedTempFile::new().unwrap();
        let store = Arc::new(Store::new(tmp.path()).unwrap());
        store
            .save(
                GAMES_CACHE_KEY,
                &json!({"fetched_at": Utc::now().timestamp(), "games": {"cs2": "Counter-Strike 2"}}),
            )
            .unwrap();

        let creds = credentials("", "", "");
        let client =
            GameQueryClient::new(vec![UNREACHABLE.to_string()], creds.clone(), Duration::from_secs(2)).unwrap();
        let reconciler = Reconciler::new(store.clone(), Arc::new(client)).with_history(store.clone());

        let state = super::super::AppState {
            config: ServerConfig::default(),
            store: store.clone(),
            scheduler: Arc::new(Scheduler::new(reconciler, store.clone(), creds, 5)),
            catalog: Arc::new(GameCatalog::new(UNREACHABLE, store.clone(), Duration::from_secs(2)).unwrap()),
            updates: Arc::new(UpdateCheck::new(UNREACHABLE, store.clone()).unwrap()),
            profiles: Arc::new(GameProfiles::parse(r#"{"rust": {"name": "Rust Nights"}}"#)),
        };

        let base = spawn_server(Server::new(state).routes()).await;
        App {
            base,
            store,
            http: reqwest::Client::new(),
            _tmp: tmp,
        }
    }

    impl App {
        async fn create(&self, body: Value) -> reqwest::Response {
            self.http
                .post(format!("{}/api/servers", self.base))
                .json(&body)
                .send()
                .await
                .unwrap()
        }
    }

    #[tokio::test]
    async fn test_create_and_list_servers() {
        let app = spawn_app().await;

        let resp = app
            .create(json!({"name": " Main ", "game_id": " CS2 ", "address": " 10.0.0.1:27015 "}))
            .await;
        assert_eq!(resp.status(), StatusCode::CREATED.as_u16());
        let created: Value = resp.json().await.unwrap();
        assert_eq!(created["name"], "Main");
        assert_eq!(created["game_id"], "cs2");
        assert_eq!(created["address"], "10.0.0.1:27015");
        assert_eq!(created["online"], Value::Null);

        app.create(json!({"name": "Survival", "game_id": "rust", "address": "rust.example.com:28015"}))
            .await;
        app.create(json!({"name": "Blocks", "game_id": "minecraft", "address": "mc.example.com:25565"}))
            .await;

        let list: Value = app
            .http
            .get(format!("{}/api/servers", app.base))
            .send()
            .await
            .unwrap()
            .json()
            .await
            .unwrap();
        let names: Vec<&str> = list
            .as_array()
            .unwrap()
            .iter()
            .map(|s| s["game_name"].as_str().unwrap())
            .collect();
        // None checked yet, so the order falls back to the server name
        assert_eq!(names, vec!["minecraft", "Counter-Strike 2", "Rust Nights"]);
    }

    #[tokio::test]
    async fn test_servers_listed_online_first() {
        let app = spawn_app().await;
        let mut ids = Vec::new();
        for (name, address) in [("Alpha", "a:1"), ("Bravo", "b:2"), ("Charlie", "c:3"), ("Delta", "d:4")] {
            let created: Value = app
                .create(json!({"name": name, "game_id": "cs2", "address": address}))
                .await
                .json()
                .await
                .unwrap();
            ids.push(created["id"].as_i64().unwrap());
        }

        let now = Utc::now();
        app.store
            .apply_server_update(ids[0], &ServerUpdate::offline(now))
            .unwrap();
        app.store
            .apply_server_update(ids[1], &ServerUpdate::new(Some(true), Some(2), Some(10), None, now))
            .unwrap();
        app.store
            .apply_server_update(ids[2], &ServerUpdate::new(Some(true), Some(9), Some(10), None, now))
            .unwrap();

        let list: Value = app
            .http
            .get(format!("{}/api/servers", app.base))
            .send()
            .await
            .unwrap()
            .json()
            .await
            .unwrap();
        let names: Vec<&str> = list
            .as_array()
            .unwrap()
            .iter()
            .map(|s| s["name"].as_str().unwrap())
            .collect();
        assert_eq!(names, vec!["Charlie", "Bravo", "Alpha", "Delta"]);
    }

    #[tokio::test]
    async fn test_create_rejects_invalid_fields() {
        let app = spawn_app().await;

        for body in [
            json!({"name": "x", "game_id": "cs2", "address": "no-port"}),
            json!({"name": "x", "game_id": "cs2", "address": "host:port"}),
            json!({"name": "x", "game_id": "cs2", "address": "bad host:27015"}),
            json!({"name": "  ", "game_id": "cs2", "address": "a:1"}),
            json!({"name": "x", "game_id": " ", "address": "a:1"}),
        ] {
            assert_eq!(app.create(body).await.status(), StatusCode::BAD_REQUEST.as_u16());
        }
        assert!(app.store.get_servers().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_update_keeps_runtime_fields() {
        let app = spawn_app().await;
        let created: Value = app
            .create(json!({"name": "Main", "game_id": "cs2", "address": "a:1"}))
            .await
            .json()
            .await
            .unwrap();
        let id = created["id"].as_i64().unwrap();

        let update = ServerUpdate::new(Some(true), Some(4), Some(10), Some(json!({"map": "dust2"})), Utc::now());
        app.store.apply_server_update(id, &update).unwrap();

        let resp = app
            .http
            .put(format!("{}/api/servers/{}", app.base, id))
            .json(&json!({"name": "Renamed", "game_id": "cs2", "address": "b:2", "enabled": false}))
            .send()
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::OK.as_u16());

        let server = app.store.get_server(id).unwrap();
        assert_eq!(server.name, "Renamed");
        assert_eq!(server.address, "b:2");
        assert!(!server.enabled);
        assert_eq!(server.online, Some(true));
        assert_eq!(server.players_online, Some(4));
        assert_eq!(server.map_name().as_deref(), Some("dust2"));

        let missing = app
            .http
            .put(format!("{}/api/servers/9999", app.base))
            .json(&json!({"name": "x", "game_id": "cs2", "address": "a:1"}))
            .send()
            .await
            .unwrap();
        assert_eq!(missing.status(), StatusCode::NOT_FOUND.as_u16());
    }

    #[tokio::test]
    async fn test_delete_server() {
        let app = spawn_app().await;
        let created: Value = app
            .create(json!({"name": "Main", "game_id": "cs2", "address": "a:1"}))
            .await
            .json()
            .await
            .unwrap();
        let url = format!("{}/api/servers/{}", app.base, created["id"]);

        let resp = app.http.delete(&url).send().await.unwrap();
        assert_eq!(resp.status(), StatusCode::NO_CONTENT.as_u16());
        let resp = app.http.delete(&url).send().await.unwrap();
        assert_eq!(resp.status(), StatusCode::NOT_FOUND.as_u16());
    }

    #[tokio::test]
    async fn test_history_series() {
        let app = spawn_app().await;
        let created: Value = app
            .create(json!({"name": "Main", "game_id": "cs2", "address": "a:1"}))
            .await
            .json()
            .await
            .unwrap();
        let id = created["id"].as_i64().unwrap();

        app.store
            .upsert_history_point(&HistoryPoint {
                server_id: id,
                recorded_hour: hour_bucket(Utc::now()),
                online: Some(true),
                players_online: Some(7),
                players_max: Some(16),
            })
            .unwrap();

        let body: Value = app
            .http
            .get(format!("{}/api/servers/{}/history", app.base, id))
            .send()
            .await
            .unwrap()
            .json()
            .await
            .unwrap();

        assert_eq!(body["has_points"], true);
        let points = body["points"].as_array().unwrap();
        assert_eq!(points.len(), 24);
        assert_eq!(points[23]["players"], 7);
        assert_eq!(points[0]["players"], Value::Null);
    }

    #[tokio::test]
    async fn test_refresh_without_credentials_is_bad_gateway() {
        let app = spawn_app().await;
        app.create(json!({"name": "Main", "game_id": "cs2", "address": "a:1"})).await;

        let resp = app
            .http
            .post(format!("{}/api/refresh", app.base))
            .send()
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::BAD_GATEWAY.as_u16());
        assert!(resp.text().await.unwrap().contains("credentials"));
    }

    #[tokio::test]
    async fn test_games_profiles_and_update() {
        let app = spawn_app().await;

        let games: Value = app
            .http
            .get(format!("{}/api/games", app.base))
            .send()
            .await
            .unwrap()
            .json()
            .await
            .unwrap();
        assert_eq!(games, json!([{"id": "cs2", "label": "Counter-Strike 2 (cs2)"}]));

        // Forced refresh fails upstream and falls back to the fresh cache
        let resp = app
            .http
            .get(format!("{}/api/games?refresh=true", app.base))
            .send()
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::OK.as_u16());

        let profiles: Value = app
            .http
            .get(format!("{}/api/profiles", app.base))
            .send()
            .await
            .unwrap()
            .json()
            .await
            .unwrap();
        assert_eq!(profiles["rust"]["name"], "Rust Nights");

        let update: Value = app
            .http
            .get(format!("{}/api/update", app.base))
            .send()
            .await
            .unwrap()
            .json()
            .await
            .unwrap();
        assert_eq!(update, Value::Null);
    }
}
