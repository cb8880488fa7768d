//! Configuration module for gamewatch.
//!
//! Loads configuration from environment variables with sensible defaults.

use std::env;

use crate::query::{CredentialsProvider, DEFAULT_GAMES_ENDPOINT, DEFAULT_STATUS_ENDPOINTS};
use crate::update::DEFAULT_FEED_URL;

/// Bounds for the refresh interval, in minutes.
const MIN_REFRESH_MINUTES: u64 = 1;
const MAX_REFRESH_MINUTES: u64 = 60;

/// GameQuery API credentials.
#[derive(Debug, Clone, Default)]
pub struct ApiCredentials {
    pub token: String,
    pub token_type: String,
    pub token_email: String,
}

impl CredentialsProvider for ApiCredentials {
    fn token(&self) -> String {
        self.token.clone()
    }

    fn token_type(&self) -> String {
        self.token_type.clone()
    }

    fn token_email(&self) -> String {
        self.token_email.clone()
    }
}

/// Server configuration loaded from environment variables.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// HTTP port for the JSON API (default: 8080)
    pub http_port: u16,
    /// Path to the SQLite database file (default: "gamewatch.db")
    pub db_path: String,
    pub credentials: ApiCredentials,
    /// Minimum minutes between refresh cycles, 1 to 60 (default: 5)
    pub refresh_minutes: u64,
    /// Status endpoints, preferred first
    pub status_endpoints: Vec<String>,
    pub games_endpoint: String,
    pub update_feed_url: String,
    /// JSON object of per-game display profiles
    pub game_profiles: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            http_port: 8080,
            db_path: "gamewatch.db".to_string(),
            credentials: ApiCredentials::default(),
            refresh_minutes: 5,
            status_endpoints: DEFAULT_STATUS_ENDPOINTS.iter().map(|s| s.to_string()).collect(),
            games_endpoint: DEFAULT_GAMES_ENDPOINT.to_string(),
            update_feed_url: DEFAULT_FEED_URL.to_string(),
            game_profiles: String::new(),
        }
    }
}

impl ServerConfig {
    /// Load configuration from environment variables.
    ///
    /// Environment variables:
    /// - `GAMEWATCH_HTTP_PORT`: HTTP port (default: 8080)
    /// - `GAMEWATCH_DB_PATH`: Database file path (default: "gamewatch.db")
    /// - `GAMEWATCH_API_TOKEN`, `GAMEWATCH_API_TOKEN_TYPE`, `GAMEWATCH_API_TOKEN_EMAIL`
    /// - `GAMEWATCH_REFRESH_MINUTES`: refresh interval (default: 5)
    /// - `GAMEWATCH_STATUS_ENDPOINTS`: comma-separated status endpoint URLs
    /// - `GAMEWATCH_GAMES_ENDPOINT`: game catalog URL
    /// - `GAMEWATCH_UPDATE_FEED_URL`: release feed URL
    /// - `GAMEWATCH_GAME_PROFILES`: JSON object of game profiles
    pub fn load() -> Self {
        Self::from_lookup(|key| env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let mut cfg = Self::default();

        if let Some(port) = lookup("GAMEWATCH_HTTP_PORT").and_then(|s| s.parse().ok()) {
            cfg.http_port = port;
        }

        if let Some(db_path) = lookup("GAMEWATCH_DB_PATH") {
            cfg.db_path = db_path;
        }

        if let Some(token) = lookup("GAMEWATCH_API_TOKEN") {
            cfg.credentials.token = token.trim().to_string();
        }
        if let Some(token_type) = lookup("GAMEWATCH_API_TOKEN_TYPE") {
            cfg.credentials.token_type = token_type.trim().to_string();
        }
        if let Some(email) = lookup("GAMEWATCH_API_TOKEN_EMAIL") {
            cfg.credentials.token_email = email.trim().to_string();
        }

        if let Some(minutes) = lookup("GAMEWATCH_REFRESH_MINUTES").and_then(|s| s.trim().parse::<u64>().ok()) {
            cfg.refresh_minutes = minutes.clamp(MIN_REFRESH_MINUTES, MAX_REFRESH_MINUTES);
        }

        if let Some(list) = lookup("GAMEWATCH_STATUS_ENDPOINTS") {
            let endpoints: Vec<String> = list
                .split(',')
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(str::to_string)
                .collect();
            if !endpoints.is_empty() {
                cfg.status_endpoints = endpoints;
            }
        }

        if let Some(url) = lookup("GAMEWATCH_GAMES_ENDPOINT") {
            cfg.games_endpoint = url;
        }

        if let Some(url) = lookup("GAMEWATCH_UPDATE_FEED_URL") {
            cfg.update_feed_url = url;
        }

        if let Some(profiles) = lookup("GAMEWATCH_GAME_PROFILES") {
            cfg.game_profiles = profiles;
        }

        cfg
    }
}
