//! Game catalog: the list of game ids the API understands, cached for a day.

use chrono::{DateTime, Utc};
use reqwest::header::ACCEPT;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use super::QueryError;
use crate::db::CacheStore;

pub const DEFAULT_GAMES_ENDPOINT: &str = "https://api.gamequery.dev/v1/get/games";

/// Cache key for the catalog.
pub const GAMES_CACHE_KEY: &str = "gameservers_game_list";

/// Catalog lifetime in seconds.
pub const GAMES_CACHE_TTL: i64 = 86400;

/// Stored form of the catalog.
#[derive(Debug, Serialize, Deserialize)]
struct CachedGames {
    fetched_at: i64,
    games: BTreeMap<String, String>,
}

/// A game id with a label suitable for pickers.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GameLabel {
    pub id: String,
    pub label: String,
}

/// Cached reader for the game catalog endpoint.
pub struct GameCatalog {
    client: reqwest::Client,
    endpoint: String,
    cache: Arc<dyn CacheStore>,
}

impl GameCatalog {
    pub fn new(endpoint: &str, cache: Arc<dyn CacheStore>, timeout: Duration) -> Result<Self, QueryError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| QueryError::Client(e.to_string()))?;

        Ok(Self {
            client,
            endpoint: endpoint.to_string(),
            cache,
        })
    }

    /// Games as `id => name`.
    ///
    /// A fresh cached catalog is returned without network access unless
    /// `force_refresh` is set. When a fetch fails, a catalog still within
    /// its TTL is served instead of the error.
    pub async fn games(&self, force_refresh: bool) -> Result<BTreeMap<String, String>, QueryError> {
        let cached = self.cached_at(Utc::now());

        if !force_refresh {
            if let Some(games) = &cached {
                return Ok(games.clone());
            }
        }

        match self.fetch_games().await {
            Ok(games) => {
                self.store(&games);
                Ok(games)
            }
            Err(e) => match cached {
                Some(games) => {
                    tracing::warn!("GameCatalog: refresh failed, serving cached list: {}", e);
                    Ok(games)
                }
                None => Err(e),
            },
        }
    }

    /// Labels sorted by display name.
    pub async fn game_labels(&self, force_refresh: bool) -> Result<Vec<GameLabel>, QueryError> {
        Ok(game_labels(&self.games(force_refresh).await?))
    }

    /// Cached catalog if it is still fresh, without touching the network.
    pub fn cached(&self) -> Option<BTreeMap<String, String>> {
        self.cached_at(Utc::now())
    }

    fn cached_at(&self, now: DateTime<Utc>) -> Option<BTreeMap<String, String>> {
        let value = match self.cache.load(GAMES_CACHE_KEY) {
            Ok(v) => v?,
            Err(e) => {
                tracing::debug!("GameCatalog: cache read failed: {}", e);
                return None;
            }
        };

        let cached: CachedGames = serde_json::from_value(value).ok()?;
        if cached.games.is_empty() || cached.fetched_at + GAMES_CACHE_TTL < now.timestamp() {
            return None;
        }
        Some(cached.games)
    }

    fn store(&self, games: &BTreeMap<String, String>) {
        let entry = CachedGames {
            fetched_at: Utc::now().timestamp(),
            games: games.clone(),
        };

        let saved = serde_json::to_value(&entry)
            .map_err(|e| e.to_string())
            .and_then(|v| self.cache.save(GAMES_CACHE_KEY, &v).map_err(|e| e.to_string()));
        if let Err(e) = saved {
            tracing::warn!("GameCatalog: failed to cache game list: {}", e);
        }
    }

    async fn fetch_games(&self) -> Result<BTreeMap<String, String>, QueryError> {
        let response = self
            .client
            .get(&self.endpoint)
            .header(ACCEPT, "application/json")
            .send()
            .await
            .map_err(|e| QueryError::FetchFailed(format!("games endpoint request failed: {}", e)))?;

        let status = response.status().as_u16();
        let text = response
            .text()
            .await
            .map_err(|e| QueryError::FetchFailed(format!("games endpoint request failed: {}", e)))?;
        let body = text.trim();

        if body.is_empty() {
            return Err(QueryError::FetchFailed(format!(
                "games endpoint returned empty response (HTTP {}).",
                status
            )));
        }

        let decoded: Value = serde_json::from_str(body).map_err(|_| {
            QueryError::FetchFailed(format!("games endpoint returned invalid JSON (HTTP {}).", status))
        })?;

        parse_games(&decoded)
    }
}

/// Extract `id => name` pairs from a decoded catalog.
///
/// Elements that are not objects or have a blank id are skipped; a blank
/// name falls back to the id.
pub fn parse_games(decoded: &Value) -> Result<BTreeMap<String, String>, QueryError> {
    let items: Vec<&Value> = match decoded {
        Value::Array(items) => items.iter().collect(),
        Value::Object(fields) => fields.values().collect(),
        _ => {
            return Err(QueryError::FetchFailed(
                "games endpoint returned invalid data structure.".to_string(),
            ))
        }
    };

    let mut games = BTreeMap::new();
    for item in items.into_iter().filter_map(Value::as_object) {
        let id = item.get("id").map(text_of).unwrap_or_default();
        if id.is_empty() {
            continue;
        }
        let name = item.get("name").map(text_of).unwrap_or_default();
        let name = if name.is_empty() { id.clone() } else { name };
        games.insert(id, name);
    }

    if games.is_empty() {
        return Err(QueryError::EmptyCatalog);
    }
    Ok(games)
}

fn text_of(value: &Value) -> String {
    match value {
        Value::String(s) => s.trim().to_string(),
        Value::Number(n) => n.to_string(),
        _ => String::new(),
    }
}

/// `"Name (id)"` labels sorted case-insensitively by name. Games whose name
/// is the id itself are labelled with the bare id.
pub fn game_labels(games: &BTreeMap<String, String>) -> Vec<GameLabel> {
    let mut entries: Vec<(&String, &String)> = games.iter().collect();
    entries.sort_by(|a, b| {
        a.1.to_lowercase()
            .cmp(&b.1.to_lowercase())
            .then_with(|| a.0.cmp(b.0))
    });

    entries
        .into_iter()
        .map(|(id, name)| {
            let name = name.trim();
            let label = if name.is_empty() || name == id {
                id.clone()
            } else {
                format!("{} ({})", name, id)
            };
            GameLabel { id: id.clone(), label }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::MemoryCache;
    use crate::test_support::spawn_server;
    use axum::{routing::get, Json, Router};
    use serde_json::json;

    const UNREACHABLE: &str = "http://127.0.0.1:1/games";

    fn catalog(endpoint: &str, cache: Arc<MemoryCache>) -> GameCatalog {
        GameCatalog::new(endpoint, cache, Duration::from_secs(5)).unwrap()
    }

    fn seed(cache: &MemoryCache, fetched_at: i64, games: Value) {
        cache
            .save(GAMES_CACHE_KEY, &json!({"fetched_at": fetched_at, "games": games}))
            .unwrap();
    }

    #[test]
    fn test_parse_games() {
        let decoded = json!([
            {"id": " cs2 ", "name": "Counter-Strike 2"},
            {"id": "minecraft", "name": "  "},
            {"id": 730, "name": "Numeric"},
            {"id": "", "name": "Nameless"},
            "garbage",
        ]);
        let games = parse_games(&decoded).unwrap();

        assert_eq!(games.len(), 3);
        assert_eq!(games["cs2"], "Counter-Strike 2");
        assert_eq!(games["minecraft"], "minecraft");
        assert_eq!(games["730"], "Numeric");
    }

    #[test]
    fn test_parse_games_empty_is_error() {
        assert!(matches!(parse_games(&json!([])), Err(QueryError::EmptyCatalog)));
        assert!(matches!(
            parse_games(&json!([{"name": "no id"}])),
            Err(QueryError::EmptyCatalog)
        ));
        assert!(matches!(parse_games(&json!("x")), Err(QueryError::FetchFailed(_))));
    }

    #[test]
    fn test_game_labels() {
        let games: BTreeMap<String, String> = [
            ("rust", "rust"),
            ("cs2", "Counter-Strike 2"),
            ("ark", "ARK: Survival Evolved"),
        ]
        .into_iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect();

        let labels = game_labels(&games);
        assert_eq!(
            labels.iter().map(|l| l.label.as_str()).collect::<Vec<_>>(),
            vec!["ARK: Survival Evolved (ark)", "Counter-Strike 2 (cs2)", "rust"]
        );
    }

    #[tokio::test]
    async fn test_fresh_cache_skips_network() {
        let cache = Arc::new(MemoryCache::default());
        seed(&cache, Utc::now().timestamp(), json!({"cs2": "Counter-Strike 2"}));

        let games = catalog(UNREACHABLE, cache).games(false).await.unwrap();
        assert_eq!(games["cs2"], "Counter-Strike 2");
    }

    #[tokio::test]
    async fn test_expired_cache_is_refreshed() {
        let router = Router::new().route(
            "/games",
            get(|| async { Json(json!([{"id": "minecraft", "name": "Minecraft"}])) }),
        );
        let base = spawn_server(router).await;

        let cache = Arc::new(MemoryCache::default());
        seed(&cache, Utc::now().timestamp() - 2 * GAMES_CACHE_TTL, json!({"cs2": "Counter-Strike 2"}));

        let c = catalog(&format!("{}/games", base), cache.clone());
        let games = c.games(false).await.unwrap();
        assert_eq!(games.len(), 1);
        assert_eq!(games["minecraft"], "Minecraft");

        // The refreshed list replaced the stale entry
        assert_eq!(c.cached().unwrap(), games);
    }

    #[tokio::test]
    async fn test_failed_refresh_uses_fresh_cache() {
        let cache = Arc::new(MemoryCache::default());
        seed(&cache, Utc::now().timestamp(), json!({"cs2": "Counter-Strike 2"}));

        let games = catalog(UNREACHABLE, cache).games(true).await.unwrap();
        assert_eq!(games["cs2"], "Counter-Strike 2");
    }

    #[tokio::test]
    async fn test_unavailable_without_cache() {
        let cache = Arc::new(MemoryCache::default());
        seed(&cache, 0, json!({"cs2": "Counter-Strike 2"}));

        let err = catalog(UNREACHABLE, cache).games(false).await.unwrap_err();
        assert!(matches!(err, QueryError::FetchFailed(_)));
    }

    #[tokio::test]
    async fn test_empty_catalog_is_not_cached() {
        let router = Router::new().route("/games", get(|| async { Json(json!([])) }));
        let base = spawn_server(router).await;

        let cache = Arc::new(MemoryCache::default());
        let c = catalog(&format!("{}/games", base), cache.clone());

        assert!(matches!(c.games(false).await, Err(QueryError::EmptyCatalog)));
        assert!(cache.load(GAMES_CACHE_KEY).unwrap().is_none());
    }
}
