//! Release feed check: reports when a newer gamewatch build is published.

use chrono::Utc;
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::sync::{Arc, OnceLock};
use std::time::Duration;

use crate::db::CacheStore;

pub const DEFAULT_FEED_URL: &str = "https://gamequery.dev/shop/ipbgametracker/changelog";

/// Download page used when a release carries no URL.
pub const DOWNLOAD_URL: &str = "https://gamequery.dev/shop/ipbgametracker";

pub const UPDATE_CACHE_KEY: &str = "gq_update_check";

/// Seconds a fetched release stays valid.
pub const UPDATE_CACHE_TTL: i64 = 21600;

const FEED_TIMEOUT: Duration = Duration::from_secs(10);

/// A published release.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Release {
    pub version: String,
    pub longversion: u64,
    pub released: String,
    pub updateurl: String,
    pub releasenotes: String,
}

#[derive(Debug, Serialize, Deserialize)]
struct CachedRelease {
    checked_at: i64,
    release: Release,
}

/// Long version of the running build, `major*10000 + minor*100 + patch`.
pub fn current_long_version() -> u64 {
    let part = |s: &str| s.parse::<u64>().unwrap_or(0);
    part(env!("CARGO_PKG_VERSION_MAJOR")) * 10000
        + part(env!("CARGO_PKG_VERSION_MINOR")) * 100
        + part(env!("CARGO_PKG_VERSION_PATCH"))
}

/// Cached reader for the release feed.
pub struct UpdateCheck {
    client: reqwest::Client,
    feed_url: String,
    cache: Arc<dyn CacheStore>,
}

impl UpdateCheck {
    pub fn new(feed_url: &str, cache: Arc<dyn CacheStore>) -> Result<Self, reqwest::Error> {
        let client = reqwest::Client::builder().timeout(FEED_TIMEOUT).build()?;

        Ok(Self {
            client,
            feed_url: feed_url.to_string(),
            cache,
        })
    }

    /// Latest release if it is newer than `current`.
    pub async fn latest_available(&self, current: u64) -> Option<Release> {
        self.latest().await.filter(|r| r.longversion > current)
    }

    /// Latest published release, from cache when fresh.
    pub async fn latest(&self) -> Option<Release> {
        if let Some(release) = self.cached() {
            return Some(release);
        }

        let release = self.fetch_remote().await?;
        self.store(&release);
        Some(release)
    }

    fn cached(&self) -> Option<Release> {
        let value = self.cache.load(UPDATE_CACHE_KEY).ok()??;
        let cached: CachedRelease = serde_json::from_value(value).ok()?;

        if cached.checked_at <= 0 || cached.checked_at + UPDATE_CACHE_TTL < Utc::now().timestamp() {
            return None;
        }
        Some(cached.release)
    }

    fn store(&self, release: &Release) {
        let entry = CachedRelease {
            checked_at: Utc::now().timestamp(),
            release: release.clone(),
        };

        let saved = serde_json::to_value(&entry)
            .map_err(|e| e.to_string())
            .and_then(|v| self.cache.save(UPDATE_CACHE_KEY, &v).map_err(|e| e.to_string()));
        if let Err(e) = saved {
            tracing::warn!("UpdateCheck: failed to cache release: {}", e);
        }
    }

    async fn fetch_remote(&self) -> Option<Release> {
        let response = match self.client.get(&self.feed_url).send().await {
            Ok(r) => r,
            Err(e) => {
                tracing::debug!("UpdateCheck: feed request failed: {}", e);
                return None;
            }
        };

        let body = match response.text().await {
            Ok(b) => b,
            Err(e) => {
                tracing::debug!("UpdateCheck: feed read failed: {}", e);
                return None;
            }
        };

        match serde_json::from_str::<Value>(&body) {
            Ok(decoded) => normalize_payload(&decoded),
            Err(_) => normalize_payload(&parse_loose_payload(&body)),
        }
    }
}

/// Turn a feed payload into a release.
///
/// A list yields its entry with the greatest long version. An object needs
/// a non-blank `version` and a positive `longversion`.
pub fn normalize_payload(payload: &Value) -> Option<Release> {
    match payload {
        Value::Array(items) => items
            .iter()
            .filter_map(normalize_payload)
            .fold(None, |latest: Option<Release>, item| match latest {
                Some(l) if item.longversion <= l.longversion => Some(l),
                _ => Some(item),
            }),
        Value::Object(fields) => {
            let version = text_field(fields, "version");
            let longversion = fields.get("longversion").map(long_version).unwrap_or(0);
            if version.is_empty() || longversion == 0 {
                return None;
            }

            let updateurl = text_field(fields, "updateurl");
            Some(Release {
                version,
                longversion,
                released: text_field(fields, "released"),
                updateurl: if updateurl.is_empty() {
                    DOWNLOAD_URL.to_string()
                } else {
                    updateurl
                },
                releasenotes: text_field(fields, "releasenotes"),
            })
        }
        _ => None,
    }
}

fn text_field(fields: &Map<String, Value>, key: &str) -> String {
    match fields.get(key) {
        Some(Value::String(s)) => s.trim().to_string(),
        Some(Value::Number(n)) => n.to_string(),
        _ => String::new(),
    }
}

/// Integer value of a number or of the leading digits of a string.
fn long_version(value: &Value) -> u64 {
    match value {
        Value::Number(n) => n
            .as_u64()
            .or_else(|| n.as_f64().filter(|f| *f > 0.0).map(|f| f as u64))
            .unwrap_or(0),
        Value::String(s) => {
            let digits: String = s.trim().chars().take_while(char::is_ascii_digit).collect();
            digits.parse().unwrap_or(0)
        }
        _ => 0,
    }
}

fn loose_patterns() -> &'static [(&'static str, Regex)] {
    static PATTERNS: OnceLock<Vec<(&'static str, Regex)>> = OnceLock::new();
    PATTERNS.get_or_init(|| {
        [
            ("version", r#"(?i)\bversion["']?\s*[:=]\s*["']?([^,\n\r"'}]+)"#),
            ("longversion", r#"(?i)\blongversion["']?\s*[:=]\s*["']?([0-9]+)"#),
            ("released", r#"(?i)\breleased["']?\s*[:=]\s*["']?([^,\n\r"'}]+)"#),
            ("updateurl", r#"(?i)\bupdateurl["']?\s*[:=]\s*["']?(https?://[^,\n\r"'}\s]+)"#),
            ("releasenotes", r#"(?i)\breleasenotes["']?\s*[:=]\s*["']?([^\n\r}]+)"#),
        ]
        .into_iter()
        .map(|(key, pattern)| (key, Regex::new(pattern).expect("release pattern compiles")))
        .collect()
    })
}

/// Pull release fields out of a body that is not valid JSON, such as
/// `version: 1.2.0` lines.
pub fn parse_loose_payload(body: &str) -> Value {
    let body = body.trim();
    let mut values = Map::new();
    if body.is_empty() {
        return Value::Object(values);
    }

    for (key, pattern) in loose_patterns() {
        if let Some(m) = pattern.captures(body).and_then(|c| c.get(1)) {
            values.insert(key.to_string(), Value::String(m.as_str().trim().to_string()));
        }
    }

    Value::Object(values)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::MemoryCache;
    use crate::test_support::spawn_server;
    use axum::{routing::get, Json, Router};
    use serde_json::json;

    const UNREACHABLE: &str = "http://127.0.0.1:1/changelog";

    fn release(version: &str, longversion: u64) -> Release {
        Release {
            version: version.to_string(),
            longversion,
            released: String::new(),
            updateurl: DOWNLOAD_URL.to_string(),
            releasenotes: String::new(),
        }
    }

    #[test]
    fn test_current_long_version() {
        let expected = env!("CARGO_PKG_VERSION")
            .split('.')
            .map(|p| p.parse::<u64>().unwrap())
            .fold(0, |acc, p| acc * 100 + p);
        assert_eq!(current_long_version(), expected);
    }

    #[test]
    fn test_normalize_object() {
        let r = normalize_payload(&json!({
            "version": " 1.2.0 ",
            "longversion": "10200",
            "released": "2026-03-01",
            "releasenotes": "Fixes",
        }))
        .unwrap();

        assert_eq!(r.version, "1.2.0");
        assert_eq!(r.longversion, 10200);
        assert_eq!(r.released, "2026-03-01");
        assert_eq!(r.updateurl, DOWNLOAD_URL);
        assert_eq!(r.releasenotes, "Fixes");
    }

    #[test]
    fn test_normalize_rejects_incomplete() {
        assert!(normalize_payload(&json!({"version": "", "longversion": 10200})).is_none());
        assert!(normalize_payload(&json!({"version": "1.0.0", "longversion": 0})).is_none());
        assert!(normalize_payload(&json!({"version": "1.0.0"})).is_none());
        assert!(normalize_payload(&json!("1.0.0")).is_none());
        assert!(normalize_payload(&json!([])).is_none());
    }

    #[test]
    fn test_normalize_list_picks_latest() {
        let r = normalize_payload(&json!([
            {"version": "1.0.9", "longversion": 10009},
            {"version": "1.1.0", "longversion": 10100, "updateurl": "https://example.com/dl"},
            {"version": "broken"},
            {"version": "1.0.10", "longversion": 10010},
        ]))
        .unwrap();

        assert_eq!(r.version, "1.1.0");
        assert_eq!(r.updateurl, "https://example.com/dl");
    }

    #[test]
    fn test_parse_loose_payload() {
        let body = "version: 1.3.0\nlongversion = 10300\nreleased: 2026-04-02\n\
                    updateurl: https://example.com/get, releasenotes: Faster refresh";
        let r = normalize_payload(&parse_loose_payload(body)).unwrap();

        assert_eq!(r.version, "1.3.0");
        assert_eq!(r.longversion, 10300);
        assert_eq!(r.released, "2026-04-02");
        assert_eq!(r.updateurl, "https://example.com/get");
        assert_eq!(r.releasenotes, "Faster refresh");

        assert_eq!(parse_loose_payload("   "), json!({}));
    }

    #[tokio::test]
    async fn test_fresh_cache_skips_network() {
        let cache = Arc::new(MemoryCache::default());
        cache
            .save(
                UPDATE_CACHE_KEY,
                &json!({"checked_at": Utc::now().timestamp(), "release": release("9.0.0", 90000)}),
            )
            .unwrap();

        let check = UpdateCheck::new(UNREACHABLE, cache).unwrap();
        assert_eq!(check.latest().await, Some(release("9.0.0", 90000)));
    }

    #[tokio::test]
    async fn test_fetch_and_cache() {
        let router = Router::new().route(
            "/changelog",
            get(|| async { Json(json!([{"version": "9.9.9", "longversion": 90909}])) }),
        );
        let base = spawn_server(router).await;

        let cache = Arc::new(MemoryCache::default());
        let check = UpdateCheck::new(&format!("{}/changelog", base), cache.clone()).unwrap();

        assert_eq!(check.latest_available(10011).await, Some(release("9.9.9", 90909)));
        assert!(check.latest_available(90909).await.is_none());

        let cached = cache.load(UPDATE_CACHE_KEY).unwrap().unwrap();
        assert_eq!(cached["release"]["longversion"], 90909);
    }

    #[tokio::test]
    async fn test_loose_body_from_feed() {
        let router = Router::new().route("/changelog", get(|| async { "version: 2.0.0\nlongversion: 20000" }));
        let base = spawn_server(router).await;

        let check = UpdateCheck::new(&format!("{}/changelog", base), Arc::new(MemoryCache::default())).unwrap();
        assert_eq!(check.latest().await, Some(release("2.0.0", 20000)));
    }

    #[tokio::test]
    async fn test_unreachable_feed_has_no_release() {
        let check = UpdateCheck::new(UNREACHABLE, Arc::new(MemoryCache::default())).unwrap();
        assert!(check.latest_available(0).await.is_none());
    }
}
