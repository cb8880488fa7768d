//! Database model types.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Keys that may carry the current map name inside a status fragment.
const MAP_KEYS: [&str; 6] = ["map", "mapname", "map_name", "current_map", "level", "mapTitle"];

/// A monitored game server.
///
/// Identity fields are owned by CRUD callers. The runtime fields (`online`
/// through `last_checked`) are only ever written by a refresh cycle.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServerRecord {
    pub id: i64,
    pub name: String,
    pub game_id: String,
    pub address: String,
    pub enabled: bool,
    /// `None` until the first refresh cycle has seen this server.
    pub online: Option<bool>,
    pub players_online: Option<u32>,
    pub players_max: Option<u32>,
    /// Last full status fragment returned by the API.
    pub raw_status: Option<Value>,
    pub last_checked: Option<DateTime<Utc>>,
}

impl Default for ServerRecord {
    fn default() -> Self {
        Self {
            id: 0,
            name: String::new(),
            game_id: String::new(),
            address: String::new(),
            enabled: true,
            online: None,
            players_online: None,
            players_max: None,
            raw_status: None,
            last_checked: None,
        }
    }
}

impl ServerRecord {
    /// Current map name from the last status fragment, if any.
    ///
    /// Top-level keys are checked first, then the `_updater` sub-object.
    pub fn map_name(&self) -> Option<String> {
        let raw = self.raw_status.as_ref()?.as_object()?;

        find_map(raw).or_else(|| {
            raw.get("_updater")
                .and_then(Value::as_object)
                .and_then(find_map)
        })
    }
}

fn find_map(node: &serde_json::Map<String, Value>) -> Option<String> {
    MAP_KEYS.iter().find_map(|key| {
        let text = match node.get(*key)? {
            Value::String(s) => s.trim().to_string(),
            Value::Number(n) => n.to_string(),
            Value::Bool(true) => "1".to_string(),
            _ => return None,
        };
        (!text.is_empty()).then_some(text)
    })
}

/// Runtime fields written to a server at the end of a refresh cycle.
#[derive(Debug, Clone, PartialEq)]
pub struct ServerUpdate {
    pub online: Option<bool>,
    pub players_online: Option<u32>,
    pub players_max: Option<u32>,
    pub raw_status: Option<Value>,
    pub checked_at: DateTime<Utc>,
}

impl ServerUpdate {
    /// Build an update, clearing player counts unless the server is known online.
    pub fn new(
        online: Option<bool>,
        players_online: Option<u32>,
        players_max: Option<u32>,
        raw_status: Option<Value>,
        checked_at: DateTime<Utc>,
    ) -> Self {
        let (players_online, players_max) = if online == Some(true) {
            (players_online, players_max)
        } else {
            (None, None)
        };

        Self {
            online,
            players_online,
            players_max,
            raw_status,
            checked_at,
        }
    }

    /// A server that was missing from a successful response.
    pub fn offline(checked_at: DateTime<Utc>) -> Self {
        Self::new(Some(false), None, None, None, checked_at)
    }
}

/// One hourly sample for a server.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HistoryPoint {
    pub server_id: i64,
    /// Unix seconds, floored to the hour.
    pub recorded_hour: i64,
    pub online: Option<bool>,
    pub players_online: Option<u32>,
    pub players_max: Option<u32>,
}
