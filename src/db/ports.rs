//! Storage ports consumed by the refresh cycle and the cached API readers.

use chrono::{DateTime, Utc};
use serde_json::Value;

use super::models::{HistoryPoint, ServerRecord, ServerUpdate};
use super::store::DbError;

/// Server rows as seen by a refresh cycle.
pub trait ServerStore: Send + Sync {
    /// All servers flagged enabled.
    fn list_enabled_servers(&self) -> Result<Vec<ServerRecord>, DbError>;

    /// Write the runtime fields of one server.
    fn apply_server_update(&self, id: i64, update: &ServerUpdate) -> Result<(), DbError>;

    /// Clock used to stamp `last_checked` and history buckets.
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Hourly history samples.
pub trait HistoryStore: Send + Sync {
    /// Insert a point, overwriting any existing point in the same bucket.
    fn upsert_history_point(&self, point: &HistoryPoint) -> Result<(), DbError>;

    /// Delete points recorded before `cutoff` (unix seconds). Returns the
    /// number of rows removed.
    fn prune_history_older_than(&self, cutoff: i64) -> Result<usize, DbError>;
}

/// Named JSON values persisted between runs. Expiry is decided by the
/// reader from timestamps stored inside the value.
pub trait CacheStore: Send + Sync {
    fn load(&self, key: &str) -> Result<Option<Value>, DbError>;
    fn save(&self, key: &str, value: &Value) -> Result<(), DbError>;
}

#[cfg(test)]
pub use memory::MemoryCache;
