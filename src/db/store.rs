//! SQLite database store implementation.

use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension, Result as SqlResult, Row};
use serde_json::Value;
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard};
use thiserror::Error;

use super::models::*;
use super::ports::{CacheStore, HistoryStore, ServerStore};

/// Database error types.
#[derive(Error, Debug)]
pub enum DbError {
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
    #[error("Migration error: {0}")]
    Migration(String),
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("database lock poisoned")]
    Poisoned,
    #[error("Not found")]
    NotFound,
}

const SERVER_COLUMNS: &str = "id, name, game_id, address, enabled, online, players_online, players_max, status_json, last_checked";

/// Thread-safe database store.
#[derive(Clone)]
pub struct Store {
    conn: Arc<Mutex<Connection>>,
}

impl Store {
    /// Create a new store with the given database path.
    pub fn new<P: AsRef<Path>>(path: P) -> Result<Self, DbError> {
        let conn = Connection::open(path)?;
        let store = Self {
            conn: Arc::new(Mutex::new(conn)),
        };
        store.init()?;
        Ok(store)
    }

    fn conn(&self) -> Result<MutexGuard<'_, Connection>, DbError> {
        self.conn.lock().map_err(|_| DbError::Poisoned)
    }

    /// Initialize the database with migrations.
    fn init(&self) -> Result<(), DbError> {
        let conn = self.conn()?;

        conn.execute_batch(include_str!("../../migrations/000001_init.up.sql"))
            .map_err(|e| DbError::Migration(format!("Migration 1 failed: {}", e)))?;
        conn.execute_batch(include_str!("../../migrations/000002_server_history.up.sql"))
            .map_err(|e| DbError::Migration(format!("Migration 2 failed: {}", e)))?;

        Ok(())
    }

    // --- Server CRUD ---

    /// Add a new server and return its ID. Runtime fields are not written.
    pub fn add_server(&self, server: &mut ServerRecord) -> Result<i64, DbError> {
        let conn = self.conn()?;
        conn.execute(
            "INSERT INTO servers (name, game_id, address, enabled) VALUES (?1, ?2, ?3, ?4)",
            params![server.name, server.game_id, server.address, server.enabled],
        )?;
        let id = conn.last_insert_rowid();
        server.id = id;
        Ok(id)
    }

    /// Update the identity fields of an existing server.
    pub fn update_server(&self, server: &ServerRecord) -> Result<(), DbError> {
        let conn = self.conn()?;
        let changed = conn.execute(
            "UPDATE servers SET name=?1, game_id=?2, address=?3, enabled=?4, updated_at=?5 WHERE id=?6",
            params![
                server.name,
                server.game_id,
                server.address,
                server.enabled,
                Utc::now().timestamp(),
                server.id,
            ],
        )?;
        if changed == 0 {
            return Err(DbError::NotFound);
        }
        Ok(())
    }

    /// Get all servers: online first, busiest first, then by name.
    pub fn get_servers(&self) -> Result<Vec<ServerRecord>, DbError> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT {} FROM servers ORDER BY online DESC, players_online DESC, name ASC, id ASC",
            SERVER_COLUMNS
        ))?;
        let servers = stmt
            .query_map([], row_to_server)?
            .collect::<SqlResult<Vec<_>>>()?;
        Ok(servers)
    }

    /// Get a server by ID.
    pub fn get_server(&self, id: i64) -> Result<ServerRecord, DbError> {
        let conn = self.conn()?;
        conn.query_row(
            &format!("SELECT {} FROM servers WHERE id = ?1", SERVER_COLUMNS),
            params![id],
            row_to_server,
        )
        .optional()?
        .ok_or(DbError::NotFound)
    }

    /// Delete a server and its history.
    pub fn delete_server(&self, id: i64) -> Result<(), DbError> {
        let conn = self.conn()?;
        conn.execute("DELETE FROM server_history WHERE server_id = ?1", params![id])?;
        conn.execute("DELETE FROM servers WHERE id = ?1", params![id])?;
        Ok(())
    }

    // --- History ---

    /// Get history points for a server with `start <= recorded_hour <= end`.
    pub fn get_history(&self, server_id: i64, start: i64, end: i64) -> Result<Vec<HistoryPoint>, DbError> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(
            "SELECT server_id, recorded_hour, online, players_online, players_max FROM server_history
             WHERE server_id = ?1 AND recorded_hour >= ?2 AND recorded_hour <= ?3 ORDER BY recorded_hour ASC",
        )?;

        let points = stmt
            .query_map(params![server_id, start, end], |row| {
                Ok(HistoryPoint {
                    server_id: row.get(0)?,
                    recorded_hour: row.get(1)?,
                    online: row.get(2)?,
                    players_online: row.get(3)?,
                    players_max: row.get(4)?,
                })
            })?
            .collect::<SqlResult<Vec<_>>>()?;

        Ok(points)
    }
}

impl ServerStore for Store {
    fn list_enabled_servers(&self) -> Result<Vec<ServerRecord>, DbError> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT {} FROM servers WHERE enabled = 1 ORDER BY id",
            SERVER_COLUMNS
        ))?;
        let servers = stmt
            .query_map([], row_to_server)?
            .collect::<SqlResult<Vec<_>>>()?;
        Ok(servers)
    }

    fn apply_server_update(&self, id: i64, update: &ServerUpdate) -> Result<(), DbError> {
        let status_json = update
            .raw_status
            .as_ref()
            .map(serde_json::to_string)
            .transpose()?;
        let checked_at = update.checked_at.timestamp();

        let conn = self.conn()?;
        let changed = conn.execute(
            "UPDATE servers SET online=?1, players_online=?2, players_max=?3, status_json=?4, last_checked=?5, updated_at=?5
             WHERE id=?6",
            params![
                update.online,
                update.players_online,
                update.players_max,
                status_json,
                checked_at,
                id,
            ],
        )?;
        if changed == 0 {
            return Err(DbError::NotFound);
        }
        Ok(())
    }
}

impl HistoryStore for Store {
    fn upsert_history_point(&self, point: &HistoryPoint) -> Result<(), DbError> {
        let conn = self.conn()?;
        conn.execute(
            "INSERT INTO server_history (server_id, recorded_hour, online, players_online, players_max)
             VALUES (?1, ?2, ?3, ?4, ?5)
             ON CONFLICT(server_id, recorded_hour) DO UPDATE SET
             online=excluded.online, players_online=excluded.players_online, players_max=excluded.players_max",
            params![
                point.server_id,
                point.recorded_hour,
                point.online,
                point.players_online,
                point.players_max,
            ],
        )?;
        Ok(())
    }

    fn prune_history_older_than(&self, cutoff: i64) -> Result<usize, DbError> {
        let conn = self.conn()?;
        let removed = conn.execute(
            "DELETE FROM server_history WHERE recorded_hour < ?1",
            params![cutoff],
        )?;
        Ok(removed)
    }
}

impl CacheStore for Store {
    fn load(&self, key: &str) -> Result<Option<Value>, DbError> {
        let conn = self.conn()?;
        let raw: Option<String> = conn
            .query_row("SELECT value FROM cache WHERE key = ?1", params![key], |row| row.get(0))
            .optional()?;

        match raw {
            Some(s) => Ok(Some(serde_json::from_str(&s)?)),
            None => Ok(None),
        }
    }

    fn save(&self, key: &str, value: &Value) -> Result<(), DbError> {
        let encoded = serde_json::to_string(value)?;
        let conn = self.conn()?;
        conn.execute(
            "INSERT INTO cache (key, value, stored_at) VALUES (?1, ?2, ?3)
             ON CONFLICT(key) DO UPDATE SET value=excluded.value, stored_at=excluded.stored_at",
            params![key, encoded, Utc::now().timestamp()],
        )?;
        Ok(())
    }
}

fn row_to_server(row: &Row<'_>) -> SqlResult<ServerRecord> {
    let status_json: Option<String> = row.get(8)?;
    let last_checked: Option<i64> = row.get(9)?;

    Ok(ServerRecord {
        id: row.get(0)?,
        name: row.get(1)?,
        game_id: row.get(2)?,
        address: row.get(3)?,
        enabled: row.get(4)?,
        online: row.get(5)?,
        players_online: row.get(6)?,
        players_max: row.get(7)?,
        // A row with unreadable JSON behaves as if no fragment was stored
        raw_status: status_json.and_then(|s| serde_json::from_str(&s).ok()),
        last_checked: last_checked.and_then(|ts| DateTime::from_timestamp(ts, 0)),
    })
}
