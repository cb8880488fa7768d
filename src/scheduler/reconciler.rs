//! One refresh cycle: load servers, fetch statuses, apply them.

use serde_json::Value;
use std::sync::Arc;
use thiserror::Error;

use super::history::{hour_bucket, retention_cutoff};
use crate::address::normalize;
use crate::db::{DbError, HistoryPoint, HistoryStore, ServerStore, ServerUpdate};
use crate::query::{walk_response, QueryError, StatusMap, StatusSource};

/// Refresh cycle error types.
#[derive(Error, Debug)]
pub enum RefreshError {
    #[error(transparent)]
    Query(#[from] QueryError),
    #[error("storage error: {0}")]
    Store(#[from] DbError),
}

/// Applies API status to stored servers.
///
/// A cycle either aborts before writing anything (load, fetch or parse
/// failures) or writes every enabled server exactly once.
pub struct Reconciler {
    servers: Arc<dyn ServerStore>,
    history: Option<Arc<dyn HistoryStore>>,
    source: Arc<dyn StatusSource>,
}

impl Reconciler {
    pub fn new(servers: Arc<dyn ServerStore>, source: Arc<dyn StatusSource>) -> Self {
        Self {
            servers,
            history: None,
            source,
        }
    }

    /// Record hourly history points and prune old ones during each cycle.
    pub fn with_history(mut self, history: Arc<dyn HistoryStore>) -> Self {
        self.history = Some(history);
        self
    }

    /// Run one cycle and return the number of servers touched.
    ///
    /// Servers missing from a successful response are marked offline.
    pub async fn refresh(&self) -> Result<usize, RefreshError> {
        let servers = self.servers.list_enabled_servers()?;
        if servers.is_empty() {
            return Ok(0);
        }

        let tree = match self.source.fetch(&servers).await? {
            Some(tree) => tree,
            None => return Ok(0),
        };

        let mapped = map_response(&tree)?;
        let now = self.servers.now();

        if let Some(history) = &self.history {
            match history.prune_history_older_than(retention_cutoff(now)) {
                Ok(removed) if removed > 0 => {
                    tracing::debug!("Reconciler: pruned {} history points", removed);
                }
                Ok(_) => {}
                Err(e) => tracing::warn!("Reconciler: failed to prune history: {}", e),
            }
        }

        let hour = hour_bucket(now);
        let mut updated = 0;

        for server in &servers {
            let update = match mapped.get(&normalize(&server.address)) {
                Some(status) => ServerUpdate::new(
                    status.online,
                    status.players_online,
                    status.players_max,
                    Some(status.raw.clone()),
                    now,
                ),
                None => ServerUpdate::offline(now),
            };
            updated += 1;

            if let Err(e) = self.servers.apply_server_update(server.id, &update) {
                tracing::warn!(
                    "Reconciler: failed to update server {} ({}): {}",
                    server.id,
                    server.address,
                    e
                );
                continue;
            }

            if let Some(history) = &self.history {
                let point = HistoryPoint {
                    server_id: server.id,
                    recorded_hour: hour,
                    online: update.online,
                    players_online: update.players_online,
                    players_max: update.players_max,
                };
                if let Err(e) = history.upsert_history_point(&point) {
                    tracing::warn!(
                        "Reconciler: failed to record history for server {}: {}",
                        server.id,
                        e
                    );
                }
            }
        }

        Ok(updated)
    }
}

/// Walk a response, refusing trees that yield no servers.
fn map_response(tree: &Value) -> Result<StatusMap, QueryError> {
    let has_content = match tree {
        Value::Object(fields) => !fields.is_empty(),
        Value::Array(items) => !items.is_empty(),
        _ => false,
    };
    if !has_content {
        return Err(QueryError::UnparsableResponse);
    }

    let mapped = walk_response(tree);
    if mapped.is_empty() {
        return Err(QueryError::UnparsableResponse);
    }
    Ok(mapped)
}
