//! Scheduler module for running refresh cycles.

mod history;
mod reconciler;

pub use history::*;
pub use reconciler::*;

use crate::db::CacheStore;
use crate::query::CredentialsProvider;

use chrono::{DateTime, Duration as ChronoDuration, Utc};
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;

/// Cache key holding the time of the last successful cycle.
pub const LAST_REFRESH_KEY: &str = "gameservers_last_refresh";

/// How often the scheduler checks whether a cycle is due.
const TICK_INTERVAL: Duration = Duration::from_secs(60);

/// Why a requested cycle did not run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    /// Another cycle is in flight.
    Busy,
    /// The last successful cycle is more recent than the refresh interval.
    NotDue,
    /// API credentials are not configured.
    NoCredentials,
}

/// Result of a cycle request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CycleOutcome {
    Skipped(SkipReason),
    Completed(usize),
}

/// Drives refresh cycles on an interval and serialises manual ones.
pub struct Scheduler {
    reconciler: Reconciler,
    cache: Arc<dyn CacheStore>,
    credentials: Arc<dyn CredentialsProvider>,
    refresh_interval: ChronoDuration,
    running: Mutex<()>,
    stop: Mutex<Option<tokio::sync::broadcast::Sender<()>>>,
}

impl Scheduler {
    pub fn new(
        reconciler: Reconciler,
        cache: Arc<dyn CacheStore>,
        credentials: Arc<dyn CredentialsProvider>,
        refresh_minutes: u64,
    ) -> Self {
        Self {
            reconciler,
            cache,
            credentials,
            refresh_interval: ChronoDuration::minutes(refresh_minutes.max(1) as i64),
            running: Mutex::new(()),
            stop: Mutex::new(None),
        }
    }

    /// Start the background task that runs due cycles.
    pub async fn start(self: Arc<Self>) {
        let (tx, mut rx) = tokio::sync::broadcast::channel(1);
        {
            let mut stop_guard = self.stop.lock().await;
            *stop_guard = Some(tx);
        }

        tracing::info!(
            "Scheduler: refreshing every {} minute(s)",
            self.refresh_interval.num_minutes()
        );

        tokio::spawn(async move {
            let mut interval = tokio::time::interval(TICK_INTERVAL);
            interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

            loop {
                tokio::select! {
                    _ = rx.recv() => break,
                    _ = interval.tick() => {
                        if let Err(e) = self.run_cycle(false).await {
                            tracing::error!("Scheduler: refresh failed: {}", e);
                        }
                    }
                }
            }
        });
    }

    /// Stop the background task.
    pub async fn stop(&self) {
        let stop = self.stop.lock().await;
        if let Some(tx) = stop.as_ref() {
            let _ = tx.send(());
        }
    }

    /// Run a cycle if one is due.
    ///
    /// `force` bypasses the interval and credential gates (the fetch then
    /// reports missing credentials as an error) but never the single-flight
    /// guard.
    pub async fn run_cycle(&self, force: bool) -> Result<CycleOutcome, RefreshError> {
        let _running = match self.running.try_lock() {
            Ok(guard) => guard,
            Err(_) => {
                tracing::debug!("Scheduler: cycle already running, skipping");
                return Ok(CycleOutcome::Skipped(SkipReason::Busy));
            }
        };

        let now = Utc::now();

        if !force {
            if let Some(last) = self.last_refresh() {
                if last + self.refresh_interval > now {
                    return Ok(CycleOutcome::Skipped(SkipReason::NotDue));
                }
            }

            if !self.credentials.has_credentials() {
                return Ok(CycleOutcome::Skipped(SkipReason::NoCredentials));
            }
        }

        let updated = self.reconciler.refresh().await?;
        self.mark_refreshed(Utc::now());

        if updated > 0 {
            tracing::info!("Updated {} game server(s).", updated);
        }

        Ok(CycleOutcome::Completed(updated))
    }

    /// Time of the last successful cycle.
    pub fn last_refresh(&self) -> Option<DateTime<Utc>> {
        let value = self.cache.load(LAST_REFRESH_KEY).ok()??;
        let ts = value.get("refreshed_at")?.as_i64()?;
        DateTime::from_timestamp(ts, 0)
    }

    fn mark_refreshed(&self, at: DateTime<Utc>) {
        let value = json!({"refreshed_at": at.timestamp()});
        if let Err(e) = self.cache.save(LAST_REFRESH_KEY, &value) {
            tracing::warn!("Scheduler: failed to record refresh time: {}", e);
        }
    }
}
