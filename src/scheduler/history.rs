//! Hourly history helpers.

use chrono::{DateTime, Duration as ChronoDuration, Utc};
use serde::Serialize;

use crate::db::HistoryPoint;

/// History sampling grain in seconds.
pub const HOUR_SECONDS: i64 = 3600;

/// How long history points are kept.
pub const HISTORY_RETENTION_DAYS: i64 = 30;

/// Hours shown in the players chart, including the current one.
pub const CHART_HOURS: i64 = 24;

/// Floor a timestamp to the start of its hour, in unix seconds.
pub fn hour_bucket(dt: DateTime<Utc>) -> i64 {
    let ts = dt.timestamp();
    ts - ts.rem_euclid(HOUR_SECONDS)
}

/// Points recorded before this timestamp are past retention.
pub fn retention_cutoff(now: DateTime<Utc>) -> i64 {
    (now - ChronoDuration::days(HISTORY_RETENTION_DAYS)).timestamp()
}

/// One slot of the players chart.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChartPoint {
    pub hour: DateTime<Utc>,
    /// `0` when the server was offline, the player count when known.
    pub players: Option<u32>,
}

/// Players per hour over the last day, oldest first.
///
/// Every hour gets a slot; hours without a usable sample are `None`.
pub fn players_series(points: &[HistoryPoint], now: DateTime<Utc>) -> Vec<ChartPoint> {
    let end = hour_bucket(now);
    let start = end - (CHART_HOURS - 1) * HOUR_SECONDS;

    (0..CHART_HOURS)
        .map(|i| start + i * HOUR_SECONDS)
        .map(|hour| {
            let players = points
                .iter()
                .find(|p| p.recorded_hour == hour)
                .and_then(|p| match p.online {
                    Some(false) => Some(0),
                    _ => p.players_online,
                });
            ChartPoint {
                hour: DateTime::from_timestamp(hour, 0).unwrap_or(now),
                players,
            }
        })
        .collect()
}

/// Whether any slot of a series carries a value.
pub fn has_points(series: &[ChartPoint]) -> bool {
    series.iter().any(|p| p.players.is_some())
}

/// Range of buckets covered by [`players_series`].
pub fn chart_range(now: DateTime<Utc>) -> (i64, i64) {
    let end = hour_bucket(now);
    (end - (CHART_HOURS - 1) * HOUR_SECONDS, end)
}
