//! GameQuery API access.
//!
//! Fetches raw status trees from the aggregation API, walks them into
//! per-address status records, and serves the cached game catalog.

mod catalog;
mod fetch;
mod walker;

pub use catalog::*;
pub use fetch::*;
pub use walker::*;

use async_trait::async_trait;
use serde_json::Value;
use std::time::Duration;
use thiserror::Error;

use crate::db::ServerRecord;

/// Per-request timeout for API calls.
pub const REQUEST_TIMEOUT: Duration = Duration::from_secs(20);

/// Query error types.
#[derive(Error, Debug)]
pub enum QueryError {
    #[error("GameQuery credentials are missing")]
    CredentialsMissing,
    #[error("GameQuery request failed: {0}")]
    FetchFailed(String),
    #[error("GameQuery games endpoint returned an empty game list")]
    EmptyCatalog,
    #[error("could not parse GameQuery response")]
    UnparsableResponse,
    #[error("HTTP client error: {0}")]
    Client(String),
}

/// Source of the API credentials.
pub trait CredentialsProvider: Send + Sync {
    fn token(&self) -> String;
    /// Account tier; blank means the free tier.
    fn token_type(&self) -> String;
    fn token_email(&self) -> String;

    /// Both required credentials are present.
    fn has_credentials(&self) -> bool {
        !self.token().trim().is_empty() && !self.token_email().trim().is_empty()
    }
}

/// Anything that can turn a set of servers into one raw status tree.
#[async_trait]
pub trait StatusSource: Send + Sync {
    /// Returns `Ok(None)` when no server yields a request (nothing to fetch).
    async fn fetch(&self, servers: &[ServerRecord]) -> Result<Option<Value>, QueryError>;
}
