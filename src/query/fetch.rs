//! Status fetch against the GameQuery API with endpoint failover.

use async_trait::async_trait;
use reqwest::header::{ACCEPT, CONTENT_TYPE};
use serde::Serialize;
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;

use super::{CredentialsProvider, QueryError, StatusSource};
use crate::db::ServerRecord;

/// Status endpoints, preferred first.
pub const DEFAULT_STATUS_ENDPOINTS: [&str; 2] = [
    "https://api.gamequery.dev/v1/post/fetch",
    "https://gamequery.dev/v1/post/fetch",
];

/// Token type sent when none is configured.
pub const DEFAULT_TOKEN_TYPE: &str = "FREE";

const SNIPPET_CHARS: usize = 200;

/// POST body: servers grouped by game.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StatusRequest {
    pub servers: Vec<GameGroup>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GameGroup {
    pub game_id: String,
    pub servers: Vec<String>,
}

impl StatusRequest {
    pub fn is_empty(&self) -> bool {
        self.servers.is_empty()
    }
}

/// Group servers by game id, keeping first-seen order and dropping
/// duplicate addresses. Rows with a blank game id or address are skipped.
pub fn build_payload(servers: &[ServerRecord]) -> StatusRequest {
    let mut groups: Vec<GameGroup> = Vec::new();

    for server in servers {
        let game_id = server.game_id.trim();
        let address = server.address.trim();
        if game_id.is_empty() || address.is_empty() {
            continue;
        }

        let group = match groups.iter().position(|g| g.game_id == game_id) {
            Some(i) => &mut groups[i],
            None => {
                groups.push(GameGroup {
                    game_id: game_id.to_string(),
                    servers: Vec::new(),
                });
                let last = groups.len() - 1;
                &mut groups[last]
            }
        };

        if !group.servers.iter().any(|a| a == address) {
            group.servers.push(address.to_string());
        }
    }

    groups.retain(|g| !g.servers.is_empty());
    StatusRequest { servers: groups }
}

/// HTTP client for the status endpoints.
pub struct GameQueryClient {
    client: reqwest::Client,
    endpoints: Vec<String>,
    credentials: Arc<dyn CredentialsProvider>,
}

impl GameQueryClient {
    pub fn new(
        endpoints: Vec<String>,
        credentials: Arc<dyn CredentialsProvider>,
        timeout: Duration,
    ) -> Result<Self, QueryError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| QueryError::Client(e.to_string()))?;

        Ok(Self {
            client,
            endpoints,
            credentials,
        })
    }

    /// Fetch the raw status tree for `servers`.
    ///
    /// Endpoints are tried in order until one returns a non-empty JSON
    /// object or array with a status below 400. Returns `Ok(None)` when no
    /// server produces a request.
    pub async fn fetch_status(&self, servers: &[ServerRecord]) -> Result<Option<Value>, QueryError> {
        let payload = build_payload(servers);
        if payload.is_empty() {
            return Ok(None);
        }

        let token = self.credentials.token().trim().to_string();
        let token_email = self.credentials.token_email().trim().to_string();
        if token.is_empty() || token_email.is_empty() {
            return Err(QueryError::CredentialsMissing);
        }

        let token_type = match self.credentials.token_type().trim() {
            "" => DEFAULT_TOKEN_TYPE.to_string(),
            t => t.to_string(),
        };

        let body = serde_json::to_string(&payload).map_err(|e| QueryError::Client(e.to_string()))?;
        let mut errors = Vec::with_capacity(self.endpoints.len());

        for endpoint in &self.endpoints {
            let request = self
                .client
                .post(endpoint)
                .header(CONTENT_TYPE, "application/json")
                .header(ACCEPT, "application/json")
                .header("x-api-token", &token)
                .header("x-api-token-type", &token_type)
                .header("x-api-token-email", &token_email)
                .body(body.clone());

            match read_status_response(endpoint, request).await {
                Ok(tree) => return Ok(Some(tree)),
                Err(diagnostic) => {
                    tracing::debug!("GameQuery: {}", diagnostic);
                    errors.push(diagnostic);
                }
            }
        }

        Err(QueryError::FetchFailed(errors.join(" | ")))
    }
}

#[async_trait]
impl StatusSource for GameQueryClient {
    async fn fetch(&self, servers: &[ServerRecord]) -> Result<Option<Value>, QueryError> {
        self.fetch_status(servers).await
    }
}

/// Send one candidate request and validate the envelope.
///
/// The error is a one-line diagnostic naming the endpoint.
async fn read_status_response(endpoint: &str, request: reqwest::RequestBuilder) -> Result<Value, String> {
    let response = request
        .send()
        .await
        .map_err(|e| format!("{} request failed: {}", endpoint, e))?;

    let status = response.status().as_u16();
    let text = response
        .text()
        .await
        .map_err(|e| format!("{} request failed: {}", endpoint, e))?;
    let body = text.trim();

    if body.is_empty() {
        return Err(format!("{} returned an empty response (HTTP {}).", endpoint, status));
    }

    let decoded: Value = serde_json::from_str(body).map_err(|_| {
        format!(
            "{} returned non-JSON response (HTTP {}): {}",
            endpoint,
            status,
            snippet(body)
        )
    })?;

    if !(decoded.is_object() || decoded.is_array()) {
        return Err(format!(
            "{} returned invalid JSON structure (HTTP {}).",
            endpoint, status
        ));
    }

    if status >= 400 {
        return Err(format!("{} returned API error HTTP {}.", endpoint, status));
    }

    Ok(decoded)
}

fn snippet(body: &str) -> String {
    let mut out: String = body.chars().take(SNIPPET_CHARS).collect();
    if body.chars().nth(SNIPPET_CHARS).is_some() {
        out.push_str("...");
    }
    out
}
