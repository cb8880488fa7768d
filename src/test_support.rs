//! Shared helpers for unit tests.

use axum::Router;
use std::sync::Arc;

use crate::config::ApiCredentials;
use crate::query::CredentialsProvider;

/// Serve `router` on an ephemeral local port and return its base URL.
pub async fn spawn_server(router: Router) -> String {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, router).await.unwrap();
    });
    format!("http://{}", addr)
}

pub fn credentials(token: &str, token_type: &str, email: &str) -> Arc<dyn CredentialsProvider> {
    Arc::new(ApiCredentials {
        token: token.to_string(),
        token_type: token_type.to_string(),
        token_email: email.to_string(),
    })
}
