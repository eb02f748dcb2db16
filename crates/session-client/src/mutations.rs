//! Mutation push with one refresh-and-retry

use std::sync::Arc;

use bytes::Bytes;
use reqwest::header::CONTENT_TYPE;
use reqwest::StatusCode;
use serde::Deserialize;
use serde_json::Value;
use tracing::{debug, info};

use crate::config::ClientConfig;
use crate::coordinator::{InvalidationHint, TokenProvider};
use crate::{ClientError, Result};

#[derive(Debug, Deserialize)]
struct ErrorBody {
    error: String,
}

/// Pushes mutation batches to the gateway.
///
/// An authentication rejection triggers exactly one hinted token request
/// and exactly one retry; a second rejection is returned to the caller.
pub struct MutationClient {
    client: reqwest::Client,
    url: String,
    tokens: Arc<dyn TokenProvider>,
}

impl MutationClient {
    pub fn new(config: &ClientConfig, tokens: Arc<dyn TokenProvider>) -> Result<Self> {
        Ok(Self::with_client(config.http_client()?, config.mutations_url(), tokens))
    }

    pub fn with_client(client: reqwest::Client, url: impl Into<String>, tokens: Arc<dyn TokenProvider>) -> Self {
        Self {
            client,
            url: url.into(),
            tokens,
        }
    }

    /// Push an opaque batch and return the sync engine's result.
    pub async fn push(&self, batch: impl Into<Bytes>) -> Result<Value> {
        let batch = batch.into();
        let token = self.tokens.get_token(None).await;

        match self.send(token.as_deref(), batch.clone()).await {
            Err(e) if e.is_authentication() => {
                info!("Mutation rejected as unauthenticated, refreshing token");
                let token = self
                    .tokens
                    .get_token(Some(InvalidationHint::InvalidToken))
                    .await
                    .ok_or(ClientError::LoggedOut)?;
                self.send(Some(&token), batch).await
            }
            other => other,
        }
    }

    async fn send(&self, token: Option<&str>, batch: Bytes) -> Result<Value> {
        let mut request = self
            .client
            .post(&self.url)
            .header(CONTENT_TYPE, "application/json")
            .body(batch);
        if let Some(token) = token {
            request = request.bearer_auth(token);
        }

        let response = request.send().await?;
        let status = response.status();
        debug!(status = status.as_u16(), "Mutation push response");

        if status.is_success() {
            return Ok(response.json::<Value>().await?);
        }

        let message = response
            .json::<ErrorBody>()
            .await
            .map(|body| body.error)
            .unwrap_or_else(|_| status.canonical_reason().unwrap_or("unknown").to_string());

        if status == StatusCode::UNAUTHORIZED {
            Err(ClientError::unauthorized(message))
        } else {
            Err(ClientError::MutationRejected {
                status: status.as_u16(),
                message,
            })
        }
    }
}
