//! Configuration for the session client

use std::time::Duration;

use serde::Deserialize;

use crate::{ClientError, Result};

/// Where the gateway lives and how long to wait for it.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    pub base_url: String,
    pub refresh_path: String,
    pub mutations_path: String,
    pub request_timeout_ms: u64,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            base_url: "http://127.0.0.1:8080".to_string(),
            refresh_path: "/auth/refresh".to_string(),
            mutations_path: "/mutations".to_string(),
            request_timeout_ms: 10_000,
        }
    }
}

impl ClientConfig {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            ..Default::default()
        }
    }

    pub fn refresh_url(&self) -> String {
        join(&self.base_url, &self.refresh_path)
    }

    pub fn mutations_url(&self) -> String {
        join(&self.base_url, &self.mutations_path)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }

    /// HTTP client honouring the configured timeout.
    pub fn http_client(&self) -> Result<reqwest::Client> {
        if self.request_timeout_ms == 0 {
            return Err(ClientError::config("request_timeout_ms must be positive"));
        }

        reqwest::Client::builder()
            .timeout(self.request_timeout())
            .build()
            .map_err(|e| ClientError::config(format!("Failed to build HTTP client: {}", e)))
    }
}

fn join(base: &str, path: &str) -> String {
    format!("{}/{}", base.trim_end_matches('/'), path.trim_start_matches('/'))
}
