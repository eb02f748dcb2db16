//! HTTP refresh against the gateway's refresh endpoint

use async_trait::async_trait;
use reqwest::header::{COOKIE, SET_COOKIE};
use tracing::debug;

use crate::config::ClientConfig;
use crate::coordinator::Refresher;
use crate::store::{CookieUpdate, CredentialStore};
use crate::{ClientError, Result};

/// Calls `GET /auth/refresh` with the stored credentials and applies the
/// identity cookies from the response to the store.
pub struct HttpRefresher {
    client: reqwest::Client,
    url: String,
    store: CredentialStore,
}

impl HttpRefresher {
    pub fn new(config: &ClientConfig, store: CredentialStore) -> Result<Self> {
        Ok(Self::with_client(config.http_client()?, config.refresh_url(), store))
    }

    pub fn with_client(client: reqwest::Client, url: impl Into<String>, store: CredentialStore) -> Self {
        Self {
            client,
            url: url.into(),
            store,
        }
    }
}

#[async_trait]
impl Refresher for HttpRefresher {
    async fn refresh(&self) -> Result<()> {
        let mut request = self.client.get(&self.url);
        if let Some(cookies) = self.store.cookie_header() {
            request = request.header(COOKIE, cookies);
        }

        let response = request.send().await?;
        let status = response.status();

        if !status.is_success() {
            return Err(ClientError::RefreshRejected {
                status: status.as_u16(),
            });
        }

        let update = self.store.apply_set_cookies(
            response
                .headers()
                .get_all(SET_COOKIE)
                .iter()
                .filter_map(|value| value.to_str().ok()),
        );
        debug!(?update, "Applied refresh response cookies");

        match update {
            CookieUpdate::Replaced | CookieUpdate::Cleared => Ok(()),
            CookieUpdate::Unchanged => Err(ClientError::network("refresh response carried no identity")),
            CookieUpdate::Ignored => Err(ClientError::network("refresh response carried a partial identity")),
        }
    }
}
