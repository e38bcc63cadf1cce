//! Bearer token cache for the rule service.
//!
//! The token is fetched from the configured token endpoint and cached with
//! its expiry; callers get the cached value until it is within the refresh
//! margin of expiring, at which point a fresh one is fetched lazily. The
//! cache is owned by the client that needs it, never a process-wide static.

use std::time::{Duration, Instant};

use serde::Deserialize;
use serde_json::json;
use tokio::sync::Mutex;

const REFRESH_MARGIN: Duration = Duration::from_secs(30);

#[derive(Clone)]
pub struct TokenConfig {
    pub url: String,
    pub client_id: String,
    pub client_secret: String,
}

#[derive(Clone)]
struct CachedToken {
    token: String,
    expires_at: Instant,
}

#[derive(Deserialize)]
struct TokenResponse {
    access_token: String,
    expires_in: u64,
}

pub struct TokenCache {
    config: TokenConfig,
    inner: Mutex<Option<CachedToken>>,
}

impl TokenCache {
    pub fn new(config: TokenConfig) -> Self {
        Self {
            config,
            inner: Mutex::new(None),
        }
    }

    /// The current bearer token, refreshed if absent or about to expire.
    pub async fn bearer_token(&self, client: &reqwest::Client) -> Result<String, reqwest::Error> {
        let mut cached = self.inner.lock().await;

        if let Some(token) = cached.as_ref() {
            if token.expires_at > Instant::now() + REFRESH_MARGIN {
                return Ok(token.token.clone());
            }
        }

        let response: TokenResponse = client
            .post(&self.config.url)
            .json(&json!({
                "clientId": self.config.client_id,
                "clientSecret": self.config.client_secret,
            }))
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;

        let token = CachedToken {
            token: response.access_token,
            expires_at: Instant::now() + Duration::from_secs(response.expires_in),
        };
        *cached = Some(token.clone());

        Ok(token.token)
    }
}
