use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use tokio::sync::Mutex;

use crate::error::{ServiceError, ServiceResult};

/// Single refresh-token OAuth flow shared across every service that needs a
/// bearer token. `access_token` is cached with a 60-second safety margin
/// before the provider-reported expiry and refreshed under a single shared
/// lock, so concurrent turns issuing requests for the same user never fire
/// more than one refresh at a time.
#[async_trait]
pub trait OAuthTokenSource: Send + Sync {
    async fn access_token(&self) -> ServiceResult<String>;
    /// Invalidate the cached token and force a refresh on the next call.
    /// Used after a request comes back 401 so the caller can retry once.
    async fn force_refresh(&self) -> ServiceResult<String>;
}

struct CachedToken {
    token: String,
    expires_at: Instant,
}

pub struct RefreshTokenSource {
    client: reqwest::Client,
    token_url: String,
    client_id: String,
    client_secret: String,
    refresh_token: String,
    cached: Arc<Mutex<Option<CachedToken>>>,
}

impl RefreshTokenSource {
    pub fn new(
        token_url: impl Into<String>,
        client_id: impl Into<String>,
        client_secret: impl Into<String>,
        refresh_token: impl Into<String>,
    ) -> Self {
        Self {
            client: reqwest::Client::new(),
            token_url: token_url.into(),
            client_id: client_id.into(),
            client_secret: client_secret.into(),
            refresh_token: refresh_token.into(),
            cached: Arc::new(Mutex::new(None)),
        }
    }

    async fn refresh(&self) -> ServiceResult<(String, Duration)> {
        let params = [
            ("client_id", self.client_id.as_str()),
            ("client_secret", self.client_secret.as_str()),
            ("refresh_token", self.refresh_token.as_str()),
            ("grant_type", "refresh_token"),
        ];

        let response = self
            .client
            .post(&self.token_url)
            .form(&params)
            .send()
            .await
            .map_err(|err| ServiceError::Transient(err.to_string()))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(ServiceError::from_status(status, body));
        }

        let body: serde_json::Value = response
            .json()
            .await
            .map_err(|err| ServiceError::Internal(err.to_string()))?;
        let token = body
            .get("access_token")
            .and_then(|v| v.as_str())
            .ok_or_else(|| ServiceError::Internal("token response missing access_token".into()))?
            .to_string();
        let expires_in = body
            .get("expires_in")
            .and_then(|v| v.as_u64())
            .unwrap_or(3600);
        let safety_margin = Duration::from_secs(60);
        let ttl = Duration::from_secs(expires_in).saturating_sub(safety_margin);
        Ok((token, ttl))
    }
}

/// Send a request built from the current bearer token; on a 401 force a
/// refresh and reissue the same request once more. `build` is called again
/// with the refreshed token, so it must not consume anything it needs for
/// the second attempt.
pub async fn send_with_retry(
    tokens: &(dyn OAuthTokenSource),
    mut build: impl FnMut(&str) -> reqwest::RequestBuilder,
) -> ServiceResult<reqwest::Response> {
    let token = tokens.access_token().await?;
    let response = build(&token)
        .send()
        .await
        .map_err(|err| ServiceError::Transient(err.to_string()))?;
    if response.status().as_u16() != 401 {
        return Ok(response);
    }

    let token = tokens.force_refresh().await?;
    build(&token)
        .send()
        .await
        .map_err(|err| ServiceError::Transient(err.to_string()))
}

#[async_trait]
impl OAuthTokenSource for RefreshTokenSource {
    async fn access_token(&self) -> ServiceResult<String> {
        {
            let guard = self.cached.lock().await;
            if let Some(cached) = guard.as_ref() {
                if cached.expires_at > Instant::now() {
                    return Ok(cached.token.clone());
                }
            }
        }
        self.force_refresh().await
    }

    async fn force_refresh(&self) -> ServiceResult<String> {
        let mut guard = self.cached.lock().await;
        // Another waiter may have refreshed while we waited for the lock.
        if let Some(cached) = guard.as_ref() {
            if cached.expires_at > Instant::now() {
                return Ok(cached.token.clone());
            }
        }

        let (token, ttl) = self.refresh().await?;
        *guard = Some(CachedToken {
            token: token.clone(),
            expires_at: Instant::now() + ttl,
        });
        Ok(token)
    }
}
