// Token refresh logic

use anyhow::Context;
use async_trait::async_trait;
use reqwest::Client;
use std::time::Duration;

use super::types::{redact, RefreshRequest, RefreshResponse, TokenGrant};
use crate::error::{Result, SessionError};

/// Exchanges a refresh token for a new token pair
#[async_trait]
pub trait TokenRefresher: Send + Sync {
    /// Single attempt; no retries
    async fn refresh(&self, refresh_token: &str) -> Result<TokenGrant>;
}

/// HTTP client for the refresh endpoint
pub struct RefreshClient {
    client: Client,
    endpoint: String,
}

impl RefreshClient {
    /// Create a new refresh client
    pub fn new(endpoint: impl Into<String>, connect_timeout: u64, request_timeout: u64) -> Result<Self> {
        let client = Client::builder()
            .connect_timeout(Duration::from_secs(connect_timeout))
            .timeout(Duration::from_secs(request_timeout))
            .build()
            .context("Failed to create HTTP client")?;

        Ok(Self {
            client,
            endpoint: endpoint.into(),
        })
    }

    /// URL the refresh request is posted to
    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

#[async_trait]
impl TokenRefresher for RefreshClient {
    async fn refresh(&self, refresh_token: &str) -> Result<TokenGrant> {
        tracing::info!(
            endpoint = %self.endpoint,
            refresh_token = %redact(refresh_token),
            "Refreshing session tokens..."
        );

        let request = RefreshRequest {
            refresh_token: refresh_token.to_string(),
        };

        let response = self
            .client
            .post(&self.endpoint)
            .json(&request)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let error_text = response.text().await.unwrap_or_default();
            return Err(SessionError::Refresh {
                status: status.as_u16(),
                message: error_text,
            });
        }

        let body = response.text().await?;
        let data: RefreshResponse = serde_json::from_str(&body)
            .map_err(|e| SessionError::InvalidResponse(e.to_string()))?;

        if data.token.is_empty() || data.refresh_token.is_empty() {
            return Err(SessionError::InvalidResponse(
                "response does not contain both tokens".to_string(),
            ));
        }

        tracing::info!(status = %status, "Session tokens refreshed");

        Ok(data.into())
    }
}
