// Token refresh logic

use futures::future::BoxFuture;
use reqwest::Client;

use super::types::{RefreshError, RefreshRequest, RefreshResponse, RefreshedTokens};

/// Exchanges a refresh token for a new access token
pub trait TokenRefresher: Send + Sync {
    fn refresh<'a>(
        &'a self,
        refresh_token: &'a str,
    ) -> BoxFuture<'a, Result<RefreshedTokens, RefreshError>>;
}

/// Refresher calling `POST <refresh_url>` with `{ "refresh": ... }`
pub struct HttpTokenRefresher {
    client: Client,
    refresh_url: String,
}

impl HttpTokenRefresher {
    /// The client should not be the authenticated one, refresh calls
    /// bypass the interceptors.
    pub fn new(client: Client, refresh_url: impl Into<String>) -> Self {
        Self {
            client,
            refresh_url: refresh_url.into(),
        }
    }

    async fn call(&self, refresh_token: &str) -> Result<RefreshedTokens, RefreshError> {
        tracing::info!(url = %self.refresh_url, "Refreshing access token...");

        let response = self
            .client
            .post(&self.refresh_url)
            .json(&RefreshRequest {
                refresh: refresh_token,
            })
            .send()
            .await
            .map_err(|e| RefreshError::Transport(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            tracing::error!(
                status = status.as_u16(),
                body = %body,
                "Token refresh rejected"
            );
            return Err(RefreshError::Rejected {
                status: status.as_u16(),
                body,
            });
        }

        let data: RefreshResponse = response
            .json()
            .await
            .map_err(|e| RefreshError::InvalidResponse(e.to_string()))?;

        if data.access.is_empty() {
            return Err(RefreshError::InvalidResponse(
                "response does not contain access".to_string(),
            ));
        }

        tracing::info!(
            rotated = data.refresh.is_some(),
            "Access token refreshed"
        );

        Ok(RefreshedTokens {
            access: data.access,
            refresh: data.refresh.filter(|t| !t.is_empty()),
        })
    }
}

impl TokenRefresher for HttpTokenRefresher {
    fn refresh<'a>(
        &'a self,
        refresh_token: &'a str,
    ) -> BoxFuture<'a, Result<RefreshedTokens, RefreshError>> {
        Box::pin(self.call(refresh_token))
    }
}
