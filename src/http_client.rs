use anyhow::Context;
use reqwest::header::{HeaderValue, AUTHORIZATION};
use reqwest::{Client, Method, Request, RequestBuilder, Response, StatusCode, Url};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;

use crate::auth::{
    Credentials, HttpTokenRefresher, Navigator, RefreshCoordinator, RefreshError, RotationPolicy,
    TokenRefresher, TokenStore,
};
use crate::error::{ClientError, Result};

/// Settings for building an [`AuthHttpClient`]
#[derive(Debug, Clone)]
pub struct ClientOptions {
    pub base_url: String,
    pub refresh_path: String,
    pub login_route: String,
    pub rotation: RotationPolicy,
    pub max_connections: usize,
    pub connect_timeout: u64,
    pub request_timeout: u64,
}

impl Default for ClientOptions {
    fn default() -> Self {
        Self {
            base_url: "http://127.0.0.1:8000".to_string(),
            refresh_path: "/auth/token/refresh/".to_string(),
            login_route: "/auth/login".to_string(),
            rotation: RotationPolicy::Keep,
            max_connections: 20,
            connect_timeout: 30,
            request_timeout: 60,
        }
    }
}

/// HTTP client for the task tracker API
/// Attaches the stored bearer token to every request and recovers from
/// 401 responses through the shared [`RefreshCoordinator`].
pub struct AuthHttpClient {
    /// Shared HTTP client with connection pooling
    client: Client,

    /// Base URL without trailing slash
    base_url: String,

    coordinator: Arc<RefreshCoordinator>,
}

impl AuthHttpClient {
    /// Create a client refreshing through `POST <base_url><refresh_path>`
    pub fn new(
        options: &ClientOptions,
        store: Arc<dyn TokenStore>,
        navigator: Arc<dyn Navigator>,
    ) -> anyhow::Result<Self> {
        let client = build_http_client(options)?;
        let base_url = normalize_base_url(&options.base_url)?;
        let refresher = Arc::new(HttpTokenRefresher::new(
            client.clone(),
            format!("{}{}", base_url, options.refresh_path),
        ));
        Self::with_refresher(client, options, store, navigator, refresher)
    }

    /// Create a client with a custom refresher
    pub fn with_refresher(
        client: Client,
        options: &ClientOptions,
        store: Arc<dyn TokenStore>,
        navigator: Arc<dyn Navigator>,
        refresher: Arc<dyn TokenRefresher>,
    ) -> anyhow::Result<Self> {
        let coordinator = Arc::new(RefreshCoordinator::new(
            Credentials::new(store),
            refresher,
            navigator,
            options.login_route.clone(),
            options.rotation,
        ));

        Ok(Self {
            client,
            base_url: normalize_base_url(&options.base_url)?,
            coordinator,
        })
    }

    pub fn coordinator(&self) -> &Arc<RefreshCoordinator> {
        &self.coordinator
    }

    pub fn credentials(&self) -> &Credentials {
        self.coordinator.credentials()
    }

    /// Absolute URL for an API path
    pub fn url(&self, path: &str) -> String {
        if path.starts_with('/') {
            format!("{}{}", self.base_url, path)
        } else {
            format!("{}/{}", self.base_url, path)
        }
    }

    /// Start a request for an API path
    pub fn request(&self, method: Method, path: &str) -> RequestBuilder {
        self.client.request(method, self.url(path))
    }

    /// Build and execute a request through the auth interceptors
    pub async fn send(&self, builder: RequestBuilder) -> Result<Response> {
        let request = builder.build().map_err(ClientError::from_transport)?;
        self.execute(request).await
    }

    /// Execute a request without a bearer token or 401 recovery
    pub async fn send_public(&self, builder: RequestBuilder) -> Result<Response> {
        let request = builder.build().map_err(ClientError::from_transport)?;
        let url = request.url().clone();
        tracing::debug!(method = %request.method(), url = %url, "Sending public HTTP request");

        let response = self
            .client
            .execute(request)
            .await
            .map_err(|e| transport_error(e, &url))?;
        ensure_success(response, &url).await
    }

    /// Execute a request with bearer-token injection and one refresh-and-replay
    pub async fn execute(&self, request: Request) -> Result<Response> {
        let method = request.method().clone();
        let url = request.url().clone();

        // Set before the refresh is dispatched, never cleared
        let mut retried = false;
        let mut replay_token: Option<String> = None;

        loop {
            let mut attempt = request.try_clone().ok_or(ClientError::BodyNotCloneable)?;

            let sent_token = match replay_token.take() {
                Some(token) => Some(token),
                None => self.credentials().access_token()?,
            };
            if let Some(ref token) = sent_token {
                authorize(&mut attempt, token)?;
            } else {
                tracing::debug!(url = %url, "No access token stored, sending unauthenticated");
            }

            tracing::debug!(
                method = %method,
                url = %url,
                retried = retried,
                "Sending HTTP request"
            );

            let response = self
                .client
                .execute(attempt)
                .await
                .map_err(|e| transport_error(e, &url))?;

            if response.status() != StatusCode::UNAUTHORIZED {
                return ensure_success(response, &url).await;
            }

            let unauthorized = status_error(response).await;
            if retried {
                tracing::warn!(url = %url, "Request rejected again after token refresh");
                return Err(unauthorized);
            }
            retried = true;

            // A refresh settled while this request was in flight
            let current = self.credentials().access_token()?;
            if current.is_some() && current != sent_token {
                tracing::debug!(url = %url, "Access token changed during request, replaying");
                replay_token = current;
                continue;
            }

            tracing::warn!(url = %url, "Received 401, refreshing access token...");
            match self.coordinator.recover().await {
                Ok(token) => replay_token = Some(token),
                Err(RefreshError::MissingRefreshToken) => return Err(unauthorized),
                Err(RefreshError::Abandoned) => return Err(ClientError::RefreshAbandoned),
                Err(e) => return Err(ClientError::SessionExpired(e)),
            }
        }
    }

    pub async fn get_json<T: DeserializeOwned>(&self, path: &str) -> Result<T> {
        let response = self.send(self.request(Method::GET, path)).await?;
        decode(response).await
    }

    pub async fn get_json_with_query<T, Q>(&self, path: &str, query: &Q) -> Result<T>
    where
        T: DeserializeOwned,
        Q: Serialize + ?Sized,
    {
        let response = self
            .send(self.request(Method::GET, path).query(query))
            .await?;
        decode(response).await
    }

    pub async fn post_json<T, B>(&self, path: &str, body: &B) -> Result<T>
    where
        T: DeserializeOwned,
        B: Serialize + ?Sized,
    {
        let response = self
            .send(self.request(Method::POST, path).json(body))
            .await?;
        decode(response).await
    }

    pub async fn patch_json<T, B>(&self, path: &str, body: &B) -> Result<T>
    where
        T: DeserializeOwned,
        B: Serialize + ?Sized,
    {
        let response = self
            .send(self.request(Method::PATCH, path).json(body))
            .await?;
        decode(response).await
    }

    pub async fn delete(&self, path: &str) -> Result<()> {
        self.send(self.request(Method::DELETE, path)).await?;
        Ok(())
    }
}

/// Build the pooled reqwest client
pub fn build_http_client(options: &ClientOptions) -> anyhow::Result<Client> {
    Client::builder()
        .pool_max_idle_per_host(options.max_connections)
        .connect_timeout(Duration::from_secs(options.connect_timeout))
        .timeout(Duration::from_secs(options.request_timeout))
        .build()
        .context("Failed to create HTTP client")
}

fn normalize_base_url(base_url: &str) -> anyhow::Result<String> {
    let parsed =
        Url::parse(base_url).with_context(|| format!("Invalid base URL: {}", base_url))?;
    if !matches!(parsed.scheme(), "http" | "https") {
        anyhow::bail!("Base URL must be http or https: {}", base_url);
    }
    Ok(base_url.trim_end_matches('/').to_string())
}

fn authorize(request: &mut Request, token: &str) -> Result<()> {
    let value = HeaderValue::from_str(&format!("Bearer {}", token))
        .context("Access token is not a valid header value")?;
    request.headers_mut().insert(AUTHORIZATION, value);
    Ok(())
}

fn transport_error(e: reqwest::Error, url: &Url) -> ClientError {
    let err = ClientError::from_transport(e);
    tracing::error!(url = %url, error = %err, "HTTP request error");
    err
}

async fn ensure_success(response: Response, url: &Url) -> Result<Response> {
    let status = response.status();
    if status.is_success() {
        tracing::debug!(status = %status, url = %url, "Request successful");
        return Ok(response);
    }

    let err = status_error(response).await;
    tracing::warn!(
        status = status.as_u16(),
        url = %url,
        "HTTP request failed with error response"
    );
    Err(err)
}

async fn status_error(response: Response) -> ClientError {
    let status = response.status().as_u16();
    let body = response.text().await.unwrap_or_default();
    ClientError::Status { status, body }
}

async fn decode<T: DeserializeOwned>(response: Response) -> Result<T> {
    response
        .json()
        .await
        .map_err(|e| ClientError::Decode(e.to_string()))
}
