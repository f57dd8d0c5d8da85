// Account endpoints and session lifecycle

use reqwest::Method;

use crate::auth::CredentialPair;
use crate::error::{ClientError, Result};
use crate::http_client::AuthHttpClient;
use crate::models::{LoginRequest, LoginResponse, SignupRequest, SignupResponse, UserProfile};

/// Register a new account, returns the server's confirmation message
pub async fn signup(client: &AuthHttpClient, user: &SignupRequest) -> Result<String> {
    let response = client
        .send_public(client.request(Method::POST, "/auth/signup/").json(user))
        .await?;
    let data: SignupResponse = response
        .json()
        .await
        .map_err(|e| ClientError::Decode(e.to_string()))?;
    Ok(data.message)
}

/// Obtain a token pair and store it
/// Sent without the refresh cycle: a 401 here means bad credentials.
pub async fn login(client: &AuthHttpClient, email: &str, password: &str) -> Result<CredentialPair> {
    let response = client
        .send_public(
            client
                .request(Method::POST, "/auth/login/")
                .json(&LoginRequest { email, password }),
        )
        .await?;

    let data: LoginResponse = response
        .json()
        .await
        .map_err(|e| ClientError::Decode(e.to_string()))?;

    let (Some(access), Some(refresh)) = (data.access, data.refresh) else {
        return Err(ClientError::Decode(
            "login response does not contain a token pair".to_string(),
        ));
    };

    let pair = CredentialPair { access, refresh };
    client.credentials().save_pair(&pair)?;
    tracing::info!("Logged in as {}", email);
    Ok(pair)
}

/// Clear both tokens and send the session to the login route
pub fn logout(client: &AuthHttpClient) {
    client.coordinator().logout();
    tracing::info!("Logged out");
}

pub fn is_authenticated(client: &AuthHttpClient) -> Result<bool> {
    Ok(client.credentials().access_token()?.is_some())
}

pub async fn profile(client: &AuthHttpClient) -> Result<UserProfile> {
    client.get_json("/auth/profile/").await
}

/// All users, admin only
pub async fn users(client: &AuthHttpClient) -> Result<Vec<UserProfile>> {
    client.get_json("/auth/users/").await
}
