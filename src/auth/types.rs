// Authentication types

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Storage key for the short-lived access token
pub const ACCESS_TOKEN_KEY: &str = "access_token";

/// Storage key for the long-lived refresh token
pub const REFRESH_TOKEN_KEY: &str = "refresh_token";

/// Access/refresh token pair issued at login
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CredentialPair {
    pub access: String,
    pub refresh: String,
}

/// Whether a refresh response may replace the stored refresh token
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RotationPolicy {
    /// Keep the refresh token issued at login (backend does not rotate)
    #[default]
    Keep,
    /// Store the refresh token returned by the refresh endpoint, if any
    Rotate,
}

/// Refresh coordinator state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RefreshState {
    Idle,
    Refreshing,
}

/// Token data extracted from a refresh response
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RefreshedTokens {
    pub access: String,
    pub refresh: Option<String>,
}

/// Refresh endpoint request body
#[derive(Serialize)]
pub struct RefreshRequest<'a> {
    pub refresh: &'a str,
}

/// Refresh endpoint response body
#[derive(Deserialize)]
pub struct RefreshResponse {
    pub access: String,
    #[serde(default)]
    pub refresh: Option<String>,
}

/// Credential storage failure
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StoreError {
    #[error("token storage error: {0}")]
    Backend(String),

    #[error("token storage lock poisoned")]
    Poisoned,
}

impl From<rusqlite::Error> for StoreError {
    fn from(e: rusqlite::Error) -> Self {
        StoreError::Backend(e.to_string())
    }
}

/// Outcome of a failed refresh cycle
///
/// Cloned to every request that was queued behind the refresh.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RefreshError {
    #[error("no refresh token stored")]
    MissingRefreshToken,

    #[error("refresh rejected: {status} - {body}")]
    Rejected { status: u16, body: String },

    #[error("refresh request failed: {0}")]
    Transport(String),

    #[error("invalid refresh response: {0}")]
    InvalidResponse(String),

    #[error("token storage error during refresh: {0}")]
    Storage(String),

    #[error("refresh abandoned before completion")]
    Abandoned,
}

impl From<StoreError> for RefreshError {
    fn from(e: StoreError) -> Self {
        RefreshError::Storage(e.to_string())
    }
}
