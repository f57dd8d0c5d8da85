// Error handling module
// Defines the errors surfaced to callers of the client

use serde_json::Value;
use thiserror::Error;

use crate::auth::{RefreshError, StoreError};

/// Errors that can occur while talking to the task tracker API
#[derive(Error, Debug)]
pub enum ClientError {
    /// Non-success response, passed through uninterpreted
    #[error("API error: {status} - {body}")]
    Status { status: u16, body: String },

    /// Session could not be recovered, credentials were cleared
    #[error("Session expired: {0}")]
    SessionExpired(#[source] RefreshError),

    /// The refresh this request waited on was dropped before settling,
    /// stored credentials are untouched
    #[error("Token refresh was abandoned before completing")]
    RefreshAbandoned,

    /// Request never produced a response
    #[error("HTTP request failed: {message} (kind: {kind})")]
    Transport { kind: &'static str, message: String },

    /// Response body did not match the expected shape
    #[error("Invalid response: {0}")]
    Decode(String),

    #[error(transparent)]
    Storage(#[from] StoreError),

    /// Streaming bodies cannot be replayed after a refresh
    #[error("Request body is not cloneable")]
    BodyNotCloneable,

    #[error("Internal error: {0}")]
    Internal(#[from] anyhow::Error),
}

impl ClientError {
    pub fn from_transport(e: reqwest::Error) -> Self {
        // Categorize the error for better debugging
        let kind = if e.is_timeout() {
            "timeout"
        } else if e.is_connect() {
            "connection_failed"
        } else if e.is_request() {
            "request_error"
        } else if e.is_body() {
            "body_error"
        } else if e.is_decode() {
            "decode_error"
        } else {
            "unknown"
        };

        ClientError::Transport {
            kind,
            message: e.to_string(),
        }
    }

    /// HTTP status, when the server answered
    pub fn status(&self) -> Option<u16> {
        match self {
            ClientError::Status { status, .. } => Some(*status),
            _ => None,
        }
    }

    pub fn is_unauthorized(&self) -> bool {
        self.status() == Some(401)
    }

    /// Human readable message from a DRF-style error body
    ///
    /// Checks `detail`, then `non_field_errors`, then the first field error.
    pub fn detail(&self) -> Option<String> {
        let ClientError::Status { body, .. } = self else {
            return None;
        };
        let json: Value = serde_json::from_str(body).ok()?;
        first_error_message(&json)
    }
}

fn first_error_message(json: &Value) -> Option<String> {
    if let Some(detail) = json.get("detail").and_then(|v| v.as_str()) {
        return Some(detail.to_string());
    }
    if let Some(msg) = first_string(json.get("non_field_errors")) {
        return Some(msg);
    }
    json.as_object()?
        .values()
        .find_map(|value| first_string(Some(value)))
}

fn first_string(value: Option<&Value>) -> Option<String> {
    match value? {
        Value::String(s) => Some(s.clone()),
        Value::Array(items) => items.first().and_then(|v| v.as_str()).map(str::to_string),
        _ => None,
    }
}

/// Result type alias for client operations
pub type Result<T> = std::result::Result<T, ClientError>;

#[cfg(test)]
mod tests {
    use super::*;

    fn status(status: u16, body: &str) -> ClientError {
        ClientError::Status {
            status,
            body: body.to_string(),
        }
    }

    #[test]
    fn test_error_messages() {
        assert_eq!(
            status(404, "Not found").to_string(),
            "API error: 404 - Not found"
        );

        let err = ClientError::SessionExpired(RefreshError::MissingRefreshToken);
        assert_eq!(err.to_string(), "Session expired: no refresh token stored");

        assert_eq!(
            ClientError::RefreshAbandoned.to_string(),
            "Token refresh was abandoned before completing"
        );

        let err = ClientError::Internal(anyhow::anyhow!("Something went wrong"));
        assert_eq!(err.to_string(), "Internal error: Something went wrong");
    }

    #[test]
    fn test_status_accessors() {
        assert_eq!(status(401, "").status(), Some(401));
        assert!(status(401, "").is_unauthorized());
        assert!(!status(403, "").is_unauthorized());
        assert_eq!(ClientError::BodyNotCloneable.status(), None);
    }

    #[test]
    fn test_detail_prefers_detail_field() {
        let err = status(403, r#"{"detail":"Only admins can create tasks."}"#);
        assert_eq!(err.detail().as_deref(), Some("Only admins can create tasks."));
    }

    #[test]
    fn test_detail_non_field_errors() {
        let err = status(400, r#"{"non_field_errors":["Passwords do not match."]}"#);
        assert_eq!(err.detail().as_deref(), Some("Passwords do not match."));
    }

    #[test]
    fn test_detail_first_field_error() {
        let err = status(400, r#"{"email":["user with this email already exists."]}"#);
        assert_eq!(
            err.detail().as_deref(),
            Some("user with this email already exists.")
        );
    }

    #[test]
    fn test_detail_non_json_body() {
        assert_eq!(status(500, "<html>oops</html>").detail(), None);
        assert_eq!(ClientError::BodyNotCloneable.detail(), None);
    }
}
