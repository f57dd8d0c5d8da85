// tasktrack-client - task tracker API client with coordinated token refresh

pub mod api;
pub mod auth;
pub mod config;
pub mod error;
pub mod http_client;
pub mod models;

pub use error::{ClientError, Result};
pub use http_client::{AuthHttpClient, ClientOptions};
