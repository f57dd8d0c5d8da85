// Authentication module
// Token storage, refresh and the coordinator serializing 401 recovery

mod coordinator;
mod navigator;
mod refresh;
mod store;
mod types;

pub use coordinator::RefreshCoordinator;
pub use navigator::{force_login, Navigator, SessionNavigator};
pub use refresh::{HttpTokenRefresher, TokenRefresher};
pub use store::{Credentials, MemoryTokenStore, SqliteTokenStore, TokenStore};
pub use types::{
    CredentialPair, RefreshError, RefreshState, RefreshedTokens, RotationPolicy, StoreError,
    ACCESS_TOKEN_KEY, REFRESH_TOKEN_KEY,
};
