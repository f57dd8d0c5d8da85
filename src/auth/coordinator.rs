// Refresh coordination
// Serializes concurrent 401 recoveries into a single refresh call

use std::mem;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::sync::oneshot;

use super::navigator::{self, Navigator};
use super::refresh::TokenRefresher;
use super::store::Credentials;
use super::types::{RefreshError, RefreshState, RotationPolicy};

type Waiter = oneshot::Sender<Result<String, RefreshError>>;

enum Phase {
    Idle,
    /// Requests that hit a 401 while the refresh was in flight, in arrival order
    Refreshing { waiters: Vec<Waiter> },
}

/// Refresh coordinator
/// At most one refresh call is in flight per coordinator. Requests arriving
/// during a refresh wait for its outcome instead of starting their own.
pub struct RefreshCoordinator {
    phase: Mutex<Phase>,

    credentials: Credentials,

    refresher: Arc<dyn TokenRefresher>,

    navigator: Arc<dyn Navigator>,

    /// Route the navigator is sent to when the session ends
    login_route: String,

    rotation: RotationPolicy,
}

impl RefreshCoordinator {
    pub fn new(
        credentials: Credentials,
        refresher: Arc<dyn TokenRefresher>,
        navigator: Arc<dyn Navigator>,
        login_route: impl Into<String>,
        rotation: RotationPolicy,
    ) -> Self {
        Self {
            phase: Mutex::new(Phase::Idle),
            credentials,
            refresher,
            navigator,
            login_route: login_route.into(),
            rotation,
        }
    }

    pub fn state(&self) -> RefreshState {
        match *self.lock_phase() {
            Phase::Idle => RefreshState::Idle,
            Phase::Refreshing { .. } => RefreshState::Refreshing,
        }
    }

    /// Number of requests waiting on the in-flight refresh
    pub fn pending(&self) -> usize {
        match &*self.lock_phase() {
            Phase::Idle => 0,
            Phase::Refreshing { waiters } => waiters.len(),
        }
    }

    pub fn credentials(&self) -> &Credentials {
        &self.credentials
    }

    pub fn login_route(&self) -> &str {
        &self.login_route
    }

    /// End the session: clear both tokens and send the navigator to login
    pub fn logout(&self) {
        if let Err(e) = self.credentials.clear() {
            tracing::error!("Failed to clear stored tokens: {}", e);
        }
        navigator::force_login(self.navigator.as_ref(), &self.login_route);
    }

    /// Recover from a 401: returns the new access token
    ///
    /// The first caller while idle performs the refresh; callers arriving
    /// while it is in flight are queued and receive the same outcome.
    pub async fn recover(&self) -> Result<String, RefreshError> {
        let waiter = {
            let mut phase = self.lock_phase();
            match &mut *phase {
                Phase::Refreshing { waiters } => {
                    let (tx, rx) = oneshot::channel();
                    waiters.push(tx);
                    tracing::debug!(queued = waiters.len(), "Refresh in flight, queueing request");
                    Some(rx)
                }
                Phase::Idle => {
                    *phase = Phase::Refreshing {
                        waiters: Vec::new(),
                    };
                    None
                }
            }
        };

        if let Some(rx) = waiter {
            return rx.await.unwrap_or(Err(RefreshError::Abandoned));
        }

        let mut cycle = CycleGuard {
            coordinator: self,
            armed: true,
        };
        let outcome = self.run_refresh().await;
        cycle.armed = false;

        self.settle(&outcome);
        outcome
    }

    async fn run_refresh(&self) -> Result<String, RefreshError> {
        let Some(refresh_token) = self.credentials.refresh_token()? else {
            tracing::warn!("Received 401 with no refresh token stored");
            return Err(RefreshError::MissingRefreshToken);
        };

        let tokens = self.refresher.refresh(&refresh_token).await?;
        self.credentials.set_access_token(&tokens.access)?;

        if self.rotation == RotationPolicy::Rotate {
            if let Some(ref refresh) = tokens.refresh {
                self.credentials.set_refresh_token(refresh)?;
            }
        }

        Ok(tokens.access)
    }

    /// Apply the outcome of the refresh and drain the queue
    fn settle(&self, outcome: &Result<String, RefreshError>) {
        // Session is torn down before leaving REFRESHING so a new 401 cannot
        // start a refresh with the rejected token.
        if let Err(e) = outcome {
            tracing::error!("Token refresh failed: {}", e);
            self.end_session(e);
        }

        let waiters = self.take_waiters();
        tracing::debug!(
            waiters = waiters.len(),
            success = outcome.is_ok(),
            "Refresh settled"
        );
        for waiter in waiters {
            // Receiver gone means that request was dropped
            let _ = waiter.send(outcome.clone());
        }
    }

    fn end_session(&self, error: &RefreshError) {
        let cleared = match error {
            RefreshError::MissingRefreshToken => self.credentials.clear_access_token(),
            _ => self.credentials.clear(),
        };
        if let Err(e) = cleared {
            tracing::error!("Failed to clear stored tokens: {}", e);
        }
        navigator::force_login(self.navigator.as_ref(), &self.login_route);
    }

    fn take_waiters(&self) -> Vec<Waiter> {
        match mem::replace(&mut *self.lock_phase(), Phase::Idle) {
            Phase::Idle => Vec::new(),
            Phase::Refreshing { waiters } => waiters,
        }
    }

    fn lock_phase(&self) -> MutexGuard<'_, Phase> {
        // Critical sections never panic
        self.phase.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Returns the coordinator to idle if the refreshing task is dropped mid-flight
struct CycleGuard<'a> {
    coordinator: &'a RefreshCoordinator,
    armed: bool,
}

impl Drop for CycleGuard<'_> {
    fn drop(&mut self) {
        if self.armed {
            let waiters = self.coordinator.take_waiters();
            tracing::warn!(waiters = waiters.len(), "Token refresh abandoned");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::navigator::SessionNavigator;
    use crate::auth::store::MemoryTokenStore;
    use crate::auth::types::{CredentialPair, RefreshedTokens};
    use futures::future::BoxFuture;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;
    use tokio::sync::Notify;

    /// Refresher returning a fixed outcome, optionally held until released
    struct FakeRefresher {
        calls: AtomicUsize,
        outcome: Result<RefreshedTokens, RefreshError>,
        started: Notify,
        gate: Option<Notify>,
    }

    impl FakeRefresher {
        fn new(outcome: Result<RefreshedTokens, RefreshError>) -> Self {
            Self {
                calls: AtomicUsize::new(0),
                outcome,
                started: Notify::new(),
                gate: None,
            }
        }

        fn gated(outcome: Result<RefreshedTokens, RefreshError>) -> Self {
            Self {
                gate: Some(Notify::new()),
                ..Self::new(outcome)
            }
        }

        fn release(&self) {
            if let Some(ref gate) = self.gate {
                gate.notify_one();
            }
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    impl TokenRefresher for FakeRefresher {
        fn refresh<'a>(
            &'a self,
            _refresh_token: &'a str,
        ) -> BoxFuture<'a, Result<RefreshedTokens, RefreshError>> {
            Box::pin(async move {
                self.calls.fetch_add(1, Ordering::SeqCst);
                self.started.notify_one();
                if let Some(ref gate) = self.gate {
                    gate.notified().await;
                }
                self.outcome.clone()
            })
        }
    }

    struct Harness {
        coordinator: Arc<RefreshCoordinator>,
        refresher: Arc<FakeRefresher>,
        navigator: Arc<SessionNavigator>,
        credentials: Credentials,
    }

    fn harness(refresher: FakeRefresher, rotation: RotationPolicy) -> Harness {
        let credentials = Credentials::new(Arc::new(MemoryTokenStore::new()));
        credentials
            .save_pair(&CredentialPair {
                access: "A1".to_string(),
                refresh: "R1".to_string(),
            })
            .unwrap();

        let refresher = Arc::new(refresher);
        let navigator = Arc::new(SessionNavigator::new("/dashboard"));
        let coordinator = Arc::new(RefreshCoordinator::new(
            credentials.clone(),
            refresher.clone(),
            navigator.clone(),
            "/auth/login",
            rotation,
        ));

        Harness {
            coordinator,
            refresher,
            navigator,
            credentials,
        }
    }

    fn granted(access: &str, refresh: Option<&str>) -> Result<RefreshedTokens, RefreshError> {
        Ok(RefreshedTokens {
            access: access.to_string(),
            refresh: refresh.map(str::to_string),
        })
    }

    fn rejected() -> Result<RefreshedTokens, RefreshError> {
        Err(RefreshError::Rejected {
            status: 401,
            body: "token_not_valid".to_string(),
        })
    }

    async fn wait_for_pending(coordinator: &RefreshCoordinator, n: usize) {
        tokio::time::timeout(Duration::from_secs(5), async {
            while coordinator.pending() < n {
                tokio::task::yield_now().await;
            }
        })
        .await
        .expect("requests were not queued");
    }

    /// Starts `n` recoveries: one refreshing, the rest queued behind it
    async fn recover_concurrently(
        h: &Harness,
        n: usize,
    ) -> Vec<Result<String, RefreshError>> {
        let first = {
            let coordinator = h.coordinator.clone();
            tokio::spawn(async move { coordinator.recover().await })
        };
        h.refresher.started.notified().await;
        assert_eq!(h.coordinator.state(), RefreshState::Refreshing);

        let mut handles = vec![first];
        for _ in 1..n {
            let coordinator = h.coordinator.clone();
            handles.push(tokio::spawn(async move { coordinator.recover().await }));
        }
        wait_for_pending(&h.coordinator, n - 1).await;

        h.refresher.release();

        let mut results = Vec::new();
        for handle in handles {
            results.push(handle.await.unwrap());
        }
        results
    }

    #[tokio::test]
    async fn test_single_refresh_stores_new_access_token() {
        let h = harness(FakeRefresher::new(granted("A2", None)), RotationPolicy::Keep);

        let token = h.coordinator.recover().await.unwrap();

        assert_eq!(token, "A2");
        assert_eq!(h.refresher.calls(), 1);
        assert_eq!(h.credentials.access_token().unwrap().as_deref(), Some("A2"));
        assert_eq!(h.credentials.refresh_token().unwrap().as_deref(), Some("R1"));
        assert_eq!(h.coordinator.state(), RefreshState::Idle);
        assert!(h.navigator.redirects().is_empty());
    }

    #[tokio::test]
    async fn test_three_concurrent_recoveries_share_one_refresh() {
        let h = harness(FakeRefresher::gated(granted("A2", None)), RotationPolicy::Keep);

        let results = recover_concurrently(&h, 3).await;

        assert_eq!(h.refresher.calls(), 1);
        assert_eq!(results.len(), 3);
        for result in results {
            assert_eq!(result.unwrap(), "A2");
        }
        assert_eq!(h.coordinator.state(), RefreshState::Idle);
        assert_eq!(h.coordinator.pending(), 0);
    }

    #[tokio::test]
    async fn test_failed_refresh_rejects_all_and_redirects_once() {
        let h = harness(FakeRefresher::gated(rejected()), RotationPolicy::Keep);

        let results = recover_concurrently(&h, 4).await;

        assert_eq!(h.refresher.calls(), 1);
        for result in results {
            assert_eq!(result.unwrap_err(), rejected().unwrap_err());
        }
        assert_eq!(h.credentials.access_token().unwrap(), None);
        assert_eq!(h.credentials.refresh_token().unwrap(), None);
        assert_eq!(h.navigator.redirects(), vec!["/auth/login".to_string()]);
        assert_eq!(h.coordinator.state(), RefreshState::Idle);
    }

    #[tokio::test]
    async fn test_missing_refresh_token_skips_refresh() {
        let h = harness(FakeRefresher::new(granted("A2", None)), RotationPolicy::Keep);
        h.credentials.clear().unwrap();
        h.credentials.set_access_token("A1").unwrap();

        let err = h.coordinator.recover().await.unwrap_err();

        assert_eq!(err, RefreshError::MissingRefreshToken);
        assert_eq!(h.refresher.calls(), 0);
        assert_eq!(h.credentials.access_token().unwrap(), None);
        assert_eq!(h.navigator.redirects(), vec!["/auth/login".to_string()]);
    }

    #[tokio::test]
    async fn test_redirect_suppressed_on_login_page() {
        let h = harness(FakeRefresher::new(rejected()), RotationPolicy::Keep);
        h.navigator.visit("/auth/login");

        assert!(h.coordinator.recover().await.is_err());
        assert!(h.navigator.redirects().is_empty());
        assert_eq!(h.credentials.refresh_token().unwrap(), None);
    }

    #[tokio::test]
    async fn test_rotation_policy_rotate_stores_refresh_token() {
        let h = harness(
            FakeRefresher::new(granted("A2", Some("R2"))),
            RotationPolicy::Rotate,
        );

        h.coordinator.recover().await.unwrap();
        assert_eq!(h.credentials.refresh_token().unwrap().as_deref(), Some("R2"));
    }

    #[tokio::test]
    async fn test_rotation_policy_keep_ignores_refresh_token() {
        let h = harness(
            FakeRefresher::new(granted("A2", Some("R2"))),
            RotationPolicy::Keep,
        );

        h.coordinator.recover().await.unwrap();
        assert_eq!(h.credentials.refresh_token().unwrap().as_deref(), Some("R1"));
    }

    #[tokio::test]
    async fn test_sequential_cycles_each_refresh() {
        let h = harness(FakeRefresher::new(granted("A2", None)), RotationPolicy::Keep);

        h.coordinator.recover().await.unwrap();
        h.coordinator.recover().await.unwrap();

        assert_eq!(h.refresher.calls(), 2);
    }

    #[tokio::test]
    async fn test_abandoned_refresh_releases_waiters() {
        let h = harness(FakeRefresher::gated(granted("A2", None)), RotationPolicy::Keep);

        let first = {
            let coordinator = h.coordinator.clone();
            tokio::spawn(async move { coordinator.recover().await })
        };
        h.refresher.started.notified().await;

        let second = {
            let coordinator = h.coordinator.clone();
            tokio::spawn(async move { coordinator.recover().await })
        };
        wait_for_pending(&h.coordinator, 1).await;

        first.abort();
        assert!(first.await.unwrap_err().is_cancelled());

        assert_eq!(second.await.unwrap(), Err(RefreshError::Abandoned));
        assert_eq!(h.coordinator.state(), RefreshState::Idle);
        // Nothing was rejected by the server, the session survives
        assert_eq!(h.credentials.refresh_token().unwrap().as_deref(), Some("R1"));
        assert!(h.navigator.redirects().is_empty());
    }

    #[tokio::test]
    async fn test_logout_clears_tokens_and_redirects() {
        let h = harness(FakeRefresher::new(granted("A2", None)), RotationPolicy::Keep);

        h.coordinator.logout();

        assert_eq!(h.credentials.access_token().unwrap(), None);
        assert_eq!(h.credentials.refresh_token().unwrap(), None);
        assert_eq!(h.navigator.redirects(), vec!["/auth/login".to_string()]);
    }

    proptest::proptest! {
        #![proptest_config(proptest::prelude::ProptestConfig::with_cases(16))]

        #[test]
        fn prop_one_refresh_for_any_number_of_waiters(n in 1usize..24) {
            let calls = tokio_test::block_on(async {
                let h = harness(FakeRefresher::gated(granted("A2", None)), RotationPolicy::Keep);
                let results = recover_concurrently(&h, n).await;
                assert!(results.iter().all(|r| r.as_deref() == Ok("A2")));
                h.refresher.calls()
            });
            proptest::prop_assert_eq!(calls, 1);
        }
    }
}
