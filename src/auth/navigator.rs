// Login redirect handling

use std::sync::Mutex;

/// Where the client sends the user when the session cannot be recovered
pub trait Navigator: Send + Sync {
    /// Current location of the session
    fn current_path(&self) -> String;

    /// Navigate to `path`
    fn redirect(&self, path: &str);
}

/// Navigator that records its location and every redirect it performs
pub struct SessionNavigator {
    location: Mutex<String>,
    history: Mutex<Vec<String>>,
}

impl SessionNavigator {
    pub fn new(start: impl Into<String>) -> Self {
        Self {
            location: Mutex::new(start.into()),
            history: Mutex::new(Vec::new()),
        }
    }

    /// Paths redirected to, oldest first
    pub fn redirects(&self) -> Vec<String> {
        self.history
            .lock()
            .map(|history| history.clone())
            .unwrap_or_default()
    }

    /// Move the session to `path` without counting it as a redirect
    pub fn visit(&self, path: &str) {
        if let Ok(mut location) = self.location.lock() {
            *location = path.to_string();
        }
    }
}

impl Default for SessionNavigator {
    fn default() -> Self {
        Self::new("/")
    }
}

impl Navigator for SessionNavigator {
    fn current_path(&self) -> String {
        self.location
            .lock()
            .map(|location| location.clone())
            .unwrap_or_default()
    }

    fn redirect(&self, path: &str) {
        tracing::warn!("Session ended, redirecting to {}", path);
        self.visit(path);
        if let Ok(mut history) = self.history.lock() {
            history.push(path.to_string());
        }
    }
}

/// Redirect to the login route unless the session is already there
pub fn force_login(navigator: &dyn Navigator, login_route: &str) -> bool {
    if navigator.current_path().contains(login_route) {
        tracing::debug!("Already on {}, skipping redirect", login_route);
        return false;
    }
    navigator.redirect(login_route);
    true
}
