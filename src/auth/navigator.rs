use std::sync::{Mutex, MutexGuard};

use tracing::{debug, info};
use url::Url;

/// Application router plus browser location, as seen by the session layer
pub trait Navigator: Send + Sync {
    /// Path the application is currently showing
    fn current_path(&self) -> String;

    /// Route to an in-application path
    fn navigate(&self, path: &str);

    /// Leave the application for an external page (the hosted login)
    fn open_external(&self, url: &Url);

    /// Drop the fragment from the current location
    fn clear_fragment(&self);
}

#[derive(Debug, Clone, Default)]
struct NavigatorState {
    current: String,
    fragment: Option<String>,
    history: Vec<String>,
    external: Vec<Url>,
}

/// Navigator that keeps its location in memory and records every request
#[derive(Debug)]
pub struct MemoryNavigator {
    state: Mutex<NavigatorState>,
}

impl Default for MemoryNavigator {
    fn default() -> Self {
        Self::new("/")
    }
}

impl MemoryNavigator {
    pub fn new(path: &str) -> Self {
        Self {
            state: Mutex::new(NavigatorState {
                current: path.to_string(),
                ..NavigatorState::default()
            }),
        }
    }

    fn state(&self) -> MutexGuard<'_, NavigatorState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Simulate arriving on a location carrying a fragment
    pub fn set_fragment(&self, fragment: impl Into<String>) {
        self.state().fragment = Some(fragment.into());
    }

    pub fn fragment(&self) -> Option<String> {
        self.state().fragment.clone()
    }

    /// Paths navigated to, oldest first
    pub fn history(&self) -> Vec<String> {
        self.state().history.clone()
    }

    /// External pages opened, oldest first
    pub fn external_requests(&self) -> Vec<Url> {
        self.state().external.clone()
    }
}

impl Navigator for MemoryNavigator {
    fn current_path(&self) -> String {
        self.state().current.clone()
    }

    fn navigate(&self, path: &str) {
        let mut state = self.state();
        debug!(from = %state.current, to = %path, "Navigating");
        state.current = path.to_string();
        state.fragment = None;
        state.history.push(path.to_string());
    }

    fn open_external(&self, url: &Url) {
        info!(host = url.host_str().unwrap_or_default(), "Opening external page");
        self.state().external.push(url.clone());
    }

    fn clear_fragment(&self) {
        self.state().fragment = None;
    }
}
