use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, RwLock};

use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::auth::clock::{Clock, SystemClock};
use crate::auth::navigator::Navigator;
use crate::auth::providers::{IdentityProvider, SecondaryAuthProvider, TokenExchange};
use crate::auth::storage::{
    MemoryStorage, SessionStorage, ACCESS_TOKEN_KEY, EXPIRES_AT_KEY, ID_TOKEN_KEY, PROFILE_KEY,
    REDIRECT_KEY, SESSION_KEYS,
};
use crate::auth::token::{
    stored_expiry, CallbackOutcome, CallbackTokens, LoginStatus, Session, UserProfile,
};
use crate::error::{AuthError, AuthResult};
use crate::events::{StatusStream, Subscriber, STATUS_CHANNEL_CAPACITY};

/// Where users land after a failed callback, a logout, or a login without destination
pub const HOME_PATH: &str = "/";

fn read<T>(lock: &RwLock<T>) -> std::sync::RwLockReadGuard<'_, T> {
    lock.read().unwrap_or_else(|poisoned| poisoned.into_inner())
}

fn write<T>(lock: &RwLock<T>) -> std::sync::RwLockWriteGuard<'_, T> {
    lock.write().unwrap_or_else(|poisoned| poisoned.into_inner())
}

fn guard<T>(lock: &Mutex<T>) -> MutexGuard<'_, T> {
    lock.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Spawn on the ambient runtime, if there is one
fn spawn_detached<F>(task: F) -> Option<JoinHandle<()>>
where
    F: Future<Output = ()> + Send + 'static,
{
    match tokio::runtime::Handle::try_current() {
        Ok(handle) => Some(handle.spawn(task)),
        Err(_) => {
            warn!("No async runtime available, background step skipped");
            None
        }
    }
}

/// Builder for [`SessionManager`]
#[derive(Default)]
pub struct SessionManagerBuilder {
    storage: Option<Arc<dyn SessionStorage>>,
    clock: Option<Arc<dyn Clock>>,
    identity: Option<Arc<dyn IdentityProvider>>,
    exchange: Option<Arc<dyn TokenExchange>>,
    secondary: Option<Arc<dyn SecondaryAuthProvider>>,
    navigator: Option<Arc<dyn Navigator>>,
}

impl SessionManagerBuilder {
    /// Durable storage; defaults to [`MemoryStorage`]
    pub fn storage(mut self, storage: Arc<dyn SessionStorage>) -> Self {
        self.storage = Some(storage);
        self
    }

    /// Time source; defaults to [`SystemClock`]
    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = Some(clock);
        self
    }

    pub fn identity_provider(mut self, identity: Arc<dyn IdentityProvider>) -> Self {
        self.identity = Some(identity);
        self
    }

    pub fn token_exchange(mut self, exchange: Arc<dyn TokenExchange>) -> Self {
        self.exchange = Some(exchange);
        self
    }

    pub fn secondary_provider(mut self, secondary: Arc<dyn SecondaryAuthProvider>) -> Self {
        self.secondary = Some(secondary);
        self
    }

    pub fn navigator(mut self, navigator: Arc<dyn Navigator>) -> Self {
        self.navigator = Some(navigator);
        self
    }

    /// Build the manager and restore any persisted session.
    ///
    /// A restored session starts the secondary token exchange on the
    /// ambient tokio runtime.
    pub fn build(self) -> AuthResult<SessionManager> {
        fn missing(field: &str) -> AuthError {
            AuthError::ConfigMissing {
                field: field.to_string(),
            }
        }

        let manager = SessionManager {
            storage: self
                .storage
                .unwrap_or_else(|| Arc::new(MemoryStorage::new())),
            clock: self.clock.unwrap_or_else(|| Arc::new(SystemClock)),
            identity: self.identity.ok_or_else(|| missing("identity_provider"))?,
            exchange: self.exchange.ok_or_else(|| missing("token_exchange"))?,
            secondary: self.secondary.ok_or_else(|| missing("secondary_provider"))?,
            navigator: self.navigator.ok_or_else(|| missing("navigator"))?,
            profile: Arc::new(RwLock::new(None)),
            logged_in: StatusStream::new(LoginStatus::LoggedOut, STATUS_CHANNEL_CAPACITY),
            logged_in_secondary: StatusStream::new(
                LoginStatus::LoggedOut,
                STATUS_CHANNEL_CAPACITY,
            ),
            generation: Arc::new(AtomicU64::new(0)),
            transition: Arc::new(Mutex::new(())),
            exchange_task: Arc::new(Mutex::new(None)),
        };

        manager.restore();
        Ok(manager)
    }
}

/// Login lifecycle of the application: hosted login, profile, persisted
/// session, and the secondary provider joined through a custom token.
///
/// Cloning is cheap; every clone drives the same session.
#[derive(Clone)]
pub struct SessionManager {
    storage: Arc<dyn SessionStorage>,
    clock: Arc<dyn Clock>,
    identity: Arc<dyn IdentityProvider>,
    exchange: Arc<dyn TokenExchange>,
    secondary: Arc<dyn SecondaryAuthProvider>,
    navigator: Arc<dyn Navigator>,
    profile: Arc<RwLock<Option<UserProfile>>>,
    logged_in: StatusStream<LoginStatus>,
    logged_in_secondary: StatusStream<LoginStatus>,
    /// Bumped by every logout; async chains drop their writes when it moved
    generation: Arc<AtomicU64>,
    /// Held by logout and by every commit of an async result, so a commit
    /// sees either the whole logout or none of it
    transition: Arc<Mutex<()>>,
    exchange_task: Arc<Mutex<Option<JoinHandle<()>>>>,
}

impl SessionManager {
    pub fn builder() -> SessionManagerBuilder {
        SessionManagerBuilder::default()
    }

    /// Derive the initial state from storage
    fn restore(&self) {
        let access_token = self.storage.get(ACCESS_TOKEN_KEY);

        match access_token {
            Some(access_token) if self.is_session_valid() => {
                // Load the cached profile
                let profile = self
                    .storage
                    .get(PROFILE_KEY)
                    .and_then(|raw| match serde_json::from_str::<UserProfile>(&raw) {
                        Ok(profile) => Some(profile),
                        Err(e) => {
                            warn!(error = %e, "Stored profile is unreadable");
                            None
                        }
                    });
                *write(&self.profile) = profile;

                // Update auth state
                self.set_logged_in(LoginStatus::LoggedIn);
                info!(
                    provider = self.identity.name(),
                    expires_at = stored_expiry(self.storage.as_ref()).unwrap_or_default(),
                    "Restored session from storage"
                );
                // Join the secondary provider with the restored token
                self.spawn_secondary_exchange(access_token, self.current_generation());
            }
            _ if self.has_session_artifacts() => {
                info!("Stored session expired or incomplete, clearing it");
                self.logout(true);
            }
            _ => debug!("No stored session"),
        }
    }

    fn has_session_artifacts(&self) -> bool {
        SESSION_KEYS
            .iter()
            .filter(|key| **key != REDIRECT_KEY)
            .any(|key| self.storage.get(key).is_some())
    }

    fn current_generation(&self) -> u64 {
        self.generation.load(Ordering::SeqCst)
    }

    fn is_stale(&self, generation: u64) -> bool {
        self.current_generation() != generation
    }

    fn set_logged_in(&self, status: LoginStatus) {
        debug!(%status, "Primary login status changed");
        self.logged_in.publish(status);
    }

    fn set_logged_in_secondary(&self, status: LoginStatus) {
        debug!(%status, "Secondary login status changed");
        self.logged_in_secondary.publish(status);
    }

    /// Start the hosted login. The user returns through
    /// [`handle_auth_callback`](Self::handle_auth_callback).
    ///
    /// `redirect` is where to go after login; the current path when `None`.
    pub fn login(&self, redirect: Option<&str>) -> AuthResult<()> {
        let target = match redirect {
            Some(path) if !path.is_empty() => path.to_string(),
            _ => self.navigator.current_path(),
        };
        self.storage.set(REDIRECT_KEY, &target)?;

        let url = self.identity.authorization_url()?;
        info!(provider = self.identity.name(), redirect = %target, "Starting hosted login");
        self.navigator.open_external(&url);
        Ok(())
    }

    /// Complete a login from the identity provider's redirect fragment.
    ///
    /// Never fails; the outcome is reported through the return value, the
    /// status streams and the log.
    pub async fn handle_auth_callback(&self, fragment: &str) -> CallbackOutcome {
        let generation = self.current_generation();

        let tokens = match self.identity.parse_callback(fragment) {
            Ok(Some(tokens)) => tokens,
            Ok(None) => {
                debug!("Location carries no authentication response");
                return CallbackOutcome::Ignored;
            }
            Err(e) => {
                self.clear_redirect();
                self.navigator.navigate(HOME_PATH);
                self.set_logged_in(LoginStatus::LoggedOut);
                error!(error = %e, "Identity provider callback rejected");
                return CallbackOutcome::Rejected(e);
            }
        };

        // Tokens received: drop them from the location and wait for the profile
        self.navigator.clear_fragment();
        {
            let _transition = guard(&self.transition);
            if self.is_stale(generation) {
                debug!("Logged out before the callback was handled");
                return CallbackOutcome::Superseded;
            }
            self.set_logged_in(LoginStatus::Pending);
        }

        let profile = match self.identity.user_info(&tokens.access_token).await {
            Ok(profile) => profile,
            Err(e) => {
                warn!(error = %e, "Error retrieving profile");
                return CallbackOutcome::ProfileUnavailable(e);
            }
        };

        {
            let _transition = guard(&self.transition);
            if self.is_stale(generation) {
                debug!("Logged out while the profile was in flight, dropping it");
                return CallbackOutcome::Superseded;
            }

            // Persist the session
            if let Err(e) = self.set_session(&tokens, profile) {
                error!(error = %e, "Failed to persist session");
                self.clear_session_keys();
                *write(&self.profile) = None;
                self.set_logged_in(LoginStatus::LoggedOut);
                return CallbackOutcome::PersistFailed(e);
            }
        }

        // Return to where the login started
        let target = self
            .storage
            .get(REDIRECT_KEY)
            .filter(|path| !path.is_empty())
            .unwrap_or_else(|| HOME_PATH.to_string());
        self.navigator.navigate(&target);
        self.clear_redirect();

        self.spawn_secondary_exchange(tokens.access_token, generation);
        CallbackOutcome::Authenticated
    }

    fn set_session(&self, tokens: &CallbackTokens, profile: UserProfile) -> AuthResult<()> {
        let expires_at = tokens.expires_at_millis(self.clock.now_millis());
        let encoded_profile =
            serde_json::to_string(&profile).map_err(|e| AuthError::Storage {
                key: PROFILE_KEY.to_string(),
                reason: e.to_string(),
            })?;

        self.storage.set(ACCESS_TOKEN_KEY, &tokens.access_token)?;
        self.storage.set(ID_TOKEN_KEY, &tokens.id_token)?;
        self.storage.set(EXPIRES_AT_KEY, &expires_at.to_string())?;
        self.storage.set(PROFILE_KEY, &encoded_profile)?;

        *write(&self.profile) = Some(profile);
        self.set_logged_in(LoginStatus::LoggedIn);
        info!(provider = self.identity.name(), expires_at, "Session established");
        Ok(())
    }

    fn clear_redirect(&self) {
        if let Err(e) = self.storage.remove(REDIRECT_KEY) {
            warn!(error = %e, "Failed to clear login redirect");
        }
    }

    fn clear_session_keys(&self) {
        for key in SESSION_KEYS {
            if let Err(e) = self.storage.remove(key) {
                warn!(key, error = %e, "Failed to remove session key");
            }
        }
    }

    /// End the session with both providers. Safe to call when already logged out.
    pub fn logout(&self, suppress_redirect: bool) {
        {
            let _transition = guard(&self.transition);
            // Invalidate every async chain still in flight
            self.generation.fetch_add(1, Ordering::SeqCst);

            // Clear stored and in-memory session
            self.clear_session_keys();
            *write(&self.profile) = None;

            // Update auth state
            self.set_logged_in(LoginStatus::LoggedOut);
            self.set_logged_in_secondary(LoginStatus::LoggedOut);
        }

        // Secondary sign-out is fire-and-forget
        let secondary = Arc::clone(&self.secondary);
        spawn_detached(async move {
            if let Err(e) = secondary.sign_out().await {
                warn!(provider = secondary.name(), error = %e, "Secondary sign-out failed");
            }
        });

        info!("Logged out");
        if !suppress_redirect {
            self.navigator.navigate(HOME_PATH);
        }
    }

    /// True iff a stored expiry exists and lies in the future
    pub fn is_session_valid(&self) -> bool {
        stored_expiry(self.storage.as_ref())
            .map_or(false, |expires_at| self.clock.now_millis() < expires_at)
    }

    fn spawn_secondary_exchange(&self, access_token: String, generation: u64) {
        let previous = {
            let _transition = guard(&self.transition);
            if self.is_stale(generation) {
                debug!("Logged out before the secondary exchange started");
                return;
            }
            // A failed exchange returns to the status it started from
            let previous = match self.logged_in_secondary() {
                LoginStatus::Pending => LoginStatus::LoggedOut,
                status => status,
            };
            self.set_logged_in_secondary(LoginStatus::Pending);
            previous
        };

        let manager = self.clone();
        let handle = spawn_detached(async move {
            manager
                .exchange_for_secondary(access_token, generation, previous)
                .await;
        });
        if handle.is_none() {
            self.restore_secondary(generation, previous);
        }
        *guard(&self.exchange_task) = handle;
    }

    /// Put the secondary status back after a failed exchange, unless a
    /// logout already reset it
    fn restore_secondary(&self, generation: u64, previous: LoginStatus) {
        let _transition = guard(&self.transition);
        if !self.is_stale(generation) {
            self.set_logged_in_secondary(previous);
        }
    }

    async fn exchange_for_secondary(
        &self,
        access_token: String,
        generation: u64,
        previous: LoginStatus,
    ) {
        let custom_token = match self.exchange.fetch_custom_token(&access_token).await {
            Ok(token) => token,
            Err(e) => {
                error!(error = %e, "An error occurred fetching custom token");
                self.restore_secondary(generation, previous);
                return;
            }
        };

        if self.is_stale(generation) {
            debug!("Logged out while exchanging tokens, dropping custom token");
            return;
        }

        if let Err(e) = self.secondary.sign_in_with_custom_token(&custom_token).await {
            error!(provider = self.secondary.name(), error = %e, "Could not sign in to secondary provider");
            self.restore_secondary(generation, previous);
            return;
        }

        let stale = {
            let _transition = guard(&self.transition);
            let stale = self.is_stale(generation);
            if !stale {
                self.set_logged_in_secondary(LoginStatus::LoggedIn);
            }
            stale
        };
        if stale {
            debug!("Logged out during secondary sign-in, signing out again");
            if let Err(e) = self.secondary.sign_out().await {
                warn!(provider = self.secondary.name(), error = %e, "Secondary sign-out failed");
            }
            return;
        }

        info!(provider = self.secondary.name(), "Successfully authenticated with secondary provider");
    }

    /// Whether a secondary token exchange is still running
    pub fn exchange_in_flight(&self) -> bool {
        guard(&self.exchange_task)
            .as_ref()
            .map_or(false, |handle| !handle.is_finished())
    }

    /// Wait for the latest secondary token exchange to finish
    pub async fn wait_for_secondary(&self) {
        let handle = guard(&self.exchange_task).take();
        if let Some(handle) = handle {
            if let Err(e) = handle.await {
                error!(error = %e, "Secondary exchange task failed");
            }
        }
    }

    /// Current primary login status
    pub fn logged_in(&self) -> LoginStatus {
        self.logged_in.get()
    }

    /// Current secondary login status
    pub fn logged_in_secondary(&self) -> LoginStatus {
        self.logged_in_secondary.get()
    }

    /// Primary status updates, starting with the current value
    pub fn subscribe_logged_in(&self) -> Subscriber<LoginStatus> {
        self.logged_in.subscribe()
    }

    /// Secondary status updates, starting with the current value
    pub fn subscribe_logged_in_secondary(&self) -> Subscriber<LoginStatus> {
        self.logged_in_secondary.subscribe()
    }

    pub fn profile(&self) -> Option<UserProfile> {
        read(&self.profile).clone()
    }

    /// Persisted session, whether or not it is still valid
    pub fn session(&self) -> Option<Session> {
        Session::load(self.storage.as_ref())
    }

    pub fn access_token(&self) -> Option<String> {
        self.storage.get(ACCESS_TOKEN_KEY)
    }

    /// Destination recorded by the last `login`, until it is consumed
    pub fn redirect_target(&self) -> Option<String> {
        self.storage.get(REDIRECT_KEY)
    }
}
