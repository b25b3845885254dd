use std::sync::Arc;

use tracing::info;

// Export modules
pub mod auth;
pub mod config;
pub mod error;
pub mod events;
pub mod http_client;

#[cfg(test)]
mod tests;

pub use auth::{
    CallbackOutcome, LoginStatus, MemoryNavigator, Navigator, Session, SessionManager,
    SessionStorage, UserProfile,
};
pub use config::AuthConfig;
pub use error::{AuthError, AuthResult, ErrorCategory, ErrorCode};
pub use events::{StatusStream, Subscriber};

use auth::providers::{FirebaseAuthProvider, HostedLoginProvider, HttpTokenExchange};
use auth::FileStorage;
use http_client::{HttpClient, ReqwestHttpClient};

/// Main application state: the session manager wired to the real services
pub struct AppState {
    /// Configuration the services were built from
    pub config: AuthConfig,
    /// The login lifecycle
    pub session: SessionManager,
}

impl AppState {
    /// Wire the hosted identity provider, the exchange backend, the secondary
    /// provider and file storage from `config`.
    ///
    /// Must run inside a tokio runtime when a stored session may be restored.
    pub fn new(config: AuthConfig, navigator: Arc<dyn Navigator>) -> AuthResult<Self> {
        config.validate()?;
        info!(
            domain = %config.identity.domain,
            exchange = %config.exchange.base_url,
            "Initializing session services"
        );

        let http: Arc<dyn HttpClient> = Arc::new(ReqwestHttpClient::new()?);
        let storage: Arc<dyn SessionStorage> = Arc::new(FileStorage::open(&config.storage_path)?);

        let identity = HostedLoginProvider::new(config.identity.clone(), Arc::clone(&http))?
            .with_storage(Arc::clone(&storage));

        let session = SessionManager::builder()
            .storage(storage)
            .identity_provider(Arc::new(identity))
            .token_exchange(Arc::new(HttpTokenExchange::new(
                Arc::clone(&http),
                &config.exchange.base_url,
            )))
            .secondary_provider(Arc::new(FirebaseAuthProvider::new(
                config.secondary.clone(),
                http,
            )))
            .navigator(navigator)
            .build()?;

        Ok(Self { config, session })
    }
}
