use async_trait::async_trait;
use url::Url;

use crate::auth::token::{CallbackTokens, UserProfile};
use crate::error::AuthResult;

pub mod exchange;
pub mod firebase;
pub mod hosted;

pub use exchange::HttpTokenExchange;
pub use firebase::FirebaseAuthProvider;
pub use hosted::HostedLoginProvider;

/// Hosted login service issuing access and identity tokens via redirect
#[async_trait]
pub trait IdentityProvider: Send + Sync {
    /// Get the provider name
    fn name(&self) -> &str;

    /// URL of the hosted authorization page for a fresh login attempt
    fn authorization_url(&self) -> AuthResult<Url>;

    /// Parse the redirect fragment.
    ///
    /// `Ok(None)` when the fragment carries no authentication response,
    /// `Err(AuthError::Callback { .. })` when it carries an error or is malformed.
    fn parse_callback(&self, fragment: &str) -> AuthResult<Option<CallbackTokens>>;

    /// Fetch the user profile with an access token
    async fn user_info(&self, access_token: &str) -> AuthResult<UserProfile>;
}

/// Backend endpoint minting secondary-provider custom tokens
#[async_trait]
pub trait TokenExchange: Send + Sync {
    /// Trade an identity provider access token for a custom token
    async fn fetch_custom_token(&self, access_token: &str) -> AuthResult<String>;
}

/// Second authentication system joined through a custom token
#[async_trait]
pub trait SecondaryAuthProvider: Send + Sync {
    fn name(&self) -> &str;

    async fn sign_in_with_custom_token(&self, custom_token: &str) -> AuthResult<()>;

    async fn sign_out(&self) -> AuthResult<()>;
}
