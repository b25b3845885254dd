use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use serde::Deserialize;
use serde_json::json;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};
use url::Url;

use crate::auth::providers::SecondaryAuthProvider;
use crate::config::SecondaryConfig;
use crate::error::{AuthError, AuthResult};
use crate::http_client::HttpClient;

const PROVIDER_NAME: &str = "firebase";

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SignInResponse {
    id_token: String,
    refresh_token: Option<String>,
    /// Seconds, sent as a string
    expires_in: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ErrorEnvelope {
    error: ErrorBody,
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    code: Option<u16>,
    message: String,
}

/// Credential held after a successful custom-token sign-in
#[derive(Clone)]
pub struct SecondaryCredential {
    pub id_token: String,
    pub refresh_token: Option<String>,
    pub expires_at: Option<DateTime<Utc>>,
}

impl std::fmt::Debug for SecondaryCredential {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SecondaryCredential")
            .field("expires_at", &self.expires_at)
            .finish_non_exhaustive()
    }
}

/// Secondary provider signing in through the custom-token REST call
pub struct FirebaseAuthProvider {
    http: Arc<dyn HttpClient>,
    config: SecondaryConfig,
    credential: RwLock<Option<SecondaryCredential>>,
}

impl FirebaseAuthProvider {
    pub fn new(config: SecondaryConfig, http: Arc<dyn HttpClient>) -> Self {
        Self {
            http,
            config,
            credential: RwLock::new(None),
        }
    }

    fn sign_in_url(&self) -> AuthResult<Url> {
        let mut url = Url::parse(&format!(
            "{}/accounts:signInWithCustomToken",
            self.config.endpoint.trim_end_matches('/')
        ))?;
        url.query_pairs_mut().append_pair("key", &self.config.api_key);
        Ok(url)
    }

    /// Credential of the signed-in user, if any
    pub async fn current_credential(&self) -> Option<SecondaryCredential> {
        self.credential.read().await.clone()
    }
}

/// Absolute expiry for an `expiresIn` value; `None` when it is unreadable or out of range
fn credential_expiry(raw: &str) -> Option<DateTime<Utc>> {
    let expiry = raw
        .parse::<i64>()
        .ok()
        .and_then(Duration::try_seconds)
        .and_then(|lifetime| Utc::now().checked_add_signed(lifetime));
    if expiry.is_none() {
        warn!(expires_in = raw, "Ignoring unusable credential lifetime");
    }
    expiry
}

/// Map a REST error body to an `auth/...` style code
fn sign_in_error(status: u16, body: &str) -> AuthError {
    match serde_json::from_str::<ErrorEnvelope>(body) {
        Ok(envelope) => {
            let message = envelope.error.message;
            let slug = message
                .split([' ', ':'])
                .next()
                .unwrap_or_default()
                .to_lowercase()
                .replace('_', "-");
            AuthError::SecondarySignIn {
                code: format!("auth/{}", slug),
                message: format!(
                    "{} (HTTP {})",
                    message,
                    envelope.error.code.unwrap_or(status)
                ),
            }
        }
        Err(_) => AuthError::SecondarySignIn {
            code: "auth/internal-error".to_string(),
            message: format!("HTTP {}: {}", status, body),
        },
    }
}

#[async_trait]
impl SecondaryAuthProvider for FirebaseAuthProvider {
    fn name(&self) -> &str {
        PROVIDER_NAME
    }

    async fn sign_in_with_custom_token(&self, custom_token: &str) -> AuthResult<()> {
        let mut headers = HashMap::new();
        headers.insert("Content-Type".to_string(), "application/json".to_string());
        let body = json!({ "token": custom_token, "returnSecureToken": true }).to_string();

        let url = self.sign_in_url()?;
        let response = self
            .http
            .post(url.as_str(), headers, body)
            .await
            .map_err(|e| AuthError::SecondarySignIn {
                code: "auth/network-request-failed".to_string(),
                message: e.to_string(),
            })?;

        if !response.is_success() {
            return Err(sign_in_error(response.status(), response.body()));
        }

        let parsed: SignInResponse = response.json().map_err(|e| AuthError::SecondarySignIn {
            code: "auth/internal-error".to_string(),
            message: format!("unexpected response body: {}", e),
        })?;

        let expires_at = parsed.expires_in.as_deref().and_then(credential_expiry);

        *self.credential.write().await = Some(SecondaryCredential {
            id_token: parsed.id_token,
            refresh_token: parsed.refresh_token,
            expires_at,
        });

        info!(provider = PROVIDER_NAME, "Signed in with custom token");
        Ok(())
    }

    async fn sign_out(&self) -> AuthResult<()> {
        if self.credential.write().await.take().is_some() {
            info!(provider = PROVIDER_NAME, "Signed out");
        } else {
            debug!(provider = PROVIDER_NAME, "Sign-out requested while not signed in");
        }
        Ok(())
    }
}
