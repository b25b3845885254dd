use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, warn};
use url::Url;
use uuid::Uuid;

use crate::auth::providers::IdentityProvider;
use crate::auth::storage::{SessionStorage, PENDING_AUTHORIZATIONS_KEY};
use crate::auth::token::{parse_fragment, CallbackTokens, UserProfile};
use crate::config::IdentityConfig;
use crate::error::{AuthError, AuthResult};
use crate::http_client::{bearer_headers, HttpClient};

const PROVIDER_NAME: &str = "hosted";
/// How long an issued `state` stays acceptable
const STATE_TTL_MINUTES: i64 = 30;

/// Login request issued to the hosted page and awaiting its redirect
#[derive(Debug, Clone, Serialize, Deserialize)]
struct PendingAuthorization {
    nonce: String,
    issued_at: DateTime<Utc>,
}

/// Hosted login page using the implicit `token id_token` response type
pub struct HostedLoginProvider {
    config: IdentityConfig,
    base_url: Url,
    http: Arc<dyn HttpClient>,
    /// Issued `state` values keyed to their nonce
    pending: DashMap<String, PendingAuthorization>,
    /// Keeps issued states across restarts when set
    storage: Option<Arc<dyn SessionStorage>>,
}

impl HostedLoginProvider {
    pub fn new(config: IdentityConfig, http: Arc<dyn HttpClient>) -> AuthResult<Self> {
        config.validate()?;
        let base_url = config.base_url()?;
        Ok(Self {
            config,
            base_url,
            http,
            pending: DashMap::new(),
            storage: None,
        })
    }

    /// Persist issued authorizations so a redirect handled by a later
    /// process run is still recognised
    pub fn with_storage(mut self, storage: Arc<dyn SessionStorage>) -> Self {
        if let Some(raw) = storage.get(PENDING_AUTHORIZATIONS_KEY) {
            match serde_json::from_str::<HashMap<String, PendingAuthorization>>(&raw) {
                Ok(stored) => self.pending.extend(stored),
                Err(e) => warn!(error = %e, "Discarding unreadable pending authorizations"),
            }
        }
        self.storage = Some(storage);
        self
    }

    fn persist_pending(&self) {
        let Some(storage) = &self.storage else {
            return;
        };
        let snapshot: HashMap<String, PendingAuthorization> = self
            .pending
            .iter()
            .map(|entry| (entry.key().clone(), entry.value().clone()))
            .collect();

        let result = if snapshot.is_empty() {
            storage.remove(PENDING_AUTHORIZATIONS_KEY)
        } else {
            match serde_json::to_string(&snapshot) {
                Ok(raw) => storage.set(PENDING_AUTHORIZATIONS_KEY, &raw),
                Err(e) => {
                    warn!(error = %e, "Failed to encode pending authorizations");
                    return;
                }
            }
        };
        if let Err(e) = result {
            warn!(error = %e, "Failed to persist pending authorizations");
        }
    }

    /// Number of issued authorizations awaiting a redirect
    pub fn pending_count(&self) -> usize {
        self.pending.len()
    }

    fn endpoint(&self, path: &str) -> AuthResult<Url> {
        Ok(self.base_url.join(path)?)
    }

    /// Drop authorizations older than the TTL; true if any were dropped
    fn prune_expired(&self) -> bool {
        let cutoff = Utc::now() - Duration::minutes(STATE_TTL_MINUTES);
        let before = self.pending.len();
        self.pending.retain(|_, pending| pending.issued_at > cutoff);
        self.pending.len() != before
    }

    /// Accept the echoed `state` exactly once
    fn consume_state(&self, state: Option<&String>) -> AuthResult<()> {
        let pruned = self.prune_expired();
        let matched = state.and_then(|state| self.pending.remove(state));
        // Storage is only touched when the table changed
        if pruned || matched.is_some() {
            self.persist_pending();
        }
        match matched {
            Some((_, pending)) => {
                debug!(nonce_len = pending.nonce.len(), "Matched authorization state");
                Ok(())
            }
            None => Err(AuthError::Callback {
                error: "invalid_state".to_string(),
                description: Some("`state` does not match any issued authorization".to_string()),
            }),
        }
    }
}

fn invalid_hash(description: &str) -> AuthError {
    AuthError::Callback {
        error: "invalid_hash".to_string(),
        description: Some(description.to_string()),
    }
}

#[async_trait]
impl IdentityProvider for HostedLoginProvider {
    fn name(&self) -> &str {
        PROVIDER_NAME
    }

    fn authorization_url(&self) -> AuthResult<Url> {
        let state = Uuid::new_v4().simple().to_string();
        let nonce = Uuid::new_v4().simple().to_string();

        let mut url = self.endpoint("authorize")?;
        url.query_pairs_mut()
            .append_pair("client_id", &self.config.client_id)
            .append_pair("response_type", &self.config.response_type)
            .append_pair("redirect_uri", &self.config.redirect_uri)
            .append_pair("audience", &self.config.audience)
            .append_pair("scope", &self.config.scope)
            .append_pair("state", &state)
            .append_pair("nonce", &nonce);

        self.prune_expired();
        self.pending.insert(
            state,
            PendingAuthorization {
                nonce,
                issued_at: Utc::now(),
            },
        );
        self.persist_pending();

        Ok(url)
    }

    fn parse_callback(&self, fragment: &str) -> AuthResult<Option<CallbackTokens>> {
        let mut params: HashMap<String, String> = parse_fragment(fragment);

        if let Some(error) = params.remove("error") {
            // Consume the state so it cannot be replayed with tokens
            if let Some(state) = params.get("state") {
                if self.pending.remove(state).is_some() {
                    self.persist_pending();
                }
            }
            return Err(AuthError::Callback {
                error,
                description: params.remove("error_description"),
            });
        }

        if !params.contains_key("access_token") && !params.contains_key("id_token") {
            return Ok(None);
        }

        self.consume_state(params.get("state"))?;

        let access_token = params
            .remove("access_token")
            .filter(|token| !token.is_empty())
            .ok_or_else(|| invalid_hash("missing access_token"))?;
        let id_token = params
            .remove("id_token")
            .filter(|token| !token.is_empty())
            .ok_or_else(|| invalid_hash("missing id_token"))?;
        let expires_in = params
            .get("expires_in")
            .and_then(|raw| raw.parse::<u64>().ok())
            .ok_or_else(|| invalid_hash("missing or malformed expires_in"))?;

        Ok(Some(CallbackTokens {
            access_token,
            id_token,
            expires_in,
            token_type: params.remove("token_type"),
            state: params.remove("state"),
        }))
    }

    async fn user_info(&self, access_token: &str) -> AuthResult<UserProfile> {
        let url = self.endpoint("userinfo")?;
        let response = self
            .http
            .get(url.as_str(), bearer_headers(access_token))
            .await
            .map_err(|e| AuthError::ProfileFetch {
                reason: e.to_string(),
            })?;

        if !response.is_success() {
            warn!(status = response.status(), "Profile endpoint refused the access token");
            return Err(AuthError::ProfileFetch {
                reason: format!("HTTP {}: {}", response.status(), response.body()),
            });
        }

        let value: Value = response.json().map_err(|e| AuthError::ProfileFetch {
            reason: format!("unexpected response body: {}", e),
        })?;

        UserProfile::from_value(value).ok_or_else(|| AuthError::ProfileFetch {
            reason: "profile is not a JSON object".to_string(),
        })
    }
}
