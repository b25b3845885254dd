use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use tracing::debug;
use url::Url;

use crate::error::{AuthError, AuthResult};

// Default configuration values
const DEFAULT_SCOPE: &str = "openid profile email";
const DEFAULT_RESPONSE_TYPE: &str = "token id_token";
const DEFAULT_EXCHANGE_BASE_URL: &str = "http://localhost:1337";
const DEFAULT_SECONDARY_ENDPOINT: &str = "https://identitytoolkit.googleapis.com/v1";
const DEFAULT_STORAGE_PATH: &str = "sessionbridge.session.json";

/// Main configuration struct for the session layer
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthConfig {
    /// Hosted identity provider settings
    pub identity: IdentityConfig,
    /// Backend token exchange settings
    pub exchange: ExchangeConfig,
    /// Secondary auth provider settings
    pub secondary: SecondaryConfig,
    /// File backing the durable session storage
    #[serde(default = "default_storage_path")]
    pub storage_path: PathBuf,
}

/// Hosted identity provider configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IdentityConfig {
    /// Client identifier registered with the identity provider
    #[serde(default = "default_client_id")]
    pub client_id: String,
    /// Identity provider domain, e.g. `tenant.auth0.com`
    #[serde(default = "default_domain")]
    pub domain: String,
    /// Where the identity provider redirects back to
    #[serde(default = "default_redirect_uri")]
    pub redirect_uri: String,
    /// API audience the access token is issued for
    #[serde(default = "default_audience")]
    pub audience: String,
    /// Requested scopes, space separated
    #[serde(default = "default_scope")]
    pub scope: String,
    #[serde(default = "default_response_type")]
    pub response_type: String,
}

/// Backend token exchange configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExchangeConfig {
    /// Scheme, host and port of the exchange backend
    #[serde(default = "default_exchange_base_url")]
    pub base_url: String,
}

/// Secondary auth provider configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SecondaryConfig {
    /// Web API key of the secondary project
    #[serde(default = "default_secondary_api_key")]
    pub api_key: String,
    /// Base URL of the secondary provider's REST API
    #[serde(default = "default_secondary_endpoint")]
    pub endpoint: String,
}

// Default functions
fn env_or(name: &str, fallback: &str) -> String {
    std::env::var(name)
        .ok()
        .filter(|val| !val.is_empty())
        .unwrap_or_else(|| fallback.to_string())
}

fn default_client_id() -> String {
    env_or("SESSIONBRIDGE_CLIENT_ID", "")
}

fn default_domain() -> String {
    env_or("SESSIONBRIDGE_DOMAIN", "")
}

fn default_redirect_uri() -> String {
    env_or("SESSIONBRIDGE_REDIRECT_URI", "http://localhost:4200/callback")
}

fn default_audience() -> String {
    env_or("SESSIONBRIDGE_AUDIENCE", "")
}

fn default_scope() -> String {
    env_or("SESSIONBRIDGE_SCOPE", DEFAULT_SCOPE)
}

fn default_response_type() -> String {
    DEFAULT_RESPONSE_TYPE.to_string()
}

fn default_exchange_base_url() -> String {
    env_or("SESSIONBRIDGE_EXCHANGE_URL", DEFAULT_EXCHANGE_BASE_URL)
}

fn default_secondary_api_key() -> String {
    env_or("SESSIONBRIDGE_SECONDARY_API_KEY", "")
}

fn default_secondary_endpoint() -> String {
    env_or("SESSIONBRIDGE_SECONDARY_ENDPOINT", DEFAULT_SECONDARY_ENDPOINT)
}

fn default_storage_path() -> PathBuf {
    PathBuf::from(env_or("SESSIONBRIDGE_STORAGE_PATH", DEFAULT_STORAGE_PATH))
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            identity: IdentityConfig::default(),
            exchange: ExchangeConfig::default(),
            secondary: SecondaryConfig::default(),
            storage_path: default_storage_path(),
        }
    }
}

impl Default for IdentityConfig {
    fn default() -> Self {
        Self {
            client_id: default_client_id(),
            domain: default_domain(),
            redirect_uri: default_redirect_uri(),
            audience: default_audience(),
            scope: default_scope(),
            response_type: default_response_type(),
        }
    }
}

impl Default for ExchangeConfig {
    fn default() -> Self {
        Self {
            base_url: default_exchange_base_url(),
        }
    }
}

impl Default for SecondaryConfig {
    fn default() -> Self {
        Self {
            api_key: default_secondary_api_key(),
            endpoint: default_secondary_endpoint(),
        }
    }
}

impl AuthConfig {
    /// Build a configuration from the environment, reading a `.env` file first if one exists
    pub fn from_env() -> Self {
        match dotenvy::dotenv() {
            Ok(path) => debug!(path = %path.display(), "Loaded environment from .env file"),
            Err(_) => debug!("No .env file found, using process environment"),
        }
        Self::default()
    }

    /// Check that every required field is present and well formed
    pub fn validate(&self) -> AuthResult<()> {
        self.identity.validate()?;

        Url::parse(&self.exchange.base_url).map_err(|e| AuthError::ConfigInvalid {
            reason: format!("exchange.base_url '{}': {}", self.exchange.base_url, e),
        })?;
        Url::parse(&self.secondary.endpoint).map_err(|e| AuthError::ConfigInvalid {
            reason: format!("secondary.endpoint '{}': {}", self.secondary.endpoint, e),
        })?;

        if self.secondary.api_key.is_empty() {
            return Err(AuthError::ConfigMissing {
                field: "secondary.api_key".to_string(),
            });
        }

        Ok(())
    }
}

impl IdentityConfig {
    /// Base URL of the identity provider, accepting bare domains
    pub fn base_url(&self) -> AuthResult<Url> {
        let domain = self.domain.trim_end_matches('/');
        let raw = if domain.starts_with("http://") || domain.starts_with("https://") {
            domain.to_string()
        } else {
            format!("https://{}", domain)
        };
        Ok(Url::parse(&raw)?)
    }

    pub fn validate(&self) -> AuthResult<()> {
        for (field, value) in [
            ("identity.client_id", &self.client_id),
            ("identity.domain", &self.domain),
            ("identity.redirect_uri", &self.redirect_uri),
        ] {
            if value.is_empty() {
                return Err(AuthError::ConfigMissing {
                    field: field.to_string(),
                });
            }
        }

        self.base_url()?;
        Url::parse(&self.redirect_uri).map_err(|e| AuthError::ConfigInvalid {
            reason: format!("identity.redirect_uri '{}': {}", self.redirect_uri, e),
        })?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn valid_config() -> AuthConfig {
        let mut config = AuthConfig::default();
        config.identity.client_id = "client".to_string();
        config.identity.domain = "tenant.example.com".to_string();
        config.identity.redirect_uri = "http://localhost:4200/callback".to_string();
        config.exchange.base_url = "http://localhost:1337".to_string();
        config.secondary.endpoint = DEFAULT_SECONDARY_ENDPOINT.to_string();
        config.secondary.api_key = "key".to_string();
        config
    }

    #[test]
    fn test_valid_config_passes() {
        assert!(valid_config().validate().is_ok());
    }

    #[test]
    fn test_missing_client_id_is_reported() {
        let mut config = valid_config();
        config.identity.client_id.clear();
        assert_eq!(
            config.validate(),
            Err(AuthError::ConfigMissing {
                field: "identity.client_id".to_string()
            })
        );
    }

    #[test]
    fn test_bad_exchange_url_is_invalid() {
        let mut config = valid_config();
        config.exchange.base_url = "not a url".to_string();
        assert!(matches!(
            config.validate(),
            Err(AuthError::ConfigInvalid { .. })
        ));
    }

    #[test]
    fn test_base_url_accepts_bare_domain_and_scheme() {
        let mut identity = valid_config().identity;
        assert_eq!(
            identity.base_url().unwrap().as_str(),
            "https://tenant.example.com/"
        );

        identity.domain = "http://127.0.0.1:8080/".to_string();
        assert_eq!(identity.base_url().unwrap().as_str(), "http://127.0.0.1:8080/");
    }

    #[test]
    fn test_config_deserializes_with_defaults() {
        let config: AuthConfig = serde_json::from_str(
            r#"{
                "identity": {"client_id": "abc", "domain": "tenant.example.com"},
                "exchange": {},
                "secondary": {"api_key": "k"}
            }"#,
        )
        .unwrap();
        assert_eq!(config.identity.client_id, "abc");
        assert_eq!(config.identity.response_type, DEFAULT_RESPONSE_TYPE);
        assert_eq!(config.secondary.api_key, "k");
    }
}
