use std::sync::Arc;

use async_trait::async_trait;
use serde::Deserialize;
use tracing::debug;

use crate::auth::providers::TokenExchange;
use crate::error::{AuthError, AuthResult};
use crate::http_client::{bearer_headers, HttpClient};

/// Path of the exchange endpoint below the backend base URL
pub const EXCHANGE_PATH: &str = "/auth/firebase";

#[derive(Debug, Deserialize)]
struct CustomTokenResponse {
    #[serde(rename = "firebaseToken")]
    firebase_token: String,
}

/// Token exchange over `GET /auth/firebase` with a bearer credential
pub struct HttpTokenExchange {
    http: Arc<dyn HttpClient>,
    endpoint: String,
}

impl HttpTokenExchange {
    pub fn new(http: Arc<dyn HttpClient>, base_url: &str) -> Self {
        Self {
            http,
            endpoint: format!("{}{}", base_url.trim_end_matches('/'), EXCHANGE_PATH),
        }
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

#[async_trait]
impl TokenExchange for HttpTokenExchange {
    async fn fetch_custom_token(&self, access_token: &str) -> AuthResult<String> {
        let response = self
            .http
            .get(&self.endpoint, bearer_headers(access_token))
            .await
            .map_err(|e| AuthError::TokenExchange {
                reason: e.to_string(),
                status: None,
            })?;

        if !response.is_success() {
            let status = response.status();
            return Err(AuthError::TokenExchange {
                reason: format!("HTTP {}: {}", status, response.body()),
                status: Some(status),
            });
        }

        let status = response.status();
        let parsed: CustomTokenResponse =
            response.json().map_err(|e| AuthError::TokenExchange {
                reason: format!("unexpected response body: {}", e),
                status: Some(status),
            })?;

        debug!(endpoint = %self.endpoint, "Received custom token");
        Ok(parsed.firebase_token)
    }
}
