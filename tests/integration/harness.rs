//! Shared setup: a mock server standing in for every remote service

use std::path::PathBuf;
use std::sync::Arc;

use mockito::{Matcher, Mock, Server, ServerGuard};
use serde_json::json;
use url::Url;

use sessionbridge_lib::{AppState, AuthConfig, MemoryNavigator};

pub const API_KEY: &str = "test-key";
pub const CUSTOM_TOKEN: &str = "custom-token";

pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter("sessionbridge_lib=debug")
        .with_test_writer()
        .try_init();
}

/// One mock server plus a session file of its own
pub struct TestEnv {
    pub server: ServerGuard,
    pub storage_path: PathBuf,
}

impl TestEnv {
    pub async fn new() -> Self {
        init_tracing();
        Self {
            server: Server::new_async().await,
            storage_path: std::env::temp_dir()
                .join(format!("sessionbridge-it-{}.json", uuid::Uuid::new_v4())),
        }
    }

    pub fn config(&self) -> AuthConfig {
        let mut config = AuthConfig::default();
        config.identity.client_id = "test-client".to_string();
        config.identity.domain = self.server.url();
        config.identity.audience = "https://api.example.com".to_string();
        config.exchange.base_url = self.server.url();
        config.secondary.endpoint = self.server.url();
        config.secondary.api_key = API_KEY.to_string();
        config.storage_path = self.storage_path.clone();
        config
    }

    /// Wire a fresh application, as a new process run would
    pub fn app(&self) -> (AppState, Arc<MemoryNavigator>) {
        let navigator = Arc::new(MemoryNavigator::new("/home"));
        let app = AppState::new(self.config(), navigator.clone()).unwrap();
        (app, navigator)
    }

    pub fn mock_profile(&mut self, access_token: &str, status: usize) -> Mock {
        let body = if status == 200 {
            json!({ "sub": "auth0|42", "name": "X" }).to_string()
        } else {
            json!({ "error": "invalid_token" }).to_string()
        };
        self.server
            .mock("GET", "/userinfo")
            .match_header("authorization", format!("Bearer {}", access_token).as_str())
            .with_status(status)
            .with_header("content-type", "application/json")
            .with_body(body)
    }

    pub fn mock_exchange(&mut self, access_token: &str, status: usize) -> Mock {
        let body = if status == 200 {
            json!({ "firebaseToken": CUSTOM_TOKEN }).to_string()
        } else {
            "exchange unavailable".to_string()
        };
        self.server
            .mock("GET", "/auth/firebase")
            .match_header("authorization", format!("Bearer {}", access_token).as_str())
            .with_status(status)
            .with_body(body)
    }

    pub fn mock_secondary_sign_in(&mut self, status: usize) -> Mock {
        let body = if status == 200 {
            json!({
                "idToken": "fb-id",
                "refreshToken": "fb-refresh",
                "expiresIn": "3600"
            })
            .to_string()
        } else {
            json!({
                "error": { "code": status, "message": "INVALID_CUSTOM_TOKEN" }
            })
            .to_string()
        };
        self.server
            .mock("POST", "/accounts:signInWithCustomToken")
            .match_query(Matcher::UrlEncoded("key".into(), API_KEY.into()))
            .match_body(Matcher::PartialJson(
                json!({ "token": CUSTOM_TOKEN, "returnSecureToken": true }),
            ))
            .with_status(status)
            .with_header("content-type", "application/json")
            .with_body(body)
    }
}

impl Drop for TestEnv {
    fn drop(&mut self) {
        let _ = std::fs::remove_file(&self.storage_path);
    }
}

/// Start a login and build the redirect the identity provider would send back
pub fn login_and_redirect(app: &AppState, navigator: &MemoryNavigator, redirect: Option<&str>) -> String {
    app.session.login(redirect).unwrap();
    let authorize: Url = navigator.external_requests().pop().unwrap();
    let state = authorize
        .query_pairs()
        .find(|(key, _)| key == "state")
        .map(|(_, value)| value.into_owned())
        .unwrap();

    format!(
        "http://localhost:4200/callback#access_token=A&id_token=B&expires_in=3600&token_type=Bearer&state={}",
        state
    )
}
