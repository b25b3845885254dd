use std::collections::HashMap;
use std::fmt;

use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::auth::storage::{
    SessionStorage, ACCESS_TOKEN_KEY, EXPIRES_AT_KEY, ID_TOKEN_KEY, PROFILE_KEY,
};
use crate::error::AuthError;

/// Tokens carried by a successful identity provider redirect
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CallbackTokens {
    /// Bearer credential for downstream APIs
    pub access_token: String,
    /// Token encoding the verified identity claims
    pub id_token: String,
    /// Access token lifetime in seconds
    pub expires_in: u64,
    pub token_type: Option<String>,
    /// Anti-forgery value echoed back by the identity provider
    pub state: Option<String>,
}

impl CallbackTokens {
    /// Expiry in epoch milliseconds for tokens received at `now_millis`
    pub fn expires_at_millis(&self, now_millis: i64) -> i64 {
        let lifetime = i64::try_from(self.expires_in)
            .unwrap_or(i64::MAX)
            .saturating_mul(1000);
        now_millis.saturating_add(lifetime)
    }
}

impl fmt::Debug for CallbackTokens {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CallbackTokens")
            .field("access_token", &"<redacted>")
            .field("id_token", &"<redacted>")
            .field("expires_in", &self.expires_in)
            .field("token_type", &self.token_type)
            .field("state", &self.state)
            .finish()
    }
}

/// Unstructured user profile returned by the identity provider
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UserProfile(Map<String, Value>);

impl UserProfile {
    pub fn new(fields: Map<String, Value>) -> Self {
        Self(fields)
    }

    /// Accepts only JSON objects
    pub fn from_value(value: Value) -> Option<Self> {
        match value {
            Value::Object(fields) => Some(Self(fields)),
            _ => None,
        }
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }

    pub fn name(&self) -> Option<&str> {
        self.get("name").and_then(Value::as_str)
    }

    /// Subject identifier (`sub` claim)
    pub fn subject(&self) -> Option<&str> {
        self.get("sub").and_then(Value::as_str)
    }

    pub fn fields(&self) -> &Map<String, Value> {
        &self.0
    }
}

/// Persisted authenticated state
#[derive(Debug, Clone, PartialEq)]
pub struct Session {
    pub access_token: String,
    pub id_token: Option<String>,
    /// Expiry in epoch milliseconds
    pub expires_at: i64,
    pub profile: Option<UserProfile>,
}

impl Session {
    /// Read the session from storage; `None` without an access token and a readable expiry
    pub fn load(storage: &dyn SessionStorage) -> Option<Self> {
        let access_token = storage.get(ACCESS_TOKEN_KEY)?;
        let expires_at = stored_expiry(storage)?;
        let profile = storage
            .get(PROFILE_KEY)
            .and_then(|raw| serde_json::from_str::<UserProfile>(&raw).ok());

        Some(Self {
            access_token,
            id_token: storage.get(ID_TOKEN_KEY),
            expires_at,
            profile,
        })
    }

    pub fn is_valid_at(&self, now_millis: i64) -> bool {
        now_millis < self.expires_at
    }

    pub fn expires_at_utc(&self) -> Option<DateTime<Utc>> {
        Utc.timestamp_millis_opt(self.expires_at).single()
    }
}

/// Stored expiry in epoch milliseconds, if present and numeric
pub fn stored_expiry(storage: &dyn SessionStorage) -> Option<i64> {
    storage
        .get(EXPIRES_AT_KEY)
        .and_then(|raw| raw.trim().parse::<i64>().ok())
}

/// Login status published on the status streams
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LoginStatus {
    #[default]
    LoggedOut,
    /// Tokens received, result not known yet
    Pending,
    LoggedIn,
}

impl LoginStatus {
    pub fn is_logged_in(self) -> bool {
        self == LoginStatus::LoggedIn
    }
}

impl fmt::Display for LoginStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            LoginStatus::LoggedOut => "logged out",
            LoginStatus::Pending => "pending",
            LoginStatus::LoggedIn => "logged in",
        };
        f.write_str(name)
    }
}

/// What a callback invocation ended up doing
#[derive(Debug, Clone, PartialEq)]
pub enum CallbackOutcome {
    /// Session persisted and the user routed to the recorded destination
    Authenticated,
    /// Tokens were valid but the profile could not be fetched
    ProfileUnavailable(AuthError),
    /// The identity provider reported an error; the user was sent home
    Rejected(AuthError),
    /// The location carried no authentication response
    Ignored,
    /// A logout happened while the callback was being handled
    Superseded,
    /// The session could not be written to storage
    PersistFailed(AuthError),
}

impl CallbackOutcome {
    pub fn is_authenticated(&self) -> bool {
        matches!(self, CallbackOutcome::Authenticated)
    }
}

/// Split a URL fragment into its parameters. Accepts `#a=b`, `a=b` or a full URL.
pub fn parse_fragment(input: &str) -> HashMap<String, String> {
    let fragment = match input.split_once('#') {
        Some((_, fragment)) => fragment,
        None if input.contains("://") => "",
        None => input,
    };

    url::form_urlencoded::parse(fragment.as_bytes())
        .into_owned()
        .collect()
}
