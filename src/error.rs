use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Result alias used throughout the session layer
pub type AuthResult<T> = Result<T, AuthError>;

/// Error codes for programmatic handling
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Hash)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCode {
    // Identity provider callback
    CallbackRejected,

    // Profile retrieval
    ProfileFetchFailed,

    // Secondary provider
    TokenExchangeFailed,
    SecondarySignInFailed,

    // Plumbing
    StorageFailed,
    HttpRequestFailed,

    // Configuration related errors
    ConfigInvalid,
    ConfigMissing,
}

/// Broad error categories, one per recovery strategy of the session manager
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Hash)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCategory {
    /// Reset to logged out and redirect home
    Callback,
    /// Leave the user unauthenticated
    Profile,
    /// Leave the secondary session unset
    Exchange,
    /// Leave the secondary session unset
    SecondarySignIn,
    /// Local storage, transport or configuration failure
    Infrastructure,
}

impl fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ErrorCategory::Callback => "callback",
            ErrorCategory::Profile => "profile",
            ErrorCategory::Exchange => "exchange",
            ErrorCategory::SecondarySignIn => "secondary_sign_in",
            ErrorCategory::Infrastructure => "infrastructure",
        };
        f.write_str(name)
    }
}

/// Session layer error types using thiserror
#[derive(Error, Debug, Clone, PartialEq)]
pub enum AuthError {
    /// The identity provider redirected back with an error or a malformed fragment
    #[error("Error authenticating: {error}{}", description.as_deref().map(|d| format!(" ({d})")).unwrap_or_default())]
    Callback {
        error: String,
        description: Option<String>,
    },

    #[error("Error retrieving profile: {reason}")]
    ProfileFetch { reason: String },

    #[error("An error occurred fetching custom token: {reason}")]
    TokenExchange { reason: String, status: Option<u16> },

    #[error("{code} Could not sign in to secondary provider: {message}")]
    SecondarySignIn { code: String, message: String },

    #[error("Storage operation failed for key '{key}': {reason}")]
    Storage { key: String, reason: String },

    #[error("HTTP request failed: {reason}")]
    Http { reason: String },

    #[error("Invalid configuration: {reason}")]
    ConfigInvalid { reason: String },

    #[error("Missing configuration: {field}")]
    ConfigMissing { field: String },
}

impl AuthError {
    /// Shorthand for a callback error without description
    pub fn callback(error: impl Into<String>) -> Self {
        AuthError::Callback {
            error: error.into(),
            description: None,
        }
    }

    /// Error code for this error
    pub fn code(&self) -> ErrorCode {
        match self {
            AuthError::Callback { .. } => ErrorCode::CallbackRejected,
            AuthError::ProfileFetch { .. } => ErrorCode::ProfileFetchFailed,
            AuthError::TokenExchange { .. } => ErrorCode::TokenExchangeFailed,
            AuthError::SecondarySignIn { .. } => ErrorCode::SecondarySignInFailed,
            AuthError::Storage { .. } => ErrorCode::StorageFailed,
            AuthError::Http { .. } => ErrorCode::HttpRequestFailed,
            AuthError::ConfigInvalid { .. } => ErrorCode::ConfigInvalid,
            AuthError::ConfigMissing { .. } => ErrorCode::ConfigMissing,
        }
    }

    /// Category deciding how the session manager recovers
    pub fn category(&self) -> ErrorCategory {
        match self {
            AuthError::Callback { .. } => ErrorCategory::Callback,
            AuthError::ProfileFetch { .. } => ErrorCategory::Profile,
            AuthError::TokenExchange { .. } => ErrorCategory::Exchange,
            AuthError::SecondarySignIn { .. } => ErrorCategory::SecondarySignIn,
            AuthError::Storage { .. }
            | AuthError::Http { .. }
            | AuthError::ConfigInvalid { .. }
            | AuthError::ConfigMissing { .. } => ErrorCategory::Infrastructure,
        }
    }
}

impl From<anyhow::Error> for AuthError {
    fn from(err: anyhow::Error) -> Self {
        AuthError::Http {
            reason: err.to_string(),
        }
    }
}

impl From<url::ParseError> for AuthError {
    fn from(err: url::ParseError) -> Self {
        AuthError::ConfigInvalid {
            reason: format!("invalid URL: {}", err),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_callback_error_display() {
        let err = AuthError::Callback {
            error: "access_denied".to_string(),
            description: Some("User cancelled".to_string()),
        };
        assert_eq!(
            err.to_string(),
            "Error authenticating: access_denied (User cancelled)"
        );
        assert_eq!(
            AuthError::callback("invalid_state").to_string(),
            "Error authenticating: invalid_state"
        );
    }

    #[test]
    fn test_codes_and_categories() {
        let exchange = AuthError::TokenExchange {
            reason: "HTTP 500".to_string(),
            status: Some(500),
        };
        assert_eq!(exchange.code(), ErrorCode::TokenExchangeFailed);
        assert_eq!(exchange.category(), ErrorCategory::Exchange);

        let storage = AuthError::Storage {
            key: "profile".to_string(),
            reason: "disk full".to_string(),
        };
        assert_eq!(storage.category(), ErrorCategory::Infrastructure);
        assert_eq!(
            serde_json::to_string(&storage.code()).unwrap(),
            "\"storage_failed\""
        );
    }
}
