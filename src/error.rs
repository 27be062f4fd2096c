use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Malformed user input, caught before any network call.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValidationError {
    #[error("Email is required")]
    EmailRequired,
    #[error("Please enter a valid email address")]
    InvalidEmail,
    #[error("Password is required")]
    PasswordRequired,
    #[error("Password must be at least 6 characters")]
    PasswordTooShort,
    #[error("Name is required")]
    NameRequired,
    #[error("Name must be at least 2 characters")]
    NameTooShort,
    #[error("Please confirm your password")]
    ConfirmPasswordRequired,
    #[error("Passwords do not match")]
    PasswordMismatch,
}

/// Auth failures surfaced to the UI through `AuthState::error`.
///
/// None of these are fatal; `RemoteUnavailable` gets a retry affordance,
/// the rest are rendered inline.
#[derive(Error, Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "detail")]
pub enum AuthError {
    #[error("Invalid email or password")]
    InvalidCredentials,
    #[error("User already exists with this email")]
    AccountExists,
    #[error("User not authenticated")]
    NotAuthenticated,
    #[error("Service unavailable: {0}")]
    RemoteUnavailable(String),
    #[error("Authentication was cancelled")]
    Cancelled,
}

impl AuthError {
    pub fn remote(e: impl std::fmt::Display) -> Self {
        AuthError::RemoteUnavailable(e.to_string())
    }

    /// Stable name used in logs and by the UI to pick a rendering.
    pub fn kind(&self) -> &'static str {
        match self {
            AuthError::InvalidCredentials => "InvalidCredentials",
            AuthError::AccountExists => "AccountExists",
            AuthError::NotAuthenticated => "NotAuthenticated",
            AuthError::RemoteUnavailable(_) => "RemoteUnavailable",
            AuthError::Cancelled => "Cancelled",
        }
    }

    pub fn is_retryable(&self) -> bool {
        matches!(self, AuthError::RemoteUnavailable(_))
    }
}

/// Remote catalog unreachable, timed out or answered garbage.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum NetworkError {
    #[error("request failed: {0}")]
    Transport(String),
    #[error("unexpected status {status}: {message}")]
    Status { status: u16, message: String },
    #[error("invalid response body: {0}")]
    Decode(String),
}

impl From<reqwest::Error> for NetworkError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_decode() {
            NetworkError::Decode(e.to_string())
        } else {
            NetworkError::Transport(e.to_string())
        }
    }
}

/// Local key-value persistence failures.
#[derive(Error, Debug)]
pub enum StorageError {
    #[error("storage io: {0}")]
    Io(#[from] std::io::Error),
    #[error("storage encoding: {0}")]
    Encoding(#[from] serde_json::Error),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn auth_error_kind_matches_variant_name() {
        assert_eq!(AuthError::InvalidCredentials.kind(), "InvalidCredentials");
        assert_eq!(AuthError::remote("timeout").kind(), "RemoteUnavailable");
        assert!(AuthError::remote("timeout").is_retryable());
        assert!(!AuthError::Cancelled.is_retryable());
    }

    #[test]
    fn validation_messages_are_user_facing() {
        assert_eq!(ValidationError::PasswordTooShort.to_string(), "Password must be at least 6 characters");
        assert_eq!(ValidationError::PasswordMismatch.to_string(), "Passwords do not match");
    }

    #[test]
    fn auth_error_serializes_with_kind_tag() {
        let json = serde_json::to_string(&AuthError::AccountExists).unwrap();
        assert!(json.contains("AccountExists"));
        let back: AuthError = serde_json::from_str(&json).unwrap();
        assert_eq!(back, AuthError::AccountExists);
    }
}
