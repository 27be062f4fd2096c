use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

use crate::account::{Profile, Session};
use crate::error::AuthError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OAuthProvider {
    Google,
}

/// Where to send the browser, plus the state value the callback must echo.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OAuthRedirect {
    pub url: String,
    pub state: String,
}

/// Session changes the backend reports on its own, outside the caller's own requests:
/// a token refreshed in the background, a session revoked elsewhere, a sign-in
/// completed in another window.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEvent {
    SignedIn(Session),
    SignedOut,
    TokenRefreshed(Session),
}

/// Identity provider and profile table behind the app's session store.
#[async_trait]
pub trait AuthBackend: Send + Sync {
    async fn sign_in(&self, email: &str, password: &str) -> Result<Session, AuthError>;
    async fn sign_up(&self, email: &str, password: &str) -> Result<Session, AuthError>;
    async fn sign_out(&self, session: &Session) -> Result<(), AuthError>;

    /// Checks a persisted session is still valid. May hand back refreshed tokens.
    async fn get_session(&self, session: &Session) -> Result<Session, AuthError>;

    async fn start_oauth(
        &self,
        provider: OAuthProvider,
        redirect_to: &str,
    ) -> Result<OAuthRedirect, AuthError>;
    async fn exchange_code(&self, code: &str, state: &str) -> Result<Session, AuthError>;

    /// `Ok(None)` when the account has no profile row yet.
    async fn fetch_profile(&self, session: &Session) -> Result<Option<Profile>, AuthError>;
    async fn insert_profile(&self, session: &Session, profile: &Profile) -> Result<Profile, AuthError>;
    async fn upsert_profile(&self, session: &Session, profile: &Profile) -> Result<Profile, AuthError>;

    fn subscribe(&self) -> broadcast::Receiver<SessionEvent>;
}
