//! App-side session store: restore on launch, sign in/up/out, OAuth callback, profile edits.

pub mod backend;
pub mod local;
pub mod remote;
mod route;

use std::sync::{Arc, Weak};
use std::time::Duration;

use reqwest::Url;
use serde::{Deserialize, Serialize};
use tokio::sync::{broadcast, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info, instrument, warn};

use crate::account::{Profile, ProfileUpdate, Session};
use crate::config::ClientConfig;
use crate::error::AuthError;
use crate::store::persist::{load_json, save_json, KeyValueStorage, AUTH_NAMESPACE};
use crate::store::{InFlight, InFlightGuard};

pub use backend::{AuthBackend, OAuthProvider, OAuthRedirect, SessionEvent};
pub use local::LocalAuthBackend;
pub use remote::RemoteAuthBackend;
pub use route::Route;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum AuthStatus {
    #[default]
    Uninitialized,
    Initializing,
    Authenticated,
    Unauthenticated,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct AuthState {
    pub status: AuthStatus,
    pub session: Option<Session>,
    pub profile: Option<Profile>,
    pub is_loading: bool,
    pub error: Option<AuthError>,
    /// `state` value of the OAuth flow waiting for its callback.
    pub pending_oauth: Option<String>,
}

impl AuthState {
    pub fn is_initialized(&self) -> bool {
        matches!(
            self.status,
            AuthStatus::Authenticated | AuthStatus::Unauthenticated
        )
    }

    pub fn is_authenticated(&self) -> bool {
        self.session.is_some()
    }
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct PersistedAuth {
    #[serde(default)]
    session: Option<Session>,
    #[serde(default)]
    profile: Option<Profile>,
}

/// Holds the single-flight slot and clears `is_loading` on the way out.
struct Busy<'a> {
    state: &'a watch::Sender<AuthState>,
    _flight: InFlightGuard<'a>,
}

impl Drop for Busy<'_> {
    fn drop(&mut self) {
        self.state.send_modify(|s| s.is_loading = false);
    }
}

pub struct AuthSession {
    backend: Arc<dyn AuthBackend>,
    storage: Arc<dyn KeyValueStorage>,
    state: watch::Sender<AuthState>,
    busy: InFlight,
    redirect_to: String,
    restore_timeout: Duration,
}

impl AuthSession {
    pub fn new(
        backend: Arc<dyn AuthBackend>,
        storage: Arc<dyn KeyValueStorage>,
        config: &ClientConfig,
    ) -> Self {
        Self {
            backend,
            storage,
            state: watch::Sender::new(AuthState::default()),
            busy: InFlight::default(),
            redirect_to: config.oauth_redirect(),
            restore_timeout: config.restore_timeout,
        }
    }

    pub fn state(&self) -> AuthState {
        self.state.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<AuthState> {
        self.state.subscribe()
    }

    pub fn route(&self) -> Route {
        Route::decide(&self.state.borrow())
    }

    fn begin(&self, op: &'static str) -> Option<Busy<'_>> {
        let Some(flight) = self.busy.try_begin() else {
            warn!(op, "auth operation already in progress; ignoring");
            return None;
        };
        self.state.send_modify(|s| {
            s.is_loading = true;
            s.error = None;
        });
        Some(Busy {
            state: &self.state,
            _flight: flight,
        })
    }

    fn load_persisted(&self) -> PersistedAuth {
        match load_json::<PersistedAuth>(self.storage.as_ref(), AUTH_NAMESPACE) {
            Ok(p) => p.unwrap_or_default(),
            Err(e) => {
                warn!(error = %e, "discarding unreadable persisted session");
                PersistedAuth::default()
            }
        }
    }

    fn persist(&self) {
        let snapshot = {
            let s = self.state.borrow();
            PersistedAuth {
                session: s.session.clone(),
                profile: s.profile.clone(),
            }
        };
        let result = if snapshot.session.is_some() {
            save_json(self.storage.as_ref(), AUTH_NAMESPACE, &snapshot)
        } else {
            self.storage.remove(AUTH_NAMESPACE)
        };
        if let Err(e) = result {
            warn!(error = %e, "persisting session failed");
        }
    }

    fn fail(&self, op: &'static str, error: AuthError) {
        warn!(op, kind = error.kind(), error = %error, "auth operation failed");
        self.state.send_modify(|s| {
            if s.session.is_none() {
                s.status = AuthStatus::Unauthenticated;
            }
            s.error = Some(error);
        });
    }

    fn establish(&self, session: Session, profile: Profile) {
        info!(user_id = %session.user.id, setup_done = profile.has_completed_setup, "session established");
        self.state.send_modify(|s| {
            s.status = AuthStatus::Authenticated;
            s.session = Some(session);
            s.profile = Some(profile);
            s.error = None;
        });
        self.persist();
    }

    fn clear_local(&self) {
        self.state.send_modify(|s| {
            s.status = AuthStatus::Unauthenticated;
            s.session = None;
            s.profile = None;
            s.pending_oauth = None;
        });
        self.persist();
    }

    /// The account's profile, creating the initial row when there is none.
    ///
    /// A failed read falls back to `cached` only when it belongs to the same user; a
    /// profile is never invented over a record that may already exist.
    async fn load_profile(&self, session: &Session, cached: Option<Profile>) -> Result<Profile, AuthError> {
        match self.backend.fetch_profile(session).await {
            Ok(Some(profile)) => Ok(profile),
            Ok(None) => {
                let fresh = Profile::for_user(&session.user);
                match self.backend.insert_profile(session, &fresh).await {
                    Ok(saved) => Ok(saved),
                    Err(e) => {
                        warn!(error = %e, "creating initial profile failed");
                        Ok(fresh)
                    }
                }
            }
            Err(e) => match cached.filter(|p| p.id == session.user.id) {
                Some(profile) => {
                    warn!(error = %e, "fetching profile failed; using cached copy");
                    Ok(profile)
                }
                None => {
                    warn!(error = %e, "fetching profile failed");
                    Err(match e {
                        AuthError::RemoteUnavailable(_) => e,
                        other => AuthError::remote(other),
                    })
                }
            },
        }
    }

    /// Finishes a sign-in whose credentials the backend accepted.
    async fn adopt(&self, op: &'static str, session: Session) {
        let cached = self.load_persisted().profile;
        match self.load_profile(&session, cached).await {
            Ok(profile) => self.establish(session, profile),
            Err(e) => self.fail(op, e),
        }
    }

    async fn restore(&self) -> Result<Option<(Session, Profile)>, AuthError> {
        let persisted = self.load_persisted();
        let Some(session) = persisted.session else {
            debug!("no persisted session");
            return Ok(None);
        };

        let session = match self.backend.get_session(&session).await {
            Ok(s) => s,
            Err(AuthError::NotAuthenticated | AuthError::InvalidCredentials) => {
                info!("persisted session expired");
                if let Err(e) = self.storage.remove(AUTH_NAMESPACE) {
                    warn!(error = %e, "clearing persisted session failed");
                }
                return Ok(None);
            }
            Err(e) => return Err(e),
        };

        let profile = self.load_profile(&session, persisted.profile).await?;
        Ok(Some((session, profile)))
    }

    /// Restores the persisted session. Runs once; later calls are no-ops.
    ///
    /// Any restore failure, including a timeout, leaves the store `Unauthenticated`.
    #[instrument(skip(self))]
    pub async fn initialize(&self) {
        if self.state.borrow().status != AuthStatus::Uninitialized {
            debug!("already initialized");
            return;
        }
        let Some(_busy) = self.begin("initialize") else {
            return;
        };
        self.state.send_modify(|s| s.status = AuthStatus::Initializing);

        let restored = match tokio::time::timeout(self.restore_timeout, self.restore()).await {
            Ok(Ok(restored)) => restored,
            Ok(Err(e)) => {
                warn!(error = %e, "session restore failed");
                None
            }
            Err(_) => {
                warn!(timeout_ms = self.restore_timeout.as_millis() as u64, "session restore timed out");
                None
            }
        };

        match restored {
            Some((session, profile)) => self.establish(session, profile),
            None => self.state.send_modify(|s| {
                s.status = AuthStatus::Unauthenticated;
                s.session = None;
                s.profile = None;
            }),
        }
    }

    #[instrument(skip(self, password))]
    pub async fn sign_in(&self, email: &str, password: &str) {
        let Some(_busy) = self.begin("sign_in") else {
            return;
        };
        match self.backend.sign_in(email, password).await {
            Ok(session) => self.adopt("sign_in", session).await,
            Err(e) => self.fail("sign_in", e),
        }
    }

    /// Creates the account. The new profile always starts with setup pending.
    #[instrument(skip(self, password))]
    pub async fn sign_up(&self, email: &str, password: &str) {
        let Some(_busy) = self.begin("sign_up") else {
            return;
        };
        match self.backend.sign_up(email, password).await {
            Ok(session) => self.adopt("sign_up", session).await,
            Err(e) => self.fail("sign_up", e),
        }
    }

    /// Starts the Google flow and returns the URL to open in the browser.
    #[instrument(skip(self))]
    pub async fn sign_in_with_google(&self) -> Option<String> {
        let _busy = self.begin("sign_in_with_google")?;
        match self
            .backend
            .start_oauth(OAuthProvider::Google, &self.redirect_to)
            .await
        {
            Ok(redirect) => {
                self.state
                    .send_modify(|s| s.pending_oauth = Some(redirect.state));
                Some(redirect.url)
            }
            Err(e) => {
                self.fail("sign_in_with_google", e);
                None
            }
        }
    }

    /// Finishes the flow from the URL the browser was sent back to.
    #[instrument(skip(self, callback_url))]
    pub async fn complete_oauth(&self, callback_url: &str) {
        let Some(_busy) = self.begin("complete_oauth") else {
            return;
        };
        let expected = self.state.borrow().pending_oauth.clone();
        self.state.send_modify(|s| s.pending_oauth = None);

        let (code, state) = match parse_callback(callback_url) {
            Ok(pair) => pair,
            Err(e) => return self.fail("complete_oauth", e),
        };
        if expected.as_deref() != Some(state.as_str()) {
            warn!("oauth callback state does not match the pending flow");
            return self.fail("complete_oauth", AuthError::Cancelled);
        }

        match self.backend.exchange_code(&code, &state).await {
            Ok(session) => self.adopt("complete_oauth", session).await,
            Err(e) => self.fail("complete_oauth", e),
        }
    }

    /// The user closed the browser without finishing.
    pub fn cancel_oauth(&self) {
        if self.state.borrow().pending_oauth.is_none() {
            return;
        }
        self.state.send_modify(|s| s.pending_oauth = None);
        self.fail("sign_in_with_google", AuthError::Cancelled);
    }

    /// Applies a change the backend reported on its own.
    pub async fn handle_session_event(&self, event: SessionEvent) {
        match event {
            SessionEvent::SignedIn(session) => {
                if self.busy.is_busy() || self.state.borrow().session.is_some() {
                    debug!("ignoring sign-in event while a session is active");
                    return;
                }
                let profile = match self.load_profile(&session, None).await {
                    Ok(p) => p,
                    Err(e) => {
                        warn!(error = %e, "ignoring sign-in event without a profile");
                        return;
                    }
                };
                if self.busy.is_busy() || self.state.borrow().session.is_some() {
                    return;
                }
                self.establish(session, profile);
            }
            SessionEvent::TokenRefreshed(session) => {
                let mut updated = false;
                self.state.send_if_modified(|s| {
                    if s.session.is_some() {
                        s.session = Some(session);
                        updated = true;
                    }
                    updated
                });
                if updated {
                    debug!("session tokens refreshed");
                    self.persist();
                }
            }
            SessionEvent::SignedOut => {
                if self.state.borrow().session.is_some() {
                    info!("signed out by backend");
                    self.clear_local();
                }
            }
        }
    }

    /// Feeds backend events into [`Self::handle_session_event`] until the session store is dropped.
    pub fn spawn_event_listener(self: &Arc<Self>) -> JoinHandle<()> {
        let weak: Weak<Self> = Arc::downgrade(self);
        let mut events = self.backend.subscribe();
        tokio::spawn(async move {
            loop {
                match events.recv().await {
                    Ok(event) => match weak.upgrade() {
                        Some(this) => this.handle_session_event(event).await,
                        None => break,
                    },
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        warn!(skipped, "session events lagged");
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
        })
    }

    /// Local state is cleared even when the backend call fails.
    #[instrument(skip(self))]
    pub async fn sign_out(&self) {
        let Some(_busy) = self.begin("sign_out") else {
            return;
        };
        let session = self.state.borrow().session.clone();
        self.clear_local();
        if let Some(session) = session {
            if let Err(e) = self.backend.sign_out(&session).await {
                warn!(error = %e, "remote sign-out failed; local session cleared anyway");
            }
        }
        info!("signed out");
    }

    #[instrument(skip(self, update))]
    pub async fn update_profile(&self, update: ProfileUpdate) {
        let Some(_busy) = self.begin("update_profile") else {
            return;
        };
        let (session, current) = {
            let s = self.state.borrow();
            (s.session.clone(), s.profile.clone())
        };
        let Some(session) = session else {
            return self.fail("update_profile", AuthError::NotAuthenticated);
        };

        let base = match current {
            Some(p) => p,
            None => match self.backend.fetch_profile(&session).await {
                Ok(Some(p)) => p,
                Ok(None) => Profile::for_user(&session.user),
                Err(e) => return self.fail("update_profile", e),
            },
        };
        let merged = update.apply_to(base);
        match self.backend.upsert_profile(&session, &merged).await {
            Ok(saved) => {
                self.state.send_modify(|s| s.profile = Some(saved));
                self.persist();
            }
            Err(e) => self.fail("update_profile", e),
        }
    }

    pub fn reset_error(&self) {
        self.state.send_modify(|s| s.error = None);
    }
}

/// `code` and `state` from an OAuth callback URL. A provider `error` means the user backed out.
fn parse_callback(callback_url: &str) -> Result<(String, String), AuthError> {
    let url = Url::parse(callback_url)
        .or_else(|_| Url::parse("http://localhost/").and_then(|base| base.join(callback_url)))
        .map_err(|_| AuthError::Cancelled)?;

    let mut code = None;
    let mut state = None;
    for (key, value) in url.query_pairs() {
        match key.as_ref() {
            "code" => code = Some(value.into_owned()),
            "state" => state = Some(value.into_owned()),
            "error" => {
                debug!(error = %value, "provider reported an error");
                return Err(AuthError::Cancelled);
            }
            _ => {}
        }
    }
    code.zip(state).ok_or(AuthError::Cancelled)
}
