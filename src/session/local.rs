//! In-process auth backend for offline builds, demos and tests.
//!
//! Accounts and profiles live in a [`UserRepo`]; the Google flow is simulated by
//! [`LocalAuthBackend::approve_oauth`], which plays the consent screen.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use async_trait::async_trait;
use reqwest::Url;
use time::{Duration, OffsetDateTime};
use tokio::sync::{broadcast, RwLock};
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

use super::backend::{AuthBackend, OAuthProvider, OAuthRedirect, SessionEvent};
use crate::account::{Profile, Session, SessionUser};
use crate::auth::password::{hash_password, reject_unknown, verify_password};
use crate::auth::repo::{RepoError, UserRepo};
use crate::auth::repo_types::{Provider, User};
use crate::error::AuthError;
use crate::validation::normalize_email;

const CONSENT_URL: &str = "https://accounts.fasthack.local/authorize";
const FLOW_TTL: Duration = Duration::minutes(10);

struct PendingFlow {
    redirect_to: String,
    code: Option<(String, String)>,
    expires_at: OffsetDateTime,
}

pub struct LocalAuthBackend {
    users: UserRepo,
    sessions: RwLock<HashMap<String, Uuid>>,
    flows: RwLock<HashMap<String, PendingFlow>>,
    flow_ttl: Duration,
    events: broadcast::Sender<SessionEvent>,
    available: AtomicBool,
    session_checks: AtomicUsize,
}

impl Default for LocalAuthBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl LocalAuthBackend {
    pub fn new() -> Self {
        let (events, _) = broadcast::channel(16);
        Self {
            users: UserRepo::new(),
            sessions: RwLock::new(HashMap::new()),
            flows: RwLock::new(HashMap::new()),
            flow_ttl: FLOW_TTL,
            events,
            available: AtomicBool::new(true),
            session_checks: AtomicUsize::new(0),
        }
    }

    /// How long an unanswered consent screen stays valid.
    pub fn with_flow_ttl(mut self, ttl: Duration) -> Self {
        self.flow_ttl = ttl;
        self
    }

    /// Consent flows started but not yet exchanged or expired.
    pub async fn pending_flows(&self) -> usize {
        self.flows.read().await.len()
    }

    /// Simulates losing the network: every call fails with `RemoteUnavailable`.
    pub fn set_available(&self, available: bool) {
        self.available.store(available, Ordering::SeqCst);
    }

    /// How many times a persisted session has been checked.
    pub fn session_checks(&self) -> usize {
        self.session_checks.load(Ordering::SeqCst)
    }

    /// Expire a session as if its tokens were revoked elsewhere.
    pub async fn revoke_all(&self) {
        self.sessions.write().await.clear();
        let _ = self.events.send(SessionEvent::SignedOut);
    }

    /// Grant consent for a pending flow and return the callback URL the browser would load.
    pub async fn approve_oauth(&self, state: &str, email: &str) -> Result<String, AuthError> {
        let mut flows = self.flows.write().await;
        let flow = flows
            .get_mut(state)
            .filter(|flow| flow.expires_at > OffsetDateTime::now_utc())
            .ok_or(AuthError::Cancelled)?;
        let code = Uuid::new_v4().simple().to_string();
        flow.code = Some((code.clone(), normalize_email(email)));
        Ok(format!("{}?code={}&state={}", flow.redirect_to, code, state))
    }

    fn ensure_available(&self) -> Result<(), AuthError> {
        if self.available.load(Ordering::SeqCst) {
            Ok(())
        } else {
            Err(AuthError::remote("auth service offline"))
        }
    }

    async fn open_session(&self, user: &User) -> Session {
        let token = Uuid::new_v4().simple().to_string();
        self.sessions.write().await.insert(token.clone(), user.id);
        Session {
            user: SessionUser {
                id: user.id.to_string(),
                email: user.email.clone(),
            },
            access_token: token,
            refresh_token: None,
        }
    }

    async fn session_user(&self, session: &Session) -> Result<Uuid, AuthError> {
        self.ensure_available()?;
        self.sessions
            .read()
            .await
            .get(&session.access_token)
            .copied()
            .ok_or(AuthError::NotAuthenticated)
    }
}

#[async_trait]
impl AuthBackend for LocalAuthBackend {
    #[instrument(skip(self, password))]
    async fn sign_in(&self, email: &str, password: &str) -> Result<Session, AuthError> {
        self.ensure_available()?;
        let email = normalize_email(email);
        let Some(user) = self.users.find_by_email(&email).await else {
            reject_unknown(password);
            return Err(AuthError::InvalidCredentials);
        };
        let hash = user
            .password_hash
            .as_deref()
            .ok_or(AuthError::InvalidCredentials)?;
        if !verify_password(password, hash).map_err(AuthError::remote)? {
            warn!(%email, "local sign-in rejected");
            return Err(AuthError::InvalidCredentials);
        }
        Ok(self.open_session(&user).await)
    }

    #[instrument(skip(self, password))]
    async fn sign_up(&self, email: &str, password: &str) -> Result<Session, AuthError> {
        self.ensure_available()?;
        let email = normalize_email(email);
        let hash = hash_password(password).map_err(AuthError::remote)?;
        let user = match self.users.create(&email, &hash).await {
            Ok(u) => u,
            Err(RepoError::EmailTaken) => return Err(AuthError::AccountExists),
            Err(e) => return Err(AuthError::remote(e)),
        };
        if let Err(e) = self
            .users
            .insert_profile(user.id, Profile::new(user.id.to_string(), user.email.clone()))
            .await
        {
            debug!(error = %e, "initial profile already present");
        }
        info!(user_id = %user.id, "local account created");
        Ok(self.open_session(&user).await)
    }

    async fn sign_out(&self, session: &Session) -> Result<(), AuthError> {
        self.ensure_available()?;
        self.sessions.write().await.remove(&session.access_token);
        Ok(())
    }

    async fn get_session(&self, session: &Session) -> Result<Session, AuthError> {
        self.session_checks.fetch_add(1, Ordering::SeqCst);
        self.session_user(session).await?;
        Ok(session.clone())
    }

    async fn start_oauth(
        &self,
        provider: OAuthProvider,
        redirect_to: &str,
    ) -> Result<OAuthRedirect, AuthError> {
        self.ensure_available()?;
        let state = Uuid::new_v4().simple().to_string();
        let url = Url::parse_with_params(
            CONSENT_URL,
            &[
                ("provider", "google"),
                ("state", state.as_str()),
                ("redirect_uri", redirect_to),
            ],
        )
        .map_err(AuthError::remote)?;
        let now = OffsetDateTime::now_utc();
        let mut flows = self.flows.write().await;
        flows.retain(|_, flow| flow.expires_at > now);
        flows.insert(
            state.clone(),
            PendingFlow {
                redirect_to: redirect_to.to_string(),
                code: None,
                expires_at: now + self.flow_ttl,
            },
        );
        debug!(?provider, %state, pending = flows.len(), "oauth flow started");
        Ok(OAuthRedirect {
            url: url.to_string(),
            state,
        })
    }

    async fn exchange_code(&self, code: &str, state: &str) -> Result<Session, AuthError> {
        self.ensure_available()?;
        let flow = self
            .flows
            .write()
            .await
            .remove(state)
            .filter(|flow| flow.expires_at > OffsetDateTime::now_utc())
            .ok_or(AuthError::Cancelled)?;
        let Some((expected, email)) = flow.code else {
            return Err(AuthError::Cancelled);
        };
        if expected != code {
            warn!(%state, "oauth code mismatch");
            return Err(AuthError::InvalidCredentials);
        }

        let user = self
            .users
            .upsert_oauth(Provider::Google, &format!("local-{email}"), &email, true)
            .await
            .map_err(AuthError::remote)?;
        if self.users.get_profile(user.id).await.is_none() {
            let _ = self
                .users
                .insert_profile(user.id, Profile::new(user.id.to_string(), user.email.clone()))
                .await;
        }
        Ok(self.open_session(&user).await)
    }

    async fn fetch_profile(&self, session: &Session) -> Result<Option<Profile>, AuthError> {
        let user_id = self.session_user(session).await?;
        Ok(self.users.get_profile(user_id).await)
    }

    async fn insert_profile(&self, session: &Session, profile: &Profile) -> Result<Profile, AuthError> {
        let user_id = self.session_user(session).await?;
        match self.users.insert_profile(user_id, profile.clone()).await {
            Ok(p) => Ok(p),
            Err(RepoError::ProfileExists) => self
                .users
                .get_profile(user_id)
                .await
                .ok_or(AuthError::NotAuthenticated),
            Err(e) => Err(AuthError::remote(e)),
        }
    }

    async fn upsert_profile(&self, session: &Session, profile: &Profile) -> Result<Profile, AuthError> {
        let user_id = self.session_user(session).await?;
        let mut profile = profile.clone();
        profile.id = user_id.to_string();
        Ok(self.users.upsert_profile(user_id, profile).await)
    }

    fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.events.subscribe()
    }
}
