//! Auth backend talking to the FastHack API over HTTP.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{RequestBuilder, Response, StatusCode, Url};
use serde::de::DeserializeOwned;
use tokio::sync::broadcast;
use tracing::{debug, instrument, warn};

use super::backend::{AuthBackend, OAuthProvider, OAuthRedirect, SessionEvent};
use crate::account::{Profile, Session, SessionUser};
use crate::auth::dto::{
    AuthResponse, LoginRequest, OAuthExchangeRequest, OAuthStartResponse, RefreshRequest,
    RegisterRequest,
};
use crate::error::AuthError;

pub struct RemoteAuthBackend {
    http: reqwest::Client,
    base_url: String,
    events: broadcast::Sender<SessionEvent>,
}

impl From<AuthResponse> for Session {
    fn from(r: AuthResponse) -> Self {
        Session {
            user: SessionUser {
                id: r.user.id.to_string(),
                email: r.user.email,
            },
            access_token: r.access_token,
            refresh_token: Some(r.refresh_token),
        }
    }
}

/// Maps a non-success response: 401 means `unauthorized`, 409 an existing account,
/// anything else is treated as the service being unavailable.
async fn read<T: DeserializeOwned>(resp: Response, unauthorized: AuthError) -> Result<T, AuthError> {
    let status = resp.status();
    if status.is_success() {
        return resp.json::<T>().await.map_err(AuthError::remote);
    }
    let body = resp.text().await.unwrap_or_default();
    debug!(%status, %body, "auth api error");
    Err(match status {
        StatusCode::UNAUTHORIZED | StatusCode::BAD_REQUEST => unauthorized,
        StatusCode::CONFLICT => AuthError::AccountExists,
        _ => AuthError::RemoteUnavailable(format!("{status}: {body}")),
    })
}

impl RemoteAuthBackend {
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Result<Self, AuthError> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(AuthError::remote)?;
        let (events, _) = broadcast::channel(16);
        Ok(Self {
            http,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            events,
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}/api/v1{}", self.base_url, path)
    }

    /// Relative redirects (web builds) are resolved against the API origin.
    fn absolute_redirect(&self, redirect_to: &str) -> Result<String, AuthError> {
        match Url::parse(redirect_to) {
            Ok(u) => Ok(u.to_string()),
            Err(_) => Url::parse(&self.base_url)
                .and_then(|base| base.join(redirect_to))
                .map(|u| u.to_string())
                .map_err(AuthError::remote),
        }
    }

    async fn refresh(&self, session: &Session) -> Result<Session, AuthError> {
        let refresh_token = session
            .refresh_token
            .clone()
            .ok_or(AuthError::NotAuthenticated)?;
        let resp = self
            .http
            .post(self.url("/auth/refresh"))
            .json(&RefreshRequest { refresh_token })
            .send()
            .await
            .map_err(AuthError::remote)?;
        let refreshed: Session = read::<AuthResponse>(resp, AuthError::NotAuthenticated)
            .await?
            .into();
        let _ = self.events.send(SessionEvent::TokenRefreshed(refreshed.clone()));
        Ok(refreshed)
    }

    /// Sends a bearer-authenticated request. A 401 swaps the tokens once and resends;
    /// the new session is returned alongside the response and broadcast as `TokenRefreshed`.
    async fn send_authorized<F>(
        &self,
        session: &Session,
        build: F,
    ) -> Result<(Response, Option<Session>), AuthError>
    where
        F: Fn(&str) -> RequestBuilder,
    {
        let resp = build(&session.access_token)
            .send()
            .await
            .map_err(AuthError::remote)?;
        if resp.status() != StatusCode::UNAUTHORIZED {
            return Ok((resp, None));
        }
        debug!("access token rejected; refreshing");
        let refreshed = self.refresh(session).await?;
        let resp = build(&refreshed.access_token)
            .send()
            .await
            .map_err(AuthError::remote)?;
        Ok((resp, Some(refreshed)))
    }
}

#[async_trait]
impl AuthBackend for RemoteAuthBackend {
    #[instrument(skip(self, password))]
    async fn sign_in(&self, email: &str, password: &str) -> Result<Session, AuthError> {
        let resp = self
            .http
            .post(self.url("/auth/login"))
            .json(&LoginRequest {
                email: email.to_string(),
                password: password.to_string(),
            })
            .send()
            .await
            .map_err(AuthError::remote)?;
        read::<AuthResponse>(resp, AuthError::InvalidCredentials)
            .await
            .map(Session::from)
    }

    #[instrument(skip(self, password))]
    async fn sign_up(&self, email: &str, password: &str) -> Result<Session, AuthError> {
        let resp = self
            .http
            .post(self.url("/auth/register"))
            .json(&RegisterRequest {
                email: email.to_string(),
                password: password.to_string(),
            })
            .send()
            .await
            .map_err(AuthError::remote)?;
        read::<AuthResponse>(resp, AuthError::InvalidCredentials)
            .await
            .map(Session::from)
    }

    async fn sign_out(&self, session: &Session) -> Result<(), AuthError> {
        let mut req = self
            .http
            .post(self.url("/auth/logout"))
            .bearer_auth(&session.access_token);
        if let Some(refresh_token) = &session.refresh_token {
            req = req.json(&RefreshRequest {
                refresh_token: refresh_token.clone(),
            });
        }
        let resp = req.send().await.map_err(AuthError::remote)?;
        match resp.status() {
            s if s.is_success() => Ok(()),
            StatusCode::UNAUTHORIZED => Err(AuthError::NotAuthenticated),
            s => Err(AuthError::RemoteUnavailable(s.to_string())),
        }
    }

    /// Validates the access token; an expired one is swapped via the refresh token.
    async fn get_session(&self, session: &Session) -> Result<Session, AuthError> {
        let (resp, refreshed) = self
            .send_authorized(session, |token| self.http.get(self.url("/me")).bearer_auth(token))
            .await?;
        match resp.status() {
            s if s.is_success() => Ok(refreshed.unwrap_or_else(|| session.clone())),
            StatusCode::UNAUTHORIZED => Err(AuthError::NotAuthenticated),
            s => Err(AuthError::RemoteUnavailable(s.to_string())),
        }
    }

    async fn start_oauth(
        &self,
        provider: OAuthProvider,
        redirect_to: &str,
    ) -> Result<OAuthRedirect, AuthError> {
        let route = match provider {
            OAuthProvider::Google => "/auth/oauth/google",
        };
        let redirect_to = self.absolute_redirect(redirect_to)?;
        let resp = self
            .http
            .get(self.url(route))
            .query(&[("redirect_to", redirect_to.as_str())])
            .send()
            .await
            .map_err(AuthError::remote)?;
        let start: OAuthStartResponse = read(resp, AuthError::Cancelled).await?;
        Ok(OAuthRedirect {
            url: start.url,
            state: start.state,
        })
    }

    async fn exchange_code(&self, code: &str, state: &str) -> Result<Session, AuthError> {
        let resp = self
            .http
            .post(self.url("/auth/oauth/google/exchange"))
            .json(&OAuthExchangeRequest {
                code: code.to_string(),
                state: state.to_string(),
            })
            .send()
            .await
            .map_err(AuthError::remote)?;
        read::<AuthResponse>(resp, AuthError::Cancelled)
            .await
            .map(Session::from)
    }

    async fn fetch_profile(&self, session: &Session) -> Result<Option<Profile>, AuthError> {
        let (resp, _) = self
            .send_authorized(session, |token| self.http.get(self.url("/profile")).bearer_auth(token))
            .await?;
        if resp.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        read(resp, AuthError::NotAuthenticated).await.map(Some)
    }

    async fn insert_profile(&self, session: &Session, profile: &Profile) -> Result<Profile, AuthError> {
        let (resp, refreshed) = self
            .send_authorized(session, |token| {
                self.http.post(self.url("/profile")).bearer_auth(token).json(profile)
            })
            .await?;
        if resp.status() == StatusCode::CONFLICT {
            warn!("profile already exists; reading it back");
            return self
                .fetch_profile(refreshed.as_ref().unwrap_or(session))
                .await?
                .ok_or(AuthError::NotAuthenticated);
        }
        read(resp, AuthError::NotAuthenticated).await
    }

    async fn upsert_profile(&self, session: &Session, profile: &Profile) -> Result<Profile, AuthError> {
        let (resp, _) = self
            .send_authorized(session, |token| {
                self.http.put(self.url("/profile")).bearer_auth(token).json(profile)
            })
            .await?;
        read(resp, AuthError::NotAuthenticated).await
    }

    fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.events.subscribe()
    }
}
