//! Google authorization-code flow with PKCE.
//!
//! `authorize_url` remembers the CSRF state, PKCE verifier and redirect target for ten
//! minutes; `exchange_code` consumes them, trades the code for an access token at the
//! token endpoint and reads the account from the userinfo endpoint. No identity is
//! trusted before that exchange succeeds.

use std::borrow::Cow;
use std::collections::HashMap;

use oauth2::basic::BasicClient;
use oauth2::{
    AuthUrl, AuthorizationCode, ClientId, ClientSecret, CsrfToken, EndpointNotSet, EndpointSet,
    PkceCodeChallenge, PkceCodeVerifier, RedirectUrl, Scope, TokenResponse, TokenUrl,
};
use serde::Deserialize;
use time::{Duration, OffsetDateTime};
use tokio::sync::Mutex;
use tracing::{debug, warn};

use crate::config::GoogleConfig;

const STATE_TTL: Duration = Duration::minutes(10);

/// Google user info from API.
#[derive(Debug, Clone, Deserialize)]
pub struct GoogleUser {
    pub id: String,
    pub email: String,
    #[serde(default)]
    pub verified_email: bool,
    pub name: Option<String>,
    pub picture: Option<String>,
}

#[derive(Debug, thiserror::Error)]
pub enum OAuthError {
    #[error("invalid or expired OAuth state")]
    UnknownState,
    #[error("invalid redirect target: {0}")]
    InvalidRedirect(String),
    #[error("token exchange failed: {0}")]
    Exchange(String),
    #[error("userinfo request failed: {0}")]
    UserInfo(String),
    #[error("google account email is not verified")]
    UnverifiedEmail,
}

/// OAuth client type with auth URL and token URL set.
type ConfiguredClient = oauth2::Client<
    oauth2::basic::BasicErrorResponse,
    oauth2::basic::BasicTokenResponse,
    oauth2::basic::BasicTokenIntrospectionResponse,
    oauth2::StandardRevocableToken,
    oauth2::basic::BasicRevocationErrorResponse,
    EndpointSet,
    EndpointNotSet,
    EndpointNotSet,
    EndpointNotSet,
    EndpointSet,
>;

struct PendingFlow {
    verifier: String,
    redirect: RedirectUrl,
    expires_at: OffsetDateTime,
}

pub struct GoogleOAuth {
    client: ConfiguredClient,
    userinfo_url: String,
    http: reqwest::Client,
    pending: Mutex<HashMap<String, PendingFlow>>,
}

impl GoogleOAuth {
    pub fn new(config: &GoogleConfig) -> anyhow::Result<Self> {
        let client = BasicClient::new(ClientId::new(config.client_id.clone()))
            .set_client_secret(ClientSecret::new(config.client_secret.clone()))
            .set_auth_uri(AuthUrl::new(config.auth_url.clone())?)
            .set_token_uri(TokenUrl::new(config.token_url.clone())?);

        let http = reqwest::ClientBuilder::new()
            .redirect(reqwest::redirect::Policy::none())
            .build()?;

        Ok(Self {
            client,
            userinfo_url: config.userinfo_url.clone(),
            http,
            pending: Mutex::new(HashMap::new()),
        })
    }

    /// Build the consent URL and remember the flow under its CSRF state.
    pub async fn authorize_url(&self, redirect_to: &str) -> Result<(String, String), OAuthError> {
        let redirect = RedirectUrl::new(redirect_to.to_string())
            .map_err(|e| OAuthError::InvalidRedirect(e.to_string()))?;
        let (pkce_challenge, pkce_verifier) = PkceCodeChallenge::new_random_sha256();

        let (auth_url, csrf_state) = self
            .client
            .authorize_url(CsrfToken::new_random)
            .add_scope(Scope::new("openid".to_string()))
            .add_scope(Scope::new("email".to_string()))
            .add_scope(Scope::new("profile".to_string()))
            .add_extra_param("access_type", "offline")
            .add_extra_param("prompt", "consent")
            .set_pkce_challenge(pkce_challenge)
            .set_redirect_uri(Cow::Borrowed(&redirect))
            .url();

        let state = csrf_state.secret().clone();
        let now = OffsetDateTime::now_utc();
        let mut pending = self.pending.lock().await;
        pending.retain(|_, flow| flow.expires_at > now);
        pending.insert(
            state.clone(),
            PendingFlow {
                verifier: pkce_verifier.secret().clone(),
                redirect,
                expires_at: now + STATE_TTL,
            },
        );
        debug!(pending = pending.len(), "oauth flow started");

        Ok((auth_url.to_string(), state))
    }

    /// Exchange the authorization code and fetch the Google account.
    pub async fn exchange_code(&self, code: &str, state: &str) -> Result<GoogleUser, OAuthError> {
        let flow = self
            .pending
            .lock()
            .await
            .remove(state)
            .filter(|flow| flow.expires_at > OffsetDateTime::now_utc())
            .ok_or(OAuthError::UnknownState)?;

        let token = self
            .client
            .exchange_code(AuthorizationCode::new(code.to_string()))
            .set_pkce_verifier(PkceCodeVerifier::new(flow.verifier))
            .set_redirect_uri(Cow::Owned(flow.redirect))
            .request_async(&self.http)
            .await
            .map_err(|e| {
                warn!(error = %e, "google token exchange failed");
                OAuthError::Exchange(e.to_string())
            })?;

        let user = self
            .http
            .get(&self.userinfo_url)
            .bearer_auth(token.access_token().secret())
            .send()
            .await
            .and_then(|r| r.error_for_status())
            .map_err(|e| OAuthError::UserInfo(e.to_string()))?
            .json::<GoogleUser>()
            .await
            .map_err(|e| OAuthError::UserInfo(e.to_string()))?;

        if !user.verified_email {
            warn!(google_id = %user.id, "google account without verified email");
            return Err(OAuthError::UnverifiedEmail);
        }

        Ok(user)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::{
        matchers::{header, method, path},
        Mock, MockServer, ResponseTemplate,
    };

    fn config(base: &str) -> GoogleConfig {
        GoogleConfig {
            client_id: "client-id".into(),
            client_secret: "client-secret".into(),
            auth_url: format!("{base}/authorize"),
            token_url: format!("{base}/token"),
            userinfo_url: format!("{base}/userinfo"),
        }
    }

    fn query_param(url: &str, key: &str) -> Option<String> {
        reqwest::Url::parse(url)
            .ok()?
            .query_pairs()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.into_owned())
    }

    #[tokio::test]
    async fn authorize_url_carries_pkce_and_redirect() {
        let oauth = GoogleOAuth::new(&config("https://accounts.example")).unwrap();
        let (url, state) = oauth.authorize_url("fasthack://auth/callback").await.unwrap();
        assert!(url.starts_with("https://accounts.example/authorize"));
        assert_eq!(query_param(&url, "state").as_deref(), Some(state.as_str()));
        assert_eq!(query_param(&url, "redirect_uri").as_deref(), Some("fasthack://auth/callback"));
        assert_eq!(query_param(&url, "code_challenge_method").as_deref(), Some("S256"));
        assert!(query_param(&url, "scope").unwrap().contains("email"));
    }

    #[tokio::test]
    async fn relative_redirect_is_rejected() {
        let oauth = GoogleOAuth::new(&config("https://accounts.example")).unwrap();
        let err = oauth.authorize_url("/auth/callback").await.unwrap_err();
        assert!(matches!(err, OAuthError::InvalidRedirect(_)));
    }

    #[tokio::test]
    async fn unknown_state_is_rejected() {
        let oauth = GoogleOAuth::new(&config("https://accounts.example")).unwrap();
        let err = oauth.exchange_code("code", "forged").await.unwrap_err();
        assert!(matches!(err, OAuthError::UnknownState));
    }

    #[tokio::test]
    async fn exchanges_code_and_reads_userinfo() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/token"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "access_token": "google-access",
                "token_type": "bearer",
                "expires_in": 3600
            })))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/userinfo"))
            .and(header("authorization", "Bearer google-access"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "id": "g-123",
                "email": "ada@example.com",
                "verified_email": true,
                "name": "Ada",
                "picture": "https://example.com/ada.png"
            })))
            .mount(&server)
            .await;

        let oauth = GoogleOAuth::new(&config(&server.uri())).unwrap();
        let (_, state) = oauth.authorize_url("fasthack://auth/callback").await.unwrap();
        let user = oauth.exchange_code("the-code", &state).await.unwrap();
        assert_eq!(user.id, "g-123");
        assert_eq!(user.email, "ada@example.com");

        // The state is single-use.
        let err = oauth.exchange_code("the-code", &state).await.unwrap_err();
        assert!(matches!(err, OAuthError::UnknownState));
    }

    #[tokio::test]
    async fn unverified_email_is_rejected() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/token"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "access_token": "google-access",
                "token_type": "bearer",
                "expires_in": 3600
            })))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/userinfo"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "id": "g-666",
                "email": "victim@example.com",
                "verified_email": false
            })))
            .mount(&server)
            .await;

        let oauth = GoogleOAuth::new(&config(&server.uri())).unwrap();
        let (_, state) = oauth.authorize_url("fasthack://auth/callback").await.unwrap();
        let err = oauth.exchange_code("the-code", &state).await.unwrap_err();
        assert!(matches!(err, OAuthError::UnverifiedEmail));
    }
}
