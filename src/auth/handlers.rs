use axum::{
    extract::{FromRef, Query, State},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use tracing::{error, info, instrument, warn};
use uuid::Uuid;

use crate::{
    account::Profile,
    auth::{
        dto::{
            AuthResponse, LoginRequest, OAuthExchangeRequest, OAuthStartQuery,
            OAuthStartResponse, PublicUser, RefreshRequest, RegisterRequest,
        },
        extractors::AuthUser,
        google::OAuthError,
        jwt::JwtKeys,
        password::{hash_password, reject_unknown, verify_password},
        repo::RepoError,
        repo_types::{Provider, User},
    },
    state::AppState,
    validation::{normalize_email, validate_credentials, validate_email},
};

type ApiError = (StatusCode, String);

pub fn auth_routes() -> Router<AppState> {
    Router::new()
        .route("/auth/register", post(register))
        .route("/auth/login", post(login))
        .route("/auth/refresh", post(refresh))
        .route("/auth/logout", post(logout))
        .route("/auth/oauth/google", get(google_start))
        .route("/auth/oauth/google/exchange", post(google_exchange))
}

pub fn me_routes() -> Router<AppState> {
    Router::new()
        .route("/me", get(get_me))
        .route(
            "/profile",
            get(get_profile).post(insert_profile).put(upsert_profile),
        )
}

fn internal(e: impl std::fmt::Display) -> ApiError {
    (StatusCode::INTERNAL_SERVER_ERROR, e.to_string())
}

fn issue_tokens(state: &AppState, user: &User) -> Result<AuthResponse, ApiError> {
    let keys = JwtKeys::from_ref(state);
    let (access_token, refresh_token) = keys.sign_pair(user.id).map_err(|e| {
        error!(error = %e, "jwt sign failed");
        internal(e)
    })?;
    Ok(AuthResponse {
        access_token,
        refresh_token,
        user: PublicUser {
            id: user.id,
            email: user.email.clone(),
        },
    })
}

#[instrument(skip(state, payload))]
pub async fn register(
    State(state): State<AppState>,
    Json(mut payload): Json<RegisterRequest>,
) -> Result<Json<AuthResponse>, ApiError> {
    payload.email = normalize_email(&payload.email);

    if let Err(e) = validate_credentials(&payload.email, &payload.password) {
        warn!(email = %payload.email, error = %e, "register rejected");
        return Err((StatusCode::BAD_REQUEST, e.to_string()));
    }

    let hash = hash_password(&payload.password).map_err(|e| {
        error!(error = %e, "hash_password failed");
        internal(e)
    })?;

    let user = match state.users.create(&payload.email, &hash).await {
        Ok(u) => u,
        Err(RepoError::EmailTaken) => {
            warn!(email = %payload.email, "email already registered");
            return Err((StatusCode::CONFLICT, "Email already registered".into()));
        }
        Err(e) => {
            error!(error = %e, "create user failed");
            return Err(internal(e));
        }
    };

    // The first profile row always starts with setup pending.
    if let Err(e) = state
        .users
        .insert_profile(user.id, Profile::new(user.id.to_string(), user.email.clone()))
        .await
    {
        warn!(error = %e, user_id = %user.id, "initial profile insert skipped");
    }

    let response = issue_tokens(&state, &user)?;
    info!(user_id = %user.id, email = %user.email, "user registered");
    Ok(Json(response))
}

#[instrument(skip(state, payload))]
pub async fn login(
    State(state): State<AppState>,
    Json(mut payload): Json<LoginRequest>,
) -> Result<Json<AuthResponse>, ApiError> {
    payload.email = normalize_email(&payload.email);

    if let Err(e) = validate_email(&payload.email) {
        warn!(email = %payload.email, "invalid email");
        return Err((StatusCode::BAD_REQUEST, e.to_string()));
    }

    let Some(user) = state.users.find_by_email(&payload.email).await else {
        reject_unknown(&payload.password);
        warn!(email = %payload.email, "login unknown email");
        return Err((StatusCode::UNAUTHORIZED, "Invalid credentials".into()));
    };

    let Some(hash) = user.password_hash.as_deref() else {
        reject_unknown(&payload.password);
        warn!(user_id = %user.id, "password login for oauth-only account");
        return Err((StatusCode::UNAUTHORIZED, "Invalid credentials".into()));
    };

    let ok = verify_password(&payload.password, hash).map_err(|e| {
        error!(error = %e, "verify_password failed");
        internal(e)
    })?;

    if !ok {
        warn!(email = %payload.email, user_id = %user.id, "login invalid password");
        return Err((StatusCode::UNAUTHORIZED, "Invalid credentials".into()));
    }

    let response = issue_tokens(&state, &user)?;
    info!(user_id = %user.id, email = %user.email, "user logged in");
    Ok(Json(response))
}

#[instrument(skip(state, payload))]
pub async fn refresh(
    State(state): State<AppState>,
    Json(payload): Json<RefreshRequest>,
) -> Result<Json<AuthResponse>, ApiError> {
    let keys = JwtKeys::from_ref(&state);
    let claims = keys
        .verify_refresh(&payload.refresh_token)
        .map_err(|e| (StatusCode::UNAUTHORIZED, e.to_string()))?;

    if state.users.is_revoked(claims.jti).await {
        warn!(user_id = %claims.sub, "refresh with revoked token");
        return Err((StatusCode::UNAUTHORIZED, "Session has been signed out".into()));
    }

    let user = state
        .users
        .find_by_id(claims.sub)
        .await
        .ok_or((StatusCode::UNAUTHORIZED, "User not found".to_string()))?;

    // Refresh tokens rotate: the presented one cannot be used again.
    state.users.revoke(claims.jti).await;
    Ok(Json(issue_tokens(&state, &user)?))
}

#[instrument(skip(state, auth, body))]
pub async fn logout(
    State(state): State<AppState>,
    auth: AuthUser,
    body: Option<Json<RefreshRequest>>,
) -> StatusCode {
    state.users.revoke(auth.claims.jti).await;
    if let Some(Json(body)) = body {
        if let Ok(claims) = JwtKeys::from_ref(&state).verify_refresh(&body.refresh_token) {
            if claims.sub == auth.user_id {
                state.users.revoke(claims.jti).await;
            }
        }
    }
    info!(user_id = %auth.user_id, "user signed out");
    StatusCode::NO_CONTENT
}

#[instrument(skip(state, auth))]
pub async fn get_me(
    State(state): State<AppState>,
    auth: AuthUser,
) -> Result<Json<PublicUser>, ApiError> {
    let user = state.users.find_by_id(auth.user_id).await.ok_or_else(|| {
        error!(user_id = %auth.user_id, "user not found");
        (StatusCode::UNAUTHORIZED, "User not found".to_string())
    })?;

    Ok(Json(PublicUser {
        id: user.id,
        email: user.email,
    }))
}

#[instrument(skip(state, auth))]
pub async fn get_profile(
    State(state): State<AppState>,
    auth: AuthUser,
) -> Result<Json<Profile>, ApiError> {
    state
        .users
        .get_profile(auth.user_id)
        .await
        .map(Json)
        .ok_or((StatusCode::NOT_FOUND, "Profile not found".into()))
}

/// Pin identity fields to the authenticated user whatever the body says.
async fn owned_profile(state: &AppState, user_id: Uuid, mut profile: Profile) -> Result<Profile, ApiError> {
    let user = state
        .users
        .find_by_id(user_id)
        .await
        .ok_or((StatusCode::UNAUTHORIZED, "User not found".to_string()))?;
    profile.id = user.id.to_string();
    profile.email = user.email;
    Ok(profile)
}

#[instrument(skip(state, auth, profile))]
pub async fn insert_profile(
    State(state): State<AppState>,
    auth: AuthUser,
    Json(profile): Json<Profile>,
) -> Result<(StatusCode, Json<Profile>), ApiError> {
    let profile = owned_profile(&state, auth.user_id, profile).await?;
    match state.users.insert_profile(auth.user_id, profile).await {
        Ok(p) => Ok((StatusCode::CREATED, Json(p))),
        Err(RepoError::ProfileExists) => Err((StatusCode::CONFLICT, "Profile already exists".into())),
        Err(e) => Err(internal(e)),
    }
}

#[instrument(skip(state, auth, profile))]
pub async fn upsert_profile(
    State(state): State<AppState>,
    auth: AuthUser,
    Json(profile): Json<Profile>,
) -> Result<Json<Profile>, ApiError> {
    let profile = owned_profile(&state, auth.user_id, profile).await?;
    let saved = state.users.upsert_profile(auth.user_id, profile).await;
    info!(user_id = %auth.user_id, complete = saved.has_completed_setup, "profile saved");
    Ok(Json(saved))
}

#[instrument(skip(state))]
pub async fn google_start(
    State(state): State<AppState>,
    Query(query): Query<OAuthStartQuery>,
) -> Result<Json<OAuthStartResponse>, ApiError> {
    let google = state
        .google
        .as_ref()
        .ok_or((StatusCode::SERVICE_UNAVAILABLE, "Google sign-in is not configured".to_string()))?;

    match google.authorize_url(&query.redirect_to).await {
        Ok((url, state)) => Ok(Json(OAuthStartResponse { url, state })),
        Err(e) => {
            warn!(error = %e, "oauth start rejected");
            Err((StatusCode::BAD_REQUEST, e.to_string()))
        }
    }
}

#[instrument(skip(state, payload))]
pub async fn google_exchange(
    State(state): State<AppState>,
    Json(payload): Json<OAuthExchangeRequest>,
) -> Result<Json<AuthResponse>, ApiError> {
    let google = state
        .google
        .as_ref()
        .ok_or((StatusCode::SERVICE_UNAVAILABLE, "Google sign-in is not configured".to_string()))?;

    let account = match google.exchange_code(&payload.code, &payload.state).await {
        Ok(a) => a,
        Err(OAuthError::UnknownState) => {
            warn!("oauth exchange with unknown state");
            return Err((StatusCode::UNAUTHORIZED, "Invalid or expired OAuth state".into()));
        }
        Err(OAuthError::UnverifiedEmail) => {
            return Err((StatusCode::UNAUTHORIZED, "Google account email is not verified".into()));
        }
        Err(e) => {
            error!(error = %e, "oauth exchange failed");
            return Err((StatusCode::BAD_GATEWAY, e.to_string()));
        }
    };

    let email = normalize_email(&account.email);
    let user = match state
        .users
        .upsert_oauth(Provider::Google, &account.id, &email, account.verified_email)
        .await
    {
        Ok(u) => u,
        Err(RepoError::EmailTaken) => {
            warn!(google_id = %account.id, "unverified google email matches existing account");
            return Err((StatusCode::CONFLICT, "Email already registered".into()));
        }
        Err(e) => {
            warn!(error = %e, google_id = %account.id, "oauth account rejected");
            return Err((StatusCode::UNAUTHORIZED, e.to_string()));
        }
    };

    if state.users.get_profile(user.id).await.is_none() {
        let mut profile = Profile::new(user.id.to_string(), user.email.clone());
        profile.full_name = account.name.clone();
        profile.avatar_url = account.picture.clone();
        if let Err(e) = state.users.insert_profile(user.id, profile).await {
            warn!(error = %e, user_id = %user.id, "oauth profile insert skipped");
        }
    }

    let response = issue_tokens(&state, &user)?;
    info!(user_id = %user.id, "user signed in with google");
    Ok(Json(response))
}
