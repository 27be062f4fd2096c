use std::path::PathBuf;
use std::time::Duration;

use serde::Deserialize;

#[derive(Debug, Clone, Deserialize)]
pub struct JwtConfig {
    pub secret: String,
    pub issuer: String,
    pub audience: String,
    pub ttl_minutes: i64,
    pub refresh_ttl_minutes: i64,
}

/// Google OAuth client settings. Endpoints are overridable for tests.
#[derive(Debug, Clone, Deserialize)]
pub struct GoogleConfig {
    pub client_id: String,
    pub client_secret: String,
    pub auth_url: String,
    pub token_url: String,
    pub userinfo_url: String,
}

pub const GOOGLE_AUTH_URL: &str = "https://accounts.google.com/o/oauth2/v2/auth";
pub const GOOGLE_TOKEN_URL: &str = "https://oauth2.googleapis.com/token";
pub const GOOGLE_USERINFO_URL: &str = "https://www.googleapis.com/oauth2/v2/userinfo";

#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    pub host: String,
    pub port: u16,
    pub jwt: JwtConfig,
    pub catalog_path: Option<PathBuf>,
    pub google: Option<GoogleConfig>,
}

fn env_or(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.into())
}

fn env_parse<T: std::str::FromStr>(key: &str, default: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse::<T>().ok())
        .unwrap_or(default)
}

impl AppConfig {
    pub fn from_env() -> anyhow::Result<Self> {
        let jwt = JwtConfig {
            secret: std::env::var("JWT_SECRET")?,
            issuer: env_or("JWT_ISSUER", "fasthack"),
            audience: env_or("JWT_AUDIENCE", "fasthack-users"),
            ttl_minutes: env_parse("JWT_TTL_MINUTES", 60),
            refresh_ttl_minutes: env_parse("JWT_REFRESH_TTL_MINUTES", 60 * 24 * 14),
        };

        let google = match (
            std::env::var("GOOGLE_CLIENT_ID"),
            std::env::var("GOOGLE_CLIENT_SECRET"),
        ) {
            (Ok(client_id), Ok(client_secret)) => Some(GoogleConfig {
                client_id,
                client_secret,
                auth_url: env_or("GOOGLE_AUTH_URL", GOOGLE_AUTH_URL),
                token_url: env_or("GOOGLE_TOKEN_URL", GOOGLE_TOKEN_URL),
                userinfo_url: env_or("GOOGLE_USERINFO_URL", GOOGLE_USERINFO_URL),
            }),
            _ => None,
        };

        Ok(Self {
            host: env_or("APP_HOST", "0.0.0.0"),
            port: env_parse("APP_PORT", 8080),
            jwt,
            catalog_path: std::env::var("CATALOG_PATH").ok().map(PathBuf::from),
            google,
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Platform {
    Mobile,
    Web,
}

/// Settings for the app-side stores.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    pub api_base_url: String,
    pub request_timeout: Duration,
    pub restore_timeout: Duration,
    pub data_dir: PathBuf,
    pub static_fallback: bool,
    pub platform: Platform,
    pub redirect_scheme: String,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            api_base_url: "http://localhost:8080".into(),
            request_timeout: Duration::from_secs(10),
            restore_timeout: Duration::from_secs(5),
            data_dir: PathBuf::from(".fasthack"),
            static_fallback: true,
            platform: Platform::Mobile,
            redirect_scheme: "fasthack".into(),
        }
    }
}

impl ClientConfig {
    pub fn from_env() -> Self {
        let defaults = Self::default();
        let platform = match std::env::var("FASTHACK_PLATFORM").as_deref() {
            Ok("web") => Platform::Web,
            _ => Platform::Mobile,
        };
        Self {
            api_base_url: env_or("FASTHACK_API_URL", &defaults.api_base_url),
            request_timeout: Duration::from_secs(env_parse("FASTHACK_TIMEOUT_SECS", 10)),
            restore_timeout: Duration::from_secs(env_parse("FASTHACK_RESTORE_TIMEOUT_SECS", 5)),
            data_dir: std::env::var("FASTHACK_DATA_DIR")
                .map(PathBuf::from)
                .unwrap_or(defaults.data_dir),
            static_fallback: env_parse("FASTHACK_STATIC_FALLBACK", true),
            platform,
            redirect_scheme: env_or("FASTHACK_REDIRECT_SCHEME", &defaults.redirect_scheme),
        }
    }

    /// Where the identity provider sends the browser after consent.
    ///
    /// Mobile builds intercept a custom scheme; the web build uses a same-origin path.
    pub fn oauth_redirect(&self) -> String {
        match self.platform {
            Platform::Mobile => format!("{}://auth/callback", self.redirect_scheme),
            Platform::Web => "/auth/callback".to_string(),
        }
    }
}
