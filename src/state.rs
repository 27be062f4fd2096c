use std::sync::Arc;

use anyhow::Context;
use tracing::{info, warn};

use crate::auth::google::GoogleOAuth;
use crate::auth::repo::UserRepo;
use crate::catalog::{fallback, models::Catalog};
use crate::config::{AppConfig, JwtConfig};

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<AppConfig>,
    pub catalog: Arc<Catalog>,
    pub users: Arc<UserRepo>,
    pub google: Option<Arc<GoogleOAuth>>,
}

impl AppState {
    pub async fn init() -> anyhow::Result<Self> {
        let config = AppConfig::from_env()?;

        let catalog = match &config.catalog_path {
            Some(path) => {
                let raw = tokio::fs::read_to_string(path)
                    .await
                    .with_context(|| format!("read catalog {}", path.display()))?;
                let mut catalog: Catalog = serde_json::from_str(&raw).context("parse catalog")?;
                catalog.meals = Catalog::retain_valid_meals(catalog.meals);
                info!(
                    path = %path.display(),
                    restaurants = catalog.restaurants.len(),
                    meals = catalog.meals.len(),
                    "catalog loaded"
                );
                catalog
            }
            None => fallback::builtin().clone(),
        };

        let google = match &config.google {
            Some(g) => Some(Arc::new(GoogleOAuth::new(g).context("configure google oauth")?)),
            None => {
                warn!("GOOGLE_CLIENT_ID/GOOGLE_CLIENT_SECRET not set; google sign-in disabled");
                None
            }
        };

        Ok(Self::from_parts(Arc::new(config), Arc::new(catalog), google))
    }

    pub fn from_parts(
        config: Arc<AppConfig>,
        catalog: Arc<Catalog>,
        google: Option<Arc<GoogleOAuth>>,
    ) -> Self {
        Self {
            config,
            catalog,
            users: Arc::new(UserRepo::new()),
            google,
        }
    }

    /// State with the built-in catalog, a test JWT secret and no Google client.
    pub fn fake() -> Self {
        let config = Arc::new(AppConfig {
            host: "127.0.0.1".into(),
            port: 0,
            jwt: JwtConfig {
                secret: "test".into(),
                issuer: "test".into(),
                audience: "test".into(),
                ttl_minutes: 5,
                refresh_ttl_minutes: 60,
            },
            catalog_path: None,
            google: None,
        });
        Self::from_parts(config, Arc::new(fallback::builtin().clone()), None)
    }
}
