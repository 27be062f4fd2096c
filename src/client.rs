//! Wires the app-side stores together the way the screens use them.

use std::sync::Arc;

use anyhow::Context;
use tokio::task::JoinHandle;
use tracing::info;

use crate::catalog::{Meal, Restaurant};
use crate::config::ClientConfig;
use crate::geo::{Location, LocationProvider};
use crate::session::{AuthBackend, AuthSession, RemoteAuthBackend};
use crate::store::{
    CatalogSource, DataStore, FileStorage, KeyValueStorage, RemoteCatalogSource, UserStore,
};

pub struct AppContext {
    pub config: ClientConfig,
    pub data: DataStore,
    pub user: UserStore,
    pub auth: Arc<AuthSession>,
}

impl AppContext {
    /// Remote API for data and auth, preferences on disk under `data_dir`.
    pub fn bootstrap(config: ClientConfig) -> anyhow::Result<Self> {
        let storage = FileStorage::open(&config.data_dir)
            .with_context(|| format!("open data dir {}", config.data_dir.display()))?;
        let source = RemoteCatalogSource::new(&config.api_base_url, config.request_timeout)
            .context("build catalog client")?;
        let backend = RemoteAuthBackend::new(&config.api_base_url, config.request_timeout)
            .context("build auth client")?;
        info!(api = %config.api_base_url, platform = ?config.platform, "app context ready");
        Ok(Self::from_parts(
            config,
            Arc::new(source),
            Arc::new(backend),
            Arc::new(storage),
        ))
    }

    pub fn from_parts(
        config: ClientConfig,
        source: Arc<dyn CatalogSource>,
        backend: Arc<dyn AuthBackend>,
        storage: Arc<dyn KeyValueStorage>,
    ) -> Self {
        let auth = Arc::new(AuthSession::new(backend, storage.clone(), &config));
        Self {
            data: DataStore::new(source, config.static_fallback),
            user: UserStore::open(storage),
            auth,
            config,
        }
    }

    /// Launch sequence: restore the session, follow backend events, load the catalog.
    pub async fn start(&self) -> JoinHandle<()> {
        self.auth.initialize().await;
        let listener = self.auth.spawn_event_listener();
        self.data.fetch_data(&self.user.snapshot()).await;
        listener
    }

    pub async fn refresh_location(&self, provider: &dyn LocationProvider) -> Option<Location> {
        let location = self.user.refresh_location(provider).await;
        let snapshot = self.user.snapshot();
        self.data.update_nearby_restaurants(
            snapshot.location.as_ref(),
            snapshot.preferences.is_premium,
        );
        location
    }

    pub fn set_selected_tags<I, S>(&self, tags: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.user.set_selected_tags(tags);
        self.recompute_views();
    }

    /// Premium unlocks hidden meals and restaurants, so both views are rebuilt.
    pub fn set_premium_status(&self, is_premium: bool) {
        self.user.set_premium_status(is_premium);
        self.recompute_views();
    }

    pub fn favorite_meals(&self) -> Vec<(Meal, Restaurant)> {
        self.data.favorite_meals(&self.user.state().favorites)
    }

    pub fn meals_for_restaurant(&self, restaurant_id: &str) -> Vec<Meal> {
        let is_premium = self.user.snapshot().preferences.is_premium;
        self.data.get_meals_by_restaurant(restaurant_id, is_premium)
    }

    fn recompute_views(&self) {
        let snapshot = self.user.snapshot();
        let prefs = &snapshot.preferences;
        self.data
            .filter_meals_by_tags(&prefs.selected_tags, prefs.is_premium);
        self.data
            .update_nearby_restaurants(snapshot.location.as_ref(), prefs.is_premium);
    }
}
