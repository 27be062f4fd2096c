use std::time::Duration;

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use tracing::{debug, instrument};

use crate::catalog::{fallback, Meal, Restaurant};
use crate::error::NetworkError;

/// Where the app reads meals and restaurants from. Always fetched in full.
#[async_trait]
pub trait CatalogSource: Send + Sync {
    async fn fetch_meals(&self) -> Result<Vec<Meal>, NetworkError>;
    async fn fetch_restaurants(&self) -> Result<Vec<Restaurant>, NetworkError>;
}

/// Reads `/api/v1/meals` and `/api/v1/restaurants` from the FastHack API.
#[derive(Clone)]
pub struct RemoteCatalogSource {
    http: reqwest::Client,
    base_url: String,
}

impl RemoteCatalogSource {
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Result<Self, NetworkError> {
        let http = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            http,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        })
    }

    async fn get_json<T: DeserializeOwned>(&self, path: &str) -> Result<T, NetworkError> {
        let url = format!("{}/api/v1/{}", self.base_url, path);
        let resp = self.http.get(&url).send().await?;
        let status = resp.status();
        if !status.is_success() {
            let message = resp.text().await.unwrap_or_default();
            return Err(NetworkError::Status {
                status: status.as_u16(),
                message,
            });
        }
        let body = resp.json::<T>().await?;
        debug!(%url, "catalog fetched");
        Ok(body)
    }
}

#[async_trait]
impl CatalogSource for RemoteCatalogSource {
    #[instrument(skip(self), fields(base_url = %self.base_url))]
    async fn fetch_meals(&self) -> Result<Vec<Meal>, NetworkError> {
        self.get_json("meals").await
    }

    #[instrument(skip(self), fields(base_url = %self.base_url))]
    async fn fetch_restaurants(&self) -> Result<Vec<Restaurant>, NetworkError> {
        self.get_json("restaurants").await
    }
}

/// Serves the built-in catalog. Used for offline builds and as the fallback.
#[derive(Debug, Clone, Copy, Default)]
pub struct StaticCatalogSource;

#[async_trait]
impl CatalogSource for StaticCatalogSource {
    async fn fetch_meals(&self) -> Result<Vec<Meal>, NetworkError> {
        Ok(fallback::builtin().meals.clone())
    }

    async fn fetch_restaurants(&self) -> Result<Vec<Restaurant>, NetworkError> {
        Ok(fallback::builtin().restaurants.clone())
    }
}
