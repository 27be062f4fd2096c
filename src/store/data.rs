//! Cached catalog plus the filtered and nearby views the screens render.

use std::collections::BTreeSet;
use std::sync::Arc;

use tokio::sync::watch;
use tracing::{info, instrument, warn};

use super::source::CatalogSource;
use super::user::UserSnapshot;
use super::{InFlight, OnExit};
use crate::catalog::{fallback, filters, Catalog, Meal, Restaurant};
use crate::error::NetworkError;
use crate::geo::{self, Location, DEFAULT_MAX_DISTANCE_KM};

#[derive(Debug, Clone, Default, PartialEq)]
pub struct DataState {
    pub meals: Vec<Meal>,
    pub restaurants: Vec<Restaurant>,
    pub filtered_meals: Vec<Meal>,
    pub nearby_restaurants: Vec<Restaurant>,
    pub is_loading: bool,
    pub error: Option<NetworkError>,
}

pub struct DataStore {
    source: Arc<dyn CatalogSource>,
    static_fallback: bool,
    state: watch::Sender<DataState>,
    fetching: InFlight,
}

impl DataStore {
    /// With `static_fallback` a failed fetch serves the built-in catalog instead of an error.
    pub fn new(source: Arc<dyn CatalogSource>, static_fallback: bool) -> Self {
        Self {
            source,
            static_fallback,
            state: watch::Sender::new(DataState::default()),
            fetching: InFlight::default(),
        }
    }

    pub fn state(&self) -> DataState {
        self.state.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<DataState> {
        self.state.subscribe()
    }

    fn resolve<T: Clone>(
        &self,
        what: &'static str,
        fetched: Result<Vec<T>, NetworkError>,
        builtin: &[T],
    ) -> Result<Vec<T>, NetworkError> {
        match fetched {
            Ok(items) => Ok(items),
            Err(e) if self.static_fallback => {
                warn!(error = %e, what, "remote fetch failed; serving built-in catalog");
                Ok(builtin.to_vec())
            }
            Err(e) => Err(e),
        }
    }

    /// Loads meals and restaurants, then recomputes both derived views from `user`.
    ///
    /// A second call while one is running is ignored.
    #[instrument(skip(self, user))]
    pub async fn fetch_data(&self, user: &UserSnapshot) {
        let Some(_busy) = self.fetching.try_begin() else {
            warn!("fetch_data already in progress");
            return;
        };
        self.state.send_modify(|s| {
            s.is_loading = true;
            s.error = None;
        });
        let _done = OnExit::new(|| self.state.send_modify(|s| s.is_loading = false));

        let (meals, restaurants) =
            tokio::join!(self.source.fetch_meals(), self.source.fetch_restaurants());
        let builtin = fallback::builtin();
        let fetched = self
            .resolve("meals", meals, &builtin.meals)
            .and_then(|m| Ok((m, self.resolve("restaurants", restaurants, &builtin.restaurants)?)));

        let (meals, restaurants) = match fetched {
            Ok(v) => v,
            Err(e) => {
                warn!(error = %e, "catalog fetch failed");
                self.state.send_modify(|s| s.error = Some(e));
                return;
            }
        };

        let meals = Catalog::retain_valid_meals(meals);
        info!(meals = meals.len(), restaurants = restaurants.len(), "catalog loaded");
        self.state.send_modify(|s| {
            s.meals = meals;
            s.restaurants = restaurants;
        });

        let prefs = &user.preferences;
        self.filter_meals_by_tags(&prefs.selected_tags, prefs.is_premium);
        self.update_nearby_restaurants(user.location.as_ref(), prefs.is_premium);
    }

    /// Clears the error and fetches again.
    pub async fn retry(&self, user: &UserSnapshot) {
        self.fetch_data(user).await
    }

    pub fn filter_meals_by_tags<I, S>(&self, tags: I, is_premium_user: bool)
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.state.send_modify(|s| {
            s.filtered_meals = filters::filter_meals(&s.meals, tags, is_premium_user)
                .into_iter()
                .cloned()
                .collect();
        });
    }

    /// Restaurants within the default radius, closest first. No location means no list.
    pub fn update_nearby_restaurants(&self, location: Option<&Location>, is_premium_user: bool) {
        self.state.send_modify(|s| {
            let ranked = geo::nearby(location, &s.restaurants, DEFAULT_MAX_DISTANCE_KM);
            s.nearby_restaurants = filters::visible_restaurants(ranked, is_premium_user)
                .into_iter()
                .cloned()
                .collect();
        });
    }

    pub fn get_meal_by_id(&self, id: &str) -> Option<Meal> {
        self.state.borrow().meals.iter().find(|m| m.id == id).cloned()
    }

    pub fn get_restaurant_by_id(&self, id: &str) -> Option<Restaurant> {
        self.state
            .borrow()
            .restaurants
            .iter()
            .find(|r| r.id == id)
            .cloned()
    }

    pub fn get_meals_by_restaurant(&self, restaurant_id: &str, is_premium_user: bool) -> Vec<Meal> {
        let s = self.state.borrow();
        filters::meals_for_restaurant(&s.meals, restaurant_id, is_premium_user)
            .into_iter()
            .cloned()
            .collect()
    }

    /// The filtered feed as rendered: meals whose restaurant is unknown are left out.
    pub fn visible_meals(&self) -> Vec<(Meal, Restaurant)> {
        let s = self.state.borrow();
        filters::with_restaurants(&s.filtered_meals, &s.restaurants)
            .into_iter()
            .map(|(m, r)| (m.clone(), r.clone()))
            .collect()
    }

    /// Favorited meals that are still in the catalog, each with its restaurant.
    pub fn favorite_meals(&self, favorites: &BTreeSet<String>) -> Vec<(Meal, Restaurant)> {
        let s = self.state.borrow();
        let meals = s.meals.iter().filter(|m| favorites.contains(&m.id));
        filters::with_restaurants(meals, &s.restaurants)
            .into_iter()
            .map(|(m, r)| (m.clone(), r.clone()))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::source::StaticCatalogSource;
    use crate::store::user::UserPreferences;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tokio::sync::Notify;

    struct Offline;

    /// Serves a fixed catalog, holding the meals request until released.
    struct Gated {
        catalog: Catalog,
        release: Notify,
        meal_fetches: AtomicUsize,
    }

    #[async_trait]
    impl CatalogSource for Gated {
        async fn fetch_meals(&self) -> Result<Vec<Meal>, NetworkError> {
            self.meal_fetches.fetch_add(1, Ordering::SeqCst);
            self.release.notified().await;
            Ok(self.catalog.meals.clone())
        }

        async fn fetch_restaurants(&self) -> Result<Vec<Restaurant>, NetworkError> {
            Ok(self.catalog.restaurants.clone())
        }
    }

    fn gated(catalog: Catalog) -> Arc<Gated> {
        Arc::new(Gated {
            catalog,
            release: Notify::new(),
            meal_fetches: AtomicUsize::new(0),
        })
    }

    #[async_trait]
    impl CatalogSource for Offline {
        async fn fetch_meals(&self) -> Result<Vec<Meal>, NetworkError> {
            Err(NetworkError::Transport("connection refused".into()))
        }

        async fn fetch_restaurants(&self) -> Result<Vec<Restaurant>, NetworkError> {
            Err(NetworkError::Transport("connection refused".into()))
        }
    }

    fn user(location: Option<Location>, tags: &[&str], is_premium: bool) -> UserSnapshot {
        UserSnapshot {
            location,
            preferences: UserPreferences {
                selected_tags: tags.iter().map(|t| t.to_string()).collect(),
                is_premium,
            },
        }
    }

    fn sf() -> Location {
        Location::new(37.7749, -122.4194)
    }

    #[tokio::test]
    async fn fetch_populates_views() {
        let store = DataStore::new(Arc::new(StaticCatalogSource), false);
        store.fetch_data(&user(Some(sf()), &[], false)).await;

        let s = store.state();
        assert!(!s.is_loading);
        assert!(s.error.is_none());
        assert_eq!(s.meals.len(), fallback::builtin().meals.len());
        assert!(s.filtered_meals.iter().all(|m| !m.is_premium));
        assert!(!s.nearby_restaurants.is_empty());
        assert!(s.nearby_restaurants.iter().all(|r| !r.is_premium));
        assert_eq!(s.nearby_restaurants[0].id, "chick-fil-a");
    }

    #[tokio::test]
    async fn offline_without_fallback_keeps_error_until_retry() {
        let store = DataStore::new(Arc::new(Offline), false);
        store.fetch_data(&UserSnapshot::default()).await;
        let s = store.state();
        assert!(!s.is_loading);
        assert!(matches!(s.error, Some(NetworkError::Transport(_))));
        assert!(s.meals.is_empty());
    }

    #[tokio::test]
    async fn offline_with_fallback_serves_builtin() {
        let store = DataStore::new(Arc::new(Offline), true);
        store.fetch_data(&UserSnapshot::default()).await;
        let s = store.state();
        assert!(s.error.is_none());
        assert_eq!(s.restaurants.len(), 10);
    }

    #[tokio::test]
    async fn lookups_by_id() {
        let store = DataStore::new(Arc::new(StaticCatalogSource), false);
        store.fetch_data(&UserSnapshot::default()).await;
        assert!(store.get_meal_by_id("nonexistent").is_none());
        assert_eq!(store.get_meal_by_id("cfa-1").unwrap().restaurant_id, "chick-fil-a");
        assert!(store.get_restaurant_by_id("wendys").is_some());
        assert!(store.get_meals_by_restaurant("nonexistent", true).is_empty());
        assert!(store.get_meals_by_restaurant("panera-bread", false).iter().all(|m| !m.is_premium));
    }

    #[tokio::test]
    async fn tag_filter_recomputes_view() {
        let store = DataStore::new(Arc::new(StaticCatalogSource), false);
        store.fetch_data(&UserSnapshot::default()).await;
        store.filter_meals_by_tags(["Keto"], true);
        let s = store.state();
        assert!(!s.filtered_meals.is_empty());
        assert!(s.filtered_meals.iter().all(|m| m.has_tag("Keto")));
    }

    #[tokio::test]
    async fn nearby_cleared_without_location() {
        let store = DataStore::new(Arc::new(StaticCatalogSource), false);
        store.fetch_data(&user(Some(sf()), &[], true)).await;
        assert!(!store.state().nearby_restaurants.is_empty());
        store.update_nearby_restaurants(None, true);
        assert!(store.state().nearby_restaurants.is_empty());
    }

    #[tokio::test]
    async fn favorites_skip_unknown_ids() {
        let store = DataStore::new(Arc::new(StaticCatalogSource), false);
        store.fetch_data(&UserSnapshot::default()).await;
        let favs: BTreeSet<String> = ["cfa-1", "gone"].iter().map(|s| s.to_string()).collect();
        let out = store.favorite_meals(&favs);
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].1.id, "chick-fil-a");
    }

    #[tokio::test]
    async fn concurrent_fetch_hits_source_once() {
        let source = gated(fallback::builtin().clone());
        let store = DataStore::new(source.clone(), false);
        let snapshot = UserSnapshot::default();

        tokio::join!(store.fetch_data(&snapshot), async {
            store.fetch_data(&snapshot).await;
            assert!(store.state().is_loading);
            source.release.notify_one();
        });

        assert_eq!(source.meal_fetches.load(Ordering::SeqCst), 1);
        let s = store.state();
        assert!(!s.is_loading);
        assert_eq!(s.meals.len(), fallback::builtin().meals.len());
    }

    #[tokio::test]
    async fn meals_with_unknown_restaurant_are_not_rendered() {
        let mut catalog = fallback::builtin().clone();
        let mut orphan = catalog.meals[0].clone();
        orphan.id = "orphan-1".into();
        orphan.restaurant_id = "closed-down".into();
        catalog.meals.push(orphan);

        let source = gated(catalog);
        source.release.notify_one();
        let store = DataStore::new(source, false);
        store.fetch_data(&user(None, &[], true)).await;

        assert!(store.state().filtered_meals.iter().any(|m| m.id == "orphan-1"));
        let visible = store.visible_meals();
        assert_eq!(visible.len(), fallback::builtin().meals.len());
        assert!(visible.iter().all(|(m, r)| m.id != "orphan-1" && r.id == m.restaurant_id));
    }
}
