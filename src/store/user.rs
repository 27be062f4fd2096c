//! Device location, favorites and dietary preferences.

use std::collections::BTreeSet;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio::sync::watch;
use tracing::{debug, info, warn};

use super::persist::{load_json, save_json, KeyValueStorage, USER_NAMESPACE};
use super::InFlight;
use crate::geo::{locate, Location, LocationProvider, Permission};

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserPreferences {
    pub selected_tags: BTreeSet<String>,
    pub is_premium: bool,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct UserState {
    pub location: Option<Location>,
    pub favorites: BTreeSet<String>,
    pub preferences: UserPreferences,
    pub location_permission_granted: bool,
}

/// Read-only copy handed to other stores so they never hold a borrow of this one.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct UserSnapshot {
    pub location: Option<Location>,
    pub preferences: UserPreferences,
}

#[derive(Serialize, Deserialize, Default)]
struct Persisted {
    #[serde(default)]
    favorites: BTreeSet<String>,
    #[serde(default)]
    preferences: UserPreferences,
}

pub struct UserStore {
    storage: Arc<dyn KeyValueStorage>,
    state: watch::Sender<UserState>,
    locating: InFlight,
}

impl UserStore {
    /// Loads persisted favorites and preferences. Location is never persisted.
    pub fn open(storage: Arc<dyn KeyValueStorage>) -> Self {
        let persisted = match load_json::<Persisted>(storage.as_ref(), USER_NAMESPACE) {
            Ok(p) => p.unwrap_or_default(),
            Err(e) => {
                warn!(error = %e, "discarding unreadable user preferences");
                Persisted::default()
            }
        };
        let state = UserState {
            favorites: persisted.favorites,
            preferences: persisted.preferences,
            ..Default::default()
        };
        Self {
            storage,
            state: watch::Sender::new(state),
            locating: InFlight::default(),
        }
    }

    pub fn state(&self) -> UserState {
        self.state.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<UserState> {
        self.state.subscribe()
    }

    pub fn snapshot(&self) -> UserSnapshot {
        let s = self.state.borrow();
        UserSnapshot {
            location: s.location.clone(),
            preferences: s.preferences.clone(),
        }
    }

    fn persist(&self) {
        let persisted = {
            let s = self.state.borrow();
            Persisted {
                favorites: s.favorites.clone(),
                preferences: s.preferences.clone(),
            }
        };
        if let Err(e) = save_json(self.storage.as_ref(), USER_NAMESPACE, &persisted) {
            warn!(error = %e, "persisting user preferences failed");
        }
    }

    pub fn set_location(&self, location: Option<Location>) {
        if let Some(l) = &location {
            if !l.is_in_range() {
                warn!(latitude = l.latitude, longitude = l.longitude, "location out of range");
            }
        }
        self.state.send_modify(|s| s.location = location);
    }

    /// Adds or removes `meal_id`; returns whether it is now a favorite.
    pub fn toggle_favorite(&self, meal_id: &str) -> bool {
        let mut now_favorite = false;
        self.state.send_modify(|s| {
            now_favorite = if s.favorites.remove(meal_id) {
                false
            } else {
                s.favorites.insert(meal_id.to_string())
            };
        });
        self.persist();
        debug!(meal_id, now_favorite, "favorite toggled");
        now_favorite
    }

    pub fn is_favorite(&self, meal_id: &str) -> bool {
        self.state.borrow().favorites.contains(meal_id)
    }

    pub fn set_selected_tags<I, S>(&self, tags: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let tags: BTreeSet<String> = tags.into_iter().map(Into::into).collect();
        self.state.send_modify(|s| s.preferences.selected_tags = tags);
        self.persist();
    }

    pub fn set_premium_status(&self, is_premium: bool) {
        self.state.send_modify(|s| s.preferences.is_premium = is_premium);
        self.persist();
        info!(is_premium, "premium status changed");
    }

    pub fn set_location_permission(&self, granted: bool) {
        self.state
            .send_modify(|s| s.location_permission_granted = granted);
    }

    /// Asks the device for a fresh position. A refresh already in progress wins.
    pub async fn refresh_location(&self, provider: &dyn LocationProvider) -> Option<Location> {
        let Some(_busy) = self.locating.try_begin() else {
            warn!("location refresh already in progress");
            return self.state.borrow().location.clone();
        };

        let granted = provider.request_permission().await == Permission::Granted;
        self.set_location_permission(granted);
        if !granted {
            self.set_location(None);
            return None;
        }

        let location = locate(provider).await;
        if location.is_some() {
            self.set_location(location.clone());
        }
        location
    }
}
