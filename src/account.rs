//! Session and profile records shared by the app-side session store and the auth service.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionUser {
    pub id: String,
    pub email: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Session {
    pub user: SessionUser,
    pub access_token: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub refresh_token: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Profile {
    pub id: String,
    pub email: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub avatar_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub full_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub favorite_restaurants: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dietary_preferences: Option<Vec<String>>,
    #[serde(default)]
    pub has_completed_setup: bool,
}

impl Profile {
    /// Fresh profile for a new account; setup is always pending.
    pub fn new(id: impl Into<String>, email: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            email: email.into(),
            avatar_url: None,
            full_name: None,
            favorite_restaurants: None,
            dietary_preferences: None,
            has_completed_setup: false,
        }
    }

    pub fn for_user(user: &SessionUser) -> Self {
        Self::new(user.id.clone(), user.email.clone())
    }
}

/// Partial profile edit. Present fields replace the current values.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProfileUpdate {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub avatar_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub full_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub favorite_restaurants: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dietary_preferences: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub has_completed_setup: Option<bool>,
}

impl ProfileUpdate {
    pub fn is_empty(&self) -> bool {
        self == &ProfileUpdate::default()
    }

    /// Shallow merge onto `profile`; identity fields are never touched.
    pub fn apply_to(self, mut profile: Profile) -> Profile {
        if let Some(v) = self.avatar_url {
            profile.avatar_url = Some(v);
        }
        if let Some(v) = self.full_name {
            profile.full_name = Some(v);
        }
        if let Some(v) = self.favorite_restaurants {
            profile.favorite_restaurants = Some(v);
        }
        if let Some(v) = self.dietary_preferences {
            profile.dietary_preferences = Some(v);
        }
        if let Some(v) = self.has_completed_setup {
            profile.has_completed_setup = v;
        }
        profile
    }
}
