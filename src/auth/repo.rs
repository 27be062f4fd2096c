//! In-memory account, profile and revocation tables.

use std::collections::{HashMap, HashSet};

use time::OffsetDateTime;
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::account::Profile;
use crate::auth::repo_types::{ProfileRow, Provider, User};

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum RepoError {
    #[error("email already registered")]
    EmailTaken,
    #[error("profile already exists")]
    ProfileExists,
    #[error("email not verified by identity provider")]
    EmailUnverified,
}

#[derive(Default)]
pub struct UserRepo {
    users: RwLock<HashMap<Uuid, User>>,
    profiles: RwLock<HashMap<Uuid, ProfileRow>>,
    revoked: RwLock<HashSet<Uuid>>,
}

impl UserRepo {
    pub fn new() -> Self {
        Self::default()
    }

    /// Find a user by (already normalized) email.
    pub async fn find_by_email(&self, email: &str) -> Option<User> {
        self.users
            .read()
            .await
            .values()
            .find(|u| u.email == email)
            .cloned()
    }

    pub async fn find_by_id(&self, id: Uuid) -> Option<User> {
        self.users.read().await.get(&id).cloned()
    }

    /// Create a new email/password user.
    pub async fn create(&self, email: &str, password_hash: &str) -> Result<User, RepoError> {
        let mut users = self.users.write().await;
        if users.values().any(|u| u.email == email) {
            return Err(RepoError::EmailTaken);
        }
        let user = User {
            id: Uuid::new_v4(),
            email: email.to_string(),
            password_hash: Some(password_hash.to_string()),
            provider: Provider::Email,
            provider_id: None,
            created_at: OffsetDateTime::now_utc(),
        };
        users.insert(user.id, user.clone());
        Ok(user)
    }

    /// Find or create the account behind an identity-provider subject.
    ///
    /// An existing email account with the same address is linked rather than duplicated,
    /// but only when the provider has verified that address.
    pub async fn upsert_oauth(
        &self,
        provider: Provider,
        provider_id: &str,
        email: &str,
        email_verified: bool,
    ) -> Result<User, RepoError> {
        let mut users = self.users.write().await;
        let subject = users
            .values()
            .find(|u| u.provider == provider && u.provider_id.as_deref() == Some(provider_id))
            .map(|u| u.id);
        let id = match subject {
            Some(id) => Some(id),
            None => {
                let owner = users.values().find(|u| u.email == email).map(|u| u.id);
                if owner.is_some() && !email_verified {
                    return Err(RepoError::EmailTaken);
                }
                owner
            }
        };
        if let Some(user) = id.and_then(|id| users.get_mut(&id)) {
            if email_verified {
                user.email = email.to_string();
            }
            if user.provider_id.is_none() {
                user.provider_id = Some(provider_id.to_string());
            }
            return Ok(user.clone());
        }
        if !email_verified {
            return Err(RepoError::EmailUnverified);
        }
        let user = User {
            id: Uuid::new_v4(),
            email: email.to_string(),
            password_hash: None,
            provider,
            provider_id: Some(provider_id.to_string()),
            created_at: OffsetDateTime::now_utc(),
        };
        users.insert(user.id, user.clone());
        Ok(user)
    }

    /// Select a profile by user id.
    pub async fn get_profile(&self, user_id: Uuid) -> Option<Profile> {
        self.profiles
            .read()
            .await
            .get(&user_id)
            .map(|row| row.profile.clone())
    }

    pub async fn insert_profile(&self, user_id: Uuid, profile: Profile) -> Result<Profile, RepoError> {
        let mut profiles = self.profiles.write().await;
        if profiles.contains_key(&user_id) {
            return Err(RepoError::ProfileExists);
        }
        profiles.insert(
            user_id,
            ProfileRow {
                user_id,
                profile: profile.clone(),
                updated_at: OffsetDateTime::now_utc(),
            },
        );
        Ok(profile)
    }

    pub async fn upsert_profile(&self, user_id: Uuid, profile: Profile) -> Profile {
        self.profiles.write().await.insert(
            user_id,
            ProfileRow {
                user_id,
                profile: profile.clone(),
                updated_at: OffsetDateTime::now_utc(),
            },
        );
        profile
    }

    pub async fn revoke(&self, token_id: Uuid) {
        self.revoked.write().await.insert(token_id);
    }

    pub async fn is_revoked(&self, token_id: Uuid) -> bool {
        self.revoked.read().await.contains(&token_id)
    }
}
