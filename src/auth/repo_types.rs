use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use uuid::Uuid;

use crate::account::Profile;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Provider {
    Email,
    Google,
}

/// Account record held by the auth service.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    pub id: Uuid,                      // unique user ID
    pub email: String,                 // normalized email
    #[serde(skip_serializing)]
    pub password_hash: Option<String>, // Argon2 hash, absent for OAuth-only accounts
    pub provider: Provider,
    pub provider_id: Option<String>,   // subject at the identity provider
    pub created_at: OffsetDateTime,
}

/// Profile row keyed by user id.
#[derive(Debug, Clone)]
pub struct ProfileRow {
    pub user_id: Uuid,
    pub profile: Profile,
    pub updated_at: OffsetDateTime,
}
