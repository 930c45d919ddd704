//! Core user model and collaborator traits for identity management.
//!
//! The social login pipeline never owns user records or signs tokens itself.
//! It talks to a [`UserStore`] and a [`TokenIssuer`] through the traits in this
//! crate, so hosts can plug in their own database and session machinery.

mod store;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use thiserror::Error;
use uuid::Uuid;

pub use store::InMemoryUserStore;

#[derive(Debug, Error)]
pub enum IdentityError {
    #[error("User not found: {0}")]
    UserNotFound(Uuid),

    #[error("Token error: {0}")]
    TokenError(String),

    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),
}

pub type IdentityResult<T> = Result<T, IdentityError>;

/// Stored avatar image for a user.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Avatar {
    pub filename: String,
    pub content_type: String,
    #[serde(skip)]
    pub content: Vec<u8>,
    /// Square thumbnails keyed by edge size in pixels.
    #[serde(skip)]
    pub thumbnails: BTreeMap<u32, Vec<u8>>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct User {
    pub id: Uuid,
    pub email: String,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub is_active: bool,
    pub last_login: Option<DateTime<Utc>>,
    pub avatar: Option<Avatar>,
    pub created_at: DateTime<Utc>,
}

impl User {
    pub fn new(email: String, first_name: Option<String>, last_name: Option<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            email,
            first_name,
            last_name,
            is_active: true,
            last_login: None,
            avatar: None,
            created_at: Utc::now(),
        }
    }
}

/// Fields of a [`User`] that can be persisted individually.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum UserField {
    LastLogin,
    Avatar,
}

#[async_trait]
pub trait UserStore: Send + Sync {
    /// Fetch the user owning `email`, creating it when it does not exist yet.
    ///
    /// Returns the user and whether it was created by this call.
    async fn get_or_create(
        &self,
        email: &str,
        first_name: Option<&str>,
        last_name: Option<&str>,
    ) -> IdentityResult<(User, bool)>;

    /// Persist only `fields` of `user`.
    async fn save(&self, user: &User, fields: &[UserField]) -> IdentityResult<()>;

    async fn get(&self, id: Uuid) -> IdentityResult<User>;
}

/// Mints the platform's own session tokens for a resolved user.
pub trait TokenIssuer: Send + Sync {
    fn create_access_token(&self, user: &User) -> IdentityResult<String>;

    /// `claims` are embedded verbatim in the refresh token.
    fn create_refresh_token(
        &self,
        user: &User,
        claims: serde_json::Map<String, serde_json::Value>,
    ) -> IdentityResult<String>;
}
