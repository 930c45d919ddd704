use crate::{IdentityError, IdentityResult, User, UserField, UserStore};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::debug;
use uuid::Uuid;

/// In-memory [`UserStore`] keyed by lowercased email.
#[derive(Clone, Default)]
pub struct InMemoryUserStore {
    inner: Arc<RwLock<Users>>,
}

#[derive(Default)]
struct Users {
    by_id: HashMap<Uuid, User>,
    by_email: HashMap<String, Uuid>,
}

impl InMemoryUserStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn len(&self) -> usize {
        self.inner.read().await.by_id.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.inner.read().await.by_id.is_empty()
    }
}

#[async_trait]
impl UserStore for InMemoryUserStore {
    async fn get_or_create(
        &self,
        email: &str,
        first_name: Option<&str>,
        last_name: Option<&str>,
    ) -> IdentityResult<(User, bool)> {
        let mut users = self.inner.write().await;
        let key = email.to_lowercase();

        if let Some(user) = users.by_email.get(&key).and_then(|id| users.by_id.get(id)) {
            return Ok((user.clone(), false));
        }

        let user = User::new(
            email.to_string(),
            first_name.map(String::from),
            last_name.map(String::from),
        );
        debug!("Created user {}", user.id);

        users.by_email.insert(key, user.id);
        users.by_id.insert(user.id, user.clone());

        Ok((user, true))
    }

    async fn save(&self, user: &User, fields: &[UserField]) -> IdentityResult<()> {
        let mut users = self.inner.write().await;
        let stored = users
            .by_id
            .get_mut(&user.id)
            .ok_or(IdentityError::UserNotFound(user.id))?;

        for field in fields {
            match field {
                UserField::LastLogin => stored.last_login = user.last_login,
                UserField::Avatar => stored.avatar = user.avatar.clone(),
            }
        }

        Ok(())
    }

    async fn get(&self, id: Uuid) -> IdentityResult<User> {
        let users = self.inner.read().await;
        users.by_id.get(&id).cloned().ok_or(IdentityError::UserNotFound(id))
    }
}
