use std::collections::BTreeMap;

use async_trait::async_trait;
use time::OffsetDateTime;
use tokio::sync::Mutex;

use crate::auth::{
    repo::UserRepository,
    repo_types::{NewUser, RepoError, User},
};

#[derive(Default)]
struct Inner {
    last_id: i64,
    users: BTreeMap<i64, User>,
}

impl Inner {
    fn email_taken(&self, email: &str, except: Option<i64>) -> bool {
        self.users
            .values()
            .any(|u| u.email == email && Some(u.id) != except)
    }
}

/// Process-local user store used when no database is configured.
///
/// Every operation runs under one lock, which gives the same
/// check-then-insert atomicity the unique index gives in Postgres.
#[derive(Default)]
pub struct InMemoryUserRepository {
    inner: Mutex<Inner>,
}

impl InMemoryUserRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl UserRepository for InMemoryUserRepository {
    async fn create_user(&self, new_user: NewUser) -> Result<User, RepoError> {
        let mut inner = self.inner.lock().await;
        if inner.email_taken(&new_user.email, None) {
            return Err(RepoError::DuplicateEmail);
        }
        inner.last_id += 1;
        let user = User {
            id: inner.last_id,
            email: new_user.email,
            password_hash: new_user.password_hash,
            first_name: new_user.first_name,
            last_name: new_user.last_name,
            is_active: true,
            created_at: OffsetDateTime::now_utc(),
        };
        inner.users.insert(user.id, user.clone());
        Ok(user)
    }

    async fn find_by_email(&self, email: &str) -> Result<Option<User>, RepoError> {
        let inner = self.inner.lock().await;
        Ok(inner.users.values().find(|u| u.email == email).cloned())
    }

    async fn find_by_id(&self, id: i64) -> Result<Option<User>, RepoError> {
        let inner = self.inner.lock().await;
        Ok(inner.users.get(&id).cloned())
    }

    async fn save(&self, user: &User) -> Result<(), RepoError> {
        let mut inner = self.inner.lock().await;
        if inner.email_taken(&user.email, Some(user.id)) {
            return Err(RepoError::DuplicateEmail);
        }
        let stored = inner.users.get_mut(&user.id).ok_or(RepoError::NotFound)?;
        // id and created_at stay as first written
        stored.email = user.email.clone();
        stored.password_hash = user.password_hash.clone();
        stored.first_name = user.first_name.clone();
        stored.last_name = user.last_name.clone();
        stored.is_active = user.is_active;
        Ok(())
    }

    async fn list(&self) -> Result<Vec<User>, RepoError> {
        let inner = self.inner.lock().await;
        Ok(inner.users.values().cloned().collect())
    }
}
