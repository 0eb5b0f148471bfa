use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};
use uuid::Uuid;

use super::{PostStore, StoreError, UserStore};
use crate::models::{Post, PostFilter, User};

pub(crate) fn lock<T>(mutex: &Mutex<T>) -> Result<MutexGuard<'_, T>, StoreError> {
    mutex
        .lock()
        .map_err(|_| StoreError::ConnectionPool("in-memory store lock poisoned".to_string()))
}

/// Users keyed by id; username and email uniqueness enforced on every write
#[derive(Default)]
pub struct InMemoryUserStore {
    users: Mutex<HashMap<Uuid, User>>,
}

impl InMemoryUserStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn conflict(users: &HashMap<Uuid, User>, candidate: &User) -> Option<StoreError> {
        users.values().filter(|u| u.id != candidate.id).find_map(|u| {
            if u.username == candidate.username {
                Some(StoreError::UniqueViolation("users_username_key".to_string()))
            } else if u.email == candidate.email {
                Some(StoreError::UniqueViolation("users_email_key".to_string()))
            } else {
                None
            }
        })
    }
}

#[async_trait]
impl UserStore for InMemoryUserStore {
    async fn get_by_id(&self, id: Uuid) -> Result<Option<User>, StoreError> {
        Ok(lock(&self.users)?.get(&id).cloned())
    }

    async fn get_by_email(&self, email: &str) -> Result<Option<User>, StoreError> {
        Ok(lock(&self.users)?.values().find(|u| u.email == email).cloned())
    }

    async fn get_by_username(&self, username: &str) -> Result<Option<User>, StoreError> {
        Ok(lock(&self.users)?
            .values()
            .find(|u| u.username == username)
            .cloned())
    }

    async fn exists_by_email(&self, email: &str) -> Result<bool, StoreError> {
        Ok(lock(&self.users)?.values().any(|u| u.email == email))
    }

    async fn exists_by_username(&self, username: &str) -> Result<bool, StoreError> {
        Ok(lock(&self.users)?.values().any(|u| u.username == username))
    }

    async fn create(&self, user: &User) -> Result<(), StoreError> {
        let mut users = lock(&self.users)?;
        if users.contains_key(&user.id) {
            return Err(StoreError::UniqueViolation("users_pkey".to_string()));
        }
        if let Some(err) = Self::conflict(&users, user) {
            return Err(err);
        }
        users.insert(user.id, user.clone());
        Ok(())
    }

    async fn update(&self, user: &User) -> Result<bool, StoreError> {
        let mut users = lock(&self.users)?;
        if let Some(err) = Self::conflict(&users, user) {
            return Err(err);
        }
        match users.get_mut(&user.id) {
            Some(existing) => {
                existing.username = user.username.clone();
                existing.email = user.email.clone();
                existing.password_hash = user.password_hash.clone();
                existing.updated_at = Utc::now();
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn delete(&self, id: Uuid) -> Result<bool, StoreError> {
        Ok(lock(&self.users)?.remove(&id).is_some())
    }

    async fn update_last_login(&self, id: Uuid, at: DateTime<Utc>) -> Result<(), StoreError> {
        if let Some(user) = lock(&self.users)?.get_mut(&id) {
            user.last_login = Some(at);
        }
        Ok(())
    }

    async fn set_active(&self, id: Uuid, active: bool) -> Result<bool, StoreError> {
        match lock(&self.users)?.get_mut(&id) {
            Some(user) => {
                user.is_active = active;
                user.updated_at = Utc::now();
                Ok(true)
            }
            None => Ok(false),
        }
    }
}

/// Posts in insertion order
#[derive(Default)]
pub struct InMemoryPostStore {
    posts: Mutex<Vec<Post>>,
}

impl InMemoryPostStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl PostStore for InMemoryPostStore {
    async fn create(&self, post: &Post) -> Result<(), StoreError> {
        let mut posts = lock(&self.posts)?;
        if posts.iter().any(|p| p.id == post.id) {
            return Err(StoreError::UniqueViolation("posts_pkey".to_string()));
        }
        let mut stored = post.clone();
        stored.author = None;
        posts.push(stored);
        Ok(())
    }

    async fn get_by_id(&self, id: Uuid) -> Result<Option<Post>, StoreError> {
        Ok(lock(&self.posts)?.iter().find(|p| p.id == id).cloned())
    }

    async fn list(
        &self,
        filter: PostFilter,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<Post>, StoreError> {
        Ok(lock(&self.posts)?
            .iter()
            .rev()
            .filter(|p| filter.matches(p))
            .skip(offset.max(0) as usize)
            .take(limit.max(0) as usize)
            .cloned()
            .collect())
    }

    async fn count(&self, filter: PostFilter) -> Result<i64, StoreError> {
        Ok(lock(&self.posts)?.iter().filter(|p| filter.matches(p)).count() as i64)
    }

    async fn update(&self, post: &Post) -> Result<bool, StoreError> {
        let mut posts = lock(&self.posts)?;
        match posts.iter_mut().find(|p| p.id == post.id) {
            Some(existing) => {
                existing.title = post.title.clone();
                existing.content = post.content.clone();
                existing.is_published = post.is_published;
                existing.updated_at = post.updated_at;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn delete(&self, id: Uuid) -> Result<bool, StoreError> {
        let mut posts = lock(&self.posts)?;
        let before = posts.len();
        posts.retain(|p| p.id != id);
        Ok(posts.len() < before)
    }

    async fn delete_by_author(&self, author_id: Uuid) -> Result<u64, StoreError> {
        let mut posts = lock(&self.posts)?;
        let before = posts.len();
        posts.retain(|p| p.author_id != author_id);
        Ok((before - posts.len()) as u64)
    }
}
