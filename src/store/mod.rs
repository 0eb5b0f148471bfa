/// Persistence capabilities
///
/// Services depend on these traits only. `postgres` implements them over a
/// sqlx `PgPool`; `memory` keeps everything in process for tests and local runs.
/// Absence is reported as `Ok(None)` / `Ok(false)`, never as an error.

mod memory;
mod postgres;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::fmt;
use uuid::Uuid;

use crate::models::{Post, PostFilter, User};

pub(crate) use memory::lock;
pub use memory::{InMemoryPostStore, InMemoryUserStore};
pub use postgres::{PgPostStore, PgUserStore};

/// Postgres SQLSTATE for unique_violation
const UNIQUE_VIOLATION: &str = "23505";

#[derive(Debug, Clone, PartialEq)]
pub enum StoreError {
    /// A unique constraint rejected the write; carries the constraint detail
    UniqueViolation(String),
    /// The refresh token record is missing, revoked or expired
    InvalidRefreshToken,
    Query(String),
    ConnectionPool(String),
}

impl fmt::Display for StoreError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StoreError::UniqueViolation(detail) => write!(f, "unique constraint violated: {}", detail),
            StoreError::InvalidRefreshToken => write!(f, "refresh token is not active"),
            StoreError::Query(msg) => write!(f, "query failed: {}", msg),
            StoreError::ConnectionPool(msg) => write!(f, "connection pool error: {}", msg),
        }
    }
}

impl std::error::Error for StoreError {}

impl From<sqlx::Error> for StoreError {
    fn from(err: sqlx::Error) -> Self {
        match &err {
            sqlx::Error::Database(db_err) if db_err.code().as_deref() == Some(UNIQUE_VIOLATION) => {
                StoreError::UniqueViolation(db_err.message().to_string())
            }
            sqlx::Error::PoolTimedOut | sqlx::Error::PoolClosed => {
                StoreError::ConnectionPool(err.to_string())
            }
            _ => StoreError::Query(err.to_string()),
        }
    }
}

#[async_trait]
pub trait UserStore: Send + Sync {
    async fn get_by_id(&self, id: Uuid) -> Result<Option<User>, StoreError>;
    async fn get_by_email(&self, email: &str) -> Result<Option<User>, StoreError>;
    async fn get_by_username(&self, username: &str) -> Result<Option<User>, StoreError>;
    async fn exists_by_email(&self, email: &str) -> Result<bool, StoreError>;
    async fn exists_by_username(&self, username: &str) -> Result<bool, StoreError>;
    /// Insert a user; duplicate username or email is `UniqueViolation`
    async fn create(&self, user: &User) -> Result<(), StoreError>;
    /// Persist username, email and password hash; false if the user is gone
    async fn update(&self, user: &User) -> Result<bool, StoreError>;
    async fn delete(&self, id: Uuid) -> Result<bool, StoreError>;
    async fn update_last_login(&self, id: Uuid, at: DateTime<Utc>) -> Result<(), StoreError>;
    /// Toggle `is_active`; false if the user is gone
    async fn set_active(&self, id: Uuid, active: bool) -> Result<bool, StoreError>;
}

#[async_trait]
pub trait PostStore: Send + Sync {
    async fn create(&self, post: &Post) -> Result<(), StoreError>;
    async fn get_by_id(&self, id: Uuid) -> Result<Option<Post>, StoreError>;
    /// Newest first
    async fn list(&self, filter: PostFilter, limit: i64, offset: i64)
        -> Result<Vec<Post>, StoreError>;
    async fn count(&self, filter: PostFilter) -> Result<i64, StoreError>;
    async fn update(&self, post: &Post) -> Result<bool, StoreError>;
    async fn delete(&self, id: Uuid) -> Result<bool, StoreError>;
    async fn delete_by_author(&self, author_id: Uuid) -> Result<u64, StoreError>;
}
