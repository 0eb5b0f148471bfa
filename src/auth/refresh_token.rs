/// Refresh Token Session Store
///
/// One record per session, keyed by the `token_id` shared by an access and
/// refresh token pair. Records store only the SHA-256 hash of the signed
/// refresh token. Rotation is single use: the old record is revoked in the
/// same transaction that creates its successor, so two concurrent refreshes
/// with the same token cannot both succeed.

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use sqlx::postgres::PgRow;
use sqlx::{PgPool, Row};
use std::collections::HashMap;
use std::sync::Mutex;
use uuid::Uuid;

use crate::auth::claims::SessionId;
use crate::store::StoreError;

/// Revoked records are kept this long for audit before the sweep removes them
pub const REVOKED_RETENTION_DAYS: i64 = 7;

#[derive(Debug, Clone, PartialEq)]
pub struct RefreshTokenRecord {
    pub id: Uuid,
    pub user_id: Uuid,
    pub token_id: SessionId,
    pub token_hash: String,
    pub expires_at: DateTime<Utc>,
    pub is_revoked: bool,
    pub created_at: DateTime<Utc>,
    pub revoked_at: Option<DateTime<Utc>>,
}

impl RefreshTokenRecord {
    pub fn new(
        token_id: SessionId,
        token_hash: String,
        user_id: Uuid,
        expires_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            user_id,
            token_id,
            token_hash,
            expires_at,
            is_revoked: false,
            created_at: Utc::now(),
            revoked_at: None,
        }
    }

    /// Not revoked and not yet expired
    pub fn is_active(&self, now: DateTime<Utc>) -> bool {
        !self.is_revoked && self.expires_at > now
    }

    fn revoke(&mut self, now: DateTime<Utc>) {
        if !self.is_revoked {
            self.is_revoked = true;
            self.revoked_at = Some(now);
        }
    }

    /// Expired, or revoked longer ago than the retention window
    fn is_stale(&self, now: DateTime<Utc>) -> bool {
        let cutoff = now - Duration::days(REVOKED_RETENTION_DAYS);
        self.expires_at < now || (self.is_revoked && self.revoked_at.map_or(false, |at| at < cutoff))
    }

    fn from_row(row: &PgRow) -> Result<Self, sqlx::Error> {
        Ok(Self {
            id: row.try_get("id")?,
            user_id: row.try_get("user_id")?,
            token_id: SessionId::from(row.try_get::<String, _>("token_id")?),
            token_hash: row.try_get("token_hash")?,
            expires_at: row.try_get("expires_at")?,
            is_revoked: row.try_get("is_revoked")?,
            created_at: row.try_get("created_at")?,
            revoked_at: row.try_get("revoked_at")?,
        })
    }
}

#[async_trait]
pub trait RefreshTokenStore: Send + Sync {
    /// Insert a new active record; a duplicate token_id is `UniqueViolation`
    async fn create(
        &self,
        token_id: &SessionId,
        token_hash: &str,
        user_id: Uuid,
        expires_at: DateTime<Utc>,
    ) -> Result<(), StoreError>;

    async fn get_by_token_id(
        &self,
        token_id: &SessionId,
    ) -> Result<Option<RefreshTokenRecord>, StoreError>;

    /// Mark a record revoked; unknown or already revoked ids are not an error
    async fn revoke(&self, token_id: &SessionId) -> Result<(), StoreError>;

    /// Revoke every active record of a user, returning how many changed
    async fn revoke_all_for_user(&self, user_id: Uuid) -> Result<u64, StoreError>;

    /// Advisory check without locking
    async fn is_valid(&self, token_id: &SessionId) -> Result<bool, StoreError>;

    /// Atomically replace the active record `old_token_id` with a new one
    ///
    /// # Errors
    /// `InvalidRefreshToken` if the old record is missing, revoked or expired
    /// (indistinguishably); nothing is written in that case.
    async fn rotate_token(
        &self,
        old_token_id: &SessionId,
        new_token_id: &SessionId,
        new_token_hash: &str,
        user_id: Uuid,
        expires_at: DateTime<Utc>,
    ) -> Result<(), StoreError>;

    /// Remove expired records and records revoked beyond the retention window
    async fn delete_expired(&self) -> Result<u64, StoreError>;
}

// ============================================================================
// POSTGRES
// ============================================================================

pub struct PgRefreshTokenStore {
    pool: PgPool,
}

impl PgRefreshTokenStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl RefreshTokenStore for PgRefreshTokenStore {
    async fn create(
        &self,
        token_id: &SessionId,
        token_hash: &str,
        user_id: Uuid,
        expires_at: DateTime<Utc>,
    ) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            INSERT INTO refresh_tokens (id, user_id, token_id, token_hash, expires_at, created_at)
            VALUES ($1, $2, $3, $4, $5, $6)
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(user_id)
        .bind(token_id.as_str())
        .bind(token_hash)
        .bind(expires_at)
        .bind(Utc::now())
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn get_by_token_id(
        &self,
        token_id: &SessionId,
    ) -> Result<Option<RefreshTokenRecord>, StoreError> {
        let row = sqlx::query(
            r#"
            SELECT id, user_id, token_id, token_hash, expires_at, is_revoked, created_at, revoked_at
            FROM refresh_tokens
            WHERE token_id = $1
            "#,
        )
        .bind(token_id.as_str())
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.as_ref().map(RefreshTokenRecord::from_row).transpose()?)
    }

    async fn revoke(&self, token_id: &SessionId) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            UPDATE refresh_tokens
            SET is_revoked = true, revoked_at = $1
            WHERE token_id = $2 AND is_revoked = false
            "#,
        )
        .bind(Utc::now())
        .bind(token_id.as_str())
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn revoke_all_for_user(&self, user_id: Uuid) -> Result<u64, StoreError> {
        let result = sqlx::query(
            r#"
            UPDATE refresh_tokens
            SET is_revoked = true, revoked_at = $1
            WHERE user_id = $2 AND is_revoked = false
            "#,
        )
        .bind(Utc::now())
        .bind(user_id)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected())
    }

    async fn is_valid(&self, token_id: &SessionId) -> Result<bool, StoreError> {
        let valid: bool = sqlx::query_scalar(
            r#"
            SELECT EXISTS(
                SELECT 1 FROM refresh_tokens
                WHERE token_id = $1 AND is_revoked = false AND expires_at > NOW()
            )
            "#,
        )
        .bind(token_id.as_str())
        .fetch_one(&self.pool)
        .await?;

        Ok(valid)
    }

    async fn rotate_token(
        &self,
        old_token_id: &SessionId,
        new_token_id: &SessionId,
        new_token_hash: &str,
        user_id: Uuid,
        expires_at: DateTime<Utc>,
    ) -> Result<(), StoreError> {
        // Dropping `tx` without commit rolls back
        let mut tx = self.pool.begin().await?;

        let old = sqlx::query(
            r#"
            SELECT is_revoked, expires_at
            FROM refresh_tokens
            WHERE token_id = $1
            FOR UPDATE
            "#,
        )
        .bind(old_token_id.as_str())
        .fetch_optional(&mut tx)
        .await?;

        let now = Utc::now();
        let active = match old {
            Some(row) => {
                let is_revoked: bool = row.try_get("is_revoked")?;
                let old_expires_at: DateTime<Utc> = row.try_get("expires_at")?;
                !is_revoked && old_expires_at > now
            }
            None => false,
        };
        if !active {
            return Err(StoreError::InvalidRefreshToken);
        }

        sqlx::query(
            r#"
            INSERT INTO refresh_tokens (id, user_id, token_id, token_hash, expires_at, created_at)
            VALUES ($1, $2, $3, $4, $5, $6)
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(user_id)
        .bind(new_token_id.as_str())
        .bind(new_token_hash)
        .bind(expires_at)
        .bind(now)
        .execute(&mut tx)
        .await?;

        sqlx::query(
            r#"
            UPDATE refresh_tokens
            SET is_revoked = true, revoked_at = $1
            WHERE token_id = $2
            "#,
        )
        .bind(now)
        .bind(old_token_id.as_str())
        .execute(&mut tx)
        .await?;

        tx.commit().await?;
        Ok(())
    }

    async fn delete_expired(&self) -> Result<u64, StoreError> {
        let result = sqlx::query(
            r#"
            DELETE FROM refresh_tokens
            WHERE expires_at < NOW()
               OR (is_revoked = true AND revoked_at < NOW() - INTERVAL '7 days')
            "#,
        )
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected())
    }
}

// ============================================================================
// IN MEMORY
// ============================================================================

/// Records keyed by token_id behind one lock; rotation happens under a
/// single acquisition
#[derive(Default)]
pub struct InMemoryRefreshTokenStore {
    records: Mutex<HashMap<SessionId, RefreshTokenRecord>>,
}

impl InMemoryRefreshTokenStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.records.lock().map(|records| records.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl RefreshTokenStore for InMemoryRefreshTokenStore {
    async fn create(
        &self,
        token_id: &SessionId,
        token_hash: &str,
        user_id: Uuid,
        expires_at: DateTime<Utc>,
    ) -> Result<(), StoreError> {
        let mut records = crate::store::lock(&self.records)?;
        if records.contains_key(token_id) {
            return Err(StoreError::UniqueViolation(
                "refresh_tokens_token_id_key".to_string(),
            ));
        }
        records.insert(
            token_id.clone(),
            RefreshTokenRecord::new(token_id.clone(), token_hash.to_string(), user_id, expires_at),
        );
        Ok(())
    }

    async fn get_by_token_id(
        &self,
        token_id: &SessionId,
    ) -> Result<Option<RefreshTokenRecord>, StoreError> {
        Ok(crate::store::lock(&self.records)?.get(token_id).cloned())
    }

    async fn revoke(&self, token_id: &SessionId) -> Result<(), StoreError> {
        if let Some(record) = crate::store::lock(&self.records)?.get_mut(token_id) {
            record.revoke(Utc::now());
        }
        Ok(())
    }

    async fn revoke_all_for_user(&self, user_id: Uuid) -> Result<u64, StoreError> {
        let now = Utc::now();
        let mut revoked = 0;
        for record in crate::store::lock(&self.records)?
            .values_mut()
            .filter(|r| r.user_id == user_id && !r.is_revoked)
        {
            record.revoke(now);
            revoked += 1;
        }
        Ok(revoked)
    }

    async fn is_valid(&self, token_id: &SessionId) -> Result<bool, StoreError> {
        Ok(crate::store::lock(&self.records)?
            .get(token_id)
            .map_or(false, |r| r.is_active(Utc::now())))
    }

    async fn rotate_token(
        &self,
        old_token_id: &SessionId,
        new_token_id: &SessionId,
        new_token_hash: &str,
        user_id: Uuid,
        expires_at: DateTime<Utc>,
    ) -> Result<(), StoreError> {
        let now = Utc::now();
        let mut records = crate::store::lock(&self.records)?;

        if !records.get(old_token_id).map_or(false, |r| r.is_active(now)) {
            return Err(StoreError::InvalidRefreshToken);
        }
        if records.contains_key(new_token_id) {
            return Err(StoreError::UniqueViolation(
                "refresh_tokens_token_id_key".to_string(),
            ));
        }

        records.insert(
            new_token_id.clone(),
            RefreshTokenRecord::new(
                new_token_id.clone(),
                new_token_hash.to_string(),
                user_id,
                expires_at,
            ),
        );
        if let Some(old) = records.get_mut(old_token_id) {
            old.revoke(now);
        }
        Ok(())
    }

    async fn delete_expired(&self) -> Result<u64, StoreError> {
        let now = Utc::now();
        let mut records = crate::store::lock(&self.records)?;
        let before = records.len();
        records.retain(|_, r| !r.is_stale(now));
        Ok((before - records.len()) as u64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    fn in_an_hour() -> DateTime<Utc> {
        Utc::now() + Duration::hours(1)
    }

    #[tokio::test]
    async fn test_create_and_validate() {
        let store = InMemoryRefreshTokenStore::new();
        let session = SessionId::generate();
        store
            .create(&session, "hash", Uuid::new_v4(), in_an_hour())
            .await
            .unwrap();

        assert!(store.is_valid(&session).await.unwrap());
        assert!(!store.is_valid(&SessionId::generate()).await.unwrap());

        let record = store.get_by_token_id(&session).await.unwrap().unwrap();
        assert_eq!(record.token_hash, "hash");
        assert!(!record.is_revoked);
    }

    #[tokio::test]
    async fn test_duplicate_token_id_is_rejected() {
        let store = InMemoryRefreshTokenStore::new();
        let session = SessionId::generate();
        store.create(&session, "a", Uuid::new_v4(), in_an_hour()).await.unwrap();

        assert!(matches!(
            store.create(&session, "b", Uuid::new_v4(), in_an_hour()).await,
            Err(StoreError::UniqueViolation(_))
        ));
    }

    #[tokio::test]
    async fn test_expired_record_is_not_valid() {
        let store = InMemoryRefreshTokenStore::new();
        let session = SessionId::generate();
        store
            .create(&session, "h", Uuid::new_v4(), Utc::now() - Duration::seconds(1))
            .await
            .unwrap();

        assert!(!store.is_valid(&session).await.unwrap());
    }

    #[tokio::test]
    async fn test_revoke_is_idempotent() {
        let store = InMemoryRefreshTokenStore::new();
        let session = SessionId::generate();
        store.create(&session, "h", Uuid::new_v4(), in_an_hour()).await.unwrap();

        store.revoke(&session).await.unwrap();
        let first = store.get_by_token_id(&session).await.unwrap().unwrap();
        store.revoke(&session).await.unwrap();
        let second = store.get_by_token_id(&session).await.unwrap().unwrap();

        assert!(first.is_revoked);
        assert_eq!(first.revoked_at, second.revoked_at);
        assert!(store.revoke(&SessionId::generate()).await.is_ok());
    }

    #[tokio::test]
    async fn test_revoke_all_for_user() {
        let store = InMemoryRefreshTokenStore::new();
        let user = Uuid::new_v4();
        let other = Uuid::new_v4();
        for _ in 0..3 {
            store.create(&SessionId::generate(), "h", user, in_an_hour()).await.unwrap();
        }
        let others = SessionId::generate();
        store.create(&others, "h", other, in_an_hour()).await.unwrap();

        assert_eq!(store.revoke_all_for_user(user).await.unwrap(), 3);
        assert_eq!(store.revoke_all_for_user(user).await.unwrap(), 0);
        assert!(store.is_valid(&others).await.unwrap());
    }

    #[tokio::test]
    async fn test_rotation_replaces_and_revokes() {
        let store = InMemoryRefreshTokenStore::new();
        let user = Uuid::new_v4();
        let old = SessionId::generate();
        let new = SessionId::generate();
        store.create(&old, "old", user, in_an_hour()).await.unwrap();

        store.rotate_token(&old, &new, "new", user, in_an_hour()).await.unwrap();

        assert!(!store.is_valid(&old).await.unwrap());
        assert!(store.is_valid(&new).await.unwrap());
        assert!(store.get_by_token_id(&old).await.unwrap().unwrap().revoked_at.is_some());
    }

    #[tokio::test]
    async fn test_rotation_of_inactive_record_writes_nothing() {
        let store = InMemoryRefreshTokenStore::new();
        let user = Uuid::new_v4();
        let revoked = SessionId::generate();
        let expired = SessionId::generate();
        store.create(&revoked, "h", user, in_an_hour()).await.unwrap();
        store.revoke(&revoked).await.unwrap();
        store
            .create(&expired, "h", user, Utc::now() - Duration::seconds(1))
            .await
            .unwrap();

        for old in [&revoked, &expired, &SessionId::generate()] {
            let result = store
                .rotate_token(old, &SessionId::generate(), "new", user, in_an_hour())
                .await;
            assert_eq!(result, Err(StoreError::InvalidRefreshToken));
        }
        assert_eq!(store.len(), 2);
    }

    #[tokio::test]
    async fn test_concurrent_rotation_has_one_winner() {
        let store = Arc::new(InMemoryRefreshTokenStore::new());
        let user = Uuid::new_v4();
        let old = SessionId::generate();
        store.create(&old, "old", user, in_an_hour()).await.unwrap();

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let store = store.clone();
                let old = old.clone();
                tokio::spawn(async move {
                    store
                        .rotate_token(&old, &SessionId::generate(), "new", user, in_an_hour())
                        .await
                })
            })
            .collect();

        let mut successes = 0;
        for handle in handles {
            match handle.await.unwrap() {
                Ok(()) => successes += 1,
                Err(e) => assert_eq!(e, StoreError::InvalidRefreshToken),
            }
        }
        assert_eq!(successes, 1);
        assert_eq!(store.len(), 2);
    }

    #[tokio::test]
    async fn test_delete_expired_keeps_recent_revocations() {
        let store = InMemoryRefreshTokenStore::new();
        let user = Uuid::new_v4();
        let live = SessionId::generate();
        let recently_revoked = SessionId::generate();
        let expired = SessionId::generate();
        store.create(&live, "h", user, in_an_hour()).await.unwrap();
        store.create(&recently_revoked, "h", user, in_an_hour()).await.unwrap();
        store.revoke(&recently_revoked).await.unwrap();
        store
            .create(&expired, "h", user, Utc::now() - Duration::seconds(1))
            .await
            .unwrap();

        assert_eq!(store.delete_expired().await.unwrap(), 1);
        assert!(store.get_by_token_id(&expired).await.unwrap().is_none());
        assert!(store.get_by_token_id(&recently_revoked).await.unwrap().is_some());
    }

    #[test]
    fn test_stale_revocations_are_swept() {
        let now = Utc::now();
        let mut record =
            RefreshTokenRecord::new(SessionId::generate(), "h".to_string(), Uuid::new_v4(), now + Duration::days(30));
        record.is_revoked = true;
        record.revoked_at = Some(now - Duration::days(REVOKED_RETENTION_DAYS + 1));

        assert!(record.is_stale(now));
        record.revoked_at = Some(now - Duration::days(1));
        assert!(!record.is_stale(now));
    }
}
