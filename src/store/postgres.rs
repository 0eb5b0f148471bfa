use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;
use uuid::Uuid;

use super::{PostStore, StoreError, UserStore};
use crate::models::{Post, PostFilter, User};

const USER_COLUMNS: &str =
    "id, username, email, password_hash, is_active, last_login, created_at, updated_at";
const POST_COLUMNS: &str = "id, title, content, author_id, is_published, created_at, updated_at";

pub struct PgUserStore {
    pool: PgPool,
}

impl PgUserStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    async fn fetch_one_by(&self, column: &str, value: &str) -> Result<Option<User>, StoreError> {
        let row = sqlx::query(&format!(
            "SELECT {} FROM users WHERE {} = $1",
            USER_COLUMNS, column
        ))
        .bind(value)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.as_ref().map(User::from_row).transpose()?)
    }
}

#[async_trait]
impl UserStore for PgUserStore {
    async fn get_by_id(&self, id: Uuid) -> Result<Option<User>, StoreError> {
        let row = sqlx::query(&format!("SELECT {} FROM users WHERE id = $1", USER_COLUMNS))
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        Ok(row.as_ref().map(User::from_row).transpose()?)
    }

    async fn get_by_email(&self, email: &str) -> Result<Option<User>, StoreError> {
        self.fetch_one_by("email", email).await
    }

    async fn get_by_username(&self, username: &str) -> Result<Option<User>, StoreError> {
        self.fetch_one_by("username", username).await
    }

    async fn exists_by_email(&self, email: &str) -> Result<bool, StoreError> {
        let exists: bool = sqlx::query_scalar("SELECT EXISTS(SELECT 1 FROM users WHERE email = $1)")
            .bind(email)
            .fetch_one(&self.pool)
            .await?;
        Ok(exists)
    }

    async fn exists_by_username(&self, username: &str) -> Result<bool, StoreError> {
        let exists: bool =
            sqlx::query_scalar("SELECT EXISTS(SELECT 1 FROM users WHERE username = $1)")
                .bind(username)
                .fetch_one(&self.pool)
                .await?;
        Ok(exists)
    }

    async fn create(&self, user: &User) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            INSERT INTO users (id, username, email, password_hash, is_active, last_login, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            "#,
        )
        .bind(user.id)
        .bind(&user.username)
        .bind(&user.email)
        .bind(&user.password_hash)
        .bind(user.is_active)
        .bind(user.last_login)
        .bind(user.created_at)
        .bind(user.updated_at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn update(&self, user: &User) -> Result<bool, StoreError> {
        let result = sqlx::query(
            r#"
            UPDATE users
            SET username = $1, email = $2, password_hash = $3, updated_at = $4
            WHERE id = $5
            "#,
        )
        .bind(&user.username)
        .bind(&user.email)
        .bind(&user.password_hash)
        .bind(Utc::now())
        .bind(user.id)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    async fn delete(&self, id: Uuid) -> Result<bool, StoreError> {
        let result = sqlx::query("DELETE FROM users WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn update_last_login(&self, id: Uuid, at: DateTime<Utc>) -> Result<(), StoreError> {
        sqlx::query("UPDATE users SET last_login = $1 WHERE id = $2")
            .bind(at)
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn set_active(&self, id: Uuid, active: bool) -> Result<bool, StoreError> {
        let result = sqlx::query("UPDATE users SET is_active = $1, updated_at = $2 WHERE id = $3")
            .bind(active)
            .bind(Utc::now())
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }
}

pub struct PgPostStore {
    pool: PgPool,
}

impl PgPostStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl PostStore for PgPostStore {
    async fn create(&self, post: &Post) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            INSERT INTO posts (id, title, content, author_id, is_published, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            "#,
        )
        .bind(post.id)
        .bind(&post.title)
        .bind(&post.content)
        .bind(post.author_id)
        .bind(post.is_published)
        .bind(post.created_at)
        .bind(post.updated_at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn get_by_id(&self, id: Uuid) -> Result<Option<Post>, StoreError> {
        let row = sqlx::query(&format!("SELECT {} FROM posts WHERE id = $1", POST_COLUMNS))
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        Ok(row.as_ref().map(Post::from_row).transpose()?)
    }

    async fn list(
        &self,
        filter: PostFilter,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<Post>, StoreError> {
        let rows = sqlx::query(&format!(
            r#"
            SELECT {}
            FROM posts
            WHERE ($1::uuid IS NULL OR author_id = $1)
              AND ($2 = false OR is_published = true)
            ORDER BY created_at DESC
            LIMIT $3 OFFSET $4
            "#,
            POST_COLUMNS
        ))
        .bind(filter.author_id)
        .bind(filter.published_only)
        .bind(limit)
        .bind(offset)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.iter().map(Post::from_row).collect::<Result<Vec<_>, _>>()?)
    }

    async fn count(&self, filter: PostFilter) -> Result<i64, StoreError> {
        let count: i64 = sqlx::query_scalar(
            r#"
            SELECT COUNT(*)
            FROM posts
            WHERE ($1::uuid IS NULL OR author_id = $1)
              AND ($2 = false OR is_published = true)
            "#,
        )
        .bind(filter.author_id)
        .bind(filter.published_only)
        .fetch_one(&self.pool)
        .await?;
        Ok(count)
    }

    async fn update(&self, post: &Post) -> Result<bool, StoreError> {
        let result = sqlx::query(
            r#"
            UPDATE posts
            SET title = $1, content = $2, is_published = $3, updated_at = $4
            WHERE id = $5
            "#,
        )
        .bind(&post.title)
        .bind(&post.content)
        .bind(post.is_published)
        .bind(post.updated_at)
        .bind(post.id)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    async fn delete(&self, id: Uuid) -> Result<bool, StoreError> {
        let result = sqlx::query("DELETE FROM posts WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn delete_by_author(&self, author_id: Uuid) -> Result<u64, StoreError> {
        let result = sqlx::query("DELETE FROM posts WHERE author_id = $1")
            .bind(author_id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }
}
