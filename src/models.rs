/// Domain models shared by the stores, services and routes

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::postgres::PgRow;
use sqlx::Row;
use uuid::Uuid;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct User {
    pub id: Uuid,
    pub username: String,
    pub email: String,
    #[serde(skip_serializing, default)]
    pub password_hash: String,
    pub is_active: bool,
    pub last_login: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl User {
    /// A new, active user that has never logged in
    pub fn new(username: String, email: String, password_hash: String) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            username,
            email,
            password_hash,
            is_active: true,
            last_login: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// Copy with the password hash cleared, for anything leaving the service
    pub fn without_password(mut self) -> Self {
        self.password_hash.clear();
        self
    }

    pub fn from_row(row: &PgRow) -> Result<Self, sqlx::Error> {
        Ok(Self {
            id: row.try_get("id")?,
            username: row.try_get("username")?,
            email: row.try_get("email")?,
            password_hash: row.try_get("password_hash")?,
            is_active: row.try_get("is_active")?,
            last_login: row.try_get("last_login")?,
            created_at: row.try_get("created_at")?,
            updated_at: row.try_get("updated_at")?,
        })
    }
}

/// Public view of a post's author
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AuthorSummary {
    pub id: Uuid,
    pub username: String,
}

impl From<&User> for AuthorSummary {
    fn from(user: &User) -> Self {
        Self {
            id: user.id,
            username: user.username.clone(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Post {
    pub id: Uuid,
    pub title: String,
    pub content: String,
    pub author_id: Uuid,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub author: Option<AuthorSummary>,
    pub is_published: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Post {
    pub fn new(author_id: Uuid, title: String, content: String, is_published: bool) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            title,
            content,
            author_id,
            author: None,
            is_published,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn from_row(row: &PgRow) -> Result<Self, sqlx::Error> {
        Ok(Self {
            id: row.try_get("id")?,
            title: row.try_get("title")?,
            content: row.try_get("content")?,
            author_id: row.try_get("author_id")?,
            author: None,
            is_published: row.try_get("is_published")?,
            created_at: row.try_get("created_at")?,
            updated_at: row.try_get("updated_at")?,
        })
    }
}

/// Partial update of a user's profile
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ProfileChanges {
    pub username: Option<String>,
    pub email: Option<String>,
}

/// Partial update of a post
#[derive(Debug, Clone, Default, Deserialize)]
pub struct PostChanges {
    pub title: Option<String>,
    pub content: Option<String>,
    pub is_published: Option<bool>,
}

impl PostChanges {
    pub fn apply(self, post: &mut Post) {
        if let Some(title) = self.title {
            post.title = title;
        }
        if let Some(content) = self.content {
            post.content = content;
        }
        if let Some(is_published) = self.is_published {
            post.is_published = is_published;
        }
        post.updated_at = Utc::now();
    }
}

/// Filter for listing and counting posts
#[derive(Debug, Clone, Copy, Default)]
pub struct PostFilter {
    pub author_id: Option<Uuid>,
    pub published_only: bool,
}

impl PostFilter {
    pub fn matches(&self, post: &Post) -> bool {
        self.author_id.map_or(true, |id| post.author_id == id)
            && (!self.published_only || post.is_published)
    }
}
