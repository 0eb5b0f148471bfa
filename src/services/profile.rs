use std::sync::Arc;
use uuid::Uuid;

use crate::audit::{AuditAction, AuditLog};
use crate::auth::RefreshTokenStore;
use crate::error::AppError;
use crate::models::{ProfileChanges, User};
use crate::store::{PostStore, StoreError, UserStore};
use crate::validators::{is_valid_email, is_valid_username};

/// The authenticated user's own account
#[derive(Clone)]
pub struct ProfileService {
    users: Arc<dyn UserStore>,
    posts: Arc<dyn PostStore>,
    refresh_tokens: Arc<dyn RefreshTokenStore>,
}

impl ProfileService {
    pub fn new(
        users: Arc<dyn UserStore>,
        posts: Arc<dyn PostStore>,
        refresh_tokens: Arc<dyn RefreshTokenStore>,
    ) -> Self {
        Self {
            users,
            posts,
            refresh_tokens,
        }
    }

    async fn load(&self, id: Uuid) -> Result<User, AppError> {
        self.users
            .get_by_id(id)
            .await?
            .ok_or_else(|| AppError::NotFound("User not found".to_string()))
    }

    pub async fn get_profile(&self, id: Uuid) -> Result<User, AppError> {
        Ok(self.load(id).await?.without_password())
    }

    /// Change username and/or email
    ///
    /// # Errors
    /// - `Validation` for malformed values
    /// - `Conflict` if another account holds the new username or email
    /// - `NotFound` if the account is gone
    pub async fn update_profile(&self, id: Uuid, changes: ProfileChanges) -> Result<User, AppError> {
        let mut user = self.load(id).await?;
        let previous = format!("{}|{}", user.username, user.email);

        if let Some(username) = changes.username {
            let username = is_valid_username(&username)?;
            if username != user.username {
                if let Some(other) = self.users.get_by_username(&username).await? {
                    if other.id != id {
                        return Err(AppError::Conflict("Username already taken".to_string()));
                    }
                }
                user.username = username;
            }
        }

        if let Some(email) = changes.email {
            let email = is_valid_email(&email)?;
            if email != user.email {
                if let Some(other) = self.users.get_by_email(&email).await? {
                    if other.id != id {
                        return Err(AppError::Conflict("Email already registered".to_string()));
                    }
                }
                user.email = email;
            }
        }

        match self.users.update(&user).await {
            Ok(true) => {}
            Ok(false) => return Err(AppError::NotFound("User not found".to_string())),
            Err(StoreError::UniqueViolation(_)) => {
                return Err(AppError::Conflict(
                    "Username or email already taken".to_string(),
                ))
            }
            Err(e) => return Err(e.into()),
        }

        AuditLog::success(AuditAction::ProfileUpdate, "user", "Profile updated")
            .with_resource_id(id)
            .with_user_id(id)
            .with_state_change(previous, format!("{}|{}", user.username, user.email))
            .record();

        self.get_profile(id).await
    }

    /// Delete the account, its sessions and its posts
    pub async fn delete_profile(&self, id: Uuid) -> Result<(), AppError> {
        self.load(id).await?;

        let sessions = self.refresh_tokens.revoke_all_for_user(id).await?;
        let posts = self.posts.delete_by_author(id).await?;
        if !self.users.delete(id).await? {
            return Err(AppError::NotFound("User not found".to_string()));
        }

        AuditLog::success(
            AuditAction::ProfileDelete,
            "user",
            format!("Account deleted ({} sessions revoked, {} posts removed)", sessions, posts),
        )
        .with_resource_id(id)
        .with_user_id(id)
        .record();
        Ok(())
    }
}
