/// Authentication Service
///
/// Orchestrates registration, login, token refresh and logout over the user
/// store, the token codec and the refresh token store. Everything below this
/// boundary is re-classified into `AppError`; login and refresh failures use
/// one generic message regardless of the underlying cause.

use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use uuid::Uuid;

use crate::audit::{AuditAction, AuditLog};
use crate::auth::claims::SessionId;
use crate::auth::jwt::{hash_refresh_token, IssuedTokens, TokenCodec, TokenPair};
use crate::auth::password::{hash_password, password_strength, verify_password, PasswordPolicy};
use crate::auth::refresh_token::RefreshTokenStore;
use crate::error::{AppError, AuthError};
use crate::models::User;
use crate::store::{StoreError, UserStore};
use crate::validators::{is_valid_email, is_valid_username};

#[derive(Debug, Deserialize)]
pub struct RegisterRequest {
    pub username: String,
    pub email: String,
    pub password: String,
}

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

#[derive(Debug, Deserialize)]
pub struct RefreshRequest {
    pub refresh_token: String,
}

/// Token pair plus the authenticated user
#[derive(Debug, Serialize, Deserialize)]
pub struct AuthResponse {
    #[serde(flatten)]
    pub tokens: TokenPair,
    pub user: User,
}

#[derive(Clone)]
pub struct AuthService {
    users: Arc<dyn UserStore>,
    refresh_tokens: Arc<dyn RefreshTokenStore>,
    codec: TokenCodec,
    policy: PasswordPolicy,
    bcrypt_cost: u32,
    /// Verified against when the email is unknown, so both login failures cost one bcrypt check
    dummy_hash: Option<Arc<str>>,
}

const DUMMY_PASSWORD: &str = "blogapi-timing-equalizer";

/// Log a store failure with context and hide it behind `Internal`
fn store_failure(operation: &str, err: StoreError) -> AppError {
    tracing::error!(operation = operation, error = %err, "Store operation failed");
    AppError::Internal(format!("{} failed", operation))
}

async fn hash_in_background(password: String, cost: u32) -> Result<String, AppError> {
    tokio::task::spawn_blocking(move || hash_password(&password, cost))
        .await
        .map_err(|e| AppError::Internal(format!("Hashing task failed: {}", e)))?
}

async fn verify_in_background(password: String, hash: String) -> Result<bool, AppError> {
    tokio::task::spawn_blocking(move || verify_password(&password, &hash))
        .await
        .map_err(|e| AppError::Internal(format!("Verification task failed: {}", e)))?
}

impl AuthService {
    pub fn new(
        users: Arc<dyn UserStore>,
        refresh_tokens: Arc<dyn RefreshTokenStore>,
        codec: TokenCodec,
        policy: PasswordPolicy,
        bcrypt_cost: u32,
    ) -> Self {
        let dummy_hash = match hash_password(DUMMY_PASSWORD, bcrypt_cost) {
            Ok(hash) => Some(Arc::from(hash)),
            Err(e) => {
                tracing::warn!(error = %e, "Could not prepare dummy password hash");
                None
            }
        };

        Self {
            users,
            refresh_tokens,
            codec,
            policy,
            bcrypt_cost,
            dummy_hash,
        }
    }

    pub fn codec(&self) -> &TokenCodec {
        &self.codec
    }

    /// Create an active account
    ///
    /// # Errors
    /// - `Validation` for a malformed username/email or a weak password
    /// - `Conflict` if the username or email is taken
    pub async fn register(&self, request: RegisterRequest) -> Result<User, AppError> {
        let username = is_valid_username(&request.username)?;
        let email = is_valid_email(&request.email)?;
        self.policy.validate(&request.password)?;

        // Fast path only; the unique constraints are the real guard
        if self
            .users
            .exists_by_email(&email)
            .await
            .map_err(|e| store_failure("check email", e))?
        {
            AuditLog::failure(AuditAction::Register, "user", "Email already registered").record();
            return Err(AppError::Conflict("Email already registered".to_string()));
        }
        if self
            .users
            .exists_by_username(&username)
            .await
            .map_err(|e| store_failure("check username", e))?
        {
            AuditLog::failure(AuditAction::Register, "user", "Username already taken").record();
            return Err(AppError::Conflict("Username already taken".to_string()));
        }

        let password_hash = hash_in_background(request.password, self.bcrypt_cost).await?;
        let user = User::new(username, email, password_hash);

        match self.users.create(&user).await {
            Ok(()) => {}
            Err(StoreError::UniqueViolation(detail)) => {
                tracing::info!(detail = %detail, "Registration lost a uniqueness race");
                return Err(AppError::Conflict(
                    "Username or email already taken".to_string(),
                ));
            }
            Err(e) => return Err(store_failure("create user", e)),
        }

        AuditLog::success(AuditAction::Register, "user", "User registered")
            .with_resource_id(user.id)
            .with_user_id(user.id)
            .record();

        Ok(user.without_password())
    }

    /// Check credentials and open a new session
    ///
    /// Unknown email and wrong password are the same error.
    ///
    /// # Errors
    /// - `Auth(InvalidCredentials)` for bad credentials
    /// - `Auth(AccountInactive)` if the password is right but the account is deactivated
    pub async fn authenticate(&self, request: LoginRequest) -> Result<AuthResponse, AppError> {
        let email = request.email.trim().to_lowercase();

        let user = match self
            .users
            .get_by_email(&email)
            .await
            .map_err(|e| store_failure("load user", e))?
        {
            Some(user) => user,
            None => {
                if let Some(hash) = &self.dummy_hash {
                    verify_in_background(request.password, hash.to_string()).await?;
                }
                AuditLog::failure(AuditAction::Login, "user", "Unknown email").record();
                return Err(AuthError::InvalidCredentials.into());
            }
        };

        if !verify_in_background(request.password, user.password_hash.clone()).await? {
            AuditLog::failure(AuditAction::Login, "user", "Wrong password")
                .with_user_id(user.id)
                .record();
            return Err(AuthError::InvalidCredentials.into());
        }

        if !user.is_active {
            AuditLog::failure(AuditAction::Login, "user", "Account is deactivated")
                .with_user_id(user.id)
                .record();
            return Err(AuthError::AccountInactive.into());
        }

        let issued = self.codec.generate_token_pair(&user)?;
        self.refresh_tokens
            .create(
                &issued.session_id,
                &hash_refresh_token(&issued.pair.refresh_token),
                user.id,
                issued.refresh_expires_at,
            )
            .await
            .map_err(|e| store_failure("create session", e))?;

        let now = Utc::now();
        if let Err(e) = self.users.update_last_login(user.id, now).await {
            tracing::warn!(user_id = %user.id, error = %e, "Failed to record last login");
        }

        AuditLog::success(AuditAction::Login, "session", "User logged in")
            .with_resource_id(&issued.session_id)
            .with_user_id(user.id)
            .record();

        let mut user = user;
        user.last_login = Some(now);
        Ok(self.respond(issued, user))
    }

    /// Exchange a refresh token for a new pair, revoking the presented one
    ///
    /// # Errors
    /// `Auth(InvalidRefreshToken)` for any unusable token, unknown or
    /// inactive user, or a session that is already rotated or revoked
    pub async fn refresh(&self, request: RefreshRequest) -> Result<AuthResponse, AppError> {
        let claims = match self.codec.validate_refresh_token(&request.refresh_token) {
            Ok(claims) => claims,
            Err(e) => {
                tracing::warn!(error = %e, "Refresh token rejected by codec");
                return Err(AuthError::InvalidRefreshToken.into());
            }
        };

        let user = match self
            .users
            .get_by_id(claims.user_id)
            .await
            .map_err(|e| store_failure("load user", e))?
        {
            Some(user) if user.is_active => user,
            _ => {
                AuditLog::failure(AuditAction::Refresh, "session", "User missing or inactive")
                    .with_resource_id(&claims.session_id)
                    .with_user_id(claims.user_id)
                    .record();
                return Err(AuthError::InvalidRefreshToken.into());
            }
        };

        let issued = self.codec.generate_token_pair(&user)?;
        let rotated = self
            .refresh_tokens
            .rotate_token(
                &claims.session_id,
                &issued.session_id,
                &hash_refresh_token(&issued.pair.refresh_token),
                user.id,
                issued.refresh_expires_at,
            )
            .await;

        match rotated {
            Ok(()) => {}
            Err(StoreError::InvalidRefreshToken) => {
                AuditLog::failure(
                    AuditAction::Refresh,
                    "session",
                    "Session not active (reused, revoked or expired)",
                )
                .with_resource_id(&claims.session_id)
                .with_user_id(user.id)
                .record();
                return Err(AuthError::InvalidRefreshToken.into());
            }
            Err(e) => return Err(store_failure("rotate session", e)),
        }

        AuditLog::success(AuditAction::Refresh, "session", "Session rotated")
            .with_resource_id(&issued.session_id)
            .with_user_id(user.id)
            .with_state_change(&claims.session_id, &issued.session_id)
            .record();

        Ok(self.respond(issued, user))
    }

    /// Revoke the session the caller's access token belongs to; idempotent
    pub async fn logout(&self, user_id: Uuid, session_id: &SessionId) -> Result<(), AppError> {
        self.refresh_tokens
            .revoke(session_id)
            .await
            .map_err(|e| store_failure("revoke session", e))?;

        AuditLog::success(AuditAction::Logout, "session", "Session revoked")
            .with_resource_id(session_id)
            .with_user_id(user_id)
            .record();
        Ok(())
    }

    /// Revoke every session of a user, returning how many were active
    pub async fn logout_everywhere(&self, user_id: Uuid) -> Result<u64, AppError> {
        let revoked = self
            .refresh_tokens
            .revoke_all_for_user(user_id)
            .await
            .map_err(|e| store_failure("revoke sessions", e))?;

        AuditLog::success(AuditAction::LogoutAll, "session", format!("{} sessions revoked", revoked))
            .with_user_id(user_id)
            .record();
        Ok(revoked)
    }

    pub async fn activate_user(&self, actor: Uuid, user_id: Uuid) -> Result<(), AppError> {
        self.set_active(actor, user_id, true).await
    }

    /// Outstanding access tokens stay valid until they expire; refresh stops working
    pub async fn deactivate_user(&self, actor: Uuid, user_id: Uuid) -> Result<(), AppError> {
        self.set_active(actor, user_id, false).await
    }

    async fn set_active(&self, actor: Uuid, user_id: Uuid, active: bool) -> Result<(), AppError> {
        let (action, previous, new) = if active {
            (AuditAction::Activate, "inactive", "active")
        } else {
            (AuditAction::Deactivate, "active", "inactive")
        };

        let found = self
            .users
            .set_active(user_id, active)
            .await
            .map_err(|e| store_failure("set active", e))?;
        if !found {
            return Err(AppError::NotFound("User not found".to_string()));
        }

        AuditLog::success(action, "user", format!("Account {}", new))
            .with_resource_id(user_id)
            .with_user_id(actor)
            .with_state_change(previous, new)
            .record();
        Ok(())
    }

    /// Informational strength score, never a gate
    pub fn password_strength(&self, password: &str) -> u8 {
        password_strength(password)
    }

    fn respond(&self, issued: IssuedTokens, user: User) -> AuthResponse {
        AuthResponse {
            tokens: issued.pair,
            user: user.without_password(),
        }
    }
}
