/// User Routes
///
/// Profile management, logout and account activation for authenticated users.

use actix_web::{web, HttpResponse};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::auth::{AuthService, TokenClaims};
use crate::error::{AppError, ErrorContext};
use crate::models::ProfileChanges;
use crate::response::ApiResponse;
use crate::services::ProfileService;

#[derive(Serialize, Deserialize)]
pub struct LogoutAllResponse {
    pub revoked_sessions: u64,
}

/// GET /api/v1/users/profile
pub async fn get_profile(
    claims: web::ReqData<TokenClaims>,
    profiles: web::Data<ProfileService>,
) -> Result<HttpResponse, AppError> {
    let user = profiles.get_profile(claims.user_id).await?;
    Ok(HttpResponse::Ok().json(ApiResponse::data(user)))
}

/// PUT /api/v1/users/profile
///
/// # Errors
/// - 400: invalid username or email
/// - 409: username or email held by another account
pub async fn update_profile(
    claims: web::ReqData<TokenClaims>,
    body: web::Json<ProfileChanges>,
    profiles: web::Data<ProfileService>,
) -> Result<HttpResponse, AppError> {
    let context = ErrorContext::new("profile_update").with_user_id(claims.user_id);

    let user = profiles
        .update_profile(claims.user_id, body.into_inner())
        .await
        .map_err(|e| {
            context.log_error(&e);
            e
        })?;
    Ok(HttpResponse::Ok().json(ApiResponse::with_message("Profile updated successfully", user)))
}

/// DELETE /api/v1/users/profile
///
/// Revokes every session of the account before deleting it.
pub async fn delete_profile(
    claims: web::ReqData<TokenClaims>,
    profiles: web::Data<ProfileService>,
) -> Result<HttpResponse, AppError> {
    profiles.delete_profile(claims.user_id).await?;
    Ok(HttpResponse::Ok().json(ApiResponse::message("Profile deleted successfully")))
}

/// POST /api/v1/users/logout
///
/// Revokes the session of the access token used for this call.
pub async fn logout(
    claims: web::ReqData<TokenClaims>,
    auth: web::Data<AuthService>,
) -> Result<HttpResponse, AppError> {
    auth.logout(claims.user_id, &claims.session_id).await?;
    Ok(HttpResponse::Ok().json(ApiResponse::message("Logged out successfully")))
}

/// POST /api/v1/users/logout-all
pub async fn logout_all(
    claims: web::ReqData<TokenClaims>,
    auth: web::Data<AuthService>,
) -> Result<HttpResponse, AppError> {
    let revoked_sessions = auth.logout_everywhere(claims.user_id).await?;
    Ok(HttpResponse::Ok().json(ApiResponse::with_message(
        "Logged out from all sessions",
        LogoutAllResponse { revoked_sessions },
    )))
}

/// PUT /api/v1/users/{id}/activate
pub async fn activate_user(
    claims: web::ReqData<TokenClaims>,
    path: web::Path<Uuid>,
    auth: web::Data<AuthService>,
) -> Result<HttpResponse, AppError> {
    auth.activate_user(claims.user_id, path.into_inner()).await?;
    Ok(HttpResponse::Ok().json(ApiResponse::message("User activated successfully")))
}

/// PUT /api/v1/users/{id}/deactivate
///
/// Already issued access tokens remain valid until they expire.
pub async fn deactivate_user(
    claims: web::ReqData<TokenClaims>,
    path: web::Path<Uuid>,
    auth: web::Data<AuthService>,
) -> Result<HttpResponse, AppError> {
    auth.deactivate_user(claims.user_id, path.into_inner()).await?;
    Ok(HttpResponse::Ok().json(ApiResponse::message("User deactivated successfully")))
}
