/// Authentication Routes
///
/// Registration, login, token refresh and the current user.

use actix_web::{web, HttpRequest, HttpResponse};
use serde::{Deserialize, Serialize};

use crate::auth::{AuthService, LoginRequest, RefreshRequest, RegisterRequest, TokenClaims};
use crate::error::{AppError, ErrorContext};
use crate::response::ApiResponse;
use crate::security::{ClientIpResolver, RateLimiterManager};
use crate::services::ProfileService;

#[derive(Deserialize)]
pub struct PasswordStrengthRequest {
    pub password: String,
}

#[derive(Serialize, Deserialize)]
pub struct PasswordStrengthResponse {
    pub score: u8,
}

/// POST /api/v1/auth/register
///
/// # Errors
/// - 400: invalid username/email or weak password
/// - 409: username or email taken
pub async fn register(
    body: web::Json<RegisterRequest>,
    auth: web::Data<AuthService>,
) -> Result<HttpResponse, AppError> {
    let context = ErrorContext::new("user_registration");

    let user = auth.register(body.into_inner()).await.map_err(|e| {
        context.log_error(&e);
        e
    })?;

    tracing::info!(
        request_id = %context.request_id,
        user_id = %user.id,
        "User registered successfully"
    );
    Ok(HttpResponse::Created().json(ApiResponse::with_message("User registered successfully", user)))
}

/// POST /api/v1/auth/login
///
/// Attempts are rate limited per client IP; forwarding headers count only
/// when the peer is a trusted proxy.
///
/// # Errors
/// - 401: unknown email or wrong password (same response)
/// - 403: account deactivated
/// - 429: too many attempts
pub async fn login(
    req: HttpRequest,
    body: web::Json<LoginRequest>,
    auth: web::Data<AuthService>,
    limiter: web::Data<RateLimiterManager>,
    resolver: web::Data<ClientIpResolver>,
) -> Result<HttpResponse, AppError> {
    let client_ip = resolver.resolve(&req);
    limiter.check_rate_limit(&client_ip)?;

    let response = auth.authenticate(body.into_inner()).await?;

    tracing::info!(
        user_id = %response.user.id,
        client_ip = %client_ip,
        "User logged in successfully"
    );
    Ok(HttpResponse::Ok().json(ApiResponse::data(response)))
}

/// POST /api/v1/auth/refresh
///
/// The presented refresh token is single use.
pub async fn refresh(
    body: web::Json<RefreshRequest>,
    auth: web::Data<AuthService>,
) -> Result<HttpResponse, AppError> {
    let response = auth.refresh(body.into_inner()).await?;
    Ok(HttpResponse::Ok().json(ApiResponse::data(response)))
}

/// POST /api/v1/auth/password-strength
pub async fn password_strength(
    body: web::Json<PasswordStrengthRequest>,
    auth: web::Data<AuthService>,
) -> HttpResponse {
    let score = auth.password_strength(&body.password);
    HttpResponse::Ok().json(ApiResponse::data(PasswordStrengthResponse { score }))
}

/// GET /api/v1/me
pub async fn get_current_user(
    claims: web::ReqData<TokenClaims>,
    profiles: web::Data<ProfileService>,
) -> Result<HttpResponse, AppError> {
    let user = profiles.get_profile(claims.user_id).await?;
    Ok(HttpResponse::Ok().json(ApiResponse::data(user)))
}
