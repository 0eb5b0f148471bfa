/// Application Error Handling
///
/// Every layer below the services owns a narrow error type:
/// - `PolicyViolation` (auth::password) for password rules
/// - `TokenError` (auth::jwt) for the token codec
/// - `StoreError` (store) for persistence
///
/// `AppError` is the taxonomy the services return and the HTTP layer renders.
/// Lower-level errors are logged with context and re-classified at the service
/// boundary; their text never reaches a client for authentication failures.

use actix_web::{error::ResponseError, http::StatusCode, HttpResponse};
use std::error::Error as StdError;
use std::fmt;

use crate::auth::{PolicyViolation, TokenError};
use crate::store::StoreError;

// ============================================================================
// 1. INPUT VALIDATION ERRORS
// ============================================================================

/// Validation errors for caller-supplied input
#[derive(Debug, Clone, PartialEq)]
pub enum ValidationError {
    EmptyField(String),
    TooShort(String, usize),
    TooLong(String, usize),
    InvalidFormat(String),
    SuspiciousContent(String),
    ReservedName(String),
    WeakPassword(PolicyViolation),
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ValidationError::EmptyField(field) => write!(f, "{} is empty", field),
            ValidationError::TooShort(field, min) => {
                write!(f, "{} is too short (minimum {} characters)", field, min)
            }
            ValidationError::TooLong(field, max) => {
                write!(f, "{} is too long (maximum {} characters)", field, max)
            }
            ValidationError::InvalidFormat(field) => write!(f, "{} has invalid format", field),
            ValidationError::SuspiciousContent(field) => {
                write!(f, "{} contains suspicious content", field)
            }
            ValidationError::ReservedName(name) => write!(f, "{} is a reserved name", name),
            ValidationError::WeakPassword(violation) => write!(f, "{}", violation),
        }
    }
}

impl StdError for ValidationError {}

/// Authentication and session failures
///
/// Messages are deliberately generic so that a caller cannot tell an unknown
/// account from a wrong password, or a revoked session from an expired one.
#[derive(Debug, Clone, PartialEq)]
pub enum AuthError {
    InvalidCredentials,
    InvalidRefreshToken,
    TokenInvalid,
    MissingToken,
    AccountInactive,
}

impl fmt::Display for AuthError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AuthError::InvalidCredentials => write!(f, "Invalid email or password"),
            AuthError::InvalidRefreshToken => write!(f, "Invalid refresh token"),
            AuthError::TokenInvalid => write!(f, "Invalid or expired token"),
            AuthError::MissingToken => write!(f, "Missing authentication token"),
            AuthError::AccountInactive => write!(f, "Account is deactivated"),
        }
    }
}

impl StdError for AuthError {}

// ============================================================================
// 2. SERVICE BOUNDARY ERROR
// ============================================================================

#[derive(Debug, Clone, PartialEq)]
pub enum AppError {
    /// Malformed or policy-violating input, fixable by the caller
    Validation(ValidationError),
    /// Uniqueness violation (username, email)
    Conflict(String),
    /// Bad credentials or an unusable token
    Auth(AuthError),
    /// Caller is authenticated but not allowed to act on the resource
    Forbidden(String),
    NotFound(String),
    RateLimited(String),
    Internal(String),
}

impl fmt::Display for AppError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AppError::Validation(e) => write!(f, "{}", e),
            AppError::Conflict(msg) => write!(f, "Conflict: {}", msg),
            AppError::Auth(e) => write!(f, "{}", e),
            AppError::Forbidden(msg) => write!(f, "Forbidden: {}", msg),
            AppError::NotFound(msg) => write!(f, "Not found: {}", msg),
            AppError::RateLimited(msg) => write!(f, "Rate limited: {}", msg),
            AppError::Internal(msg) => write!(f, "Internal error: {}", msg),
        }
    }
}

impl StdError for AppError {}

// ============================================================================
// FROM IMPLEMENTATIONS
// ============================================================================

impl From<ValidationError> for AppError {
    fn from(err: ValidationError) -> Self {
        AppError::Validation(err)
    }
}

impl From<PolicyViolation> for AppError {
    fn from(err: PolicyViolation) -> Self {
        AppError::Validation(ValidationError::WeakPassword(err))
    }
}

impl From<AuthError> for AppError {
    fn from(err: AuthError) -> Self {
        AppError::Auth(err)
    }
}

impl From<StoreError> for AppError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::UniqueViolation(_) => {
                AppError::Conflict("Resource already exists".to_string())
            }
            StoreError::InvalidRefreshToken => AppError::Auth(AuthError::InvalidRefreshToken),
            other => {
                tracing::error!(error = %other, "Store error");
                AppError::Internal(other.to_string())
            }
        }
    }
}

impl From<TokenError> for AppError {
    fn from(err: TokenError) -> Self {
        match err {
            TokenError::Signing(msg) => AppError::Internal(msg),
            _ => AppError::Auth(AuthError::TokenInvalid),
        }
    }
}

// ============================================================================
// 3. HTTP RESPONSE MAPPING
// ============================================================================

/// Error body returned for every failed request
#[derive(Debug, serde::Serialize, serde::Deserialize)]
pub struct ErrorResponse {
    /// Unique error ID for correlating the response with server logs
    pub error_id: String,
    pub message: String,
    /// Stable code for client-side handling
    pub code: String,
    pub status: u16,
    pub timestamp: String,
}

impl ErrorResponse {
    pub fn new(error_id: String, message: String, code: String, status: u16) -> Self {
        Self {
            error_id,
            message,
            code,
            status,
            timestamp: chrono::Utc::now().to_rfc3339(),
        }
    }
}

/// Converts errors to HTTP responses with proper logging
pub trait ErrorHandler {
    fn error_response(&self, request_id: &str) -> (StatusCode, ErrorResponse);
    fn log_error(&self, request_id: &str);
}

impl AppError {
    fn classify(&self) -> (StatusCode, &'static str, String) {
        match self {
            AppError::Validation(e) => (StatusCode::BAD_REQUEST, "VALIDATION_ERROR", e.to_string()),
            AppError::Conflict(msg) => (StatusCode::CONFLICT, "CONFLICT", msg.clone()),
            AppError::Auth(e) => match e {
                AuthError::InvalidCredentials => {
                    (StatusCode::UNAUTHORIZED, "INVALID_CREDENTIALS", e.to_string())
                }
                AuthError::InvalidRefreshToken => {
                    (StatusCode::UNAUTHORIZED, "INVALID_REFRESH_TOKEN", e.to_string())
                }
                AuthError::TokenInvalid => (StatusCode::UNAUTHORIZED, "TOKEN_INVALID", e.to_string()),
                AuthError::MissingToken => (StatusCode::UNAUTHORIZED, "MISSING_TOKEN", e.to_string()),
                AuthError::AccountInactive => {
                    (StatusCode::FORBIDDEN, "ACCOUNT_INACTIVE", e.to_string())
                }
            },
            AppError::Forbidden(msg) => (StatusCode::FORBIDDEN, "FORBIDDEN", msg.clone()),
            AppError::NotFound(msg) => (StatusCode::NOT_FOUND, "NOT_FOUND", msg.clone()),
            AppError::RateLimited(msg) => {
                (StatusCode::TOO_MANY_REQUESTS, "RATE_LIMITED", msg.clone())
            }
            AppError::Internal(_) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "INTERNAL_ERROR",
                "Internal server error".to_string(),
            ),
        }
    }
}

impl ErrorHandler for AppError {
    fn error_response(&self, request_id: &str) -> (StatusCode, ErrorResponse) {
        let (status, code, message) = self.classify();
        let body = ErrorResponse::new(
            request_id.to_string(),
            message,
            code.to_string(),
            status.as_u16(),
        );
        (status, body)
    }

    fn log_error(&self, request_id: &str) {
        match self {
            AppError::Internal(msg) => {
                tracing::error!(request_id = request_id, error = %msg, "Internal error");
            }
            AppError::Auth(e) => {
                tracing::warn!(request_id = request_id, error = %e, "Authentication error");
            }
            AppError::RateLimited(msg) => {
                tracing::warn!(request_id = request_id, error = %msg, "Rate limit exceeded");
            }
            other => {
                tracing::info!(request_id = request_id, error = %other, "Request rejected");
            }
        }
    }
}

impl ResponseError for AppError {
    fn error_response(&self) -> HttpResponse {
        let request_id = uuid::Uuid::new_v4().to_string();
        self.log_error(&request_id);

        let (status, body) = <Self as ErrorHandler>::error_response(self, &request_id);
        HttpResponse::build(status).json(body)
    }

    fn status_code(&self) -> StatusCode {
        self.classify().0
    }
}

// ============================================================================
// 4. ERROR CONTEXT ENRICHMENT
// ============================================================================

/// Per-operation context attached to log lines emitted by route handlers
#[derive(Debug, Clone)]
pub struct ErrorContext {
    pub request_id: String,
    pub user_id: Option<String>,
    pub operation: String,
    pub timestamp: chrono::DateTime<chrono::Utc>,
}

impl ErrorContext {
    pub fn new(operation: impl Into<String>) -> Self {
        Self {
            request_id: uuid::Uuid::new_v4().to_string(),
            user_id: None,
            operation: operation.into(),
            timestamp: chrono::Utc::now(),
        }
    }

    pub fn with_user_id(mut self, user_id: impl ToString) -> Self {
        self.user_id = Some(user_id.to_string());
        self
    }

    pub fn log_error(&self, error: &AppError) {
        let context = serde_json::json!({
            "request_id": self.request_id,
            "operation": self.operation,
            "user_id": self.user_id,
            "timestamp": self.timestamp.to_rfc3339(),
        });

        match error {
            AppError::Internal(_) => {
                tracing::error!(error = %error, context = %context, "Operation failed");
            }
            _ => {
                tracing::warn!(error = %error, context = %context, "Operation rejected");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validation_error_display() {
        let err = ValidationError::EmptyField("email".to_string());
        assert_eq!(err.to_string(), "email is empty");
    }

    #[test]
    fn test_policy_violation_becomes_validation_error() {
        let app_err: AppError = PolicyViolation::MissingSpecial.into();
        match app_err {
            AppError::Validation(ValidationError::WeakPassword(PolicyViolation::MissingSpecial)) => (),
            other => panic!("Expected WeakPassword, got {:?}", other),
        }
    }

    #[test]
    fn test_store_errors_are_reclassified() {
        let conflict: AppError = StoreError::UniqueViolation("users_email_key".to_string()).into();
        assert!(matches!(conflict, AppError::Conflict(_)));

        let refresh: AppError = StoreError::InvalidRefreshToken.into();
        assert_eq!(refresh, AppError::Auth(AuthError::InvalidRefreshToken));

        let internal: AppError = StoreError::Query("syntax error".to_string()).into();
        assert!(matches!(internal, AppError::Internal(_)));
    }

    #[test]
    fn test_status_codes() {
        assert_eq!(
            AppError::Auth(AuthError::InvalidCredentials).status_code(),
            StatusCode::UNAUTHORIZED
        );
        assert_eq!(
            AppError::Auth(AuthError::AccountInactive).status_code(),
            StatusCode::FORBIDDEN
        );
        assert_eq!(AppError::Conflict("x".into()).status_code(), StatusCode::CONFLICT);
        assert_eq!(
            AppError::RateLimited("x".into()).status_code(),
            StatusCode::TOO_MANY_REQUESTS
        );
    }

    #[test]
    fn test_internal_details_are_not_exposed() {
        let err = AppError::Internal("connection refused on 10.0.0.3".to_string());
        let (status, body) = <AppError as ErrorHandler>::error_response(&err, "req-1");

        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body.message, "Internal server error");
        assert_eq!(body.error_id, "req-1");
    }

    #[test]
    fn test_error_context_creation() {
        let ctx = ErrorContext::new("test_operation");
        assert_eq!(ctx.operation, "test_operation");
        assert!(ctx.user_id.is_none());

        let ctx_with_user = ctx.with_user_id("user-123");
        assert_eq!(ctx_with_user.user_id, Some("user-123".to_string()));
    }
}
