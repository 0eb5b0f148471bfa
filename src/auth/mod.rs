/// Authentication module
///
/// Password policy and hashing, the JWT codec, the refresh token session
/// store and the service that ties them together.

pub mod claims;
pub mod jwt;
pub mod password;
pub mod refresh_token;
mod service;

pub use claims::{SessionId, TokenClaims, TokenKind};
pub use jwt::{hash_refresh_token, IssuedTokens, TokenCodec, TokenError, TokenPair};
pub use password::{hash_password, password_strength, verify_password, PasswordPolicy, PolicyViolation};
pub use refresh_token::{
    InMemoryRefreshTokenStore, PgRefreshTokenStore, RefreshTokenRecord, RefreshTokenStore,
};
pub use service::{AuthResponse, AuthService, LoginRequest, RefreshRequest, RegisterRequest};
