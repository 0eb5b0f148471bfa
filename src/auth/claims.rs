/// JWT Claims structures
///
/// `JwtClaims` is the wire payload signed into both tokens of a pair;
/// `TokenClaims` is what survives validation and is handed to callers.

use chrono::{DateTime, Utc};
use rand::rngs::OsRng;
use rand::RngCore;
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Bytes of entropy in a session identifier
const SESSION_ID_BYTES: usize = 16;

/// Which of the two tokens a claim set belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenKind {
    Access,
    Refresh,
}

impl TokenKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            TokenKind::Access => "access",
            TokenKind::Refresh => "refresh",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "access" => Some(TokenKind::Access),
            "refresh" => Some(TokenKind::Refresh),
            _ => None,
        }
    }
}

impl fmt::Display for TokenKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Session identifier shared by the access and refresh token of one pair
///
/// Carried as the `token_id` claim and used as the key of the refresh token
/// record, so logging out with an access token revokes its sibling refresh token.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SessionId(String);

impl SessionId {
    /// 128 random bits from the OS generator, hex encoded
    pub fn generate() -> Self {
        let mut bytes = [0u8; SESSION_ID_BYTES];
        OsRng.fill_bytes(&mut bytes);
        Self(bytes.iter().map(|b| format!("{:02x}", b)).collect())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<String> for SessionId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Signed payload of an access or refresh token
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct JwtClaims {
    pub user_id: String,
    pub username: String,
    pub token_id: String,
    #[serde(rename = "type")]
    pub kind: String,
    /// Issuer
    pub iss: String,
    /// Audience
    pub aud: String,
    /// Expiration time (Unix timestamp)
    pub exp: i64,
    /// Issued at (Unix timestamp)
    pub iat: i64,
    /// Not before (Unix timestamp, equal to `iat`)
    pub nbf: i64,
}

impl JwtClaims {
    /// Create claims for one token of a pair
    ///
    /// # Arguments
    /// * `user_id` - User's UUID
    /// * `username` - User's username
    /// * `session_id` - Identifier shared by both tokens of the pair
    /// * `kind` - Access or refresh
    /// * `issued_at` - Unix timestamp the pair was minted at
    /// * `ttl_seconds` - Lifetime of this token
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        user_id: Uuid,
        username: &str,
        session_id: &SessionId,
        kind: TokenKind,
        issuer: &str,
        audience: &str,
        issued_at: i64,
        ttl_seconds: i64,
    ) -> Self {
        Self {
            user_id: user_id.to_string(),
            username: username.to_string(),
            token_id: session_id.to_string(),
            kind: kind.as_str().to_string(),
            iss: issuer.to_string(),
            aud: audience.to_string(),
            exp: issued_at + ttl_seconds,
            iat: issued_at,
            nbf: issued_at,
        }
    }
}

/// Claims of a token that passed every validation step
#[derive(Debug, Clone, PartialEq)]
pub struct TokenClaims {
    pub user_id: Uuid,
    pub username: String,
    pub session_id: SessionId,
    pub kind: TokenKind,
    pub expires_at: DateTime<Utc>,
}
