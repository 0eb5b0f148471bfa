/// JWT Token Generation and Validation
///
/// Every login or refresh mints a pair: a short-lived access token and a
/// long-lived refresh token, signed with separate HS256 secrets and sharing
/// one random session id. Validation checks the signature and time window
/// first, then type, issuer and audience, then the identity claims.

use chrono::{DateTime, Utc};
use jsonwebtoken::errors::ErrorKind;
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use sha2::{Digest, Sha256};
use std::fmt;
use uuid::Uuid;

use crate::auth::claims::{JwtClaims, SessionId, TokenClaims, TokenKind};
use crate::configuration::JwtSettings;
use crate::models::User;

/// Reasons a token can be rejected
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TokenError {
    InvalidSignature,
    Expired,
    WrongType,
    WrongIssuer,
    WrongAudience,
    Malformed(String),
    Signing(String),
}

impl fmt::Display for TokenError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TokenError::InvalidSignature => write!(f, "invalid token signature"),
            TokenError::Expired => write!(f, "token is expired or not yet valid"),
            TokenError::WrongType => write!(f, "unexpected token type"),
            TokenError::WrongIssuer => write!(f, "invalid token issuer"),
            TokenError::WrongAudience => write!(f, "invalid token audience"),
            TokenError::Malformed(reason) => write!(f, "malformed token: {}", reason),
            TokenError::Signing(reason) => write!(f, "token signing failed: {}", reason),
        }
    }
}

impl std::error::Error for TokenError {}

impl From<jsonwebtoken::errors::Error> for TokenError {
    fn from(e: jsonwebtoken::errors::Error) -> Self {
        match e.kind() {
            ErrorKind::InvalidSignature => TokenError::InvalidSignature,
            ErrorKind::ExpiredSignature | ErrorKind::ImmatureSignature => TokenError::Expired,
            _ => TokenError::Malformed(e.to_string()),
        }
    }
}

/// Token pair returned to clients
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TokenPair {
    pub access_token: String,
    pub refresh_token: String,
    pub token_type: String,
    /// Access token lifetime in seconds
    pub expires_in: i64,
}

/// A freshly minted pair plus what the caller needs to persist the session
#[derive(Debug, Clone)]
pub struct IssuedTokens {
    pub pair: TokenPair,
    pub session_id: SessionId,
    pub refresh_expires_at: DateTime<Utc>,
}

struct KeyPair {
    encoding: EncodingKey,
    decoding: DecodingKey,
}

impl KeyPair {
    fn from_secret(secret: &str) -> Self {
        Self {
            encoding: EncodingKey::from_secret(secret.as_bytes()),
            decoding: DecodingKey::from_secret(secret.as_bytes()),
        }
    }
}

/// Signs and validates access and refresh tokens
///
/// Cheap to clone; keys are shared.
#[derive(Clone)]
pub struct TokenCodec {
    access_keys: std::sync::Arc<KeyPair>,
    refresh_keys: std::sync::Arc<KeyPair>,
    issuer: String,
    audience: String,
    access_ttl: i64,
    refresh_ttl: i64,
}

impl TokenCodec {
    pub fn new(settings: &JwtSettings) -> Self {
        Self {
            access_keys: std::sync::Arc::new(KeyPair::from_secret(&settings.access_secret)),
            refresh_keys: std::sync::Arc::new(KeyPair::from_secret(&settings.refresh_secret)),
            issuer: settings.issuer.clone(),
            audience: settings.audience.clone(),
            access_ttl: settings.access_token_expiry,
            refresh_ttl: settings.refresh_token_expiry,
        }
    }

    pub fn refresh_ttl(&self) -> i64 {
        self.refresh_ttl
    }

    fn keys(&self, kind: TokenKind) -> &KeyPair {
        match kind {
            TokenKind::Access => &self.access_keys,
            TokenKind::Refresh => &self.refresh_keys,
        }
    }

    /// Mint an access/refresh pair for a user under a new session id
    ///
    /// # Errors
    /// Returns `TokenError::Signing` if either token cannot be encoded
    pub fn generate_token_pair(&self, user: &User) -> Result<IssuedTokens, TokenError> {
        let session_id = SessionId::generate();
        let issued_at = Utc::now().timestamp();

        let access_token = self.sign(user, &session_id, TokenKind::Access, issued_at)?;
        let refresh_token = self.sign(user, &session_id, TokenKind::Refresh, issued_at)?;

        let refresh_expires_at = DateTime::<Utc>::from_timestamp(issued_at + self.refresh_ttl, 0)
            .ok_or_else(|| TokenError::Signing("refresh expiry out of range".to_string()))?;

        Ok(IssuedTokens {
            pair: TokenPair {
                access_token,
                refresh_token,
                token_type: "Bearer".to_string(),
                expires_in: self.access_ttl,
            },
            session_id,
            refresh_expires_at,
        })
    }

    fn sign(
        &self,
        user: &User,
        session_id: &SessionId,
        kind: TokenKind,
        issued_at: i64,
    ) -> Result<String, TokenError> {
        let ttl = match kind {
            TokenKind::Access => self.access_ttl,
            TokenKind::Refresh => self.refresh_ttl,
        };
        let claims = JwtClaims::new(
            user.id,
            &user.username,
            session_id,
            kind,
            &self.issuer,
            &self.audience,
            issued_at,
            ttl,
        );
        encode(&Header::new(Algorithm::HS256), &claims, &self.keys(kind).encoding)
            .map_err(|e| TokenError::Signing(e.to_string()))
    }

    /// Validate an access token and extract its claims
    ///
    /// # Errors
    /// Returns the first check that failed; no claims are returned on failure
    pub fn validate_access_token(&self, token: &str) -> Result<TokenClaims, TokenError> {
        self.validate(token, TokenKind::Access)
    }

    /// Validate a refresh token and extract its claims
    pub fn validate_refresh_token(&self, token: &str) -> Result<TokenClaims, TokenError> {
        self.validate(token, TokenKind::Refresh)
    }

    fn validate(&self, token: &str, expected: TokenKind) -> Result<TokenClaims, TokenError> {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.leeway = 0;
        validation.validate_nbf = true;
        // audience is compared below, after type and issuer
        validation.validate_aud = false;
        validation.set_required_spec_claims(&["exp", "nbf"]);

        let claims = decode::<Map<String, Value>>(token, &self.keys(expected).decoding, &validation)?
            .claims;

        let kind = claims
            .get("type")
            .and_then(Value::as_str)
            .and_then(TokenKind::parse);
        if kind != Some(expected) {
            return Err(TokenError::WrongType);
        }
        if claims.get("iss").and_then(Value::as_str) != Some(self.issuer.as_str()) {
            return Err(TokenError::WrongIssuer);
        }
        if claims.get("aud").and_then(Value::as_str) != Some(self.audience.as_str()) {
            return Err(TokenError::WrongAudience);
        }

        let user_id = string_claim(&claims, "user_id")?;
        let user_id = Uuid::parse_str(user_id)
            .map_err(|_| TokenError::Malformed("user_id is not a valid UUID".to_string()))?;
        let username = string_claim(&claims, "username")?.to_string();
        let session_id = SessionId::from(string_claim(&claims, "token_id")?.to_string());

        let exp = claims
            .get("exp")
            .and_then(Value::as_i64)
            .ok_or_else(|| TokenError::Malformed("exp is not an integer".to_string()))?;
        let expires_at = DateTime::<Utc>::from_timestamp(exp, 0)
            .ok_or_else(|| TokenError::Malformed("exp out of range".to_string()))?;

        Ok(TokenClaims {
            user_id,
            username,
            session_id,
            kind: expected,
            expires_at,
        })
    }
}

fn string_claim<'a>(claims: &'a Map<String, Value>, name: &str) -> Result<&'a str, TokenError> {
    claims
        .get(name)
        .and_then(Value::as_str)
        .filter(|value| !value.is_empty())
        .ok_or_else(|| TokenError::Malformed(format!("missing {} claim", name)))
}

/// SHA-256 hex digest of a signed refresh token
///
/// Only this digest is stored; the raw token never leaves the response.
pub fn hash_refresh_token(token: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(token.as_bytes());
    format!("{:x}", hasher.finalize())
}
