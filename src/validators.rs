/// Input validators
///
/// Shape checks for everything a client can send: length limits against
/// oversized input, format rules, and rejection of control characters and
/// injection-looking content. Each validator returns the normalized value.
/// Lengths are counted in characters, not bytes.

use lazy_static::lazy_static;
use regex::Regex;

use crate::error::ValidationError;

const MAX_EMAIL_LENGTH: usize = 254; // RFC 5321
const MIN_EMAIL_LENGTH: usize = 5;
const MAX_EMAIL_LOCAL_PART: usize = 64;

pub const MIN_USERNAME_LENGTH: usize = 3;
pub const MAX_USERNAME_LENGTH: usize = 20;

pub const MAX_TITLE_LENGTH: usize = 200;
pub const MAX_CONTENT_LENGTH: usize = 50_000;

const RESERVED_USERNAMES: [&str; 8] = [
    "admin",
    "root",
    "administrator",
    "api",
    "www",
    "mail",
    "ftp",
    "test",
];

lazy_static! {
    // RFC 5322 simplified
    static ref EMAIL_REGEX: Regex = Regex::new(
        r"^[a-zA-Z0-9.!#$%&'*+/=?^_`{|}~-]+@[a-zA-Z0-9](?:[a-zA-Z0-9-]{0,61}[a-zA-Z0-9])?(?:\.[a-zA-Z0-9](?:[a-zA-Z0-9-]{0,61}[a-zA-Z0-9])?)*$"
    ).unwrap();

    static ref USERNAME_REGEX: Regex = Regex::new(r"^[a-zA-Z0-9_]+$").unwrap();

    static ref SQL_INJECTION_PATTERNS: [Regex; 4] = [
        // Union-based
        Regex::new(r"(?i)\s+UNION\s+").unwrap(),
        // Comments and statement separators
        Regex::new(r"(--|;|/\*|\*/)").unwrap(),
        // Time-based blind injection
        Regex::new(r"(?i)(SLEEP|WAITFOR|BENCHMARK|DBMS_LOCK)\s*\(").unwrap(),
        // Boolean-based
        Regex::new(r#"(?i)(\bOR\b|\bAND\b)\s*(['"][0-9]*['"]|[0-9]*)\s*=\s*(['"][0-9]*['"]|[0-9]*|True|False)"#).unwrap(),
    ];
}

/// Validates and normalizes (trim, lowercase) an email address
pub fn is_valid_email(email: &str) -> Result<String, ValidationError> {
    let trimmed = email.trim();

    if trimmed.is_empty() {
        return Err(ValidationError::EmptyField("email".to_string()));
    }

    let length = trimmed.chars().count();
    if length < MIN_EMAIL_LENGTH {
        return Err(ValidationError::TooShort("email".to_string(), MIN_EMAIL_LENGTH));
    }
    if length > MAX_EMAIL_LENGTH {
        return Err(ValidationError::TooLong("email".to_string(), MAX_EMAIL_LENGTH));
    }

    if has_suspicious_email_patterns(trimmed) || contains_sql_injection_patterns(trimmed) {
        return Err(ValidationError::SuspiciousContent("email".to_string()));
    }

    if !EMAIL_REGEX.is_match(trimmed) {
        return Err(ValidationError::InvalidFormat("email".to_string()));
    }

    Ok(trimmed.to_lowercase())
}

/// Validates a username: 3-20 characters of letters, digits and underscore,
/// not a reserved name
pub fn is_valid_username(username: &str) -> Result<String, ValidationError> {
    let trimmed = username.trim();

    if trimmed.is_empty() {
        return Err(ValidationError::EmptyField("username".to_string()));
    }

    let length = trimmed.chars().count();
    if length < MIN_USERNAME_LENGTH {
        return Err(ValidationError::TooShort("username".to_string(), MIN_USERNAME_LENGTH));
    }
    if length > MAX_USERNAME_LENGTH {
        return Err(ValidationError::TooLong("username".to_string(), MAX_USERNAME_LENGTH));
    }

    if !USERNAME_REGEX.is_match(trimmed) {
        return Err(ValidationError::InvalidFormat("username".to_string()));
    }

    let lowered = trimmed.to_lowercase();
    if RESERVED_USERNAMES.contains(&lowered.as_str()) {
        return Err(ValidationError::ReservedName(trimmed.to_string()));
    }

    Ok(trimmed.to_string())
}

pub fn is_valid_post_title(title: &str) -> Result<String, ValidationError> {
    let trimmed = title.trim();

    if trimmed.is_empty() {
        return Err(ValidationError::EmptyField("title".to_string()));
    }
    if trimmed.chars().count() > MAX_TITLE_LENGTH {
        return Err(ValidationError::TooLong("title".to_string(), MAX_TITLE_LENGTH));
    }
    if trimmed.chars().any(|c| c.is_control()) {
        return Err(ValidationError::SuspiciousContent("title".to_string()));
    }

    Ok(trimmed.to_string())
}

/// Post bodies keep their formatting; only null bytes are refused
pub fn is_valid_post_content(content: &str) -> Result<String, ValidationError> {
    if content.trim().is_empty() {
        return Err(ValidationError::EmptyField("content".to_string()));
    }
    if content.chars().count() > MAX_CONTENT_LENGTH {
        return Err(ValidationError::TooLong("content".to_string(), MAX_CONTENT_LENGTH));
    }
    if content.contains('\0') {
        return Err(ValidationError::SuspiciousContent("content".to_string()));
    }

    Ok(content.to_string())
}

fn has_suspicious_email_patterns(email: &str) -> bool {
    if email.matches('@').count() != 1 {
        return true;
    }

    if let Some(at_pos) = email.find('@') {
        if email[..at_pos].len() > MAX_EMAIL_LOCAL_PART {
            return true;
        }
    }

    email.chars().any(|c| c.is_control())
}

fn contains_sql_injection_patterns(input: &str) -> bool {
    SQL_INJECTION_PATTERNS.iter().any(|pattern| pattern.is_match(input))
}
