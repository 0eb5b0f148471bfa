/// Password Policy, Hashing and Verification
///
/// The policy is configurable (character classes, forbidden words, maximum
/// run length) and rejects predictable shapes such as keyboard rows and
/// repeated blocks. Hashing uses bcrypt with a tunable cost; the plaintext
/// is never logged or stored.

use bcrypt::{hash, verify};
use std::collections::HashSet;
use std::fmt;

use crate::error::AppError;

pub const MIN_PASSWORD_LENGTH: usize = 8;
pub const MAX_PASSWORD_LENGTH: usize = 128;
pub const DEFAULT_BCRYPT_COST: u32 = 10;
pub const DEFAULT_MAX_CONSECUTIVE: usize = 3;

/// Shortest slice of a sequence that counts as "sequential"
const SEQUENCE_WINDOW: usize = 4;

const SEQUENCES: [&str; 10] = [
    "abcdefghijklmnopqrstuvwxyz",
    "zyxwvutsrqponmlkjihgfedcba",
    "0123456789",
    "9876543210",
    "qwertyuiop",
    "poiuytrewq",
    "asdfghjkl",
    "lkjhgfdsa",
    "zxcvbnm",
    "mnbvcxz",
];

const DEFAULT_FORBIDDEN_WORDS: [&str; 11] = [
    "password",
    "123456",
    "qwerty",
    "abc123",
    "password123",
    "admin",
    "root",
    "user",
    "test",
    "guest",
    "demo",
];

/// Substrings that cost strength points
const WEAK_SUBSTRINGS: [&str; 3] = ["password", "123456", "qwerty"];

/// The specific rule a candidate password failed
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PolicyViolation {
    TooShort(usize),
    TooLong(usize),
    MissingUppercase,
    MissingLowercase,
    MissingNumber,
    MissingSpecial,
    ForbiddenWord(String),
    TooManyConsecutive(usize),
    SequentialCharacters,
    RepeatedPattern,
}

impl fmt::Display for PolicyViolation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PolicyViolation::TooShort(min) => {
                write!(f, "password must be at least {} characters long", min)
            }
            PolicyViolation::TooLong(max) => {
                write!(f, "password must be no more than {} characters long", max)
            }
            PolicyViolation::MissingUppercase => {
                write!(f, "password must contain at least one uppercase letter")
            }
            PolicyViolation::MissingLowercase => {
                write!(f, "password must contain at least one lowercase letter")
            }
            PolicyViolation::MissingNumber => write!(f, "password must contain at least one number"),
            PolicyViolation::MissingSpecial => {
                write!(f, "password must contain at least one special character")
            }
            PolicyViolation::ForbiddenWord(word) => {
                write!(f, "password contains forbidden word: {}", word)
            }
            PolicyViolation::TooManyConsecutive(max) => write!(
                f,
                "password cannot contain more than {} consecutive identical characters",
                max
            ),
            PolicyViolation::SequentialCharacters => {
                write!(f, "password contains sequential characters")
            }
            PolicyViolation::RepeatedPattern => write!(f, "password contains repeated patterns"),
        }
    }
}

impl std::error::Error for PolicyViolation {}

/// Password requirements
#[derive(Debug, Clone)]
pub struct PasswordPolicy {
    pub min_length: usize,
    pub max_length: usize,
    pub require_uppercase: bool,
    pub require_lowercase: bool,
    pub require_number: bool,
    pub require_special: bool,
    pub forbidden_words: Vec<String>,
    /// Longest allowed run of one character; 0 disables the check
    pub max_consecutive: usize,
}

impl Default for PasswordPolicy {
    fn default() -> Self {
        Self {
            min_length: MIN_PASSWORD_LENGTH,
            max_length: MAX_PASSWORD_LENGTH,
            require_uppercase: true,
            require_lowercase: true,
            require_number: true,
            require_special: true,
            forbidden_words: DEFAULT_FORBIDDEN_WORDS.iter().map(|w| w.to_string()).collect(),
            max_consecutive: DEFAULT_MAX_CONSECUTIVE,
        }
    }
}

#[derive(Default)]
struct CharacterClasses {
    upper: bool,
    lower: bool,
    number: bool,
    special: bool,
}

impl CharacterClasses {
    fn of(password: &str) -> Self {
        let mut classes = Self::default();
        for c in password.chars() {
            if c.is_uppercase() {
                classes.upper = true;
            } else if c.is_lowercase() {
                classes.lower = true;
            } else if c.is_numeric() {
                classes.number = true;
            } else if is_special(c) {
                classes.special = true;
            }
        }
        classes
    }

    fn count(&self) -> u32 {
        [self.upper, self.lower, self.number, self.special]
            .iter()
            .filter(|present| **present)
            .count() as u32
    }
}

fn is_special(c: char) -> bool {
    !c.is_alphanumeric() && !c.is_whitespace() && !c.is_control()
}

impl PasswordPolicy {
    /// Check a candidate password against every rule, reporting the first failure
    ///
    /// Rules run in a fixed order: length, character classes, forbidden words,
    /// consecutive runs, sequences, repeated blocks.
    pub fn validate(&self, password: &str) -> Result<(), PolicyViolation> {
        let length = password.chars().count();
        if length < self.min_length {
            return Err(PolicyViolation::TooShort(self.min_length));
        }
        if length > self.max_length {
            return Err(PolicyViolation::TooLong(self.max_length));
        }

        let classes = CharacterClasses::of(password);
        if self.require_uppercase && !classes.upper {
            return Err(PolicyViolation::MissingUppercase);
        }
        if self.require_lowercase && !classes.lower {
            return Err(PolicyViolation::MissingLowercase);
        }
        if self.require_number && !classes.number {
            return Err(PolicyViolation::MissingNumber);
        }
        if self.require_special && !classes.special {
            return Err(PolicyViolation::MissingSpecial);
        }

        let lowered = password.to_lowercase();
        if let Some(word) = self
            .forbidden_words
            .iter()
            .find(|word| !word.is_empty() && lowered.contains(&word.to_lowercase()))
        {
            return Err(PolicyViolation::ForbiddenWord(word.clone()));
        }

        if self.max_consecutive > 0 && longest_run(password) > self.max_consecutive {
            return Err(PolicyViolation::TooManyConsecutive(self.max_consecutive));
        }

        if contains_sequence(&lowered) {
            return Err(PolicyViolation::SequentialCharacters);
        }

        if contains_repeated_block(password) {
            return Err(PolicyViolation::RepeatedPattern);
        }

        Ok(())
    }
}

fn longest_run(password: &str) -> usize {
    let mut longest = 0;
    let mut current = 0;
    let mut previous = None;

    for c in password.chars() {
        if Some(c) == previous {
            current += 1;
        } else {
            current = 1;
            previous = Some(c);
        }
        longest = longest.max(current);
    }
    longest
}

fn contains_sequence(lowered: &str) -> bool {
    SEQUENCES.iter().any(|sequence| {
        (0..=sequence.len() - SEQUENCE_WINDOW)
            .any(|start| lowered.contains(&sequence[start..start + SEQUENCE_WINDOW]))
    })
}

/// True when some block of two or more characters is immediately repeated,
/// e.g. "abab" or "xyzxyz"
fn contains_repeated_block(password: &str) -> bool {
    let chars: Vec<char> = password.chars().collect();
    let n = chars.len();

    for block in 2..=n / 2 {
        for start in 0..=n - 2 * block {
            if chars[start..start + block] == chars[start + block..start + 2 * block] {
                return true;
            }
        }
    }
    false
}

/// Informational strength score in [0, 100]; never used as a gate
pub fn password_strength(password: &str) -> u8 {
    let mut score: i32 = 0;

    let length = password.chars().count();
    for (threshold, points) in [(8, 10), (12, 10), (16, 5)] {
        if length >= threshold {
            score += points;
        }
    }

    score += 10 * CharacterClasses::of(password).count() as i32;

    let unique = password.chars().collect::<HashSet<_>>().len();
    for (threshold, points) in [(8, 10), (12, 10), (16, 5)] {
        if unique >= threshold {
            score += points;
        }
    }

    let lowered = password.to_lowercase();
    if WEAK_SUBSTRINGS.iter().any(|weak| lowered.contains(weak)) {
        score -= 20;
    }

    score.clamp(0, 100) as u8
}

/// Hash a password with bcrypt at the given cost
///
/// CPU bound; async callers should run it on a blocking thread.
pub fn hash_password(password: &str, cost: u32) -> Result<String, AppError> {
    hash(password, cost).map_err(|e| AppError::Internal(format!("Password hashing failed: {}", e)))
}

/// Verify a password against a bcrypt hash
///
/// # Errors
/// Returns error if the stored hash is malformed
pub fn verify_password(password: &str, hash: &str) -> Result<bool, AppError> {
    verify(password, hash)
        .map_err(|e| AppError::Internal(format!("Password verification failed: {}", e)))
}

#[cfg(test)]
mod tests {
    use super::*;

    const VALID: &str = "Secur3!Pass";

    fn policy() -> PasswordPolicy {
        PasswordPolicy::default()
    }

    #[test]
    fn test_valid_passwords_pass() {
        for password in [VALID, "Blue#Horse7Mo", "Tr0mb0ne$Zeal", "Kx9!fjPw2q"] {
            assert_eq!(policy().validate(password), Ok(()), "{}", password);
        }
    }

    #[test]
    fn test_each_rule_rejects_in_isolation() {
        let long = format!("{}{}", VALID, "x".repeat(MAX_PASSWORD_LENGTH));
        let cases = vec![
            ("Ab1!x", PolicyViolation::TooShort(MIN_PASSWORD_LENGTH)),
            (long.as_str(), PolicyViolation::TooLong(MAX_PASSWORD_LENGTH)),
            ("secur3!pass", PolicyViolation::MissingUppercase),
            ("SECUR3!PASS", PolicyViolation::MissingLowercase),
            ("Secure!Pass", PolicyViolation::MissingNumber),
            ("Secur3Pass", PolicyViolation::MissingSpecial),
            ("Xy7!admin", PolicyViolation::ForbiddenWord("admin".to_string())),
            ("Secur3!Paaaa", PolicyViolation::TooManyConsecutive(DEFAULT_MAX_CONSECUTIVE)),
            ("Xy7!abcdQ", PolicyViolation::SequentialCharacters),
            ("Zx7!mnbvQ", PolicyViolation::SequentialCharacters),
            ("Xy7!kzkzQ", PolicyViolation::RepeatedPattern),
        ];

        for (password, expected) in cases {
            assert_eq!(policy().validate(password), Err(expected), "{}", password);
        }
    }

    #[test]
    fn test_forbidden_words_are_case_insensitive() {
        assert_eq!(
            policy().validate("Xy7!GUEST"),
            Err(PolicyViolation::ForbiddenWord("guest".to_string()))
        );
    }

    #[test]
    fn test_character_classes_are_configurable() {
        let relaxed = PasswordPolicy {
            require_special: false,
            require_uppercase: false,
            ..PasswordPolicy::default()
        };
        assert_eq!(relaxed.validate("secur3pass"), Ok(()));
        assert_eq!(relaxed.validate("securepass"), Err(PolicyViolation::MissingNumber));
    }

    #[test]
    fn test_consecutive_limit_is_configurable() {
        let strict = PasswordPolicy {
            max_consecutive: 1,
            ..PasswordPolicy::default()
        };
        assert_eq!(
            strict.validate(VALID),
            Err(PolicyViolation::TooManyConsecutive(1))
        );

        let disabled = PasswordPolicy {
            max_consecutive: 0,
            ..PasswordPolicy::default()
        };
        // the run of four is still a repeated block ("aa" + "aa")
        assert_eq!(
            disabled.validate("Secur3!Paaaa"),
            Err(PolicyViolation::RepeatedPattern)
        );
    }

    #[test]
    fn test_length_counts_characters_not_bytes() {
        // seven characters, more than eight bytes
        assert_eq!(
            policy().validate("Ünï7!çé"),
            Err(PolicyViolation::TooShort(MIN_PASSWORD_LENGTH))
        );
    }

    #[test]
    fn test_repeated_block_detection() {
        assert!(contains_repeated_block("xyzxyz"));
        assert!(contains_repeated_block("1abab2"));
        assert!(!contains_repeated_block("aXbYcZ"));
        assert!(!contains_repeated_block("ss"));
    }

    #[test]
    fn test_strength_scores() {
        assert_eq!(password_strength(""), 0);
        // length 11 (10) + four classes (40) + ten unique characters (10)
        assert_eq!(password_strength(VALID), 60);
        assert!(password_strength("Password123!") < password_strength("Tr0mb0ne$Zeal"));
        assert!(password_strength(&"Aa1!Bb2@Cc3#Dd4$Ee5%".repeat(5)) <= 100);
    }

    #[test]
    fn test_hash_and_verify() {
        let hash = hash_password(VALID, 4).expect("Failed to hash password");

        assert_ne!(hash, VALID);
        assert!(hash.starts_with("$2"));
        assert!(verify_password(VALID, &hash).expect("Failed to verify"));
        assert!(!verify_password("Other7!Word", &hash).expect("Failed to verify"));
    }

    #[test]
    fn test_hashes_are_salted() {
        let first = hash_password(VALID, 4).unwrap();
        let second = hash_password(VALID, 4).unwrap();
        assert_ne!(first, second);
    }

    #[test]
    fn test_verify_rejects_malformed_hash() {
        assert!(verify_password(VALID, "not-a-bcrypt-hash").is_err());
    }
}
