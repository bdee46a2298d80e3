//! Password hashing, strength scoring and secure random tokens
//!
//! Passwords are hashed with Argon2id using a fresh random salt per call.
//! Verification always performs a full hash computation, even when the
//! stored hash is malformed or the account does not exist, so response
//! time does not reveal which case occurred.

use argon2::{
    password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString},
    Algorithm, Argon2, Params, Version,
};
use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine};
use rand::rngs::OsRng;
use rand::RngCore;
use serde::Serialize;

use crate::config::{HashingConfig, MIN_ITERATIONS, MIN_MEMORY_KIB};
use crate::error::PasswordError;

/// Default number of random bytes in a generated token
pub const DEFAULT_TOKEN_BYTES: usize = 32;

/// Tokens shorter than this many random bytes are rejected
pub const MIN_TOKEN_BYTES: usize = 16;

/// Minimum password length in characters
pub const MIN_PASSWORD_LENGTH: usize = 8;

const SPECIAL_CHARACTERS: &str = "!@#$%^&*()_+-=[]{};':\"\\|,.<>/?`~";

/// Passwords rejected regardless of their composition (compared lowercase)
const COMMON_PASSWORDS: &[&str] = &[
    "123456",
    "12345678",
    "123456789",
    "1234567890",
    "111111",
    "abc123",
    "admin",
    "admin123",
    "baseball",
    "changeme",
    "dragon",
    "football",
    "iloveyou",
    "letmein",
    "login",
    "master",
    "monkey",
    "p@ssw0rd",
    "p@ssword1",
    "passw0rd",
    "password",
    "password!",
    "password1",
    "password1!",
    "password123",
    "password123!",
    "princess",
    "qwerty",
    "qwerty123",
    "qwerty123!",
    "sunshine",
    "trustno1",
    "welcome",
    "welcome1",
    "welcome123!",
];

/// Result of a password strength check
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StrengthReport {
    pub valid: bool,
    /// Every violated rule, in a fixed order
    pub errors: Vec<String>,
    /// 0 to 100, monotonic in length and satisfied rules
    pub score: u8,
}

/// Password hashing and verification service
#[derive(Clone)]
pub struct PasswordService {
    argon2: Argon2<'static>,
    /// Hash of a random secret, verified against when there is nothing real to check
    dummy_hash: String,
}

impl std::fmt::Debug for PasswordService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PasswordService")
            .field("params", self.argon2.params())
            .finish()
    }
}

impl PasswordService {
    /// Create a password service with the given cost parameters
    ///
    /// Fails with `WeakParameters` when the parameters are below the safety floor.
    pub fn new(config: HashingConfig) -> Result<Self, PasswordError> {
        if config.memory_kib < MIN_MEMORY_KIB {
            return Err(PasswordError::WeakParameters(format!(
                "memory cost {} KiB is below the minimum of {} KiB",
                config.memory_kib, MIN_MEMORY_KIB
            )));
        }
        if config.iterations < MIN_ITERATIONS {
            return Err(PasswordError::WeakParameters(format!(
                "iteration count {} is below the minimum of {}",
                config.iterations, MIN_ITERATIONS
            )));
        }
        if config.parallelism == 0 {
            return Err(PasswordError::WeakParameters(
                "parallelism must be at least 1".to_string(),
            ));
        }

        let params = Params::new(
            config.memory_kib,
            config.iterations,
            config.parallelism,
            None,
        )
        .map_err(|e| PasswordError::WeakParameters(e.to_string()))?;
        let argon2 = Argon2::new(Algorithm::Argon2id, Version::V0x13, params);

        let mut service = Self {
            argon2,
            dummy_hash: String::new(),
        };
        let dummy_secret = service.generate_token(DEFAULT_TOKEN_BYTES)?;
        service.dummy_hash = service.hash(&dummy_secret)?;

        Ok(service)
    }

    /// Hash a password with a fresh random salt
    ///
    /// Returns an algorithm-tagged PHC string (`$argon2id$...`).
    pub fn hash(&self, password: &str) -> Result<String, PasswordError> {
        if password.is_empty() {
            return Err(PasswordError::EmptyPassword);
        }

        let salt = SaltString::generate(&mut OsRng);
        self.argon2
            .hash_password(password.as_bytes(), &salt)
            .map(|hash| hash.to_string())
            .map_err(|e| PasswordError::Hash(e.to_string()))
    }

    /// Verify a password against a stored hash
    ///
    /// Never fails: malformed hashes and empty passwords return `false`
    /// after doing the same amount of work as a real verification.
    pub fn verify(&self, password: &str, hash: &str) -> bool {
        if password.is_empty() {
            self.verify_dummy(password);
            return false;
        }

        match PasswordHash::new(hash) {
            Ok(parsed) => self
                .argon2
                .verify_password(password.as_bytes(), &parsed)
                .is_ok(),
            Err(_) => {
                self.verify_dummy(password);
                false
            }
        }
    }

    /// Spend one verification worth of time without a real hash
    ///
    /// Used when the account being logged into does not exist.
    pub fn verify_dummy(&self, password: &str) {
        if let Ok(parsed) = PasswordHash::new(&self.dummy_hash) {
            let _ = self.argon2.verify_password(password.as_bytes(), &parsed);
        }
    }

    /// Check a password against the strength rules
    pub fn validate_strength(&self, password: &str) -> StrengthReport {
        validate_strength(password)
    }

    /// Generate a hex token from `byte_length` random bytes
    pub fn generate_token(&self, byte_length: usize) -> Result<String, PasswordError> {
        random_bytes(byte_length).map(hex::encode)
    }

    /// Generate a base64url (unpadded) token from `byte_length` random bytes
    pub fn generate_token_base64(&self, byte_length: usize) -> Result<String, PasswordError> {
        random_bytes(byte_length).map(|bytes| URL_SAFE_NO_PAD.encode(bytes))
    }
}

/// Evaluate all strength rules, reporting every violation
pub fn validate_strength(password: &str) -> StrengthReport {
    if password.is_empty() {
        return StrengthReport {
            valid: false,
            errors: vec!["Password is required".to_string()],
            score: 0,
        };
    }

    let length = password.chars().count();
    let rules: [(bool, &str); 6] = [
        (
            length >= MIN_PASSWORD_LENGTH,
            "Password must be at least 8 characters long",
        ),
        (
            password.chars().any(|c| c.is_uppercase()),
            "Password must contain at least one uppercase letter",
        ),
        (
            password.chars().any(|c| c.is_lowercase()),
            "Password must contain at least one lowercase letter",
        ),
        (
            password.chars().any(|c| c.is_ascii_digit()),
            "Password must contain at least one number",
        ),
        (
            password.chars().any(|c| SPECIAL_CHARACTERS.contains(c)),
            "Password must contain at least one special character",
        ),
        (!is_common_password(password), "Password is too common"),
    ];

    let errors: Vec<String> = rules
        .iter()
        .filter(|(ok, _)| !ok)
        .map(|(_, message)| message.to_string())
        .collect();

    let satisfied = rules.iter().filter(|(ok, _)| *ok).count();
    let length_points = (length * 4).min(40);
    let score = (length_points + satisfied * 10).min(100) as u8;

    StrengthReport {
        valid: errors.is_empty(),
        errors,
        score,
    }
}

/// Check a token's alphabet and length
///
/// Accepts the URL-safe alphabets produced by the generators (hex and
/// base64url). With `expected_length` the token must have exactly that
/// many characters; without it, enough for the minimum entropy.
pub fn validate_token_format(token: &str, expected_length: Option<usize>) -> bool {
    if !token
        .bytes()
        .all(|b| b.is_ascii_alphanumeric() || b == b'-' || b == b'_')
    {
        return false;
    }

    match expected_length {
        Some(len) => token.len() == len,
        // 16 bytes in base64url is the shortest acceptable encoding
        None => token.len() >= 22,
    }
}

fn is_common_password(password: &str) -> bool {
    let lowered = password.to_lowercase();
    COMMON_PASSWORDS.contains(&lowered.as_str())
}

fn random_bytes(byte_length: usize) -> Result<Vec<u8>, PasswordError> {
    if byte_length < MIN_TOKEN_BYTES {
        return Err(PasswordError::InsufficientEntropy {
            requested: byte_length,
            minimum: MIN_TOKEN_BYTES,
        });
    }

    let mut bytes = vec![0u8; byte_length];
    OsRng.fill_bytes(&mut bytes);
    Ok(bytes)
}
