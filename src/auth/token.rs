//! Single-use, time-limited tokens
//!
//! Tokens authorize exactly one email verification or password reset.
//! The raw token is a hex string of 32 random bytes; only its SHA-256
//! digest is persisted, so a leaked table cannot be replayed.
//!
//! State per purpose: absent -> issued -> consumed | expired. Issuing a
//! new token replaces the previous one of the same purpose.

use std::sync::Arc;

use chrono::{Duration, Utc};
use sha2::{Digest, Sha256};

use crate::database::{Database, TokenConsumption, TokenEffect};
use crate::error::AuthError;
use crate::models::TokenPurpose;

use super::password::{validate_token_format, PasswordService, DEFAULT_TOKEN_BYTES};

/// Length of a raw token in hex characters
pub const TOKEN_HEX_LENGTH: usize = DEFAULT_TOKEN_BYTES * 2;

/// Hash a raw token for storage and lookup (unsalted SHA-256, hex)
pub fn hash_token(token: &str) -> String {
    hex::encode(Sha256::digest(token.as_bytes()))
}

/// Whether `token` has the shape of an issued single-use token
pub fn is_well_formed(token: &str) -> bool {
    validate_token_format(token, Some(TOKEN_HEX_LENGTH))
}

/// Issues and consumes single-use tokens
pub struct TokenService<D: Database> {
    db: Arc<D>,
    passwords: PasswordService,
}

impl<D: Database> TokenService<D> {
    pub fn new(db: Arc<D>, passwords: PasswordService) -> Self {
        Self { db, passwords }
    }

    /// Issue a token for `user_id`, valid for `ttl`
    ///
    /// Returns the raw token. Any earlier token of the same purpose stops working.
    pub async fn issue(
        &self,
        user_id: i64,
        purpose: TokenPurpose,
        ttl: Duration,
    ) -> Result<String, AuthError> {
        let token = self.passwords.generate_token(DEFAULT_TOKEN_BYTES)?;
        let expires_at = Utc::now() + ttl;

        self.db
            .store_token(user_id, purpose, &hash_token(&token), expires_at)
            .await?;

        tracing::debug!(user_id = user_id, purpose = %purpose, "Issued single-use token");
        Ok(token)
    }

    /// Consume a token and apply `effect` atomically
    ///
    /// Returns the owning user ID. Unknown or already-used tokens give
    /// `TokenInvalid`; expired ones give `TokenExpired` and are cleared.
    pub async fn consume(
        &self,
        token: &str,
        purpose: TokenPurpose,
        effect: TokenEffect,
    ) -> Result<i64, AuthError> {
        if !is_well_formed(token) {
            return Err(AuthError::TokenInvalid);
        }

        let outcome = self
            .db
            .consume_token(purpose, &hash_token(token), effect, Utc::now())
            .await?;

        match outcome {
            TokenConsumption::Consumed { user_id } => {
                tracing::debug!(user_id = user_id, purpose = %purpose, "Consumed single-use token");
                Ok(user_id)
            }
            TokenConsumption::Expired => Err(AuthError::TokenExpired),
            TokenConsumption::NotFound => Err(AuthError::TokenInvalid),
        }
    }
}
