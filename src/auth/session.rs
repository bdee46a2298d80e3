//! Authenticated session management
//!
//! Session tokens are 32 random bytes in base64url. Like single-use tokens
//! they are stored only as SHA-256 digests.

use std::sync::Arc;

use chrono::{Duration, Utc};

use crate::database::Database;
use crate::error::AuthError;
use crate::models::{AuthSession, ClientContext, IssuedSession};

use super::password::{validate_token_format, PasswordService, DEFAULT_TOKEN_BYTES};
use super::token::hash_token;

/// Length of a raw session token (32 bytes, unpadded base64url)
pub const SESSION_TOKEN_LENGTH: usize = 43;

/// Creates, validates and revokes sessions
pub struct SessionManager<D: Database> {
    db: Arc<D>,
    passwords: PasswordService,
    ttl: Duration,
}

impl<D: Database> SessionManager<D> {
    pub fn new(db: Arc<D>, passwords: PasswordService, ttl: Duration) -> Self {
        Self { db, passwords, ttl }
    }

    /// Session lifetime
    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Create a session for `user_id`
    pub async fn create(
        &self,
        user_id: i64,
        context: &ClientContext,
    ) -> Result<IssuedSession, AuthError> {
        let token = self.passwords.generate_token_base64(DEFAULT_TOKEN_BYTES)?;
        let now = Utc::now();

        let session = AuthSession {
            token_hash: hash_token(&token),
            user_id,
            expires_at: now + self.ttl,
            created_at: now,
            last_accessed_at: now,
            ip_address: context.ip_address.clone(),
            user_agent: context.user_agent.clone(),
        };
        self.db.create_session(&session).await?;

        tracing::debug!(user_id = user_id, expires_at = %session.expires_at, "Session created");
        Ok(IssuedSession { token, session })
    }

    /// Resolve a session token to its owner
    ///
    /// Expired sessions are deleted on the way out.
    pub async fn validate(&self, token: &str) -> Result<i64, AuthError> {
        Ok(self.lookup(token).await?.user_id)
    }

    /// Resolve a session token to the full session record
    pub async fn lookup(&self, token: &str) -> Result<AuthSession, AuthError> {
        if !validate_token_format(token, Some(SESSION_TOKEN_LENGTH)) {
            return Err(AuthError::SessionNotFound);
        }

        let token_hash = hash_token(token);
        let session = self
            .db
            .get_session(&token_hash)
            .await?
            .ok_or(AuthError::SessionNotFound)?;

        if session.is_expired(Utc::now()) {
            self.db.delete_session(&token_hash).await?;
            return Err(AuthError::SessionExpired);
        }

        Ok(session)
    }

    /// Bump last access of a live session
    pub async fn touch(&self, token: &str) -> Result<(), AuthError> {
        let touched = self.db.touch_session(&hash_token(token), Utc::now()).await?;
        if touched {
            Ok(())
        } else {
            Err(AuthError::SessionNotFound)
        }
    }

    /// Delete one session; true if it existed
    pub async fn revoke(&self, token: &str) -> Result<bool, AuthError> {
        Ok(self.db.delete_session(&hash_token(token)).await?)
    }

    /// Delete every session of `user_id`, optionally keeping one
    pub async fn revoke_all(&self, user_id: i64, except: Option<&str>) -> Result<u64, AuthError> {
        let removed = self
            .db
            .delete_user_sessions(user_id, except.map(hash_token))
            .await?;
        tracing::debug!(user_id = user_id, removed = removed, "Revoked user sessions");
        Ok(removed)
    }

    /// Delete sessions past their expiry
    pub async fn sweep_expired(&self) -> Result<u64, AuthError> {
        Ok(self.db.delete_expired_sessions(Utc::now()).await?)
    }
}
