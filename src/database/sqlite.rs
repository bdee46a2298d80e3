//! SQLite implementation of the Database trait
//!
//! This module provides a SQLite-based implementation of the Database trait
//! using rusqlite and tokio-rusqlite for async operations. All calls share a
//! single background connection; the multi-statement operations additionally
//! run inside `IMMEDIATE` transactions so they stay atomic when several
//! processes share the database file.

use async_trait::async_trait;
use chrono::{DateTime, NaiveDateTime, SecondsFormat, Utc};
use rusqlite::{OptionalExtension, TransactionBehavior};
use tokio_rusqlite::Connection;

use super::migrations;
use super::{Database, FailedLoginOutcome, TokenConsumption, TokenEffect};
use crate::auth::ratelimit::{CounterStore, WindowState};
use crate::config::bounded_seconds;
use crate::error::DbError;
use crate::models::{
    AuthSession, EventFilter, NewUser, SecurityEvent, SecurityEventType, TokenPurpose, User,
};

const USER_COLUMNS: &str = "id, email, display_name, password_hash, email_verified, \
     failed_login_attempts, locked_until, last_login_at, last_login_ip, created_at, updated_at";

const SESSION_COLUMNS: &str =
    "token_hash, user_id, expires_at, created_at, last_accessed_at, ip_address, user_agent";

const EVENT_COLUMNS: &str =
    "id, event_type, success, user_id, email, ip_address, user_agent, details, created_at";

/// SQLite database implementation
pub struct SqliteDatabase {
    conn: Connection,
}

impl SqliteDatabase {
    /// Create a new SQLite database connection
    ///
    /// Use `:memory:` for in-memory database or a file path for persistent storage.
    pub async fn new(path: &str) -> Result<Self, DbError> {
        let conn = Connection::open(path).await?;

        conn.call(|conn| {
            migrations::apply(conn)?;
            Ok(())
        })
        .await?;

        Ok(Self { conn })
    }

    /// Create a new in-memory database (useful for testing)
    pub async fn in_memory() -> Result<Self, DbError> {
        Self::new(":memory:").await
    }
}

#[async_trait]
impl Database for SqliteDatabase {
    // =========================================================================
    // User operations
    // =========================================================================

    async fn create_user(&self, user: &NewUser) -> Result<User, DbError> {
        let email = user.email.clone();
        let display_name = user.display_name.clone();
        let password_hash = user.password_hash.clone();
        let now = format_timestamp(&Utc::now());

        let created = self
            .conn
            .call(move |conn| {
                let user = conn
                    .query_row(
                        &format!(
                            r#"
                            INSERT INTO users (email, display_name, password_hash, created_at, updated_at)
                            VALUES (?1, ?2, ?3, ?4, ?4)
                            ON CONFLICT DO NOTHING
                            RETURNING {}
                            "#,
                            USER_COLUMNS
                        ),
                        rusqlite::params![email, display_name, password_hash, now],
                        row_to_user,
                    )
                    .optional()?;
                Ok(user)
            })
            .await?;

        created.ok_or_else(|| DbError::ConstraintViolation("email already registered".to_string()))
    }

    async fn get_user(&self, id: i64) -> Result<Option<User>, DbError> {
        self.conn
            .call(move |conn| {
                let user = conn
                    .query_row(
                        &format!("SELECT {} FROM users WHERE id = ?1", USER_COLUMNS),
                        [id],
                        row_to_user,
                    )
                    .optional()?;
                Ok(user)
            })
            .await
            .map_err(Into::into)
    }

    async fn get_user_by_email(&self, email: &str) -> Result<Option<User>, DbError> {
        let email = email.to_string();

        self.conn
            .call(move |conn| {
                let user = conn
                    .query_row(
                        &format!("SELECT {} FROM users WHERE email = ?1", USER_COLUMNS),
                        [&email],
                        row_to_user,
                    )
                    .optional()?;
                Ok(user)
            })
            .await
            .map_err(Into::into)
    }

    async fn record_failed_login(
        &self,
        user_id: i64,
        threshold: u32,
        lock_until: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> Result<FailedLoginOutcome, DbError> {
        let now = format_timestamp(&now);
        let lock_until = format_timestamp(&lock_until);

        let outcome = self
            .conn
            .call(move |conn| {
                let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

                let was_locked: Option<bool> = tx
                    .query_row(
                        "SELECT locked_until IS NOT NULL AND locked_until > ?2 FROM users WHERE id = ?1",
                        rusqlite::params![user_id, now],
                        |row| row.get(0),
                    )
                    .optional()?;
                let Some(was_locked) = was_locked else {
                    return Ok(None);
                };

                // Every right-hand side sees the row as it was before the update.
                let (failed_attempts, locked) = tx.query_row(
                    r#"
                    UPDATE users SET
                        failed_login_attempts = CASE
                            WHEN locked_until IS NOT NULL AND locked_until <= ?3 THEN 1
                            ELSE failed_login_attempts + 1
                        END,
                        locked_until = CASE
                            WHEN locked_until IS NOT NULL AND locked_until > ?3 THEN locked_until
                            WHEN (CASE
                                    WHEN locked_until IS NOT NULL AND locked_until <= ?3 THEN 1
                                    ELSE failed_login_attempts + 1
                                  END) >= ?2 THEN ?4
                            ELSE NULL
                        END,
                        updated_at = ?3
                    WHERE id = ?1
                    RETURNING failed_login_attempts, locked_until
                    "#,
                    rusqlite::params![user_id, threshold, now, lock_until],
                    |row| Ok((row.get::<_, u32>(0)?, row.get::<_, Option<String>>(1)?)),
                )?;
                tx.commit()?;

                Ok(Some(FailedLoginOutcome {
                    failed_attempts,
                    newly_locked: !was_locked && locked.is_some(),
                    locked_until: locked.as_deref().and_then(parse_timestamp),
                }))
            })
            .await?;

        outcome.ok_or(DbError::NotFound)
    }

    async fn record_successful_login(
        &self,
        user_id: i64,
        ip_address: Option<String>,
        now: DateTime<Utc>,
    ) -> Result<(), DbError> {
        let now = format_timestamp(&now);

        let rows_affected = self
            .conn
            .call(move |conn| {
                let count = conn.execute(
                    r#"
                    UPDATE users SET
                        failed_login_attempts = 0,
                        locked_until = NULL,
                        last_login_at = ?2,
                        last_login_ip = ?3,
                        updated_at = ?2
                    WHERE id = ?1
                    "#,
                    rusqlite::params![user_id, now, ip_address],
                )?;
                Ok(count)
            })
            .await?;

        if rows_affected == 0 {
            return Err(DbError::NotFound);
        }

        Ok(())
    }

    async fn unlock_user(&self, user_id: i64, now: DateTime<Utc>) -> Result<(), DbError> {
        let now = format_timestamp(&now);

        let rows_affected = self
            .conn
            .call(move |conn| {
                let count = conn.execute(
                    r#"
                    UPDATE users SET failed_login_attempts = 0, locked_until = NULL, updated_at = ?2
                    WHERE id = ?1
                    "#,
                    rusqlite::params![user_id, now],
                )?;
                Ok(count)
            })
            .await?;

        if rows_affected == 0 {
            return Err(DbError::NotFound);
        }

        Ok(())
    }

    async fn update_password(
        &self,
        user_id: i64,
        password_hash: &str,
        keep_session: Option<String>,
        now: DateTime<Utc>,
    ) -> Result<u64, DbError> {
        let password_hash = password_hash.to_string();
        let now = format_timestamp(&now);

        let removed = self
            .conn
            .call(move |conn| {
                let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

                let updated = tx.execute(
                    r#"
                    UPDATE users SET
                        password_hash = ?2,
                        failed_login_attempts = 0,
                        locked_until = NULL,
                        reset_token_hash = NULL,
                        reset_token_expires_at = NULL,
                        updated_at = ?3
                    WHERE id = ?1
                    "#,
                    rusqlite::params![user_id, password_hash, now],
                )?;
                if updated == 0 {
                    return Ok(None);
                }

                let removed = tx.execute(
                    "DELETE FROM auth_sessions WHERE user_id = ?1 AND (?2 IS NULL OR token_hash <> ?2)",
                    rusqlite::params![user_id, keep_session],
                )?;

                tx.commit()?;
                Ok(Some(removed as u64))
            })
            .await?;

        removed.ok_or(DbError::NotFound)
    }

    // =========================================================================
    // Single-use token operations
    // =========================================================================

    async fn store_token(
        &self,
        user_id: i64,
        purpose: TokenPurpose,
        token_hash: &str,
        expires_at: DateTime<Utc>,
    ) -> Result<(), DbError> {
        let (hash_column, expiry_column) = token_columns(purpose);
        let token_hash = token_hash.to_string();
        let expires_at = format_timestamp(&expires_at);
        let now = format_timestamp(&Utc::now());

        let rows_affected = self
            .conn
            .call(move |conn| {
                let count = conn.execute(
                    &format!(
                        "UPDATE users SET {} = ?2, {} = ?3, updated_at = ?4 WHERE id = ?1",
                        hash_column, expiry_column
                    ),
                    rusqlite::params![user_id, token_hash, expires_at, now],
                )?;
                Ok(count)
            })
            .await?;

        if rows_affected == 0 {
            return Err(DbError::NotFound);
        }

        Ok(())
    }

    async fn consume_token(
        &self,
        purpose: TokenPurpose,
        token_hash: &str,
        effect: TokenEffect,
        now: DateTime<Utc>,
    ) -> Result<TokenConsumption, DbError> {
        let (hash_column, expiry_column) = token_columns(purpose);
        let token_hash = token_hash.to_string();
        let now = format_timestamp(&now);

        self.conn
            .call(move |conn| {
                let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

                // Clearing the token is the claim; only one caller can get a row back.
                let claimed: Option<i64> = tx
                    .query_row(
                        &format!(
                            r#"
                            UPDATE users SET {h} = NULL, {e} = NULL, updated_at = ?2
                            WHERE {h} = ?1 AND {e} > ?2
                            RETURNING id
                            "#,
                            h = hash_column,
                            e = expiry_column
                        ),
                        rusqlite::params![token_hash, now],
                        |row| row.get(0),
                    )
                    .optional()?;

                let outcome = match claimed {
                    Some(user_id) => {
                        match &effect {
                            TokenEffect::MarkEmailVerified => {
                                tx.execute(
                                    "UPDATE users SET email_verified = 1 WHERE id = ?1",
                                    [user_id],
                                )?;
                            }
                            TokenEffect::ReplacePassword { password_hash } => {
                                tx.execute(
                                    r#"
                                    UPDATE users SET
                                        password_hash = ?2,
                                        failed_login_attempts = 0,
                                        locked_until = NULL
                                    WHERE id = ?1
                                    "#,
                                    rusqlite::params![user_id, password_hash],
                                )?;
                                tx.execute(
                                    "DELETE FROM auth_sessions WHERE user_id = ?1",
                                    [user_id],
                                )?;
                            }
                        }
                        TokenConsumption::Consumed { user_id }
                    }
                    None => {
                        let cleared = tx.execute(
                            &format!(
                                "UPDATE users SET {h} = NULL, {e} = NULL, updated_at = ?2 WHERE {h} = ?1",
                                h = hash_column,
                                e = expiry_column
                            ),
                            rusqlite::params![token_hash, now],
                        )?;
                        if cleared > 0 {
                            TokenConsumption::Expired
                        } else {
                            TokenConsumption::NotFound
                        }
                    }
                };

                tx.commit()?;
                Ok(outcome)
            })
            .await
            .map_err(Into::into)
    }

    // =========================================================================
    // Session operations
    // =========================================================================

    async fn create_session(&self, session: &AuthSession) -> Result<(), DbError> {
        let token_hash = session.token_hash.clone();
        let user_id = session.user_id;
        let expires_at = format_timestamp(&session.expires_at);
        let created_at = format_timestamp(&session.created_at);
        let last_accessed_at = format_timestamp(&session.last_accessed_at);
        let ip_address = session.ip_address.clone();
        let user_agent = session.user_agent.clone();

        self.conn
            .call(move |conn| {
                conn.execute(
                    r#"
                    INSERT INTO auth_sessions
                    (token_hash, user_id, expires_at, created_at, last_accessed_at, ip_address, user_agent)
                    VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
                    "#,
                    rusqlite::params![
                        token_hash,
                        user_id,
                        expires_at,
                        created_at,
                        last_accessed_at,
                        ip_address,
                        user_agent
                    ],
                )?;
                Ok(())
            })
            .await?;

        Ok(())
    }

    async fn get_session(&self, token_hash: &str) -> Result<Option<AuthSession>, DbError> {
        let token_hash = token_hash.to_string();

        self.conn
            .call(move |conn| {
                let session = conn
                    .query_row(
                        &format!(
                            "SELECT {} FROM auth_sessions WHERE token_hash = ?1",
                            SESSION_COLUMNS
                        ),
                        [&token_hash],
                        row_to_session,
                    )
                    .optional()?;
                Ok(session)
            })
            .await
            .map_err(Into::into)
    }

    async fn touch_session(&self, token_hash: &str, now: DateTime<Utc>) -> Result<bool, DbError> {
        let token_hash = token_hash.to_string();
        let now = format_timestamp(&now);

        let rows_affected = self
            .conn
            .call(move |conn| {
                let count = conn.execute(
                    r#"
                    UPDATE auth_sessions SET last_accessed_at = ?2
                    WHERE token_hash = ?1 AND expires_at > ?2
                    "#,
                    rusqlite::params![token_hash, now],
                )?;
                Ok(count)
            })
            .await?;

        Ok(rows_affected > 0)
    }

    async fn delete_session(&self, token_hash: &str) -> Result<bool, DbError> {
        let token_hash = token_hash.to_string();

        let rows_affected = self
            .conn
            .call(move |conn| {
                let count = conn.execute(
                    "DELETE FROM auth_sessions WHERE token_hash = ?1",
                    [&token_hash],
                )?;
                Ok(count)
            })
            .await?;

        Ok(rows_affected > 0)
    }

    async fn delete_user_sessions(
        &self,
        user_id: i64,
        except_token_hash: Option<String>,
    ) -> Result<u64, DbError> {
        self.conn
            .call(move |conn| {
                let count = conn.execute(
                    "DELETE FROM auth_sessions WHERE user_id = ?1 AND (?2 IS NULL OR token_hash <> ?2)",
                    rusqlite::params![user_id, except_token_hash],
                )?;
                Ok(count as u64)
            })
            .await
            .map_err(Into::into)
    }

    async fn delete_expired_sessions(&self, now: DateTime<Utc>) -> Result<u64, DbError> {
        let now = format_timestamp(&now);

        self.conn
            .call(move |conn| {
                let count =
                    conn.execute("DELETE FROM auth_sessions WHERE expires_at <= ?1", [&now])?;
                Ok(count as u64)
            })
            .await
            .map_err(Into::into)
    }

    // =========================================================================
    // Security event operations
    // =========================================================================

    async fn insert_security_event(&self, event: &SecurityEvent) -> Result<i64, DbError> {
        let event_type = event.event_type.as_str();
        let success = event.success;
        let user_id = event.user_id;
        let email = event.email.clone();
        let ip_address = event.ip_address.clone();
        let user_agent = event.user_agent.clone();
        let details = event.details.to_string();
        let created_at = format_timestamp(&event.created_at);

        self.conn
            .call(move |conn| {
                conn.execute(
                    r#"
                    INSERT INTO security_events
                    (event_type, success, user_id, email, ip_address, user_agent, details, created_at)
                    VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
                    "#,
                    rusqlite::params![
                        event_type,
                        success,
                        user_id,
                        email,
                        ip_address,
                        user_agent,
                        details,
                        created_at
                    ],
                )?;
                Ok(conn.last_insert_rowid())
            })
            .await
            .map_err(Into::into)
    }

    async fn query_security_events(
        &self,
        filter: &EventFilter,
    ) -> Result<Vec<SecurityEvent>, DbError> {
        use rusqlite::types::Value;

        let mut conditions: Vec<String> = Vec::new();
        let mut values: Vec<Value> = Vec::new();

        if !filter.event_types.is_empty() {
            let placeholders = vec!["?"; filter.event_types.len()].join(", ");
            conditions.push(format!("event_type IN ({})", placeholders));
            values.extend(
                filter
                    .event_types
                    .iter()
                    .map(|t| Value::Text(t.as_str().to_string())),
            );
        }
        if let Some(user_id) = filter.user_id {
            conditions.push("user_id = ?".to_string());
            values.push(Value::Integer(user_id));
        }
        if let Some(email) = &filter.email {
            conditions.push("email = ? COLLATE NOCASE".to_string());
            values.push(Value::Text(email.clone()));
        }
        if let Some(ip) = &filter.ip_address {
            conditions.push("ip_address = ?".to_string());
            values.push(Value::Text(ip.clone()));
        }
        if let Some(success) = filter.success {
            conditions.push("success = ?".to_string());
            values.push(Value::Integer(i64::from(success)));
        }
        if let Some(since) = &filter.since {
            conditions.push("created_at >= ?".to_string());
            values.push(Value::Text(format_timestamp(since)));
        }
        if let Some(until) = &filter.until {
            conditions.push("created_at < ?".to_string());
            values.push(Value::Text(format_timestamp(until)));
        }

        let mut sql = format!("SELECT {} FROM security_events", EVENT_COLUMNS);
        if !conditions.is_empty() {
            sql.push_str(" WHERE ");
            sql.push_str(&conditions.join(" AND "));
        }
        sql.push_str(" ORDER BY created_at DESC, id DESC");
        if let Some(limit) = filter.limit {
            sql.push_str(" LIMIT ?");
            values.push(Value::Integer(i64::from(limit)));
        }

        self.conn
            .call(move |conn| {
                let mut stmt = conn.prepare(&sql)?;
                let events = stmt
                    .query_map(rusqlite::params_from_iter(values.iter()), row_to_event)?
                    .collect::<Result<Vec<_>, _>>()?;
                Ok(events)
            })
            .await
            .map_err(Into::into)
    }

    async fn delete_security_events_before(
        &self,
        cutoff: DateTime<Utc>,
    ) -> Result<u64, DbError> {
        let cutoff = format_timestamp(&cutoff);

        self.conn
            .call(move |conn| {
                let count =
                    conn.execute("DELETE FROM security_events WHERE created_at < ?1", [&cutoff])?;
                Ok(count as u64)
            })
            .await
            .map_err(Into::into)
    }
}

#[async_trait]
impl CounterStore for SqliteDatabase {
    async fn increment_if_below(
        &self,
        key: &str,
        limit: u32,
        window_secs: u64,
        now: DateTime<Utc>,
    ) -> Result<WindowState, DbError> {
        let key = key.to_string();
        let fresh_end = now + bounded_seconds(window_secs);

        self.conn
            .call(move |conn| {
                let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

                let existing = tx
                    .query_row(
                        "SELECT count, window_end FROM rate_limit_windows WHERE key = ?1",
                        [&key],
                        |row| Ok((row.get::<_, u32>(0)?, row.get::<_, String>(1)?)),
                    )
                    .optional()?
                    .and_then(|(count, end)| parse_timestamp(&end).map(|end| (count, end)));

                let state = match existing {
                    Some((count, window_end)) if window_end > now => {
                        if count >= limit {
                            WindowState {
                                count,
                                window_end,
                                incremented: false,
                            }
                        } else {
                            tx.execute(
                                "UPDATE rate_limit_windows SET count = count + 1 WHERE key = ?1",
                                [&key],
                            )?;
                            WindowState {
                                count: count + 1,
                                window_end,
                                incremented: true,
                            }
                        }
                    }
                    _ => {
                        tx.execute(
                            r#"
                            INSERT INTO rate_limit_windows (key, count, window_start, window_end)
                            VALUES (?1, 1, ?2, ?3)
                            ON CONFLICT(key) DO UPDATE SET
                                count = 1,
                                window_start = excluded.window_start,
                                window_end = excluded.window_end
                            "#,
                            rusqlite::params![
                                key,
                                format_timestamp(&now),
                                format_timestamp(&fresh_end)
                            ],
                        )?;
                        WindowState {
                            count: 1,
                            window_end: fresh_end,
                            incremented: true,
                        }
                    }
                };

                tx.commit()?;
                Ok(state)
            })
            .await
            .map_err(Into::into)
    }

    async fn reset(&self, key: &str) -> Result<(), DbError> {
        let key = key.to_string();

        self.conn
            .call(move |conn| {
                conn.execute("DELETE FROM rate_limit_windows WHERE key = ?1", [&key])?;
                Ok(())
            })
            .await?;

        Ok(())
    }

    async fn sweep_expired(&self, now: DateTime<Utc>) -> Result<u64, DbError> {
        let now = format_timestamp(&now);

        self.conn
            .call(move |conn| {
                let count =
                    conn.execute("DELETE FROM rate_limit_windows WHERE window_end <= ?1", [&now])?;
                Ok(count as u64)
            })
            .await
            .map_err(Into::into)
    }
}

// =============================================================================
// Helper functions
// =============================================================================

/// Column pair holding the digest and expiry for a token purpose
fn token_columns(purpose: TokenPurpose) -> (&'static str, &'static str) {
    match purpose {
        TokenPurpose::EmailVerification => {
            ("verification_token_hash", "verification_token_expires_at")
        }
        TokenPurpose::PasswordReset => ("reset_token_hash", "reset_token_expires_at"),
    }
}

/// Format a timestamp in the fixed-width form used for every stored time
pub(crate) fn format_timestamp(dt: &DateTime<Utc>) -> String {
    dt.to_rfc3339_opts(SecondsFormat::Millis, true)
}

/// Parse a stored timestamp
fn parse_timestamp(s: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(s)
        .ok()
        .map(|dt| dt.with_timezone(&Utc))
        .or_else(|| {
            // Try parsing SQLite's datetime format
            NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S")
                .ok()
                .map(|dt| dt.and_utc())
        })
}

fn required_timestamp(row: &rusqlite::Row<'_>, idx: usize) -> rusqlite::Result<DateTime<Utc>> {
    let raw: String = row.get(idx)?;
    parse_timestamp(&raw).ok_or_else(|| {
        rusqlite::Error::FromSqlConversionFailure(
            idx,
            rusqlite::types::Type::Text,
            format!("invalid timestamp: {}", raw).into(),
        )
    })
}

fn optional_timestamp(
    row: &rusqlite::Row<'_>,
    idx: usize,
) -> rusqlite::Result<Option<DateTime<Utc>>> {
    Ok(row
        .get::<_, Option<String>>(idx)?
        .as_deref()
        .and_then(parse_timestamp))
}

fn row_to_user(row: &rusqlite::Row<'_>) -> rusqlite::Result<User> {
    Ok(User {
        id: row.get(0)?,
        email: row.get(1)?,
        display_name: row.get(2)?,
        password_hash: row.get(3)?,
        email_verified: row.get(4)?,
        failed_login_attempts: row.get(5)?,
        locked_until: optional_timestamp(row, 6)?,
        last_login_at: optional_timestamp(row, 7)?,
        last_login_ip: row.get(8)?,
        created_at: required_timestamp(row, 9)?,
        updated_at: required_timestamp(row, 10)?,
    })
}

fn row_to_session(row: &rusqlite::Row<'_>) -> rusqlite::Result<AuthSession> {
    Ok(AuthSession {
        token_hash: row.get(0)?,
        user_id: row.get(1)?,
        expires_at: required_timestamp(row, 2)?,
        created_at: required_timestamp(row, 3)?,
        last_accessed_at: required_timestamp(row, 4)?,
        ip_address: row.get(5)?,
        user_agent: row.get(6)?,
    })
}

fn row_to_event(row: &rusqlite::Row<'_>) -> rusqlite::Result<SecurityEvent> {
    let event_type: String = row.get(1)?;
    let event_type = event_type.parse::<SecurityEventType>().map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(1, rusqlite::types::Type::Text, e.into())
    })?;
    let details: String = row.get(7)?;

    Ok(SecurityEvent {
        id: Some(row.get(0)?),
        event_type,
        success: row.get(2)?,
        user_id: row.get(3)?,
        email: row.get(4)?,
        ip_address: row.get(5)?,
        user_agent: row.get(6)?,
        details: serde_json::from_str(&details).unwrap_or(serde_json::Value::Null),
        created_at: required_timestamp(row, 8)?,
    })
}
