//! Database schema for marketplace-auth
//!
//! Timestamps are stored as fixed-width RFC 3339 UTC strings with
//! millisecond precision, so comparing them as text orders them in time.

/// SQL statements creating the schema
pub const CREATE_SCHEMA: &str = r#"
PRAGMA foreign_keys = ON;

-- Credential records
CREATE TABLE IF NOT EXISTS users (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    email TEXT NOT NULL COLLATE NOCASE UNIQUE,
    display_name TEXT,
    password_hash TEXT NOT NULL,
    email_verified INTEGER NOT NULL DEFAULT 0,
    failed_login_attempts INTEGER NOT NULL DEFAULT 0 CHECK (failed_login_attempts >= 0),
    locked_until TEXT,
    last_login_at TEXT,
    last_login_ip TEXT,
    verification_token_hash TEXT,
    verification_token_expires_at TEXT,
    reset_token_hash TEXT,
    reset_token_expires_at TEXT,
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL
);

CREATE UNIQUE INDEX IF NOT EXISTS idx_users_verification_token
    ON users(verification_token_hash) WHERE verification_token_hash IS NOT NULL;
CREATE UNIQUE INDEX IF NOT EXISTS idx_users_reset_token
    ON users(reset_token_hash) WHERE reset_token_hash IS NOT NULL;

-- Authenticated sessions
CREATE TABLE IF NOT EXISTS auth_sessions (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    token_hash TEXT NOT NULL UNIQUE,
    user_id INTEGER NOT NULL REFERENCES users(id) ON DELETE CASCADE,
    expires_at TEXT NOT NULL,
    created_at TEXT NOT NULL,
    last_accessed_at TEXT NOT NULL,
    ip_address TEXT,
    user_agent TEXT
);

CREATE INDEX IF NOT EXISTS idx_auth_sessions_user ON auth_sessions(user_id);
CREATE INDEX IF NOT EXISTS idx_auth_sessions_expires ON auth_sessions(expires_at);

-- Append-only security audit log
CREATE TABLE IF NOT EXISTS security_events (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    event_type TEXT NOT NULL,
    success INTEGER NOT NULL,
    user_id INTEGER,
    email TEXT,
    ip_address TEXT,
    user_agent TEXT,
    details TEXT NOT NULL DEFAULT 'null',
    created_at TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_security_events_created ON security_events(created_at);
CREATE INDEX IF NOT EXISTS idx_security_events_type ON security_events(event_type, created_at);
CREATE INDEX IF NOT EXISTS idx_security_events_email ON security_events(email);
CREATE INDEX IF NOT EXISTS idx_security_events_ip ON security_events(ip_address);

CREATE TRIGGER IF NOT EXISTS security_events_append_only
    BEFORE UPDATE ON security_events
BEGIN
    SELECT RAISE(ABORT, 'security_events is append-only');
END;

-- Fixed-window rate limit counters
CREATE TABLE IF NOT EXISTS rate_limit_windows (
    key TEXT PRIMARY KEY,
    count INTEGER NOT NULL CHECK (count >= 0),
    window_start TEXT NOT NULL,
    window_end TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_rate_limit_windows_end ON rate_limit_windows(window_end);
"#;

/// Schema version recorded in `PRAGMA user_version`
pub const SCHEMA_VERSION: u32 = 1;

/// Create the schema and stamp its version
pub fn apply(conn: &rusqlite::Connection) -> rusqlite::Result<()> {
    conn.execute_batch(CREATE_SCHEMA)?;
    conn.pragma_update(None, "user_version", SCHEMA_VERSION)
}

/// Read the schema version stamped on `conn`
pub fn schema_version(conn: &rusqlite::Connection) -> rusqlite::Result<u32> {
    conn.query_row("PRAGMA user_version", [], |row| row.get(0))
}
