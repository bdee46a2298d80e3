//! Configuration management for marketplace-auth
//!
//! This module handles loading, parsing, and validating application configuration
//! from YAML files and environment variables. Every recognised option is a
//! field with an explicit default; [`Config::validate`] rejects unsafe values
//! before any service is constructed.

use serde::{Deserialize, Serialize};
use std::path::Path;

/// Lowest accepted Argon2 memory cost in KiB
pub const MIN_MEMORY_KIB: u32 = 8192;

/// Lowest accepted Argon2 iteration count
pub const MIN_ITERATIONS: u32 = 2;

/// Longest accepted window, lifetime or lockout (one year)
pub const MAX_DURATION_SECS: u64 = 365 * 24 * 60 * 60;

/// Longest accepted monitoring window or interval, in minutes
pub const MAX_WINDOW_MINUTES: u32 = (MAX_DURATION_SECS / 60) as u32;

/// Longest accepted security event retention
pub const MAX_RETENTION_DAYS: u32 = 3650;

/// Convert configured seconds to a `chrono::Duration`, saturating at
/// [`MAX_DURATION_SECS`] so unvalidated values cannot overflow timestamps
pub fn bounded_seconds(secs: u64) -> chrono::Duration {
    chrono::Duration::seconds(secs.min(MAX_DURATION_SECS) as i64)
}

/// Main application configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct Config {
    /// HTTP server configuration
    #[serde(default)]
    pub server: ServerConfig,

    /// Authentication policy
    #[serde(default)]
    pub auth: AuthConfig,

    /// Per-operation rate limits
    #[serde(default)]
    pub rate_limits: RateLimitsConfig,

    /// Security monitoring scheduler
    #[serde(default)]
    pub monitoring: MonitoringConfig,

    /// Notification delivery
    #[serde(default)]
    pub notify: NotifyConfig,

    /// Database configuration
    #[serde(default)]
    pub database: DatabaseConfig,

    /// OpenTelemetry configuration
    #[serde(default)]
    pub otel: OtelConfig,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl Config {
    /// Load configuration from a YAML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path.as_ref())
            .map_err(|e| ConfigError::FileRead(format!("Failed to read config file: {}", e)))?;
        Self::from_yaml(&content)
    }

    /// Parse configuration from a YAML string
    pub fn from_yaml(yaml: &str) -> Result<Self, ConfigError> {
        let expanded = expand_env_vars(yaml);
        serde_yaml::from_str(&expanded)
            .map_err(|e| ConfigError::Parse(format!("Failed to parse YAML: {}", e)))
    }

    /// Load configuration from environment variables with prefix MARKETPLACE_AUTH_
    pub fn from_env() -> Result<Self, ConfigError> {
        let mut config = Config::default();

        if let Ok(host) = std::env::var("MARKETPLACE_AUTH_SERVER_HOST") {
            config.server.host = host;
        }
        if let Some(port) = env_parse("MARKETPLACE_AUTH_SERVER_PORT")? {
            config.server.port = port;
        }
        if let Some(trust) = env_parse("MARKETPLACE_AUTH_SERVER_TRUST_FORWARDED_FOR")? {
            config.server.trust_forwarded_for = trust;
        }

        if let Ok(path) = std::env::var("MARKETPLACE_AUTH_DATABASE_PATH") {
            config.database.path = path;
        }

        if let Ok(hash) = std::env::var("MARKETPLACE_AUTH_ADMIN_PASSWORD_HASH") {
            config.auth.admin_password_hash = Some(hash);
        }
        if let Ok(url) = std::env::var("MARKETPLACE_AUTH_PUBLIC_BASE_URL") {
            config.auth.public_base_url = url;
        }
        if let Some(required) = env_parse("MARKETPLACE_AUTH_REQUIRE_EMAIL_VERIFICATION")? {
            config.auth.require_email_verification = required;
        }
        if let Some(memory) = env_parse("MARKETPLACE_AUTH_HASH_MEMORY_KIB")? {
            config.auth.hashing.memory_kib = memory;
        }
        if let Some(iterations) = env_parse("MARKETPLACE_AUTH_HASH_ITERATIONS")? {
            config.auth.hashing.iterations = iterations;
        }
        if let Some(threshold) = env_parse("MARKETPLACE_AUTH_LOCKOUT_THRESHOLD")? {
            config.auth.lockout.threshold = threshold;
        }
        if let Some(duration) = env_parse("MARKETPLACE_AUTH_LOCKOUT_DURATION_SECS")? {
            config.auth.lockout.duration_secs = duration;
        }
        if let Some(ttl) = env_parse("MARKETPLACE_AUTH_VERIFICATION_TTL_SECS")? {
            config.auth.tokens.verification_ttl_secs = ttl;
        }
        if let Some(ttl) = env_parse("MARKETPLACE_AUTH_PASSWORD_RESET_TTL_SECS")? {
            config.auth.tokens.password_reset_ttl_secs = ttl;
        }
        if let Some(ttl) = env_parse("MARKETPLACE_AUTH_SESSION_TTL_SECS")? {
            config.auth.session.ttl_secs = ttl;
        }

        if let Some(enabled) = env_parse("MARKETPLACE_AUTH_MONITORING_ENABLED")? {
            config.monitoring.enabled = enabled;
        }
        if let Some(interval) = env_parse("MARKETPLACE_AUTH_MONITORING_INTERVAL_MINUTES")? {
            config.monitoring.interval_minutes = interval;
        }

        if let Ok(level) = std::env::var("MARKETPLACE_AUTH_LOG_LEVEL") {
            config.logging.level = level;
        }

        if let Some(enabled) = env_parse("MARKETPLACE_AUTH_OTEL_ENABLED")? {
            config.otel.enabled = enabled;
        }
        if let Ok(endpoint) = std::env::var("MARKETPLACE_AUTH_OTEL_ENDPOINT") {
            config.otel.endpoint = Some(endpoint);
        }

        Ok(config)
    }

    /// Reject configuration values that would weaken the security core
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.auth.hashing.validate()?;

        if self.auth.lockout.threshold == 0 {
            return Err(ConfigError::InvalidValue(
                "auth.lockout.threshold must be at least 1".to_string(),
            ));
        }
        check_duration("auth.lockout.duration_secs", self.auth.lockout.duration_secs)?;
        check_duration(
            "auth.tokens.verification_ttl_secs",
            self.auth.tokens.verification_ttl_secs,
        )?;
        check_duration(
            "auth.tokens.password_reset_ttl_secs",
            self.auth.tokens.password_reset_ttl_secs,
        )?;
        check_duration("auth.session.ttl_secs", self.auth.session.ttl_secs)?;
        check_duration(
            "auth.session.sweep_interval_secs",
            self.auth.session.sweep_interval_secs,
        )?;

        for (name, rule) in self.rate_limits.rules() {
            if rule.limit == 0 || rule.window_secs == 0 {
                return Err(ConfigError::InvalidValue(format!(
                    "rate_limits.{} requires limit and window_secs of at least 1",
                    name
                )));
            }
            check_duration(&format!("rate_limits.{}.window_secs", name), rule.window_secs)?;
        }

        if self.monitoring.interval_minutes == 0
            || self.monitoring.interval_minutes > u64::from(MAX_WINDOW_MINUTES)
        {
            return Err(ConfigError::InvalidValue(format!(
                "monitoring.interval_minutes must be between 1 and {}",
                MAX_WINDOW_MINUTES
            )));
        }
        if self.monitoring.retention_days == 0
            || self.monitoring.retention_days > MAX_RETENTION_DAYS
        {
            return Err(ConfigError::InvalidValue(format!(
                "monitoring.retention_days must be between 1 and {}",
                MAX_RETENTION_DAYS
            )));
        }
        for (name, threshold) in self.monitoring.thresholds.entries() {
            if !threshold.is_valid() {
                return Err(ConfigError::InvalidValue(format!(
                    "monitoring.thresholds.{} requires count of at least 1 and window_minutes between 1 and {}",
                    name, MAX_WINDOW_MINUTES
                )));
            }
        }

        Ok(())
    }
}

fn check_duration(name: &str, secs: u64) -> Result<(), ConfigError> {
    if secs == 0 || secs > MAX_DURATION_SECS {
        return Err(ConfigError::InvalidValue(format!(
            "{} must be between 1 and {} seconds",
            name, MAX_DURATION_SECS
        )));
    }
    Ok(())
}

fn env_parse<T: std::str::FromStr>(name: &str) -> Result<Option<T>, ConfigError> {
    match std::env::var(name) {
        Ok(value) => value
            .parse()
            .map(Some)
            .map_err(|_| ConfigError::Parse(format!("Invalid value for {}: {}", name, value))),
        Err(_) => Ok(None),
    }
}

/// HTTP server configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ServerConfig {
    /// Host address to bind to
    #[serde(default = "default_host")]
    pub host: String,

    /// Port to listen on
    #[serde(default = "default_port")]
    pub port: u16,

    /// Use the first X-Forwarded-For entry as the client address
    #[serde(default)]
    pub trust_forwarded_for: bool,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            trust_forwarded_for: false,
        }
    }
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    8080
}

/// Authentication policy configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AuthConfig {
    /// Argon2 PHC hash of the admin password; admin endpoints are disabled when unset
    #[serde(default)]
    pub admin_password_hash: Option<String>,

    /// Reject logins for accounts whose email is not verified
    #[serde(default = "default_require_email_verification")]
    pub require_email_verification: bool,

    /// Base URL used when building links in outgoing emails
    #[serde(default = "default_public_base_url")]
    pub public_base_url: String,

    /// Password hashing cost
    #[serde(default)]
    pub hashing: HashingConfig,

    /// Account lockout policy
    #[serde(default)]
    pub lockout: LockoutConfig,

    /// Single-use token lifetimes
    #[serde(default)]
    pub tokens: TokenTtlConfig,

    /// Session lifetime
    #[serde(default)]
    pub session: SessionConfig,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            admin_password_hash: None,
            require_email_verification: default_require_email_verification(),
            public_base_url: default_public_base_url(),
            hashing: HashingConfig::default(),
            lockout: LockoutConfig::default(),
            tokens: TokenTtlConfig::default(),
            session: SessionConfig::default(),
        }
    }
}

fn default_require_email_verification() -> bool {
    true
}

fn default_public_base_url() -> String {
    "http://localhost:8080".to_string()
}

/// Argon2id cost parameters
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct HashingConfig {
    /// Memory cost in KiB
    #[serde(default = "default_memory_kib")]
    pub memory_kib: u32,

    /// Number of passes
    #[serde(default = "default_iterations")]
    pub iterations: u32,

    /// Degree of parallelism
    #[serde(default = "default_parallelism")]
    pub parallelism: u32,
}

impl HashingConfig {
    /// Cheapest parameters still accepted by the safety floor
    pub fn minimum() -> Self {
        Self {
            memory_kib: MIN_MEMORY_KIB,
            iterations: MIN_ITERATIONS,
            parallelism: 1,
        }
    }

    /// Check the parameters against the safety floor
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.memory_kib < MIN_MEMORY_KIB {
            return Err(ConfigError::InvalidValue(format!(
                "auth.hashing.memory_kib {} is below the minimum of {}",
                self.memory_kib, MIN_MEMORY_KIB
            )));
        }
        if self.iterations < MIN_ITERATIONS {
            return Err(ConfigError::InvalidValue(format!(
                "auth.hashing.iterations {} is below the minimum of {}",
                self.iterations, MIN_ITERATIONS
            )));
        }
        if self.parallelism == 0 {
            return Err(ConfigError::InvalidValue(
                "auth.hashing.parallelism must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}

impl Default for HashingConfig {
    fn default() -> Self {
        Self {
            memory_kib: default_memory_kib(),
            iterations: default_iterations(),
            parallelism: default_parallelism(),
        }
    }
}

fn default_memory_kib() -> u32 {
    19456
}

fn default_iterations() -> u32 {
    2
}

fn default_parallelism() -> u32 {
    1
}

/// Account lockout policy
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct LockoutConfig {
    /// Consecutive failures that lock the account
    #[serde(default = "default_lockout_threshold")]
    pub threshold: u32,

    /// How long the lock lasts (in seconds)
    #[serde(default = "default_lockout_duration")]
    pub duration_secs: u64,
}

impl Default for LockoutConfig {
    fn default() -> Self {
        Self {
            threshold: default_lockout_threshold(),
            duration_secs: default_lockout_duration(),
        }
    }
}

fn default_lockout_threshold() -> u32 {
    5
}

fn default_lockout_duration() -> u64 {
    900 // 15 minutes
}

/// Single-use token lifetimes
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct TokenTtlConfig {
    /// Email verification token lifetime (in seconds)
    #[serde(default = "default_verification_ttl")]
    pub verification_ttl_secs: u64,

    /// Password reset token lifetime (in seconds)
    #[serde(default = "default_password_reset_ttl")]
    pub password_reset_ttl_secs: u64,
}

impl Default for TokenTtlConfig {
    fn default() -> Self {
        Self {
            verification_ttl_secs: default_verification_ttl(),
            password_reset_ttl_secs: default_password_reset_ttl(),
        }
    }
}

fn default_verification_ttl() -> u64 {
    86400 // 24 hours
}

fn default_password_reset_ttl() -> u64 {
    3600 // 1 hour
}

/// Session lifetime configuration
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct SessionConfig {
    /// Session lifetime (in seconds)
    #[serde(default = "default_session_ttl")]
    pub ttl_secs: u64,

    /// Interval between expired session and rate-limit window sweeps (in seconds)
    #[serde(default = "default_sweep_interval")]
    pub sweep_interval_secs: u64,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            ttl_secs: default_session_ttl(),
            sweep_interval_secs: default_sweep_interval(),
        }
    }
}

fn default_session_ttl() -> u64 {
    86400
}

fn default_sweep_interval() -> u64 {
    300
}

/// A single fixed-window rate limit rule
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct RateLimitRule {
    /// Maximum operations per window
    pub limit: u32,

    /// Window length (in seconds)
    pub window_secs: u64,
}

impl RateLimitRule {
    pub const fn new(limit: u32, window_secs: u64) -> Self {
        Self { limit, window_secs }
    }
}

/// Rate limit table, one rule per operation
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct RateLimitsConfig {
    /// Login attempts per client address
    #[serde(default = "default_login_ip")]
    pub login_ip: RateLimitRule,

    /// Login attempts per account email
    #[serde(default = "default_login_account")]
    pub login_account: RateLimitRule,

    /// Registrations per client address
    #[serde(default = "default_register")]
    pub register: RateLimitRule,

    /// Password reset requests per email
    #[serde(default = "default_password_reset")]
    pub password_reset: RateLimitRule,

    /// Password reset requests per client address
    #[serde(default = "default_password_reset_ip")]
    pub password_reset_ip: RateLimitRule,

    /// Password reset completions per client address
    #[serde(default = "default_password_reset_complete")]
    pub password_reset_complete: RateLimitRule,

    /// Password change attempts per account
    #[serde(default = "default_password_change")]
    pub password_change: RateLimitRule,

    /// Verification email resends per email
    #[serde(default = "default_verification_resend")]
    pub verification_resend: RateLimitRule,

    /// Admin authentication attempts per client address
    #[serde(default = "default_admin_auth")]
    pub admin_auth: RateLimitRule,
}

impl RateLimitsConfig {
    /// All rules with their configuration names
    pub fn rules(&self) -> [(&'static str, RateLimitRule); 9] {
        [
            ("login_ip", self.login_ip),
            ("login_account", self.login_account),
            ("register", self.register),
            ("password_reset", self.password_reset),
            ("password_reset_ip", self.password_reset_ip),
            ("password_reset_complete", self.password_reset_complete),
            ("password_change", self.password_change),
            ("verification_resend", self.verification_resend),
            ("admin_auth", self.admin_auth),
        ]
    }
}

impl Default for RateLimitsConfig {
    fn default() -> Self {
        Self {
            login_ip: default_login_ip(),
            login_account: default_login_account(),
            register: default_register(),
            password_reset: default_password_reset(),
            password_reset_ip: default_password_reset_ip(),
            password_reset_complete: default_password_reset_complete(),
            password_change: default_password_change(),
            verification_resend: default_verification_resend(),
            admin_auth: default_admin_auth(),
        }
    }
}

fn default_login_ip() -> RateLimitRule {
    RateLimitRule::new(30, 900)
}

fn default_login_account() -> RateLimitRule {
    RateLimitRule::new(10, 900)
}

fn default_register() -> RateLimitRule {
    RateLimitRule::new(5, 3600)
}

fn default_password_reset() -> RateLimitRule {
    RateLimitRule::new(3, 3600)
}

fn default_password_reset_ip() -> RateLimitRule {
    RateLimitRule::new(10, 3600)
}

fn default_password_reset_complete() -> RateLimitRule {
    RateLimitRule::new(20, 3600)
}

fn default_password_change() -> RateLimitRule {
    RateLimitRule::new(5, 900)
}

fn default_verification_resend() -> RateLimitRule {
    RateLimitRule::new(1, 60)
}

fn default_admin_auth() -> RateLimitRule {
    RateLimitRule::new(300, 900)
}

/// A monitoring threshold: `count` matching events within `window_minutes`
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Threshold {
    pub count: u32,
    #[serde(alias = "window_minutes")]
    pub window_minutes: u32,
}

impl Threshold {
    pub const fn new(count: u32, window_minutes: u32) -> Self {
        Self {
            count,
            window_minutes,
        }
    }

    pub fn is_valid(&self) -> bool {
        self.count > 0 && self.window_minutes > 0 && self.window_minutes <= MAX_WINDOW_MINUTES
    }
}

/// Thresholds evaluated by the monitoring scheduler
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct MonitoringThresholds {
    #[serde(default = "default_failed_logins_per_ip")]
    pub failed_logins_per_ip: Threshold,

    #[serde(default = "default_failed_logins_per_account")]
    pub failed_logins_per_account: Threshold,

    #[serde(default = "default_account_lockouts")]
    pub account_lockouts: Threshold,

    #[serde(default = "default_password_resets_per_ip")]
    pub password_resets_per_ip: Threshold,

    /// Distinct client addresses per user on successful logins
    #[serde(default = "default_ip_velocity")]
    pub ip_velocity: Threshold,
}

impl MonitoringThresholds {
    /// All thresholds with their configuration names
    pub fn entries(&self) -> [(&'static str, Threshold); 5] {
        [
            ("failed_logins_per_ip", self.failed_logins_per_ip),
            ("failed_logins_per_account", self.failed_logins_per_account),
            ("account_lockouts", self.account_lockouts),
            ("password_resets_per_ip", self.password_resets_per_ip),
            ("ip_velocity", self.ip_velocity),
        ]
    }
}

impl Default for MonitoringThresholds {
    fn default() -> Self {
        Self {
            failed_logins_per_ip: default_failed_logins_per_ip(),
            failed_logins_per_account: default_failed_logins_per_account(),
            account_lockouts: default_account_lockouts(),
            password_resets_per_ip: default_password_resets_per_ip(),
            ip_velocity: default_ip_velocity(),
        }
    }
}

fn default_failed_logins_per_ip() -> Threshold {
    Threshold::new(10, 15)
}

fn default_failed_logins_per_account() -> Threshold {
    Threshold::new(5, 15)
}

fn default_account_lockouts() -> Threshold {
    Threshold::new(3, 60)
}

fn default_password_resets_per_ip() -> Threshold {
    Threshold::new(5, 60)
}

fn default_ip_velocity() -> Threshold {
    Threshold::new(3, 60)
}

/// Security monitoring configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct MonitoringConfig {
    /// Start the scheduler at boot
    #[serde(default = "default_monitoring_enabled")]
    pub enabled: bool,

    /// Minutes between monitoring cycles
    #[serde(default = "default_interval_minutes")]
    pub interval_minutes: u64,

    /// Security events older than this are purged
    #[serde(default = "default_retention_days")]
    pub retention_days: u32,

    #[serde(default)]
    pub thresholds: MonitoringThresholds,
}

impl Default for MonitoringConfig {
    fn default() -> Self {
        Self {
            enabled: default_monitoring_enabled(),
            interval_minutes: default_interval_minutes(),
            retention_days: default_retention_days(),
            thresholds: MonitoringThresholds::default(),
        }
    }
}

fn default_monitoring_enabled() -> bool {
    true
}

fn default_interval_minutes() -> u64 {
    5
}

fn default_retention_days() -> u32 {
    90
}

/// How outgoing notifications are delivered
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum NotifyMode {
    /// Write a structured log line per message
    #[default]
    Log,
    /// Keep messages in memory
    Memory,
}

/// Notification configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct NotifyConfig {
    #[serde(default)]
    pub mode: NotifyMode,

    /// Sender address placed on outgoing emails
    #[serde(default = "default_from_address")]
    pub from_address: String,
}

impl Default for NotifyConfig {
    fn default() -> Self {
        Self {
            mode: NotifyMode::default(),
            from_address: default_from_address(),
        }
    }
}

fn default_from_address() -> String {
    "no-reply@marketplace.local".to_string()
}

/// Database configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DatabaseConfig {
    /// Path to SQLite database file
    #[serde(default = "default_database_path")]
    pub path: String,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: default_database_path(),
        }
    }
}

fn default_database_path() -> String {
    "marketplace-auth.db".to_string()
}

/// OpenTelemetry configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct OtelConfig {
    /// Whether OpenTelemetry is enabled
    #[serde(default)]
    pub enabled: bool,

    /// OTLP endpoint URL
    pub endpoint: Option<String>,

    /// Whether to use insecure connection
    #[serde(default)]
    pub insecure: bool,

    /// Service name for tracing
    #[serde(default = "default_service_name")]
    pub service_name: String,
}

impl Default for OtelConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            endpoint: None,
            insecure: false,
            service_name: default_service_name(),
        }
    }
}

fn default_service_name() -> String {
    "marketplace-auth".to_string()
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LoggingConfig {
    /// Log level
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Log format
    #[serde(default = "default_log_format")]
    pub format: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> String {
    "json".to_string()
}

/// Configuration error types
#[derive(Debug, thiserror::Error, Clone, PartialEq)]
pub enum ConfigError {
    /// Error reading configuration file
    #[error("Failed to read configuration file: {0}")]
    FileRead(String),

    /// Error parsing configuration
    #[error("Failed to parse configuration: {0}")]
    Parse(String),

    /// Invalid configuration value
    #[error("Invalid configuration value: {0}")]
    InvalidValue(String),

    /// Missing required configuration
    #[error("Missing required configuration: {0}")]
    MissingRequired(String),
}

/// Expand environment variables in a string
///
/// Supports `${VAR_NAME}` syntax. Unknown variables are left untouched.
fn expand_env_vars(input: &str) -> String {
    let re = match regex_lite::Regex::new(r"\$\{([^}]+)\}") {
        Ok(re) => re,
        Err(_) => return input.to_string(),
    };

    re.replace_all(input, |caps: &regex_lite::Captures| {
        let var_name = &caps[1];
        std::env::var(var_name).unwrap_or_else(|_| caps[0].to_string())
    })
    .into_owned()
}
