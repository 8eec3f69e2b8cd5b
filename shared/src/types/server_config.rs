use std::fmt;
use std::time::Duration;

use serde::Deserialize;
use thiserror::Error;

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("TOML parse error: {0}")]
    TomlParse(#[from] toml::de::Error),
}

// ---------------------------------------------------------------------------
// Config structs
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    #[serde(default = "default_bind")]
    pub bind: String,
    #[serde(default = "default_port")]
    pub port: u16,
    /// Request bodies above this size are answered with 413.
    #[serde(default = "default_max_body_bytes")]
    pub max_body_bytes: usize,
    /// Header carrying the real client address when running behind a proxy,
    /// e.g. `x-forwarded-for`. Unset means the socket peer address is used.
    #[serde(default)]
    pub trusted_proxy_header: Option<String>,
    /// Networks (CIDR) allowed to set `trusted_proxy_header`. Empty means any
    /// peer is trusted, which is only safe when the port is not public.
    #[serde(default)]
    pub trusted_proxies: Vec<String>,
    /// Always mark the session cookie `Secure`, even when the request does
    /// not look like it arrived over TLS.
    #[serde(default)]
    pub force_secure_cookies: bool,
}

#[derive(Deserialize, Clone)]
pub struct AuthConfig {
    /// HMAC key used to sign and verify session tokens.
    ///
    /// Prefer loading this via the `JWT_SECRET` environment variable; this
    /// field is the fallback. **Minimum length:** 32 characters. Rotating it
    /// logs every user out.
    #[serde(default)]
    pub jwt_secret: Option<String>,
    #[serde(default = "default_cookie_name")]
    pub cookie_name: String,
    /// Key for signing CSRF tokens. `CSRF_SECRET` takes priority; when
    /// neither is set a key is derived from the JWT secret.
    #[serde(default)]
    pub csrf_secret: Option<String>,
    /// Scheme of the hashes in the credential store. Unknown usernames are
    /// checked against a dummy hash of this scheme so that a miss costs as
    /// much as a wrong password.
    #[serde(default)]
    pub password_scheme: PasswordScheme,
    /// Work factor of stored bcrypt hashes; only read for `"bcrypt"`.
    #[serde(default = "default_bcrypt_cost")]
    pub bcrypt_cost: u32,
}

#[derive(Debug, Deserialize, Clone, Copy, Default, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum PasswordScheme {
    #[default]
    Argon2id,
    Bcrypt,
}

/// One fixed-window policy: at most `limit` requests per `window_secs`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PolicyConfig {
    pub limit: u64,
    pub window_secs: u64,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(from = "RawRateLimitConfig")]
pub struct RateLimitConfig {
    /// Applied to every `/api/` request.
    pub standard: PolicyConfig,
    /// Applied to login and contact-form submissions.
    pub strict: PolicyConfig,
    /// How long an idle counter survives past its window before collection.
    pub grace_secs: u64,
    pub gc_interval_secs: u64,
}

/// A `[rate_limit.<policy>]` table as written. Omitted keys keep that
/// policy's default.
#[derive(Debug, Deserialize, Default)]
struct PolicyOverrides {
    limit: Option<u64>,
    window_secs: Option<u64>,
}

impl PolicyOverrides {
    fn apply(self, base: PolicyConfig) -> PolicyConfig {
        PolicyConfig {
            limit: self.limit.unwrap_or(base.limit),
            window_secs: self.window_secs.unwrap_or(base.window_secs),
        }
    }
}

#[derive(Debug, Deserialize)]
struct RawRateLimitConfig {
    #[serde(default)]
    standard: PolicyOverrides,
    #[serde(default)]
    strict: PolicyOverrides,
    #[serde(default = "default_grace_secs")]
    grace_secs: u64,
    #[serde(default = "default_gc_interval_secs")]
    gc_interval_secs: u64,
}

impl From<RawRateLimitConfig> for RateLimitConfig {
    fn from(raw: RawRateLimitConfig) -> Self {
        Self {
            standard: raw.standard.apply(default_standard_policy()),
            strict: raw.strict.apply(default_strict_policy()),
            grace_secs: raw.grace_secs,
            gc_interval_secs: raw.gc_interval_secs,
        }
    }
}

#[derive(Debug, Deserialize, Clone, Default)]
pub struct DatabaseConfig {
    /// SQLite URL of the credential store, e.g. `sqlite://portfolio.db`.
    #[serde(default)]
    pub url: Option<String>,
}

#[derive(Debug, Deserialize, Clone, Default)]
pub struct AppConfig {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub auth: AuthConfig,
    #[serde(default)]
    pub rate_limit: RateLimitConfig,
    #[serde(default)]
    pub database: DatabaseConfig,
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

impl ServerConfig {
    /// Full bind address, e.g. `"0.0.0.0:3000"`
    pub fn addr(&self) -> String {
        format!("{}:{}", self.bind, self.port)
    }
}

impl AuthConfig {
    /// Resolve the signing secret with the `JWT_SECRET` env var taking
    /// priority over the config file field.
    ///
    /// Returns `None` when neither source is set (the server startup code
    /// treats this as fatal).
    pub fn resolved_jwt_secret(&self) -> Option<String> {
        std::env::var("JWT_SECRET")
            .ok()
            .filter(|s| !s.is_empty())
            .or_else(|| self.jwt_secret.clone())
            .filter(|s| !s.is_empty())
    }

    /// `CSRF_SECRET` env var, then the config field. `None` means the key
    /// is derived from the JWT secret.
    pub fn resolved_csrf_secret(&self) -> Option<String> {
        std::env::var("CSRF_SECRET")
            .ok()
            .filter(|s| !s.is_empty())
            .or_else(|| self.csrf_secret.clone())
            .filter(|s| !s.is_empty())
    }
}

impl PolicyConfig {
    pub fn window(&self) -> Duration {
        Duration::from_secs(self.window_secs)
    }
}

impl RateLimitConfig {
    pub fn grace(&self) -> Duration {
        Duration::from_secs(self.grace_secs)
    }

    pub fn gc_interval(&self) -> Duration {
        Duration::from_secs(self.gc_interval_secs)
    }
}

// The secret must never end up in a log line via `{:?}`.
impl fmt::Debug for AuthConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AuthConfig")
            .field("jwt_secret", &self.jwt_secret.as_ref().map(|_| "<redacted>"))
            .field("cookie_name", &self.cookie_name)
            .field("csrf_secret", &self.csrf_secret.as_ref().map(|_| "<redacted>"))
            .field("password_scheme", &self.password_scheme)
            .field("bcrypt_cost", &self.bcrypt_cost)
            .finish()
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
            port: default_port(),
            max_body_bytes: default_max_body_bytes(),
            trusted_proxy_header: None,
            trusted_proxies: Vec::new(),
            force_secure_cookies: false,
        }
    }
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            jwt_secret: None,
            cookie_name: default_cookie_name(),
            csrf_secret: None,
            password_scheme: PasswordScheme::default(),
            bcrypt_cost: default_bcrypt_cost(),
        }
    }
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            standard: default_standard_policy(),
            strict: default_strict_policy(),
            grace_secs: default_grace_secs(),
            gc_interval_secs: default_gc_interval_secs(),
        }
    }
}

// ---------------------------------------------------------------------------
// Serde defaults
// ---------------------------------------------------------------------------

pub fn default_bind() -> String {
    "127.0.0.1".to_string()
}

pub fn default_port() -> u16 {
    3000
}

pub fn default_max_body_bytes() -> usize {
    64 * 1024
}

pub fn default_cookie_name() -> String {
    "auth_token".to_string()
}

/// Cost of the seeded legacy hashes.
pub fn default_bcrypt_cost() -> u32 {
    10
}

/// 60 requests per minute.
pub fn default_standard_policy() -> PolicyConfig {
    PolicyConfig {
        limit: 60,
        window_secs: 60,
    }
}

/// 5 attempts per 15 minutes.
pub fn default_strict_policy() -> PolicyConfig {
    PolicyConfig {
        limit: 5,
        window_secs: 15 * 60,
    }
}

pub fn default_grace_secs() -> u64 {
    60
}

pub fn default_gc_interval_secs() -> u64 {
    60
}
