use std::fs;
use std::path::Path;

use ipnet::IpNet;
use tracing::{debug, error, info};

use crate::types::server_config::{AppConfig, ConfigError, PasswordScheme, PolicyConfig};

/// Shortest signing secret the server will start with.
pub const MIN_SECRET_LEN: usize = 32;

/// Work factors bcrypt accepts.
pub const MIN_BCRYPT_COST: u32 = 4;
pub const MAX_BCRYPT_COST: u32 = 31;

pub fn load_config(path: impl AsRef<Path>) -> Result<AppConfig, ConfigError> {
    let path = path.as_ref();
    info!("Loading configuration from: {}", path.display());

    let contents = fs::read_to_string(path)?;
    debug!("Processing file: {}", path.display());

    if contents.trim().is_empty() {
        error!("Configuration file is empty");
        return Err(ConfigError::InvalidConfig("empty file".into()));
    }

    let config = parse_config(&contents)?;

    info!("Configuration loaded successfully");
    debug!("Config: {:?}", config);

    Ok(config)
}

/// Parse and validate a TOML document.
pub fn parse_config(contents: &str) -> Result<AppConfig, ConfigError> {
    let config: AppConfig = toml::from_str(contents)?;

    validate_config(&config)?;

    info!("Config validated");

    Ok(config)
}

pub fn validate_config(config: &AppConfig) -> Result<(), ConfigError> {
    if config.server.bind.is_empty() {
        return Err(ConfigError::InvalidConfig("bind cannot be empty".into()));
    }

    if config.server.max_body_bytes == 0 {
        return Err(ConfigError::InvalidConfig(
            "max_body_bytes must be greater than 0".into(),
        ));
    }

    if let Some(header) = &config.server.trusted_proxy_header {
        if http::HeaderName::from_bytes(header.as_bytes()).is_err() {
            return Err(ConfigError::InvalidConfig(format!(
                "trusted_proxy_header {header:?} is not a valid header name"
            )));
        }
    }

    for network in &config.server.trusted_proxies {
        if network.parse::<IpNet>().is_err() {
            return Err(ConfigError::InvalidConfig(format!(
                "trusted_proxies entry {network:?} is not a CIDR network"
            )));
        }
    }

    // Cookie names are RFC 6265 tokens: no separators, no whitespace.
    let cookie_name = &config.auth.cookie_name;
    if cookie_name.is_empty()
        || !cookie_name
            .bytes()
            .all(|b| b.is_ascii_alphanumeric() || b"!#$%&'*+-.^_`|~".contains(&b))
    {
        return Err(ConfigError::InvalidConfig(format!(
            "cookie_name {cookie_name:?} is not a valid cookie name"
        )));
    }

    validate_policy("standard", &config.rate_limit.standard)?;
    validate_policy("strict", &config.rate_limit.strict)?;

    if config.rate_limit.gc_interval_secs == 0 {
        return Err(ConfigError::InvalidConfig(
            "gc_interval_secs must be greater than 0".into(),
        ));
    }

    // Signing secret must be resolvable (env var or config field) and long
    // enough. Checked here so a bad config is rejected at startup rather than
    // failing at the first login.
    match config.auth.resolved_jwt_secret() {
        None => {
            return Err(ConfigError::InvalidConfig(
                "jwt_secret must be set via the JWT_SECRET env var or auth.jwt_secret config field"
                    .into(),
            ));
        }
        Some(secret) if secret.len() < MIN_SECRET_LEN => {
            return Err(ConfigError::InvalidConfig(format!(
                "jwt_secret must be at least {MIN_SECRET_LEN} characters long"
            )));
        }
        _ => {}
    }

    if let Some(secret) = config.auth.resolved_csrf_secret() {
        if secret.len() < MIN_SECRET_LEN {
            return Err(ConfigError::InvalidConfig(format!(
                "csrf_secret must be at least {MIN_SECRET_LEN} characters long"
            )));
        }
    }

    if config.auth.password_scheme == PasswordScheme::Bcrypt
        && !(MIN_BCRYPT_COST..=MAX_BCRYPT_COST).contains(&config.auth.bcrypt_cost)
    {
        return Err(ConfigError::InvalidConfig(format!(
            "bcrypt_cost must be between {MIN_BCRYPT_COST} and {MAX_BCRYPT_COST}"
        )));
    }

    Ok(())
}

fn validate_policy(name: &str, policy: &PolicyConfig) -> Result<(), ConfigError> {
    if policy.limit == 0 {
        return Err(ConfigError::InvalidConfig(format!(
            "rate_limit.{name}.limit must be greater than 0"
        )));
    }

    if policy.window_secs == 0 {
        return Err(ConfigError::InvalidConfig(format!(
            "rate_limit.{name}.window_secs must be greater than 0"
        )));
    }

    Ok(())
}
