use std::fmt;
use std::sync::Arc;

use anyhow::{Context, anyhow};
use argon2::{
    Argon2,
    password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString},
};
use rand::RngCore;
use rand::rngs::OsRng;
use tracing::warn;

use shared::types::server_config::PasswordScheme;

use crate::error::AuthError;

/// Well-formed Argon2id hash with `Argon2::default()` parameters that no
/// password matches.
pub const DUMMY_ARGON2_HASH: &str = "$argon2id$v=19$m=19456,t=2,p=1$c29tZXNhbHRzb21lc2FsdA$AAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAA";

/// Hash that unknown usernames are verified against, in the same scheme and
/// at the same cost as the credential store's hashes, so a miss takes as
/// long as a wrong password.
#[derive(Clone)]
pub struct DummyHash(Arc<str>);

impl DummyHash {
    pub fn for_scheme(scheme: PasswordScheme, bcrypt_cost: u32) -> Result<Self, AuthError> {
        let hash = match scheme {
            PasswordScheme::Argon2id => DUMMY_ARGON2_HASH.to_string(),
            PasswordScheme::Bcrypt => {
                let mut filler = [0u8; 16];
                OsRng.fill_bytes(&mut filler);
                bcrypt::hash(hex::encode(filler), bcrypt_cost).map_err(|e| {
                    AuthError::ConfigurationFatal(format!("cannot build bcrypt dummy hash: {e}"))
                })?
            }
        };

        Ok(Self(hash.into()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Whether `stored` would cost the same to verify: same scheme, and for
    /// bcrypt the same cost.
    pub fn matches_cost_of(&self, stored: &str) -> bool {
        if is_bcrypt(&self.0) {
            return is_bcrypt(stored) && bcrypt_cost(stored) == bcrypt_cost(&self.0);
        }

        match (PasswordHash::new(&self.0), PasswordHash::new(stored)) {
            (Ok(dummy), Ok(stored)) => {
                dummy.algorithm == stored.algorithm
                    && dummy.version == stored.version
                    && dummy.params.to_string() == stored.params.to_string()
            }
            _ => false,
        }
    }
}

impl fmt::Debug for DummyHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let scheme = if is_bcrypt(&self.0) { "bcrypt" } else { "argon2id" };
        f.debug_tuple("DummyHash").field(&scheme).finish()
    }
}

/// Hash a password using Argon2id with a random salt.
pub fn hash_password(password: &str) -> anyhow::Result<String> {
    let salt = SaltString::generate(&mut OsRng);

    Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map(|hash| hash.to_string())
        .map_err(|e| anyhow!("Password hashing failed: {}", e))
}

/// Check `password` against a stored Argon2 PHC string or a legacy bcrypt
/// hash. Both comparisons are constant time. A hash that cannot be parsed
/// counts as a mismatch.
pub fn verify_password(password: &str, stored_hash: &str) -> bool {
    if is_bcrypt(stored_hash) {
        return match bcrypt::verify(password, stored_hash) {
            Ok(matched) => matched,
            Err(e) => {
                warn!("Malformed bcrypt hash in credential store: {}", e);
                false
            }
        };
    }

    let parsed = match PasswordHash::new(stored_hash) {
        Ok(parsed) => parsed,
        Err(e) => {
            warn!("Malformed password hash in credential store: {}", e);
            return false;
        }
    };

    Argon2::default()
        .verify_password(password.as_bytes(), &parsed)
        .is_ok()
}

/// Run `verify_password` off the async runtime. `stored_hash` of `None`
/// (unknown user) is checked against `dummy` and always fails.
pub async fn verify_password_blocking(
    password: String,
    stored_hash: Option<String>,
    dummy: &DummyHash,
) -> Result<bool, AuthError> {
    let known = stored_hash.is_some();
    let hash = stored_hash.unwrap_or_else(|| dummy.as_str().to_string());

    let matched = tokio::task::spawn_blocking(move || verify_password(&password, &hash))
        .await
        .context("Password verification task failed")?;

    Ok(known && matched)
}

fn is_bcrypt(hash: &str) -> bool {
    ["$2a$", "$2b$", "$2y$"]
        .iter()
        .any(|prefix| hash.starts_with(prefix))
}

// `$2b$10$...` -> `10`
fn bcrypt_cost(hash: &str) -> Option<&str> {
    hash.split('$').nth(2)
}
