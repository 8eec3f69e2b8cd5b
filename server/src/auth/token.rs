use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use anyhow::anyhow;
use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation, decode, encode};
use secrecy::{ExposeSecret, SecretString};
use thiserror::Error;
use tracing::debug;

use shared::config::MIN_SECRET_LEN;
use shared::types::{Identity, SessionClaims, TokenKind};

use crate::auth::clock::SharedClock;
use crate::error::AuthError;

/// Lifetime of a session. The token's `exp` and the cookie's `Max-Age` are
/// both derived from this.
pub const SESSION_TTL: Duration = Duration::from_secs(24 * 60 * 60);

/// Any reason a token cannot be trusted. Deliberately carries no detail.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
#[error("session token invalid")]
pub struct TokenInvalid;

impl From<TokenInvalid> for AuthError {
    fn from(_: TokenInvalid) -> Self {
        AuthError::TokenInvalid
    }
}

/// HS256 session token signer/verifier.
#[derive(Clone)]
pub struct TokenCodec {
    inner: Arc<CodecInner>,
}

struct CodecInner {
    encoding: EncodingKey,
    decoding: DecodingKey,
    validation: Validation,
    clock: SharedClock,
}

impl fmt::Debug for TokenCodec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TokenCodec")
            .field("algorithm", &"HS256")
            .field("ttl_secs", &SESSION_TTL.as_secs())
            .finish()
    }
}

impl TokenCodec {
    /// Build a codec from the process-wide signing secret.
    ///
    /// A secret shorter than `MIN_SECRET_LEN` is a startup failure, not
    /// something to limp along with.
    pub fn new(secret: &SecretString, clock: SharedClock) -> Result<Self, AuthError> {
        let bytes = secret.expose_secret().as_bytes();
        if bytes.len() < MIN_SECRET_LEN {
            return Err(AuthError::ConfigurationFatal(format!(
                "signing secret must be at least {MIN_SECRET_LEN} bytes"
            )));
        }

        // Expiry is checked against the injected clock in `verify`, so the
        // library's own wall-clock check is switched off. `exp` must still
        // be present.
        let mut validation = Validation::new(Algorithm::HS256);
        validation.validate_exp = false;
        validation.leeway = 0;
        validation.set_required_spec_claims(&["exp"]);

        Ok(Self {
            inner: Arc::new(CodecInner {
                encoding: EncodingKey::from_secret(bytes),
                decoding: DecodingKey::from_secret(bytes),
                validation,
                clock,
            }),
        })
    }

    pub fn issue(&self, identity: &Identity) -> Result<String, AuthError> {
        let iat = self.inner.clock.now_secs();
        let exp = iat + SESSION_TTL.as_secs() as i64;
        let claims = SessionClaims::new(identity, iat, exp);

        encode(&Header::new(Algorithm::HS256), &claims, &self.inner.encoding)
            .map_err(|e| AuthError::Internal(anyhow!("Token signing failed: {}", e)))
    }

    pub fn verify(&self, token: &str) -> Result<Identity, TokenInvalid> {
        self.verify_claims(token).map(SessionClaims::into_identity)
    }

    /// Like `verify` but keeps `iat`/`exp`. Only access tokens pass.
    pub fn verify_claims(&self, token: &str) -> Result<SessionClaims, TokenInvalid> {
        let data = decode::<SessionClaims>(token, &self.inner.decoding, &self.inner.validation)
            .map_err(|e| {
                debug!("Token rejected: {}", e);
                TokenInvalid
            })?;

        if data.claims.kind != TokenKind::Access {
            debug!("Token rejected: {:?} token used as a session", data.claims.kind);
            return Err(TokenInvalid);
        }

        let now = self.inner.clock.now_secs();
        if now >= data.claims.exp {
            debug!("Token rejected: expired at {}, now {}", data.claims.exp, now);
            return Err(TokenInvalid);
        }

        Ok(data.claims)
    }
}
