use serde::{Deserialize, Serialize};

use crate::types::identity::Identity;

/// What a token may be used for. Only access tokens open a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TokenKind {
    Access,
    Refresh,
}

/// Claims embedded in every session token issued by the server.
///
/// The token is self-contained: verifying the HMAC signature and `exp` is the
/// whole check, there is no session table to consult. A user whose role or
/// email changes keeps the old values until the token expires.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionClaims {
    /// Numeric user ID (matches the credential store's primary key).
    pub user_id: i64,

    pub username: String,

    pub email: String,

    /// Free-form role string; `admin` unlocks the admin API.
    pub role: String,

    /// Issued-at (Unix timestamp, seconds).
    pub iat: i64,

    /// Expiry (Unix timestamp, seconds). Valid while `now < exp`.
    pub exp: i64,

    /// Serialized as `type`; a token without it is rejected.
    #[serde(rename = "type")]
    pub kind: TokenKind,
}

impl SessionClaims {
    /// Access-token claims for `identity`.
    pub fn new(identity: &Identity, iat: i64, exp: i64) -> Self {
        Self {
            user_id: identity.id,
            username: identity.username.clone(),
            email: identity.email.clone(),
            role: identity.role.clone(),
            iat,
            exp,
            kind: TokenKind::Access,
        }
    }

    /// Strip the timestamps and hand back the identity the token vouches for.
    pub fn into_identity(self) -> Identity {
        Identity {
            id: self.user_id,
            username: self.username,
            email: self.email,
            role: self.role,
        }
    }
}
