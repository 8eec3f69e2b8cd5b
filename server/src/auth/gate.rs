use hyper::Request;
use hyper::header::HeaderMap;
use tracing::{debug, warn};

use shared::types::Identity;

use crate::auth::cookie::SessionCookie;
use crate::auth::token::TokenCodec;
use crate::error::AuthError;

/// Cookie in, verified identity out.
///
/// A missing cookie, a bad signature and an expired token all end the same
/// way: `AuthError::TokenInvalid`, which the router answers with one generic
/// 401 body.
#[derive(Debug, Clone)]
pub struct AuthGate {
    codec: TokenCodec,
    cookie: SessionCookie,
}

impl AuthGate {
    pub fn new(codec: TokenCodec, cookie: SessionCookie) -> Self {
        Self { codec, cookie }
    }

    pub fn codec(&self) -> &TokenCodec {
        &self.codec
    }

    pub fn cookie(&self) -> &SessionCookie {
        &self.cookie
    }

    pub fn authenticate(&self, headers: &HeaderMap) -> Result<Identity, AuthError> {
        let Some(token) = self.cookie.unwrap(headers) else {
            debug!("No session cookie on request");
            return Err(AuthError::TokenInvalid);
        };

        Ok(self.codec.verify(&token)?)
    }

    /// Authenticate and attach the identity to the request extensions.
    pub fn admit<B>(&self, req: &mut Request<B>) -> Result<Identity, AuthError> {
        let identity = self.authenticate(req.headers())?;
        req.extensions_mut().insert(identity.clone());
        Ok(identity)
    }
}

pub fn require_role(identity: &Identity, role: &str) -> Result<(), AuthError> {
    if identity.has_role(role) {
        return Ok(());
    }

    warn!(
        "User {} (ID: {}) lacks role {}",
        identity.username, identity.id, role
    );
    Err(AuthError::Forbidden)
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use hyper::header::{COOKIE, HeaderValue};
    use secrecy::SecretString;

    use super::*;
    use crate::auth::clock::ManualClock;

    fn gate() -> AuthGate {
        let codec = TokenCodec::new(
            &SecretString::from("gate-test-secret-0123456789abcdef".to_string()),
            Arc::new(ManualClock::new(1_700_000_000_000)),
        )
        .unwrap();
        AuthGate::new(codec, SessionCookie::new("auth_token", false))
    }

    fn editor() -> Identity {
        Identity {
            id: 9,
            username: "ed".into(),
            email: "ed@example.com".into(),
            role: "editor".into(),
        }
    }

    #[test]
    fn admit_attaches_identity() {
        let gate = gate();
        let token = gate.codec().issue(&editor()).unwrap();
        let mut req = Request::builder()
            .header(COOKIE, format!("auth_token={}", token))
            .body(())
            .unwrap();

        let identity = gate.admit(&mut req).unwrap();
        assert_eq!(identity, editor());
        assert_eq!(req.extensions().get::<Identity>(), Some(&editor()));
    }

    #[test]
    fn missing_and_forged_cookies_are_the_same_error() {
        let gate = gate();
        assert!(matches!(
            gate.authenticate(&HeaderMap::new()),
            Err(AuthError::TokenInvalid)
        ));

        let mut headers = HeaderMap::new();
        headers.insert(COOKIE, HeaderValue::from_static("auth_token=not.a.token"));
        assert!(matches!(
            gate.authenticate(&headers),
            Err(AuthError::TokenInvalid)
        ));
    }

    #[test]
    fn role_check() {
        assert!(require_role(&editor(), "editor").is_ok());
        assert!(matches!(
            require_role(&editor(), "admin"),
            Err(AuthError::Forbidden)
        ));
    }
}
