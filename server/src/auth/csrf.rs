use std::fmt;
use std::time::Duration;

use anyhow::{Result, anyhow};
use hmac::{Hmac, Mac};
use hyper::Method;
use hyper::header::{HeaderMap, HeaderValue};
use rand::RngCore;
use rand::rngs::OsRng;
use sha2::Sha256;
use thiserror::Error;
use tracing::debug;

use crate::auth::cookie::read_cookie;
use crate::error::AuthError;

type HmacSha256 = Hmac<Sha256>;

pub const CSRF_COOKIE: &str = "_csrf";
pub const CSRF_HEADER: &str = "x-csrf-token";
pub const CSRF_TTL: Duration = Duration::from_secs(60 * 60);

const TOKEN_BYTES: usize = 32;

// Label mixed into the JWT secret when no CSRF secret is configured.
const DERIVED_KEY_LABEL: &[u8] = b"portfolio-csrf-v1";

#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum CsrfError {
    #[error("csrf token missing")]
    Missing,
    #[error("csrf token invalid")]
    Invalid,
}

/// Double-submit CSRF tokens: `<random hex>.<hmac hex>` sent both as the
/// `_csrf` cookie and the `x-csrf-token` header. The two must be equal and
/// the signature must verify.
#[derive(Clone)]
pub struct CsrfGuard {
    mac: HmacSha256,
    force_secure: bool,
}

impl fmt::Debug for CsrfGuard {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CsrfGuard")
            .field("cookie", &CSRF_COOKIE)
            .field("force_secure", &self.force_secure)
            .finish()
    }
}

/// GET, HEAD and OPTIONS never change state and skip the check.
pub fn requires_check(method: &Method) -> bool {
    ![Method::GET, Method::HEAD, Method::OPTIONS].contains(method)
}

impl CsrfGuard {
    pub fn new(secret: &[u8], force_secure: bool) -> Result<Self, AuthError> {
        let mac = HmacSha256::new_from_slice(secret)
            .map_err(|e| AuthError::ConfigurationFatal(format!("invalid CSRF key: {e}")))?;
        Ok(Self { mac, force_secure })
    }

    /// Key derived from the token signing secret, for deployments that set
    /// no separate CSRF secret.
    pub fn derived_from(signing_secret: &[u8], force_secure: bool) -> Result<Self, AuthError> {
        let mut mac = HmacSha256::new_from_slice(signing_secret)
            .map_err(|e| AuthError::ConfigurationFatal(format!("invalid signing key: {e}")))?;
        mac.update(DERIVED_KEY_LABEL);
        Self::new(&mac.finalize().into_bytes(), force_secure)
    }

    pub fn issue(&self) -> String {
        let mut raw = [0u8; TOKEN_BYTES];
        OsRng.fill_bytes(&mut raw);
        let token = hex::encode(raw);
        let signature = self.sign(&token);
        format!("{token}.{signature}")
    }

    /// `Set-Cookie` value for `token`. Not `HttpOnly`: the page script has to
    /// read it to echo it back in the header.
    pub fn cookie(&self, token: &str, secure: bool) -> Result<HeaderValue> {
        let mut cookie = format!("{CSRF_COOKIE}={token}; SameSite=Strict; Path=/");
        if secure || self.force_secure {
            cookie.push_str("; Secure");
        }
        cookie.push_str(&format!("; Max-Age={}", CSRF_TTL.as_secs()));

        HeaderValue::from_str(&cookie).map_err(|e| anyhow!("Invalid CSRF cookie value: {}", e))
    }

    pub fn check(&self, headers: &HeaderMap) -> Result<(), CsrfError> {
        let from_cookie = read_cookie(headers, CSRF_COOKIE);
        let from_header = headers
            .get(CSRF_HEADER)
            .and_then(|v| v.to_str().ok())
            .map(str::trim)
            .filter(|v| !v.is_empty());

        let (Some(from_cookie), Some(from_header)) = (from_cookie, from_header) else {
            debug!("CSRF cookie or header missing");
            return Err(CsrfError::Missing);
        };

        if from_cookie != from_header {
            debug!("CSRF cookie and header differ");
            return Err(CsrfError::Invalid);
        }

        if !self.verify(&from_cookie) {
            debug!("CSRF signature does not verify");
            return Err(CsrfError::Invalid);
        }

        Ok(())
    }

    fn sign(&self, token: &str) -> String {
        let mut mac = self.mac.clone();
        mac.update(token.as_bytes());
        hex::encode(mac.finalize().into_bytes())
    }

    fn verify(&self, signed: &str) -> bool {
        let Some((token, signature)) = signed.split_once('.') else {
            return false;
        };
        let Ok(signature) = hex::decode(signature) else {
            return false;
        };

        let mut mac = self.mac.clone();
        mac.update(token.as_bytes());
        mac.verify_slice(&signature).is_ok()
    }
}

#[cfg(test)]
mod tests {
    use hyper::header::COOKIE;

    use super::*;

    const KEY: &[u8] = b"csrf-test-key-0123456789abcdef0123";

    fn guard() -> CsrfGuard {
        CsrfGuard::new(KEY, false).unwrap()
    }

    fn headers(cookie: Option<&str>, header: Option<&str>) -> HeaderMap {
        let mut headers = HeaderMap::new();
        if let Some(token) = cookie {
            headers.insert(COOKIE, HeaderValue::from_str(&format!("_csrf={token}")).unwrap());
        }
        if let Some(token) = header {
            headers.insert(CSRF_HEADER, HeaderValue::from_str(token).unwrap());
        }
        headers
    }

    #[test]
    fn issued_token_passes_when_echoed() {
        let guard = guard();
        let token = guard.issue();
        assert_eq!(guard.check(&headers(Some(&token), Some(&token))), Ok(()));
    }

    #[test]
    fn tokens_are_unique() {
        let guard = guard();
        assert_ne!(guard.issue(), guard.issue());
    }

    #[test]
    fn either_half_missing_is_missing() {
        let guard = guard();
        let token = guard.issue();
        assert_eq!(guard.check(&headers(None, Some(&token))), Err(CsrfError::Missing));
        assert_eq!(guard.check(&headers(Some(&token), None)), Err(CsrfError::Missing));
        assert_eq!(guard.check(&headers(None, None)), Err(CsrfError::Missing));
    }

    #[test]
    fn mismatch_is_invalid() {
        let guard = guard();
        let (a, b) = (guard.issue(), guard.issue());
        assert_eq!(guard.check(&headers(Some(&a), Some(&b))), Err(CsrfError::Invalid));
    }

    #[test]
    fn unsigned_or_foreign_tokens_are_invalid() {
        let guard = guard();
        let forged = format!("{}.{}", "ab".repeat(32), "00".repeat(32));
        assert_eq!(
            guard.check(&headers(Some(&forged), Some(&forged))),
            Err(CsrfError::Invalid)
        );

        let foreign = CsrfGuard::new(b"another-key-entirely-0123456789ab", false)
            .unwrap()
            .issue();
        assert_eq!(
            guard.check(&headers(Some(&foreign), Some(&foreign))),
            Err(CsrfError::Invalid)
        );

        for junk in ["nodot", "a.b.c", "abc.zz"] {
            assert_eq!(guard.check(&headers(Some(junk), Some(junk))), Err(CsrfError::Invalid));
        }
    }

    #[test]
    fn derived_key_differs_from_raw_secret() {
        let derived = CsrfGuard::derived_from(KEY, false).unwrap();
        let token = derived.issue();
        assert_eq!(derived.check(&headers(Some(&token), Some(&token))), Ok(()));
        assert_eq!(
            guard().check(&headers(Some(&token), Some(&token))),
            Err(CsrfError::Invalid)
        );
    }

    #[test]
    fn cookie_is_readable_by_scripts() {
        let guard = guard();
        let value = guard.cookie("tok", false).unwrap();
        let value = value.to_str().unwrap();
        assert!(value.starts_with("_csrf=tok;"));
        assert!(!value.contains("HttpOnly"));
        assert!(value.contains("SameSite=Strict"));
        assert!(value.contains("Max-Age=3600"));
        assert!(!value.contains("Secure"));
        assert!(guard.cookie("tok", true).unwrap().to_str().unwrap().contains("; Secure"));
    }

    #[test]
    fn safe_methods_skip_the_check() {
        assert!(!requires_check(&Method::GET));
        assert!(!requires_check(&Method::HEAD));
        assert!(!requires_check(&Method::OPTIONS));
        assert!(requires_check(&Method::POST));
        assert!(requires_check(&Method::PUT));
        assert!(requires_check(&Method::DELETE));
    }
}
