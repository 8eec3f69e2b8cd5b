use anyhow::{Result, anyhow};
use hyper::header::{COOKIE, HeaderMap, HeaderValue};
use tracing::debug;

use crate::auth::token::SESSION_TTL;

/// Moves the session token in and out of the `Cookie`/`Set-Cookie` headers.
#[derive(Debug, Clone)]
pub struct SessionCookie {
    name: String,
    force_secure: bool,
}

impl SessionCookie {
    pub fn new(name: impl Into<String>, force_secure: bool) -> Self {
        Self {
            name: name.into(),
            force_secure,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// `Set-Cookie` value carrying `token` for the lifetime of the session.
    pub fn wrap(&self, token: &str, secure: bool) -> Result<HeaderValue> {
        self.build(token, SESSION_TTL.as_secs(), secure)
    }

    /// `Set-Cookie` value that makes the browser drop the session cookie.
    pub fn clear(&self, secure: bool) -> Result<HeaderValue> {
        self.build("", 0, secure)
    }

    /// Token from every `Cookie` header on the request, first non-empty
    /// match wins.
    pub fn unwrap(&self, headers: &HeaderMap) -> Option<String> {
        read_cookie(headers, &self.name)
    }

    /// Token from a single `Cookie` header value. Pairs without `=` are
    /// skipped and an empty value counts as no cookie.
    pub fn unwrap_str(&self, header: Option<&str>) -> Option<String> {
        read_cookie_str(header?, &self.name)
    }

    fn build(&self, value: &str, max_age: u64, secure: bool) -> Result<HeaderValue> {
        let mut cookie = format!("{}={}; HttpOnly", self.name, value);

        if secure || self.force_secure {
            cookie.push_str("; Secure");
        }

        cookie.push_str(&format!("; SameSite=Strict; Path=/; Max-Age={}", max_age));

        HeaderValue::from_str(&cookie).map_err(|e| anyhow!("Invalid cookie value: {}", e))
    }
}

/// Value of cookie `name` across all `Cookie` headers. Empty values are
/// passed over so a later non-empty one can still match.
pub fn read_cookie(headers: &HeaderMap, name: &str) -> Option<String> {
    headers
        .get_all(COOKIE)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .find_map(|value| read_cookie_str(value, name))
}

fn read_cookie_str(header: &str, name: &str) -> Option<String> {
    header.split(';').find_map(|pair| {
        let (key, value) = pair.trim().split_once('=')?;
        if key.trim() != name {
            return None;
        }

        let value = value.trim();
        if value.is_empty() {
            debug!("Cookie {} present but empty", name);
            return None;
        }

        Some(value.to_string())
    })
}
