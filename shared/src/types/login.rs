use std::fmt;

use serde::Deserialize;

// ---------------------------------------------------------------------------
// Login wire types
// ---------------------------------------------------------------------------

/// Login request body. Missing fields deserialize as empty strings so the
/// handler can answer with a precise `MISSING_FIELD` instead of a parse error.
#[derive(Deserialize, Default)]
pub struct LoginData {
    #[serde(default)]
    pub username: String,
    #[serde(default)]
    pub password: String,
}

impl LoginData {
    /// Name of the first required field that is empty, if any.
    pub fn missing_field(&self) -> Option<&'static str> {
        if self.username.trim().is_empty() {
            return Some("username");
        }
        if self.password.is_empty() {
            return Some("password");
        }
        None
    }
}

// Hand-written so a stray `{:?}` never prints the password.
impl fmt::Debug for LoginData {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LoginData")
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .finish()
    }
}
