/// Session authentication
///
/// - `token`    signs and verifies session tokens
/// - `password` checks submitted passwords against stored hashes
/// - `cookie`   carries the token between browser and server
/// - `gate`     turns a request's cookie into a verified `Identity`
/// - `csrf`     double-submit tokens for state-changing protected requests
/// - `clock`    injectable time source shared by tokens and rate limiting
pub mod clock;
pub mod cookie;
pub mod csrf;
pub mod gate;
pub mod password;
pub mod token;

pub use clock::{Clock, ManualClock, SharedClock, SystemClock};
pub use cookie::SessionCookie;
pub use csrf::{CsrfError, CsrfGuard};
pub use gate::{AuthGate, require_role};
pub use token::{SESSION_TTL, TokenCodec, TokenInvalid};
