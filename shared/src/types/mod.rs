pub mod contact;
pub mod identity;
pub mod json_error;
pub mod jwt;
pub mod login;
pub mod server_config;

pub use self::contact::{ContactData, ContactResponse};
pub use self::identity::{Identity, UserResponse};
pub use self::json_error::ErrorResponse;
pub use self::jwt::{SessionClaims, TokenKind};
pub use self::login::LoginData;
