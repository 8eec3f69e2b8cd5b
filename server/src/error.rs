use std::convert::Infallible;

use bytes::Bytes;
use http_body_util::combinators::BoxBody;
use hyper::header::{self, HeaderValue};
use hyper::{Response, StatusCode};
use thiserror::Error;

use shared::types::ErrorResponse;

use crate::auth::csrf::CsrfError;
use crate::handlers::http::utils::json_response::full;
use crate::security::rate_limiter::Decision;
use crate::tower_middle::tower_rate_limiter::write_rate_limit_headers;

/// Failure of a backing store (credential lookup, rate-limit counters,
/// resources). The text is for logs only and never reaches a client.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("store unavailable: {0}")]
    Unavailable(String),
}

impl From<sqlx::Error> for StoreError {
    fn from(e: sqlx::Error) -> Self {
        Self::Unavailable(e.to_string())
    }
}

/// Everything the auth and admission layer can answer with instead of the
/// handler's response.
#[derive(Debug, Error)]
pub enum AuthError {
    #[error("invalid credentials")]
    InvalidCredentials,

    #[error("session token missing, malformed or expired")]
    TokenInvalid,

    #[error("rate limit exceeded")]
    RateLimited(Decision),

    /// Startup cannot continue (missing or weak signing secret, bad proxy
    /// settings).
    #[error("fatal configuration error: {0}")]
    ConfigurationFatal(String),

    #[error("store unavailable: {0}")]
    StoreUnavailable(String),

    #[error("insufficient privileges")]
    Forbidden,

    #[error(transparent)]
    Csrf(#[from] CsrfError),

    #[error("{message}")]
    BadRequest { code: &'static str, message: String },

    #[error("not found: {0}")]
    NotFound(&'static str),

    #[error("request body exceeds {limit} bytes")]
    PayloadTooLarge { limit: usize },

    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

impl From<StoreError> for AuthError {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::Unavailable(reason) => Self::StoreUnavailable(reason),
        }
    }
}

impl AuthError {
    pub fn bad_request(code: &'static str, message: impl Into<String>) -> Self {
        Self::BadRequest {
            code,
            message: message.into(),
        }
    }

    pub fn status(&self) -> StatusCode {
        match self {
            Self::InvalidCredentials | Self::TokenInvalid => StatusCode::UNAUTHORIZED,
            Self::RateLimited(_) => StatusCode::TOO_MANY_REQUESTS,
            Self::StoreUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            Self::Forbidden | Self::Csrf(_) => StatusCode::FORBIDDEN,
            Self::BadRequest { .. } => StatusCode::BAD_REQUEST,
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::PayloadTooLarge { .. } => StatusCode::PAYLOAD_TOO_LARGE,
            Self::ConfigurationFatal(_) | Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    pub fn code(&self) -> &'static str {
        match self {
            Self::InvalidCredentials => "INVALID_CREDENTIALS",
            Self::TokenInvalid => "UNAUTHORIZED",
            Self::RateLimited(_) => "RATE_LIMITED",
            Self::StoreUnavailable(_) => "SERVICE_UNAVAILABLE",
            Self::Forbidden => "FORBIDDEN",
            Self::Csrf(CsrfError::Missing) => "CSRF_MISSING",
            Self::Csrf(CsrfError::Invalid) => "CSRF_INVALID",
            Self::BadRequest { code, .. } => *code,
            Self::NotFound(_) => "NOT_FOUND",
            Self::PayloadTooLarge { .. } => "PAYLOAD_TOO_LARGE",
            Self::ConfigurationFatal(_) | Self::Internal(_) => "INTERNAL_ERROR",
        }
    }

    /// Client-facing message. Store and internal details stay in the logs.
    pub fn public_message(&self) -> String {
        match self {
            Self::InvalidCredentials => "Invalid credentials".to_string(),
            Self::TokenInvalid => "Authentication required".to_string(),
            Self::RateLimited(_) => "Too many requests, please try again later".to_string(),
            Self::StoreUnavailable(_) => "Service temporarily unavailable".to_string(),
            Self::Forbidden => "Insufficient privileges".to_string(),
            Self::Csrf(CsrfError::Missing) => "CSRF token missing".to_string(),
            Self::Csrf(CsrfError::Invalid) => "CSRF token invalid".to_string(),
            Self::BadRequest { message, .. } => message.clone(),
            Self::NotFound(message) => message.to_string(),
            Self::PayloadTooLarge { .. } => "Request body too large".to_string(),
            Self::ConfigurationFatal(_) | Self::Internal(_) => {
                "An internal error occurred".to_string()
            }
        }
    }

    /// Render as the standard `{status, code, message}` body. Never fails, so
    /// middleware can use it where there is no error channel.
    pub fn to_response(&self) -> Response<BoxBody<Bytes, Infallible>> {
        let body = ErrorResponse::new(self.code(), &self.public_message());
        let json = serde_json::to_vec(&body).unwrap_or_default();

        let mut response = Response::new(full(json));
        *response.status_mut() = self.status();
        response.headers_mut().insert(
            header::CONTENT_TYPE,
            HeaderValue::from_static("application/json"),
        );

        if let Self::RateLimited(decision) = self {
            write_rate_limit_headers(response.headers_mut(), decision);
        }

        response
    }
}
