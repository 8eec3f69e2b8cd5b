use std::convert::Infallible;

use anyhow::{Context, Result};
use bytes::Bytes;
use http_body_util::combinators::BoxBody;
use hyper::header::SET_COOKIE;
use hyper::{Request, Response, StatusCode};
use tracing::{error, info, warn};

use shared::types::{Identity, LoginData, UserResponse};

use crate::AppState;
use crate::auth::password::verify_password_blocking;
use crate::error::AuthError;
use crate::handlers::http::utils;

/// `POST /api/auth/login`
///
/// Accepts JSON or an HTML form. On success the session token goes out only
/// as an `HttpOnly` cookie; the body carries the public identity.
pub async fn handle_login(
    req: Request<Bytes>,
    state: AppState,
) -> Result<Response<BoxBody<Bytes, Infallible>>> {
    info!("Processing login request");

    let login_data = match parse_login_body(&req) {
        Ok(data) => data,
        Err(login_error) => {
            warn!("Login parsing failed: {}", login_error.code());
            return Ok(login_error.to_response());
        }
    };

    if let Some(field) = login_data.missing_field() {
        warn!("Login missing field: {}", field);
        return Ok(AuthError::bad_request(
            "MISSING_FIELD",
            format!("Missing required field: {}", field),
        )
        .to_response());
    }

    let identity = match attempt_login(&login_data, &state).await {
        Ok(identity) => identity,
        Err(login_error) => {
            warn!(
                "Login failed for {}: {}",
                login_data.username,
                login_error.code()
            );
            return Ok(login_error.to_response());
        }
    };

    let token = state
        .gate
        .codec()
        .issue(&identity)
        .context("Failed to issue session token")?;

    let secure = utils::is_https(&req);
    let cookie = state
        .gate
        .cookie()
        .wrap(&token, secure)
        .context("Failed to create session cookie")?;

    info!(
        "User logged in successfully: {} (ID: {})",
        identity.username, identity.id
    );

    let mut response =
        utils::deliver_serialized_json(&UserResponse { user: identity }, StatusCode::OK)?;
    response.headers_mut().insert(SET_COOKIE, cookie);

    Ok(utils::add_no_cache_headers(response))
}

/// Parse a JSON or form-encoded login body. Missing fields come back empty
/// and are reported by the caller.
fn parse_login_body(req: &Request<Bytes>) -> std::result::Result<LoginData, AuthError> {
    let body = req.body();

    if utils::is_form_encoded(req.headers()) {
        let mut data = LoginData::default();
        for (key, value) in form_urlencoded::parse(body.as_ref()) {
            match &*key {
                "username" => data.username = value.into_owned(),
                "password" => data.password = value.into_owned(),
                _ => {}
            }
        }
        return Ok(data);
    }

    serde_json::from_slice::<LoginData>(body)
        .map_err(|_| AuthError::bad_request("INVALID_JSON", "Request body must be valid JSON"))
}

/// Look the user up and check the password. Unknown users and wrong
/// passwords are indistinguishable to the caller, in body and in timing.
async fn attempt_login(data: &LoginData, state: &AppState) -> Result<Identity, AuthError> {
    let username = data.username.trim();
    info!("Attempting login for user: {}", username);

    let stored = state.credentials.lookup(username).await.map_err(|e| {
        error!("Credential store error during login: {}", e);
        AuthError::from(e)
    })?;

    let (identity, hash) = match stored {
        Some(cred) => (Some(cred.identity), Some(cred.password_hash)),
        None => (None, None),
    };

    if hash
        .as_deref()
        .is_some_and(|hash| !state.dummy_hash.matches_cost_of(hash))
    {
        warn!(
            "Stored hash for {} does not match auth.password_scheme/bcrypt_cost; unknown-user timing will differ",
            username
        );
    }

    let matched =
        verify_password_blocking(data.password.clone(), hash, &state.dummy_hash).await?;

    match identity {
        Some(identity) if matched => Ok(identity),
        _ => Err(AuthError::InvalidCredentials),
    }
}
