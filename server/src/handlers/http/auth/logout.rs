use std::convert::Infallible;

use anyhow::{Context, Result};
use bytes::Bytes;
use http_body_util::combinators::BoxBody;
use hyper::header::SET_COOKIE;
use hyper::{Request, Response, StatusCode};
use tracing::info;

use crate::AppState;
use crate::handlers::http::utils;

/// `POST /api/auth/logout`
///
/// Always succeeds. Tokens are not revoked server-side; the browser is told
/// to drop the cookie and that is the whole logout.
pub async fn handle_logout(
    req: Request<Bytes>,
    state: AppState,
) -> Result<Response<BoxBody<Bytes, Infallible>>> {
    info!("User logged out");

    let clear_cookie = state
        .gate
        .cookie()
        .clear(utils::is_https(&req))
        .context("Failed to build logout cookie")?;

    let response_json = serde_json::json!({
        "success": true,
        "message": "Logged out successfully"
    });

    let mut response = utils::deliver_serialized_json(&response_json, StatusCode::OK)?;
    response.headers_mut().insert(SET_COOKIE, clear_cookie);

    Ok(utils::add_no_cache_headers(response))
}
