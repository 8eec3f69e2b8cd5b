use std::convert::Infallible;

use anyhow::Result;
use bytes::Bytes;
use http_body_util::combinators::BoxBody;
use hyper::{Request, Response, StatusCode};

use shared::types::{Identity, UserResponse};

use crate::AppState;
use crate::handlers::http::utils;

/// `GET /api/auth/me`: echo the identity the gate verified.
pub async fn handle_me(
    _req: Request<Bytes>,
    _state: AppState,
    identity: Identity,
) -> Result<Response<BoxBody<Bytes, Infallible>>> {
    let response = utils::deliver_serialized_json(&UserResponse { user: identity }, StatusCode::OK)?;
    Ok(utils::add_no_cache_headers(response))
}
