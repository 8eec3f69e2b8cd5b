use std::convert::Infallible;

use anyhow::Result;
use bytes::Bytes;
use http_body_util::combinators::BoxBody;
use hyper::{Request, Response, StatusCode};
use serde::Serialize;

use crate::AppState;
use crate::handlers::http::utils;

#[derive(Debug, Serialize)]
struct HealthResponse {
    status: &'static str,
    version: &'static str,
    /// Seconds since the server started.
    uptime: u64,
}

/// `GET /api/health`
pub async fn handle_health(
    _req: Request<Bytes>,
    state: AppState,
) -> Result<Response<BoxBody<Bytes, Infallible>>> {
    let body = HealthResponse {
        status: "healthy",
        version: env!("CARGO_PKG_VERSION"),
        uptime: state.started_at.elapsed().as_secs(),
    };

    let response = utils::deliver_serialized_json(&body, StatusCode::OK)?;
    Ok(utils::add_no_cache_headers(response))
}
