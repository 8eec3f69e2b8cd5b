use std::convert::Infallible;

use anyhow::Result;
use bytes::Bytes;
use http_body_util::combinators::BoxBody;
use hyper::{Request, Response, StatusCode};
use serde_json::{Map, Value};
use tracing::{error, info};

use shared::types::Identity;

use crate::AppState;
use crate::auth::require_role;
use crate::database::resources::is_admin_collection;
use crate::error::{AuthError, StoreError};
use crate::handlers::http::utils::deliver_success_json;

type HttpResponse = Response<BoxBody<Bytes, Infallible>>;

const ADMIN_ROLE: &str = "admin";

/// Role check plus collection lookup shared by every admin verb. `Err`
/// carries the response to send instead.
fn admit_admin(req: &Request<Bytes>, identity: &Identity) -> Result<String, HttpResponse> {
    if let Err(e) = require_role(identity, ADMIN_ROLE) {
        return Err(e.to_response());
    }

    let collection = req
        .uri()
        .path()
        .rsplit('/')
        .next()
        .unwrap_or_default()
        .to_string();

    if !is_admin_collection(&collection) {
        return Err(AuthError::NotFound("Endpoint not found").to_response());
    }

    Ok(collection)
}

fn parse_object(body: &Bytes) -> Result<Map<String, Value>, HttpResponse> {
    match serde_json::from_slice::<Value>(body) {
        Ok(Value::Object(map)) => Ok(map),
        _ => Err(
            AuthError::bad_request("INVALID_JSON", "Request body must be a JSON object")
                .to_response(),
        ),
    }
}

fn require_id(record: &Map<String, Value>) -> Result<i64, HttpResponse> {
    record.get("id").and_then(Value::as_i64).ok_or_else(|| {
        AuthError::bad_request("MISSING_FIELD", "Missing required field: id").to_response()
    })
}

fn store_failure(collection: &str, e: StoreError) -> HttpResponse {
    error!("Resource store failed on {}: {}", collection, e);
    AuthError::from(e).to_response()
}

fn record_not_found() -> Result<HttpResponse> {
    Ok(AuthError::NotFound("Record not found").to_response())
}

/// `GET /api/admin/:collection`
pub async fn handle_list(
    req: Request<Bytes>,
    state: AppState,
    identity: Identity,
) -> Result<HttpResponse> {
    let collection = match admit_admin(&req, &identity) {
        Ok(c) => c,
        Err(response) => return Ok(response),
    };

    match state.resources.list(&collection).await {
        Ok(records) => deliver_success_json(Some(records), StatusCode::OK),
        Err(e) => Ok(store_failure(&collection, e)),
    }
}

/// `POST /api/admin/:collection`
pub async fn handle_create(
    req: Request<Bytes>,
    state: AppState,
    identity: Identity,
) -> Result<HttpResponse> {
    let collection = match admit_admin(&req, &identity) {
        Ok(c) => c,
        Err(response) => return Ok(response),
    };
    let record = match parse_object(req.body()) {
        Ok(r) => r,
        Err(response) => return Ok(response),
    };

    match state.resources.create(&collection, record).await {
        Ok(created) => {
            info!("{} created a record in {}", identity.username, collection);
            deliver_success_json(Some(created), StatusCode::CREATED)
        }
        Err(e) => Ok(store_failure(&collection, e)),
    }
}

/// `PUT /api/admin/:collection` with the record's `id` in the body.
pub async fn handle_update(
    req: Request<Bytes>,
    state: AppState,
    identity: Identity,
) -> Result<HttpResponse> {
    let collection = match admit_admin(&req, &identity) {
        Ok(c) => c,
        Err(response) => return Ok(response),
    };
    let (id, changes) = match parse_object(req.body()).and_then(|r| Ok((require_id(&r)?, r))) {
        Ok(parsed) => parsed,
        Err(response) => return Ok(response),
    };

    match state.resources.update(&collection, id, changes).await {
        Ok(Some(updated)) => {
            info!("{} updated {} #{}", identity.username, collection, id);
            deliver_success_json(Some(updated), StatusCode::OK)
        }
        Ok(None) => record_not_found(),
        Err(e) => Ok(store_failure(&collection, e)),
    }
}

/// `DELETE /api/admin/:collection` with `{"id": ...}` in the body.
pub async fn handle_delete(
    req: Request<Bytes>,
    state: AppState,
    identity: Identity,
) -> Result<HttpResponse> {
    let collection = match admit_admin(&req, &identity) {
        Ok(c) => c,
        Err(response) => return Ok(response),
    };
    let id = match parse_object(req.body()).and_then(|r| require_id(&r)) {
        Ok(id) => id,
        Err(response) => return Ok(response),
    };

    match state.resources.delete(&collection, id).await {
        Ok(true) => {
            info!("{} deleted {} #{}", identity.username, collection, id);
            deliver_success_json::<()>(None, StatusCode::OK)
        }
        Ok(false) => record_not_found(),
        Err(e) => Ok(store_failure(&collection, e)),
    }
}
