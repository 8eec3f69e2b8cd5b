use std::convert::Infallible;

use anyhow::Result;
use bytes::Bytes;
use http_body_util::combinators::BoxBody;
use hyper::{Request, Response, StatusCode};
use tracing::{error, info, warn};

use shared::types::contact::is_valid_email;
use shared::types::{ContactData, ContactResponse};

use crate::AppState;
use crate::error::AuthError;
use crate::handlers::http::utils;

/// `POST /api/contact`
///
/// Validates and hands the submission to the contact sink. A sink failure is
/// logged but the visitor still gets a success response: the submission was
/// accepted, delivery is retried or handled out of band.
pub async fn handle_contact(
    req: Request<Bytes>,
    state: AppState,
) -> Result<Response<BoxBody<Bytes, Infallible>>> {
    let submission: ContactData = match serde_json::from_slice(req.body()) {
        Ok(data) => data,
        Err(e) => {
            warn!("Contact form body rejected: {}", e);
            return Ok(
                AuthError::bad_request("INVALID_JSON", "Request body must be valid JSON")
                    .to_response(),
            );
        }
    };

    if !submission.has_all_fields() {
        return Ok(AuthError::bad_request(
            "MISSING_FIELD",
            "Name, email, and message are required",
        )
        .to_response());
    }

    if !is_valid_email(submission.email.trim()) {
        return Ok(AuthError::bad_request("INVALID_EMAIL", "Invalid email address").to_response());
    }

    info!("Contact submission from {}", submission.email.trim());

    if let Err(e) = state.contact.submit(submission).await {
        error!("Contact sink failed: {:#}", e);
    }

    utils::deliver_serialized_json(
        &ContactResponse {
            success: true,
            message: "Thank you for your message! I'll get back to you soon.".to_string(),
        },
        StatusCode::OK,
    )
}
