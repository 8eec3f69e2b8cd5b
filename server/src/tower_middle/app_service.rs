use std::convert::Infallible;
use std::error::Error as StdError;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

use bytes::Bytes;
use http_body_util::combinators::BoxBody;
use http_body_util::{BodyExt, LengthLimitError, Limited};
use hyper::body::Body;
use hyper::{Request, Response};
use tower::Service;
use tracing::{error, warn};

use crate::AppState;
use crate::error::AuthError;
use crate::handlers::http::routes::Router;

/// Innermost service: buffers the body (up to `max_body_bytes`), dispatches
/// through the `Router`, and turns handler errors into a generic 500.
#[derive(Clone)]
pub struct AppService {
    router: Arc<Router>,
    state: AppState,
}

impl AppService {
    pub fn new(router: Router, state: AppState) -> Self {
        Self {
            router: Arc::new(router),
            state,
        }
    }
}

impl<B> Service<Request<B>> for AppService
where
    B: Body + Send + 'static,
    B::Data: Send,
    B::Error: Into<Box<dyn StdError + Send + Sync>>,
{
    type Response = Response<BoxBody<Bytes, Infallible>>;
    type Error = Infallible;
    type Future = Pin<Box<dyn Future<Output = Result<Self::Response, Self::Error>> + Send>>;

    fn poll_ready(&mut self, _cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        Poll::Ready(Ok(()))
    }

    fn call(&mut self, req: Request<B>) -> Self::Future {
        let router = self.router.clone();
        let state = self.state.clone();

        Box::pin(async move {
            let (parts, body) = req.into_parts();
            let limit = state.config.server.max_body_bytes;

            let bytes = match Limited::new(body, limit).collect().await {
                Ok(collected) => collected.to_bytes(),
                Err(e) if e.downcast_ref::<LengthLimitError>().is_some() => {
                    warn!("Request body for {} exceeds {} bytes", parts.uri.path(), limit);
                    return Ok(AuthError::PayloadTooLarge { limit }.to_response());
                }
                Err(e) => {
                    warn!("Failed to read request body: {}", e);
                    return Ok(
                        AuthError::bad_request("BAD_REQUEST", "Failed to read request body")
                            .to_response(),
                    );
                }
            };

            let req = Request::from_parts(parts, bytes);
            let method = req.method().clone();
            let path = req.uri().path().to_string();

            match router.route(req, state).await {
                Ok(response) => Ok(response),
                Err(e) => {
                    error!("Handler for {} {} failed: {:#}", method, path, e);
                    Ok(AuthError::Internal(e).to_response())
                }
            }
        })
    }
}
