use std::convert::Infallible;
use std::future::Future;
use std::pin::Pin;

use anyhow::{Context, Result};
use bytes::Bytes;
use http_body_util::combinators::BoxBody;
use hyper::header::SET_COOKIE;
use hyper::{Method, Request, Response, StatusCode};
use tracing::warn;

use shared::types::Identity;

use crate::AppState;
use crate::auth::csrf;
use crate::error::AuthError;
use crate::handlers::http::utils::{is_https, json_response};
use crate::handlers::http::{admin, auth, contact, health};

type HttpResponse = Response<BoxBody<Bytes, Infallible>>;
type HandlerFuture = Pin<Box<dyn Future<Output = Result<HttpResponse>> + Send>>;

// ---------------------------------------------------------------------------
// Handler type aliases
// ---------------------------------------------------------------------------
//
// Two security tiers:
//
//   OpenHandler       no auth. Receives (req, state).
//                     Use for: login, logout, contact, health.
//
//   ProtectedHandler  session cookie verified by the `AuthGate` before the
//                     handler runs. Receives (req, state, identity).
//                     POST/PUT/DELETE must also pass the CSRF double-submit
//                     check; GET responses hand out a fresh CSRF cookie.
//                     Use for: everything that needs to know who is asking.

type OpenHandler = Box<dyn Fn(Request<Bytes>, AppState) -> HandlerFuture + Send + Sync>;

type ProtectedHandler =
    Box<dyn Fn(Request<Bytes>, AppState, Identity) -> HandlerFuture + Send + Sync>;

enum RouteKind {
    Open(OpenHandler),
    Protected(ProtectedHandler),
}

struct Route {
    method: Method,
    path: String,
    kind: RouteKind,
}

// ---------------------------------------------------------------------------
// Router
// ---------------------------------------------------------------------------

#[derive(Default)]
pub struct Router {
    routes: Vec<Route>,
}

impl std::fmt::Debug for Router {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Router")
            .field("routes_count", &self.routes.len())
            .finish()
    }
}

impl Router {
    pub fn new() -> Self {
        Self::default()
    }

    /// Route with no authentication check.
    pub fn open<F, Fut>(mut self, method: Method, path: &str, handler: F) -> Self
    where
        F: Fn(Request<Bytes>, AppState) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<HttpResponse>> + Send + 'static,
    {
        self.routes.push(Route {
            method,
            path: path.to_string(),
            kind: RouteKind::Open(Box::new(move |req, state| Box::pin(handler(req, state)))),
        });
        self
    }

    /// Route guarded by the session cookie. The handler only ever runs with
    /// a verified identity and must not repeat the check.
    pub fn protected<F, Fut>(mut self, method: Method, path: &str, handler: F) -> Self
    where
        F: Fn(Request<Bytes>, AppState, Identity) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<HttpResponse>> + Send + 'static,
    {
        self.routes.push(Route {
            method,
            path: path.to_string(),
            kind: RouteKind::Protected(Box::new(move |req, state, identity| {
                Box::pin(handler(req, state, identity))
            })),
        });
        self
    }

    pub fn get<F, Fut>(self, path: &str, handler: F) -> Self
    where
        F: Fn(Request<Bytes>, AppState) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<HttpResponse>> + Send + 'static,
    {
        self.open(Method::GET, path, handler)
    }

    pub fn post<F, Fut>(self, path: &str, handler: F) -> Self
    where
        F: Fn(Request<Bytes>, AppState) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<HttpResponse>> + Send + 'static,
    {
        self.open(Method::POST, path, handler)
    }

    // ── Dispatch ──────────────────────────────────────────────────────────────

    pub async fn route(&self, mut req: Request<Bytes>, state: AppState) -> Result<HttpResponse> {
        let method = req.method().clone();
        let path = req.uri().path().to_string();
        let mut path_known = false;

        for route in &self.routes {
            if !Self::path_matches(&route.path, &path) {
                continue;
            }
            path_known = true;
            if route.method != method {
                continue;
            }

            return match &route.kind {
                RouteKind::Open(h) => h(req, state).await,

                RouteKind::Protected(h) => {
                    let identity = match state.gate.admit(&mut req) {
                        Ok(identity) => identity,
                        Err(reason) => {
                            warn!("Auth rejected {} {}: {}", method, path, reason);
                            return unauthorized();
                        }
                    };

                    if csrf::requires_check(&method) {
                        if let Err(reason) = state.csrf.check(req.headers()) {
                            warn!("CSRF rejected {} {}: {}", method, path, reason);
                            return Ok(AuthError::from(reason).to_response());
                        }
                        return h(req, state, identity).await;
                    }

                    let secure = is_https(&req);
                    let guard = state.csrf.clone();
                    let mut response = h(req, state, identity).await?;
                    let cookie = guard
                        .cookie(&guard.issue(), secure)
                        .context("Failed to create CSRF cookie")?;
                    response.headers_mut().append(SET_COOKIE, cookie);
                    Ok(response)
                }
            };
        }

        if path_known {
            return json_response::deliver_error_json(
                "METHOD_NOT_ALLOWED",
                "Method not allowed",
                StatusCode::METHOD_NOT_ALLOWED,
            )
            .context("Failed to deliver 405 response");
        }

        json_response::deliver_error_json("NOT_FOUND", "Endpoint not found", StatusCode::NOT_FOUND)
            .context("Failed to deliver 404 response")
    }

    // ── Path matching ─────────────────────────────────────────────────────────

    pub fn path_matches(route_path: &str, request_path: &str) -> bool {
        // Strip query string from incoming request path before comparing.
        let clean = request_path.split('?').next().unwrap_or(request_path);

        if route_path == clean {
            return true;
        }

        // Segment-by-segment matching for `:param` wildcards.
        // e.g.  "/api/admin/:collection"  matches  "/api/admin/skills"
        let route_segs: Vec<&str> = route_path.split('/').collect();
        let path_segs: Vec<&str> = clean.split('/').collect();

        if route_segs.len() != path_segs.len() {
            return false;
        }

        route_segs
            .iter()
            .zip(path_segs.iter())
            .all(|(r, p)| (r.starts_with(':') && !p.is_empty()) || r == p)
    }
}

// ---------------------------------------------------------------------------
// Helper
// ---------------------------------------------------------------------------

/// Every auth failure looks the same from outside.
fn unauthorized() -> Result<HttpResponse> {
    json_response::deliver_error_json(
        "UNAUTHORIZED",
        "Authentication required",
        StatusCode::UNAUTHORIZED,
    )
    .context("Failed to deliver 401 response")
}

// ---------------------------------------------------------------------------
// API router
//
// Auth tier is enforced here at the routing level; handlers MUST NOT repeat
// the auth call. Rate limiting happens before the router, in the tower
// layers built by `build_service`.
// ---------------------------------------------------------------------------

pub fn build_api_router() -> Router {
    Router::new()
        // ── Public ───────────────────────────────────────────────────────────
        .get("/api/health", health::handle_health)
        .post("/api/auth/login", auth::login::handle_login)
        .post("/api/auth/logout", auth::logout::handle_logout)
        .post("/api/contact", contact::handle_contact)
        // ── Session ──────────────────────────────────────────────────────────
        .protected(Method::GET, "/api/auth/me", auth::session::handle_me)
        // ── Admin (role checked inside, after the gate) ─────────────────────
        .protected(Method::GET, "/api/admin/:collection", admin::resources::handle_list)
        .protected(Method::POST, "/api/admin/:collection", admin::resources::handle_create)
        .protected(Method::PUT, "/api/admin/:collection", admin::resources::handle_update)
        .protected(Method::DELETE, "/api/admin/:collection", admin::resources::handle_delete)
}
