use std::convert::Infallible;
use std::sync::Arc;
use std::time::Instant;

use bytes::Bytes;
use http_body_util::combinators::BoxBody;
use hyper::{Method, Response};
use secrecy::SecretString;
use tower::ServiceBuilder;

use shared::types::server_config::AppConfig;

pub mod auth;
pub mod database;
pub mod error;
pub mod handlers;
pub mod security;
pub mod tower_middle;

use crate::auth::password::DummyHash;
use crate::auth::{AuthGate, CsrfGuard, SessionCookie, SharedClock, TokenCodec};
use crate::database::{
    ContactSink, CredentialStore, InMemoryResourceStore, ResourceStore, TracingContactSink,
};
use crate::error::AuthError;
use crate::handlers::http::routes::build_api_router;
use crate::security::{CounterStore, MemoryCounterStore, RateLimitPolicy, RateLimiter};
use crate::tower_middle::{
    AppService, ClientIdentity, PathScope, RateLimiterLayer, RateLimiterService,
};

pub type HttpResponse = Response<BoxBody<Bytes, Infallible>>;

/// Full request pipeline: strict limiter, standard limiter, then the app.
pub type PortfolioService = RateLimiterService<RateLimiterService<AppService>>;

/// Everything a handler can reach. Cheap to clone.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<AppConfig>,
    pub clock: SharedClock,
    pub gate: AuthGate,
    pub csrf: CsrfGuard,
    pub dummy_hash: DummyHash,
    pub limiter: RateLimiter,
    pub credentials: Arc<dyn CredentialStore>,
    pub resources: Arc<dyn ResourceStore>,
    pub contact: Arc<dyn ContactSink>,
    pub started_at: Instant,
}

impl AppState {
    /// Build state from a validated config. Fails with
    /// `AuthError::ConfigurationFatal` when no usable signing secret exists
    /// or the dummy password hash cannot be built.
    pub fn new(
        config: AppConfig,
        clock: SharedClock,
        credentials: Arc<dyn CredentialStore>,
    ) -> Result<Self, AuthError> {
        let secret = config.auth.resolved_jwt_secret().ok_or_else(|| {
            AuthError::ConfigurationFatal(
                "no signing secret: set JWT_SECRET or auth.jwt_secret".to_string(),
            )
        })?;
        let force_secure = config.server.force_secure_cookies;
        let csrf = match config.auth.resolved_csrf_secret() {
            Some(csrf_secret) => CsrfGuard::new(csrf_secret.as_bytes(), force_secure)?,
            None => CsrfGuard::derived_from(secret.as_bytes(), force_secure)?,
        };
        let dummy_hash =
            DummyHash::for_scheme(config.auth.password_scheme, config.auth.bcrypt_cost)?;
        let codec = TokenCodec::new(&SecretString::from(secret), clock.clone())?;
        let cookie = SessionCookie::new(config.auth.cookie_name.clone(), force_secure);

        let limiter = RateLimiter::new(
            Arc::new(MemoryCounterStore::new()),
            clock.clone(),
            config.rate_limit.grace(),
        );

        Ok(Self {
            config: Arc::new(config),
            clock,
            gate: AuthGate::new(codec, cookie),
            csrf,
            dummy_hash,
            limiter,
            credentials,
            resources: Arc::new(InMemoryResourceStore::new()),
            contact: Arc::new(TracingContactSink),
            started_at: Instant::now(),
        })
    }

    /// Swap the rate limiter's counter store (shared or external backends).
    pub fn with_counter_store(mut self, store: Arc<dyn CounterStore>) -> Self {
        self.limiter = RateLimiter::new(store, self.clock.clone(), self.config.rate_limit.grace());
        self
    }

    pub fn with_resources(mut self, resources: Arc<dyn ResourceStore>) -> Self {
        self.resources = resources;
        self
    }

    pub fn with_contact_sink(mut self, contact: Arc<dyn ContactSink>) -> Self {
        self.contact = contact;
        self
    }

    pub fn standard_policy(&self) -> RateLimitPolicy {
        RateLimitPolicy::standard(&self.config.rate_limit.standard)
    }

    pub fn strict_policy(&self) -> RateLimitPolicy {
        RateLimitPolicy::strict(&self.config.rate_limit.strict)
    }
}

/// Assemble the tower stack around the router.
///
/// The strict layer is outermost so login and contact submissions are
/// counted (and rejected) before anything else, and its headers are the ones
/// the client sees.
pub fn build_service(state: AppState) -> Result<PortfolioService, AuthError> {
    let identity = ClientIdentity::from_config(&state.config.server)?;

    let strict = RateLimiterLayer::new(
        state.limiter.clone(),
        state.strict_policy(),
        PathScope::Exact(vec![
            (Method::POST, "/api/auth/login".to_string()),
            (Method::POST, "/api/contact".to_string()),
        ]),
        identity.clone(),
    );

    let standard = RateLimiterLayer::new(
        state.limiter.clone(),
        state.standard_policy(),
        PathScope::Prefix("/api/".to_string()),
        identity,
    );

    Ok(ServiceBuilder::new()
        .layer(strict)
        .layer(standard)
        .service(AppService::new(build_api_router(), state)))
}
