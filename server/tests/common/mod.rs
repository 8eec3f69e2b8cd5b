#![allow(dead_code)]

use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use http_body_util::{BodyExt, Full};
use hyper::header::{CONTENT_TYPE, COOKIE, SET_COOKIE};
use hyper::{Method, Request, Response};
use serde_json::{Map, Value};
use tower::ServiceExt;

use server::auth::ManualClock;
use server::auth::csrf::{CSRF_COOKIE, CSRF_HEADER};
use server::database::{CredentialStore, InMemoryCredentialStore, ResourceStore, StoredCredential};
use server::error::StoreError;
use server::security::{CounterKey, CounterStore, WindowSnapshot};
use server::{AppState, HttpResponse, PortfolioService, build_service};
use shared::types::Identity;
use shared::types::server_config::{AppConfig, PasswordScheme};

pub const SECRET: &str = "integration-test-secret-0123456789abcdef";
pub const START_MS: u64 = 1_700_000_000_000;
pub const ADMIN_PASSWORD: &str = "correct horse battery staple";
pub const USER_PASSWORD: &str = "hunter2hunter2";
pub const FIXTURE_BCRYPT_COST: u32 = 4;

/// Matches `seeded_credentials`: bcrypt at the fixture cost.
pub fn test_config() -> AppConfig {
    let mut config = AppConfig::default();
    config.auth.jwt_secret = Some(SECRET.to_string());
    config.auth.password_scheme = PasswordScheme::Bcrypt;
    config.auth.bcrypt_cost = FIXTURE_BCRYPT_COST;
    config
}

pub fn admin() -> Identity {
    Identity {
        id: 1,
        username: "admin".into(),
        email: "admin@example.com".into(),
        role: "admin".into(),
    }
}

pub fn visitor() -> Identity {
    Identity {
        id: 2,
        username: "bob".into(),
        email: "bob@example.com".into(),
        role: "user".into(),
    }
}

/// Low-cost bcrypt keeps the suite fast.
pub async fn seeded_credentials() -> Arc<InMemoryCredentialStore> {
    let store = InMemoryCredentialStore::new();
    store
        .insert(admin(), bcrypt::hash(ADMIN_PASSWORD, FIXTURE_BCRYPT_COST).unwrap())
        .await;
    store
        .insert(visitor(), bcrypt::hash(USER_PASSWORD, FIXTURE_BCRYPT_COST).unwrap())
        .await;
    Arc::new(store)
}

/// Session cookie plus the CSRF token handed out by a protected GET.
pub struct Session {
    pub cookie: String,
    pub csrf: String,
}

impl Session {
    /// Request carrying both cookies and the echoed `x-csrf-token` header.
    pub fn request(&self, method: Method, path: &str, body: Option<Value>) -> Request<Full<Bytes>> {
        let cookies = format!("{}; {}={}", self.cookie, CSRF_COOKIE, self.csrf);
        let mut req = json_request(method, path, body, Some(cookies.as_str()));
        req.headers_mut()
            .insert(CSRF_HEADER, self.csrf.parse().unwrap());
        req
    }
}

pub struct Harness {
    pub service: PortfolioService,
    pub state: AppState,
    pub clock: ManualClock,
}

impl Harness {
    pub async fn new() -> Self {
        Self::build(test_config(), seeded_credentials().await, |s| s).await
    }

    pub async fn build(
        config: AppConfig,
        credentials: Arc<dyn CredentialStore>,
        customize: impl FnOnce(AppState) -> AppState,
    ) -> Self {
        let clock = ManualClock::new(START_MS);
        let state = AppState::new(config, Arc::new(clock.clone()), credentials).unwrap();
        let state = customize(state);
        let service = build_service(state.clone()).unwrap();
        Self {
            service,
            state,
            clock,
        }
    }

    pub async fn send(&self, req: Request<Full<Bytes>>) -> HttpResponse {
        self.service.clone().oneshot(req).await.unwrap()
    }

    pub async fn login(&self, username: &str, password: &str) -> HttpResponse {
        self.send(json_request(
            Method::POST,
            "/api/auth/login",
            Some(serde_json::json!({"username": username, "password": password})),
            None,
        ))
        .await
    }

    /// Log in and return the `name=value` pair to send back as `Cookie`.
    pub async fn session_for(&self, username: &str, password: &str) -> String {
        let response = self.login(username, password).await;
        assert_eq!(response.status(), 200);
        session_cookie(&response).expect("login should set a session cookie")
    }

    /// Log in, then pick up a CSRF token the way a browser would: from the
    /// `Set-Cookie` of a protected GET.
    pub async fn session_with_csrf(&self, username: &str, password: &str) -> Session {
        let cookie = self.session_for(username, password).await;
        let me = self
            .send(json_request(Method::GET, "/api/auth/me", None, Some(cookie.as_str())))
            .await;
        assert_eq!(me.status(), 200);
        let csrf = csrf_cookie(&me).expect("protected GET should set a CSRF cookie");
        Session { cookie, csrf }
    }
}

pub fn peer() -> SocketAddr {
    SocketAddr::from(([127, 0, 0, 1], 50_000))
}

pub fn json_request(
    method: Method,
    path: &str,
    body: Option<Value>,
    cookie: Option<&str>,
) -> Request<Full<Bytes>> {
    let mut builder = Request::builder().method(method).uri(path);
    if body.is_some() {
        builder = builder.header(CONTENT_TYPE, "application/json");
    }
    if let Some(cookie) = cookie {
        builder = builder.header(COOKIE, cookie);
    }

    let bytes = body.map(|b| Bytes::from(b.to_string())).unwrap_or_default();
    let mut req = builder.body(Full::new(bytes)).unwrap();
    req.extensions_mut().insert(peer());
    req
}

pub fn session_cookie<B>(response: &Response<B>) -> Option<String> {
    let value = response.headers().get(SET_COOKIE)?.to_str().ok()?;
    let pair = value.split(';').next()?.trim();
    let (_, token) = pair.split_once('=')?;
    (!token.is_empty()).then(|| pair.to_string())
}

/// Value of the `_csrf` cookie among the response's `Set-Cookie` headers.
pub fn csrf_cookie<B>(response: &Response<B>) -> Option<String> {
    response
        .headers()
        .get_all(SET_COOKIE)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .find_map(|v| {
            let pair = v.split(';').next()?.trim();
            let (name, value) = pair.split_once('=')?;
            (name == CSRF_COOKIE && !value.is_empty()).then(|| value.to_string())
        })
}

pub fn set_cookie_header<B>(response: &Response<B>) -> String {
    response.headers()[SET_COOKIE].to_str().unwrap().to_string()
}

pub async fn json_body(response: HttpResponse) -> Value {
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    serde_json::from_slice(&bytes).unwrap()
}

pub fn header<B>(response: &Response<B>, name: &str) -> Option<String> {
    response
        .headers()
        .get(name)
        .map(|v| v.to_str().unwrap().to_string())
}

// ---------------------------------------------------------------------------
// Test doubles
// ---------------------------------------------------------------------------

/// Credential store whose backend is gone.
pub struct UnreachableCredentials;

#[async_trait]
impl CredentialStore for UnreachableCredentials {
    async fn lookup(&self, _username: &str) -> Result<Option<StoredCredential>, StoreError> {
        Err(StoreError::Unavailable("connection refused".into()))
    }
}

/// Counter store whose backend is gone.
pub struct UnreachableCounters;

#[async_trait]
impl CounterStore for UnreachableCounters {
    async fn increment(
        &self,
        _key: &CounterKey,
        _window: Duration,
        _now_ms: u64,
    ) -> Result<WindowSnapshot, StoreError> {
        Err(StoreError::Unavailable("counter backend down".into()))
    }

    async fn purge_expired(&self, _now_ms: u64, _grace: Duration) -> Result<usize, StoreError> {
        Err(StoreError::Unavailable("counter backend down".into()))
    }

    async fn snapshot(&self) -> Result<Vec<(CounterKey, WindowSnapshot)>, StoreError> {
        Err(StoreError::Unavailable("counter backend down".into()))
    }
}

/// Resource store that only counts how often it was called.
#[derive(Default)]
pub struct RecordingResources {
    pub calls: AtomicUsize,
}

impl RecordingResources {
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    fn touch(&self) {
        self.calls.fetch_add(1, Ordering::SeqCst);
    }
}

#[async_trait]
impl ResourceStore for RecordingResources {
    async fn list(&self, _collection: &str) -> Result<Vec<Value>, StoreError> {
        self.touch();
        Ok(Vec::new())
    }

    async fn create(
        &self,
        _collection: &str,
        record: Map<String, Value>,
    ) -> Result<Value, StoreError> {
        self.touch();
        Ok(Value::Object(record))
    }

    async fn update(
        &self,
        _collection: &str,
        _id: i64,
        _changes: Map<String, Value>,
    ) -> Result<Option<Value>, StoreError> {
        self.touch();
        Ok(None)
    }

    async fn delete(&self, _collection: &str, _id: i64) -> Result<bool, StoreError> {
        self.touch();
        Ok(false)
    }
}
