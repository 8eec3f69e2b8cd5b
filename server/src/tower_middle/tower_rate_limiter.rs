use std::convert::Infallible;
use std::future::Future;
use std::net::SocketAddr;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

use bytes::Bytes;
use http_body_util::combinators::BoxBody;
use hyper::header::{HeaderMap, HeaderName, HeaderValue, RETRY_AFTER};
use hyper::{Method, Request, Response, StatusCode};
use ipnet::IpNet;
use tower::{Layer, Service};
use tracing::{error, warn};

use shared::types::server_config::ServerConfig;

use crate::error::AuthError;
use crate::security::{Decision, FailMode, RateLimitPolicy, RateLimiter};

pub const X_RATELIMIT_LIMIT: &str = "x-ratelimit-limit";
pub const X_RATELIMIT_REMAINING: &str = "x-ratelimit-remaining";
pub const X_RATELIMIT_RESET: &str = "x-ratelimit-reset";

/// Which requests a policy counts.
#[derive(Debug, Clone)]
pub enum PathScope {
    /// Every path starting with this prefix, any method.
    Prefix(String),
    /// Only these exact method + path pairs.
    Exact(Vec<(Method, String)>),
}

impl PathScope {
    pub fn covers(&self, method: &Method, path: &str) -> bool {
        match self {
            Self::Prefix(prefix) => path.starts_with(prefix.as_str()),
            Self::Exact(routes) => routes.iter().any(|(m, p)| m == method && p == path),
        }
    }
}

/// Works out which client a request counts against.
///
/// The peer socket address is used unless a proxy header is configured and
/// the peer is one of the trusted proxies; then the first entry of that header
/// wins.
#[derive(Debug, Clone, Default)]
pub struct ClientIdentity {
    header: Option<HeaderName>,
    trusted: Vec<IpNet>,
}

impl ClientIdentity {
    pub fn from_config(config: &ServerConfig) -> Result<Self, AuthError> {
        let header = config
            .trusted_proxy_header
            .as_deref()
            .map(|name| {
                HeaderName::from_bytes(name.as_bytes()).map_err(|e| {
                    AuthError::ConfigurationFatal(format!("trusted_proxy_header: {}", e))
                })
            })
            .transpose()?;

        let trusted = config
            .trusted_proxies
            .iter()
            .map(|net| {
                net.parse::<IpNet>().map_err(|e| {
                    AuthError::ConfigurationFatal(format!("trusted_proxies {}: {}", net, e))
                })
            })
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Self { header, trusted })
    }

    pub fn resolve(&self, headers: &HeaderMap, peer: Option<SocketAddr>) -> String {
        if let Some(forwarded) = self.forwarded_client(headers, peer) {
            return forwarded;
        }

        peer.map(|addr| addr.ip().to_string())
            .unwrap_or_else(|| "unknown".to_string())
    }

    fn forwarded_client(&self, headers: &HeaderMap, peer: Option<SocketAddr>) -> Option<String> {
        let header = self.header.as_ref()?;

        if !self.trusted.is_empty() {
            let peer_ip = peer?.ip();
            if !self.trusted.iter().any(|net| net.contains(&peer_ip)) {
                return None;
            }
        }

        let first = headers
            .get(header)?
            .to_str()
            .ok()?
            .split(',')
            .next()?
            .trim();

        (!first.is_empty()).then(|| first.to_string())
    }
}

/// Write the `X-RateLimit-*` set (and `Retry-After` on rejection), replacing
/// any values already present.
pub fn write_rate_limit_headers(headers: &mut HeaderMap, decision: &Decision) {
    headers.insert(X_RATELIMIT_LIMIT, HeaderValue::from(decision.limit));
    headers.insert(X_RATELIMIT_REMAINING, HeaderValue::from(decision.remaining));
    headers.insert(X_RATELIMIT_RESET, HeaderValue::from(decision.reset_at_secs()));

    if !decision.allowed {
        headers.insert(RETRY_AFTER, HeaderValue::from(decision.retry_after_secs));
    }
}

/// Tower layer applying one rate-limit policy to the requests in its scope.
#[derive(Clone)]
pub struct RateLimiterLayer {
    limiter: RateLimiter,
    policy: Arc<RateLimitPolicy>,
    scope: Arc<PathScope>,
    identity: Arc<ClientIdentity>,
}

impl RateLimiterLayer {
    pub fn new(
        limiter: RateLimiter,
        policy: RateLimitPolicy,
        scope: PathScope,
        identity: ClientIdentity,
    ) -> Self {
        Self {
            limiter,
            policy: Arc::new(policy),
            scope: Arc::new(scope),
            identity: Arc::new(identity),
        }
    }
}

impl<S> Layer<S> for RateLimiterLayer {
    type Service = RateLimiterService<S>;

    fn layer(&self, inner: S) -> Self::Service {
        RateLimiterService {
            inner,
            limiter: self.limiter.clone(),
            policy: self.policy.clone(),
            scope: self.scope.clone(),
            identity: self.identity.clone(),
        }
    }
}

#[derive(Clone)]
pub struct RateLimiterService<S> {
    inner: S,
    limiter: RateLimiter,
    policy: Arc<RateLimitPolicy>,
    scope: Arc<PathScope>,
    identity: Arc<ClientIdentity>,
}

type HttpResponse = Response<BoxBody<Bytes, Infallible>>;

impl<S, ReqBody> Service<Request<ReqBody>> for RateLimiterService<S>
where
    S: Service<Request<ReqBody>, Response = HttpResponse> + Clone + Send + 'static,
    S::Future: Send + 'static,
    ReqBody: Send + 'static,
{
    type Response = HttpResponse;
    type Error = S::Error;
    type Future = Pin<Box<dyn Future<Output = Result<Self::Response, Self::Error>> + Send>>;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, req: Request<ReqBody>) -> Self::Future {
        // The clone may not be ready; keep the one that was polled.
        let clone = self.inner.clone();
        let mut inner = std::mem::replace(&mut self.inner, clone);

        if !self.scope.covers(req.method(), req.uri().path()) {
            return Box::pin(inner.call(req));
        }

        let peer = req.extensions().get::<SocketAddr>().copied();
        let client = self.identity.resolve(req.headers(), peer);
        let limiter = self.limiter.clone();
        let policy = self.policy.clone();

        Box::pin(async move {
            let decision = match limiter.admit(&client, &policy).await {
                Ok(decision) => decision,
                Err(e) => {
                    return match policy.fail_mode {
                        FailMode::Open => {
                            warn!(
                                "Rate limit store failed for {} policy, letting {} through: {}",
                                policy.name, client, e
                            );
                            inner.call(req).await
                        }
                        FailMode::Closed => {
                            error!(
                                "Rate limit store failed for {} policy, refusing {}: {}",
                                policy.name, client, e
                            );
                            Ok(AuthError::from(e).to_response())
                        }
                    };
                }
            };

            if !decision.allowed {
                warn!(
                    "Client {} rate limited by {} policy on {} {}",
                    client,
                    policy.name,
                    req.method(),
                    req.uri().path()
                );
                return Ok(AuthError::RateLimited(decision).to_response());
            }

            let mut response = inner.call(req).await?;

            // An inner policy's rejection keeps its own numbers.
            if response.status() != StatusCode::TOO_MANY_REQUESTS {
                write_rate_limit_headers(response.headers_mut(), &decision);
            }

            Ok(response)
        })
    }
}
