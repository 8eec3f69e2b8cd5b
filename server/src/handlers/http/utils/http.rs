use hyper::Request;

/// Returns true only when the request arrived over a secure (HTTPS) connection.
///
/// Checks, in order:
///   1. `X-Forwarded-Proto: https`   set by most reverse proxies (nginx, Caddy, etc.)
///   2. `X-Forwarded-Ssl: on`        Apache-style variant
///   3. The request URI scheme is literally "https"
///
/// Falls back to `false` so that plain HTTP dev servers work out of the box
/// without any configuration change. `force_secure_cookies` covers TLS
/// terminated somewhere that sets neither header.
pub fn is_https<B>(req: &Request<B>) -> bool {
    let header_is = |name: &str, expected: &str| {
        req.headers()
            .get(name)
            .and_then(|v| v.to_str().ok())
            .is_some_and(|v| v.eq_ignore_ascii_case(expected))
    };

    if header_is("x-forwarded-proto", "https") || header_is("x-forwarded-ssl", "on") {
        return true;
    }

    // Only present when using an absolute-form request URI
    req.uri().scheme_str() == Some("https")
}
