mod common;

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use hyper::{Method, StatusCode};
use serde_json::json;

use common::*;

fn contact_request(from: SocketAddr) -> hyper::Request<http_body_util::Full<bytes::Bytes>> {
    let mut req = json_request(
        Method::POST,
        "/api/contact",
        Some(json!({"name": "Jane", "email": "jane@example.com", "message": "Hi"})),
        None,
    );
    req.extensions_mut().insert(from);
    req
}

#[tokio::test]
async fn sixth_login_in_window_is_rejected() {
    let h = Harness::new().await;

    for attempt in 1..=5 {
        let response = h.login("admin", ADMIN_PASSWORD).await;
        assert_eq!(response.status(), StatusCode::OK, "attempt {}", attempt);
        assert_eq!(
            header(&response, "x-ratelimit-remaining"),
            Some((5 - attempt).to_string())
        );
    }

    let response = h.login("admin", ADMIN_PASSWORD).await;
    assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
    assert_eq!(header(&response, "x-ratelimit-limit").as_deref(), Some("5"));
    assert_eq!(header(&response, "x-ratelimit-remaining").as_deref(), Some("0"));

    let now_secs = START_MS / 1000;
    let reset: u64 = header(&response, "x-ratelimit-reset").unwrap().parse().unwrap();
    assert!(reset > now_secs);
    assert_eq!(reset, now_secs + 900);

    let retry_after: u64 = header(&response, "retry-after").unwrap().parse().unwrap();
    assert!(retry_after >= 1);
    assert!(session_cookie(&response).is_none());

    let body = json_body(response).await;
    assert_eq!(body["status"], "error");
    assert_eq!(body["code"], "RATE_LIMITED");
}

#[tokio::test]
async fn failed_logins_count_too() {
    let h = Harness::new().await;
    for _ in 0..5 {
        assert_eq!(
            h.login("admin", "guess").await.status(),
            StatusCode::UNAUTHORIZED
        );
    }
    assert_eq!(
        h.login("admin", ADMIN_PASSWORD).await.status(),
        StatusCode::TOO_MANY_REQUESTS
    );
}

#[tokio::test]
async fn strict_window_resets() {
    let h = Harness::new().await;
    for _ in 0..6 {
        h.login("admin", "guess").await;
    }
    assert_eq!(
        h.login("admin", ADMIN_PASSWORD).await.status(),
        StatusCode::TOO_MANY_REQUESTS
    );

    h.clock.advance(Duration::from_secs(15 * 60));
    let response = h.login("admin", ADMIN_PASSWORD).await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(header(&response, "x-ratelimit-remaining").as_deref(), Some("4"));
}

#[tokio::test]
async fn standard_policy_headers_on_general_api() {
    let h = Harness::new().await;
    let response = h
        .send(json_request(Method::GET, "/api/health", None, None))
        .await;
    assert_eq!(header(&response, "x-ratelimit-limit").as_deref(), Some("60"));
    assert_eq!(header(&response, "x-ratelimit-remaining").as_deref(), Some("59"));
    assert!(header(&response, "retry-after").is_none());
}

#[tokio::test]
async fn strict_headers_win_on_login() {
    let h = Harness::new().await;
    let response = h.login("admin", ADMIN_PASSWORD).await;
    assert_eq!(header(&response, "x-ratelimit-limit").as_deref(), Some("5"));
    assert_eq!(header(&response, "x-ratelimit-remaining").as_deref(), Some("4"));
}

#[tokio::test]
async fn standard_limit_applies_to_all_api_paths() {
    let mut config = test_config();
    config.rate_limit.standard.limit = 3;
    let h = Harness::build(config, seeded_credentials().await, |s| s).await;

    for _ in 0..3 {
        let ok = h
            .send(json_request(Method::GET, "/api/health", None, None))
            .await;
        assert_eq!(ok.status(), StatusCode::OK);
    }

    let limited = h
        .send(json_request(Method::GET, "/api/auth/me", None, None))
        .await;
    assert_eq!(limited.status(), StatusCode::TOO_MANY_REQUESTS);
}

#[tokio::test]
async fn clients_are_counted_separately() {
    let h = Harness::new().await;
    let first = SocketAddr::from(([192, 0, 2, 1], 1000));
    let second = SocketAddr::from(([192, 0, 2, 2], 1000));

    for _ in 0..5 {
        assert_eq!(h.send(contact_request(first)).await.status(), StatusCode::OK);
    }
    assert_eq!(
        h.send(contact_request(first)).await.status(),
        StatusCode::TOO_MANY_REQUESTS
    );
    assert_eq!(h.send(contact_request(second)).await.status(), StatusCode::OK);
}

#[tokio::test]
async fn trusted_proxy_header_identifies_clients() {
    let mut config = test_config();
    config.server.trusted_proxy_header = Some("x-forwarded-for".into());
    config.server.trusted_proxies = vec!["127.0.0.0/8".into()];
    let h = Harness::build(config, seeded_credentials().await, |s| s).await;

    let from = |client: &'static str| {
        let mut req = contact_request(peer());
        req.headers_mut()
            .insert("x-forwarded-for", client.parse().unwrap());
        req
    };

    for _ in 0..5 {
        assert_eq!(h.send(from("203.0.113.7, 127.0.0.1")).await.status(), StatusCode::OK);
    }
    assert_eq!(
        h.send(from("203.0.113.7")).await.status(),
        StatusCode::TOO_MANY_REQUESTS
    );
    assert_eq!(h.send(from("203.0.113.8")).await.status(), StatusCode::OK);
}

#[tokio::test]
async fn failing_counter_store_closes_strict_and_opens_standard() {
    let h = Harness::build(test_config(), seeded_credentials().await, |s| {
        s.with_counter_store(Arc::new(UnreachableCounters))
    })
    .await;

    let login = h.login("admin", ADMIN_PASSWORD).await;
    assert_eq!(login.status(), StatusCode::SERVICE_UNAVAILABLE);
    assert!(session_cookie(&login).is_none());
    assert_eq!(json_body(login).await["code"], "SERVICE_UNAVAILABLE");

    let contact = h.send(contact_request(peer())).await;
    assert_eq!(contact.status(), StatusCode::SERVICE_UNAVAILABLE);

    let health = h
        .send(json_request(Method::GET, "/api/health", None, None))
        .await;
    assert_eq!(health.status(), StatusCode::OK);
    assert!(header(&health, "x-ratelimit-limit").is_none());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_submissions_respect_the_limit() {
    let h = Arc::new(Harness::new().await);

    let handles: Vec<_> = (0..25)
        .map(|_| {
            let h = h.clone();
            tokio::spawn(async move { h.send(contact_request(peer())).await.status() })
        })
        .collect();

    let mut ok = 0;
    let mut limited = 0;
    for handle in handles {
        match handle.await.unwrap() {
            StatusCode::OK => ok += 1,
            StatusCode::TOO_MANY_REQUESTS => limited += 1,
            other => panic!("unexpected status {}", other),
        }
    }

    assert_eq!(ok, 5);
    assert_eq!(limited, 20);
}

#[tokio::test]
async fn gc_forgets_idle_clients() {
    let h = Harness::new().await;
    h.login("admin", ADMIN_PASSWORD).await;

    let standard = h.state.standard_policy();
    let strict = h.state.strict_policy();
    let stats = h.state.limiter.stats(&[&standard, &strict]).await.unwrap();
    assert_eq!(stats.tracked, 2);

    h.clock.advance(Duration::from_secs(15 * 60 + 60));
    assert_eq!(h.state.limiter.gc().await.unwrap(), 2);
}
