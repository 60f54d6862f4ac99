//! Retry behavior of the resilient client against live mock backends.

use std::sync::Arc;
use std::time::{Duration, Instant};

use reqwest::StatusCode;
use resilient_edge::clock::ManualClock;
use resilient_edge::config::{CircuitBreakerConfig, RetryConfig};
use resilient_edge::resilience::Outcome;
use resilient_edge::{ClientError, FetchError, ResilientClient, RetryOptions};
use tokio_util::sync::CancellationToken;

mod common;
use common::MockResponse;

fn client() -> ResilientClient {
    let retries = RetryConfig {
        initial_delay_ms: 10,
        ..RetryConfig::default()
    };
    ResilientClient::from_config(
        retries,
        CircuitBreakerConfig::default(),
        Arc::new(ManualClock::new(0)),
    )
    .unwrap()
}

#[tokio::test]
async fn test_retries_until_success() {
    let backend = common::start_sequence(vec![
        MockResponse::status(429),
        MockResponse::status(429),
        MockResponse::status(200).body("ok"),
    ])
    .await;

    let response = client()
        .get(&backend.url("/"), &RetryOptions::new())
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response.text().await.unwrap(), "ok");
    assert_eq!(backend.calls(), 3);
}

#[tokio::test]
async fn test_non_retryable_status_single_call() {
    for status in [400u16, 401, 403, 404] {
        let backend = common::start_fixed(status).await;
        let response = client()
            .get(&backend.url("/"), &RetryOptions::new())
            .await
            .unwrap();

        assert_eq!(response.status().as_u16(), status);
        assert_eq!(backend.calls(), 1, "status {status} must not be retried");
    }
}

#[tokio::test]
async fn test_exhaustion_returns_last_response() {
    let backend = common::start_fixed(503).await;
    let client = client();
    let request = client.http().get(backend.url("/")).build().unwrap();

    match client.execute(request, &RetryOptions::new()).await.unwrap() {
        Outcome::Exhausted { response, attempts } => {
            assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
            assert_eq!(attempts, 3);
        }
        other => panic!("expected exhaustion, got {other:?}"),
    }
    assert_eq!(backend.calls(), 3);
}

#[tokio::test]
async fn test_max_retries_override() {
    let backend = common::start_fixed(500).await;
    let response = client()
        .get(&backend.url("/"), &RetryOptions::new().max_retries(5))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(backend.calls(), 5);
}

#[tokio::test]
async fn test_network_error_after_retries() {
    let url = common::unreachable_url().await;
    let err = client().get(&url, &RetryOptions::new()).await.unwrap_err();

    assert!(
        matches!(err, ClientError::Fetch(FetchError::Network { .. })),
        "unexpected error: {err:?}"
    );
}

#[tokio::test]
async fn test_timeout_is_not_retried() {
    let backend = common::start_backend(|_| {
        MockResponse::status(200).delay(Duration::from_millis(500))
    })
    .await;

    let err = client()
        .get(&backend.url("/"), &RetryOptions::new().timeout_ms(50))
        .await
        .unwrap_err();

    assert!(matches!(
        err,
        ClientError::Fetch(FetchError::Timeout { timeout_ms: 50 })
    ));
    assert!(err.is_timeout());
    assert_eq!(backend.calls(), 1);
}

#[tokio::test]
async fn test_retry_after_header_overrides_backoff() {
    let backend = common::start_sequence(vec![
        MockResponse::status(429).header("retry-after", "0"),
        MockResponse::status(200),
    ])
    .await;

    let start = Instant::now();
    let response = client()
        .get(&backend.url("/"), &RetryOptions::new().initial_delay_ms(5_000))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert!(start.elapsed() < Duration::from_secs(2));
    assert_eq!(backend.calls(), 2);
}

#[tokio::test]
async fn test_predicate_can_veto_retry() {
    let backend = common::start_fixed(503).await;
    let options = RetryOptions::new().should_retry(|r| r.status() != StatusCode::SERVICE_UNAVAILABLE);

    let response = client().get(&backend.url("/"), &options).await.unwrap();

    assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(backend.calls(), 1);
}

#[tokio::test]
async fn test_typed_view_classifies_statuses() {
    let client = client();

    let backend = common::start_fixed(404).await;
    let request = client.http().get(backend.url("/missing")).build().unwrap();
    let err = client.fetch_typed(request, &RetryOptions::new()).await.unwrap_err();
    assert!(matches!(err, ClientError::Fetch(FetchError::Http { status: 404, .. })));

    let backend = common::start_backend(|_| MockResponse::status(502).body("bad gateway")).await;
    let request = client.http().get(backend.url("/")).build().unwrap();
    let err = client.fetch_typed(request, &RetryOptions::new()).await.unwrap_err();
    match err {
        ClientError::Fetch(e) => assert_eq!(
            e,
            FetchError::Server {
                status: 502,
                message: "bad gateway".into()
            }
        ),
        other => panic!("unexpected error: {other:?}"),
    }

    let backend = common::start_backend(|_| MockResponse::status(429).header("retry-after", "0")).await;
    let request = client.http().get(backend.url("/")).build().unwrap();
    let err = client.fetch_typed(request, &RetryOptions::new()).await.unwrap_err();
    assert!(matches!(
        err,
        ClientError::Fetch(FetchError::RateLimited {
            retry_after_ms: Some(0)
        })
    ));
}

#[tokio::test]
async fn test_post_json_forwards_body() {
    let backend = common::start_sequence(vec![MockResponse::status(500), MockResponse::status(201)]).await;

    let response = client()
        .post_json(&backend.url("/hook"), &serde_json::json!({"k": "v"}), &RetryOptions::new())
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::CREATED);
    assert_eq!(backend.bodies(), vec![r#"{"k":"v"}"#.to_string(); 2]);
}

#[tokio::test]
async fn test_cancellation_aborts_backoff() {
    let backend = common::start_fixed(503).await;
    let token = CancellationToken::new();
    let options = RetryOptions::new()
        .initial_delay_ms(10_000)
        .cancellation(token.clone());

    let canceller = tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(100)).await;
        token.cancel();
    });

    let start = Instant::now();
    let err = client().get(&backend.url("/"), &options).await.unwrap_err();
    canceller.await.unwrap();

    assert!(matches!(err, ClientError::Cancelled));
    assert!(start.elapsed() < Duration::from_secs(5));
    assert_eq!(backend.calls(), 1);
}
