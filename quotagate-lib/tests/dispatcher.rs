use http::StatusCode;
use pretty_assertions::assert_eq;
use quotagate_lib::ratelimit::RateLimitConfig;
use quotagate_lib::{Client, ClientBuilder, Context, ErrorKind, RetryBudget};
use std::time::{Duration, Instant};
use test_utils::{advertised_limits, mock_server, rate_limited};
use url::Url;
use wiremock::matchers::method;
use wiremock::{Mock, MockServer, ResponseTemplate};

fn client(max_retries: RetryBudget) -> Client {
    ClientBuilder::builder()
        .max_retries(max_retries)
        .rate_limit(RateLimitConfig {
            cooldown: Duration::from_millis(50),
            fallback_release: Duration::from_millis(50),
            default_retry_after: Duration::from_millis(50),
            ..RateLimitConfig::default()
        })
        .build()
        .client()
        .unwrap()
}

fn url(server: &MockServer) -> Url {
    server.uri().parse().unwrap()
}

#[tokio::test]
async fn test_not_found_is_delivered_on_first_attempt() {
    let server = mock_server!(StatusCode::NOT_FOUND);
    let client = client(RetryBudget::Unlimited);

    let err = client
        .get(Context::new(), 0, "na1", "summoner-v4.getByName", url(&server))
        .await
        .unwrap_err();

    assert_eq!(err.status(), Some(StatusCode::NOT_FOUND));
    assert_eq!(server.received_requests().await.unwrap().len(), 1);
}

#[tokio::test]
async fn test_unlimited_retries_outlast_rate_limiting() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(rate_limited!("0"))
        .up_to_n_times(5)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200).set_body_string("done"))
        .mount(&server)
        .await;
    let client = client(RetryBudget::Unlimited);

    let exchange = client
        .get(Context::new(), 0, "euw1", "match-v5.getMatch", url(&server))
        .await
        .unwrap();

    assert_eq!(exchange.body, "done");
    assert_eq!(server.received_requests().await.unwrap().len(), 6);
    assert_eq!(client.scope_stats().get("euw1").unwrap().rate_limited, 5);
}

#[tokio::test]
async fn test_application_block_delays_the_next_request() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(rate_limited!("2", "application"))
        .up_to_n_times(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200))
        .mount(&server)
        .await;
    let client = client(RetryBudget::Limited(0));

    let start = Instant::now();
    let err = client
        .get(Context::new(), 0, "kr", "league-v4.getLeagueEntries", url(&server))
        .await
        .unwrap_err();
    assert!(matches!(err, ErrorKind::RateLimitExceeded(_)));

    // A different method in the same region is blocked as well
    let exchange = client
        .get(Context::new(), 0, "kr", "summoner-v4.getByPuuid", url(&server))
        .await
        .unwrap();
    let elapsed = start.elapsed();

    assert_eq!(exchange.status, StatusCode::OK);
    assert!(elapsed >= Duration::from_secs(2), "{elapsed:?}");
    assert!(elapsed < Duration::from_secs(3), "{elapsed:?}");
}

#[tokio::test]
async fn test_method_block_leaves_other_methods_alone() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(rate_limited!("5", "method"))
        .up_to_n_times(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200))
        .mount(&server)
        .await;
    let client = ClientBuilder::builder()
        .max_retries(RetryBudget::Limited(0))
        .rate_limit(RateLimitConfig {
            initial_capacity: 10,
            ..RateLimitConfig::default()
        })
        .build()
        .client()
        .unwrap();

    let start = Instant::now();
    client
        .get(Context::new(), 0, "br1", "match-v5.getMatch", url(&server))
        .await
        .unwrap_err();
    client
        .get(Context::new(), 0, "br1", "match-v5.getTimeline", url(&server))
        .await
        .unwrap();

    assert!(start.elapsed() < Duration::from_secs(1));
}

#[tokio::test]
async fn test_deadline_cancels_a_slow_exchange() {
    let server = mock_server!(StatusCode::OK, set_delay(Duration::from_secs(5)));
    let client = client(RetryBudget::default());

    let start = Instant::now();
    let err = client
        .get(
            Context::with_timeout(Duration::from_millis(100)),
            0,
            "na1",
            "status-v4.getPlatformData",
            url(&server),
        )
        .await
        .unwrap_err();

    assert_eq!(err, ErrorKind::Cancelled);
    assert!(start.elapsed() < Duration::from_secs(2));
}

#[tokio::test]
async fn test_retry_budget_changes_at_runtime() {
    let server = mock_server!(StatusCode::SERVICE_UNAVAILABLE);
    let client = client(RetryBudget::Unlimited);
    client.settings().set_max_retries(RetryBudget::Limited(0));

    let err = client
        .get(Context::new(), 0, "oc1", "match-v5.getMatch", url(&server))
        .await
        .unwrap_err();

    assert_eq!(err.status(), Some(StatusCode::SERVICE_UNAVAILABLE));
    assert_eq!(server.received_requests().await.unwrap().len(), 1);
}

#[tokio::test]
async fn test_advertised_limits_admit_concurrent_requests() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(advertised_limits!(
            "100:1,1000:120",
            "1:1,1:120",
            "100:10",
            "1:10"
        ))
        .mount(&server)
        .await;
    let client = ClientBuilder::builder()
        .rate_limit(RateLimitConfig {
            fallback_release: Duration::from_secs(30),
            ..RateLimitConfig::default()
        })
        .build()
        .client()
        .unwrap();

    // The first response lifts the initial capacity of one
    client
        .get(Context::new(), 0, "jp1", "champion-v3.getRotations", url(&server))
        .await
        .unwrap();

    let start = Instant::now();
    let requests = (0..5).map(|priority| {
        client.get(
            Context::new(),
            priority,
            "jp1",
            "champion-v3.getRotations",
            url(&server),
        )
    });
    for result in futures::future::join_all(requests).await {
        result.unwrap();
    }
    assert!(start.elapsed() < Duration::from_secs(1));
}
