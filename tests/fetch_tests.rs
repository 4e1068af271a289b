//! Integration tests for the fetch orchestrator
//!
//! These tests use wiremock to stand in for remote servers and exercise the
//! full stack: header composition, pacing, the concurrency gate, retry
//! classification, and pipeline execution over HTTP.

use fetchloom::config::Config;
use fetchloom::pipeline::PipelineContext;
use fetchloom::{Crawler, ErrorKind, SelectorSpec};
use serde_json::{json, Value};
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;
use wiremock::matchers::{header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

/// A configuration tuned for fast tests: tiny deterministic backoff, a high
/// request rate, and a fixed user agent
fn test_config(max_retries: u32) -> Config {
    let mut config = Config::default();
    config.retry.max_retries = max_retries;
    config.retry.initial_delay_ms = 10;
    config.retry.max_delay_ms = 100;
    config.retry.jitter = 0.0;
    config.rate_limit.requests_per_second = 1000.0;
    config.rate_limit.concurrency = 4;
    config.headers.user_agents = vec!["FetchloomTest/1.0".to_string()];
    config
        .headers
        .default_headers
        .insert("accept".to_string(), "text/html".to_string());
    config
}

fn test_crawler(max_retries: u32) -> Crawler {
    Crawler::new(test_config(max_retries)).unwrap()
}

#[tokio::test]
async fn test_fetch_success_returns_body_and_headers() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/page"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_raw("<html><body><h1>Case A</h1></body></html>", "text/html"),
        )
        .mount(&server)
        .await;

    let crawler = test_crawler(3);
    let response = crawler.fetch(&format!("{}/page", server.uri())).await.unwrap();

    assert!(response.ok());
    assert_eq!(response.status, 200);
    assert!(response.body.contains("Case A"));
    assert_eq!(response.header("content-type"), Some("text/html"));
}

#[tokio::test]
async fn test_default_headers_and_user_agent_are_sent() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/page"))
        .and(header("accept", "text/html"))
        .and(header("user-agent", "FetchloomTest/1.0"))
        .respond_with(ResponseTemplate::new(200).set_body_string("ok"))
        .expect(1)
        .mount(&server)
        .await;

    let crawler = test_crawler(3);
    let response = crawler.fetch(&format!("{}/page", server.uri())).await.unwrap();
    assert!(response.ok());
}

#[tokio::test]
async fn test_per_call_headers_override_domain_headers() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/page"))
        .and(header("accept", "application/json"))
        .respond_with(ResponseTemplate::new(200).set_body_string("{}"))
        .expect(1)
        .mount(&server)
        .await;

    let crawler = test_crawler(3);
    let mut options = fetchloom::FetchOptions::default();
    options
        .headers
        .insert("accept".to_string(), "application/json".to_string());

    let response = crawler
        .fetch_with(&format!("{}/page", server.uri()), &options)
        .await
        .unwrap();
    assert!(response.ok());
}

#[tokio::test]
async fn test_transient_server_error_is_retried() {
    let server = MockServer::start().await;

    // First request fails, the retry succeeds
    Mock::given(method("GET"))
        .and(path("/flaky"))
        .respond_with(ResponseTemplate::new(500))
        .up_to_n_times(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/flaky"))
        .respond_with(ResponseTemplate::new(200).set_body_string("recovered"))
        .mount(&server)
        .await;

    let crawler = test_crawler(3);
    let url = format!("{}/flaky", server.uri());
    let response = crawler.fetch(&url).await.unwrap();

    assert_eq!(response.body, "recovered");
    // History is cleared once the key succeeds
    assert!(crawler.retries().history(&url).is_empty());
}

#[tokio::test]
async fn test_exhaustion_surfaces_last_network_error() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/down"))
        .respond_with(ResponseTemplate::new(500))
        .expect(2)
        .mount(&server)
        .await;

    let crawler = test_crawler(2);
    let url = format!("{}/down", server.uri());
    let err = crawler.fetch(&url).await.unwrap_err();

    // The last classified error comes back unchanged
    assert_eq!(err.kind, ErrorKind::Network);
    assert_eq!(err.status_code, Some(500));
    assert_eq!(crawler.retries().history(&url).len(), 1);
}

#[tokio::test]
async fn test_429_surfaces_rate_limit_with_retry_after() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/limited"))
        .respond_with(ResponseTemplate::new(429).insert_header("retry-after", "5"))
        .mount(&server)
        .await;

    // max_retries = 1 so the classified error surfaces directly
    let crawler = test_crawler(1);
    let err = crawler
        .fetch(&format!("{}/limited", server.uri()))
        .await
        .unwrap_err();

    assert_eq!(err.kind, ErrorKind::RateLimit);
    assert!(err.retryable);
    assert_eq!(err.status_code, Some(429));
    assert_eq!(err.retry_after, Some(5));
    assert_eq!(err.metadata["retry-after"], json!(5));
}

#[tokio::test]
async fn test_429_with_zero_retry_after_recovers_on_retry() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/briefly-limited"))
        .respond_with(ResponseTemplate::new(429).insert_header("retry-after", "0"))
        .up_to_n_times(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/briefly-limited"))
        .respond_with(ResponseTemplate::new(200).set_body_string("welcome back"))
        .mount(&server)
        .await;

    let crawler = test_crawler(3);
    let response = crawler
        .fetch(&format!("{}/briefly-limited", server.uri()))
        .await
        .unwrap();
    assert_eq!(response.body, "welcome back");
}

#[tokio::test]
async fn test_pacing_wait_does_not_hold_a_gate_slot() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/page"))
        .respond_with(ResponseTemplate::new(200).set_body_string("ok"))
        .mount(&server)
        .await;

    let mut config = test_config(3);
    config.rate_limit.concurrency = 1;
    let crawler = Arc::new(Crawler::new(config).unwrap());

    // Hold the only slot; a fetch must still clear its pacing wait
    let slot = crawler.gate().acquire().await.unwrap();

    let handle = {
        let crawler = crawler.clone();
        let url = format!("{}/page", server.uri());
        tokio::spawn(async move { crawler.fetch(&url).await })
    };

    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(crawler.pacer().request_count(), 1);

    drop(slot);
    assert!(handle.await.unwrap().is_ok());
}

#[tokio::test]
async fn test_headers_recomposed_per_retry_attempt() {
    let server = MockServer::start().await;

    // The first attempt goes out under the first agent and fails
    Mock::given(method("GET"))
        .and(path("/flaky"))
        .and(header("user-agent", "AgentA/1.0"))
        .respond_with(ResponseTemplate::new(500))
        .expect(1)
        .mount(&server)
        .await;
    // The retry re-composes headers, advancing the rotation
    Mock::given(method("GET"))
        .and(path("/flaky"))
        .and(header("user-agent", "AgentB/1.0"))
        .respond_with(ResponseTemplate::new(200).set_body_string("second agent"))
        .expect(1)
        .mount(&server)
        .await;

    let mut config = test_config(2);
    config.headers.user_agents =
        vec!["AgentA/1.0".to_string(), "AgentB/1.0".to_string()];
    let crawler = Crawler::new(config).unwrap();

    let response = crawler
        .fetch(&format!("{}/flaky", server.uri()))
        .await
        .unwrap();
    assert_eq!(response.body, "second agent");
}

#[tokio::test]
async fn test_404_is_classified_as_network_with_status() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/gone"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&server)
        .await;

    let crawler = test_crawler(1);
    let err = crawler
        .fetch(&format!("{}/gone", server.uri()))
        .await
        .unwrap_err();

    assert_eq!(err.kind, ErrorKind::Network);
    assert_eq!(err.status_code, Some(404));
}

#[tokio::test]
async fn test_connection_refused_is_retryable_network_error() {
    // Bind-then-drop leaves a port with nothing listening
    let server = MockServer::start().await;
    let url = format!("{}/nobody-home", server.uri());
    drop(server);

    let crawler = test_crawler(1);
    let err = crawler.fetch(&url).await.unwrap_err();

    assert_eq!(err.kind, ErrorKind::Network);
    assert!(err.retryable);
}

#[tokio::test]
async fn test_pipeline_fetches_and_extracts_over_http() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/cases/1"))
        .respond_with(ResponseTemplate::new(200).set_body_string(
            "<html><head><title>Case A</title></head>\
             <body><h1>Case A</h1><span class=\"ref\">R-1</span></body></html>",
        ))
        .mount(&server)
        .await;

    let crawler = Arc::new(test_crawler(3));

    crawler.use_middleware(|_crawler, ctx| async move {
        Ok(Some(ctx.with("source", json!("integration-test"))))
    });

    crawler.add_pipeline("scrape-case", |crawler, ctx| async move {
        let url = ctx.get("url").and_then(Value::as_str).unwrap().to_string();
        let response = crawler.fetch(&url).await?;

        let mut selectors: BTreeMap<String, SelectorSpec> = BTreeMap::new();
        selectors.insert("title".to_string(), SelectorSpec::css("h1"));
        selectors.insert("reference".to_string(), SelectorSpec::css(".ref"));
        selectors.insert("missing".to_string(), SelectorSpec::css(".nope"));

        let document = crawler.parse(&response.body)?;
        let fields = crawler.extract(&document, &selectors);
        drop(document);

        Ok(json!({
            "source": ctx.get("source").cloned().unwrap_or(Value::Null),
            "fields": fields,
        }))
    });

    let context = PipelineContext::new().with("url", json!(format!("{}/cases/1", server.uri())));
    let result = crawler.execute_pipeline("scrape-case", context).await.unwrap();

    assert_eq!(result["source"], json!("integration-test"));
    assert_eq!(result["fields"]["title"], json!("Case A"));
    assert_eq!(result["fields"]["reference"], json!("R-1"));
    assert_eq!(result["fields"]["missing"], Value::Null);
}

#[tokio::test]
async fn test_pipeline_fetch_failure_is_wrapped_with_cause() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/gone"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&server)
        .await;

    let crawler = Arc::new(test_crawler(1));
    crawler.add_pipeline("scrape-case", |crawler, ctx| async move {
        let url = ctx.get("url").and_then(Value::as_str).unwrap().to_string();
        let response = crawler.fetch(&url).await?;
        Ok(json!(response.status))
    });

    let context = PipelineContext::new().with("url", json!(format!("{}/gone", server.uri())));
    let err = crawler
        .execute_pipeline("scrape-case", context)
        .await
        .unwrap_err();

    assert_eq!(err.kind, ErrorKind::Pipeline);
    assert_eq!(err.metadata["pipeline"], json!("scrape-case"));
    assert_eq!(err.metadata["original-error"]["kind"], json!("network"));
}

#[tokio::test]
async fn test_user_agents_rotate_across_requests_to_one_domain() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(header("user-agent", "AgentA/1.0"))
        .respond_with(ResponseTemplate::new(200).set_body_string("a"))
        .expect(2)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(header("user-agent", "AgentB/1.0"))
        .respond_with(ResponseTemplate::new(200).set_body_string("b"))
        .expect(1)
        .mount(&server)
        .await;

    let mut config = test_config(3);
    config.headers.user_agents =
        vec!["AgentA/1.0".to_string(), "AgentB/1.0".to_string()];
    let crawler = Crawler::new(config).unwrap();

    let url = format!("{}/page", server.uri());
    // Round-robin: A, B, A
    assert_eq!(crawler.fetch(&url).await.unwrap().body, "a");
    assert_eq!(crawler.fetch(&url).await.unwrap().body, "b");
    assert_eq!(crawler.fetch(&url).await.unwrap().body, "a");
}
