//! Fetch orchestration
//!
//! [`Crawler`] is the composition root: it owns the HTTP client, the
//! concurrency gate, the rate pacer, per-domain header state, the retry
//! coordinator, and the pipeline registry, and exposes the externally
//! callable `fetch` / `parse` / `extract` / `execute_pipeline` surface.
//!
//! A fetch resolves the URL's domain, then runs the retryable unit keyed by
//! the URL: compose that domain's headers, wait for the pacer, acquire a
//! gate slot, perform the request, classify any failure. Retries for the
//! same URL serialize; different URLs interleave freely.

mod extract;
mod fetcher;

pub use extract::{extract, Document, Element, SelectorSpec};
pub use fetcher::{build_http_client, FetchOptions, FetchResponse};

use crate::config::Config;
use crate::error::{CrawlError, ErrorKind};
use crate::limits::{Gate, Pacer};
use crate::pipeline::{PipelineContext, PipelineRegistry};
use crate::retry::{RetryCoordinator, RetryPolicy};
use crate::state::HeaderStore;
use crate::Result;
use fetcher::{build_header_map, classify_status, collect_headers};
use reqwest::Client;
use serde_json::Value;
use std::collections::BTreeMap;
use std::future::Future;
use std::sync::Arc;
use url::Url;

/// The fetch orchestrator
pub struct Crawler {
    config: Config,
    client: Client,
    gate: Gate,
    pacer: Pacer,
    headers: HeaderStore,
    retries: RetryCoordinator,
    registry: PipelineRegistry,
}

impl Crawler {
    /// Builds a crawler from an already validated configuration
    pub fn new(config: Config) -> Result<Self> {
        let client = build_http_client(&config.http).map_err(|e| {
            CrawlError::new(
                ErrorKind::Generic,
                format!("failed to build http client: {}", e),
            )
            .with_source(e)
        })?;

        Ok(Self {
            client,
            gate: Gate::new(config.rate_limit.concurrency),
            pacer: Pacer::new(config.rate_limit.requests_per_second),
            headers: HeaderStore::new(&config.headers),
            retries: RetryCoordinator::new(RetryPolicy::from_config(&config.retry)),
            registry: PipelineRegistry::new(),
            config,
        })
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn gate(&self) -> &Gate {
        &self.gate
    }

    pub fn pacer(&self) -> &Pacer {
        &self.pacer
    }

    pub fn headers(&self) -> &HeaderStore {
        &self.headers
    }

    pub fn retries(&self) -> &RetryCoordinator {
        &self.retries
    }

    /// Fetches a URL with the default options
    pub async fn fetch(&self, url: &str) -> Result<FetchResponse> {
        self.fetch_with(url, &FetchOptions::default()).await
    }

    /// Fetches a URL, retrying transient failures under the configured
    /// policy. Retries are keyed by the URL itself.
    pub async fn fetch_with(&self, url: &str, options: &FetchOptions) -> Result<FetchResponse> {
        let domain = extract_domain(url)?;

        self.retries
            .with_retries(url, || self.attempt_fetch(url, &domain, options))
            .await
    }

    /// One fetch attempt: compose headers, pace, take a slot, request
    async fn attempt_fetch(
        &self,
        url: &str,
        domain: &str,
        options: &FetchOptions,
    ) -> Result<FetchResponse> {
        let mut headers = self.headers.headers_for(domain).await;
        headers.extend(options.headers.clone());
        let header_map = build_header_map(&headers)?;

        // Pace first so the wait is never spent holding a gate slot
        self.pacer.pace().await;
        let _slot = self.gate.acquire().await?;

        tracing::debug!(url, domain, "sending request");
        let response = self
            .client
            .get(url)
            .headers(header_map)
            .send()
            .await
            .map_err(|e| CrawlError::from_transport(url, e))?;

        let status = response.status();
        if !status.is_success() {
            let err = classify_status(url, domain, status, response.headers());
            tracing::warn!(url, status = status.as_u16(), "request failed");
            return Err(err);
        }

        let final_url = response.url().to_string();
        let response_headers = collect_headers(response.headers());
        let body = response
            .text()
            .await
            .map_err(|e| CrawlError::from_transport(url, e))?;

        tracing::info!(url, status = status.as_u16(), bytes = body.len(), "fetched");

        Ok(FetchResponse {
            url: final_url,
            status: status.as_u16(),
            headers: response_headers,
            body,
        })
    }

    /// Parses markup into a queryable document
    pub fn parse(&self, markup: &str) -> Result<Document> {
        Document::parse(markup)
    }

    /// Applies named selectors to a document with partial-failure tolerance
    pub fn extract(&self, document: &Document, selectors: &BTreeMap<String, SelectorSpec>) -> Value {
        extract(document, selectors)
    }

    /// Registers a named pipeline
    pub fn add_pipeline<F, Fut>(&self, name: impl Into<String>, pipeline: F)
    where
        F: Fn(Arc<Crawler>, PipelineContext) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Value>> + Send + 'static,
    {
        self.registry.add_pipeline(name, pipeline);
    }

    /// Appends a middleware to the chain
    pub fn use_middleware<F, Fut>(&self, middleware: F)
    where
        F: Fn(Arc<Crawler>, PipelineContext) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Option<PipelineContext>>> + Send + 'static,
    {
        self.registry.use_middleware(middleware);
    }

    /// Runs the middleware chain and the named pipeline, handing each stage
    /// this crawler as its back-reference
    pub async fn execute_pipeline(
        self: &Arc<Self>,
        name: &str,
        initial: PipelineContext,
    ) -> Result<Value> {
        self.registry.execute(Arc::clone(self), name, initial).await
    }

    /// Clears per-domain header state, retry history, and the pacer stamp.
    /// Registered pipelines and middleware survive a reset.
    pub async fn reset(&self) {
        self.headers.reset();
        self.retries.reset();
        self.pacer.reset().await;
    }
}

/// Extracts the host component used to key per-domain state
pub fn extract_domain(url: &str) -> Result<String> {
    let parsed = Url::parse(url).map_err(|e| {
        CrawlError::new(ErrorKind::Validation, format!("invalid url '{}': {}", url, e))
            .with_url(url)
    })?;

    parsed
        .host_str()
        .map(str::to_string)
        .ok_or_else(|| {
            CrawlError::new(
                ErrorKind::Validation,
                format!("url '{}' has no host", url),
            )
            .with_url(url)
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_extract_domain() {
        assert_eq!(
            extract_domain("https://example.com/cases/1").unwrap(),
            "example.com"
        );
        assert_eq!(
            extract_domain("http://127.0.0.1:8080/x").unwrap(),
            "127.0.0.1"
        );
    }

    #[test]
    fn test_extract_domain_rejects_invalid_urls() {
        let err = extract_domain("not a url").unwrap_err();
        assert_eq!(err.kind, ErrorKind::Validation);

        let err = extract_domain("mailto:someone@example.com").unwrap_err();
        assert_eq!(err.kind, ErrorKind::Validation);
    }

    #[tokio::test]
    async fn test_fetch_rejects_invalid_url_without_retrying() {
        let crawler = Crawler::new(Config::default()).unwrap();
        let err = crawler.fetch("::not-a-url::").await.unwrap_err();
        assert_eq!(err.kind, ErrorKind::Validation);
        // No attempt was ever made
        assert_eq!(crawler.pacer().request_count(), 0);
    }

    #[tokio::test]
    async fn test_pipeline_round_trip_through_crawler() {
        let crawler = Arc::new(Crawler::new(Config::default()).unwrap());
        crawler.add_pipeline("echo", |_crawler, ctx| async move {
            Ok(ctx.get("value").cloned().unwrap_or(Value::Null))
        });

        let result = crawler
            .execute_pipeline("echo", PipelineContext::new().with("value", json!("hi")))
            .await
            .unwrap();
        assert_eq!(result, json!("hi"));
    }

    #[tokio::test]
    async fn test_reset_clears_runtime_state_but_keeps_pipelines() {
        let crawler = Arc::new(Crawler::new(Config::default()).unwrap());
        crawler.add_pipeline("noop", |_crawler, _ctx| async move { Ok(Value::Null) });

        crawler.headers().headers_for("example.com").await;
        assert_eq!(crawler.headers().domain_count(), 1);

        crawler.reset().await;
        assert_eq!(crawler.headers().domain_count(), 0);
        assert_eq!(crawler.pacer().request_count(), 0);

        // Pipelines survive
        let result = crawler
            .execute_pipeline("noop", PipelineContext::new())
            .await;
        assert!(result.is_ok());
    }
}
