//! HTTP client construction and response classification

use crate::config::HttpConfig;
use crate::error::{CrawlError, ErrorKind};
use crate::Result;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use reqwest::{Client, StatusCode};
use std::collections::BTreeMap;
use std::time::Duration;

/// Per-call fetch options
#[derive(Debug, Clone, Default)]
pub struct FetchOptions {
    /// Extra headers for this call, overriding the composed domain headers
    pub headers: BTreeMap<String, String>,
}

/// A successful fetch
#[derive(Debug, Clone)]
pub struct FetchResponse {
    /// Final URL after redirects
    pub url: String,
    /// HTTP status code
    pub status: u16,
    /// Response headers (values that are not valid UTF-8 are skipped)
    pub headers: BTreeMap<String, String>,
    /// Response body
    pub body: String,
}

impl FetchResponse {
    pub fn ok(&self) -> bool {
        (200..300).contains(&self.status)
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(&name.to_ascii_lowercase()).map(String::as_str)
    }
}

/// Builds the HTTP client shared by all fetches of one crawler
pub fn build_http_client(config: &HttpConfig) -> std::result::Result<Client, reqwest::Error> {
    Client::builder()
        .timeout(Duration::from_secs(config.request_timeout_secs))
        .connect_timeout(Duration::from_secs(10))
        .gzip(true)
        .brotli(true)
        .build()
}

/// Converts composed string headers into a reqwest header map
pub(crate) fn build_header_map(headers: &BTreeMap<String, String>) -> Result<HeaderMap> {
    let mut map = HeaderMap::new();
    for (name, value) in headers {
        let name = HeaderName::from_bytes(name.as_bytes()).map_err(|e| {
            CrawlError::new(
                ErrorKind::Validation,
                format!("invalid header name '{}': {}", name, e),
            )
        })?;
        let value = HeaderValue::from_str(value).map_err(|e| {
            CrawlError::new(
                ErrorKind::Validation,
                format!("invalid value for header '{}': {}", name, e),
            )
        })?;
        map.insert(name, value);
    }
    Ok(map)
}

/// Collects response headers into lowercase string pairs
pub(crate) fn collect_headers(headers: &HeaderMap) -> BTreeMap<String, String> {
    headers
        .iter()
        .filter_map(|(name, value)| {
            value
                .to_str()
                .ok()
                .map(|v| (name.as_str().to_ascii_lowercase(), v.to_string()))
        })
        .collect()
}

/// Classifies a non-success HTTP status.
///
/// 429 becomes a RateLimit error carrying the server's retry-after hint when
/// one is present; everything else is a Network error carrying the status.
pub(crate) fn classify_status(
    url: &str,
    domain: &str,
    status: StatusCode,
    headers: &HeaderMap,
) -> CrawlError {
    if status == StatusCode::TOO_MANY_REQUESTS {
        let retry_after = headers
            .get("retry-after")
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.trim().parse::<u64>().ok());

        let mut err = CrawlError::new(
            ErrorKind::RateLimit,
            format!("rate limited by {}", domain),
        )
        .with_url(url)
        .with_status(429)
        .with_metadata("domain", serde_json::json!(domain));

        if let Some(seconds) = retry_after {
            err = err
                .with_retry_after(seconds)
                .with_metadata("retry-after", serde_json::json!(seconds));
        }
        err
    } else {
        CrawlError::new(
            ErrorKind::Network,
            format!("HTTP {} from {}", status.as_u16(), url),
        )
        .with_url(url)
        .with_status(status.as_u16())
    }
}
