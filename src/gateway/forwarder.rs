// ============================================================================
// Forwarder - Upstream HTTP Exchange
// ============================================================================
//
// Forwards one inbound request to a registered service and relays the
// answer. Handles:
// - Target URL construction (base URL + remaining path + raw query)
// - Request header hygiene (credentials, host and framing never leave)
// - Response header hygiene (encoding/framing recomputed locally)
// - Transport failures (connect, DNS, timeout, body read) as 502
//
// Exactly one upstream call per request: no retries, redirects are relayed
// to the caller instead of being followed.
//
// ============================================================================

use anyhow::{Context, Result};
use axum::body::Body;
use axum::http::{header, HeaderMap, HeaderName, HeaderValue, Method, Response, StatusCode};
use bytes::Bytes;
use std::error::Error as _;
use std::time::{Duration, Instant};

/// Request headers that never reach the upstream
const EXCLUDED_REQUEST_HEADERS: &[&str] = &[
    "x-api-key",
    "host",
    "cookie",
    // framing is recomputed by the HTTP client
    "content-length",
    "transfer-encoding",
];

/// Response headers that are not relayed back to the caller
const EXCLUDED_RESPONSE_HEADERS: &[&str] = &[
    "content-encoding",
    "content-length",
    "transfer-encoding",
    "connection",
];

const DEFAULT_CONTENT_TYPE: &str = "application/octet-stream";

/// Joins the service base URL, the remaining path and the raw query string
pub fn build_upstream_url(base_url: &str, path: &str, query: Option<&str>) -> String {
    let mut url = format!("{}/{}", base_url.trim_end_matches('/'), path);
    if let Some(query) = query.filter(|q| !q.is_empty()) {
        url.push('?');
        url.push_str(query);
    }
    url
}

fn is_excluded(name: &HeaderName, excluded: &[&str]) -> bool {
    // HeaderName is always stored lower-case
    excluded.contains(&name.as_str())
}

/// Inbound headers minus the excluded set, duplicates and order preserved
pub fn forwardable_request_headers(headers: &HeaderMap) -> Vec<(HeaderName, HeaderValue)> {
    headers
        .iter()
        .filter(|(name, _)| !is_excluded(name, EXCLUDED_REQUEST_HEADERS))
        .map(|(name, value)| (name.clone(), value.clone()))
        .collect()
}

/// Upstream response headers minus encoding and framing headers
pub fn forwardable_response_headers(headers: &HeaderMap) -> Vec<(HeaderName, HeaderValue)> {
    headers
        .iter()
        .filter(|(name, _)| !is_excluded(name, EXCLUDED_RESPONSE_HEADERS))
        .map(|(name, value)| (name.clone(), value.clone()))
        .collect()
}

/// What is sent upstream
pub struct UpstreamRequest {
    pub method: Method,
    pub url: String,
    pub headers: Vec<(HeaderName, HeaderValue)>,
    pub body: Bytes,
}

/// Upstream answered (with any status)
#[derive(Debug)]
pub struct ForwardOutcome {
    pub status: StatusCode,
    pub headers: Vec<(HeaderName, HeaderValue)>,
    pub body: Bytes,
    pub elapsed: Duration,
}

impl ForwardOutcome {
    pub fn into_response(self) -> Response<Body> {
        let mut response = Response::new(Body::from(self.body));
        *response.status_mut() = self.status;

        let headers = response.headers_mut();
        for (name, value) in self.headers {
            headers.append(name, value);
        }
        if !headers.contains_key(header::CONTENT_TYPE) {
            headers.insert(
                header::CONTENT_TYPE,
                HeaderValue::from_static(DEFAULT_CONTENT_TYPE),
            );
        }

        response
    }
}

/// Upstream could not be reached or its body could not be read
#[derive(Debug)]
pub struct ForwardFailure {
    pub description: String,
    pub elapsed: Duration,
}

/// HTTP client for forwarding requests to registered services
#[derive(Clone)]
pub struct Forwarder {
    client: reqwest::Client,
}

impl Forwarder {
    pub fn new(timeout_secs: u64) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .redirect(reqwest::redirect::Policy::none())
            .tcp_keepalive(Duration::from_secs(30))
            .pool_max_idle_per_host(10)
            .pool_idle_timeout(Duration::from_secs(90))
            .build()
            .context("Failed to create HTTP client")?;

        Ok(Self { client })
    }

    /// Performs the single upstream call
    pub async fn forward(
        &self,
        request: UpstreamRequest,
    ) -> Result<ForwardOutcome, ForwardFailure> {
        let mut builder = self.client.request(request.method, &request.url);
        for (name, value) in request.headers {
            builder = builder.header(name, value);
        }
        if !request.body.is_empty() {
            builder = builder.body(request.body);
        }

        let started = Instant::now();
        let result = match builder.send().await {
            Ok(response) => {
                let status = response.status();
                let headers = forwardable_response_headers(response.headers());
                response.bytes().await.map(|body| (status, headers, body))
            }
            Err(e) => Err(e),
        };
        let elapsed = started.elapsed();

        match result {
            Ok((status, headers, body)) => Ok(ForwardOutcome {
                status,
                headers,
                body,
                elapsed,
            }),
            Err(e) => Err(ForwardFailure {
                description: describe(&e),
                elapsed,
            }),
        }
    }
}

/// Human-readable transport error, including its source chain
fn describe(error: &reqwest::Error) -> String {
    let mut description = error.to_string();
    let mut source = error.source();
    while let Some(cause) = source {
        description.push_str(": ");
        description.push_str(&cause.to_string());
        source = cause.source();
    }
    description
}
