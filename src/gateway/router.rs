// ============================================================================
// Gateway Router
// ============================================================================
//
// Routes:
// - ANY /proxy/:service_slug/        → proxy (empty remaining path)
// - ANY /proxy/:service_slug/*path   → proxy
// - GET /health, /health/ready       → store + cache ping
// - GET /health/live                 → process is up
// - GET /metrics                     → Prometheus text format
//
// Only the proxy routes carry the auth and rate limiting middleware.
//
// ============================================================================

use axum::{
    body::Body,
    extract::{Path, Request, State},
    http::StatusCode,
    middleware::from_fn_with_state,
    response::{IntoResponse, Response},
    routing::{any, get},
    Router,
};
use std::collections::HashMap;
use std::sync::Arc;
use tower_http::trace::TraceLayer;

use crate::audit::{self, Exchange};
use crate::auth::{AuthGate, Principal};
use crate::cache::RateCache;
use crate::config::{Config, ProxyConfig, RateLimitConfig};
use crate::error::AppError;
use crate::gateway::discovery::resolve_service;
use crate::gateway::forwarder::{
    build_upstream_url, forwardable_request_headers, Forwarder, UpstreamRequest,
};
use crate::gateway::middleware::{api_key_auth, rate_limiting};
use crate::health;
use crate::metrics;
use crate::rate_limit::RateLimiter;
use crate::storage::{AuditSink, CredentialStore, ServiceRegistry};
use crate::utils::elapsed_ms;

/// Tunables the gateway needs at runtime
#[derive(Clone, Debug)]
pub struct GatewaySettings {
    pub rate_limit: RateLimitConfig,
    pub proxy: ProxyConfig,
    pub hash_salt: String,
}

impl GatewaySettings {
    pub fn from_config(config: &Config) -> Self {
        Self {
            rate_limit: config.rate_limit.clone(),
            proxy: config.proxy.clone(),
            hash_salt: config.logging.hash_salt.clone(),
        }
    }
}

/// Gateway router state
pub struct GatewayState {
    pub auth: AuthGate,
    pub rate_limiter: RateLimiter,
    pub credentials: Arc<dyn CredentialStore>,
    pub services: Arc<dyn ServiceRegistry>,
    pub audit: Arc<dyn AuditSink>,
    pub cache: Arc<dyn RateCache>,
    pub forwarder: Forwarder,
    pub max_body_size: usize,
}

impl GatewayState {
    /// Wires one store (credentials, services, audit) and one cache into the pipeline
    pub fn new<S>(
        store: Arc<S>,
        cache: Arc<dyn RateCache>,
        settings: GatewaySettings,
    ) -> anyhow::Result<Arc<Self>>
    where
        S: CredentialStore + ServiceRegistry + AuditSink + 'static,
    {
        let forwarder = Forwarder::new(settings.proxy.upstream_timeout_secs)?;

        Ok(Arc::new(Self {
            auth: AuthGate::new(store.clone(), settings.hash_salt),
            rate_limiter: RateLimiter::new(cache.clone(), settings.rate_limit),
            credentials: store.clone(),
            services: store.clone(),
            audit: store,
            cache,
            forwarder,
            max_body_size: settings.proxy.max_request_body_size,
        }))
    }
}

/// Path after `/proxy/{slug}/`, still percent-encoded as received
fn remaining_path(uri_path: &str) -> &str {
    uri_path
        .strip_prefix("/proxy/")
        .and_then(|rest| rest.split_once('/'))
        .map(|(_, tail)| tail)
        .unwrap_or("")
}

/// ANY /proxy/:service_slug/*path
pub async fn proxy(
    State(state): State<Arc<GatewayState>>,
    Path(params): Path<HashMap<String, String>>,
    request: Request,
) -> Result<Response, AppError> {
    let slug = params
        .get("service_slug")
        .map(String::as_str)
        .unwrap_or_default();
    let service = resolve_service(state.services.as_ref(), slug).await?;

    let principal = request.extensions().get::<Principal>().cloned();
    let (parts, body) = request.into_parts();
    let path = remaining_path(parts.uri.path());
    let body = axum::body::to_bytes(body, state.max_body_size)
        .await
        .map_err(|e| AppError::InvalidRequestBody(e.to_string()))?;

    let upstream = UpstreamRequest {
        method: parts.method.clone(),
        url: build_upstream_url(&service.base_url, path, parts.uri.query()),
        headers: forwardable_request_headers(&parts.headers),
        body,
    };

    let (status, elapsed, response) = match state.forwarder.forward(upstream).await {
        Ok(outcome) => (outcome.status, outcome.elapsed, outcome.into_response()),
        Err(failure) => {
            tracing::warn!(
                service = %service.slug,
                error = %failure.description,
                "Upstream request failed"
            );
            metrics::UPSTREAM_FAILURES_TOTAL
                .with_label_values(&[service.slug.as_str()])
                .inc();
            let err = AppError::UpstreamUnreachable(failure.description);
            (err.status_code(), failure.elapsed, err.into_response())
        }
    };

    metrics::PROXIED_REQUESTS_TOTAL
        .with_label_values(&[service.slug.as_str(), status.as_str()])
        .inc();
    metrics::UPSTREAM_DURATION_SECONDS
        .with_label_values(&[service.slug.as_str()])
        .observe(elapsed.as_secs_f64());

    let audited_path = format!("/{}", path);
    audit::record_exchange(
        state.audit.as_ref(),
        Exchange {
            principal: principal.as_ref(),
            service: &service,
            method: parts.method.as_str(),
            path: &audited_path,
            status_code: status.as_u16(),
            duration_ms: elapsed_ms(elapsed),
        },
    )
    .await;

    Ok(response)
}

/// GET /health, /health/ready
pub async fn health_ready(State(state): State<Arc<GatewayState>>) -> impl IntoResponse {
    match health::health_check(state.credentials.as_ref(), state.cache.as_ref()).await {
        Ok(_) => (StatusCode::OK, "ok"),
        Err(e) => {
            tracing::error!("Health check failed: {}", e);
            (StatusCode::SERVICE_UNAVAILABLE, "unavailable")
        }
    }
}

/// GET /health/live
pub async fn health_live() -> impl IntoResponse {
    (StatusCode::OK, "ok")
}

/// GET /metrics
pub async fn metrics_handler() -> Response<Body> {
    match metrics::gather_metrics() {
        Ok(metrics_data) => (
            StatusCode::OK,
            [("Content-Type", "text/plain; version=0.0.4")],
            metrics_data,
        )
            .into_response(),
        Err(e) => {
            tracing::error!("Failed to gather metrics: {}", e);
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                [("Content-Type", "text/plain")],
                "Internal Server Error".to_string(),
            )
                .into_response()
        }
    }
}

/// Full gateway application
pub fn build_router(state: Arc<GatewayState>) -> Router {
    // route_layer: the last layer added runs first
    let proxy_routes = Router::new()
        .route("/proxy/:service_slug/", any(proxy))
        .route("/proxy/:service_slug/*path", any(proxy))
        .route_layer(from_fn_with_state(state.clone(), rate_limiting))
        .route_layer(from_fn_with_state(state.clone(), api_key_auth));

    Router::new()
        .route("/health", get(health_ready))
        .route("/health/ready", get(health_ready))
        .route("/health/live", get(health_live))
        .route("/metrics", get(metrics_handler))
        .merge(proxy_routes)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
