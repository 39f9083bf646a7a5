// ============================================================================
// Gateway Middleware
// ============================================================================
//
// Applied to the proxy routes only, in this order:
// - api_key_auth: X-API-KEY → Principal (request extension)
// - rate_limiting: per-Principal fixed window
//
// Both short-circuit with an AppError response; neither touches the
// upstream or the audit trail.
//
// ============================================================================

use axum::{
    extract::{Request, State},
    middleware::Next,
    response::Response,
};
use std::sync::Arc;

use crate::auth::{Principal, API_KEY_HEADER};
use crate::error::AppError;
use crate::gateway::router::GatewayState;

/// Authenticates the caller and publishes the Principal for later stages
pub async fn api_key_auth(
    State(state): State<Arc<GatewayState>>,
    mut req: Request,
    next: Next,
) -> Result<Response, AppError> {
    // Non-UTF-8 bytes cannot match a stored key; keep them non-empty
    let raw = req
        .headers()
        .get(API_KEY_HEADER)
        .map(|value| String::from_utf8_lossy(value.as_bytes()).into_owned());

    let principal = state.auth.authenticate(raw.as_deref()).await?;
    req.extensions_mut().insert(principal);

    Ok(next.run(req).await)
}

/// Rejects callers that used up their window
pub async fn rate_limiting(
    State(state): State<Arc<GatewayState>>,
    req: Request,
    next: Next,
) -> Result<Response, AppError> {
    let principal = req.extensions().get::<Principal>().cloned();
    state.rate_limiter.check(principal.as_ref()).await?;

    Ok(next.run(req).await)
}
