// ============================================================================
// API Gateway
// ============================================================================
//
// Single entry point for `/proxy/{service_slug}/{path}` requests.
// Request pipeline:
// - API key authentication (X-API-KEY)
// - Per-key rate limiting (fixed window in the shared cache)
// - Service resolution by slug
// - Forwarding to the service's base URL
// - Audit record for every exchange that reached the upstream
//
// Stateless apart from the shared cache, so it scales horizontally.
//
// ============================================================================

pub mod discovery;
pub mod forwarder;
pub mod middleware;
pub mod router;

pub use discovery::resolve_service;
pub use forwarder::Forwarder;
pub use router::{build_router, GatewaySettings, GatewayState};
