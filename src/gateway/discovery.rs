// ============================================================================
// Service Discovery
// ============================================================================
//
// Resolves a slug from the request path to a registered, active service.
// Deactivated services are treated exactly like unknown ones.
//
// ============================================================================

use crate::error::{AppError, AppResult};
use crate::metrics;
use crate::models::ServiceRoute;
use crate::storage::ServiceRegistry;

pub async fn resolve_service(
    registry: &dyn ServiceRegistry,
    slug: &str,
) -> AppResult<ServiceRoute> {
    match registry.find_active_service(slug).await? {
        Some(service) => Ok(service),
        None => {
            tracing::info!(service = %slug, "Unknown or inactive service");
            metrics::UNKNOWN_SERVICE_TOTAL.inc();
            Err(AppError::ServiceNotFound)
        }
    }
}
