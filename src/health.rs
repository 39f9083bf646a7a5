use anyhow::Result;

use crate::cache::RateCache;
use crate::storage::CredentialStore;

/// Readiness: the credential store and the rate cache both answer
pub async fn health_check(store: &dyn CredentialStore, cache: &dyn RateCache) -> Result<()> {
    // Check database
    store.ping().await?;

    // Check Redis
    cache.ping().await?;

    Ok(())
}
