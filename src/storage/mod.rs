// ============================================================================
// Storage - Credential, Service and Audit Persistence
// ============================================================================
//
// The request path talks to storage through three narrow traits:
// - CredentialStore: active credential lookup by token
// - ServiceRegistry: active service lookup by slug
// - AuditSink: append-only audit records
//
// Unknown and deactivated rows are both reported as `None`, so callers
// cannot tell them apart.
//
// Implementations:
// - PgStore: PostgreSQL via sqlx (production)
// - MemoryStore: in-process maps (tests, local runs)
//
// ============================================================================

use anyhow::Result;
use async_trait::async_trait;

use crate::models::{Credential, NewAuditRecord, ServiceRoute};

pub mod memory;
pub mod postgres;

pub use memory::MemoryStore;
pub use postgres::PgStore;

#[async_trait]
pub trait CredentialStore: Send + Sync {
    /// Returns the credential only when it exists and is active
    async fn find_active_credential(&self, key: &str) -> Result<Option<Credential>>;

    /// Readiness probe
    async fn ping(&self) -> Result<()> {
        Ok(())
    }
}

#[async_trait]
pub trait ServiceRegistry: Send + Sync {
    /// Returns the service only when it exists and is active
    async fn find_active_service(&self, slug: &str) -> Result<Option<ServiceRoute>>;
}

#[async_trait]
pub trait AuditSink: Send + Sync {
    async fn record(&self, entry: NewAuditRecord) -> Result<()>;
}
