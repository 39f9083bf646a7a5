// ============================================================================
// Gateway Records
// ============================================================================
//
// Flat records owned by the external store. The gateway only reads
// credentials and services, and only appends audit records.
//
// ============================================================================

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Client API key used to authenticate gateway requests
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, sqlx::FromRow)]
pub struct Credential {
    pub id: i64,
    /// Friendly label (e.g. client name)
    pub name: String,
    /// Opaque token; generated once at creation and never rewritten
    pub key: String,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
}

impl Credential {
    /// Generates a fresh random token (32 hex chars)
    pub fn generate_key() -> String {
        uuid::Uuid::new_v4().simple().to_string()
    }
}

/// Upstream service the gateway can proxy to
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, sqlx::FromRow)]
pub struct ServiceRoute {
    pub id: i64,
    pub name: String,
    /// Path segment used in `/proxy/{slug}/...`
    pub slug: String,
    pub base_url: String,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
}

/// Input for registering a service
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewServiceRoute {
    pub name: String,
    pub slug: String,
    pub base_url: String,
}

/// One attempted upstream exchange, ready to be persisted
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewAuditRecord {
    pub credential_id: Option<i64>,
    pub service_id: Option<i64>,
    pub method: String,
    /// Remaining path, always `/`-prefixed
    pub path: String,
    pub status_code: u16,
    pub duration_ms: f64,
}

/// Persisted audit record
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditRecord {
    pub id: i64,
    /// None once the credential has been deleted
    pub credential_id: Option<i64>,
    /// None once the service has been deleted
    pub service_id: Option<i64>,
    pub method: String,
    pub path: String,
    pub status_code: u16,
    pub duration_ms: f64,
    pub timestamp: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_generated_keys_are_unique_hex() {
        let a = Credential::generate_key();
        let b = Credential::generate_key();
        assert_eq!(a.len(), 32);
        assert!(a.chars().all(|c| c.is_ascii_hexdigit()));
        assert_ne!(a, b);
    }
}
