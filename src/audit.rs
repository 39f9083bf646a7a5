// ============================================================================
// Audit Logging - Upstream Exchanges
// ============================================================================
//
// One audit record per request that reached the forwarder, successful or
// not. Records are:
// - Append-only (persisted through the AuditSink)
// - Structured (also emitted on the `audit` tracing target for SIEM)
// - Privacy-preserving (credential ids only, never the key itself)
//
// Requests rejected before forwarding (auth, throttle, unknown service)
// are never audited.
//
// ============================================================================

use crate::auth::Principal;
use crate::models::{NewAuditRecord, ServiceRoute};
use crate::storage::AuditSink;

/// Everything known about one finished upstream exchange
pub struct Exchange<'a> {
    pub principal: Option<&'a Principal>,
    pub service: &'a ServiceRoute,
    pub method: &'a str,
    pub path: &'a str,
    pub status_code: u16,
    pub duration_ms: f64,
}

impl Exchange<'_> {
    fn to_record(&self) -> NewAuditRecord {
        NewAuditRecord {
            credential_id: self.principal.map(Principal::credential_id),
            service_id: Some(self.service.id),
            method: self.method.to_string(),
            path: self.path.to_string(),
            status_code: self.status_code,
            duration_ms: self.duration_ms,
        }
    }
}

/// Emits the audit event and persists it
///
/// A failed write is logged and swallowed; the caller's response is never
/// replaced because the audit trail could not be written.
pub async fn record_exchange(sink: &dyn AuditSink, exchange: Exchange<'_>) {
    let record = exchange.to_record();

    tracing::info!(
        target: "audit",
        credential_id = ?record.credential_id,
        service = %exchange.service.slug,
        method = %record.method,
        path = %record.path,
        status = record.status_code,
        duration_ms = record.duration_ms,
        "UPSTREAM_EXCHANGE"
    );

    if let Err(e) = sink.record(record).await {
        tracing::error!(
            error = %e,
            service = %exchange.service.slug,
            "Failed to persist audit record"
        );
    }
}
