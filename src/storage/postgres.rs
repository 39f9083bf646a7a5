use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};

use super::{AuditSink, CredentialStore, ServiceRegistry};
use crate::db::DbPool;
use crate::models::{AuditRecord, Credential, NewAuditRecord, NewServiceRoute, ServiceRoute};

/// PostgreSQL-backed store
#[derive(Clone)]
pub struct PgStore {
    pool: DbPool,
}

#[derive(sqlx::FromRow)]
struct AuditRow {
    id: i64,
    api_key_id: Option<i64>,
    service_id: Option<i64>,
    method: String,
    path: String,
    status_code: i32,
    duration_ms: f64,
    timestamp: DateTime<Utc>,
}

impl From<AuditRow> for AuditRecord {
    fn from(row: AuditRow) -> Self {
        Self {
            id: row.id,
            credential_id: row.api_key_id,
            service_id: row.service_id,
            method: row.method,
            path: row.path,
            status_code: u16::try_from(row.status_code).unwrap_or(0),
            duration_ms: row.duration_ms,
            timestamp: row.timestamp,
        }
    }
}

impl PgStore {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    pub async fn create_credential(&self, name: &str) -> Result<Credential> {
        let credential = sqlx::query_as::<_, Credential>(
            r#"
            INSERT INTO api_keys (name, key)
            VALUES ($1, $2)
            RETURNING id, name, key, is_active, created_at
            "#,
        )
        .bind(name)
        .bind(Credential::generate_key())
        .fetch_one(&self.pool)
        .await
        .context("Failed to create credential")?;

        Ok(credential)
    }

    pub async fn set_credential_active(&self, key: &str, active: bool) -> Result<()> {
        sqlx::query("UPDATE api_keys SET is_active = $2 WHERE key = $1")
            .bind(key)
            .bind(active)
            .execute(&self.pool)
            .await
            .context("Failed to update credential")?;
        Ok(())
    }

    pub async fn create_service(&self, new: NewServiceRoute) -> Result<ServiceRoute> {
        let service = sqlx::query_as::<_, ServiceRoute>(
            r#"
            INSERT INTO services (name, slug, base_url)
            VALUES ($1, $2, $3)
            RETURNING id, name, slug, base_url, is_active, created_at
            "#,
        )
        .bind(&new.name)
        .bind(&new.slug)
        .bind(&new.base_url)
        .fetch_one(&self.pool)
        .await
        .with_context(|| format!("Failed to create service '{}'", new.slug))?;

        Ok(service)
    }

    pub async fn set_service_active(&self, slug: &str, active: bool) -> Result<()> {
        sqlx::query("UPDATE services SET is_active = $2 WHERE slug = $1")
            .bind(slug)
            .bind(active)
            .execute(&self.pool)
            .await
            .context("Failed to update service")?;
        Ok(())
    }

    /// Newest first
    pub async fn recent_audit_records(&self, limit: usize) -> Result<Vec<AuditRecord>> {
        let rows = sqlx::query_as::<_, AuditRow>(
            r#"
            SELECT id, api_key_id, service_id, method, path, status_code, duration_ms, timestamp
            FROM request_logs
            ORDER BY timestamp DESC, id DESC
            LIMIT $1
            "#,
        )
        .bind(i64::try_from(limit).unwrap_or(i64::MAX))
        .fetch_all(&self.pool)
        .await
        .context("Failed to load audit records")?;

        Ok(rows.into_iter().map(AuditRecord::from).collect())
    }
}

#[async_trait]
impl CredentialStore for PgStore {
    async fn find_active_credential(&self, key: &str) -> Result<Option<Credential>> {
        let credential = sqlx::query_as::<_, Credential>(
            r#"
            SELECT id, name, key, is_active, created_at
            FROM api_keys
            WHERE key = $1 AND is_active = TRUE
            "#,
        )
        .bind(key)
        .fetch_optional(&self.pool)
        .await
        .context("Failed to look up credential")?;

        Ok(credential)
    }

    async fn ping(&self) -> Result<()> {
        sqlx::query("SELECT 1")
            .execute(&self.pool)
            .await
            .context("Database ping failed")?;
        Ok(())
    }
}

#[async_trait]
impl ServiceRegistry for PgStore {
    async fn find_active_service(&self, slug: &str) -> Result<Option<ServiceRoute>> {
        let service = sqlx::query_as::<_, ServiceRoute>(
            r#"
            SELECT id, name, slug, base_url, is_active, created_at
            FROM services
            WHERE slug = $1 AND is_active = TRUE
            "#,
        )
        .bind(slug)
        .fetch_optional(&self.pool)
        .await
        .context("Failed to look up service")?;

        Ok(service)
    }
}

#[async_trait]
impl AuditSink for PgStore {
    async fn record(&self, entry: NewAuditRecord) -> Result<()> {
        // References that vanished since the lookup resolve to NULL
        sqlx::query(
            r#"
            INSERT INTO request_logs (api_key_id, service_id, method, path, status_code, duration_ms)
            VALUES (
                (SELECT id FROM api_keys WHERE id = $1),
                (SELECT id FROM services WHERE id = $2),
                $3, $4, $5, $6
            )
            "#,
        )
        .bind(entry.credential_id)
        .bind(entry.service_id)
        .bind(&entry.method)
        .bind(&entry.path)
        .bind(i32::from(entry.status_code))
        .bind(entry.duration_ms)
        .execute(&self.pool)
        .await
        .context("Failed to insert audit record")?;

        Ok(())
    }
}
