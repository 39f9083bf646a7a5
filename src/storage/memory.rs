use anyhow::{bail, Result};
use async_trait::async_trait;
use chrono::Utc;
use std::collections::HashMap;
use std::sync::RwLock;

use super::{AuditSink, CredentialStore, ServiceRegistry};
use crate::models::{AuditRecord, Credential, NewAuditRecord, NewServiceRoute, ServiceRoute};

#[derive(Default)]
struct Tables {
    next_id: i64,
    credentials: HashMap<String, Credential>,
    services: HashMap<String, ServiceRoute>,
    audit: Vec<AuditRecord>,
}

impl Tables {
    fn next_id(&mut self) -> i64 {
        self.next_id += 1;
        self.next_id
    }
}

/// In-process store with the same lookup semantics as `PgStore`
#[derive(Default)]
pub struct MemoryStore {
    tables: RwLock<Tables>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self) -> Result<std::sync::RwLockReadGuard<'_, Tables>> {
        self.tables
            .read()
            .map_err(|_| anyhow::anyhow!("memory store lock poisoned"))
    }

    fn write(&self) -> Result<std::sync::RwLockWriteGuard<'_, Tables>> {
        self.tables
            .write()
            .map_err(|_| anyhow::anyhow!("memory store lock poisoned"))
    }

    pub fn create_credential(&self, name: &str) -> Result<Credential> {
        let mut tables = self.write()?;
        let credential = Credential {
            id: tables.next_id(),
            name: name.to_string(),
            key: Credential::generate_key(),
            is_active: true,
            created_at: Utc::now(),
        };
        tables
            .credentials
            .insert(credential.key.clone(), credential.clone());
        Ok(credential)
    }

    pub fn set_credential_active(&self, key: &str, active: bool) -> Result<()> {
        let mut tables = self.write()?;
        match tables.credentials.get_mut(key) {
            Some(credential) => {
                credential.is_active = active;
                Ok(())
            }
            None => bail!("credential not found"),
        }
    }

    /// Removes the credential; its audit records keep a null reference
    pub fn delete_credential(&self, key: &str) -> Result<()> {
        let mut tables = self.write()?;
        if let Some(removed) = tables.credentials.remove(key) {
            for record in tables.audit.iter_mut() {
                if record.credential_id == Some(removed.id) {
                    record.credential_id = None;
                }
            }
        }
        Ok(())
    }

    pub fn create_service(&self, new: NewServiceRoute) -> Result<ServiceRoute> {
        let mut tables = self.write()?;
        if tables.services.contains_key(&new.slug) {
            bail!("service slug '{}' already exists", new.slug);
        }
        let service = ServiceRoute {
            id: tables.next_id(),
            name: new.name,
            slug: new.slug,
            base_url: new.base_url,
            is_active: true,
            created_at: Utc::now(),
        };
        tables
            .services
            .insert(service.slug.clone(), service.clone());
        Ok(service)
    }

    pub fn set_service_active(&self, slug: &str, active: bool) -> Result<()> {
        let mut tables = self.write()?;
        match tables.services.get_mut(slug) {
            Some(service) => {
                service.is_active = active;
                Ok(())
            }
            None => bail!("service '{}' not found", slug),
        }
    }

    /// Newest first
    pub fn recent_audit_records(&self, limit: usize) -> Result<Vec<AuditRecord>> {
        let tables = self.read()?;
        Ok(tables.audit.iter().rev().take(limit).cloned().collect())
    }

    /// All records in insertion order
    pub fn audit_records(&self) -> Vec<AuditRecord> {
        self.read().map(|t| t.audit.clone()).unwrap_or_default()
    }
}

#[async_trait]
impl CredentialStore for MemoryStore {
    async fn find_active_credential(&self, key: &str) -> Result<Option<Credential>> {
        let tables = self.read()?;
        Ok(tables
            .credentials
            .get(key)
            .filter(|c| c.is_active)
            .cloned())
    }
}

#[async_trait]
impl ServiceRegistry for MemoryStore {
    async fn find_active_service(&self, slug: &str) -> Result<Option<ServiceRoute>> {
        let tables = self.read()?;
        Ok(tables.services.get(slug).filter(|s| s.is_active).cloned())
    }
}

#[async_trait]
impl AuditSink for MemoryStore {
    async fn record(&self, entry: NewAuditRecord) -> Result<()> {
        let mut tables = self.write()?;
        // References that vanished since the lookup resolve to None
        let credential_id = entry
            .credential_id
            .filter(|id| tables.credentials.values().any(|c| c.id == *id));
        let service_id = entry
            .service_id
            .filter(|id| tables.services.values().any(|s| s.id == *id));
        let id = tables.next_id();
        tables.audit.push(AuditRecord {
            id,
            credential_id,
            service_id,
            method: entry.method,
            path: entry.path,
            status_code: entry.status_code,
            duration_ms: entry.duration_ms,
            timestamp: Utc::now(),
        });
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn httpbin() -> NewServiceRoute {
        NewServiceRoute {
            name: "HTTPBin".to_string(),
            slug: "httpbin".to_string(),
            base_url: "https://httpbin.org".to_string(),
        }
    }

    #[tokio::test]
    async fn test_inactive_and_unknown_credentials_look_the_same() {
        let store = MemoryStore::new();
        let credential = store.create_credential("client").unwrap();

        assert!(store
            .find_active_credential(&credential.key)
            .await
            .unwrap()
            .is_some());

        store.set_credential_active(&credential.key, false).unwrap();
        assert!(store
            .find_active_credential(&credential.key)
            .await
            .unwrap()
            .is_none());
        assert!(store.find_active_credential("nope").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_deactivated_service_is_not_found() {
        let store = MemoryStore::new();
        store.create_service(httpbin()).unwrap();
        assert!(store.find_active_service("httpbin").await.unwrap().is_some());

        store.set_service_active("httpbin", false).unwrap();
        assert!(store.find_active_service("httpbin").await.unwrap().is_none());
    }

    #[test]
    fn test_duplicate_slug_rejected() {
        let store = MemoryStore::new();
        store.create_service(httpbin()).unwrap();
        assert!(store.create_service(httpbin()).is_err());
    }

    #[tokio::test]
    async fn test_deleting_credential_nulls_audit_reference() {
        let store = MemoryStore::new();
        let credential = store.create_credential("client").unwrap();
        store
            .record(NewAuditRecord {
                credential_id: Some(credential.id),
                service_id: None,
                method: "GET".to_string(),
                path: "/get".to_string(),
                status_code: 200,
                duration_ms: 1.5,
            })
            .await
            .unwrap();

        store.delete_credential(&credential.key).unwrap();

        let records = store.recent_audit_records(10).unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].credential_id, None);
    }

    #[tokio::test]
    async fn test_audit_record_for_deleted_credential_has_null_reference() {
        let store = MemoryStore::new();
        let credential = store.create_credential("client").unwrap();
        let service = store.create_service(httpbin()).unwrap();
        store.delete_credential(&credential.key).unwrap();

        store
            .record(NewAuditRecord {
                credential_id: Some(credential.id),
                service_id: Some(service.id),
                method: "GET".to_string(),
                path: "/get".to_string(),
                status_code: 200,
                duration_ms: 2.0,
            })
            .await
            .unwrap();

        let records = store.audit_records();
        assert_eq!(records[0].credential_id, None);
        assert_eq!(records[0].service_id, Some(service.id));

        store
            .record(NewAuditRecord {
                credential_id: None,
                service_id: Some(9999),
                method: "GET".to_string(),
                path: "/get".to_string(),
                status_code: 502,
                duration_ms: 0.5,
            })
            .await
            .unwrap();
        assert_eq!(store.audit_records()[1].service_id, None);
    }
}
