// ============================================================================
// API Key Authentication
// ============================================================================
//
// Callers present a static token in `X-API-KEY`. A missing or empty header
// and an unknown/inactive token are the only two failure kinds; the store
// lookup returns `None` for both unknown and deactivated keys, so they are
// indistinguishable to the caller.
//
// ============================================================================

use std::sync::Arc;

use crate::error::{AppError, AppResult};
use crate::metrics;
use crate::models::Credential;
use crate::storage::CredentialStore;
use crate::utils::log_safe_id;

/// Header carrying the caller's API key
pub const API_KEY_HEADER: &str = "x-api-key";

/// Authenticated caller, attached to the request extensions
#[derive(Debug, Clone)]
pub struct Principal {
    pub credential: Arc<Credential>,
}

impl Principal {
    pub fn credential_id(&self) -> i64 {
        self.credential.id
    }

    pub fn key(&self) -> &str {
        &self.credential.key
    }
}

pub struct AuthGate {
    store: Arc<dyn CredentialStore>,
    hash_salt: String,
}

impl AuthGate {
    pub fn new(store: Arc<dyn CredentialStore>, hash_salt: impl Into<String>) -> Self {
        Self {
            store,
            hash_salt: hash_salt.into(),
        }
    }

    /// Resolves the raw header value into a principal
    pub async fn authenticate(&self, header_value: Option<&str>) -> AppResult<Principal> {
        let key = match header_value {
            Some(value) if !value.is_empty() => value,
            _ => {
                metrics::AUTH_REJECTIONS_TOTAL
                    .with_label_values(&["missing_api_key"])
                    .inc();
                return Err(AppError::MissingCredential);
            }
        };

        match self.store.find_active_credential(key).await? {
            Some(credential) => {
                tracing::debug!(
                    key_hash = %log_safe_id(key, &self.hash_salt),
                    credential_id = credential.id,
                    "API key accepted"
                );
                Ok(Principal {
                    credential: Arc::new(credential),
                })
            }
            None => {
                tracing::warn!(
                    key_hash = %log_safe_id(key, &self.hash_salt),
                    "Unknown or inactive API key"
                );
                metrics::AUTH_REJECTIONS_TOTAL
                    .with_label_values(&["invalid_api_key"])
                    .inc();
                Err(AppError::InvalidCredential)
            }
        }
    }
}
