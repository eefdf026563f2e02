use async_trait::async_trait;
use kiln_core::EnvStore;
use kiln_model::{
    EnvDeleteRequest, EnvDeleteResponse, EnvGetResponse, EnvUpdateRequestPayload,
    EnvUpdateResponse,
};
use tracing::debug;

use crate::error::ApiError;
use crate::handler::ApiHandler;

/// Adapter that serves an `EnvStore` through `ApiHandler`.
///
/// Every request is validated in full before the store is touched:
/// protected names first, then (for updates) null values.
pub struct EnvStoreAdapter {
    store: EnvStore,
}

impl EnvStoreAdapter {
    /// Create a new adapter over the given store.
    pub fn new(store: EnvStore) -> Self {
        Self { store }
    }

    pub fn store(&self) -> &EnvStore {
        &self.store
    }
}

#[async_trait]
impl ApiHandler for EnvStoreAdapter {
    async fn get_env(&self) -> Result<EnvGetResponse, ApiError> {
        Ok(EnvGetResponse {
            env: self.store.dump(),
        })
    }

    async fn update_env(
        &self,
        req: EnvUpdateRequestPayload,
    ) -> Result<EnvUpdateResponse, ApiError> {
        self.store
            .protected()
            .ensure_mutable(req.env.keys().map(String::as_str))?;

        let nulls = req.null_keys();
        if !nulls.is_empty() {
            return Err(ApiError::NullValues(nulls));
        }

        let changes = req
            .into_changes()
            .ok_or_else(|| ApiError::Internal("null value survived validation".into()))?;
        let report = self.store.apply_update(changes);
        debug!(
            added = ?report.added,
            updated = ?report.updated,
            "job environment updated"
        );
        Ok(report.into_update_response())
    }

    async fn delete_env(&self, req: EnvDeleteRequest) -> Result<EnvDeleteResponse, ApiError> {
        self.store
            .protected()
            .ensure_mutable(req.keys.iter().map(String::as_str))?;

        let report = self.store.apply_delete(&req.keys);
        debug!(deleted = ?report.deleted, "job environment keys deleted");
        Ok(report.into_delete_response())
    }
}
