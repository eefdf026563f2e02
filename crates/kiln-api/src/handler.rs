use async_trait::async_trait;
use kiln_model::{
    EnvDeleteRequest, EnvDeleteResponse, EnvGetResponse, EnvUpdateRequestPayload,
    EnvUpdateResponse,
};

use crate::error::ApiError;

/// Job environment API handler.
///
/// Called only after the request has been authenticated and its body decoded.
/// Implementations own validation of the decoded payload:
/// - the provided `EnvStoreAdapter` serves a job's `EnvStore`;
/// - custom handlers can wrap it with extra policy.
#[async_trait]
pub trait ApiHandler: Send + Sync + 'static {
    /// Snapshot of the whole environment.
    async fn get_env(&self) -> Result<EnvGetResponse, ApiError>;

    /// Set a batch of variables; all or nothing.
    async fn update_env(
        &self,
        req: EnvUpdateRequestPayload,
    ) -> Result<EnvUpdateResponse, ApiError>;

    /// Remove a batch of variables; all or nothing.
    async fn delete_env(&self, req: EnvDeleteRequest) -> Result<EnvDeleteResponse, ApiError>;
}
