//! JSON bodies exchanged over the job control socket.
use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// `GET /env` response.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EnvGetResponse {
    pub env: BTreeMap<String, String>,
}

/// `PATCH /env` request as sent by clients.
///
/// Clients never send nulls; see [`EnvUpdateRequestPayload`] for the server side view.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EnvUpdateRequest {
    pub env: BTreeMap<String, String>,
}

/// `PATCH /env` request as decoded by the server.
///
/// Values are optional so that a `null` can be detected and rejected instead of being silently treated as a delete.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EnvUpdateRequestPayload {
    #[serde(default)]
    pub env: BTreeMap<String, Option<String>>,
}

impl EnvUpdateRequestPayload {
    /// Keys whose value is `null`, in ascending order.
    pub fn null_keys(&self) -> Vec<String> {
        self.env
            .iter()
            .filter(|(_, v)| v.is_none())
            .map(|(k, _)| k.clone())
            .collect()
    }

    /// Drop the optional wrapper; `None` if any value is `null`.
    pub fn into_changes(self) -> Option<BTreeMap<String, String>> {
        self.env.into_iter().map(|(k, v)| v.map(|v| (k, v))).collect()
    }
}

impl From<EnvUpdateRequest> for EnvUpdateRequestPayload {
    fn from(req: EnvUpdateRequest) -> Self {
        Self {
            env: req.env.into_iter().map(|(k, v)| (k, Some(v))).collect(),
        }
    }
}

/// `PATCH /env` response.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EnvUpdateResponse {
    pub added: Vec<String>,
    pub updated: Vec<String>,
}

impl EnvUpdateResponse {
    pub fn normalize(&mut self) {
        self.added.sort_unstable();
        self.updated.sort_unstable();
    }
}

/// `DELETE /env` request.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EnvDeleteRequest {
    #[serde(default)]
    pub keys: Vec<String>,
}

/// `DELETE /env` response.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EnvDeleteResponse {
    pub deleted: Vec<String>,
}

impl EnvDeleteResponse {
    pub fn normalize(&mut self) {
        self.deleted.sort_unstable();
    }
}

/// Body of every non-2xx response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
}
