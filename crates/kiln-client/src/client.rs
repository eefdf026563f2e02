use std::{collections::BTreeMap, path::PathBuf};

use kiln_model::{
    ENV_PATH, EnvDeleteRequest, EnvDeleteResponse, EnvGetResponse, EnvUpdateRequest,
    EnvUpdateResponse, ErrorResponse,
};
use reqwest::{RequestBuilder, header};
use serde::de::DeserializeOwned;
use tracing::trace;

use crate::{config::ClientConfig, errors::ClientError};

/// The host part is ignored; every request goes over the job's Unix socket.
const BASE_URL: &str = "http://job-api";

/// Job Control API client.
///
/// Calls are never retried.
#[derive(Clone)]
pub struct Client {
    http: reqwest::Client,
    token: String,
}

impl Client {
    /// Create a client for an explicit socket and token.
    pub fn new(
        socket_path: impl Into<PathBuf>,
        token: impl Into<String>,
    ) -> Result<Self, ClientError> {
        Self::from_config(ClientConfig::new(socket_path, token))
    }

    /// Create a client from the variables the agent put in this process's environment.
    pub fn from_env() -> Result<Self, ClientError> {
        Self::from_config(ClientConfig::from_env()?)
    }

    pub fn from_config(config: ClientConfig) -> Result<Self, ClientError> {
        let http = reqwest::Client::builder()
            .unix_socket(config.socket_path)
            .build()?;
        Ok(Self {
            http,
            token: config.token,
        })
    }

    /// Read the whole job environment.
    pub async fn env_get(&self) -> Result<BTreeMap<String, String>, ClientError> {
        let resp: EnvGetResponse = self.send(self.http.get(url())).await?;
        Ok(resp.env)
    }

    /// Set variables; returns which were added and which updated.
    pub async fn env_update(
        &self,
        env: BTreeMap<String, String>,
    ) -> Result<EnvUpdateResponse, ClientError> {
        let body = EnvUpdateRequest { env };
        let mut resp: EnvUpdateResponse = self.send(self.http.patch(url()).json(&body)).await?;
        resp.normalize();
        Ok(resp)
    }

    /// Remove variables; returns the names that existed and were removed.
    pub async fn env_delete(&self, keys: Vec<String>) -> Result<Vec<String>, ClientError> {
        let body = EnvDeleteRequest { keys };
        let mut resp: EnvDeleteResponse = self.send(self.http.delete(url()).json(&body)).await?;
        resp.normalize();
        Ok(resp.deleted)
    }

    async fn send<T: DeserializeOwned>(&self, req: RequestBuilder) -> Result<T, ClientError> {
        let response = req
            .header(header::AUTHORIZATION, format!("Bearer {}", self.token))
            .send()
            .await?;

        let status = response.status();
        let body = response.text().await?;
        trace!(status = status.as_u16(), "job api response");

        if !status.is_success() {
            let message = serde_json::from_str::<ErrorResponse>(&body)
                .map(|e| e.error)
                .unwrap_or(body);
            return Err(ClientError::Api {
                status: status.as_u16(),
                message,
            });
        }

        serde_json::from_str(&body).map_err(|e| {
            ClientError::InvalidResponse(format!("failed to parse response: {}, body: {}", e, body))
        })
    }
}

fn url() -> String {
    format!("{BASE_URL}{ENV_PATH}")
}
