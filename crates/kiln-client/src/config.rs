use std::path::PathBuf;

use kiln_model::{JOB_API_SOCKET_ENV, JOB_API_TOKEN_ENV};

use crate::errors::ClientError;

/// Where the job control socket is and how to authenticate to it.
#[derive(Clone)]
pub struct ClientConfig {
    pub socket_path: PathBuf,
    pub token: String,
}

impl ClientConfig {
    pub fn new(socket_path: impl Into<PathBuf>, token: impl Into<String>) -> Self {
        Self {
            socket_path: socket_path.into(),
            token: token.into(),
        }
    }

    /// Discover the socket and token from the current process environment.
    pub fn from_env() -> Result<Self, ClientError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Discover the socket and token through an arbitrary variable lookup.
    ///
    /// An empty value counts as missing.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ClientError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let socket = lookup(JOB_API_SOCKET_ENV)
            .filter(|v| !v.is_empty())
            .ok_or(ClientError::NoSocketEnv)?;
        let token = lookup(JOB_API_TOKEN_ENV)
            .filter(|v| !v.is_empty())
            .ok_or(ClientError::NoTokenEnv)?;
        Ok(Self::new(socket, token))
    }
}

impl std::fmt::Debug for ClientConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClientConfig")
            .field("socket_path", &self.socket_path)
            .field("token", &"<redacted>")
            .finish()
    }
}
