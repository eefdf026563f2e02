use thiserror::Error;

#[derive(Error, Debug)]
pub enum ClientError {
    /// Not running inside a job, or the Job Control API is disabled.
    #[error("KILN_JOB_API_SOCKET is not set; not running inside a job with the job api enabled")]
    NoSocketEnv,

    #[error("KILN_JOB_API_TOKEN is not set; not running inside a job with the job api enabled")]
    NoTokenEnv,

    #[error("job api request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("job api returned {status}: {message}")]
    Api { status: u16, message: String },

    #[error("invalid job api response: {0}")]
    InvalidResponse(String),
}

impl ClientError {
    /// True when the process is not attached to a job control socket at all.
    pub fn is_unavailable(&self) -> bool {
        matches!(self, ClientError::NoSocketEnv | ClientError::NoTokenEnv)
    }
}
