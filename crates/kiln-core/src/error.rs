use thiserror::Error;

#[derive(Debug, Error)]
pub enum CoreError {
    #[error("the following environment variables are protected, and cannot be modified: {0:?}")]
    ProtectedKeys(Vec<String>),
}
