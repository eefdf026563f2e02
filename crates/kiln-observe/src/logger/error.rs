use thiserror::Error;

/// Why the agent could not set up logging.
#[derive(Debug, Error)]
pub enum LoggerError {
    #[error("invalid log format {0:?}, expected one of text, json, journald")]
    InvalidFormat(String),
    #[error("journald logging is not available in this build")]
    JournaldNotSupported,
    #[error("logger is already initialized")]
    AlreadyInitialized,
    #[error("failed to initialize logger: {0}")]
    InitializationFailed(String),
    #[error("invalid log filter: {0}")]
    InvalidLogLevel(String),
}
