use thiserror::Error;

/// Errors produced by the sweeper and its collaborators.
#[derive(Debug, Error)]
pub enum LapseError {
    #[error("configuration error: {0}")]
    ConfigError(String),

    #[error("store error: {0}")]
    StoreError(String),

    #[error("account not found: {0}")]
    AccountNotFound(String),

    #[error("invalid account record: {0}")]
    InvalidRecord(String),

    #[error("notification error: {0}")]
    NotificationError(String),

    #[error("unauthorized: {0}")]
    Unauthorized(String),

    #[error("server error: {0}")]
    ServerError(String),
}

pub type LapseResult<T> = Result<T, LapseError>;
