use session_store::StoreError;
use thiserror::Error;

/// Why a message could not be sent. Nothing is queued on failure.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum SendError {
    #[error("message is empty")]
    EmptyMessage,

    #[error("an exchange is already in progress")]
    ExchangeActive,
}

#[derive(Debug, Error)]
pub enum SessionError {
    #[error("an exchange is in progress; wait for it to finish or cancel it")]
    ExchangeActive,

    #[error("invalid reasoning delimiters: {0}")]
    InvalidDelimiters(#[from] regex::Error),

    #[error(transparent)]
    Store(#[from] StoreError),
}
