//! Error types for block-writer

use thiserror::Error;

#[derive(Error, Debug)]
pub enum WriterError {
    /// The mempool is empty; the expected steady-state outcome of a tick.
    #[error("no transactions in mempool")]
    NoTransactions,

    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),

    #[error("File system error: {0}")]
    FsError(#[from] std::io::Error),

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Storage error: {0}")]
    StorageError(String),
}

pub type Result<T> = std::result::Result<T, WriterError>;
