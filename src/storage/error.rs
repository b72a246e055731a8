use std::io;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),
    #[error("tenant {0} not found")]
    TenantNotFound(String),
    #[error("connection lock poisoned")]
    LockPoisoned,
    #[error("invalid value: {0}")]
    InvalidValue(String),
    #[error("io error: {0}")]
    Io(#[from] io::Error),
}
