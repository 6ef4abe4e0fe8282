use thiserror::Error;

use crate::storage::StorageError;

/// Failures surfaced by the link directory and the analytics aggregator
#[derive(Debug, Error)]
pub enum ShortenerError {
    #[error("link not found")]
    NotFound,
    #[error("short code already exists")]
    AlreadyExists,
    #[error("invalid input: {0}")]
    Validation(String),
    #[error("no free short code after {attempts} attempts")]
    GenerationExhausted { attempts: u32 },
    #[error("storage unavailable: {0:#}")]
    StoreUnavailable(anyhow::Error),
}

pub type ShortenerResult<T> = Result<T, ShortenerError>;

impl From<StorageError> for ShortenerError {
    fn from(err: StorageError) -> Self {
        match err {
            StorageError::Conflict => ShortenerError::AlreadyExists,
            StorageError::Other(e) => ShortenerError::StoreUnavailable(e),
        }
    }
}
