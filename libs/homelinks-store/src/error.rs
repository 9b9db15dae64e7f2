use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("store I/O failed on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to encode store document: {0}")]
    Serialize(#[from] serde_json::Error),
    #[error("invalid settings: {0}")]
    InvalidSettings(String),
    #[error("invalid items: {0}")]
    InvalidItems(String),
}

impl StoreError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        StoreError::Io {
            path: path.into(),
            source,
        }
    }

    /// True when the caller sent something the store refuses to persist.
    pub fn is_client_error(&self) -> bool {
        matches!(
            self,
            StoreError::InvalidSettings(_) | StoreError::InvalidItems(_)
        )
    }
}

pub type StoreResult<T> = Result<T, StoreError>;
