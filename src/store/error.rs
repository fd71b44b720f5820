//! Error type for the storage coordinator.

use std::path::PathBuf;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    /// A descriptor would break a relational invariant
    #[error("integrity violation: {0}")]
    Invariant(String),

    /// The single-writer lock stayed busy past every retry
    #[error("store still busy after {attempts} write attempts")]
    WriterContention { attempts: u32 },

    #[error("storage task failed: {0}")]
    Task(String),

    #[error("failed to prepare store directory {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl StoreError {
    /// SQLITE_BUSY / SQLITE_LOCKED surviving the busy timeout
    pub fn is_busy(&self) -> bool {
        match self {
            Self::Sqlite(e) => is_busy(e),
            Self::WriterContention { .. } => true,
            _ => false,
        }
    }
}

pub(crate) fn is_busy(e: &rusqlite::Error) -> bool {
    matches!(
        e,
        rusqlite::Error::SqliteFailure(err, _)
            if matches!(
                err.code,
                rusqlite::ErrorCode::DatabaseBusy | rusqlite::ErrorCode::DatabaseLocked
            )
    )
}

pub type Result<T, E = StoreError> = std::result::Result<T, E>;
