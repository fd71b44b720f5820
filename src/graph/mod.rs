//! Co-occurrence graph over stored participations.
//!
//! Edges are never persisted; each call derives them from the current
//! participation rows and a [`FilterSpec`].

pub mod dgs;
pub mod engine;
pub mod filter;

use std::path::PathBuf;

use thiserror::Error;

use crate::store::StoreError;

pub use engine::{Edge, GraphEngine, GraphSnapshot, NodeAttributes};
pub use filter::FilterSpec;

#[derive(Debug, Error)]
pub enum GraphError {
    /// Semantically contradictory filter options
    #[error("invalid filter: {0}")]
    InvalidFilter(String),

    /// Graph name that would not fit on the DGS header line
    #[error("invalid graph name {0:?}: must be one token without whitespace or quotes")]
    InvalidGraphName(String),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("failed to write graph export {path}: {source}")]
    Export {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl From<rusqlite::Error> for GraphError {
    fn from(e: rusqlite::Error) -> Self {
        Self::Store(StoreError::Sqlite(e))
    }
}
