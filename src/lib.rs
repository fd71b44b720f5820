//! squadgraph - Match lineup ingestion and co-occurrence graphs
//!
//! Ingests historical match records from external sources into a SQLite
//! store and derives a weighted graph between players who appeared in
//! the same matches.
//!
//! # Architecture
//!
//! - Source adapters translate each provider's records into common
//!   descriptors and never touch the store
//! - The fetcher adds politeness delays and bounded retries
//! - The orchestrator runs a bounded worker pool, one event per unit of work
//! - The store serializes writes behind a single writer lock; every
//!   event and its lineup is one transaction, so re-running is idempotent
//! - The graph engine compiles a filter into a self-join over stored
//!   participations
//!
//! # Modules
//!
//! - `adapters`: StatsBomb open data and Footballia
//! - `core`: Fetcher, work discovery, orchestrator
//! - `domain`: Descriptors and run summaries
//! - `store`: Schema and idempotent upserts
//! - `graph`: Edge computation and DGS export
//! - `cli`: Command-line interface
//!
//! # Usage
//!
//! ```bash
//! # Ingest a tournament
//! squadgraph ingest --source statsbomb --date-from 2021-06-11 \
//!     --date-to 2021-07-11 --team Italy --team England
//!
//! # Export players who shared at least two matches
//! squadgraph graph --out players.dgs --min-weight 2
//! ```

pub mod adapters;
pub mod cli;
pub mod config;
pub mod core;
pub mod domain;
pub mod graph;
pub mod store;

// Re-export main types at crate root for convenience
pub use adapters::{SourceAdapter, SourceError, SourceKind};
pub use self::core::{Fetcher, IngestRequest, Orchestrator};
pub use domain::{EventDescriptor, IngestSummary, ParticipationDescriptor, RunStatus};
pub use graph::{Edge, FilterSpec, GraphEngine, GraphError};
pub use store::{Store, StoreError};
