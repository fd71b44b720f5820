//! Core ingestion logic.
//!
//! This module contains:
//! - Fetcher: politeness delay plus retry around single source calls
//! - Worklist: up-front event discovery and de-duplication
//! - Orchestrator: bounded worker pool that writes events to the store

pub mod fetcher;
pub mod orchestrator;
pub mod worklist;

// Re-export commonly used types
pub use fetcher::{Attempt, FetchOutcome, Fetcher, PolitenessBudget, RetryPolicy};
pub use orchestrator::Orchestrator;
pub use worklist::{IngestRequest, WorkList, WorkSource};
