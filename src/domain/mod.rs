//! Domain types for the squadgraph pipeline.
//!
//! This module contains the core data structures:
//! - Descriptors: source-neutral transfer objects produced by adapters
//! - Summary: per-run ingestion outcome

pub mod descriptors;
pub mod summary;

// Re-export commonly used types
pub use descriptors::{
    EventDescriptor, NaturalKey, ParticipantDescriptor, ParticipationDescriptor, TeamDescriptor,
};
pub use summary::{FailedEvent, IngestSummary, ItemOutcome, RunStatus};
