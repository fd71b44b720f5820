//! Source adapters for external match-data providers.
//!
//! Adapters provide a unified interface over heterogeneous sources. Each
//! one owns its identifier scheme and its tolerance for missing fields,
//! and translates native records into the descriptors in
//! [`crate::domain`]. Adapters never touch the store.

pub mod footballia;
pub mod html;
pub mod http;
pub mod statsbomb;

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::config::{ConfigError, SourcesConfig};
use crate::core::fetcher::PolitenessBudget;
use crate::domain::{EventDescriptor, ParticipationDescriptor};

pub use footballia::FootballiaAdapter;
pub use statsbomb::StatsBombAdapter;

/// Errors an adapter can report for a single call
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SourceError {
    /// Transport-level fault; the caller may retry
    #[error("source unavailable: {0}")]
    Unavailable(String),

    /// The response could not be interpreted; retrying will not help
    #[error("malformed record: {0}")]
    Malformed(String),
}

impl SourceError {
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Unavailable(_))
    }
}

/// Trait for match-data sources
#[async_trait]
pub trait SourceAdapter: Send + Sync {
    /// Source name, stored as the `source` half of every natural key
    fn name(&self) -> &str;

    /// Delay window applied before each outbound request to this source
    fn politeness(&self) -> PolitenessBudget;

    /// List events involving any of `team_names` within the inclusive range
    async fn list_events(
        &self,
        team_names: &[String],
        date_from: NaiveDate,
        date_to: NaiveDate,
    ) -> Result<Vec<EventDescriptor>, SourceError>;

    /// List the participations (lineup) of one event
    async fn list_participations(
        &self,
        source_event_id: &str,
    ) -> Result<Vec<ParticipationDescriptor>, SourceError>;
}

/// Closed set of built-in sources
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceKind {
    /// StatsBomb open data (JSON)
    Statsbomb,

    /// Footballia match archive (HTML)
    Footballia,
}

impl SourceKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Statsbomb => "statsbomb",
            Self::Footballia => "footballia",
        }
    }

    /// Construct the adapter for this source
    pub fn build(self, sources: &SourcesConfig) -> Result<Arc<dyn SourceAdapter>, SourceError> {
        let adapter: Arc<dyn SourceAdapter> = match self {
            Self::Statsbomb => Arc::new(StatsBombAdapter::new(sources.statsbomb.clone())?),
            Self::Footballia => Arc::new(FootballiaAdapter::new(sources.footballia.clone())?),
        };
        Ok(adapter)
    }
}

impl fmt::Display for SourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SourceKind {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "statsbomb" | "statsbomb_open_data" => Ok(Self::Statsbomb),
            "footballia" => Ok(Self::Footballia),
            other => Err(ConfigError::UnknownSource(other.to_string())),
        }
    }
}

/// Turn a display name into a URL slug
///
/// Quotes and dots are dropped, every other run of non-alphanumerics
/// becomes a single `-`.
pub fn slugify(name: &str) -> String {
    let mut slug = String::with_capacity(name.len());
    let mut pending_dash = false;

    for ch in name.trim().chars() {
        if matches!(ch, '\'' | '"' | '.') {
            continue;
        }
        if ch.is_ascii_alphanumeric() {
            if pending_dash && !slug.is_empty() {
                slug.push('-');
            }
            pending_dash = false;
            slug.push(ch.to_ascii_lowercase());
        } else {
            pending_dash = true;
        }
    }

    slug
}
