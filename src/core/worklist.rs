//! Work discovery.
//!
//! Runs once, up front, on a single task: either list events from the
//! source for the requested teams, or read pre-resolved events from a
//! JSON Lines file. The result is filtered to the date range and
//! de-duplicated by natural key before any worker starts.

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use chrono::NaiveDate;
use tracing::{error, info, warn};

use super::fetcher::{FetchOutcome, Fetcher};
use crate::adapters::SourceAdapter;
use crate::config::ConfigError;
use crate::domain::{EventDescriptor, FailedEvent};

/// Where the events of a run come from
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WorkSource {
    /// Ask the source for events involving these teams
    Teams(Vec<String>),

    /// JSON Lines file with one event descriptor per line
    EventsFile(PathBuf),
}

/// Inputs of one ingestion run
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IngestRequest {
    pub work: WorkSource,
    pub date_from: NaiveDate,
    pub date_to: NaiveDate,
}

impl IngestRequest {
    pub fn teams(
        teams: impl IntoIterator<Item = impl Into<String>>,
        date_from: NaiveDate,
        date_to: NaiveDate,
    ) -> Self {
        Self {
            work: WorkSource::Teams(teams.into_iter().map(Into::into).collect()),
            date_from,
            date_to,
        }
    }

    pub fn events_file(path: impl Into<PathBuf>, date_from: NaiveDate, date_to: NaiveDate) -> Self {
        Self {
            work: WorkSource::EventsFile(path.into()),
            date_from,
            date_to,
        }
    }

    /// Configuration checks that must pass before any work begins
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.date_from > self.date_to {
            return Err(ConfigError::InvalidDateRange {
                from: self.date_from,
                to: self.date_to,
            });
        }
        if let WorkSource::Teams(teams) = &self.work {
            if teams.iter().all(|t| t.trim().is_empty()) {
                return Err(ConfigError::NoWork);
            }
        }
        Ok(())
    }
}

/// Discovered events plus what went wrong while discovering them
#[derive(Debug, Default)]
pub struct WorkList {
    pub events: Vec<EventDescriptor>,
    pub skipped_malformed: usize,
    pub failures: Vec<FailedEvent>,
}

/// List events from the source through the fetcher
pub async fn discover(
    adapter: &dyn SourceAdapter,
    fetcher: &Fetcher,
    teams: &[String],
    date_from: NaiveDate,
    date_to: NaiveDate,
) -> WorkList {
    let teams: Vec<String> = teams
        .iter()
        .map(|t| t.trim().to_string())
        .filter(|t| !t.is_empty())
        .collect();
    let what = format!("{} event listing", adapter.name());

    match fetcher
        .fetch(&what, || adapter.list_events(&teams, date_from, date_to))
        .await
    {
        FetchOutcome::Fetched { value, attempts } => {
            info!(events = value.len(), attempts, "Listed events");
            WorkList {
                events: value,
                ..Default::default()
            }
        }
        FetchOutcome::Malformed { reason } => {
            error!(what = %what, reason = %reason, "Event listing unusable");
            WorkList {
                failures: vec![FailedEvent {
                    event: what,
                    attempts: 1,
                    error: reason,
                }],
                ..Default::default()
            }
        }
        FetchOutcome::Exhausted { attempts, error } => {
            error!(what = %what, attempts, error = %error, "Event listing failed");
            WorkList {
                failures: vec![FailedEvent {
                    event: what,
                    attempts,
                    error,
                }],
                ..Default::default()
            }
        }
    }
}

/// Parse JSON Lines event descriptors; bad lines are skipped and counted
pub fn parse_events_jsonl(text: &str) -> WorkList {
    let mut list = WorkList::default();

    for (idx, line) in text.lines().enumerate() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        match serde_json::from_str::<EventDescriptor>(line) {
            Ok(event) => list.events.push(event),
            Err(e) => {
                warn!(line = idx + 1, error = %e, "Skipping malformed event line");
                list.skipped_malformed += 1;
            }
        }
    }

    list
}

/// Read a pre-resolved events file
pub fn read_events_file(path: &Path) -> Result<WorkList, ConfigError> {
    let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    let list = parse_events_jsonl(&text);
    info!(
        path = %path.display(),
        events = list.events.len(),
        skipped = list.skipped_malformed,
        "Read events file"
    );
    Ok(list)
}

/// Keep events inside the inclusive range, first sighting per natural key
pub fn prepare(
    events: Vec<EventDescriptor>,
    date_from: NaiveDate,
    date_to: NaiveDate,
) -> Vec<EventDescriptor> {
    let mut seen = HashSet::new();
    events
        .into_iter()
        .filter(|e| e.within(date_from, date_to))
        .filter(|e| seen.insert(e.natural_key()))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::TeamDescriptor;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn event(id: &str, on: NaiveDate) -> EventDescriptor {
        EventDescriptor {
            source: "test".to_string(),
            source_event_id: id.to_string(),
            date: on,
            season: None,
            competition: None,
            home: TeamDescriptor::new("test", "h", "Home"),
            away: TeamDescriptor::new("test", "a", "Away"),
        }
    }

    #[test]
    fn test_prepare_filters_and_dedupes() {
        let events = vec![
            event("1", date(2021, 6, 1)),
            event("2", date(2021, 5, 31)),
            event("1", date(2021, 6, 1)),
            event("3", date(2021, 6, 30)),
        ];
        let kept = prepare(events, date(2021, 6, 1), date(2021, 6, 30));
        let ids: Vec<&str> = kept.iter().map(|e| e.source_event_id.as_str()).collect();
        assert_eq!(ids, vec!["1", "3"]);
    }

    #[test]
    fn test_jsonl_skips_bad_lines() {
        let line = serde_json::to_string(&event("9", date(2020, 1, 1))).unwrap();
        let text = format!("{}\n\n{{not json}}\n{}\n", line, line);

        let list = parse_events_jsonl(&text);
        assert_eq!(list.events.len(), 2);
        assert_eq!(list.skipped_malformed, 1);
    }

    #[test]
    fn test_request_validation() {
        let ok = IngestRequest::teams(["Italy"], date(2021, 1, 1), date(2021, 12, 31));
        assert!(ok.validate().is_ok());

        let reversed = IngestRequest::teams(["Italy"], date(2021, 12, 31), date(2021, 1, 1));
        assert!(matches!(
            reversed.validate(),
            Err(ConfigError::InvalidDateRange { .. })
        ));

        let blank = IngestRequest::teams(["  "], date(2021, 1, 1), date(2021, 1, 2));
        assert!(matches!(blank.validate(), Err(ConfigError::NoWork)));

        let file = IngestRequest::events_file("events.jsonl", date(2021, 1, 1), date(2021, 1, 1));
        assert!(file.validate().is_ok());
    }
}
