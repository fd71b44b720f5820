//! Ingestion run outcome.
//!
//! A run processes many independent events; each one ends in exactly one
//! [`ItemOutcome`]. The summary aggregates them and decides the exit status.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Final state of a single event's unit of work
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ItemOutcome {
    /// Event and its participations persisted
    Ingested {
        participations_written: usize,
        participations_skipped: usize,
    },

    /// Record could not be parsed or violated an invariant; not retried
    Skipped { reason: String },

    /// Source stayed unavailable after all retry attempts
    Failed { attempts: u32, error: String },
}

/// A permanently failed event, kept for the final report
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FailedEvent {
    /// "{source}:{source_event_id}"
    pub event: String,
    pub attempts: u32,
    pub error: String,
}

/// Overall result of a run, used for the process exit status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    /// Every discovered event was ingested or skipped as malformed
    AllIngested,

    /// At least one event failed permanently or was never processed
    PartialFailures,
}

impl RunStatus {
    pub fn exit_code(self) -> u8 {
        match self {
            Self::AllIngested => 0,
            Self::PartialFailures => 1,
        }
    }
}

/// Aggregated counts for one ingestion run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IngestSummary {
    pub run_id: Uuid,
    pub started_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,

    /// Events in the work list after de-duplication
    pub discovered: usize,
    pub ingested: usize,
    pub skipped_malformed: usize,
    pub failed: usize,

    /// Events left in the queue when cancellation was observed
    pub unprocessed: usize,
    pub cancelled: bool,

    pub participations_written: usize,
    pub participations_skipped: usize,

    pub failures: Vec<FailedEvent>,
}

impl IngestSummary {
    pub fn new(run_id: Uuid) -> Self {
        Self {
            run_id,
            started_at: Utc::now(),
            completed_at: None,
            discovered: 0,
            ingested: 0,
            skipped_malformed: 0,
            failed: 0,
            unprocessed: 0,
            cancelled: false,
            participations_written: 0,
            participations_skipped: 0,
            failures: Vec::new(),
        }
    }

    /// Fold one event's outcome into the counts
    pub fn record(&mut self, event: &str, outcome: &ItemOutcome) {
        match outcome {
            ItemOutcome::Ingested {
                participations_written,
                participations_skipped,
            } => {
                self.ingested += 1;
                self.participations_written += participations_written;
                self.participations_skipped += participations_skipped;
            }
            ItemOutcome::Skipped { .. } => self.skipped_malformed += 1,
            ItemOutcome::Failed { attempts, error } => {
                self.failed += 1;
                self.failures.push(FailedEvent {
                    event: event.to_string(),
                    attempts: *attempts,
                    error: error.clone(),
                });
            }
        }
    }

    /// Items that reached a final outcome
    pub fn processed(&self) -> usize {
        self.ingested + self.skipped_malformed + self.failed
    }

    pub fn status(&self) -> RunStatus {
        if self.failed > 0 || self.unprocessed > 0 {
            RunStatus::PartialFailures
        } else {
            RunStatus::AllIngested
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record_outcomes() {
        let mut summary = IngestSummary::new(Uuid::new_v4());
        summary.record(
            "s:1",
            &ItemOutcome::Ingested {
                participations_written: 22,
                participations_skipped: 1,
            },
        );
        summary.record("s:2", &ItemOutcome::Skipped { reason: "bad".into() });
        assert_eq!(summary.status(), RunStatus::AllIngested);

        summary.record(
            "s:3",
            &ItemOutcome::Failed {
                attempts: 3,
                error: "timeout".into(),
            },
        );

        assert_eq!(summary.processed(), 3);
        assert_eq!(summary.participations_written, 22);
        assert_eq!(summary.participations_skipped, 1);
        assert_eq!(summary.failures.len(), 1);
        assert_eq!(summary.failures[0].event, "s:3");
        assert_eq!(summary.status(), RunStatus::PartialFailures);
        assert_eq!(summary.status().exit_code(), 1);
    }

    #[test]
    fn test_unprocessed_items_make_run_partial() {
        let mut summary = IngestSummary::new(Uuid::new_v4());
        summary.unprocessed = 4;
        summary.cancelled = true;
        assert_eq!(summary.status(), RunStatus::PartialFailures);
    }
}
