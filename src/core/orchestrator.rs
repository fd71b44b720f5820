//! Ingestion orchestrator.
//!
//! Builds the work list once, then drives a fixed pool of workers over a
//! shared queue. Each worker fetches one event's participations through
//! the [`Fetcher`] and hands the whole batch to the [`Store`] as a single
//! write. Events are independent: a failure is recorded and the worker
//! moves on.
//!
//! Cancellation is cooperative. Workers check the signal only between
//! events, so an event that has started is always written completely.
//!
//! Outcomes are folded into the shared summary as each event finishes.
//! An event still marked in flight after its worker died is counted as
//! failed, so a lost worker can never turn into a clean exit status.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use chrono::Utc;
use tokio::sync::watch;
use tokio::task::JoinSet;
use tracing::{debug, error, info, info_span, warn, Instrument};
use uuid::Uuid;

use super::fetcher::{FetchOutcome, Fetcher};
use super::worklist::{self, IngestRequest, WorkSource};
use crate::adapters::SourceAdapter;
use crate::config::{ConfigError, IngestSettings};
use crate::domain::{EventDescriptor, IngestSummary, ItemOutcome};
use crate::store::{Store, StoreError};

/// Bounded worker pool over one source and one store
pub struct Orchestrator {
    adapter: Arc<dyn SourceAdapter>,
    store: Store,
    fetcher: Fetcher,
    concurrency: usize,
    progress_every: usize,
}

/// State shared by the workers of one run
struct Shared {
    adapter: Arc<dyn SourceAdapter>,
    store: Store,
    fetcher: Fetcher,
    queue: Mutex<VecDeque<EventDescriptor>>,
    summary: Mutex<IngestSummary>,
    /// Worker index to the key of the event it is processing
    in_flight: Mutex<HashMap<usize, String>>,
    completed: AtomicUsize,
    total: usize,
    progress_every: usize,
}

/// Counters stay usable after a worker panicked while holding a lock
fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

impl Shared {
    /// Pop the next event and mark it in flight for `worker`
    fn claim(&self, worker: usize) -> Option<EventDescriptor> {
        let event = lock(&self.queue).pop_front()?;
        lock(&self.in_flight).insert(worker, event.natural_key().to_string());
        Some(event)
    }

    fn finish(&self, worker: usize, key: &str, outcome: &ItemOutcome) {
        lock(&self.summary).record(key, outcome);
        lock(&self.in_flight).remove(&worker);
    }

    fn remaining(&self) -> usize {
        lock(&self.queue).len()
    }
}

impl Orchestrator {
    pub fn new(adapter: Arc<dyn SourceAdapter>, store: Store, settings: &IngestSettings) -> Self {
        let fetcher = Fetcher::new(adapter.politeness(), settings.retry.clone());
        Self {
            adapter,
            store,
            fetcher,
            concurrency: settings.concurrency.max(1),
            progress_every: settings.progress_every.max(1),
        }
    }

    pub fn concurrency(&self) -> usize {
        self.concurrency
    }

    /// Discover work, ingest it, and summarize
    ///
    /// Only configuration problems are returned as errors, and they are
    /// raised before anything is fetched or written.
    pub async fn run(
        &self,
        request: &IngestRequest,
        cancel: watch::Receiver<bool>,
    ) -> Result<IngestSummary, ConfigError> {
        request.validate()?;

        let discovered = match &request.work {
            WorkSource::EventsFile(path) => worklist::read_events_file(path)?,
            WorkSource::Teams(teams) => {
                worklist::discover(
                    self.adapter.as_ref(),
                    &self.fetcher,
                    teams,
                    request.date_from,
                    request.date_to,
                )
                .await
            }
        };

        let events = worklist::prepare(discovered.events, request.date_from, request.date_to);
        let mut summary = self.ingest_events(events, cancel).await;

        summary.skipped_malformed += discovered.skipped_malformed;
        summary.failed += discovered.failures.len();
        summary.failures.extend(discovered.failures);

        Ok(summary)
    }

    /// Ingest an already prepared work list
    pub async fn ingest_events(
        &self,
        events: Vec<EventDescriptor>,
        cancel: watch::Receiver<bool>,
    ) -> IngestSummary {
        let run_id = Uuid::new_v4();
        let span = info_span!("ingest_run", %run_id, source = self.adapter.name());

        async move {
            let mut summary = IngestSummary::new(run_id);
            summary.discovered = events.len();

            let workers = self.concurrency.min(events.len()).max(1);
            info!(events = events.len(), workers, "Starting ingestion");

            let shared = Arc::new(Shared {
                adapter: Arc::clone(&self.adapter),
                store: self.store.clone(),
                fetcher: self.fetcher.clone(),
                total: events.len(),
                queue: Mutex::new(events.into()),
                summary: Mutex::new(summary),
                in_flight: Mutex::new(HashMap::new()),
                completed: AtomicUsize::new(0),
                progress_every: self.progress_every,
            });

            let mut set = JoinSet::new();
            for worker in 0..workers {
                let shared = Arc::clone(&shared);
                let cancel = cancel.clone();
                set.spawn(
                    run_worker(worker, shared, cancel).instrument(info_span!("worker", worker)),
                );
            }

            let mut worker_error = None;
            while let Some(joined) = set.join_next().await {
                if let Err(e) = joined {
                    error!(error = %e, "Worker task failed");
                    worker_error = Some(e.to_string());
                }
            }

            let lost: Vec<String> = lock(&shared.in_flight).drain().map(|(_, key)| key).collect();
            let mut summary = lock(&shared.summary).clone();
            for key in lost {
                let reason = worker_error.as_deref().unwrap_or("worker stopped");
                error!(event = %key, "Event lost with its worker");
                summary.record(
                    &key,
                    &ItemOutcome::Failed {
                        attempts: 0,
                        error: format!("worker stopped before finishing: {}", reason),
                    },
                );
            }

            summary.unprocessed = shared.remaining();
            summary.cancelled = *cancel.borrow();
            summary.completed_at = Some(Utc::now());

            info!(
                ingested = summary.ingested,
                skipped = summary.skipped_malformed,
                failed = summary.failed,
                unprocessed = summary.unprocessed,
                cancelled = summary.cancelled,
                "Ingestion finished"
            );
            summary
        }
        .instrument(span)
        .await
    }
}

async fn run_worker(worker: usize, shared: Arc<Shared>, cancel: watch::Receiver<bool>) {
    loop {
        if *cancel.borrow() {
            debug!("Cancellation observed, worker stopping");
            break;
        }
        let Some(event) = shared.claim(worker) else {
            break;
        };

        let key = event.natural_key().to_string();
        let outcome = process_event(&shared, &event).await;
        shared.finish(worker, &key, &outcome);

        let done = shared.completed.fetch_add(1, Ordering::SeqCst) + 1;
        if done % shared.progress_every == 0 || done == shared.total {
            info!(done, total = shared.total, "Progress");
        }
    }
}

/// Fetch and persist one event; errors become the outcome, never propagate
async fn process_event(shared: &Shared, event: &EventDescriptor) -> ItemOutcome {
    let key = event.natural_key();

    if !event.has_distinct_sides() {
        warn!(event = %key, "Skipping event with the same team on both sides");
        return ItemOutcome::Skipped {
            reason: "home and away are the same team".to_string(),
        };
    }

    debug!(event = %key, match_label = %event.label(), "Fetching lineup");
    let what = key.to_string();
    let source_event_id = event.source_event_id.as_str();
    let fetched = shared
        .fetcher
        .fetch(&what, || shared.adapter.list_participations(source_event_id))
        .await;

    match fetched {
        FetchOutcome::Fetched { value, attempts } => {
            match shared.store.write_event(event, value).await {
                Ok(report) => ItemOutcome::Ingested {
                    participations_written: report.participations_written,
                    participations_skipped: report.participations_skipped,
                },
                Err(StoreError::Invariant(reason)) => {
                    warn!(event = %key, reason = %reason, "Skipping event");
                    ItemOutcome::Skipped { reason }
                }
                Err(e) => {
                    error!(event = %key, error = %e, "Failed to store event");
                    ItemOutcome::Failed {
                        attempts,
                        error: e.to_string(),
                    }
                }
            }
        }
        FetchOutcome::Malformed { reason } => {
            warn!(event = %key, reason = %reason, "Skipping malformed lineup");
            ItemOutcome::Skipped { reason }
        }
        FetchOutcome::Exhausted { attempts, error } => {
            error!(event = %key, attempts, error = %error, "Giving up on event");
            ItemOutcome::Failed { attempts, error }
        }
    }
}
