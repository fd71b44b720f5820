//! Storage coordinator.
//!
//! One [`Store`] owns one SQLite file. All mutation funnels through a
//! single writer connection behind a mutex owned by the instance, so two
//! stores in the same process never share a lock. Reads open their own
//! connection and run inside one deferred transaction, which under WAL
//! gives each call a consistent snapshot that never includes a
//! half-written event.
//!
//! SQLite calls are blocking and run on `spawn_blocking`.

pub mod error;
pub mod schema;
pub mod upsert;

use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use rusqlite::{Connection, TransactionBehavior};
use serde::Serialize;
use tracing::{debug, info, instrument, warn};

pub use error::{Result, StoreError};
pub use upsert::EventWriteReport;

use crate::domain::{
    EventDescriptor, ParticipantDescriptor, ParticipationDescriptor, TeamDescriptor,
};
use schema::{PRAGMAS, SCHEMA};

/// Whole-transaction retries after the busy timeout has expired
const WRITE_ATTEMPTS: u32 = 3;

/// Row counts, plus participations whose parents are missing (always 0)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct StoreStats {
    pub teams: u64,
    pub participants: u64,
    pub events: u64,
    pub participations: u64,
    pub participants_with_nationality: u64,
    pub participations_with_minutes: u64,
    pub orphaned_participations: u64,
}

/// SQLite-backed match store.
///
/// Cloning is cheap; clones share the writer connection and its lock.
#[derive(Clone)]
pub struct Store {
    path: PathBuf,
    busy_timeout: Duration,
    writer: Arc<Mutex<Connection>>,
}

impl std::fmt::Debug for Store {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Store")
            .field("path", &self.path)
            .field("busy_timeout", &self.busy_timeout)
            .finish()
    }
}

fn open_connection(path: &Path, busy_timeout: Duration) -> Result<Connection> {
    let conn = Connection::open(path)?;
    conn.busy_timeout(busy_timeout)?;
    conn.execute_batch(PRAGMAS)?;
    Ok(conn)
}

async fn blocking<T, F>(f: F) -> Result<T>
where
    T: Send + 'static,
    F: FnOnce() -> Result<T> + Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .map_err(|e| StoreError::Task(e.to_string()))?
}

impl Store {
    /// Open (or create) a store at `path` and apply the schema
    #[instrument(skip_all, fields(path = %path.as_ref().display()))]
    pub async fn open(path: impl AsRef<Path>, busy_timeout: Duration) -> Result<Self> {
        let path = path.as_ref().to_path_buf();

        let conn = blocking({
            let path = path.clone();
            move || {
                if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
                    std::fs::create_dir_all(parent).map_err(|source| StoreError::Io {
                        path: parent.to_path_buf(),
                        source,
                    })?;
                }
                let conn = open_connection(&path, busy_timeout)?;
                conn.execute_batch(SCHEMA)?;
                Ok(conn)
            }
        })
        .await?;

        info!("Store opened");
        Ok(Self {
            path,
            busy_timeout,
            writer: Arc::new(Mutex::new(conn)),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Run `f` inside an immediate transaction while holding the writer lock
    ///
    /// Busy errors that outlive the connection's busy timeout roll the
    /// transaction back and retry it; callers only see
    /// [`StoreError::WriterContention`] once every attempt is spent.
    async fn write<T, F>(&self, f: F) -> Result<T>
    where
        T: Send + 'static,
        F: Fn(&Connection) -> Result<T> + Send + 'static,
    {
        let writer = Arc::clone(&self.writer);
        let backoff = self.busy_timeout / 10;

        blocking(move || {
            let mut conn = writer
                .lock()
                .map_err(|_| StoreError::Task("writer lock poisoned".to_string()))?;

            for attempt in 1..=WRITE_ATTEMPTS {
                let result = conn
                    .transaction_with_behavior(TransactionBehavior::Immediate)
                    .map_err(StoreError::from)
                    .and_then(|tx| {
                        let value = f(&tx)?;
                        tx.commit()?;
                        Ok(value)
                    });

                match result {
                    Err(e) if e.is_busy() => {
                        warn!(attempt, error = %e, "Store busy, retrying write");
                        std::thread::sleep(backoff);
                    }
                    other => return other,
                }
            }

            Err(StoreError::WriterContention {
                attempts: WRITE_ATTEMPTS,
            })
        })
        .await
    }

    /// Run `f` on a fresh connection inside one read transaction
    pub(crate) async fn read<T, F>(&self, f: F) -> Result<T>
    where
        T: Send + 'static,
        F: FnOnce(&Connection) -> Result<T> + Send + 'static,
    {
        let path = self.path.clone();
        let busy_timeout = self.busy_timeout;

        blocking(move || {
            let mut conn = open_connection(&path, busy_timeout)?;
            let tx = conn.transaction_with_behavior(TransactionBehavior::Deferred)?;
            let value = f(&tx)?;
            tx.finish()?;
            Ok(value)
        })
        .await
    }

    pub async fn upsert_team(&self, team: &TeamDescriptor) -> Result<i64> {
        let team = team.clone();
        self.write(move |conn| upsert::upsert_team(conn, &team)).await
    }

    pub async fn upsert_participant(&self, participant: &ParticipantDescriptor) -> Result<i64> {
        let participant = participant.clone();
        self.write(move |conn| upsert::upsert_participant(conn, &participant))
            .await
    }

    /// Upsert an event and both of its teams
    pub async fn upsert_event(&self, event: &EventDescriptor) -> Result<i64> {
        let event = event.clone();
        self.write(move |conn| upsert::upsert_event(conn, &event)).await
    }

    /// Upsert one appearance in an already stored event
    pub async fn upsert_participation(
        &self,
        event_id: i64,
        participation: &ParticipationDescriptor,
    ) -> Result<i64> {
        let participation = participation.clone();
        self.write(move |conn| upsert::upsert_participation(conn, event_id, &participation))
            .await
    }

    /// Write an event and its whole lineup as one atomic unit
    pub async fn write_event(
        &self,
        event: &EventDescriptor,
        participations: Vec<ParticipationDescriptor>,
    ) -> Result<EventWriteReport> {
        let key = event.natural_key();
        let event = event.clone();

        let report = self
            .write(move |conn| upsert::write_event(conn, &event, &participations))
            .await?;

        debug!(
            event = %key,
            event_id = report.event_id,
            written = report.participations_written,
            skipped = report.participations_skipped,
            "Event written"
        );
        Ok(report)
    }

    pub async fn stats(&self) -> Result<StoreStats> {
        self.read(|conn| {
            let count = |sql: &str| -> Result<u64> {
                let n: i64 = conn.query_row(sql, [], |row| row.get(0))?;
                Ok(n.max(0) as u64)
            };

            Ok(StoreStats {
                teams: count("SELECT COUNT(*) FROM teams")?,
                participants: count("SELECT COUNT(*) FROM participants")?,
                events: count("SELECT COUNT(*) FROM events")?,
                participations: count("SELECT COUNT(*) FROM participations")?,
                participants_with_nationality: count(
                    "SELECT COUNT(*) FROM participants WHERE nationality IS NOT NULL",
                )?,
                participations_with_minutes: count(
                    "SELECT COUNT(*) FROM participations WHERE minutes IS NOT NULL",
                )?,
                orphaned_participations: count(
                    "SELECT COUNT(*) FROM participations pa
                     LEFT JOIN events e       ON e.id = pa.event_id
                     LEFT JOIN participants p ON p.id = pa.participant_id
                     LEFT JOIN teams t        ON t.id = pa.team_id
                     WHERE e.id IS NULL OR p.id IS NULL OR t.id IS NULL",
                )?,
            })
        })
        .await
    }
}
