//! SQL schema for the match store.
//!
//! Natural keys are enforced by UNIQUE constraints so concurrent upserts
//! merge instead of duplicating. `AUTOINCREMENT` keeps the identifier
//! sequences in `sqlite_sequence`.

/// Pragmas applied to every connection, writer and readers alike
pub const PRAGMAS: &str = "
PRAGMA journal_mode = WAL;
PRAGMA synchronous = NORMAL;
PRAGMA foreign_keys = ON;
";

/// Full schema DDL; idempotent thanks to `IF NOT EXISTS`.
pub const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS teams (
    id              INTEGER PRIMARY KEY AUTOINCREMENT,
    source          TEXT NOT NULL,
    source_team_id  TEXT NOT NULL,
    name            TEXT NOT NULL CHECK (length(name) > 0),
    country         TEXT,
    UNIQUE (source, source_team_id)
);

CREATE TABLE IF NOT EXISTS participants (
    id                     INTEGER PRIMARY KEY AUTOINCREMENT,
    source                 TEXT NOT NULL,
    source_participant_id  TEXT NOT NULL,
    name                   TEXT NOT NULL CHECK (length(name) > 0),
    birth_date             TEXT,            -- YYYY-MM-DD
    nationality            TEXT,
    UNIQUE (source, source_participant_id)
);

CREATE TABLE IF NOT EXISTS events (
    id               INTEGER PRIMARY KEY AUTOINCREMENT,
    source           TEXT NOT NULL,
    source_event_id  TEXT NOT NULL,
    date             TEXT NOT NULL,         -- YYYY-MM-DD
    season           TEXT,
    competition      TEXT,
    home_team_id     INTEGER NOT NULL REFERENCES teams(id),
    away_team_id     INTEGER NOT NULL REFERENCES teams(id),
    UNIQUE (source, source_event_id),
    CHECK  (home_team_id <> away_team_id)
);

-- team_id must be one of the event's sides; checked inside the write
-- transaction because CHECK cannot reference another table.
CREATE TABLE IF NOT EXISTS participations (
    id              INTEGER PRIMARY KEY AUTOINCREMENT,
    event_id        INTEGER NOT NULL REFERENCES events(id),
    participant_id  INTEGER NOT NULL REFERENCES participants(id),
    team_id         INTEGER NOT NULL REFERENCES teams(id),
    is_starter      INTEGER NOT NULL DEFAULT 0 CHECK (is_starter IN (0, 1)),
    minutes         INTEGER CHECK (minutes IS NULL OR minutes >= 0),
    position        TEXT,
    UNIQUE (event_id, participant_id)
);

CREATE INDEX IF NOT EXISTS participations_participant_idx ON participations(participant_id);
CREATE INDEX IF NOT EXISTS participations_event_team_idx  ON participations(event_id, team_id);
CREATE INDEX IF NOT EXISTS events_competition_idx         ON events(competition);
CREATE INDEX IF NOT EXISTS events_date_idx                ON events(date);

PRAGMA user_version = 1;
";
