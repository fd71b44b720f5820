//! Idempotent upserts.
//!
//! Every function runs against a connection the caller already holds
//! inside a write transaction. Descriptive fields follow
//! "latest non-null wins": a later sighting refines a value but never
//! erases one with NULL. Names always take the latest value.

use rusqlite::{params, Connection, OptionalExtension};
use tracing::warn;

use super::error::{Result, StoreError};
use crate::domain::{
    EventDescriptor, ParticipantDescriptor, ParticipationDescriptor, TeamDescriptor,
};

/// Rows written for one event
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EventWriteReport {
    pub event_id: i64,
    pub participations_written: usize,
    pub participations_skipped: usize,
}

fn require_name(kind: &str, key: &dyn std::fmt::Display, name: &str) -> Result<()> {
    if name.trim().is_empty() {
        return Err(StoreError::Invariant(format!("{} {} has an empty name", kind, key)));
    }
    Ok(())
}

pub fn upsert_team(conn: &Connection, team: &TeamDescriptor) -> Result<i64> {
    require_name("team", &team.natural_key(), &team.name)?;

    let id = conn.query_row(
        "INSERT INTO teams (source, source_team_id, name, country)
         VALUES (?1, ?2, ?3, ?4)
         ON CONFLICT (source, source_team_id) DO UPDATE SET
             name    = excluded.name,
             country = COALESCE(excluded.country, teams.country)
         RETURNING id",
        params![team.source, team.source_team_id, team.name.trim(), team.country],
        |row| row.get(0),
    )?;
    Ok(id)
}

pub fn upsert_participant(conn: &Connection, participant: &ParticipantDescriptor) -> Result<i64> {
    require_name("participant", &participant.natural_key(), &participant.name)?;

    let birth_date = participant.birth_date.map(|d| d.to_string());
    let id = conn.query_row(
        "INSERT INTO participants (source, source_participant_id, name, birth_date, nationality)
         VALUES (?1, ?2, ?3, ?4, ?5)
         ON CONFLICT (source, source_participant_id) DO UPDATE SET
             name        = excluded.name,
             birth_date  = COALESCE(excluded.birth_date, participants.birth_date),
             nationality = COALESCE(excluded.nationality, participants.nationality)
         RETURNING id",
        params![
            participant.source,
            participant.source_participant_id,
            participant.name.trim(),
            birth_date,
            participant.nationality,
        ],
        |row| row.get(0),
    )?;
    Ok(id)
}

/// Upsert both sides, then the event itself
pub fn upsert_event(conn: &Connection, event: &EventDescriptor) -> Result<i64> {
    if !event.has_distinct_sides() {
        return Err(StoreError::Invariant(format!(
            "event {} has the same team on both sides",
            event.natural_key()
        )));
    }

    let home_id = upsert_team(conn, &event.home)?;
    let away_id = upsert_team(conn, &event.away)?;

    let id = conn.query_row(
        "INSERT INTO events
             (source, source_event_id, date, season, competition, home_team_id, away_team_id)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
         ON CONFLICT (source, source_event_id) DO UPDATE SET
             date         = excluded.date,
             season       = COALESCE(excluded.season, events.season),
             competition  = COALESCE(excluded.competition, events.competition),
             home_team_id = excluded.home_team_id,
             away_team_id = excluded.away_team_id
         RETURNING id",
        params![
            event.source,
            event.source_event_id,
            event.date.to_string(),
            event.season,
            event.competition,
            home_id,
            away_id,
        ],
        |row| row.get(0),
    )?;
    Ok(id)
}

/// Home and away team ids of a stored event
pub fn event_sides(conn: &Connection, event_id: i64) -> Result<(i64, i64)> {
    let sides = conn.query_row(
        "SELECT home_team_id, away_team_id FROM events WHERE id = ?1",
        params![event_id],
        |row| Ok((row.get(0)?, row.get(1)?)),
    )?;
    Ok(sides)
}

/// Upsert participant and team, then the appearance row
///
/// Re-ingestion overwrites team, starter flag, minutes and position.
pub fn upsert_participation(
    conn: &Connection,
    event_id: i64,
    participation: &ParticipationDescriptor,
) -> Result<i64> {
    let (home_id, away_id) = event_sides(conn, event_id)?;

    // Both sides already exist, so an unknown team cannot be a member
    let known: Option<i64> = conn
        .query_row(
            "SELECT id FROM teams WHERE source = ?1 AND source_team_id = ?2",
            params![participation.team.source, participation.team.source_team_id],
            |row| row.get(0),
        )
        .optional()?;
    match known {
        Some(id) if id == home_id || id == away_id => {}
        _ => {
            return Err(StoreError::Invariant(format!(
                "team {} did not play in event {}",
                participation.team.natural_key(),
                event_id
            )));
        }
    }

    let participant_id = upsert_participant(conn, &participation.participant)?;
    let team_id = upsert_team(conn, &participation.team)?;

    let id = conn.query_row(
        "INSERT INTO participations
             (event_id, participant_id, team_id, is_starter, minutes, position)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6)
         ON CONFLICT (event_id, participant_id) DO UPDATE SET
             team_id    = excluded.team_id,
             is_starter = excluded.is_starter,
             minutes    = excluded.minutes,
             position   = excluded.position
         RETURNING id",
        params![
            event_id,
            participant_id,
            team_id,
            participation.is_starter,
            participation.minutes,
            participation.position,
        ],
        |row| row.get(0),
    )?;
    Ok(id)
}

/// Write one event and its full participation set
///
/// Parents go first: both teams, then the event, then each participant
/// and its appearance. Participations violating an invariant (empty
/// name, team not on either side) are skipped and counted; the rest of
/// the event is still written.
pub fn write_event(
    conn: &Connection,
    event: &EventDescriptor,
    participations: &[ParticipationDescriptor],
) -> Result<EventWriteReport> {
    let event_id = upsert_event(conn, event)?;

    let mut report = EventWriteReport {
        event_id,
        participations_written: 0,
        participations_skipped: 0,
    };

    for participation in participations {
        match upsert_participation(conn, event_id, participation) {
            Ok(_) => report.participations_written += 1,
            Err(StoreError::Invariant(reason)) => {
                warn!(
                    event = %event.natural_key(),
                    participant = %participation.participant.natural_key(),
                    reason = %reason,
                    "Skipping participation"
                );
                report.participations_skipped += 1;
            }
            Err(e) => return Err(e),
        }
    }

    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::schema::{PRAGMAS, SCHEMA};
    use chrono::NaiveDate;

    fn conn() -> Connection {
        let conn = Connection::open_in_memory().unwrap();
        conn.execute_batch(PRAGMAS).unwrap();
        conn.execute_batch(SCHEMA).unwrap();
        conn
    }

    fn event() -> EventDescriptor {
        EventDescriptor {
            source: "test".to_string(),
            source_event_id: "m1".to_string(),
            date: NaiveDate::from_ymd_opt(2021, 6, 11).unwrap(),
            season: Some("2021".to_string()),
            competition: None,
            home: TeamDescriptor::new("test", "ita", "Italy"),
            away: TeamDescriptor::new("test", "tur", "Turkey"),
        }
    }

    fn count(conn: &Connection, table: &str) -> i64 {
        conn.query_row(&format!("SELECT COUNT(*) FROM {}", table), [], |r| r.get(0))
            .unwrap()
    }

    #[test]
    fn test_team_upsert_merges_on_natural_key() {
        let conn = conn();
        let first = upsert_team(&conn, &TeamDescriptor::new("test", "ita", "Italy")).unwrap();
        let second = upsert_team(
            &conn,
            &TeamDescriptor::new("test", "ita", "Italia").with_country("Italy"),
        )
        .unwrap();
        let third = upsert_team(&conn, &TeamDescriptor::new("test", "ita", "Italia")).unwrap();

        assert_eq!(first, second);
        assert_eq!(second, third);
        assert_eq!(count(&conn, "teams"), 1);

        let (name, country): (String, Option<String>) = conn
            .query_row("SELECT name, country FROM teams", [], |r| Ok((r.get(0)?, r.get(1)?)))
            .unwrap();
        assert_eq!(name, "Italia");
        // A later NULL never erases a known value
        assert_eq!(country.as_deref(), Some("Italy"));
    }

    #[test]
    fn test_empty_name_is_rejected() {
        let conn = conn();
        let err = upsert_team(&conn, &TeamDescriptor::new("test", "x", "  ")).unwrap_err();
        assert!(matches!(err, StoreError::Invariant(_)));
    }

    #[test]
    fn test_same_sides_rejected() {
        let conn = conn();
        let mut e = event();
        e.away = e.home.clone();
        assert!(matches!(upsert_event(&conn, &e), Err(StoreError::Invariant(_))));
        assert_eq!(count(&conn, "events"), 0);
    }

    #[test]
    fn test_write_event_skips_foreign_team() {
        let conn = conn();
        let e = event();
        let parts = vec![
            ParticipationDescriptor::new(
                ParticipantDescriptor::new("test", "p1", "Gianluigi Donnarumma"),
                e.home.clone(),
                true,
            )
            .with_minutes(90),
            ParticipationDescriptor::new(
                ParticipantDescriptor::new("test", "p2", "Somebody Else"),
                TeamDescriptor::new("test", "fra", "France"),
                true,
            ),
            ParticipationDescriptor::new(ParticipantDescriptor::new("test", "p3", ""), e.away.clone(), false),
        ];

        let report = write_event(&conn, &e, &parts).unwrap();
        assert_eq!(report.participations_written, 1);
        assert_eq!(report.participations_skipped, 2);
        assert_eq!(count(&conn, "participations"), 1);
    }

    #[test]
    fn test_rewrite_is_idempotent_and_overwrites_appearance() {
        let conn = conn();
        let e = event();
        let player = ParticipantDescriptor::new("test", "p1", "Federico Chiesa");

        let first = vec![ParticipationDescriptor::new(player.clone(), e.home.clone(), false)
            .with_minutes(29)];
        let second = vec![ParticipationDescriptor::new(player, e.home.clone(), true)
            .with_minutes(90)
            .with_position("Right Wing")];

        let a = write_event(&conn, &e, &first).unwrap();
        let b = write_event(&conn, &e, &second).unwrap();
        assert_eq!(a.event_id, b.event_id);
        assert_eq!(count(&conn, "events"), 1);
        assert_eq!(count(&conn, "participations"), 1);

        let (starter, minutes, position): (bool, Option<u32>, Option<String>) = conn
            .query_row(
                "SELECT is_starter, minutes, position FROM participations",
                [],
                |r| Ok((r.get(0)?, r.get(1)?, r.get(2)?)),
            )
            .unwrap();
        assert!(starter);
        assert_eq!(minutes, Some(90));
        assert_eq!(position.as_deref(), Some("Right Wing"));
    }
}
