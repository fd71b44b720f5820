//! Store Integration Tests
//!
//! Idempotent re-ingestion, attribute merging and referential integrity
//! under concurrent writers.

use std::time::Duration;

use chrono::NaiveDate;
use squadgraph::domain::{
    EventDescriptor, ParticipantDescriptor, ParticipationDescriptor, TeamDescriptor,
};
use squadgraph::store::{Store, StoreError};
use tempfile::TempDir;

async fn open(dir: &TempDir) -> Store {
    Store::open(dir.path().join("data").join("store.sqlite3"), Duration::from_secs(5))
        .await
        .unwrap()
}

fn team(id: &str) -> TeamDescriptor {
    TeamDescriptor::new("test", id, format!("Team {}", id))
}

fn event(id: &str, home: &str, away: &str) -> EventDescriptor {
    EventDescriptor {
        source: "test".to_string(),
        source_event_id: id.to_string(),
        date: NaiveDate::from_ymd_opt(2020, 3, 1).unwrap(),
        season: None,
        competition: Some("League".to_string()),
        home: team(home),
        away: team(away),
    }
}

fn lineup(side: &str, players: &[&str]) -> Vec<ParticipationDescriptor> {
    players
        .iter()
        .enumerate()
        .map(|(i, p)| {
            ParticipationDescriptor::new(
                ParticipantDescriptor::new("test", *p, format!("Player {}", p)),
                team(side),
                i < 2,
            )
            .with_minutes(90)
        })
        .collect()
}

#[tokio::test]
async fn test_reingestion_is_idempotent() {
    let dir = TempDir::new().unwrap();
    let store = open(&dir).await;

    let e = event("m1", "a", "b");
    let mut parts = lineup("a", &["p1", "p2", "p3"]);
    parts.extend(lineup("b", &["p4", "p5"]));

    let first = store.write_event(&e, parts.clone()).await.unwrap();
    let second = store.write_event(&e, parts).await.unwrap();

    assert_eq!(first.event_id, second.event_id);
    assert_eq!(first.participations_written, 5);

    let stats = store.stats().await.unwrap();
    assert_eq!(stats.events, 1);
    assert_eq!(stats.teams, 2);
    assert_eq!(stats.participants, 5);
    assert_eq!(stats.participations, 5);
    assert_eq!(stats.participations_with_minutes, 5);
}

#[tokio::test]
async fn test_later_sightings_refine_attributes() {
    let dir = TempDir::new().unwrap();
    let store = open(&dir).await;

    let bare = ParticipantDescriptor::new("test", "p1", "J. Bloggs");
    let rich = ParticipantDescriptor::new("test", "p1", "Joe Bloggs")
        .with_nationality("England")
        .with_birth_date(NaiveDate::from_ymd_opt(1990, 1, 2).unwrap());

    let a = store.upsert_participant(&bare).await.unwrap();
    let b = store.upsert_participant(&rich).await.unwrap();
    let c = store.upsert_participant(&bare).await.unwrap();
    assert_eq!(a, b);
    assert_eq!(b, c);

    let conn = rusqlite::Connection::open(store.path()).unwrap();
    let (name, nationality, birth): (String, Option<String>, Option<String>) = conn
        .query_row(
            "SELECT name, nationality, birth_date FROM participants WHERE id = ?1",
            [a],
            |r| Ok((r.get(0)?, r.get(1)?, r.get(2)?)),
        )
        .unwrap();
    assert_eq!(name, "J. Bloggs");
    assert_eq!(nationality.as_deref(), Some("England"));
    assert_eq!(birth.as_deref(), Some("1990-01-02"));
}

#[tokio::test]
async fn test_individual_upserts_respect_membership() {
    let dir = TempDir::new().unwrap();
    let store = open(&dir).await;

    let e = event("m1", "a", "b");
    let event_id = store.upsert_event(&e).await.unwrap();
    assert_eq!(store.upsert_event(&e).await.unwrap(), event_id);
    store.upsert_team(&team("a")).await.unwrap();
    assert_eq!(store.stats().await.unwrap().teams, 2);

    let home = &lineup("a", &["p1"])[0];
    store.upsert_participation(event_id, home).await.unwrap();

    let outsider = &lineup("z", &["p9"])[0];
    let err = store.upsert_participation(event_id, outsider).await.unwrap_err();
    assert!(matches!(err, StoreError::Invariant(_)));

    let stats = store.stats().await.unwrap();
    assert_eq!(stats.participations, 1);
    assert_eq!(stats.teams, 2);
}

#[tokio::test]
async fn test_same_sides_event_is_rejected() {
    let dir = TempDir::new().unwrap();
    let store = open(&dir).await;

    let err = store
        .write_event(&event("m1", "a", "a"), lineup("a", &["p1"]))
        .await
        .unwrap_err();
    assert!(matches!(err, StoreError::Invariant(_)));
    assert_eq!(store.stats().await.unwrap().events, 0);
}

#[tokio::test]
async fn test_concurrent_writers_keep_integrity() {
    let dir = TempDir::new().unwrap();
    let store = open(&dir).await;

    // Squads overlap across events so writers race on the same parents
    let mut tasks = tokio::task::JoinSet::new();
    for i in 0..24 {
        let store = store.clone();
        tasks.spawn(async move {
            let home = format!("club{}", i % 4);
            let away = format!("club{}", (i + 1) % 4);
            let e = event(&format!("m{}", i), &home, &away);
            let (home_gk, away_gk) = (format!("{}-gk", home), format!("{}-gk", away));
            let mut parts = lineup(&home, &[home_gk.as_str(), "shared-1", "shared-2"]);
            parts.extend(lineup(&away, &[away_gk.as_str()]));
            store.write_event(&e, parts).await.unwrap()
        });
    }

    // A second coordinator on another file never waits on this one's lock
    let other_dir = TempDir::new().unwrap();
    let other = open(&other_dir).await;
    other
        .write_event(&event("x", "a", "b"), lineup("a", &["p1"]))
        .await
        .unwrap();

    while let Some(joined) = tasks.join_next().await {
        joined.unwrap();
    }

    let stats = store.stats().await.unwrap();
    assert_eq!(stats.events, 24);
    assert_eq!(stats.teams, 4);
    // 4 keepers + 2 shared players
    assert_eq!(stats.participants, 6);
    assert_eq!(stats.participations, 24 * 4);
    assert_eq!(stats.orphaned_participations, 0);

    let conn = rusqlite::Connection::open(store.path()).unwrap();
    let mut check = conn.prepare("PRAGMA foreign_key_check").unwrap();
    let violations = check.query_map([], |_| Ok(())).unwrap().count();
    assert_eq!(violations, 0);
}
