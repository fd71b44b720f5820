//! Graph Engine Integration Tests
//!
//! Edge weights, canonical pair ordering, filter behavior, node
//! attributes and the DGS export, all against an on-disk store.

use std::collections::HashMap;
use std::time::Duration;

use chrono::NaiveDate;
use squadgraph::domain::{
    EventDescriptor, ParticipantDescriptor, ParticipationDescriptor, TeamDescriptor,
};
use squadgraph::graph::{dgs, Edge, FilterSpec, GraphEngine, GraphError};
use squadgraph::store::Store;
use tempfile::TempDir;

fn team(id: &str, name: &str) -> TeamDescriptor {
    TeamDescriptor::new("test", id, name)
}

fn player(id: &str) -> ParticipantDescriptor {
    ParticipantDescriptor::new("test", id, format!("Player {}", id.to_uppercase()))
}

fn event(id: &str, day: u32, home: &TeamDescriptor, away: &TeamDescriptor) -> EventDescriptor {
    EventDescriptor {
        source: "test".to_string(),
        source_event_id: id.to_string(),
        date: NaiveDate::from_ymd_opt(2021, 6, day).unwrap(),
        season: Some("2021".to_string()),
        competition: Some("Cup".to_string()),
        home: home.clone(),
        away: away.clone(),
    }
}

struct Fixture {
    _dir: TempDir,
    store: Store,
    engine: GraphEngine,
    ids: HashMap<String, i64>,
}

impl Fixture {
    /// E1, E2: p1, p2, p3 for team one. E3: p1 for team one, p4 for team three.
    async fn scenario() -> Self {
        let dir = TempDir::new().unwrap();
        let store = Store::open(dir.path().join("graph.sqlite3"), Duration::from_secs(5))
            .await
            .unwrap();

        let one = team("t1", "Team One");
        let two = team("t2", "Team Two");
        let three = team("t3", "Team Three");

        let lineup = |positions: [Option<&str>; 3], minutes: [u32; 3]| {
            ["p1", "p2", "p3"]
                .iter()
                .zip(positions)
                .zip(minutes)
                .map(|((id, pos), min)| {
                    let p = ParticipationDescriptor::new(player(id), one.clone(), min >= 60)
                        .with_minutes(min);
                    match pos {
                        Some(pos) => p.with_position(pos),
                        None => p,
                    }
                })
                .collect::<Vec<_>>()
        };

        store
            .write_event(
                &event("e1", 1, &one, &two),
                lineup([Some("Goalkeeper"), Some("Defender"), None], [90, 90, 30]),
            )
            .await
            .unwrap();
        store
            .write_event(
                &event("e2", 5, &two, &one),
                lineup([None, Some("Midfielder"), None], [90, 70, 90]),
            )
            .await
            .unwrap();
        store
            .write_event(
                &event("e3", 10, &one, &three),
                vec![
                    ParticipationDescriptor::new(player("p1"), one.clone(), true).with_minutes(90),
                    ParticipationDescriptor::new(
                        player("p4").with_nationality("Wales"),
                        three.clone(),
                        false,
                    )
                    .with_minutes(20),
                ],
            )
            .await
            .unwrap();

        let conn = rusqlite::Connection::open(store.path()).unwrap();
        let mut stmt = conn
            .prepare("SELECT source_participant_id, id FROM participants")
            .unwrap();
        let ids = stmt
            .query_map([], |r| Ok((r.get::<_, String>(0)?, r.get::<_, i64>(1)?)))
            .unwrap()
            .map(Result::unwrap)
            .collect();

        let engine = GraphEngine::new(store.clone());
        Self {
            _dir: dir,
            store,
            engine,
            ids,
        }
    }

    fn edge(&self, a: &str, b: &str, weight: u64) -> Edge {
        let (x, y) = (self.ids[a], self.ids[b]);
        Edge {
            a: x.min(y),
            b: x.max(y),
            weight,
        }
    }

    fn event_id(&self, source_event_id: &str) -> i64 {
        let conn = rusqlite::Connection::open(self.store.path()).unwrap();
        conn.query_row(
            "SELECT id FROM events WHERE source_event_id = ?1",
            [source_event_id],
            |r| r.get(0),
        )
        .unwrap()
    }

    async fn edges(&self, filter: FilterSpec) -> Vec<Edge> {
        self.engine.compute_edges(&filter).await.unwrap()
    }
}

fn sorted(mut edges: Vec<Edge>) -> Vec<Edge> {
    edges.sort();
    edges
}

#[tokio::test]
async fn test_weights_match_shared_events() {
    let fx = Fixture::scenario().await;

    let heavy = fx
        .edges(FilterSpec {
            min_weight: 2,
            ..Default::default()
        })
        .await;
    assert_eq!(
        heavy,
        sorted(vec![
            fx.edge("p1", "p2", 2),
            fx.edge("p1", "p3", 2),
            fx.edge("p2", "p3", 2),
        ])
    );

    let all = fx.edges(FilterSpec::default()).await;
    assert_eq!(
        all,
        sorted(vec![
            fx.edge("p1", "p2", 2),
            fx.edge("p1", "p3", 2),
            fx.edge("p2", "p3", 2),
            fx.edge("p1", "p4", 1),
        ])
    );
}

#[tokio::test]
async fn test_pairs_are_canonical_and_unique() {
    let fx = Fixture::scenario().await;
    let edges = fx.edges(FilterSpec::default()).await;

    let mut seen = std::collections::HashSet::new();
    for e in &edges {
        assert!(e.a < e.b, "pair {:?} not canonical", e);
        assert!(seen.insert((e.a, e.b)), "pair {:?} emitted twice", e);
        assert!(!seen.contains(&(e.b, e.a)));
    }
}

#[tokio::test]
async fn test_same_team_only_drops_opponents() {
    let fx = Fixture::scenario().await;
    let edges = fx
        .edges(FilterSpec {
            same_team_only: true,
            ..Default::default()
        })
        .await;

    assert!(!edges.contains(&fx.edge("p1", "p4", 1)));
    assert_eq!(edges.len(), 3);
}

#[tokio::test]
async fn test_tightening_filters_never_adds_edges() {
    let fx = Fixture::scenario().await;
    let base = fx.edges(FilterSpec::default()).await;

    let tighter = [
        FilterSpec { min_minutes: Some(60), ..Default::default() },
        FilterSpec { min_minutes: Some(91), ..Default::default() },
        FilterSpec { starters_only: true, ..Default::default() },
        FilterSpec { min_weight: 2, ..Default::default() },
        FilterSpec { min_weight: 3, ..Default::default() },
    ];

    for filter in tighter {
        let edges = fx.edges(filter.clone()).await;
        for e in &edges {
            let loose = base
                .iter()
                .find(|b| (b.a, b.b) == (e.a, e.b))
                .unwrap_or_else(|| panic!("{:?} added edge {:?}", filter, e));
            assert!(e.weight <= loose.weight);
        }
    }

    // p3 played only 30 minutes in e1, so its pairs drop to one shared event
    let sixty = fx
        .edges(FilterSpec {
            min_minutes: Some(60),
            ..Default::default()
        })
        .await;
    assert!(sixty.contains(&fx.edge("p1", "p3", 1)));
    assert!(sixty.contains(&fx.edge("p1", "p2", 2)));
    assert!(!sixty.iter().any(|e| e.b == fx.ids["p4"] || e.a == fx.ids["p4"]));
}

#[tokio::test]
async fn test_attribute_filters() {
    let fx = Fixture::scenario().await;

    let welsh = fx
        .edges(FilterSpec {
            nationalities: Some(vec!["Wales".to_string()]),
            ..Default::default()
        })
        .await;
    // Only one Welsh player, so no pair qualifies
    assert!(welsh.is_empty());

    let named = fx
        .edges(FilterSpec {
            name_query: Some("player p".to_string()),
            event_ids: None,
            competitions: Some(vec!["Cup".to_string()]),
            ..Default::default()
        })
        .await;
    assert_eq!(named.len(), 4);

    let no_match = fx
        .edges(FilterSpec {
            competitions: Some(vec!["League".to_string()]),
            ..Default::default()
        })
        .await;
    assert!(no_match.is_empty());
}

#[tokio::test]
async fn test_position_filter_applies_per_appearance() {
    let fx = Fixture::scenario().await;

    // Only p2 is listed as a midfielder, and only in e2
    let midfield = fx
        .edges(FilterSpec {
            positions: Some(vec!["Midfielder".to_string()]),
            ..Default::default()
        })
        .await;
    assert!(midfield.is_empty());

    let back_line = fx
        .edges(FilterSpec {
            positions: Some(vec!["Goalkeeper".to_string(), "Defender".to_string()]),
            ..Default::default()
        })
        .await;
    assert_eq!(back_line, vec![fx.edge("p1", "p2", 1)]);
}

#[tokio::test]
async fn test_event_id_filter() {
    let fx = Fixture::scenario().await;
    let (e1, e3) = (fx.event_id("e1"), fx.event_id("e3"));

    let only_e3 = fx
        .edges(FilterSpec {
            event_ids: Some(vec![e3]),
            ..Default::default()
        })
        .await;
    assert_eq!(only_e3, vec![fx.edge("p1", "p4", 1)]);

    let e1_and_e3 = fx
        .edges(FilterSpec {
            event_ids: Some(vec![e1, e3]),
            ..Default::default()
        })
        .await;
    assert_eq!(
        e1_and_e3,
        sorted(vec![
            fx.edge("p1", "p2", 1),
            fx.edge("p1", "p3", 1),
            fx.edge("p2", "p3", 1),
            fx.edge("p1", "p4", 1),
        ])
    );
}

#[tokio::test]
async fn test_invalid_filter_is_rejected() {
    let fx = Fixture::scenario().await;
    let err = fx
        .engine
        .compute_edges(&FilterSpec {
            event_ids: Some(vec![]),
            ..Default::default()
        })
        .await
        .unwrap_err();
    assert!(matches!(err, GraphError::InvalidFilter(_)));
}

#[tokio::test]
async fn test_snapshot_node_attributes() {
    let fx = Fixture::scenario().await;
    let snapshot = fx.engine.snapshot(&FilterSpec::default()).await.unwrap();

    assert_eq!(snapshot.nodes.len(), 4);
    let by_id: HashMap<i64, _> = snapshot.nodes.iter().map(|n| (n.id, n)).collect();

    let p1 = by_id[&fx.ids["p1"]];
    assert_eq!(p1.label, "Player P1");
    assert_eq!(p1.team.as_deref(), Some("Team One"));
    // Most recent known position survives later appearances without one
    assert_eq!(p1.position.as_deref(), Some("Goalkeeper"));

    let p2 = by_id[&fx.ids["p2"]];
    assert_eq!(p2.position.as_deref(), Some("Midfielder"));

    let p4 = by_id[&fx.ids["p4"]];
    assert_eq!(p4.team.as_deref(), Some("Team Three"));
    assert_eq!(p4.nationality.as_deref(), Some("Wales"));
    assert_eq!(p4.birth_date, None);
}

#[tokio::test]
async fn test_dgs_export_file() {
    let fx = Fixture::scenario().await;
    let snapshot = fx
        .engine
        .snapshot(&FilterSpec {
            min_weight: 2,
            ..Default::default()
        })
        .await
        .unwrap();

    let out = fx._dir.path().join("export").join("players.dgs");
    dgs::export_to_path(&out, "players", &snapshot).unwrap();
    let text = std::fs::read_to_string(&out).unwrap();
    let lines: Vec<&str> = text.lines().collect();

    let (p1, p2) = (fx.ids["p1"], fx.ids["p2"]);
    assert_eq!(lines[0], "DGS004");
    assert_eq!(lines[1], "players 0 0");
    assert_eq!(lines.len(), 2 + 3 + 3);
    assert_eq!(
        lines[2],
        format!(
            r#"an "p{}" label:"Player P1" team:"Team One" nationality:"" position:"Goalkeeper" birth_date:"""#,
            p1
        )
    );
    assert!(lines.contains(&format!(r#"ae "e_p{p1}_p{p2}" "p{p1}" "p{p2}" weight:2"#).as_str()));

    // The store is untouched by graph reads
    assert_eq!(fx.store.stats().await.unwrap().participations, 8);
}
