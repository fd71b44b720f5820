//! Edge computation and node attribute lookup.

use std::collections::BTreeSet;

use rusqlite::{params, params_from_iter, Connection};
use serde::Serialize;
use tracing::{debug, instrument};

use super::{FilterSpec, GraphError};
use crate::store::{Store, StoreError};

/// Unordered participant pair, stored with `a < b`
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub struct Edge {
    pub a: i64,
    pub b: i64,
    /// Number of qualifying shared events
    pub weight: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NodeAttributes {
    pub id: i64,
    pub label: String,
    /// Team of the most recent participation
    pub team: Option<String>,
    pub nationality: Option<String>,
    /// Most recent known position
    pub position: Option<String>,
    pub birth_date: Option<String>,
}

/// Edges plus attributes of every endpoint, read from one snapshot
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct GraphSnapshot {
    pub edges: Vec<Edge>,
    pub nodes: Vec<NodeAttributes>,
}

const NODE_SQL: &str = "
SELECT p.id, p.name, p.nationality, p.birth_date,
       (SELECT t.name
          FROM participations pa
          JOIN events e ON e.id = pa.event_id
          JOIN teams t  ON t.id = pa.team_id
         WHERE pa.participant_id = p.id
         ORDER BY e.date DESC, e.id DESC
         LIMIT 1),
       (SELECT pa.position
          FROM participations pa
          JOIN events e ON e.id = pa.event_id
         WHERE pa.participant_id = p.id AND pa.position IS NOT NULL
         ORDER BY e.date DESC, e.id DESC
         LIMIT 1)
  FROM participants p
 WHERE p.id = ?1";

fn query_edges(conn: &Connection, filter: &FilterSpec) -> Result<Vec<Edge>, StoreError> {
    let (sql, values) = filter.to_sql();
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt.query_map(params_from_iter(values), |row| {
        Ok(Edge {
            a: row.get(0)?,
            b: row.get(1)?,
            weight: row.get::<_, i64>(2)?.max(0) as u64,
        })
    })?;
    Ok(rows.collect::<Result<Vec<_>, _>>()?)
}

fn query_nodes(conn: &Connection, ids: &BTreeSet<i64>) -> Result<Vec<NodeAttributes>, StoreError> {
    let mut stmt = conn.prepare(NODE_SQL)?;
    let mut nodes = Vec::with_capacity(ids.len());
    for id in ids {
        let node = stmt.query_row(params![id], |row| {
            Ok(NodeAttributes {
                id: row.get(0)?,
                label: row.get(1)?,
                nationality: row.get(2)?,
                birth_date: row.get(3)?,
                team: row.get(4)?,
                position: row.get(5)?,
            })
        })?;
        nodes.push(node);
    }
    Ok(nodes)
}

fn endpoints(edges: &[Edge]) -> BTreeSet<i64> {
    edges.iter().flat_map(|e| [e.a, e.b]).collect()
}

/// Read-only query engine over a [`Store`]
#[derive(Debug, Clone)]
pub struct GraphEngine {
    store: Store,
}

impl GraphEngine {
    pub fn new(store: Store) -> Self {
        Self { store }
    }

    /// Weighted co-occurrence edges, sorted by `(a, b)`
    #[instrument(skip(self))]
    pub async fn compute_edges(&self, filter: &FilterSpec) -> Result<Vec<Edge>, GraphError> {
        filter.validate()?;
        let filter = filter.clone();

        let edges = self.store.read(move |conn| query_edges(conn, &filter)).await?;
        debug!(edges = edges.len(), "Computed edges");
        Ok(edges)
    }

    /// Attributes of the given participants, in ascending id order
    pub async fn node_attributes(&self, ids: &[i64]) -> Result<Vec<NodeAttributes>, GraphError> {
        let ids: BTreeSet<i64> = ids.iter().copied().collect();
        Ok(self.store.read(move |conn| query_nodes(conn, &ids)).await?)
    }

    /// Edges and endpoint attributes from a single read transaction
    #[instrument(skip(self))]
    pub async fn snapshot(&self, filter: &FilterSpec) -> Result<GraphSnapshot, GraphError> {
        filter.validate()?;
        let filter = filter.clone();

        let snapshot = self
            .store
            .read(move |conn| {
                let edges = query_edges(conn, &filter)?;
                let nodes = query_nodes(conn, &endpoints(&edges))?;
                Ok(GraphSnapshot { edges, nodes })
            })
            .await?;

        debug!(
            edges = snapshot.edges.len(),
            nodes = snapshot.nodes.len(),
            "Graph snapshot"
        );
        Ok(snapshot)
    }
}
