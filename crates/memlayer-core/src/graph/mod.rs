//! Graph expansion over canonical memory.
//!
//! [`GraphAccelerator`] projects L2 nodes and edges into FalkorDB and
//! answers variable-length traversals. It is a cache over the
//! authoritative `memory_l2_edges` table: construction pings the
//! server, and on any failure the accelerator is disabled, every method
//! degrades to `false`/`None`, and [`expand_memory`] walks the
//! relational edges instead. Correctness never depends on it.

use std::collections::BTreeSet;

use rusqlite::Connection;

use crate::error::Result;
use crate::model::{Scope, View};
use crate::retrieval::{self, PathTriple, SearchResponse};

#[cfg(feature = "graph-accelerator")]
use std::sync::Mutex;

/// Environment switch that forces the accelerator off; used to
/// fault-inject the relational fallback.
pub const GRAPH_DISABLED_ENV: &str = "MEMLAYER_GRAPH_DISABLED";

/// Server address override; defaults to a local FalkorDB.
pub const GRAPH_URL_ENV: &str = "MEMLAYER_GRAPH_URL";

#[cfg(feature = "graph-accelerator")]
const DEFAULT_GRAPH_URL: &str = "redis://127.0.0.1:6379";

#[cfg(feature = "graph-accelerator")]
const GRAPH_NAME: &str = "memlayer";

/// Neighborhood returned by an accelerated traversal
#[derive(Debug, Clone)]
pub struct GraphExpansion {
    pub nodes: Vec<String>,
    pub edges: Vec<PathTriple>,
}

/// Reduce a relation label to the alphanumeric+underscore form safe to
/// splice into a Cypher relationship type.
pub fn sanitize_rel_label(rel: &str) -> String {
    rel.chars()
        .filter(|c| c.is_ascii_alphanumeric() || *c == '_')
        .collect()
}

/// Best-effort FalkorDB adapter.
pub struct GraphAccelerator {
    #[cfg(feature = "graph-accelerator")]
    conn: Option<Mutex<redis::Connection>>,
}

impl GraphAccelerator {
    /// An accelerator that answers nothing; the relational fallback
    /// carries all traffic.
    pub fn disabled() -> Self {
        Self {
            #[cfg(feature = "graph-accelerator")]
            conn: None,
        }
    }

    /// Connect and ping. Any failure, the `MEMLAYER_GRAPH_DISABLED`
    /// switch, or a build without the feature yields a disabled
    /// accelerator.
    #[cfg(feature = "graph-accelerator")]
    pub fn connect() -> Self {
        if std::env::var(GRAPH_DISABLED_ENV)
            .map(|v| v == "1" || v.eq_ignore_ascii_case("true"))
            .unwrap_or(false)
        {
            tracing::debug!("graph accelerator disabled via {}", GRAPH_DISABLED_ENV);
            return Self::disabled();
        }

        let url = std::env::var(GRAPH_URL_ENV).unwrap_or_else(|_| DEFAULT_GRAPH_URL.to_string());
        match Self::try_connect(&url) {
            Ok(conn) => Self {
                conn: Some(Mutex::new(conn)),
            },
            Err(e) => {
                tracing::debug!("graph accelerator disabled: {}", e);
                Self::disabled()
            }
        }
    }

    #[cfg(not(feature = "graph-accelerator"))]
    pub fn connect() -> Self {
        Self::disabled()
    }

    #[cfg(feature = "graph-accelerator")]
    fn try_connect(url: &str) -> redis::RedisResult<redis::Connection> {
        let client = redis::Client::open(url)?;
        let mut conn =
            client.get_connection_with_timeout(std::time::Duration::from_millis(500))?;
        redis::cmd("PING").query::<String>(&mut conn)?;
        Ok(conn)
    }

    pub fn is_enabled(&self) -> bool {
        #[cfg(feature = "graph-accelerator")]
        {
            self.conn.is_some()
        }
        #[cfg(not(feature = "graph-accelerator"))]
        {
            false
        }
    }

    /// Project an L2 node. Returns whether the write reached the graph.
    pub fn upsert_node(
        &self,
        id: &str,
        node_type: &str,
        title: &str,
        tags: &[String],
        confidence: f64,
    ) -> bool {
        #[cfg(feature = "graph-accelerator")]
        {
            let Some(lock) = &self.conn else { return false };
            let tags_json = serde_json::to_string(tags).unwrap_or_else(|_| "[]".to_string());
            let query = format!(
                "MERGE (n:L2Node {{id: '{}'}}) SET n.type = '{}', n.title = '{}', n.tags = '{}', n.confidence = {}",
                escape(id),
                escape(node_type),
                escape(title),
                escape(&tags_json),
                confidence,
            );
            match self.run_query(lock, &query) {
                Ok(_) => true,
                Err(e) => {
                    tracing::error!("graph upsert_node failed: {}", e);
                    false
                }
            }
        }
        #[cfg(not(feature = "graph-accelerator"))]
        {
            let _ = (id, node_type, title, tags, confidence);
            false
        }
    }

    /// Project an L2 edge between two already-projected nodes.
    pub fn upsert_edge(&self, from_id: &str, to_id: &str, rel: &str, weight: f64) -> bool {
        #[cfg(feature = "graph-accelerator")]
        {
            let Some(lock) = &self.conn else { return false };
            let safe_rel = sanitize_rel_label(rel);
            if safe_rel.is_empty() {
                return false;
            }
            let query = format!(
                "MATCH (a:L2Node {{id: '{}'}}), (b:L2Node {{id: '{}'}}) MERGE (a)-[r:{}]->(b) SET r.weight = {}",
                escape(from_id),
                escape(to_id),
                safe_rel,
                weight,
            );
            match self.run_query(lock, &query) {
                Ok(_) => true,
                Err(e) => {
                    tracing::error!("graph upsert_edge failed: {}", e);
                    false
                }
            }
        }
        #[cfg(not(feature = "graph-accelerator"))]
        {
            let _ = (from_id, to_id, rel, weight);
            false
        }
    }

    /// Variable-length traversal from a seed node. `None` means the
    /// accelerator cannot answer and the caller must fall back.
    pub fn expand(&self, seed_id: &str, hops: u32) -> Option<GraphExpansion> {
        #[cfg(feature = "graph-accelerator")]
        {
            let lock = self.conn.as_ref()?;
            let hops = hops.max(1);
            let seed = escape(seed_id);

            let nodes_query = format!(
                "MATCH (n:L2Node {{id: '{seed}'}})-[*1..{hops}]->(m) RETURN DISTINCT m.id"
            );
            let edges_query = format!(
                "MATCH p = (n:L2Node {{id: '{seed}'}})-[*1..{hops}]->(m) \
                 UNWIND relationships(p) AS r \
                 RETURN DISTINCT startNode(r).id, type(r), endNode(r).id"
            );

            let node_rows = match self.run_query(lock, &nodes_query) {
                Ok(reply) => result_rows(&reply)?,
                Err(e) => {
                    tracing::error!("graph expand failed: {}", e);
                    return None;
                }
            };
            let edge_rows = match self.run_query(lock, &edges_query) {
                Ok(reply) => result_rows(&reply)?,
                Err(e) => {
                    tracing::error!("graph expand failed: {}", e);
                    return None;
                }
            };

            let mut nodes = Vec::new();
            for row in &node_rows {
                if let Some(id) = row.first().and_then(cell_str) {
                    if id != seed_id {
                        nodes.push(id);
                    }
                }
            }

            let mut edges = Vec::new();
            for row in &edge_rows {
                let (Some(from), Some(rel), Some(to)) = (
                    row.first().and_then(cell_str),
                    row.get(1).and_then(cell_str),
                    row.get(2).and_then(cell_str),
                ) else {
                    continue;
                };
                edges.push(PathTriple { from, rel, to });
            }

            Some(GraphExpansion { nodes, edges })
        }
        #[cfg(not(feature = "graph-accelerator"))]
        {
            let _ = (seed_id, hops);
            None
        }
    }

    #[cfg(feature = "graph-accelerator")]
    fn run_query(
        &self,
        lock: &Mutex<redis::Connection>,
        query: &str,
    ) -> redis::RedisResult<redis::Value> {
        let mut conn = lock.lock().map_err(|_| {
            redis::RedisError::from((redis::ErrorKind::ClientError, "graph connection poisoned"))
        })?;
        redis::cmd("GRAPH.QUERY")
            .arg(GRAPH_NAME)
            .arg(query)
            .query(&mut *conn)
    }
}

#[cfg(feature = "graph-accelerator")]
fn escape(s: &str) -> String {
    s.replace('\\', "\\\\").replace('\'', "\\'")
}

/// GRAPH.QUERY replies as `[header, rows, stats]`; pull out the rows.
#[cfg(feature = "graph-accelerator")]
fn result_rows(reply: &redis::Value) -> Option<Vec<Vec<redis::Value>>> {
    let redis::Value::Bulk(parts) = reply else { return None };
    let redis::Value::Bulk(rows) = parts.get(1)? else { return None };
    Some(
        rows.iter()
            .filter_map(|row| match row {
                redis::Value::Bulk(cells) => Some(cells.clone()),
                _ => None,
            })
            .collect(),
    )
}

#[cfg(feature = "graph-accelerator")]
fn cell_str(value: &redis::Value) -> Option<String> {
    match value {
        redis::Value::Data(bytes) => Some(String::from_utf8_lossy(bytes).into_owned()),
        redis::Value::Status(s) => Some(s.clone()),
        _ => None,
    }
}

// ============================================================================
// EXPANSION
// ============================================================================

/// Expand the relation neighborhood of a seed L2 node.
///
/// The accelerator is consulted first; a `None` answer (disabled,
/// unreachable, or a query error) falls back to walking the relational
/// edge table hop by hop. The seed is excluded from later frontiers to
/// prevent trivial cycles. Node details always come from the primary
/// store, packaged with the same view/budget logic as search.
pub fn expand_memory(
    conn: &Connection,
    graph: &GraphAccelerator,
    scope: &Scope,
    seed_id: &str,
    hops: u32,
    view: View,
    budget: i64,
) -> Result<SearchResponse> {
    scope.validate()?;

    let mut node_ids: BTreeSet<String> = BTreeSet::new();
    let mut paths: Vec<PathTriple> = Vec::new();

    match graph.expand(seed_id, hops) {
        Some(expansion) => {
            for id in expansion.nodes {
                if id != seed_id {
                    node_ids.insert(id);
                }
            }
            paths = expansion.edges;
        }
        None => {
            let mut frontier: Vec<String> = vec![seed_id.to_string()];
            for _ in 0..hops.max(1) {
                if frontier.is_empty() {
                    break;
                }
                let placeholders = vec!["?"; frontier.len()].join(",");
                let sql = format!(
                    "SELECT from_id, rel, to_id FROM memory_l2_edges
                     WHERE tenant_id = ? AND workspace_id = ? AND from_id IN ({placeholders})"
                );
                let mut stmt = conn.prepare(&sql)?;

                let mut sql_params: Vec<&str> = vec![&scope.tenant_id, &scope.workspace_id];
                sql_params.extend(frontier.iter().map(String::as_str));

                let edges = stmt
                    .query_map(rusqlite::params_from_iter(sql_params.iter()), |row| {
                        Ok(PathTriple {
                            from: row.get(0)?,
                            rel: row.get(1)?,
                            to: row.get(2)?,
                        })
                    })?
                    .collect::<rusqlite::Result<Vec<_>>>()?;

                let mut next_frontier = Vec::new();
                for edge in edges {
                    if edge.to != seed_id && node_ids.insert(edge.to.clone()) {
                        next_frontier.push(edge.to.clone());
                    }
                    if !paths.contains(&edge) {
                        paths.push(edge);
                    }
                }
                frontier = next_frontier;
            }
        }
    }

    let ids: Vec<String> = node_ids.into_iter().collect();
    let rows = retrieval::fetch_l2_rows(conn, &ids)?;
    let scored: Vec<(f64, retrieval::CandidateRow)> =
        rows.into_iter().map(|row| (0.0, row)).collect();

    let mut response = retrieval::package_results(conn, &scored, view, budget)?;
    response.paths = Some(paths);
    Ok(response)
}

// ============================================================================
// TESTS
// ============================================================================
