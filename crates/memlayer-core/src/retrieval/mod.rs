//! Hybrid ranked retrieval across L1 and L2.
//!
//! Lexical candidates come from the FTS5 projections of both tiers;
//! when the caller supplies a pre-computed query embedding, sqlite-vec
//! distances are fused into the score. A missing vector function or
//! column silently degrades to lexical-only. Results are packaged into
//! one of three views under a token budget.

use chrono::{DateTime, Utc};
use rusqlite::types::Value as SqlValue;
use rusqlite::{params, params_from_iter, Connection};
use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::model::{embedding_to_bytes, Scope, View};

// Hybrid scoring weights. The lexical term is deliberately applied to
// the raw (negated) FTS5 rank, so lexical strength can dominate the
// bounded components when matches are strong.
const W_CONFIDENCE: f64 = 0.40;
const W_FRESHNESS: f64 = 0.15;
const W_TYPE: f64 = 0.10;
const W_VECTOR: f64 = 0.35;
const W_LEXICAL: f64 = 0.50;

/// Freshness half-life denominator, in days
const FRESHNESS_DECAY_DAYS: f64 = 180.0;

/// Artifact snippet reads are clamped to this many bytes
const SNIPPET_LIMIT: u64 = 1024;

// ============================================================================
// FILTERS & RESPONSE TYPES
// ============================================================================

/// Optional narrowing filters for `search_memory`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SearchFilters {
    /// Equality filter on the row `type` column (either tier)
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub memory_type: Option<String>,
    /// Equality filter on the row `status` column
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
    /// Pre-computed query embedding; enables the vector term
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub query_embedding: Option<Vec<f32>>,
}

/// One packaged result row. Fields beyond the index view are populated
/// according to the requested [`View`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchItem {
    pub id: String,
    #[serde(rename = "type")]
    pub memory_type: String,
    pub title: String,
    pub score: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub summary: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub confidence: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub applicability: Option<serde_json::Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub claims: Option<serde_json::Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub artifacts: Option<Vec<ArtifactView>>,
}

/// Artifact entry inside an evidence view
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ArtifactView {
    pub kind: String,
    pub locator: String,
    pub snippet_policy: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub snippet: Option<String>,
}

/// Budget outcome attached to every response
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Truncation {
    pub truncated: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    pub remaining_budget: i64,
}

/// One `{from, rel, to}` step of a graph expansion
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PathTriple {
    pub from: String,
    pub rel: String,
    pub to: String,
}

/// Packaged search or expansion result
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchResponse {
    pub view: String,
    pub items: Vec<SearchItem>,
    pub truncation: Truncation,
    pub token_estimate_used: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub paths: Option<Vec<PathTriple>>,
}

impl SearchResponse {
    pub(crate) fn empty(view: View, budget: i64) -> Self {
        Self {
            view: view.as_str().to_string(),
            items: Vec::new(),
            truncation: Truncation {
                truncated: false,
                reason: None,
                remaining_budget: budget,
            },
            token_estimate_used: 0,
            paths: None,
        }
    }
}

/// Candidate row pulled from either tier before scoring/packaging.
#[derive(Debug, Clone)]
pub(crate) struct CandidateRow {
    pub id: String,
    pub mem_type: String,
    pub title: String,
    pub summary: String,
    pub status: String,
    pub confidence: f64,
    pub last_confirmed_at: Option<String>,
    pub applicability_json: String,
    pub claims_json: String,
    pub rank: f64,
    pub vector_dist: Option<f64>,
}

// ============================================================================
// QUERY SANITIZATION
// ============================================================================

/// Turn free text into an FTS5 query of quoted phrase tokens.
///
/// An empty result means there is nothing matchable; callers short-circuit.
pub fn sanitize_fts_query(query: &str) -> String {
    query
        .split_whitespace()
        .filter_map(|token| {
            let cleaned: String = token.chars().filter(|c| *c != '"').collect();
            if cleaned.is_empty() {
                None
            } else {
                Some(format!("\"{cleaned}\""))
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}

// ============================================================================
// SEARCH
// ============================================================================

fn layer_select(table: &str, fts_table: &str, where_sql: &str, with_vector: bool) -> String {
    let vector_col = if with_vector {
        "CASE WHEN m.embedding IS NULL THEN NULL ELSE vec_distance_L2(m.embedding, ?) END AS vector_dist"
    } else {
        "NULL AS vector_dist"
    };
    format!(
        "SELECT m.id, m.type, m.title, m.summary, m.status, m.confidence, m.last_confirmed_at,
                m.applicability_json, m.claims_json, fts.rank AS rank, {vector_col}
         FROM {table} m
         JOIN {fts_table} fts ON m.id = fts.id
         WHERE {where_sql} AND {fts_table} MATCH ?"
    )
}

fn union_sql(where_sql: &str, with_vector: bool) -> String {
    format!(
        "{} UNION ALL {} ORDER BY rank LIMIT ?",
        layer_select("memory_l1", "memory_l1_fts", where_sql, with_vector),
        layer_select("memory_l2_nodes", "memory_l2_fts", where_sql, with_vector),
    )
}

fn run_union(conn: &Connection, sql: &str, sql_params: &[SqlValue]) -> rusqlite::Result<Vec<CandidateRow>> {
    let mut stmt = conn.prepare(sql)?;
    let rows = stmt.query_map(params_from_iter(sql_params.iter()), |row| {
        Ok(CandidateRow {
            id: row.get(0)?,
            mem_type: row.get(1)?,
            title: row.get(2)?,
            summary: row.get(3)?,
            status: row.get(4)?,
            confidence: row.get(5)?,
            last_confirmed_at: row.get(6)?,
            applicability_json: row.get(7)?,
            claims_json: row.get(8)?,
            rank: row.get(9)?,
            vector_dist: row.get(10)?,
        })
    })?;
    rows.collect()
}

fn is_vector_unavailable(e: &rusqlite::Error) -> bool {
    let msg = e.to_string();
    msg.contains("no such function: vec_distance_L2") || msg.contains("no such column")
}

/// Hybrid search across both tiers.
///
/// Fetches `2 * top_k` union candidates ordered by lexical rank, fuses
/// confidence, freshness, type boost, vector similarity and lexical
/// rank into one score, keeps the best `top_k`, and packages them under
/// `budget`.
pub fn search_memory(
    conn: &Connection,
    scope: &Scope,
    query: &str,
    view: View,
    budget: i64,
    top_k: usize,
    filters: Option<&SearchFilters>,
) -> Result<SearchResponse> {
    scope.validate()?;

    let match_query = sanitize_fts_query(query);
    if match_query.is_empty() {
        return Ok(SearchResponse::empty(view, budget));
    }

    // Hard scope filter; unqualified rows (NULL repo_id) are shared
    // into any repo scope
    let mut where_clauses = vec!["m.tenant_id = ?".to_string(), "m.workspace_id = ?".to_string()];
    let mut filter_params: Vec<SqlValue> = vec![
        SqlValue::from(scope.tenant_id.clone()),
        SqlValue::from(scope.workspace_id.clone()),
    ];
    if let Some(repo_id) = &scope.repo_id {
        where_clauses.push("(m.repo_id = ? OR m.repo_id IS NULL)".to_string());
        filter_params.push(SqlValue::from(repo_id.clone()));
    }
    if let Some(f) = filters {
        if let Some(t) = &f.memory_type {
            where_clauses.push("m.type = ?".to_string());
            filter_params.push(SqlValue::from(t.clone()));
        }
        if let Some(s) = &f.status {
            where_clauses.push("m.status = ?".to_string());
            filter_params.push(SqlValue::from(s.clone()));
        }
    }
    let where_sql = where_clauses.join(" AND ");
    let fetch_limit = (top_k * 2) as i64;

    let query_embedding = filters.and_then(|f| f.query_embedding.as_deref());

    let lexical_params = |limit: i64| -> Vec<SqlValue> {
        let mut p = Vec::with_capacity(filter_params.len() * 2 + 3);
        p.extend(filter_params.iter().cloned());
        p.push(SqlValue::from(match_query.clone()));
        p.extend(filter_params.iter().cloned());
        p.push(SqlValue::from(match_query.clone()));
        p.push(SqlValue::from(limit));
        p
    };

    let rows = match query_embedding {
        Some(embedding) => {
            let blob = embedding_to_bytes(embedding);
            let mut p = Vec::with_capacity(filter_params.len() * 2 + 5);
            p.push(SqlValue::from(blob.clone()));
            p.extend(filter_params.iter().cloned());
            p.push(SqlValue::from(match_query.clone()));
            p.push(SqlValue::from(blob));
            p.extend(filter_params.iter().cloned());
            p.push(SqlValue::from(match_query.clone()));
            p.push(SqlValue::from(fetch_limit));

            match run_union(conn, &union_sql(&where_sql, true), &p) {
                Ok(rows) => rows,
                Err(e) if is_vector_unavailable(&e) => {
                    tracing::debug!("vector search unavailable, re-running lexical-only: {}", e);
                    run_union(conn, &union_sql(&where_sql, false), &lexical_params(fetch_limit))?
                }
                Err(e) => return Err(e.into()),
            }
        }
        None => run_union(conn, &union_sql(&where_sql, false), &lexical_params(fetch_limit))?,
    };

    let now = Utc::now();
    let w_vec = if query_embedding.is_some() { W_VECTOR } else { 0.0 };

    let mut scored: Vec<(f64, CandidateRow)> = rows
        .into_iter()
        .map(|row| (hybrid_score(&row, w_vec, now), row))
        .collect();
    scored.sort_by(|a, b| b.0.partial_cmp(&a.0).unwrap_or(std::cmp::Ordering::Equal));
    scored.truncate(top_k);

    package_results(conn, &scored, view, budget)
}

fn hybrid_score(row: &CandidateRow, w_vec: f64, now: DateTime<Utc>) -> f64 {
    let freshness = row
        .last_confirmed_at
        .as_deref()
        .and_then(|s| DateTime::parse_from_rfc3339(s).ok())
        .map(|t| {
            let days = (now - t.with_timezone(&Utc)).num_seconds().max(0) as f64 / 86_400.0;
            (-days / FRESHNESS_DECAY_DAYS).exp()
        })
        .unwrap_or(1.0);

    let type_boost = match row.mem_type.as_str() {
        "Decision" | "Contract" | "VerifiedFact" => 1.0,
        "EpisodeSummary" => 0.8,
        _ => 0.5,
    };

    let vec_score = match row.vector_dist {
        Some(dist) => 1.0 / (1.0 + dist.max(0.0)),
        None => 0.0,
    };

    // FTS5 rank is negative, more negative is better; negate it into a
    // positive lexical term
    W_CONFIDENCE * row.confidence
        + W_FRESHNESS * freshness
        + W_TYPE * type_boost
        + w_vec * vec_score
        + W_LEXICAL * (-row.rank)
}

// ============================================================================
// PACKAGING
// ============================================================================

/// Package scored rows into the requested view under a token budget.
///
/// Token estimate per item is `serialized_len / 4`. The first item that
/// would exceed the budget stops the loop and flags truncation, so an
/// oversized first item yields an empty list.
pub(crate) fn package_results(
    conn: &Connection,
    scored: &[(f64, CandidateRow)],
    view: View,
    budget: i64,
) -> Result<SearchResponse> {
    let mut items: Vec<SearchItem> = Vec::new();
    let mut used: i64 = 0;
    let mut truncated = false;

    for (score, row) in scored {
        let mut item = SearchItem {
            id: row.id.clone(),
            memory_type: row.mem_type.clone(),
            title: row.title.clone(),
            score: *score,
            summary: None,
            status: None,
            confidence: None,
            applicability: None,
            claims: None,
            artifacts: None,
        };

        if view != View::Index {
            item.summary = Some(row.summary.clone());
            item.status = Some(row.status.clone());
            item.confidence = Some(row.confidence);
            item.applicability = Some(
                serde_json::from_str(&row.applicability_json)
                    .unwrap_or_else(|_| serde_json::json!({})),
            );
            item.claims = Some(
                serde_json::from_str(&row.claims_json).unwrap_or_else(|_| serde_json::json!([])),
            );
            if view == View::Evidence {
                item.artifacts = Some(load_artifacts(conn, &row.id)?);
            }
        }

        let cost = (serde_json::to_string(&item)?.len() / 4) as i64;
        if used + cost > budget {
            truncated = true;
            break;
        }
        used += cost;
        items.push(item);
    }

    Ok(SearchResponse {
        view: view.as_str().to_string(),
        items,
        truncation: Truncation {
            truncated,
            reason: truncated.then(|| "TOKEN_BUDGET".to_string()),
            remaining_budget: budget - used,
        },
        token_estimate_used: used,
        paths: None,
    })
}

fn load_artifacts(conn: &Connection, memory_id: &str) -> Result<Vec<ArtifactView>> {
    let mut stmt = conn.prepare(
        "SELECT kind, locator, snippet_policy FROM memory_artifacts WHERE memory_id = ?1",
    )?;
    let rows = stmt.query_map(params![memory_id], |row| {
        Ok(ArtifactView {
            kind: row.get(0)?,
            locator: row.get(1)?,
            snippet_policy: row.get(2)?,
            snippet: None,
        })
    })?;

    let mut artifacts = Vec::new();
    for row in rows {
        let mut artifact = row?;
        if artifact.snippet_policy == "allowed" && artifact.kind == "file" {
            artifact.snippet = read_snippet(&artifact.locator);
        }
        artifacts.push(artifact);
    }
    Ok(artifacts)
}

/// Bounded, lossy read of an artifact locator. Locators are untrusted;
/// any failure omits the snippet.
fn read_snippet(locator: &str) -> Option<String> {
    use std::io::Read;

    let file = std::fs::File::open(locator).ok()?;
    let mut buf = Vec::new();
    file.take(SNIPPET_LIMIT).read_to_end(&mut buf).ok()?;
    Some(String::from_utf8_lossy(&buf).into_owned())
}

/// Fetch L2 node details for a set of ids, shaped for packaging.
pub(crate) fn fetch_l2_rows(conn: &Connection, ids: &[String]) -> Result<Vec<CandidateRow>> {
    if ids.is_empty() {
        return Ok(Vec::new());
    }

    let placeholders = vec!["?"; ids.len()].join(",");
    let sql = format!(
        "SELECT id, type, title, summary, status, confidence, last_confirmed_at,
                applicability_json, claims_json
         FROM memory_l2_nodes WHERE id IN ({placeholders})"
    );

    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt.query_map(params_from_iter(ids.iter()), |row| {
        Ok(CandidateRow {
            id: row.get(0)?,
            mem_type: row.get(1)?,
            title: row.get(2)?,
            summary: row.get(3)?,
            status: row.get(4)?,
            confidence: row.get(5)?,
            last_confirmed_at: row.get(6)?,
            applicability_json: row.get(7)?,
            claims_json: row.get(8)?,
            rank: 0.0,
            vector_dist: None,
        })
    })?;

    let mut out = Vec::new();
    for row in rows {
        out.push(row?);
    }
    Ok(out)
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::GraphAccelerator;
    use crate::ingest::{promote_to_l2, upsert_event, PromotionPolicy};
    use crate::model::{ArtifactRef, Classification, EventPayload, L2Draft, SnippetPolicy};
    use crate::storage::apply_migrations;
    use std::io::Write;

    fn test_conn() -> Connection {
        let conn = Connection::open_in_memory().unwrap();
        apply_migrations(&conn).unwrap();
        conn
    }

    fn scope() -> Scope {
        Scope::new("t1", "w1")
    }

    fn seed_observation(conn: &mut Connection, content: &str, key: &str) -> String {
        let payload = EventPayload::from_content(content);
        upsert_event(conn, &scope(), &payload, key, true)
            .unwrap()
            .l1_id
            .unwrap()
    }

    fn seed_fact(conn: &mut Connection, title: &str, locator: &str, key: &str) -> String {
        let draft = L2Draft {
            l2_type: "VerifiedFact".to_string(),
            title: title.to_string(),
            summary: format!("{title} summary"),
            tags: vec![],
            entities: vec![],
            claims: vec!["claim".to_string()],
            applicability: serde_json::Map::new(),
            embedding: None,
        };
        let artifact = ArtifactRef {
            memory_id: "placeholder".to_string(),
            layer: "L2".to_string(),
            kind: "file".to_string(),
            locator: locator.to_string(),
            hash: None,
            classification: Classification::Internal,
            snippet_policy: SnippetPolicy::Allowed,
            created_at: None,
        };
        promote_to_l2(
            conn,
            &GraphAccelerator::disabled(),
            &scope(),
            &draft,
            &artifact,
            key,
            PromotionPolicy::Permissive,
        )
        .unwrap()
        .id
    }

    #[test]
    fn sanitizer_quotes_tokens_and_strips_quotes() {
        assert_eq!(sanitize_fts_query("memory leak"), "\"memory\" \"leak\"");
        assert_eq!(sanitize_fts_query("say \"hi\""), "\"say\" \"hi\"");
        assert_eq!(sanitize_fts_query("  \"\"  "), "");
    }

    #[test]
    fn search_finds_distilled_observation() {
        let mut conn = test_conn();
        let l1_id = seed_observation(&mut conn, "System crash due to memory leak", "k1");

        let response =
            search_memory(&conn, &scope(), "memory leak", View::Index, 1000, 8, None).unwrap();
        assert!(!response.items.is_empty());
        assert!(response.items.iter().any(|i| i.id == l1_id));
        assert_eq!(response.items[0].memory_type, "Observation");
        assert!(!response.truncation.truncated);
    }

    #[test]
    fn search_is_workspace_scoped() {
        let mut conn = test_conn();
        seed_observation(&mut conn, "only visible in w1", "k1");

        let other = Scope::new("t1", "w2");
        let response = search_memory(&conn, &other, "visible", View::Index, 1000, 8, None).unwrap();
        assert!(response.items.is_empty());
    }

    #[test]
    fn repo_scope_shares_unqualified_rows() {
        let mut conn = test_conn();
        // Seeded without a repo_id
        seed_observation(&mut conn, "global convention note", "k1");

        let mut repo_scope = scope();
        repo_scope.repo_id = Some("r1".to_string());
        let response =
            search_memory(&conn, &repo_scope, "convention", View::Index, 1000, 8, None).unwrap();
        assert_eq!(response.items.len(), 1);
    }

    #[test]
    fn type_filter_narrows_results() {
        let mut conn = test_conn();
        seed_observation(&mut conn, "observed timeout pattern", "k1");
        seed_fact(&mut conn, "timeout policy", "/tmp/nonexistent", "k2");

        let filters = SearchFilters {
            memory_type: Some("VerifiedFact".to_string()),
            ..Default::default()
        };
        let response =
            search_memory(&conn, &scope(), "timeout", View::Index, 1000, 8, Some(&filters)).unwrap();
        assert!(!response.items.is_empty());
        assert!(response.items.iter().all(|i| i.memory_type == "VerifiedFact"));
    }

    #[test]
    fn canonical_fact_outranks_observation() {
        let mut conn = test_conn();
        seed_observation(&mut conn, "retry backoff observed in logs", "k1");
        let fact_id = seed_fact(&mut conn, "retry backoff", "/tmp/nonexistent", "k2");

        let response =
            search_memory(&conn, &scope(), "retry backoff", View::Index, 1000, 8, None).unwrap();
        assert_eq!(response.items[0].id, fact_id);
    }

    #[test]
    fn result_count_bounded_by_top_k() {
        let mut conn = test_conn();
        for i in 0..6 {
            seed_observation(&mut conn, &format!("flaky test number {i}"), &format!("k{i}"));
        }

        let response = search_memory(&conn, &scope(), "flaky", View::Index, 10_000, 3, None).unwrap();
        assert!(response.items.len() <= 3);
    }

    #[test]
    fn tiny_budget_truncates_to_empty() {
        let mut conn = test_conn();
        seed_observation(&mut conn, "first budget probe entry", "k1");
        seed_observation(&mut conn, "second budget probe entry", "k2");

        let response =
            search_memory(&conn, &scope(), "budget probe", View::Evidence, 10, 8, None).unwrap();
        assert!(response.items.is_empty());
        assert!(response.truncation.truncated);
        assert_eq!(response.truncation.reason.as_deref(), Some("TOKEN_BUDGET"));
    }

    #[test]
    fn budget_sum_stays_within_bounds() {
        let mut conn = test_conn();
        for i in 0..5 {
            seed_observation(&mut conn, &format!("bounded packaging row {i}"), &format!("k{i}"));
        }

        let budget = 120;
        let response =
            search_memory(&conn, &scope(), "bounded packaging", View::Detail, budget, 8, None)
                .unwrap();
        assert!(response.token_estimate_used <= budget);
        assert_eq!(
            response.truncation.remaining_budget,
            budget - response.token_estimate_used
        );
    }

    #[test]
    fn evidence_view_embeds_allowed_file_snippet() {
        let dir = tempfile::TempDir::new().unwrap();
        let artifact_path = dir.path().join("evidence.txt");
        let mut f = std::fs::File::create(&artifact_path).unwrap();
        f.write_all(b"hello").unwrap();

        let mut conn = test_conn();
        seed_fact(&mut conn, "snippet source", artifact_path.to_str().unwrap(), "k1");

        let response =
            search_memory(&conn, &scope(), "snippet source", View::Evidence, 10_000, 8, None)
                .unwrap();
        let artifacts = response.items[0].artifacts.as_ref().unwrap();
        assert_eq!(artifacts[0].snippet.as_deref(), Some("hello"));
    }

    #[test]
    fn missing_artifact_file_omits_snippet() {
        let mut conn = test_conn();
        seed_fact(&mut conn, "ghost artifact", "/tmp/definitely/not/here", "k1");

        let response =
            search_memory(&conn, &scope(), "ghost artifact", View::Evidence, 10_000, 8, None)
                .unwrap();
        let artifacts = response.items[0].artifacts.as_ref().unwrap();
        assert!(artifacts[0].snippet.is_none());
    }

    #[test]
    fn query_embedding_does_not_break_search() {
        let mut conn = test_conn();
        seed_observation(&mut conn, "vector fusion smoke check", "k1");

        // Exercises the vector column when the extension is present and
        // the lexical fallback when it is not
        let filters = SearchFilters {
            query_embedding: Some(vec![0.1; 8]),
            ..Default::default()
        };
        let response =
            search_memory(&conn, &scope(), "vector fusion", View::Index, 1000, 8, Some(&filters))
                .unwrap();
        assert!(!response.items.is_empty());
    }

    #[test]
    fn empty_query_returns_empty_response() {
        let conn = test_conn();
        let response = search_memory(&conn, &scope(), "   ", View::Index, 1000, 8, None).unwrap();
        assert!(response.items.is_empty());
        assert!(!response.truncation.truncated);
        assert_eq!(response.truncation.remaining_budget, 1000);
    }
}
