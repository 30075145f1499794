//! Governance lifecycle: deprecation, selector-based forgetting with
//! tombstones, TTL sweep of L0, and temporal compaction of observations
//! into episode summaries.

use chrono::Utc;
use rusqlite::{params, params_from_iter, Connection, OptionalExtension};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use uuid::Uuid;

use crate::error::{MemoryError, Result};
use crate::ingest::{idempotency, insert_l1_fts};
use crate::model::{L1Status, L1Type, Scope};

// ============================================================================
// SELECTOR
// ============================================================================

/// Forgetting selector. Keys combine with AND semantics; the time
/// bounds apply to `created_at`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ForgetSelector {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub start_time: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end_time: Option<String>,
}

impl ForgetSelector {
    /// Key-sorted JSON encoding, so permutations of the same selector
    /// produce the same tombstone.
    pub fn canonical_json(&self) -> String {
        let mut map = std::collections::BTreeMap::new();
        if let Some(v) = &self.user_id {
            map.insert("user_id", v.as_str());
        }
        if let Some(v) = &self.start_time {
            map.insert("start_time", v.as_str());
        }
        if let Some(v) = &self.end_time {
            map.insert("end_time", v.as_str());
        }
        serde_json::to_string(&map).unwrap_or_else(|_| "{}".to_string())
    }

    /// SHA-256 of the canonical encoding, hex-encoded.
    pub fn selector_hash(&self) -> String {
        format!("{:x}", Sha256::digest(self.canonical_json().as_bytes()))
    }

    fn has_time_bounds(&self) -> bool {
        self.start_time.is_some() || self.end_time.is_some()
    }
}

// ============================================================================
// OUTCOMES
// ============================================================================

/// Result of `deprecate_memory`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeprecateOutcome {
    pub id: String,
    pub layer: String,
    pub action: String,
}

/// Result of `forget_memory`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ForgetOutcome {
    pub tombstone_hash: String,
    pub deleted_l0: usize,
    pub deleted_l1: usize,
    pub tombstoned_l2: usize,
}

/// Result of `gc_sweep`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SweepOutcome {
    pub deleted_l0: usize,
}

/// Result of `gc_compact`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompactOutcome {
    pub compacted_observations: usize,
    pub episodes_created: usize,
}

// ============================================================================
// DEPRECATION
// ============================================================================

/// Mark a memory deprecated. L1 is checked before L2; when
/// `superseded_by` names a successor L2 node, that node's
/// `supersedes_id` is pointed back at the deprecated one.
pub fn deprecate_memory(
    conn: &mut Connection,
    scope: &Scope,
    memory_id: &str,
    reason: &str,
    superseded_by: Option<&str>,
    idempotency_key: Option<&str>,
) -> Result<DeprecateOutcome> {
    scope.validate()?;

    if let Some(key) = idempotency_key {
        if let Some(prev) = idempotency::replay(conn, &scope.tenant_id, key)? {
            return Ok(prev);
        }
    }

    tracing::debug!("deprecating {} ({})", memory_id, reason);
    let tx = conn.transaction()?;

    let in_l1: Option<String> = tx
        .query_row(
            "SELECT id FROM memory_l1 WHERE id = ?1 AND tenant_id = ?2",
            params![memory_id, scope.tenant_id],
            |row| row.get(0),
        )
        .optional()?;

    let outcome = if in_l1.is_some() {
        tx.execute(
            "UPDATE memory_l1 SET status = 'deprecated' WHERE id = ?1",
            params![memory_id],
        )?;
        DeprecateOutcome {
            id: memory_id.to_string(),
            layer: "L1".to_string(),
            action: "deprecated".to_string(),
        }
    } else {
        let in_l2: Option<String> = tx
            .query_row(
                "SELECT id FROM memory_l2_nodes WHERE id = ?1 AND tenant_id = ?2",
                params![memory_id, scope.tenant_id],
                |row| row.get(0),
            )
            .optional()?;
        if in_l2.is_none() {
            return Err(MemoryError::NotFound("Memory not found".to_string()));
        }

        tx.execute(
            "UPDATE memory_l2_nodes SET status = 'deprecated' WHERE id = ?1",
            params![memory_id],
        )?;
        if let Some(successor) = superseded_by {
            tx.execute(
                "UPDATE memory_l2_nodes SET supersedes_id = ?1 WHERE id = ?2 AND tenant_id = ?3",
                params![memory_id, successor, scope.tenant_id],
            )?;
        }
        DeprecateOutcome {
            id: memory_id.to_string(),
            layer: "L2".to_string(),
            action: "deprecated".to_string(),
        }
    };

    if let Some(key) = idempotency_key {
        idempotency::record(&tx, &scope.tenant_id, key, &outcome)?;
    }
    tx.commit()?;
    Ok(outcome)
}

// ============================================================================
// FORGET
// ============================================================================

/// Forget memories matching a selector, leaving a tombstone.
///
/// - L0 is hard-deleted by scope alone, and only when the selector uses
///   no fields outside the L0 schema (it carries neither `user_id` nor
///   `created_at`); otherwise L0 is left to the TTL sweep.
/// - L1 is hard-deleted with the full selector applied, FTS rows included.
/// - L2 is soft-deleted (`tombstoned`) unless the selector narrows by
///   `user_id` (L2 is not user-scoped).
pub fn forget_memory(
    conn: &mut Connection,
    scope: &Scope,
    selector: &ForgetSelector,
    idempotency_key: Option<&str>,
) -> Result<ForgetOutcome> {
    scope.validate()?;

    if let Some(key) = idempotency_key {
        if let Some(prev) = idempotency::replay(conn, &scope.tenant_id, key)? {
            return Ok(prev);
        }
    }

    let selector_hash = selector.selector_hash();
    let tx = conn.transaction()?;

    tx.execute(
        "INSERT OR IGNORE INTO tombstones (tenant_id, workspace_id, selector_hash, created_at)
         VALUES (?1, ?2, ?3, ?4)",
        params![
            scope.tenant_id,
            scope.workspace_id,
            selector_hash,
            Utc::now().to_rfc3339(),
        ],
    )?;

    let mut where_clauses = vec!["tenant_id = ?", "workspace_id = ?"];
    let mut where_params: Vec<String> = vec![scope.tenant_id.clone(), scope.workspace_id.clone()];
    if let Some(user_id) = &selector.user_id {
        where_clauses.push("user_id = ?");
        where_params.push(user_id.clone());
    }
    if let Some(start) = &selector.start_time {
        where_clauses.push("created_at >= ?");
        where_params.push(start.clone());
    }
    if let Some(end) = &selector.end_time {
        where_clauses.push("created_at <= ?");
        where_params.push(end.clone());
    }
    let where_sql = where_clauses.join(" AND ");

    // L0 has no user_id or created_at column; a selector touching
    // either cannot be honored there and the rows expire via TTL
    let deleted_l0 = if selector.user_id.is_none() && !selector.has_time_bounds() {
        tx.execute(
            "DELETE FROM memory_l0 WHERE tenant_id = ?1 AND workspace_id = ?2",
            params![scope.tenant_id, scope.workspace_id],
        )?
    } else {
        0
    };

    let l1_ids: Vec<String> = {
        let mut stmt = tx.prepare(&format!("SELECT id FROM memory_l1 WHERE {where_sql}"))?;
        let rows = stmt.query_map(params_from_iter(where_params.iter()), |row| row.get(0))?;
        rows.collect::<rusqlite::Result<Vec<String>>>()?
    };
    let deleted_l1 = if l1_ids.is_empty() {
        0
    } else {
        let placeholders = vec!["?"; l1_ids.len()].join(",");
        tx.execute(
            &format!("DELETE FROM memory_l1 WHERE id IN ({placeholders})"),
            params_from_iter(l1_ids.iter()),
        )?;
        tx.execute(
            &format!("DELETE FROM memory_l1_fts WHERE id IN ({placeholders})"),
            params_from_iter(l1_ids.iter()),
        )?;
        l1_ids.len()
    };

    let tombstoned_l2 = if selector.user_id.is_some() {
        0
    } else {
        tx.execute(
            &format!("UPDATE memory_l2_nodes SET status = 'tombstoned' WHERE {where_sql}"),
            params_from_iter(where_params.iter()),
        )?
    };

    let outcome = ForgetOutcome {
        tombstone_hash: selector_hash,
        deleted_l0,
        deleted_l1,
        tombstoned_l2,
    };

    if let Some(key) = idempotency_key {
        idempotency::record(&tx, &scope.tenant_id, key, &outcome)?;
    }
    tx.commit()?;
    Ok(outcome)
}

// ============================================================================
// GC SWEEP
// ============================================================================

/// Delete L0 rows whose TTL has elapsed.
pub fn gc_sweep(conn: &mut Connection) -> Result<SweepOutcome> {
    let tx = conn.transaction()?;
    let deleted = tx.execute(
        "DELETE FROM memory_l0 WHERE expires_at < ?1",
        params![Utc::now().to_rfc3339()],
    )?;
    tx.commit()?;
    Ok(SweepOutcome { deleted_l0: deleted })
}

// ============================================================================
// GC COMPACT
// ============================================================================

/// Fold same-day observations into synthesized episode summaries.
///
/// Active observations in scope are bucketed by `(day, repo_id,
/// module)`. Each bucket of two or more yields one EpisodeSummary and
/// the sources transition to `archived`. Singletons are left alone.
pub fn gc_compact(conn: &mut Connection, scope: &Scope) -> Result<CompactOutcome> {
    scope.validate()?;

    let tx = conn.transaction()?;

    struct Bucket {
        day: String,
        repo_id: Option<String>,
        module: Option<String>,
        ids: Vec<String>,
        combined_summary: String,
    }

    let buckets: Vec<Bucket> = {
        let mut stmt = tx.prepare(
            "SELECT
                SUBSTR(created_at, 1, 10) AS day,
                repo_id,
                module,
                GROUP_CONCAT(id) AS ids,
                GROUP_CONCAT(summary, ' || ') AS combined_summary
             FROM memory_l1
             WHERE tenant_id = ?1 AND workspace_id = ?2
               AND type = 'Observation' AND status = 'active'
             GROUP BY day, repo_id, module",
        )?;
        let rows = stmt.query_map(params![scope.tenant_id, scope.workspace_id], |row| {
            let ids: String = row.get(3)?;
            Ok(Bucket {
                day: row.get(0)?,
                repo_id: row.get(1)?,
                module: row.get(2)?,
                ids: ids.split(',').map(String::from).collect(),
                combined_summary: row.get(4)?,
            })
        })?;
        rows.collect::<rusqlite::Result<Vec<_>>>()?
    };

    let mut compacted = 0usize;
    let mut episodes_created = 0usize;

    for bucket in buckets {
        if bucket.ids.len() < 2 {
            continue;
        }

        let episode_id = Uuid::new_v4().to_string();
        let now = Utc::now().to_rfc3339();
        let title = format!(
            "Episode: {} - {}",
            bucket.day,
            bucket.module.as_deref().unwrap_or("General")
        );
        let preview: String = bucket.combined_summary.chars().take(200).collect();
        let summary = format!(
            "Compacted {} observations. Content: {}...",
            bucket.ids.len(),
            preview
        );

        tx.execute(
            "INSERT INTO memory_l1 (
                id, tenant_id, workspace_id, repo_id, module, environment, user_id, session_id, task_id,
                type, status, title, summary, tags_json, entities_json, claims_json, applicability_json,
                confidence, evidence_count, confirmation_count, created_at, updated_at, last_confirmed_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16, ?17, ?18, ?19, ?20, ?21, ?22, ?23)",
            params![
                episode_id,
                scope.tenant_id,
                scope.workspace_id,
                bucket.repo_id,
                bucket.module,
                scope.environment,
                scope.user_id,
                Option::<String>::None,
                Option::<String>::None,
                L1Type::EpisodeSummary.as_str(),
                L1Status::Active.as_str(),
                title,
                summary,
                "[]",
                "[]",
                "[]",
                "{}",
                0.8,
                bucket.ids.len() as i64,
                1,
                now,
                now,
                now,
            ],
        )?;
        insert_l1_fts(&tx, &episode_id, &title, &summary, "", "")?;

        let placeholders = vec!["?"; bucket.ids.len()].join(",");
        tx.execute(
            &format!("UPDATE memory_l1 SET status = 'archived' WHERE id IN ({placeholders})"),
            params_from_iter(bucket.ids.iter()),
        )?;

        compacted += bucket.ids.len();
        episodes_created += 1;
    }

    tx.commit()?;
    Ok(CompactOutcome {
        compacted_observations: compacted,
        episodes_created,
    })
}

// ============================================================================
// TESTS
// ============================================================================
