//! Ingestion state machine: upsert events (L0), distill observations
//! (L1), commit episode summaries (L1), validate-and-promote canonical
//! nodes (L2), and link L2 nodes.
//!
//! Every operation is a free function over a caller-owned connection so
//! tests can drive an in-memory database; [`crate::MemoryEngine`] wraps
//! them with per-call acquisition. Each operation commits as a single
//! transaction that includes its idempotency record. Graph projection
//! runs after commit and is best-effort: the primary store is always
//! authoritative.

pub mod idempotency;

use chrono::{Duration, Utc};
use rusqlite::{params, Connection, OptionalExtension};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{MemoryError, Result};
use crate::graph::{sanitize_rel_label, GraphAccelerator};
use crate::model::{
    embedding_to_bytes, ArtifactRef, EpisodePayload, EventPayload, L1Status, L1Type, L2Draft,
    L2Status, L2Type, Scope,
};

// ============================================================================
// OUTCOMES
// ============================================================================

/// Result of `upsert_event`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventOutcome {
    pub id: String,
    pub layer: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub l1_id: Option<String>,
}

/// Result of `commit_episode`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EpisodeOutcome {
    pub id: String,
    /// `created` or `updated`
    pub action: String,
}

/// Result of `promote_to_l2`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PromoteOutcome {
    pub id: String,
}

/// Result of `link_memories`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LinkOutcome {
    pub from: String,
    pub to: String,
    pub rel: String,
}

/// Scope-tightness enforcement for promotion.
///
/// `Permissive` (the default) only checks the type set and the claims
/// requirement; `Strict` additionally demands `repo_id` plus at least
/// one of `module`/`environment` on the scope.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum PromotionPolicy {
    #[default]
    Permissive,
    Strict,
}

const INSERT_L1: &str = "INSERT INTO memory_l1 (
    id, tenant_id, workspace_id, repo_id, module, environment, user_id, session_id, task_id,
    type, status, title, summary, tags_json, entities_json, claims_json, applicability_json,
    confidence, evidence_count, confirmation_count, created_at, updated_at, last_confirmed_at
) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16, ?17, ?18, ?19, ?20, ?21, ?22, ?23)";

/// Insert the FTS projection row for an L1 record.
pub(crate) fn insert_l1_fts(
    conn: &Connection,
    id: &str,
    title: &str,
    summary: &str,
    tags_text: &str,
    entities_text: &str,
) -> Result<()> {
    conn.execute(
        "INSERT INTO memory_l1_fts (id, title, summary, tags_text, entities_text)
         VALUES (?1, ?2, ?3, ?4, ?5)",
        params![id, title, summary, tags_text, entities_text],
    )?;
    Ok(())
}

fn insert_l2_fts(
    conn: &Connection,
    id: &str,
    title: &str,
    summary: &str,
    tags_text: &str,
    entities_text: &str,
) -> Result<()> {
    conn.execute(
        "INSERT INTO memory_l2_fts (id, title, summary, tags_text, entities_text)
         VALUES (?1, ?2, ?3, ?4, ?5)",
        params![id, title, summary, tags_text, entities_text],
    )?;
    Ok(())
}

// ============================================================================
// UPSERT EVENT (L0, optional distillation)
// ============================================================================

/// Insert a raw event into L0 with a 24h TTL; when `distill` is set,
/// also materialize an L1 Observation from the payload content.
pub fn upsert_event(
    conn: &mut Connection,
    scope: &Scope,
    payload: &EventPayload,
    idempotency_key: &str,
    distill: bool,
) -> Result<EventOutcome> {
    scope.validate()?;

    if let Some(prev) = idempotency::replay(conn, &scope.tenant_id, idempotency_key)? {
        return Ok(prev);
    }

    let now = Utc::now();
    let tx = conn.transaction()?;

    let l0_id = Uuid::new_v4().to_string();
    let expires_at = now + Duration::hours(24);

    tx.execute(
        "INSERT INTO memory_l0 (id, tenant_id, workspace_id, repo_id, session_id, task_id, payload_json, expires_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
        params![
            l0_id,
            scope.tenant_id,
            scope.workspace_id,
            scope.repo_id,
            scope.session_id,
            scope.task_id,
            serde_json::to_string(payload)?,
            expires_at.to_rfc3339(),
        ],
    )?;

    let mut outcome = EventOutcome {
        id: l0_id,
        layer: "L0".to_string(),
        l1_id: None,
    };

    if distill {
        let l1_id = Uuid::new_v4().to_string();
        let preview: String = payload.content.chars().take(50).collect();
        let title = format!("Observation: {preview}");
        let now_str = now.to_rfc3339();

        // Distillation starts at weak evidence: one confirmation, no
        // corroborating artifacts yet
        tx.execute(
            INSERT_L1,
            params![
                l1_id,
                scope.tenant_id,
                scope.workspace_id,
                scope.repo_id,
                scope.module,
                scope.environment,
                scope.user_id,
                scope.session_id,
                scope.task_id,
                L1Type::Observation.as_str(),
                L1Status::Active.as_str(),
                title,
                payload.content,
                "[]",
                "[]",
                "[]",
                "{}",
                0.5,
                0,
                1,
                now_str,
                now_str,
                now_str,
            ],
        )?;
        insert_l1_fts(&tx, &l1_id, &title, &payload.content, "", "")?;
        outcome.l1_id = Some(l1_id);
    }

    idempotency::record(&tx, &scope.tenant_id, idempotency_key, &outcome)?;
    tx.commit()?;
    Ok(outcome)
}

// ============================================================================
// COMMIT EPISODE (L1)
// ============================================================================

/// Upsert an EpisodeSummary keyed by session, falling back to task.
///
/// A hit overwrites the descriptive fields and bumps the confirmation
/// counter; a miss creates a fresh summary. One episode per session or
/// task: a second episode sharing a session id merges into the first.
pub fn commit_episode(
    conn: &mut Connection,
    scope: &Scope,
    payload: &EpisodePayload,
    idempotency_key: &str,
) -> Result<EpisodeOutcome> {
    scope.validate()?;

    if let Some(prev) = idempotency::replay(conn, &scope.tenant_id, idempotency_key)? {
        return Ok(prev);
    }

    let tx = conn.transaction()?;

    let target_id: Option<String> = if let Some(session_id) = &scope.session_id {
        tx.query_row(
            "SELECT id FROM memory_l1
             WHERE tenant_id = ?1 AND workspace_id = ?2 AND session_id = ?3 AND type = 'EpisodeSummary'",
            params![scope.tenant_id, scope.workspace_id, session_id],
            |row| row.get(0),
        )
        .optional()?
    } else if let Some(task_id) = &scope.task_id {
        tx.query_row(
            "SELECT id FROM memory_l1
             WHERE tenant_id = ?1 AND workspace_id = ?2 AND task_id = ?3 AND type = 'EpisodeSummary'",
            params![scope.tenant_id, scope.workspace_id, task_id],
            |row| row.get(0),
        )
        .optional()?
    } else {
        None
    };

    let now = Utc::now().to_rfc3339();
    let tags_text = payload.tags.join(" ");
    let entities_text = payload.entities.join(" ");

    let outcome = match target_id {
        Some(id) => {
            tx.execute(
                "UPDATE memory_l1 SET
                    title = ?1, summary = ?2, tags_json = ?3, entities_json = ?4,
                    claims_json = ?5, applicability_json = ?6,
                    updated_at = ?7, confirmation_count = confirmation_count + 1, last_confirmed_at = ?8
                 WHERE id = ?9",
                params![
                    payload.title,
                    payload.summary,
                    serde_json::to_string(&payload.tags)?,
                    serde_json::to_string(&payload.entities)?,
                    serde_json::to_string(&payload.claims)?,
                    serde_json::to_string(&payload.applicability)?,
                    now,
                    now,
                    id,
                ],
            )?;
            tx.execute(
                "UPDATE memory_l1_fts SET title = ?1, summary = ?2, tags_text = ?3, entities_text = ?4
                 WHERE id = ?5",
                params![payload.title, payload.summary, tags_text, entities_text, id],
            )?;
            EpisodeOutcome {
                id,
                action: "updated".to_string(),
            }
        }
        None => {
            let id = Uuid::new_v4().to_string();
            tx.execute(
                INSERT_L1,
                params![
                    id,
                    scope.tenant_id,
                    scope.workspace_id,
                    scope.repo_id,
                    scope.module,
                    scope.environment,
                    scope.user_id,
                    scope.session_id,
                    scope.task_id,
                    L1Type::EpisodeSummary.as_str(),
                    L1Status::Active.as_str(),
                    payload.title,
                    payload.summary,
                    serde_json::to_string(&payload.tags)?,
                    serde_json::to_string(&payload.entities)?,
                    serde_json::to_string(&payload.claims)?,
                    serde_json::to_string(&payload.applicability)?,
                    1.0,
                    0,
                    1,
                    now,
                    now,
                    now,
                ],
            )?;
            insert_l1_fts(&tx, &id, &payload.title, &payload.summary, &tags_text, &entities_text)?;
            EpisodeOutcome {
                id,
                action: "created".to_string(),
            }
        }
    };

    if let Some(embedding) = &payload.embedding {
        tx.execute(
            "UPDATE memory_l1 SET embedding = ?1 WHERE id = ?2",
            params![embedding_to_bytes(embedding), outcome.id],
        )?;
    }

    idempotency::record(&tx, &scope.tenant_id, idempotency_key, &outcome)?;
    tx.commit()?;
    Ok(outcome)
}

// ============================================================================
// PROMOTE TO L2
// ============================================================================

/// Validate a draft and mint a canonical L2 node from it.
///
/// The artifact's `memory_id` placeholder is replaced with the new node
/// id. The node is projected to the graph accelerator after commit.
#[allow(clippy::too_many_arguments)]
pub fn promote_to_l2(
    conn: &mut Connection,
    graph: &GraphAccelerator,
    scope: &Scope,
    draft: &L2Draft,
    artifact: &ArtifactRef,
    idempotency_key: &str,
    policy: PromotionPolicy,
) -> Result<PromoteOutcome> {
    scope.validate()?;

    let l2_type = L2Type::parse(&draft.l2_type).ok_or_else(|| {
        MemoryError::PromotionValidation(format!("Invalid type: {}", draft.l2_type))
    })?;

    if draft.claims.is_empty() {
        return Err(MemoryError::PromotionValidation("No claims provided".to_string()));
    }

    if policy == PromotionPolicy::Strict
        && !(scope.repo_id.is_some() && (scope.module.is_some() || scope.environment.is_some()))
    {
        return Err(MemoryError::PromotionValidation(
            "Scope too loose for L2: repo_id and module or environment required".to_string(),
        ));
    }

    if let Some(prev) = idempotency::replay(conn, &scope.tenant_id, idempotency_key)? {
        return Ok(prev);
    }

    let now = Utc::now().to_rfc3339();
    let tx = conn.transaction()?;

    let l2_id = Uuid::new_v4().to_string();
    tx.execute(
        "INSERT INTO memory_l2_nodes (
            id, tenant_id, workspace_id, repo_id, module, environment,
            type, status, version, title, summary,
            tags_json, entities_json, claims_json, applicability_json,
            confidence, evidence_count, confirmation_count,
            created_at, updated_at, last_confirmed_at
        ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16, ?17, ?18, ?19, ?20, ?21)",
        params![
            l2_id,
            scope.tenant_id,
            scope.workspace_id,
            scope.repo_id,
            scope.module,
            scope.environment,
            l2_type.as_str(),
            L2Status::Active.as_str(),
            1,
            draft.title,
            draft.summary,
            serde_json::to_string(&draft.tags)?,
            serde_json::to_string(&draft.entities)?,
            serde_json::to_string(&draft.claims)?,
            serde_json::to_string(&draft.applicability)?,
            1.0,
            1,
            1,
            now,
            now,
            now,
        ],
    )?;

    if let Some(embedding) = &draft.embedding {
        tx.execute(
            "UPDATE memory_l2_nodes SET embedding = ?1 WHERE id = ?2",
            params![embedding_to_bytes(embedding), l2_id],
        )?;
    }

    insert_l2_fts(
        &tx,
        &l2_id,
        &draft.title,
        &draft.summary,
        &draft.tags.join(" "),
        &draft.entities.join(" "),
    )?;

    tx.execute(
        "INSERT INTO memory_artifacts (memory_id, layer, kind, locator, hash, created_at, classification, snippet_policy)
         VALUES (?1, 'L2', ?2, ?3, ?4, ?5, ?6, ?7)",
        params![
            l2_id,
            artifact.kind,
            artifact.locator,
            artifact.hash,
            now,
            artifact.classification.as_str(),
            artifact.snippet_policy.as_str(),
        ],
    )?;

    let outcome = PromoteOutcome { id: l2_id };
    idempotency::record(&tx, &scope.tenant_id, idempotency_key, &outcome)?;
    tx.commit()?;

    graph.upsert_node(&outcome.id, l2_type.as_str(), &draft.title, &draft.tags, 1.0);

    Ok(outcome)
}

// ============================================================================
// LINK MEMORIES (L2 edges)
// ============================================================================

/// Insert-or-replace an edge between two existing L2 nodes.
///
/// Re-linking the same 5-tuple updates the weight. The edge is
/// projected to the graph accelerator after commit.
#[allow(clippy::too_many_arguments)]
pub fn link_memories(
    conn: &mut Connection,
    graph: &GraphAccelerator,
    scope: &Scope,
    from_id: &str,
    to_id: &str,
    rel: &str,
    weight: f64,
    idempotency_key: Option<&str>,
) -> Result<LinkOutcome> {
    scope.validate()?;

    if let Some(key) = idempotency_key {
        if let Some(prev) = idempotency::replay(conn, &scope.tenant_id, key)? {
            return Ok(prev);
        }
    }

    let tx = conn.transaction()?;

    let from_exists: Option<String> = tx
        .query_row(
            "SELECT id FROM memory_l2_nodes WHERE id = ?1 AND tenant_id = ?2",
            params![from_id, scope.tenant_id],
            |row| row.get(0),
        )
        .optional()?;
    if from_exists.is_none() {
        return Err(MemoryError::NotFound(format!("Source node {from_id} not found in L2")));
    }

    let to_exists: Option<String> = tx
        .query_row(
            "SELECT id FROM memory_l2_nodes WHERE id = ?1 AND tenant_id = ?2",
            params![to_id, scope.tenant_id],
            |row| row.get(0),
        )
        .optional()?;
    if to_exists.is_none() {
        return Err(MemoryError::NotFound(format!("Target node {to_id} not found in L2")));
    }

    tx.execute(
        "INSERT OR REPLACE INTO memory_l2_edges (tenant_id, workspace_id, from_id, rel, to_id, weight, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
        params![
            scope.tenant_id,
            scope.workspace_id,
            from_id,
            rel,
            to_id,
            weight,
            Utc::now().to_rfc3339(),
        ],
    )?;

    let outcome = LinkOutcome {
        from: from_id.to_string(),
        to: to_id.to_string(),
        rel: rel.to_string(),
    };

    if let Some(key) = idempotency_key {
        idempotency::record(&tx, &scope.tenant_id, key, &outcome)?;
    }
    tx.commit()?;

    graph.upsert_edge(from_id, to_id, &sanitize_rel_label(rel), weight);

    Ok(outcome)
}

// ============================================================================
// TESTS
// ============================================================================
