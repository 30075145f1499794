//! Database Migrations
//!
//! Schema for the primary store. Everything is declared create-if-absent
//! so `apply_migrations` can run on every startup; the embedding columns
//! are added with a best-effort ALTER that tolerates re-runs.

use rusqlite::Connection;

use crate::error::Result;

/// Idempotent base schema
const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS schema_version (
    version INTEGER PRIMARY KEY,
    applied_at TEXT NOT NULL
);

-- Replay cache: one row per (tenant, idempotency key), written in the
-- same transaction as the operation's effects
CREATE TABLE IF NOT EXISTS idempotency (
    tenant_id TEXT NOT NULL,
    key TEXT NOT NULL,
    created_at TEXT NOT NULL,
    result_json TEXT NOT NULL,
    PRIMARY KEY (tenant_id, key)
);

-- L0: raw ingested events, destroyed by the TTL sweep
CREATE TABLE IF NOT EXISTS memory_l0 (
    id TEXT PRIMARY KEY,
    tenant_id TEXT NOT NULL,
    workspace_id TEXT NOT NULL,
    repo_id TEXT,
    session_id TEXT,
    task_id TEXT,
    payload_json TEXT NOT NULL,
    expires_at TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_l0_scope
    ON memory_l0 (tenant_id, workspace_id, repo_id, session_id, task_id);
CREATE INDEX IF NOT EXISTS idx_l0_expires ON memory_l0 (expires_at);

-- L1: observations and episode summaries
CREATE TABLE IF NOT EXISTS memory_l1 (
    id TEXT PRIMARY KEY,
    tenant_id TEXT NOT NULL,
    workspace_id TEXT NOT NULL,
    repo_id TEXT,
    module TEXT,
    environment TEXT,
    user_id TEXT,
    session_id TEXT,
    task_id TEXT,
    type TEXT NOT NULL,
    status TEXT NOT NULL,
    title TEXT NOT NULL,
    summary TEXT NOT NULL,
    tags_json TEXT NOT NULL,
    entities_json TEXT NOT NULL,
    claims_json TEXT NOT NULL,
    applicability_json TEXT NOT NULL,
    confidence REAL NOT NULL,
    evidence_count INTEGER NOT NULL,
    confirmation_count INTEGER NOT NULL,
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL,
    last_confirmed_at TEXT NOT NULL,
    ttl_seconds INTEGER
);

CREATE INDEX IF NOT EXISTS idx_l1_scope ON memory_l1 (tenant_id, workspace_id);
CREATE INDEX IF NOT EXISTS idx_l1_type_status ON memory_l1 (type, status);

-- L2: canonical nodes, mutated only by deprecation or supersession
CREATE TABLE IF NOT EXISTS memory_l2_nodes (
    id TEXT PRIMARY KEY,
    tenant_id TEXT NOT NULL,
    workspace_id TEXT NOT NULL,
    repo_id TEXT,
    module TEXT,
    environment TEXT,
    type TEXT NOT NULL,
    status TEXT NOT NULL,
    version INTEGER NOT NULL,
    supersedes_id TEXT,
    title TEXT NOT NULL,
    summary TEXT NOT NULL,
    tags_json TEXT NOT NULL,
    entities_json TEXT NOT NULL,
    claims_json TEXT NOT NULL,
    applicability_json TEXT NOT NULL,
    confidence REAL NOT NULL,
    evidence_count INTEGER NOT NULL,
    confirmation_count INTEGER NOT NULL,
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL,
    last_confirmed_at TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_l2_scope ON memory_l2_nodes (tenant_id, workspace_id);
CREATE INDEX IF NOT EXISTS idx_l2_type_status ON memory_l2_nodes (type, status);

-- Relations between canonical nodes; the full 5-tuple key makes
-- insertion idempotent
CREATE TABLE IF NOT EXISTS memory_l2_edges (
    tenant_id TEXT NOT NULL,
    workspace_id TEXT NOT NULL,
    from_id TEXT NOT NULL,
    rel TEXT NOT NULL,
    to_id TEXT NOT NULL,
    weight REAL NOT NULL,
    created_at TEXT NOT NULL,
    PRIMARY KEY (tenant_id, workspace_id, from_id, rel, to_id)
);

CREATE TABLE IF NOT EXISTS memory_artifacts (
    memory_id TEXT NOT NULL,
    layer TEXT NOT NULL,
    kind TEXT NOT NULL,
    locator TEXT NOT NULL,
    hash TEXT,
    created_at TEXT,
    classification TEXT NOT NULL,
    snippet_policy TEXT NOT NULL,
    PRIMARY KEY (memory_id, kind, locator)
);

CREATE TABLE IF NOT EXISTS tombstones (
    tenant_id TEXT NOT NULL,
    workspace_id TEXT NOT NULL,
    selector_hash TEXT NOT NULL,
    created_at TEXT NOT NULL,
    PRIMARY KEY (tenant_id, workspace_id, selector_hash)
);

-- FTS projections, kept in lockstep with the canonical tables by the
-- write paths
CREATE VIRTUAL TABLE IF NOT EXISTS memory_l1_fts USING fts5(
    id UNINDEXED,
    title,
    summary,
    tags_text,
    entities_text
);

CREATE VIRTUAL TABLE IF NOT EXISTS memory_l2_fts USING fts5(
    id UNINDEXED,
    title,
    summary,
    tags_text,
    entities_text
);

INSERT OR IGNORE INTO schema_version (version, applied_at) VALUES (1, datetime('now'));
"#;

/// Additive columns applied with a best-effort ALTER
const EMBEDDING_COLUMNS: &[&str] = &[
    "ALTER TABLE memory_l1 ADD COLUMN embedding FLOAT[1536]",
    "ALTER TABLE memory_l2_nodes ADD COLUMN embedding FLOAT[1536]",
];

/// Apply the schema to a connection. Safe to call repeatedly.
pub fn apply_migrations(conn: &Connection) -> Result<()> {
    conn.execute_batch(SCHEMA)?;

    for ddl in EMBEDDING_COLUMNS {
        if let Err(e) = conn.execute_batch(ddl) {
            // Re-runs hit "duplicate column name"; anything else is real
            if !e.to_string().contains("duplicate column") {
                return Err(e.into());
            }
        }
    }

    Ok(())
}
