//! Per-tenant replay cache.
//!
//! Consulted at the head of every mutating operation: a hit returns the
//! first recorded result verbatim, a miss records the fresh result in
//! the same transaction as the operation's effects.

use chrono::Utc;
use rusqlite::{params, Connection, OptionalExtension};
use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::error::Result;

/// Look up a prior result for `(tenant_id, key)`.
pub fn replay<T: DeserializeOwned>(
    conn: &Connection,
    tenant_id: &str,
    key: &str,
) -> Result<Option<T>> {
    let stored: Option<String> = conn
        .query_row(
            "SELECT result_json FROM idempotency WHERE tenant_id = ?1 AND key = ?2",
            params![tenant_id, key],
            |row| row.get(0),
        )
        .optional()?;

    match stored {
        Some(json) => Ok(Some(serde_json::from_str(&json)?)),
        None => Ok(None),
    }
}

/// Record a result for `(tenant_id, key)`.
///
/// Must be called on the operation's own transaction so the record and
/// the effects become visible atomically.
pub fn record<T: Serialize>(conn: &Connection, tenant_id: &str, key: &str, result: &T) -> Result<()> {
    conn.execute(
        "INSERT INTO idempotency (tenant_id, key, created_at, result_json)
         VALUES (?1, ?2, ?3, ?4)",
        params![
            tenant_id,
            key,
            Utc::now().to_rfc3339(),
            serde_json::to_string(result)?
        ],
    )?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::apply_migrations;

    #[test]
    fn replay_returns_recorded_result() {
        let conn = Connection::open_in_memory().unwrap();
        apply_migrations(&conn).unwrap();

        let miss: Option<serde_json::Value> = replay(&conn, "t1", "k1").unwrap();
        assert!(miss.is_none());

        record(&conn, "t1", "k1", &serde_json::json!({"id": "abc"})).unwrap();
        let hit: Option<serde_json::Value> = replay(&conn, "t1", "k1").unwrap();
        assert_eq!(hit.unwrap()["id"], "abc");
    }

    #[test]
    fn keys_are_tenant_scoped() {
        let conn = Connection::open_in_memory().unwrap();
        apply_migrations(&conn).unwrap();

        record(&conn, "t1", "k1", &serde_json::json!({"id": "abc"})).unwrap();
        let other_tenant: Option<serde_json::Value> = replay(&conn, "t2", "k1").unwrap();
        assert!(other_tenant.is_none());
    }
}
