//! mem_upsert - raw event ingestion with optional distillation.

use std::sync::Arc;

use serde::Deserialize;
use serde_json::Value;

use memlayer_core::{EventPayload, MemoryEngine};

use super::{envelope, parse_args, FlatScope};

pub fn schema() -> Value {
    serde_json::json!({
        "type": "object",
        "properties": {
            "tenant_id": {"type": "string", "description": "Tenant identifier"},
            "workspace_id": {"type": "string", "description": "Workspace identifier"},
            "content": {"type": "string", "description": "Raw event content"},
            "idempotency_key": {"type": "string", "description": "Replay key; repeated calls return the first result"},
            "repo_id": {"type": "string"},
            "session_id": {"type": "string"},
            "task_id": {"type": "string"},
            "metadata": {"type": "object", "description": "Opaque metadata stored with the event"},
            "distill": {
                "type": "boolean",
                "description": "Also materialize an L1 observation (default: false)",
                "default": false
            }
        },
        "required": ["tenant_id", "workspace_id", "content", "idempotency_key"]
    })
}

#[derive(Debug, Deserialize)]
struct UpsertArgs {
    #[serde(flatten)]
    scope: FlatScope,
    content: String,
    idempotency_key: String,
    #[serde(default)]
    metadata: Option<serde_json::Map<String, Value>>,
    #[serde(default)]
    distill: bool,
}

pub async fn execute(engine: &Arc<MemoryEngine>, args: Option<Value>) -> Result<Value, String> {
    let args: UpsertArgs = parse_args(args)?;
    if args.content.trim().is_empty() {
        return Err("Content cannot be empty".to_string());
    }

    let scope = args.scope.into_scope();
    let payload = EventPayload {
        content: args.content,
        metadata: args.metadata,
    };

    Ok(envelope(engine.upsert_event(
        &scope,
        &payload,
        &args.idempotency_key,
        args.distill,
    )))
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tools::test_support::test_engine;

    #[tokio::test]
    async fn upsert_returns_ok_envelope_with_l0_id() {
        let (engine, _dir) = test_engine();
        let args = serde_json::json!({
            "tenant_id": "t1",
            "workspace_id": "w1",
            "content": "deploy rolled back",
            "idempotency_key": "k1"
        });

        let result = execute(&engine, Some(args)).await.unwrap();
        assert_eq!(result["status"], "ok");
        assert_eq!(result["data"]["layer"], "L0");
        assert!(result["data"]["id"].is_string());
    }

    #[tokio::test]
    async fn distill_flag_adds_l1_id() {
        let (engine, _dir) = test_engine();
        let args = serde_json::json!({
            "tenant_id": "t1",
            "workspace_id": "w1",
            "content": "connection pool exhausted",
            "idempotency_key": "k1",
            "distill": true
        });

        let result = execute(&engine, Some(args)).await.unwrap();
        assert!(result["data"]["l1_id"].is_string());
    }

    #[tokio::test]
    async fn replayed_key_returns_same_id() {
        let (engine, _dir) = test_engine();
        let args = serde_json::json!({
            "tenant_id": "t1",
            "workspace_id": "w1",
            "content": "same event",
            "idempotency_key": "k1"
        });

        let first = execute(&engine, Some(args.clone())).await.unwrap();
        let second = execute(&engine, Some(args)).await.unwrap();
        assert_eq!(first["data"]["id"], second["data"]["id"]);
    }

    #[tokio::test]
    async fn missing_arguments_fail() {
        let (engine, _dir) = test_engine();
        assert!(execute(&engine, None).await.is_err());

        let args = serde_json::json!({"tenant_id": "t1"});
        assert!(execute(&engine, Some(args)).await.is_err());
    }

    #[tokio::test]
    async fn empty_content_fails() {
        let (engine, _dir) = test_engine();
        let args = serde_json::json!({
            "tenant_id": "t1",
            "workspace_id": "w1",
            "content": "   ",
            "idempotency_key": "k1"
        });
        assert!(execute(&engine, Some(args)).await.is_err());
    }
}
