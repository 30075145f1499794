//! mem_forget - selector-based forgetting with tombstones.

use std::sync::Arc;

use serde::Deserialize;
use serde_json::Value;

use memlayer_core::{ForgetSelector, MemoryEngine};

use super::{envelope, parse_args, FlatScope};

pub fn schema() -> Value {
    serde_json::json!({
        "type": "object",
        "properties": {
            "tenant_id": {"type": "string"},
            "workspace_id": {"type": "string"},
            "user_id": {"type": "string", "description": "Forget only this user's memories"},
            "start_time": {"type": "string", "description": "created_at lower bound (RFC3339)"},
            "end_time": {"type": "string", "description": "created_at upper bound (RFC3339)"},
            "idempotency_key": {"type": "string"}
        },
        "required": ["tenant_id", "workspace_id"]
    })
}

#[derive(Debug, Deserialize)]
struct ForgetArgs {
    tenant_id: String,
    workspace_id: String,
    #[serde(default)]
    user_id: Option<String>,
    #[serde(default)]
    start_time: Option<String>,
    #[serde(default)]
    end_time: Option<String>,
    #[serde(default)]
    idempotency_key: Option<String>,
}

pub async fn execute(engine: &Arc<MemoryEngine>, args: Option<Value>) -> Result<Value, String> {
    let args: ForgetArgs = parse_args(args)?;
    let scope = FlatScope {
        tenant_id: args.tenant_id,
        workspace_id: args.workspace_id,
        repo_id: None,
        module: None,
        environment: None,
        user_id: None,
        session_id: None,
        task_id: None,
    }
    .into_scope();
    let selector = ForgetSelector {
        user_id: args.user_id,
        start_time: args.start_time,
        end_time: args.end_time,
    };

    Ok(envelope(engine.forget(&scope, &selector, args.idempotency_key.as_deref())))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tools::test_support::test_engine;

    #[tokio::test]
    async fn forget_reports_tombstone_hash() {
        let (engine, _dir) = test_engine();
        let args = serde_json::json!({
            "tenant_id": "t1",
            "workspace_id": "w1",
            "user_id": "u1"
        });

        let result = execute(&engine, Some(args)).await.unwrap();
        assert_eq!(result["status"], "ok");
        let expected = ForgetSelector {
            user_id: Some("u1".to_string()),
            ..Default::default()
        };
        assert_eq!(result["data"]["tombstone_hash"], expected.selector_hash());
    }
}
