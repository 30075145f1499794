//! mem_deprecate - retire a memory node.

use std::sync::Arc;

use serde::Deserialize;
use serde_json::Value;

use memlayer_core::MemoryEngine;

use super::{envelope, parse_args, FlatScope};

pub fn schema() -> Value {
    serde_json::json!({
        "type": "object",
        "properties": {
            "tenant_id": {"type": "string"},
            "workspace_id": {"type": "string"},
            "memory_id": {"type": "string"},
            "reason": {"type": "string"},
            "superseded_by": {"type": "string", "description": "L2 node that replaces the deprecated one"},
            "idempotency_key": {"type": "string"}
        },
        "required": ["tenant_id", "workspace_id", "memory_id", "reason"]
    })
}

#[derive(Debug, Deserialize)]
struct DeprecateArgs {
    #[serde(flatten)]
    scope: FlatScope,
    memory_id: String,
    reason: String,
    #[serde(default)]
    superseded_by: Option<String>,
    #[serde(default)]
    idempotency_key: Option<String>,
}

pub async fn execute(engine: &Arc<MemoryEngine>, args: Option<Value>) -> Result<Value, String> {
    let args: DeprecateArgs = parse_args(args)?;
    let scope = args.scope.into_scope();

    Ok(envelope(engine.deprecate(
        &scope,
        &args.memory_id,
        &args.reason,
        args.superseded_by.as_deref(),
        args.idempotency_key.as_deref(),
    )))
}
