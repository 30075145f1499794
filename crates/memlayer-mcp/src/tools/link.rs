//! mem_link - weighted relations between canonical nodes.

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
            "from_id": {"type": "string"},
            "to_id": {"type": "string"},
            "rel": {"type": "string", "description": "Relation label, e.g. DEPENDS_ON or RELATED_TO"},
            "weight": {"type": "number", "default": 1.0},
            "idempotency_key": {"type": "string"}
        },
        "required": ["tenant_id", "workspace_id", "from_id", "to_id", "rel"]
    })
}

fn default_weight() -> f64 {
    1.0
}

#[derive(Debug, Deserialize)]
struct LinkArgs {
    #[serde(flatten)]
    scope: FlatScope,
    from_id: String,
    to_id: String,
    rel: String,
    #[serde(default = "default_weight")]
    weight: f64,
    #[serde(default)]
    idempotency_key: Option<String>,
}

pub async fn execute(engine: &Arc<MemoryEngine>, args: Option<Value>) -> Result<Value, String> {
    let args: LinkArgs = parse_args(args)?;
    let scope = args.scope.into_scope();

    Ok(envelope(engine.link_memories(
        &scope,
        &args.from_id,
        &args.to_id,
        &args.rel,
        args.weight,
        args.idempotency_key.as_deref(),
    )))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tools::test_support::test_engine;

    #[tokio::test]
    async fn linking_missing_nodes_reports_not_found() {
        let (engine, _dir) = test_engine();
        let args = serde_json::json!({
            "tenant_id": "t1",
            "workspace_id": "w1",
            "from_id": "a",
            "to_id": "b",
            "rel": "RELATED_TO"
        });

        let result = execute(&engine, Some(args)).await.unwrap();
        assert_eq!(result["status"], "error");
        assert_eq!(result["error_code"], "NOT_FOUND");
    }
}
